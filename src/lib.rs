//! # ARR Waterfall
//!
//! A library for turning subscription contracts into monthly revenue
//! matrices, annual-recurring-revenue (ARR) waterfalls and retention metrics.
//!
//! ## Core Concepts
//!
//! - **Bucketizing**: each contract's total value is spread evenly over the billing months it covers
//! - **Revenue Matrix**: one row per customer, one column per calendar month, zero-filled
//! - **Transition Classification**: every month-over-month change per customer is exactly one of
//!   new business, upsell, downsell or churn
//! - **Waterfall**: company totals bridging last month's revenue to this month's, annualized
//! - **Logo Waterfall**: the same bridge in distinct customer counts
//! - **Overrides**: a planning matrix can be reconciled against, or laid over, the computed one
//!
//! ## Example
//!
//! ```rust,ignore
//! use arr_waterfall::*;
//! use chrono::NaiveDate;
//! use rust_decimal::Decimal;
//!
//! let contracts = vec![Contract {
//!     customer_id: "C1".to_string(),
//!     customer_name: "Acme".to_string(),
//!     contract_id: None,
//!     contract_start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     contract_end_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
//!     total_contract_value: Decimal::from(9000),
//! }];
//!
//! let output = process_contracts(&contracts, &EngineConfig::default()).unwrap();
//! let waterfall = &output.analysis.waterfall;
//! ```

pub mod balancer;
pub mod bucketizer;
pub mod classifier;
pub mod error;
pub mod export;
pub mod ingestion;
pub mod logo;
pub mod matrix;
pub mod month;
pub mod overrides;
pub mod report;
pub mod retention;
pub mod schema;
pub mod waterfall;

pub use balancer::{
    verify_conservation, verify_logo_balance, verify_waterfall_balance, WaterfallBalancer,
};
pub use bucketizer::{bucketize, resolve_contract_ids, Bucketizer};
pub use classifier::{classify_change, ClassifiedLedger, ClassifiedRow, TransitionClassifier};
pub use error::{ArrError, Result};
pub use export::{read_matrix_csv, write_csv, TabularReport};
pub use ingestion::{convert_records, ContractRecord, DateFormat};
pub use logo::{build_logo_waterfall, LogoRow, LogoWaterfall};
pub use matrix::{build_revenue_matrix, MatrixRow, RevenueMatrix};
pub use month::Month;
pub use overrides::{apply_override, reconcile};
pub use report::{reporting_month, top_customers, CoreMetrics, CustomerRevenue};
pub use retention::RetentionAnalyzer;
pub use schema::*;
pub use waterfall::{AggregatedWaterfall, RatioRow, WaterfallBuilder, WaterfallRow};

use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything derived from one revenue matrix.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrAnalysis {
    pub customers: ClassifiedLedger,
    pub logos: LogoWaterfall,
    pub waterfall: AggregatedWaterfall,
}

/// Full pipeline output, from contracts to waterfall.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrOutput {
    pub facts: Vec<MonthlyRevenueFact>,
    pub matrix: RevenueMatrix,
    pub analysis: ArrAnalysis,
}

/// Classifies a matrix and builds both waterfalls from it.
///
/// Also used to re-plan: pass an edited matrix (for example the result of
/// [`apply_override`]) to see its waterfall.
pub fn classify_and_aggregate(matrix: &RevenueMatrix, config: &EngineConfig) -> ArrAnalysis {
    let customers = TransitionClassifier::new(config).classify(matrix);
    let logos = build_logo_waterfall(&customers);
    let waterfall = WaterfallBuilder::new(config).build(&customers);

    debug!(
        "Analysis covers {} customers over {} months",
        customers.customer_count(),
        waterfall.months.len()
    );

    ArrAnalysis {
        customers,
        logos,
        waterfall,
    }
}

pub struct ArrProcessor;

impl ArrProcessor {
    pub fn process(contracts: &[Contract], config: &EngineConfig) -> Result<ArrOutput> {
        config.validate()?;

        info!("Processing {} contracts", contracts.len());

        let facts = Bucketizer::new(config).bucketize(contracts)?;
        debug!("Bucketized into {} monthly facts", facts.len());

        let matrix = build_revenue_matrix(&facts).sorted_by_sales_chronology();
        let analysis = classify_and_aggregate(&matrix, config);

        info!(
            "Built waterfall for {} customers from {} to {}",
            matrix.rows.len(),
            matrix
                .first_month()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "-".to_string()),
            analysis
                .waterfall
                .months
                .last()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "-".to_string())
        );

        Ok(ArrOutput {
            facts,
            matrix,
            analysis,
        })
    }

    /// Runs [`ArrProcessor::process`] and then checks contract conservation
    /// and both waterfall identities.
    pub fn process_with_verification(
        contracts: &[Contract],
        config: &EngineConfig,
        tolerance: Decimal,
    ) -> Result<ArrOutput> {
        let output = Self::process(contracts, config)?;
        let balancer = WaterfallBalancer::new(tolerance);

        let mut facts_by_contract: BTreeMap<&str, Vec<MonthlyRevenueFact>> = BTreeMap::new();
        for fact in &output.facts {
            facts_by_contract
                .entry(fact.contract_id.as_str())
                .or_default()
                .push(fact.clone());
        }

        let rounding_unit = Decimal::new(1, config.revenue_decimal_places);
        for (contract, contract_id) in contracts.iter().zip(resolve_contract_ids(contracts)) {
            let facts = facts_by_contract
                .get(contract_id.as_str())
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let allowed = (rounding_unit * Decimal::from(facts.len() as u64)).max(tolerance);
            verify_conservation(contract, facts, allowed)?;
        }

        balancer.verify_waterfall_balance(&output.analysis.waterfall)?;
        balancer.verify_logo_balance(&output.analysis.logos)?;

        debug!("All identities hold for {} contracts", contracts.len());
        Ok(output)
    }
}

pub fn process_contracts(contracts: &[Contract], config: &EngineConfig) -> Result<ArrOutput> {
    ArrProcessor::process(contracts, config)
}

pub fn process_with_verification(
    contracts: &[Contract],
    config: &EngineConfig,
    tolerance: Decimal,
) -> Result<ArrOutput> {
    ArrProcessor::process_with_verification(contracts, config, tolerance)
}
