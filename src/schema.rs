use crate::error::{ArrError, Result};
use crate::month::Month;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One value per calendar month. Absent keys mean "no value" in sparse inputs
/// and never occur in engine-built (dense) series.
pub type MonthlySeries = BTreeMap<Month, Decimal>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerKey {
    pub customer_id: String,
    pub customer_name: String,
}

impl CustomerKey {
    pub fn new(customer_id: impl Into<String>, customer_name: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            customer_name: customer_name.into(),
        }
    }
}

impl fmt::Display for CustomerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.customer_name, self.customer_id)
    }
}

/// A subscription contract, already parsed into typed dates and amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub customer_id: String,
    pub customer_name: String,
    /// Synthesized by the bucketizer when missing or duplicated.
    #[serde(default)]
    pub contract_id: Option<String>,
    pub contract_start_date: NaiveDate,
    pub contract_end_date: NaiveDate,
    pub total_contract_value: Decimal,
}

impl Contract {
    pub fn duration_days(&self) -> i64 {
        (self.contract_end_date - self.contract_start_date).num_days()
    }

    pub fn customer_key(&self) -> CustomerKey {
        CustomerKey::new(self.customer_id.clone(), self.customer_name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRevenueFact {
    pub customer_id: String,
    pub customer_name: String,
    pub contract_id: String,
    pub month: Month,
    pub monthly_revenue: Decimal,
}

/// Revenue-denominated measures.
///
/// Two display orders exist: the per-customer ledger (`monthlyRevenue` first)
/// and the company waterfall (`lastMonthRevenue` first, `monthlyRevenue` last).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RevenueMeasure {
    LastMonthRevenue,
    MonthlyRevenue,
    NewBusiness,
    UpSell,
    DownSell,
    Churn,
}

impl RevenueMeasure {
    pub const LEDGER_ORDER: [RevenueMeasure; 5] = [
        RevenueMeasure::MonthlyRevenue,
        RevenueMeasure::NewBusiness,
        RevenueMeasure::UpSell,
        RevenueMeasure::DownSell,
        RevenueMeasure::Churn,
    ];

    pub const WATERFALL_ORDER: [RevenueMeasure; 6] = [
        RevenueMeasure::LastMonthRevenue,
        RevenueMeasure::NewBusiness,
        RevenueMeasure::UpSell,
        RevenueMeasure::DownSell,
        RevenueMeasure::Churn,
        RevenueMeasure::MonthlyRevenue,
    ];

    /// Sort key within a customer's ledger.
    pub fn ledger_rank(self) -> usize {
        Self::LEDGER_ORDER
            .iter()
            .position(|m| *m == self)
            .unwrap_or(Self::LEDGER_ORDER.len())
    }

    /// Sort key within the aggregated waterfall.
    pub fn waterfall_rank(self) -> usize {
        Self::WATERFALL_ORDER
            .iter()
            .position(|m| *m == self)
            .unwrap_or(Self::WATERFALL_ORDER.len())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RevenueMeasure::LastMonthRevenue => "lastMonthRevenue",
            RevenueMeasure::MonthlyRevenue => "monthlyRevenue",
            RevenueMeasure::NewBusiness => "newBusiness",
            RevenueMeasure::UpSell => "upSell",
            RevenueMeasure::DownSell => "downSell",
            RevenueMeasure::Churn => "churn",
        }
    }
}

impl fmt::Display for RevenueMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ratio rows derived from the waterfall. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RatioMeasure {
    GrossRenewalRate,
    NetRetentionRate,
    YearlyRevenueGrowth,
}

impl RatioMeasure {
    pub const ALL: [RatioMeasure; 3] = [
        RatioMeasure::GrossRenewalRate,
        RatioMeasure::NetRetentionRate,
        RatioMeasure::YearlyRevenueGrowth,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RatioMeasure::GrossRenewalRate => "grossRenewalRate",
            RatioMeasure::NetRetentionRate => "netRetentionRate",
            RatioMeasure::YearlyRevenueGrowth => "yearlyRevenueGrowth",
        }
    }
}

impl fmt::Display for RatioMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer-count measures. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogoMeasure {
    LastMonthRevenueLogo,
    NewBusinessLogo,
    ChurnLogo,
    MonthlyRevenueLogo,
}

impl LogoMeasure {
    pub const ALL: [LogoMeasure; 4] = [
        LogoMeasure::LastMonthRevenueLogo,
        LogoMeasure::NewBusinessLogo,
        LogoMeasure::ChurnLogo,
        LogoMeasure::MonthlyRevenueLogo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogoMeasure::LastMonthRevenueLogo => "lastMonthRevenueLogo",
            LogoMeasure::NewBusinessLogo => "newBusinessLogo",
            LogoMeasure::ChurnLogo => "churnLogo",
            LogoMeasure::MonthlyRevenueLogo => "monthlyRevenueLogo",
        }
    }
}

impl fmt::Display for LogoMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for a single engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    #[serde(default = "default_annualization_factor")]
    #[schemars(description = "Multiplier turning monthly figures into an annualized run-rate. Defaults to 12.")]
    pub annualization_factor: u32,

    #[serde(default = "default_trailing_window_months")]
    #[schemars(description = "Length of the trailing window used for renewal and retention ratios. Defaults to 12.")]
    pub trailing_window_months: u32,

    #[serde(default = "default_days_per_month")]
    #[schemars(description = "Days counted as one billing month when converting a contract duration into months. Defaults to 30.")]
    pub days_per_month: u32,

    #[serde(default = "default_revenue_decimal_places")]
    #[schemars(description = "Decimal places kept on each bucketed monthly revenue amount. Defaults to 2.")]
    pub revenue_decimal_places: u32,

    #[serde(default = "default_project_runoff_month")]
    #[schemars(description = "If true, the classified series extend one month past the last observed month whenever revenue is still active there, so contracts ending in the final month show their churn.")]
    pub project_runoff_month: bool,
}

fn default_annualization_factor() -> u32 {
    12
}

fn default_trailing_window_months() -> u32 {
    12
}

fn default_days_per_month() -> u32 {
    30
}

fn default_revenue_decimal_places() -> u32 {
    2
}

fn default_project_runoff_month() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            annualization_factor: default_annualization_factor(),
            trailing_window_months: default_trailing_window_months(),
            days_per_month: default_days_per_month(),
            revenue_decimal_places: default_revenue_decimal_places(),
            project_runoff_month: default_project_runoff_month(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.annualization_factor == 0 {
            return Err(ArrError::InvalidConfig(
                "annualization_factor must be at least 1".to_string(),
            ));
        }
        if self.trailing_window_months == 0 {
            return Err(ArrError::InvalidConfig(
                "trailing_window_months must be at least 1".to_string(),
            ));
        }
        if self.days_per_month == 0 {
            return Err(ArrError::InvalidConfig(
                "days_per_month must be at least 1".to_string(),
            ));
        }
        if self.revenue_decimal_places > 10 {
            return Err(ArrError::InvalidConfig(format!(
                "revenue_decimal_places must be at most 10 (got {})",
                self.revenue_decimal_places
            )));
        }
        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(EngineConfig)
    }
}
