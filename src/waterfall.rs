use crate::classifier::ClassifiedLedger;
use crate::month::Month;
use crate::retention::RetentionAnalyzer;
use crate::schema::{EngineConfig, MonthlySeries, RatioMeasure, RevenueMeasure};
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterfallRow {
    pub measure: RevenueMeasure,
    pub values: MonthlySeries,
}

/// A ratio row. `None` cells mean the ratio is undefined for that month, which
/// is not the same as 0%.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatioRow {
    pub measure: RatioMeasure,
    pub values: BTreeMap<Month, Option<Decimal>>,
}

/// Company-wide monthly bridge from opening to closing revenue, annualized.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedWaterfall {
    pub months: Vec<Month>,
    pub rows: Vec<WaterfallRow>,
    pub ratios: Vec<RatioRow>,
}

impl AggregatedWaterfall {
    pub fn series(&self, measure: RevenueMeasure) -> Option<&MonthlySeries> {
        self.rows
            .iter()
            .find(|r| r.measure == measure)
            .map(|r| &r.values)
    }

    pub fn value(&self, measure: RevenueMeasure, month: Month) -> Decimal {
        self.series(measure)
            .and_then(|s| s.get(&month))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn ratio(&self, measure: RatioMeasure, month: Month) -> Option<Decimal> {
        self.ratios
            .iter()
            .find(|r| r.measure == measure)
            .and_then(|r| r.values.get(&month).copied().flatten())
    }
}

pub struct WaterfallBuilder {
    annualization_factor: Decimal,
    retention: RetentionAnalyzer,
}

impl WaterfallBuilder {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            annualization_factor: Decimal::from(config.annualization_factor),
            retention: RetentionAnalyzer::new(config.trailing_window_months),
        }
    }

    /// Company totals per ledger measure and month, not annualized.
    pub fn aggregate(&self, ledger: &ClassifiedLedger) -> HashMap<RevenueMeasure, MonthlySeries> {
        let mut totals: HashMap<RevenueMeasure, MonthlySeries> = RevenueMeasure::LEDGER_ORDER
            .iter()
            .map(|measure| {
                let zeros: MonthlySeries = ledger.months.iter().map(|m| (*m, Decimal::ZERO)).collect();
                (*measure, zeros)
            })
            .collect();

        for row in &ledger.rows {
            let Some(series) = totals.get_mut(&row.measure) else {
                continue;
            };
            for (month, value) in &row.values {
                *series.entry(*month).or_insert(Decimal::ZERO) += *value;
            }
        }

        totals
    }

    pub fn build(&self, ledger: &ClassifiedLedger) -> AggregatedWaterfall {
        let mut totals = self.aggregate(ledger);

        let revenue = totals
            .get(&RevenueMeasure::MonthlyRevenue)
            .cloned()
            .unwrap_or_default();
        let opening: MonthlySeries = ledger
            .months
            .iter()
            .map(|m| {
                let prior = revenue.get(&m.pred()).copied().unwrap_or(Decimal::ZERO);
                (*m, prior)
            })
            .collect();
        totals.insert(RevenueMeasure::LastMonthRevenue, opening);

        let rows: Vec<WaterfallRow> = RevenueMeasure::WATERFALL_ORDER
            .iter()
            .map(|measure| {
                let values: MonthlySeries = totals
                    .remove(measure)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(m, v)| (m, v * self.annualization_factor))
                    .collect();
                WaterfallRow {
                    measure: *measure,
                    values,
                }
            })
            .collect();

        let ratios = self.retention.analyze(&ledger.months, &rows);

        debug!(
            "Built waterfall with {} rows and {} ratio rows over {} months",
            rows.len(),
            ratios.len(),
            ledger.months.len()
        );

        AggregatedWaterfall {
            months: ledger.months.clone(),
            rows,
            ratios,
        }
    }
}
