use crate::classifier::ClassifiedLedger;
use crate::month::Month;
use crate::schema::{CustomerKey, LogoMeasure, RevenueMeasure};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoRow {
    pub measure: LogoMeasure,
    pub values: BTreeMap<Month, i64>,
}

/// Month-over-month bridge of distinct customer counts. Churned logos are
/// stored as negative counts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoWaterfall {
    pub months: Vec<Month>,
    pub rows: Vec<LogoRow>,
}

impl LogoWaterfall {
    pub fn count(&self, measure: LogoMeasure, month: Month) -> i64 {
        self.rows
            .iter()
            .find(|r| r.measure == measure)
            .and_then(|r| r.values.get(&month))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of `measure` over the `window` months ending at `month`.
    pub fn trailing_total(&self, measure: LogoMeasure, month: Month, window: u32) -> i64 {
        month
            .trailing(window)
            .into_iter()
            .map(|m| self.count(measure, m))
            .sum()
    }
}

fn logo_measure_for(measure: RevenueMeasure) -> Option<LogoMeasure> {
    match measure {
        RevenueMeasure::MonthlyRevenue => Some(LogoMeasure::MonthlyRevenueLogo),
        RevenueMeasure::NewBusiness => Some(LogoMeasure::NewBusinessLogo),
        RevenueMeasure::Churn => Some(LogoMeasure::ChurnLogo),
        _ => None,
    }
}

pub fn build_logo_waterfall(ledger: &ClassifiedLedger) -> LogoWaterfall {
    let mut customers: BTreeMap<LogoMeasure, BTreeMap<Month, BTreeSet<&CustomerKey>>> =
        BTreeMap::new();

    for row in &ledger.rows {
        let Some(logo_measure) = logo_measure_for(row.measure) else {
            continue;
        };
        let by_month = customers.entry(logo_measure).or_default();
        for (month, value) in &row.values {
            if !value.is_zero() {
                by_month.entry(*month).or_default().insert(&row.customer);
            }
        }
    }

    let count = |measure: LogoMeasure, month: Month| -> i64 {
        customers
            .get(&measure)
            .and_then(|by_month| by_month.get(&month))
            .map(|set| set.len() as i64)
            .unwrap_or(0)
    };

    let rows = LogoMeasure::ALL
        .iter()
        .map(|measure| {
            let values: BTreeMap<Month, i64> = ledger
                .months
                .iter()
                .map(|m| {
                    let value = match measure {
                        LogoMeasure::LastMonthRevenueLogo => {
                            count(LogoMeasure::MonthlyRevenueLogo, m.pred())
                        }
                        LogoMeasure::ChurnLogo => -count(LogoMeasure::ChurnLogo, *m),
                        other => count(*other, *m),
                    };
                    (*m, value)
                })
                .collect();
            LogoRow {
                measure: *measure,
                values,
            }
        })
        .collect();

    debug!("Built logo waterfall over {} months", ledger.months.len());

    LogoWaterfall {
        months: ledger.months.clone(),
        rows,
    }
}
