use crate::matrix::{chronology_key, RevenueMatrix};
use crate::month::Month;
use crate::schema::{CustomerKey, EngineConfig, MonthlySeries, RevenueMeasure};
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedRow {
    #[serde(flatten)]
    pub customer: CustomerKey,
    pub measure: RevenueMeasure,
    pub values: MonthlySeries,
}

/// Per-customer revenue ledger: each customer's monthly revenue followed by its
/// first-difference decomposition, customers in sales-chronology order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedLedger {
    pub months: Vec<Month>,
    pub rows: Vec<ClassifiedRow>,
}

impl ClassifiedLedger {
    pub fn rows_for<'a>(&'a self, customer: &'a CustomerKey) -> impl Iterator<Item = &'a ClassifiedRow> + 'a {
        self.rows.iter().filter(move |r| &r.customer == customer)
    }

    pub fn series(&self, customer: &CustomerKey, measure: RevenueMeasure) -> Option<&MonthlySeries> {
        self.rows
            .iter()
            .find(|r| &r.customer == customer && r.measure == measure)
            .map(|r| &r.values)
    }

    pub fn customer_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.measure == RevenueMeasure::MonthlyRevenue)
            .count()
    }
}

/// Attributes the change from `prev` to `current` to exactly one movement.
///
/// Returns `None` when nothing changed.
pub fn classify_change(prev: Decimal, current: Decimal) -> Option<(RevenueMeasure, Decimal)> {
    let delta = current - prev;

    if prev.is_zero() {
        if current.is_zero() {
            None
        } else {
            Some((RevenueMeasure::NewBusiness, current))
        }
    } else if delta > Decimal::ZERO {
        Some((RevenueMeasure::UpSell, delta))
    } else if delta < Decimal::ZERO {
        if current.is_zero() {
            Some((RevenueMeasure::Churn, delta))
        } else {
            Some((RevenueMeasure::DownSell, delta))
        }
    } else {
        None
    }
}

pub struct TransitionClassifier {
    project_runoff_month: bool,
}

impl TransitionClassifier {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            project_runoff_month: config.project_runoff_month,
        }
    }

    /// Months the ledger covers: the matrix range, plus one run-off month when
    /// enabled and any customer still has revenue in the final month.
    pub fn horizon(&self, matrix: &RevenueMatrix) -> Vec<Month> {
        let (first, last) = match (matrix.months.iter().min(), matrix.months.iter().max()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Vec::new(),
        };

        let mut months = Month::range_inclusive(first, last);
        let active_at_end = matrix.rows.iter().any(|r| !r.value_at(last).is_zero());
        if self.project_runoff_month && active_at_end {
            debug!("Revenue still active in {}, extending horizon to {}", last, last.succ());
            months.push(last.succ());
        }
        months
    }

    pub fn classify(&self, matrix: &RevenueMatrix) -> ClassifiedLedger {
        let months = self.horizon(matrix);

        let mut ledgers = Vec::with_capacity(matrix.rows.len());
        for row in &matrix.rows {
            let mut ledger: HashMap<RevenueMeasure, MonthlySeries> = HashMap::new();
            let zeros: MonthlySeries = months.iter().map(|m| (*m, Decimal::ZERO)).collect();
            for measure in RevenueMeasure::LEDGER_ORDER {
                ledger.insert(measure, zeros.clone());
            }

            for &month in &months {
                let current = row.value_at(month);
                let prev = row.value_at(month.pred());

                if let Some(series) = ledger.get_mut(&RevenueMeasure::MonthlyRevenue) {
                    series.insert(month, current);
                }
                if let Some((measure, amount)) = classify_change(prev, current) {
                    if let Some(series) = ledger.get_mut(&measure) {
                        series.insert(month, amount);
                    }
                }
            }

            let revenue = ledger
                .get(&RevenueMeasure::MonthlyRevenue)
                .cloned()
                .unwrap_or_default();
            let key = chronology_key(&row.customer, &revenue);
            ledgers.push((key, row.customer.clone(), ledger));
        }

        ledgers.sort_by(|a, b| a.0.cmp(&b.0));

        let mut rows = Vec::new();
        for (_, customer, mut ledger) in ledgers {
            for measure in RevenueMeasure::LEDGER_ORDER {
                let Some(values) = ledger.remove(&measure) else {
                    continue;
                };
                let keep = measure == RevenueMeasure::MonthlyRevenue
                    || values.values().any(|v| !v.is_zero());
                if keep {
                    rows.push(ClassifiedRow {
                        customer: customer.clone(),
                        measure,
                        values,
                    });
                }
            }
        }

        debug!(
            "Classified {} customers into {} ledger rows over {} months",
            matrix.rows.len(),
            rows.len(),
            months.len()
        );

        ClassifiedLedger { months, rows }
    }
}
