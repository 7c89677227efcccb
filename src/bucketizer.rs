use crate::error::{ArrError, Result};
use crate::month::Month;
use crate::schema::{Contract, EngineConfig, MonthlyRevenueFact};
use log::{debug, warn};
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Expands contracts into evenly amortized monthly revenue facts.
pub struct Bucketizer {
    days_per_month: i64,
    decimal_places: u32,
}

impl Bucketizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            days_per_month: i64::from(config.days_per_month.max(1)),
            decimal_places: config.revenue_decimal_places,
        }
    }

    /// Billing months covered by a contract of `duration_days`.
    ///
    /// `round(days / days_per_month + 0.01)`, evaluated in integers as
    /// `floor((100 * days + 51 * dpm) / (100 * dpm))`, floored at one month.
    pub fn contract_months(&self, duration_days: i64) -> i64 {
        let dpm = self.days_per_month;
        let months = (100 * duration_days + 51 * dpm).div_euclid(100 * dpm);
        months.max(1)
    }

    pub fn bucketize(&self, contracts: &[Contract]) -> Result<Vec<MonthlyRevenueFact>> {
        let contract_ids = resolve_contract_ids(contracts);
        let mut facts = Vec::new();

        for (contract, contract_id) in contracts.iter().zip(contract_ids) {
            let duration = contract.duration_days();
            if duration <= 0 {
                return Err(ArrError::InvalidDuration {
                    contract_id,
                    start: contract.contract_start_date,
                    end: contract.contract_end_date,
                });
            }

            if contract.total_contract_value < Decimal::ZERO {
                return Err(ArrError::InvalidAmount {
                    context: format!("contract {}", contract_id),
                    value: contract.total_contract_value.to_string(),
                });
            }

            let months = self.contract_months(duration);
            let monthly_revenue = (contract.total_contract_value / Decimal::from(months))
                .round_dp(self.decimal_places);
            let first_month = Month::from_date(contract.contract_start_date);

            debug!(
                "Contract {} spans {} days -> {} months at {} per month",
                contract_id, duration, months, monthly_revenue
            );

            for k in 0..months {
                facts.push(MonthlyRevenueFact {
                    customer_id: contract.customer_id.clone(),
                    customer_name: contract.customer_name.clone(),
                    contract_id: contract_id.clone(),
                    month: first_month.add_months(k as i32),
                    monthly_revenue,
                });
            }
        }

        Ok(facts)
    }
}

/// Assigns every contract a unique id.
///
/// Missing, blank or already-seen ids are replaced by `{customerId}-{rowIndex}`.
pub fn resolve_contract_ids(contracts: &[Contract]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut ids = Vec::with_capacity(contracts.len());

    for (idx, contract) in contracts.iter().enumerate() {
        let candidate = contract
            .contract_id
            .as_ref()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        let id = match candidate {
            Some(id) if !seen.contains(&id) => id,
            Some(id) => {
                warn!(
                    "Duplicate contract id '{}' at row {}, synthesizing a new one",
                    id, idx
                );
                synthesize_id(&contract.customer_id, idx, &seen)
            }
            None => synthesize_id(&contract.customer_id, idx, &seen),
        };

        seen.insert(id.clone());
        ids.push(id);
    }

    ids
}

fn synthesize_id(customer_id: &str, row_index: usize, seen: &HashSet<String>) -> String {
    let mut id = format!("{}-{}", customer_id, row_index);
    let mut suffix = 1;
    while seen.contains(&id) {
        id = format!("{}-{}-{}", customer_id, row_index, suffix);
        suffix += 1;
    }
    id
}

pub fn bucketize(contracts: &[Contract]) -> Result<Vec<MonthlyRevenueFact>> {
    Bucketizer::new(&EngineConfig::default()).bucketize(contracts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn contract(id: Option<&str>, start: (i32, u32, u32), end: (i32, u32, u32), value: i64) -> Contract {
        Contract {
            customer_id: "C1".to_string(),
            customer_name: "Acme".to_string(),
            contract_id: id.map(|s| s.to_string()),
            contract_start_date: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            contract_end_date: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
            total_contract_value: Decimal::from(value),
        }
    }

    #[test]
    fn test_contract_months_rounding() {
        let b = Bucketizer::new(&EngineConfig::default());
        assert_eq!(b.contract_months(90), 3);
        assert_eq!(b.contract_months(91), 3);
        assert_eq!(b.contract_months(365), 12);
        assert_eq!(b.contract_months(45), 2);
        assert_eq!(b.contract_months(44), 1);
        assert_eq!(b.contract_months(1), 1);
    }

    #[test]
    fn test_quarter_contract_scenario() {
        let facts = bucketize(&[contract(Some("K1"), (2024, 1, 1), (2024, 4, 1), 9000)]).unwrap();
        assert_eq!(facts.len(), 3);
        let months: Vec<String> = facts.iter().map(|f| f.month.to_string()).collect();
        assert_eq!(months, vec!["2024-01", "2024-02", "2024-03"]);
        assert!(facts.iter().all(|f| f.monthly_revenue == Decimal::from(3000)));
        assert!(facts.iter().all(|f| f.contract_id == "K1"));
    }

    #[test]
    fn test_conservation_within_rounding() {
        let c = contract(None, (2023, 3, 15), (2024, 3, 15), 10_000);
        let facts = bucketize(&[c.clone()]).unwrap();
        assert_eq!(facts.len(), 12);
        let total: Decimal = facts.iter().map(|f| f.monthly_revenue).sum();
        let tolerance = Decimal::new(1, 2) * Decimal::from(facts.len() as i64);
        assert!((total - c.total_contract_value).abs() <= tolerance);
        assert_eq!(facts[0].monthly_revenue, Decimal::new(83333, 2));
    }

    #[test]
    fn test_invalid_duration() {
        let err = bucketize(&[contract(Some("K1"), (2024, 4, 1), (2024, 4, 1), 100)]).unwrap_err();
        assert!(matches!(err, ArrError::InvalidDuration { .. }));
    }

    #[test]
    fn test_negative_amount() {
        let err = bucketize(&[contract(Some("K1"), (2024, 1, 1), (2024, 2, 1), -5)]).unwrap_err();
        assert!(matches!(err, ArrError::InvalidAmount { .. }));
    }

    #[test]
    fn test_contract_id_synthesis() {
        let contracts = vec![
            contract(Some("K1"), (2024, 1, 1), (2024, 2, 1), 100),
            contract(Some("K1"), (2024, 1, 1), (2024, 2, 1), 100),
            contract(None, (2024, 1, 1), (2024, 2, 1), 100),
            contract(Some("  "), (2024, 1, 1), (2024, 2, 1), 100),
        ];
        let ids = resolve_contract_ids(&contracts);
        assert_eq!(ids, vec!["K1", "C1-1", "C1-2", "C1-3"]);
    }

    #[test]
    fn test_short_contract_gets_one_month() {
        let facts = bucketize(&[contract(Some("K1"), (2024, 1, 10), (2024, 1, 20), 500)]).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].monthly_revenue, Decimal::from(500));
    }
}
