use crate::error::{ArrError, Result};
use crate::logo::LogoWaterfall;
use crate::schema::{Contract, LogoMeasure, MonthlyRevenueFact, RevenueMeasure};
use crate::waterfall::AggregatedWaterfall;
use log::debug;
use rust_decimal::Decimal;

/// Movement rows that bridge opening revenue to closing revenue.
const MOVEMENTS: [RevenueMeasure; 4] = [
    RevenueMeasure::NewBusiness,
    RevenueMeasure::UpSell,
    RevenueMeasure::DownSell,
    RevenueMeasure::Churn,
];

/// Checks the bookkeeping identities that every engine output must satisfy.
pub struct WaterfallBalancer {
    tolerance: Decimal,
}

impl WaterfallBalancer {
    pub fn new(tolerance: Decimal) -> Self {
        Self {
            tolerance: tolerance.abs(),
        }
    }

    /// Amortized facts for one contract must sum back to its total value,
    /// up to the rounding tolerance.
    pub fn verify_conservation(&self, contract: &Contract, facts: &[MonthlyRevenueFact]) -> Result<()> {
        let total: Decimal = facts.iter().map(|f| f.monthly_revenue).sum();
        let difference = (total - contract.total_contract_value).abs();

        if difference > self.tolerance {
            let contract_id = facts
                .first()
                .map(|f| f.contract_id.clone())
                .or_else(|| contract.contract_id.clone())
                .unwrap_or_else(|| contract.customer_id.clone());
            return Err(ArrError::ConservationViolation {
                contract_id,
                expected: contract.total_contract_value.to_string(),
                actual: total.to_string(),
            });
        }
        Ok(())
    }

    /// `lastMonthRevenue + newBusiness + upSell + downSell + churn == monthlyRevenue`
    /// for every month of the waterfall.
    pub fn verify_waterfall_balance(&self, waterfall: &AggregatedWaterfall) -> Result<()> {
        for &month in &waterfall.months {
            let opening = waterfall.value(RevenueMeasure::LastMonthRevenue, month);
            let movements: Decimal = MOVEMENTS
                .iter()
                .map(|measure| waterfall.value(*measure, month))
                .sum();
            let closing = waterfall.value(RevenueMeasure::MonthlyRevenue, month);

            if (opening + movements - closing).abs() > self.tolerance {
                return Err(ArrError::WaterfallImbalance {
                    month: month.to_string(),
                    opening: opening.to_string(),
                    movements: movements.to_string(),
                    closing: closing.to_string(),
                });
            }
        }

        debug!("Waterfall balances across {} months", waterfall.months.len());
        Ok(())
    }

    /// Same identity for customer counts, which must hold exactly.
    pub fn verify_logo_balance(&self, logos: &LogoWaterfall) -> Result<()> {
        for &month in &logos.months {
            let opening = logos.count(LogoMeasure::LastMonthRevenueLogo, month);
            let movements = logos.count(LogoMeasure::NewBusinessLogo, month)
                + logos.count(LogoMeasure::ChurnLogo, month);
            let closing = logos.count(LogoMeasure::MonthlyRevenueLogo, month);

            if opening + movements != closing {
                return Err(ArrError::WaterfallImbalance {
                    month: month.to_string(),
                    opening: opening.to_string(),
                    movements: movements.to_string(),
                    closing: closing.to_string(),
                });
            }
        }
        Ok(())
    }
}

pub fn verify_conservation(
    contract: &Contract,
    facts: &[MonthlyRevenueFact],
    tolerance: Decimal,
) -> Result<()> {
    WaterfallBalancer::new(tolerance).verify_conservation(contract, facts)
}

pub fn verify_waterfall_balance(waterfall: &AggregatedWaterfall, tolerance: Decimal) -> Result<()> {
    WaterfallBalancer::new(tolerance).verify_waterfall_balance(waterfall)
}

pub fn verify_logo_balance(logos: &LogoWaterfall) -> Result<()> {
    WaterfallBalancer::new(Decimal::ZERO).verify_logo_balance(logos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logo::LogoRow;
    use crate::month::Month;
    use crate::waterfall::WaterfallRow;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn month(s: &str) -> Month {
        s.parse().unwrap()
    }

    fn contract(value: Decimal) -> Contract {
        Contract {
            customer_id: "C1".to_string(),
            customer_name: "Acme".to_string(),
            contract_id: Some("K1".to_string()),
            contract_start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            contract_end_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            total_contract_value: value,
        }
    }

    fn facts(amounts: &[Decimal]) -> Vec<MonthlyRevenueFact> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| MonthlyRevenueFact {
                customer_id: "C1".to_string(),
                customer_name: "Acme".to_string(),
                contract_id: "K1".to_string(),
                month: month("2024-01").add_months(i as i32),
                monthly_revenue: *amount,
            })
            .collect()
    }

    fn waterfall(rows: Vec<(RevenueMeasure, Decimal)>) -> AggregatedWaterfall {
        let m = month("2024-03");
        AggregatedWaterfall {
            months: vec![m],
            rows: rows
                .into_iter()
                .map(|(measure, value)| WaterfallRow {
                    measure,
                    values: [(m, value)].into_iter().collect(),
                })
                .collect(),
            ratios: Vec::new(),
        }
    }

    #[test]
    fn test_conservation_within_rounding() {
        let c = contract(dec!(10000));
        let f = facts(&[dec!(3333.33), dec!(3333.33), dec!(3333.33)]);
        assert!(verify_conservation(&c, &f, dec!(0.05)).is_ok());
        assert!(verify_conservation(&c, &f, dec!(0.001)).is_err());
    }

    #[test]
    fn test_conservation_violation_reports_totals() {
        let c = contract(dec!(9000));
        let f = facts(&[dec!(3000), dec!(3000)]);
        let err = verify_conservation(&c, &f, dec!(0.01)).unwrap_err();
        match &err {
            ArrError::ConservationViolation {
                contract_id,
                expected,
                actual,
            } => {
                assert_eq!(contract_id, "K1");
                assert_eq!(expected, "9000");
                assert_eq!(actual, "6000");
            }
            other => panic!("expected conservation violation, got {:?}", other),
        }
        assert!(!err.to_string().contains("movements"));
    }

    #[test]
    fn test_balanced_waterfall() {
        let w = waterfall(vec![
            (RevenueMeasure::LastMonthRevenue, dec!(1000)),
            (RevenueMeasure::NewBusiness, dec!(200)),
            (RevenueMeasure::UpSell, dec!(50)),
            (RevenueMeasure::DownSell, dec!(-30)),
            (RevenueMeasure::Churn, dec!(-100)),
            (RevenueMeasure::MonthlyRevenue, dec!(1120)),
        ]);
        assert!(verify_waterfall_balance(&w, Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_unbalanced_waterfall() {
        let w = waterfall(vec![
            (RevenueMeasure::LastMonthRevenue, dec!(1000)),
            (RevenueMeasure::NewBusiness, dec!(200)),
            (RevenueMeasure::MonthlyRevenue, dec!(1100)),
        ]);
        let err = verify_waterfall_balance(&w, dec!(0.01)).unwrap_err();
        assert!(matches!(err, ArrError::WaterfallImbalance { .. }));
        assert!(err.to_string().contains("2024-03"));
    }

    #[test]
    fn test_logo_balance() {
        let m = month("2024-03");
        let row = |measure, count| LogoRow {
            measure,
            values: [(m, count)].into_iter().collect(),
        };
        let mut logos = LogoWaterfall {
            months: vec![m],
            rows: vec![
                row(LogoMeasure::LastMonthRevenueLogo, 5),
                row(LogoMeasure::NewBusinessLogo, 2),
                row(LogoMeasure::ChurnLogo, -1),
                row(LogoMeasure::MonthlyRevenueLogo, 6),
            ],
        };
        assert!(verify_logo_balance(&logos).is_ok());

        logos.rows[3] = row(LogoMeasure::MonthlyRevenueLogo, 7);
        assert!(verify_logo_balance(&logos).is_err());
    }
}
