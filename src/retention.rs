use crate::month::Month;
use crate::schema::{MonthlySeries, RatioMeasure, RevenueMeasure};
use crate::waterfall::{RatioRow, WaterfallRow};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Offset of the comparison month for year-over-year ratios.
pub const YEAR_LAG_MONTHS: i32 = 12;

/// Sum of `series` over the `window` months ending at `month`. Months outside
/// the series are skipped, so early months use whatever history exists.
pub fn trailing_sum(series: &MonthlySeries, month: Month, window: u32) -> Decimal {
    month
        .trailing(window)
        .iter()
        .filter_map(|m| series.get(m))
        .copied()
        .sum()
}

/// Value `lag` months before `month`, or `None` when unavailable or zero.
pub fn lagged_value(series: &MonthlySeries, month: Month, lag: i32) -> Option<Decimal> {
    series
        .get(&month.add_months(-lag))
        .copied()
        .filter(|v| !v.is_zero())
}

/// Trailing renewal, retention and growth ratios over a waterfall.
pub struct RetentionAnalyzer {
    window: u32,
}

impl RetentionAnalyzer {
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
        }
    }

    /// Gross renewal, net retention and yearly growth per month, in that row order.
    pub fn analyze(&self, months: &[Month], rows: &[WaterfallRow]) -> Vec<RatioRow> {
        let empty = MonthlySeries::new();
        let series = |measure: RevenueMeasure| {
            rows.iter()
                .find(|r| r.measure == measure)
                .map(|r| &r.values)
                .unwrap_or(&empty)
        };
        let up_sell = series(RevenueMeasure::UpSell);
        let down_sell = series(RevenueMeasure::DownSell);
        let churn = series(RevenueMeasure::Churn);
        let revenue = series(RevenueMeasure::MonthlyRevenue);

        let mut gross = BTreeMap::new();
        let mut net = BTreeMap::new();
        let mut growth = BTreeMap::new();

        for &month in months {
            let lost = trailing_sum(down_sell, month, self.window)
                + trailing_sum(churn, month, self.window);
            let expanded = trailing_sum(up_sell, month, self.window);
            let prev_year = lagged_value(revenue, month, YEAR_LAG_MONTHS);
            let current = revenue.get(&month).copied().unwrap_or(Decimal::ZERO);

            let ratio = |numerator: Decimal| prev_year.and_then(|p| numerator.checked_div(p));

            gross.insert(month, ratio(lost).map(|r| Decimal::ONE + r));
            net.insert(month, ratio(lost + expanded).map(|r| Decimal::ONE + r));
            growth.insert(month, ratio(current).map(|r| r - Decimal::ONE));
        }

        vec![
            RatioRow {
                measure: RatioMeasure::GrossRenewalRate,
                values: gross,
            },
            RatioRow {
                measure: RatioMeasure::NetRetentionRate,
                values: net,
            },
            RatioRow {
                measure: RatioMeasure::YearlyRevenueGrowth,
                values: growth,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn month(s: &str) -> Month {
        s.parse().unwrap()
    }

    fn series_from(start: &str, values: &[Decimal]) -> MonthlySeries {
        let start = month(start);
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (start.add_months(i as i32), *v))
            .collect()
    }

    fn row(measure: RevenueMeasure, values: MonthlySeries) -> WaterfallRow {
        WaterfallRow { measure, values }
    }

    #[test]
    fn test_trailing_sum_uses_available_history() {
        let s = series_from("2024-01", &[dec!(1), dec!(2), dec!(3)]);
        assert_eq!(trailing_sum(&s, month("2024-01"), 12), dec!(1));
        assert_eq!(trailing_sum(&s, month("2024-03"), 12), dec!(6));
        assert_eq!(trailing_sum(&s, month("2024-03"), 2), dec!(5));
    }

    #[test]
    fn test_lagged_value() {
        let s = series_from("2023-01", &[dec!(0), dec!(10)]);
        assert_eq!(lagged_value(&s, month("2024-02"), 12), Some(dec!(10)));
        assert_eq!(lagged_value(&s, month("2024-01"), 12), None);
        assert_eq!(lagged_value(&s, month("2024-03"), 12), None);
    }

    #[test]
    fn test_ratios_null_for_first_year() {
        let months = Month::range_inclusive(month("2024-01"), month("2024-12"));
        let revenue: MonthlySeries = months.iter().map(|m| (*m, dec!(100))).collect();
        let rows = vec![row(RevenueMeasure::MonthlyRevenue, revenue)];

        let ratios = RetentionAnalyzer::new(12).analyze(&months, &rows);
        assert_eq!(ratios.len(), 3);
        for r in &ratios {
            assert!(r.values.values().all(|v| v.is_none()), "{} should be null", r.measure);
        }
    }

    #[test]
    fn test_ratios_after_a_year() {
        let months = Month::range_inclusive(month("2023-01"), month("2024-01"));
        let mut revenue = MonthlySeries::new();
        let mut down_sell = MonthlySeries::new();
        let mut churn = MonthlySeries::new();
        let mut up_sell = MonthlySeries::new();
        for m in &months {
            revenue.insert(*m, dec!(1000));
            down_sell.insert(*m, Decimal::ZERO);
            churn.insert(*m, Decimal::ZERO);
            up_sell.insert(*m, Decimal::ZERO);
        }
        // Within the trailing year ending 2024-01.
        down_sell.insert(month("2023-06"), dec!(-50));
        churn.insert(month("2023-09"), dec!(-100));
        up_sell.insert(month("2023-11"), dec!(250));
        revenue.insert(month("2024-01"), dec!(1100));
        // Outside the window.
        churn.insert(month("2023-01"), dec!(-999));

        let rows = vec![
            row(RevenueMeasure::UpSell, up_sell),
            row(RevenueMeasure::DownSell, down_sell),
            row(RevenueMeasure::Churn, churn),
            row(RevenueMeasure::MonthlyRevenue, revenue),
        ];
        let ratios = RetentionAnalyzer::new(12).analyze(&months, &rows);
        let at = |measure: RatioMeasure| {
            ratios
                .iter()
                .find(|r| r.measure == measure)
                .and_then(|r| r.values.get(&month("2024-01")).copied().flatten())
        };

        assert_eq!(at(RatioMeasure::GrossRenewalRate), Some(dec!(0.85)));
        assert_eq!(at(RatioMeasure::NetRetentionRate), Some(dec!(1.10)));
        assert_eq!(at(RatioMeasure::YearlyRevenueGrowth), Some(dec!(0.1)));
    }

    #[test]
    fn test_zero_prior_revenue_is_null() {
        let months = Month::range_inclusive(month("2023-01"), month("2024-01"));
        let mut revenue: MonthlySeries = months.iter().map(|m| (*m, dec!(500))).collect();
        revenue.insert(month("2023-01"), Decimal::ZERO);
        let rows = vec![row(RevenueMeasure::MonthlyRevenue, revenue)];

        let ratios = RetentionAnalyzer::new(12).analyze(&months, &rows);
        let growth = &ratios[2];
        assert_eq!(growth.values.get(&month("2024-01")), Some(&None));
    }
}
