use crate::error::{ArrError, Result};
use crate::logo::LogoWaterfall;
use crate::matrix::RevenueMatrix;
use crate::month::Month;
use crate::schema::{CustomerKey, LogoMeasure, RatioMeasure, RevenueMeasure};
use crate::waterfall::AggregatedWaterfall;
use chrono::NaiveDate;
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// The month to report on: the calendar month before `today` when the series
/// covers it, otherwise the latest month available.
pub fn reporting_month(months: &[Month], today: NaiveDate) -> Result<Month> {
    let latest = months
        .iter()
        .max()
        .copied()
        .ok_or_else(|| ArrError::EmptyDataset("No months to report on".to_string()))?;

    let previous = Month::from_date(today).pred();
    if months.contains(&previous) {
        Ok(previous)
    } else {
        debug!("{} not in series, reporting on {}", previous, latest);
        Ok(latest)
    }
}

/// Headline figures for a single month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreMetrics {
    pub month: Month,
    pub arr: Decimal,
    pub yearly_revenue_growth: Option<Decimal>,
    pub new_logos: i64,
    pub new_logo_growth: Option<Decimal>,
    /// Positive count of customers lost over the window.
    pub churned_logos: i64,
    pub churned_logo_growth: Option<Decimal>,
    pub net_retention_rate: Option<Decimal>,
    pub gross_renewal_rate: Option<Decimal>,
}

impl CoreMetrics {
    pub fn for_month(
        waterfall: &AggregatedWaterfall,
        logos: &LogoWaterfall,
        month: Month,
        window: u32,
    ) -> Result<Self> {
        if waterfall.months.is_empty() {
            return Err(ArrError::EmptyDataset(
                "Waterfall has no months".to_string(),
            ));
        }
        if !waterfall.months.contains(&month) {
            return Err(ArrError::DateError(format!(
                "{} is outside the waterfall ({} to {})",
                month,
                waterfall.months[0],
                waterfall.months[waterfall.months.len() - 1]
            )));
        }

        let window = window.max(1);
        let prior_month = month.add_months(-(window as i32));

        let new_logos = logos.trailing_total(LogoMeasure::NewBusinessLogo, month, window);
        let prior_new_logos = logos.trailing_total(LogoMeasure::NewBusinessLogo, prior_month, window);
        let churned_logos = -logos.trailing_total(LogoMeasure::ChurnLogo, month, window);
        let prior_churned_logos = -logos.trailing_total(LogoMeasure::ChurnLogo, prior_month, window);

        Ok(Self {
            month,
            arr: waterfall.value(RevenueMeasure::MonthlyRevenue, month),
            yearly_revenue_growth: waterfall.ratio(RatioMeasure::YearlyRevenueGrowth, month),
            new_logos,
            new_logo_growth: window_growth(new_logos, prior_new_logos),
            churned_logos,
            churned_logo_growth: window_growth(churned_logos, prior_churned_logos),
            net_retention_rate: waterfall.ratio(RatioMeasure::NetRetentionRate, month),
            gross_renewal_rate: waterfall.ratio(RatioMeasure::GrossRenewalRate, month),
        })
    }
}

/// `current / prior - 1`, undefined when there is nothing to compare against.
fn window_growth(current: i64, prior: i64) -> Option<Decimal> {
    if prior == 0 {
        return None;
    }
    Decimal::from(current)
        .checked_div(Decimal::from(prior))
        .map(|r| r - Decimal::ONE)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRevenue {
    #[serde(flatten)]
    pub customer: CustomerKey,
    pub lifetime_revenue: Decimal,
}

/// The `n` customers with the largest lifetime revenue.
pub fn top_customers(matrix: &RevenueMatrix, n: usize) -> Vec<CustomerRevenue> {
    let mut ranked: Vec<CustomerRevenue> = matrix
        .rows
        .iter()
        .map(|r| CustomerRevenue {
            customer: r.customer.clone(),
            lifetime_revenue: r.total(),
        })
        .collect();
    ranked.sort_by(|a, b| {
        Reverse(a.lifetime_revenue)
            .cmp(&Reverse(b.lifetime_revenue))
            .then_with(|| a.customer.cmp(&b.customer))
    });
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logo::LogoRow;
    use crate::matrix::MatrixRow;
    use crate::waterfall::{RatioRow, WaterfallRow};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn month(s: &str) -> Month {
        s.parse().unwrap()
    }

    #[test]
    fn test_reporting_month() {
        let months = Month::range_inclusive(month("2024-01"), month("2024-06"));
        let today = NaiveDate::from_ymd_opt(2024, 4, 15).unwrap();
        assert_eq!(reporting_month(&months, today).unwrap(), month("2024-03"));

        let later = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        assert_eq!(reporting_month(&months, later).unwrap(), month("2024-06"));

        assert!(matches!(
            reporting_month(&[], today),
            Err(ArrError::EmptyDataset(_))
        ));
    }

    fn logos(new: &[i64], churn: &[i64], start: Month) -> LogoWaterfall {
        let months = Month::range_inclusive(start, start.add_months(new.len() as i32 - 1));
        let series = |counts: &[i64]| -> BTreeMap<Month, i64> {
            months.iter().copied().zip(counts.iter().copied()).collect()
        };
        LogoWaterfall {
            months: months.clone(),
            rows: vec![
                LogoRow {
                    measure: LogoMeasure::NewBusinessLogo,
                    values: series(new),
                },
                LogoRow {
                    measure: LogoMeasure::ChurnLogo,
                    values: series(churn),
                },
            ],
        }
    }

    #[test]
    fn test_core_metrics() {
        let start = month("2023-01");
        let months = Month::range_inclusive(start, month("2024-12"));
        let m = month("2024-12");

        let waterfall = AggregatedWaterfall {
            months: months.clone(),
            rows: vec![WaterfallRow {
                measure: RevenueMeasure::MonthlyRevenue,
                values: [(m, dec!(120000))].into_iter().collect(),
            }],
            ratios: vec![
                RatioRow {
                    measure: RatioMeasure::NetRetentionRate,
                    values: [(m, Some(dec!(1.05)))].into_iter().collect(),
                },
                RatioRow {
                    measure: RatioMeasure::YearlyRevenueGrowth,
                    values: [(m, None)].into_iter().collect(),
                },
            ],
        };

        // Two new logos a month in the first year, three in the second.
        let mut new = vec![2; 12];
        new.extend(vec![3; 12]);
        let mut churn = vec![0; 12];
        churn.extend(vec![-1; 12]);
        let logos = logos(&new, &churn, start);

        let metrics = CoreMetrics::for_month(&waterfall, &logos, m, 12).unwrap();
        assert_eq!(metrics.arr, dec!(120000));
        assert_eq!(metrics.yearly_revenue_growth, None);
        assert_eq!(metrics.new_logos, 36);
        assert_eq!(metrics.new_logo_growth, Some(dec!(0.5)));
        assert_eq!(metrics.churned_logos, 12);
        assert_eq!(metrics.churned_logo_growth, None);
        assert_eq!(metrics.net_retention_rate, Some(dec!(1.05)));
        assert_eq!(metrics.gross_renewal_rate, None);
    }

    #[test]
    fn test_core_metrics_errors() {
        let logos = LogoWaterfall::default();
        let empty = AggregatedWaterfall::default();
        assert!(matches!(
            CoreMetrics::for_month(&empty, &logos, month("2024-01"), 12),
            Err(ArrError::EmptyDataset(_))
        ));

        let waterfall = AggregatedWaterfall {
            months: vec![month("2024-01")],
            ..AggregatedWaterfall::default()
        };
        assert!(matches!(
            CoreMetrics::for_month(&waterfall, &logos, month("2024-02"), 12),
            Err(ArrError::DateError(_))
        ));
    }

    #[test]
    fn test_top_customers() {
        let m = month("2024-01");
        let row = |id: &str, v: Decimal| MatrixRow {
            customer: CustomerKey::new(id, id),
            values: [(m, v), (m.succ(), v)].into_iter().collect(),
        };
        let matrix = RevenueMatrix {
            months: vec![m, m.succ()],
            rows: vec![row("C", dec!(10)), row("A", dec!(50)), row("B", dec!(50))],
        };

        let top = top_customers(&matrix, 2);
        let ids: Vec<&str> = top.iter().map(|c| c.customer.customer_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(top[0].lifetime_revenue, dec!(100));
        assert!(top_customers(&matrix, 0).is_empty());
    }
}
