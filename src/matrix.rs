use crate::error::{ArrError, Result};
use crate::month::Month;
use crate::schema::{CustomerKey, MonthlyRevenueFact, MonthlySeries};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

pub const CUSTOMER_ID_COLUMN: &str = "customerId";
pub const CUSTOMER_NAME_COLUMN: &str = "customerName";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixRow {
    #[serde(flatten)]
    pub customer: CustomerKey,
    pub values: MonthlySeries,
}

impl MatrixRow {
    /// Value in `month`, with absent cells read as zero.
    pub fn value_at(&self, month: Month) -> Decimal {
        self.values.get(&month).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn total(&self) -> Decimal {
        self.values.values().copied().sum()
    }
}

/// Customer x month revenue grid.
///
/// Engine-built matrices are dense: `months` is a gap-free ascending range and
/// every row holds a value for every month. Matrices parsed from external
/// tables may be sparse, where an absent cell means "no value".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueMatrix {
    pub months: Vec<Month>,
    pub rows: Vec<MatrixRow>,
}

impl RevenueMatrix {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, customer: &CustomerKey) -> Option<&MatrixRow> {
        self.rows.iter().find(|r| &r.customer == customer)
    }

    /// The cell for `customer` in `month`, or `None` when the row or cell is absent.
    pub fn value(&self, customer: &CustomerKey, month: Month) -> Option<Decimal> {
        self.row(customer)
            .and_then(|r| r.values.get(&month))
            .copied()
    }

    pub fn first_month(&self) -> Option<Month> {
        self.months.first().copied()
    }

    pub fn last_month(&self) -> Option<Month> {
        self.months.last().copied()
    }

    pub fn is_dense(&self) -> bool {
        let expected = match (self.first_month(), self.last_month()) {
            (Some(first), Some(last)) => Month::range_inclusive(first, last),
            _ => Vec::new(),
        };
        self.months == expected
            && self
                .rows
                .iter()
                .all(|r| expected.iter().all(|m| r.values.contains_key(m)))
    }

    /// Rows reordered by sales chronology (see [`chronology_key`]).
    pub fn sorted_by_sales_chronology(mut self) -> Self {
        self.rows
            .sort_by_cached_key(|r| chronology_key(&r.customer, &r.values));
        self
    }

    /// Builds a matrix from a header row and string records.
    ///
    /// Requires `customerId` and `customerName` columns. Headers that parse as
    /// `YYYY-MM` become month columns; any other column is ignored. Blank cells
    /// are left absent. Two headers naming the same month, or a negative cell,
    /// are rejected.
    pub fn from_columns(headers: &[String], records: &[Vec<String>]) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let (id_idx, name_idx) = match (find(CUSTOMER_ID_COLUMN), find(CUSTOMER_NAME_COLUMN)) {
            (Some(id_idx), Some(name_idx)) => (id_idx, name_idx),
            _ => {
                return Err(ArrError::ShapeMismatch(format!(
                    "Matrix must contain '{}' and '{}' columns, found [{}]",
                    CUSTOMER_ID_COLUMN,
                    CUSTOMER_NAME_COLUMN,
                    headers.join(", ")
                )))
            }
        };

        let mut month_columns = Vec::new();
        let mut seen_months = BTreeSet::new();
        for (idx, header) in headers.iter().enumerate() {
            if idx == id_idx || idx == name_idx {
                continue;
            }
            match header.parse::<Month>() {
                Ok(month) => {
                    if !seen_months.insert(month) {
                        return Err(ArrError::ShapeMismatch(format!(
                            "Column '{}' repeats month {}",
                            header, month
                        )));
                    }
                    month_columns.push((idx, month));
                }
                Err(_) => debug!("Ignoring non-month column '{}'", header),
            }
        }

        let mut rows: BTreeMap<CustomerKey, MonthlySeries> = BTreeMap::new();
        for record in records {
            let cell = |idx: usize| record.get(idx).map(|s| s.trim()).unwrap_or("");
            let customer = CustomerKey::new(cell(id_idx), cell(name_idx));
            if rows.contains_key(&customer) {
                warn!("Customer {} appears more than once, later cells win", customer);
            }
            let values = rows.entry(customer.clone()).or_default();

            for &(idx, month) in &month_columns {
                let raw = cell(idx);
                if raw.is_empty() {
                    continue;
                }
                let value = Decimal::from_str(raw)
                    .or_else(|_| Decimal::from_scientific(raw))
                    .ok()
                    .filter(|v| !v.is_sign_negative() || v.is_zero())
                    .ok_or_else(|| ArrError::InvalidAmount {
                        context: format!("customer {} in {}", customer, month),
                        value: raw.to_string(),
                    })?;
                values.insert(month, value);
            }
        }

        Ok(Self {
            months: seen_months.into_iter().collect(),
            rows: rows
                .into_iter()
                .map(|(customer, values)| MatrixRow { customer, values })
                .collect(),
        })
    }
}

/// Display order for customers: first month with non-zero revenue, then last
/// such month, then customer id and name. Customers that never had revenue
/// sort after everyone else.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChronologyKey {
    never_active: bool,
    first_active: Option<Month>,
    last_active: Option<Month>,
    customer: CustomerKey,
}

pub fn chronology_key(customer: &CustomerKey, values: &MonthlySeries) -> ChronologyKey {
    let mut active = values
        .iter()
        .filter(|(_, v)| !v.is_zero())
        .map(|(m, _)| *m);
    let first_active = active.next();
    let last_active = active.last().or(first_active);

    ChronologyKey {
        never_active: first_active.is_none(),
        first_active,
        last_active,
        customer: customer.clone(),
    }
}

/// Sums facts per (customer, month) and pivots them into a dense matrix
/// spanning the first through last observed month.
pub fn build_revenue_matrix(facts: &[MonthlyRevenueFact]) -> RevenueMatrix {
    let mut sums: BTreeMap<CustomerKey, MonthlySeries> = BTreeMap::new();

    for fact in facts {
        let customer = CustomerKey::new(fact.customer_id.clone(), fact.customer_name.clone());
        *sums
            .entry(customer)
            .or_default()
            .entry(fact.month)
            .or_insert(Decimal::ZERO) += fact.monthly_revenue;
    }

    let first = facts.iter().map(|f| f.month).min();
    let last = facts.iter().map(|f| f.month).max();
    let months = match (first, last) {
        (Some(first), Some(last)) => Month::range_inclusive(first, last),
        _ => Vec::new(),
    };

    info!(
        "Built revenue matrix: {} customers x {} months from {} facts",
        sums.len(),
        months.len(),
        facts.len()
    );

    let rows = sums
        .into_iter()
        .map(|(customer, observed)| {
            let values = months
                .iter()
                .map(|m| (*m, observed.get(m).copied().unwrap_or(Decimal::ZERO)))
                .collect();
            MatrixRow { customer, values }
        })
        .collect();

    RevenueMatrix { months, rows }
}
