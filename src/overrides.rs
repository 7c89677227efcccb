use crate::matrix::{MatrixRow, RevenueMatrix};
use crate::month::Month;
use crate::schema::{CustomerKey, MonthlySeries};
use log::{debug, info};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

fn index_rows(matrix: &RevenueMatrix) -> BTreeMap<&CustomerKey, &MatrixRow> {
    matrix.rows.iter().map(|r| (&r.customer, r)).collect()
}

fn union_keys<'a>(
    original: &BTreeMap<&'a CustomerKey, &'a MatrixRow>,
    overrides: &BTreeMap<&'a CustomerKey, &'a MatrixRow>,
) -> BTreeSet<&'a CustomerKey> {
    original.keys().chain(overrides.keys()).copied().collect()
}

fn computed_value(row: Option<&&MatrixRow>, month: Month) -> Decimal {
    row.map(|r| r.value_at(month)).unwrap_or(Decimal::ZERO)
}

fn override_value(row: Option<&&MatrixRow>, month: Month) -> Option<Decimal> {
    row.and_then(|r| r.values.get(&month)).copied()
}

/// Differences `override - computed` over exactly the override's months.
///
/// Customers missing from either side count as zero. A blank override cell
/// carries no difference. Customers whose differences are all zero are dropped.
pub fn reconcile(original: &RevenueMatrix, overrides: &RevenueMatrix) -> RevenueMatrix {
    let months: Vec<Month> = overrides
        .months
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let computed_rows = index_rows(original);
    let override_rows = index_rows(overrides);

    let mut rows = Vec::new();
    for customer in union_keys(&computed_rows, &override_rows) {
        let computed = computed_rows.get(customer);
        let supplied = override_rows.get(customer);

        let values: MonthlySeries = months
            .iter()
            .map(|&m| {
                let diff = match override_value(supplied, m) {
                    Some(v) => v - computed_value(computed, m),
                    None => Decimal::ZERO,
                };
                (m, diff)
            })
            .collect();

        if values.values().all(|v| v.is_zero()) {
            debug!("No differences for {}, dropping from reconciliation", customer);
            continue;
        }
        rows.push(MatrixRow {
            customer: customer.clone(),
            values,
        });
    }

    info!(
        "Reconciliation found differences for {} of {} customers over {} months",
        rows.len(),
        computed_rows.len().max(override_rows.len()),
        months.len()
    );

    RevenueMatrix { months, rows }.sorted_by_sales_chronology()
}

/// Coalesces two matrices: the override cell wins when present, otherwise the
/// computed value (zero when absent) is kept.
///
/// The result spans the dense month range covering both inputs and is sorted
/// by sales chronology.
pub fn apply_override(original: &RevenueMatrix, overrides: &RevenueMatrix) -> RevenueMatrix {
    let first = original.months.iter().chain(&overrides.months).min().copied();
    let last = original.months.iter().chain(&overrides.months).max().copied();
    let months = match (first, last) {
        (Some(first), Some(last)) => Month::range_inclusive(first, last),
        _ => Vec::new(),
    };

    let computed_rows = index_rows(original);
    let override_rows = index_rows(overrides);

    let mut overridden_cells = 0usize;
    let rows = union_keys(&computed_rows, &override_rows)
        .into_iter()
        .map(|customer| {
            let computed = computed_rows.get(customer);
            let supplied = override_rows.get(customer);
            let values = months
                .iter()
                .map(|&m| {
                    let value = match override_value(supplied, m) {
                        Some(v) => {
                            overridden_cells += 1;
                            v
                        }
                        None => computed_value(computed, m),
                    };
                    (m, value)
                })
                .collect();
            MatrixRow {
                customer: customer.clone(),
                values,
            }
        })
        .collect();

    info!(
        "Applied {} override cells across {} months",
        overridden_cells,
        months.len()
    );

    RevenueMatrix { months, rows }.sorted_by_sales_chronology()
}
