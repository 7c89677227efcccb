use crate::classifier::ClassifiedLedger;
use crate::error::Result;
use crate::logo::LogoWaterfall;
use crate::matrix::{RevenueMatrix, CUSTOMER_ID_COLUMN, CUSTOMER_NAME_COLUMN};
use crate::month::Month;
use crate::schema::MonthlySeries;
use crate::waterfall::AggregatedWaterfall;
use log::debug;
use std::io::{Read, Write};

pub const MEASURE_COLUMN: &str = "measureType";

/// A month-columned table that can be written out as CSV.
pub trait TabularReport {
    fn headers(&self) -> Vec<String>;
    fn records(&self) -> Vec<Vec<String>>;
}

fn header_row(keys: &[&str], months: &[Month]) -> Vec<String> {
    keys.iter()
        .map(|k| k.to_string())
        .chain(months.iter().map(|m| m.to_string()))
        .collect()
}

fn series_cells<'a>(
    series: &'a MonthlySeries,
    months: &'a [Month],
) -> impl Iterator<Item = String> + 'a {
    months
        .iter()
        .map(move |m| series.get(m).map(|v| v.to_string()).unwrap_or_default())
}

impl TabularReport for RevenueMatrix {
    fn headers(&self) -> Vec<String> {
        header_row(&[CUSTOMER_ID_COLUMN, CUSTOMER_NAME_COLUMN], &self.months)
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                [row.customer.customer_id.clone(), row.customer.customer_name.clone()]
                    .into_iter()
                    .chain(series_cells(&row.values, &self.months))
                    .collect()
            })
            .collect()
    }
}

impl TabularReport for ClassifiedLedger {
    fn headers(&self) -> Vec<String> {
        header_row(
            &[CUSTOMER_ID_COLUMN, CUSTOMER_NAME_COLUMN, MEASURE_COLUMN],
            &self.months,
        )
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                [
                    row.customer.customer_id.clone(),
                    row.customer.customer_name.clone(),
                    row.measure.to_string(),
                ]
                .into_iter()
                .chain(series_cells(&row.values, &self.months))
                .collect()
            })
            .collect()
    }
}

impl TabularReport for AggregatedWaterfall {
    fn headers(&self) -> Vec<String> {
        header_row(&[MEASURE_COLUMN], &self.months)
    }

    /// Revenue rows followed by ratio rows. Undefined ratios are left blank.
    fn records(&self) -> Vec<Vec<String>> {
        let revenue = self.rows.iter().map(|row| {
            std::iter::once(row.measure.to_string())
                .chain(series_cells(&row.values, &self.months))
                .collect::<Vec<String>>()
        });
        let ratios = self.ratios.iter().map(|row| {
            std::iter::once(row.measure.to_string())
                .chain(self.months.iter().map(|m| {
                    row.values
                        .get(m)
                        .copied()
                        .flatten()
                        .map(|v| v.to_string())
                        .unwrap_or_default()
                }))
                .collect::<Vec<String>>()
        });
        revenue.chain(ratios).collect()
    }
}

impl TabularReport for LogoWaterfall {
    fn headers(&self) -> Vec<String> {
        header_row(&[MEASURE_COLUMN], &self.months)
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                std::iter::once(row.measure.to_string())
                    .chain(self.months.iter().map(|m| {
                        row.values.get(m).map(|v| v.to_string()).unwrap_or_default()
                    }))
                    .collect()
            })
            .collect()
    }
}

pub fn write_csv<T: TabularReport + ?Sized, W: Write>(report: &T, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(report.headers())?;
    let records = report.records();
    for record in &records {
        csv_writer.write_record(record)?;
    }
    csv_writer.flush()?;
    debug!("Wrote {} CSV records", records.len());
    Ok(())
}

/// Reads an uploaded customer x month table.
///
/// Rows may be ragged; missing trailing cells are read as blank.
pub fn read_matrix_csv<R: Read>(reader: R) -> Result<RevenueMatrix> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut records = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        records.push(record.iter().map(|c| c.to_string()).collect::<Vec<String>>());
    }

    debug!("Read {} matrix rows with {} columns", records.len(), headers.len());
    RevenueMatrix::from_columns(&headers, &records)
}
