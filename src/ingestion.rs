use crate::error::{ArrError, Result};
use crate::schema::Contract;
use chrono::NaiveDate;
use log::{debug, info};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Date layouts accepted in uploaded contract rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum DateFormat {
    #[default]
    #[serde(rename = "mm/dd/yy")]
    MonthDayYear,
    #[serde(rename = "dd/mm/yy")]
    DayMonthYear,
    #[serde(rename = "yyyy/mm/dd")]
    YearMonthDay,
}

impl DateFormat {
    pub const ALL: [DateFormat; 3] = [
        DateFormat::MonthDayYear,
        DateFormat::DayMonthYear,
        DateFormat::YearMonthDay,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            DateFormat::MonthDayYear => "mm/dd/yy",
            DateFormat::DayMonthYear => "dd/mm/yy",
            DateFormat::YearMonthDay => "yyyy/mm/dd",
        }
    }

    /// The chrono pattern for this layout.
    pub fn pattern(self) -> &'static str {
        match self {
            DateFormat::MonthDayYear => "%m/%d/%y",
            DateFormat::DayMonthYear => "%d/%m/%y",
            DateFormat::YearMonthDay => "%Y/%m/%d",
        }
    }

    pub fn parse(self, value: &str) -> Result<NaiveDate> {
        let value = value.trim();
        // chrono's %Y takes a year of any width
        if self == DateFormat::YearMonthDay {
            let year = value.split('/').next().unwrap_or("");
            if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
                return Err(ArrError::DateError(format!(
                    "'{}' does not match format {}: year must have four digits",
                    value,
                    self.tag()
                )));
            }
        }
        NaiveDate::parse_from_str(value, self.pattern()).map_err(|e| {
            ArrError::DateError(format!(
                "'{}' does not match format {}: {}",
                value,
                self.tag(),
                e
            ))
        })
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for DateFormat {
    type Err = ArrError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        DateFormat::ALL
            .into_iter()
            .find(|f| f.tag().eq_ignore_ascii_case(s))
            .ok_or_else(|| ArrError::DateError(format!("Unknown date format '{}'", s)))
    }
}

/// A contract row as uploaded, before any parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContractRecord {
    #[schemars(description = "Stable identifier of the customer.")]
    pub customer_id: String,

    #[schemars(description = "Display name of the customer.")]
    pub customer_name: String,

    #[serde(default)]
    #[schemars(description = "Optional contract identifier. Missing or repeated ids are replaced with '{customerId}-{rowIndex}'.")]
    pub contract_id: Option<String>,

    #[schemars(description = "First day of service, written in startDateFormat.")]
    pub contract_start_date: String,

    #[serde(default)]
    #[schemars(description = "Layout of contractStartDate: 'mm/dd/yy', 'dd/mm/yy' or 'yyyy/mm/dd'.")]
    pub start_date_format: DateFormat,

    #[schemars(description = "Day after the last day of service, written in endDateFormat.")]
    pub contract_end_date: String,

    #[serde(default)]
    #[schemars(description = "Layout of contractEndDate: 'mm/dd/yy', 'dd/mm/yy' or 'yyyy/mm/dd'.")]
    pub end_date_format: DateFormat,

    #[schemars(description = "Total value of the contract. Thousands separators and a leading currency symbol are accepted.")]
    pub total_contract_value: String,
}

impl ContractRecord {
    pub fn into_contract(self) -> Result<Contract> {
        let contract_start_date = self.start_date_format.parse(&self.contract_start_date)?;
        let contract_end_date = self.end_date_format.parse(&self.contract_end_date)?;
        let total_contract_value = parse_amount(&self.total_contract_value).ok_or_else(|| {
            ArrError::InvalidAmount {
                context: format!("customer {}", self.customer_id),
                value: self.total_contract_value.clone(),
            }
        })?;

        Ok(Contract {
            customer_id: self.customer_id.trim().to_string(),
            customer_name: self.customer_name.trim().to_string(),
            contract_id: self.contract_id,
            contract_start_date,
            contract_end_date,
            total_contract_value,
        })
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ContractRecord)
    }

    pub fn schema_as_json() -> Result<String> {
        Ok(serde_json::to_string_pretty(&Self::generate_json_schema())?)
    }
}

fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}

/// Parses every uploaded row, stopping at the first invalid one.
pub fn convert_records(records: &[ContractRecord]) -> Result<Vec<Contract>> {
    let mut contracts = Vec::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        debug!("Parsing contract row {} for customer {}", idx, record.customer_id);
        contracts.push(record.clone().into_contract()?);
    }
    info!("Parsed {} contract rows", contracts.len());
    Ok(contracts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start: &str, start_format: DateFormat, end: &str, end_format: DateFormat, value: &str) -> ContractRecord {
        ContractRecord {
            customer_id: " C1 ".to_string(),
            customer_name: "Acme".to_string(),
            contract_id: None,
            contract_start_date: start.to_string(),
            start_date_format: start_format,
            contract_end_date: end.to_string(),
            end_date_format: end_format,
            total_contract_value: value.to_string(),
        }
    }

    #[test]
    fn test_each_date_format() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(DateFormat::MonthDayYear.parse("03/04/24").unwrap(), expected);
        assert_eq!(DateFormat::DayMonthYear.parse("04/03/24").unwrap(), expected);
        assert_eq!(DateFormat::YearMonthDay.parse("2024/03/04").unwrap(), expected);
        assert!(DateFormat::YearMonthDay.parse("03/04/24").is_err());
    }

    #[test]
    fn test_year_first_format_needs_full_year() {
        for value in ["24/03/04", "3/04/24", "02024/03/04", "abcd/03/04"] {
            let err = DateFormat::YearMonthDay.parse(value).unwrap_err();
            assert!(matches!(err, ArrError::DateError(_)), "{}", value);
        }

        let err = record("03/04/24", DateFormat::YearMonthDay, "2024/06/01", DateFormat::YearMonthDay, "100")
            .into_contract()
            .unwrap_err();
        assert!(matches!(err, ArrError::DateError(_)));
    }

    #[test]
    fn test_format_tags() {
        assert_eq!("dd/mm/yy".parse::<DateFormat>().unwrap(), DateFormat::DayMonthYear);
        assert!("yy-mm-dd".parse::<DateFormat>().is_err());
        let json = serde_json::to_string(&DateFormat::YearMonthDay).unwrap();
        assert_eq!(json, "\"yyyy/mm/dd\"");
    }

    #[test]
    fn test_mixed_formats_per_row() {
        let contract = record("01/01/24", DateFormat::MonthDayYear, "2024/04/01", DateFormat::YearMonthDay, "$9,000")
            .into_contract()
            .unwrap();
        assert_eq!(contract.customer_id, "C1");
        assert_eq!(contract.contract_start_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(contract.contract_end_date, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        assert_eq!(contract.total_contract_value, Decimal::from(9000));
    }

    #[test]
    fn test_invalid_inputs() {
        let err = record("13/45/24", DateFormat::MonthDayYear, "04/01/24", DateFormat::MonthDayYear, "100")
            .into_contract()
            .unwrap_err();
        assert!(matches!(err, ArrError::DateError(_)));

        let err = record("01/01/24", DateFormat::MonthDayYear, "04/01/24", DateFormat::MonthDayYear, "a lot")
            .into_contract()
            .unwrap_err();
        assert!(matches!(err, ArrError::InvalidAmount { .. }));
    }

    #[test]
    fn test_record_from_json_defaults_format() {
        let json = r#"{
            "customerId": "C9",
            "customerName": "Globex",
            "contractStartDate": "06/01/23",
            "contractEndDate": "06/01/24",
            "totalContractValue": "12000"
        }"#;
        let record: ContractRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.start_date_format, DateFormat::MonthDayYear);
        let contracts = convert_records(&[record]).unwrap();
        assert_eq!(contracts[0].duration_days(), 366);
    }

    #[test]
    fn test_schema_mentions_formats() {
        let schema = ContractRecord::schema_as_json().unwrap();
        assert!(schema.contains("contractStartDate"));
        assert!(schema.contains("yyyy/mm/dd"));
    }
}
