use std::{fmt, sync::LazyLock};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use crate::schema::{ColumnSpec, ColumnType};

pub const DATE_OUTPUT_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Value::Date(d) => d.format(DATE_OUTPUT_FORMAT).to_string(),
            Value::DateTime(dt) => dt.format(DATETIME_OUTPUT_FORMAT).to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Outcome of checking one cell against its column definition.
///
/// Nulls never reach the type coercion: a null in a REQUIRED column is the
/// required-field check's concern, never the parse check's.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    NullAllowed,
    NullRequired,
    Parsed(Value),
    Unparsable,
}

impl Cell {
    pub fn is_unparsable(&self) -> bool {
        matches!(self, Cell::Unparsable)
    }
}

pub fn classify_cell(raw: Option<&str>, column: &ColumnSpec) -> Cell {
    match raw {
        None => {
            if column.is_required() {
                Cell::NullRequired
            } else {
                Cell::NullAllowed
            }
        }
        Some(value) => match parse_cell(value, column) {
            Some(parsed) => Cell::Parsed(parsed),
            None => Cell::Unparsable,
        },
    }
}

/// Coerces a non-null raw value to the column's declared type.
pub fn parse_cell(value: &str, column: &ColumnSpec) -> Option<Value> {
    match column.datatype {
        ColumnType::String => Some(Value::String(value.to_string())),
        ColumnType::Integer => parse_integer(value).map(Value::Integer),
        ColumnType::Float => parse_float(
            value,
            column.float_thousand_separator,
            column.float_decimal_separator,
        )
        .map(Value::Float),
        ColumnType::Date => {
            parse_date(value, column.date_format.as_deref().unwrap_or_default()).map(Value::Date)
        }
        ColumnType::DateTime => {
            parse_datetime(value, column.date_format.as_deref().unwrap_or_default())
                .map(Value::DateTime)
        }
    }
}

// Compiled from a literal, so construction cannot fail at runtime.
static FRACTIONAL_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]*[.,][1-9]+$").expect("valid literal pattern"));

/// Integers reject anything that looks like a decimal with a non-zero
/// fraction (`10.1`, `10,1`) whatever the decimal mark; `10.0` is accepted.
pub fn parse_integer(value: &str) -> Option<i64> {
    if FRACTIONAL_NUMBER.is_match(value) {
        return None;
    }
    let trimmed = value.trim();
    if let Ok(parsed) = trimmed.parse::<i64>() {
        return Some(parsed);
    }
    let parsed = trimmed.parse::<f64>().ok()?;
    let in_range = parsed >= i64::MIN as f64 && parsed < i64::MAX as f64;
    (parsed.is_finite() && parsed.fract() == 0.0 && in_range).then_some(parsed as i64)
}

pub fn parse_float(value: &str, thousand: Option<char>, decimal: Option<char>) -> Option<f64> {
    let mut normalized = value.to_string();
    if let Some(separator) = thousand {
        normalized = normalized.replace(separator, "");
    }
    if let Some(separator) = decimal {
        normalized = normalized.replace(separator, ".");
    }
    let parsed = normalized.trim().parse::<f64>().ok()?;
    (!parsed.is_nan()).then_some(parsed)
}

pub fn parse_date(value: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, format)
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, format)
                .ok()
                .map(|dt| dt.date())
        })
}

pub fn parse_datetime(value: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, format)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_rejects_non_zero_fraction_with_either_mark() {
        assert_eq!(parse_integer("42"), Some(42));
        assert_eq!(parse_integer("-7"), Some(-7));
        assert_eq!(parse_integer("10.0"), Some(10));
        assert_eq!(parse_integer("10.1"), None);
        assert_eq!(parse_integer("10,1"), None);
        assert_eq!(parse_integer(",5"), None);
        assert_eq!(parse_integer("10.10"), None);
        assert_eq!(parse_integer("abc"), None);
        assert_eq!(parse_integer("1e3"), Some(1000));
    }

    #[test]
    fn float_applies_locale_separators() {
        assert_eq!(parse_float("10,5", None, Some(',')), Some(10.5));
        assert_eq!(parse_float("1.234,5", Some('.'), Some(',')), Some(1234.5));
        assert_eq!(parse_float("1 234.5", Some(' '), None), Some(1234.5));
        assert_eq!(parse_float("2.0", None, Some(',')), Some(2.0));
        assert_eq!(parse_float("x", None, None), None);
        assert_eq!(parse_float("NaN", None, None), None);
        assert_eq!(parse_float("10,5", None, None), None);
    }

    #[test]
    fn dates_follow_the_exact_format() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(parse_date("2024-03-09", "%Y-%m-%d"), Some(expected));
        assert_eq!(parse_date("09/03/2024", "%d/%m/%Y"), Some(expected));
        assert_eq!(parse_date("09/03/2024", "%Y-%m-%d"), None);
        assert_eq!(parse_date("2024-03-09 10:00:00", "%Y-%m-%d"), None);

        let stamp = parse_datetime("2024-03-09 10:15:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(stamp.date(), expected);
        let midnight = parse_datetime("2024-03-09", "%Y-%m-%d").unwrap();
        assert_eq!(midnight.time(), NaiveTime::MIN);
    }

    #[test]
    fn classify_cell_separates_nulls_from_parse_failures() {
        let required = ColumnSpec::new("day", ColumnType::Date)
            .required()
            .with_date_format("%d/%m/%Y");
        assert_eq!(classify_cell(None, &required), Cell::NullRequired);
        assert!(classify_cell(Some("2024-01-01"), &required).is_unparsable());

        let optional = ColumnSpec::new("qty", ColumnType::Integer);
        assert_eq!(classify_cell(None, &optional), Cell::NullAllowed);
        assert_eq!(
            classify_cell(Some("3"), &optional),
            Cell::Parsed(Value::Integer(3))
        );
    }

    #[test]
    fn values_render_for_output() {
        assert_eq!(Value::Float(10.5).as_display(), "10.5");
        assert_eq!(Value::Float(2.0).as_display(), "2.0");
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(Value::Date(date).as_display(), "2024-01-02");
        assert_eq!(
            Value::DateTime(date.and_time(NaiveTime::MIN)).as_display(),
            "2024-01-02 00:00:00"
        );
    }
}
