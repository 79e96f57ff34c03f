//! Infers column types from sample rows and adapts raw CSV bytes into
//! typed values (spec.md §4.10, C10).

use zola_db_core::ColumnType;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    I64(i64),
    F64(f64),
    Timestamp(i64),
    Str(String),
}

/// A column's detected (or overridden) type plus its name.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedColumn {
    pub name: String,
    pub col_type: ColumnType,
}

#[derive(Debug, Clone)]
pub struct DetectResult {
    pub columns: Vec<DetectedColumn>,
    pub has_header: bool,
}

/// Fraction of distinct values under which a `Str` column is promoted to
/// `Symbol` — low-cardinality string columns (sides, venues, tickers) are
/// the target use case for dictionary encoding.
const SYMBOL_CARDINALITY_THRESHOLD: f64 = 0.5;
const SYMBOL_MIN_SAMPLES: usize = 4;

fn is_bool_literal(s: &str) -> bool {
    matches!(s, "true" | "false" | "True" | "False" | "TRUE" | "FALSE")
}

/// Parses an RFC-3339-ish timestamp or a bare `YYYY-MM-DD` date into
/// microseconds since the Unix epoch (UTC).
pub fn parse_timestamp_micros(s: &str) -> Option<i64> {
    if let Ok(ts) = s.parse::<jiff::Timestamp>() {
        return Some(ts.as_microsecond());
    }
    if let Ok(date) = s.parse::<jiff::civil::Date>() {
        let zoned = date
            .to_datetime(jiff::civil::Time::midnight())
            .to_zoned(jiff::tz::TimeZone::UTC)
            .ok()?;
        return Some(zoned.timestamp().as_microsecond());
    }
    None
}

fn classify_non_empty<'a>(values: impl Iterator<Item = &'a str>) -> (ColumnType, usize, usize) {
    let mut seen_bool = true;
    let mut seen_i64 = true;
    let mut seen_f64 = true;
    let mut seen_ts = true;
    let mut any = false;
    let mut distinct = std::collections::HashSet::new();
    let mut count = 0usize;

    for v in values {
        if v.is_empty() {
            continue;
        }
        any = true;
        count += 1;
        distinct.insert(v.to_string());
        if seen_bool && !is_bool_literal(v) {
            seen_bool = false;
        }
        if seen_i64 && v.parse::<i64>().is_err() {
            seen_i64 = false;
        }
        if seen_f64 && v.parse::<f64>().is_err() {
            seen_f64 = false;
        }
        if seen_ts && parse_timestamp_micros(v).is_none() {
            seen_ts = false;
        }
    }

    let ty = if !any {
        ColumnType::Str
    } else if seen_bool {
        ColumnType::Bool
    } else if seen_i64 {
        ColumnType::I64
    } else if seen_f64 {
        ColumnType::F64
    } else if seen_ts {
        ColumnType::Timestamp
    } else {
        ColumnType::Str
    };

    (ty, distinct.len(), count)
}

/// Classifies every column of `rows` (each an already-split record of
/// string fields) using up to `max_lines` sample records, applying the
/// header-detection rule from spec.md §4.10: the first row is a header
/// iff every one of its cells fails to parse as its column's
/// data-inferred type, for at least one column.
pub fn detect_columns(rows: &[Vec<String>], max_lines: usize) -> DetectResult {
    assert!(!rows.is_empty(), "detect_columns requires at least one row");
    let width = rows[0].len();
    let sample_end = max_lines.min(rows.len());

    let body_start = if rows.len() > 1 { 1 } else { 0 };
    let mut body_types = Vec::with_capacity(width);
    for col in 0..width {
        let values = rows[body_start..sample_end]
            .iter()
            .filter_map(|r| r.get(col))
            .map(|s| s.as_str());
        let (ty, distinct, count) = classify_non_empty(values);
        let ty = if ty == ColumnType::Str && count >= SYMBOL_MIN_SAMPLES {
            let ratio = distinct as f64 / count as f64;
            if ratio <= SYMBOL_CARDINALITY_THRESHOLD {
                ColumnType::Symbol
            } else {
                ColumnType::Str
            }
        } else {
            ty
        };
        body_types.push(ty);
    }

    let has_header = if rows.len() > 1 {
        (0..width).any(|col| {
            let ty = body_types[col];
            let header_cell = rows[0].get(col).map(|s| s.as_str()).unwrap_or("");
            !value_matches_type(header_cell, ty)
        })
    } else {
        false
    };

    let columns = (0..width)
        .map(|col| DetectedColumn {
            name: if has_header {
                rows[0].get(col).cloned().unwrap_or_else(|| format!("col{col}"))
            } else {
                format!("col{col}")
            },
            col_type: body_types[col],
        })
        .collect();

    DetectResult { columns, has_header }
}

fn value_matches_type(s: &str, ty: ColumnType) -> bool {
    if s.is_empty() {
        return true;
    }
    match ty {
        ColumnType::Bool => is_bool_literal(s),
        ColumnType::I64 => s.parse::<i64>().is_ok(),
        ColumnType::F64 => s.parse::<f64>().is_ok(),
        ColumnType::Timestamp => parse_timestamp_micros(s).is_some(),
        ColumnType::Symbol | ColumnType::Str => true,
    }
}

/// Converts one raw field into its typed value, or `None` on a parse
/// failure (an empty field is always `None`, i.e. null, for every type
/// except `Timestamp`, where spec.md §9 Open Question 1 requires treating
/// a zero-length timestamp field as an explicit parse failure rather than
/// a silent null — callers must route that case through the atomicity
/// policy rather than calling this function for timestamp columns).
pub fn parse_field(col_type: ColumnType, raw: &str) -> Option<FieldValue> {
    if raw.is_empty() && col_type != ColumnType::Timestamp {
        return None;
    }
    match col_type {
        ColumnType::Bool => match raw {
            "true" | "True" | "TRUE" => Some(FieldValue::Bool(true)),
            "false" | "False" | "FALSE" => Some(FieldValue::Bool(false)),
            _ => None,
        },
        ColumnType::I64 => raw.parse::<i64>().ok().map(FieldValue::I64),
        ColumnType::F64 => raw.parse::<f64>().ok().map(FieldValue::F64),
        ColumnType::Timestamp => {
            if raw.is_empty() {
                None
            } else {
                parse_timestamp_micros(raw).map(FieldValue::Timestamp)
            }
        }
        ColumnType::Symbol | ColumnType::Str => Some(FieldValue::Str(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn detects_header_when_first_row_is_non_numeric() {
        let rows = vec![
            row(&["ts", "price", "side"]),
            row(&["2022-01-01T00:00:00Z", "100.5", "buy"]),
            row(&["2022-01-01T00:00:01Z", "101.0", "sell"]),
        ];
        let result = detect_columns(&rows, 10);
        assert!(result.has_header);
        assert_eq!(result.columns[0].name, "ts");
        assert_eq!(result.columns[0].col_type, ColumnType::Timestamp);
        assert_eq!(result.columns[1].col_type, ColumnType::F64);
    }

    #[test]
    fn low_cardinality_string_column_becomes_symbol() {
        let mut rows = vec![row(&["ts", "side"])];
        for i in 0..10 {
            let side = if i % 2 == 0 { "buy" } else { "sell" };
            rows.push(row(&["2022-01-01T00:00:00Z", side]));
        }
        let result = detect_columns(&rows, 20);
        assert_eq!(result.columns[1].col_type, ColumnType::Symbol);
    }

    #[test]
    fn parse_field_rejects_empty_timestamp() {
        assert_eq!(parse_field(ColumnType::Timestamp, ""), None);
        assert_eq!(parse_field(ColumnType::I64, ""), None);
    }
}
