//! Query result translation
//!
//! Turns the store's columnar series (column names plus positional rows) into one mapping
//! per row, or into caller-defined types via serde. Only the first series of the first
//! statement is translated.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDateTime};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt::Write;
use tracing::debug;

use crate::error::{InfluxError, Result};
use crate::types::{QueryResult, Series};

/// Default output pattern for the `time` column (`yyyy-MM-dd HH:mm:ss`)
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column the store uses for point timestamps
pub const TIME_COLUMN: &str = "time";

/// One result row keyed by column name, in column order
pub type Record = IndexMap<String, Value>;

/// Records of the first series in `result`, with `time` reformatted using `time_format`
pub fn records(result: &QueryResult, time_format: &str) -> Result<Vec<Record>> {
    match result.first_series() {
        Some(series) => series_to_records(series, Some(time_format)),
        None => Ok(Vec::new()),
    }
}

/// Rows of the first series in `result`, deserialized into `T`
pub fn typed<T: DeserializeOwned>(result: &QueryResult) -> Result<Vec<T>> {
    match result.first_series() {
        Some(series) => series_to_typed(series),
        None => Ok(Vec::new()),
    }
}

/// Zip each row of `series` against its columns.
///
/// With `time_format` set, string values of the `time` column are parsed as ISO-8601 and
/// rewritten with the pattern. Missing trailing cells become `null`.
pub fn series_to_records(series: &Series, time_format: Option<&str>) -> Result<Vec<Record>> {
    let items = match time_format {
        Some(format) => Some(parse_format(format)?),
        None => None,
    };

    let rows = match &series.values {
        Some(rows) => rows,
        None => return Ok(Vec::new()),
    };

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let mut record = Record::with_capacity(series.columns.len());
        for (i, column) in series.columns.iter().enumerate() {
            let mut value = row.get(i).cloned().unwrap_or(Value::Null);
            if let (Some(items), TIME_COLUMN) = (&items, column.as_str()) {
                if let Value::String(raw) = &value {
                    value = Value::String(reformat_with(raw, items)?);
                }
            }
            record.insert(column.clone(), value);
        }
        records.push(record);
    }

    debug!("Translated {} rows from series {}", records.len(), series.name);
    Ok(records)
}

/// Deserialize each row of `series` into `T`; the first failure aborts the whole call
pub fn series_to_typed<T: DeserializeOwned>(series: &Series) -> Result<Vec<T>> {
    let rows = match &series.values {
        Some(rows) => rows,
        None => return Ok(Vec::new()),
    };

    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            let object: Map<String, Value> = series
                .columns
                .iter()
                .enumerate()
                .map(|(i, column)| (column.clone(), row.get(i).cloned().unwrap_or(Value::Null)))
                .collect();

            serde_json::from_value(Value::Object(object)).map_err(|e| {
                InfluxError::DeserializationError(format!(
                    "row {} of series {}: {}",
                    index, series.name, e
                ))
            })
        })
        .collect()
}

/// Parse a store timestamp and render it with `format`
pub fn reformat_time(raw: &str, format: &str) -> Result<String> {
    let items = parse_format(format)?;
    reformat_with(raw, &items)
}

fn parse_format(format: &str) -> Result<Vec<Item<'_>>> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(InfluxError::DeserializationError(format!(
            "invalid time format pattern {:?}",
            format
        )));
    }
    Ok(items)
}

fn reformat_with(raw: &str, items: &[Item<'_>]) -> Result<String> {
    // keep the wall-clock value as written, offset dropped
    let naive = match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => parsed.naive_local(),
        Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map_err(|e| {
            InfluxError::DeserializationError(format!("time value {:?} is not ISO-8601: {}", raw, e))
        })?,
    };

    let mut out = String::with_capacity(32);
    write!(out, "{}", naive.format_with_items(items.iter())).map_err(|_| {
        InfluxError::DeserializationError(format!("time value {:?} could not be formatted", raw))
    })?;
    Ok(out)
}
