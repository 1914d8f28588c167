//! Table ingestion and column utilities built on Polars

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;

use polars::prelude::*;

use crate::error::{Result, SegmentaError};

/// Parse a delimited table from an in-memory byte stream.
///
/// Malformed content is rejected wholesale; no partial dataset is kept.
pub fn read_table(bytes: &[u8]) -> Result<DataFrame> {
    let df = CsvReader::new(Cursor::new(bytes))
        .has_header(true)
        .finish()
        .map_err(|e| SegmentaError::Input(format!("could not parse table: {e}")))?;
    if df.height() == 0 {
        return Err(SegmentaError::Input("table contains no rows".into()));
    }
    Ok(df)
}

/// Read and parse a delimited table from disk.
pub fn read_table_from_path(path: &str) -> Result<DataFrame> {
    let bytes = std::fs::read(path)?;
    read_table(&bytes)
}

/// Names of the table's numeric columns, in table order.
pub fn numeric_columns(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|s| s.dtype().is_numeric())
        .map(|s| s.name().to_string())
        .collect()
}

/// Names of the table's string-typed columns, in table order.
pub fn categorical_columns(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|s| s.dtype() == &DataType::String)
        .map(|s| s.name().to_string())
        .collect()
}

/// True when every value in the column is distinct.
pub fn is_unique_id(df: &DataFrame, column: &str) -> Result<bool> {
    Ok(df.column(column)?.n_unique()? == df.height())
}

/// Column values rendered as text, nulls preserved.
pub fn string_values(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    let series = df.column(column)?.cast(&DataType::String)?;
    let ca = series.str()?;
    Ok(ca.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Numeric column values as `f64`, nulls preserved.
/// Rejects non-numeric columns instead of silently parsing.
pub fn float_values(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    let series = df.column(column)?;
    if !series.dtype().is_numeric() {
        return Err(SegmentaError::Input(format!("column '{column}' is not numeric")));
    }
    let series = series.cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

/// Counts of row-value x column-value pairs with deterministic ordering.
#[derive(Debug, Clone)]
pub struct Crosstab {
    pub row_values: Vec<String>,
    pub col_values: Vec<String>,
    /// `counts[i][j]` pairs `row_values[i]` with `col_values[j]`.
    pub counts: Vec<Vec<u32>>,
}

/// Cross-tabulate two columns. Rows where either side is null are dropped.
pub fn crosstab(df: &DataFrame, row_col: &str, col_col: &str) -> Result<Crosstab> {
    let rows = string_values(df, row_col)?;
    let cols = string_values(df, col_col)?;

    let mut table: BTreeMap<String, BTreeMap<String, u32>> = BTreeMap::new();
    let mut col_set: BTreeSet<String> = BTreeSet::new();
    for (row, col) in rows.iter().zip(cols.iter()) {
        if let (Some(row), Some(col)) = (row, col) {
            col_set.insert(col.clone());
            *table
                .entry(row.clone())
                .or_default()
                .entry(col.clone())
                .or_insert(0) += 1;
        }
    }

    let col_values: Vec<String> = col_set.into_iter().collect();
    let mut row_values = Vec::with_capacity(table.len());
    let mut counts = Vec::with_capacity(table.len());
    for (row, inner) in table {
        counts.push(
            col_values
                .iter()
                .map(|c| inner.get(c).copied().unwrap_or(0))
                .collect(),
        );
        row_values.push(row);
    }

    Ok(Crosstab { row_values, col_values, counts })
}
