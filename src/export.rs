//! Workbook export: assignments, per-variable crosstabs and the full table

use polars::prelude::*;
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::data::{self, Crosstab};
use crate::error::{Result, SegmentaError};
use crate::merge::resolve_column;

/// Sheet-name budget imposed by the workbook format.
const MAX_SHEET_NAME: usize = 31;

/// Sheet holding the (id, cluster) assignment pairs.
pub const ASSIGNMENTS_SHEET: &str = "Asignaciones";
/// Sheet holding the full merged table.
pub const FULL_DATA_SHEET: &str = "Datos Completos";

/// A rendered workbook plus the demographic variables that could not be
/// resolved against the merged table and were skipped.
#[derive(Debug)]
pub struct ExportOutcome {
    pub bytes: Vec<u8>,
    pub skipped: Vec<String>,
}

/// Assemble the export workbook: one assignments sheet, one crosstab sheet
/// per resolvable demographic variable, and the full merged table.
///
/// A missing identifier or cluster column fails before any bytes are
/// produced; an unresolvable demographic variable is skipped and reported.
pub fn workbook(
    merged: &DataFrame,
    demo_vars: &[String],
    id_col: &str,
    cluster_col: &str,
) -> Result<ExportOutcome> {
    let columns = merged.get_column_names();
    if !columns.iter().any(|c| *c == id_col) {
        return Err(SegmentaError::Export(format!(
            "identifier '{id_col}' is not present in the merged table"
        )));
    }
    if !columns.iter().any(|c| *c == cluster_col) {
        return Err(SegmentaError::Export(format!(
            "cluster column '{cluster_col}' is not present in the merged table"
        )));
    }

    let mut book = Workbook::new();
    let mut skipped = Vec::new();

    let ids = data::string_values(merged, id_col)?;
    let clusters = data::float_values(merged, cluster_col)?;
    let sheet = book.add_worksheet();
    sheet.set_name(ASSIGNMENTS_SHEET)?;
    sheet.write_string(0, 0, id_col)?;
    sheet.write_string(0, 1, cluster_col)?;
    for (i, (id, cluster)) in ids.iter().zip(clusters.iter()).enumerate() {
        let row = (i + 1) as u32;
        if let Some(id) = id {
            sheet.write_string(row, 0, id)?;
        }
        if let Some(cluster) = cluster {
            sheet.write_number(row, 1, *cluster)?;
        }
    }

    for var in demo_vars {
        let resolved = match resolve_column(merged, var) {
            Some(resolved) => resolved,
            None => {
                skipped.push(var.clone());
                continue;
            }
        };
        let table = data::crosstab(merged, &resolved, cluster_col)?;
        let sheet = book.add_worksheet();
        sheet.set_name(&crosstab_sheet_name(var))?;
        write_crosstab(sheet, &table, var)?;
    }

    let sheet = book.add_worksheet();
    sheet.set_name(FULL_DATA_SHEET)?;
    write_dataframe(sheet, merged)?;

    let bytes = book.save_to_buffer()?;
    Ok(ExportOutcome { bytes, skipped })
}

/// `Cross_<var>`, trimmed to the workbook's sheet-name limit.
pub fn crosstab_sheet_name(var: &str) -> String {
    let name = format!("Cross_{var}");
    name.chars().take(MAX_SHEET_NAME).collect()
}

fn write_crosstab(sheet: &mut Worksheet, table: &Crosstab, var: &str) -> Result<()> {
    sheet.write_string(0, 0, var)?;
    for (j, cluster) in table.col_values.iter().enumerate() {
        sheet.write_string(0, (j + 1) as u16, cluster)?;
    }
    for (i, value) in table.row_values.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_string(row, 0, value)?;
        for (j, count) in table.counts[i].iter().enumerate() {
            sheet.write_number(row, (j + 1) as u16, f64::from(*count))?;
        }
    }
    Ok(())
}

fn write_dataframe(sheet: &mut Worksheet, df: &DataFrame) -> Result<()> {
    for (j, name) in df.get_column_names().iter().enumerate() {
        let col = j as u16;
        sheet.write_string(0, col, *name)?;
        if df.column(name)?.dtype().is_numeric() {
            for (i, value) in data::float_values(df, name)?.iter().enumerate() {
                if let Some(value) = value {
                    sheet.write_number((i + 1) as u32, col, *value)?;
                }
            }
        } else {
            for (i, value) in data::string_values(df, name)?.iter().enumerate() {
                if let Some(value) = value {
                    sheet.write_string((i + 1) as u32, col, value)?;
                }
            }
        }
    }
    Ok(())
}
