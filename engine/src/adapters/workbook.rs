//! Spreadsheet workbooks: reading sheets with `calamine`, writing with
//! `rust_xlsxwriter`.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::Workbook;
use serde_json::Value;

use super::grid::{records_to_rows, CellAddress, Grid};
use crate::error::{AdapterError, AdapterResult};
use crate::models::{display_value, number_value};

/// List the sheet names of a workbook, in workbook order.
pub fn sheet_names(path: &Path) -> AdapterResult<Vec<String>> {
    let workbook = open_workbook_auto(path)?;
    Ok(workbook.sheet_names())
}

/// Read one sheet into a [`Grid`].
pub fn read_sheet(path: &Path, sheet: &str) -> AdapterResult<Grid> {
    let mut workbook = open_workbook_auto(path)?;

    if !workbook.sheet_names().iter().any(|name| name == sheet) {
        return Err(AdapterError::SheetNotFound {
            path: path.to_path_buf(),
            sheet: sheet.to_string(),
        });
    }

    let range = workbook.worksheet_range(sheet)?;
    let origin = range
        .start()
        .map(|(row, col)| CellAddress::new(row, col))
        .unwrap_or_default();
    let rows = range
        .rows()
        .map(|cells| cells.iter().map(cell_value).collect())
        .collect();

    Ok(Grid::new(origin, rows))
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => number_value(*f),
        Data::Bool(b) => Value::Bool(*b),
        // Dates stay as their serial number, like any other numeric cell.
        Data::DateTime(dt) => number_value(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(e) => Value::String(e.to_string()),
    }
}

/// Write records as the only sheet of a new workbook at `path`.
///
/// Any existing file is overwritten.
pub fn write_sheet(path: &Path, sheet: &str, records: &[Value]) -> AdapterResult<()> {
    let (headers, rows) = records_to_rows(records);
    if headers.len() > u16::MAX as usize {
        return Err(AdapterError::TooManyColumns(headers.len()));
    }

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet)?;

    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string(0, col as u16, header.as_str())?;
    }

    for (r, row) in rows.iter().enumerate() {
        let row_num = r as u32 + 1;
        for (c, value) in row.iter().enumerate() {
            let col = c as u16;
            match value {
                Value::Null => {}
                Value::Bool(b) => {
                    worksheet.write_boolean(row_num, col, *b)?;
                }
                Value::Number(n) => match n.as_f64() {
                    Some(f) => {
                        worksheet.write_number(row_num, col, f)?;
                    }
                    None => {
                        worksheet.write_string(row_num, col, n.to_string())?;
                    }
                },
                other => {
                    worksheet.write_string(row_num, col, display_value(other))?;
                }
            }
        }
    }

    workbook.save(path)?;
    Ok(())
}
