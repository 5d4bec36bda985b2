//! File adapters: the only part of the engine that touches the file system.
//!
//! - `.json` paths are read and written as a JSON array of records
//! - `.csv` paths are read as a single-sheet table
//! - anything else is opened as a spreadsheet workbook (xlsx, xls, ods...)
//!
//! ```text
//! ┌──────────┐   read_records   ┌───────┐   operators   ┌───────┐   write_records   ┌──────────┐
//! │ workbook │ ───────────────▶ │ Store │ ────────────▶ │ Store │ ────────────────▶ │ xlsx +   │
//! │ csv/json │                  └───────┘               └───────┘                   │ .json    │
//! └──────────┘                                                                      └──────────┘
//! ```

pub mod delimited;
pub mod grid;
pub mod workbook;

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{AdapterError, AdapterResult};
use grid::Grid;

/// Which part of a tabular source to read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetSelection<'a> {
    /// Sheet to read (ignored for CSV)
    pub sheet_name: &'a str,
    /// Replaces the start of the sheet's used range, e.g. `D4`
    pub range_from: Option<&'a str>,
    /// Replaces the end of the sheet's used range, e.g. `E18`
    pub range_to: Option<&'a str>,
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Whether `path` is read as a JSON record array.
pub fn is_json_path(path: &Path) -> bool {
    has_extension(path, "json")
}

/// Read an ordered list of records from a JSON, CSV or workbook file.
pub fn read_records(path: &Path, selection: &SheetSelection<'_>) -> AdapterResult<Vec<Value>> {
    if is_json_path(path) {
        return read_json(path);
    }

    let grid: Grid = if has_extension(path, "csv") {
        delimited::read_csv(path)?
    } else {
        workbook::read_sheet(path, selection.sheet_name)?
    };

    let Some(bounds) = grid.bounds() else {
        return Ok(Vec::new());
    };
    let bounds = bounds.with_overrides(selection.range_from, selection.range_to)?;
    Ok(grid.to_records(bounds))
}

/// Write records as the single sheet of a fresh workbook at `path`, and
/// mirror them as pretty-printed JSON at `path` + `.json`.
///
/// Returns the path of the JSON mirror.
pub fn write_records(path: &Path, sheet_name: &str, records: &[Value]) -> AdapterResult<PathBuf> {
    workbook::write_sheet(path, sheet_name, records)?;

    let mut mirror = path.as_os_str().to_owned();
    mirror.push(".json");
    let mirror = PathBuf::from(mirror);
    write_json(&mirror, records)?;

    Ok(mirror)
}

/// Read a JSON file whose root is an array.
pub fn read_json(path: &Path) -> AdapterResult<Vec<Value>> {
    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&content)? {
        Value::Array(records) => Ok(records),
        _ => Err(AdapterError::NotARecordArray(path.to_path_buf())),
    }
}

/// Write values as a pretty-printed JSON array.
pub fn write_json(path: &Path, records: &[Value]) -> AdapterResult<()> {
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json)?;
    Ok(())
}
