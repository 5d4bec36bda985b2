//! Cell grids, cell addresses and range overrides.
//!
//! Every tabular source (workbook sheet or CSV file) is first read into a
//! [`Grid`]; the grid's used range may then be narrowed by a start and/or end
//! address before its rows are turned into records.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{AdapterError, AdapterResult};
use crate::models::display_value;

static CELL_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$?([A-Za-z]{1,3})\$?([0-9]{1,7})$").expect("cell address pattern is valid")
});

/// A zero-based (row, column) cell position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellAddress {
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parse a spreadsheet address such as `D4` or `$AA$10`.
    pub fn parse(text: &str) -> AdapterResult<Self> {
        let invalid = || AdapterError::InvalidCellAddress(text.to_string());
        let caps = CELL_ADDRESS.captures(text.trim()).ok_or_else(invalid)?;

        let col = caps[1]
            .chars()
            .map(|c| c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)
            .fold(0u32, |acc, d| acc * 26 + d);
        let row: u32 = caps[2].parse().map_err(|_| invalid())?;
        if row == 0 {
            return Err(invalid());
        }

        Ok(Self::new(row - 1, col - 1))
    }
}

/// An inclusive rectangular region of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl Bounds {
    /// Apply range overrides. Each side is replaced independently.
    pub fn with_overrides(
        mut self,
        range_from: Option<&str>,
        range_to: Option<&str>,
    ) -> AdapterResult<Self> {
        if let Some(from) = range_from {
            self.start = CellAddress::parse(from)?;
        }
        if let Some(to) = range_to {
            self.end = CellAddress::parse(to)?;
        }
        Ok(self)
    }
}

/// Cell contents of one sheet. Empty cells are `Value::Null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    /// Position of `rows[0][0]` in the sheet
    origin: CellAddress,
    rows: Vec<Vec<Value>>,
}

impl Grid {
    pub fn new(origin: CellAddress, rows: Vec<Vec<Value>>) -> Self {
        Self { origin, rows }
    }

    /// The used range, or `None` for an empty sheet
    pub fn bounds(&self) -> Option<Bounds> {
        let width = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        if self.rows.is_empty() || width == 0 {
            return None;
        }
        Some(Bounds {
            start: self.origin,
            end: CellAddress::new(
                self.origin.row + self.rows.len() as u32 - 1,
                self.origin.col + width as u32 - 1,
            ),
        })
    }

    /// Cell at an absolute sheet position
    pub fn cell(&self, row: u32, col: u32) -> Option<&Value> {
        let r = row.checked_sub(self.origin.row)? as usize;
        let c = col.checked_sub(self.origin.col)? as usize;
        self.rows
            .get(r)
            .and_then(|cells| cells.get(c))
            .filter(|v| !v.is_null())
    }

    /// Convert the region to records, using its first row as field names.
    ///
    /// Empty header cells become `__EMPTY`, repeated names get `_1`, `_2`...
    /// suffixes. Empty cells are left out of a record and rows without any
    /// value are skipped. An end beyond the used range is clamped to it.
    pub fn to_records(&self, bounds: Bounds) -> Vec<Value> {
        let Some(used) = self.bounds() else {
            return Vec::new();
        };
        let start = bounds.start;
        let end = CellAddress::new(
            bounds.end.row.min(used.end.row),
            bounds.end.col.min(used.end.col),
        );
        if end.row < start.row || end.col < start.col {
            return Vec::new();
        }

        let headers = header_names(
            (start.col..=end.col).map(|col| self.cell(start.row, col)),
        );

        let mut records = Vec::new();
        for row in start.row.saturating_add(1)..=end.row {
            let mut record = Map::new();
            for (offset, header) in headers.iter().enumerate() {
                if let Some(value) = self.cell(row, start.col + offset as u32) {
                    record.insert(header.clone(), value.clone());
                }
            }
            if !record.is_empty() {
                records.push(Value::Object(record));
            }
        }
        records
    }
}

fn header_names<'a>(cells: impl Iterator<Item = Option<&'a Value>>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    cells
        .map(|cell| {
            let base = match cell.map(display_value) {
                Some(text) if !text.is_empty() => text,
                _ => "__EMPTY".to_string(),
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{}_{}", base, count)
            };
            *count += 1;
            name
        })
        .collect()
}

/// Flatten records into a header row plus value rows.
///
/// The header is the union of field names in first-seen order.
pub fn records_to_rows(records: &[Value]) -> (Vec<String>, Vec<Vec<Value>>) {
    let mut headers: Vec<String> = Vec::new();
    for record in records {
        if let Some(obj) = record.as_object() {
            for key in obj.keys() {
                if !headers.iter().any(|h| h == key) {
                    headers.push(key.clone());
                }
            }
        }
    }

    let rows = records
        .iter()
        .map(|record| {
            headers
                .iter()
                .map(|h| record.get(h).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    (headers, rows)
}
