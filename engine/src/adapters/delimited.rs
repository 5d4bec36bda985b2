//! CSV files read as single-sheet tables, with encoding and delimiter
//! auto-detection.

use std::path::Path;

use serde_json::Value;

use super::grid::{CellAddress, Grid};
use crate::error::{AdapterError, AdapterResult};

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> AdapterResult<String> {
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8_lossy(bytes).into_owned(),
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        other => {
            let codec = encoding_rs::Encoding::for_label(other.as_bytes())
                .ok_or_else(|| AdapterError::Encoding(format!("unsupported encoding '{}'", other)))?;
            codec.decode(bytes).0.into_owned()
        }
    };
    Ok(decoded.trim_start_matches('\u{feff}').to_string())
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> u8 {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [b';', b',', b'\t', b'|'];
    let mut best_sep = b',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep as char).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV text into a grid. Every non-empty cell is a string.
pub fn parse_grid(content: &str, delimiter: u8) -> AdapterResult<Grid> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|cell| {
                    let cell = cell.trim();
                    if cell.is_empty() {
                        Value::Null
                    } else {
                        Value::String(cell.to_string())
                    }
                })
                .collect(),
        );
    }

    Ok(Grid::new(CellAddress::default(), rows))
}

/// Read a CSV file into a grid, auto-detecting encoding and delimiter.
pub fn read_csv(path: &Path) -> AdapterResult<Grid> {
    let bytes = std::fs::read(path)?;
    let encoding = detect_encoding(&bytes);
    let content = decode_content(&bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    tracing::debug!(
        "{}: encoding {}, delimiter '{}'",
        path.display(),
        encoding,
        delimiter as char
    );
    parse_grid(&content, delimiter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_grid_to_records() {
        let grid = parse_grid("name;sex\nZeus;male\n;\nHera;female\n", b';').unwrap();
        let records = grid.to_records(grid.bounds().unwrap());

        assert_eq!(records.len(), 2);
        assert_eq!(records[0], json!({"name": "Zeus", "sex": "male"}));
        assert_eq!(records[1]["name"], "Hera");
    }

    #[test]
    fn test_quoted_values() {
        let grid = parse_grid("name,motto\n\"Athena\",\"wise, brave\"\n", b',').unwrap();
        let records = grid.to_records(grid.bounds().unwrap());
        assert_eq!(records[0]["motto"], "wise, brave");
    }

    #[test]
    fn test_ragged_rows() {
        let grid = parse_grid("a,b,c\n1,2\n1,2,3,4\n", b',').unwrap();
        let records = grid.to_records(grid.bounds().unwrap());
        assert_eq!(records[0], json!({"a": "1", "b": "2"}));
        assert_eq!(records[1]["__EMPTY"], "4");
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), b';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), b',');
        assert_eq!(detect_delimiter("a\tb\tc"), b'\t');
        assert_eq!(detect_delimiter("a|b|c"), b'|');
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_read_csv_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("gods.csv");
        std::fs::write(&path, "name;sex\nApollo;male\n").unwrap();

        let grid = read_csv(&path).unwrap();
        let records = grid.to_records(grid.bounds().unwrap());
        assert_eq!(records, vec![json!({"name": "Apollo", "sex": "male"})]);
    }
}
