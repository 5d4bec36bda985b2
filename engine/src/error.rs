//! Error types for the Tabmap transformation engine.
//!
//! Errors are layered the same way the engine is:
//!
//! - [`AdapterError`] - reading and writing workbooks, CSV and JSON files
//! - [`ExpressionError`] - parsing `mapValues` expressions
//! - [`ConfigError`] - loading a pipeline configuration
//! - [`MapError`] - operator failures while a pipeline runs
//! - [`PipelineError`] - top-level orchestration errors
//!
//! Conversion is automatic via `From` implementations, so `?` works across
//! layer boundaries. Every error aborts the run it occurs in.

use std::path::PathBuf;

use thiserror::Error;

// =============================================================================
// Adapter Errors
// =============================================================================

/// Errors raised by the file adapters.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Failed to read or write a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The workbook could not be opened or a sheet could not be read.
    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    /// The workbook could not be written.
    #[error("Workbook write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// The CSV content is malformed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The CSV bytes could not be decoded.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The requested sheet does not exist in the workbook.
    #[error("Sheet '{sheet}' not found in {}", .path.display())]
    SheetNotFound { path: PathBuf, sheet: String },

    /// A range override is not a valid cell address.
    #[error("Invalid cell address: '{0}'")]
    InvalidCellAddress(String),

    /// A JSON file does not hold an array at its root.
    #[error("{} does not contain a JSON array", .0.display())]
    NotARecordArray(PathBuf),

    /// A collection has more fields than a sheet has columns.
    #[error("Too many columns for a sheet: {0}")]
    TooManyColumns(usize),
}

// =============================================================================
// Expression Errors
// =============================================================================

/// A `mapValues` expression failed to parse.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("at offset {position}: {message}")]
pub struct ExpressionError {
    /// Byte offset in the expression text.
    pub position: usize,
    pub message: String,
}

impl ExpressionError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors while loading a pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// YAML is malformed or does not describe a job tree.
    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON is malformed or does not describe a job tree.
    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Map Errors (operator failures)
// =============================================================================

/// Errors raised by operators while a pipeline runs.
///
/// Each variant names the collection and operator that failed so the caller
/// can report it without further context.
#[derive(Debug, Error)]
pub enum MapError {
    /// A referenced collection is absent from the store.
    #[error("Collection '{name}' is missing")]
    MissingCollection { name: String },

    /// A required parameter is absent.
    #[error("{collection}.{operator}: required parameter '{field}' is missing")]
    MissingConfigField {
        collection: String,
        operator: String,
        field: String,
    },

    /// A (resolved) parameter does not have the expected shape.
    #[error("{collection}.{operator}: parameter '{param}' is not {expected}")]
    InvalidParamType {
        collection: String,
        operator: String,
        param: String,
        expected: String,
    },

    /// Mutually exclusive parameters were given together.
    #[error("{collection}.{operator}: {params} cannot be given together")]
    ConflictingParams {
        collection: String,
        operator: String,
        params: String,
    },

    /// The sheet to load does not exist.
    #[error("Sheet '{sheet}' not found in {}", .path.display())]
    SheetNotFound { path: PathBuf, sheet: String },

    /// A `map` expression could not be parsed.
    #[error("{collection}.mapValues: invalid expression {source}")]
    Expression {
        collection: String,
        #[source]
        source: ExpressionError,
    },

    /// A `call` entry names a mapper nobody registered.
    #[error("{collection}.mapValues: no mapper registered as '{name}'")]
    UnknownMapper { collection: String, name: String },

    /// File adapter failure.
    #[error("{0}")]
    Adapter(AdapterError),
}

impl From<AdapterError> for MapError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::SheetNotFound { path, sheet } => MapError::SheetNotFound { path, sheet },
            other => MapError::Adapter(other),
        }
    }
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
///
/// This is the error type returned by [`crate::transform::pipeline::run_config_file`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// An operator failed.
    #[error("Run failed: {0}")]
    Map(#[from] MapError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Result type for config loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for operators and the interpreter.
pub type MapResult<T> = Result<T, MapError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
