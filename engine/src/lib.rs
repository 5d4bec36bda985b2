//! # Tabmap - declarative transformations of spreadsheet records
//!
//! Tabmap reads sheets of a workbook (or CSV/JSON files) into named
//! collections of records, reshapes them with a YAML pipeline of jobs, and
//! writes results back as workbooks with a JSON mirror.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ xlsx / csv  │────▶│  Adapters   │────▶│    Store    │────▶│ xlsx + json │
//! │    json     │     │  (load)     │     │ ◀── jobs ── │     │   (save)    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tabmap::{run_config_file, PipelineOptions};
//!
//! let options = PipelineOptions { relative_to_config: true, ..Default::default() };
//! let report = run_config_file("gods.yaml", options)?;
//! println!("{}", report.summary());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Records and value comparison rules
//! - [`store`] - The named collection registry
//! - [`logs`] - Log entries and observers
//! - [`adapters`] - Workbook, CSV and JSON files
//! - [`transform`] - DSL, operators, interpreter and pipeline

// Core modules
pub mod error;
pub mod models;
pub mod store;
pub mod logs;

// File I/O
pub mod adapters;

// Transformation
pub mod transform;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    AdapterError,
    ConfigError,
    ExpressionError,
    MapError,
    MapResult,
    PipelineError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{Collection, Record};
pub use store::Store;
pub use logs::{LogEntry, LogLevel, MemoryObserver, Observer, TracingObserver};

// =============================================================================
// Re-exports - Adapters
// =============================================================================

pub use adapters::{read_records, write_records, SheetSelection};
pub use adapters::workbook::sheet_names;

// =============================================================================
// Re-exports - DSL
// =============================================================================

pub use transform::dsl::{
    example_config,
    run,
    Config,
    Expression,
    Interpreter,
    Job,
    Mapper,
    MapperRegistry,
    Op,
    Reference,
    RunSummary,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    run_config_file,
    run_config_str,
    Pipeline,
    PipelineOptions,
    PipelineReport,
};
