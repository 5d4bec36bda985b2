//! DSL for declarative collection pipelines
//!
//! This module provides:
//! - `config`: the job tree and every operator's parameters
//! - `reference`: array parameters given inline or by collection name
//! - `expression`: the sandboxed `{map: ...}` value language
//! - `operations`: the record-level operators
//! - `executor`: the interpreter walking a config against a store
//!
//! ## Usage Flow
//!
//! ```text
//! YAML/JSON → Config → Interpreter::run(&mut Store) → collections, saved files
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use tabmap::{Config, Interpreter, Store};
//!
//! let config = Config::from_file("gods.yaml")?;
//! let mut store = Store::new();
//! Interpreter::new().with_base_dir("data").run(&config, &mut store)?;
//! println!("{:?}", store.get("Male God names")?);
//! ```

pub mod config;
pub mod executor;
pub mod expression;
pub mod operations;
pub mod reference;

// Re-exports for convenience
pub use config::{example_config, Config, Job, Op};
pub use executor::{run, Interpreter, Mapper, MapperRegistry, RunSummary};
pub use expression::Expression;
pub use operations::OpContext;
pub use reference::Reference;
