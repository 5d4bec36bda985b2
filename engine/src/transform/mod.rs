//! Transformation module.
//!
//! - DSL: config, operators and the interpreter
//! - Grouper: `aggregate`
//! - Merger: `mergeObjects`
//! - Pipeline: run a config file end to end

pub mod dsl;
pub mod grouper;
pub mod merger;
pub mod pipeline;

pub use dsl::*;
pub use grouper::aggregate;
pub use merger::merge_objects;
pub use pipeline::*;
