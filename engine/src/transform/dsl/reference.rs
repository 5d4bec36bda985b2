//! Parameters that are either a literal array or the name of a collection.
//!
//! A plain string in an array-typed parameter means "use the contents of the
//! collection with this name". Resolution happens right before an operator
//! checks the parameter's shape, so collections built earlier in the same run
//! (for instance with `copyToArray`) can drive later operators.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MapResult;
use crate::store::Store;

use super::operations::OpContext;

/// A literal value or an indirection through the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Reference {
    /// Name of the collection to use
    Named(String),
    /// The value itself, checked when resolved
    Literal(Value),
}

impl Reference {
    /// Resolve to an array of values.
    ///
    /// Fails with `MissingCollection` when the named collection is absent
    /// and with `InvalidParamType` when a literal is not an array.
    pub fn resolve(&self, store: &Store, ctx: &OpContext<'_>, param: &str) -> MapResult<Vec<Value>> {
        match self {
            Reference::Named(name) => Ok(store.get(name)?.clone()),
            Reference::Literal(Value::Array(items)) => Ok(items.clone()),
            Reference::Literal(_) => Err(ctx.invalid_param(param, "an array")),
        }
    }

    /// Resolve to an array and deserialize every element as `T`.
    pub fn resolve_as<T: DeserializeOwned>(
        &self,
        store: &Store,
        ctx: &OpContext<'_>,
        param: &str,
        expected: &str,
    ) -> MapResult<Vec<T>> {
        self.resolve(store, ctx, param)?
            .into_iter()
            .map(|item| {
                serde_json::from_value(item).map_err(|_| ctx.invalid_param(param, expected))
            })
            .collect()
    }
}

impl From<Vec<Value>> for Reference {
    fn from(items: Vec<Value>) -> Self {
        Reference::Literal(Value::Array(items))
    }
}

impl From<&str> for Reference {
    fn from(name: &str) -> Self {
        Reference::Named(name.to_string())
    }
}
