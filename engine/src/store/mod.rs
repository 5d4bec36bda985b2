//! Collection Store - the in-memory registry every operator reads and writes.
//!
//! Reading an absent collection is an error; writing creates it.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{MapError, MapResult};
use crate::models::Collection;

/// Registry of named collections for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Store {
    collections: HashMap<String, Collection>,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a collection by name
    pub fn get(&self, name: &str) -> MapResult<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| MapError::MissingCollection {
                name: name.to_string(),
            })
    }

    /// Get a collection for in-place mutation
    pub fn get_mut(&mut self, name: &str) -> MapResult<&mut Collection> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| MapError::MissingCollection {
                name: name.to_string(),
            })
    }

    /// Replace (or create) a collection
    pub fn set(&mut self, name: impl Into<String>, collection: Collection) {
        self.collections.insert(name.into(), collection);
    }

    /// Append values to a collection, creating it if absent
    pub fn append<I>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        self.collections
            .entry(name.to_string())
            .or_default()
            .extend(values);
    }

    /// Remove a collection, returning its contents
    pub fn remove(&mut self, name: &str) -> Option<Collection> {
        self.collections.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Collection names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.collections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of collections
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Consume the store, returning the underlying map
    pub fn into_inner(self) -> HashMap<String, Collection> {
        self.collections
    }
}

impl From<HashMap<String, Collection>> for Store {
    fn from(collections: HashMap<String, Collection>) -> Self {
        Self { collections }
    }
}

impl<S: Into<String>> FromIterator<(S, Collection)> for Store {
    fn from_iter<T: IntoIterator<Item = (S, Collection)>>(iter: T) -> Self {
        Self {
            collections: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_missing_collection() {
        let store = Store::new();
        let err = store.get("nope").unwrap_err();
        assert!(matches!(err, MapError::MissingCollection { ref name } if name == "nope"));
    }

    #[test]
    fn test_append_creates_and_extends() {
        let mut store = Store::new();
        store.append("out", vec![json!({"f1": "a"})]);
        store.append("out", vec![json!({"f1": "b"})]);
        let out = store.get("out").unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1]["f1"], "b");
    }

    #[test]
    fn test_set_replaces() {
        let mut store: Store = [("in1", vec![json!({"a": 1}), json!({"a": 2})])]
            .into_iter()
            .collect();
        store.set("in1", vec![json!({"a": 3})]);
        assert_eq!(store.get("in1").unwrap().len(), 1);
    }

    #[test]
    fn test_names_sorted() {
        let mut store = Store::new();
        store.set("b", vec![]);
        store.set("a", vec![]);
        assert_eq!(store.names(), vec!["a", "b"]);
        assert_eq!(store.len(), 2);
    }
}
