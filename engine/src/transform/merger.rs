//! Merger - joins another collection into the job's collection on a
//! composite key.
//!
//! Every incoming record is merged into *every* target record whose key
//! fields are all equal (two absent fields count as equal). Incoming fields
//! overwrite target fields. Unmatched incoming records are appended unless
//! the merge is strict.

use serde_json::Value;

use crate::error::MapResult;
use crate::models::{field, field_eq, is_truthy};
use crate::store::Store;
use crate::transform::dsl::config::MergeParams;
use crate::transform::dsl::operations::OpContext;

fn keys_match(keys: &[String], target: &Value, incoming: &Value) -> bool {
    keys.iter().all(|k| field_eq(field(target, k), field(incoming, k)))
}

/// `mergeObjects`: merge collection `name` into the job's collection.
/// Replaces the job's collection; `name` is left as is.
pub fn merge_objects(store: &mut Store, ctx: &OpContext<'_>, params: &MergeParams) -> MapResult<()> {
    let other = params.name.as_deref().ok_or_else(|| ctx.missing_field("name"))?;
    let keys: Vec<String> = match &params.key {
        None => return Err(ctx.missing_field("key")),
        Some(Value::Array(items)) if items.is_empty() => return Err(ctx.missing_field("key")),
        Some(Value::Array(items)) => items
            .iter()
            .map(|k| {
                k.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ctx.invalid_param("key", "an array of field names"))
            })
            .collect::<MapResult<_>>()?,
        Some(_) => return Err(ctx.invalid_param("key", "an array of field names")),
    };
    let strict = is_truthy(&params.strict);

    let mut merged = store.get(ctx.collection)?.clone();
    let incoming = store.get(other)?;

    let mut unmatched = Vec::new();
    for record in incoming {
        let mut matched = false;
        for target in merged.iter_mut() {
            if !keys_match(&keys, target, record) {
                continue;
            }
            if let (Some(target), Some(fields)) = (target.as_object_mut(), record.as_object()) {
                for (name, value) in fields {
                    target.insert(name.clone(), value.clone());
                }
            }
            matched = true;
        }
        if !matched && !strict {
            unmatched.push(record.clone());
        }
    }

    merged.extend(unmatched);
    store.set(ctx.collection, merged);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MapError;
    use serde_json::json;

    fn columns() -> Store {
        let mut store = Store::new();
        store.set(
            "col1",
            vec![
                json!({"k1": 1, "k2": "a", "v": "x"}),
                json!({"k1": 2, "k2": "b", "v": "y"}),
            ],
        );
        store.set(
            "col2",
            vec![
                json!({"k1": 1, "k2": "a", "w": "extra"}),
                json!({"k1": 3, "k2": "c", "w": "lonely"}),
            ],
        );
        store
    }

    fn params(value: Value) -> MergeParams {
        serde_json::from_value(value).unwrap()
    }

    fn ctx() -> OpContext<'static> {
        OpContext::detached("col1", "mergeObjects")
    }

    #[test]
    fn test_merge_non_strict_appends_unmatched() {
        let mut store = columns();
        let p = params(json!({"name": "col2", "key": ["k1", "k2"]}));
        merge_objects(&mut store, &ctx(), &p).unwrap();

        assert_eq!(
            store.get("col1").unwrap(),
            &vec![
                json!({"k1": 1, "k2": "a", "v": "x", "w": "extra"}),
                json!({"k1": 2, "k2": "b", "v": "y"}),
                json!({"k1": 3, "k2": "c", "w": "lonely"}),
            ]
        );
        assert_eq!(store.get("col2").unwrap().len(), 2);
    }

    #[test]
    fn test_merge_overwrites_conflicting_fields() {
        let mut store = Store::new();
        store.set("col1", vec![json!({"k": "1", "a": "x"})]);
        store.set("col2", vec![json!({"k": "1", "a": "y", "b": "z"})]);

        merge_objects(&mut store, &ctx(), &params(json!({"name": "col2", "key": ["k"]}))).unwrap();

        let col1 = store.get("col1").unwrap();
        assert_eq!(col1, &vec![json!({"k": "1", "a": "y", "b": "z"})]);
        let fields: Vec<&str> = col1[0].as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(fields, vec!["k", "a", "b"]);
    }

    #[test]
    fn test_strict_drops_exactly_the_unmatched() {
        let mut strict = columns();
        let mut loose = columns();
        merge_objects(&mut strict, &ctx(), &params(json!({"name": "col2", "key": ["k1"], "strict": true}))).unwrap();
        merge_objects(&mut loose, &ctx(), &params(json!({"name": "col2", "key": ["k1"]}))).unwrap();

        let unmatched = 1;
        assert_eq!(strict.get("col1").unwrap().len() + unmatched, loose.get("col1").unwrap().len());
        assert_eq!(strict.get("col1").unwrap()[0]["w"], "extra");
    }

    #[test]
    fn test_one_incoming_record_merges_into_all_matches() {
        let mut store = Store::new();
        store.set("col1", vec![json!({"k": "a", "n": 1}), json!({"k": "a", "n": 2}), json!({"n": 3})]);
        store.set("col2", vec![json!({"k": "a", "tag": "t"}), json!({"tag": "keyless"})]);

        merge_objects(&mut store, &ctx(), &params(json!({"name": "col2", "key": ["k"], "strict": 1}))).unwrap();

        let col1 = store.get("col1").unwrap();
        assert_eq!(col1[0]["tag"], "t");
        assert_eq!(col1[1]["tag"], "t");
        // both records lack `k`, so they match
        assert_eq!(col1[2], json!({"n": 3, "tag": "keyless"}));
    }

    #[test]
    fn test_merge_key_validation() {
        let mut store = columns();
        let err = merge_objects(&mut store, &ctx(), &params(json!({"name": "col2", "key": []}))).unwrap_err();
        assert!(matches!(err, MapError::MissingConfigField { ref field, .. } if field == "key"));

        let err = merge_objects(&mut store, &ctx(), &params(json!({"name": "col2", "key": "k1"}))).unwrap_err();
        assert!(matches!(err, MapError::InvalidParamType { .. }));

        let err = merge_objects(&mut store, &ctx(), &params(json!({"name": "nope", "key": ["k1"]}))).unwrap_err();
        assert!(matches!(err, MapError::MissingCollection { ref name } if name == "nope"));
    }
}
