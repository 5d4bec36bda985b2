//! Grouper - collects one field's values per distinct value of another.
//!
//! ```text
//! {sex: male,   name: Alex}                {sex: male,   name: [Alex, Jim]}
//! {sex: female, name: Mary}   ─────────▶   {sex: female, name: [Mary]}
//! {sex: male,   name: Jim}
//! ```
//!
//! An array-valued grouping field puts the record in one group per element.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::MapResult;
use crate::logs::LogEntry;
use crate::models::{field, number_value, Collection};
use crate::store::Store;
use crate::transform::dsl::config::AggregateParams;
use crate::transform::dsl::operations::OpContext;

/// Group identity. Numbers compare by value, so `1` and `1.0` share a group.
fn group_key(value: &Value) -> String {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(|f| number_value(f).to_string())
            .unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}

/// `aggregate`: write one record per distinct `aggregationField` value to
/// collection `name` (the job's own collection when omitted), each holding
/// the `aggregatedField` values of its group in encounter order. Groups are
/// ordered by first appearance. The output replaces `name`.
pub fn aggregate(store: &mut Store, ctx: &OpContext<'_>, params: &AggregateParams) -> MapResult<()> {
    let name = params.name.as_deref().unwrap_or(ctx.collection);
    let aggregated = params
        .aggregated_field
        .as_deref()
        .ok_or_else(|| ctx.missing_field("aggregatedField"))?;
    let aggregation = params
        .aggregation_field
        .as_deref()
        .ok_or_else(|| ctx.missing_field("aggregationField"))?;

    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0;

    for record in store.get(ctx.collection)? {
        let Some(key) = field(record, aggregation) else {
            skipped += 1;
            continue;
        };
        let contributed = field(record, aggregated).cloned().unwrap_or(Value::Null);
        let keys: Vec<&Value> = match key {
            Value::Array(items) => items.iter().collect(),
            scalar => vec![scalar],
        };

        for key in keys {
            let slot = *index.entry(group_key(key)).or_insert_with(|| {
                groups.push((key.clone(), Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(contributed.clone());
        }
    }

    if skipped > 0 {
        ctx.observer().log(
            LogEntry::warning(format!(
                "{} records of '{}' have no '{}' and were not aggregated",
                skipped, ctx.collection, aggregation
            ))
            .with_indent(1),
        );
    }

    let grouped: Collection = groups
        .into_iter()
        .map(|(key, values)| {
            let mut record = Map::new();
            record.insert(aggregation.to_string(), key);
            record.insert(aggregated.to_string(), Value::Array(values));
            Value::Object(record)
        })
        .collect();

    store.set(name, grouped);
    Ok(())
}
