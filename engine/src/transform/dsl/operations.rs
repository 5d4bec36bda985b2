//! Collection operators.
//!
//! Every operator takes the store, an [`OpContext`] naming the job's
//! collection, and its own parameters. Operators either replace the
//! collection's record list or mutate its records in place; which one is
//! stated on each function.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::config::{CloneParams, CopyToArrayParams, FilterFieldsParams, LoadParams, Predicate, SaveParams};
use super::executor::{Mapper, MapperRegistry};
use super::expression::Expression;
use super::reference::Reference;
use crate::adapters::{self, SheetSelection};
use crate::error::{MapError, MapResult};
use crate::logs::{LogEntry, Observer, TracingObserver};
use crate::models::{contains, field, is_truthy, strict_eq, Collection};
use crate::store::Store;

// =============================================================================
// Operator context
// =============================================================================

/// What an operator needs besides the store: where it runs and who listens.
#[derive(Clone, Copy)]
pub struct OpContext<'a> {
    /// The job's collection
    pub collection: &'a str,
    /// The running operator's config key, e.g. `filterObjects`
    pub operator: &'static str,
    observer: &'a dyn Observer,
    base_dir: Option<&'a Path>,
    mappers: Option<&'a MapperRegistry>,
}

impl<'a> OpContext<'a> {
    /// A context that logs through `tracing`, with no base directory and no
    /// registered mappers.
    pub fn detached(collection: &'a str, operator: &'static str) -> Self {
        Self {
            collection,
            operator,
            observer: &TracingObserver,
            base_dir: None,
            mappers: None,
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn Observer) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_base_dir(mut self, base_dir: Option<&'a Path>) -> Self {
        self.base_dir = base_dir;
        self
    }

    pub fn with_mappers(mut self, mappers: &'a MapperRegistry) -> Self {
        self.mappers = Some(mappers);
        self
    }

    /// Same context, another operator
    pub fn for_operator(mut self, operator: &'static str) -> Self {
        self.operator = operator;
        self
    }

    pub fn observer(&self) -> &'a dyn Observer {
        self.observer
    }

    /// Resolve a config path against the base directory
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn mapper(&self, name: &str) -> MapResult<Mapper> {
        self.mappers
            .and_then(|m| m.get(name))
            .ok_or_else(|| MapError::UnknownMapper {
                collection: self.collection.to_string(),
                name: name.to_string(),
            })
    }

    fn log(&self, entry: LogEntry) {
        self.observer.log(entry.with_indent(1));
    }

    pub fn missing_field(&self, field: &str) -> MapError {
        MapError::MissingConfigField {
            collection: self.collection.to_string(),
            operator: self.operator.to_string(),
            field: field.to_string(),
        }
    }

    pub fn invalid_param(&self, param: &str, expected: &str) -> MapError {
        MapError::InvalidParamType {
            collection: self.collection.to_string(),
            operator: self.operator.to_string(),
            param: param.to_string(),
            expected: expected.to_string(),
        }
    }

    /// Read this operator's raw config value as `T`.
    pub fn params<T: DeserializeOwned>(&self, raw: &Value, expected: &str) -> MapResult<T> {
        serde_json::from_value(raw.clone())
            .map_err(|err| self.invalid_param(self.operator, &format!("{} ({})", expected, err)))
    }

    pub fn conflicting(&self, params: &str) -> MapError {
        MapError::ConflictingParams {
            collection: self.collection.to_string(),
            operator: self.operator.to_string(),
            params: params.to_string(),
        }
    }
}

fn required<'p, T: ?Sized>(value: Option<&'p T>, ctx: &OpContext<'_>, name: &str) -> MapResult<&'p T> {
    value.ok_or_else(|| ctx.missing_field(name))
}

// =============================================================================
// load / save
// =============================================================================

/// Read a file into the collection, replacing it.
///
/// `.json` files are parsed whole; other files are read from the sheet named
/// `sheetName` (default: the collection name), optionally narrowed with
/// `rangeFrom` / `rangeTo`.
pub fn load(store: &mut Store, ctx: &OpContext<'_>, params: &LoadParams) -> MapResult<()> {
    let path = ctx.resolve_path(required(params.path.as_deref(), ctx, "path")?);
    let selection = SheetSelection {
        sheet_name: params.sheet_name.as_deref().unwrap_or(ctx.collection),
        range_from: params.range_from.as_deref(),
        range_to: params.range_to.as_deref(),
    };

    let records = adapters::read_records(&path, &selection)?;
    ctx.log(LogEntry::info(format!(
        "Read {} records from {}",
        records.len(),
        path.display()
    )));
    store.set(ctx.collection, records);
    Ok(())
}

/// Write the collection to a new single-sheet workbook at `path` and a JSON
/// mirror at `path.json`.
pub fn save(store: &mut Store, ctx: &OpContext<'_>, params: &SaveParams) -> MapResult<()> {
    let path = ctx.resolve_path(required(params.path.as_deref(), ctx, "path")?);
    let sheet_name = params.sheet_name.as_deref().unwrap_or(ctx.collection);
    let records = store.get(ctx.collection)?;

    let mirror = adapters::write_records(&path, sheet_name, records)?;
    ctx.log(LogEntry::info(format!(
        "Wrote {} records to {} and {}",
        records.len(),
        path.display(),
        mirror.display()
    )));
    Ok(())
}

// =============================================================================
// copyTo / copyToArray
// =============================================================================

/// Append a copy of every record to `dest`, creating it if absent.
pub fn copy_to(store: &mut Store, ctx: &OpContext<'_>, dest: &str) -> MapResult<()> {
    let copies = store.get(ctx.collection)?.clone();
    store.append(dest, copies);
    Ok(())
}

/// Append `record[field]` of every record to the value array `copyTo`.
/// Records without the field contribute `null`.
pub fn copy_to_array(store: &mut Store, ctx: &OpContext<'_>, params: &CopyToArrayParams) -> MapResult<()> {
    let dest = required(params.copy_to.as_deref(), ctx, "copyTo")?;
    let name = required(params.field.as_deref(), ctx, "field")?;

    let values: Vec<Value> = store
        .get(ctx.collection)?
        .iter()
        .map(|record| field(record, name).cloned().unwrap_or(Value::Null))
        .collect();
    store.append(dest, values);
    Ok(())
}

// =============================================================================
// cloneObjects
// =============================================================================

/// Emit every record, followed by one clone per entry of `values` when
/// `record[field]` is in `filter`. Replaces the collection.
pub fn clone_objects(store: &mut Store, ctx: &OpContext<'_>, params: &CloneParams) -> MapResult<()> {
    let name = required(params.field.as_deref(), ctx, "field")?;
    let source = store.get(ctx.collection)?;
    let filter = required(params.filter.as_ref(), ctx, "filter")?.resolve(store, ctx, "filter")?;
    let values = required(params.values.as_ref(), ctx, "values")?.resolve(store, ctx, "values")?;

    let mut cloned: Collection = Vec::with_capacity(source.len());
    for record in source {
        cloned.push(record.clone());
        if !contains(&filter, field(record, name)) {
            continue;
        }
        for value in &values {
            let mut clone = record.clone();
            if let Some(obj) = clone.as_object_mut() {
                obj.insert(name.to_string(), value.clone());
            }
            cloned.push(clone);
        }
    }

    store.set(ctx.collection, cloned);
    Ok(())
}

// =============================================================================
// filterObjects / filterFields
// =============================================================================

enum Rule {
    Include(Vec<Value>),
    Exclude(Vec<Value>),
}

impl Rule {
    fn accepts(&self, value: Option<&Value>) -> bool {
        match self {
            Rule::Include(list) => contains(list, value),
            Rule::Exclude(list) => !contains(list, value),
        }
    }
}

/// Keep the records satisfying every predicate, in order. Replaces the
/// collection.
pub fn filter_objects(store: &mut Store, ctx: &OpContext<'_>, predicates: &[Predicate]) -> MapResult<()> {
    let source = store.get(ctx.collection)?;

    let mut rules = Vec::with_capacity(predicates.len());
    for predicate in predicates {
        let name = required(predicate.field.as_deref(), ctx, "field")?;
        let rule = match (&predicate.include, &predicate.exclude) {
            (Some(_), Some(_)) => return Err(ctx.conflicting("include and exclude")),
            (Some(include), None) => Rule::Include(include.resolve(store, ctx, "include")?),
            (None, Some(exclude)) => Rule::Exclude(exclude.resolve(store, ctx, "exclude")?),
            (None, None) => return Err(ctx.missing_field("include or exclude")),
        };
        rules.push((name, rule));
    }

    let kept: Collection = source
        .iter()
        .filter(|record| rules.iter().all(|(name, rule)| rule.accepts(field(record, name))))
        .cloned()
        .collect();

    store.set(ctx.collection, kept);
    Ok(())
}

/// Drop the fields not `include`d, or the `exclude`d ones, from every record
/// in place.
pub fn filter_fields(store: &mut Store, ctx: &OpContext<'_>, params: &FilterFieldsParams) -> MapResult<()> {
    store.get(ctx.collection)?;

    const EXPECTED: &str = "an array of field names";
    let (names, keep_listed) = match (&params.include, &params.exclude) {
        (Some(_), Some(_)) => return Err(ctx.conflicting("include and exclude")),
        (Some(include), None) => (include.resolve_as::<String>(store, ctx, "include", EXPECTED)?, true),
        (None, Some(exclude)) => (exclude.resolve_as::<String>(store, ctx, "exclude", EXPECTED)?, false),
        (None, None) => return Err(ctx.missing_field("include or exclude")),
    };

    for record in store.get_mut(ctx.collection)? {
        if let Some(obj) = record.as_object_mut() {
            obj.retain(|key, _| names.contains(key) == keep_listed);
        }
    }
    Ok(())
}

// =============================================================================
// mapFields
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
struct FieldMapping {
    from: String,
    to: String,
    #[serde(default)]
    copy: Value,
}

fn field_mappings(store: &Store, ctx: &OpContext<'_>, mapping: &Reference) -> MapResult<Vec<FieldMapping>> {
    // `{old: new}` shorthand renames
    if let Reference::Literal(Value::Object(pairs)) = mapping {
        return pairs
            .iter()
            .map(|(from, to)| match to {
                Value::String(to) => Ok(FieldMapping {
                    from: from.clone(),
                    to: to.clone(),
                    copy: Value::Null,
                }),
                _ => Err(ctx.invalid_param("mapping", "a map of field names")),
            })
            .collect();
    }
    mapping.resolve_as(store, ctx, "mapping", "an array of {from, to, copy} entries")
}

/// Rename (or duplicate, when `copy` is truthy) fields of every record in
/// place. Entries apply in order, each over the whole collection.
pub fn map_fields(store: &mut Store, ctx: &OpContext<'_>, mapping: &Reference) -> MapResult<()> {
    store.get(ctx.collection)?;
    let mappings = field_mappings(store, ctx, mapping)?;

    for mapping in &mappings {
        // a field renamed onto itself stays in place
        if mapping.from == mapping.to {
            continue;
        }
        let keep_source = is_truthy(&mapping.copy);
        for record in store.get_mut(ctx.collection)? {
            let Some(obj) = record.as_object_mut() else {
                continue;
            };
            let Some(value) = obj.get(&mapping.from).cloned() else {
                continue;
            };
            obj.insert(mapping.to.clone(), value);
            if !keep_source {
                obj.shift_remove(&mapping.from);
            }
        }
    }
    Ok(())
}

// =============================================================================
// mapValues
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ValueMapping {
    Replace { field: String, from: Value, to: Value },
    Expression { map: String },
    Callback { call: String },
}

enum ValueRule {
    Replace { field: String, from: Value, to: Value },
    Expression(Expression),
    Callback(Mapper),
}

/// Rewrite values of every record in place.
///
/// Entries are `{field, from, to}` exact-match replacements, `{map: expr}`
/// expressions, or `{call: name}` mappers registered on the interpreter.
/// Every entry is checked before any record changes.
pub fn map_values(store: &mut Store, ctx: &OpContext<'_>, mapping: &Reference) -> MapResult<()> {
    store.get(ctx.collection)?;
    let entries: Vec<ValueMapping> = mapping.resolve_as(
        store,
        ctx,
        "mapping",
        "an array of {field, from, to}, {map} or {call} entries",
    )?;

    let rules = entries
        .into_iter()
        .map(|entry| match entry {
            ValueMapping::Replace { field, from, to } => Ok(ValueRule::Replace { field, from, to }),
            ValueMapping::Expression { map } => Expression::parse(&map)
                .map(ValueRule::Expression)
                .map_err(|source| MapError::Expression {
                    collection: ctx.collection.to_string(),
                    source,
                }),
            ValueMapping::Callback { call } => ctx.mapper(&call).map(ValueRule::Callback),
        })
        .collect::<MapResult<Vec<_>>>()?;

    for rule in &rules {
        for record in store.get_mut(ctx.collection)? {
            let Some(obj) = record.as_object_mut() else {
                continue;
            };
            match rule {
                ValueRule::Replace { field, from, to } => {
                    if obj.get(field).is_some_and(|v| strict_eq(v, from)) {
                        obj.insert(field.clone(), to.clone());
                    }
                }
                ValueRule::Expression(expression) => expression.apply(obj),
                ValueRule::Callback(mapper) => mapper(obj),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collections() -> Store {
        let mut store = Store::new();
        store.set("in1", vec![json!({"f1": "in1-o1-f1"}), json!({"f1": "in1-o2-f1"})]);
        store.set("in2", vec![json!({"f1": "in2-o1-f1"}), json!({"f1": "in2-o2-f1"})]);
        store.set(
            "in3",
            (1..=6)
                .map(|i| json!({"f1": format!("in3-o{}-f1", i), "f2": format!("in3-o{}-f2", i)}))
                .collect(),
        );
        store.set(
            "in4",
            vec![
                json!({"f1": "in4-o1-f1", "f2": "in4-o1-f2", "f3": "in4-o1-f3"}),
                json!({"f1": "in4-o2-f1", "f2": "in4-o2-f2", "f3": "in4-o2-f3"}),
            ],
        );
        store
    }

    fn ctx<'a>(collection: &'a str, operator: &'static str) -> OpContext<'a> {
        OpContext::detached(collection, operator)
    }

    fn params<T: serde::de::DeserializeOwned>(value: Value) -> T {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_copy_to_appends_in_order() {
        let mut store = collections();
        copy_to(&mut store, &ctx("in1", "copyTo"), "out1").unwrap();
        copy_to(&mut store, &ctx("in2", "copyTo"), "out1").unwrap();

        let out = store.get("out1").unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[0]["f1"], "in1-o1-f1");
        assert_eq!(out[3]["f1"], "in2-o2-f1");
        assert_eq!(store.get("in1").unwrap().len(), 2);
    }

    #[test]
    fn test_copy_to_existing_destination_keeps_its_records() {
        let mut store = collections();
        let before = store.get("in2").unwrap().clone();
        copy_to(&mut store, &ctx("in1", "copyTo"), "in2").unwrap();

        let dest = store.get("in2").unwrap();
        let source = store.get("in1").unwrap();
        assert_eq!(dest.len(), before.len() + source.len());
        assert_eq!(&dest[..before.len()], &before[..]);
        for (i, record) in source.iter().enumerate() {
            assert_eq!(&dest[before.len() + i], record);
        }
    }

    #[test]
    fn test_copy_to_missing_source() {
        let mut store = collections();
        let err = copy_to(&mut store, &ctx("nope", "copyTo"), "out").unwrap_err();
        assert!(matches!(err, MapError::MissingCollection { .. }));
        assert!(!store.contains("out"));
    }

    #[test]
    fn test_clone_objects_inserts_after_source() {
        let mut store = Store::new();
        store.set("s", vec![json!({"f1": "a", "f2": "x"}), json!({"f1": "b", "f2": "y"})]);
        let p: CloneParams = params(json!({"field": "f1", "filter": ["a"], "values": ["a2", "a3"]}));

        clone_objects(&mut store, &ctx("s", "cloneObjects"), &p).unwrap();

        assert_eq!(
            store.get("s").unwrap(),
            &vec![
                json!({"f1": "a", "f2": "x"}),
                json!({"f1": "a2", "f2": "x"}),
                json!({"f1": "a3", "f2": "x"}),
                json!({"f1": "b", "f2": "y"}),
            ]
        );
    }

    #[test]
    fn test_clone_objects_count() {
        let mut store = collections();
        let p: CloneParams = params(json!({
            "field": "f1",
            "filter": ["in3-o1-f1", "in3-o4-f1"],
            "values": ["clone1", "clone2"]
        }));
        clone_objects(&mut store, &ctx("in3", "cloneObjects"), &p).unwrap();
        assert_eq!(store.get("in3").unwrap().len(), 6 + 2 + 2);
    }

    #[test]
    fn test_clone_objects_with_named_references() {
        let mut store = collections();
        store.set("wanted", vec![json!("in1-o2-f1")]);
        store.set("copies", vec![json!("x")]);
        let p: CloneParams = params(json!({"field": "f1", "filter": "wanted", "values": "copies"}));

        clone_objects(&mut store, &ctx("in1", "cloneObjects"), &p).unwrap();

        let in1 = store.get("in1").unwrap();
        assert_eq!(in1.len(), 3);
        assert_eq!(in1[2]["f1"], "x");
    }

    #[test]
    fn test_clone_objects_requires_array_values() {
        let mut store = collections();
        let p: CloneParams = params(json!({"field": "f1", "filter": ["a"], "values": 3}));
        let err = clone_objects(&mut store, &ctx("in1", "cloneObjects"), &p).unwrap_err();
        assert!(matches!(err, MapError::InvalidParamType { ref param, .. } if param == "values"));
    }

    #[test]
    fn test_filter_objects_include() {
        let mut store = collections();
        let preds: Vec<Predicate> = params(json!([
            {"field": "f1", "include": ["in3-o1-f1", "in3-o4-f1"]},
            {"field": "f2", "include": ["in3-o1-f2", "in3-o3-f2"]}
        ]));
        filter_objects(&mut store, &ctx("in3", "filterObjects"), &preds).unwrap();

        let in3 = store.get("in3").unwrap();
        assert_eq!(in3.len(), 1);
        assert_eq!(in3[0]["f1"], "in3-o1-f1");
    }

    #[test]
    fn test_filter_objects_exclude_preserves_order() {
        let mut store = collections();
        let preds: Vec<Predicate> = params(json!([
            {"field": "f1", "exclude": ["in3-o1-f1", "in3-o4-f1"]}
        ]));
        filter_objects(&mut store, &ctx("in3", "filterObjects"), &preds).unwrap();

        let kept: Vec<&str> = store
            .get("in3")
            .unwrap()
            .iter()
            .map(|r| r["f1"].as_str().unwrap())
            .collect();
        assert_eq!(kept, vec!["in3-o2-f1", "in3-o3-f1", "in3-o5-f1", "in3-o6-f1"]);
    }

    #[test]
    fn test_filter_objects_exclude_keeps_records_without_field() {
        let mut store = Store::new();
        store.set(
            "gods",
            vec![
                json!({"name": "Zeus", "sex": "male"}),
                json!({"name": "Chaos"}),
                json!({"name": "Hera", "sex": "female"}),
            ],
        );
        let preds: Vec<Predicate> = params(json!([{"field": "sex", "exclude": ["male"]}]));
        filter_objects(&mut store, &ctx("gods", "filterObjects"), &preds).unwrap();

        assert_eq!(
            store.get("gods").unwrap(),
            &vec![json!({"name": "Chaos"}), json!({"name": "Hera", "sex": "female"})]
        );
    }

    #[test]
    fn test_filter_objects_conflicting_and_missing_rules() {
        let mut store = collections();
        let both: Vec<Predicate> = params(json!([{"field": "f1", "include": [], "exclude": []}]));
        let err = filter_objects(&mut store, &ctx("in3", "filterObjects"), &both).unwrap_err();
        assert!(matches!(err, MapError::ConflictingParams { .. }));

        let neither: Vec<Predicate> = params(json!([{"field": "f1"}]));
        let err = filter_objects(&mut store, &ctx("in3", "filterObjects"), &neither).unwrap_err();
        assert!(matches!(err, MapError::MissingConfigField { .. }));
        assert_eq!(store.get("in3").unwrap().len(), 6);
    }

    #[test]
    fn test_filter_fields_include_keeps_order() {
        let mut store = collections();
        let p: FilterFieldsParams = params(json!({"include": ["f3", "f1"]}));
        filter_fields(&mut store, &ctx("in4", "filterFields"), &p).unwrap();

        let first = store.get("in4").unwrap()[0].as_object().unwrap();
        let keys: Vec<&String> = first.keys().collect();
        assert_eq!(keys, vec!["f1", "f3"]);
    }

    #[test]
    fn test_filter_fields_exclude() {
        let mut store = collections();
        let p: FilterFieldsParams = params(json!({"exclude": ["f1", "f3"]}));
        filter_fields(&mut store, &ctx("in4", "filterFields"), &p).unwrap();
        assert_eq!(store.get("in4").unwrap()[1], json!({"f2": "in4-o2-f2"}));
    }

    #[test]
    fn test_filter_fields_rejects_both() {
        let mut store = collections();
        let p: FilterFieldsParams = params(json!({"include": ["f1"], "exclude": ["f2"]}));
        let err = filter_fields(&mut store, &ctx("in4", "filterFields"), &p).unwrap_err();
        assert!(matches!(err, MapError::ConflictingParams { .. }));
    }

    #[test]
    fn test_map_fields_rename_and_copy() {
        let mut store = collections();
        let mapping: Reference = params(json!([
            {"from": "f2", "to": "s2"},
            {"from": "f1", "to": "s1", "copy": true}
        ]));
        map_fields(&mut store, &ctx("in4", "mapFields"), &mapping).unwrap();

        let first = store.get("in4").unwrap()[0].as_object().unwrap();
        let keys: Vec<&String> = first.keys().collect();
        assert_eq!(keys, vec!["f1", "f3", "s2", "s1"]);
        assert_eq!(first["s2"], "in4-o1-f2");
        assert_eq!(first["s1"], "in4-o1-f1");
    }

    #[test]
    fn test_map_fields_same_name_keeps_field() {
        let mut store = collections();
        let mapping: Reference = params(json!([{"from": "f2", "to": "f2"}]));
        map_fields(&mut store, &ctx("in4", "mapFields"), &mapping).unwrap();

        assert_eq!(
            store.get("in4").unwrap()[0],
            json!({"f1": "in4-o1-f1", "f2": "in4-o1-f2", "f3": "in4-o1-f3"})
        );
    }

    #[test]
    fn test_map_fields_object_shorthand() {
        let mut store = Store::new();
        store.set("greek", vec![json!({"όνομα": "Ζεύς"})]);
        let mapping: Reference = params(json!({"όνομα": "name"}));
        map_fields(&mut store, &ctx("greek", "mapFields"), &mapping).unwrap();
        assert_eq!(store.get("greek").unwrap()[0], json!({"name": "Ζεύς"}));
    }

    #[test]
    fn test_map_fields_from_collection() {
        let mut store = collections();
        store.set("renames", vec![json!({"from": "f1", "to": "first", "copy": 0})]);
        map_fields(&mut store, &ctx("in1", "mapFields"), &Reference::from("renames")).unwrap();
        assert_eq!(store.get("in1").unwrap()[0], json!({"first": "in1-o1-f1"}));
    }

    #[test]
    fn test_map_values_replace_exact_match() {
        let mut store = Store::new();
        store.set("s", vec![json!({"n": 1, "k": "a"}), json!({"n": 2, "k": "a"}), json!({"k": "b"})]);
        let mapping: Reference = params(json!([
            {"field": "n", "from": 1.0, "to": "one"},
            {"field": "k", "from": "a", "to": "A"}
        ]));
        map_values(&mut store, &ctx("s", "mapValues"), &mapping).unwrap();

        let s = store.get("s").unwrap();
        assert_eq!(s[0], json!({"n": "one", "k": "A"}));
        assert_eq!(s[1], json!({"n": 2, "k": "A"}));
        assert_eq!(s[2], json!({"k": "b"}));
    }

    #[test]
    fn test_map_values_expression_and_callback() {
        let mut store = Store::new();
        store.set("s", vec![json!({"name": "Ares"}), json!({"name": "Zeus"})]);
        let mut mappers = MapperRegistry::new();
        mappers.register("shout", |record| {
            if let Some(Value::String(name)) = record.get_mut("name") {
                *name = name.to_uppercase();
            }
        });
        let mapping: Reference = params(json!([
            {"map": "if name == 'Ares' then name = 'Mars'"},
            {"call": "shout"}
        ]));

        let ctx = ctx("s", "mapValues").with_mappers(&mappers);
        map_values(&mut store, &ctx, &mapping).unwrap();

        let s = store.get("s").unwrap();
        assert_eq!(s[0]["name"], "MARS");
        assert_eq!(s[1]["name"], "ZEUS");
    }

    #[test]
    fn test_map_values_validates_before_mutating() {
        let mut store = Store::new();
        store.set("s", vec![json!({"k": "a"})]);
        let mapping: Reference = params(json!([
            {"field": "k", "from": "a", "to": "b"},
            {"call": "unregistered"}
        ]));

        let err = map_values(&mut store, &ctx("s", "mapValues"), &mapping).unwrap_err();
        assert!(matches!(err, MapError::UnknownMapper { ref name, .. } if name == "unregistered"));
        assert_eq!(store.get("s").unwrap()[0]["k"], "a");

        let bad: Reference = params(json!([{"map": "k = "}]));
        let err = map_values(&mut store, &ctx("s", "mapValues"), &bad).unwrap_err();
        assert!(matches!(err, MapError::Expression { .. }));
    }

    #[test]
    fn test_copy_to_array_side_channel() {
        let mut store = collections();
        let p: CopyToArrayParams = params(json!({"copyTo": "ids", "field": "f1"}));
        copy_to_array(&mut store, &ctx("in1", "copyToArray"), &p).unwrap();
        copy_to_array(&mut store, &ctx("in2", "copyToArray"), &p).unwrap();

        assert_eq!(
            store.get("ids").unwrap(),
            &vec![json!("in1-o1-f1"), json!("in1-o2-f1"), json!("in2-o1-f1"), json!("in2-o2-f1")]
        );

        let preds: Vec<Predicate> = params(json!([{"field": "f1", "include": "ids"}]));
        filter_objects(&mut store, &ctx("in3", "filterObjects"), &preds).unwrap();
        assert!(store.get("in3").unwrap().is_empty());
    }

    #[test]
    fn test_load_requires_path() {
        let mut store = Store::new();
        let err = load(&mut store, &ctx("x", "load"), &LoadParams::default()).unwrap_err();
        assert!(matches!(err, MapError::MissingConfigField { ref field, .. } if field == "path"));
    }

    #[test]
    fn test_save_and_load_through_base_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut store = collections();

        let save_ctx = ctx("in4", "save").with_base_dir(Some(dir.path()));
        let p: SaveParams = params(json!({"path": "out.xlsx"}));
        save(&mut store, &save_ctx, &p).unwrap();
        assert!(dir.path().join("out.xlsx.json").exists());

        let load_ctx = ctx("copy", "load").with_base_dir(Some(dir.path()));
        let p: LoadParams = params(json!({"path": "out.xlsx", "sheetName": "in4"}));
        load(&mut store, &load_ctx, &p).unwrap();
        assert_eq!(store.get("copy").unwrap(), store.get("in4").unwrap());
    }

    #[test]
    fn test_load_missing_sheet() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut store = collections();
        let p: SaveParams = params(json!({"path": "out.xlsx"}));
        save(&mut store, &ctx("in1", "save").with_base_dir(Some(dir.path())), &p).unwrap();

        let p: LoadParams = params(json!({"path": "out.xlsx"}));
        let load_ctx = ctx("Titans", "load").with_base_dir(Some(dir.path()));
        let err = load(&mut store, &load_ctx, &p).unwrap_err();
        assert!(matches!(err, MapError::SheetNotFound { ref sheet, .. } if sheet == "Titans"));
    }
}
