//! DSL Executor
//!
//! Walks a [`Config`] tree depth-first, left to right, and runs every job's
//! operations against a single [`Store`]. Later jobs see what earlier jobs
//! wrote; the first error aborts the whole run.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use super::config::{
    AggregateParams, CloneParams, Config, CopyToArrayParams, FilterFieldsParams, Job, LoadParams,
    MergeParams, Op, Predicate, SaveParams,
};
use super::operations::{self, OpContext};
use super::reference::Reference;
use crate::error::MapResult;
use crate::logs::{LogEntry, Observer, TracingObserver};
use crate::models::Record;
use crate::store::Store;
use crate::transform::{grouper, merger};

/// A named record callback usable from `mapValues` as `{call: name}`
pub type Mapper = Arc<dyn Fn(&mut Record) + Send + Sync>;

/// Mappers registered by the embedding program.
#[derive(Clone, Default)]
pub struct MapperRegistry {
    mappers: HashMap<String, Mapper>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a mapper
    pub fn register<F>(&mut self, name: impl Into<String>, mapper: F)
    where
        F: Fn(&mut Record) + Send + Sync + 'static,
    {
        self.mappers.insert(name.into(), Arc::new(mapper));
    }

    pub fn get(&self, name: &str) -> Option<Mapper> {
        self.mappers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.mappers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperRegistry")
            .field("mappers", &self.names())
            .finish()
    }
}

/// Counts of one interpreter run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub jobs: usize,
    /// Operators executed (an op object with two keys counts twice)
    pub operations: usize,
}

/// Runs configs against a store.
pub struct Interpreter {
    observer: Arc<dyn Observer>,
    mappers: MapperRegistry,
    base_dir: Option<PathBuf>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self {
            observer: Arc::new(TracingObserver),
            mappers: MapperRegistry::default(),
            base_dir: None,
        }
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Register a mapper for `{call: name}` entries
    pub fn with_mapper<F>(mut self, name: impl Into<String>, mapper: F) -> Self
    where
        F: Fn(&mut Record) + Send + Sync + 'static,
    {
        self.mappers.register(name, mapper);
        self
    }

    pub fn with_mappers(mut self, mappers: MapperRegistry) -> Self {
        self.mappers = mappers;
        self
    }

    /// Directory relative `load`/`save` paths are resolved against
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Run a config tree, depth-first.
    pub fn run(&self, config: &Config, store: &mut Store) -> MapResult<RunSummary> {
        let mut summary = RunSummary::default();
        self.run_node(config, store, &mut summary)?;
        Ok(summary)
    }

    fn run_node(&self, config: &Config, store: &mut Store, summary: &mut RunSummary) -> MapResult<()> {
        match config {
            Config::Job(job) => {
                summary.operations += self.run_job(job, store)?;
                summary.jobs += 1;
            }
            Config::Sequence(configs) => {
                for config in configs {
                    self.run_node(config, store, summary)?;
                }
            }
        }
        Ok(())
    }

    /// Run one job's ops in order. Returns the number of operators executed.
    pub fn run_job(&self, job: &Job, store: &mut Store) -> MapResult<usize> {
        self.observer.log(LogEntry::info(format!("Job '{}'", job.name)));

        let mut executed = 0;
        for op in &job.ops {
            executed += self.run_op(&job.name, op, store).inspect_err(|err| {
                self.observer.log(LogEntry::error(err.to_string()).with_indent(1));
            })?;
        }
        Ok(executed)
    }

    fn context<'a>(&'a self, collection: &'a str) -> OpContext<'a> {
        OpContext::detached(collection, "")
            .with_observer(self.observer.as_ref())
            .with_base_dir(self.base_dir.as_deref())
            .with_mappers(&self.mappers)
    }

    fn run_op(&self, collection: &str, op: &Op, store: &mut Store) -> MapResult<usize> {
        for key in op.unknown.keys() {
            self.observer.log(
                LogEntry::warning(format!("Ignoring unknown operator '{}'", key)).with_indent(1),
            );
        }

        let base = self.context(collection);
        let mut executed = 0;

        if let Some(raw) = &op.load {
            let ctx = base.for_operator("load");
            let params: LoadParams = ctx.params(raw, "a {path, sheetName?, rangeFrom?, rangeTo?} object")?;
            operations::load(store, &ctx, &params)?;
            self.log_done(store, &ctx);
            executed += 1;
        }
        if let Some(raw) = &op.copy_to {
            let ctx = base.for_operator("copyTo");
            let params: String = ctx.params(raw, "a collection name")?;
            operations::copy_to(store, &ctx, &params)?;
            self.log_done(store, &ctx);
            executed += 1;
        }
        if let Some(raw) = &op.clone_objects {
            let ctx = base.for_operator("cloneObjects");
            let params: CloneParams = ctx.params(raw, "a {field, filter, values} object")?;
            operations::clone_objects(store, &ctx, &params)?;
            self.log_done(store, &ctx);
            executed += 1;
        }
        if let Some(raw) = &op.filter_objects {
            let ctx = base.for_operator("filterObjects");
            let params: Vec<Predicate> = ctx.params(raw, "a list of {field, include|exclude} predicates")?;
            operations::filter_objects(store, &ctx, &params)?;
            self.log_done(store, &ctx);
            executed += 1;
        }
        if let Some(raw) = &op.filter_fields {
            let ctx = base.for_operator("filterFields");
            let params: FilterFieldsParams = ctx.params(raw, "an {include|exclude} object")?;
            operations::filter_fields(store, &ctx, &params)?;
            self.log_done(store, &ctx);
            executed += 1;
        }
        if let Some(raw) = &op.map_fields {
            let ctx = base.for_operator("mapFields");
            let params: Reference = ctx.params(raw, "a list of field mappings or a collection name")?;
            operations::map_fields(store, &ctx, &params)?;
            self.log_done(store, &ctx);
            executed += 1;
        }
        if let Some(raw) = &op.map_values {
            let ctx = base.for_operator("mapValues");
            let params: Reference = ctx.params(raw, "a list of value mappings or a collection name")?;
            operations::map_values(store, &ctx, &params)?;
            self.log_done(store, &ctx);
            executed += 1;
        }
        if let Some(raw) = &op.copy_to_array {
            let ctx = base.for_operator("copyToArray");
            let params: CopyToArrayParams = ctx.params(raw, "a {copyTo, field} object")?;
            operations::copy_to_array(store, &ctx, &params)?;
            self.log_done(store, &ctx);
            executed += 1;
        }
        if let Some(raw) = &op.merge_objects {
            let ctx = base.for_operator("mergeObjects");
            let params: MergeParams = ctx.params(raw, "a {name, key, strict?} object")?;
            merger::merge_objects(store, &ctx, &params)?;
            self.log_done(store, &ctx);
            executed += 1;
        }
        if let Some(raw) = &op.aggregate {
            let ctx = base.for_operator("aggregate");
            let params: AggregateParams = ctx.params(raw, "an {aggregatedField, aggregationField, name?} object")?;
            grouper::aggregate(store, &ctx, &params)?;
            self.log_done(store, &ctx);
            executed += 1;
        }
        if let Some(raw) = &op.save {
            let ctx = base.for_operator("save");
            let params: SaveParams = ctx.params(raw, "a {path, sheetName?} object")?;
            operations::save(store, &ctx, &params)?;
            self.log_done(store, &ctx);
            executed += 1;
        }
        Ok(executed)
    }

    fn log_done(&self, store: &Store, ctx: &OpContext<'_>) {
        let message = match store.get(ctx.collection) {
            Ok(records) => format!("{} ({} records)", ctx.operator, records.len()),
            Err(_) => ctx.operator.to_string(),
        };
        self.observer.log(LogEntry::success(message).with_indent(1));
    }
}

/// Run a config with the default interpreter (tracing observer, no mappers,
/// paths relative to the working directory).
pub fn run(config: &Config, store: &mut Store) -> MapResult<RunSummary> {
    Interpreter::default().run(config, store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MapError;
    use crate::logs::{LogLevel, MemoryObserver};
    use serde_json::{json, Value};

    fn store() -> Store {
        let mut store = Store::new();
        store.set("in1", vec![json!({"f1": "in1-o1-f1"}), json!({"f1": "in1-o2-f1"})]);
        store.set("in2", vec![json!({"f1": "in2-o1-f1"}), json!({"f1": "in2-o2-f1"})]);
        store
    }

    fn config(value: Value) -> Config {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_jobs_run_depth_first() {
        let mut store = store();
        let config = config(json!([
            {"name": "in1", "ops": [{"copyTo": "out1"}]},
            [
                {"name": "in2", "ops": [{"copyTo": "out1"}]},
                [{"name": "out1", "ops": [{"copyToArray": {"copyTo": "ids", "field": "f1"}}]}]
            ]
        ]));

        let summary = run(&config, &mut store).unwrap();

        assert_eq!(summary, RunSummary { jobs: 3, operations: 3 });
        assert_eq!(store.get("out1").unwrap().len(), 4);
        assert_eq!(store.get("ids").unwrap()[2], json!("in2-o1-f1"));
    }

    #[test]
    fn test_operators_in_one_op_run_in_fixed_order() {
        let mut store = store();
        // copyTo runs before filterObjects even though it is listed last
        let config = config(json!({
            "name": "in1",
            "ops": [{"filterObjects": [{"field": "f1", "include": ["in1-o1-f1"]}], "copyTo": "all"}]
        }));

        run(&config, &mut store).unwrap();

        assert_eq!(store.get("all").unwrap().len(), 2);
        assert_eq!(store.get("in1").unwrap().len(), 1);
    }

    #[test]
    fn test_first_error_aborts_run() {
        let mut store = store();
        let observer = Arc::new(MemoryObserver::new());
        let config = config(json!([
            {"name": "missing", "ops": [{"copyTo": "out"}]},
            {"name": "in1", "ops": [{"copyTo": "never"}]}
        ]));

        let err = Interpreter::new()
            .with_observer(observer.clone())
            .run(&config, &mut store)
            .unwrap_err();

        assert!(matches!(err, MapError::MissingCollection { ref name } if name == "missing"));
        assert!(!store.contains("never"));
        assert_eq!(observer.at_level(LogLevel::Error).len(), 1);
    }

    #[test]
    fn test_wrongly_shaped_parameter_names_job_and_operator() {
        let mut store = store();
        store.set("out", vec![json!({"sex": "male"})]);
        let config = Config::from_yaml(
            "- name: out\n  ops:\n    - filterObjects: {field: sex, include: [male]}\n",
        )
        .unwrap();

        let err = run(&config, &mut store).unwrap_err();

        match err {
            MapError::InvalidParamType { collection, operator, .. } => {
                assert_eq!(collection, "out");
                assert_eq!(operator, "filterObjects");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(store.get("out").unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_operator_warns() {
        let mut store = store();
        let observer = Arc::new(MemoryObserver::new());
        let config = config(json!({"name": "in1", "ops": [{"explode": true}]}));

        let summary = Interpreter::new()
            .with_observer(observer.clone())
            .run(&config, &mut store)
            .unwrap();

        assert_eq!(summary.operations, 0);
        let warnings = observer.at_level(LogLevel::Warning);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("explode"));
    }

    #[test]
    fn test_registered_mapper() {
        let mut store = store();
        let config = config(json!({"name": "in2", "ops": [{"mapValues": [{"call": "tag"}]}]}));

        Interpreter::new()
            .with_mapper("tag", |record: &mut Record| {
                record.insert("tagged".to_string(), json!(true));
            })
            .run(&config, &mut store)
            .unwrap();

        assert!(store.get("in2").unwrap().iter().all(|r| r["tagged"] == json!(true)));
    }

    #[test]
    fn test_empty_sequence_is_a_no_op() {
        let mut store = store();
        let before = store.clone();
        let summary = run(&Config::Sequence(Vec::new()), &mut store).unwrap();
        assert_eq!(summary, RunSummary::default());
        assert_eq!(store, before);
    }
}
