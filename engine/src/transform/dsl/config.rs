//! Pipeline configuration: a tree of jobs, each a target collection plus an
//! ordered list of operations.
//!
//! ```yaml
//! - name: Gods in English
//!   ops:
//!     - load: {path: gods.xlsx}
//!     - filterObjects: [{field: sex, include: [male]}]
//!     - copyTo: Male God names
//! - name: Male God names
//!   ops:
//!     - filterFields: {include: [name]}
//!     - save: {path: male.xlsx}
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::de::value::MapAccessDeserializer;
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::reference::Reference;
use crate::error::ConfigResult;

/// Either one job or an ordered sequence of configs, nested arbitrarily.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Config {
    Sequence(Vec<Config>),
    Job(Job),
}

/// Sequences nest, maps are jobs. Dispatching on the shape keeps a job's own
/// parse error (missing `name`, `ops` not a list...) instead of a generic
/// "no variant matched".
impl<'de> Deserialize<'de> for Config {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ConfigVisitor;

        impl<'de> Visitor<'de> for ConfigVisitor {
            type Value = Config;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a job map or a sequence of configs")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Config, A::Error> {
                let mut configs = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(config) = seq.next_element()? {
                    configs.push(config);
                }
                Ok(Config::Sequence(configs))
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Config, A::Error> {
                Job::deserialize(MapAccessDeserializer::new(map)).map(Config::Job)
            }
        }

        deserializer.deserialize_any(ConfigVisitor)
    }
}

/// A target collection and the operations applied to it, in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// Collection every operation of this job works on
    pub name: String,
    #[serde(default, alias = "jobs")]
    pub ops: Vec<Op>,
}

impl Config {
    /// Parse a config from YAML text (JSON is valid YAML too)
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse a config from JSON text
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a config file: `.json` files as JSON, anything else as YAML
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        if crate::adapters::is_json_path(path) {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// All jobs of the tree, flattened left to right
    pub fn jobs(&self) -> Vec<&Job> {
        match self {
            Config::Job(job) => vec![job],
            Config::Sequence(configs) => configs.iter().flat_map(Config::jobs).collect(),
        }
    }
}

/// One step of a job.
///
/// Each operator has its own key. An op object normally holds one key; when
/// it holds several they run in [`Op::OPERATOR_ORDER`].
///
/// Operator parameters are kept as raw values and read into their parameter
/// structs when the operator runs, so a wrongly shaped parameter is reported
/// against its job and operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Op {
    /// [`LoadParams`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<Value>,

    /// Destination collection name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_to: Option<Value>,

    /// [`CloneParams`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_objects: Option<Value>,

    /// List of [`Predicate`]s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_objects: Option<Value>,

    /// [`FilterFieldsParams`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_fields: Option<Value>,

    /// List of `{from, to, copy}` entries, `{from: to}` shorthand, or a collection name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_fields: Option<Value>,

    /// List of `{field, from, to}`, `{map}` or `{call}` entries, or a collection name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_values: Option<Value>,

    /// [`CopyToArrayParams`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_to_array: Option<Value>,

    /// [`MergeParams`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_objects: Option<Value>,

    /// [`AggregateParams`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Value>,

    /// [`SaveParams`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save: Option<Value>,

    /// Keys that name no operator
    #[serde(flatten)]
    pub unknown: BTreeMap<String, Value>,
}

impl Op {
    /// Execution order of operators sharing one op object
    pub const OPERATOR_ORDER: [&'static str; 11] = [
        "load",
        "copyTo",
        "cloneObjects",
        "filterObjects",
        "filterFields",
        "mapFields",
        "mapValues",
        "copyToArray",
        "mergeObjects",
        "aggregate",
        "save",
    ];

    /// Names of the operators present, in execution order
    pub fn operators(&self) -> Vec<&'static str> {
        let present = [
            self.load.is_some(),
            self.copy_to.is_some(),
            self.clone_objects.is_some(),
            self.filter_objects.is_some(),
            self.filter_fields.is_some(),
            self.map_fields.is_some(),
            self.map_values.is_some(),
            self.copy_to_array.is_some(),
            self.merge_objects.is_some(),
            self.aggregate.is_some(),
            self.save.is_some(),
        ];
        Self::OPERATOR_ORDER
            .iter()
            .zip(present)
            .filter_map(|(name, is_present)| is_present.then_some(*name))
            .collect()
    }
}

// =============================================================================
// Operator parameters
// =============================================================================

/// `load`: read a workbook sheet, CSV or JSON file into the job's collection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadParams {
    pub path: Option<String>,
    /// Defaults to the job's collection name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_to: Option<String>,
}

/// `save`: write the collection to a fresh workbook plus a JSON mirror
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveParams {
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
}

/// `cloneObjects`: duplicate matching records with new values for one field
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CloneParams {
    pub field: Option<String>,
    pub filter: Option<Reference>,
    pub values: Option<Reference>,
}

/// One `filterObjects` predicate. Exactly one of `include`/`exclude`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Predicate {
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Reference>,
}

/// `filterFields`: keep only `include`d fields, or drop `exclude`d ones
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterFieldsParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Reference>,
}

/// `copyToArray`: collect one field of every record into a value array
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CopyToArrayParams {
    pub copy_to: Option<String>,
    pub field: Option<String>,
}

/// `mergeObjects`: merge another collection in on a composite key
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MergeParams {
    pub name: Option<String>,
    pub key: Option<Value>,
    /// Drop unmatched records of the other collection when truthy
    #[serde(default)]
    pub strict: Value,
}

/// `aggregate`: group one field's values by another field
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AggregateParams {
    /// Output collection; defaults to the job's collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub aggregated_field: Option<String>,
    pub aggregation_field: Option<String>,
}

/// A ready-to-edit example pipeline
pub fn example_config() -> &'static str {
    r#"# Build a list of male god names from an English and a Greek sheet.
- name: Gods in English
  ops:
    - load: {path: gods.xlsx}
    - filterObjects:
        - {field: sex, include: [male]}
    - copyTo: Male God names

- name: Gods in Greek
  ops:
    - load: {path: gods.xlsx}
    - filterObjects:
        - {field: φύλο, include: [αρσενικό]}
    - mapFields: {όνομα: name}
    - copyTo: Male God names

- name: Male God names
  ops:
    - filterFields: {include: [name]}
    - mapValues:
        - {field: name, from: Zeus, to: Jupiter}
        - {map: "if name == 'Ares' then name = 'Mars'"}
    - save: {path: male-gods.xlsx, sheetName: Gods}
"#
}
