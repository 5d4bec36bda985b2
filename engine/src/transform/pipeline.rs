//! Pipeline - config file in, populated store out.
//!
//! ```text
//! config.yaml ──▶ Config::from_file ──▶ Interpreter::run ──▶ PipelineReport
//!                                             │
//!                                   load / save on disk
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineResult;
use crate::logs::{Observer, TracingObserver};
use crate::store::Store;

use super::dsl::{Config, Interpreter, MapperRegistry};

/// How a config file is run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Resolve relative `load`/`save` paths against the config file's
    /// directory instead of the working directory
    pub relative_to_config: bool,

    /// Explicit base directory; takes precedence over `relative_to_config`
    pub base_dir: Option<PathBuf>,
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Every collection the run produced
    pub store: Store,
    pub jobs: usize,
    pub operations: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineReport {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// One-line summary for display
    pub fn summary(&self) -> String {
        format!(
            "{} jobs, {} operations, {} collections in {} ms",
            self.jobs,
            self.operations,
            self.store.len(),
            self.duration().num_milliseconds()
        )
    }
}

/// Builder for a pipeline run
pub struct Pipeline {
    options: PipelineOptions,
    observer: Arc<dyn Observer>,
    mappers: MapperRegistry,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineOptions::default())
    }
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            observer: Arc::new(TracingObserver),
            mappers: MapperRegistry::default(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_mappers(mut self, mappers: MapperRegistry) -> Self {
        self.mappers = mappers;
        self
    }

    fn interpreter(&self, config_dir: Option<&Path>) -> Interpreter {
        let interpreter = Interpreter::new()
            .with_observer(self.observer.clone())
            .with_mappers(self.mappers.clone());

        let base_dir = self.options.base_dir.as_deref().or(if self.options.relative_to_config {
            config_dir
        } else {
            None
        });
        match base_dir {
            Some(dir) => interpreter.with_base_dir(dir),
            None => interpreter,
        }
    }

    /// Parse and run a config file (`.json` as JSON, anything else as YAML)
    pub fn run_file(&self, path: &Path) -> PipelineResult<PipelineReport> {
        let config = Config::from_file(path)?;
        tracing::debug!(config = %path.display(), jobs = config.jobs().len(), "Config loaded");
        self.run_config(&config, path.parent(), Store::new())
    }

    /// Parse and run YAML (or JSON) config text
    pub fn run_str(&self, text: &str) -> PipelineResult<PipelineReport> {
        let config = Config::from_yaml(text)?;
        self.run_config(&config, None, Store::new())
    }

    /// Run a parsed config against an existing store
    pub fn run_config(&self, config: &Config, config_dir: Option<&Path>, mut store: Store) -> PipelineResult<PipelineReport> {
        let started_at = Utc::now();
        let summary = self.interpreter(config_dir).run(config, &mut store)?;
        let finished_at = Utc::now();

        Ok(PipelineReport {
            store,
            jobs: summary.jobs,
            operations: summary.operations,
            started_at,
            finished_at,
        })
    }
}

/// Run a config file with the default observer and no mappers
pub fn run_config_file(path: impl AsRef<Path>, options: PipelineOptions) -> PipelineResult<PipelineReport> {
    Pipeline::new(options).run_file(path.as_ref())
}

/// Run config text with the default observer and no mappers
pub fn run_config_str(text: &str, options: PipelineOptions) -> PipelineResult<PipelineReport> {
    Pipeline::new(options).run_str(text)
}
