use serde::{Deserialize, Serialize};
use std::path::Path;

/// Process-level settings, layered from an optional file and `OSMROUTE_*`
/// environment variables.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub transform_pool_size: Option<usize>,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default = "default_true")]
    pub filter_tags: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            transform_pool_size: None,
            threads: None,
            filter_tags: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl RuntimeConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        let settings = builder
            .add_source(::config::Environment::with_prefix("OSMROUTE").try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Geometry engines to keep around; one per worker thread unless set.
    pub fn pool_size(&self) -> usize {
        self.transform_pool_size
            .unwrap_or_else(rayon::current_num_threads)
            .max(1)
    }
}
