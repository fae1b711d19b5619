//! Configuration loading.
//!
//! Sources, later ones winning: an optional `<prefix>.toml` (or any format
//! the `config` crate recognizes), then `ECOGRAPH__`-prefixed environment
//! variables with `__` as the nesting separator, e.g.
//! `ECOGRAPH__NEO4J__URI=bolt://graph:7687`.

use serde::Deserialize;

use ecograph_graph::GraphConfig;

pub const ENV_PREFIX: &str = "ECOGRAPH";
pub const DEFAULT_FILE_PREFIX: &str = "ecograph";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config error: {0}")]
    Load(#[from] config::ConfigError),
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub neo4j: GraphConfig,
}

impl Settings {
    /// Load from `file_prefix` and the process environment.
    pub fn load(file_prefix: &str) -> Result<Self, SettingsError> {
        Self::load_with_env(file_prefix, None)
    }

    /// Like [`load`](Self::load), but reading variables from `env` instead of
    /// the process environment when given.
    pub fn load_with_env(
        file_prefix: &str,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, SettingsError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
