//! Application configuration: a YAML file plus `PULSEINDEX_*` overrides.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use pulseindex_core::{ReplicatorConfig, Storage};
use pulseindex_observability::LogConfig;
use pulseindex_replicator::SourceConfig;
use pulseindex_storage::postgres::PostgresStorage;
use pulseindex_storage::sqlite::SqliteStorage;
use pulseindex_storage::InMemoryStorage;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `memory`, `sqlite:<path>` or `postgres://...`
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:pulseindex.db".into(),
        }
    }
}

impl DatabaseConfig {
    pub async fn open(&self) -> anyhow::Result<Arc<dyn Storage>> {
        let url = self.url.as_str();
        if url == "memory" {
            return Ok(Arc::new(InMemoryStorage::new()));
        }
        if url.starts_with("sqlite:") {
            let storage = SqliteStorage::open(url)
                .await
                .with_context(|| format!("opening {url}"))?;
            return Ok(Arc::new(storage));
        }
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            let storage = PostgresStorage::connect(url)
                .await
                .context("connecting to postgres")?;
            return Ok(Arc::new(storage));
        }
        bail!("unsupported database url: {url}")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub replicator: ReplicatorConfig,
    pub source: SourceConfig,
    pub database: DatabaseConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Read `path` (defaults when `None`), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Self::from_yaml(&text).with_context(|| format!("parsing {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(std::env::vars());
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn apply_env(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            match key.as_str() {
                "PULSEINDEX_SOURCE_URL" => self.source.url = value,
                "PULSEINDEX_DATABASE_URL" => self.database.url = value,
                "PULSEINDEX_LOG_LEVEL" => self.log.level = value,
                _ => {}
            }
        }
    }
}
