//! `costgraph.toml` configuration.
//!
//! ```toml
//! [store]
//! path = ".costgraph/compositions.jsonl"
//!
//! [bus]
//! exchange_name = "costgraph"
//! exchange_kind = "topic"
//!
//! [cascade]
//! settle_timeout_ms = 5000
//!
//! [log]
//! filter = "costgraph=info"
//! ```
//!
//! Every key is optional.

use crate::bus::{ExchangeKind, Routing};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "costgraph.toml";
pub const DEFAULT_STORE_PATH: &str = ".costgraph/compositions.jsonl";
pub const DEFAULT_LOG_FILTER: &str = "costgraph=info";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostgraphConfig {
    pub store: StoreConfig,
    pub bus: BusConfig,
    pub cascade: CascadeConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub exchange_name: String,
    pub exchange_kind: ExchangeKind,
    pub changed_routing_key: String,
    pub changed_queue: String,
    pub automatic_routing_key: String,
    pub automatic_queue: String,
    pub uses_updated_routing_key: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            exchange_name: "costgraph".to_string(),
            exchange_kind: ExchangeKind::Topic,
            changed_routing_key: "composition.changed".to_string(),
            changed_queue: "cascade.changed".to_string(),
            automatic_routing_key: "compositions.updated_automatically".to_string(),
            automatic_queue: "cascade.automatic".to_string(),
            uses_updated_routing_key: "composition.uses_updated".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    pub settle_timeout_ms: u64,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            settle_timeout_ms: 5_000,
        }
    }
}

impl CascadeConfig {
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Publish and consume routes derived from `[bus]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    /// Manual changes: created, updated manually, deleted.
    pub changed: Routing,
    /// Batches of compositions recomputed by a cascade wave.
    pub automatic: Routing,
    /// Notice that a composition's uses have been brought up to date.
    pub uses_updated: Routing,
}

impl Default for Topology {
    fn default() -> Self {
        BusConfig::default().topology()
    }
}

impl BusConfig {
    pub fn topology(&self) -> Topology {
        let route = |key: &str, queue: &str| {
            Routing::new(&self.exchange_name, self.exchange_kind, key, queue)
        };
        Topology {
            changed: route(&self.changed_routing_key, &self.changed_queue),
            automatic: route(&self.automatic_routing_key, &self.automatic_queue),
            uses_updated: route(&self.uses_updated_routing_key, ""),
        }
    }
}

impl CostgraphConfig {
    pub fn parse(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.display().to_string(),
            source,
        })
    }

    /// Read `path`, or `costgraph.toml` in the working directory when
    /// `None`. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw, path),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    pub fn topology(&self) -> Topology {
        self.bus.topology()
    }
}
