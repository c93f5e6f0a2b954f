use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::WaitForActiveShards;
use crate::routing::BlockLevel;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Priority hint attached to outbound replication RPCs (§6 "transportOptions").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TransportPriority {
    Urgent,
    High,
    Normal,
    Low,
}

impl Default for TransportPriority {
    fn default() -> Self {
        TransportPriority::Normal
    }
}

/// Configuration options recognized by the replication core (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicationSettings {
    /// Name of the thread pool / executor primary and replica operations
    /// run on, resolved per-action at construction time (§9: "Global
    /// mutable state. None in the core. The executor name is resolved
    /// per-action at construction time.")
    pub executor: String,
    #[serde(with = "duration_millis")]
    pub transport_timeout: Duration,
    pub transport_priority: TransportPriority,
    pub default_wait_for_active_shards: WaitForActiveShards,
    pub global_block_level: BlockLevel,
    pub index_block_level: BlockLevel,
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            executor: "write".to_string(),
            transport_timeout: Duration::from_secs(30),
            transport_priority: TransportPriority::Normal,
            default_wait_for_active_shards: WaitForActiveShards::One,
            global_block_level: BlockLevel::Write,
            index_block_level: BlockLevel::Write,
        }
    }
}

impl ReplicationSettings {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Mirrors `barq_cluster::ClusterConfig::from_env_or_default`: reads
    /// `BARQ_REPLICATION_CONFIG` for a JSON settings file, else falls back
    /// to defaults.
    pub fn from_env_or_default() -> Result<Self, ConfigError> {
        match env::var("BARQ_REPLICATION_CONFIG") {
            Ok(path) => Self::from_path(path),
            Err(_) => Ok(Self::default()),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
