//! Runtime configuration
//!
//! Every field has a default matching a standard AIS deployment, so the
//! YAML file passed with `--config` only needs the values that differ.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The cluster a run operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterRef {
    /// Namespace the AIS cluster is deployed in
    pub namespace: String,
    /// Value of the `app.kubernetes.io/name` label on cluster resources
    pub name: String,
}

impl ClusterRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

/// Tunables for helper pods, created volumes and waits
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StateManagerConfig {
    /// Image used for every helper pod
    pub image: String,

    /// Entry command keeping helper pods alive while commands are executed
    pub unit_command: Vec<String>,

    /// Mount path of the state volume inside helper pods
    pub data_root: String,

    /// Storage class of target object-data volumes, never touched
    pub excluded_storage_class: String,

    /// Storage class for volumes created during restore
    pub volume_storage_class: String,

    /// Requested capacity for volumes created during restore
    pub volume_capacity: String,

    /// Access mode for volumes created during restore
    pub volume_access_mode: String,

    /// Local directory receiving backup bundles
    pub backup_dir: PathBuf,

    /// Local directory used to stage restore bundles
    pub restore_dir: PathBuf,

    /// Seconds to wait for helper pods to reach Running
    pub running_timeout_secs: u64,

    /// Seconds to wait for helper pods to disappear after deletion
    pub deletion_timeout_secs: u64,

    /// Seconds between two status checks
    pub poll_interval_secs: u64,

    /// Number of volumes processed concurrently during exec and copy steps
    pub parallelism: usize,
}

impl Default for StateManagerConfig {
    fn default() -> Self {
        Self {
            image: "busybox:latest".to_string(),
            unit_command: vec!["sleep".to_string(), "3600".to_string()],
            data_root: "/data".to_string(),
            excluded_storage_class: "ais-local-storage".to_string(),
            volume_storage_class: "local-path".to_string(),
            volume_capacity: "1Gi".to_string(),
            volume_access_mode: "ReadWriteOnce".to_string(),
            backup_dir: PathBuf::from("backups"),
            restore_dir: PathBuf::from("restore"),
            running_timeout_secs: 30,
            deletion_timeout_secs: 60,
            poll_interval_secs: 5,
            parallelism: 1,
        }
    }
}

impl StateManagerConfig {
    /// Load configuration from a YAML file, or defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::config(format!("Failed to read config file {:?}: {}", path, e))
                })?;
                Self::from_yaml(&raw)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw)
            .map_err(|e| Error::config(format!("Invalid config file: {}", e)))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(Error::validation("Helper pod image must not be empty"));
        }
        if self.unit_command.is_empty() {
            return Err(Error::validation("Helper pod command must not be empty"));
        }
        if !self.data_root.starts_with('/') {
            return Err(Error::validation(format!(
                "Data root '{}' must be an absolute path",
                self.data_root
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::validation("Poll interval must be at least 1 second"));
        }
        if self.parallelism == 0 {
            return Err(Error::validation("Parallelism must be at least 1"));
        }
        Ok(())
    }

    pub fn running_timeout(&self) -> Duration {
        Duration::from_secs(self.running_timeout_secs)
    }

    pub fn deletion_timeout(&self) -> Duration {
        Duration::from_secs(self.deletion_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
