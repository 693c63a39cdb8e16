//! Helper pod templates
//!
//! A [`UnitTemplate`] fully describes the short-lived pods one operation
//! deploys: one pod per state volume, all sharing the template's labels so
//! they can be listed, awaited and torn down together. The per-volume exec
//! command is resolved when the template is built and never changes after.

use std::collections::BTreeMap;
use std::fmt;

use kube::core::{Expression, Selector};

use crate::cluster::UnitSpec;
use crate::config::{ClusterRef, StateManagerConfig};
use crate::metadata::{deletion_command, MetadataKind};

/// Kubernetes name label shared by every AIS resource of a cluster
pub const NAME_LABEL: &str = "app.kubernetes.io/name";

/// Kubernetes component label (`proxy` or `target`)
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";

/// Label naming the state volume a helper pod is bound to
pub const VOLUME_LABEL: &str = "ais.nvidia.com/state-volume";

/// Placeholder replaced by the volume name
const VOLUME_PLACEHOLDER: &str = "{volume}";

/// Shell used to run exec commands inside helper pods
const SHELL: [&str; 2] = ["/bin/sh", "-c"];

/// Selector matching every proxy and target resource of a cluster
pub fn cluster_selector(cluster: &ClusterRef) -> Selector {
    let roles = ["proxy", "target"].into_iter().map(String::from).collect();
    [
        Expression::In(COMPONENT_LABEL.to_string(), roles),
        Expression::Equal(NAME_LABEL.to_string(), cluster.name.clone()),
    ]
    .into_iter()
    .collect()
}

/// Operation a template belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Backup,
    Delete,
    Restore,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Backup => "backup",
            Operation::Delete => "delete",
            Operation::Restore => "restore",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable shape of the helper pods deployed by one operation
#[derive(Debug, Clone)]
pub struct UnitTemplate {
    operation: Operation,
    name_prefix: String,
    image: String,
    container_name: String,
    command: Vec<String>,
    mount_path: String,
    exec_template: String,
    archive_template: Option<String>,
    labels: BTreeMap<String, String>,
}

impl UnitTemplate {
    /// Pods that tar up a volume's data root into `/tmp/<volume>-backup.tar.gz`
    pub fn backup(cluster: &ClusterRef, config: &StateManagerConfig) -> Self {
        let archive = format!("/tmp/{}-backup.tar.gz", VOLUME_PLACEHOLDER);
        let exec = format!("tar -czvf {} -C {} .", archive, config.data_root);
        Self::build(
            Operation::Backup,
            cluster,
            config,
            format!("backup-{}-", cluster.name),
            "backup-container",
            exec,
            Some(archive),
        )
    }

    /// Pods that remove the given metadata files from a volume
    pub fn deletion(
        cluster: &ClusterRef,
        config: &StateManagerConfig,
        kinds: &[MetadataKind],
    ) -> Self {
        let exec = deletion_command(kinds, &config.data_root);
        Self::build(
            Operation::Delete,
            cluster,
            config,
            "delete-".to_string(),
            "delete-container",
            exec,
            None,
        )
    }

    /// Pods that unpack `/<volume>.tar.gz` into a volume's data root
    pub fn restore(cluster: &ClusterRef, config: &StateManagerConfig) -> Self {
        let archive = format!("/{}.tar.gz", VOLUME_PLACEHOLDER);
        let exec = format!("tar -xzvf {} -C {}", archive, config.data_root);
        Self::build(
            Operation::Restore,
            cluster,
            config,
            "restore-".to_string(),
            "restore-container",
            exec,
            Some(archive),
        )
    }

    fn build(
        operation: Operation,
        cluster: &ClusterRef,
        config: &StateManagerConfig,
        name_prefix: String,
        container_name: &str,
        exec_template: String,
        archive_template: Option<String>,
    ) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(
            NAME_LABEL.to_string(),
            format!("{}-{}", cluster.name, operation.as_str()),
        );

        Self {
            operation,
            name_prefix,
            image: config.image.clone(),
            container_name: container_name.to_string(),
            command: config.unit_command.clone(),
            mount_path: config.data_root.clone(),
            exec_template,
            archive_template,
            labels,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Selector matching every pod created from this template
    pub fn selector(&self) -> Selector {
        self.labels.clone().into_iter().collect()
    }

    /// Name of the helper pod bound to `volume`
    pub fn unit_name(&self, volume: &str) -> String {
        format!("{}{}", self.name_prefix, volume)
    }

    /// Resolved shell command for `volume`
    pub fn exec_command(&self, volume: &str) -> String {
        self.exec_template.replace(VOLUME_PLACEHOLDER, volume)
    }

    /// Full argv executed in the helper pod for `volume`
    pub fn shell_command(&self, volume: &str) -> Vec<String> {
        SHELL
            .iter()
            .map(|s| s.to_string())
            .chain(std::iter::once(self.exec_command(volume)))
            .collect()
    }

    /// Archive path inside the helper pod, for templates that move data
    pub fn archive_path(&self, volume: &str) -> Option<String> {
        self.archive_template
            .as_ref()
            .map(|t| t.replace(VOLUME_PLACEHOLDER, volume))
    }

    /// Declarative description of the helper pod bound to `volume`
    pub fn unit_spec(&self, volume: &str) -> UnitSpec {
        let mut labels = self.labels.clone();
        labels.insert(VOLUME_LABEL.to_string(), volume.to_string());

        UnitSpec {
            name: self.unit_name(volume),
            image: self.image.clone(),
            container_name: self.container_name.clone(),
            command: self.command.clone(),
            volume_name: volume.to_string(),
            mount_path: self.mount_path.clone(),
            labels,
        }
    }
}
