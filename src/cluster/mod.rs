//! Cluster control
//!
//! [`ControlPlane`] and [`FileCopier`] are the seams to the outside world:
//! the Kubernetes API and `kubectl cp`. [`ClusterFacade`] holds the policy
//! that orchestrators rely on (which volumes count, when a wait has failed,
//! how pods are named) on top of those seams.

mod copy;
mod facade;
mod kube_plane;

pub use copy::KubectlCopier;
pub use facade::ClusterFacade;
pub use kube_plane::KubeControlPlane;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use kube::core::Selector;

/// Role of an AIS pod, as carried by the component label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeRole {
    Proxy,
    Target,
}

impl VolumeRole {
    pub fn as_str(self) -> &'static str {
        match self {
            VolumeRole::Proxy => "proxy",
            VolumeRole::Target => "target",
        }
    }

    /// Parse a component label value
    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "proxy" => Some(VolumeRole::Proxy),
            "target" => Some(VolumeRole::Target),
            _ => None,
        }
    }

    /// Role for a volume that only exists in a backup, guessed from its name
    pub fn infer(volume_name: &str) -> Self {
        if volume_name.contains("target") {
            VolumeRole::Target
        } else {
            VolumeRole::Proxy
        }
    }
}

impl fmt::Display for VolumeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persistent volume claim as seen by discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub name: String,
    pub storage_class: Option<String>,
    pub role: Option<VolumeRole>,
}

/// Declarative description of a volume claim to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    pub name: String,
    pub access_mode: String,
    pub storage_class: String,
    pub capacity: String,
    pub labels: BTreeMap<String, String>,
}

/// Declarative description of a helper pod bound to one volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSpec {
    pub name: String,
    pub image: String,
    pub container_name: String,
    pub command: Vec<String>,
    /// Claim mounted into the pod
    pub volume_name: String,
    pub mount_path: String,
    pub labels: BTreeMap<String, String>,
}

/// Observed state of a helper pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInfo {
    pub name: String,
    /// Pod phase (`Pending`, `Running`, ...), if reported yet
    pub phase: Option<String>,
}

/// Result of a command executed inside a helper pod
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Combined stdout and stderr
    pub output: String,
    /// Whether the command reported success
    pub success: bool,
}

/// Control-plane operations needed by the state manager
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// List volume claims matching a label selector
    async fn list_volumes(&self, selector: &Selector) -> Result<Vec<VolumeInfo>>;

    /// Create a volume claim
    async fn create_volume(&self, spec: &VolumeSpec) -> Result<()>;

    /// Create a helper pod
    async fn create_unit(&self, spec: &UnitSpec) -> Result<()>;

    /// Delete a helper pod; deleting a missing pod is not an error
    async fn delete_unit(&self, name: &str) -> Result<()>;

    /// List pods matching a label selector
    async fn list_units(&self, selector: &Selector) -> Result<Vec<UnitInfo>>;

    /// Run a command in a pod's container and capture its output
    async fn exec(&self, unit: &str, container: &str, command: &[String]) -> Result<ExecOutput>;
}

/// Bulk copy of single files between the local disk and a pod
#[async_trait]
pub trait FileCopier: Send + Sync {
    /// Copy `remote` inside the pod to the local file `local`
    async fn copy_from_unit(
        &self,
        unit: &str,
        container: &str,
        remote: &str,
        local: &Path,
    ) -> Result<()>;

    /// Copy the local file `local` to `remote` inside the pod
    async fn copy_to_unit(
        &self,
        local: &Path,
        unit: &str,
        container: &str,
        remote: &str,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_inference() {
        assert_eq!(VolumeRole::infer("ais-target-ais-target-0"), VolumeRole::Target);
        assert_eq!(VolumeRole::infer("ais-proxy-ais-proxy-0"), VolumeRole::Proxy);
        assert_eq!(VolumeRole::infer("state-0"), VolumeRole::Proxy);
    }

    #[test]
    fn test_role_from_label() {
        assert_eq!(VolumeRole::from_label("proxy"), Some(VolumeRole::Proxy));
        assert_eq!(VolumeRole::from_label("target"), Some(VolumeRole::Target));
        assert_eq!(VolumeRole::from_label("gateway"), None);
    }
}
