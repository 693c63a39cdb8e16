//! Kubernetes implementation of the control plane
//!
//! State volumes are PersistentVolumeClaims and helper units are bare pods
//! (`restartPolicy: Never`) mounting exactly one claim.

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::{
    api::{AttachParams, DeleteParams, ListParams, PostParams},
    config::KubeConfigOptions,
    core::Selector,
    Api, Client, Config, ResourceExt,
};
use serde_json::json;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::template::COMPONENT_LABEL;

use super::{ControlPlane, ExecOutput, UnitInfo, UnitSpec, VolumeInfo, VolumeRole, VolumeSpec};

/// Name of the pod volume wrapping the mounted claim
const POD_VOLUME_NAME: &str = "pvc-volume";

/// Control plane backed by a namespaced Kubernetes client
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
    namespace: String,
}

impl KubeControlPlane {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// Connect using the local kubeconfig, optionally pinned to a context
    pub async fn connect(context: Option<&str>, namespace: &str) -> Result<Self> {
        let client = match context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..Default::default()
                };
                let config = Config::from_kubeconfig(&options).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to load kubeconfig context '{}': {}",
                        context, e
                    ))
                })?;
                Client::try_from(config)?
            }
            None => Client::try_default().await?,
        };
        info!(namespace, "Connected to Kubernetes API server");
        Ok(Self::new(client, namespace))
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn claims(&self) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn pvc_manifest(&self, spec: &VolumeSpec) -> Result<PersistentVolumeClaim> {
        let manifest = json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "metadata": {
                "name": spec.name,
                "namespace": self.namespace,
                "labels": spec.labels,
            },
            "spec": {
                "accessModes": [spec.access_mode],
                "storageClassName": spec.storage_class,
                "resources": {
                    "requests": { "storage": spec.capacity }
                }
            }
        });
        Ok(serde_json::from_value(manifest)?)
    }

    fn pod_manifest(&self, spec: &UnitSpec) -> Result<Pod> {
        let manifest = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": spec.name,
                "namespace": self.namespace,
                "labels": spec.labels,
            },
            "spec": {
                "containers": [{
                    "name": spec.container_name,
                    "image": spec.image,
                    "command": spec.command,
                    "volumeMounts": [{
                        "mountPath": spec.mount_path,
                        "name": POD_VOLUME_NAME,
                    }]
                }],
                "volumes": [{
                    "name": POD_VOLUME_NAME,
                    "persistentVolumeClaim": { "claimName": spec.volume_name }
                }],
                "restartPolicy": "Never"
            }
        });
        Ok(serde_json::from_value(manifest)?)
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn list_volumes(&self, selector: &Selector) -> Result<Vec<VolumeInfo>> {
        let params = ListParams::default().labels_from(selector);
        let claims = self.claims().list(&params).await?;

        Ok(claims
            .items
            .iter()
            .map(|pvc| VolumeInfo {
                name: pvc.name_any(),
                storage_class: pvc
                    .spec
                    .as_ref()
                    .and_then(|s| s.storage_class_name.clone()),
                role: pvc
                    .labels()
                    .get(COMPONENT_LABEL)
                    .and_then(|v| VolumeRole::from_label(v)),
            })
            .collect())
    }

    async fn create_volume(&self, spec: &VolumeSpec) -> Result<()> {
        let pvc = self.pvc_manifest(spec)?;
        self.claims().create(&PostParams::default(), &pvc).await?;
        Ok(())
    }

    async fn create_unit(&self, spec: &UnitSpec) -> Result<()> {
        let pod = self.pod_manifest(spec)?;
        self.pods().create(&PostParams::default(), &pod).await?;
        Ok(())
    }

    async fn delete_unit(&self, name: &str) -> Result<()> {
        match self.pods().delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                debug!(unit = %name, "Pod already gone");
                Ok(())
            }
            Err(other) => Err(Error::Kube(other)),
        }
    }

    async fn list_units(&self, selector: &Selector) -> Result<Vec<UnitInfo>> {
        let params = ListParams::default().labels_from(selector);
        let pods = self.pods().list(&params).await?;

        Ok(pods
            .items
            .iter()
            .map(|pod| UnitInfo {
                name: pod.name_any(),
                phase: pod.status.as_ref().and_then(|s| s.phase.clone()),
            })
            .collect())
    }

    async fn exec(&self, unit: &str, container: &str, command: &[String]) -> Result<ExecOutput> {
        let params = AttachParams::default()
            .container(container)
            .stdout(true)
            .stderr(true);

        let mut attached = self
            .pods()
            .exec(unit, command.to_vec(), &params)
            .await
            .map_err(|e| Error::transport(format!("Failed to exec in pod {}: {}", unit, e)))?;

        let status = attached.take_status();
        let stdout = attached.stdout();
        let stderr = attached.stderr();
        let (stdout, stderr) = tokio::join!(read_to_string(stdout), read_to_string(stderr));
        let status = match status {
            Some(status) => status.await,
            None => None,
        };

        attached.join().await.map_err(|e| {
            Error::transport(format!("Exec session in pod {} failed: {}", unit, e))
        })?;

        // The API server only reports a Failure status when the command exits non-zero
        let success = status
            .map(|s| s.status.as_deref() != Some("Failure"))
            .unwrap_or(true);

        Ok(ExecOutput {
            output: format!("{}{}", stdout, stderr),
            success,
        })
    }
}

/// Drain an attached stream into a string
async fn read_to_string<R>(reader: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };

    ReaderStream::new(reader)
        .filter_map(|chunk| async move {
            chunk
                .ok()
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        })
        .collect::<Vec<_>>()
        .await
        .concat()
}
