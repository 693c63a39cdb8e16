//! Cluster control facade
//!
//! Policy shared by every orchestrator: which volumes hold AIS state, how
//! helper pods are created, awaited, driven and removed, and whether the
//! cluster is currently serving.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::config::{ClusterRef, StateManagerConfig};
use crate::error::{Error, Result};
use crate::metrics;
use crate::template::{cluster_selector, UnitTemplate, COMPONENT_LABEL, NAME_LABEL};
use crate::wait::poll_until;

use super::{ControlPlane, ExecOutput, VolumeRole, VolumeSpec};

/// Pod phase reported once every container has started
pub const PHASE_RUNNING: &str = "Running";

/// Cluster operations used by the backup, deletion and restore runs
pub struct ClusterFacade {
    plane: Arc<dyn ControlPlane>,
    cluster: ClusterRef,
    config: StateManagerConfig,
}

impl ClusterFacade {
    pub fn new(plane: Arc<dyn ControlPlane>, cluster: ClusterRef, config: StateManagerConfig) -> Self {
        Self {
            plane,
            cluster,
            config,
        }
    }

    pub fn cluster(&self) -> &ClusterRef {
        &self.cluster
    }

    pub fn config(&self) -> &StateManagerConfig {
        &self.config
    }

    /// Names of the volumes holding AIS state.
    ///
    /// Volumes on the excluded local storage class carry object data and are
    /// never returned. With `proxy_only`, only proxy volumes are kept.
    pub async fn discover_volumes(&self, proxy_only: bool) -> Result<BTreeSet<String>> {
        let selector = cluster_selector(&self.cluster);
        let volumes = self.plane.list_volumes(&selector).await?;

        let names = volumes
            .into_iter()
            .filter(|v| v.storage_class.as_deref() != Some(self.config.excluded_storage_class.as_str()))
            .filter(|v| !proxy_only || v.role == Some(VolumeRole::Proxy))
            .map(|v| v.name)
            .collect::<BTreeSet<_>>();

        if names.is_empty() {
            warn!(selector = %selector, proxy_only, "No state volumes found");
        } else {
            info!(volumes = ?names, proxy_only, "Found state volumes");
        }
        Ok(names)
    }

    /// Create one helper pod per volume
    pub async fn deploy_units(&self, template: &UnitTemplate, volumes: &[String]) -> Result<()> {
        for volume in volumes {
            let spec = template.unit_spec(volume);
            info!(unit = %spec.name, volume = %volume, "Creating helper pod");
            self.plane.create_unit(&spec).await?;
            metrics::UNITS_DEPLOYED
                .with_label_values(&[template.operation().as_str()])
                .inc();
        }
        Ok(())
    }

    /// Wait until `expected` pods of `template` exist and all report `desired` phase.
    ///
    /// Pods that vanish keep the wait pending, so a missing pod surfaces as
    /// a timeout rather than as a failed exec later on.
    pub async fn await_status(
        &self,
        template: &UnitTemplate,
        desired: &str,
        expected: usize,
        timeout: Duration,
        interval: Duration,
    ) -> Result<()> {
        let selector = &template.selector();
        let what = format!(
            "{} {} pods to reach status {}",
            expected,
            template.operation(),
            desired
        );

        poll_until(&what, timeout, interval, move || async move {
            let units = self.plane.list_units(selector).await?;
            if units.len() != expected {
                debug!(found = units.len(), expected, "Waiting for helper pods to appear");
                return Ok(false);
            }
            Ok(units.iter().all(|u| u.phase.as_deref() == Some(desired)))
        })
        .await?;

        info!(operation = %template.operation(), status = desired, "All pods reached status");
        Ok(())
    }

    /// Wait for the `expected` pods of `template` to run, using configured bounds
    pub async fn await_running(&self, template: &UnitTemplate, expected: usize) -> Result<()> {
        self.await_status(
            template,
            PHASE_RUNNING,
            expected,
            self.config.running_timeout(),
            self.config.poll_interval(),
        )
        .await
    }

    /// Run the template's command in the pod bound to each volume
    pub async fn execute(&self, template: &UnitTemplate, volumes: &[String]) -> Result<Vec<ExecOutput>> {
        self.for_each_volume(volumes, |volume| self.execute_one(template, volume))
            .await
    }

    async fn execute_one(&self, template: &UnitTemplate, volume: &str) -> Result<ExecOutput> {
        let unit = template.unit_name(volume);
        let command = template.shell_command(volume);
        info!(unit = %unit, command = ?command, "Executing command in pod");

        let output = self
            .plane
            .exec(&unit, template.container_name(), &command)
            .await?;
        debug!(unit = %unit, output = %output.output, "Command output");

        if !output.success {
            return Err(Error::transport(format!(
                "Command {:?} failed in pod {}: {}",
                command,
                unit,
                output.output.trim()
            )));
        }
        Ok(output)
    }

    /// Delete every pod of `template` and wait until none remain
    pub async fn teardown(&self, template: &UnitTemplate) -> Result<()> {
        let selector = &template.selector();
        let units = self.plane.list_units(selector).await?;
        for unit in &units {
            info!(unit = %unit.name, "Deleting helper pod");
            self.plane.delete_unit(&unit.name).await?;
        }

        let what = format!("{} pods to be deleted", template.operation());
        poll_until(
            &what,
            self.config.deletion_timeout(),
            self.config.poll_interval(),
            move || async move { Ok(self.plane.list_units(selector).await?.is_empty()) },
        )
        .await
    }

    /// Whether any proxy or target pod of the cluster exists
    pub async fn is_cluster_live(&self) -> Result<bool> {
        let units = self
            .plane
            .list_units(&cluster_selector(&self.cluster))
            .await?;
        if !units.is_empty() {
            debug!(pods = units.len(), "Cluster pods found");
        }
        Ok(!units.is_empty())
    }

    /// Create a state volume labelled the way a normal deployment would
    pub async fn create_volume(&self, name: &str) -> Result<VolumeRole> {
        let role = VolumeRole::infer(name);

        let mut labels = BTreeMap::new();
        labels.insert(NAME_LABEL.to_string(), self.cluster.name.clone());
        labels.insert(COMPONENT_LABEL.to_string(), role.as_str().to_string());

        let spec = VolumeSpec {
            name: name.to_string(),
            access_mode: self.config.volume_access_mode.clone(),
            storage_class: self.config.volume_storage_class.clone(),
            capacity: self.config.volume_capacity.clone(),
            labels,
        };

        info!(volume = %name, role = %role, "Creating volume claim");
        self.plane.create_volume(&spec).await?;
        metrics::VOLUMES_CREATED
            .with_label_values(&[role.as_str()])
            .inc();
        Ok(role)
    }

    /// Run `f` for every volume, at most `parallelism` at a time.
    ///
    /// Results keep the order of `volumes`; the first error wins.
    pub async fn for_each_volume<'a, F, Fut, T>(&self, volumes: &'a [String], f: F) -> Result<Vec<T>>
    where
        F: FnMut(&'a String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        stream::iter(volumes)
            .map(f)
            .buffered(self.config.parallelism.max(1))
            .try_collect()
            .await
    }
}
