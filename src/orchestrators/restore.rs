//! Restore run
//!
//! Unpacks a backup bundle locally, reconciles the volumes it names with
//! the volumes that exist, and unpacks each volume archive inside a helper
//! pod bound to that volume.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use tracing::{info, instrument};

use crate::archive;
use crate::cluster::{ClusterFacade, FileCopier};
use crate::error::{Error, Result};
use crate::metrics;
use crate::template::{Operation, UnitTemplate};

use super::{tracked, with_units};

/// Name of the staging directory under the restore directory
const STAGING_DIR: &str = "pvc_backups";

/// Outcome of comparing existing volumes with those named by a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Existing volumes are exactly the desired ones
    UseExisting,
    /// No volumes exist; every desired volume must be created
    CreateAll,
}

/// Decide how to reconcile `existing` volumes with `desired` ones.
///
/// A non-empty existing set that differs from the desired set is never
/// resolved automatically.
pub fn reconcile(existing: &BTreeSet<String>, desired: &BTreeSet<String>) -> Result<Reconciliation> {
    if existing == desired {
        return Ok(Reconciliation::UseExisting);
    }
    if existing.is_empty() {
        return Ok(Reconciliation::CreateAll);
    }
    Err(Error::precondition(format!(
        "Found existing volumes not matching restore file. Desired: {:?}. Actual: {:?}",
        desired, existing
    )))
}

/// What a completed restore touched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Volumes data was restored to
    pub volumes: Vec<String>,
    /// Volumes created before restoring
    pub created: Vec<String>,
}

/// Drives volume reconciliation and data restoration
pub struct RestoreOrchestrator<'a> {
    facade: &'a ClusterFacade,
    copier: &'a dyn FileCopier,
    template: UnitTemplate,
    source: PathBuf,
    staging_dir: PathBuf,
}

impl<'a> RestoreOrchestrator<'a> {
    pub fn new(
        facade: &'a ClusterFacade,
        copier: &'a dyn FileCopier,
        source: impl Into<PathBuf>,
        restore_dir: impl Into<PathBuf>,
    ) -> Self {
        let template = UnitTemplate::restore(facade.cluster(), facade.config());
        Self {
            facade,
            copier,
            template,
            source: source.into(),
            staging_dir: restore_dir.into().join(STAGING_DIR),
        }
    }

    pub fn template(&self) -> &UnitTemplate {
        &self.template
    }

    /// Restore the bundle into the cluster's state volumes
    #[instrument(skip(self), fields(namespace = %self.facade.cluster().namespace, cluster = %self.facade.cluster().name, source = %self.source.display()))]
    pub async fn run(&self) -> Result<RestoreSummary> {
        tracked(Operation::Restore, self.execute()).await
    }

    async fn execute(&self) -> Result<RestoreSummary> {
        info!("Checking for running cluster");
        if self.facade.is_cluster_live().await? {
            return Err(Error::precondition("Aborting restore -- cluster is running"));
        }

        let archives = self.extract_bundle().await?;
        if archives.is_empty() {
            return Err(Error::precondition(format!(
                "Restore file {} contains no volume archives",
                self.source.display()
            )));
        }

        let desired = archives.keys().cloned().collect::<BTreeSet<_>>();
        let created = self.reconcile_volumes(&desired).await?;
        let volumes = desired.into_iter().collect::<Vec<_>>();

        self.facade.teardown(&self.template).await?;

        with_units(self.facade, &self.template, &volumes, async {
            info!("Copying data archives to restore pods");
            self.push_archives(&volumes, &archives).await?;

            info!("Extracting data archives in restore pods");
            self.facade.execute(&self.template, &volumes).await?;
            Ok::<_, Error>(())
        })
        .await?;

        info!(volumes = ?volumes, "Restore complete");
        Ok(RestoreSummary { volumes, created })
    }

    /// Unpack the bundle into a clean staging directory
    async fn extract_bundle(&self) -> Result<BTreeMap<String, PathBuf>> {
        if !self.source.is_file() {
            return Err(Error::config(format!(
                "Restore file {} does not exist",
                self.source.display()
            )));
        }

        info!(staging = %self.staging_dir.display(), "Extracting restore file");
        let (source, staging) = (self.source.clone(), self.staging_dir.clone());
        archive::blocking(move || {
            // Archives from an earlier restore must not leak into the desired set
            if staging.exists() {
                fs::remove_dir_all(&staging)?;
            }
            fs::create_dir_all(&staging)?;

            archive::unpack(&source, &staging)?;
            archive::volume_archives(&staging)
        })
        .await
    }

    /// Make the existing volume set match `desired`, returning created volumes
    async fn reconcile_volumes(&self, desired: &BTreeSet<String>) -> Result<Vec<String>> {
        let existing = self.facade.discover_volumes(false).await?;

        match reconcile(&existing, desired)? {
            Reconciliation::UseExisting => {
                info!(volumes = ?existing, "Found volumes matching restore file");
                Ok(Vec::new())
            }
            Reconciliation::CreateAll => {
                info!(volumes = ?desired, "No volumes found, creating them");
                let mut created = Vec::with_capacity(desired.len());
                for name in desired {
                    self.facade.create_volume(name).await?;
                    created.push(name.clone());
                }
                Ok(created)
            }
        }
    }

    /// Copy each volume's archive from staging into its pod
    async fn push_archives(
        &self,
        volumes: &[String],
        archives: &BTreeMap<String, PathBuf>,
    ) -> Result<()> {
        self.facade
            .for_each_volume(volumes, move |volume| async move {
                let local = archives.get(volume).ok_or_else(|| {
                    Error::archive(format!("No archive staged for volume {}", volume))
                })?;
                let unit = self.template.unit_name(volume);
                let remote = self.template.archive_path(volume).ok_or_else(|| {
                    Error::config("Restore template does not define an archive path")
                })?;

                self.copier
                    .copy_to_unit(local, &unit, self.template.container_name(), &remote)
                    .await?;
                metrics::TRANSFERS_TOTAL
                    .with_label_values(&["to_unit"])
                    .inc();
                Ok::<_, Error>(())
            })
            .await?;
        Ok(())
    }
}
