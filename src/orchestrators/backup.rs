//! Backup run
//!
//! Archives every state volume inside its helper pod, copies the archives
//! to a local staging directory and bundles them into one tar.gz.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, instrument};

use crate::archive::{self, ARCHIVE_SUFFIX};
use crate::cluster::{ClusterFacade, FileCopier};
use crate::error::{Error, Result};
use crate::metrics;
use crate::template::{Operation, UnitTemplate};

use super::{tracked, with_units};

/// Drives a full backup of a cluster's state volumes
pub struct BackupOrchestrator<'a> {
    facade: &'a ClusterFacade,
    copier: &'a dyn FileCopier,
    template: UnitTemplate,
    backup_dir: PathBuf,
}

impl<'a> BackupOrchestrator<'a> {
    pub fn new(
        facade: &'a ClusterFacade,
        copier: &'a dyn FileCopier,
        backup_dir: impl Into<PathBuf>,
    ) -> Self {
        let template = UnitTemplate::backup(facade.cluster(), facade.config());
        Self {
            facade,
            copier,
            template,
            backup_dir: backup_dir.into(),
        }
    }

    pub fn template(&self) -> &UnitTemplate {
        &self.template
    }

    /// Run the backup and return the path of the written bundle
    #[instrument(skip(self), fields(namespace = %self.facade.cluster().namespace, cluster = %self.facade.cluster().name))]
    pub async fn run(&self) -> Result<PathBuf> {
        tracked(Operation::Backup, self.execute()).await
    }

    async fn execute(&self) -> Result<PathBuf> {
        // Pods left behind by an aborted run would collide on names
        self.facade.teardown(&self.template).await?;

        info!("Searching for state volumes");
        let volumes = self
            .facade
            .discover_volumes(false)
            .await?
            .into_iter()
            .collect::<Vec<_>>();
        if volumes.is_empty() {
            return Err(Error::precondition(format!(
                "No valid state volumes found in namespace {}",
                self.facade.cluster().namespace
            )));
        }

        let name = archive::bundle_name(self.facade.cluster(), Local::now());
        let staging = self.backup_dir.join(&name);
        let bundle = self.backup_dir.join(format!("{}{}", name, ARCHIVE_SUFFIX));

        let entries = with_units(self.facade, &self.template, &volumes, async {
            info!("Creating data archives");
            self.facade.execute(&self.template, &volumes).await?;

            info!(staging = %staging.display(), "Fetching archives");
            self.fetch_archives(&volumes, &staging).await?;

            let (staging, bundle) = (staging.clone(), bundle.clone());
            archive::blocking(move || archive::bundle_files(&staging, &bundle)).await
        })
        .await?;

        info!(bundle = %bundle.display(), volumes = entries.len(), "Backup complete");
        Ok(bundle)
    }

    /// Copy each volume's archive out of its pod, one copy per volume
    async fn fetch_archives(&self, volumes: &[String], staging: &Path) -> Result<()> {
        tokio::fs::create_dir_all(staging).await?;

        self.facade
            .for_each_volume(volumes, move |volume| async move {
                let unit = self.template.unit_name(volume);
                let remote = self.template.archive_path(volume).ok_or_else(|| {
                    Error::config("Backup template does not define an archive path")
                })?;
                let local = staging.join(archive::volume_archive_name(volume));

                self.copier
                    .copy_from_unit(&unit, self.template.container_name(), &remote, &local)
                    .await?;
                metrics::TRANSFERS_TOTAL
                    .with_label_values(&["from_unit"])
                    .inc();
                Ok::<_, Error>(())
            })
            .await?;
        Ok(())
    }
}
