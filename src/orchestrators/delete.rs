//! Metadata deletion run
//!
//! Removes selected AIS metadata files in place from state volumes. A live
//! cluster blocks the run, except for proxy-only metadata where the operator
//! may explicitly confirm.

use tracing::{info, instrument, warn};

use crate::cluster::ClusterFacade;
use crate::error::{Error, Result};
use crate::metadata::{is_proxy_only, MetadataKind};
use crate::prompt::Confirm;
use crate::template::{Operation, UnitTemplate};

use super::{tracked, with_units};

/// Drives in-place removal of metadata files
pub struct DeletionOrchestrator<'a> {
    facade: &'a ClusterFacade,
    confirm: &'a dyn Confirm,
    kinds: Vec<MetadataKind>,
    template: UnitTemplate,
}

impl<'a> DeletionOrchestrator<'a> {
    pub fn new(
        facade: &'a ClusterFacade,
        confirm: &'a dyn Confirm,
        kinds: Vec<MetadataKind>,
    ) -> Self {
        let template = UnitTemplate::deletion(facade.cluster(), facade.config(), &kinds);
        Self {
            facade,
            confirm,
            kinds,
            template,
        }
    }

    pub fn template(&self) -> &UnitTemplate {
        &self.template
    }

    /// Whether the run only touches proxy volumes
    pub fn proxy_only(&self) -> bool {
        is_proxy_only(&self.kinds)
    }

    /// Run the deletion and return the volumes it was applied to
    #[instrument(skip(self), fields(namespace = %self.facade.cluster().namespace, cluster = %self.facade.cluster().name))]
    pub async fn run(&self) -> Result<Vec<String>> {
        if self.kinds.is_empty() {
            return Err(Error::config("No metadata kinds selected for deletion"));
        }
        tracked(Operation::Delete, self.execute()).await
    }

    async fn execute(&self) -> Result<Vec<String>> {
        let proxy_only = self.proxy_only();

        info!("Checking for running cluster");
        if self.facade.is_cluster_live().await? {
            self.confirm_live_deletion(proxy_only).await?;
        }

        self.facade.teardown(&self.template).await?;

        let volumes = self
            .facade
            .discover_volumes(proxy_only)
            .await?
            .into_iter()
            .collect::<Vec<_>>();
        if volumes.is_empty() {
            warn!("No state volumes to delete metadata from");
            return Ok(volumes);
        }

        with_units(self.facade, &self.template, &volumes, async {
            info!(metadata = ?self.kinds, "Running deletion task on metadata");
            self.facade.execute(&self.template, &volumes).await?;
            Ok::<_, Error>(())
        })
        .await?;

        info!("Metadata deletion complete");
        Ok(volumes)
    }

    async fn confirm_live_deletion(&self, proxy_only: bool) -> Result<()> {
        if !proxy_only {
            return Err(Error::precondition("Aborting deletion -- cluster is running"));
        }

        let kinds = self
            .kinds
            .iter()
            .map(|k| k.name())
            .collect::<Vec<_>>()
            .join(",");
        let question = format!(
            "Cluster {} is running. Delete proxy-only metadata ({}) from its proxy volumes anyway?",
            self.facade.cluster().name,
            kinds
        );

        if !self.confirm.confirm(&question).await? {
            return Err(Error::precondition(
                "Aborting deletion -- cluster is running and deletion was not confirmed",
            ));
        }
        warn!(metadata = %kinds, "Deleting proxy-only metadata on a running cluster");
        Ok(())
    }
}
