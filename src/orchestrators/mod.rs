//! Orchestrators for AIS state operations
//!
//! Every run follows the same shape:
//! check preconditions, discover or reconcile volumes, deploy one helper pod
//! per volume, wait for them to run, execute and transfer per volume, then
//! tear the pods down.

pub mod backup;
pub mod delete;
pub mod restore;

pub use backup::BackupOrchestrator;
pub use delete::DeletionOrchestrator;
pub use restore::{reconcile, Reconciliation, RestoreOrchestrator, RestoreSummary};

use std::future::Future;

use tracing::{error, warn};

use crate::cluster::ClusterFacade;
use crate::error::Result;
use crate::metrics;
use crate::template::{Operation, UnitTemplate};

/// Deploy pods for `volumes`, wait until they run, drive `work`, tear down.
///
/// Once deployment has started, a failure in any later step still removes
/// the template's pods before the original error is returned. Volumes are
/// never rolled back.
pub(crate) async fn with_units<T, Fut>(
    facade: &ClusterFacade,
    template: &UnitTemplate,
    volumes: &[String],
    work: Fut,
) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let result = async {
        facade.deploy_units(template, volumes).await?;
        facade.await_running(template, volumes.len()).await?;
        work.await
    }
    .await;

    match result {
        Ok(value) => {
            facade.teardown(template).await?;
            Ok(value)
        }
        Err(e) => {
            warn!(operation = %template.operation(), error = %e, "Run failed, removing helper pods");
            if let Err(cleanup) = facade.teardown(template).await {
                error!(
                    operation = %template.operation(),
                    error = %cleanup,
                    "Failed to remove helper pods, manual cleanup may be needed"
                );
            }
            Err(e)
        }
    }
}

/// Time a run and record its outcome
pub(crate) async fn tracked<T, Fut>(operation: Operation, run: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let timer = metrics::OPERATION_DURATION
        .with_label_values(&[operation.as_str()])
        .start_timer();
    let result = run.await;
    timer.observe_duration();
    metrics::record_outcome(operation.as_str(), result.is_ok());
    result
}
