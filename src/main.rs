//! AIS State Manager
//!
//! Entry point: parses the command line, connects to Kubernetes, runs one
//! backup, deletion or restore, and maps its outcome to an exit code.

use std::process;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ais_state_manager::{
    cli::{Cli, Command, LogFormat},
    cluster::{ClusterFacade, KubeControlPlane, KubectlCopier},
    metadata,
    metrics,
    orchestrators::{BackupOrchestrator, DeletionOrchestrator, RestoreOrchestrator},
    prompt::{AssumeYes, Confirm, StdinConfirm},
    Result,
};

/// Exit code reported when the run is interrupted
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let metrics_textfile = cli.metrics_textfile.clone();

    let code = tokio::select! {
        result = run(cli) => match result {
            Ok(()) => 0,
            Err(e) => {
                error!(error = %e, kind = ?e.kind(), "Run failed");
                e.exit_code()
            }
        },
        _ = shutdown_signal() => {
            warn!("Interrupted, helper pods may need manual cleanup");
            INTERRUPTED_EXIT_CODE
        }
    };

    if let Some(path) = metrics_textfile {
        if let Err(e) = metrics::write_textfile(&path) {
            warn!(error = %e, path = %path.display(), "Failed to write metrics");
        }
    }

    process::exit(code);
}

/// Dispatch the selected command
async fn run(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;
    let cluster = cli.cluster_ref();

    info!(namespace = %cluster.namespace, cluster = %cluster.name, "Starting AIS state manager");

    let plane = KubeControlPlane::connect(cli.kube_context.as_deref(), &cluster.namespace).await?;
    let copier = KubectlCopier::new(&cluster.namespace, cli.kube_context.clone());
    let facade = ClusterFacade::new(Arc::new(plane), cluster, config.clone());

    match &cli.command {
        Command::Backup { .. } => {
            let bundle = BackupOrchestrator::new(&facade, &copier, &config.backup_dir)
                .run()
                .await?;
            info!(bundle = %bundle.display(), "Backup written");
        }
        Command::Delete { metadata, yes } => {
            let kinds = metadata::parse_selection(metadata)?;
            let confirm: &dyn Confirm = if *yes { &AssumeYes } else { &StdinConfirm };
            let volumes = DeletionOrchestrator::new(&facade, confirm, kinds)
                .run()
                .await?;
            info!(volumes = ?volumes, "Deletion finished");
        }
        Command::Restore { source } => {
            let summary = RestoreOrchestrator::new(&facade, &copier, source, &config.restore_dir)
                .run()
                .await?;
            info!(volumes = ?summary.volumes, created = ?summary.created, "Restore finished");
        }
    }
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
