//! Command line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{ClusterRef, StateManagerConfig};
use crate::error::Result;

#[derive(Parser, Debug)]
#[command(name = "ais-state-manager")]
#[command(author, version, about = "Manage AIS cluster metadata backups, deletions, and restores", long_about = None)]
pub struct Cli {
    /// Kubernetes context to use (defaults to the current context)
    #[arg(long)]
    pub kube_context: Option<String>,

    /// Namespace of the cluster
    #[arg(short, long)]
    pub namespace: String,

    /// Cluster name (value of the app.kubernetes.io/name label)
    #[arg(short, long)]
    pub cluster: String,

    /// YAML file overriding default settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of volumes processed concurrently
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Write Prometheus metrics to this file when the run ends
    #[arg(long)]
    pub metrics_textfile: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Back up every state volume into one tar.gz bundle
    Backup {
        /// Directory receiving the bundle
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Delete metadata files from state volumes
    Delete {
        /// Comma-separated metadata kinds (smap,conf,bmd,rmd,override,all)
        #[arg(short, long)]
        metadata: String,

        /// Confirm proxy-only deletion on a running cluster without asking
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Restore a backup bundle into the cluster's state volumes
    Restore {
        /// Backup tar.gz produced by the backup command
        #[arg(short, long)]
        source: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Cli {
    pub fn cluster_ref(&self) -> ClusterRef {
        ClusterRef::new(self.namespace.trim(), self.cluster.trim())
    }

    /// Load the config file and apply command line overrides
    pub fn load_config(&self) -> Result<StateManagerConfig> {
        let mut config = StateManagerConfig::load(self.config.as_deref())?;
        if let Some(parallelism) = self.parallelism {
            config.parallelism = parallelism;
        }
        if let Command::Backup {
            output_dir: Some(dir),
        } = &self.command
        {
            config.backup_dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delete() {
        let cli = Cli::try_parse_from([
            "ais-state-manager",
            "--namespace",
            "ais",
            "--cluster",
            "ais",
            "delete",
            "--metadata",
            "rmd",
            "--yes",
        ])
        .unwrap();

        assert_eq!(
            cli.command,
            Command::Delete {
                metadata: "rmd".to_string(),
                yes: true
            }
        );
        assert_eq!(cli.cluster_ref(), ClusterRef::new("ais", "ais"));
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_backup_output_dir_overrides_config() {
        let cli = Cli::try_parse_from([
            "ais-state-manager",
            "-n",
            "ais",
            "-c",
            "ais",
            "--parallelism",
            "3",
            "backup",
            "--output-dir",
            "/srv/backups",
        ])
        .unwrap();

        let config = cli.load_config().unwrap();
        assert_eq!(config.backup_dir, PathBuf::from("/srv/backups"));
        assert_eq!(config.parallelism, 3);
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let cli = Cli::try_parse_from([
            "ais-state-manager",
            "-n",
            "ais",
            "-c",
            "ais",
            "--parallelism",
            "0",
            "restore",
            "--source",
            "backup.tar.gz",
        ])
        .unwrap();

        assert!(cli.load_config().is_err());
    }

    #[test]
    fn test_namespace_is_required() {
        assert!(Cli::try_parse_from(["ais-state-manager", "-c", "ais", "backup"]).is_err());
    }
}
