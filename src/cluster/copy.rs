//! Bulk file copy through `kubectl cp`
//!
//! The Kubernetes API has no file transfer endpoint, so single files are
//! moved in and out of helper pods by shelling out to kubectl.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::error::{Error, Result};

use super::FileCopier;

/// Copies files with the local `kubectl` binary
#[derive(Debug, Clone)]
pub struct KubectlCopier {
    kubectl: String,
    namespace: String,
    context: Option<String>,
}

impl KubectlCopier {
    pub fn new(namespace: impl Into<String>, context: Option<String>) -> Self {
        Self {
            kubectl: "kubectl".to_string(),
            namespace: namespace.into(),
            context,
        }
    }

    /// Use a kubectl binary other than the one on `PATH`
    pub fn with_binary(mut self, kubectl: impl Into<String>) -> Self {
        self.kubectl = kubectl.into();
        self
    }

    fn pod_path(&self, unit: &str, remote: &str) -> String {
        format!("{}/{}:{}", self.namespace, unit, remote)
    }

    /// Arguments for `kubectl cp <src> <dest> -c <container>`
    fn cp_args(&self, src: &str, dest: &str, container: &str) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        args.extend([
            "cp".to_string(),
            src.to_string(),
            dest.to_string(),
            "-c".to_string(),
            container.to_string(),
        ]);
        args
    }

    async fn run(&self, args: Vec<String>, unit: &str) -> Result<()> {
        info!(command = %format!("{} {}", self.kubectl, args.join(" ")), "Copying file");

        let output = Command::new(&self.kubectl)
            .args(&args)
            .output()
            .await
            .map_err(|e| Error::transport(format!("Failed to run {}: {}", self.kubectl, e)))?;

        if !output.status.success() {
            return Err(Error::transport(format!(
                "Failed to copy file for pod {}: {}",
                unit,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FileCopier for KubectlCopier {
    async fn copy_from_unit(
        &self,
        unit: &str,
        container: &str,
        remote: &str,
        local: &Path,
    ) -> Result<()> {
        let args = self.cp_args(
            &self.pod_path(unit, remote),
            &local.to_string_lossy(),
            container,
        );
        self.run(args, unit).await
    }

    async fn copy_to_unit(
        &self,
        local: &Path,
        unit: &str,
        container: &str,
        remote: &str,
    ) -> Result<()> {
        let args = self.cp_args(
            &local.to_string_lossy(),
            &self.pod_path(unit, remote),
            container,
        );
        self.run(args, unit).await
    }
}
