//! Chart deployment boundary.
//!
//! Cluster-side resources (the namespace and the Helm release) go through
//! the [`ChartDeployer`] trait. The production implementation shells out to
//! `kubectl` and `helm`; tests swap in a recording fake.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{DeployError, Result};

/// A chart reference: name, repository URL and pinned version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRef {
    /// Chart name within the repository.
    pub name: String,
    /// Chart repository URL.
    pub repository: String,
    /// Pinned chart version.
    pub version: String,
}

/// Applies cluster-side resources.
#[async_trait]
pub trait ChartDeployer: Send + Sync {
    /// Ensures the named namespace exists.
    async fn ensure_namespace(&self, name: &str) -> Result<()>;

    /// Installs or upgrades a release with fully resolved values.
    async fn apply(
        &self,
        release: &str,
        namespace: &str,
        chart: &ChartRef,
        values: &Value,
    ) -> Result<()>;
}

/// Deployer backed by the `kubectl` and `helm` command line tools.
#[derive(Debug, Default)]
pub struct HelmCli;

impl HelmCli {
    /// Creates a CLI-backed deployer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Runs a tool to completion, feeding it optional stdin.
    async fn run_tool(
        tool: &'static str,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> Result<std::process::Output> {
        debug!(tool, ?args, "running deployment tool");

        let mut command = Command::new(tool);
        command
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DeployError::ToolNotFound { tool }.into()
            } else {
                crate::error::StackError::Io(e)
            }
        })?;

        if let Some(bytes) = stdin {
            if let Some(mut handle) = child.stdin.take() {
                handle.write_all(bytes).await?;
                handle.shutdown().await?;
            }
        }

        let output = child.wait_with_output().await?;
        Ok(output)
    }

    /// Runs a tool and fails on a non-zero exit status.
    async fn run_checked(
        tool: &'static str,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> Result<std::process::Output> {
        let output = Self::run_tool(tool, args, stdin).await?;
        if !output.status.success() {
            return Err(DeployError::CommandFailed {
                tool,
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(output)
    }
}

#[async_trait]
impl ChartDeployer for HelmCli {
    async fn ensure_namespace(&self, name: &str) -> Result<()> {
        let result = Self::run_checked("kubectl", &["create", "namespace", name], None).await;

        // Re-runs against an existing namespace are not an error.
        match result {
            Ok(_) => {
                info!(namespace = name, "namespace created");
                Ok(())
            }
            Err(crate::error::StackError::Deploy(DeployError::CommandFailed {
                stderr, ..
            })) if stderr.contains("AlreadyExists") || stderr.contains("already exists") => {
                debug!(namespace = name, "namespace already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn apply(
        &self,
        release: &str,
        namespace: &str,
        chart: &ChartRef,
        values: &Value,
    ) -> Result<()> {
        let rendered = serde_yaml::to_string(values).map_err(|e| DeployError::Serialization {
            message: e.to_string(),
        })?;

        Self::run_checked(
            "helm",
            &[
                "upgrade",
                "--install",
                release,
                chart.name.as_str(),
                "--repo",
                chart.repository.as_str(),
                "--version",
                chart.version.as_str(),
                "--namespace",
                namespace,
                "--values",
                "-",
            ],
            Some(rendered.as_bytes()),
        )
        .await?;

        info!(release, namespace, chart = %chart.name, version = %chart.version, "release applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_refs_compare_by_value() {
        let a = ChartRef {
            name: String::from("velero"),
            repository: String::from("https://vmware-tanzu.github.io/helm-charts"),
            version: String::from("4.1.4"),
        };
        assert_eq!(a, a.clone());
    }

    #[tokio::test]
    async fn missing_tools_surface_as_tool_not_found() {
        let err = HelmCli::run_checked("definitely-not-a-real-tool-ehz", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::StackError::Deploy(DeployError::ToolNotFound { .. })
        ));
    }
}
