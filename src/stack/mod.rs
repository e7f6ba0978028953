//! The backup stack: declaration, execution and exports.
//!
//! [`BackupStack::build`] declares every resource of one stack against a
//! fresh graph context: the resource group, the directory identity chain,
//! the storage chain, the namespace and the chart release. The release's
//! values document references outputs across the graph, which is what
//! sequences it after everything it reads from.
//!
//! [`StackExecutor`] is the single execution seam: cloud resources go to
//! the [`CloudProvider`], cluster resources to the [`ChartDeployer`].

pub mod exports;
pub mod identity;
pub mod naming;
pub mod secrets;
pub mod storage;
pub mod values;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tracing::info;

use crate::config::StackConfig;
use crate::deploy::{ChartDeployer, ChartRef};
use crate::error::{ProviderError, Result};
use crate::graph::{
    CreateRequest, NodeExecutor, PlannedNode, ProvisionReport, ResourceGraph, ResourceInputs,
    Scheduler, StackContext,
};
use crate::provider::{AttrMap, CloudProvider, ResourceKind};

pub use exports::{ExportedValue, StackExports};
pub use naming::StackNaming;

/// Routes creation requests to the cloud provider or the chart deployer.
pub struct StackExecutor {
    provider: Arc<dyn CloudProvider>,
    deployer: Arc<dyn ChartDeployer>,
}

impl std::fmt::Debug for StackExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackExecutor").finish_non_exhaustive()
    }
}

impl StackExecutor {
    /// Creates an executor over the given backends.
    #[must_use]
    pub fn new(provider: Arc<dyn CloudProvider>, deployer: Arc<dyn ChartDeployer>) -> Self {
        Self { provider, deployer }
    }

    fn required_str<'a>(request: &'a CreateRequest, property: &str) -> Result<&'a str> {
        request
            .properties
            .get(property)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProviderError::MissingProperty {
                    name: request.physical_name.clone(),
                    property: property.to_string(),
                }
                .into()
            })
    }

    async fn apply_release(&self, request: &CreateRequest) -> Result<AttrMap> {
        let chart = ChartRef {
            name: Self::required_str(request, "chart")?.to_string(),
            repository: Self::required_str(request, "repository")?.to_string(),
            version: Self::required_str(request, "version")?.to_string(),
        };
        let namespace = Self::required_str(request, "namespace")?.to_string();
        let values = request.properties.get("values").cloned().ok_or_else(|| {
            ProviderError::MissingProperty {
                name: request.physical_name.clone(),
                property: String::from("values"),
            }
        })?;

        self.deployer
            .apply(&request.physical_name, &namespace, &chart, &values)
            .await?;

        let mut attrs = AttrMap::new();
        attrs.insert(
            String::from("name"),
            Value::String(request.physical_name.clone()),
        );
        attrs.insert(String::from("namespace"), Value::String(namespace));
        attrs.insert(String::from("status"), Value::String(String::from("deployed")));
        Ok(attrs)
    }
}

#[async_trait]
impl NodeExecutor for StackExecutor {
    async fn create(&self, request: &CreateRequest) -> Result<AttrMap> {
        match request.kind {
            ResourceKind::Namespace => {
                self.deployer.ensure_namespace(&request.physical_name).await?;
                let mut attrs = AttrMap::new();
                attrs.insert(
                    String::from("name"),
                    Value::String(request.physical_name.clone()),
                );
                Ok(attrs)
            }
            ResourceKind::HelmRelease => self.apply_release(request).await,
            _ => {
                self.provider
                    .create_resource(request.kind, &request.physical_name, &request.properties)
                    .await
            }
        }
    }
}

/// Outcome of one provisioning run.
#[derive(Debug)]
pub struct RunOutcome {
    /// Per-node report.
    pub report: ProvisionReport,
    /// Resolved exports, present only when every node was created.
    pub exports: Option<Vec<ExportedValue>>,
}

/// A fully declared backup stack, ready to plan or run.
#[derive(Debug)]
pub struct BackupStack {
    graph: ResourceGraph,
    exports: StackExports,
}

impl BackupStack {
    /// Declares every resource of the stack.
    ///
    /// The provider is only used here to defer the ambient client
    /// configuration lookup into the credentials blob; no external call
    /// happens until the stack runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the declarations produce an invalid graph.
    pub fn build(config: &StackConfig, provider: Arc<dyn CloudProvider>) -> Result<Self> {
        let naming = StackNaming::new(&config.stack);
        let ctx = StackContext::new(&config.stack);
        info!(stack = %ctx.stack(), "declaring backup stack");

        let group = ctx.register(
            ResourceKind::ResourceGroup,
            "velero-resource-group",
            &naming.resource_group(),
            ResourceInputs::new().literal("location", config.location.as_str()),
        )?;

        let identity = identity::declare(&ctx, &naming, &group, config.settling_delay())?;
        let storage = storage::declare(&ctx, &naming, &group, &config.location)?;

        let namespace = ctx.register(
            ResourceKind::Namespace,
            "velero-namespace",
            &config.namespace,
            ResourceInputs::new(),
        )?;

        let credentials_blob = secrets::materialize(
            provider,
            identity.application_id.clone(),
            identity.password_value.clone(),
            group.attr_string("name"),
        );

        let document = values::compose(
            config,
            values::ValueInputs {
                resource_group_name: group.attr_string("name"),
                account_name: storage.account_name.clone(),
                container_name: storage.container_name.clone(),
                credentials_blob,
            },
        );

        ctx.register(
            ResourceKind::HelmRelease,
            "velero-release",
            &config.release_name,
            ResourceInputs::new()
                .literal("chart", config.chart.name.as_str())
                .literal("repository", config.chart.repository.as_str())
                .literal("version", config.chart.version.as_str())
                .dynamic("namespace", namespace.attr("name"))
                .dynamic("values", document.into_output()),
        )?;

        let exports = StackExports {
            resource_group_name: group.attr_string("name"),
            application_id: identity.application_id,
            service_principal_id: identity.principal_id,
            service_principal_password: identity.password_value,
            storage_account_name: storage.account_name,
            storage_container_name: storage.container_name,
        };

        let graph = ctx.into_graph()?;
        Ok(Self { graph, exports })
    }

    /// Number of declared resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    /// True if the stack declares no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Returns the creation plan in dependency order.
    #[must_use]
    pub fn plan(&self) -> Vec<PlannedNode> {
        self.graph.plan()
    }

    /// Runs the stack to completion.
    ///
    /// Exports resolve only when every node was created; a partial run
    /// still returns its full report.
    ///
    /// # Errors
    ///
    /// Returns an error if export resolution fails after a fully
    /// successful run.
    pub async fn run(
        self,
        executor: Arc<StackExecutor>,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunOutcome> {
        let report = Scheduler::new(executor, cancel).run(self.graph).await;

        let exports = if report.success() {
            Some(self.exports.resolve().await?)
        } else {
            None
        };

        Ok(RunOutcome { report, exports })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingDeployer, RecordingProvider};
    use std::time::Duration;

    fn config() -> StackConfig {
        let mut config = StackConfig::for_stack("dev").unwrap();
        config.settling_delay_ms = 1;
        config
    }

    fn stack(provider: Arc<RecordingProvider>) -> BackupStack {
        BackupStack::build(&config(), provider).unwrap()
    }

    #[test]
    fn the_plan_covers_all_nine_resources_in_order() {
        let stack = stack(Arc::new(RecordingProvider::new()));
        let plan = stack.plan();
        assert_eq!(plan.len(), 9);

        let position = |name: &str| plan.iter().position(|n| n.logical_name == name).unwrap();
        assert!(position("velero-resource-group") < position("velero-storage-account"));
        assert!(position("velero-storage-account") < position("velero-blob-container"));
        assert!(position("velero-application") < position("velero-service-principal"));
        assert!(position("velero-service-principal") < position("velero-principal-password"));
        assert!(position("velero-namespace") < position("velero-release"));
        // The release reads the container name and the credentials blob.
        assert!(position("velero-blob-container") < position("velero-release"));
        assert!(position("velero-principal-password") < position("velero-release"));
    }

    #[tokio::test]
    async fn a_full_run_applies_the_release_with_resolved_values() {
        let provider = Arc::new(RecordingProvider::new().with_latency(Duration::from_millis(2)));
        let deployer = Arc::new(RecordingDeployer::new());
        let stack = stack(provider.clone());
        let executor = Arc::new(StackExecutor::new(provider, deployer.clone()));

        let outcome = stack
            .run(executor, watch::channel(false).1)
            .await
            .unwrap();
        assert!(outcome.report.success());
        assert_eq!(outcome.report.created(), 9);

        let namespaces = deployer
            .namespaces
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        assert_eq!(namespaces, vec![String::from("velero-backups")]);

        let applied = deployer.applied();
        assert_eq!(applied.len(), 1);
        let release = &applied[0];
        assert_eq!(release.release, "velero-release");
        assert_eq!(release.namespace, "velero-backups");
        assert_eq!(release.chart.name, "velero");
        assert_eq!(release.chart.version, "4.1.4");
        assert_eq!(
            release.values.pointer("/configuration/backupStorageLocation/0/bucket"),
            Some(&Value::String(String::from("ehzdevvelerobackups")))
        );

        let cloud = release
            .values
            .pointer("/credentials/secretContents/cloud")
            .and_then(Value::as_str)
            .unwrap();
        assert!(cloud.contains("AZURE_SUBSCRIPTION_ID=S"));
        assert!(cloud.contains("AZURE_CLIENT_ID=client-ehz-dev-velero-backups"));
        assert!(cloud.contains("AZURE_RESOURCE_GROUP=ehz-dev-velero-backups"));
        assert!(cloud.ends_with("AZURE_CLOUD_NAME=AzurePublicCloud"));

        let exports = outcome.exports.unwrap();
        let by_name = |name: &str| {
            exports
                .iter()
                .find(|e| e.name == name)
                .unwrap()
                .value
                .clone()
        };
        assert_eq!(by_name("resourceGroupName"), "ehz-dev-velero-backups");
        assert_eq!(by_name("storageAccountName"), "ehzdevvelero");
        assert_eq!(by_name("storageContainerName"), "ehzdevvelerobackups");
        assert!(
            exports
                .iter()
                .find(|e| e.name == "servicePrincipalPassword")
                .unwrap()
                .sensitive
        );
    }

    #[tokio::test]
    async fn a_cloud_failure_skips_the_release_and_withholds_exports() {
        let provider =
            Arc::new(RecordingProvider::new().fail_on(ResourceKind::StorageAccount));
        let deployer = Arc::new(RecordingDeployer::new());
        let stack = stack(provider.clone());
        let executor = Arc::new(StackExecutor::new(provider, deployer.clone()));

        let outcome = stack
            .run(executor, watch::channel(false).1)
            .await
            .unwrap();
        assert!(!outcome.report.success());
        assert!(outcome.exports.is_none());
        assert!(deployer.applied().is_empty());

        // Only the storage chain suffers; the identity chain completes.
        assert_eq!(outcome.report.failed(), 1);
        assert_eq!(outcome.report.skipped(), 2);
        assert_eq!(outcome.report.created(), 6);

        let by_name = |name: &str| {
            outcome
                .report
                .outcomes
                .iter()
                .find(|o| o.logical_name == name)
                .unwrap()
        };
        assert_eq!(
            by_name("velero-blob-container").upstream.as_deref(),
            Some("velero-storage-account")
        );
        assert_eq!(
            by_name("velero-release").status,
            crate::graph::NodeStatus::Skipped
        );
        assert_eq!(
            by_name("velero-principal-password").status,
            crate::graph::NodeStatus::Created
        );
    }
}
