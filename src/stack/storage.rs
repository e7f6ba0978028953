//! Backup storage chain: storage account and blob container.
//!
//! The account is created inside the resource group as geo-redundant blob
//! storage with HTTPS-only access and blob encryption; the container that
//! receives the backups denies all public access.

use crate::error::Result;
use crate::graph::{ResourceHandle, ResourceInputs, StackContext};
use crate::output::Output;
use crate::provider::ResourceKind;

use super::naming::StackNaming;

/// Storage account kind for backup data.
pub const ACCOUNT_KIND: &str = "BlobStorage";

/// Access tier of the account.
pub const ACCOUNT_ACCESS_TIER: &str = "Hot";

/// Geo-redundant SKU of the account.
pub const ACCOUNT_SKU: &str = "Standard_GRS";

/// Public access level of the backup container.
pub const CONTAINER_PUBLIC_ACCESS: &str = "None";

/// Handles and derived values of the storage chain.
#[derive(Debug)]
pub struct StorageOutputs {
    /// The storage account.
    pub account: ResourceHandle,
    /// The backup container.
    pub container: ResourceHandle,
    /// Resolved account name.
    pub account_name: Output<String>,
    /// Resolved container name.
    pub container_name: Output<String>,
}

/// Declares the storage chain against the given context.
///
/// # Errors
///
/// Returns an error if any node registration fails.
pub fn declare(
    ctx: &StackContext,
    naming: &StackNaming,
    group: &ResourceHandle,
    location: &str,
) -> Result<StorageOutputs> {
    let account = ctx.register(
        ResourceKind::StorageAccount,
        "velero-storage-account",
        &naming.storage_account(),
        ResourceInputs::new()
            .dynamic("resourceGroupName", group.attr("name"))
            .literal("location", location)
            .literal("kind", ACCOUNT_KIND)
            .literal("accessTier", ACCOUNT_ACCESS_TIER)
            .literal("sku", ACCOUNT_SKU)
            .literal("httpsOnly", true)
            .literal("blobEncryption", true),
    )?;

    let container = ctx.register(
        ResourceKind::BlobContainer,
        "velero-blob-container",
        &naming.blob_container(),
        ResourceInputs::new()
            .dynamic("resourceGroupName", group.attr("name"))
            .dynamic("accountName", account.attr("name"))
            .literal("publicAccess", CONTAINER_PUBLIC_ACCESS),
    )?;

    let account_name = account.attr_string("name");
    let container_name = container.attr_string("name");

    Ok(StorageOutputs {
        account,
        container,
        account_name,
        container_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Scheduler;
    use crate::stack::StackExecutor;
    use crate::test_support::{RecordingDeployer, RecordingProvider};
    use std::sync::Arc;
    use tokio::sync::watch;

    fn declare_group(ctx: &StackContext, naming: &StackNaming) -> ResourceHandle {
        ctx.register(
            ResourceKind::ResourceGroup,
            "velero-resource-group",
            &naming.resource_group(),
            ResourceInputs::new().literal("location", "westeurope"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn container_is_created_after_its_account() {
        let ctx = StackContext::new("dev");
        let naming = StackNaming::new("dev");
        let group = declare_group(&ctx, &naming);
        let storage = declare(&ctx, &naming, &group, "westeurope").unwrap();

        let provider = Arc::new(RecordingProvider::new());
        let executor = Arc::new(StackExecutor::new(
            provider.clone(),
            Arc::new(RecordingDeployer::new()),
        ));
        let report = Scheduler::new(executor, watch::channel(false).1)
            .run(ctx.into_graph().unwrap())
            .await;
        assert!(report.success());

        let calls = provider.calls();
        let account = calls
            .iter()
            .find(|c| c.kind == ResourceKind::StorageAccount)
            .unwrap();
        let container = calls
            .iter()
            .find(|c| c.kind == ResourceKind::BlobContainer)
            .unwrap();
        assert!(container.started >= account.finished);
        assert_eq!(account.physical_name, "ehzdevvelero");
        assert_eq!(container.physical_name, "ehzdevvelerobackups");

        assert_eq!(storage.account_name.get().await.unwrap(), "ehzdevvelero");
        assert_eq!(
            storage.container_name.get().await.unwrap(),
            "ehzdevvelerobackups"
        );
    }

    #[test]
    fn account_and_container_depend_on_the_group() {
        let ctx = StackContext::new("dev");
        let naming = StackNaming::new("dev");
        let group = declare_group(&ctx, &naming);
        declare(&ctx, &naming, &group, "westeurope").unwrap();

        let graph = ctx.into_graph().unwrap();
        let plan = graph.plan();
        let account = plan
            .iter()
            .find(|n| n.logical_name == "velero-storage-account")
            .unwrap();
        assert!(account
            .depends_on
            .contains(&String::from("velero-resource-group")));
        let container = plan
            .iter()
            .find(|n| n.logical_name == "velero-blob-container")
            .unwrap();
        assert!(container
            .depends_on
            .contains(&String::from("velero-storage-account")));
    }
}
