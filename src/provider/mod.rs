//! Cloud provider boundary.
//!
//! The provisioner treats the cloud as an opaque asynchronous
//! "create resource, get attributes" capability behind the
//! [`CloudProvider`] trait. The production implementation lives in
//! [`azure`]; tests substitute recording fakes.

pub mod azure;

pub use azure::AzureProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Attribute record produced by a created resource.
pub type AttrMap = serde_json::Map<String, serde_json::Value>;

/// The kinds of resources this stack provisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Azure resource group.
    ResourceGroup,
    /// Azure AD application registration.
    Application,
    /// Azure AD service principal.
    ServicePrincipal,
    /// Service principal password credential.
    ServicePrincipalPassword,
    /// Azure role assignment.
    RoleAssignment,
    /// Azure storage account.
    StorageAccount,
    /// Azure blob container.
    BlobContainer,
    /// Kubernetes namespace.
    Namespace,
    /// Helm chart release.
    HelmRelease,
}

impl ResourceKind {
    /// Returns true for resources created in the Kubernetes cluster rather
    /// than at the cloud provider.
    #[must_use]
    pub const fn is_cluster(self) -> bool {
        matches!(self, Self::Namespace | Self::HelmRelease)
    }

    /// Short human-readable label used in logs and reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ResourceGroup => "resource-group",
            Self::Application => "application",
            Self::ServicePrincipal => "service-principal",
            Self::ServicePrincipalPassword => "service-principal-password",
            Self::RoleAssignment => "role-assignment",
            Self::StorageAccount => "storage-account",
            Self::BlobContainer => "blob-container",
            Self::Namespace => "namespace",
            Self::HelmRelease => "helm-release",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Ambient provider client configuration.
///
/// Resolved once per run through [`CloudProvider::client_config`] and folded
/// into the generated credentials blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Subscription identifier.
    pub subscription_id: String,
    /// Tenant identifier.
    pub tenant_id: String,
}

/// Asynchronous resource-creation capability.
///
/// Calls are idempotent by physical name from the provisioner's
/// perspective: re-running with the same name addresses the same underlying
/// resource.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Creates (or re-addresses) a resource and returns its attributes.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the request; the error is
    /// surfaced verbatim to the operator and never retried here.
    async fn create_resource(
        &self,
        kind: ResourceKind,
        name: &str,
        properties: &AttrMap,
    ) -> Result<AttrMap>;

    /// Looks up the ambient client configuration (subscription, tenant).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be determined.
    async fn client_config(&self) -> Result<ClientConfig>;
}
