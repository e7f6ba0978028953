//! Credentials blob handed to the backup tool.
//!
//! The blob is the classic `KEY=VALUE` credentials file format, one entry
//! per line, in a fixed key order. It folds together the identity chain's
//! client credentials, the resource group and the ambient subscription and
//! tenant, and is always marked sensitive.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::error::OutputError;
use crate::output::{Output, zip3};
use crate::provider::CloudProvider;

/// Cloud environment name recorded in the blob.
pub const CLOUD_NAME: &str = "AzurePublicCloud";

/// An ordered `KEY=VALUE` credentials document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretBlob {
    entries: Vec<(String, String)>,
}

impl SecretBlob {
    /// Builds the blob in its fixed key order.
    #[must_use]
    pub fn new(
        subscription_id: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        resource_group: &str,
    ) -> Self {
        let entries = vec![
            (String::from("AZURE_SUBSCRIPTION_ID"), subscription_id.to_string()),
            (String::from("AZURE_TENANT_ID"), tenant_id.to_string()),
            (String::from("AZURE_CLIENT_ID"), client_id.to_string()),
            (String::from("AZURE_CLIENT_SECRET"), client_secret.to_string()),
            (String::from("AZURE_RESOURCE_GROUP"), resource_group.to_string()),
            (String::from("AZURE_CLOUD_NAME"), CLOUD_NAME.to_string()),
        ];
        Self { entries }
    }

    /// Renders the blob, one `KEY=VALUE` entry per line.
    #[must_use]
    pub fn render(&self) -> String {
        let mut rendered = String::new();
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                rendered.push('\n');
            }
            let _ = write!(rendered, "{key}={value}");
        }
        rendered
    }
}

/// Builds the deferred, rendered credentials blob.
///
/// The result resolves once the client credentials and the resource group
/// have resolved, then folds in the ambient subscription and tenant. It is
/// sensitive regardless of its inputs.
#[must_use]
pub fn materialize(
    provider: Arc<dyn CloudProvider>,
    client_id: Output<String>,
    client_secret: Output<String>,
    resource_group: Output<String>,
) -> Output<String> {
    zip3(client_id, client_secret, resource_group)
        .then(move |(client_id, client_secret, resource_group)| async move {
            let config = provider
                .client_config()
                .await
                .map_err(|e| OutputError::apply(e.to_string()))?;
            Ok(SecretBlob::new(
                &config.subscription_id,
                &config.tenant_id,
                &client_id,
                &client_secret,
                &resource_group,
            )
            .render())
        })
        .sensitive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingProvider;

    #[test]
    fn blob_renders_in_fixed_key_order() {
        let blob = SecretBlob::new("S", "T", "C", "X", "RG");
        assert_eq!(
            blob.render(),
            "AZURE_SUBSCRIPTION_ID=S\n\
             AZURE_TENANT_ID=T\n\
             AZURE_CLIENT_ID=C\n\
             AZURE_CLIENT_SECRET=X\n\
             AZURE_RESOURCE_GROUP=RG\n\
             AZURE_CLOUD_NAME=AzurePublicCloud"
        );
    }

    #[tokio::test]
    async fn materialized_blob_is_sensitive_and_complete() {
        let provider = Arc::new(RecordingProvider::new());
        let blob = materialize(
            provider,
            Output::literal(String::from("C")),
            Output::secret(String::from("X")),
            Output::literal(String::from("RG")),
        );

        assert!(blob.is_sensitive());
        let rendered = blob.get().await.unwrap();
        assert!(rendered.starts_with("AZURE_SUBSCRIPTION_ID=S\nAZURE_TENANT_ID=T\n"));
        assert!(rendered.contains("AZURE_CLIENT_SECRET=X"));
        assert!(rendered.ends_with("AZURE_CLOUD_NAME=AzurePublicCloud"));
    }
}
