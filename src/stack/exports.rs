//! Stack exports.
//!
//! After a successful run the stack publishes a small set of named values
//! for operators and downstream tooling. Sensitive exports stay marked all
//! the way to the rendered record, where they are masked unless plaintext
//! is explicitly requested.

use serde::Serialize;

use crate::error::Result;
use crate::output::Output;

/// Mask shown in place of sensitive export values.
pub const SENSITIVE_MASK: &str = "[secret]";

/// Deferred export values of one run.
#[derive(Debug)]
pub struct StackExports {
    /// Resource group name.
    pub resource_group_name: Output<String>,
    /// Client identifier of the directory application.
    pub application_id: Output<String>,
    /// Object identifier of the service principal.
    pub service_principal_id: Output<String>,
    /// Service principal password, sensitive.
    pub service_principal_password: Output<String>,
    /// Storage account name.
    pub storage_account_name: Output<String>,
    /// Blob container name.
    pub storage_container_name: Output<String>,
}

/// One resolved export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportedValue {
    /// Export name.
    pub name: String,
    /// Resolved value.
    pub value: String,
    /// Whether the value must be masked by default.
    pub sensitive: bool,
}

impl ExportedValue {
    /// Value as shown to operators: masked when sensitive.
    #[must_use]
    pub fn display_value(&self) -> &str {
        if self.sensitive {
            SENSITIVE_MASK
        } else {
            &self.value
        }
    }
}

impl StackExports {
    /// Resolves every export into a named record, in a fixed order.
    ///
    /// # Errors
    ///
    /// Returns an error if any export's producing resource failed.
    pub async fn resolve(self) -> Result<Vec<ExportedValue>> {
        let entries: Vec<(&str, Output<String>)> = vec![
            ("resourceGroupName", self.resource_group_name),
            ("applicationId", self.application_id),
            ("servicePrincipalId", self.service_principal_id),
            ("servicePrincipalPassword", self.service_principal_password),
            ("storageAccountName", self.storage_account_name),
            ("storageContainerName", self.storage_container_name),
        ];

        let mut exports = Vec::with_capacity(entries.len());
        for (name, output) in entries {
            let sensitive = output.is_sensitive();
            let value = output.get().await?;
            exports.push(ExportedValue {
                name: name.to_string(),
                value,
                sensitive,
            });
        }
        Ok(exports)
    }
}
