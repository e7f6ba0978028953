//! Directory identity chain: application, service principal, password and
//! role assignment.
//!
//! The password node waits a settling delay after the service principal
//! resolves, covering directory propagation before credential issuance.
//! The role assignment grants the principal the Contributor role over the
//! resource group, under a fixed assignment name so repeated runs target
//! the same assignment.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::graph::{ResourceHandle, ResourceInputs, StackContext};
use crate::output::Output;
use crate::provider::ResourceKind;

use super::naming::StackNaming;

/// Expiry for issued service principal passwords.
pub const PASSWORD_END_DATE: &str = "2099-01-01T00:00:00Z";

/// Role definition identifier of the built-in Contributor role.
pub const CONTRIBUTOR_ROLE_DEFINITION_ID: &str =
    "/providers/Microsoft.Authorization/roleDefinitions/b24988ac-6180-42a0-ab88-20f7382dd24c";

/// Fixed role assignment name, stable across runs.
pub const ROLE_ASSIGNMENT_NAME: &str = "77e34fd9-ef53-421a-9a9d-4f2eba863269";

/// Handles and derived values of the identity chain.
#[derive(Debug)]
pub struct IdentityOutputs {
    /// The directory application.
    pub application: ResourceHandle,
    /// The service principal backing the application.
    pub principal: ResourceHandle,
    /// The issued password credential.
    pub password: ResourceHandle,
    /// The Contributor role assignment over the resource group.
    pub role_assignment: ResourceHandle,
    /// Client identifier of the application.
    pub application_id: Output<String>,
    /// Object identifier of the service principal.
    pub principal_id: Output<String>,
    /// The password value, marked sensitive.
    pub password_value: Output<String>,
}

/// Declares the identity chain against the given context.
///
/// # Errors
///
/// Returns an error if any node registration fails.
pub fn declare(
    ctx: &StackContext,
    naming: &StackNaming,
    group: &ResourceHandle,
    settling_delay: Duration,
) -> Result<IdentityOutputs> {
    let display_name = naming.application_display_name();
    debug!(application = %display_name, "declaring identity chain");

    let application = ctx.register(
        ResourceKind::Application,
        "velero-application",
        &display_name,
        ResourceInputs::new().literal("displayName", display_name.as_str()),
    )?;

    let principal = ctx.register(
        ResourceKind::ServicePrincipal,
        "velero-service-principal",
        &display_name,
        ResourceInputs::new().dynamic("applicationId", application.attr("applicationId")),
    )?;

    // Let the directory settle before asking it to mint a credential for
    // the freshly created principal.
    let settled_principal_id = principal.attr_string("id").then(move |id| async move {
        tokio::time::sleep(settling_delay).await;
        Ok(id)
    });

    let password = ctx.register(
        ResourceKind::ServicePrincipalPassword,
        "velero-principal-password",
        &display_name,
        ResourceInputs::new()
            .dynamic(
                "servicePrincipalId",
                settled_principal_id.map(Value::String),
            )
            .literal("endDate", PASSWORD_END_DATE),
    )?;

    let role_assignment = ctx.register(
        ResourceKind::RoleAssignment,
        "velero-role-assignment",
        ROLE_ASSIGNMENT_NAME,
        ResourceInputs::new()
            .dynamic("scope", group.attr("id"))
            .literal("roleDefinitionId", CONTRIBUTOR_ROLE_DEFINITION_ID)
            .dynamic("principalId", principal.attr("id"))
            .literal("principalType", "ServicePrincipal"),
    )?;

    let application_id = application.attr_string("applicationId");
    let principal_id = principal.attr_string("id");
    let password_value = password.attr_string("value").sensitive();

    Ok(IdentityOutputs {
        application,
        principal,
        password,
        role_assignment,
        application_id,
        principal_id,
        password_value,
    })
}
