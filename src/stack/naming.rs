//! Physical naming scheme.
//!
//! All physical names derive deterministically from the lowercased stack
//! name, so repeated runs against the same stack target the same resources.

/// Deterministic physical names for one stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackNaming {
    stack: String,
}

impl StackNaming {
    /// Creates the naming scheme for the given stack name.
    #[must_use]
    pub fn new(stack: &str) -> Self {
        Self {
            stack: stack.to_lowercase(),
        }
    }

    /// Lowercased stack name.
    #[must_use]
    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Resource group name: `ehz-{stack}-velero-backups`.
    #[must_use]
    pub fn resource_group(&self) -> String {
        format!("ehz-{}-velero-backups", self.stack)
    }

    /// Directory application display name, shared with the resource group.
    #[must_use]
    pub fn application_display_name(&self) -> String {
        self.resource_group()
    }

    /// Storage account name: `ehz{stack}velero`.
    ///
    /// Storage account names allow only lowercase letters and digits, which
    /// the lowercased stack name already satisfies for valid stacks.
    #[must_use]
    pub fn storage_account(&self) -> String {
        format!("ehz{}velero", self.stack)
    }

    /// Blob container name: `ehz{stack}velerobackups`.
    #[must_use]
    pub fn blob_container(&self) -> String {
        format!("ehz{}velerobackups", self.stack)
    }
}
