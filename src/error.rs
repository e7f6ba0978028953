//! Error types for the Velero backup stack provisioner.
//!
//! This module provides a comprehensive error hierarchy for all operations
//! in the provisioning lifecycle: configuration, deferred-value resolution,
//! graph construction, cloud provider calls, and chart deployment.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the provisioner.
#[derive(Debug, Error)]
pub enum StackError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Deferred-value resolution errors.
    #[error("Output resolution error: {0}")]
    Output(#[from] OutputError),

    /// Graph construction errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Cloud provider errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Chart deployment errors.
    #[error("Deploy error: {0}")]
    Deploy(#[from] DeployError),

    /// The run finished with failed or skipped resources.
    #[error("Provisioning incomplete: {failed} failed, {skipped} skipped")]
    ProvisionIncomplete {
        /// Number of resources whose creation call failed.
        failed: usize,
        /// Number of resources never attempted due to upstream failures.
        skipped: usize,
    },

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// No stack identifier was provided by file or flag.
    #[error("No stack identifier provided (use --stack or the configuration file)")]
    MissingStack,
}

/// Deferred-value resolution errors.
///
/// These are `Clone` because a resolved [`crate::output::Output`] hands the
/// same result to every holder of the value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OutputError {
    /// The resource that produces this value failed to create.
    #[error("Resource '{node}' failed: {message}")]
    ResourceFailed {
        /// Logical name of the failed resource.
        node: String,
        /// Description of the failure.
        message: String,
    },

    /// The resource that produces this value was never attempted.
    #[error("Resource '{node}' skipped due to upstream failure of '{upstream}'")]
    UpstreamSkipped {
        /// Logical name of the skipped resource.
        node: String,
        /// Logical name of the upstream resource that failed.
        upstream: String,
    },

    /// The run was cancelled before the resource was attempted.
    #[error("Resource '{node}' cancelled before creation")]
    Cancelled {
        /// Logical name of the cancelled resource.
        node: String,
    },

    /// The created resource did not report the requested attribute.
    #[error("Resource '{node}' has no attribute '{attribute}'")]
    MissingAttribute {
        /// Logical name of the resource.
        node: String,
        /// Name of the missing attribute.
        attribute: String,
    },

    /// The attribute resolved to an unexpected JSON type.
    #[error("Attribute '{attribute}' of '{node}' is not a {expected}")]
    AttributeType {
        /// Logical name of the resource.
        node: String,
        /// Name of the attribute.
        attribute: String,
        /// Expected JSON type.
        expected: &'static str,
    },

    /// An asynchronous transformation applied to the value failed.
    #[error("Apply failed: {message}")]
    Apply {
        /// Description of the failure.
        message: String,
    },
}

/// Graph construction errors.
///
/// All of these are wiring mistakes caught before any external call is
/// issued.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Two resources were registered under the same logical name.
    #[error("Duplicate resource name: {name}")]
    DuplicateNode {
        /// The duplicated logical name.
        name: String,
    },

    /// The dependency edges contain a cycle.
    #[error("Dependency cycle detected involving: {nodes}")]
    DependencyCycle {
        /// Names of the nodes still waiting on each other.
        nodes: String,
    },

    /// An input references an output from an unregistered node.
    #[error("Input '{input}' of '{node}' references an unknown resource")]
    UnknownDependency {
        /// Logical name of the referencing node.
        node: String,
        /// Name of the offending input.
        input: String,
    },
}

/// Cloud provider errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Authentication failed.
    #[error("Provider authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed.
    #[error("Provider API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Network error.
    #[error("Network error communicating with provider: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the API.
    #[error("Invalid response from provider: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// A resource request was missing a required property.
    #[error("Resource '{name}' is missing required property '{property}'")]
    MissingProperty {
        /// Physical name of the resource.
        name: String,
        /// Name of the missing property.
        property: String,
    },

    /// A required environment variable is not set.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// Chart deployment errors.
#[derive(Debug, Error)]
pub enum DeployError {
    /// An external tool exited with a non-zero status.
    #[error("{tool} failed with status {status}: {stderr}")]
    CommandFailed {
        /// Name of the tool (helm, kubectl).
        tool: &'static str,
        /// Exit status code, if any.
        status: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// An external tool could not be found on PATH.
    #[error("Required tool not found: {tool}")]
    ToolNotFound {
        /// Name of the missing tool.
        tool: &'static str,
    },

    /// The composed values could not be serialized.
    #[error("Failed to serialize chart values: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
    },
}

/// Result type alias for provisioner operations.
pub type Result<T> = std::result::Result<T, StackError>;

impl StackError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl OutputError {
    /// Creates an apply error with the given message.
    #[must_use]
    pub fn apply(message: impl Into<String>) -> Self {
        Self::Apply {
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }
}
