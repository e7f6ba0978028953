// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Velero Backup Stack
//!
//! A declarative, dependency-ordered provisioner for Velero cluster backups
//! on Azure.
//!
//! ## Overview
//!
//! One run provisions everything a cluster needs to ship scheduled backups
//! to geo-redundant blob storage:
//!
//! - An Azure resource group, storage account and backup container
//! - A directory application, service principal, password credential and
//!   Contributor role assignment
//! - The Velero Helm release (plus its namespace), configured with the
//!   resolved storage location and a generated credentials blob
//!
//! ## Architecture
//!
//! Resources are declared against a [`graph::StackContext`] as nodes whose
//! inputs may be deferred [`output::Output`] values produced by other
//! nodes. Dependency edges are never written down: they are discovered
//! from which outputs feed which inputs. The scheduler then walks the
//! graph by readiness, creating independent resources concurrently while
//! dependent ones wait for the exact values they consume.
//!
//! ## Modules
//!
//! - [`config`]: Stack configuration loading and validation
//! - [`output`]: Deferred, single-assignment values
//! - [`graph`]: Resource registration and dependency-ordered scheduling
//! - [`provider`]: Cloud provider boundary and its Azure implementation
//! - [`deploy`]: Chart deployment boundary (kubectl/helm)
//! - [`stack`]: The backup stack itself: naming, identity, storage,
//!   secrets, chart values and exports
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! stack: prod
//! location: westeurope
//! schedule:
//!   cron: "0 */6 * * *"
//!   ttl: 168h0m0s
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod deploy;
pub mod error;
pub mod graph;
pub mod output;
pub mod provider;
pub mod stack;

#[cfg(test)]
pub(crate) mod test_support;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::StackConfig;
pub use deploy::{ChartDeployer, ChartRef, HelmCli};
pub use error::{Result, StackError};
pub use graph::{ProvisionReport, ResourceGraph, Scheduler, StackContext};
pub use output::Output;
pub use provider::{AzureProvider, CloudProvider, ResourceKind};
pub use stack::{BackupStack, StackExecutor, StackNaming};
