//! Resource dependency graph.
//!
//! [`registry`] collects resource declarations and derives the dependency
//! edges implicitly from which [`crate::output::Output`]s feed which inputs;
//! [`scheduler`] executes the resulting graph in dependency order with
//! concurrent fan-out.

pub mod registry;
pub mod scheduler;

pub use registry::{InputValue, PlannedNode, ResourceGraph, ResourceHandle, ResourceInputs, StackContext};
pub use scheduler::{CreateRequest, NodeExecutor, NodeOutcome, NodeStatus, ProvisionReport, Scheduler};
