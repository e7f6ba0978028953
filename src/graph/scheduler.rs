//! Dependency-ordered concurrent execution.
//!
//! The scheduler walks a validated [`ResourceGraph`] by readiness: every
//! node whose predecessors are all `created` is spawned immediately, so
//! independent subtrees proceed concurrently while dependent nodes never
//! start early. A failure marks all transitive dependents skipped (they
//! are reported, never silently dropped) while unrelated subtrees
//! continue unaffected.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::{OutputError, Result};
use crate::provider::{AttrMap, ResourceKind};

use super::registry::{AttrResolver, InputValue, ResourceGraph};

/// A fully resolved creation request handed to the executor.
#[derive(Debug)]
pub struct CreateRequest {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Logical name within the graph.
    pub logical_name: String,
    /// Deterministic physical name.
    pub physical_name: String,
    /// Resolved input properties.
    pub properties: AttrMap,
}

/// Executes creation requests against the external backends.
#[async_trait]
pub trait NodeExecutor: Send + Sync + 'static {
    /// Creates the resource and returns its attribute record.
    ///
    /// # Errors
    ///
    /// Returns an error if the external backend rejects the request.
    async fn create(&self, request: &CreateRequest) -> Result<AttrMap>;
}

/// Final status of a node after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// The resource was created and its outputs resolved.
    Created,
    /// The creation call failed.
    Failed,
    /// The resource was never attempted (upstream failure or cancellation).
    Skipped,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Failed => f.write_str("failed"),
            Self::Skipped => f.write_str("skipped"),
        }
    }
}

/// Outcome of a single node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeOutcome {
    /// Logical name.
    pub logical_name: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Physical name.
    pub physical_name: String,
    /// Final status.
    pub status: NodeStatus,
    /// Error message, for failed nodes.
    pub error: Option<String>,
    /// Logical name of the upstream failure, for skipped nodes.
    pub upstream: Option<String>,
}

/// Report over an entire provisioning run.
#[derive(Debug, Serialize)]
pub struct ProvisionReport {
    /// Per-node outcomes in registration order.
    pub outcomes: Vec<NodeOutcome>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl ProvisionReport {
    /// Number of created resources.
    #[must_use]
    pub fn created(&self) -> usize {
        self.count(NodeStatus::Created)
    }

    /// Number of failed resources.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(NodeStatus::Failed)
    }

    /// Number of skipped resources.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(NodeStatus::Skipped)
    }

    /// True if every node was created.
    #[must_use]
    pub fn success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.status == NodeStatus::Created)
    }

    fn count(&self, status: NodeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

impl std::fmt::Display for ProvisionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} resources: {} created, {} failed, {} skipped",
            self.outcomes.len(),
            self.created(),
            self.failed(),
            self.skipped()
        )
    }
}

/// Material needed to spawn one node's creation task.
struct PendingNode {
    kind: ResourceKind,
    logical_name: String,
    physical_name: String,
    inputs: Vec<(String, InputValue)>,
}

/// Readiness-driven scheduler over a resource graph.
pub struct Scheduler<E: NodeExecutor> {
    executor: Arc<E>,
    cancel: watch::Receiver<bool>,
}

impl<E: NodeExecutor> std::fmt::Debug for Scheduler<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

impl<E: NodeExecutor> Scheduler<E> {
    /// Creates a scheduler over the given executor.
    ///
    /// The watch channel carries the cancellation flag: once it turns true
    /// no new creation requests are issued, while in-flight requests are
    /// allowed to complete.
    #[must_use]
    pub fn new(executor: Arc<E>, cancel: watch::Receiver<bool>) -> Self {
        Self { executor, cancel }
    }

    /// Runs the graph to completion and reports every node's outcome.
    pub async fn run(self, graph: ResourceGraph) -> ProvisionReport {
        let started_at = Utc::now();
        let count = graph.len();
        info!("Provisioning {count} resources");

        let mut indegree = vec![0usize; count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        for node in &graph.nodes {
            for dep in &node.depends_on {
                indegree[node.id.index()] += 1;
                dependents[dep.index()].push(node.id.index());
            }
        }

        let mut pending: Vec<Option<PendingNode>> = Vec::with_capacity(count);
        let mut resolvers: Vec<Option<AttrResolver>> = Vec::with_capacity(count);
        let mut labels: Vec<(String, ResourceKind, String)> = Vec::with_capacity(count);
        for node in graph.nodes {
            labels.push((
                node.logical_name.clone(),
                node.kind,
                node.physical_name.clone(),
            ));
            pending.push(Some(PendingNode {
                kind: node.kind,
                logical_name: node.logical_name,
                physical_name: node.physical_name,
                inputs: node.inputs,
            }));
            resolvers.push(Some(node.resolver));
        }

        let mut outcomes: Vec<Option<NodeOutcome>> = (0..count).map(|_| None).collect();
        let mut tasks: JoinSet<(usize, std::result::Result<AttrMap, String>)> = JoinSet::new();

        for idx in 0..count {
            if indegree[idx] == 0 {
                self.launch(idx, &mut pending, &mut resolvers, &mut outcomes, &labels, &mut tasks);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let Ok((idx, result)) = joined else {
                error!("A provisioning task was aborted unexpectedly");
                continue;
            };

            match result {
                Ok(attrs) => {
                    info!(resource = %labels[idx].0, "created");
                    if let Some(resolver) = resolvers[idx].take() {
                        let _ = resolver.send(Ok(Arc::new(attrs)));
                    }
                    outcomes[idx] = Some(NodeOutcome {
                        logical_name: labels[idx].0.clone(),
                        kind: labels[idx].1,
                        physical_name: labels[idx].2.clone(),
                        status: NodeStatus::Created,
                        error: None,
                        upstream: None,
                    });

                    for dep_idx in dependents[idx].clone() {
                        indegree[dep_idx] -= 1;
                        if indegree[dep_idx] == 0 && outcomes[dep_idx].is_none() {
                            self.launch(
                                dep_idx,
                                &mut pending,
                                &mut resolvers,
                                &mut outcomes,
                                &labels,
                                &mut tasks,
                            );
                        }
                    }
                }
                Err(message) => {
                    error!(resource = %labels[idx].0, "failed: {message}");
                    if let Some(resolver) = resolvers[idx].take() {
                        let _ = resolver.send(Err(OutputError::ResourceFailed {
                            node: labels[idx].0.clone(),
                            message: message.clone(),
                        }));
                    }
                    outcomes[idx] = Some(NodeOutcome {
                        logical_name: labels[idx].0.clone(),
                        kind: labels[idx].1,
                        physical_name: labels[idx].2.clone(),
                        status: NodeStatus::Failed,
                        error: Some(message),
                        upstream: None,
                    });

                    // Every transitive dependent is reported as skipped.
                    let upstream = labels[idx].0.clone();
                    let mut frontier = dependents[idx].clone();
                    while let Some(dep_idx) = frontier.pop() {
                        if outcomes[dep_idx].is_some() {
                            continue;
                        }
                        warn!(
                            resource = %labels[dep_idx].0,
                            upstream = %upstream,
                            "skipped due to upstream failure"
                        );
                        if let Some(resolver) = resolvers[dep_idx].take() {
                            let _ = resolver.send(Err(OutputError::UpstreamSkipped {
                                node: labels[dep_idx].0.clone(),
                                upstream: upstream.clone(),
                            }));
                        }
                        outcomes[dep_idx] = Some(NodeOutcome {
                            logical_name: labels[dep_idx].0.clone(),
                            kind: labels[dep_idx].1,
                            physical_name: labels[dep_idx].2.clone(),
                            status: NodeStatus::Skipped,
                            error: None,
                            upstream: Some(upstream.clone()),
                        });
                        frontier.extend(dependents[dep_idx].iter().copied());
                    }
                }
            }
        }

        // Nodes never spawned (cancellation) still surface in the report.
        for idx in 0..count {
            if outcomes[idx].is_none() {
                self.mark_cancelled(idx, &mut resolvers, &mut outcomes, &labels);
            }
        }

        let report = ProvisionReport {
            outcomes: outcomes.into_iter().flatten().collect(),
            started_at,
            finished_at: Utc::now(),
        };
        info!("{report}");
        report
    }

    /// Spawns a node's creation task, or marks it skipped when cancelled.
    fn launch(
        &self,
        idx: usize,
        pending: &mut [Option<PendingNode>],
        resolvers: &mut [Option<AttrResolver>],
        outcomes: &mut [Option<NodeOutcome>],
        labels: &[(String, ResourceKind, String)],
        tasks: &mut JoinSet<(usize, std::result::Result<AttrMap, String>)>,
    ) {
        if *self.cancel.borrow() {
            self.mark_cancelled(idx, resolvers, outcomes, labels);
            return;
        }

        let Some(node) = pending[idx].take() else {
            return;
        };

        let executor = Arc::clone(&self.executor);
        tasks.spawn(async move {
            let mut properties = AttrMap::new();
            for (name, input) in node.inputs {
                let value = match input {
                    InputValue::Literal(value) => value,
                    InputValue::Dynamic(output) => match output.get().await {
                        Ok(value) => value,
                        Err(e) => return (idx, Err(format!("input '{name}': {e}"))),
                    },
                };
                properties.insert(name, value);
            }

            let request = CreateRequest {
                kind: node.kind,
                logical_name: node.logical_name,
                physical_name: node.physical_name,
                properties,
            };

            info!(resource = %request.logical_name, kind = %request.kind, "creating");
            match executor.create(&request).await {
                Ok(attrs) => (idx, Ok(attrs)),
                Err(e) => (idx, Err(e.to_string())),
            }
        });
    }

    /// Records a cancelled node: resolver errors out, report shows a skip.
    fn mark_cancelled(
        &self,
        idx: usize,
        resolvers: &mut [Option<AttrResolver>],
        outcomes: &mut [Option<NodeOutcome>],
        labels: &[(String, ResourceKind, String)],
    ) {
        warn!(resource = %labels[idx].0, "cancelled before creation");
        if let Some(resolver) = resolvers[idx].take() {
            let _ = resolver.send(Err(OutputError::Cancelled {
                node: labels[idx].0.clone(),
            }));
        }
        outcomes[idx] = Some(NodeOutcome {
            logical_name: labels[idx].0.clone(),
            kind: labels[idx].1,
            physical_name: labels[idx].2.clone(),
            status: NodeStatus::Skipped,
            error: Some(String::from("cancelled")),
            upstream: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::registry::{ResourceInputs, StackContext};
    use crate::test_support::RecordingExecutor;
    use std::time::Duration;

    fn no_cancel() -> watch::Receiver<bool> {
        // A dropped sender leaves the flag at its last value.
        watch::channel(false).1
    }

    #[tokio::test]
    async fn dependent_nodes_run_after_their_predecessors() {
        let ctx = StackContext::new("test");
        let group = ctx
            .register(ResourceKind::ResourceGroup, "group", "g", ResourceInputs::new())
            .unwrap();
        ctx.register(
            ResourceKind::StorageAccount,
            "account",
            "a",
            ResourceInputs::new().dynamic("resourceGroupName", group.attr("name")),
        )
        .unwrap();

        let executor = Arc::new(RecordingExecutor::new(Duration::from_millis(20)));
        let report = Scheduler::new(executor.clone(), no_cancel())
            .run(ctx.into_graph().unwrap())
            .await;

        assert!(report.success());
        let calls = executor.calls();
        let group_call = calls.iter().find(|c| c.logical_name == "group").unwrap();
        let account_call = calls.iter().find(|c| c.logical_name == "account").unwrap();
        assert!(account_call.started >= group_call.finished);
    }

    #[tokio::test]
    async fn independent_nodes_run_concurrently() {
        let ctx = StackContext::new("test");
        ctx.register(ResourceKind::Application, "left", "l", ResourceInputs::new())
            .unwrap();
        ctx.register(ResourceKind::StorageAccount, "right", "r", ResourceInputs::new())
            .unwrap();

        let executor = Arc::new(RecordingExecutor::new(Duration::from_millis(50)));
        let report = Scheduler::new(executor.clone(), no_cancel())
            .run(ctx.into_graph().unwrap())
            .await;

        assert!(report.success());
        let calls = executor.calls();
        let left = calls.iter().find(|c| c.logical_name == "left").unwrap();
        let right = calls.iter().find(|c| c.logical_name == "right").unwrap();
        // Execution windows overlap: neither waited for the other.
        assert!(left.started < right.finished);
        assert!(right.started < left.finished);
    }

    #[tokio::test]
    async fn failures_skip_only_transitive_dependents() {
        let ctx = StackContext::new("test");
        // Independent chain: application -> principal.
        let app = ctx
            .register(ResourceKind::Application, "app", "a", ResourceInputs::new())
            .unwrap();
        ctx.register(
            ResourceKind::ServicePrincipal,
            "principal",
            "p",
            ResourceInputs::new().dynamic("applicationId", app.attr("applicationId")),
        )
        .unwrap();
        // Failing chain: account -> container.
        let account = ctx
            .register(ResourceKind::StorageAccount, "account", "bad", ResourceInputs::new())
            .unwrap();
        ctx.register(
            ResourceKind::BlobContainer,
            "container",
            "c",
            ResourceInputs::new().dynamic("accountName", account.attr("name")),
        )
        .unwrap();

        let executor = Arc::new(
            RecordingExecutor::new(Duration::from_millis(5)).fail_on("bad"),
        );
        let report = Scheduler::new(executor, no_cancel())
            .run(ctx.into_graph().unwrap())
            .await;

        assert!(!report.success());
        assert_eq!(report.created(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);

        let container = report
            .outcomes
            .iter()
            .find(|o| o.logical_name == "container")
            .unwrap();
        assert_eq!(container.status, NodeStatus::Skipped);
        assert_eq!(container.upstream.as_deref(), Some("account"));

        let principal = report
            .outcomes
            .iter()
            .find(|o| o.logical_name == "principal")
            .unwrap();
        assert_eq!(principal.status, NodeStatus::Created);
    }

    #[tokio::test]
    async fn failed_outputs_resolve_with_errors_instead_of_hanging() {
        let ctx = StackContext::new("test");
        let account = ctx
            .register(ResourceKind::StorageAccount, "account", "bad", ResourceInputs::new())
            .unwrap();
        let name = account.attr_string("name");

        let executor = Arc::new(
            RecordingExecutor::new(Duration::from_millis(1)).fail_on("bad"),
        );
        let report = Scheduler::new(executor, no_cancel())
            .run(ctx.into_graph().unwrap())
            .await;

        assert_eq!(report.failed(), 1);
        assert!(matches!(
            name.get().await,
            Err(OutputError::ResourceFailed { .. })
        ));
    }

    #[tokio::test]
    async fn cancellation_blocks_new_requests_but_reports_every_node() {
        let ctx = StackContext::new("test");
        let group = ctx
            .register(ResourceKind::ResourceGroup, "group", "g", ResourceInputs::new())
            .unwrap();
        ctx.register(
            ResourceKind::StorageAccount,
            "account",
            "a",
            ResourceInputs::new().dynamic("resourceGroupName", group.attr("name")),
        )
        .unwrap();

        let (tx, rx) = watch::channel(false);
        let executor = Arc::new(RecordingExecutor::new(Duration::from_millis(30)));
        // Cancel while the first node is still in flight.
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = tx.send(true);
        });

        let report = Scheduler::new(executor.clone(), rx)
            .run(ctx.into_graph().unwrap())
            .await;
        canceller.await.unwrap();

        // The in-flight node completed; the dependent was never requested.
        assert_eq!(report.created(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(executor.calls().len(), 1);
    }
}
