//! Resource declaration and implicit edge discovery.
//!
//! Resources are declared against a [`StackContext`], which records every
//! input binding. There is no explicit edge list: whenever an input is a
//! [`crate::output::Output`] derived from another node, the dependency-set
//! tag carried by the output becomes an edge. [`StackContext::into_graph`]
//! validates the result (unique names, known dependencies, no cycles)
//! before anything external is called.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{GraphError, OutputError};
use crate::output::{NodeId, Output};
use crate::provider::{AttrMap, ResourceKind};

/// Shared future yielding a node's resolved attribute record.
type SharedAttrs = Shared<BoxFuture<'static, Result<Arc<AttrMap>, OutputError>>>;

/// Sender used by the scheduler to resolve a node's attribute record.
pub(crate) type AttrResolver = oneshot::Sender<Result<Arc<AttrMap>, OutputError>>;

/// A single input binding: either a literal or a deferred value.
#[derive(Debug)]
pub enum InputValue {
    /// A literal JSON value known at declaration time.
    Literal(Value),
    /// A deferred value produced elsewhere in the graph.
    Dynamic(Output<Value>),
}

/// Ordered input record for a resource declaration.
#[derive(Debug, Default)]
pub struct ResourceInputs {
    entries: Vec<(String, InputValue)>,
}

impl ResourceInputs {
    /// Creates an empty input record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a literal input.
    #[must_use]
    pub fn literal(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.entries.push((name.to_string(), InputValue::Literal(value.into())));
        self
    }

    /// Binds a deferred input.
    #[must_use]
    pub fn dynamic(mut self, name: &str, value: Output<Value>) -> Self {
        self.entries.push((name.to_string(), InputValue::Dynamic(value)));
        self
    }

    /// Union of the dependency sets of all dynamic inputs, with the name of
    /// the first input whose dependency is outside `known` (if any).
    fn dependencies(&self, known: usize) -> Result<BTreeSet<NodeId>, String> {
        let mut deps = BTreeSet::new();
        for (name, input) in &self.entries {
            if let InputValue::Dynamic(output) = input {
                for dep in output.deps() {
                    if dep.index() >= known {
                        return Err(name.clone());
                    }
                    deps.insert(*dep);
                }
            }
        }
        Ok(deps)
    }
}

/// A declared resource node.
pub(crate) struct NodeRecord {
    /// Node identifier (index into the registration order).
    pub(crate) id: NodeId,
    /// Resource kind.
    pub(crate) kind: ResourceKind,
    /// Stable logical name, unique within the graph.
    pub(crate) logical_name: String,
    /// Deterministic physical name.
    pub(crate) physical_name: String,
    /// Ordered input record.
    pub(crate) inputs: Vec<(String, InputValue)>,
    /// Direct predecessors, derived from the inputs.
    pub(crate) depends_on: BTreeSet<NodeId>,
    /// Channel resolving the node's attribute record.
    pub(crate) resolver: AttrResolver,
}

impl std::fmt::Debug for NodeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRecord")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("logical_name", &self.logical_name)
            .field("physical_name", &self.physical_name)
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}

/// Explicit run context: holds the stack identifier and collects node
/// registrations.
#[derive(Debug)]
pub struct StackContext {
    stack: String,
    nodes: Mutex<Vec<NodeRecord>>,
}

impl StackContext {
    /// Creates a context for the given stack identifier.
    #[must_use]
    pub fn new(stack: &str) -> Self {
        Self {
            stack: stack.to_string(),
            nodes: Mutex::new(Vec::new()),
        }
    }

    /// Returns the stack identifier this run provisions.
    #[must_use]
    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Declares a resource node and returns a handle to its future
    /// attributes.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateNode`] if the logical name is taken,
    /// or [`GraphError::UnknownDependency`] if an input references a node
    /// from a different context.
    pub fn register(
        &self,
        kind: ResourceKind,
        logical_name: &str,
        physical_name: &str,
        inputs: ResourceInputs,
    ) -> Result<ResourceHandle, GraphError> {
        let mut nodes = self.nodes.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        if nodes.iter().any(|n| n.logical_name == logical_name) {
            return Err(GraphError::DuplicateNode {
                name: logical_name.to_string(),
            });
        }

        let id = NodeId(nodes.len());
        let depends_on = inputs.dependencies(nodes.len()).map_err(|input| {
            GraphError::UnknownDependency {
                node: logical_name.to_string(),
                input,
            }
        })?;

        let (resolver, receiver) = oneshot::channel();
        let owner = logical_name.to_string();
        let resolved: SharedAttrs = async move {
            match receiver.await {
                Ok(result) => result,
                Err(_) => Err(OutputError::ResourceFailed {
                    node: owner,
                    message: String::from("resolver dropped before completion"),
                }),
            }
        }
        .boxed()
        .shared();

        debug!(
            node = logical_name,
            kind = %kind,
            deps = depends_on.len(),
            "registered resource"
        );

        nodes.push(NodeRecord {
            id,
            kind,
            logical_name: logical_name.to_string(),
            physical_name: physical_name.to_string(),
            inputs: inputs.entries,
            depends_on,
            resolver,
        });

        Ok(ResourceHandle {
            id,
            logical_name: logical_name.to_string(),
            resolved,
        })
    }

    /// Consumes the context and produces a validated graph.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DependencyCycle`] if the declared edges cannot
    /// be topologically ordered.
    pub fn into_graph(self) -> Result<ResourceGraph, GraphError> {
        let nodes = self
            .nodes
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let order = topological_order(&nodes)?;
        Ok(ResourceGraph { nodes, order })
    }
}

/// Computes a topological order over the records, or reports the cycle.
fn topological_order(nodes: &[NodeRecord]) -> Result<Vec<usize>, GraphError> {
    let count = nodes.len();
    let mut indegree = vec![0usize; count];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];

    for node in nodes {
        for dep in &node.depends_on {
            indegree[node.id.index()] += 1;
            dependents[dep.index()].push(node.id.index());
        }
    }

    let mut ready: Vec<usize> = (0..count).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(count);

    while let Some(idx) = ready.pop() {
        order.push(idx);
        for &dep in &dependents[idx] {
            indegree[dep] -= 1;
            if indegree[dep] == 0 {
                ready.push(dep);
            }
        }
    }

    if order.len() != count {
        let stuck: Vec<&str> = (0..count)
            .filter(|&i| indegree[i] > 0)
            .map(|i| nodes[i].logical_name.as_str())
            .collect();
        return Err(GraphError::DependencyCycle {
            nodes: stuck.join(", "),
        });
    }

    Ok(order)
}

/// Handle to a declared resource: the source of its attribute outputs.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    id: NodeId,
    logical_name: String,
    resolved: SharedAttrs,
}

impl ResourceHandle {
    /// Returns the node identifier.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the logical name.
    #[must_use]
    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    /// Returns the named attribute as a deferred JSON value.
    ///
    /// The returned output depends on this node, which is how downstream
    /// declarations acquire their edges.
    #[must_use]
    pub fn attr(&self, name: &str) -> Output<Value> {
        let attrs = self.resolved.clone();
        let node = self.logical_name.clone();
        let attribute = name.to_string();
        Output::from_future(
            async move {
                let record = attrs.await?;
                record
                    .get(&attribute)
                    .cloned()
                    .ok_or(OutputError::MissingAttribute { node, attribute })
            },
            BTreeSet::from([self.id]),
        )
    }

    /// Returns the named attribute as a deferred string.
    #[must_use]
    pub fn attr_string(&self, name: &str) -> Output<String> {
        let node = self.logical_name.clone();
        let attribute = name.to_string();
        self.attr(name).then(move |value| async move {
            match value {
                Value::String(s) => Ok(s),
                _ => Err(OutputError::AttributeType {
                    node,
                    attribute,
                    expected: "string",
                }),
            }
        })
    }
}

/// A validated resource graph ready for scheduling.
#[derive(Debug)]
pub struct ResourceGraph {
    pub(crate) nodes: Vec<NodeRecord>,
    order: Vec<usize>,
}

/// One node of the creation plan, in dependency order.
#[derive(Debug, Serialize)]
pub struct PlannedNode {
    /// Logical name.
    pub logical_name: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Deterministic physical name.
    pub physical_name: String,
    /// Logical names of direct predecessors.
    pub depends_on: Vec<String>,
}

impl ResourceGraph {
    /// Number of nodes in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the creation plan in a valid dependency order.
    #[must_use]
    pub fn plan(&self) -> Vec<PlannedNode> {
        self.order
            .iter()
            .map(|&idx| {
                let node = &self.nodes[idx];
                PlannedNode {
                    logical_name: node.logical_name.clone(),
                    kind: node.kind,
                    physical_name: node.physical_name.clone(),
                    depends_on: node
                        .depends_on
                        .iter()
                        .map(|dep| self.nodes[dep.index()].logical_name.clone())
                        .collect(),
                }
            })
            .collect()
    }
}
