//! Deferred chart values.
//!
//! A [`ConfigurationDocument`] is a JSON-shaped tree whose leaves may be
//! deferred [`Output`]s. The tree collapses into a single `Output<Value>`
//! that resolves once every leaf has, carries the union of the leaves'
//! dependency sets (so the release node acquires edges to every referenced
//! resource) and is sensitive if any leaf is.

use std::collections::BTreeSet;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value, json};

use crate::config::StackConfig;
use crate::error::OutputError;
use crate::output::{NodeId, Output};

/// Snapshot API timeout recorded in the volume snapshot location.
pub const SNAPSHOT_API_TIMEOUT: &str = "5m";

/// Backup storage location name referenced by the schedule template.
pub const STORAGE_LOCATION: &str = "default";

/// One node of a value tree: a literal, a deferred leaf, or a composite.
#[derive(Debug)]
pub enum ValueNode {
    /// A literal JSON value known at composition time.
    Literal(Value),
    /// A deferred leaf resolved by the graph.
    Deferred(Output<Value>),
    /// An object with insertion-ordered keys.
    Object(Vec<(String, ValueNode)>),
    /// An array of nodes.
    Array(Vec<ValueNode>),
}

impl ValueNode {
    /// Wraps a literal value.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Wraps a deferred string leaf.
    #[must_use]
    pub fn deferred(output: Output<String>) -> Self {
        Self::Deferred(output.map(Value::String))
    }

    /// Builds an object node from ordered entries.
    #[must_use]
    pub fn object(entries: Vec<(&str, ValueNode)>) -> Self {
        Self::Object(
            entries
                .into_iter()
                .map(|(key, node)| (key.to_string(), node))
                .collect(),
        )
    }

    /// Union of the dependency sets of every deferred leaf.
    #[must_use]
    pub fn deps(&self) -> BTreeSet<NodeId> {
        let mut deps = BTreeSet::new();
        self.collect_deps(&mut deps);
        deps
    }

    fn collect_deps(&self, deps: &mut BTreeSet<NodeId>) {
        match self {
            Self::Literal(_) => {}
            Self::Deferred(output) => deps.extend(output.deps().iter().copied()),
            Self::Object(entries) => {
                for (_, node) in entries {
                    node.collect_deps(deps);
                }
            }
            Self::Array(items) => {
                for node in items {
                    node.collect_deps(deps);
                }
            }
        }
    }

    /// True if any deferred leaf is sensitive.
    #[must_use]
    pub fn is_sensitive(&self) -> bool {
        match self {
            Self::Literal(_) => false,
            Self::Deferred(output) => output.is_sensitive(),
            Self::Object(entries) => entries.iter().any(|(_, node)| node.is_sensitive()),
            Self::Array(items) => items.iter().any(ValueNode::is_sensitive),
        }
    }

    /// Resolves the tree into a plain JSON value.
    fn resolve(self) -> BoxFuture<'static, Result<Value, OutputError>> {
        async move {
            match self {
                Self::Literal(value) => Ok(value),
                Self::Deferred(output) => output.get().await,
                Self::Object(entries) => {
                    let mut map = Map::new();
                    for (key, node) in entries {
                        map.insert(key, node.resolve().await?);
                    }
                    Ok(Value::Object(map))
                }
                Self::Array(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for node in items {
                        values.push(node.resolve().await?);
                    }
                    Ok(Value::Array(values))
                }
            }
        }
        .boxed()
    }
}

/// A complete chart values document.
#[derive(Debug)]
pub struct ConfigurationDocument {
    root: ValueNode,
}

impl ConfigurationDocument {
    /// Wraps a value tree as a document.
    #[must_use]
    pub fn new(root: ValueNode) -> Self {
        Self { root }
    }

    /// Union of the dependency sets of every deferred leaf.
    #[must_use]
    pub fn deps(&self) -> BTreeSet<NodeId> {
        self.root.deps()
    }

    /// True if any deferred leaf is sensitive.
    #[must_use]
    pub fn is_sensitive(&self) -> bool {
        self.root.is_sensitive()
    }

    /// Collapses the document into a single deferred value.
    #[must_use]
    pub fn into_output(self) -> Output<Value> {
        let deps = self.deps();
        let sensitive = self.is_sensitive();
        let output = Output::from_future(self.root.resolve(), deps);
        if sensitive { output.sensitive() } else { output }
    }
}

/// Deferred inputs of the values document.
#[derive(Debug)]
pub struct ValueInputs {
    /// Resource group name.
    pub resource_group_name: Output<String>,
    /// Storage account name.
    pub account_name: Output<String>,
    /// Blob container name (the backup bucket).
    pub container_name: Output<String>,
    /// Rendered credentials blob.
    pub credentials_blob: Output<String>,
}

/// Composes the chart values document for the backup release.
#[must_use]
pub fn compose(config: &StackConfig, inputs: ValueInputs) -> ConfigurationDocument {
    let location_config = ValueNode::object(vec![
        (
            "resourceGroup",
            ValueNode::deferred(inputs.resource_group_name.clone()),
        ),
        ("storageAccount", ValueNode::deferred(inputs.account_name.clone())),
    ]);

    let snapshot_config = ValueNode::object(vec![
        ("apiTimeout", ValueNode::literal(SNAPSHOT_API_TIMEOUT)),
        (
            "resourceGroup",
            ValueNode::deferred(inputs.resource_group_name),
        ),
        ("storageAccount", ValueNode::deferred(inputs.account_name)),
    ]);

    let root = ValueNode::object(vec![
        ("snapshotsEnabled", ValueNode::literal(false)),
        (
            "image",
            ValueNode::literal(json!({
                "repository": config.image.repository,
                "pullPolicy": config.image.pull_policy,
            })),
        ),
        (
            "configuration",
            ValueNode::object(vec![
                (
                    "backupStorageLocation",
                    ValueNode::Array(vec![ValueNode::object(vec![
                        ("provider", ValueNode::literal("azure")),
                        ("bucket", ValueNode::deferred(inputs.container_name)),
                        ("config", location_config),
                    ])]),
                ),
                (
                    "volumeSnapshotLocation",
                    ValueNode::Array(vec![ValueNode::object(vec![
                        ("provider", ValueNode::literal("azure")),
                        ("config", snapshot_config),
                    ])]),
                ),
            ]),
        ),
        (
            "credentials",
            ValueNode::object(vec![(
                "secretContents",
                ValueNode::object(vec![(
                    "cloud",
                    ValueNode::Deferred(inputs.credentials_blob.map(Value::String)),
                )]),
            )]),
        ),
        (
            "initContainers",
            ValueNode::Array(vec![ValueNode::literal(json!({
                "name": config.plugin.name,
                "image": config.plugin.image,
                "volumeMounts": [{ "name": "plugins", "mountPath": "/target" }],
            }))]),
        ),
        (
            "schedules",
            ValueNode::object(vec![(
                config.schedule.name.as_str(),
                ValueNode::literal(json!({
                    "disabled": false,
                    "schedule": config.schedule.cron,
                    "template": {
                        "ttl": config.schedule.ttl,
                        "storageLocation": STORAGE_LOCATION,
                    },
                })),
            )]),
        ),
    ]);

    ConfigurationDocument::new(root)
}
