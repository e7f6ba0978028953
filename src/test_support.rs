//! Recording fakes shared by the unit tests.
//!
//! The fakes capture per-call start/finish instants so tests can assert on
//! ordering and concurrency, and support failure injection by physical
//! name.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::deploy::{ChartDeployer, ChartRef};
use crate::error::{ProviderError, Result};
use crate::graph::{CreateRequest, NodeExecutor};
use crate::provider::{AttrMap, ClientConfig, CloudProvider, ResourceKind};

/// One recorded call with its execution window.
#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub(crate) kind: ResourceKind,
    pub(crate) logical_name: String,
    pub(crate) physical_name: String,
    pub(crate) started: Instant,
    pub(crate) finished: Instant,
}

/// Executor fake for scheduler tests: fabricates attributes, records call
/// windows, fails on demand.
#[derive(Debug)]
pub(crate) struct RecordingExecutor {
    latency: Duration,
    fail_names: HashSet<String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingExecutor {
    pub(crate) fn new(latency: Duration) -> Self {
        Self {
            latency,
            fail_names: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Makes every call for the given physical name fail.
    pub(crate) fn fail_on(mut self, physical_name: &str) -> Self {
        self.fail_names.insert(physical_name.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl NodeExecutor for RecordingExecutor {
    async fn create(&self, request: &CreateRequest) -> Result<AttrMap> {
        let started = Instant::now();
        tokio::time::sleep(self.latency).await;
        let finished = Instant::now();

        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(RecordedCall {
                kind: request.kind,
                logical_name: request.logical_name.clone(),
                physical_name: request.physical_name.clone(),
                started,
                finished,
            });

        if self.fail_names.contains(&request.physical_name) {
            return Err(ProviderError::api_error(
                409,
                format!("injected failure for {}", request.physical_name),
            )
            .into());
        }

        Ok(fabricate_attrs(request.kind, &request.physical_name))
    }
}

/// Cloud provider fake used by subgraph and end-to-end tests.
#[derive(Debug)]
pub(crate) struct RecordingProvider {
    latency: Duration,
    fail_kinds: HashSet<ResourceKind>,
    calls: Mutex<Vec<RecordedCall>>,
    client_config: ClientConfig,
}

impl RecordingProvider {
    pub(crate) fn new() -> Self {
        Self {
            latency: Duration::from_millis(1),
            fail_kinds: HashSet::new(),
            calls: Mutex::new(Vec::new()),
            client_config: ClientConfig {
                subscription_id: String::from("S"),
                tenant_id: String::from("T"),
            },
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes every call for the given resource kind fail.
    pub(crate) fn fail_on(mut self, kind: ResourceKind) -> Self {
        self.fail_kinds.insert(kind);
        self
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CloudProvider for RecordingProvider {
    async fn create_resource(
        &self,
        kind: ResourceKind,
        name: &str,
        _properties: &AttrMap,
    ) -> Result<AttrMap> {
        let started = Instant::now();
        tokio::time::sleep(self.latency).await;
        let finished = Instant::now();

        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(RecordedCall {
                kind,
                logical_name: name.to_string(),
                physical_name: name.to_string(),
                started,
                finished,
            });

        if self.fail_kinds.contains(&kind) {
            return Err(ProviderError::api_error(409, format!("injected failure for {name}")).into());
        }

        Ok(fabricate_attrs(kind, name))
    }

    async fn client_config(&self) -> Result<ClientConfig> {
        Ok(self.client_config.clone())
    }
}

/// Deployer fake: records namespaces and applied releases with their
/// resolved values.
#[derive(Debug, Default)]
pub(crate) struct RecordingDeployer {
    pub(crate) namespaces: Mutex<Vec<String>>,
    pub(crate) applies: Mutex<Vec<AppliedRelease>>,
}

/// One recorded chart application.
#[derive(Debug, Clone)]
pub(crate) struct AppliedRelease {
    pub(crate) release: String,
    pub(crate) namespace: String,
    pub(crate) chart: ChartRef,
    pub(crate) values: Value,
}

impl RecordingDeployer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn applied(&self) -> Vec<AppliedRelease> {
        self.applies
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ChartDeployer for RecordingDeployer {
    async fn ensure_namespace(&self, name: &str) -> Result<()> {
        self.namespaces
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(name.to_string());
        Ok(())
    }

    async fn apply(
        &self,
        release: &str,
        namespace: &str,
        chart: &ChartRef,
        values: &Value,
    ) -> Result<()> {
        self.applies
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(AppliedRelease {
                release: release.to_string(),
                namespace: namespace.to_string(),
                chart: chart.clone(),
                values: values.clone(),
            });
        Ok(())
    }
}

/// Fabricates a plausible attribute record for the given resource kind.
fn fabricate_attrs(kind: ResourceKind, name: &str) -> AttrMap {
    let value = match kind {
        ResourceKind::ResourceGroup => json!({
            "id": format!("/subscriptions/S/resourceGroups/{name}"),
            "name": name,
        }),
        ResourceKind::Application => json!({
            "id": format!("object-{name}"),
            "applicationId": format!("client-{name}"),
            "displayName": name,
        }),
        ResourceKind::ServicePrincipal => json!({
            "id": format!("principal-{name}"),
            "applicationId": format!("client-{name}"),
        }),
        ResourceKind::ServicePrincipalPassword => json!({
            "keyId": format!("key-{name}"),
            "value": format!("secret-{name}"),
        }),
        ResourceKind::RoleAssignment => json!({
            "id": format!("/assignments/{name}"),
            "name": name,
        }),
        ResourceKind::StorageAccount | ResourceKind::BlobContainer | ResourceKind::Namespace => {
            json!({
                "id": format!("/resources/{name}"),
                "name": name,
            })
        }
        ResourceKind::HelmRelease => json!({
            "name": name,
            "status": "deployed",
        }),
    };

    match value {
        Value::Object(map) => map,
        _ => AttrMap::new(),
    }
}
