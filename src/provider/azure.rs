//! Azure implementation of the cloud provider boundary.
//!
//! Identity objects (applications, service principals, passwords) go
//! through the Microsoft Graph API; everything else goes through the Azure
//! Resource Manager API. Both use bearer tokens supplied through the
//! environment, resolved lazily so that offline commands (`plan`) never
//! require credentials.

use reqwest::{Client, Method, header};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{ProviderError, Result, StackError};

use super::{AttrMap, ClientConfig, CloudProvider, ResourceKind};

/// Azure Resource Manager base URL.
const MANAGEMENT_URL: &str = "https://management.azure.com";

/// Microsoft Graph base URL.
const GRAPH_URL: &str = "https://graph.microsoft.com";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// API version for resource group and role assignment operations.
const ARM_API_VERSION: &str = "2022-04-01";

/// API version for storage operations.
const STORAGE_API_VERSION: &str = "2023-01-01";

/// Connection settings, normally read from the environment.
#[derive(Debug, Clone, Default)]
pub struct AzureSettings {
    /// Bearer token for the Resource Manager API.
    pub management_token: Option<String>,
    /// Bearer token for the Microsoft Graph API.
    pub graph_token: Option<String>,
    /// Subscription identifier.
    pub subscription_id: Option<String>,
    /// Tenant identifier.
    pub tenant_id: Option<String>,
    /// Resource Manager base URL override.
    pub management_url: Option<String>,
    /// Graph base URL override.
    pub graph_url: Option<String>,
}

impl AzureSettings {
    /// Reads settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            management_token: std::env::var("AZURE_MANAGEMENT_TOKEN").ok(),
            graph_token: std::env::var("AZURE_GRAPH_TOKEN").ok(),
            subscription_id: std::env::var("AZURE_SUBSCRIPTION_ID").ok(),
            tenant_id: std::env::var("AZURE_TENANT_ID").ok(),
            management_url: None,
            graph_url: None,
        }
    }
}

/// Azure cloud provider.
#[derive(Debug)]
pub struct AzureProvider {
    client: Client,
    settings: AzureSettings,
}

impl AzureProvider {
    /// Creates a provider from the given settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(settings: AzureSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, settings })
    }

    /// Creates a provider from the process environment.
    ///
    /// Missing credentials are not an error here; they surface per call,
    /// so credential-free commands keep working.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_env() -> Result<Self> {
        Self::new(AzureSettings::from_env())
    }

    fn management_url(&self) -> &str {
        self.settings
            .management_url
            .as_deref()
            .unwrap_or(MANAGEMENT_URL)
    }

    fn graph_url(&self) -> &str {
        self.settings.graph_url.as_deref().unwrap_or(GRAPH_URL)
    }

    fn required_setting<'a>(value: Option<&'a str>, env_name: &str) -> Result<&'a str> {
        value.ok_or_else(|| {
            StackError::Provider(ProviderError::MissingEnvVar {
                name: env_name.to_string(),
            })
        })
    }

    fn subscription_id(&self) -> Result<&str> {
        Self::required_setting(
            self.settings.subscription_id.as_deref(),
            "AZURE_SUBSCRIPTION_ID",
        )
    }

    fn tenant_id(&self) -> Result<&str> {
        Self::required_setting(self.settings.tenant_id.as_deref(), "AZURE_TENANT_ID")
    }

    fn management_token(&self) -> Result<&str> {
        Self::required_setting(
            self.settings.management_token.as_deref(),
            "AZURE_MANAGEMENT_TOKEN",
        )
    }

    fn graph_token(&self) -> Result<&str> {
        Self::required_setting(self.settings.graph_token.as_deref(), "AZURE_GRAPH_TOKEN")
    }

    /// Executes a single authorized request and parses the JSON body.
    async fn execute(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: &Value,
    ) -> Result<Value> {
        trace!("Azure request: {method} {url}");

        let response = self
            .client
            .request(method, url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::network(format!("Request failed: {e}")))?;

        let status = response.status();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProviderError::AuthenticationFailed {
                message: format!("Token rejected with status {}", status.as_u16()),
            }
            .into());
        }

        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(ProviderError::api_error(status.as_u16(), text).into());
        }

        if text.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| {
            ProviderError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            }
            .into()
        })
    }

    async fn management_put(&self, path_and_query: &str, body: Value) -> Result<Value> {
        let url = format!("{}{path_and_query}", self.management_url());
        let token = self.management_token()?.to_string();
        self.execute(Method::PUT, &url, &token, &body).await
    }

    async fn graph_post(&self, path: &str, body: Value) -> Result<Value> {
        let url = format!("{}{path}", self.graph_url());
        let token = self.graph_token()?.to_string();
        self.execute(Method::POST, &url, &token, &body).await
    }

    async fn create_resource_group(&self, name: &str, properties: &AttrMap) -> Result<AttrMap> {
        let location = required_str(properties, "location", name)?;
        let subscription = self.subscription_id()?;
        let response = self
            .management_put(
                &format!(
                    "/subscriptions/{subscription}/resourcegroups/{name}?api-version={ARM_API_VERSION}"
                ),
                json!({ "location": location }),
            )
            .await?;

        let mut attrs = AttrMap::new();
        attrs.insert(
            String::from("id"),
            response.get("id").cloned().unwrap_or_else(|| {
                Value::String(format!("/subscriptions/{subscription}/resourceGroups/{name}"))
            }),
        );
        attrs.insert(String::from("name"), Value::String(name.to_string()));
        Ok(attrs)
    }

    async fn create_application(&self, name: &str, properties: &AttrMap) -> Result<AttrMap> {
        let display_name = required_str(properties, "displayName", name)?;
        let response = self
            .graph_post("/v1.0/applications", json!({ "displayName": display_name }))
            .await?;

        let mut attrs = AttrMap::new();
        attrs.insert(String::from("id"), response_field(&response, "id")?);
        attrs.insert(
            String::from("applicationId"),
            response_field(&response, "appId")?,
        );
        attrs.insert(
            String::from("displayName"),
            Value::String(display_name.to_string()),
        );
        Ok(attrs)
    }

    async fn create_service_principal(&self, name: &str, properties: &AttrMap) -> Result<AttrMap> {
        let application_id = required_str(properties, "applicationId", name)?;
        let response = self
            .graph_post("/v1.0/servicePrincipals", json!({ "appId": application_id }))
            .await?;

        let mut attrs = AttrMap::new();
        attrs.insert(String::from("id"), response_field(&response, "id")?);
        attrs.insert(
            String::from("applicationId"),
            Value::String(application_id.to_string()),
        );
        Ok(attrs)
    }

    async fn create_principal_password(&self, name: &str, properties: &AttrMap) -> Result<AttrMap> {
        let principal_id = required_str(properties, "servicePrincipalId", name)?;
        let end_date = required_str(properties, "endDate", name)?;
        let response = self
            .graph_post(
                &format!("/v1.0/servicePrincipals/{principal_id}/addPassword"),
                json!({ "passwordCredential": { "endDateTime": end_date } }),
            )
            .await?;

        let mut attrs = AttrMap::new();
        attrs.insert(String::from("keyId"), response_field(&response, "keyId")?);
        attrs.insert(
            String::from("value"),
            response_field(&response, "secretText")?,
        );
        Ok(attrs)
    }

    async fn create_role_assignment(&self, name: &str, properties: &AttrMap) -> Result<AttrMap> {
        let scope = required_str(properties, "scope", name)?;
        let role_definition_id = required_str(properties, "roleDefinitionId", name)?;
        let principal_id = required_str(properties, "principalId", name)?;
        let principal_type = required_str(properties, "principalType", name)?;

        let response = self
            .management_put(
                &format!(
                    "{scope}/providers/Microsoft.Authorization/roleAssignments/{name}?api-version={ARM_API_VERSION}"
                ),
                json!({
                    "properties": {
                        "roleDefinitionId": role_definition_id,
                        "principalId": principal_id,
                        "principalType": principal_type,
                    }
                }),
            )
            .await?;

        let mut attrs = AttrMap::new();
        attrs.insert(
            String::from("id"),
            response.get("id").cloned().unwrap_or_else(|| {
                Value::String(format!(
                    "{scope}/providers/Microsoft.Authorization/roleAssignments/{name}"
                ))
            }),
        );
        attrs.insert(String::from("name"), Value::String(name.to_string()));
        Ok(attrs)
    }

    async fn create_storage_account(&self, name: &str, properties: &AttrMap) -> Result<AttrMap> {
        let resource_group = required_str(properties, "resourceGroupName", name)?;
        let location = required_str(properties, "location", name)?;
        let kind = required_str(properties, "kind", name)?;
        let access_tier = required_str(properties, "accessTier", name)?;
        let sku = required_str(properties, "sku", name)?;
        let subscription = self.subscription_id()?;

        // Encryption at rest and HTTPS-only are always requested; the
        // provisioner sets them unconditionally and this layer never
        // loosens them.
        let response = self
            .management_put(
                &format!(
                    "/subscriptions/{subscription}/resourceGroups/{resource_group}/providers/Microsoft.Storage/storageAccounts/{name}?api-version={STORAGE_API_VERSION}"
                ),
                json!({
                    "location": location,
                    "kind": kind,
                    "sku": { "name": sku },
                    "properties": {
                        "accessTier": access_tier,
                        "supportsHttpsTrafficOnly": true,
                        "encryption": {
                            "services": { "blob": { "enabled": true } },
                            "keySource": "Microsoft.Storage",
                        },
                    },
                }),
            )
            .await?;

        let mut attrs = AttrMap::new();
        attrs.insert(
            String::from("id"),
            response.get("id").cloned().unwrap_or_else(|| {
                Value::String(format!(
                    "/subscriptions/{subscription}/resourceGroups/{resource_group}/providers/Microsoft.Storage/storageAccounts/{name}"
                ))
            }),
        );
        attrs.insert(String::from("name"), Value::String(name.to_string()));
        Ok(attrs)
    }

    async fn create_blob_container(&self, name: &str, properties: &AttrMap) -> Result<AttrMap> {
        let resource_group = required_str(properties, "resourceGroupName", name)?;
        let account = required_str(properties, "accountName", name)?;
        let public_access = required_str(properties, "publicAccess", name)?;
        let subscription = self.subscription_id()?;

        self.management_put(
            &format!(
                "/subscriptions/{subscription}/resourceGroups/{resource_group}/providers/Microsoft.Storage/storageAccounts/{account}/blobServices/default/containers/{name}?api-version={STORAGE_API_VERSION}"
            ),
            json!({ "properties": { "publicAccess": public_access } }),
        )
        .await?;

        let mut attrs = AttrMap::new();
        attrs.insert(String::from("name"), Value::String(name.to_string()));
        attrs.insert(
            String::from("accountName"),
            Value::String(account.to_string()),
        );
        Ok(attrs)
    }
}

#[async_trait::async_trait]
impl CloudProvider for AzureProvider {
    async fn create_resource(
        &self,
        kind: ResourceKind,
        name: &str,
        properties: &AttrMap,
    ) -> Result<AttrMap> {
        debug!(kind = %kind, name, "creating Azure resource");

        match kind {
            ResourceKind::ResourceGroup => self.create_resource_group(name, properties).await,
            ResourceKind::Application => self.create_application(name, properties).await,
            ResourceKind::ServicePrincipal => {
                self.create_service_principal(name, properties).await
            }
            ResourceKind::ServicePrincipalPassword => {
                self.create_principal_password(name, properties).await
            }
            ResourceKind::RoleAssignment => self.create_role_assignment(name, properties).await,
            ResourceKind::StorageAccount => self.create_storage_account(name, properties).await,
            ResourceKind::BlobContainer => self.create_blob_container(name, properties).await,
            ResourceKind::Namespace | ResourceKind::HelmRelease => Err(StackError::internal(
                format!("cluster resource '{name}' routed to the cloud provider"),
            )),
        }
    }

    async fn client_config(&self) -> Result<ClientConfig> {
        Ok(ClientConfig {
            subscription_id: self.subscription_id()?.to_string(),
            tenant_id: self.tenant_id()?.to_string(),
        })
    }
}

/// Extracts a required string property from a resolved input record.
fn required_str<'a>(properties: &'a AttrMap, property: &str, name: &str) -> Result<&'a str> {
    properties
        .get(property)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ProviderError::MissingProperty {
                name: name.to_string(),
                property: property.to_string(),
            }
            .into()
        })
}

/// Extracts a required string field from an API response.
fn response_field(response: &Value, field: &str) -> Result<Value> {
    response
        .get(field)
        .filter(|v| v.is_string())
        .cloned()
        .ok_or_else(|| {
            ProviderError::InvalidResponse {
                message: format!("Response is missing field '{field}'"),
            }
            .into()
        })
}
