//! Azure Resource Manager listers
//!
//! HTTP implementation of the subscription and resource listing capabilities.
//! Pagination follows ARM's `nextLink`, which is used verbatim as the page
//! token. Token acquisition is the caller's job.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::discoverers::{ClientFactory, ResourceKind, ResourceLister};
use super::scopes::ScopeLister;
use super::types::{Page, RawResource, Scope};

pub const ARM_ENDPOINT: &str = "https://management.azure.com";

const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";

/// Provider path and api-version for a resource kind
///
/// Nested kinds give the path below their parent resource.
fn arm_path(kind: ResourceKind) -> (&'static str, &'static str) {
    match kind {
        ResourceKind::VirtualMachines => ("Microsoft.Compute/virtualMachines", "2023-03-01"),
        ResourceKind::SqlServers => ("Microsoft.Sql/servers", "2021-11-01"),
        ResourceKind::PostgresServers => ("Microsoft.DBforPostgreSQL/servers", "2017-12-01"),
        ResourceKind::PostgresFlexibleServers => {
            ("Microsoft.DBforPostgreSQL/flexibleServers", "2022-12-01")
        }
        ResourceKind::MySqlServers => ("Microsoft.DBforMySQL/servers", "2017-12-01"),
        ResourceKind::MySqlFlexibleServers => ("Microsoft.DBforMySQL/flexibleServers", "2021-05-01"),
        ResourceKind::MariaDbServers => ("Microsoft.DBforMariaDB/servers", "2018-06-01"),
        ResourceKind::StorageAccounts => ("Microsoft.Storage/storageAccounts", "2023-01-01"),
        ResourceKind::StorageContainers => ("blobServices/default/containers", "2023-01-01"),
        ResourceKind::KeyVaults => ("Microsoft.KeyVault/vaults", "2022-07-01"),
        ResourceKind::SecurityGroups => ("Microsoft.Network/networkSecurityGroups", "2023-05-01"),
    }
}

/// ARM list envelope
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(default)]
    next_link: Option<String>,
}

impl<T> From<ArmList<T>> for Page<T> {
    fn from(list: ArmList<T>) -> Self {
        Page {
            items: list.value,
            next: list.next_link.filter(|link| !link.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmSubscription {
    subscription_id: String,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

impl From<ArmSubscription> for Scope {
    fn from(sub: ArmSubscription) -> Self {
        Scope::new(
            sub.subscription_id,
            sub.tenant_id.unwrap_or_default(),
            sub.display_name.unwrap_or_default(),
        )
    }
}

/// Bearer-token ARM client
#[derive(Clone)]
pub struct ArmClient {
    http_client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl ArmClient {
    pub fn new(access_token: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: ARM_ENDPOINT.to_string(),
            access_token: access_token.to_string(),
        })
    }

    /// Point at a different ARM endpoint (sovereign clouds)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn subscriptions_url(&self) -> String {
        format!(
            "{}/subscriptions?api-version={}",
            self.base_url, SUBSCRIPTIONS_API_VERSION
        )
    }

    /// First page url for `kind`, below `parent` for nested kinds
    fn resources_url(&self, kind: ResourceKind, subscription: &str, parent: Option<&str>) -> String {
        let (path, api_version) = arm_path(kind);
        match parent {
            Some(parent) => format!(
                "{}/{}/{}?api-version={}",
                self.base_url,
                parent.trim_matches('/'),
                path,
                api_version
            ),
            None => format!(
                "{}/subscriptions/{}/providers/{}?api-version={}",
                self.base_url, subscription, path, api_version
            ),
        }
    }

    async fn get_page<T: DeserializeOwned>(&self, url: &str) -> Result<Page<T>> {
        debug!(url = %url, "ARM list request");

        let resp = self
            .http_client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("ARM request failed (Status: {}): {}", status, body);
        }

        let list: ArmList<T> = resp
            .json()
            .await
            .context("Failed to deserialize ARM list response")?;
        Ok(list.into())
    }
}

#[async_trait]
impl ScopeLister for ArmClient {
    async fn list_scopes(&self, page: Option<String>) -> Result<Page<Scope>> {
        let url = page.unwrap_or_else(|| self.subscriptions_url());
        let page: Page<ArmSubscription> = self.get_page(&url).await?;
        Ok(Page {
            items: page.items.into_iter().map(Scope::from).collect(),
            next: page.next,
        })
    }
}

impl ClientFactory for ArmClient {
    fn lister(&self, kind: ResourceKind, scope: &Scope) -> Result<Box<dyn ResourceLister>> {
        Ok(Box::new(ArmResourceLister {
            client: self.clone(),
            kind,
            subscription: scope.id.clone(),
        }))
    }
}

/// One resource kind in one subscription
pub struct ArmResourceLister {
    client: ArmClient,
    kind: ResourceKind,
    subscription: String,
}

#[async_trait]
impl ResourceLister for ArmResourceLister {
    async fn list(&self, parent: Option<&str>, page: Option<String>) -> Result<Page<RawResource>> {
        let url = page.unwrap_or_else(|| {
            self.client
                .resources_url(self.kind, &self.subscription, parent)
        });
        self.client
            .get_page(&url)
            .await
            .with_context(|| format!("Listing {} failed", self.kind))
    }
}
