//! In-memory Azure
//!
//! Implements both listing capabilities over fixed data, with optional paging,
//! injected failures and delays. Loadable from a JSON fixture:
//!
//! ```json
//! {
//!   "subscriptions": [{ "id": "sub-a", "tenantId": "t", "displayName": "A" }],
//!   "resources": { "sub-a": { "virtual-machines": [{ "id": "...", "name": "vm1", "location": "eastus" }] } },
//!   "children": { "<storage account id>": [{ "id": "...", "name": "logs" }] }
//! }
//! ```

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::discoverers::{ClientFactory, ResourceKind, ResourceLister};
use super::scopes::ScopeLister;
use super::types::{Page, RawResource, Scope};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockCloud {
    #[serde(default)]
    subscriptions: Vec<Scope>,
    /// subscription -> kind -> resources
    #[serde(default)]
    resources: HashMap<String, HashMap<ResourceKind, Vec<RawResource>>>,
    /// parent resource id -> nested resources
    #[serde(default)]
    children: HashMap<String, Vec<RawResource>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    page_size: Option<usize>,

    #[serde(skip)]
    scope_failure: Option<String>,
    #[serde(skip)]
    failures: HashMap<(String, ResourceKind), String>,
    #[serde(skip)]
    delays: HashMap<(String, ResourceKind), Duration>,
    /// Resource page requests served, shared across clones
    #[serde(skip)]
    calls: Arc<AtomicUsize>,
}

impl MockCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse mock cloud fixture")
    }

    pub fn from_fixture(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.subscriptions.push(scope);
        self
    }

    /// Add a top-level resource of `kind` to a subscription
    pub fn with_resource(mut self, subscription: &str, kind: ResourceKind, resource: RawResource) -> Self {
        self.resources
            .entry(subscription.to_string())
            .or_default()
            .entry(kind)
            .or_default()
            .push(resource);
        self
    }

    /// Add a resource nested under `parent_id`
    pub fn with_child(mut self, parent_id: &str, resource: RawResource) -> Self {
        self.children
            .entry(parent_id.to_string())
            .or_default()
            .push(resource);
        self
    }

    /// Serve every listing in pages of at most `size` items
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size.max(1));
        self
    }

    pub fn fail_scope_listing(mut self, message: &str) -> Self {
        self.scope_failure = Some(message.to_string());
        self
    }

    /// Make every page request for `kind` in `subscription` fail
    pub fn fail_listing(mut self, subscription: &str, kind: ResourceKind, message: &str) -> Self {
        self.failures
            .insert((subscription.to_string(), kind), message.to_string());
        self
    }

    /// Delay every page request for `kind` in `subscription`
    pub fn delay_listing(mut self, subscription: &str, kind: ResourceKind, delay: Duration) -> Self {
        self.delays.insert((subscription.to_string(), kind), delay);
        self
    }

    /// Number of resource page requests served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn page<T: Clone>(&self, items: &[T], token: Option<String>) -> Result<Page<T>> {
        let start = match token {
            Some(t) => t.parse::<usize>().map_err(|_| anyhow!("bad page token: {t}"))?,
            None => 0,
        };
        if start > items.len() {
            bail!("page token out of range: {start}");
        }

        let size = self.page_size.unwrap_or(items.len().max(1));
        let end = (start + size).min(items.len());
        let slice = items[start..end].to_vec();

        if end < items.len() {
            Ok(Page::with_next(slice, end.to_string()))
        } else {
            Ok(Page::last(slice))
        }
    }
}

#[async_trait]
impl ScopeLister for MockCloud {
    async fn list_scopes(&self, page: Option<String>) -> Result<Page<Scope>> {
        if let Some(message) = &self.scope_failure {
            bail!("{message}");
        }
        self.page(&self.subscriptions, page)
    }
}

impl ClientFactory for MockCloud {
    fn lister(&self, kind: ResourceKind, scope: &Scope) -> Result<Box<dyn ResourceLister>> {
        let key = (scope.id.clone(), kind);
        Ok(Box::new(MockLister {
            cloud: self.clone(),
            subscription: scope.id.clone(),
            kind,
            failure: self.failures.get(&key).cloned(),
            delay: self.delays.get(&key).copied(),
        }))
    }
}

struct MockLister {
    cloud: MockCloud,
    subscription: String,
    kind: ResourceKind,
    failure: Option<String>,
    delay: Option<Duration>,
}

#[async_trait]
impl ResourceLister for MockLister {
    async fn list(&self, parent: Option<&str>, page: Option<String>) -> Result<Page<RawResource>> {
        self.cloud.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            bail!("{message}");
        }

        let empty = Vec::new();
        let items = match parent {
            Some(parent) => self.cloud.children.get(parent).unwrap_or(&empty),
            None => self
                .cloud
                .resources
                .get(&self.subscription)
                .and_then(|kinds| kinds.get(&self.kind))
                .unwrap_or(&empty),
        };
        self.cloud.page(items, page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::discoverers::list_all;

    #[tokio::test]
    async fn test_fixture_round_trip_through_listers() {
        let cloud = MockCloud::from_json(
            r#"{
                "subscriptions": [{ "id": "sub-a", "tenantId": "t1", "displayName": "A" }],
                "resources": {
                    "sub-a": {
                        "key-vaults": [
                            { "id": "/subscriptions/sub-a/resourceGroups/rg/providers/Microsoft.KeyVault/vaults/kv1", "name": "kv1", "location": "eastus" },
                            { "id": "/subscriptions/sub-a/resourceGroups/rg/providers/Microsoft.KeyVault/vaults/kv2", "name": "kv2", "location": "eastus" }
                        ]
                    }
                }
            }"#,
        )
        .unwrap()
        .page_size(1);

        let scopes = cloud.list_scopes(None).await.unwrap();
        assert_eq!(scopes.items[0].tenant_id, "t1");
        assert!(scopes.next.is_none());

        let lister = cloud.lister(ResourceKind::KeyVaults, &scopes.items[0]).unwrap();
        let first = lister.list(None, None).await.unwrap();
        assert_eq!(first.items.len(), 1);
        assert_eq!(first.next.as_deref(), Some("1"));

        let all = list_all(lister.as_ref(), None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(cloud.calls(), 3);
    }

    #[tokio::test]
    async fn test_unknown_subscription_lists_nothing() {
        let cloud = MockCloud::new();
        let lister = cloud
            .lister(ResourceKind::SqlServers, &Scope::new("nope", "", ""))
            .unwrap();
        let page = lister.list(None, None).await.unwrap();
        assert!(page.items.is_empty());
        assert!(page.next.is_none());
    }

    #[test]
    fn test_bad_fixture_is_an_error() {
        assert!(MockCloud::from_json("{ not json").is_err());
    }
}
