//! Discovery Types
//!
//! Records flowing through the discovery pipeline: subscriptions, resource
//! descriptors, assembled assets and the inventory they are collected into.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::config::Config;

/// Runtime name stamped on every asset produced by this engine
pub const RUNTIME_AZURE: &str = "azure";

/// An Azure subscription reachable with the current credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    /// Subscription id
    pub id: String,
    /// Owning tenant, empty when the API did not report one
    #[serde(default)]
    pub tenant_id: String,
    /// Human readable subscription name
    #[serde(default)]
    pub display_name: String,
}

impl Scope {
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Tenant id, or `"unknown"` when it was not reported
    pub fn tenant_or_unknown(&self) -> &str {
        if self.tenant_id.is_empty() {
            "unknown"
        } else {
            &self.tenant_id
        }
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Continuation token; `None` on the last page
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    pub fn with_next(items: Vec<T>, next: impl Into<String>) -> Self {
        Self {
            items,
            next: Some(next.into()),
        }
    }
}

/// Minimal identity tuple produced by a discoverer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    /// Native ARM resource id
    pub native_id: String,
    /// Subscription the resource was listed in
    pub scope_id: String,
    /// Azure location (e.g. "eastus")
    pub region: String,
    /// Service family (e.g. "compute")
    pub service: String,
    /// Object type within the service (e.g. "vm")
    pub object_type: String,
}

/// Loosely typed resource payload as returned by a resource lister
///
/// Mirrors the generic ARM resource envelope, so list responses deserialize
/// straight into it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResource {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
    /// Native tags; values are not guaranteed to be strings
    #[serde(default)]
    pub tags: Map<String, Value>,
    /// Kind-specific nested properties
    #[serde(default)]
    pub properties: Value,
    /// Public addresses attached to the resource (VMs only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub public_ip_addresses: Vec<String>,
}

impl RawResource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location: location.into(),
            ..Default::default()
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }

    pub fn public_ip(mut self, ip: impl Into<String>) -> Self {
        self.public_ip_addresses.push(ip.into());
        self
    }
}

/// A descriptor together with everything the assembler needs to build an asset
#[derive(Debug, Clone)]
pub struct DiscoveredResource {
    pub descriptor: ResourceDescriptor,
    pub raw: RawResource,
    /// Kind-specific labels derived by the discoverer
    pub extra_labels: BTreeMap<String, String>,
    /// Connections appended after the scoped azure connection
    pub extra_connections: Vec<Config>,
}

/// Asset platform classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetKind {
    /// A resource living inside a subscription
    CloudObject,
    /// The subscription API itself
    Api,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetKind::CloudObject => write!(f, "cloud-object"),
            AssetKind::Api => write!(f, "api"),
        }
    }
}

/// Lifecycle state reported for an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetState {
    #[default]
    Online,
    Offline,
    Unknown,
}

/// Platform block of an asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    /// Normalized platform name (e.g. "azure-compute-vm")
    pub name: String,
    /// Human title (e.g. "Azure Compute VM")
    pub title: String,
    pub kind: AssetKind,
    pub runtime: String,
    /// Hierarchical grouping path: azure / tenant / subscription / service [/ type]
    #[serde(default)]
    pub technology_url_segments: Vec<String>,
}

/// Normalized, scanner-ready record for one discovered object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub platform_ids: Vec<String>,
    pub name: String,
    pub platform: Platform,
    pub labels: BTreeMap<String, String>,
    pub state: AssetState,
    pub connections: Vec<Config>,
}

impl Asset {
    /// Primary (derived) platform id
    pub fn platform_id(&self) -> &str {
        self.platform_ids.first().map(String::as_str).unwrap_or_default()
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Collected result of one discovery run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub assets: Vec<Asset>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, asset: Asset) {
        self.assets.push(asset);
    }

    pub fn extend(&mut self, assets: impl IntoIterator<Item = Asset>) {
        self.assets.extend(assets);
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Order assets by primary platform id so repeated runs serialize identically
    pub fn sort(&mut self) {
        self.assets.sort_by(|a, b| {
            a.platform_id()
                .cmp(b.platform_id())
                .then_with(|| a.platform.name.cmp(&b.platform.name))
                .then_with(|| a.name.cmp(&b.name))
        });
    }

    pub fn find(&self, platform_id: &str) -> Option<&Asset> {
        self.assets
            .iter()
            .find(|a| a.platform_ids.iter().any(|id| id == platform_id))
    }
}
