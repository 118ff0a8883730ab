//! Resource Discoverers
//!
//! One discoverer per discovery target. Each pages through a kind-specific
//! resource lister for one subscription and emits descriptors tagged with the
//! (service, object type) pair the platform table knows it by.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use super::config::Config;
use super::error::DiscoveryError;
use super::targets::*;
use super::types::{DiscoveredResource, Page, RawResource, ResourceDescriptor, Scope};

pub const COMPUTER_NAME_LABEL: &str = "azure.mondoo.com/computername";
pub const OS_TYPE_LABEL: &str = "azure.mondoo.com/ostype";
pub const INSTANCE_LABEL: &str = "mondoo.com/instance";

/// Azure resource kinds a lister can be built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    VirtualMachines,
    SqlServers,
    PostgresServers,
    PostgresFlexibleServers,
    MySqlServers,
    MySqlFlexibleServers,
    MariaDbServers,
    StorageAccounts,
    /// Nested under a storage account
    StorageContainers,
    KeyVaults,
    SecurityGroups,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 11] = [
        ResourceKind::VirtualMachines,
        ResourceKind::SqlServers,
        ResourceKind::PostgresServers,
        ResourceKind::PostgresFlexibleServers,
        ResourceKind::MySqlServers,
        ResourceKind::MySqlFlexibleServers,
        ResourceKind::MariaDbServers,
        ResourceKind::StorageAccounts,
        ResourceKind::StorageContainers,
        ResourceKind::KeyVaults,
        ResourceKind::SecurityGroups,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::VirtualMachines => "virtual-machines",
            ResourceKind::SqlServers => "sql-servers",
            ResourceKind::PostgresServers => "postgres-servers",
            ResourceKind::PostgresFlexibleServers => "postgres-flexible-servers",
            ResourceKind::MySqlServers => "mysql-servers",
            ResourceKind::MySqlFlexibleServers => "mysql-flexible-servers",
            ResourceKind::MariaDbServers => "mariadb-servers",
            ResourceKind::StorageAccounts => "storage-accounts",
            ResourceKind::StorageContainers => "storage-containers",
            ResourceKind::KeyVaults => "key-vaults",
            ResourceKind::SecurityGroups => "security-groups",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Paginated listing of one resource kind inside one subscription
#[async_trait]
pub trait ResourceLister: Send + Sync {
    /// Fetch one page
    ///
    /// `parent` is the native id of the parent resource for nested kinds,
    /// `page` the continuation token of the previous page.
    async fn list(&self, parent: Option<&str>, page: Option<String>) -> Result<Page<RawResource>>;
}

/// Builds resource listers bound to a subscription
pub trait ClientFactory: Send + Sync {
    fn lister(&self, kind: ResourceKind, scope: &Scope) -> Result<Box<dyn ResourceLister>>;
}

/// Page through a lister until exhausted; any page error aborts the listing
pub async fn list_all(lister: &dyn ResourceLister, parent: Option<&str>) -> Result<Vec<RawResource>> {
    let mut items = Vec::new();
    let mut token: Option<String> = None;

    loop {
        let page = lister.list(parent, token.take()).await?;
        items.extend(page.items);
        match page.next {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    Ok(items)
}

/// Lists the resources behind one discovery target
#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Discovery target this discoverer serves
    fn target(&self) -> &'static str;

    /// (service, object type) pair stamped on every descriptor
    fn emits(&self) -> (&'static str, &'static str);

    async fn discover(&self, scope: &Scope) -> Result<Vec<DiscoveredResource>, DiscoveryError>;
}

type LabelFn = fn(&RawResource) -> BTreeMap<String, String>;

/// Discoverer for a top-level resource kind
pub struct KindDiscoverer {
    target: &'static str,
    kind: ResourceKind,
    service: &'static str,
    object_type: &'static str,
    labels: Option<LabelFn>,
    os_connections: bool,
    clients: Arc<dyn ClientFactory>,
}

impl KindDiscoverer {
    pub fn new(
        target: &'static str,
        kind: ResourceKind,
        service: &'static str,
        object_type: &'static str,
        clients: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            target,
            kind,
            service,
            object_type,
            labels: None,
            os_connections: false,
            clients,
        }
    }

    /// Derive extra labels from each raw object
    pub fn with_labels(mut self, labels: LabelFn) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Add an ssh connection for every public address
    ///
    /// Addresses come from `RawResource::public_ip_addresses`. The ARM lister
    /// does not resolve them (that needs NIC and public IP lookups), so only
    /// listers that fill the field, such as fixtures, produce these connections.
    pub fn with_os_connections(mut self) -> Self {
        self.os_connections = true;
        self
    }

    fn to_discovered(&self, scope: &Scope, raw: RawResource) -> DiscoveredResource {
        let extra_labels = self.labels.map(|f| f(&raw)).unwrap_or_default();
        let extra_connections = if self.os_connections {
            raw.public_ip_addresses.iter().map(Config::ssh).collect()
        } else {
            Vec::new()
        };

        DiscoveredResource {
            descriptor: ResourceDescriptor {
                native_id: raw.id.clone(),
                scope_id: scope.id.clone(),
                region: raw.location.clone(),
                service: self.service.to_string(),
                object_type: self.object_type.to_string(),
            },
            raw,
            extra_labels,
            extra_connections,
        }
    }
}

#[async_trait]
impl Discoverer for KindDiscoverer {
    fn target(&self) -> &'static str {
        self.target
    }

    fn emits(&self) -> (&'static str, &'static str) {
        (self.service, self.object_type)
    }

    async fn discover(&self, scope: &Scope) -> Result<Vec<DiscoveredResource>, DiscoveryError> {
        let fail = |e| DiscoveryError::discoverer(self.target, &scope.id, e);

        let lister = self.clients.lister(self.kind, scope).map_err(fail)?;
        let items = list_all(lister.as_ref(), None).await.map_err(fail)?;

        debug!(
            target_name = self.target,
            subscription = %scope.id,
            count = items.len(),
            "Listed {}",
            self.kind
        );

        Ok(items
            .into_iter()
            .map(|raw| self.to_discovered(scope, raw))
            .collect())
    }
}

/// Discoverer for a kind nested under a parent resource
///
/// Children inherit the parent's location; ARM does not report one for them.
pub struct NestedDiscoverer {
    target: &'static str,
    parent: ResourceKind,
    child: ResourceKind,
    service: &'static str,
    object_type: &'static str,
    clients: Arc<dyn ClientFactory>,
}

impl NestedDiscoverer {
    pub fn new(
        target: &'static str,
        parent: ResourceKind,
        child: ResourceKind,
        service: &'static str,
        object_type: &'static str,
        clients: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            target,
            parent,
            child,
            service,
            object_type,
            clients,
        }
    }
}

#[async_trait]
impl Discoverer for NestedDiscoverer {
    fn target(&self) -> &'static str {
        self.target
    }

    fn emits(&self) -> (&'static str, &'static str) {
        (self.service, self.object_type)
    }

    async fn discover(&self, scope: &Scope) -> Result<Vec<DiscoveredResource>, DiscoveryError> {
        let fail = |e| DiscoveryError::discoverer(self.target, &scope.id, e);

        let parents = self.clients.lister(self.parent, scope).map_err(fail)?;
        let children = self.clients.lister(self.child, scope).map_err(fail)?;

        let mut out = Vec::new();
        for parent in list_all(parents.as_ref(), None).await.map_err(fail)? {
            let items = list_all(children.as_ref(), Some(parent.id.as_str()))
                .await
                .map_err(fail)?;

            for mut raw in items {
                if raw.location.is_empty() {
                    raw.location = parent.location.clone();
                }
                out.push(DiscoveredResource {
                    descriptor: ResourceDescriptor {
                        native_id: raw.id.clone(),
                        scope_id: scope.id.clone(),
                        region: raw.location.clone(),
                        service: self.service.to_string(),
                        object_type: self.object_type.to_string(),
                    },
                    raw,
                    extra_labels: BTreeMap::new(),
                    extra_connections: Vec::new(),
                });
            }
        }

        Ok(out)
    }
}

fn string_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))
        .and_then(Value::as_str)
}

/// Labels pulled from a VM's nested properties
pub fn vm_labels(raw: &RawResource) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    let props = &raw.properties;

    if let Some(name) = string_at(props, &["osProfile", "computerName"]) {
        labels.insert(COMPUTER_NAME_LABEL.to_string(), name.to_string());
    }
    if let Some(os_type) = string_at(props, &["storageProfile", "osDisk", "osType"]) {
        labels.insert(OS_TYPE_LABEL.to_string(), os_type.to_string());
    }
    if let Some(vm_id) = string_at(props, &["vmId"]) {
        labels.insert(INSTANCE_LABEL.to_string(), vm_id.to_string());
    }

    labels
}

/// Discoverers keyed by target name
#[derive(Clone, Default)]
pub struct Discoverers {
    by_target: HashMap<&'static str, Arc<dyn Discoverer>>,
}

impl Discoverers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in discoverer, backed by `clients`
    pub fn standard(clients: Arc<dyn ClientFactory>) -> Self {
        let kind = |target, kind, service, object_type| {
            KindDiscoverer::new(target, kind, service, object_type, clients.clone())
        };

        Self::new()
            .register(
                kind(DISCOVERY_INSTANCES, ResourceKind::VirtualMachines, "compute", "vm")
                    .with_labels(vm_labels)
                    .with_os_connections(),
            )
            .register(
                kind(DISCOVERY_INSTANCES_API, ResourceKind::VirtualMachines, "compute", "vm-api")
                    .with_labels(vm_labels),
            )
            .register(kind(DISCOVERY_SQL_SERVERS, ResourceKind::SqlServers, "sql", "server"))
            .register(kind(
                DISCOVERY_POSTGRES_SERVERS,
                ResourceKind::PostgresServers,
                "postgresql",
                "server",
            ))
            .register(kind(
                DISCOVERY_POSTGRES_FLEXIBLE_SERVERS,
                ResourceKind::PostgresFlexibleServers,
                "postgresql",
                "flexible-server",
            ))
            .register(kind(DISCOVERY_MYSQL_SERVERS, ResourceKind::MySqlServers, "mysql", "server"))
            .register(kind(
                DISCOVERY_MYSQL_FLEXIBLE_SERVERS,
                ResourceKind::MySqlFlexibleServers,
                "mysql",
                "flexible-server",
            ))
            .register(kind(
                DISCOVERY_MARIADB_SERVERS,
                ResourceKind::MariaDbServers,
                "mariadb",
                "server",
            ))
            .register(kind(
                DISCOVERY_STORAGE_ACCOUNTS,
                ResourceKind::StorageAccounts,
                "storage",
                "account",
            ))
            .register(NestedDiscoverer::new(
                DISCOVERY_STORAGE_CONTAINERS,
                ResourceKind::StorageAccounts,
                ResourceKind::StorageContainers,
                "storage",
                "container",
                clients.clone(),
            ))
            .register(kind(DISCOVERY_KEYVAULTS, ResourceKind::KeyVaults, "keyvault", "vault"))
            .register(kind(
                DISCOVERY_SECURITY_GROUPS,
                ResourceKind::SecurityGroups,
                "network",
                "security-group",
            ))
    }

    /// Add or replace the discoverer for its target
    pub fn register(mut self, discoverer: impl Discoverer + 'static) -> Self {
        self.by_target.insert(discoverer.target(), Arc::new(discoverer));
        self
    }

    pub fn get(&self, target: &str) -> Option<Arc<dyn Discoverer>> {
        self.by_target.get(target).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Discoverer>> {
        self.by_target.values()
    }

    pub fn len(&self) -> usize {
        self.by_target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }
}
