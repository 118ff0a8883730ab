//! Platform Identity & Classification
//!
//! Maps a discovered object's (service, object type) pair to its platform
//! title and name, and derives the stable platform id every asset is keyed by.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use super::error::DiscoveryError;
use super::types::ResourceDescriptor;

/// Prefix for resource platform ids
///
/// ARM resource ids are unique across subscriptions, so prefix + id is unique.
pub const PLATFORM_ID_PREFIX: &str = "//platformid.api.mondoo.app/runtime/azure/v1";

/// Prefix for OS-level VM platform ids
///
/// Distinct from [`PLATFORM_ID_PREFIX`] so a VM discovered both as an OS
/// target and as an API object yields two different ids.
pub const INSTANCE_PLATFORM_ID_PREFIX: &str = "//platformid.api.mondoo.app/runtime/azure";

/// Prefix for subscription platform ids
pub const SUBSCRIPTION_PLATFORM_ID_PREFIX: &str =
    "//platformid.api.mondoo.app/runtime/azure/subscriptions/";

/// Title and normalized platform name of one kind of Azure object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    pub title: &'static str,
    pub platform_name: &'static str,
    /// Whether the object type is appended to the technology url
    pub url_includes_type: bool,
    pub id_prefix: &'static str,
}

impl PlatformInfo {
    /// Platform id of an object of this kind
    pub fn platform_id(&self, native_id: &str) -> String {
        format!("{}{}", self.id_prefix, native_id)
    }
}

const fn info(title: &'static str, platform_name: &'static str, url_includes_type: bool) -> PlatformInfo {
    PlatformInfo {
        title,
        platform_name,
        url_includes_type,
        id_prefix: PLATFORM_ID_PREFIX,
    }
}

const fn instance_info(title: &'static str, platform_name: &'static str) -> PlatformInfo {
    PlatformInfo {
        title,
        platform_name,
        url_includes_type: false,
        id_prefix: INSTANCE_PLATFORM_ID_PREFIX,
    }
}

static PLATFORM_ENTRIES: &[(&str, &str, PlatformInfo)] = &[
    ("compute", "vm", instance_info("Azure Compute VM", "azure-compute-vm")),
    ("compute", "vm-api", info("Azure Compute VM", "azure-compute-vm-api", false)),
    ("sql", "server", info("Azure SQL Database Server", "azure-sql-server", false)),
    ("postgresql", "server", info("Azure PostgreSQL Server", "azure-postgresql-server", false)),
    (
        "postgresql",
        "flexible-server",
        info("Azure PostgreSQL Flexible Server", "azure-postgresql-flexible-server", false),
    ),
    ("mysql", "server", info("Azure MySQL Server", "azure-mysql-server", false)),
    (
        "mysql",
        "flexible-server",
        info("Azure MySQL Flexible Server", "azure-mysql-flexible-server", false),
    ),
    ("mariadb", "server", info("Azure MariaDB Server", "azure-mariadb-server", false)),
    ("storage", "account", info("Azure Storage Account", "azure-storage-account", true)),
    (
        "storage",
        "container",
        info("Azure Storage Account Container", "azure-storage-container", true),
    ),
    (
        "network",
        "security-group",
        info("Azure Network Security Group", "azure-network-security-group", true),
    ),
    ("keyvault", "vault", info("Azure Key Vault", "azure-keyvault-vault", false)),
];

/// service -> object type -> platform info
static PLATFORM_TABLE: Lazy<HashMap<&'static str, HashMap<&'static str, &'static PlatformInfo>>> =
    Lazy::new(|| {
        let mut table: HashMap<&'static str, HashMap<&'static str, &'static PlatformInfo>> =
            HashMap::new();
        for (service, object_type, info) in PLATFORM_ENTRIES {
            table.entry(*service).or_default().insert(*object_type, info);
        }
        table
    });

/// Look up the platform info for a (service, object type) pair
pub fn lookup(service: &str, object_type: &str) -> Result<&'static PlatformInfo, DiscoveryError> {
    PLATFORM_TABLE
        .get(service)
        .and_then(|types| types.get(object_type))
        .copied()
        .ok_or_else(|| DiscoveryError::Classification {
            service: service.to_string(),
            object_type: object_type.to_string(),
        })
}

/// Classify a descriptor
pub fn classify(descriptor: &ResourceDescriptor) -> Result<&'static PlatformInfo, DiscoveryError> {
    lookup(&descriptor.service, &descriptor.object_type)
}

/// Stable platform id for a resource
pub fn derive_platform_id(native_id: &str) -> String {
    format!("{}{}", PLATFORM_ID_PREFIX, native_id)
}

/// Stable platform id for a VM discovered as an OS target
pub fn instance_platform_id(native_id: &str) -> String {
    format!("{}{}", INSTANCE_PLATFORM_ID_PREFIX, native_id)
}

/// Stable platform id for a subscription
pub fn subscription_platform_id(subscription_id: &str) -> String {
    format!("{}{}", SUBSCRIPTION_PLATFORM_ID_PREFIX, subscription_id)
}

/// Components of an ARM resource id
///
/// `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}[/{child-type}/{child}...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub provider: String,
    /// Top-level resource type, e.g. "virtualMachines"
    pub resource_type: String,
    /// Name of the last segment, e.g. the container for nested resources
    pub name: String,
}

impl ResourceId {
    pub fn parse(id: &str) -> Result<Self, DiscoveryError> {
        let invalid = || DiscoveryError::InvalidResourceId(id.to_string());
        let segments: Vec<&str> = id.trim_matches('/').split('/').collect();

        let mut subscription_id = None;
        let mut resource_group = None;
        let mut provider_at = None;

        let mut i = 0;
        while i + 1 < segments.len() {
            let key = segments[i];
            if key.eq_ignore_ascii_case("subscriptions") && subscription_id.is_none() {
                subscription_id = Some(segments[i + 1]);
            } else if key.eq_ignore_ascii_case("resourceGroups") && resource_group.is_none() {
                resource_group = Some(segments[i + 1]);
            } else if key.eq_ignore_ascii_case("providers") {
                provider_at = Some(i + 1);
                break;
            }
            i += 2;
        }

        let subscription_id = subscription_id.filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let resource_group = resource_group.filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let provider_at = provider_at.ok_or_else(invalid)?;

        // namespace / type / name at minimum
        let rest = &segments[provider_at..];
        if rest.len() < 3 || rest.iter().any(|s| s.is_empty()) {
            return Err(invalid());
        }

        Ok(Self {
            subscription_id: subscription_id.to_string(),
            resource_group: resource_group.to_string(),
            provider: rest[0].to_string(),
            resource_type: rest[1].to_string(),
            name: rest[rest.len() - 1].to_string(),
        })
    }
}

/// Every (service, object type) pair in the table
pub fn known_pairs() -> Vec<(&'static str, &'static str)> {
    PLATFORM_ENTRIES
        .iter()
        .map(|(service, object_type, _)| (*service, *object_type))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(service: &str, object_type: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            native_id: "/subscriptions/s/resourceGroups/rg/providers/P/t/n".to_string(),
            scope_id: "s".to_string(),
            region: "eastus".to_string(),
            service: service.to_string(),
            object_type: object_type.to_string(),
        }
    }

    #[test]
    fn test_classify_known_pair() {
        let info = classify(&descriptor("keyvault", "vault")).unwrap();
        assert_eq!(info.title, "Azure Key Vault");
        assert_eq!(info.platform_name, "azure-keyvault-vault");
    }

    #[test]
    fn test_classify_unknown_pair() {
        let err = classify(&descriptor("compute", "disk")).unwrap_err();
        match err {
            DiscoveryError::Classification {
                service,
                object_type,
            } => {
                assert_eq!(service, "compute");
                assert_eq!(object_type, "disk");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_platform_id_is_deterministic() {
        let id = "/subscriptions/sub-a/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1";
        assert_eq!(derive_platform_id(id), derive_platform_id(id));
        assert_eq!(
            derive_platform_id(id),
            "//platformid.api.mondoo.app/runtime/azure/v1/subscriptions/sub-a/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1"
        );
        assert_eq!(
            subscription_platform_id("sub-a"),
            "//platformid.api.mondoo.app/runtime/azure/subscriptions/sub-a"
        );
    }

    #[test]
    fn test_vm_kinds_get_distinct_ids() {
        let id = "/subscriptions/sub-a/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1";
        let os = lookup("compute", "vm").unwrap().platform_id(id);
        let api = lookup("compute", "vm-api").unwrap().platform_id(id);

        assert_ne!(os, api);
        assert_eq!(os, instance_platform_id(id));
        assert_eq!(api, derive_platform_id(id));
        assert_eq!(
            os,
            "//platformid.api.mondoo.app/runtime/azure/subscriptions/sub-a/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1"
        );
    }

    #[test]
    fn test_parse_resource_id() {
        let id = ResourceId::parse(
            "/subscriptions/sub-a/resourceGroups/Prod-RG/providers/Microsoft.Compute/virtualMachines/vm1",
        )
        .unwrap();
        assert_eq!(id.subscription_id, "sub-a");
        assert_eq!(id.resource_group, "Prod-RG");
        assert_eq!(id.provider, "Microsoft.Compute");
        assert_eq!(id.resource_type, "virtualMachines");
        assert_eq!(id.name, "vm1");
    }

    #[test]
    fn test_parse_nested_resource_id() {
        let id = ResourceId::parse(
            "/subscriptions/s/resourcegroups/rg/providers/Microsoft.Storage/storageAccounts/acc/blobServices/default/containers/logs",
        )
        .unwrap();
        assert_eq!(id.resource_group, "rg");
        assert_eq!(id.resource_type, "storageAccounts");
        assert_eq!(id.name, "logs");
    }

    #[test]
    fn test_parse_rejects_malformed_ids() {
        assert!(ResourceId::parse("").is_err());
        assert!(ResourceId::parse("/subscriptions/s").is_err());
        assert!(ResourceId::parse("/subscriptions/s/resourceGroups/rg").is_err());
        assert!(ResourceId::parse("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute").is_err());
    }
}
