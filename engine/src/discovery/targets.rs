//! Discovery Targets
//!
//! Names a caller can request, and the alias expansion that turns a request
//! into the concrete set of discoverers to run.

use std::collections::HashSet;

/// Expands to every known target
pub const DISCOVERY_ALL: &str = "all";
/// Expands to the curated default set, plus whatever else was requested
pub const DISCOVERY_AUTO: &str = "auto";

/// The subscriptions themselves, returned as assets
pub const DISCOVERY_SUBSCRIPTIONS: &str = "subscriptions";
pub const DISCOVERY_INSTANCES: &str = "instances";
pub const DISCOVERY_INSTANCES_API: &str = "instances-api";
pub const DISCOVERY_SQL_SERVERS: &str = "sql-servers";
pub const DISCOVERY_POSTGRES_SERVERS: &str = "postgres-servers";
pub const DISCOVERY_POSTGRES_FLEXIBLE_SERVERS: &str = "postgres-flexible-servers";
pub const DISCOVERY_MYSQL_SERVERS: &str = "mysql-servers";
pub const DISCOVERY_MYSQL_FLEXIBLE_SERVERS: &str = "mysql-flexible-servers";
pub const DISCOVERY_MARIADB_SERVERS: &str = "mariadb-servers";
pub const DISCOVERY_STORAGE_ACCOUNTS: &str = "storage-accounts";
pub const DISCOVERY_STORAGE_CONTAINERS: &str = "storage-containers";
pub const DISCOVERY_KEYVAULTS: &str = "keyvaults-vaults";
pub const DISCOVERY_SECURITY_GROUPS: &str = "security-groups";

/// Every target this engine knows how to discover
pub const FULL_REGISTRY: &[&str] = &[
    DISCOVERY_SUBSCRIPTIONS,
    DISCOVERY_INSTANCES,
    DISCOVERY_INSTANCES_API,
    DISCOVERY_SQL_SERVERS,
    DISCOVERY_POSTGRES_SERVERS,
    DISCOVERY_POSTGRES_FLEXIBLE_SERVERS,
    DISCOVERY_MYSQL_SERVERS,
    DISCOVERY_MYSQL_FLEXIBLE_SERVERS,
    DISCOVERY_MARIADB_SERVERS,
    DISCOVERY_STORAGE_ACCOUNTS,
    DISCOVERY_STORAGE_CONTAINERS,
    DISCOVERY_KEYVAULTS,
    DISCOVERY_SECURITY_GROUPS,
];

/// Defaults used when the caller asks for nothing specific
pub const AUTO_TARGETS: &[&str] = &[DISCOVERY_SUBSCRIPTIONS, DISCOVERY_INSTANCES];

/// Short names accepted in place of a target
///
/// `vms` is the VM as an API object; the OS-level target stays `instances`.
pub const TARGET_ALIASES: &[(&str, &str)] = &[
    ("vms", DISCOVERY_INSTANCES_API),
    ("keyvaults", DISCOVERY_KEYVAULTS),
];

/// Canonical name for `target`
pub fn canonical_target(target: &str) -> &str {
    TARGET_ALIASES
        .iter()
        .find(|(alias, _)| *alias == target)
        .map(|(_, name)| *name)
        .unwrap_or(target)
}

/// Expand a requested target list into concrete target names
///
/// - `all` anywhere in the request returns the full registry.
/// - `auto` is replaced by the default set; other requested names are kept.
/// - An empty request means `auto`.
/// - Short aliases are replaced by their canonical name.
/// - Anything else is returned as requested, deduplicated.
///
/// Names are not validated here; unknown ones are reported when dispatched.
pub fn resolve_targets<S: AsRef<str>>(requested: &[S]) -> Vec<String> {
    let requested: Vec<&str> = requested
        .iter()
        .map(|t| canonical_target(t.as_ref()))
        .collect();

    if requested.contains(&DISCOVERY_ALL) {
        return FULL_REGISTRY.iter().map(|t| t.to_string()).collect();
    }

    let expanded: Vec<&str> = if requested.is_empty() {
        AUTO_TARGETS.to_vec()
    } else if requested.contains(&DISCOVERY_AUTO) {
        AUTO_TARGETS
            .iter()
            .copied()
            .chain(requested.iter().copied().filter(|t| *t != DISCOVERY_AUTO))
            .collect()
    } else {
        requested
    };

    let mut seen = HashSet::new();
    expanded
        .into_iter()
        .filter(|t| seen.insert(*t))
        .map(str::to_string)
        .collect()
}

/// Whether `target` is a name this engine can dispatch
pub fn is_known_target(target: &str) -> bool {
    FULL_REGISTRY.contains(&target)
}
