//! Connection Configuration
//!
//! The root connection configuration handed in by the caller, the per-scope
//! and per-asset clones derived from it, and the engine's own tuning knobs.
//!
//! Every derived config is a fresh deep clone with the discovery directive
//! removed. A config attached to an asset must open a connection to exactly
//! that object and never trigger another discovery run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use super::error::DiscoveryError;
use super::scopes::Filter;
use super::types::Scope;

/// Comma separated subscription ids to include
pub const OPTION_SUBSCRIPTIONS: &str = "subscriptions";
/// Comma separated subscription ids to exclude
pub const OPTION_SUBSCRIPTIONS_EXCLUDE: &str = "subscriptions-exclude";
/// Subscription the connection is bound to
pub const OPTION_SUBSCRIPTION_ID: &str = "subscription-id";
pub const OPTION_TENANT_ID: &str = "tenant-id";
pub const OPTION_CLIENT_ID: &str = "client-id";

/// Backend name for Azure API connections
pub const BACKEND_AZURE: &str = "azure";
/// Backend name for OS-level connections to VMs
pub const BACKEND_SSH: &str = "ssh";

/// What the connection should discover when opened
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discovery {
    #[serde(default)]
    pub targets: Vec<String>,
}

/// Opaque credential forwarded to whatever opens the connection
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "type")]
    pub credential_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Never written back out or printed
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("credential_type", &self.credential_type)
            .field("user", &self.user)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub backend: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discover: Option<Discovery>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub credentials: Vec<Credential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::azure()
    }
}

impl Config {
    /// Empty Azure API connection
    pub fn azure() -> Self {
        Self {
            backend: BACKEND_AZURE.to_string(),
            host: None,
            insecure: false,
            discover: None,
            options: BTreeMap::new(),
            credentials: Vec::new(),
            platform_id: None,
        }
    }

    /// OS-level connection to a host (used for VM public addresses)
    pub fn ssh(host: impl Into<String>) -> Self {
        Self {
            backend: BACKEND_SSH.to_string(),
            host: Some(host.into()),
            insecure: true,
            ..Self::azure()
        }
    }

    /// Set the discovery targets
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.discover = Some(Discovery {
            targets: targets.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Set a connection option
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.credentials.push(credential);
        self
    }

    /// Requested discovery targets, empty when discovery is not set
    pub fn targets(&self) -> &[String] {
        self.discover
            .as_ref()
            .map(|d| d.targets.as_slice())
            .unwrap_or_default()
    }

    /// Subscription include/exclude filter from the connection options
    pub fn filter(&self) -> Filter {
        Filter::from_options(&self.options)
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.options.get(OPTION_SUBSCRIPTION_ID).map(String::as_str)
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.options.get(OPTION_TENANT_ID).map(String::as_str)
    }

    /// Deep clone with the discovery directive cleared
    pub fn clone_without_discovery(&self) -> Self {
        let mut cfg = self.clone();
        cfg.discover = None;
        cfg
    }
}

/// Derive the connection config for a subscription
///
/// The result is bound to the subscription (and its tenant when known) and
/// may be used by the subscription asset or anything discovered inside it.
pub fn scope_config(root: &Config, scope: &Scope) -> Config {
    let mut cfg = root.clone_without_discovery();
    cfg.options
        .insert(OPTION_SUBSCRIPTION_ID.to_string(), scope.id.clone());
    if !scope.tenant_id.is_empty() {
        cfg.options
            .insert(OPTION_TENANT_ID.to_string(), scope.tenant_id.clone());
    }
    cfg
}

/// Derive the connection config for one discovered asset
pub fn scope_config_for_asset(root: &Config, platform_id: &str) -> Config {
    let mut cfg = root.clone_without_discovery();
    cfg.platform_id = Some(platform_id.to_string());
    cfg
}

/// What to do when a (target, subscription) task fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartialFailurePolicy {
    /// First failure cancels everything; no partial inventory
    #[default]
    AbortAll,
    /// Keep going, return the assets that succeeded alongside every error
    CollectErrors,
}

impl FromStr for PartialFailurePolicy {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort-all" | "abort" => Ok(Self::AbortAll),
            "collect-errors" | "collect" => Ok(Self::CollectErrors),
            other => Err(DiscoveryError::InvalidConfig(format!(
                "unknown partial failure policy: {}",
                other
            ))),
        }
    }
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySettings {
    /// Maximum (target, subscription) tasks in flight
    pub concurrency: usize,
    /// Upper bound for a single discoverer invocation
    pub timeout: Option<Duration>,
    pub failure_policy: PartialFailurePolicy,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            timeout: None,
            failure_policy: PartialFailurePolicy::AbortAll,
        }
    }
}

impl DiscoverySettings {
    /// Load settings from environment variables
    ///
    /// - AZURE_DISCOVERY_CONCURRENCY (default 8)
    /// - AZURE_DISCOVERY_TIMEOUT_SECS (unset: no timeout)
    /// - AZURE_DISCOVERY_FAILURE_POLICY (`abort-all` | `collect-errors`)
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();

        if let Ok(v) = env::var("AZURE_DISCOVERY_CONCURRENCY") {
            settings.concurrency = v
                .parse()
                .context("AZURE_DISCOVERY_CONCURRENCY must be a positive integer")?;
        }
        if let Ok(v) = env::var("AZURE_DISCOVERY_TIMEOUT_SECS") {
            let secs: u64 = v
                .parse()
                .context("AZURE_DISCOVERY_TIMEOUT_SECS must be an integer")?;
            settings.timeout = Some(Duration::from_secs(secs));
        }
        if let Ok(v) = env::var("AZURE_DISCOVERY_FAILURE_POLICY") {
            settings.failure_policy = v.parse()?;
        }

        Ok(settings.normalized())
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self.normalized()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn failure_policy(mut self, policy: PartialFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    fn normalized(mut self) -> Self {
        self.concurrency = self.concurrency.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Config {
        Config::azure()
            .with_targets(["auto"])
            .option(OPTION_CLIENT_ID, "client-1")
            .option(OPTION_SUBSCRIPTIONS, "sub-a")
            .credential(Credential {
                credential_type: "client_secret".to_string(),
                user: Some("client-1".to_string()),
                secret: Some("hunter2".to_string()),
            })
    }

    #[test]
    fn test_scope_config_sets_subscription_and_clears_discovery() {
        let root = root();
        let cfg = scope_config(&root, &Scope::new("sub-a", "tenant-1", "A"));

        assert!(cfg.discover.is_none());
        assert_eq!(cfg.subscription_id(), Some("sub-a"));
        assert_eq!(cfg.tenant_id(), Some("tenant-1"));
        assert_eq!(cfg.options.get(OPTION_CLIENT_ID).map(String::as_str), Some("client-1"));
        assert_eq!(cfg.credentials, root.credentials);
    }

    #[test]
    fn test_scope_config_never_mutates_root() {
        let root = root();
        let before = root.clone();

        let mut a = scope_config(&root, &Scope::new("sub-a", "t", "A"));
        let b = scope_config(&root, &Scope::new("sub-b", "t", "B"));
        a.options.insert("extra".to_string(), "x".to_string());
        a.credentials.clear();

        assert_eq!(root, before);
        assert_eq!(b.subscription_id(), Some("sub-b"));
        assert!(!b.options.contains_key("extra"));
        assert_eq!(b.credentials.len(), 1);
    }

    #[test]
    fn test_scope_config_without_tenant() {
        let cfg = scope_config(&root(), &Scope::new("sub-a", "", "A"));
        assert_eq!(cfg.tenant_id(), None);
    }

    #[test]
    fn test_asset_config_stamps_platform_id() {
        let sub = scope_config(&root(), &Scope::new("sub-a", "t", "A"));
        let cfg = scope_config_for_asset(&sub, "//platformid/x");

        assert_eq!(cfg.platform_id.as_deref(), Some("//platformid/x"));
        assert!(cfg.discover.is_none());
        assert_eq!(cfg.subscription_id(), Some("sub-a"));
        assert!(sub.platform_id.is_none());
    }

    #[test]
    fn test_secret_not_serialized() {
        let json = serde_json::to_string(&root()).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("client_secret"));
    }

    #[test]
    fn test_secret_not_in_debug_output() {
        let cfg = scope_config(&root(), &Scope::new("sub-a", "t", "A"));
        let debug = format!("{:?}", cfg);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("client_secret"));
    }

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!(
            "collect-errors".parse::<PartialFailurePolicy>().unwrap(),
            PartialFailurePolicy::CollectErrors
        );
        assert_eq!(
            " Abort-All ".parse::<PartialFailurePolicy>().unwrap(),
            PartialFailurePolicy::AbortAll
        );
        assert!("sometimes".parse::<PartialFailurePolicy>().is_err());
    }

    #[test]
    fn test_settings_concurrency_floor() {
        let settings = DiscoverySettings::default().concurrency(0);
        assert_eq!(settings.concurrency, 1);
    }
}
