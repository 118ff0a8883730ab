//! Errors raised while building an inventory

use std::time::Duration;
use thiserror::Error;

/// Errors that can abort (or, under `CollectErrors`, be reported by) a discovery run
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Listing subscriptions failed
    #[error("failed to enumerate subscriptions: {source}")]
    ScopeEnumeration { source: anyhow::Error },

    /// Subscriptions were listed but none survived the filter
    #[error("cannot find an azure subscription with the provided credentials or the provided filters")]
    NoMatchingScopes,

    /// A discovered object has no entry in the platform table
    #[error("missing platform info for azure object service {service} type {object_type}")]
    Classification { service: String, object_type: String },

    /// A resource lister failed while paging
    #[error("discovering {target} in subscription {scope} failed: {source}")]
    Discoverer {
        target: String,
        scope: String,
        source: anyhow::Error,
    },

    /// A discoverer did not finish within the configured bound
    #[error("discovering {target} in subscription {scope} timed out after {after:?}")]
    Timeout {
        target: String,
        scope: String,
        after: Duration,
    },

    #[error("invalid azure resource id: {0}")]
    InvalidResourceId(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DiscoveryError {
    pub fn discoverer(target: &str, scope: &str, source: anyhow::Error) -> Self {
        DiscoveryError::Discoverer {
            target: target.to_string(),
            scope: scope.to_string(),
            source,
        }
    }

    /// Whether the error happened before any resource discovery started
    pub fn is_scope_resolution(&self) -> bool {
        matches!(
            self,
            DiscoveryError::ScopeEnumeration { .. } | DiscoveryError::NoMatchingScopes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_message_names_both_keys() {
        let err = DiscoveryError::Classification {
            service: "compute".to_string(),
            object_type: "disk".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("compute"));
        assert!(msg.contains("disk"));
    }

    #[test]
    fn test_discoverer_error_keeps_source_message() {
        let err = DiscoveryError::discoverer(
            "keyvaults-vaults",
            "sub-a",
            anyhow::anyhow!("429 Too Many Requests"),
        );
        assert!(err.to_string().contains("429 Too Many Requests"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_scope_resolution());
    }
}
