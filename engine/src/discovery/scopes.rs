//! Subscription Enumeration
//!
//! Lists every subscription reachable with the current credentials and
//! narrows the result with the include/exclude filter from the root config.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::config::{OPTION_SUBSCRIPTIONS, OPTION_SUBSCRIPTIONS_EXCLUDE};
use super::error::DiscoveryError;
use super::types::{Page, Scope};

/// Paginated subscription listing capability
#[async_trait]
pub trait ScopeLister: Send + Sync {
    /// Fetch one page; `page` is the continuation token of the previous page
    async fn list_scopes(&self, page: Option<String>) -> Result<Page<Scope>>;
}

/// Subscription include/exclude filter
///
/// A non-empty include list wins outright: exclude is ignored whenever
/// include has entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Filter {
    pub fn include<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: ids.into_iter().map(Into::into).collect(),
            exclude: Vec::new(),
        }
    }

    pub fn exclude<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: Vec::new(),
            exclude: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from the `subscriptions` / `subscriptions-exclude` options
    pub fn from_options(options: &BTreeMap<String, String>) -> Self {
        Self {
            include: split_ids(options.get(OPTION_SUBSCRIPTIONS)),
            exclude: split_ids(options.get(OPTION_SUBSCRIPTIONS_EXCLUDE)),
        }
    }

    pub fn matches(&self, id: &str) -> bool {
        if !self.include.is_empty() {
            return self.include.iter().any(|i| i == id);
        }
        if !self.exclude.is_empty() {
            return !self.exclude.iter().any(|e| e == id);
        }
        true
    }
}

fn split_ids(raw: Option<&String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Page through the lister and keep the subscriptions that pass `filter`
///
/// Zero surviving subscriptions is an error: nothing can be discovered.
pub async fn list_scopes(
    lister: &dyn ScopeLister,
    filter: &Filter,
) -> Result<Vec<Scope>, DiscoveryError> {
    let mut scopes = Vec::new();
    let mut seen = 0usize;
    let mut token: Option<String> = None;

    loop {
        let page = lister
            .list_scopes(token.take())
            .await
            .map_err(|source| DiscoveryError::ScopeEnumeration { source })?;

        seen += page.items.len();
        for scope in page.items {
            if filter.matches(&scope.id) {
                scopes.push(scope);
            } else {
                debug!(subscription = %scope.id, "Subscription filtered out");
            }
        }

        match page.next {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    info!(
        listed = seen,
        kept = scopes.len(),
        "Enumerated Azure subscriptions"
    );

    if scopes.is_empty() {
        return Err(DiscoveryError::NoMatchingScopes);
    }
    Ok(scopes)
}
