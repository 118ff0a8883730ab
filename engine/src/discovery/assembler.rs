//! Asset Assembler
//!
//! Turns a discovered resource into a scanner-ready asset: classification,
//! platform id, labels, scoped connection and a never-empty name.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use super::config::{scope_config, scope_config_for_asset, Config};
use super::error::DiscoveryError;
use super::platform::{self, ResourceId};
use super::types::{
    Asset, AssetKind, AssetState, DiscoveredResource, Platform, Scope, RUNTIME_AZURE,
};

/// Owning subscription
pub const SUBSCRIPTION_LABEL: &str = "azure.mondoo.com/subscription";
/// Azure location
pub const REGION_LABEL: &str = "mondoo.com/location";
pub const RESOURCE_GROUP_LABEL: &str = "azure.mondoo.com/resourcegroup";
pub const TENANT_LABEL: &str = "azure.mondoo.com/tenant";

/// Region reported for subscription assets
const GLOBAL_REGION: &str = "global";

/// Keep string tag values, drop the rest
///
/// Returns the coerced labels and how many values were dropped.
pub fn coerce_tags(tags: &Map<String, Value>) -> (BTreeMap<String, String>, usize) {
    let mut labels = BTreeMap::new();
    let mut dropped = 0;

    for (key, value) in tags {
        match value.as_str() {
            Some(s) => {
                labels.insert(key.clone(), s.to_string());
            }
            None => dropped += 1,
        }
    }

    (labels, dropped)
}

/// Assemble one discovered resource into an asset
///
/// Label precedence, lowest first: native tags, discoverer labels, derived
/// region / subscription / resource group. The asset's connection is a fresh
/// clone of `root` bound to `scope` and stamped with the platform id.
///
/// Returns the asset and the number of tag values dropped during coercion.
pub fn assemble(
    resource: DiscoveredResource,
    scope: &Scope,
    root: &Config,
) -> Result<(Asset, usize), DiscoveryError> {
    let DiscoveredResource {
        descriptor,
        raw,
        extra_labels,
        extra_connections,
    } = resource;

    let info = platform::classify(&descriptor)?;
    let platform_id = info.platform_id(&descriptor.native_id);

    let (mut labels, dropped) = coerce_tags(&raw.tags);
    if dropped > 0 {
        debug!(
            resource = %descriptor.native_id,
            dropped,
            "Dropped non-string tag values"
        );
    }
    labels.extend(extra_labels);
    labels.insert(REGION_LABEL.to_string(), descriptor.region.clone());
    labels.insert(SUBSCRIPTION_LABEL.to_string(), descriptor.scope_id.clone());
    if let Ok(id) = ResourceId::parse(&descriptor.native_id) {
        labels.insert(RESOURCE_GROUP_LABEL.to_string(), id.resource_group);
    }

    let mut connections = vec![scope_config_for_asset(
        &scope_config(root, scope),
        &platform_id,
    )];
    connections.extend(extra_connections);

    let mut segments = vec![
        RUNTIME_AZURE.to_string(),
        scope.tenant_or_unknown().to_string(),
        scope.id.clone(),
        descriptor.service.clone(),
    ];
    if info.url_includes_type {
        segments.push(descriptor.object_type.clone());
    }

    let name = if raw.name.is_empty() {
        descriptor.native_id.clone()
    } else {
        raw.name
    };

    let asset = Asset {
        platform_ids: vec![platform_id, descriptor.native_id],
        name,
        platform: Platform {
            name: info.platform_name.to_string(),
            title: info.title.to_string(),
            kind: AssetKind::CloudObject,
            runtime: RUNTIME_AZURE.to_string(),
            technology_url_segments: segments,
        },
        labels,
        state: AssetState::Online,
        connections,
    };

    Ok((asset, dropped))
}

/// Asset for the subscription itself
pub fn subscription_asset(scope: &Scope, root: &Config) -> Asset {
    let platform_id = platform::subscription_platform_id(&scope.id);
    let display = if scope.display_name.is_empty() {
        &scope.id
    } else {
        &scope.display_name
    };

    let mut labels = BTreeMap::new();
    labels.insert(REGION_LABEL.to_string(), GLOBAL_REGION.to_string());
    labels.insert(SUBSCRIPTION_LABEL.to_string(), scope.id.clone());
    if !scope.tenant_id.is_empty() {
        labels.insert(TENANT_LABEL.to_string(), scope.tenant_id.clone());
    }

    Asset {
        platform_ids: vec![platform_id.clone()],
        name: format!("Azure subscription {}", display),
        platform: Platform {
            name: RUNTIME_AZURE.to_string(),
            title: "Azure Subscription".to_string(),
            kind: AssetKind::Api,
            runtime: RUNTIME_AZURE.to_string(),
            technology_url_segments: vec![
                RUNTIME_AZURE.to_string(),
                scope.tenant_or_unknown().to_string(),
                scope.id.clone(),
                "account".to_string(),
            ],
        },
        labels,
        state: AssetState::Online,
        connections: vec![scope_config_for_asset(
            &scope_config(root, scope),
            &platform_id,
        )],
    }
}
