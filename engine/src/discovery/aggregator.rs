//! Inventory Aggregator
//!
//! Drives one discovery run: enumerate subscriptions, resolve targets, fan out
//! (target × subscription) tasks with bounded concurrency, assemble assets and
//! collect them into a single inventory.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::assembler::{assemble, subscription_asset};
use super::config::{Config, DiscoverySettings, PartialFailurePolicy};
use super::discoverers::{ClientFactory, Discoverer, Discoverers};
use super::error::DiscoveryError;
use super::scopes::{list_scopes, ScopeLister};
use super::targets::{resolve_targets, DISCOVERY_SUBSCRIPTIONS};
use super::types::{Asset, Inventory, Scope};

/// Aggregator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregatorState {
    Init,
    ScopesResolved,
    TargetsResolved,
    Discovering,
    Done,
    Failed,
}

impl std::fmt::Display for AggregatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregatorState::Init => write!(f, "init"),
            AggregatorState::ScopesResolved => write!(f, "scopes-resolved"),
            AggregatorState::TargetsResolved => write!(f, "targets-resolved"),
            AggregatorState::Discovering => write!(f, "discovering"),
            AggregatorState::Done => write!(f, "done"),
            AggregatorState::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one discovery run
#[derive(Debug)]
pub struct DiscoveryReport {
    pub inventory: Inventory,
    /// Task failures; only ever non-empty under `CollectErrors`
    pub errors: Vec<DiscoveryError>,
    /// Requested targets no discoverer serves
    pub skipped_targets: Vec<String>,
    /// Non-string tag values dropped while building labels
    pub dropped_tag_values: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DiscoveryReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

struct TaskOutcome {
    assets: Vec<Asset>,
    dropped_tags: usize,
}

/// Orchestrates scopes, targets, discoverers and the assembler
pub struct InventoryAggregator {
    scopes: Arc<dyn ScopeLister>,
    discoverers: Discoverers,
    root: Config,
    settings: DiscoverySettings,
    state: watch::Sender<AggregatorState>,
}

impl InventoryAggregator {
    pub fn new(scopes: Arc<dyn ScopeLister>, clients: Arc<dyn ClientFactory>, root: Config) -> Self {
        let (state, _) = watch::channel(AggregatorState::Init);
        Self {
            scopes,
            discoverers: Discoverers::standard(clients),
            root,
            settings: DiscoverySettings::default(),
            state,
        }
    }

    pub fn with_settings(mut self, settings: DiscoverySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the discoverer set
    pub fn with_discoverers(mut self, discoverers: Discoverers) -> Self {
        self.discoverers = discoverers;
        self
    }

    pub fn subscribe_state(&self) -> watch::Receiver<AggregatorState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> AggregatorState {
        *self.state.borrow()
    }

    fn transition(&self, next: AggregatorState) {
        let prev = self.state.send_replace(next);
        debug!(from = %prev, to = %next, "Aggregator state transition");
    }

    fn fail(&self, err: DiscoveryError) -> DiscoveryError {
        error!(error = %err, "Discovery failed");
        self.transition(AggregatorState::Failed);
        err
    }

    /// Run discovery and return just the inventory
    ///
    /// Under `CollectErrors` the inventory may be partial; use [`Self::run`]
    /// to see what failed.
    pub async fn discover(&self) -> Result<Inventory, DiscoveryError> {
        self.run().await.map(|report| report.inventory)
    }

    /// Run discovery
    ///
    /// Under `AbortAll` the first failing task cancels everything still in
    /// flight and its error is returned; no partial inventory is produced.
    pub async fn run(&self) -> Result<DiscoveryReport, DiscoveryError> {
        let started_at = Utc::now();
        self.transition(AggregatorState::Init);

        let scopes = match list_scopes(self.scopes.as_ref(), &self.root.filter()).await {
            Ok(scopes) => scopes,
            Err(e) => return Err(self.fail(e)),
        };
        self.transition(AggregatorState::ScopesResolved);

        let targets = resolve_targets(self.root.targets());
        info!(targets = ?targets, "Resolved discovery targets");
        self.transition(AggregatorState::TargetsResolved);

        let mut inventory = Inventory::new();
        let mut skipped_targets = Vec::new();
        let mut tasks: Vec<(Arc<dyn Discoverer>, Scope)> = Vec::new();

        for target in &targets {
            if target == DISCOVERY_SUBSCRIPTIONS {
                inventory.extend(scopes.iter().map(|scope| subscription_asset(scope, &self.root)));
                continue;
            }
            match self.discoverers.get(target) {
                Some(discoverer) => {
                    tasks.extend(scopes.iter().map(|scope| (discoverer.clone(), scope.clone())));
                }
                None => {
                    warn!(target_name = %target, "Unknown discovery target, skipping");
                    skipped_targets.push(target.clone());
                }
            }
        }

        self.transition(AggregatorState::Discovering);

        let mut results = stream::iter(tasks)
            .map(|(discoverer, scope)| self.run_task(discoverer, scope))
            .buffer_unordered(self.settings.concurrency);

        let mut errors = Vec::new();
        let mut dropped_tag_values = 0;

        while let Some(result) = results.next().await {
            match result {
                Ok(outcome) => {
                    dropped_tag_values += outcome.dropped_tags;
                    inventory.extend(outcome.assets);
                }
                Err(e) => match self.settings.failure_policy {
                    // returning drops `results`, cancelling in-flight tasks
                    PartialFailurePolicy::AbortAll => return Err(self.fail(e)),
                    PartialFailurePolicy::CollectErrors => {
                        error!(error = %e, "Discovery task failed, continuing");
                        errors.push(e);
                    }
                },
            }
        }

        inventory.sort();
        self.transition(AggregatorState::Done);

        info!(
            assets = inventory.len(),
            errors = errors.len(),
            skipped = skipped_targets.len(),
            "Discovery complete"
        );

        Ok(DiscoveryReport {
            inventory,
            errors,
            skipped_targets,
            dropped_tag_values,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn run_task(
        &self,
        discoverer: Arc<dyn Discoverer>,
        scope: Scope,
    ) -> Result<TaskOutcome, DiscoveryError> {
        let target = discoverer.target();

        let found = match self.settings.timeout {
            Some(after) => tokio::time::timeout(after, discoverer.discover(&scope))
                .await
                .map_err(|_| DiscoveryError::Timeout {
                    target: target.to_string(),
                    scope: scope.id.clone(),
                    after,
                })??,
            None => discoverer.discover(&scope).await?,
        };

        let mut assets = Vec::with_capacity(found.len());
        let mut dropped_tags = 0;
        for resource in found {
            let (asset, dropped) = assemble(resource, &scope, &self.root)?;
            dropped_tags += dropped;
            assets.push(asset);
        }

        info!(
            target_name = target,
            subscription = %scope.id,
            assets = assets.len(),
            "Discovered assets"
        );

        Ok(TaskOutcome {
            assets,
            dropped_tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::assembler::{REGION_LABEL, SUBSCRIPTION_LABEL};
    use crate::discovery::config::{OPTION_SUBSCRIPTIONS, OPTION_SUBSCRIPTION_ID};
    use crate::discovery::discoverers::ResourceKind;
    use crate::discovery::mock::MockCloud;
    use crate::discovery::platform::{instance_platform_id, PLATFORM_ID_PREFIX};
    use crate::discovery::targets::DISCOVERY_INSTANCES;
    use crate::discovery::types::RawResource;
    use std::time::Duration;

    fn vm_id(sub: &str, name: &str) -> String {
        format!("/subscriptions/{sub}/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/{name}")
    }

    fn aggregator(cloud: MockCloud, root: Config) -> InventoryAggregator {
        let cloud = Arc::new(cloud);
        InventoryAggregator::new(cloud.clone(), cloud, root)
    }

    /// Five subscriptions with one VM each
    fn five_subscriptions() -> MockCloud {
        (1..=5).fold(MockCloud::new(), |cloud, i| {
            let sub = format!("sub-{i}");
            cloud
                .with_scope(Scope::new(&sub, "t", &sub))
                .with_resource(
                    &sub,
                    ResourceKind::VirtualMachines,
                    RawResource::new(vm_id(&sub, "vm"), "vm", "eastus"),
                )
        })
    }

    #[tokio::test]
    async fn test_end_to_end_single_vm() {
        let vm1 = vm_id("sub-a", "vm1");
        let cloud = MockCloud::new()
            .with_scope(Scope::new("sub-a", "t", "A"))
            .with_scope(Scope::new("sub-b", "t", "B"))
            .with_resource(
                "sub-a",
                ResourceKind::VirtualMachines,
                RawResource::new(&vm1, "vm1", "eastus"),
            )
            .with_resource(
                "sub-b",
                ResourceKind::VirtualMachines,
                RawResource::new(vm_id("sub-b", "other"), "other", "westus"),
            );
        let root = Config::azure()
            .with_targets(["vms"])
            .option(OPTION_SUBSCRIPTIONS, "sub-a");

        let agg = aggregator(cloud, root);
        let inventory = agg.discover().await.unwrap();

        assert_eq!(inventory.len(), 1);
        let asset = &inventory.assets[0];
        assert!(asset
            .platform_ids
            .contains(&format!("{PLATFORM_ID_PREFIX}{vm1}")));
        assert!(asset.platform_ids.contains(&vm1));
        assert_eq!(asset.label(REGION_LABEL), Some("eastus"));
        assert_eq!(asset.label(SUBSCRIPTION_LABEL), Some("sub-a"));
        assert_eq!(
            asset.connections[0].options.get(OPTION_SUBSCRIPTION_ID).map(String::as_str),
            Some("sub-a")
        );
        assert!(asset.connections[0].discover.is_none());
        assert_eq!(agg.state(), AggregatorState::Done);
    }

    #[tokio::test]
    async fn test_failure_aborts_whole_run() {
        let cloud = five_subscriptions().fail_listing("sub-3", ResourceKind::VirtualMachines, "boom");
        let agg = aggregator(cloud, Config::azure().with_targets([DISCOVERY_INSTANCES]))
            .with_settings(DiscoverySettings::default().concurrency(1));
        let state = agg.subscribe_state();

        let err = agg.discover().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Discoverer { ref scope, .. } if scope == "sub-3"));
        assert_eq!(*state.borrow(), AggregatorState::Failed);
    }

    #[tokio::test]
    async fn test_first_failure_cancels_remaining_tasks() {
        let cloud = five_subscriptions().fail_listing("sub-1", ResourceKind::VirtualMachines, "boom");
        let calls = cloud.clone();
        let agg = aggregator(cloud, Config::azure().with_targets([DISCOVERY_INSTANCES]))
            .with_settings(DiscoverySettings::default().concurrency(1));

        assert!(agg.run().await.is_err());
        assert_eq!(calls.calls(), 1);
    }

    #[tokio::test]
    async fn test_collect_errors_keeps_successes() {
        let cloud = five_subscriptions().fail_listing("sub-3", ResourceKind::VirtualMachines, "boom");
        let agg = aggregator(cloud, Config::azure().with_targets([DISCOVERY_INSTANCES])).with_settings(
            DiscoverySettings::default().failure_policy(PartialFailurePolicy::CollectErrors),
        );

        let report = agg.run().await.unwrap();
        assert_eq!(report.inventory.len(), 4);
        assert_eq!(report.errors.len(), 1);
        assert!(!report.is_complete());
        assert!(report.inventory.find(&instance_platform_id(&vm_id("sub-3", "vm"))).is_none());
        assert!(report.inventory.find(&instance_platform_id(&vm_id("sub-2", "vm"))).is_some());
    }

    #[tokio::test]
    async fn test_unknown_target_is_skipped() {
        let root = Config::azure().with_targets(["disks", DISCOVERY_INSTANCES]);
        let report = aggregator(five_subscriptions(), root).run().await.unwrap();

        assert_eq!(report.skipped_targets, vec!["disks".to_string()]);
        assert_eq!(report.inventory.len(), 5);
    }

    #[tokio::test]
    async fn test_auto_includes_subscription_assets() {
        let report = aggregator(five_subscriptions(), Config::azure().with_targets(["auto"]))
            .run()
            .await
            .unwrap();

        let subscriptions = report
            .inventory
            .assets
            .iter()
            .filter(|a| a.platform.name == "azure")
            .count();
        assert_eq!(subscriptions, 5);
        assert_eq!(report.inventory.len(), 10);
    }

    #[tokio::test]
    async fn test_repeated_runs_are_identical() {
        let cloud = five_subscriptions()
            .with_resource(
                "sub-2",
                ResourceKind::VirtualMachines,
                RawResource::new(vm_id("sub-2", "vm-b"), "vm-b", "westus").tag("env", "dev"),
            )
            .page_size(1);
        let agg = aggregator(cloud, Config::azure().with_targets(["all"]))
            .with_settings(DiscoverySettings::default().concurrency(4));

        let first = serde_json::to_string(&agg.discover().await.unwrap()).unwrap();
        let second = serde_json::to_string(&agg.discover().await.unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_slow_discoverer_times_out() {
        let cloud = five_subscriptions().delay_listing(
            "sub-2",
            ResourceKind::VirtualMachines,
            Duration::from_secs(30),
        );
        let agg = aggregator(cloud, Config::azure().with_targets([DISCOVERY_INSTANCES])).with_settings(
            DiscoverySettings::default()
                .timeout(Duration::from_millis(50))
                .failure_policy(PartialFailurePolicy::CollectErrors),
        );

        let report = agg.run().await.unwrap();
        assert_eq!(report.inventory.len(), 4);
        assert!(matches!(
            report.errors.as_slice(),
            [DiscoveryError::Timeout { scope, .. }] if scope == "sub-2"
        ));
    }

    #[tokio::test]
    async fn test_scope_failure_fails_before_discovery() {
        let cloud = five_subscriptions().fail_scope_listing("unauthorized");
        let agg = aggregator(cloud.clone(), Config::azure().with_targets(["all"]));

        let err = agg.run().await.unwrap_err();
        assert!(err.is_scope_resolution());
        assert_eq!(agg.state(), AggregatorState::Failed);
        assert_eq!(cloud.calls(), 0);
    }

    #[tokio::test]
    async fn test_dropped_tags_are_counted() {
        let cloud = MockCloud::new()
            .with_scope(Scope::new("sub-a", "t", "A"))
            .with_resource(
                "sub-a",
                ResourceKind::VirtualMachines,
                RawResource::new(vm_id("sub-a", "vm1"), "vm1", "eastus")
                    .tag("cost", 12)
                    .tag("env", "prod"),
            );
        let report = aggregator(cloud, Config::azure().with_targets([DISCOVERY_INSTANCES]))
            .run()
            .await
            .unwrap();
        assert_eq!(report.dropped_tag_values, 1);
    }

    #[tokio::test]
    async fn test_all_targets_keep_platform_ids_unique() {
        let cloud = MockCloud::new()
            .with_scope(Scope::new("sub-a", "t", "A"))
            .with_resource(
                "sub-a",
                ResourceKind::VirtualMachines,
                RawResource::new(vm_id("sub-a", "vm1"), "vm1", "eastus").public_ip("20.1.2.3"),
            );
        let report = aggregator(cloud, Config::azure().with_targets(["all"]))
            .run()
            .await
            .unwrap();

        let mut ids: Vec<&str> = report.inventory.assets.iter().map(|a| a.platform_id()).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);

        let mut vm_platforms: Vec<&str> = report
            .inventory
            .assets
            .iter()
            .filter(|a| a.platform.name.starts_with("azure-compute"))
            .map(|a| a.platform.name.as_str())
            .collect();
        vm_platforms.sort();
        assert_eq!(vm_platforms, vec!["azure-compute-vm", "azure-compute-vm-api"]);
    }

    #[tokio::test]
    async fn test_inventory_is_sorted() {
        let report = aggregator(five_subscriptions(), Config::azure().with_targets(["auto"]))
            .with_settings(DiscoverySettings::default().concurrency(5))
            .run()
            .await
            .unwrap();

        let ids: Vec<&str> = report.inventory.assets.iter().map(|a| a.platform_id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
