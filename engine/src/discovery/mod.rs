//! Azure Asset Discovery
//!
//! Enumerates the subscriptions reachable with the current credentials,
//! discovers the requested resource kinds inside each one, and normalizes
//! every object into an [`Asset`] keyed by a stable platform id.
//!
//! ## Pipeline
//!
//! - **Scopes**: subscription listing plus include/exclude filter
//! - **Targets**: alias expansion of the requested discovery targets
//! - **Discoverers**: one per target, paging through a resource lister
//! - **Assembler**: classification, labels and a scoped connection per asset
//! - **Aggregator**: bounded-concurrency fan out and the final inventory
//!
//! Listing is abstracted behind [`ScopeLister`] and [`ClientFactory`];
//! [`arm::ArmClient`] talks to Azure Resource Manager and
//! [`mock::MockCloud`] serves fixed data.

pub mod aggregator;
pub mod arm;
pub mod assembler;
pub mod config;
pub mod discoverers;
pub mod error;
pub mod mock;
pub mod platform;
pub mod scopes;
pub mod targets;
pub mod types;

pub use aggregator::{AggregatorState, DiscoveryReport, InventoryAggregator};
pub use config::{Config, DiscoverySettings, PartialFailurePolicy};
pub use discoverers::{ClientFactory, Discoverer, Discoverers, ResourceKind, ResourceLister};
pub use error::DiscoveryError;
pub use scopes::{Filter, ScopeLister};
pub use types::{Asset, Inventory, Scope};
