//! Azure Inventory Engine Library
//!
//! Discovers Azure subscriptions and resources into a normalized inventory.

pub mod discovery;

pub use discovery::arm::ArmClient;
pub use discovery::mock::MockCloud;
pub use discovery::{
    Config, DiscoveryError, DiscoveryReport, DiscoverySettings, Inventory, InventoryAggregator,
};
