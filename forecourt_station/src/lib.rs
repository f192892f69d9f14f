use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

pub mod config;
pub mod error;
pub mod metrics;
pub mod price;
pub mod queue;
pub mod station;
pub mod ticket;
pub mod unit;
pub mod volume;

pub use error::{StationError, StationResult};
pub use metrics::MetricsSnapshot;
pub use price::UnitPrice;
pub use queue::QueueStatus;
pub use station::Station;
pub use unit::{DispensingUnit, SimulatedPump, UnitId};
pub use volume::Volume;

/// The result of iteration of this map is not ordered.
///
/// Please do not rely on any specific order.
pub type ConcurrentMap<K, V> = ::dashmap::DashMap<K, V, ::ahash::RandomState>;

/// Iteration order is deterministic and sorted by key.
pub type StableMap<K, V> = ::std::collections::BTreeMap<K, V>;

/// A grade of fuel. Units of one grade are interchangeable for scheduling.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FuelType {
    Diesel,
    Regular,
    Super,
}

#[async_trait::async_trait]
pub trait FuelStation: Send + Sync {
    /// Registers a unit. Registering the same unit twice is a no-op that returns `false`.
    fn add_unit(&self, unit: Arc<dyn DispensingUnit>) -> bool;

    /// A point-in-time copy of every registered unit, by fuel type then registration order.
    fn units(&self) -> Vec<Arc<dyn DispensingUnit>>;

    fn set_price(&self, fuel: FuelType, price: UnitPrice);

    fn price(&self, fuel: FuelType) -> StationResult<UnitPrice>;

    /// Buys `amount` of `fuel` if it costs at most `max_price` per litre.
    ///
    /// Returns the unit price that was charged.
    async fn request(
        &self,
        fuel: FuelType,
        amount: Volume,
        max_price: UnitPrice,
    ) -> StationResult<UnitPrice>;

    fn total_revenue(&self) -> f64;

    fn sales_count(&self) -> u64;

    fn no_capacity_cancellations(&self) -> u64;

    fn too_expensive_cancellations(&self) -> u64;

    fn metrics(&self) -> MetricsSnapshot;

    fn queue_status(&self, fuel: FuelType) -> Vec<QueueStatus>;
}
