use std::{
    fmt::{Debug, Display},
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{FuelType, volume::Volume};

static NEXT_UNIT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a dispensing unit. Registration is idempotent by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub u64);

impl UnitId {
    /// Hands out a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_UNIT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unit-{}", self.0)
    }
}

/// A physical dispensing unit.
///
/// The station guarantees that `withdraw` is never called concurrently on one unit and never
/// with more than [`DispensingUnit::remaining`].
#[async_trait::async_trait]
pub trait DispensingUnit: Send + Sync + Debug {
    fn id(&self) -> UnitId;

    fn fuel_type(&self) -> FuelType;

    /// Current remaining capacity. Must not block.
    fn remaining(&self) -> Volume;

    /// Takes `amount` out of the unit, finishing after a delay proportional to `amount`.
    async fn withdraw(&self, amount: Volume) -> Result<(), eyre::Report>;
}

/// An in-memory pump that dispenses at a fixed rate.
#[derive(Debug)]
pub struct SimulatedPump {
    id: UnitId,
    fuel: FuelType,
    litres_per_second: f64,
    remaining: Mutex<Volume>,
    busy: AtomicBool,
    overlaps: AtomicUsize,
    withdrawals: AtomicUsize,
}

impl SimulatedPump {
    pub const DEFAULT_LITRES_PER_SECOND: f64 = 10.0;

    pub fn new(fuel: FuelType, capacity: Volume) -> Self {
        Self::with_rate(fuel, capacity, Self::DEFAULT_LITRES_PER_SECOND)
    }

    /// Dispenses `litres_per_second`. A non-positive or non-finite rate dispenses instantly.
    pub fn with_rate(fuel: FuelType, capacity: Volume, litres_per_second: f64) -> Self {
        Self {
            id: UnitId::next(),
            fuel,
            litres_per_second,
            remaining: Mutex::new(capacity),
            busy: AtomicBool::new(false),
            overlaps: AtomicUsize::new(0),
            withdrawals: AtomicUsize::new(0),
        }
    }

    /// How many withdrawals started while another one was still running.
    pub fn overlapping_withdrawals(&self) -> usize {
        self.overlaps.load(Ordering::Acquire)
    }

    pub fn completed_withdrawals(&self) -> usize {
        self.withdrawals.load(Ordering::Acquire)
    }

    fn duration_for(&self, amount: Volume) -> Result<Duration, eyre::Report> {
        if !self.litres_per_second.is_finite() || self.litres_per_second <= 0.0 {
            return Ok(Duration::ZERO);
        }
        Duration::try_from_secs_f64(amount.as_litres() / self.litres_per_second).map_err(|error| {
            eyre::eyre!(
                "pump {} cannot dispense {} at {} L/s: {error}",
                self.id,
                amount,
                self.litres_per_second
            )
        })
    }
}

#[async_trait::async_trait]
impl DispensingUnit for SimulatedPump {
    fn id(&self) -> UnitId {
        self.id
    }

    fn fuel_type(&self) -> FuelType {
        self.fuel
    }

    fn remaining(&self) -> Volume {
        *self.remaining.lock()
    }

    async fn withdraw(&self, amount: Volume) -> Result<(), eyre::Report> {
        if self.busy.swap(true, Ordering::AcqRel) {
            self.overlaps.fetch_add(1, Ordering::AcqRel);
        }

        let outcome: Result<(), eyre::Report> = async {
            if amount > self.remaining() {
                return Err(eyre::eyre!(
                    "pump {} holds {} but {} was requested",
                    self.id,
                    self.remaining(),
                    amount
                ));
            }
            tokio::time::sleep(self.duration_for(amount)?).await;
            let mut remaining = self.remaining.lock();
            *remaining = remaining.checked_sub(amount).ok_or_else(|| {
                eyre::eyre!("pump {} was drained while dispensing", self.id)
            })?;
            Ok(())
        }
        .await;

        if outcome.is_ok() {
            self.withdrawals.fetch_add(1, Ordering::AcqRel);
        }
        self.busy.store(false, Ordering::Release);
        outcome
    }
}
