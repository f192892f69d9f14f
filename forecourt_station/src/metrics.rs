use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::{price::UnitPrice, volume::Volume};

/// An `f64` register that can be read, written and added to from many threads.
///
/// The value lives in an [`AtomicU64`] as its IEEE-754 bit pattern, so every read observes a
/// value some writer actually stored.
#[derive(Debug, Default)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }

    /// Adds `delta` and returns the new value.
    pub fn add_and_get(&self, delta: f64) -> f64 {
        let mut current = self.bits.load(Ordering::Acquire);
        loop {
            let next = f64::from_bits(current) + delta;
            match self.bits.compare_exchange_weak(
                current,
                next.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Point-in-time copy of the station counters.
///
/// Each field is read atomically, the struct as a whole is not a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub revenue: f64,
    pub sales: u64,
    pub no_capacity_cancellations: u64,
    pub too_expensive_cancellations: u64,
}

#[derive(Debug, Default)]
pub struct StationMetrics {
    revenue: AtomicF64,
    sales: AtomicU64,
    no_capacity: AtomicU64,
    too_expensive: AtomicU64,
}

impl StationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_sale(&self, price: UnitPrice, amount: Volume) -> f64 {
        let revenue = self.revenue.add_and_get(price.value() * amount.as_litres());
        self.sales.fetch_add(1, Ordering::AcqRel);
        revenue
    }

    pub(crate) fn record_no_capacity(&self) {
        self.no_capacity.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_too_expensive(&self) {
        self.too_expensive.fetch_add(1, Ordering::AcqRel);
    }

    pub fn revenue(&self) -> f64 {
        self.revenue.get()
    }

    pub fn sales(&self) -> u64 {
        self.sales.load(Ordering::Acquire)
    }

    pub fn no_capacity_cancellations(&self) -> u64 {
        self.no_capacity.load(Ordering::Acquire)
    }

    pub fn too_expensive_cancellations(&self) -> u64 {
        self.too_expensive.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            revenue: self.revenue(),
            sales: self.sales(),
            no_capacity_cancellations: self.no_capacity_cancellations(),
            too_expensive_cancellations: self.too_expensive_cancellations(),
        }
    }
}
