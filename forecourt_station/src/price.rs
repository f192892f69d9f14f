use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{ConcurrentMap, FuelType, error::StationError};

/// Price of one litre. Always finite and non-negative.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct UnitPrice(f64);

impl UnitPrice {
    pub const FREE: Self = Self(0.0);

    pub fn new(value: f64) -> Result<Self, StationError> {
        if value.is_finite() && value >= 0.0 {
            Ok(Self(value))
        } else {
            Err(StationError::InvalidPrice(value))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for UnitPrice {
    type Error = StationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UnitPrice> for f64 {
    fn from(price: UnitPrice) -> Self {
        price.0
    }
}

impl Display for UnitPrice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Fuel type to unit price.
///
/// Writers may replace a price at any time; a request reads its price exactly once.
#[derive(Debug, Default)]
pub struct PriceTable {
    prices: ConcurrentMap<FuelType, UnitPrice>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, fuel: FuelType, price: UnitPrice) -> Option<UnitPrice> {
        self.prices.insert(fuel, price)
    }

    pub fn get(&self, fuel: FuelType) -> Result<UnitPrice, StationError> {
        self.prices
            .get(&fuel)
            .map(|price| *price)
            .ok_or(StationError::UnpricedType(fuel))
    }
}
