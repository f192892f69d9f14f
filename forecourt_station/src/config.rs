use serde::Deserialize;

use crate::{
    FuelType, StableMap,
    error::{StationError, StationResult},
    price::UnitPrice,
    unit::SimulatedPump,
    volume::Volume,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PumpConfig {
    pub fuel: FuelType,
    /// Initial capacity in litres.
    pub capacity: f64,
}

/// Station layout, usually read from a TOML file:
///
/// ```toml
/// litres_per_second = 10.0
///
/// [prices]
/// regular = 1.0
///
/// [[pumps]]
/// fuel = "regular"
/// capacity = 10.0
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StationConfig {
    #[serde(default = "default_litres_per_second")]
    pub litres_per_second: f64,
    #[serde(default)]
    pub prices: StableMap<FuelType, f64>,
    #[serde(default)]
    pub pumps: Vec<PumpConfig>,
}

fn default_litres_per_second() -> f64 {
    SimulatedPump::DEFAULT_LITRES_PER_SECOND
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            litres_per_second: default_litres_per_second(),
            prices: StableMap::new(),
            pumps: Vec::new(),
        }
    }
}

impl StationConfig {
    pub fn from_toml_str(content: &str) -> StationResult<Self> {
        let config: StationConfig =
            toml::from_str(content).map_err(|error| StationError::Config(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StationResult<()> {
        if !self.litres_per_second.is_finite() || self.litres_per_second <= 0.0 {
            return Err(StationError::Config(format!(
                "`litres_per_second` must be positive, got {}",
                self.litres_per_second
            )));
        }
        for (fuel, price) in &self.prices {
            UnitPrice::new(*price).map_err(|error| {
                StationError::Config(format!("price of `{fuel}`: {error}"))
            })?;
        }
        for (index, pump) in self.pumps.iter().enumerate() {
            Volume::from_litres(pump.capacity).map_err(|error| {
                StationError::Config(format!("capacity of pump #{index}: {error}"))
            })?;
        }
        Ok(())
    }
}
