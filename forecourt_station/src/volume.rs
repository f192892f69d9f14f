use std::{fmt::Display, iter::Sum};

use serde::{Deserialize, Serialize};

use crate::error::StationError;

pub type VolumeShares = u64;

/// How many shares make up one litre.
pub static SHARES_PER_LITRE: VolumeShares = 1_000_000;

/// A fixed-point fuel quantity, stored as micro-litres.
///
/// Capacity bookkeeping only ever adds and subtracts volumes, so keeping them as integers makes
/// `estimated_amount = real_amount - queued` exact no matter how many small requests pile up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Volume(VolumeShares);

impl Volume {
    pub const ZERO: Self = Self(0);

    pub const fn from_shares(value: VolumeShares) -> Self {
        Self(value)
    }

    pub const fn as_shares(&self) -> VolumeShares {
        self.0
    }

    /// Converts litres into shares, rounding to the nearest micro-litre.
    pub fn from_litres(litres: f64) -> Result<Self, StationError> {
        if !litres.is_finite() || litres < 0.0 {
            return Err(StationError::InvalidVolume(litres));
        }
        let shares = (litres * SHARES_PER_LITRE as f64).round();
        if shares > VolumeShares::MAX as f64 {
            return Err(StationError::InvalidVolume(litres));
        }
        Ok(Self(shares as VolumeShares))
    }

    pub fn as_litres(&self) -> f64 {
        self.0 as f64 / SHARES_PER_LITRE as f64
    }

    pub fn checked_add(&self, rhs: Volume) -> Option<Volume> {
        Some(Volume(self.0.checked_add(rhs.0)?))
    }

    pub fn checked_sub(&self, rhs: Volume) -> Option<Volume> {
        Some(Volume(self.0.checked_sub(rhs.0)?))
    }

    pub fn saturating_sub(&self, rhs: Volume) -> Volume {
        Volume(self.0.saturating_sub(rhs.0))
    }
}

impl Display for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}L", self.as_litres())
    }
}

/// Summing never wraps: an overflow yields `None`.
impl Sum<Volume> for Option<Volume> {
    fn sum<I: Iterator<Item = Volume>>(iter: I) -> Self {
        iter.fold(Some(Volume::ZERO), |acc, next| acc?.checked_add(next))
    }
}

impl<'a> Sum<&'a Volume> for Option<Volume> {
    fn sum<I: Iterator<Item = &'a Volume>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_litres_rounds_to_micro_litres() {
        assert_eq!(Volume::from_litres(2.5).unwrap().as_shares(), 2_500_000);
        assert_eq!(Volume::from_litres(0.1).unwrap().as_shares(), 100_000);
        assert_eq!(Volume::from_litres(0.000_000_4).unwrap(), Volume::ZERO);
        assert_eq!(Volume::from_litres(10.0).unwrap().as_litres(), 10.0);
    }

    #[test]
    fn from_litres_rejects_invalid_floats() {
        for litres in [-1.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1e300] {
            assert!(matches!(
                Volume::from_litres(litres),
                Err(StationError::InvalidVolume(_))
            ));
        }
    }

    #[test]
    fn hundred_tenths_make_exactly_ten_litres() {
        let tenth = Volume::from_litres(0.1).unwrap();
        let total: Option<Volume> = std::iter::repeat_n(tenth, 100).sum();
        assert_eq!(total, Some(Volume::from_litres(10.0).unwrap()));
    }

    #[test]
    fn checked_arithmetic_reports_overflow() {
        let max = Volume::from_shares(u64::MAX);
        assert_eq!(max.checked_add(Volume::from_shares(1)), None);
        assert_eq!(Volume::ZERO.checked_sub(Volume::from_shares(1)), None);
        assert_eq!(
            Volume::ZERO.saturating_sub(Volume::from_shares(1)),
            Volume::ZERO
        );
        let sum: Option<Volume> = [max, Volume::from_shares(1)].iter().sum();
        assert_eq!(sum, None);
    }
}
