use crate::{FuelType, UnitId, price::UnitPrice, volume::Volume};

#[derive(Debug, thiserror::Error)]
pub enum StationError {
    #[error("no price was set for fuel type `{0}`")]
    UnpricedType(FuelType),
    #[error("fuel `{fuel}` costs {price} per litre, more than the accepted {max_price}")]
    TooExpensive {
        fuel: FuelType,
        price: UnitPrice,
        max_price: UnitPrice,
    },
    #[error("no `{fuel}` unit can deliver {requested}")]
    NoCapacity { fuel: FuelType, requested: Volume },
    #[error("wait for the turn at unit `{unit}` was interrupted")]
    Interrupted { unit: UnitId },
    #[error("unit `{unit}` failed to withdraw: {report}")]
    Withdrawal { unit: UnitId, report: eyre::Report },
    #[error("inconsistent station state: {0}")]
    InconsistentState(&'static str),
    #[error("volume arithmetic overflowed")]
    ArithmeticOverflow,
    #[error("`{0}` is not a valid volume in litres")]
    InvalidVolume(f64),
    #[error("`{0}` is not a valid unit price")]
    InvalidPrice(f64),
    #[error("invalid station configuration: {0}")]
    Config(String),
}

impl StationError {
    /// Whether the error is one of the normal, counted rejections of a request.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            StationError::TooExpensive { .. } | StationError::NoCapacity { .. }
        )
    }
}

pub type StationResult<T> = Result<T, StationError>;
