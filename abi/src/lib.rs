mod config;
mod error;
mod types;

pub mod formdata;
pub mod mirror;
pub mod timespan;

pub use config::{Config, DbConfig};
pub use error::ReservationError;
pub use mirror::{derive_mirrors, MirrorCache};
pub use timespan::{date_range, merge_adjacent, overlaps, validate_range, Timespan};
pub use types::*;

/// Anything the scheduler accepts from the outside is validated first.
pub trait Validator {
    fn validate(&self) -> Result<(), ReservationError>;
}
