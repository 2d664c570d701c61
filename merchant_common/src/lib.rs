//! Shared value types for the merchant backend.
//!
//! * [`Amount`] is a currency-tagged monetary value with fixed-point fractions, written as `"EUR:5.01"` on the wire.
//! * [`Timestamp`] and [`RelativeTime`] carry second-granularity times with the `never` / `forever` sentinels.
//! * [`Secret`] hides sensitive values from `Debug` and `Display` output.
mod amount;
mod helpers;
mod secret;
mod time;

pub use amount::{Amount, AmountError, FRACTION_BASE, MAX_AMOUNT_VALUE};
pub use helpers::{parse_boolean_flag, parse_duration_secs};
pub use secret::Secret;
pub use time::{RelativeTime, Timestamp};
