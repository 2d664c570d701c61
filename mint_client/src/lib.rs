//! Mint client
//!
//! The merchant never moves money itself. Every coin it is paid with is deposited at the mint that issued it, and the
//! mint later aggregates those deposits into bank transfers. This crate is the merchant's view of that mint:
//!
//! * [`MintApi`] is the interface the merchant engine programs against. It is a trait so that tests can swap in a
//!   deterministic in-memory mint.
//! * [`MintHttpClient`] is the production implementation over HTTP, with per-call deadlines and a bounded retry of
//!   transient network failures.
//! * The data objects are the JSON bodies exchanged with the mint. Keys, hashes and signatures are carried as hex
//!   strings; checking them is the caller's job.
mod api;
mod config;
mod data_objects;
mod error;
mod helpers;

pub use api::{MintApi, MintHttpClient};
pub use config::MintClientConfig;
pub use data_objects::{
    DepositConfirmation,
    DepositQuery,
    DepositRequest,
    DepositTrack,
    RefundAck,
    RefundQuery,
    RefundStatus,
    TrackDepositResult,
    TransferDeposit,
    TransferDetails,
};
pub use error::MintApiError;
pub use helpers::{mint_url, normalize_base_url};
