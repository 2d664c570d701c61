//! Merchant Engine
//!
//! The merchant engine is the order lifecycle core of a merchant backend for a token-based payment system. Merchants
//! publish signed contracts, wallets claim and pay them with coins issued by trusted mints, and the engine tracks each
//! order through refunds and the wire transfers that finally settle it.
//!
//! The library is divided into two main sections:
//! 1. Storage ([`mod@traits`] and [`mod@sqlite`]). The engine's APIs are generic over the traits in `traits`, and
//!    `SqliteDatabase` implements all of them. Every state transition runs in one transaction, retried when the store
//!    reports contention. The data types used in the database are defined in [`mod@db_types`] and are public.
//! 2. The public API ([`mod@merchant_api`]). This is what a front end, such as the HTTP server, calls. It validates
//!    requests, talks to the mints through [`mint_client::MintApi`], signs what the merchant has to sign, and checks
//!    the signatures of everyone else.
//!
//! Every committed state change of an order emits an [`events::OrderEvent`]. Long-polling status requests wait on
//! these, and hooks can be attached to react to payments and refunds.

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod merchant_api;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use merchant_api::{
    config::EngineConfig,
    errors::{ErrorKind, MerchantError},
    instance_api::InstanceApi,
    inventory_api::InventoryApi,
    order_api::OrderApi,
    payment_api::PaymentApi,
    refund_api::RefundApi,
    registry::InstanceRegistry,
    track_api::TrackApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
