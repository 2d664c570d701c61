//! # Merchant engine public API
//!
//! The `merchant_api` module exposes the programmatic API of the merchant backend. Like the storage traits, it is
//! split by concern, so a front end can wire up only what it serves.
//!
//! * [`instance_api`] creates, reconfigures and deletes merchant instances, and keeps the [`InstanceRegistry`]
//!   current.
//! * [`inventory_api`] manages products and the stock locks wallets hold while they shop.
//! * [`order_api`] turns order templates into signed contracts, binds them to a wallet when claimed, and reports their
//!   status (optionally long-polling for a change).
//! * [`payment_api`] accepts coin deposits for a claimed contract, forwards them to the mints and issues the receipt
//!   once the contract is covered. It also handles aborts.
//! * [`refund_api`] raises the refund total of a paid order and reports which refunds the mints have executed.
//! * [`track_api`] reconciles deposits with the wire transfers that settle them, auditing every transfer report.
//!
//! The other submodules hold the request and response types, the engine-wide configuration and the error type.
//!
//! # API usage
//!
//! Every API is built from a backend that implements the storage traits it needs, plus the shared pieces it uses:
//! the instance registry, the engine config, and for the APIs that talk to mints, a [`mint_client::MintApi`].
//!
//! ```rust,ignore
//! use merchant_engine::{EngineConfig, InstanceRegistry, OrderApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let registry = InstanceRegistry::load_all(&db).await?;
//! let api = OrderApi::new(db, registry, EngineConfig::new("EUR"), producers);
//! let order = api.create_order("default", request, "https://shop.example/").await?;
//! ```

pub mod config;
pub mod errors;
pub mod instance_api;
pub mod instance_objects;
pub mod inventory_api;
pub mod inventory_objects;
pub mod order_api;
pub mod order_objects;
pub mod payment_api;
pub mod payment_objects;
pub mod refund_api;
pub mod registry;
pub mod track_api;

pub use registry::InstanceRegistry;
