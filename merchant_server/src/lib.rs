//! # Merchant HTTP server
//!
//! This crate puts the merchant engine on the network. It is responsible for:
//! * loading configuration from the environment (and an optional env file), see [config](config/index.html);
//! * opening the store, loading the merchant instances and starting the background workers;
//! * translating HTTP requests into engine calls, and engine errors into JSON error bodies with stable codes.
//!
//! ## Routes
//! Besides `/health` and `/config`, the server exposes instance administration under `/instances`, and the order,
//! payment, refund, tracking and inventory routes of each instance. The default instance serves them at the root;
//! every other instance serves them under `/instances/{instance}/`. See [routes](routes/index.html).

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod helpers;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
