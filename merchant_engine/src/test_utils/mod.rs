//! Helpers for tests of the engine and of the crates built on it. Enabled by the `test_utils` feature.
pub mod fake_mint;
pub mod merchant;
pub mod prepare_env;
pub mod wallet;
