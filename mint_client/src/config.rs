use std::time::Duration;

use log::*;
use merchant_common::parse_duration_secs;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct MintClientConfig {
    /// Deadline for a single HTTP exchange with the mint.
    pub timeout: Duration,
    /// How many times a transient failure is retried before the mint is declared unreachable.
    pub retries: u32,
    /// Initial back-off between retries. It doubles on each attempt.
    pub backoff: Duration,
}

impl Default for MintClientConfig {
    fn default() -> Self {
        Self { timeout: DEFAULT_TIMEOUT, retries: DEFAULT_RETRIES, backoff: Duration::from_millis(250) }
    }
}

impl MintClientConfig {
    pub fn new_from_env_or_default() -> Self {
        let mut config = Self::default();
        match std::env::var("MERCHANT_MINT_TIMEOUT").ok().as_deref().map(parse_duration_secs) {
            Some(Some(t)) => config.timeout = t,
            Some(None) => {
                warn!("🏦️ MERCHANT_MINT_TIMEOUT is not a whole number of seconds. Using {DEFAULT_TIMEOUT:?}")
            },
            None => info!("🏦️ MERCHANT_MINT_TIMEOUT not set, using {DEFAULT_TIMEOUT:?}"),
        }
        match std::env::var("MERCHANT_MINT_RETRIES").ok().map(|s| s.trim().parse::<u32>()) {
            Some(Ok(r)) => config.retries = r,
            Some(Err(e)) => warn!("🏦️ Invalid MERCHANT_MINT_RETRIES ({e}). Using {DEFAULT_RETRIES}"),
            None => info!("🏦️ MERCHANT_MINT_RETRIES not set, using {DEFAULT_RETRIES}"),
        }
        config
    }
}
