use std::{env, time::Duration};

use log::*;
use merchant_common::{parse_boolean_flag, parse_duration_secs};
use merchant_engine::merchant_api::config::{parse_trusted_auditors, parse_trusted_mints, EngineConfig};
use mint_client::MintClientConfig;

const DEFAULT_MERCHANT_HOST: &str = "127.0.0.1";
const DEFAULT_MERCHANT_PORT: u16 = 9966;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/merchant.db";
const DEFAULT_CURRENCY: &str = "EUR";
const DEFAULT_LOCK_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 25;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    /// Currency, trusted mints and auditors, payment fan-out and the long-poll cap.
    pub engine: EngineConfig,
    pub mint_client: MintClientConfig,
    /// How often expired inventory locks are swept.
    pub lock_sweep_interval: Duration,
    /// If true, the `X-Forwarded-Prefix` header becomes part of the public base URL of the backend.
    pub honour_forwarded_prefix: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MERCHANT_HOST.to_string(),
            port: DEFAULT_MERCHANT_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            engine: EngineConfig::new(DEFAULT_CURRENCY),
            mint_client: MintClientConfig::default(),
            lock_sweep_interval: DEFAULT_LOCK_SWEEP_INTERVAL,
            honour_forwarded_prefix: false,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MERCHANT_HOST").ok().unwrap_or_else(|| DEFAULT_MERCHANT_HOST.into());
        let port = env::var("MERCHANT_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for MERCHANT_PORT. {e} Using the default, {DEFAULT_MERCHANT_PORT}, \
                         instead."
                    );
                    DEFAULT_MERCHANT_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_MERCHANT_PORT);
        let database_url = env::var("MERCHANT_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ MERCHANT_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let db_max_connections = env::var("MERCHANT_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| {
                s.trim()
                    .parse::<u32>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for MERCHANT_DB_MAX_CONNECTIONS. {e}"))
                    .ok()
            })
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
        let engine = configure_engine();
        let mint_client = MintClientConfig::new_from_env_or_default();
        let lock_sweep_interval = duration_from_env("MERCHANT_LOCK_SWEEP_INTERVAL", DEFAULT_LOCK_SWEEP_INTERVAL);
        let honour_forwarded_prefix = parse_boolean_flag(env::var("MERCHANT_HONOUR_FORWARDED_PREFIX").ok(), false);
        Self {
            host,
            port,
            database_url,
            db_max_connections,
            engine,
            mint_client,
            lock_sweep_interval,
            honour_forwarded_prefix,
        }
    }

    pub fn options(&self) -> ServerOptions {
        ServerOptions { honour_forwarded_prefix: self.honour_forwarded_prefix }
    }
}

fn configure_engine() -> EngineConfig {
    let currency = env::var("MERCHANT_CURRENCY").ok().filter(|s| !s.trim().is_empty()).unwrap_or_else(|| {
        info!("🪛️ MERCHANT_CURRENCY is not set. Using {DEFAULT_CURRENCY}.");
        DEFAULT_CURRENCY.to_string()
    });
    let mut engine = EngineConfig::new(currency.trim());
    match env::var("MERCHANT_TRUSTED_MINTS").map(|s| parse_trusted_mints(&s)) {
        Ok(Ok(mints)) => engine.mints = mints,
        Ok(Err(e)) => error!("🪛️ Ignoring MERCHANT_TRUSTED_MINTS. {e}"),
        Err(_) => warn!("🪛️ MERCHANT_TRUSTED_MINTS is not set. No payment can succeed until a mint is trusted."),
    }
    match env::var("MERCHANT_TRUSTED_AUDITORS").map(|s| parse_trusted_auditors(&s)) {
        Ok(Ok(auditors)) => engine.auditors = auditors,
        Ok(Err(e)) => error!("🪛️ Ignoring MERCHANT_TRUSTED_AUDITORS. {e}"),
        Err(_) => info!("🪛️ MERCHANT_TRUSTED_AUDITORS is not set. Contracts will list no auditors."),
    }
    match env::var("MERCHANT_PAY_FANOUT").map(|s| s.trim().parse::<usize>()) {
        Ok(Ok(n)) if n > 0 => engine.pay_fanout = n,
        Ok(_) => warn!("🪛️ MERCHANT_PAY_FANOUT must be a positive number. Using {}.", engine.pay_fanout),
        Err(_) => {},
    }
    engine.long_poll_max = duration_from_env("MERCHANT_LONG_POLL_MAX", engine.long_poll_max);
    let mints = engine.mints.iter().map(|m| m.url.as_str()).collect::<Vec<_>>().join(", ");
    info!("🪛️ Trading in {} with {} trusted mint(s): {mints}", engine.currency, engine.mints.len());
    engine
}

fn duration_from_env(name: &str, default: Duration) -> Duration {
    match env::var(name).ok().as_deref().map(parse_duration_secs) {
        Some(Some(d)) => d,
        Some(None) => {
            let secs = default.as_secs();
            warn!("🪛️ {name} is not a whole number of seconds. Using the default value of {secs}s.");
            default
        },
        None => {
            debug!("🪛️ {name} is not set. Using the default value of {}s.", default.as_secs());
            default
        },
    }
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// The part of the configuration request handlers need. It holds no secrets.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerOptions {
    pub honour_forwarded_prefix: bool,
}
