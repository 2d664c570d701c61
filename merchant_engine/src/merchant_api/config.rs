use std::time::Duration;

use crate::{
    db_types::{TrustedAuditor, TrustedMint},
    helpers::parse_public_key,
};

pub const DEFAULT_PAY_FANOUT: usize = 8;
pub const DEFAULT_LONG_POLL_MAX: Duration = Duration::from_secs(120);

/// Process-wide settings shared by every instance: the trading currency, and the mints and auditors the merchant
/// trusts. These go verbatim into every contract.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub currency: String,
    pub mints: Vec<TrustedMint>,
    pub auditors: Vec<TrustedAuditor>,
    /// How many coins of one payment are deposited at the mint concurrently.
    pub pay_fanout: usize,
    /// The longest a long-polling caller may wait for an order to change.
    pub long_poll_max: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            currency: "EUR".to_string(),
            mints: Vec::new(),
            auditors: Vec::new(),
            pay_fanout: DEFAULT_PAY_FANOUT,
            long_poll_max: DEFAULT_LONG_POLL_MAX,
        }
    }
}

impl EngineConfig {
    pub fn new<S: Into<String>>(currency: S) -> Self {
        Self { currency: currency.into().to_ascii_uppercase(), ..Default::default() }
    }

    pub fn with_mint(mut self, mint: TrustedMint) -> Self {
        self.mints.push(mint);
        self
    }

    pub fn trusted_mint(&self, url: &str) -> Option<&TrustedMint> {
        let url = mint_client::normalize_base_url(url);
        self.mints.iter().find(|m| m.url == url)
    }
}

/// Parses a comma separated list of `url=master_pub_hex` pairs. Mint URLs are normalised to end in a single slash.
pub fn parse_trusted_mints(s: &str) -> Result<Vec<TrustedMint>, String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (url, master_pub) =
                item.rsplit_once('=').ok_or_else(|| format!("'{item}' is not of the form url=master_pub"))?;
            let master_pub = master_pub.trim();
            parse_public_key(master_pub).map_err(|e| format!("Invalid master key for {url}. {e}"))?;
            Ok(TrustedMint { url: mint_client::normalize_base_url(url), master_pub: master_pub.to_string() })
        })
        .collect()
}

/// Parses a comma separated list of `name=url=auditor_pub_hex` triples.
pub fn parse_trusted_auditors(s: &str) -> Result<Vec<TrustedAuditor>, String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let mut parts = item.splitn(2, '=');
            let name = parts.next().unwrap_or_default().trim();
            let (url, auditor_pub) = parts
                .next()
                .and_then(|rest| rest.rsplit_once('='))
                .ok_or_else(|| format!("'{item}' is not of the form name=url=auditor_pub"))?;
            if name.is_empty() {
                return Err(format!("'{item}' has no auditor name"));
            }
            let auditor_pub = auditor_pub.trim();
            parse_public_key(auditor_pub).map_err(|e| format!("Invalid key for auditor {name}. {e}"))?;
            Ok(TrustedAuditor {
                name: name.to_string(),
                url: url.trim().to_string(),
                auditor_pub: auditor_pub.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::helpers::MerchantKeys;

    #[test]
    fn parse_mint_list() {
        let k1 = MerchantKeys::random().public_hex();
        let k2 = MerchantKeys::random().public_hex();
        let s = format!("https://mint.one={k1}, http://localhost:8081/mint/={k2},");
        let mints = parse_trusted_mints(&s).unwrap();
        assert_eq!(mints.len(), 2);
        assert_eq!(mints[0].url, "https://mint.one/");
        assert_eq!(mints[1].url, "http://localhost:8081/mint/");
        assert_eq!(mints[1].master_pub, k2);
        assert!(parse_trusted_mints("https://mint.one").is_err());
        assert!(parse_trusted_mints("https://mint.one=nothex").is_err());
        assert!(parse_trusted_mints("").unwrap().is_empty());
    }

    #[test]
    fn parse_auditor_list() {
        let k = MerchantKeys::random().public_hex();
        let auditors = parse_trusted_auditors(&format!("Audit Co=https://audit.example/={k}")).unwrap();
        assert_eq!(auditors[0].name, "Audit Co");
        assert_eq!(auditors[0].url, "https://audit.example/");
        assert!(parse_trusted_auditors(&format!("=https://audit.example/={k}")).is_err());
    }

    #[test]
    fn lookup_ignores_trailing_slashes() {
        let mint = TrustedMint { url: "https://mint.one/".into(), master_pub: "00".into() };
        let config = EngineConfig::new("eur").with_mint(mint);
        assert_eq!(config.currency, "EUR");
        assert!(config.trusted_mint("https://mint.one").is_some());
        assert!(config.trusted_mint("https://mint.two/").is_none());
    }
}
