//! Bank account descriptors.
//!
//! An account is identified in contracts by `h_wire`, the canonical hash of `{"payto_uri": .., "salt": ..}`. The salt
//! is random so that the hash does not reveal the account to anyone who merely guesses the IBAN.
use std::sync::OnceLock;

use rand::RngCore;
use regex::Regex;
use serde_json::json;
use tari_crypto::tari_utilities::hex::to_hex;

use super::canonical_json::hash_canonical;
use crate::db_types::NewAccount;

fn payto_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^payto://([a-z][a-z0-9+.-]*)/[^\s]+$").ok()).as_ref()
}

/// Extracts the wire method (the URI's authority, lower-cased) from a payto URI, or `None` if the URI is malformed.
pub fn wire_method(payto_uri: &str) -> Option<String> {
    payto_regex()?.captures(payto_uri.trim()).and_then(|c| c.get(1)).map(|m| m.as_str().to_ascii_lowercase())
}

pub fn random_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    to_hex(&bytes)
}

pub fn h_wire(payto_uri: &str, salt: &str) -> String {
    hash_canonical(&json!({ "payto_uri": payto_uri, "salt": salt }))
}

/// Builds a new account record with a fresh salt. Returns `None` if the payto URI is malformed.
pub fn new_account(payto_uri: &str) -> Option<NewAccount> {
    let wire_method = wire_method(payto_uri)?;
    let salt = random_salt();
    let h_wire = h_wire(payto_uri, &salt);
    Some(NewAccount { payto_uri: payto_uri.to_string(), salt, h_wire, wire_method })
}

/// Two payto URIs denote the same account when they are equal ignoring ASCII case.
pub fn same_account(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
