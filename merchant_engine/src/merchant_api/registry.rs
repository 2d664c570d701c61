//! The in-memory view of the merchant's instances.
//!
//! Request handlers read instances on every call, and instances change only through the admin API. The registry
//! holds an immutable [`MerchantInstance`] per id; an admin change builds a new snapshot after its transaction has
//! committed and swaps it in. Handlers that already hold the old `Arc` finish with the old view.
use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use log::*;

use crate::{
    db_types::{InstanceRecord, InstanceSettings, WireAccount},
    helpers::MerchantKeys,
    merchant_api::errors::MerchantError,
    traits::InstanceManagement,
};

/// A consistent snapshot of one instance: settings, signing keys and active bank accounts.
#[derive(Debug, Clone)]
pub struct MerchantInstance {
    pub serial: i64,
    pub settings: InstanceSettings,
    pub keys: MerchantKeys,
    pub accounts: Vec<WireAccount>,
}

impl MerchantInstance {
    pub fn from_record(record: &InstanceRecord, accounts: Vec<WireAccount>) -> Result<Self, MerchantError> {
        let keys = MerchantKeys::from_secret_hex(&record.merchant_priv)?;
        let accounts = accounts.into_iter().filter(|a| a.active).collect();
        Ok(Self { serial: record.id, settings: record.settings(), keys, accounts })
    }

    pub fn id(&self) -> &str {
        &self.settings.id
    }

    /// The first active account using `wire_method`, or any active account if no method is given.
    pub fn select_account(&self, wire_method: Option<&str>) -> Option<&WireAccount> {
        match wire_method {
            Some(method) => self.accounts.iter().find(|a| a.wire_method.eq_ignore_ascii_case(method)),
            None => self.accounts.first(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstanceRegistry {
    instances: Arc<RwLock<HashMap<String, Arc<MerchantInstance>>>>,
}

impl InstanceRegistry {
    // A poisoned lock only means a writer panicked between two map operations, each of which leaves the map valid.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<MerchantInstance>>> {
        self.instances.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<MerchantInstance>>> {
        self.instances.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, instance_id: &str) -> Option<Arc<MerchantInstance>> {
        self.read().get(instance_id).cloned()
    }

    /// Like [`Self::get`], but a missing instance is an error.
    pub fn require(&self, instance_id: &str) -> Result<Arc<MerchantInstance>, MerchantError> {
        self.get(instance_id).ok_or_else(|| MerchantError::InstanceUnknown(instance_id.to_string()))
    }

    pub fn insert(&self, instance: MerchantInstance) {
        let id = instance.id().to_string();
        self.write().insert(id, Arc::new(instance));
    }

    pub fn remove(&self, instance_id: &str) -> Option<Arc<MerchantInstance>> {
        self.write().remove(instance_id)
    }

    /// All live instances, sorted by id.
    pub fn snapshot(&self) -> Vec<Arc<MerchantInstance>> {
        let mut all = self.read().values().cloned().collect::<Vec<_>>();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Re-reads an instance and its accounts from the store and swaps the new snapshot in.
    pub async fn refresh<B: InstanceManagement>(&self, db: &B, instance_id: &str) -> Result<(), MerchantError> {
        match db.fetch_instance(instance_id).await? {
            Some(record) if !record.deleted => {
                let accounts = db.fetch_accounts(record.id, true).await?;
                self.insert(MerchantInstance::from_record(&record, accounts)?);
            },
            _ => {
                self.remove(instance_id);
            },
        }
        Ok(())
    }

    /// Loads every live instance from the store. Called once, before the server accepts requests.
    pub async fn load_all<B: InstanceManagement>(db: &B) -> Result<Self, MerchantError> {
        let registry = Self::default();
        for record in db.fetch_instances().await? {
            let accounts = db.fetch_accounts(record.id, true).await?;
            registry.insert(MerchantInstance::from_record(&record, accounts)?);
        }
        info!("🏪️ Loaded {} merchant instance(s)", registry.len());
        Ok(registry)
    }
}

#[cfg(test)]
mod test {
    use merchant_common::RelativeTime;
    use serde_json::Value;

    use super::*;
    use crate::helpers::{h_wire, wire_method};

    fn instance(id: &str, uris: &[&str]) -> MerchantInstance {
        let accounts = uris
            .iter()
            .enumerate()
            .map(|(i, uri)| WireAccount {
                id: i as i64,
                instance_serial: 1,
                payto_uri: uri.to_string(),
                salt: "salt".into(),
                h_wire: h_wire(uri, "salt"),
                wire_method: wire_method(uri).unwrap(),
                active: true,
            })
            .collect();
        MerchantInstance {
            serial: 1,
            settings: InstanceSettings {
                id: id.to_string(),
                name: id.to_string(),
                address: Value::Null,
                jurisdiction: Value::Null,
                default_max_deposit_fee: "EUR:0.1".parse().unwrap(),
                default_max_wire_fee: "EUR:0.1".parse().unwrap(),
                default_wire_fee_amortization: 1,
                default_wire_transfer_delay: RelativeTime::from_secs(3600),
                default_pay_delay: RelativeTime::from_secs(3600),
            },
            keys: MerchantKeys::random(),
            accounts,
        }
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let registry = InstanceRegistry::default();
        registry.insert(instance("shop", &["payto://iban/DE001"]));
        let before = registry.require("shop").unwrap();
        registry.insert(instance("shop", &["payto://x-taler-bank/bank/shop"]));
        assert_eq!(before.accounts[0].wire_method, "iban");
        assert_eq!(registry.require("shop").unwrap().accounts[0].wire_method, "x-taler-bank");
        assert!(matches!(registry.require("nope"), Err(MerchantError::InstanceUnknown(_))));
    }

    #[test]
    fn account_selection_by_method() {
        let shop = instance("shop", &["payto://iban/DE001", "payto://x-taler-bank/bank/shop"]);
        assert_eq!(shop.select_account(Some("x-taler-bank")).unwrap().payto_uri, "payto://x-taler-bank/bank/shop");
        assert_eq!(shop.select_account(None).unwrap().payto_uri, "payto://iban/DE001");
        assert!(shop.select_account(Some("bitcoin")).is_none());
    }
}
