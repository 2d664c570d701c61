use std::fmt::Debug;

use log::*;
use merchant_common::Amount;

use crate::{
    db_types::{InstanceSettings, NewInstance},
    helpers::{new_account, same_account, MerchantKeys},
    merchant_api::{
        config::EngineConfig,
        errors::MerchantError,
        instance_objects::{InstanceConfigRequest, InstanceDetails, InstanceReconfigureRequest, InstanceSummary},
        registry::InstanceRegistry,
    },
    traits::InstanceManagement,
};

/// `InstanceApi` administers merchant instances and keeps the [`InstanceRegistry`] in step with the store.
///
/// The registry is only touched after the store has committed, so requests in flight never see a half-applied change.
pub struct InstanceApi<B> {
    db: B,
    registry: InstanceRegistry,
    config: EngineConfig,
}

impl<B> Debug for InstanceApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InstanceApi")
    }
}

impl<B> InstanceApi<B> {
    pub fn new(db: B, registry: InstanceRegistry, config: EngineConfig) -> Self {
        Self { db, registry, config }
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }
}

impl<B> InstanceApi<B>
where B: InstanceManagement
{
    /// Creates an instance with a fresh key pair. Posting identical settings again is a no-op that returns the
    /// existing instance.
    pub async fn create_instance(&self, request: InstanceConfigRequest) -> Result<InstanceDetails, MerchantError> {
        validate_instance_id(&request.id)?;
        let (settings, payto_uris) = request.config.into_settings(request.id);
        self.validate(&settings, &payto_uris)?;
        let accounts = payto_uris
            .iter()
            .map(|uri| {
                new_account(uri).ok_or_else(|| MerchantError::malformed("payto_uris", format!("'{uri}' is invalid")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let keys = MerchantKeys::random();
        let id = settings.id.clone();
        let instance =
            NewInstance { settings, merchant_pub: keys.public_hex(), merchant_priv: keys.secret_hex(), accounts };
        let record = self.db.insert_instance(instance).await?;
        debug!("🏪️ Instance '{id}' stored as #{}", record.id);
        self.registry.refresh(&self.db, &id).await?;
        let instance = self.registry.require(&id)?;
        Ok(InstanceDetails::from(instance.as_ref()))
    }

    pub fn list_instances(&self) -> Vec<InstanceSummary> {
        self.registry.snapshot().iter().map(|i| InstanceSummary::from(i.as_ref())).collect()
    }

    pub fn instance_details(&self, instance_id: &str) -> Result<InstanceDetails, MerchantError> {
        let instance = self.registry.require(instance_id)?;
        Ok(InstanceDetails::from(instance.as_ref()))
    }

    /// Replaces the settings and the account list of an instance in one transaction.
    pub async fn update_instance(
        &self,
        instance_id: &str,
        request: InstanceReconfigureRequest,
    ) -> Result<InstanceDetails, MerchantError> {
        self.registry.require(instance_id)?;
        let (settings, payto_uris) = request.into_settings(instance_id);
        self.validate(&settings, &payto_uris)?;
        let accounts = self.db.update_instance(settings, payto_uris).await?;
        info!("🏪️ Instance '{instance_id}' reconfigured. It now has {} active account(s)", accounts.len());
        self.registry.refresh(&self.db, instance_id).await?;
        self.instance_details(instance_id)
    }

    /// Soft-deletes an instance. It disappears from the registry, but its records stay in the store.
    pub async fn delete_instance(&self, instance_id: &str) -> Result<(), MerchantError> {
        if !self.db.delete_instance(instance_id).await? {
            return Err(MerchantError::InstanceUnknown(instance_id.to_string()));
        }
        self.registry.remove(instance_id);
        Ok(())
    }

    /// Everything is checked before anything is written, so a bad request never leaves a trace in the store.
    fn validate(&self, settings: &InstanceSettings, payto_uris: &[String]) -> Result<(), MerchantError> {
        if settings.name.trim().is_empty() {
            return Err(MerchantError::ParameterMissing("name".into()));
        }
        self.check_currency(&settings.default_max_deposit_fee)?;
        self.check_currency(&settings.default_max_wire_fee)?;
        if settings.default_wire_fee_amortization == 0 {
            return Err(MerchantError::malformed("default_wire_fee_amortization", "It must be at least 1"));
        }
        for (i, uri) in payto_uris.iter().enumerate() {
            if new_account(uri).is_none() {
                return Err(MerchantError::malformed("payto_uris", format!("'{uri}' is not a payto URI")));
            }
            if payto_uris[..i].iter().any(|other| same_account(other, uri)) {
                return Err(MerchantError::malformed("payto_uris", format!("'{uri}' is listed more than once")));
            }
        }
        Ok(())
    }

    fn check_currency(&self, amount: &Amount) -> Result<(), MerchantError> {
        if amount.currency() == self.config.currency {
            Ok(())
        } else {
            Err(MerchantError::CurrencyMismatch {
                expected: self.config.currency.clone(),
                found: amount.currency().to_string(),
            })
        }
    }
}

fn validate_instance_id(id: &str) -> Result<(), MerchantError> {
    let valid =
        !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(MerchantError::malformed("id", "Instance ids may only contain letters, digits, '-' and '_'"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn instance_ids() {
        assert!(validate_instance_id("default").is_ok());
        assert!(validate_instance_id("shop_2-b").is_ok());
        assert!(validate_instance_id("").is_err());
        assert!(validate_instance_id("a/b").is_err());
        assert!(validate_instance_id("ünï").is_err());
    }
}
