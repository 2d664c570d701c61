use merchant_common::{Amount, RelativeTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    db_types::{InstanceSettings, WireAccount},
    merchant_api::registry::MerchantInstance,
};

/// The body of `POST /instances`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfigRequest {
    pub id: String,
    #[serde(flatten)]
    pub config: InstanceReconfigureRequest,
}

/// The body of `PATCH /instances/{id}`. The account list is complete: accounts missing from it are inactivated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceReconfigureRequest {
    pub name: String,
    #[serde(default)]
    pub address: Value,
    #[serde(default)]
    pub jurisdiction: Value,
    pub payto_uris: Vec<String>,
    pub default_max_deposit_fee: Amount,
    pub default_max_wire_fee: Amount,
    #[serde(default = "one")]
    pub default_wire_fee_amortization: u32,
    pub default_wire_transfer_delay: RelativeTime,
    pub default_pay_delay: RelativeTime,
}

fn one() -> u32 {
    1
}

impl InstanceReconfigureRequest {
    pub fn into_settings<S: Into<String>>(self, id: S) -> (InstanceSettings, Vec<String>) {
        let settings = InstanceSettings {
            id: id.into(),
            name: self.name,
            address: self.address,
            jurisdiction: self.jurisdiction,
            default_max_deposit_fee: self.default_max_deposit_fee,
            default_max_wire_fee: self.default_max_wire_fee,
            default_wire_fee_amortization: self.default_wire_fee_amortization,
            default_wire_transfer_delay: self.default_wire_transfer_delay,
            default_pay_delay: self.default_pay_delay,
        };
        (settings, self.payto_uris)
    }
}

/// One entry of `GET /instances`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub id: String,
    pub name: String,
    pub merchant_pub: String,
    pub payment_targets: Vec<String>,
}

impl From<&MerchantInstance> for InstanceSummary {
    fn from(instance: &MerchantInstance) -> Self {
        let mut payment_targets = instance.accounts.iter().map(|a| a.wire_method.clone()).collect::<Vec<_>>();
        payment_targets.sort();
        payment_targets.dedup();
        Self {
            id: instance.settings.id.clone(),
            name: instance.settings.name.clone(),
            merchant_pub: instance.keys.public_hex(),
            payment_targets,
        }
    }
}

/// The reply of `GET /instances/{id}`: the settings and the active accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDetails {
    #[serde(flatten)]
    pub settings: InstanceSettings,
    pub merchant_pub: String,
    pub accounts: Vec<WireAccount>,
}

impl From<&MerchantInstance> for InstanceDetails {
    fn from(instance: &MerchantInstance) -> Self {
        Self {
            settings: instance.settings.clone(),
            merchant_pub: instance.keys.public_hex(),
            accounts: instance.accounts.clone(),
        }
    }
}
