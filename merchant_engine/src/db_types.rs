use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use merchant_common::{Amount, RelativeTime, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, FromRow, Type};

/// The reserved id of the instance that is served from the root of the URL space.
pub const DEFAULT_INSTANCE: &str = "default";

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------      Instances      ---------------------------------------------------------
/// The merchant-editable settings of an instance. Key material and bank accounts are managed separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSettings {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: Value,
    #[serde(default)]
    pub jurisdiction: Value,
    pub default_max_deposit_fee: Amount,
    pub default_max_wire_fee: Amount,
    #[serde(default = "default_amortization")]
    pub default_wire_fee_amortization: u32,
    pub default_wire_transfer_delay: RelativeTime,
    pub default_pay_delay: RelativeTime,
}

fn default_amortization() -> u32 {
    1
}

#[derive(Debug, Clone, FromRow)]
pub struct InstanceRecord {
    pub id: i64,
    pub instance_id: String,
    pub name: String,
    pub address: Json<Value>,
    pub jurisdiction: Json<Value>,
    pub merchant_pub: String,
    pub merchant_priv: String,
    pub default_max_deposit_fee: Amount,
    pub default_max_wire_fee: Amount,
    pub default_wire_fee_amortization: i64,
    pub default_wire_transfer_delay: RelativeTime,
    pub default_pay_delay: RelativeTime,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstanceRecord {
    pub fn settings(&self) -> InstanceSettings {
        InstanceSettings {
            id: self.instance_id.clone(),
            name: self.name.clone(),
            address: self.address.0.clone(),
            jurisdiction: self.jurisdiction.0.clone(),
            default_max_deposit_fee: self.default_max_deposit_fee.clone(),
            default_max_wire_fee: self.default_max_wire_fee.clone(),
            default_wire_fee_amortization: u32::try_from(self.default_wire_fee_amortization).unwrap_or(1),
            default_wire_transfer_delay: self.default_wire_transfer_delay,
            default_pay_delay: self.default_pay_delay,
        }
    }
}

/// A new instance, ready to be written. The key pair is generated by the caller.
#[derive(Debug, Clone)]
pub struct NewInstance {
    pub settings: InstanceSettings,
    pub merchant_pub: String,
    pub merchant_priv: String,
    pub accounts: Vec<NewAccount>,
}

//--------------------------------------    Wire accounts    ---------------------------------------------------------
/// One bank account of an instance. `h_wire` is reproducible from `payto_uri` and `salt` alone.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct WireAccount {
    #[serde(skip)]
    pub id: i64,
    #[serde(skip)]
    pub instance_serial: i64,
    pub payto_uri: String,
    pub salt: String,
    pub h_wire: String,
    pub wire_method: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub payto_uri: String,
    pub salt: String,
    pub h_wire: String,
    pub wire_method: String,
}

//--------------------------------------      Contracts      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedMint {
    pub url: String,
    pub master_pub: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedAuditor {
    pub name: String,
    pub url: String,
    pub auditor_pub: String,
}

/// Who the customer is contracting with. `address` and `jurisdiction` are labels into the contract's `locations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantDescriptor {
    pub name: String,
    pub instance: String,
    pub address: String,
    pub jurisdiction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractProduct {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub description: String,
    #[serde(default = "one")]
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taxes: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<Timestamp>,
}

fn one() -> i64 {
    1
}

/// The canonical, finalised form of an order. Once persisted it is never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractTerms {
    pub order_id: OrderId,
    pub amount: Amount,
    pub summary: String,
    pub products: Vec<ContractProduct>,
    pub timestamp: Timestamp,
    pub refund_deadline: Timestamp,
    pub pay_deadline: Timestamp,
    pub wire_transfer_deadline: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment_url: Option<String>,
    pub merchant_base_url: String,
    pub merchant: MerchantDescriptor,
    pub locations: BTreeMap<String, Value>,
    pub merchant_pub: String,
    pub h_wire: String,
    pub wire_method: String,
    pub max_fee: Amount,
    pub max_wire_fee: Amount,
    pub wire_fee_amortization: u32,
    pub exchanges: Vec<TrustedMint>,
    pub auditors: Vec<TrustedAuditor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl ContractTerms {
    pub fn trusts_mint(&self, url: &str) -> Option<&TrustedMint> {
        let url = mint_client::normalize_base_url(url);
        self.exchanges.iter().find(|m| mint_client::normalize_base_url(&m.url) == url)
    }
}

//--------------------------------------       Orders        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct OrderRecord {
    pub id: i64,
    pub instance_id: String,
    pub order_id: OrderId,
    pub h_contract: String,
    /// The canonical JSON of the contract terms, stored byte for byte.
    pub contract_terms: String,
    pub contract_sig: String,
    pub amount: Amount,
    pub summary: String,
    pub timestamp: Timestamp,
    pub pay_deadline: Timestamp,
    pub refund_deadline: Timestamp,
    pub wire_transfer_deadline: Timestamp,
    pub paid: bool,
    pub payment_sig: Option<String>,
    pub aborted: bool,
    pub wired: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    pub fn terms(&self) -> Result<ContractTerms, serde_json::Error> {
        serde_json::from_str(&self.contract_terms)
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub instance_id: String,
    pub order_id: OrderId,
    pub h_contract: String,
    pub contract_terms: String,
    pub contract_sig: String,
    pub amount: Amount,
    pub summary: String,
    pub timestamp: Timestamp,
    pub pay_deadline: Timestamp,
    pub refund_deadline: Timestamp,
    pub wire_transfer_deadline: Timestamp,
}

/// A product quantity requested for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductQuantity {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Unclaimed,
    Claimed,
    Paid,
    Aborted,
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Unclaimed => write!(f, "unclaimed"),
            OrderStatus::Claimed => write!(f, "claimed"),
            OrderStatus::Paid => write!(f, "paid"),
            OrderStatus::Aborted => write!(f, "aborted"),
        }
    }
}

//--------------------------------------       Claims        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct ClaimRecord {
    pub id: i64,
    pub order_serial: i64,
    pub nonce: String,
    pub claimed_at: DateTime<Utc>,
}

//--------------------------------------      Deposits       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct DepositRecord {
    #[serde(skip)]
    pub id: i64,
    #[serde(skip)]
    pub order_serial: i64,
    pub coin_pub: String,
    pub denom_pub: String,
    #[serde(skip)]
    pub denom_sig: String,
    #[serde(skip)]
    pub coin_sig: String,
    pub amount_with_fee: Amount,
    pub amount_without_fee: Amount,
    pub deposit_fee: Amount,
    pub refund_fee: Amount,
    pub mint_url: String,
    pub mint_pub: String,
    pub mint_sig: String,
    #[serde(skip)]
    pub h_wire: String,
    #[serde(skip)]
    pub deposited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeposit {
    pub coin_pub: String,
    pub denom_pub: String,
    pub denom_sig: String,
    pub coin_sig: String,
    pub amount_with_fee: Amount,
    pub amount_without_fee: Amount,
    pub deposit_fee: Amount,
    pub refund_fee: Amount,
    pub mint_url: String,
    pub mint_pub: String,
    pub mint_sig: String,
    pub h_wire: String,
}

//--------------------------------------       Refunds       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundState {
    /// The permission has been issued but the mint has not reported it redeemed.
    Pending,
    /// The mint has acknowledged the refund.
    Gone,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RefundRecord {
    pub id: i64,
    pub order_serial: i64,
    pub coin_pub: String,
    pub rtransaction_id: i64,
    pub amount: Amount,
    pub reason: String,
    pub merchant_sig: String,
    pub state: RefundState,
    pub mint_pub: Option<String>,
    pub mint_sig: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRefund {
    pub coin_pub: String,
    pub rtransaction_id: i64,
    pub amount: Amount,
    pub reason: String,
    pub merchant_sig: String,
}

//--------------------------------------      Inventory      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct ProductRecord {
    pub id: i64,
    pub instance_id: String,
    pub product_id: String,
    pub description: String,
    pub unit: String,
    pub price: Amount,
    pub image: String,
    pub taxes: Json<Vec<Value>>,
    /// `-1` means unlimited stock.
    pub total_stocked: i64,
    pub total_sold: i64,
    pub total_lost: i64,
    pub next_restock: Timestamp,
    pub address: Json<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductRecord {
    pub fn is_unlimited(&self) -> bool {
        self.total_stocked < 0
    }
}

/// The editable fields of a product. Used both to create a product and to replace its details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub description: String,
    pub unit: String,
    pub price: Amount,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub taxes: Vec<Value>,
    pub total_stocked: i64,
    #[serde(default)]
    pub total_lost: i64,
    #[serde(default)]
    pub next_restock: Timestamp,
    #[serde(default)]
    pub address: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct InventoryLock {
    pub id: i64,
    pub product_serial: i64,
    pub lock_uuid: Option<String>,
    pub order_serial: Option<i64>,
    pub quantity: i64,
    pub expiration: Timestamp,
}

//--------------------------------------      Transfers      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct TransferRecord {
    pub id: i64,
    pub instance_id: String,
    pub wtid: String,
    pub mint_url: String,
    pub total: Amount,
    pub wire_fee: Amount,
    pub h_wire: String,
    pub execution_time: Timestamp,
    pub mint_pub: String,
    pub mint_sig: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct TransferDepositRecord {
    #[serde(skip)]
    pub id: i64,
    #[serde(skip)]
    pub transfer_serial: i64,
    pub order_id: Option<OrderId>,
    pub h_contract: String,
    pub coin_pub: String,
    pub deposit_value: Amount,
    pub deposit_fee: Amount,
}

/// The wire transfer that settled one deposit, as reported by the mint.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct DepositTrackingRecord {
    #[serde(skip)]
    pub deposit_serial: i64,
    pub coin_pub: String,
    pub wtid: String,
    pub mint_url: String,
    pub execution_time: Timestamp,
    pub coin_contribution: Amount,
}
