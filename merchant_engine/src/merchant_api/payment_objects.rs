use merchant_common::{Amount, Timestamp};
use serde::{Deserialize, Serialize};

use crate::db_types::{DepositRecord, OrderId, RefundRecord, RefundState, TransferDepositRecord};

//--------------------------------------       Payment       ---------------------------------------------------------
/// A wallet's permission to deposit one coin towards a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinPermission {
    pub coin_pub: String,
    pub denom_pub: String,
    /// The denomination key's signature over the coin.
    pub denom_sig: String,
    pub amount_with_fee: Amount,
    pub amount_without_fee: Amount,
    pub refund_fee: Amount,
    pub mint_url: String,
    /// The coin's signature over the deposit permission.
    pub coin_sig: String,
}

/// The body of `POST /orders/{id}/pay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayRequest {
    pub h_contract: String,
    pub coins: Vec<CoinPermission>,
}

#[derive(Debug, Clone)]
pub enum PaymentResult {
    /// The contract is paid. `sig` is the merchant's `PAYMENT_OK` signature over the contract hash.
    Paid { sig: String },
    /// The coins deposited so far do not cover the contract. The wallet may pay with more coins, or abort.
    Partial { deposits: Vec<DepositRecord> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOkResponse {
    pub sig: String,
}

/// The body of `POST /orders/{id}/abort`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbortRequest {
    pub h_contract: String,
}

//--------------------------------------       Refunds       ---------------------------------------------------------
/// A merchant-signed permission for the mint to refund part of a coin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundPermission {
    pub coin_pub: String,
    pub rtransaction_id: i64,
    pub refund_amount: Amount,
    pub merchant_sig: String,
    pub merchant_pub: String,
}

impl RefundPermission {
    pub fn new(refund: &RefundRecord, merchant_pub: &str) -> Self {
        Self {
            coin_pub: refund.coin_pub.clone(),
            rtransaction_id: refund.rtransaction_id,
            refund_amount: refund.amount.clone(),
            merchant_sig: refund.merchant_sig.clone(),
            merchant_pub: merchant_pub.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortResponse {
    pub refunds: Vec<RefundPermission>,
}

/// The body of `POST /private/orders/{id}/refund`: the new refund total for the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub refund: Amount,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundIncreaseResult {
    pub order_id: OrderId,
    pub h_contract: String,
    pub total: Amount,
    /// The permissions created by this increase. Empty if the total was unchanged.
    pub issued: Vec<RefundPermission>,
}

/// The refund of one coin, either still waiting for the wallet to redeem it, or acknowledged by the mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefundEntry {
    Pending {
        coin_pub: String,
        rtransaction_id: i64,
        refund_amount: Amount,
        reason: String,
        merchant_sig: String,
    },
    Gone {
        coin_pub: String,
        rtransaction_id: i64,
        refund_amount: Amount,
        reason: String,
        mint_pub: String,
        mint_sig: String,
    },
}

impl RefundEntry {
    pub fn refund_amount(&self) -> &Amount {
        match self {
            Self::Pending { refund_amount, .. } | Self::Gone { refund_amount, .. } => refund_amount,
        }
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Gone { .. })
    }
}

impl From<&RefundRecord> for RefundEntry {
    fn from(r: &RefundRecord) -> Self {
        match (r.state, &r.mint_pub, &r.mint_sig) {
            (RefundState::Gone, Some(mint_pub), Some(mint_sig)) => Self::Gone {
                coin_pub: r.coin_pub.clone(),
                rtransaction_id: r.rtransaction_id,
                refund_amount: r.amount.clone(),
                reason: r.reason.clone(),
                mint_pub: mint_pub.clone(),
                mint_sig: mint_sig.clone(),
            },
            _ => Self::Pending {
                coin_pub: r.coin_pub.clone(),
                rtransaction_id: r.rtransaction_id,
                refund_amount: r.amount.clone(),
                reason: r.reason.clone(),
                merchant_sig: r.merchant_sig.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundLookupResponse {
    pub order_id: OrderId,
    pub h_contract: String,
    pub merchant_pub: String,
    /// The total of all refunds of the order, redeemed or not.
    pub refund_amount: Amount,
    pub refunds: Vec<RefundEntry>,
}

//--------------------------------------      Tracking       ---------------------------------------------------------
/// A wire transfer that (partly) settled an order, and how much of the order it carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionTransfer {
    pub wtid: String,
    pub mint_url: String,
    pub execution_time: Timestamp,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrackTransactionResult {
    /// Some deposits have not been aggregated yet. `transfers` lists those that have.
    Pending { execution_time: Option<Timestamp>, transfers: Vec<TransactionTransfer> },
    Settled { transfers: Vec<TransactionTransfer> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackTransferResponse {
    pub wtid: String,
    pub mint_url: String,
    pub total: Amount,
    pub wire_fee: Amount,
    pub h_wire: String,
    pub execution_time: Timestamp,
    pub deposits: Vec<TransferDepositRecord>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn refund_entries_are_tagged() {
        let entry = RefundEntry::Gone {
            coin_pub: "c".into(),
            rtransaction_id: 1,
            refund_amount: "EUR:5".parse().unwrap(),
            reason: "abort".into(),
            mint_pub: "m".into(),
            mint_sig: "s".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "gone");
        assert_eq!(json["refund_amount"], "EUR:5");
        assert!(entry.is_gone());
    }
}
