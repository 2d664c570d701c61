use merchant_common::{Amount, Timestamp};
use serde::{Deserialize, Serialize};

//--------------------------------------      Deposits       ---------------------------------------------------------
/// Everything the mint needs to debit one coin in favour of a merchant contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub coin_pub: String,
    pub denom_pub: String,
    /// The denomination key's signature over the coin public key.
    pub denom_sig: String,
    pub amount_with_fee: Amount,
    pub amount_without_fee: Amount,
    pub refund_fee: Amount,
    pub h_contract_terms: String,
    pub h_wire: String,
    pub merchant_payto_uri: String,
    pub wire_salt: String,
    pub merchant_pub: String,
    pub order_id: String,
    pub timestamp: Timestamp,
    pub refund_deadline: Timestamp,
    pub wire_transfer_deadline: Timestamp,
    /// The wallet's signature authorising this deposit.
    pub coin_sig: String,
}

/// The mint's signed acknowledgement of a deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositConfirmation {
    pub mint_pub: String,
    pub mint_sig: String,
}

//--------------------------------------       Refunds       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundQuery {
    pub coin_pub: String,
    pub h_contract_terms: String,
    pub merchant_pub: String,
    pub rtransaction_id: i64,
}

/// The mint's confirmation that a refund permission was redeemed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundAck {
    pub refund_amount: Amount,
    pub rtransaction_id: i64,
    pub mint_pub: String,
    pub mint_sig: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefundStatus {
    /// The mint has not seen the permission yet.
    Pending,
    Redeemed(RefundAck),
}

//--------------------------------------      Tracking       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositQuery {
    pub h_wire: String,
    pub merchant_pub: String,
    pub h_contract_terms: String,
    pub coin_pub: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositTrack {
    pub wtid: String,
    pub execution_time: Timestamp,
    pub coin_contribution: Amount,
    pub mint_pub: String,
    pub mint_sig: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrackDepositResult {
    /// The deposit has not been aggregated into a transfer yet. `execution_time` is the mint's estimate.
    Pending { execution_time: Timestamp },
    Settled(DepositTrack),
}

/// One deposit contributing to an aggregated wire transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDeposit {
    pub h_contract_terms: String,
    pub coin_pub: String,
    pub deposit_value: Amount,
    pub deposit_fee: Amount,
}

/// The mint's account of an aggregated wire transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDetails {
    pub wtid: String,
    pub total: Amount,
    pub wire_fee: Amount,
    pub h_wire: String,
    pub execution_time: Timestamp,
    pub deposits: Vec<TransferDeposit>,
    pub mint_pub: String,
    pub mint_sig: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn refund_status_is_tagged() {
        let pending = serde_json::to_value(RefundStatus::Pending).unwrap();
        assert_eq!(pending, serde_json::json!({"status": "pending"}));
        let json =
            r#"{"status":"redeemed","refund_amount":"EUR:5","rtransaction_id":1,"mint_pub":"aa","mint_sig":"bb"}"#;
        let status: RefundStatus = serde_json::from_str(json).unwrap();
        match status {
            RefundStatus::Redeemed(ack) => assert_eq!(ack.refund_amount.to_string(), "EUR:5"),
            RefundStatus::Pending => panic!("expected a redeemed refund"),
        }
    }

    #[test]
    fn pending_deposit_track() {
        let json = r#"{"status":"pending","execution_time":{"t_s":1700000000}}"#;
        let track: TrackDepositResult = serde_json::from_str(json).unwrap();
        assert_eq!(track, TrackDepositResult::Pending { execution_time: Timestamp::from_secs(1_700_000_000) });
    }
}
