//! A deterministic, in-memory mint.
//!
//! `FakeMint` keeps its whole ledger in memory and signs everything with a random master key, so the engine can be
//! driven through complete payment, refund and settlement flows without a network. Tests control it directly: they
//! redeem refund permissions on behalf of a wallet, trigger aggregation into a wire transfer, take the mint offline,
//! or have it misreport transfer totals.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use merchant_common::{Amount, Timestamp};
use mint_client::{
    normalize_base_url,
    DepositConfirmation,
    DepositQuery,
    DepositRequest,
    DepositTrack,
    MintApi,
    MintApiError,
    RefundAck,
    RefundQuery,
    RefundStatus,
    TrackDepositResult,
    TransferDeposit,
    TransferDetails,
};
use serde_json::json;

use crate::{
    db_types::TrustedMint,
    helpers::{
        parse_public_key,
        MerchantKeys,
        RefundApprovalStatement,
        RefundOkStatement,
        SignedPurpose,
        TransferStatement,
        WireDepositStatement,
    },
    merchant_api::payment_objects::RefundPermission,
};

struct FakeDeposit {
    request: DepositRequest,
    confirmation: DepositConfirmation,
    wtid: Option<String>,
}

#[derive(Default)]
struct Ledger {
    deposits: Vec<FakeDeposit>,
    /// Redeemed refunds, keyed by (coin_pub, h_contract, rtransaction_id).
    refunds: HashMap<(String, String, i64), Amount>,
    transfers: HashMap<String, TransferDetails>,
    misreported_total: Option<Amount>,
    offline: bool,
}

#[derive(Clone)]
pub struct FakeMint {
    url: String,
    master: Arc<MerchantKeys>,
    ledger: Arc<Mutex<Ledger>>,
}

impl FakeMint {
    pub fn new(url: &str) -> Self {
        Self { url: normalize_base_url(url), master: Arc::new(MerchantKeys::random()), ledger: Arc::default() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn master_pub(&self) -> String {
        self.master.public_hex()
    }

    /// The entry a merchant needs to trust this mint.
    pub fn trusted(&self) -> TrustedMint {
        TrustedMint { url: self.url.clone(), master_pub: self.master_pub() }
    }

    pub fn set_offline(&self, offline: bool) {
        self.ledger().offline = offline;
    }

    /// From now on, every transfer report claims `total`, correctly signed.
    pub fn misreport_transfer_totals(&self, total: Option<Amount>) {
        self.ledger().misreported_total = total;
    }

    pub fn is_spent(&self, coin_pub: &str) -> bool {
        self.ledger().deposits.iter().any(|d| d.request.coin_pub == coin_pub)
    }

    pub fn deposit_count(&self) -> usize {
        self.ledger().deposits.len()
    }

    /// Plays the wallet's part of a refund: presents the merchant's permission to the mint.
    pub fn redeem_refund(&self, h_contract: &str, permission: &RefundPermission) -> Result<(), String> {
        let merchant_pub = parse_public_key(&permission.merchant_pub).map_err(|e| e.to_string())?;
        RefundApprovalStatement {
            coin_pub: &permission.coin_pub,
            h_contract,
            rtransaction_id: permission.rtransaction_id,
            refund_amount: &permission.refund_amount,
        }
        .verify_hex(&permission.merchant_sig, &merchant_pub)
        .map_err(|e| e.to_string())?;
        let mut ledger = self.ledger();
        if !ledger.deposits.iter().any(|d| d.request.coin_pub == permission.coin_pub) {
            return Err(format!("Coin {} was never deposited here", permission.coin_pub));
        }
        let key = (permission.coin_pub.clone(), h_contract.to_string(), permission.rtransaction_id);
        ledger.refunds.insert(key, permission.refund_amount.clone());
        Ok(())
    }

    /// Aggregates every deposit not yet wired into one transfer `wtid`, charging `wire_fee`. Returns `None` if there
    /// was nothing to aggregate.
    pub fn aggregate(&self, wtid: &str, wire_fee: Amount) -> Option<TransferDetails> {
        let mut ledger = self.ledger();
        let pending = ledger.deposits.iter_mut().filter(|d| d.wtid.is_none()).collect::<Vec<_>>();
        let h_wire = pending.first()?.request.h_wire.clone();
        let mut total = wire_fee.to_zero();
        let mut deposits = Vec::new();
        for deposit in pending.into_iter().filter(|d| d.request.h_wire == h_wire) {
            let fee = deposit.request.amount_with_fee.checked_sub(&deposit.request.amount_without_fee).ok()?;
            total = total.checked_add(&deposit.request.amount_without_fee).ok()?;
            deposits.push(TransferDeposit {
                h_contract_terms: deposit.request.h_contract_terms.clone(),
                coin_pub: deposit.request.coin_pub.clone(),
                deposit_value: deposit.request.amount_with_fee.clone(),
                deposit_fee: fee,
            });
            deposit.wtid = Some(wtid.to_string());
        }
        let total = total.checked_sub(&wire_fee).ok()?;
        let details = self.sign_transfer(wtid, total, wire_fee, h_wire, Timestamp::now(), deposits);
        ledger.transfers.insert(wtid.to_string(), details.clone());
        Some(details)
    }

    fn sign_transfer(
        &self,
        wtid: &str,
        total: Amount,
        wire_fee: Amount,
        h_wire: String,
        execution_time: Timestamp,
        deposits: Vec<TransferDeposit>,
    ) -> TransferDetails {
        let statement = TransferStatement {
            wtid,
            total: &total,
            wire_fee: &wire_fee,
            h_wire: &h_wire,
            execution_time,
            deposits: &deposits,
        };
        let mint_sig = statement.sign_hex(self.master.secret()).expect("Fake mint could not sign a transfer");
        TransferDetails {
            wtid: wtid.to_string(),
            total,
            wire_fee,
            h_wire,
            execution_time,
            deposits,
            mint_pub: self.master_pub(),
            mint_sig,
        }
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_online(&self, mint_base_url: &str) -> Result<(), MintApiError> {
        if self.ledger().offline {
            let url = mint_base_url.to_string();
            return Err(MintApiError::Unreachable { url, reason: "connection refused".into() });
        }
        Ok(())
    }
}

impl MintApi for FakeMint {
    async fn deposit(
        &self,
        mint_base_url: &str,
        request: &DepositRequest,
    ) -> Result<DepositConfirmation, MintApiError> {
        self.check_online(mint_base_url)?;
        let mut ledger = self.ledger();
        if let Some(earlier) = ledger.deposits.iter().find(|d| d.request.coin_pub == request.coin_pub) {
            if earlier.request.h_contract_terms == request.h_contract_terms {
                return Ok(earlier.confirmation.clone());
            }
            let proof = json!({
                "code": "COIN_INSUFFICIENT_FUNDS",
                "hint": "The coin has already been spent",
                "coin_pub": earlier.request.coin_pub,
                "history": [{
                    "type": "DEPOSIT",
                    "h_contract_terms": earlier.request.h_contract_terms,
                    "amount": earlier.request.amount_with_fee,
                    "merchant_pub": earlier.request.merchant_pub,
                    "coin_sig": earlier.request.coin_sig,
                    "mint_sig": earlier.confirmation.mint_sig,
                }],
            });
            return Err(MintApiError::Rejected { status: 409, proof });
        }
        let mint_sig = WireDepositStatement {
            h_contract: &request.h_contract_terms,
            h_wire: &request.h_wire,
            timestamp: request.timestamp,
            refund_deadline: request.refund_deadline,
            transaction_id: &request.order_id,
            amount_without_fee: &request.amount_without_fee,
            coin_pub: &request.coin_pub,
            merchant_pub: &request.merchant_pub,
        }
        .sign_hex(self.master.secret())
        .map_err(|e| MintApiError::ResponseError(e.to_string()))?;
        let confirmation = DepositConfirmation { mint_pub: self.master_pub(), mint_sig };
        ledger.deposits.push(FakeDeposit { request: request.clone(), confirmation: confirmation.clone(), wtid: None });
        Ok(confirmation)
    }

    async fn refund_status(&self, mint_base_url: &str, query: &RefundQuery) -> Result<RefundStatus, MintApiError> {
        self.check_online(mint_base_url)?;
        let key = (query.coin_pub.clone(), query.h_contract_terms.clone(), query.rtransaction_id);
        let Some(amount) = self.ledger().refunds.get(&key).cloned() else {
            return Ok(RefundStatus::Pending);
        };
        let mint_sig = RefundOkStatement {
            coin_pub: &query.coin_pub,
            h_contract: &query.h_contract_terms,
            rtransaction_id: query.rtransaction_id,
            refund_amount: &amount,
            merchant_pub: &query.merchant_pub,
        }
        .sign_hex(self.master.secret())
        .map_err(|e| MintApiError::ResponseError(e.to_string()))?;
        Ok(RefundStatus::Redeemed(RefundAck {
            refund_amount: amount,
            rtransaction_id: query.rtransaction_id,
            mint_pub: self.master_pub(),
            mint_sig,
        }))
    }

    async fn track_deposit(
        &self,
        mint_base_url: &str,
        query: &DepositQuery,
    ) -> Result<TrackDepositResult, MintApiError> {
        self.check_online(mint_base_url)?;
        let ledger = self.ledger();
        let deposit = ledger
            .deposits
            .iter()
            .find(|d| d.request.coin_pub == query.coin_pub && d.request.h_contract_terms == query.h_contract_terms)
            .ok_or_else(|| MintApiError::Rejected {
                status: 404,
                proof: json!({ "code": "DEPOSIT_UNKNOWN", "coin_pub": query.coin_pub }),
            })?;
        let Some(wtid) = &deposit.wtid else {
            return Ok(TrackDepositResult::Pending { execution_time: deposit.request.wire_transfer_deadline });
        };
        let execution_time = ledger.transfers.get(wtid).map(|t| t.execution_time).unwrap_or_default();
        Ok(TrackDepositResult::Settled(DepositTrack {
            wtid: wtid.clone(),
            execution_time,
            coin_contribution: deposit.request.amount_without_fee.clone(),
            mint_pub: deposit.confirmation.mint_pub.clone(),
            mint_sig: deposit.confirmation.mint_sig.clone(),
        }))
    }

    async fn track_transfer(&self, mint_base_url: &str, wtid: &str) -> Result<TransferDetails, MintApiError> {
        self.check_online(mint_base_url)?;
        let (details, misreported) = {
            let ledger = self.ledger();
            let details = ledger.transfers.get(wtid).cloned().ok_or_else(|| MintApiError::Rejected {
                status: 404,
                proof: json!({ "code": "TRANSFER_UNKNOWN", "wtid": wtid }),
            })?;
            (details, ledger.misreported_total.clone())
        };
        match misreported {
            Some(total) => Ok(self.sign_transfer(
                &details.wtid,
                total,
                details.wire_fee,
                details.h_wire,
                details.execution_time,
                details.deposits,
            )),
            None => Ok(details),
        }
    }
}
