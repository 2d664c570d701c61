//! The wallet side of an order: paying with coins, and aborting a payment that could not be completed.
//!
//! Coins are checked locally first, so that nothing reaches the mint on behalf of a forged permission. The surviving
//! coins are deposited at their mints concurrently, and only once every deposit has come back does the engine open
//! the transaction that records them. A coin the mint has accepted stays deposited even if a later step fails; the
//! next attempt finds it in the store and does not deposit it again.
use std::{collections::HashSet, fmt::Debug};

use futures_util::{stream, StreamExt};
use log::*;
use merchant_common::Timestamp;
use mint_client::{DepositConfirmation, DepositRequest, MintApi, MintApiError};

use crate::{
    db_types::{ContractTerms, NewDeposit, OrderId, OrderRecord, TrustedMint, WireAccount},
    events::{EventProducers, OrderEvent, OrderEventKind},
    helpers::{
        parse_public_key,
        DenominationStatement,
        DepositPermissionStatement,
        PaymentOkStatement,
        SignedPurpose,
        WireDepositStatement,
    },
    merchant_api::{
        config::EngineConfig,
        errors::MerchantError,
        payment_objects::{AbortRequest, CoinPermission, PayRequest, PaymentResult, RefundPermission},
        registry::{InstanceRegistry, MerchantInstance},
    },
    traits::{MerchantBackend, PaymentSettlement},
};

/// What became of one coin at its mint.
enum CoinOutcome {
    Deposited(NewDeposit),
    Rejected { coin_pub: String, status: u16, proof: serde_json::Value },
    Failed(MerchantError),
}

pub struct PaymentApi<B, M> {
    db: B,
    mint: M,
    registry: InstanceRegistry,
    config: EngineConfig,
    producers: EventProducers,
}

impl<B, M> Debug for PaymentApi<B, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentApi")
    }
}

impl<B, M> PaymentApi<B, M> {
    pub fn new(db: B, mint: M, registry: InstanceRegistry, config: EngineConfig, producers: EventProducers) -> Self {
        Self { db, mint, registry, config, producers }
    }
}

impl<B, M> PaymentApi<B, M>
where
    B: MerchantBackend,
    M: MintApi,
{
    /// Pays (part of) a claimed contract.
    ///
    /// Returns [`PaymentResult::Paid`] with the receipt signature once the recorded deposits cover the contract.
    /// Paying an order that is already paid returns the original receipt. If the mint refuses a coin, the mint's
    /// proof is returned as [`MerchantError::MintRejected`]; coins it accepted remain recorded.
    pub async fn pay(
        &self,
        instance_id: &str,
        order_id: &OrderId,
        request: PayRequest,
    ) -> Result<PaymentResult, MerchantError> {
        let instance = self.registry.require(instance_id)?;
        let order = self.contract(instance_id, order_id, &request.h_contract).await?;
        if self.db.fetch_claim(order.id).await?.is_none() {
            return Err(MerchantError::OrderNotClaimed(order.order_id));
        }
        if order.aborted {
            return Err(MerchantError::OrderAborted(order.order_id));
        }
        if let (true, Some(sig)) = (order.paid, &order.payment_sig) {
            debug!("💰️ Order [{instance_id}/{order_id}] is already paid. Replaying the receipt");
            return Ok(PaymentResult::Paid { sig: sig.clone() });
        }
        if order.pay_deadline.is_before(Timestamp::now()) {
            let reason = format!("Order {order_id} had to be paid by {}", order.pay_deadline);
            return Err(MerchantError::DeadlineExceeded(reason));
        }
        if request.coins.is_empty() {
            return Err(MerchantError::ParameterMissing("coins".into()));
        }
        let terms = order.terms().map_err(|e| {
            error!("💰️ Stored contract of order [{instance_id}/{order_id}] does not parse. {e}");
            MerchantError::SignatureInvariantFailure
        })?;
        let account = self.contract_account(&instance, &terms).await?;
        let recorded = self.db.fetch_deposits(order.id).await?;
        let mut seen = HashSet::new();
        let mut fresh = Vec::with_capacity(request.coins.len());
        for coin in request.coins {
            if !seen.insert(coin.coin_pub.clone()) {
                return Err(MerchantError::malformed("coins", format!("Coin {} is listed twice", coin.coin_pub)));
            }
            if recorded.iter().any(|d| d.coin_pub == coin.coin_pub) {
                trace!("💰️ Coin {} is already deposited for order {order_id}", coin.coin_pub);
                continue;
            }
            let mint = check_coin(&coin, &order, &terms)?;
            fresh.push((coin, mint));
        }
        let outcomes = stream::iter(fresh)
            .map(|(coin, mint)| self.deposit_coin(coin, mint, &order, &terms, &account))
            .buffer_unordered(self.config.pay_fanout.max(1))
            .collect::<Vec<_>>()
            .await;
        let mut deposits = Vec::with_capacity(outcomes.len());
        let mut rejection = None;
        let mut failure = None;
        for outcome in outcomes {
            match outcome {
                CoinOutcome::Deposited(d) => deposits.push(d),
                CoinOutcome::Rejected { coin_pub, status, proof } => {
                    rejection.get_or_insert(MerchantError::MintRejected { coin_pub, status, proof });
                },
                CoinOutcome::Failed(e) => {
                    failure.get_or_insert(e);
                },
            }
        }
        let payment_sig = PaymentOkStatement { h_contract: &order.h_contract }.sign_hex(instance.keys.secret())?;
        let settlement =
            PaymentSettlement { amount: order.amount.clone(), max_fee: terms.max_fee.clone(), payment_sig };
        let outcome = self.db.record_deposits(order.id, deposits, settlement, &instance.keys).await?;
        if outcome.aborted {
            info!("💰️ Order [{instance_id}/{order_id}] was aborted during payment. Its coins are being refunded");
            return Err(MerchantError::OrderAborted(order.order_id));
        }
        if let Some(sig) = outcome.payment_sig {
            if outcome.newly_paid {
                self.producers.publish(OrderEvent::new(instance_id, order_id.clone(), OrderEventKind::Paid)).await;
            }
            return Ok(PaymentResult::Paid { sig });
        }
        if let Some(e) = rejection.or(failure) {
            return Err(e);
        }
        debug!("💰️ Order [{instance_id}/{order_id}] is partially paid by {} coin(s)", outcome.deposits.len());
        Ok(PaymentResult::Partial { deposits: outcome.deposits })
    }

    /// Gives up on paying an order. Every coin deposited so far gets a refund permission for what is still refundable
    /// on it, which the wallet redeems at the mint. The response lists every refund permission of the order, including
    /// merchant refunds granted earlier. Aborting again returns the same permissions, plus any for coins the mint
    /// accepted while the abort was underway.
    pub async fn abort(
        &self,
        instance_id: &str,
        order_id: &OrderId,
        request: AbortRequest,
    ) -> Result<Vec<RefundPermission>, MerchantError> {
        let instance = self.registry.require(instance_id)?;
        let order = self.contract(instance_id, order_id, &request.h_contract).await?;
        let refunds = self.db.abort_order(order.id, &instance.keys).await?;
        if !order.aborted {
            self.producers.publish(OrderEvent::new(instance_id, order_id.clone(), OrderEventKind::Aborted)).await;
        }
        let merchant_pub = instance.keys.public_hex();
        Ok(refunds.iter().map(|r| RefundPermission::new(r, &merchant_pub)).collect())
    }

    /// The order, provided `h_contract` is the hash of its contract.
    async fn contract(
        &self,
        instance_id: &str,
        order_id: &OrderId,
        h_contract: &str,
    ) -> Result<OrderRecord, MerchantError> {
        self.db
            .fetch_order(instance_id, order_id)
            .await?
            .filter(|o| o.h_contract.eq_ignore_ascii_case(h_contract))
            .ok_or_else(|| MerchantError::ContractNotFound(format!("order {order_id} with hash {h_contract}")))
    }

    /// The account the contract pays into. It may have been inactivated since the contract was made.
    async fn contract_account(
        &self,
        instance: &MerchantInstance,
        terms: &ContractTerms,
    ) -> Result<WireAccount, MerchantError> {
        let accounts = self.db.fetch_accounts(instance.serial, false).await?;
        accounts.into_iter().find(|a| a.h_wire == terms.h_wire).ok_or_else(|| {
            let (h_wire, order_id) = (&terms.h_wire, &terms.order_id);
            error!("💰️ The account {h_wire} of order {order_id} does not belong to '{}'", instance.id());
            MerchantError::SignatureInvariantFailure
        })
    }

    async fn deposit_coin(
        &self,
        coin: CoinPermission,
        mint: TrustedMint,
        order: &OrderRecord,
        terms: &ContractTerms,
        account: &WireAccount,
    ) -> CoinOutcome {
        let request = DepositRequest {
            coin_pub: coin.coin_pub.clone(),
            denom_pub: coin.denom_pub.clone(),
            denom_sig: coin.denom_sig.clone(),
            amount_with_fee: coin.amount_with_fee.clone(),
            amount_without_fee: coin.amount_without_fee.clone(),
            refund_fee: coin.refund_fee.clone(),
            h_contract_terms: order.h_contract.clone(),
            h_wire: account.h_wire.clone(),
            merchant_payto_uri: account.payto_uri.clone(),
            wire_salt: account.salt.clone(),
            merchant_pub: terms.merchant_pub.clone(),
            order_id: order.order_id.to_string(),
            timestamp: terms.timestamp,
            refund_deadline: terms.refund_deadline,
            wire_transfer_deadline: terms.wire_transfer_deadline,
            coin_sig: coin.coin_sig.clone(),
        };
        let confirmation = match self.mint.deposit(&mint.url, &request).await {
            Ok(c) => c,
            Err(MintApiError::Rejected { status, proof }) => {
                info!("💰️ The mint at {} refused coin {} ({status})", mint.url, coin.coin_pub);
                return CoinOutcome::Rejected { coin_pub: coin.coin_pub, status, proof };
            },
            Err(e) => return CoinOutcome::Failed(mint_failure(&mint.url, e)),
        };
        if let Err(e) = check_confirmation(&confirmation, &request, &mint) {
            return CoinOutcome::Failed(e);
        }
        let deposit_fee = match coin.amount_with_fee.checked_sub(&coin.amount_without_fee) {
            Ok(fee) => fee,
            Err(e) => return CoinOutcome::Failed(e.into()),
        };
        trace!("💰️ Coin {} deposited at {}", coin.coin_pub, mint.url);
        CoinOutcome::Deposited(NewDeposit {
            coin_pub: coin.coin_pub,
            denom_pub: coin.denom_pub,
            denom_sig: coin.denom_sig,
            coin_sig: coin.coin_sig,
            amount_with_fee: coin.amount_with_fee,
            amount_without_fee: coin.amount_without_fee,
            deposit_fee,
            refund_fee: coin.refund_fee,
            mint_url: mint.url,
            mint_pub: confirmation.mint_pub,
            mint_sig: confirmation.mint_sig,
            h_wire: account.h_wire.clone(),
        })
    }
}

/// Local checks on a coin: amounts, the mint, and both signatures. Returns the mint the coin must be deposited at.
fn check_coin(coin: &CoinPermission, order: &OrderRecord, terms: &ContractTerms) -> Result<TrustedMint, MerchantError> {
    for amount in [&coin.amount_with_fee, &coin.amount_without_fee, &coin.refund_fee] {
        if !amount.same_currency(&order.amount) {
            return Err(MerchantError::CurrencyMismatch {
                expected: order.amount.currency().to_string(),
                found: amount.currency().to_string(),
            });
        }
    }
    if coin.amount_without_fee > coin.amount_with_fee {
        return Err(MerchantError::malformed("amount_without_fee", "A coin's deposit fee can not be negative"));
    }
    if coin.refund_fee > coin.amount_with_fee {
        return Err(MerchantError::malformed("refund_fee", "The refund fee exceeds the coin's value"));
    }
    let mint =
        terms.trusts_mint(&coin.mint_url).cloned().ok_or_else(|| MerchantError::MintNotTrusted(coin.mint_url.clone()))?;
    let invalid = |reason: String| MerchantError::CoinSignatureInvalid { coin_pub: coin.coin_pub.clone(), reason };
    let coin_key = parse_public_key(&coin.coin_pub).map_err(|e| invalid(e.to_string()))?;
    let denom_key = parse_public_key(&coin.denom_pub).map_err(|e| invalid(e.to_string()))?;
    DenominationStatement { coin_pub: &coin.coin_pub }
        .verify_hex(&coin.denom_sig, &denom_key)
        .map_err(|e| invalid(e.to_string()))?;
    DepositPermissionStatement {
        h_contract: &order.h_contract,
        h_wire: &terms.h_wire,
        amount_with_fee: &coin.amount_with_fee,
        amount_without_fee: &coin.amount_without_fee,
        refund_fee: &coin.refund_fee,
        coin_pub: &coin.coin_pub,
        merchant_pub: &terms.merchant_pub,
        timestamp: terms.timestamp,
        refund_deadline: terms.refund_deadline,
    }
    .verify_hex(&coin.coin_sig, &coin_key)
    .map_err(|e| invalid(e.to_string()))?;
    Ok(mint)
}

/// The mint's confirmation must be signed by the master key the merchant trusts for that mint.
fn check_confirmation(
    confirmation: &DepositConfirmation,
    request: &DepositRequest,
    mint: &TrustedMint,
) -> Result<(), MerchantError> {
    let statement = WireDepositStatement {
        h_contract: &request.h_contract_terms,
        h_wire: &request.h_wire,
        timestamp: request.timestamp,
        refund_deadline: request.refund_deadline,
        transaction_id: &request.order_id,
        amount_without_fee: &request.amount_without_fee,
        coin_pub: &request.coin_pub,
        merchant_pub: &request.merchant_pub,
    };
    let master_pub = parse_public_key(&mint.master_pub)?;
    statement.verify_hex(&confirmation.mint_sig, &master_pub).map_err(|e| {
        error!("💰️ The mint at {} confirmed coin {} with a bad signature. {e}", mint.url, request.coin_pub);
        MerchantError::FailedDependency {
            reason: format!("The deposit confirmation for coin {} does not verify", request.coin_pub),
            detail: serde_json::json!({ "coin_pub": request.coin_pub, "mint_pub": confirmation.mint_pub }),
        }
    })
}

/// Maps mint client failures other than rejections.
pub(crate) fn mint_failure(mint_url: &str, e: MintApiError) -> MerchantError {
    match e {
        MintApiError::Unreachable { url, reason } => {
            warn!("🏦️ The mint at {url} is unreachable. {reason}");
            MerchantError::MintUnreachable(url)
        },
        MintApiError::Initialization(reason) | MintApiError::RequestError(reason) => {
            warn!("🏦️ Could not talk to the mint at {mint_url}. {reason}");
            MerchantError::MintUnreachable(mint_url.to_string())
        },
        MintApiError::JsonError(reason) | MintApiError::ResponseError(reason) => {
            error!("🏦️ The mint at {mint_url} sent a malformed reply. {reason}");
            MerchantError::FailedDependency {
                reason: format!("The mint at {mint_url} sent a malformed reply"),
                detail: serde_json::Value::Null,
            }
        },
        MintApiError::Rejected { status, proof } => MerchantError::FailedDependency {
            reason: format!("The mint at {mint_url} refused the request ({status})"),
            detail: proof,
        },
    }
}

