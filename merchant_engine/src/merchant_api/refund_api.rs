use std::fmt::Debug;

use futures_util::future::join_all;
use log::*;
use merchant_common::{Amount, Timestamp};
use mint_client::{MintApi, RefundQuery, RefundStatus};

use crate::{
    db_types::{ContractTerms, DepositRecord, OrderId, OrderRecord, RefundRecord, RefundState},
    events::{EventProducers, OrderEvent, OrderEventKind},
    helpers::{parse_public_key, RefundOkStatement, SignedPurpose},
    merchant_api::{
        errors::MerchantError,
        payment_api::mint_failure,
        payment_objects::{RefundEntry, RefundIncreaseResult, RefundLookupResponse, RefundPermission, RefundRequest},
        registry::InstanceRegistry,
    },
    traits::MerchantBackend,
};

/// `RefundApi` raises the refund of paid orders, and reports on refunds after asking the mint which of them the
/// wallet has already redeemed.
pub struct RefundApi<B, M> {
    db: B,
    mint: M,
    registry: InstanceRegistry,
    producers: EventProducers,
}

impl<B, M> Debug for RefundApi<B, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundApi")
    }
}

impl<B, M> RefundApi<B, M> {
    pub fn new(db: B, mint: M, registry: InstanceRegistry, producers: EventProducers) -> Self {
        Self { db, mint, registry, producers }
    }
}

impl<B, M> RefundApi<B, M>
where
    B: MerchantBackend,
    M: MintApi,
{
    /// Raises the refund total of a paid or partially paid order to `request.refund`. A partially paid order can be
    /// refunded up to what has been deposited so far. Totals never decrease; asking for the current total again
    /// changes nothing.
    pub async fn increase_refund(
        &self,
        instance_id: &str,
        order_id: &OrderId,
        request: RefundRequest,
    ) -> Result<RefundIncreaseResult, MerchantError> {
        let instance = self.registry.require(instance_id)?;
        let order = self.fetch_order(instance_id, order_id).await?;
        if !request.refund.same_currency(&order.amount) {
            return Err(MerchantError::CurrencyMismatch {
                expected: order.amount.currency().to_string(),
                found: request.refund.currency().to_string(),
            });
        }
        // A zero refund deadline means no deadline was set.
        if !order.refund_deadline.is_zero() && order.refund_deadline.is_before(Timestamp::now()) {
            return Err(MerchantError::RefundNotPermittedAfterDeadline(order.order_id));
        }
        let increase = self.db.increase_refund(order.id, request.refund, &request.reason, &instance.keys).await?;
        if !increase.issued.is_empty() {
            let kind = OrderEventKind::Refunded { total: increase.total.clone() };
            self.producers.publish(OrderEvent::new(instance_id, order_id.clone(), kind)).await;
        }
        let merchant_pub = instance.keys.public_hex();
        Ok(RefundIncreaseResult {
            order_id: order.order_id,
            h_contract: order.h_contract,
            total: increase.total,
            issued: increase.issued.iter().map(|r| RefundPermission::new(r, &merchant_pub)).collect(),
        })
    }

    /// Lists the refunds of an order. Pending refunds are checked with the mint first, and those it has executed are
    /// recorded as gone. An unreachable mint leaves its refunds pending.
    pub async fn lookup_refunds(
        &self,
        instance_id: &str,
        order_id: &OrderId,
    ) -> Result<RefundLookupResponse, MerchantError> {
        let instance = self.registry.require(instance_id)?;
        let order = self.fetch_order(instance_id, order_id).await?;
        let terms = order.terms().map_err(|e| {
            error!("↩️ Stored contract of order [{instance_id}/{order_id}] does not parse. {e}");
            MerchantError::SignatureInvariantFailure
        })?;
        let merchant_pub = instance.keys.public_hex();
        let deposits = self.db.fetch_deposits(order.id).await?;
        let mut refunds = self.db.fetch_refunds(order.id).await?;
        let checks = refunds
            .iter()
            .filter(|r| r.state == RefundState::Pending)
            .filter_map(|r| deposits.iter().find(|d| d.coin_pub == r.coin_pub).map(|d| (r, d)))
            .map(|(refund, deposit)| self.check_redeemed(&order, &terms, &merchant_pub, refund, deposit));
        let acknowledged = join_all(checks).await.into_iter().flatten().collect::<Vec<_>>();
        for (refund_id, mint_pub, mint_sig) in acknowledged {
            self.db.mark_refund_redeemed(refund_id, &mint_pub, &mint_sig).await?;
            if let Some(r) = refunds.iter_mut().find(|r| r.id == refund_id) {
                r.state = RefundState::Gone;
                r.mint_pub = Some(mint_pub);
                r.mint_sig = Some(mint_sig);
            }
        }
        let refund_amount = Amount::sum(order.amount.currency(), refunds.iter().map(|r| &r.amount))?;
        Ok(RefundLookupResponse {
            order_id: order.order_id,
            h_contract: order.h_contract,
            merchant_pub,
            refund_amount,
            refunds: refunds.iter().map(RefundEntry::from).collect(),
        })
    }

    /// Asks the mint whether a refund was executed. Returns the mint's signed acknowledgement if it was, and it
    /// verifies.
    async fn check_redeemed(
        &self,
        order: &OrderRecord,
        terms: &ContractTerms,
        merchant_pub: &str,
        refund: &RefundRecord,
        deposit: &DepositRecord,
    ) -> Option<(i64, String, String)> {
        let query = RefundQuery {
            coin_pub: refund.coin_pub.clone(),
            h_contract_terms: order.h_contract.clone(),
            merchant_pub: merchant_pub.to_string(),
            rtransaction_id: refund.rtransaction_id,
        };
        let ack = match self.mint.refund_status(&deposit.mint_url, &query).await {
            Ok(RefundStatus::Redeemed(ack)) => ack,
            Ok(RefundStatus::Pending) => return None,
            Err(e) => {
                let e = mint_failure(&deposit.mint_url, e);
                let (coin, rtid) = (&refund.coin_pub, refund.rtransaction_id);
                warn!("↩️ Could not check refund {coin}/{rtid} with the mint. {e}");
                return None;
            },
        };
        let mint = terms.trusts_mint(&deposit.mint_url)?;
        let statement = RefundOkStatement {
            coin_pub: &refund.coin_pub,
            h_contract: &order.h_contract,
            rtransaction_id: refund.rtransaction_id,
            refund_amount: &refund.amount,
            merchant_pub,
        };
        let valid = parse_public_key(&mint.master_pub).and_then(|key| statement.verify_hex(&ack.mint_sig, &key));
        match valid {
            Ok(()) => Some((refund.id, ack.mint_pub, ack.mint_sig)),
            Err(e) => {
                error!(
                    "↩️ The mint at {} acknowledged refund {}/{} with a bad signature. {e}",
                    deposit.mint_url, refund.coin_pub, refund.rtransaction_id
                );
                None
            },
        }
    }

    async fn fetch_order(&self, instance_id: &str, order_id: &OrderId) -> Result<OrderRecord, MerchantError> {
        self.db
            .fetch_order(instance_id, order_id)
            .await?
            .ok_or_else(|| MerchantError::ContractNotFound(format!("order {order_id}")))
    }
}
