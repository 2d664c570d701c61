//! Reconciliation of deposits with the wire transfers that settle them.
//!
//! The mint aggregates many deposits into one bank transfer, identified by a wire transfer id (wtid). The merchant
//! can ask in either direction: which transfers settled an order, and which deposits a transfer carries. Transfer
//! reports are audited before they are believed: the deposits, net of their fees and the wire fee, must add up to the
//! total the mint claims, and the report must carry the mint's signature.
use std::{collections::BTreeMap, fmt::Debug};

use log::*;
use merchant_common::{Amount, AmountError, Timestamp};
use mint_client::{normalize_base_url, DepositQuery, MintApi, MintApiError, TrackDepositResult, TransferDetails};
use serde_json::json;

use crate::{
    db_types::{OrderId, OrderRecord, TrustedMint},
    events::{EventProducers, OrderEvent, OrderEventKind},
    helpers::{parse_public_key, SignedPurpose, TransferStatement},
    merchant_api::{
        config::EngineConfig,
        errors::MerchantError,
        payment_api::mint_failure,
        payment_objects::{TrackTransactionResult, TrackTransferResponse, TransactionTransfer},
        registry::{InstanceRegistry, MerchantInstance},
    },
    traits::{InsertedTransfer, MerchantBackend},
};

pub struct TrackApi<B, M> {
    db: B,
    mint: M,
    registry: InstanceRegistry,
    config: EngineConfig,
    producers: EventProducers,
}

impl<B, M> Debug for TrackApi<B, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TrackApi")
    }
}

impl<B, M> TrackApi<B, M> {
    pub fn new(db: B, mint: M, registry: InstanceRegistry, config: EngineConfig, producers: EventProducers) -> Self {
        Self { db, mint, registry, config, producers }
    }
}

impl<B, M> TrackApi<B, M>
where
    B: MerchantBackend,
    M: MintApi,
{
    /// The wire transfers that settled a paid order.
    ///
    /// Deposits not yet matched to a transfer are looked up at the mint, and every transfer it names is fetched and
    /// audited through [`Self::track_transfer`]. The result is pending while any deposit remains unaggregated.
    pub async fn track_transaction(
        &self,
        instance_id: &str,
        order_id: &OrderId,
    ) -> Result<TrackTransactionResult, MerchantError> {
        let instance = self.registry.require(instance_id)?;
        let order = self
            .db
            .fetch_order(instance_id, order_id)
            .await?
            .ok_or_else(|| MerchantError::ContractNotFound(format!("order {order_id}")))?;
        if !order.paid {
            return Err(MerchantError::OrderUnpaid(order.order_id));
        }
        let deposits = self.db.fetch_deposits(order.id).await?;
        let tracked = self.db.fetch_deposit_tracking(order.id).await?;
        let mut estimate: Option<Timestamp> = None;
        let mut wtids = Vec::new();
        let mut settled_coins = Vec::new();
        for deposit in deposits.iter().filter(|d| !tracked.iter().any(|t| t.coin_pub == d.coin_pub)) {
            let query = DepositQuery {
                h_wire: deposit.h_wire.clone(),
                merchant_pub: instance.keys.public_hex(),
                h_contract_terms: order.h_contract.clone(),
                coin_pub: deposit.coin_pub.clone(),
            };
            match self.mint.track_deposit(&deposit.mint_url, &query).await {
                Ok(TrackDepositResult::Pending { execution_time }) => {
                    trace!("🛰️ Coin {} of order {order_id} is not aggregated yet", deposit.coin_pub);
                    estimate = Some(estimate.map_or(execution_time, |t| t.max(execution_time)));
                },
                Ok(TrackDepositResult::Settled(track)) => {
                    settled_coins.push(deposit.coin_pub.clone());
                    let key = (track.wtid, deposit.mint_url.clone());
                    if !wtids.contains(&key) {
                        wtids.push(key);
                    }
                },
                Err(MintApiError::Rejected { status, proof }) => {
                    return Err(MerchantError::FailedDependency {
                        reason: format!("The mint does not know the deposit of coin {}", deposit.coin_pub),
                        detail: json!({
                            "coin_pub": deposit.coin_pub,
                            "mint_http_status": status,
                            "mint_proof": proof,
                        }),
                    });
                },
                Err(e) => return Err(mint_failure(&deposit.mint_url, e)),
            }
        }
        for (wtid, mint_url) in &wtids {
            self.track_transfer(instance_id, wtid, mint_url).await?;
        }
        let tracked = self.db.fetch_deposit_tracking(order.id).await?;
        let missing = settled_coins.iter().filter(|c| !tracked.iter().any(|t| &t.coin_pub == *c)).collect::<Vec<_>>();
        if !missing.is_empty() {
            error!("🛰️ The mint says coins of order {order_id} are settled, but their transfers do not list them");
            return Err(MerchantError::FailedDependency {
                reason: format!("The transfers reported for order {order_id} do not list all of its settled deposits"),
                detail: json!({ "coins": missing, "wtids": wtids.iter().map(|(w, _)| w).collect::<Vec<_>>() }),
            });
        }
        let mut transfers = BTreeMap::<(String, String), TransactionTransfer>::new();
        for t in tracked.iter() {
            let key = (t.wtid.clone(), t.mint_url.clone());
            match transfers.get_mut(&key) {
                Some(entry) => entry.amount = entry.amount.checked_add(&t.coin_contribution)?,
                None => {
                    transfers.insert(key, TransactionTransfer {
                        wtid: t.wtid.clone(),
                        mint_url: t.mint_url.clone(),
                        execution_time: t.execution_time,
                        amount: t.coin_contribution.clone(),
                    });
                },
            }
        }
        let transfers = transfers.into_values().collect::<Vec<_>>();
        if tracked.len() >= deposits.len() {
            Ok(TrackTransactionResult::Settled { transfers })
        } else {
            Ok(TrackTransactionResult::Pending { execution_time: estimate, transfers })
        }
    }

    /// The deposits carried by wire transfer `wtid` from the mint at `mint_url`.
    ///
    /// The first successful call fetches the report from the mint, audits it and stores it. Later calls are answered
    /// from the store. A report that fails the audit is not stored, and is reported as
    /// [`MerchantError::FailedDependency`] with the offending figures.
    pub async fn track_transfer(
        &self,
        instance_id: &str,
        wtid: &str,
        mint_url: &str,
    ) -> Result<TrackTransferResponse, MerchantError> {
        let instance = self.registry.require(instance_id)?;
        let mint_url = normalize_base_url(mint_url);
        let mint =
            self.config
                .trusted_mint(&mint_url)
                .cloned()
                .ok_or_else(|| MerchantError::MintNotTrusted(mint_url.clone()))?;
        if let Some(cached) = self.db.fetch_transfer(instance_id, wtid, &mint_url).await? {
            trace!("🛰️ Transfer {wtid} answered from the store");
            return Ok(transfer_response(cached));
        }
        let details = match self.mint.track_transfer(&mint_url, wtid).await {
            Ok(details) => details,
            Err(MintApiError::Rejected { status, proof }) => {
                return Err(MerchantError::FailedDependency {
                    reason: format!("The mint at {mint_url} does not know wire transfer {wtid}"),
                    detail: json!({ "wtid": wtid, "mint_http_status": status, "mint_proof": proof }),
                });
            },
            Err(e) => return Err(mint_failure(&mint_url, e)),
        };
        if details.wtid != wtid {
            return Err(MerchantError::FailedDependency {
                reason: format!("Asked the mint for transfer {wtid}, but it described {}", details.wtid),
                detail: json!({ "wtid": wtid, "mint_wtid": details.wtid }),
            });
        }
        audit_transfer(&details)?;
        verify_transfer(&details, &mint)?;
        self.check_destination(&instance, &details).await?;
        let inserted = self.db.insert_transfer(instance_id, &mint_url, details).await?;
        info!("🛰️ Transfer {wtid} of {} from {mint_url} recorded for '{instance_id}'", inserted.transfer.total);
        self.announce_wired(instance_id, &inserted).await?;
        Ok(transfer_response(inserted))
    }

    /// The transfer must go to one of this instance's accounts, current or past.
    async fn check_destination(
        &self,
        instance: &MerchantInstance,
        details: &TransferDetails,
    ) -> Result<(), MerchantError> {
        let accounts = self.db.fetch_accounts(instance.serial, false).await?;
        if accounts.iter().any(|a| a.h_wire == details.h_wire) {
            return Ok(());
        }
        error!(
            "🛰️ Transfer {} was wired to {}, which is not an account of '{}'",
            details.wtid,
            details.h_wire,
            instance.id()
        );
        Err(MerchantError::FailedDependency {
            reason: format!("Transfer {} was not made to this merchant", details.wtid),
            detail: json!({ "wtid": details.wtid, "h_wire": details.h_wire }),
        })
    }

    async fn announce_wired(&self, instance_id: &str, inserted: &InsertedTransfer) -> Result<(), MerchantError> {
        let mut order_ids = inserted.deposits.iter().filter_map(|d| d.order_id.clone()).collect::<Vec<_>>();
        order_ids.sort();
        order_ids.dedup();
        for order_id in order_ids {
            let wired = self.db.fetch_order(instance_id, &order_id).await?.is_some_and(|o: OrderRecord| o.wired);
            if wired {
                self.producers.publish(OrderEvent::new(instance_id, order_id, OrderEventKind::Wired)).await;
            }
        }
        Ok(())
    }
}

/// Σ(deposit_value − deposit_fee) − wire_fee must equal the total the mint claims to have wired.
fn audit_transfer(details: &TransferDetails) -> Result<(), MerchantError> {
    let computed = expected_total(details);
    match computed {
        Ok(expected) if expected == details.total => Ok(()),
        Ok(expected) => {
            error!(
                "🛰️ Transfer {} does not add up. The mint claims {}, but the deposits less fees come to \
                 {expected}",
                details.wtid, details.total
            );
            Err(MerchantError::FailedDependency {
                reason: format!("The total of wire transfer {} does not match its deposits", details.wtid),
                detail: json!({
                    "wtid": details.wtid,
                    "mint_total": details.total,
                    "expected_total": expected,
                    "wire_fee": details.wire_fee,
                    "deposit_count": details.deposits.len(),
                }),
            })
        },
        Err(e) => {
            error!("🛰️ Transfer {} can not be audited. {e}", details.wtid);
            Err(MerchantError::FailedDependency {
                reason: format!("The figures of wire transfer {} are inconsistent. {e}", details.wtid),
                detail: json!({ "wtid": details.wtid, "mint_total": details.total, "wire_fee": details.wire_fee }),
            })
        },
    }
}

fn expected_total(details: &TransferDetails) -> Result<Amount, AmountError> {
    let currency = details.total.currency();
    let net = details.deposits.iter().try_fold(Amount::zero(currency)?, |acc, d| {
        acc.checked_add(&d.deposit_value.checked_sub(&d.deposit_fee)?)
    })?;
    net.checked_sub(&details.wire_fee)
}

fn verify_transfer(details: &TransferDetails, mint: &TrustedMint) -> Result<(), MerchantError> {
    let statement = TransferStatement {
        wtid: &details.wtid,
        total: &details.total,
        wire_fee: &details.wire_fee,
        h_wire: &details.h_wire,
        execution_time: details.execution_time,
        deposits: &details.deposits,
    };
    let master_pub = parse_public_key(&mint.master_pub)?;
    statement.verify_hex(&details.mint_sig, &master_pub).map_err(|e| {
        error!("🛰️ The report of transfer {} is not signed by {}. {e}", details.wtid, mint.url);
        MerchantError::FailedDependency {
            reason: format!("The report of wire transfer {} is not signed by the mint", details.wtid),
            detail: json!({ "wtid": details.wtid, "mint_pub": details.mint_pub }),
        }
    })
}

fn transfer_response(inserted: InsertedTransfer) -> TrackTransferResponse {
    let InsertedTransfer { transfer, deposits } = inserted;
    TrackTransferResponse {
        wtid: transfer.wtid,
        mint_url: transfer.mint_url,
        total: transfer.total,
        wire_fee: transfer.wire_fee,
        h_wire: transfer.h_wire,
        execution_time: transfer.execution_time,
        deposits,
    }
}
