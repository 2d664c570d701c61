use std::{
    collections::BTreeMap,
    fmt::Debug,
    time::{Duration, Instant},
};

use log::*;
use merchant_common::{Amount, Timestamp};
use serde_json::Value;

use crate::{
    db_types::{
        ContractProduct,
        ContractTerms,
        MerchantDescriptor,
        NewOrder,
        OrderId,
        OrderRecord,
        OrderStatus,
        WireAccount,
        DEFAULT_INSTANCE,
    },
    events::{EventProducers, OrderEvent, OrderEventBus, OrderEventKind},
    helpers::{canonicalize, new_order_id, parse_public_key, ContractStatement, SignedPurpose},
    merchant_api::{
        config::EngineConfig,
        errors::MerchantError,
        order_objects::{
            ClaimResponse,
            OrderListEntry,
            OrderStatusResponse,
            PostOrderRequest,
            PostOrderResponse,
            RawOrder,
            StatusQuery,
        },
        registry::{InstanceRegistry, MerchantInstance},
    },
    sqlite::ABORT_REFUND_REASON,
    traits::{MerchantBackend, OrderQueryFilter},
};

const ADDRESS_LABEL: &str = "merchant-address";
const JURISDICTION_LABEL: &str = "merchant-jurisdiction";

/// The base URL of an instance, given the base URL of the server. The default instance lives at the root.
pub fn instance_base_url(server_base_url: &str, instance_id: &str) -> String {
    let base = format!("{}/", server_base_url.trim_end_matches('/'));
    if instance_id == DEFAULT_INSTANCE {
        base
    } else {
        format!("{base}instances/{instance_id}/")
    }
}

/// `OrderApi` turns raw orders into signed contracts, hands contracts to the wallets that claim them, and reports on
/// their progress.
pub struct OrderApi<B> {
    db: B,
    registry: InstanceRegistry,
    config: EngineConfig,
    producers: EventProducers,
}

impl<B> Debug for OrderApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderApi")
    }
}

impl<B> OrderApi<B> {
    pub fn new(db: B, registry: InstanceRegistry, config: EngineConfig, producers: EventProducers) -> Self {
        Self { db, registry, config, producers }
    }

    pub fn bus(&self) -> &OrderEventBus {
        &self.producers.bus
    }
}

impl<B> OrderApi<B>
where B: MerchantBackend
{
    /// Completes a raw order into a contract, signs it, and stores it together with its inventory locks.
    ///
    /// `merchant_base_url` is the public URL of the instance, as seen by the wallet.
    pub async fn create_order(
        &self,
        instance_id: &str,
        request: PostOrderRequest,
        merchant_base_url: &str,
    ) -> Result<PostOrderResponse, MerchantError> {
        let instance = self.registry.require(instance_id)?;
        let PostOrderRequest { order, inventory_products, lock_uuids, payment_target } = request;
        for item in &inventory_products {
            if item.quantity <= 0 {
                return Err(MerchantError::malformed("inventory_products", "Quantities must be positive"));
            }
        }
        let mut products = order.products.clone();
        for item in &inventory_products {
            let (product, _) = self
                .db
                .fetch_product(instance_id, &item.product_id)
                .await?
                .ok_or_else(|| MerchantError::ProductNotFound(item.product_id.clone()))?;
            products.push(ContractProduct {
                product_id: Some(product.product_id),
                description: product.description,
                quantity: item.quantity,
                unit: Some(product.unit),
                price: Some(product.price),
                image: Some(product.image).filter(|i| !i.is_empty()),
                taxes: product.taxes.0,
                delivery_date: None,
            });
        }
        let account = instance
            .select_account(payment_target.as_deref())
            .ok_or_else(|| MerchantError::InstanceHasNoWire(instance_id.to_string()))?;
        let terms = self.complete_contract(&instance, order, products, merchant_base_url, account)?;
        let (contract_terms, h_contract) = canonicalize(&terms).map_err(|e| {
            error!("📦️ Could not serialize the contract for order {}. {e}", terms.order_id);
            MerchantError::SignatureInvariantFailure
        })?;
        let contract_sig = ContractStatement { h_contract: &h_contract }.sign_hex(instance.keys.secret())?;
        let new_order = NewOrder {
            instance_id: instance_id.to_string(),
            order_id: terms.order_id.clone(),
            h_contract,
            contract_terms,
            contract_sig,
            amount: terms.amount.clone(),
            summary: terms.summary.clone(),
            timestamp: terms.timestamp,
            pay_deadline: terms.pay_deadline,
            refund_deadline: terms.refund_deadline,
            wire_transfer_deadline: terms.wire_transfer_deadline,
        };
        let record = self.db.insert_order(new_order, inventory_products, lock_uuids).await?;
        info!("📦️ Order [{instance_id}/{}] created for {}", record.order_id, record.amount);
        Ok(PostOrderResponse { order_id: record.order_id })
    }

    /// Fills in every field the merchant left out and checks the result for consistency.
    fn complete_contract(
        &self,
        instance: &MerchantInstance,
        order: RawOrder,
        products: Vec<ContractProduct>,
        merchant_base_url: &str,
        account: &WireAccount,
    ) -> Result<ContractTerms, MerchantError> {
        let settings = &instance.settings;
        self.check_currency("amount", &order.amount)?;
        for product in &products {
            if let Some(price) = &product.price {
                self.check_currency("products", price)?;
            }
        }
        let order_id = match order.order_id {
            Some(id) => validate_order_id(id)?,
            None => OrderId(new_order_id()),
        };
        let max_fee = order.max_fee.unwrap_or_else(|| settings.default_max_deposit_fee.clone());
        let max_wire_fee = order.max_wire_fee.unwrap_or_else(|| settings.default_max_wire_fee.clone());
        self.check_currency("max_fee", &max_fee)?;
        self.check_currency("max_wire_fee", &max_wire_fee)?;
        let timestamp = order.timestamp.unwrap_or_else(Timestamp::now);
        let refund_deadline = order.refund_deadline.unwrap_or_default();
        let pay_deadline = order.pay_deadline.unwrap_or_else(|| timestamp.plus(settings.default_pay_delay));
        let wire_transfer_deadline = match order.wire_transfer_deadline {
            Some(t) => t,
            None => timestamp.plus(settings.default_wire_transfer_delay).max(refund_deadline),
        };
        check_deadlines(timestamp, refund_deadline, pay_deadline, wire_transfer_deadline)?;
        let (merchant, locations) = merchant_descriptor(instance);
        Ok(ContractTerms {
            order_id,
            amount: order.amount,
            summary: order.summary,
            products,
            timestamp,
            refund_deadline,
            pay_deadline,
            wire_transfer_deadline,
            fulfillment_url: order.fulfillment_url,
            merchant_base_url: merchant_base_url.to_string(),
            merchant,
            locations,
            merchant_pub: instance.keys.public_hex(),
            h_wire: account.h_wire.clone(),
            wire_method: account.wire_method.clone(),
            max_fee,
            max_wire_fee,
            wire_fee_amortization: order.wire_fee_amortization.unwrap_or(settings.default_wire_fee_amortization).max(1),
            exchanges: self.config.mints.clone(),
            auditors: self.config.auditors.clone(),
            extra: order.extra,
        })
    }

    fn check_currency(&self, field: &str, amount: &Amount) -> Result<(), MerchantError> {
        if amount.currency() == self.config.currency {
            Ok(())
        } else {
            debug!("📦️ {field} is in {} rather than {}", amount.currency(), self.config.currency);
            Err(MerchantError::CurrencyMismatch {
                expected: self.config.currency.clone(),
                found: amount.currency().to_string(),
            })
        }
    }

    /// Binds a wallet's nonce to an order and returns the signed contract. Claiming again with the same nonce returns
    /// the same contract and signature.
    pub async fn claim_order(
        &self,
        instance_id: &str,
        order_id: &OrderId,
        nonce: &str,
    ) -> Result<ClaimResponse, MerchantError> {
        self.registry.require(instance_id)?;
        parse_public_key(nonce).map_err(|e| MerchantError::malformed("nonce", e))?;
        let order = self.fetch_order(instance_id, order_id).await?;
        let was_claimed = self.db.fetch_claim(order.id).await?.is_some();
        let order = self.db.claim_order(instance_id, order_id, nonce).await?;
        if !was_claimed {
            self.producers.publish(OrderEvent::new(instance_id, order_id.clone(), OrderEventKind::Claimed)).await;
        }
        let contract_terms = contract_json(&order)?;
        Ok(ClaimResponse { contract_terms, sig: order.contract_sig, h_contract: order.h_contract })
    }

    pub async fn fetch_order(&self, instance_id: &str, order_id: &OrderId) -> Result<OrderRecord, MerchantError> {
        self.db
            .fetch_order(instance_id, order_id)
            .await?
            .ok_or_else(|| MerchantError::ContractNotFound(format!("order {order_id}")))
    }

    /// Reports the state of an order. With a timeout in `query`, waits until the order is paid (and, if a refund
    /// threshold is given, refunded at least that much) or the timeout passes, whichever comes first.
    pub async fn order_status(
        &self,
        instance_id: &str,
        order_id: &OrderId,
        query: StatusQuery,
    ) -> Result<OrderStatusResponse, MerchantError> {
        self.registry.require(instance_id)?;
        let Some(timeout_ms) = query.timeout_ms else {
            return self.current_status(instance_id, order_id).await;
        };
        let timeout = Duration::from_millis(timeout_ms).min(self.config.long_poll_max);
        let started = Instant::now();
        // Subscribe before reading, so that a change between the read and the wait is not missed.
        let mut events = self.producers.bus.subscribe();
        loop {
            let status = self.current_status(instance_id, order_id).await?;
            if is_settled(&status, query.refund.as_ref()) {
                return Ok(status);
            }
            let Some(remaining) = timeout.checked_sub(started.elapsed()).filter(|d| !d.is_zero()) else {
                return Ok(status);
            };
            trace!("📦️ Waiting up to {remaining:?} for order [{instance_id}/{order_id}]");
            if OrderEventBus::wait_for(&mut events, instance_id, order_id, remaining).await.is_none() {
                // Timed out, or fell behind the bus. Either way the store has the truth.
                if started.elapsed() >= timeout {
                    return self.current_status(instance_id, order_id).await;
                }
                events = events.resubscribe();
            }
        }
    }

    async fn current_status(
        &self,
        instance_id: &str,
        order_id: &OrderId,
    ) -> Result<OrderStatusResponse, MerchantError> {
        let order = self.fetch_order(instance_id, order_id).await?;
        let currency = order.amount.currency().to_string();
        let claimed = self.db.fetch_claim(order.id).await?.is_some();
        let deposits = self.db.fetch_deposits(order.id).await?;
        let refunds = self.db.fetch_refunds(order.id).await?;
        let deposit_total = Amount::sum(&currency, deposits.iter().map(|d| &d.amount_with_fee))?;
        let refund_amount =
            Amount::sum(&currency, refunds.iter().filter(|r| r.reason != ABORT_REFUND_REASON).map(|r| &r.amount))?;
        let order_status = if order.aborted {
            OrderStatus::Aborted
        } else if order.paid {
            OrderStatus::Paid
        } else if claimed {
            OrderStatus::Claimed
        } else {
            OrderStatus::Unclaimed
        };
        let contract_terms = if claimed { Some(contract_json(&order)?) } else { None };
        Ok(OrderStatusResponse {
            order_id: order.order_id,
            order_status,
            paid: order.paid,
            refunded: !refund_amount.is_zero(),
            refund_amount,
            deposit_total,
            wired: order.wired,
            contract_terms,
        })
    }

    pub async fn list_orders(&self, filter: OrderQueryFilter) -> Result<Vec<OrderListEntry>, MerchantError> {
        self.registry.require(&filter.instance_id)?;
        let orders = self.db.search_orders(filter).await?;
        Ok(orders.into_iter().map(OrderListEntry::from).collect())
    }
}

fn is_settled(status: &OrderStatusResponse, min_refund: Option<&Amount>) -> bool {
    if status.order_status == OrderStatus::Aborted {
        return true;
    }
    if !status.paid {
        return false;
    }
    match min_refund {
        None => true,
        Some(min) => status.refund_amount.cmp_amount(min).map(|o| o.is_ge()).unwrap_or(true),
    }
}

pub(crate) fn contract_json(order: &OrderRecord) -> Result<Value, MerchantError> {
    serde_json::from_str(&order.contract_terms).map_err(|e| {
        error!("📦️ Stored contract of order {} is not valid JSON. {e}", order.order_id);
        MerchantError::SignatureInvariantFailure
    })
}

fn validate_order_id(id: OrderId) -> Result<OrderId, MerchantError> {
    let s = id.as_str();
    if s.is_empty() || s.len() > 128 || s.chars().any(|c| c.is_whitespace() || c.is_control() || c == '/' || c == '?') {
        let reason = "Order ids must be 1-128 characters without '/', '?' or spaces";
        return Err(MerchantError::malformed("order_id", reason));
    }
    Ok(id)
}

/// A refund deadline of zero means no deadline was set. Refunds stay possible, and it is exempt from the ordering
/// checks.
fn check_deadlines(
    timestamp: Timestamp,
    refund_deadline: Timestamp,
    pay_deadline: Timestamp,
    wire_transfer_deadline: Timestamp,
) -> Result<(), MerchantError> {
    if pay_deadline < timestamp {
        return Err(MerchantError::malformed("pay_deadline", "The pay deadline is before the order timestamp"));
    }
    if !refund_deadline.is_zero() && refund_deadline < timestamp {
        return Err(MerchantError::malformed("refund_deadline", "The refund deadline is before the order timestamp"));
    }
    if wire_transfer_deadline < timestamp || (!refund_deadline.is_zero() && wire_transfer_deadline < refund_deadline) {
        return Err(MerchantError::malformed(
            "wire_transfer_deadline",
            "The wire transfer deadline must not precede the refund deadline",
        ));
    }
    Ok(())
}

/// The merchant as described in contracts. Address and jurisdiction are labels into `locations`; when they are the
/// same place they share one label.
fn merchant_descriptor(instance: &MerchantInstance) -> (MerchantDescriptor, BTreeMap<String, Value>) {
    let settings = &instance.settings;
    let mut locations = BTreeMap::new();
    locations.insert(ADDRESS_LABEL.to_string(), settings.address.clone());
    let jurisdiction = if settings.jurisdiction == settings.address {
        ADDRESS_LABEL
    } else {
        locations.insert(JURISDICTION_LABEL.to_string(), settings.jurisdiction.clone());
        JURISDICTION_LABEL
    };
    let merchant = MerchantDescriptor {
        name: settings.name.clone(),
        instance: settings.id.clone(),
        address: ADDRESS_LABEL.to_string(),
        jurisdiction: jurisdiction.to_string(),
    };
    (merchant, locations)
}
