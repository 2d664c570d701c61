//! `SqliteDatabase` is the SQLite implementation of a merchant backend.
//!
//! It implements all the traits defined in the [`crate::traits`] module. Reads go straight to a pooled connection.
//! Every write runs through [`run_in_transaction`], so each public method is a single atomic unit that is retried on
//! lock contention.
use std::{cmp::Ordering, collections::BTreeSet, fmt::Debug};

use log::*;
use merchant_common::{Amount, Timestamp};
use mint_client::TransferDetails;
use sqlx::{SqliteConnection, SqlitePool};

use super::{
    db::{accounts, claims, deposits, instances, inventory, new_pool, orders, refunds, transfers},
    retry::run_in_transaction,
};
use crate::{
    db_types::{
        ClaimRecord,
        DepositRecord,
        DepositTrackingRecord,
        InstanceRecord,
        InstanceSettings,
        NewDeposit,
        NewInstance,
        NewOrder,
        NewRefund,
        OrderId,
        OrderRecord,
        ProductDetails,
        ProductQuantity,
        ProductRecord,
        RefundRecord,
        WireAccount,
    },
    helpers::{
        distribute_refund,
        is_sufficient,
        new_account,
        same_account,
        wire_method,
        CoinRefundable,
        MerchantKeys,
        RefundApprovalStatement,
        SignedPurpose,
    },
    traits::{
        is_unique_violation,
        InsertedTransfer,
        InstanceError,
        InstanceManagement,
        InventoryError,
        InventoryManagement,
        MerchantDatabase,
        MerchantDbError,
        OrderQueryFilter,
        PaymentOutcome,
        PaymentSettlement,
        ProductLock,
        RefundIncrease,
    },
};

/// The reason recorded against refunds that were issued because the wallet aborted the payment.
pub const ABORT_REFUND_REASON: &str = "abort";

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date. Migrations that have already run are skipped.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete for {}", self.url);
        Ok(())
    }
}

fn payto_set(uris: &[String]) -> BTreeSet<String> {
    uris.iter().map(|u| u.trim().to_ascii_lowercase()).collect()
}

//--------------------------------------  InstanceManagement  --------------------------------------------------------
impl InstanceManagement for SqliteDatabase {
    async fn insert_instance(&self, instance: NewInstance) -> Result<InstanceRecord, InstanceError> {
        run_in_transaction(&self.pool, "insert_instance", move |conn| {
            let instance = instance.clone();
            Box::pin(async move {
                let id = instance.settings.id.clone();
                if let Some(existing) = instances::fetch_instance(&id, conn).await? {
                    if existing.deleted {
                        return Err(InstanceError::InstanceConflict(format!("{id} (deleted)")));
                    }
                    let stored = accounts::fetch_accounts(existing.id, true, conn).await?;
                    let stored = payto_set(&stored.into_iter().map(|a| a.payto_uri).collect::<Vec<_>>());
                    let wanted =
                        payto_set(&instance.accounts.iter().map(|a| a.payto_uri.clone()).collect::<Vec<_>>());
                    return if existing.settings() == instance.settings && stored == wanted {
                        debug!("🏪️ Instance '{id}' already exists with identical settings");
                        Ok(existing)
                    } else {
                        Err(InstanceError::InstanceConflict(id))
                    };
                }
                let (settings, public, private) = (&instance.settings, &instance.merchant_pub, &instance.merchant_priv);
                let record = instances::insert_instance(settings, public, private, conn).await?;
                for account in &instance.accounts {
                    accounts::insert_account(record.id, account, conn).await?;
                }
                info!("🏪️ Instance '{id}' created with {} account(s)", instance.accounts.len());
                Ok(record)
            })
        })
        .await
    }

    async fn fetch_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>, InstanceError> {
        let mut conn = self.pool.acquire().await?;
        let instance = instances::fetch_instance(instance_id, &mut conn).await?;
        Ok(instance)
    }

    async fn fetch_instances(&self) -> Result<Vec<InstanceRecord>, InstanceError> {
        let mut conn = self.pool.acquire().await?;
        let instances = instances::fetch_live_instances(&mut conn).await?;
        Ok(instances)
    }

    async fn fetch_accounts(&self, instance_serial: i64, active_only: bool) -> Result<Vec<WireAccount>, InstanceError> {
        let mut conn = self.pool.acquire().await?;
        let accounts = accounts::fetch_accounts(instance_serial, active_only, &mut conn).await?;
        Ok(accounts)
    }

    async fn update_instance(
        &self,
        settings: InstanceSettings,
        payto_uris: Vec<String>,
    ) -> Result<Vec<WireAccount>, InstanceError> {
        if let Some(bad) = payto_uris.iter().find(|u| wire_method(u).is_none()) {
            return Err(InstanceError::InvalidPaytoUri(bad.clone()));
        }
        let mut wanted: Vec<String> = Vec::with_capacity(payto_uris.len());
        for uri in payto_uris {
            if !wanted.iter().any(|w| same_account(w, &uri)) {
                wanted.push(uri.trim().to_string());
            }
        }
        run_in_transaction(&self.pool, "update_instance", move |conn| {
            let settings = settings.clone();
            let wanted = wanted.clone();
            Box::pin(async move {
                let instance = instances::fetch_instance(&settings.id, conn)
                    .await?
                    .filter(|i| !i.deleted)
                    .ok_or_else(|| InstanceError::InstanceNotFound(settings.id.clone()))?;
                instances::update_settings(&settings, conn).await?;
                let existing = accounts::fetch_accounts(instance.id, false, conn).await?;
                for account in existing.iter().filter(|a| a.active) {
                    if !wanted.iter().any(|w| same_account(w, &account.payto_uri)) {
                        debug!("🏪️ Inactivating account {} of '{}'", account.payto_uri, settings.id);
                        accounts::set_active(account.id, false, conn).await?;
                    }
                }
                for uri in &wanted {
                    match existing.iter().find(|a| same_account(&a.payto_uri, uri)) {
                        Some(account) if account.active => {},
                        Some(account) => {
                            debug!("🏪️ Reactivating account {} of '{}'", account.payto_uri, settings.id);
                            accounts::set_active(account.id, true, conn).await?;
                        },
                        None => {
                            let account =
                                new_account(uri).ok_or_else(|| InstanceError::InvalidPaytoUri(uri.clone()))?;
                            accounts::insert_account(instance.id, &account, conn).await?;
                        },
                    }
                }
                let active = accounts::fetch_accounts(instance.id, true, conn).await?;
                Ok(active)
            })
        })
        .await
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<bool, InstanceError> {
        let mut conn = self.pool.acquire().await?;
        let deleted = instances::soft_delete(instance_id, &mut conn).await?;
        if deleted {
            info!("🏪️ Instance '{instance_id}' deleted");
        }
        Ok(deleted)
    }
}

//--------------------------------------  InventoryManagement  -------------------------------------------------------
impl InventoryManagement for SqliteDatabase {
    async fn insert_product(
        &self,
        instance_id: &str,
        product_id: &str,
        details: ProductDetails,
    ) -> Result<ProductRecord, InventoryError> {
        if details.total_stocked < -1 || details.total_lost < 0 {
            return Err(InventoryError::InvalidUpdate("Stock levels may not be negative".into()));
        }
        let mut conn = self.pool.acquire().await?;
        let product = inventory::insert_product(instance_id, product_id, &details, &mut conn).await.map_err(|e| {
            if is_unique_violation(&e) {
                InventoryError::ProductConflict(product_id.to_string())
            } else {
                e.into()
            }
        })?;
        Ok(product)
    }

    async fn fetch_product(
        &self,
        instance_id: &str,
        product_id: &str,
    ) -> Result<Option<(ProductRecord, i64)>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        let Some(product) = inventory::fetch_product(instance_id, product_id, &mut conn).await? else {
            return Ok(None);
        };
        let locked = inventory::locked_quantity(product.id, Timestamp::now(), &mut conn).await?;
        Ok(Some((product, locked)))
    }

    async fn fetch_product_ids(&self, instance_id: &str) -> Result<Vec<String>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        let ids = inventory::fetch_product_ids(instance_id, &mut conn).await?;
        Ok(ids)
    }

    async fn update_product(
        &self,
        instance_id: &str,
        product_id: &str,
        details: ProductDetails,
    ) -> Result<ProductRecord, InventoryError> {
        if details.total_stocked < -1 || details.total_lost < 0 {
            return Err(InventoryError::InvalidUpdate("Stock levels may not be negative".into()));
        }
        let (instance_id, product_id) = (instance_id.to_string(), product_id.to_string());
        run_in_transaction(&self.pool, "update_product", move |conn| {
            let (instance_id, product_id, details) = (instance_id.clone(), product_id.clone(), details.clone());
            Box::pin(async move {
                let product = inventory::fetch_product(&instance_id, &product_id, conn)
                    .await?
                    .ok_or_else(|| InventoryError::ProductNotFound(product_id.clone()))?;
                if details.total_lost < product.total_lost {
                    return Err(InventoryError::InvalidUpdate("total_lost may not decrease".into()));
                }
                if details.total_stocked >= 0 {
                    let locked = inventory::locked_quantity(product.id, Timestamp::now(), conn).await?;
                    let committed = product.total_sold + details.total_lost + locked;
                    if details.total_stocked < committed {
                        return Err(InventoryError::InvalidUpdate(format!(
                            "total_stocked ({}) is below what is sold, lost and locked ({committed})",
                            details.total_stocked
                        )));
                    }
                }
                let updated = inventory::update_product(product.id, &details, conn).await?;
                Ok(updated)
            })
        })
        .await
    }

    async fn delete_product(&self, instance_id: &str, product_id: &str) -> Result<(), InventoryError> {
        let (instance_id, product_id) = (instance_id.to_string(), product_id.to_string());
        run_in_transaction(&self.pool, "delete_product", move |conn| {
            let (instance_id, product_id) = (instance_id.clone(), product_id.clone());
            Box::pin(async move {
                let product = inventory::fetch_product(&instance_id, &product_id, conn)
                    .await?
                    .ok_or_else(|| InventoryError::ProductNotFound(product_id.clone()))?;
                if inventory::count_locks(product.id, conn).await? > 0 {
                    return Err(InventoryError::ProductConflict(format!("{product_id} is locked")));
                }
                inventory::delete_product(product.id, conn).await?;
                Ok(())
            })
        })
        .await
    }

    async fn lock_product(&self, instance_id: &str, lock: ProductLock) -> Result<(), InventoryError> {
        if lock.quantity < 0 {
            return Err(InventoryError::InvalidUpdate("Lock quantities may not be negative".into()));
        }
        let instance_id = instance_id.to_string();
        run_in_transaction(&self.pool, "lock_product", move |conn| {
            let (instance_id, lock) = (instance_id.clone(), lock.clone());
            Box::pin(async move {
                let product = inventory::fetch_product(&instance_id, &lock.product_id, conn)
                    .await?
                    .ok_or_else(|| InventoryError::ProductNotFound(lock.product_id.clone()))?;
                if lock.quantity == 0 {
                    inventory::release_wallet_lock(product.id, &lock.lock_uuid, conn).await?;
                    return Ok(());
                }
                let now = Timestamp::now();
                if !product.is_unlimited() {
                    let others = inventory::locked_quantity_excluding(product.id, &lock.lock_uuid, now, conn).await?;
                    if product.total_sold + product.total_lost + others + lock.quantity > product.total_stocked {
                        return Err(InventoryError::InsufficientStock(lock.product_id.clone()));
                    }
                }
                inventory::upsert_wallet_lock(product.id, &lock.lock_uuid, lock.quantity, now.plus(lock.duration), conn)
                    .await?;
                Ok(())
            })
        })
        .await
    }

    async fn expire_locks(&self, now: Timestamp) -> Result<u64, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        let removed = inventory::delete_expired_locks(now, &mut conn).await?;
        Ok(removed)
    }
}

//--------------------------------------   MerchantDatabase   --------------------------------------------------------
fn order_not_found(order_serial: i64) -> MerchantDbError {
    MerchantDbError::ContractNotFound(format!("order #{order_serial}"))
}

fn sum_refunds<'a, I>(currency: &str, refunds: I) -> Result<Amount, MerchantDbError>
where I: IntoIterator<Item = &'a RefundRecord> {
    let total = Amount::sum(currency, refunds.into_iter().map(|r| &r.amount))?;
    Ok(total)
}

/// The refund position of every deposited coin, given the refunds issued so far.
fn coin_positions(
    currency: &str,
    deposits: &[DepositRecord],
    refunds: &[RefundRecord],
) -> Result<Vec<CoinRefundable>, MerchantDbError> {
    deposits
        .iter()
        .map(|deposit| {
            let on_coin = refunds.iter().filter(|r| r.coin_pub == deposit.coin_pub).collect::<Vec<_>>();
            Ok(CoinRefundable {
                coin_pub: deposit.coin_pub.clone(),
                deposited: deposit.amount_with_fee.clone(),
                refunded: sum_refunds(currency, on_coin.iter().copied())?,
                max_rtransaction_id: on_coin.iter().map(|r| r.rtransaction_id).max().unwrap_or(0),
            })
        })
        .collect()
}

async fn issue_refund(
    order: &OrderRecord,
    coin: CoinRefundable,
    amount: Amount,
    reason: &str,
    keys: &MerchantKeys,
    conn: &mut SqliteConnection,
) -> Result<RefundRecord, MerchantDbError> {
    let rtransaction_id = coin.max_rtransaction_id + 1;
    let merchant_sig = RefundApprovalStatement {
        coin_pub: &coin.coin_pub,
        h_contract: &order.h_contract,
        rtransaction_id,
        refund_amount: &amount,
    }
    .sign_hex(keys.secret())?;
    let reason = reason.to_string();
    let refund = NewRefund { coin_pub: coin.coin_pub, rtransaction_id, amount, reason, merchant_sig };
    let record = refunds::insert_refund(order.id, &refund, conn).await?;
    Ok(record)
}

/// Refunds whatever is still refundable on each deposited coin of an aborted order. Coins that are fully refunded
/// already are skipped, so calling this again issues nothing new.
async fn refund_remaining(
    order: &OrderRecord,
    keys: &MerchantKeys,
    conn: &mut SqliteConnection,
) -> Result<Vec<RefundRecord>, MerchantDbError> {
    let deposits = deposits::fetch_deposits(order.id, conn).await?;
    let existing = refunds::fetch_refunds(order.id, conn).await?;
    let mut issued = Vec::new();
    for coin in coin_positions(order.amount.currency(), &deposits, &existing)? {
        let remaining = coin.deposited.sub_or_zero(&coin.refunded)?;
        if remaining.is_zero() {
            continue;
        }
        issued.push(issue_refund(order, coin, remaining, ABORT_REFUND_REASON, keys, conn).await?);
    }
    Ok(issued)
}

impl MerchantDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(
        &self,
        order: NewOrder,
        products: Vec<ProductQuantity>,
        lock_uuids: Vec<String>,
    ) -> Result<OrderRecord, MerchantDbError> {
        run_in_transaction(&self.pool, "insert_order", move |conn| {
            let (order, products, lock_uuids) = (order.clone(), products.clone(), lock_uuids.clone());
            Box::pin(async move {
                for uuid in &lock_uuids {
                    let released = inventory::release_wallet_locks(&order.instance_id, uuid, conn).await?;
                    trace!("🔒️ Released {released} lock(s) held under {uuid}");
                }
                let record = orders::insert_order(&order, conn).await.map_err(|e| {
                    if is_unique_violation(&e) {
                        MerchantDbError::OrderAlreadyExists(order.order_id.clone())
                    } else {
                        e.into()
                    }
                })?;
                let now = Timestamp::now();
                for item in &products {
                    let product = inventory::fetch_product(&order.instance_id, &item.product_id, conn)
                        .await?
                        .ok_or_else(|| MerchantDbError::ProductNotFound(item.product_id.clone()))?;
                    if !product.is_unlimited() {
                        let locked = inventory::locked_quantity(product.id, now, conn).await?;
                        if product.total_sold + product.total_lost + locked + item.quantity > product.total_stocked {
                            return Err(MerchantDbError::InsufficientStock(item.product_id.clone()));
                        }
                    }
                    inventory::insert_order_lock(product.id, record.id, item.quantity, order.pay_deadline, conn).await?;
                }
                Ok(record)
            })
        })
        .await
    }

    async fn fetch_order(&self, instance_id: &str, order_id: &OrderId) -> Result<Option<OrderRecord>, MerchantDbError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(instance_id, order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_hash(&self, h_contract: &str) -> Result<Option<OrderRecord>, MerchantDbError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_hash(h_contract, &mut conn).await?;
        Ok(order)
    }

    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<OrderRecord>, MerchantDbError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(filter, &mut conn).await?;
        Ok(orders)
    }

    async fn claim_order(
        &self,
        instance_id: &str,
        order_id: &OrderId,
        nonce: &str,
    ) -> Result<OrderRecord, MerchantDbError> {
        let (instance_id, order_id, nonce) = (instance_id.to_string(), order_id.clone(), nonce.to_string());
        run_in_transaction(&self.pool, "claim_order", move |conn| {
            let (instance_id, order_id, nonce) = (instance_id.clone(), order_id.clone(), nonce.clone());
            Box::pin(async move {
                let order = orders::fetch_order(&instance_id, &order_id, conn)
                    .await?
                    .ok_or_else(|| MerchantDbError::ContractNotFound(order_id.to_string()))?;
                match claims::fetch_claim(order.id, conn).await? {
                    Some(claim) if claim.nonce == nonce => Ok(order),
                    Some(_) => Err(MerchantDbError::AlreadyClaimed(order_id)),
                    None => {
                        claims::insert_claim(order.id, &nonce, conn).await?;
                        debug!("📦️ Order [{instance_id}/{order_id}] claimed");
                        Ok(order)
                    },
                }
            })
        })
        .await
    }

    async fn fetch_claim(&self, order_serial: i64) -> Result<Option<ClaimRecord>, MerchantDbError> {
        let mut conn = self.pool.acquire().await?;
        let claim = claims::fetch_claim(order_serial, &mut conn).await?;
        Ok(claim)
    }

    async fn fetch_deposits(&self, order_serial: i64) -> Result<Vec<DepositRecord>, MerchantDbError> {
        let mut conn = self.pool.acquire().await?;
        let deposits = deposits::fetch_deposits(order_serial, &mut conn).await?;
        Ok(deposits)
    }

    async fn record_deposits(
        &self,
        order_serial: i64,
        deposits: Vec<NewDeposit>,
        settlement: PaymentSettlement,
        keys: &MerchantKeys,
    ) -> Result<PaymentOutcome, MerchantDbError> {
        let keys = keys.clone();
        run_in_transaction(&self.pool, "record_deposits", move |conn| {
            let (new_deposits, settlement, keys) = (deposits.clone(), settlement.clone(), keys.clone());
            Box::pin(async move {
                let order =
                    orders::fetch_order_by_serial(order_serial, conn)
                        .await?
                        .ok_or_else(|| order_not_found(order_serial))?;
                if order.paid {
                    let deposits = deposits::fetch_deposits(order_serial, conn).await?;
                    return Ok(PaymentOutcome { deposits, payment_sig: order.payment_sig, ..Default::default() });
                }
                for deposit in &new_deposits {
                    deposits::insert_deposit(order_serial, deposit, conn).await?;
                }
                if order.aborted {
                    // The mint took these coins after the wallet gave up on the order. They are refunded at once.
                    let issued = refund_remaining(&order, &keys, conn).await?;
                    let (instance, id) = (&order.instance_id, &order.order_id);
                    let late = issued.len();
                    warn!("↩️ Order [{instance}/{id}] was aborted while paying. {late} late coin(s) refunded");
                    let deposits = deposits::fetch_deposits(order_serial, conn).await?;
                    return Ok(PaymentOutcome { deposits, aborted: true, ..Default::default() });
                }
                let deposits = deposits::fetch_deposits(order_serial, conn).await?;
                let sufficient = is_sufficient(
                    &settlement.amount,
                    &settlement.max_fee,
                    deposits.iter().map(|d| (&d.amount_with_fee, &d.deposit_fee)),
                )?;
                if !sufficient {
                    debug!("💰️ Order [{}] is not yet fully paid", order.order_id);
                    return Ok(PaymentOutcome { deposits, ..Default::default() });
                }
                orders::mark_paid(order_serial, &settlement.payment_sig, conn).await?;
                let sold = inventory::consume_order_locks(order_serial, conn).await?;
                let (instance, id) = (&order.instance_id, &order.order_id);
                info!("💰️ Order [{instance}/{id}] is paid. {sold} inventory lock(s) consumed");
                Ok(PaymentOutcome {
                    deposits,
                    payment_sig: Some(settlement.payment_sig),
                    newly_paid: true,
                    aborted: false,
                })
            })
        })
        .await
    }

    async fn abort_order(&self, order_serial: i64, keys: &MerchantKeys) -> Result<Vec<RefundRecord>, MerchantDbError> {
        let keys = keys.clone();
        run_in_transaction(&self.pool, "abort_order", move |conn| {
            let keys = keys.clone();
            Box::pin(async move {
                let order =
                    orders::fetch_order_by_serial(order_serial, conn)
                        .await?
                        .ok_or_else(|| order_not_found(order_serial))?;
                if order.paid {
                    return Err(MerchantDbError::AlreadyPaid(order.order_id));
                }
                if !order.aborted {
                    orders::mark_aborted(order_serial, conn).await?;
                    inventory::release_order_locks(order_serial, conn).await?;
                    let issued = refund_remaining(&order, &keys, conn).await?;
                    let (instance, id) = (&order.instance_id, &order.order_id);
                    info!("↩️ Order [{instance}/{id}] aborted. {} coin(s) to refund", issued.len());
                }
                let refunds = refunds::fetch_refunds(order_serial, conn).await?;
                Ok(refunds)
            })
        })
        .await
    }

    async fn increase_refund(
        &self,
        order_serial: i64,
        new_total: Amount,
        reason: &str,
        keys: &MerchantKeys,
    ) -> Result<RefundIncrease, MerchantDbError> {
        let (reason, keys) = (reason.to_string(), keys.clone());
        run_in_transaction(&self.pool, "increase_refund", move |conn| {
            let (new_total, reason, keys) = (new_total.clone(), reason.clone(), keys.clone());
            Box::pin(async move {
                let order =
                    orders::fetch_order_by_serial(order_serial, conn)
                        .await?
                        .ok_or_else(|| order_not_found(order_serial))?;
                if order.aborted {
                    return Err(MerchantDbError::OrderAborted(order.order_id));
                }
                let deposits = deposits::fetch_deposits(order_serial, conn).await?;
                if !order.paid && deposits.is_empty() {
                    return Err(MerchantDbError::OrderUnpaid(order.order_id));
                }
                let currency = order.amount.currency().to_string();
                let existing = refunds::fetch_refunds(order_serial, conn).await?;
                let current = sum_refunds(&currency, &existing)?;
                match new_total.cmp_amount(&current)? {
                    Ordering::Less => {
                        return Err(MerchantDbError::RefundDecrease { current, requested: new_total });
                    },
                    Ordering::Equal => {
                        return Ok(RefundIncrease { refunds: existing, issued: vec![], total: current });
                    },
                    Ordering::Greater => {},
                }
                // A paid order refunds up to its price. A partially paid one up to what has been deposited so far.
                let limit = if order.paid {
                    order.amount.clone()
                } else {
                    Amount::sum(&currency, deposits.iter().map(|d| &d.amount_with_fee))?
                };
                if new_total.cmp_amount(&limit)? == Ordering::Greater {
                    return Err(MerchantDbError::RefundExceedsPayment(new_total.checked_sub(&limit)?));
                }
                let delta = new_total.checked_sub(&current)?;
                let coins = coin_positions(&currency, &deposits, &existing)?;
                let shares = distribute_refund(&delta, &coins)?;
                let mut issued = Vec::with_capacity(shares.len());
                for share in shares {
                    let Some(coin) = coins.iter().find(|c| c.coin_pub == share.coin_pub).cloned() else {
                        let detail = format!("No deposit for coin {}", share.coin_pub);
                        return Err(MerchantDbError::InconsistentState(detail));
                    };
                    issued.push(issue_refund(&order, coin, share.amount, &reason, &keys, conn).await?);
                }
                let refunds = refunds::fetch_refunds(order_serial, conn).await?;
                let (instance, id) = (&order.instance_id, &order.order_id);
                info!("↩️ Refund on order [{instance}/{id}] raised from {current} to {new_total}");
                Ok(RefundIncrease { refunds, issued, total: new_total })
            })
        })
        .await
    }

    async fn fetch_refunds(&self, order_serial: i64) -> Result<Vec<RefundRecord>, MerchantDbError> {
        let mut conn = self.pool.acquire().await?;
        let refunds = refunds::fetch_refunds(order_serial, &mut conn).await?;
        Ok(refunds)
    }

    async fn mark_refund_redeemed(
        &self,
        refund_id: i64,
        mint_pub: &str,
        mint_sig: &str,
    ) -> Result<(), MerchantDbError> {
        let mut conn = self.pool.acquire().await?;
        if refunds::mark_redeemed(refund_id, mint_pub, mint_sig, &mut conn).await? {
            debug!("↩️ Refund #{refund_id} has been redeemed at the mint");
        }
        Ok(())
    }

    async fn fetch_deposit_tracking(&self, order_serial: i64) -> Result<Vec<DepositTrackingRecord>, MerchantDbError> {
        let mut conn = self.pool.acquire().await?;
        let tracking = transfers::fetch_deposit_tracking(order_serial, &mut conn).await?;
        Ok(tracking)
    }

    async fn fetch_transfer(
        &self,
        instance_id: &str,
        wtid: &str,
        mint_url: &str,
    ) -> Result<Option<InsertedTransfer>, MerchantDbError> {
        let mut conn = self.pool.acquire().await?;
        let Some(transfer) = transfers::fetch_transfer(instance_id, wtid, mint_url, &mut conn).await? else {
            return Ok(None);
        };
        let deposits = transfers::fetch_transfer_deposits(transfer.id, &mut conn).await?;
        Ok(Some(InsertedTransfer { transfer, deposits }))
    }

    async fn insert_transfer(
        &self,
        instance_id: &str,
        mint_url: &str,
        details: TransferDetails,
    ) -> Result<InsertedTransfer, MerchantDbError> {
        let (instance_id, mint_url) = (instance_id.to_string(), mint_url.to_string());
        run_in_transaction(&self.pool, "insert_transfer", move |conn| {
            let (instance_id, mint_url, details) = (instance_id.clone(), mint_url.clone(), details.clone());
            Box::pin(async move {
                if let Some(transfer) = transfers::fetch_transfer(&instance_id, &details.wtid, &mint_url, conn).await? {
                    let deposits = transfers::fetch_transfer_deposits(transfer.id, conn).await?;
                    return Ok(InsertedTransfer { transfer, deposits });
                }
                let transfer = transfers::insert_transfer(&instance_id, &mint_url, &details, conn).await?;
                let mut linked = Vec::with_capacity(details.deposits.len());
                for item in &details.deposits {
                    let order = orders::fetch_order_by_hash(&item.h_contract_terms, conn)
                        .await?
                        .filter(|o| o.instance_id == instance_id);
                    linked.push(
                        transfers::insert_transfer_deposit(transfer.id, order.as_ref().map(|o| &o.order_id), item, conn)
                            .await?,
                    );
                    let Some(order) = order else {
                        warn!("🛰️ Transfer {} pays for a contract unknown to '{instance_id}'", details.wtid);
                        continue;
                    };
                    let Some(deposit) =
                        deposits::fetch_deposit_by_contract(&item.h_contract_terms, &item.coin_pub, conn).await?
                    else {
                        let (wtid, coin) = (&details.wtid, &item.coin_pub);
                        warn!("🛰️ Transfer {wtid} pays for coin {coin} that was never deposited");
                        continue;
                    };
                    let tracking = DepositTrackingRecord {
                        deposit_serial: deposit.id,
                        coin_pub: deposit.coin_pub.clone(),
                        wtid: details.wtid.clone(),
                        mint_url: mint_url.clone(),
                        execution_time: details.execution_time,
                        coin_contribution: item.deposit_value.checked_sub(&item.deposit_fee)?,
                    };
                    transfers::insert_deposit_tracking(&tracking, conn).await?;
                    let settled = transfers::all_deposits_tracked(order.id, conn).await?;
                    if settled && orders::mark_wired(order.id, conn).await? {
                        info!("🛰️ Every deposit of order [{instance_id}/{}] has been wired", order.order_id);
                    }
                }
                Ok(InsertedTransfer { transfer, deposits: linked })
            })
        })
        .await
    }

    async fn close(&mut self) -> Result<(), MerchantDbError> {
        self.pool.close().await;
        Ok(())
    }
}
