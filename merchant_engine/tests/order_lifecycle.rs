use std::{collections::BTreeMap, time::Duration};

use merchant_common::{Amount, RelativeTime, Timestamp};
use merchant_engine::{
    db_types::{NewDeposit, OrderId, OrderStatus},
    helpers::{parse_public_key, RefundApprovalStatement, SignedPurpose},
    merchant_api::{
        order_objects::{ClaimResponse, PostOrderRequest, RawOrder, StatusQuery},
        payment_objects::{
            AbortRequest,
            CoinPermission,
            PayRequest,
            PaymentResult,
            RefundEntry,
            RefundPermission,
            RefundRequest,
            TrackTransactionResult,
        },
    },
    test_utils::{
        merchant::{eur, TestMerchant, TEST_MINT_URL},
        wallet::{new_nonce, Denomination},
    },
    traits::{MerchantDatabase, OrderQueryFilter, PaymentSettlement},
    ErrorKind,
    MerchantError,
};

const INSTANCE: &str = "default";

async fn new_order(merchant: &TestMerchant, order_id: &str, amount: &str) -> (OrderId, ClaimResponse) {
    let order = RawOrder::new(eur(amount), "ice cream").with_order_id(order_id);
    let base_url = merchant.base_url(INSTANCE);
    let id = merchant.orders.create_order(INSTANCE, PostOrderRequest::from(order), &base_url).await.unwrap().order_id;
    let claim = merchant.orders.claim_order(INSTANCE, &id, &new_nonce()).await.unwrap();
    (id, claim)
}

fn five_euro_coin(claim: &ClaimResponse) -> CoinPermission {
    Denomination::new(eur("5")).withdraw().pay(claim, TEST_MINT_URL, &eur("0.01"), &eur("0.01"))
}

async fn pay(
    merchant: &TestMerchant,
    order_id: &OrderId,
    claim: &ClaimResponse,
    coins: Vec<CoinPermission>,
) -> Result<PaymentResult, MerchantError> {
    let request = PayRequest { h_contract: claim.h_contract.clone(), coins };
    merchant.payments.pay(INSTANCE, order_id, request).await
}

fn kind<T: std::fmt::Debug>(result: Result<T, MerchantError>) -> ErrorKind {
    result.unwrap_err().kind()
}

fn refund(amount: &str) -> RefundRequest {
    RefundRequest { refund: eur(amount), reason: "goodwill".into() }
}

async fn abort(merchant: &TestMerchant, order_id: &OrderId, claim: &ClaimResponse) -> Vec<RefundPermission> {
    let request = AbortRequest { h_contract: claim.h_contract.clone() };
    merchant.payments.abort(INSTANCE, order_id, request).await.unwrap()
}

fn total(permissions: &[RefundPermission]) -> Amount {
    Amount::sum("EUR", permissions.iter().map(|p| &p.refund_amount)).unwrap()
}

#[tokio::test]
async fn claims_are_bound_to_one_nonce() {
    let merchant = TestMerchant::new().await;
    let order = RawOrder::new(eur("5"), "ice cream").with_order_id("claim-me");
    let id = merchant.orders.create_order(INSTANCE, order.into(), "https://shop.test/").await.unwrap().order_id;
    let nonce = new_nonce();
    let first = merchant.orders.claim_order(INSTANCE, &id, &nonce).await.unwrap();
    let again = merchant.orders.claim_order(INSTANCE, &id, &nonce).await.unwrap();
    assert_eq!(first.contract_terms, again.contract_terms);
    assert_eq!(first.sig, again.sig);
    assert_eq!(first.h_contract, again.h_contract);
    let other = merchant.orders.claim_order(INSTANCE, &id, &new_nonce()).await;
    assert_eq!(kind(other), ErrorKind::AlreadyClaimed);
    let bad = merchant.orders.claim_order(INSTANCE, &id, "not a key").await;
    assert_eq!(kind(bad), ErrorKind::ParameterMalformed);
}

#[tokio::test]
async fn duplicate_order_ids_are_refused() {
    let merchant = TestMerchant::new().await;
    new_order(&merchant, "dup", "5").await;
    let order = RawOrder::new(eur("7"), "another").with_order_id("dup");
    let result = merchant.orders.create_order(INSTANCE, order.into(), "https://shop.test/").await;
    assert_eq!(kind(result), ErrorKind::OrderAlreadyExists);
}

#[tokio::test]
async fn orders_in_a_foreign_currency_are_refused() {
    let merchant = TestMerchant::new().await;
    let order = RawOrder::new("KUDOS:5".parse().unwrap(), "ice cream");
    let result = merchant.orders.create_order(INSTANCE, order.into(), "https://shop.test/").await;
    assert_eq!(kind(result), ErrorKind::CurrencyMismatch);
}

#[tokio::test]
async fn unclaimed_orders_cannot_be_paid() {
    let merchant = TestMerchant::new().await;
    let order = RawOrder::new(eur("5"), "ice cream").with_order_id("unclaimed");
    let id = merchant.orders.create_order(INSTANCE, order.into(), "https://shop.test/").await.unwrap().order_id;
    let h_contract = merchant.orders.fetch_order(INSTANCE, &id).await.unwrap().h_contract;
    let request = PayRequest { h_contract, coins: vec![] };
    let result = merchant.payments.pay(INSTANCE, &id, request).await;
    assert_eq!(kind(result), ErrorKind::OrderNotClaimed);
}

#[tokio::test]
async fn payments_for_the_wrong_contract_are_refused() {
    let merchant = TestMerchant::new().await;
    let (id, mut claim) = new_order(&merchant, "wrong-hash", "5").await;
    let coin = five_euro_coin(&claim);
    claim.h_contract = "00".repeat(64);
    let result = pay(&merchant, &id, &claim, vec![coin]).await;
    assert_eq!(kind(result), ErrorKind::ContractNotFound);
}

#[tokio::test]
async fn forged_coins_never_reach_the_mint() {
    let merchant = TestMerchant::new().await;
    let (id, claim) = new_order(&merchant, "forged", "5").await;
    let mut coin = five_euro_coin(&claim);
    coin.amount_without_fee = eur("5");
    let result = pay(&merchant, &id, &claim, vec![coin]).await;
    assert_eq!(kind(result), ErrorKind::CoinSignatureInvalid);
    assert_eq!(merchant.mint.deposit_count(), 0);
}

#[tokio::test]
async fn coins_from_untrusted_mints_are_refused() {
    let merchant = TestMerchant::new().await;
    let (id, claim) = new_order(&merchant, "untrusted", "5").await;
    let coin = Denomination::new(eur("5")).withdraw().pay(&claim, "https://rogue.test/", &eur("0.01"), &eur("0"));
    let result = pay(&merchant, &id, &claim, vec![coin]).await;
    assert_eq!(kind(result), ErrorKind::MintNotTrusted);
}

#[tokio::test]
async fn an_unreachable_mint_leaves_the_order_unpaid() {
    let merchant = TestMerchant::new().await;
    let (id, claim) = new_order(&merchant, "offline", "5").await;
    merchant.mint.set_offline(true);
    let coin = five_euro_coin(&claim);
    let result = pay(&merchant, &id, &claim, vec![coin.clone()]).await;
    assert_eq!(kind(result), ErrorKind::MintUnreachable);
    assert!(!merchant.orders.fetch_order(INSTANCE, &id).await.unwrap().paid);
    merchant.mint.set_offline(false);
    let result = pay(&merchant, &id, &claim, vec![coin]).await.unwrap();
    assert!(matches!(result, PaymentResult::Paid { .. }));
}

#[tokio::test]
async fn late_payments_are_refused_without_deposits() {
    let merchant = TestMerchant::new().await;
    let now = Timestamp::now();
    let mut order = RawOrder::new(eur("5"), "ice cream")
        .with_order_id("late")
        .with_pay_deadline(now.plus(RelativeTime::from_secs(1)));
    order.timestamp = Some(Timestamp::from_secs(now.as_secs() - 100));
    let id = merchant.orders.create_order(INSTANCE, order.into(), "https://shop.test/").await.unwrap().order_id;
    let claim = merchant.orders.claim_order(INSTANCE, &id, &new_nonce()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    let result = pay(&merchant, &id, &claim, vec![five_euro_coin(&claim)]).await;
    assert_eq!(kind(result), ErrorKind::DeadlineExceeded);
    assert_eq!(merchant.mint.deposit_count(), 0);
}

#[tokio::test]
async fn merchants_absorb_fees_up_to_max_fee() {
    let merchant = TestMerchant::new().await;
    let (id, claim) = new_order(&merchant, "fees", "5").await;
    let coin = Denomination::new(eur("5")).withdraw().pay(&claim, TEST_MINT_URL, &eur("0.5"), &eur("0"));
    match pay(&merchant, &id, &claim, vec![coin]).await.unwrap() {
        PaymentResult::Partial { deposits } => assert_eq!(deposits[0].deposit_fee, eur("0.5")),
        r => panic!("A fee above max_fee must be covered by the customer, got {r:?}"),
    }
    let top_up = Denomination::new(eur("0.4")).withdraw().pay(&claim, TEST_MINT_URL, &eur("0"), &eur("0"));
    let result = pay(&merchant, &id, &claim, vec![top_up]).await.unwrap();
    assert!(matches!(result, PaymentResult::Paid { .. }));
}

#[tokio::test]
async fn status_long_poll_wakes_on_payment() {
    let merchant = TestMerchant::new().await;
    let (id, claim) = new_order(&merchant, "poll", "5").await;
    let status = merchant.orders.order_status(INSTANCE, &id, StatusQuery::default()).await.unwrap();
    assert_eq!(status.order_status, OrderStatus::Claimed);
    assert!(status.contract_terms.is_some());
    let query = StatusQuery { timeout_ms: Some(5_000), refund: None };
    let (status, paid) = tokio::join!(merchant.orders.order_status(INSTANCE, &id, query), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        pay(&merchant, &id, &claim, vec![five_euro_coin(&claim)]).await
    });
    assert!(matches!(paid.unwrap(), PaymentResult::Paid { .. }));
    let status = status.unwrap();
    assert!(status.paid);
    assert_eq!(status.order_status, OrderStatus::Paid);
    assert_eq!(status.deposit_total, eur("5"));
}

#[tokio::test]
async fn status_long_poll_times_out() {
    let merchant = TestMerchant::new().await;
    let (id, _) = new_order(&merchant, "idle", "5").await;
    let query = StatusQuery { timeout_ms: Some(200), refund: None };
    let status = merchant.orders.order_status(INSTANCE, &id, query).await.unwrap();
    assert!(!status.paid);
}

#[tokio::test]
async fn orders_are_listed_by_payment_state() {
    let merchant = TestMerchant::new().await;
    let (paid_id, claim) = new_order(&merchant, "paid", "5").await;
    pay(&merchant, &paid_id, &claim, vec![five_euro_coin(&claim)]).await.unwrap();
    new_order(&merchant, "unpaid-1", "5").await;
    new_order(&merchant, "unpaid-2", "5").await;
    let paid = merchant.orders.list_orders(OrderQueryFilter::new(INSTANCE).with_paid(true)).await.unwrap();
    assert_eq!(paid.len(), 1);
    assert_eq!(paid[0].order_id, paid_id);
    let unpaid = merchant.orders.list_orders(OrderQueryFilter::new(INSTANCE).with_paid(false)).await.unwrap();
    assert_eq!(unpaid.len(), 2);
    let newest = merchant.orders.list_orders(OrderQueryFilter::new(INSTANCE).with_delta(-1)).await.unwrap();
    assert_eq!(newest.len(), 1);
    assert_eq!(newest[0].order_id, OrderId::from("unpaid-2"));
}

#[tokio::test]
async fn aborting_a_paid_order_is_refused() {
    let merchant = TestMerchant::new().await;
    let (id, claim) = new_order(&merchant, "no-abort", "5").await;
    pay(&merchant, &id, &claim, vec![five_euro_coin(&claim)]).await.unwrap();
    let request = AbortRequest { h_contract: claim.h_contract.clone() };
    let result = merchant.payments.abort(INSTANCE, &id, request).await;
    assert_eq!(kind(result), ErrorKind::AlreadyPaid);
}

#[tokio::test]
async fn transactions_settle_once_the_mint_aggregates() {
    let merchant = TestMerchant::new().await;
    let (id, claim) = new_order(&merchant, "settle", "5").await;
    let result = merchant.tracker.track_transaction(INSTANCE, &id).await;
    assert_eq!(kind(result), ErrorKind::OrderUnpaid);
    pay(&merchant, &id, &claim, vec![five_euro_coin(&claim)]).await.unwrap();
    match merchant.tracker.track_transaction(INSTANCE, &id).await.unwrap() {
        TrackTransactionResult::Pending { execution_time, transfers } => {
            assert!(execution_time.is_some());
            assert!(transfers.is_empty());
        },
        r => panic!("Nothing has been aggregated yet, got {r:?}"),
    }
    merchant.mint.aggregate("W1", eur("0.01")).unwrap();
    match merchant.tracker.track_transaction(INSTANCE, &id).await.unwrap() {
        TrackTransactionResult::Settled { transfers } => {
            assert_eq!(transfers.len(), 1);
            assert_eq!(transfers[0].wtid, "W1");
            assert_eq!(transfers[0].amount, eur("4.99"));
        },
        r => panic!("The order should be settled, got {r:?}"),
    }
    assert!(merchant.orders.fetch_order(INSTANCE, &id).await.unwrap().wired);
    let cached = merchant.tracker.track_transfer(INSTANCE, "W1", TEST_MINT_URL).await.unwrap();
    assert_eq!(cached.total, eur("4.98"));
}

#[tokio::test]
async fn partially_paid_orders_can_be_refunded_then_aborted() {
    let merchant = TestMerchant::new().await;
    let (id, claim) = new_order(&merchant, "p1", "10").await;
    let coin = five_euro_coin(&claim);
    let result = pay(&merchant, &id, &claim, vec![coin.clone()]).await.unwrap();
    assert!(matches!(result, PaymentResult::Partial { .. }));
    let increase = merchant.refunds.increase_refund(INSTANCE, &id, refund("1")).await.unwrap();
    assert_eq!(increase.total, eur("1"));
    assert_eq!(increase.issued.len(), 1);
    assert_eq!(increase.issued[0].rtransaction_id, 1);
    // Only EUR:5 has been deposited so far
    let result = merchant.refunds.increase_refund(INSTANCE, &id, refund("6")).await;
    assert_eq!(kind(result), ErrorKind::RefundExceedsPayment);

    let permissions = abort(&merchant, &id, &claim).await;
    assert_eq!(permissions.len(), 2);
    assert!(permissions.iter().all(|p| p.coin_pub == coin.coin_pub));
    let mut ids = permissions.iter().map(|p| p.rtransaction_id).collect::<Vec<_>>();
    ids.sort();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(total(&permissions), eur("5"));
    for permission in &permissions {
        merchant.mint.redeem_refund(&claim.h_contract, permission).unwrap();
    }
    let again = abort(&merchant, &id, &claim).await;
    assert_eq!(again, permissions);
    let result = merchant.refunds.increase_refund(INSTANCE, &id, refund("2")).await;
    assert_eq!(kind(result), ErrorKind::OrderAborted);
}

#[tokio::test]
async fn unpaid_orders_without_deposits_cannot_be_refunded() {
    let merchant = TestMerchant::new().await;
    let (id, _) = new_order(&merchant, "nothing-in", "5").await;
    let result = merchant.refunds.increase_refund(INSTANCE, &id, refund("1")).await;
    assert_eq!(kind(result), ErrorKind::OrderUnpaid);
}

#[tokio::test]
async fn coins_the_mint_accepts_after_an_abort_are_refunded() {
    let merchant = TestMerchant::new().await;
    let (id, claim) = new_order(&merchant, "late-coin", "10").await;
    assert!(abort(&merchant, &id, &claim).await.is_empty());
    // The mint confirmed this coin while the abort was being committed
    let order = merchant.orders.fetch_order(INSTANCE, &id).await.unwrap();
    let deposit = NewDeposit {
        coin_pub: "late-coin-pub".into(),
        denom_pub: "denom".into(),
        denom_sig: "denom-sig".into(),
        coin_sig: "coin-sig".into(),
        amount_with_fee: eur("5"),
        amount_without_fee: eur("4.99"),
        deposit_fee: eur("0.01"),
        refund_fee: eur("0.01"),
        mint_url: TEST_MINT_URL.into(),
        mint_pub: "mint".into(),
        mint_sig: "mint-sig".into(),
        h_wire: "h-wire".into(),
    };
    let settlement = PaymentSettlement { amount: eur("10"), max_fee: eur("0.1"), payment_sig: "00".repeat(64) };
    let keys = merchant.registry.require(INSTANCE).unwrap().keys.clone();
    let outcome = merchant.db.record_deposits(order.id, vec![deposit], settlement, &keys).await.unwrap();
    assert!(outcome.aborted);
    assert!(outcome.payment_sig.is_none());
    assert_eq!(outcome.deposits.len(), 1);

    let permissions = abort(&merchant, &id, &claim).await;
    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0].coin_pub, "late-coin-pub");
    assert_eq!(permissions[0].rtransaction_id, 1);
    assert_eq!(permissions[0].refund_amount, eur("5"));
    let merchant_pub = parse_public_key(&permissions[0].merchant_pub).unwrap();
    RefundApprovalStatement {
        coin_pub: "late-coin-pub",
        h_contract: &claim.h_contract,
        rtransaction_id: 1,
        refund_amount: &eur("5"),
    }
    .verify_hex(&permissions[0].merchant_sig, &merchant_pub)
    .unwrap();
}

#[tokio::test]
async fn refund_deadlines_block_increases_but_not_lookups() {
    let merchant = TestMerchant::new().await;
    let deadline = Timestamp::now().plus(RelativeTime::from_secs(1));
    let order = RawOrder::new(eur("5"), "ice cream").with_order_id("deadline").with_refund_deadline(deadline);
    let base_url = merchant.base_url(INSTANCE);
    let id = merchant.orders.create_order(INSTANCE, order.into(), &base_url).await.unwrap().order_id;
    let claim = merchant.orders.claim_order(INSTANCE, &id, &new_nonce()).await.unwrap();
    pay(&merchant, &id, &claim, vec![five_euro_coin(&claim)]).await.unwrap();
    merchant.refunds.increase_refund(INSTANCE, &id, refund("0.1")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    let result = merchant.refunds.increase_refund(INSTANCE, &id, refund("0.2")).await;
    assert_eq!(kind(result), ErrorKind::RefundNotPermittedAfterDeadline);
    let lookup = merchant.refunds.lookup_refunds(INSTANCE, &id).await.unwrap();
    assert_eq!(lookup.refund_amount, eur("0.1"));
    assert_eq!(lookup.refunds.len(), 1);
}

#[tokio::test]
async fn refund_ids_count_up_per_coin() {
    let merchant = TestMerchant::new().await;
    let (id, claim) = new_order(&merchant, "two-coins", "10").await;
    let coins = vec![five_euro_coin(&claim), five_euro_coin(&claim)];
    let result = pay(&merchant, &id, &claim, coins).await.unwrap();
    assert!(matches!(result, PaymentResult::Paid { .. }));
    for amount in ["3", "7", "10"] {
        merchant.refunds.increase_refund(INSTANCE, &id, refund(amount)).await.unwrap();
    }
    let lookup = merchant.refunds.lookup_refunds(INSTANCE, &id).await.unwrap();
    assert_eq!(lookup.refund_amount, eur("10"));
    let merchant_pub = parse_public_key(&lookup.merchant_pub).unwrap();
    let mut per_coin = BTreeMap::<String, Vec<i64>>::new();
    for entry in &lookup.refunds {
        let RefundEntry::Pending { coin_pub, rtransaction_id, refund_amount, merchant_sig, .. } = entry else {
            panic!("Nothing was redeemed, got {entry:?}");
        };
        RefundApprovalStatement {
            coin_pub,
            h_contract: &lookup.h_contract,
            rtransaction_id: *rtransaction_id,
            refund_amount,
        }
        .verify_hex(merchant_sig, &merchant_pub)
        .unwrap();
        per_coin.entry(coin_pub.clone()).or_default().push(*rtransaction_id);
    }
    assert_eq!(per_coin.len(), 2);
    for ids in per_coin.values_mut() {
        ids.sort();
        assert_eq!(*ids, (1..=ids.len() as i64).collect::<Vec<_>>());
    }
}
