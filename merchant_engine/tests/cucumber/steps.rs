use cucumber::{given, then, when};
use merchant_common::{Amount, Timestamp};
use merchant_engine::{
    db_types::OrderId,
    helpers::{parse_public_key, PaymentOkStatement, SignedPurpose},
    merchant_api::{
        order_objects::{PostOrderRequest, RawOrder},
        payment_objects::{AbortRequest, PayRequest, PaymentResult, RefundRequest},
    },
    test_utils::{
        merchant::{eur, TestMerchant, TEST_MINT_URL},
        wallet::{contract_terms, new_nonce, Denomination},
    },
};

use crate::cucumber::MerchantWorld;

const INSTANCE: &str = "default";

fn amount(s: &str) -> Amount {
    s.parse().unwrap_or_else(|e| panic!("'{s}' is not an amount. {e}"))
}

#[given("a merchant backend trusting the test mint")]
async fn merchant_backend(world: &mut MerchantWorld) {
    world.system = Some(TestMerchant::new().await);
}

#[when(expr = "the merchant creates order {string} for {word} with summary {string}")]
async fn create_order(world: &mut MerchantWorld, order_id: String, price: String, summary: String) {
    let order = RawOrder::new(amount(&price), summary)
        .with_order_id(order_id.as_str())
        .with_refund_deadline(Timestamp::zero())
        .with_pay_deadline(Timestamp::never());
    let merchant = world.merchant();
    let base_url = merchant.base_url(INSTANCE);
    let response = merchant
        .orders
        .create_order(INSTANCE, PostOrderRequest::from(order), &base_url)
        .await
        .expect("Error creating order");
    assert_eq!(response.order_id, OrderId::from(order_id.as_str()));
}

#[when(expr = "a wallet claims order {string}")]
async fn claim_order(world: &mut MerchantWorld, order_id: String) {
    let order_id = OrderId::from(order_id.as_str());
    let claim = world.merchant().orders.claim_order(INSTANCE, &order_id, &new_nonce()).await.expect("Error claiming");
    world.claims.insert(order_id, claim);
}

#[when(expr = "the wallet withdraws a {word} coin {string}")]
async fn withdraw(world: &mut MerchantWorld, value: String, name: String) {
    let coin = Denomination::new(amount(&value)).withdraw();
    world.coins.insert(name, coin);
}

#[when(expr = "the wallet pays order {string} with coin {string} at a deposit fee of {word}")]
async fn pay(world: &mut MerchantWorld, order_id: String, coin: String, fee: String) {
    let order_id = OrderId::from(order_id.as_str());
    let claim = world.claim(&order_id);
    let permission = world.coin(&coin).pay(claim, TEST_MINT_URL, &amount(&fee), &eur("0.01"));
    let request = PayRequest { h_contract: claim.h_contract.clone(), coins: vec![permission] };
    let result = world.merchant().payments.pay(INSTANCE, &order_id, request).await;
    world.last_payment = Some(result);
}

#[then(expr = "the payment for order {string} succeeds with a valid receipt")]
async fn payment_succeeds(world: &mut MerchantWorld, order_id: String) {
    let order_id = OrderId::from(order_id.as_str());
    let sig = match world.last_payment.as_ref().expect("No payment was made") {
        Ok(PaymentResult::Paid { sig }) => sig.clone(),
        other => panic!("Expected a receipt, got {other:?}"),
    };
    let claim = world.claim(&order_id);
    let merchant_pub = parse_public_key(&contract_terms(claim).merchant_pub).expect("Bad merchant key");
    PaymentOkStatement { h_contract: &claim.h_contract }
        .verify_hex(&sig, &merchant_pub)
        .expect("Receipt does not verify");
    world.receipts.insert(order_id, sig);
}

#[then(expr = "the receipt for order {string} is unchanged")]
async fn receipt_unchanged(world: &mut MerchantWorld, order_id: String) {
    let order_id = OrderId::from(order_id.as_str());
    let expected = world.receipts.get(&order_id).expect("No earlier receipt");
    match world.last_payment.as_ref().expect("No payment was made") {
        Ok(PaymentResult::Paid { sig }) => assert_eq!(sig, expected),
        other => panic!("Expected a receipt, got {other:?}"),
    }
}

#[then(expr = "order {string} is paid")]
async fn order_is_paid(world: &mut MerchantWorld, order_id: String) {
    let order = world.merchant().orders.fetch_order(INSTANCE, &OrderId::from(order_id.as_str())).await.unwrap();
    assert!(order.paid);
}

#[then(expr = "the payment fails with {word}")]
async fn payment_fails(world: &mut MerchantWorld, kind: String) {
    assert_eq!(world.payment_error().kind().name(), kind);
}

#[then(expr = "the mint's proof shows coin {string} deposited for order {string}")]
async fn proof_shows_coin(world: &mut MerchantWorld, coin: String, order_id: String) {
    let detail = world.payment_error().detail().expect("The error carries no detail");
    let coin_pub = world.coin(&coin).coin_pub();
    assert_eq!(detail["coin_pub"], coin_pub);
    assert_eq!(detail["mint_proof"]["coin_pub"], coin_pub);
    let earlier = world.claim(&OrderId::from(order_id.as_str()));
    assert_eq!(detail["mint_proof"]["history"][0]["h_contract_terms"], earlier.h_contract);
    assert!(detail["mint_proof"]["history"][0]["mint_sig"].is_string());
}

#[then(expr = "order {string} is partially paid by coin {string}")]
async fn partially_paid(world: &mut MerchantWorld, _order_id: String, coin: String) {
    let coin_pub = world.coin(&coin).coin_pub();
    match world.last_payment.as_ref().expect("No payment was made") {
        Ok(PaymentResult::Partial { deposits }) => {
            assert_eq!(deposits.len(), 1);
            assert_eq!(deposits[0].coin_pub, coin_pub);
        },
        other => panic!("Expected a partial payment, got {other:?}"),
    }
}

#[when(expr = "the wallet aborts order {string}")]
async fn abort(world: &mut MerchantWorld, order_id: String) {
    let order_id = OrderId::from(order_id.as_str());
    let request = AbortRequest { h_contract: world.claim(&order_id).h_contract.clone() };
    let permissions = world.merchant().payments.abort(INSTANCE, &order_id, request).await.expect("Error aborting");
    world.permissions.insert(order_id, permissions);
}

#[then(expr = "the wallet holds {int} refund permission(s) for order {string} worth {word}")]
async fn permissions_worth(world: &mut MerchantWorld, count: usize, order_id: String, total: String) {
    let permissions = world.permissions.get(&OrderId::from(order_id.as_str())).expect("No refund permissions");
    assert_eq!(permissions.len(), count);
    let sum = Amount::sum("EUR", permissions.iter().map(|p| &p.refund_amount)).unwrap();
    assert_eq!(sum, amount(&total));
}

#[when(expr = "the wallet redeems its refund permissions for order {string}")]
async fn redeem(world: &mut MerchantWorld, order_id: String) {
    let order_id = OrderId::from(order_id.as_str());
    let h_contract = world.claim(&order_id).h_contract.clone();
    for permission in world.permissions.get(&order_id).expect("No refund permissions") {
        world.merchant().mint.redeem_refund(&h_contract, permission).expect("The mint refused the refund");
    }
}

#[when(expr = "the merchant looks up the refunds of order {string}")]
async fn lookup(world: &mut MerchantWorld, order_id: String) {
    let order_id = OrderId::from(order_id.as_str());
    let lookup = world.merchant().refunds.lookup_refunds(INSTANCE, &order_id).await.expect("Error looking up refunds");
    world.last_lookup = Some(lookup);
}

#[then(expr = "the refund lookup lists {int} refund(s) with status {string}")]
async fn lookup_lists(world: &mut MerchantWorld, count: usize, status: String) {
    let lookup = world.last_lookup.as_ref().expect("No refund lookup");
    assert_eq!(lookup.refunds.len(), count);
    for entry in &lookup.refunds {
        let value = serde_json::to_value(entry).unwrap();
        assert_eq!(value["status"], status);
    }
}

#[then(expr = "the refund lookup lists no refunds")]
async fn lookup_empty(world: &mut MerchantWorld) {
    assert!(world.last_lookup.as_ref().expect("No refund lookup").refunds.is_empty());
}

#[then(expr = "the refund lookup total is {word}")]
async fn lookup_total(world: &mut MerchantWorld, total: String) {
    let lookup = world.last_lookup.as_ref().expect("No refund lookup");
    assert_eq!(lookup.refund_amount, amount(&total));
    let sum = Amount::sum("EUR", lookup.refunds.iter().map(|r| r.refund_amount())).unwrap();
    assert_eq!(sum, lookup.refund_amount);
}

#[when(expr = "the merchant raises the refund of order {string} to {word}")]
async fn raise_refund(world: &mut MerchantWorld, order_id: String, refund: String) {
    let request = RefundRequest { refund: amount(&refund), reason: "customer complaint".into() };
    let result = world.merchant().refunds.increase_refund(INSTANCE, &OrderId::from(order_id.as_str()), request).await;
    world.last_refund = Some(result);
}

#[then(expr = "the refund increase succeeds with a total of {word}")]
async fn refund_succeeds(world: &mut MerchantWorld, total: String) {
    match world.last_refund.as_ref().expect("No refund was requested") {
        Ok(result) => assert_eq!(result.total, amount(&total)),
        Err(e) => panic!("Refund failed: {e}"),
    }
}

#[then(expr = "the refund increase fails with {word}")]
async fn refund_fails(world: &mut MerchantWorld, kind: String) {
    match world.last_refund.as_ref().expect("No refund was requested") {
        Err(e) => assert_eq!(e.kind().name(), kind),
        Ok(result) => panic!("Expected the refund to fail, got {result:?}"),
    }
}

#[when(expr = "the mint aggregates its deposits into transfer {string} with a wire fee of {word}")]
async fn aggregate(world: &mut MerchantWorld, wtid: String, fee: String) {
    world.merchant().mint.aggregate(&wtid, amount(&fee)).expect("Nothing to aggregate");
}

#[when(expr = "the mint reports every transfer total as {word}")]
async fn misreport(world: &mut MerchantWorld, total: String) {
    world.merchant().mint.misreport_transfer_totals(Some(amount(&total)));
}

#[when(expr = "the mint reports transfer totals honestly")]
async fn honest(world: &mut MerchantWorld) {
    world.merchant().mint.misreport_transfer_totals(None);
}

#[when(expr = "the merchant tracks transfer {string}")]
async fn track_transfer(world: &mut MerchantWorld, wtid: String) {
    let result = world.merchant().tracker.track_transfer(INSTANCE, &wtid, TEST_MINT_URL).await;
    world.last_transfer = Some(result);
}

#[then(expr = "the tracked transfer total is {word} for order {string}")]
async fn transfer_total(world: &mut MerchantWorld, total: String, order_id: String) {
    match world.last_transfer.as_ref().expect("No transfer was tracked") {
        Ok(transfer) => {
            assert_eq!(transfer.total, amount(&total));
            let order_id = OrderId::from(order_id.as_str());
            assert!(transfer.deposits.iter().any(|d| d.order_id.as_ref() == Some(&order_id)));
        },
        Err(e) => panic!("Tracking failed: {e}"),
    }
}

#[then(expr = "tracking fails with {word}")]
async fn tracking_fails(world: &mut MerchantWorld, kind: String) {
    match world.last_transfer.as_ref().expect("No transfer was tracked") {
        Err(e) => assert_eq!(e.kind().name(), kind),
        Ok(transfer) => panic!("Expected tracking to fail, got {transfer:?}"),
    }
}

#[then(expr = "order {string} is wired")]
async fn order_is_wired(world: &mut MerchantWorld, order_id: String) {
    let order = world.merchant().orders.fetch_order(INSTANCE, &OrderId::from(order_id.as_str())).await.unwrap();
    assert!(order.wired);
}
