use actix_web::{http::StatusCode, test::TestRequest};
use merchant_engine::{
    merchant_api::payment_objects::PayRequest,
    test_utils::{
        merchant::{eur, TEST_MINT_URL},
        wallet::Denomination,
    },
};
use mint_client::MintApiError;
use serde_json::json;

use super::{
    helpers::TestServer,
    mocks::{MockMint, SharedMint},
};

#[actix_web::test]
async fn mint_rejections_are_passed_on() {
    let server = TestServer::new().await;
    let claim = server.order_and_claim("", "ice-1", "5").await;
    let coin = Denomination::new(eur("5")).withdraw();
    let proof = json!({ "code": "COIN_INSUFFICIENT_FUNDS", "coin_pub": coin.coin_pub() });
    let mut mock = MockMint::new();
    let mint_proof = proof.clone();
    mock.expect_deposit()
        .times(1)
        .returning(move |_, _| Err(MintApiError::Rejected { status: 409, proof: mint_proof.clone() }));
    let mint = SharedMint::new(mock);

    let permission = coin.pay(&claim, TEST_MINT_URL, &eur("0.01"), &eur("0.01"));
    let pay = PayRequest { h_contract: claim.h_contract.clone(), coins: vec![permission] };
    let (status, body) = server.call(&mint, TestRequest::post().uri("/orders/ice-1/pay").set_json(&pay)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 1303);
    assert_eq!(body["error"], "MINT_REJECTED");
    assert_eq!(body["detail"]["mint_proof"], proof);
    assert_eq!(body["detail"]["coin_pub"], coin.coin_pub());

    let (_, body) = server.send(TestRequest::get().uri("/private/orders/ice-1")).await;
    assert_eq!(body["paid"], false);
}

#[actix_web::test]
async fn payments_need_coins_and_the_right_contract() {
    let server = TestServer::new().await;
    let claim = server.order_and_claim("", "ice-1", "5").await;
    let pay = PayRequest { h_contract: claim.h_contract.clone(), coins: vec![] };
    let req = TestRequest::post().uri("/orders/ice-1/pay").set_json(&pay);
    let (status, body) = server.call(&SharedMint::untouched(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "PARAMETER_MISSING");

    let pay = PayRequest { h_contract: "00".repeat(64), coins: vec![] };
    let req = TestRequest::post().uri("/orders/ice-1/pay").set_json(&pay);
    let (status, body) = server.call(&SharedMint::untouched(), req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "CONTRACT_NOT_FOUND");
}

#[actix_web::test]
async fn partial_payments_ask_for_more() {
    let server = TestServer::new().await;
    let claim = server.order_and_claim("", "big-1", "10").await;
    let coin = Denomination::new(eur("5")).withdraw();
    let pay = PayRequest {
        h_contract: claim.h_contract.clone(),
        coins: vec![coin.pay(&claim, TEST_MINT_URL, &eur("0.01"), &eur("0.01"))],
    };
    let (status, body) = server.send(TestRequest::post().uri("/orders/big-1/pay").set_json(&pay)).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], 1301);
    assert_eq!(body["detail"]["deposits"].as_array().unwrap().len(), 1);

    let more = Denomination::new(eur("5")).withdraw();
    let pay = PayRequest {
        h_contract: claim.h_contract.clone(),
        coins: vec![more.pay(&claim, TEST_MINT_URL, &eur("0.01"), &eur("0.01"))],
    };
    let (status, body) = server.send(TestRequest::post().uri("/orders/big-1/pay").set_json(&pay)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["sig"].is_string());
}

#[actix_web::test]
async fn refunds_come_with_a_wallet_uri() {
    let server = TestServer::new().await;
    let claim = server.order_and_claim("", "paid-1", "5").await;
    let coin = Denomination::new(eur("5")).withdraw();
    let pay = PayRequest {
        h_contract: claim.h_contract.clone(),
        coins: vec![coin.pay(&claim, TEST_MINT_URL, &eur("0.01"), &eur("0.01"))],
    };
    let (status, _) = server.send(TestRequest::post().uri("/orders/paid-1/pay").set_json(&pay)).await;
    assert_eq!(status, StatusCode::OK);

    let req = TestRequest::post()
        .uri("/private/orders/paid-1/refund")
        .insert_header(("Host", "shop.example"))
        .insert_header(("X-Forwarded-Proto", "https"))
        .set_json(json!({ "refund": "EUR:1", "reason": "melted" }));
    let (status, body) = server.send(req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["refund_amount"], "EUR:1");
    assert_eq!(body["taler_refund_uri"], "taler://refund/shop.example/-/-/paid-1");

    let req = TestRequest::post()
        .uri("/private/orders/paid-1/refund")
        .insert_header(("Host", "shop.example"))
        .set_json(json!({ "refund": "EUR:2", "reason": "melted more" }));
    let (status, body) = server.send(req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["taler_refund_uri"], "taler://refund/shop.example/-/-/paid-1?insecure=1");

    let req = TestRequest::post()
        .uri("/private/orders/paid-1/refund")
        .set_json(json!({ "refund": "EUR:1", "reason": "oops" }));
    let (status, body) = server.send(req).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "REFUND_INCONSISTENT_AMOUNT");

    let (status, body) = server.send(TestRequest::get().uri("/orders/paid-1/refund")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}
