use actix_web::{http::StatusCode, test::TestRequest};
use merchant_engine::test_utils::wallet::new_nonce;
use serde_json::json;

use super::helpers::TestServer;

#[actix_web::test]
async fn create_and_claim_an_order() {
    let server = TestServer::new().await;
    let claim = server.order_and_claim("", "ice-1", "5").await;
    assert_eq!(claim.contract_terms["order_id"], "ice-1");
    assert!(claim.contract_terms["merchant_base_url"].as_str().unwrap().ends_with('/'));

    let (status, body) = server.send(TestRequest::get().uri("/private/orders/ice-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paid"], false);

    let req = TestRequest::post().uri("/orders/ice-1/claim").set_json(json!({ "nonce": new_nonce() }));
    let (status, body) = server.send(req).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 1202);
    assert_eq!(body["error"], "ALREADY_CLAIMED");

    let (status, body) = server.send(TestRequest::get().uri("/private/orders?paid=no")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orders"][0]["order_id"], "ice-1");
    let (_, body) = server.send(TestRequest::get().uri("/private/orders?paid=yes")).await;
    assert!(body["orders"].as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn malformed_bodies_are_bad_requests() {
    let server = TestServer::new().await;
    let req = TestRequest::post()
        .uri("/private/orders")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{\"order\": {\"amount\": ");
    let (status, body) = server.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1000);
    assert_eq!(body["error"], "BAD_REQUEST");

    let req = TestRequest::post().uri("/private/orders").set_json(json!({ "order": { "amount": "EUR:1" } }));
    let (status, body) = server.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1000);

    let (status, body) = server.send(TestRequest::get().uri("/private/orders?delta=many")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1000);
}

#[actix_web::test]
async fn foreign_currencies_are_refused() {
    let server = TestServer::new().await;
    let req = TestRequest::post()
        .uri("/private/orders")
        .set_json(json!({ "order": { "amount": "KUDOS:1", "summary": "tea" } }));
    let (status, body) = server.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "CURRENCY_MISMATCH");
}

#[actix_web::test]
async fn unknown_orders_cannot_be_claimed() {
    let server = TestServer::new().await;
    let req = TestRequest::post().uri("/orders/nope/claim").set_json(json!({ "nonce": new_nonce() }));
    let (status, body) = server.send(req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 1200);
}
