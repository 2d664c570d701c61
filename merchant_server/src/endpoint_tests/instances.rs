use actix_web::{http::StatusCode, test::TestRequest};
use merchant_engine::test_utils::merchant::{instance_request, TEST_PAYTO};
use serde_json::json;

use super::helpers::TestServer;

#[actix_web::test]
async fn health_and_config() {
    let server = TestServer::new().await;
    let (status, body) = server.send(TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
    let (status, body) = server.send(TestRequest::get().uri("/config")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currency"], "EUR");
    assert_eq!(body["version"], "0:0:0");
    assert_eq!(body["exchanges"][0]["url"], "https://mint.test/");
}

#[actix_web::test]
async fn instance_administration() {
    let server = TestServer::new().await;
    let request = instance_request("bakery", &["payto://iban/DE89370400440532013000"]);
    let (status, body) = server.send(TestRequest::post().uri("/instances").set_json(&request)).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = server.send(TestRequest::get().uri("/instances")).await;
    assert_eq!(status, StatusCode::OK);
    let ids = body["instances"].as_array().unwrap().iter().map(|i| i["id"].clone()).collect::<Vec<_>>();
    assert_eq!(ids, vec![json!("bakery"), json!("default")]);

    let (status, body) = server.send(TestRequest::get().uri("/instances/bakery")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "bakery shop");

    let mut changed = request.clone();
    changed.config.name = "Another bakery".into();
    let (status, body) = server.send(TestRequest::post().uri("/instances").set_json(&changed)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 1101);
    assert_eq!(body["error"], "INSTANCE_CONFLICT");

    let req = TestRequest::patch().uri("/instances/bakery").set_json(&changed.config);
    let (status, _) = server.send(req).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = server.send(TestRequest::get().uri("/instances/bakery")).await;
    assert_eq!(body["name"], "Another bakery");

    let (status, body) = server.send(TestRequest::delete().uri("/instances/bakery")).await;
    assert_eq!(status, StatusCode::NO_CONTENT, "{body}");
    let (status, body) = server.send(TestRequest::get().uri("/instances/bakery")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "INSTANCE_UNKNOWN");
}

#[actix_web::test]
async fn instance_routes_are_scoped() {
    let server = TestServer::new().await;
    let request = instance_request("bakery", &[TEST_PAYTO]);
    let (status, _) = server.send(TestRequest::post().uri("/instances").set_json(&request)).await;
    assert_eq!(status, StatusCode::OK);
    server.order_and_claim("/instances/bakery", "bread-1", "3").await;

    let (status, body) = server.send(TestRequest::get().uri("/instances/bakery/private/orders")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orders"].as_array().unwrap().len(), 1);
    let (_, body) = server.send(TestRequest::get().uri("/private/orders")).await;
    assert!(body["orders"].as_array().unwrap().is_empty());
    let (status, body) = server.send(TestRequest::get().uri("/private/orders/bread-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");

    let (status, body) = server.send(TestRequest::get().uri("/instances/nobody/private/orders/bread-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "INSTANCE_UNKNOWN");
}
