use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::{json, Value};

use super::helpers::TestServer;

fn cone(stocked: i64) -> Value {
    json!({
        "product_id": "cone",
        "description": "Waffle cone",
        "unit": "piece",
        "price": "EUR:1",
        "total_stocked": stocked,
    })
}

fn lock(uuid: &str, quantity: i64) -> TestRequest {
    TestRequest::post()
        .uri("/private/products/cone/lock")
        .set_json(json!({ "lock_uuid": uuid, "quantity": quantity, "duration": { "d_s": 600 } }))
}

#[actix_web::test]
async fn product_inventory() {
    let server = TestServer::new().await;
    let (status, body) = server.send(TestRequest::post().uri("/private/products").set_json(cone(5))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, body) = server.send(TestRequest::post().uri("/private/products").set_json(cone(7))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "PRODUCT_CONFLICT");

    let (status, body) = server.send(TestRequest::get().uri("/private/products")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["products"], json!([{ "product_id": "cone" }]));

    let (status, body) = server.send(lock("wallet-a", 3)).await;
    assert_eq!(status, StatusCode::NO_CONTENT, "{body}");
    let (status, body) = server.send(lock("wallet-b", 3)).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], 1502);
    let (_, body) = server.send(TestRequest::get().uri("/private/products/cone")).await;
    assert_eq!(body["total_locked"], 3);

    let (status, _) = server.send(lock("wallet-a", 0)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = server.send(lock("wallet-b", 3)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let mut details = cone(10);
    details.as_object_mut().unwrap().remove("product_id");
    let req = TestRequest::patch().uri("/private/products/cone").set_json(&details);
    let (status, body) = server.send(req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (_, body) = server.send(TestRequest::get().uri("/private/products/cone")).await;
    assert_eq!(body["total_stocked"], 10);
}

#[actix_web::test]
async fn unknown_products() {
    let server = TestServer::new().await;
    let (status, body) = server.send(TestRequest::get().uri("/private/products/cone")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "PRODUCT_NOT_FOUND");
    let (status, _) = server.send(lock("wallet-a", 1)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server.send(TestRequest::delete().uri("/private/products/cone")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
