use merchant_engine::{
    merchant_api::order_objects::{PostOrderRequest, RawOrder},
    test_utils::merchant::{eur, instance_request, TestMerchant, TEST_PAYTO},
    ErrorKind,
    InstanceRegistry,
};

#[tokio::test]
async fn creating_an_instance_twice_is_idempotent() {
    let merchant = TestMerchant::new().await;
    let request = instance_request("acme", &["payto://iban/DE89370400440532013000"]);
    let first = merchant.instances.create_instance(request.clone()).await.unwrap();
    let again = merchant.instances.create_instance(request.clone()).await.unwrap();
    assert_eq!(first.merchant_pub, again.merchant_pub);
    assert_eq!(first.accounts, again.accounts);

    let mut changed = request;
    changed.config.name = "Acme Corp".into();
    let conflict = merchant.instances.create_instance(changed).await;
    assert_eq!(conflict.unwrap_err().kind(), ErrorKind::InstanceConflict);
    assert_eq!(merchant.instances.list_instances().len(), 2);
}

#[tokio::test]
async fn malformed_instances_are_refused() {
    let merchant = TestMerchant::new().await;
    let bad_uri = instance_request("bad", &["mailto:shop@example.com"]);
    assert_eq!(merchant.instances.create_instance(bad_uri).await.unwrap_err().kind(), ErrorKind::ParameterMalformed);
    let duplicate = instance_request("dup", &["payto://iban/DE001", "PAYTO://IBAN/de001"]);
    assert_eq!(merchant.instances.create_instance(duplicate).await.unwrap_err().kind(), ErrorKind::ParameterMalformed);
    let bad_id = instance_request("no spaces", &[TEST_PAYTO]);
    assert_eq!(merchant.instances.create_instance(bad_id).await.unwrap_err().kind(), ErrorKind::ParameterMalformed);
    assert_eq!(merchant.instances.list_instances().len(), 1);
}

#[tokio::test]
async fn reconfiguring_replaces_the_account_list() {
    let merchant = TestMerchant::new().await;
    let before = merchant.instances.instance_details("default").unwrap();
    assert_eq!(before.accounts.len(), 1);
    let kept = before.accounts[0].clone();

    let mut update = instance_request("default", &[TEST_PAYTO, "payto://iban/DE001"]).config;
    update.name = "Renamed".into();
    let after = merchant.instances.update_instance("default", update).await.unwrap();
    assert_eq!(after.settings.name, "Renamed");
    assert_eq!(after.accounts.len(), 2);
    let same = after.accounts.iter().find(|a| a.payto_uri == kept.payto_uri).unwrap();
    assert_eq!(same.h_wire, kept.h_wire);
    assert_eq!(same.salt, kept.salt);

    let update = instance_request("default", &["payto://iban/DE001"]).config;
    let after = merchant.instances.update_instance("default", update).await.unwrap();
    assert_eq!(after.accounts.len(), 1);
    assert_eq!(after.accounts[0].wire_method, "iban");

    // The registry handed to other APIs sees the change.
    let reloaded = InstanceRegistry::load_all(&merchant.db).await.unwrap();
    assert_eq!(reloaded.require("default").unwrap().accounts.len(), 1);
    assert_eq!(merchant.registry.require("default").unwrap().accounts.len(), 1);
}

#[tokio::test]
async fn orders_need_a_matching_account() {
    let merchant = TestMerchant::new().await;
    let mut request = PostOrderRequest::from(RawOrder::new(eur("5"), "ice cream"));
    request.payment_target = Some("iban".into());
    let result = merchant.orders.create_order("default", request, "https://shop.test/").await;
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InstanceHasNoWire);
}

#[tokio::test]
async fn deleted_instances_disappear() {
    let merchant = TestMerchant::new().await;
    merchant.instances.create_instance(instance_request("gone", &[TEST_PAYTO])).await.unwrap();
    merchant.instances.delete_instance("gone").await.unwrap();
    assert_eq!(merchant.instances.instance_details("gone").unwrap_err().kind(), ErrorKind::InstanceUnknown);
    assert_eq!(merchant.instances.delete_instance("gone").await.unwrap_err().kind(), ErrorKind::InstanceUnknown);
    let order = RawOrder::new(eur("5"), "ice cream");
    let result = merchant.orders.create_order("gone", order.into(), "https://shop.test/").await;
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InstanceUnknown);
}
