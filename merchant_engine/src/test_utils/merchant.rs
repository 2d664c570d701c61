//! A complete merchant backend over a throwaway database and a [`FakeMint`].
use merchant_common::{Amount, RelativeTime};
use serde_json::json;

use crate::{
    events::EventProducers,
    merchant_api::{
        instance_objects::{InstanceConfigRequest, InstanceReconfigureRequest},
        order_api::instance_base_url,
    },
    test_utils::{
        fake_mint::FakeMint,
        prepare_env::{create_database, random_db_path, run_migrations},
    },
    EngineConfig,
    InstanceApi,
    InstanceRegistry,
    InventoryApi,
    OrderApi,
    PaymentApi,
    RefundApi,
    SqliteDatabase,
    TrackApi,
};

pub const TEST_MINT_URL: &str = "https://mint.test/";
pub const TEST_SHOP_URL: &str = "https://shop.test/";
pub const TEST_PAYTO: &str = "payto://x-taler-bank/bank.test/42";

pub fn eur(s: &str) -> Amount {
    format!("EUR:{s}").parse().expect("Not a valid amount")
}

/// Settings for an instance paying out to `payto_uris`, with fees of up to 10 cents absorbed.
pub fn instance_request(id: &str, payto_uris: &[&str]) -> InstanceConfigRequest {
    InstanceConfigRequest {
        id: id.to_string(),
        config: InstanceReconfigureRequest {
            name: format!("{id} shop"),
            address: json!({ "country": "DE", "town": "Berlin" }),
            jurisdiction: json!({ "country": "DE" }),
            payto_uris: payto_uris.iter().map(|s| s.to_string()).collect(),
            default_max_deposit_fee: eur("0.1"),
            default_max_wire_fee: eur("0.1"),
            default_wire_fee_amortization: 1,
            default_wire_transfer_delay: RelativeTime::from_secs(86_400),
            default_pay_delay: RelativeTime::from_secs(3_600),
        },
    }
}

pub struct TestMerchant {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub mint: FakeMint,
    pub config: EngineConfig,
    pub registry: InstanceRegistry,
    pub producers: EventProducers,
    pub instances: InstanceApi<SqliteDatabase>,
    pub inventory: InventoryApi<SqliteDatabase>,
    pub orders: OrderApi<SqliteDatabase>,
    pub payments: PaymentApi<SqliteDatabase, FakeMint>,
    pub refunds: RefundApi<SqliteDatabase, FakeMint>,
    pub tracker: TrackApi<SqliteDatabase, FakeMint>,
}

impl std::fmt::Debug for TestMerchant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TestMerchant({})", self.db_path)
    }
}

impl TestMerchant {
    /// A fresh backend with one instance, `default`, that trusts the fake mint.
    pub async fn new() -> Self {
        let db_path = random_db_path();
        create_database(&db_path).await;
        run_migrations(&db_path).await;
        let db = SqliteDatabase::new_with_url(&db_path, 5).await.expect("Error creating connection to database");
        let mint = FakeMint::new(TEST_MINT_URL);
        let config = EngineConfig::new("EUR").with_mint(mint.trusted());
        let registry = InstanceRegistry::default();
        let producers = EventProducers::default();
        let merchant = Self {
            instances: InstanceApi::new(db.clone(), registry.clone(), config.clone()),
            inventory: InventoryApi::new(db.clone(), registry.clone(), config.clone()),
            orders: OrderApi::new(db.clone(), registry.clone(), config.clone(), producers.clone()),
            payments: PaymentApi::new(db.clone(), mint.clone(), registry.clone(), config.clone(), producers.clone()),
            refunds: RefundApi::new(db.clone(), mint.clone(), registry.clone(), producers.clone()),
            tracker: TrackApi::new(db.clone(), mint.clone(), registry.clone(), config.clone(), producers.clone()),
            db_path,
            db,
            mint,
            config,
            registry,
            producers,
        };
        merchant
            .instances
            .create_instance(instance_request("default", &[TEST_PAYTO]))
            .await
            .expect("Error creating the default instance");
        merchant
    }

    pub fn base_url(&self, instance_id: &str) -> String {
        instance_base_url(TEST_SHOP_URL, instance_id)
    }
}
