use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use log::debug;
use merchant_engine::{
    events::EventProducers,
    merchant_api::order_objects::{ClaimResponse, PostOrderRequest, RawOrder},
    test_utils::{
        fake_mint::FakeMint,
        merchant::{eur, instance_request, TEST_MINT_URL, TEST_PAYTO},
        prepare_env::create_database,
        wallet::new_nonce,
    },
    EngineConfig,
    InstanceApi,
    InstanceRegistry,
    SqliteDatabase,
};
use mint_client::MintApi;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::{
    config::ServerOptions,
    server::{configure_routes, register_apis},
};

/// A backend over a throwaway database with the `default` instance set up. The trusted mint is [`TEST_MINT_URL`],
/// served by `fake_mint` unless a test passes in another [`MintApi`].
pub struct TestServer {
    _dir: TempDir,
    pub db: SqliteDatabase,
    pub registry: InstanceRegistry,
    pub engine: EngineConfig,
    pub fake_mint: FakeMint,
    pub options: ServerOptions,
}

impl TestServer {
    pub async fn new() -> Self {
        let _ = env_logger::try_init();
        let dir = tempfile::tempdir().expect("Could not create a temporary directory");
        let url = format!("sqlite://{}", dir.path().join("merchant.db").display());
        create_database(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        db.run_migrations().await.expect("Error running DB migrations");
        let fake_mint = FakeMint::new(TEST_MINT_URL);
        let engine = EngineConfig::new("EUR").with_mint(fake_mint.trusted());
        let registry = InstanceRegistry::default();
        InstanceApi::new(db.clone(), registry.clone(), engine.clone())
            .create_instance(instance_request("default", &[TEST_PAYTO]))
            .await
            .expect("Error creating the default instance");
        Self { _dir: dir, db, registry, engine, fake_mint, options: ServerOptions::default() }
    }

    /// Sends `req` through the full route table and returns the status and the body. Bodies that are not JSON come
    /// back as a JSON string, empty ones as `null`.
    pub async fn call<M>(&self, mint: &M, req: TestRequest) -> (StatusCode, Value)
    where M: MintApi + Clone + 'static {
        let app = App::new()
            .app_data(web::Data::new(self.options))
            .app_data(web::Data::new(self.engine.clone()));
        let app = register_apis(app, &self.db, mint, &self.registry, &self.engine, &EventProducers::default());
        let service = test::init_service(app.configure(configure_routes::<SqliteDatabase, M>)).await;
        let res = test::call_service(&service, req.to_request()).await;
        let status = res.status();
        let body = test::read_body(res).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
        };
        debug!("Response {status}: {value}");
        (status, value)
    }

    /// Like [`Self::call`], against the in-memory mint.
    pub async fn send(&self, req: TestRequest) -> (StatusCode, Value) {
        let mint = self.fake_mint.clone();
        self.call(&mint, req).await
    }

    /// Creates an order over HTTP and claims it with a fresh nonce. `prefix` is `""` for the default instance.
    pub async fn order_and_claim(&self, prefix: &str, order_id: &str, amount: &str) -> ClaimResponse {
        let order = PostOrderRequest::from(RawOrder::new(eur(amount), "ice cream").with_order_id(order_id));
        let req = TestRequest::post().uri(&format!("{prefix}/private/orders")).set_json(&order);
        let (status, body) = self.send(req).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["order_id"], order_id);
        let req = TestRequest::post()
            .uri(&format!("{prefix}/orders/{order_id}/claim"))
            .set_json(json!({ "nonce": new_nonce() }));
        let (status, body) = self.send(req).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        serde_json::from_value(body).expect("Not a claim response")
    }
}
