use std::time::Duration;

use actix_web::{
    dev::Server,
    error::{JsonPayloadError, PathError, QueryPayloadError},
    http::KeepAlive,
    middleware::Logger,
    web,
    web::ServiceConfig,
    App,
    HttpRequest,
    HttpServer,
};
use log::*;
use merchant_engine::{
    events::{EventHandlers, EventHooks, EventProducers, OrderEvent, OrderEventBus},
    merchant_api::config::EngineConfig,
    traits::MerchantBackend,
    InstanceApi,
    InstanceRegistry,
    InventoryApi,
    OrderApi,
    PaymentApi,
    RefundApi,
    SqliteDatabase,
    TrackApi,
};
use mint_client::{MintApi, MintHttpClient};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_lock_expiry_worker,
    routes::{
        health,
        AbortOrderRoute,
        ClaimOrderRoute,
        CreateInstanceRoute,
        CreateOrderRoute,
        CreateProductRoute,
        DeleteInstanceRoute,
        DeleteProductRoute,
        IncreaseRefundRoute,
        InstanceRoute,
        InstancesRoute,
        LockProductRoute,
        OrderStatusRoute,
        OrdersRoute,
        PayOrderRoute,
        ProductRoute,
        ProductsRoute,
        RefundLookupRoute,
        TrackTransactionRoute,
        TrackTransferRoute,
        UpdateInstanceRoute,
        UpdateProductRoute,
    },
};

const EVENT_BUFFER_SIZE: usize = 25;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.db_max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let mint =
        MintHttpClient::new(config.mint_client.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let registry = InstanceRegistry::load_all(&db).await?;
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, audit_log_hooks());
    let producers = handlers.producers(OrderEventBus::default());
    handlers.start_handlers().await;
    let inventory = InventoryApi::new(db.clone(), registry.clone(), config.engine.clone());
    let _worker = start_lock_expiry_worker(inventory, config.lock_sweep_interval);
    let srv = create_server_instance(config, db, mint, registry, producers)?;
    srv.await.map_err(ServerError::from)
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    mint: MintHttpClient,
    registry: InstanceRegistry,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let engine = config.engine.clone();
    let options = config.options();
    let srv = HttpServer::new(move || {
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("merchant::access_log"))
            .app_data(web::Data::new(options))
            .app_data(web::Data::new(engine.clone()));
        let app = register_apis(app, &db, &mint, &registry, &engine, &producers);
        app.configure(configure_routes::<SqliteDatabase, MintHttpClient>)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    info!("💻️ Merchant backend listening on {}:{}", config.host, config.port);
    Ok(srv)
}

/// Hands every engine API to the app. Each worker gets its own API structs; they share the pool, the registry and the
/// event bus.
pub fn register_apis<T, B, M>(
    app: App<T>,
    db: &B,
    mint: &M,
    registry: &InstanceRegistry,
    engine: &EngineConfig,
    producers: &EventProducers,
) -> App<T>
where
    T: actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Error = actix_web::Error,
        InitError = (),
    >,
    B: MerchantBackend + 'static,
    M: MintApi + Clone + 'static,
{
    let r = registry.clone();
    app.app_data(web::Data::new(InstanceApi::new(db.clone(), r.clone(), engine.clone())))
        .app_data(web::Data::new(InventoryApi::new(db.clone(), r.clone(), engine.clone())))
        .app_data(web::Data::new(OrderApi::new(db.clone(), r.clone(), engine.clone(), producers.clone())))
        .app_data(web::Data::new(PaymentApi::new(
            db.clone(),
            mint.clone(),
            r.clone(),
            engine.clone(),
            producers.clone(),
        )))
        .app_data(web::Data::new(RefundApi::new(db.clone(), mint.clone(), r.clone(), producers.clone())))
        .app_data(web::Data::new(TrackApi::new(db.clone(), mint.clone(), r, engine.clone(), producers.clone())))
}

/// Registers every route, plus extractor settings that turn malformed input into `BAD_REQUEST` replies.
///
/// Instance administration is registered before the `/instances/{instance}` scope so that it takes precedence.
pub fn configure_routes<B, M>(cfg: &mut ServiceConfig)
where
    B: MerchantBackend + 'static,
    M: MintApi + 'static,
{
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error))
        .service(health)
        .service(crate::routes::config)
        .service(CreateInstanceRoute::<B>::new())
        .service(InstancesRoute::<B>::new())
        .service(InstanceRoute::<B>::new())
        .service(UpdateInstanceRoute::<B>::new())
        .service(DeleteInstanceRoute::<B>::new())
        .service(web::scope("/instances/{instance}").configure(instance_routes::<B, M>))
        .configure(instance_routes::<B, M>);
}

fn instance_routes<B, M>(cfg: &mut ServiceConfig)
where
    B: MerchantBackend + 'static,
    M: MintApi + 'static,
{
    cfg.service(CreateOrderRoute::<B>::new())
        .service(OrdersRoute::<B>::new())
        .service(TrackTransactionRoute::<B, M>::new())
        .service(IncreaseRefundRoute::<B, M>::new())
        .service(OrderStatusRoute::<B>::new())
        .service(TrackTransferRoute::<B, M>::new())
        .service(ClaimOrderRoute::<B>::new())
        .service(PayOrderRoute::<B, M>::new())
        .service(AbortOrderRoute::<B, M>::new())
        .service(RefundLookupRoute::<B, M>::new())
        .service(CreateProductRoute::<B>::new())
        .service(ProductsRoute::<B>::new())
        .service(LockProductRoute::<B>::new())
        .service(ProductRoute::<B>::new())
        .service(UpdateProductRoute::<B>::new())
        .service(DeleteProductRoute::<B>::new());
}

fn json_error(e: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    debug!("💻️ Rejecting request body. {e}");
    ServerError::InvalidRequestBody(e.to_string()).into()
}

fn query_error(e: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    debug!("💻️ Rejecting query string. {e}");
    ServerError::InvalidQuery(e.to_string()).into()
}

fn path_error(e: PathError, _req: &HttpRequest) -> actix_web::Error {
    debug!("💻️ Rejecting request path. {e}");
    ServerError::InvalidRequestPath(e.to_string()).into()
}

/// Paid and refunded orders are written to the audit log target, so that they can be shipped separately.
fn audit_log_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(|ev: OrderEvent| {
        Box::pin(async move {
            info!(target: "merchant::audit", "💰️ Order [{}/{}] paid", ev.instance_id, ev.order_id);
        })
    });
    hooks.on_order_refunded(|ev: OrderEvent| {
        Box::pin(async move {
            let (instance, order, kind) = (ev.instance_id, ev.order_id, ev.kind);
            info!(target: "merchant::audit", "↩️ Order [{instance}/{order}] refund changed: {kind:?}");
        })
    });
    hooks
}
