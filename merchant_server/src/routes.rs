//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Every instance-scoped route is served twice: at the root for the default instance, and below
//! `/instances/{instance}/` for all the others. Handlers find out which through [`instance_id`].
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Long polls in particular must only ever `.await`.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use merchant_engine::{
    db_types::ProductDetails,
    merchant_api::{
        config::EngineConfig,
        instance_objects::{InstanceConfigRequest, InstanceReconfigureRequest},
        inventory_objects::{LockRequest, NewProductRequest},
        order_api::instance_base_url,
        order_objects::{ClaimRequest, PostOrderRequest, StatusQuery},
        payment_objects::{
            AbortRequest,
            AbortResponse,
            PayRequest,
            PaymentOkResponse,
            PaymentResult,
            RefundRequest,
            TrackTransactionResult,
        },
    },
    traits::{InstanceManagement, InventoryManagement, MerchantBackend},
    ErrorKind,
    InstanceApi,
    InventoryApi,
    OrderApi,
    PaymentApi,
    RefundApi,
    TrackApi,
};
use mint_client::MintApi;
use serde_json::json;

use crate::{
    config::ServerOptions,
    data_objects::{
        ConfigResponse,
        ExchangeInfo,
        InstancePath,
        ListOrdersParams,
        OrderPath,
        PendingTransactionResponse,
        ProductPath,
        RefundIncreaseResponse,
        TransferParams,
    },
    errors::{error_body, status_for, ServerError},
    helpers::{instance_id, RequestOrigin},
};

/// The protocol version reported by `/config`, as `current:revision:age`.
pub const PROTOCOL_VERSION: &str = "0:0:0";

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, app_service: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, app_service);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------   Config  ----------------------------------------------------
#[get("/config")]
pub async fn config(engine: web::Data<EngineConfig>) -> impl Responder {
    trace!("💻️ Received config request");
    let exchanges = engine
        .mints
        .iter()
        .map(|m| ExchangeInfo { url: m.url.clone(), master_pub: m.master_pub.clone() })
        .collect();
    HttpResponse::Ok().json(ConfigResponse {
        name: "merchant-core".to_string(),
        version: PROTOCOL_VERSION.to_string(),
        currency: engine.currency.clone(),
        exchanges,
    })
}

//----------------------------------------------   Instances  ----------------------------------------------------
route!(create_instance => Post "/instances" impl InstanceManagement);
/// Creates an instance with a fresh key pair. Posting the same settings twice is harmless; different settings under an
/// existing id are a conflict.
pub async fn create_instance<B: InstanceManagement>(
    body: web::Json<InstanceConfigRequest>,
    api: web::Data<InstanceApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST instance '{}'", request.id);
    let details = api.create_instance(request).await?;
    Ok(HttpResponse::Ok().json(details))
}

route!(instances => Get "/instances" impl InstanceManagement);
pub async fn instances<B: InstanceManagement>(api: web::Data<InstanceApi<B>>) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET instances");
    Ok(HttpResponse::Ok().json(json!({ "instances": api.list_instances() })))
}

route!(instance => Get "/instances/{id}" impl InstanceManagement);
pub async fn instance<B: InstanceManagement>(
    path: web::Path<InstancePath>,
    api: web::Data<InstanceApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET instance '{}'", path.id);
    let details = api.instance_details(&path.id)?;
    Ok(HttpResponse::Ok().json(details))
}

route!(update_instance => Patch "/instances/{id}" impl InstanceManagement);
/// Replaces the settings and the full account list of an instance. Accounts left out of `payto_uris` are inactivated.
pub async fn update_instance<B: InstanceManagement>(
    path: web::Path<InstancePath>,
    body: web::Json<InstanceReconfigureRequest>,
    api: web::Data<InstanceApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ PATCH instance '{}'", path.id);
    let details = api.update_instance(&path.id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(details))
}

route!(delete_instance => Delete "/instances/{id}" impl InstanceManagement);
pub async fn delete_instance<B: InstanceManagement>(
    path: web::Path<InstancePath>,
    api: web::Data<InstanceApi<B>>,
) -> Result<HttpResponse, ServerError> {
    info!("💻️ DELETE instance '{}'", path.id);
    api.delete_instance(&path.id).await?;
    Ok(HttpResponse::NoContent().finish())
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(create_order => Post "/private/orders" impl MerchantBackend);
/// Creates an order and returns its id. The contract's `merchant_base_url` is derived from the request, so that the
/// wallet reaches the instance the same way the frontend did.
pub async fn create_order<B: MerchantBackend>(
    req: HttpRequest,
    body: web::Json<PostOrderRequest>,
    api: web::Data<OrderApi<B>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let instance = instance_id(&req);
    debug!("💻️ POST order for '{instance}'");
    let origin = RequestOrigin::from_request(&req, options.honour_forwarded_prefix);
    let base_url = instance_base_url(&origin.base_url(), &instance);
    let response = api.create_order(&instance, body.into_inner(), &base_url).await?;
    Ok(HttpResponse::Ok().json(response))
}

route!(orders => Get "/private/orders" impl MerchantBackend);
pub async fn orders<B: MerchantBackend>(
    req: HttpRequest,
    query: web::Query<ListOrdersParams>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let instance = instance_id(&req);
    let filter = query.into_inner().into_filter(&instance);
    debug!("💻️ GET orders for '{instance}' with {filter:?}");
    let orders = api.list_orders(filter).await?;
    Ok(HttpResponse::Ok().json(json!({ "orders": orders })))
}

route!(order_status => Get "/private/orders/{order_id}" impl MerchantBackend);
/// The status of an order. With `timeout_ms` this is a long poll that returns as soon as the order is paid (and, if
/// `refund` is given, refunded up to that amount), or when the timeout expires.
pub async fn order_status<B: MerchantBackend>(
    req: HttpRequest,
    path: web::Path<OrderPath>,
    query: web::Query<StatusQuery>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let instance = instance_id(&req);
    trace!("💻️ GET order status [{instance}/{}]", path.order_id);
    let status = api.order_status(&instance, &path.order_id, query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(status))
}

route!(claim_order => Post "/orders/{order_id}/claim" impl MerchantBackend);
pub async fn claim_order<B: MerchantBackend>(
    req: HttpRequest,
    path: web::Path<OrderPath>,
    body: web::Json<ClaimRequest>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let instance = instance_id(&req);
    debug!("💻️ POST claim [{instance}/{}]", path.order_id);
    let claim = api.claim_order(&instance, &path.order_id, &body.nonce).await?;
    Ok(HttpResponse::Ok().json(claim))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(pay_order => Post "/orders/{order_id}/pay" impl MerchantBackend, MintApi);
/// Deposits the wallet's coins at their mints. A payment that does not yet cover the contract is answered with
/// `402 PARTIAL_PAYMENT`, listing what has been deposited so far.
pub async fn pay_order<B: MerchantBackend, M: MintApi>(
    req: HttpRequest,
    path: web::Path<OrderPath>,
    body: web::Json<PayRequest>,
    api: web::Data<PaymentApi<B, M>>,
) -> Result<HttpResponse, ServerError> {
    let instance = instance_id(&req);
    let request = body.into_inner();
    debug!("💻️ POST pay [{instance}/{}] with {} coin(s)", path.order_id, request.coins.len());
    match api.pay(&instance, &path.order_id, request).await? {
        PaymentResult::Paid { sig } => Ok(HttpResponse::Ok().json(PaymentOkResponse { sig })),
        PaymentResult::Partial { deposits } => {
            let kind = ErrorKind::PartialPayment;
            let body = error_body(
                kind,
                "The coins deposited so far do not cover the contract",
                Some(json!({ "deposits": deposits })),
            );
            Ok(HttpResponse::build(status_for(kind)).json(body))
        },
    }
}

route!(abort_order => Post "/orders/{order_id}/abort" impl MerchantBackend, MintApi);
pub async fn abort_order<B: MerchantBackend, M: MintApi>(
    req: HttpRequest,
    path: web::Path<OrderPath>,
    body: web::Json<AbortRequest>,
    api: web::Data<PaymentApi<B, M>>,
) -> Result<HttpResponse, ServerError> {
    let instance = instance_id(&req);
    debug!("💻️ POST abort [{instance}/{}]", path.order_id);
    let refunds = api.abort(&instance, &path.order_id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(AbortResponse { refunds }))
}

//----------------------------------------------   Refunds  ----------------------------------------------------
route!(increase_refund => Post "/private/orders/{order_id}/refund" impl MerchantBackend, MintApi);
pub async fn increase_refund<B: MerchantBackend, M: MintApi>(
    req: HttpRequest,
    path: web::Path<OrderPath>,
    body: web::Json<RefundRequest>,
    api: web::Data<RefundApi<B, M>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let instance = instance_id(&req);
    let request = body.into_inner();
    info!("💻️ POST refund of {} for [{instance}/{}]", request.refund, path.order_id);
    let result = api.increase_refund(&instance, &path.order_id, request).await?;
    let origin = RequestOrigin::from_request(&req, options.honour_forwarded_prefix);
    Ok(HttpResponse::Ok().json(RefundIncreaseResponse {
        taler_refund_uri: origin.taler_refund_uri(&instance, &result.order_id),
        order_id: result.order_id,
        h_contract: result.h_contract,
        refund_amount: result.total,
    }))
}

route!(refund_lookup => Get "/orders/{order_id}/refund" impl MerchantBackend, MintApi);
pub async fn refund_lookup<B: MerchantBackend, M: MintApi>(
    req: HttpRequest,
    path: web::Path<OrderPath>,
    api: web::Data<RefundApi<B, M>>,
) -> Result<HttpResponse, ServerError> {
    let instance = instance_id(&req);
    debug!("💻️ GET refunds [{instance}/{}]", path.order_id);
    let refunds = api.lookup_refunds(&instance, &path.order_id).await?;
    Ok(HttpResponse::Ok().json(refunds))
}

//----------------------------------------------   Tracking  ----------------------------------------------------
route!(track_transaction => Get "/private/orders/{order_id}/transactions" impl MerchantBackend, MintApi);
/// The wire transfers that settled an order. While some deposits are still waiting to be aggregated the reply is
/// `202 Accepted`, with the mint's estimate of when that will happen.
pub async fn track_transaction<B: MerchantBackend, M: MintApi>(
    req: HttpRequest,
    path: web::Path<OrderPath>,
    api: web::Data<TrackApi<B, M>>,
) -> Result<HttpResponse, ServerError> {
    let instance = instance_id(&req);
    debug!("💻️ GET transactions [{instance}/{}]", path.order_id);
    let result = api.track_transaction(&instance, &path.order_id).await?;
    match result {
        TrackTransactionResult::Settled { .. } => Ok(HttpResponse::Ok().json(result)),
        TrackTransactionResult::Pending { .. } => {
            let kind = ErrorKind::TransferPending;
            Ok(HttpResponse::build(status_for(kind)).json(PendingTransactionResponse { code: kind.code(), result }))
        },
    }
}

route!(track_transfer => Get "/private/transfers" impl MerchantBackend, MintApi);
pub async fn track_transfer<B: MerchantBackend, M: MintApi>(
    req: HttpRequest,
    query: web::Query<TransferParams>,
    api: web::Data<TrackApi<B, M>>,
) -> Result<HttpResponse, ServerError> {
    let instance = instance_id(&req);
    let TransferParams { wtid, exchange } = query.into_inner();
    debug!("💻️ GET transfer {wtid} from {exchange} for '{instance}'");
    let transfer = api.track_transfer(&instance, &wtid, &exchange).await?;
    Ok(HttpResponse::Ok().json(transfer))
}

//----------------------------------------------   Products  ----------------------------------------------------
route!(create_product => Post "/private/products" impl InventoryManagement);
pub async fn create_product<B: InventoryManagement>(
    req: HttpRequest,
    body: web::Json<NewProductRequest>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let instance = instance_id(&req);
    let request = body.into_inner();
    debug!("💻️ POST product '{}' for '{instance}'", request.product_id);
    let product = api.create_product(&instance, request).await?;
    Ok(HttpResponse::Ok().json(product))
}

route!(products => Get "/private/products" impl InventoryManagement);
pub async fn products<B: InventoryManagement>(
    req: HttpRequest,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let instance = instance_id(&req);
    debug!("💻️ GET products for '{instance}'");
    let ids = api.list_product_ids(&instance).await?;
    let products = ids.into_iter().map(|product_id| json!({ "product_id": product_id })).collect::<Vec<_>>();
    Ok(HttpResponse::Ok().json(json!({ "products": products })))
}

route!(product => Get "/private/products/{product_id}" impl InventoryManagement);
pub async fn product<B: InventoryManagement>(
    req: HttpRequest,
    path: web::Path<ProductPath>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let instance = instance_id(&req);
    debug!("💻️ GET product [{instance}/{}]", path.product_id);
    let product = api.product_info(&instance, &path.product_id).await?;
    Ok(HttpResponse::Ok().json(product))
}

route!(update_product => Patch "/private/products/{product_id}" impl InventoryManagement);
pub async fn update_product<B: InventoryManagement>(
    req: HttpRequest,
    path: web::Path<ProductPath>,
    body: web::Json<ProductDetails>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let instance = instance_id(&req);
    debug!("💻️ PATCH product [{instance}/{}]", path.product_id);
    let product = api.update_product(&instance, &path.product_id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(product))
}

route!(delete_product => Delete "/private/products/{product_id}" impl InventoryManagement);
pub async fn delete_product<B: InventoryManagement>(
    req: HttpRequest,
    path: web::Path<ProductPath>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let instance = instance_id(&req);
    debug!("💻️ DELETE product [{instance}/{}]", path.product_id);
    api.delete_product(&instance, &path.product_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

route!(lock_product => Post "/private/products/{product_id}/lock" impl InventoryManagement);
/// Takes, changes or (with a quantity of zero) releases a wallet-side lock on some units of a product.
pub async fn lock_product<B: InventoryManagement>(
    req: HttpRequest,
    path: web::Path<ProductPath>,
    body: web::Json<LockRequest>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let instance = instance_id(&req);
    let request = body.into_inner();
    debug!("💻️ POST lock {} x '{}' under {} for '{instance}'", request.quantity, path.product_id, request.lock_uuid);
    api.lock_product(&instance, &path.product_id, request).await?;
    Ok(HttpResponse::NoContent().finish())
}
