use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
    StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    config::MintClientConfig,
    data_objects::{
        DepositConfirmation,
        DepositQuery,
        DepositRequest,
        DepositTrack,
        RefundAck,
        RefundQuery,
        RefundStatus,
        TrackDepositResult,
        TransferDetails,
    },
    helpers::mint_url,
    MintApiError,
};

/// The operations the merchant needs from a mint.
///
/// Implementations must not retry rejections. A [`MintApiError::Rejected`] carries the mint's reply verbatim so that it
/// can be passed on to the wallet as proof.
#[allow(async_fn_in_trait)]
pub trait MintApi {
    /// Deposit a single coin.
    async fn deposit(&self, mint_base_url: &str, request: &DepositRequest)
        -> Result<DepositConfirmation, MintApiError>;

    /// Ask whether a refund permission has been redeemed by a wallet.
    async fn refund_status(&self, mint_base_url: &str, query: &RefundQuery) -> Result<RefundStatus, MintApiError>;

    /// Ask which wire transfer (if any) settled a deposit.
    async fn track_deposit(&self, mint_base_url: &str, query: &DepositQuery)
        -> Result<TrackDepositResult, MintApiError>;

    /// Fetch the list of deposits aggregated into the wire transfer `wtid`.
    async fn track_transfer(&self, mint_base_url: &str, wtid: &str) -> Result<TransferDetails, MintApiError>;
}

#[derive(Clone)]
pub struct MintHttpClient {
    config: MintClientConfig,
    client: Arc<Client>,
}

impl MintHttpClient {
    pub fn new(config: MintClientConfig) -> Result<Self, MintApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| MintApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn config(&self) -> &MintClientConfig {
        &self.config
    }

    /// Sends a request to the mint, retrying transient failures with exponential back-off.
    ///
    /// Returns the status code and the JSON body of any 2xx reply. 4xx replies become [`MintApiError::Rejected`].
    /// Connection failures, timeouts and 5xx replies are retried up to `config.retries` times and then reported as
    /// [`MintApiError::Unreachable`].
    pub async fn rest_query<B: Serialize>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<(StatusCode, Value), MintApiError> {
        let mut backoff = self.config.backoff;
        let mut attempt = 0;
        loop {
            match self.try_query(method.clone(), url, body).await {
                Err(e) if e.is_transient() && attempt < self.config.retries => {
                    attempt += 1;
                    warn!("🏦️ {e}. Retrying in {backoff:?} (attempt {attempt}/{})", self.config.retries);
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                },
                result => return result,
            }
        }
    }

    async fn try_query<B: Serialize>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<(StatusCode, Value), MintApiError> {
        trace!("🏦️ Sending {method} {url}");
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let unreachable = |reason: String| MintApiError::Unreachable { url: url.to_string(), reason };
        let response = req.send().await.map_err(|e| {
            if e.is_builder() {
                MintApiError::RequestError(e.to_string())
            } else {
                unreachable(e.to_string())
            }
        })?;
        let status = response.status();
        trace!("🏦️ Mint replied {status}");
        if status.is_server_error() {
            return Err(unreachable(format!("server error {status}")));
        }
        let text = response.text().await.map_err(|e| unreachable(e.to_string()))?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str::<Value>(&text).map_err(|e| MintApiError::JsonError(e.to_string()))?
        };
        if status.is_success() {
            Ok((status, body))
        } else {
            Err(MintApiError::Rejected { status: status.as_u16(), proof: body })
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, MintApiError> {
    serde_json::from_value(value).map_err(|e| MintApiError::JsonError(e.to_string()))
}

impl MintApi for MintHttpClient {
    async fn deposit(
        &self,
        mint_base_url: &str,
        request: &DepositRequest,
    ) -> Result<DepositConfirmation, MintApiError> {
        let url = mint_url(mint_base_url, &format!("coins/{}/deposit", request.coin_pub));
        debug!("🏦️ Depositing coin {} for order {}", request.coin_pub, request.order_id);
        let (_, body) = self.rest_query(Method::POST, &url, Some(request)).await?;
        decode(body)
    }

    async fn refund_status(&self, mint_base_url: &str, query: &RefundQuery) -> Result<RefundStatus, MintApiError> {
        let path = format!(
            "coins/{}/refunds/{}/{}/{}",
            query.coin_pub, query.h_contract_terms, query.merchant_pub, query.rtransaction_id
        );
        let url = mint_url(mint_base_url, &path);
        match self.rest_query::<()>(Method::GET, &url, None).await {
            Ok((_, body)) => Ok(RefundStatus::Redeemed(decode::<RefundAck>(body)?)),
            Err(MintApiError::Rejected { status: 404, .. }) => Ok(RefundStatus::Pending),
            Err(e) => Err(e),
        }
    }

    async fn track_deposit(
        &self,
        mint_base_url: &str,
        query: &DepositQuery,
    ) -> Result<TrackDepositResult, MintApiError> {
        let path =
            format!("deposits/{}/{}/{}/{}", query.h_wire, query.merchant_pub, query.h_contract_terms, query.coin_pub);
        let url = mint_url(mint_base_url, &path);
        let (status, body) = self.rest_query::<()>(Method::GET, &url, None).await?;
        if status == StatusCode::ACCEPTED {
            let execution_time = decode(body["execution_time"].clone())?;
            Ok(TrackDepositResult::Pending { execution_time })
        } else {
            Ok(TrackDepositResult::Settled(decode::<DepositTrack>(body)?))
        }
    }

    async fn track_transfer(&self, mint_base_url: &str, wtid: &str) -> Result<TransferDetails, MintApiError> {
        let url = mint_url(mint_base_url, &format!("transfers/{wtid}"));
        debug!("🏦️ Fetching transfer {wtid} from {mint_base_url}");
        let (_, body) = self.rest_query::<()>(Method::GET, &url, None).await?;
        decode(body)
    }
}
