use actix_web::HttpRequest;
use log::trace;
use merchant_engine::db_types::{OrderId, DEFAULT_INSTANCE};

/// The instance a request is addressed to: the `{instance}` segment of `/instances/{instance}/...`, or the default
/// instance for the unprefixed routes.
pub fn instance_id(req: &HttpRequest) -> String {
    req.match_info().get("instance").unwrap_or(DEFAULT_INSTANCE).to_string()
}

/// Where the wallet reached us, as far as the request tells. Reverse proxies are taken into account through the
/// headers actix already honours (`Forwarded`, `X-Forwarded-Host`, `X-Forwarded-Proto`), plus `X-Forwarded-Prefix`
/// if the server is configured to trust it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    pub scheme: String,
    pub host: String,
    /// The path prefix without leading or trailing slashes, if any.
    pub prefix: Option<String>,
}

impl RequestOrigin {
    pub fn from_request(req: &HttpRequest, honour_forwarded_prefix: bool) -> Self {
        let info = req.connection_info();
        let prefix = honour_forwarded_prefix
            .then(|| req.headers().get("X-Forwarded-Prefix").and_then(|v| v.to_str().ok()))
            .flatten()
            .map(|p| p.trim().trim_matches('/').to_string())
            .filter(|p| !p.is_empty());
        let origin = Self { scheme: info.scheme().to_string(), host: info.host().to_string(), prefix };
        trace!("💻️ Request origin: {origin:?}");
        origin
    }

    pub fn is_https(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("https")
    }

    /// The public base URL of the backend, always ending in a slash.
    pub fn base_url(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}://{}/{prefix}/", self.scheme, self.host),
            None => format!("{}://{}/", self.scheme, self.host),
        }
    }

    /// `taler://refund/<host>/<prefix>/<instance>/<order_id>`, with `-` standing for no prefix and for the default
    /// instance. Plain HTTP origins get `?insecure=1`.
    pub fn taler_refund_uri(&self, instance_id: &str, order_id: &OrderId) -> String {
        let prefix = self.prefix.as_deref().unwrap_or("-");
        let instance = if instance_id == DEFAULT_INSTANCE { "-" } else { instance_id };
        let query = if self.is_https() { "" } else { "?insecure=1" };
        format!("taler://refund/{}/{prefix}/{instance}/{order_id}{query}", self.host)
    }
}

/// Parses `yes`/`no` query flags. Anything else means "don't filter".
pub fn yes_no(value: Option<&str>) -> Option<bool> {
    match value.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("yes") | Some("true") | Some("1") => Some(true),
        Some("no") | Some("false") | Some("0") => Some(false),
        _ => None,
    }
}
