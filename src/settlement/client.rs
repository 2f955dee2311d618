//! Retail settlement API client
//! Fetches order and refund records for one order identifier and signs every request.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};
use reqwest::{header, Client, Url};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::reconcile::reconcile;
use super::signer::{self, SignedParameters, SigningTrace};
use super::SpendSource;
use crate::config::SettlementConfig;
use crate::error::{LotteryError, LotteryResult};
use crate::models::SpendResult;

/// Routing context tag; signed but never sent as a query field.
pub const CONTEXT_PATH: &str = "isv";

const CIVIL_OFFSET: FixedOffset = match FixedOffset::east_opt(8 * 3600) {
    Some(offset) => offset,
    None => panic!("civil offset out of range"),
};
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const WINDOW_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The fixed civil timezone the retail API expects (UTC+08:00).
pub fn civil_offset() -> FixedOffset {
    CIVIL_OFFSET
}

pub fn civil_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&civil_offset())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementEndpoint {
    Order,
    Refund,
}

impl SettlementEndpoint {
    pub fn module_path(&self) -> &'static str {
        "order"
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            SettlementEndpoint::Order => "getOrder",
            SettlementEndpoint::Refund => "getRefundOrder",
        }
    }

    /// Refunds are looked up by their parent order, not by their own id.
    pub fn id_field(&self) -> &'static str {
        match self {
            SettlementEndpoint::Order => "orderId",
            SettlementEndpoint::Refund => "porderId",
        }
    }
}

impl fmt::Display for SettlementEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementEndpoint::Order => f.write_str("order"),
            SettlementEndpoint::Refund => f.write_str("refund"),
        }
    }
}

/// One unsigned upstream query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRequest {
    pub endpoint: SettlementEndpoint,
    pub order_id: String,
    pub time_stamp: String,
    pub window_start: String,
    pub window_end: String,
    pub page_num: u32,
    pub page_size: u32,
}

impl SettlementRequest {
    pub fn new(
        endpoint: SettlementEndpoint,
        order_id: &str,
        now: DateTime<Utc>,
        config: &SettlementConfig,
    ) -> LotteryResult<Self> {
        let civil = now.with_timezone(&civil_offset());
        let start = ChronoDuration::try_days(config.lookback_days)
            .and_then(|lookback| civil.checked_sub_signed(lookback))
            .ok_or_else(|| {
                LotteryError::Configuration(format!(
                    "lookback of {} days is out of range",
                    config.lookback_days
                ))
            })?;

        Ok(Self {
            endpoint,
            order_id: order_id.to_string(),
            time_stamp: civil.format(TIMESTAMP_FORMAT).to_string(),
            window_start: start.format(WINDOW_FORMAT).to_string(),
            window_end: civil.format(WINDOW_FORMAT).to_string(),
            page_num: 1,
            page_size: config.page_size,
        })
    }

    /// Transmitted query fields, in wire order, without the signature.
    pub fn query_params(&self, config: &SettlementConfig) -> Vec<(String, String)> {
        vec![
            ("app_id".to_string(), config.app_id.clone()),
            ("brandId".to_string(), config.brand_id.clone()),
            ("time_stamp".to_string(), self.time_stamp.clone()),
            ("version".to_string(), config.api_version.clone()),
            ("pageNum".to_string(), self.page_num.to_string()),
            ("pageSize".to_string(), self.page_size.to_string()),
            ("startModified".to_string(), self.window_start.clone()),
            ("endModified".to_string(), self.window_end.clone()),
            (self.endpoint.id_field().to_string(), self.order_id.clone()),
        ]
    }

    /// Query fields plus the routing triple that only the signature sees.
    pub fn signing_params(&self, config: &SettlementConfig) -> SignedParameters {
        let mut params: SignedParameters = self.query_params(config).into_iter().collect();
        params.insert("contextPath", CONTEXT_PATH);
        params.insert("modulePath", self.endpoint.module_path());
        params.insert("methodName", self.endpoint.method_name());
        params
    }

    pub fn sign(self, config: &SettlementConfig) -> LotteryResult<SignedRequest> {
        let trace = signer::trace(&self.signing_params(config), &config.app_secret);

        let mut query = self.query_params(config);
        query.push(("sign".to_string(), trace.sign.clone()));

        let path = format!(
            "{}/{}/{}/{}",
            config.base_url(),
            CONTEXT_PATH,
            self.endpoint.module_path(),
            self.endpoint.method_name()
        );
        let url = Url::parse_with_params(&path, &query).map_err(|e| {
            LotteryError::Configuration(format!("invalid base url {}: {e}", config.base_url()))
        })?;

        Ok(SignedRequest {
            request: self,
            url,
            query,
            trace,
        })
    }
}

/// A request ready to send. Immutable once signed.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub request: SettlementRequest,
    pub url: Url,
    pub query: Vec<(String, String)>,
    pub trace: SigningTrace,
}

impl SignedRequest {
    pub fn endpoint(&self) -> SettlementEndpoint {
        self.request.endpoint
    }

    pub fn sign(&self) -> &str {
        &self.trace.sign
    }
}

/// Upstream body; text that is not JSON is kept verbatim for diagnosis.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamPayload {
    Json(Value),
    Raw(String),
}

impl UpstreamPayload {
    pub fn parse(text: String) -> Self {
        match serde_json::from_str::<Value>(&text) {
            Ok(v) => UpstreamPayload::Json(v),
            Err(_) => UpstreamPayload::Raw(text),
        }
    }

    /// `resultObject.results`, when present and a list.
    pub fn results(&self) -> Option<&[Value]> {
        match self {
            UpstreamPayload::Json(v) => v
                .pointer("/resultObject/results")
                .and_then(Value::as_array)
                .map(Vec::as_slice),
            UpstreamPayload::Raw(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettlementResponses {
    pub order: UpstreamPayload,
    pub refund: UpstreamPayload,
}

impl SettlementResponses {
    pub fn reconcile(&self) -> Option<SpendResult> {
        reconcile(self.order.results(), self.refund.results())
    }
}

pub struct SettlementClient {
    client: Client,
    config: SettlementConfig,
}

impl SettlementClient {
    pub fn new(config: SettlementConfig) -> LotteryResult<Self> {
        config.validate()?;

        // No per-request timeout: the shared deadline in fetch_settlement governs both calls.
        let client = Client::builder()
            .user_agent("PrizeDraw/1.0 (Settlement Verifier)")
            .build()
            .map_err(|e| LotteryError::Configuration(format!("http client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Build and sign the order and refund requests for one identifier.
    pub fn build_requests(
        &self,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> LotteryResult<(SignedRequest, SignedRequest)> {
        let order_id = validate_order_id(order_id)?;

        let order =
            SettlementRequest::new(SettlementEndpoint::Order, order_id, now, &self.config)?
                .sign(&self.config)?;
        let refund =
            SettlementRequest::new(SettlementEndpoint::Refund, order_id, now, &self.config)?
                .sign(&self.config)?;

        debug!(
            order_id = %order_id,
            order_sign = %order.sign(),
            refund_sign = %refund.sign(),
            "signed settlement requests"
        );
        Ok((order, refund))
    }

    /// Fetch both endpoints concurrently under one deadline.
    pub async fn fetch_settlement(&self, order_id: &str) -> LotteryResult<SettlementResponses> {
        let (order_req, refund_req) = self.build_requests(order_id, Utc::now())?;
        let deadline = self.config.timeout;
        let start = Instant::now();

        let joined = timeout(deadline, async {
            tokio::try_join!(self.send(&order_req), self.send(&refund_req))
        })
        .await;

        let (order, refund) = match joined {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    order_id = %order_id,
                    deadline_ms = deadline.as_millis() as u64,
                    "settlement fetch timed out; both requests cancelled"
                );
                return Err(LotteryError::Timeout(deadline));
            }
        };

        info!(
            order_id = %order_id,
            latency_ms = start.elapsed().as_millis() as u64,
            "settlement fetched"
        );
        Ok(SettlementResponses { order, refund })
    }

    /// Fetch and reconcile. `None` means no purchase history for this identifier.
    pub async fn verify_spend(&self, order_id: &str) -> LotteryResult<Option<SpendResult>> {
        let responses = self.fetch_settlement(order_id).await?;
        let spend = responses.reconcile();

        match &spend {
            Some(s) => info!(
                order_id = %order_id,
                net = s.net_amount,
                orders = s.order_total,
                refunds = s.refund_total,
                "spend reconciled"
            ),
            None => info!(order_id = %order_id, "no purchase history"),
        }
        Ok(spend)
    }

    async fn send(&self, req: &SignedRequest) -> LotteryResult<UpstreamPayload> {
        let endpoint = req.endpoint();

        let response = self
            .client
            .post(req.url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CACHE_CONTROL, "no-store")
            .body("{}")
            .send()
            .await
            .map_err(|e| LotteryError::Transport(format!("{endpoint}: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LotteryError::Transport(format!("{endpoint} body: {e}")))?;

        if !status.is_success() {
            warn!(endpoint = %endpoint, status = %status, "upstream rejected settlement query");
            return Err(LotteryError::Upstream {
                endpoint,
                status: status.as_u16(),
                body: text,
            });
        }

        let payload = UpstreamPayload::parse(text);
        if let UpstreamPayload::Raw(raw) = &payload {
            warn!(endpoint = %endpoint, bytes = raw.len(), "upstream body is not json");
        }
        Ok(payload)
    }
}

#[async_trait]
impl SpendSource for SettlementClient {
    async fn net_spend(&self, order_id: &str) -> LotteryResult<Option<SpendResult>> {
        self.verify_spend(order_id).await
    }
}

/// Rejects blank identifiers. Anything else is signed and keyed exactly as given.
pub fn validate_order_id(order_id: &str) -> LotteryResult<&str> {
    if order_id.trim().is_empty() {
        return Err(LotteryError::Validation(
            "code (orderId) is required".to_string(),
        ));
    }
    Ok(order_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn config() -> SettlementConfig {
        SettlementConfig::new("https://retail.example/", "app-1", "s3cret", "77")
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 2, 3, 4).unwrap()
    }

    #[test]
    fn test_request_uses_civil_time() {
        let req = SettlementRequest::new(SettlementEndpoint::Order, "A1", fixed_now(), &config()).unwrap();
        assert_eq!(req.time_stamp, "20240501100304");
        assert_eq!(req.window_end, "2024-05-01 10:03:04");
        assert_eq!(req.window_start, "2024-04-26 10:03:04");
        assert_eq!(req.page_num, 1);
        assert_eq!(req.page_size, 100);
    }

    #[test]
    fn test_civil_date_rolls_over_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 12, 31, 18, 30, 0).unwrap();
        let req = SettlementRequest::new(SettlementEndpoint::Order, "A1", now, &config()).unwrap();
        assert_eq!(req.time_stamp, "20250101023000");
    }

    #[test]
    fn test_refund_filters_by_parent_order() {
        let req = SettlementRequest::new(SettlementEndpoint::Refund, "A1", fixed_now(), &config()).unwrap();
        let query = req.query_params(&config());
        assert!(query.contains(&("porderId".to_string(), "A1".to_string())));
        assert!(!query.iter().any(|(k, _)| k == "orderId"));
    }

    #[test]
    fn test_routing_fields_signed_but_not_sent() {
        let cfg = config();
        let signed = SettlementRequest::new(SettlementEndpoint::Order, "A1", fixed_now(), &cfg)
            .unwrap()
            .sign(&cfg)
            .unwrap();

        assert_eq!(signed.url.path(), "/isv/order/getOrder");
        let sent: Vec<String> = signed.url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert!(sent.contains(&"sign".to_string()));
        assert!(!sent.contains(&"contextPath".to_string()));
        assert!(!sent.contains(&"methodName".to_string()));
        assert!(signed.trace.sorted_keys.contains(&"contextPath".to_string()));
        assert!(signed.trace.sorted_keys.contains(&"modulePath".to_string()));

        let expected = signer::sign(&signed.request.signing_params(&cfg), "s3cret");
        assert_eq!(signed.sign(), expected);
        assert!(signed.trace.string_to_hash.starts_with("s3cretapp_idapp-1brandId77"));
    }

    #[test]
    fn test_order_and_refund_signatures_differ() {
        let client = SettlementClient::new(config()).unwrap();
        let (order, refund) = client.build_requests("A1", fixed_now()).unwrap();
        assert_eq!(refund.url.path(), "/isv/order/getRefundOrder");
        assert_ne!(order.sign(), refund.sign());

        let (again, _) = client.build_requests("A1", fixed_now()).unwrap();
        assert_eq!(order.sign(), again.sign());
    }

    #[test]
    fn test_empty_order_id_rejected() {
        let client = SettlementClient::new(config()).unwrap();
        assert!(matches!(
            client.build_requests("   ", fixed_now()),
            Err(LotteryError::Validation(_))
        ));
    }

    #[test]
    fn test_civil_offset_is_utc_plus_eight() {
        assert_eq!(civil_offset().local_minus_utc(), 8 * 3600);
    }

    #[test]
    fn test_oversized_lookback_is_configuration_error() {
        let mut cfg = config();
        cfg.lookback_days = 999_999_999_999;
        let client = SettlementClient { client: Client::new(), config: cfg.clone() };

        assert!(matches!(
            client.build_requests("A1", Utc::now()),
            Err(LotteryError::Configuration(_))
        ));
        assert!(matches!(
            SettlementRequest::new(SettlementEndpoint::Order, "A1", fixed_now(), &cfg),
            Err(LotteryError::Configuration(_))
        ));
    }

    #[test]
    fn test_order_id_sent_as_given() {
        assert_eq!(validate_order_id(" A1 ").unwrap(), " A1 ");
        let client = SettlementClient::new(config()).unwrap();
        let (order, _) = client.build_requests(" A1 ", fixed_now()).unwrap();
        assert!(order.query.contains(&("orderId".to_string(), " A1 ".to_string())));
    }

    #[test]
    fn test_payload_results_navigation() {
        let payload = UpstreamPayload::parse(
            json!({"resultObject": {"results": [{"sumDealPrice": 10}]}}).to_string(),
        );
        assert_eq!(payload.results().map(|r| r.len()), Some(1));

        let raw = UpstreamPayload::parse("<html>bad gateway</html>".to_string());
        assert_eq!(raw, UpstreamPayload::Raw("<html>bad gateway</html>".to_string()));
        assert!(raw.results().is_none());
    }
}
