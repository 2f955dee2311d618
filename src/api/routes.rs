use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{error, warn};

use crate::draw::{DrawAttempt, DrawService};
use crate::error::LotteryError;
use crate::models::{DrawRecord, StoreState};
use crate::settlement::{SettlementClient, SignedRequest};
use crate::store::{HistoryStore, StoreConfigStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub settlement: Arc<SettlementClient>,
    pub draws: Arc<DrawService>,
    pub stores: Arc<dyn StoreConfigStore>,
    pub history: Arc<dyn HistoryStore>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/external", get(get_external))
        .route("/api/draw", post(post_draw))
        .route("/api/history/:code", get(get_history))
        .route("/api/stores/:id", get(get_store).put(put_store))
        .with_state(state)
}

// ===== Route Handlers =====

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Net spend for one order identifier, or its signing trace with `debug=1`.
async fn get_external(
    State(state): State<AppState>,
    Query(params): Query<ExternalQuery>,
) -> Result<Json<Value>, ApiError> {
    let code = params.code.unwrap_or_default();

    if flag(&params.debug) {
        if !state.settlement.config().signing_debug {
            return Err(ApiError::Forbidden("signing debug is disabled".to_string()));
        }
        let (order, refund) = state.settlement.build_requests(&code, Utc::now())?;
        let pack: Vec<Value> = [order, refund].iter().map(debug_pack).collect();
        return Ok(Json(json!({ "debug": pack })));
    }

    let spend = state.settlement.verify_spend(&code).await?;
    let body = match spend {
        None => Value::Null,
        Some(s) if flag(&params.details) => json!({
            "total": s.net_amount,
            "orderTotal": s.order_total,
            "refundTotal": s.refund_total,
        }),
        Some(s) => json!(s.net_amount),
    };
    Ok(Json(body))
}

async fn post_draw(
    State(state): State<AppState>,
    Json(req): Json<DrawRequest>,
) -> Result<Json<DrawAttempt>, ApiError> {
    let attempt = state.draws.attempt(&req.code, req.store_id).await?;
    Ok(Json(attempt))
}

async fn get_history(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Vec<DrawRecord>>, ApiError> {
    Ok(Json(state.history.get_history(&code).await?))
}

async fn get_store(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<StoreState>, ApiError> {
    Ok(Json(state.stores.get_store(id).await?))
}

/// Overwrite a store configuration wholesale.
async fn put_store(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(store): Json<StoreState>,
) -> Result<Json<StoreState>, ApiError> {
    if store.id != id {
        return Err(LotteryError::Validation(format!(
            "path id {} does not match body id {}",
            id, store.id
        ))
        .into());
    }
    if !(store.min_spend.is_finite() && store.min_spend > 0.0) {
        return Err(LotteryError::Validation("min_spend must be positive".to_string()).into());
    }
    state.stores.update_store(&store).await?;
    Ok(Json(store))
}

fn flag(v: &Option<String>) -> bool {
    v.as_deref() == Some("1")
}

fn debug_pack(req: &SignedRequest) -> Value {
    let query: Map<String, Value> = req
        .query
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();

    json!({
        "endpoint": req.endpoint(),
        "finalUrl": req.url.as_str(),
        "queryParams": query,
        "sortedKeys": req.trace.sorted_keys,
        "concatString": req.trace.concat_string,
        "stringToMD5": req.trace.string_to_hash,
        "sign": req.trace.sign,
    })
}

// ===== Request/Response Types =====

#[derive(Deserialize)]
struct ExternalQuery {
    code: Option<String>,
    debug: Option<String>,
    details: Option<String>,
}

#[derive(Deserialize)]
struct DrawRequest {
    code: String,
    #[serde(rename = "storeId")]
    store_id: i64,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    Lottery(LotteryError),
    Forbidden(String),
}

impl From<LotteryError> for ApiError {
    fn from(err: LotteryError) -> Self {
        ApiError::Lottery(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::Forbidden(msg) => {
                let body = json!({ "error": "forbidden", "message": msg });
                return (StatusCode::FORBIDDEN, Json(body)).into_response();
            }
            ApiError::Lottery(err) => err,
        };

        let status = match &err {
            LotteryError::Validation(_) => StatusCode::BAD_REQUEST,
            LotteryError::StoreNotFound(_) => StatusCode::NOT_FOUND,
            LotteryError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            LotteryError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            LotteryError::Configuration(_)
            | LotteryError::Transport(_)
            | LotteryError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(code = err.code(), "request failed: {}", err);
        } else {
            warn!(code = err.code(), "request rejected: {}", err);
        }

        let mut body = json!({
            "error": err.code(),
            "message": err.to_string(),
        });
        if let LotteryError::Upstream {
            status: upstream_status,
            body: detail,
            ..
        } = &err
        {
            body["status"] = json!(upstream_status);
            body["detail"] = json!(detail);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SettlementConfig;
    use crate::models::{PrizeEntry, PrizeInventory, SpendResult};
    use crate::settlement::SpendSource;
    use crate::store::MemoryLotteryStore;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tower::ServiceExt;

    struct FixedSpend(Option<SpendResult>);

    #[async_trait]
    impl SpendSource for FixedSpend {
        async fn net_spend(
            &self,
            _order_id: &str,
        ) -> crate::error::LotteryResult<Option<SpendResult>> {
            Ok(self.0)
        }
    }

    fn app(signing_debug: bool) -> Router {
        let mut config = SettlementConfig::new("http://127.0.0.1:9", "app-1", "s3cret", "77");
        config.signing_debug = signing_debug;
        let store = Arc::new(MemoryLotteryStore::with_store(StoreState {
            id: 1,
            name: "Flagship".to_string(),
            dashboard_title: String::new(),
            min_spend: 50.0,
            inventory: PrizeInventory::new(vec![PrizeEntry::new("Mug", 5)]),
        }));
        let draws = DrawService::with_rng(
            Arc::new(FixedSpend(Some(SpendResult::new(200.0, 50.0)))),
            store.clone(),
            store.clone(),
            StdRng::seed_from_u64(3),
        );
        create_router(AppState {
            settlement: Arc::new(SettlementClient::new(config).unwrap()),
            draws: Arc::new(draws),
            stores: store.clone(),
            history: store,
        })
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_code_is_bad_request() {
        let (status, body) = send(app(true), get("/api/external")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_debug_trace_without_upstream_call() {
        let (status, body) = send(app(true), get("/api/external?code=A1&debug=1")).await;
        assert_eq!(status, StatusCode::OK);

        let pack = body["debug"].as_array().unwrap();
        assert_eq!(pack.len(), 2);
        assert_eq!(pack[0]["queryParams"]["orderId"], "A1");
        assert_eq!(pack[1]["queryParams"]["porderId"], "A1");
        let to_hash = pack[0]["stringToMD5"].as_str().unwrap();
        assert!(to_hash.starts_with("s3cret") && to_hash.ends_with("s3cret"));
        assert_eq!(pack[0]["sign"], pack[0]["queryParams"]["sign"]);
    }

    #[tokio::test]
    async fn test_debug_trace_can_be_disabled() {
        let (status, _) = send(app(false), get("/api/external?code=A1&debug=1")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_draw_then_history() {
        let app = app(true);
        let req = Request::builder()
            .method("POST")
            .uri("/api/draw")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"code":"A1","storeId":1}"#))
            .unwrap();
        let (status, body) = send(app.clone(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "won");
        assert_eq!(body["prize_name"], "Mug");
        assert_eq!(body["draws_allowed"], 3);

        let (status, body) = send(app.clone(), get("/api/history/A1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (_, body) = send(app, get("/api/stores/1")).await;
        assert_eq!(body["inventory"][0]["quantity"], 4);
    }

    #[tokio::test]
    async fn test_unknown_store_is_not_found() {
        let (status, body) = send(app(true), get("/api/stores/42")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "store_not_found");
    }

    fn put_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn store_body(id: i64, min_spend: f64) -> Value {
        json!({
            "id": id,
            "name": "Flagship",
            "dashboard_title": "Spring Draw",
            "min_spend": min_spend,
            "inventory": [{"name": "Mug", "quantity": 9}],
        })
    }

    #[tokio::test]
    async fn test_put_store_overwrites() {
        let app = app(true);
        let (status, _) = send(app.clone(), put_json("/api/stores/1", store_body(1, 80.0))).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(app, get("/api/stores/1")).await;
        assert_eq!(body["min_spend"], 80.0);
        assert_eq!(body["inventory"][0]["quantity"], 9);
    }

    #[tokio::test]
    async fn test_put_store_id_mismatch_rejected() {
        let app = app(true);
        let (status, body) = send(app.clone(), put_json("/api/stores/1", store_body(2, 80.0))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");

        let (_, body) = send(app, get("/api/stores/1")).await;
        assert_eq!(body["min_spend"], 50.0);
    }

    #[tokio::test]
    async fn test_put_store_non_positive_min_spend_rejected() {
        let app = app(true);
        for min_spend in [0.0, -10.0] {
            let (status, body) =
                send(app.clone(), put_json("/api/stores/1", store_body(1, min_spend))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "validation_error");
        }

        let (_, body) = send(app, get("/api/stores/1")).await;
        assert_eq!(body["min_spend"], 50.0);
    }

    #[test]
    fn test_upstream_error_envelope() {
        let response = ApiError::from(LotteryError::Upstream {
            endpoint: crate::settlement::SettlementEndpoint::Order,
            status: 500,
            body: "boom".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
