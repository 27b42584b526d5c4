//! HTTP surface of the pipeline.
//!
//! Two contracts only: the raw ingress endpoint, which always answers
//! `200 {"status":"queued"}` no matter what happens downstream, and the
//! webhook subscription management endpoints, whose validation errors
//! are the only synchronous failures any caller ever sees from the
//! delivery machinery.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use ripple_domain::outbox::OutboxRepository;
use ripple_domain::webhooks::{
    NewWebhookSubscription, SubscriptionRepository, UpdateWebhookSubscription, WebhookError,
    WebhookSubscription,
};
use ripple_infrastructure::ingress::RawIngressBuffer;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub struct AppState {
    pub ingress: Arc<RawIngressBuffer>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub outbox: Arc<dyn OutboxRepository>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhooks/:source_id", post(accept_webhook))
        .route(
            "/api/v1/subscriptions",
            post(create_subscription).get(list_subscriptions),
        )
        .route(
            "/api/v1/subscriptions/:id",
            get(get_subscription)
                .put(update_subscription)
                .delete(delete_subscription),
        )
        .route("/health", get(health))
        .with_state(state)
}

/// API error mapped onto a status code and a JSON body.
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    NotFound,
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Validation(msg) => ApiError::Validation(msg),
            WebhookError::NotFound(_) => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Validation(msg) => msg.clone(),
            ApiError::NotFound => "not found".to_string(),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                "internal error".to_string()
            }
        };
        (self.status_code(), Json(json!({"error": message}))).into_response()
    }
}

fn tenant_id(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    headers
        .get("X-Tenant-Id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Validation("X-Tenant-Id header is required".to_string()))?
        .parse()
        .map_err(|_| ApiError::Validation("X-Tenant-Id must be a UUID".to_string()))
}

/// Raw ingress. Accepts anything; the response is `200 queued` even
/// when the downstream enqueue fails.
async fn accept_webhook(
    State(state): State<Arc<AppState>>,
    Path(source_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<serde_json::Value> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json");

    let event_id = state.ingress.accept(&source_id, content_type, &body).await;

    Json(json!({"status": "queued", "event_id": event_id}))
}

async fn create_subscription(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(input): Json<NewWebhookSubscription>,
) -> Result<(StatusCode, Json<WebhookSubscription>), ApiError> {
    let tenant = tenant_id(&headers)?;
    input.validate()?;
    let subscription = state.subscriptions.create(tenant, input).await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<WebhookSubscription>>, ApiError> {
    let tenant = tenant_id(&headers)?;
    Ok(Json(state.subscriptions.list(tenant).await?))
}

async fn get_subscription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<WebhookSubscription>, ApiError> {
    state
        .subscriptions
        .get(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn update_subscription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateWebhookSubscription>,
) -> Result<Json<WebhookSubscription>, ApiError> {
    input.validate()?;
    Ok(Json(state.subscriptions.update(id, input).await?))
}

async fn delete_subscription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.subscriptions.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let stats = state
        .outbox
        .stats()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "status": "ok",
        "outbox": {
            "pending": stats.pending_count,
            "dispatched": stats.dispatched_count,
            "failed": stats.failed_count,
            "oldest_pending_age_seconds": stats.oldest_pending_age_seconds,
        }
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_domain::testing::{
        InMemoryOutboxRepository, InMemorySubscriptionRepository, RecordingEventBus,
    };
    use std::collections::HashMap;

    fn test_state() -> (Arc<AppState>, Arc<RecordingEventBus>) {
        let bus = Arc::new(RecordingEventBus::new());
        let state = Arc::new(AppState {
            ingress: Arc::new(RawIngressBuffer::new(bus.clone())),
            subscriptions: Arc::new(InMemorySubscriptionRepository::new()),
            outbox: Arc::new(InMemoryOutboxRepository::new()),
        });
        (state, bus)
    }

    fn tenant_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-Tenant-Id", Uuid::new_v4().to_string().parse().unwrap());
        headers
    }

    fn valid_input() -> NewWebhookSubscription {
        NewWebhookSubscription {
            name: "crm-sync".into(),
            url: "https://example.com/hooks".into(),
            events: vec!["contact.*".into()],
            secret: None,
            headers: HashMap::new(),
            retry_count: 3,
            timeout_secs: 10,
            active: true,
        }
    }

    #[tokio::test]
    async fn test_ingress_returns_queued_even_when_broker_is_down() {
        let (state, bus) = test_state();
        bus.set_failing(true);

        let response = accept_webhook(
            State(state),
            Path("wa-main".to_string()),
            HeaderMap::new(),
            Bytes::from_static(b"{\"k\":1}"),
        )
        .await;

        assert_eq!(response.0["status"], "queued");
        assert!(response.0["event_id"].is_string());
    }

    #[tokio::test]
    async fn test_create_subscription_validates_synchronously() {
        let (state, _) = test_state();

        let mut input = valid_input();
        input.events.clear();

        let result =
            create_subscription(State(state), tenant_headers(), Json(input)).await;
        match result {
            Err(e) => assert_eq!(e.status_code(), StatusCode::BAD_REQUEST),
            Ok(_) => panic!("empty event list must be rejected"),
        }
    }

    #[tokio::test]
    async fn test_create_requires_tenant_header() {
        let (state, _) = test_state();

        let result =
            create_subscription(State(state), HeaderMap::new(), Json(valid_input())).await;
        match result {
            Err(e) => assert_eq!(e.status_code(), StatusCode::BAD_REQUEST),
            Ok(_) => panic!("missing tenant header must be rejected"),
        }
    }

    #[tokio::test]
    async fn test_subscription_lifecycle() {
        let (state, _) = test_state();
        let headers = tenant_headers();

        let (status, created) = create_subscription(
            State(state.clone()),
            headers.clone(),
            Json(valid_input()),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let listed = list_subscriptions(State(state.clone()), headers).await.unwrap();
        assert_eq!(listed.0.len(), 1);

        let fetched = get_subscription(State(state.clone()), Path(created.0.id))
            .await
            .unwrap();
        assert_eq!(fetched.0.name, "crm-sync");

        let status = delete_subscription(State(state.clone()), Path(created.0.id))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let missing = get_subscription(State(state), Path(created.0.id)).await;
        assert!(matches!(missing, Err(ApiError::NotFound)));
    }

    #[tokio::test]
    async fn test_health_reports_outbox_stats() {
        let (state, _) = test_state();

        let response = health(State(state)).await.unwrap();
        assert_eq!(response.0["status"], "ok");
        assert_eq!(response.0["outbox"]["pending"], 0);
    }
}
