//! HTTP routes: message submit/history, presence, health, metrics, and the
//! WebSocket upgrade.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use relay_core::{Message, ParticipantId};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::errors::ServiceError;
use crate::health::{self, HealthResponse};
use crate::service::ChatService;
use crate::websocket::session::{Heartbeat, run_ws_session};

/// Header carrying the caller's participant ID, set by the upstream gateway.
pub const PARTICIPANT_HEADER: &str = "x-participant-id";

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    /// The relay service.
    pub service: Arc<ChatService>,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
    /// Ends live sessions on shutdown.
    pub shutdown: CancellationToken,
    /// WebSocket ping settings.
    pub heartbeat: Heartbeat,
    /// Largest accepted inbound WebSocket frame.
    pub max_message_size: usize,
    /// Store backend name for `/health`.
    pub store_backend: &'static str,
    /// When the server started.
    pub start_time: Instant,
}

/// Build the router over `state`.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(ws_handler))
        .route("/api/messages", post(submit_handler).get(history_handler))
        .route("/api/connections", post(presence_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::EmptyParticipants | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MissingIdentity => StatusCode::UNAUTHORIZED,
            Self::NotParticipant(_) => StatusCode::FORBIDDEN,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Payload(_) | Self::Store(_) => {
                error!(error = %self, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Caller identity from [`PARTICIPANT_HEADER`] or the `participant` query
/// parameter.
#[derive(Debug, Clone)]
pub struct Caller(pub ParticipantId);

#[derive(Deserialize)]
struct CallerQuery {
    participant: Option<String>,
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts
            .headers
            .get(PARTICIPANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(non_empty)
        {
            return Ok(Self(ParticipantId::from(id)));
        }
        Query::<CallerQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.participant)
            .as_deref()
            .and_then(non_empty)
            .map(|id| Self(ParticipantId::from(id)))
            .ok_or(ServiceError::MissingIdentity)
    }
}

/// `POST /api/messages` body.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Conversation members, sender included.
    pub participants: Vec<ParticipantId>,
    /// Message body.
    pub content: String,
}

/// `GET /api/messages` query.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Comma-separated participant IDs.
    pub participants: Option<String>,
    /// Zero-based page.
    pub page: Option<String>,
    /// Page size.
    pub size: Option<String>,
}

impl HistoryQuery {
    fn participant_list(&self) -> Vec<ParticipantId> {
        self.participants
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter_map(non_empty)
            .map(ParticipantId::from)
            .collect()
    }
}

/// Parse a paging value; anything that is not a non-negative integer is
/// treated as absent.
fn paging_value(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|v| v.trim().parse().ok())
}

/// `POST /api/connections` body.
#[derive(Debug, Deserialize)]
pub struct PresenceRequest {
    /// Participants to count.
    pub users: Vec<ParticipantId>,
}

fn bad_json(rejection: &JsonRejection) -> ServiceError {
    ServiceError::BadRequest(rejection.body_text())
}

async fn submit_handler(
    State(state): State<AppState>,
    Caller(sender): Caller,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ServiceError> {
    let Json(req) = body.map_err(|e| bad_json(&e))?;
    let _ = state
        .service
        .submit_message(sender, &req.participants, req.content)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "message queued" })),
    ))
}

async fn history_handler(
    State(state): State<AppState>,
    Caller(requester): Caller,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, ServiceError> {
    let messages = state
        .service
        .history(
            &requester,
            &query.participant_list(),
            paging_value(query.page.as_deref()),
            paging_value(query.size.as_deref()),
        )
        .await?;
    Ok(Json(messages))
}

async fn presence_handler(
    State(state): State<AppState>,
    body: Result<Json<PresenceRequest>, JsonRejection>,
) -> Result<Json<HashMap<ParticipantId, usize>>, ServiceError> {
    let Json(req) = body.map_err(|e| bad_json(&e))?;
    if req.users.is_empty() {
        return Err(ServiceError::EmptyParticipants);
    }
    Ok(Json(state.service.presence_counts(&req.users)))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.service.registry();
    Json(health::health_check(
        state.start_time,
        registry.connection_count(),
        registry.participant_count(),
        state.store_backend,
    ))
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Caller(participant): Caller,
) -> Response {
    let AppState {
        service,
        shutdown,
        heartbeat,
        max_message_size,
        ..
    } = state;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| {
            run_ws_session(socket, participant, service, heartbeat, shutdown)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use relay_settings::RelaySettings;
    use relay_store::MemoryStore;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<ChatService>) {
        let service = Arc::new(ChatService::start(
            &RelaySettings::default(),
            Arc::new(MemoryStore::new()),
        ));
        let state = AppState {
            service: Arc::clone(&service),
            metrics: crate::metrics::detached_handle(),
            shutdown: CancellationToken::new(),
            heartbeat: Heartbeat::default(),
            max_message_size: 64 * 1024,
            store_backend: "memory",
            start_time: Instant::now(),
        };
        (routes(state), service)
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, caller: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(caller) = caller {
            builder = builder.header(PARTICIPANT_HEADER, caller);
        }
        builder.body(Body::from(body.to_owned())).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (app, _svc) = app();
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["store"], "memory");
    }

    #[tokio::test]
    async fn submit_is_accepted() {
        let (app, _svc) = app();
        let resp = app
            .oneshot(post_json(
                "/api/messages",
                Some("alice"),
                r#"{"participants":["alice","bob"],"content":"hi"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(resp).await["status"], "message queued");
    }

    #[tokio::test]
    async fn submit_without_identity_is_unauthorized() {
        let (app, _svc) = app();
        let resp = app
            .oneshot(post_json(
                "/api/messages",
                None,
                r#"{"participants":["alice"],"content":"hi"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn submit_empty_participants_is_bad_request() {
        let (app, _svc) = app();
        let resp = app
            .oneshot(post_json(
                "/api/messages",
                Some("alice"),
                r#"{"participants":[],"content":"hi"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn submit_malformed_json_is_bad_request() {
        let (app, _svc) = app();
        let resp = app
            .oneshot(post_json("/api/messages", Some("alice"), "{not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn submit_by_outsider_is_forbidden() {
        let (app, _svc) = app();
        let resp = app
            .oneshot(post_json(
                "/api/messages",
                Some("mallory"),
                r#"{"participants":["alice","bob"],"content":"hi"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn history_by_outsider_is_forbidden() {
        let (app, _svc) = app();
        let req = Request::get("/api/messages?participants=alice,bob")
            .header(PARTICIPANT_HEADER, "mallory")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn history_invalid_paging_falls_back() {
        let (app, _svc) = app();
        let req = Request::get("/api/messages?participants=%20bob%20,alice&page=-1&size=abc")
            .header(PARTICIPANT_HEADER, "alice")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!([]));
    }

    #[tokio::test]
    async fn history_accepts_query_identity() {
        let (app, _svc) = app();
        let req = Request::get("/api/messages?participants=alice,bob&participant=bob")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn presence_counts_users() {
        let (app, svc) = app();
        let (_c, _rx) = svc.register_connection(ParticipantId::from("alice"));
        let resp = app
            .oneshot(post_json("/api/connections", None, r#"{"users":["alice","bob"]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["alice"], 1);
        assert_eq!(body["bob"], 0);
    }

    #[tokio::test]
    async fn presence_empty_users_is_bad_request() {
        let (app, _svc) = app();
        let resp = app
            .oneshot(post_json("/api/connections", None, r#"{"users":[]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders() {
        let (app, _svc) = app();
        let resp = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let (app, _svc) = app();
        let resp = app
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn paging_parse() {
        assert_eq!(paging_value(Some("3")), Some(3));
        assert_eq!(paging_value(Some("-1")), None);
        assert_eq!(paging_value(Some("x")), None);
        assert_eq!(paging_value(None), None);
    }

    #[test]
    fn participant_list_trims_and_skips_blanks() {
        let q = HistoryQuery {
            participants: Some(" bob , alice,,".into()),
            ..HistoryQuery::default()
        };
        let names: Vec<String> = q.participant_list().into_iter().map(String::from).collect();
        assert_eq!(names, ["bob", "alice"]);
    }
}
