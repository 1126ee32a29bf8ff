//! Gateway HTTP server: Axum router in front of the dispatcher

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use hostdesk_core::{AgentId, DispatchError, Dispatcher, InboundMessage};
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{self, AuthOutcome};
use crate::protocol::{
    AGENT_UNAVAILABLE_MESSAGE, AgentStatus, ClassifyResponse, DispatchResponse, ERR_AGENT_UNAVAILABLE,
    ERR_CANCELLED, ERR_INVALID_REQUEST, ERR_UNAUTHORIZED, ERR_UNKNOWN_AGENT, ERR_UNREGISTERED_AGENT,
    ErrorBody, RunAgentRequest, RunAgentResponse,
};

/// Shared state for all requests
#[derive(Clone)]
pub struct GatewayState {
    pub dispatcher: Arc<Dispatcher>,
    pub auth_token: String,
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(dispatcher: Arc<Dispatcher>, auth_token: String) -> Self {
        Self {
            dispatcher,
            auth_token,
            start_time: Instant::now(),
        }
    }
}

/// A failed request: status plus JSON error body
#[derive(Debug)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiFailure {
    fn new(status: StatusCode, body: ErrorBody) -> Self {
        Self { status, body }
    }

    fn from_dispatch(err: DispatchError, request_id: &str) -> Self {
        let status =
            StatusCode::from_u16(err.http_status_hint()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = match &err {
            DispatchError::UnregisteredAgent(_) => {
                error!("[{}] {}", request_id, err);
                ErrorBody::new(ERR_UNREGISTERED_AGENT, err.to_string())
            }
            DispatchError::Handler { .. } => {
                error!("[{}] {}", request_id, err);
                ErrorBody::new(ERR_AGENT_UNAVAILABLE, AGENT_UNAVAILABLE_MESSAGE)
            }
            DispatchError::Cancelled => ErrorBody::new(ERR_CANCELLED, err.to_string()),
        };
        Self::new(status, body.with_agent(err.agent()).with_request_id(request_id))
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status, axum::Json(self.body)).into_response()
    }
}

/// The gateway server
pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
}

impl GatewayServer {
    pub fn new(bind: SocketAddr, dispatcher: Arc<Dispatcher>, auth_token: String) -> Self {
        Self {
            state: GatewayState::new(dispatcher, auth_token),
            bind,
        }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/status", get(status_handler))
            .route("/api/agents", get(agents_handler))
            .route("/api/agents/{id}/run", post(run_agent_handler))
            .route("/api/classify", post(classify_handler))
            .route("/api/dispatch", post(dispatch_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!(
            "Gateway listening on {} (auth {})",
            self.bind,
            if self.state.auth_token.is_empty() { "disabled" } else { "enabled" }
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Gateway stopped");
        Ok(())
    }
}

// ── HTTP Handlers ──

pub async fn status_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let registry = state.dispatcher.registry();
    axum::Json(serde_json::json!({
        "status": "ok",
        "agents": registry.ids(),
        "missing_agents": registry.missing(),
        "classifier": state.dispatcher.classifier().strategy(),
        "notifications": state.dispatcher.has_notifier(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

pub async fn agents_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Result<axum::Json<Vec<AgentStatus>>, ApiFailure> {
    check_auth(&state.auth_token, &headers)?;
    let registry = state.dispatcher.registry();
    let agents = AgentId::ALL
        .into_iter()
        .map(|id| AgentStatus {
            id,
            registered: registry.contains(id),
        })
        .collect();
    Ok(axum::Json(agents))
}

pub async fn classify_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<axum::Json<ClassifyResponse>, ApiFailure> {
    check_auth(&state.auth_token, &headers)?;
    let request_id = Uuid::new_v4().to_string();
    let message: InboundMessage = parse_body(&body, &request_id)?;

    let (routing, lead) = state.dispatcher.route(&message).await;
    debug!(
        "[{}] classified as {} (lead {})",
        request_id, routing.target_agent, lead.tier
    );

    Ok(axum::Json(ClassifyResponse {
        request_id,
        routing,
        lead,
    }))
}

pub async fn dispatch_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<axum::Json<DispatchResponse>, ApiFailure> {
    check_auth(&state.auth_token, &headers)?;
    let request_id = Uuid::new_v4().to_string();
    let message: InboundMessage = parse_body(&body, &request_id)?;

    // Dropping this future on client disconnect cancels in-flight calls
    let envelope = state
        .dispatcher
        .dispatch(&message)
        .await
        .map_err(|e| ApiFailure::from_dispatch(e, &request_id))?;

    Ok(axum::Json(DispatchResponse {
        request_id,
        envelope,
    }))
}

/// Run one named agent, bypassing the classifier
pub async fn run_agent_handler(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<axum::Json<RunAgentResponse>, ApiFailure> {
    check_auth(&state.auth_token, &headers)?;
    let request_id = Uuid::new_v4().to_string();
    let agent = name.parse::<AgentId>().map_err(|e| {
        ApiFailure::new(
            StatusCode::NOT_FOUND,
            ErrorBody::new(ERR_UNKNOWN_AGENT, e.to_string()).with_request_id(&request_id),
        )
    })?;
    let request: RunAgentRequest = parse_body(&body, &request_id)?;

    debug!("[{}] direct run of {} (action {:?})", request_id, agent, request.action);
    let reply = state
        .dispatcher
        .run_agent(agent, &request.message, request.action)
        .await
        .map_err(|e| ApiFailure::from_dispatch(e, &request_id))?;

    Ok(axum::Json(RunAgentResponse { request_id, reply }))
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8], request_id: &str) -> Result<T, ApiFailure> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("[{}] rejected request body: {}", request_id, e);
        ApiFailure::new(
            StatusCode::BAD_REQUEST,
            ErrorBody::new(ERR_INVALID_REQUEST, format!("Invalid JSON: {}", e)).with_request_id(request_id),
        )
    })
}

fn check_auth(configured_token: &str, headers: &HeaderMap) -> Result<(), ApiFailure> {
    match auth::authorize(configured_token, headers) {
        outcome if outcome.is_allowed() => Ok(()),
        AuthOutcome::Missing => Err(ApiFailure::new(
            StatusCode::UNAUTHORIZED,
            ErrorBody::new(ERR_UNAUTHORIZED, "Missing bearer token"),
        )),
        _ => Err(ApiFailure::new(
            StatusCode::UNAUTHORIZED,
            ErrorBody::new(ERR_UNAUTHORIZED, "Invalid bearer token"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hostdesk_core::{
        ActionTag, AgentHandler, AgentReply, BookingAgent, Classifier, DispatcherConfig, HandlerRegistry,
        LeadScorer, LeadTier,
    };

    struct StaticAgent {
        fail: bool,
    }

    #[async_trait]
    impl AgentHandler for StaticAgent {
        fn id(&self) -> AgentId {
            AgentId::GeneralAgent
        }

        async fn handle(&self, message: &InboundMessage, _action: Option<ActionTag>) -> anyhow::Result<AgentReply> {
            if self.fail {
                anyhow::bail!("upstream 503 with secret internals");
            }
            Ok(AgentReply::text(
                AgentId::GeneralAgent,
                format!("Hello {}!", message.sender_display_name),
            ))
        }
    }

    fn state(registry: HandlerRegistry, token: &str) -> GatewayState {
        let dispatcher = Dispatcher::new(
            Classifier::rules_only(),
            LeadScorer::new(),
            Arc::new(registry),
            None,
            DispatcherConfig::default(),
        );
        GatewayState::new(Arc::new(dispatcher), token.to_string())
    }

    fn full_state() -> GatewayState {
        state(
            HandlerRegistry::new()
                .with(Arc::new(StaticAgent { fail: false }))
                .with(Arc::new(BookingAgent::new().with_default_year(2025))),
            "",
        )
    }

    fn body(json: &str) -> Bytes {
        Bytes::from(json.to_string())
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("Bearer {}", token).parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_dispatch_general() {
        let resp = dispatch_handler(
            State(full_state()),
            HeaderMap::new(),
            body(r#"{"text":"Hi, what's the price?","sender_display_name":"Ana"}"#),
        )
        .await
        .unwrap();
        assert_eq!(resp.envelope.primary_response.text, "Hello Ana!");
        assert_eq!(resp.envelope.lead.tier, LeadTier::Cold);
        assert!(!resp.request_id.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_booking() {
        let resp = dispatch_handler(
            State(full_state()),
            HeaderMap::new(),
            body(r#"{"text":"I want to book for 12/25, 100 guests, it's urgent!"}"#),
        )
        .await
        .unwrap();
        assert_eq!(resp.envelope.routing.target_agent, AgentId::BookingAgent);
        assert_eq!(resp.envelope.lead.score, 7);
        assert!(!resp.envelope.notified);
    }

    #[tokio::test]
    async fn test_dispatch_unregistered_agent_is_500() {
        let state = state(HandlerRegistry::new().with(Arc::new(StaticAgent { fail: false })), "");
        let err = dispatch_handler(State(state), HeaderMap::new(), body(r#"{"text":"book 12/25 for 40 guests"}"#))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body.error.code, "unregistered_agent");
        assert_eq!(err.body.error.agent, Some(AgentId::BookingAgent));
        assert!(err.body.error.message.contains("booking_agent"));
    }

    #[tokio::test]
    async fn test_dispatch_handler_failure_is_generic_502() {
        let state = state(HandlerRegistry::new().with(Arc::new(StaticAgent { fail: true })), "");
        let err = dispatch_handler(State(state), HeaderMap::new(), body(r#"{"text":"hello"}"#))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.body.error.code, "agent_unavailable");
        assert_eq!(err.body.error.message, AGENT_UNAVAILABLE_MESSAGE);
        assert!(!err.body.error.message.contains("secret"));
    }

    #[tokio::test]
    async fn test_invalid_json_is_400() {
        let err = dispatch_handler(State(full_state()), HeaderMap::new(), body("{not json"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body.error.code, "invalid_request");
        assert!(err.body.request_id.is_some());
    }

    #[tokio::test]
    async fn test_classify_does_not_call_handler() {
        // A failing handler proves classify never invokes it
        let state = state(HandlerRegistry::new().with(Arc::new(StaticAgent { fail: true })), "");
        let resp = classify_handler(State(state), HeaderMap::new(), body(r#"{"text":"is it available on 12/25?"}"#))
            .await
            .unwrap();
        assert_eq!(resp.routing.target_agent, AgentId::BookingAgent);
        assert_eq!(resp.lead.score, 3);
    }

    #[tokio::test]
    async fn test_auth_required_when_configured() {
        let state = state(HandlerRegistry::new().with(Arc::new(StaticAgent { fail: false })), "s3cret");

        let err = agents_handler(State(state.clone()), HeaderMap::new()).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.body.error.message, "Missing bearer token");

        let err = dispatch_handler(State(state.clone()), bearer("wrong"), body(r#"{"text":"hi"}"#))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let agents = agents_handler(State(state), bearer("s3cret")).await.unwrap();
        assert_eq!(agents.0.len(), 2);
        assert!(agents.0.iter().any(|a| a.id == AgentId::GeneralAgent && a.registered));
        assert!(agents.0.iter().any(|a| a.id == AgentId::BookingAgent && !a.registered));
    }

    #[tokio::test]
    async fn test_run_agent_bypasses_classifier() {
        // Classifies as booking, but the caller asked for the general agent
        let resp = run_agent_handler(
            State(full_state()),
            Path("general_agent".to_string()),
            HeaderMap::new(),
            body(r#"{"text":"book 12/25 for 40 guests","sender_display_name":"Ana"}"#),
        )
        .await
        .unwrap();
        assert_eq!(resp.reply.agent, AgentId::GeneralAgent);
        assert_eq!(resp.reply.text, "Hello Ana!");

        let resp = run_agent_handler(
            State(full_state()),
            Path("booking_agent".to_string()),
            HeaderMap::new(),
            body(r#"{"text":"dia 20, 80 pessoas","action":"create_booking"}"#),
        )
        .await
        .unwrap();
        assert_eq!(resp.reply.agent, AgentId::BookingAgent);
        assert_eq!(resp.reply.metadata["action"], "create_booking");
    }

    #[tokio::test]
    async fn test_run_agent_errors() {
        let err = run_agent_handler(
            State(full_state()),
            Path("maria_agent".to_string()),
            HeaderMap::new(),
            body(r#"{"text":"hi"}"#),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.body.error.code, "unknown_agent");

        let state = state(HandlerRegistry::new().with(Arc::new(StaticAgent { fail: false })), "");
        let err = run_agent_handler(
            State(state.clone()),
            Path("booking_agent".to_string()),
            HeaderMap::new(),
            body(r#"{"text":"hi"}"#),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body.error.code, "unregistered_agent");

        let err = run_agent_handler(State(state), Path("general_agent".to_string()), bearer("x"), body("nope"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_handler() {
        let resp = status_handler(State(full_state())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_router_builds() {
        let dispatcher = full_state().dispatcher;
        let server = GatewayServer::new("127.0.0.1:0".parse().unwrap(), dispatcher, String::new());
        let _ = server.router();
    }
}
