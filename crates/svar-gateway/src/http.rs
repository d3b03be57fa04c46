// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use async_graphql::Variables;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use svar_core::{
    CircuitBreaker, CircuitStatus, ConversationStore, DispatchError, PendingEscalation,
    SessionRouter, Supervisor, TicketHitlHandler, TurnRequest,
};
use svar_tools::ToolServerClient;

use crate::graphql::GqlSchema;

/// Everything the handlers need, cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<SessionRouter>,
    pub supervisor: Arc<Supervisor>,
    pub store: Arc<dyn ConversationStore>,
    /// Present only when the ticket HITL handler is configured.
    pub tickets: Option<Arc<TicketHitlHandler>>,
    pub breaker: Arc<CircuitBreaker>,
    pub tool_server: Arc<dyn ToolServerClient>,
    pub schema: GqlSchema,
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .route("/hitl/pending", get(hitl_pending))
        .route("/hitl/pending/:session_id/clear", post(hitl_clear))
        .route("/graphql", post(graphql))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until shutdown.
pub async fn serve(bind: &str, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(bind, "gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ── Chat ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatBody {
    user_id: String,
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatReply {
    session_id: String,
    reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_id: Option<String>,
}

async fn chat(State(state): State<AppState>, Json(body): Json<ChatBody>) -> Response {
    let decision = state
        .router
        .route(&body.user_id, &body.message, body.session_id.as_deref())
        .await;
    let request = TurnRequest {
        session_id: decision.session_id,
        user_id: body.user_id,
        message: body.message.clone(),
        suggested_agent_ids: decision.suggested_agent_ids,
    };

    match state.supervisor.run_turn(request).await {
        Ok(result) => {
            // The user turn is written first so readers always observe it
            // before the assistant turn of the same request.
            if let Err(e) = state
                .store
                .append_turn(&result.session_id, "user", &body.message, None)
                .await
            {
                warn!(error = %e, "conversation store write failed (user turn)");
            }
            let metadata = result
                .agent_id
                .as_ref()
                .map(|id| json!({ "agent_id": id }));
            if let Err(e) = state
                .store
                .append_turn(&result.session_id, "assistant", &result.reply, metadata)
                .await
            {
                warn!(error = %e, "conversation store write failed (assistant turn)");
            }
            Json(ChatReply {
                session_id: result.session_id,
                reply: result.reply,
                agent_id: result.agent_id,
            })
            .into_response()
        }
        Err(e) => dispatch_error_response(e),
    }
}

/// Map dispatch errors to HTTP: overload → 503, anything else → 500 with a
/// generic body (internals never reach users).
fn dispatch_error_response(e: DispatchError) -> Response {
    match e {
        DispatchError::Overload(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
        DispatchError::Internal(e) => {
            error!(error = %e, "chat turn failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
                .into_response()
        }
    }
}

// ── Health ────────────────────────────────────────────────────────────────────

fn circuit_label(status: CircuitStatus) -> &'static str {
    match status {
        CircuitStatus::Closed => "healthy",
        CircuitStatus::Open => "circuit_open",
        CircuitStatus::HalfOpen => "half_open",
    }
}

async fn health(State(state): State<AppState>) -> Response {
    let agent_ids = state.supervisor.agent_ids().to_vec();
    let snapshot = state.breaker.snapshot(&agent_ids);
    let agents: BTreeMap<String, &'static str> = snapshot
        .iter()
        .map(|(id, status)| (id.clone(), circuit_label(*status)))
        .collect();
    let any_open = snapshot
        .values()
        .any(|s| *s == CircuitStatus::Open);
    let mcp_ok = state.tool_server.ping().await;
    let degraded = any_open || !mcp_ok || state.supervisor.is_degraded();

    let body = json!({
        "status": if degraded { "degraded" } else { "ok" },
        "agents": agents,
        "mcp": if mcp_ok { "ok" } else { "unavailable" },
    });
    let code = if degraded {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(body)).into_response()
}

// ── HITL ──────────────────────────────────────────────────────────────────────

async fn hitl_pending(State(state): State<AppState>) -> Json<Vec<PendingEscalation>> {
    Json(
        state
            .tickets
            .as_ref()
            .map(|t| t.list_pending())
            .unwrap_or_default(),
    )
}

async fn hitl_clear(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<bool> {
    Json(
        state
            .tickets
            .as_ref()
            .map(|t| t.clear_pending(&session_id))
            .unwrap_or(false),
    )
}

// ── GraphQL ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct GraphQlBody {
    query: String,
    #[serde(default)]
    variables: Option<serde_json::Value>,
    #[serde(default)]
    operation_name: Option<String>,
}

async fn graphql(
    State(state): State<AppState>,
    Json(body): Json<GraphQlBody>,
) -> Json<async_graphql::Response> {
    let mut request = async_graphql::Request::new(body.query);
    if let Some(vars) = body.variables {
        request = request.variables(Variables::from_json(vars));
    }
    if let Some(op) = body.operation_name {
        request = request.operation_name(op);
    }
    Json(state.schema.execute(request).await)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
