//! Axum route handlers for the chat and dashboard API.

use crate::chat::{ChatContext, ChatSession, SessionView};
use crate::dashboard::{AgentHistory, Dashboard};
use crate::error::ChatError;
use crate::server::response::{chat_error, fail, ok, settings_error, ApiResponse, Reply};
use crate::server::sessions::SessionRegistry;
use crate::types::{Agent, AgentDraft, DashboardStats, VisitInfo};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Header carrying the authenticated owner id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Optional header carrying a stable visitor id.
pub const VISITOR_ID_HEADER: &str = "x-visitor-id";

/// Idle time after which an HTTP session is dropped.
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(30 * 60);
/// Open HTTP sessions kept before the least recently used is evicted.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

pub struct AppState {
    pub chat: ChatContext,
    pub dashboard: Dashboard,
    pub sessions: Mutex<SessionRegistry>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(chat: ChatContext) -> Self {
        Self::with_session_limits(chat, DEFAULT_SESSION_IDLE, DEFAULT_MAX_SESSIONS)
    }

    pub fn with_session_limits(chat: ChatContext, idle_ttl: Duration, max_sessions: usize) -> Self {
        Self {
            dashboard: Dashboard::new(chat.store.clone()),
            chat,
            sessions: Mutex::new(SessionRegistry::new(idle_ttl, max_sessions)),
            start_time: Instant::now(),
        }
    }

    async fn session(&self, id: &str) -> Option<Arc<Mutex<ChatSession>>> {
        self.sessions.lock().await.get(id)
    }

    async fn publish(&self, view: &SessionView) {
        self.sessions.lock().await.publish(view);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub uptime_secs: u64,
    pub open_sessions: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub message: String,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn visit_info(headers: &HeaderMap) -> VisitInfo {
    let forwarded = header_value(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()));
    VisitInfo {
        visitor_ip: forwarded.or_else(|| header_value(headers, "x-real-ip")),
        user_agent: header_value(headers, header::USER_AGENT.as_str()),
        referrer: header_value(headers, header::REFERER.as_str()),
    }
}

fn owner<T>(headers: &HeaderMap) -> Result<String, Reply<T>> {
    header_value(headers, USER_ID_HEADER)
        .ok_or_else(|| fail(StatusCode::UNAUTHORIZED, "missing x-user-id header"))
}

// GET /api/v1/health
pub async fn health(State(state): State<Arc<AppState>>) -> Reply<Health> {
    ok(Health {
        status: "ok".into(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        open_sessions: state.sessions.lock().await.len(),
    })
}

// POST /api/v1/chat/{slug}/sessions
pub async fn open_session(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Reply<SessionView> {
    let visitor = header_value(&headers, VISITOR_ID_HEADER);
    match ChatSession::load(state.chat.clone(), &slug, visitor, visit_info(&headers)).await {
        Ok(session) => {
            let view = state.sessions.lock().await.insert(session);
            (StatusCode::CREATED, Json(ApiResponse::ok(view)))
        }
        Err(e) => chat_error(&e),
    }
}

// GET /api/v1/sessions/{id}
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Reply<SessionView> {
    let Some(session) = state.session(&id).await else {
        return fail(StatusCode::NOT_FOUND, format!("session {id} not found"));
    };
    // A request in flight holds the session; answer with the last published view.
    let view = match session.try_lock() {
        Ok(session) => Some(session.view()),
        Err(_) => state.sessions.lock().await.snapshot(&id),
    };
    match view {
        Some(view) => ok(view),
        None => fail(StatusCode::NOT_FOUND, format!("session {id} not found")),
    }
}

// POST /api/v1/sessions/{id}/messages
pub async fn submit_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> Reply<SessionView> {
    let Some(session) = state.session(&id).await else {
        return fail(StatusCode::NOT_FOUND, format!("session {id} not found"));
    };
    // One in-flight request per session.
    let Ok(mut session) = session.try_lock() else {
        return chat_error(&ChatError::Busy);
    };
    let result = session.submit(&req.message).await;
    let view = session.view();
    state.publish(&view).await;
    match result {
        Ok(turn) => {
            debug!("Session {} turn: {:?}", id, turn);
            ok(view)
        }
        Err(e) => chat_error(&e),
    }
}

// POST /api/v1/sessions/{id}/pay
pub async fn pay(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Reply<SessionView> {
    let Some(session) = state.session(&id).await else {
        return fail(StatusCode::NOT_FOUND, format!("session {id} not found"));
    };
    let Ok(mut session) = session.try_lock() else {
        return chat_error(&ChatError::Busy);
    };
    let result = session.pay().await;
    let view = session.view();
    state.publish(&view).await;
    match result {
        Ok(turn) => {
            debug!("Session {} pay: {:?}", id, turn);
            ok(view)
        }
        Err(e) => chat_error(&e),
    }
}

// GET /api/v1/agents
pub async fn list_agents(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Reply<Vec<Agent>> {
    let owner = match owner(&headers) {
        Ok(o) => o,
        Err(reply) => return reply,
    };
    match state.dashboard.list_agents(&owner).await {
        Ok(agents) => ok(agents),
        Err(e) => settings_error(&e),
    }
}

// POST /api/v1/agents
pub async fn create_agent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<AgentDraft>,
) -> Reply<Agent> {
    let owner = match owner(&headers) {
        Ok(o) => o,
        Err(reply) => return reply,
    };
    match state.dashboard.create_agent(&owner, &draft).await {
        Ok(agent) => (StatusCode::CREATED, Json(ApiResponse::ok(agent))),
        Err(e) => settings_error(&e),
    }
}

// GET /api/v1/agents/{id}
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Reply<Agent> {
    let owner = match owner(&headers) {
        Ok(o) => o,
        Err(reply) => return reply,
    };
    match state.dashboard.get_agent(&owner, &id).await {
        Ok(agent) => ok(agent),
        Err(e) => settings_error(&e),
    }
}

// PUT /api/v1/agents/{id}
pub async fn update_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(draft): Json<AgentDraft>,
) -> Reply<Agent> {
    let owner = match owner(&headers) {
        Ok(o) => o,
        Err(reply) => return reply,
    };
    match state.dashboard.update_agent(&owner, &id, &draft).await {
        Ok(agent) => ok(agent),
        Err(e) => settings_error(&e),
    }
}

// GET /api/v1/agents/{id}/history
pub async fn agent_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Reply<AgentHistory> {
    let owner = match owner(&headers) {
        Ok(o) => o,
        Err(reply) => return reply,
    };
    match state.dashboard.history(&owner, &id).await {
        Ok(history) => ok(history),
        Err(e) => settings_error(&e),
    }
}

// GET /api/v1/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Reply<DashboardStats> {
    let owner = match owner(&headers) {
        Ok(o) => o,
        Err(reply) => return reply,
    };
    ok(state.dashboard.stats(&owner).await)
}
