//! Request API: HTTP/JSON routes over the session registry.
//!
//! Every response uses the `{success, data}` / `{success, error}` envelope.
//! Bodies are validated completely before the registry is touched.

use std::any::Any;
use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch};
use axum::{Json, Router};
use ccmon_core::{
    RegisterRequest, Session, SessionDetail, SessionEvent, SessionStatus, ToolCall, UserPrompt,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::error::ApiError;
use crate::push;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: T,
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, ok(data))
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    Router::new()
        .route("/api/health", get(health))
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route(
            "/api/sessions/{pid}",
            get(get_session).patch(update_session).delete(delete_session),
        )
        .route("/api/sessions/{pid}/detail", get(session_detail))
        .route(
            "/api/sessions/{pid}/prompts",
            get(list_prompts).post(submit_prompt),
        )
        .route(
            "/api/sessions/{pid}/tools",
            get(list_tool_calls).post(start_tool_call),
        )
        .route(
            "/api/sessions/{pid}/tools/{tool_call_id}",
            patch(end_tool_call),
        )
        .route("/api/sessions/{pid}/stats", get(session_stats))
        .route("/api/events", get(list_events).delete(clear_events))
        .route("/ws", get(push::ws_handler))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(trace_layer)
        .with_state(state)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_owned()
    } else {
        "unknown panic".to_owned()
    };
    tracing::error!(panic = %detail, "request handler panicked");
    ApiError::Internal("Internal server error".into()).into_response()
}

// ─── Validation ───────────────────────────────────────────────────

/// Path pid: decimal digits only, in `1..=i32::MAX`.
fn parse_pid(raw: &str) -> Result<u32, ApiError> {
    raw.parse::<u32>()
        .ok()
        .filter(|pid| valid_pid(*pid))
        .ok_or_else(|| ApiError::InvalidPid(raw.to_owned()))
}

fn valid_pid(pid: u32) -> bool {
    pid >= 1 && i32::try_from(pid).is_ok()
}

/// Parse a request body as a JSON object. An empty body is `{}`.
fn json_body(bytes: &Bytes) -> Result<Map<String, Value>, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::invalid_request("Request body must be a JSON object")),
        Err(e) => Err(ApiError::invalid_request(format!("Malformed JSON body: {e}"))),
    }
}

/// A field that is absent or `null` is treated as missing.
fn field<'a>(body: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    body.get(name).filter(|v| !v.is_null())
}

fn pid_field(body: &Map<String, Value>, name: &str) -> Result<u32, ApiError> {
    let value = field(body, name)
        .ok_or_else(|| ApiError::invalid_request(format!("Missing required field: {name}")))?;
    let pid = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    pid.filter(|pid| valid_pid(*pid)).ok_or_else(|| {
        ApiError::invalid_request(format!("Field {name} must be a positive process id"))
    })
}

fn optional_string<'a>(
    body: &'a Map<String, Value>,
    name: &str,
) -> Result<Option<&'a str>, ApiError> {
    match field(body, name) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ApiError::invalid_request(format!(
            "Field {name} must be a string"
        ))),
    }
}

fn required_string<'a>(body: &'a Map<String, Value>, name: &str) -> Result<&'a str, ApiError> {
    optional_string(body, name)?
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::invalid_request(format!("Missing required field: {name}")))
}

fn optional_bool(body: &Map<String, Value>, name: &str) -> Result<Option<bool>, ApiError> {
    match field(body, name) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(ApiError::invalid_request(format!(
            "Field {name} must be a boolean"
        ))),
    }
}

// ─── Sessions ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    sessions: usize,
}

async fn health(State(state): State<AppState>) -> ApiResult<Health> {
    let sessions = state.registry.lock().await.count();
    Ok(ok(Health {
        status: "ok",
        sessions,
    }))
}

async fn create_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<Session>>), ApiError> {
    let body = json_body(&body)?;
    let req = RegisterRequest {
        pid: pid_field(&body, "pid")?,
        ppid: pid_field(&body, "ppid")?,
        cwd: required_string(&body, "cwd")?.to_owned(),
        terminal: optional_string(&body, "terminal")?
            .unwrap_or("unknown")
            .to_owned(),
    };

    let session = state.registry.lock().await.register(req, Utc::now());
    tracing::info!(pid = session.pid, project = %session.project, "session registered");
    Ok(created(session))
}

async fn list_sessions(State(state): State<AppState>) -> ApiResult<Vec<Session>> {
    Ok(ok(state.registry.lock().await.all()))
}

async fn get_session(
    State(state): State<AppState>,
    Path(raw_pid): Path<String>,
) -> ApiResult<Session> {
    let pid = parse_pid(&raw_pid)?;
    let registry = state.registry.lock().await;
    let session = registry.get(pid).ok_or(ApiError::SessionNotFound(pid))?;
    Ok(ok(session.clone()))
}

async fn update_session(
    State(state): State<AppState>,
    Path(raw_pid): Path<String>,
    body: Bytes,
) -> ApiResult<Session> {
    let pid = parse_pid(&raw_pid)?;
    let body = json_body(&body)?;
    let status: SessionStatus = required_string(&body, "status")?.parse()?;
    let message = optional_string(&body, "message")?.map(str::to_owned);

    let session = state
        .registry
        .lock()
        .await
        .update_status(pid, status, message, Utc::now())
        .ok_or(ApiError::SessionNotFound(pid))?;
    tracing::debug!(pid, status = %session.status, "session status updated");
    Ok(ok(session))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(raw_pid): Path<String>,
) -> ApiResult<()> {
    let pid = parse_pid(&raw_pid)?;
    if !state.registry.lock().await.delete(pid, Utc::now()) {
        return Err(ApiError::SessionNotFound(pid));
    }
    tracing::info!(pid, "session ended");
    Ok(ok(()))
}

async fn session_detail(
    State(state): State<AppState>,
    Path(raw_pid): Path<String>,
) -> ApiResult<SessionDetail> {
    let pid = parse_pid(&raw_pid)?;
    let detail = state
        .registry
        .lock()
        .await
        .detail(pid)
        .ok_or(ApiError::SessionNotFound(pid))?;
    Ok(ok(detail))
}

// ─── Prompts & Tool Calls ─────────────────────────────────────────

async fn submit_prompt(
    State(state): State<AppState>,
    Path(raw_pid): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<UserPrompt>>), ApiError> {
    let pid = parse_pid(&raw_pid)?;
    let body = json_body(&body)?;
    let text = required_string(&body, "prompt")?.to_owned();

    let prompt = state
        .registry
        .lock()
        .await
        .add_prompt(pid, text, Utc::now())
        .ok_or(ApiError::SessionNotFound(pid))?;
    Ok(created(prompt))
}

async fn list_prompts(
    State(state): State<AppState>,
    Path(raw_pid): Path<String>,
) -> ApiResult<Vec<UserPrompt>> {
    let pid = parse_pid(&raw_pid)?;
    let prompts = state
        .registry
        .lock()
        .await
        .prompts(pid)
        .ok_or(ApiError::SessionNotFound(pid))?;
    Ok(ok(prompts))
}

async fn start_tool_call(
    State(state): State<AppState>,
    Path(raw_pid): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<ToolCall>>), ApiError> {
    let pid = parse_pid(&raw_pid)?;
    let body = json_body(&body)?;
    let tool = required_string(&body, "tool")?.to_owned();
    let input = match field(&body, "input") {
        None => Value::Object(Map::new()),
        Some(v @ Value::Object(_)) => v.clone(),
        Some(_) => return Err(ApiError::invalid_request("Field input must be an object")),
    };

    let tool_call = state
        .registry
        .lock()
        .await
        .start_tool_call(pid, tool, input, Utc::now())
        .ok_or(ApiError::SessionNotFound(pid))?;
    Ok(created(tool_call))
}

async fn end_tool_call(
    State(state): State<AppState>,
    Path((raw_pid, tool_call_id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<ToolCall> {
    let pid = parse_pid(&raw_pid)?;
    let body = json_body(&body)?;
    let success = optional_bool(&body, "success")?.unwrap_or(true);
    let error = optional_string(&body, "error")?.map(str::to_owned);

    let mut registry = state.registry.lock().await;
    if registry.get(pid).is_none() {
        return Err(ApiError::SessionNotFound(pid));
    }
    let tool_call = registry
        .end_tool_call(pid, &tool_call_id, success, error, Utc::now())
        .ok_or(ApiError::ToolCallNotFound(tool_call_id))?;
    Ok(ok(tool_call))
}

async fn list_tool_calls(
    State(state): State<AppState>,
    Path(raw_pid): Path<String>,
) -> ApiResult<Vec<ToolCall>> {
    let pid = parse_pid(&raw_pid)?;
    let tool_calls = state
        .registry
        .lock()
        .await
        .tool_calls(pid)
        .ok_or(ApiError::SessionNotFound(pid))?;
    Ok(ok(tool_calls))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionStats {
    prompts: usize,
    tool_calls: usize,
    by_tool: BTreeMap<String, usize>,
}

async fn session_stats(
    State(state): State<AppState>,
    Path(raw_pid): Path<String>,
) -> ApiResult<SessionStats> {
    let pid = parse_pid(&raw_pid)?;
    let registry = state.registry.lock().await;
    let (Some(prompts), Some(tools)) = (registry.prompts(pid), registry.tool_stats(pid)) else {
        return Err(ApiError::SessionNotFound(pid));
    };
    Ok(ok(SessionStats {
        prompts: prompts.len(),
        tool_calls: tools.total_calls,
        by_tool: tools.by_tool,
    }))
}

// ─── Events ───────────────────────────────────────────────────────

async fn list_events(State(state): State<AppState>) -> ApiResult<Vec<SessionEvent>> {
    Ok(ok(state.registry.lock().await.events()))
}

async fn clear_events(State(state): State<AppState>) -> ApiResult<()> {
    state.registry.lock().await.clear_events();
    tracing::info!("event log cleared");
    Ok(ok(()))
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::notify::NotificationGateway;
    use crate::notify::testing::RecordingNotifier;
    use axum::body::Body;
    use axum::http::{Method, Request, header};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_app() -> (Router, AppState) {
        let gateway = NotificationGateway::new(
            Arc::new(RecordingNotifier::default()),
            Duration::from_secs(1),
        );
        let state = AppState::new(Arc::new(DaemonConfig::default()), gateway);
        (router(state.clone()), state)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(body.map(|b| Body::from(b.to_owned())).unwrap_or_else(Body::empty))
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        send(app, method, uri, Some(&body.to_string())).await
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        send(app, Method::GET, uri, None).await
    }

    async fn register(app: &Router, pid: u32, cwd: &str) -> Value {
        let (status, body) = call(
            app,
            Method::POST,
            "/api/sessions",
            json!({"pid": pid, "ppid": 1, "cwd": cwd, "terminal": "vscode"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    fn error_code(body: &Value) -> &str {
        assert_eq!(body["success"], false);
        body["error"]["code"].as_str().expect("error code")
    }

    #[tokio::test]
    async fn health_reports_session_count() {
        let (app, _) = test_app();
        register(&app, 10, "/p").await;
        let (status, body) = get_json(&app, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!({"status": "ok", "sessions": 1}));
    }

    #[tokio::test]
    async fn register_returns_created_session() {
        let (app, _) = test_app();
        let body = register(&app, 4242, "/Users/me/proj-x").await;
        assert_eq!(body["success"], true);
        let data = &body["data"];
        assert_eq!(data["pid"], 4242);
        assert_eq!(data["project"], "proj-x");
        assert_eq!(data["terminal"], "vscode");
        assert_eq!(data["status"], "idle");
        assert_eq!(data["startedAt"], data["updatedAt"]);
    }

    #[tokio::test]
    async fn register_accepts_numeric_strings_and_missing_terminal() {
        let (app, _) = test_app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/sessions",
            json!({"pid": "77", "ppid": "1", "cwd": "/x/y"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["pid"], 77);
        assert_eq!(body["data"]["terminal"], "unknown");
    }

    #[tokio::test]
    async fn register_validation_errors() {
        let (app, state) = test_app();
        let bad = [
            json!({"ppid": 1, "cwd": "/p"}),
            json!({"pid": 5, "cwd": "/p"}),
            json!({"pid": 5, "ppid": 1}),
            json!({"pid": 5, "ppid": 1, "cwd": ""}),
            json!({"pid": "abc", "ppid": 1, "cwd": "/p"}),
            json!({"pid": 0, "ppid": 1, "cwd": "/p"}),
            json!({"pid": -3, "ppid": 1, "cwd": "/p"}),
            json!({"pid": 3_000_000_000u64, "ppid": 1, "cwd": "/p"}),
            json!({"pid": 5, "ppid": 1, "cwd": 42}),
            json!([1, 2, 3]),
        ];
        for body in bad {
            let (status, response) = call(&app, Method::POST, "/api/sessions", body.clone()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(error_code(&response), "INVALID_REQUEST");
        }
        assert_eq!(state.registry.lock().await.count(), 0);
        assert!(state.registry.lock().await.events().is_empty());
    }

    #[tokio::test]
    async fn malformed_json_is_invalid_request() {
        let (app, _) = test_app();
        let (status, body) = send(&app, Method::POST, "/api/sessions", Some("{\"pid\": ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn list_sessions_returns_all() {
        let (app, _) = test_app();
        register(&app, 2, "/a").await;
        register(&app, 1, "/b").await;
        let (status, body) = get_json(&app, "/api/sessions").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn path_pid_validation() {
        let (app, _) = test_app();
        for uri in ["/api/sessions/abc", "/api/sessions/0", "/api/sessions/-5", "/api/sessions/12x"] {
            let (status, body) = get_json(&app, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(error_code(&body), "INVALID_PID");
        }
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (app, _) = test_app();
        let (status, body) = get_json(&app, "/api/sessions/12345").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_code(&body), "SESSION_NOT_FOUND");
        assert_eq!(body["error"]["message"], "Session with PID 12345 not found");

        let (status, _) = call(
            &app,
            Method::PATCH,
            "/api/sessions/12345",
            json!({"status": "thinking"}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_status_and_message() {
        let (app, state) = test_app();
        register(&app, 9, "/p").await;
        let (status, body) = call(
            &app,
            Method::PATCH,
            "/api/sessions/9",
            json!({"status": "waiting_input", "message": "Allow edit?"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "waiting_input");
        assert_eq!(body["data"]["message"], "Allow edit?");

        let events = state.registry.lock().await.events();
        assert_eq!(events[0].kind, ccmon_core::EventKind::Waiting);
    }

    #[tokio::test]
    async fn invalid_status_does_not_mutate() {
        let (app, state) = test_app();
        register(&app, 9, "/p").await;
        for status in [json!("ended"), json!("sleeping"), json!(3), Value::Null] {
            let (code, body) = call(
                &app,
                Method::PATCH,
                "/api/sessions/9",
                json!({"status": status, "message": "nope"}),
            )
            .await;
            assert_eq!(code, StatusCode::BAD_REQUEST, "{status}");
            assert_eq!(error_code(&body), "INVALID_REQUEST");
        }
        let registry = state.registry.lock().await;
        let session = registry.get(9).expect("still tracked");
        assert_eq!(session.status, SessionStatus::Idle);
        assert_eq!(session.message, None);
    }

    #[tokio::test]
    async fn delete_then_not_found() {
        let (app, state) = test_app();
        register(&app, 9, "/p").await;
        let (status, body) = send(&app, Method::DELETE, "/api/sessions/9", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "data": null}));

        let (status, body) = send(&app, Method::DELETE, "/api/sessions/9", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_code(&body), "SESSION_NOT_FOUND");

        let events = state.registry.lock().await.events();
        let ended = events
            .iter()
            .filter(|e| e.kind == ccmon_core::EventKind::Ended)
            .count();
        assert_eq!(ended, 1);
    }

    #[tokio::test]
    async fn prompts_roundtrip() {
        let (app, _) = test_app();
        register(&app, 5, "/p").await;
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/sessions/5/prompts",
            json!({"prompt": "add a test"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["sessionId"], 5);

        let (_, body) = get_json(&app, "/api/sessions/5/prompts").await;
        assert_eq!(body["data"][0]["prompt"], "add a test");

        let (status, body) = call(&app, Method::POST, "/api/sessions/5/prompts", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn tool_call_on_unknown_session_is_not_found() {
        let (app, _) = test_app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/sessions/31337/tools",
            json!({"tool": "Bash"}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_code(&body), "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn tool_call_start_and_end() {
        let (app, _) = test_app();
        register(&app, 5, "/p").await;
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/sessions/5/tools",
            json!({"tool": "Bash", "input": {"command": "cargo fmt"}}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "pending");
        assert_eq!(body["data"]["input"]["command"], "cargo fmt");
        let id = body["data"]["id"].as_str().expect("tool call id").to_owned();

        // empty body: success defaults to true
        let uri = format!("/api/sessions/5/tools/{id}");
        let (status, body) = send(&app, Method::PATCH, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let data = &body["data"];
        assert_eq!(data["status"], "success");
        let duration = data["duration"].as_i64().expect("duration");
        let started = data["startedAt"].as_i64().expect("startedAt");
        let completed = data["completedAt"].as_i64().expect("completedAt");
        assert!(duration >= 0);
        assert_eq!(duration, completed - started);

        let (status, body) = call(&app, Method::PATCH, &uri, json!({"success": false})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_code(&body), "TOOL_CALL_NOT_FOUND");
    }

    #[tokio::test]
    async fn tool_call_failure_records_error() {
        let (app, _) = test_app();
        register(&app, 5, "/p").await;
        let (_, body) = call(&app, Method::POST, "/api/sessions/5/tools", json!({"tool": "Edit"})).await;
        assert_eq!(body["data"]["input"], json!({}));
        let id = body["data"]["id"].as_str().expect("tool call id").to_owned();

        let (status, body) = call(
            &app,
            Method::PATCH,
            &format!("/api/sessions/5/tools/{id}"),
            json!({"success": false, "error": "file not found"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "error");
        assert_eq!(body["data"]["error"], "file not found");
    }

    #[tokio::test]
    async fn stats_and_detail() {
        let (app, _) = test_app();
        register(&app, 5, "/w/site").await;
        call(&app, Method::POST, "/api/sessions/5/prompts", json!({"prompt": "a"})).await;
        for tool in ["Bash", "Read", "Bash"] {
            call(&app, Method::POST, "/api/sessions/5/tools", json!({"tool": tool})).await;
        }

        let (status, body) = get_json(&app, "/api/sessions/5/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["data"],
            json!({"prompts": 1, "toolCalls": 3, "byTool": {"Bash": 2, "Read": 1}})
        );

        let (status, body) = get_json(&app, "/api/sessions/5/detail").await;
        assert_eq!(status, StatusCode::OK);
        let data = &body["data"];
        assert_eq!(data["pid"], 5);
        assert_eq!(data["project"], "site");
        assert_eq!(data["promptHistory"].as_array().map(Vec::len), Some(1));
        assert_eq!(data["toolHistory"].as_array().map(Vec::len), Some(3));
        assert_eq!(data["toolStats"]["totalCalls"], 3);

        let (_, body) = get_json(&app, "/api/sessions/5/tools").await;
        assert_eq!(body["data"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn events_list_and_clear() {
        let (app, _) = test_app();
        register(&app, 1, "/p").await;
        let (_, body) = get_json(&app, "/api/events").await;
        assert_eq!(body["data"][0]["type"], "started");

        let (status, _) = send(&app, Method::DELETE, "/api/events", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = get_json(&app, "/api/events").await;
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn panic_handler_uses_error_envelope() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(error_code(&body), "INTERNAL_ERROR");
    }
}
