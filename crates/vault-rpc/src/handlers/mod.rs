//! JSON-RPC request handlers, split by domain.

mod archives;
mod models;
mod users;

use crate::server::AppState;
use crate::wrapper::wrap_response;
use axum::{extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use model_vault::{naming, Principal, VaultError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

// ============================================================================
// JSON-RPC types
// ============================================================================

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }
}

// ============================================================================
// Parameter extraction helpers
// ============================================================================

/// Extract an optional string parameter, supporting both snake_case and camelCase.
pub(crate) fn get_str_param<'a>(params: &'a Value, snake: &str, camel: &str) -> Option<&'a str> {
    params
        .get(snake)
        .or_else(|| params.get(camel))
        .and_then(|v| v.as_str())
}

/// Extract a required string parameter or return an error.
pub(crate) fn require_str_param(
    params: &Value,
    snake: &str,
    camel: &str,
) -> model_vault::Result<String> {
    get_str_param(params, snake, camel)
        .map(String::from)
        .ok_or_else(|| {
            VaultError::validation(snake, format!("Missing required parameter: {}", snake))
        })
}

/// Extract an optional id parameter given either as a number or as text.
pub(crate) fn get_id_param(
    params: &Value,
    snake: &str,
    camel: &str,
) -> model_vault::Result<Option<u64>> {
    match params.get(snake).or_else(|| params.get(camel)) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| VaultError::validation(snake, format!("Invalid {}: {}", snake, n))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => naming::parse_id(snake, s).map(Some),
        Some(other) => Err(VaultError::validation(
            snake,
            format!("Invalid {}: {}", snake, other),
        )),
    }
}

/// Extract a required id parameter or return an error.
pub(crate) fn require_id_param(params: &Value, snake: &str, camel: &str) -> model_vault::Result<u64> {
    get_id_param(params, snake, camel)?.ok_or_else(|| {
        VaultError::validation(snake, format!("Missing required parameter: {}", snake))
    })
}

/// The caller's principal, or `InvalidCredentials` for anonymous calls.
pub(crate) fn require_caller(caller: Option<&Principal>) -> model_vault::Result<&Principal> {
    caller.ok_or(VaultError::InvalidCredentials)
}

// ============================================================================
// HTTP endpoints
// ============================================================================

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let method = &request.method;
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    let id = request.id.clone();

    // Params can carry passwords and tokens
    debug!("RPC call: {}", method);

    if method == "health_check" {
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::success(id, json!({"status": "ok"}))),
        );
    }

    let caller = state.principal(&headers).await;
    let result = dispatch_method(&state, caller.as_ref(), method, &params).await;

    match result {
        Ok(value) => {
            let wrapped = wrap_response(method, value);
            (StatusCode::OK, Json(JsonRpcResponse::success(id, wrapped)))
        }
        Err(e) => {
            if e.is_not_found() || matches!(e, VaultError::Validation { .. }) {
                debug!("RPC error for {}: {}", method, e);
            } else {
                error!("RPC error for {}: {}", method, e);
            }
            let code = e.to_rpc_error_code();
            (
                StatusCode::OK,
                Json(JsonRpcResponse::error(id, code, e.to_string())),
            )
        }
    }
}

// ============================================================================
// Method dispatcher
// ============================================================================

/// Dispatch a method call to the appropriate domain handler.
async fn dispatch_method(
    state: &AppState,
    caller: Option<&Principal>,
    method: &str,
    params: &Value,
) -> model_vault::Result<Value> {
    match method {
        // Accounts
        "register" => users::register(state, params).await,
        "login" => users::login(state, params).await,
        "get_profile" => users::get_profile(state, caller, params).await,

        // Models
        "list_models" => models::list_models(state, caller, params).await,
        "delete_model" => models::delete_model(state, caller, params).await,

        // Archives
        "create_archive" => archives::create_archive(state, caller, params).await,
        "list_archives" => archives::list_archives(state, caller, params).await,
        "delete_archive" => archives::delete_archive(state, caller, params).await,
        "archive_login" => archives::archive_login(state, params).await,

        // Unknown method
        _ => {
            warn!("Method not found: {}", method);
            Err(VaultError::Other(format!("Method not found: {}", method)))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
