//! Account handlers.

use super::{require_caller, require_str_param};
use crate::auth::{hash_password, verify_password, MAX_PASSWORD_LEN, MIN_PASSWORD_LEN};
use crate::server::AppState;
use model_vault::{Principal, VaultError};
use serde_json::{json, Value};

pub async fn register(state: &AppState, params: &Value) -> model_vault::Result<Value> {
    let email = require_str_param(params, "email", "email")?;
    let password = require_str_param(params, "password", "password")?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(VaultError::validation(
            "password",
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(VaultError::validation(
            "password",
            format!("Password must be at most {} bytes", MAX_PASSWORD_LEN),
        ));
    }

    let hash = hash_password(&password, Some(state.password_cost)).await?;
    let profile = state.registry.register(&email, hash)?;
    Ok(serde_json::to_value(profile)?)
}

pub async fn login(state: &AppState, params: &Value) -> model_vault::Result<Value> {
    let email = require_str_param(params, "email", "email")?;
    let password = require_str_param(params, "password", "password")?;

    let principal = state
        .registry
        .login(&email, |stored| async move {
            verify_password(&password, &stored).await
        })
        .await?;
    let profile = state.registry.profile(&principal)?;
    let token = state.sessions.issue(principal).await;

    Ok(json!({
        "token": token,
        "user": profile,
        "role": profile.role,
    }))
}

pub async fn get_profile(
    state: &AppState,
    caller: Option<&Principal>,
    _params: &Value,
) -> model_vault::Result<Value> {
    let profile = state.registry.profile(require_caller(caller)?)?;
    Ok(serde_json::to_value(profile)?)
}
