//! Archive management handlers.

use super::{get_str_param, require_caller, require_id_param, require_str_param};
use crate::server::AppState;
use model_vault::Principal;
use serde_json::{json, Value};
use tracing::debug;

pub async fn create_archive(
    state: &AppState,
    caller: Option<&Principal>,
    params: &Value,
) -> model_vault::Result<Value> {
    let caller = require_caller(caller)?;
    let name = get_str_param(params, "name", "name");

    let archive = state.registry.create_archive(caller, name).await?;
    Ok(serde_json::to_value(archive)?)
}

pub async fn list_archives(
    state: &AppState,
    caller: Option<&Principal>,
    _params: &Value,
) -> model_vault::Result<Value> {
    let archives = state.registry.list_archives(require_caller(caller)?)?;
    Ok(serde_json::to_value(archives)?)
}

pub async fn delete_archive(
    state: &AppState,
    caller: Option<&Principal>,
    params: &Value,
) -> model_vault::Result<Value> {
    let caller = require_caller(caller)?;
    let id = require_id_param(params, "id", "id")?;

    let deletion = state.registry.delete_archive(caller, id).await?;
    let revoked = state.sessions.revoke_archive(id).await;
    debug!("Revoked {} sessions for archive {}", revoked, id);

    Ok(serde_json::to_value(deletion)?)
}

/// Exchange an archive token for a scoped session.
pub async fn archive_login(state: &AppState, params: &Value) -> model_vault::Result<Value> {
    let token = require_str_param(params, "token", "token")?;

    let archive = state.registry.archive_login(&token)?;
    let session = state.sessions.issue(Principal::for_archive(&archive)).await;

    Ok(json!({
        "token": session,
        "archive": archive,
    }))
}
