//! Model listing and deletion handlers.
//!
//! Uploads arrive as multipart bodies and are handled in `crate::files`.

use super::{get_id_param, require_caller, require_id_param};
use crate::server::AppState;
use model_vault::Principal;
use serde_json::{json, Value};

/// List models. Anonymous callers see everything; archive sessions only
/// ever see their own archive.
pub async fn list_models(
    state: &AppState,
    caller: Option<&Principal>,
    params: &Value,
) -> model_vault::Result<Value> {
    let archive_filter = get_id_param(params, "archive_id", "archiveId")?;
    let models = state.registry.list_models(caller, archive_filter);
    Ok(serde_json::to_value(models)?)
}

pub async fn delete_model(
    state: &AppState,
    caller: Option<&Principal>,
    params: &Value,
) -> model_vault::Result<Value> {
    let caller = require_caller(caller)?;
    let id = require_id_param(params, "id", "id")?;

    state.registry.delete_model(caller, id).await?;
    Ok(json!({ "id": id }))
}
