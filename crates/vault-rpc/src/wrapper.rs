//! Response wrapping for front-end compatibility.
//!
//! Browser clients expect every successful response as
//! `{success: true, message: string, data: ...}`. Login methods are the
//! exception: their token sits next to `success` rather than under `data`.

use serde_json::{json, Map, Value};

/// Human-readable message for a successful call.
fn message_for(method: &str) -> &'static str {
    match method {
        "register" => "User registered successfully",
        "login" | "archive_login" => "Login successful",
        "get_profile" => "User profile",
        "upload_model" => "Model uploaded successfully",
        "list_models" => "Models retrieved successfully",
        "delete_model" => "Model deleted successfully",
        "create_archive" => "Archive created",
        "list_archives" => "Archives retrieved",
        "delete_archive" => "Archive deleted",
        _ => "OK",
    }
}

/// Wrap a handler result in the envelope the front end expects.
pub fn wrap_response(method: &str, result: Value) -> Value {
    let message = message_for(method);

    match method {
        // Flattened: {success, message, token, ...}
        "login" | "archive_login" => {
            let mut envelope = match result {
                Value::Object(fields) => fields,
                other => {
                    let mut fields = Map::new();
                    fields.insert("data".to_string(), other);
                    fields
                }
            };
            envelope.insert("success".to_string(), json!(true));
            envelope.insert("message".to_string(), json!(message));
            Value::Object(envelope)
        }

        // Lists never come back as null
        "list_models" | "list_archives" => {
            json!({
                "success": true,
                "message": message,
                "data": if result.is_null() { json!([]) } else { result }
            })
        }

        _ => {
            json!({
                "success": true,
                "message": message,
                "data": result
            })
        }
    }
}
