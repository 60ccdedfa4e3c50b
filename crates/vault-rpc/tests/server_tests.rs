//! Integration tests for the vault-rpc server.
//!
//! Each test starts the binary against a fresh data root and drives it over
//! HTTP: JSON-RPC calls, multipart uploads and file downloads.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncBufReadExt;

/// Make an RPC call and return the full JSON-RPC payload.
async fn rpc_call_raw(port: u16, token: Option<&str>, method: &str, params: Value) -> Value {
    let client = reqwest::Client::new();
    let mut request = client
        .post(format!("http://127.0.0.1:{}/rpc", port))
        .json(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .timeout(Duration::from_secs(10));
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    request
        .send()
        .await
        .expect("RPC request failed")
        .json::<Value>()
        .await
        .expect("RPC response was not JSON")
}

/// Make an RPC call, returning the result or the error object.
async fn rpc_call(
    port: u16,
    token: Option<&str>,
    method: &str,
    params: Value,
) -> Result<Value, Value> {
    let payload = rpc_call_raw(port, token, method, params).await;
    match payload.get("error") {
        Some(error) => Err(error.clone()),
        None => Ok(payload.get("result").cloned().unwrap_or(Value::Null)),
    }
}

fn error_code(error: &Value) -> i64 {
    error.get("code").and_then(|v| v.as_i64()).unwrap_or(0)
}

/// Log in and return the session token.
async fn login(port: u16, email: &str, password: &str) -> String {
    let result = rpc_call(port, None, "login", json!({"email": email, "password": password}))
        .await
        .expect("login failed");
    result["token"].as_str().expect("missing token").to_string()
}

/// Upload `size` bytes as `file_name` through the multipart endpoint.
async fn upload(
    port: u16,
    token: &str,
    name: &str,
    file_name: &str,
    size: usize,
    archive_id: Option<u64>,
) -> reqwest::Response {
    let file = reqwest::multipart::Part::bytes(vec![0x47; size]).file_name(file_name.to_string());
    let mut form = reqwest::multipart::Form::new()
        .text("name", name.to_string())
        .text("description", "uploaded in a test")
        .part("file", file);
    if let Some(id) = archive_id {
        form = form.text("archive_id", id.to_string());
    }

    reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/api/models/upload", port))
        .bearer_auth(token)
        .multipart(form)
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .expect("upload request failed")
}

async fn get(port: u16, path: &str, token: Option<&str>) -> reqwest::Response {
    let mut request = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}{}", port, path))
        .timeout(Duration::from_secs(10));
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    request.send().await.expect("GET request failed")
}

/// Check health endpoint.
async fn check_health(port: u16) -> bool {
    let client = reqwest::Client::new();
    if let Ok(response) = client
        .get(format!("http://127.0.0.1:{}/health", port))
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        if let Ok(json) = response.json::<Value>().await {
            return json.get("status").and_then(|v| v.as_str()) == Some("ok");
        }
    }
    false
}

/// Wait for server to be ready.
async fn wait_for_server(port: u16, timeout_secs: u64) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_secs(timeout_secs) {
        if check_health(port).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

struct VaultServerHandle {
    child: tokio::process::Child,
    port: u16,
    stdout_drain: Option<tokio::task::JoinHandle<()>>,
}

impl VaultServerHandle {
    async fn stop(mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

impl Drop for VaultServerHandle {
    fn drop(&mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.start_kill();
    }
}

/// Start the server binary over `data_root` and wait until `/health` is ready.
async fn start_vault_server(data_root: &Path) -> Result<VaultServerHandle, String> {
    let binary = PathBuf::from(env!("CARGO_BIN_EXE_vault-rpc"));

    let mut child = tokio::process::Command::new(&binary)
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg("0")
        .arg("--data-root")
        .arg(data_root)
        .arg("--db-path")
        .arg(data_root.join("3d_db.db"))
        .arg("--bcrypt-cost")
        .arg("4")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| format!("failed to spawn vault-rpc: {e}"))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| "failed to capture stdout".to_string())?;
    let mut lines = tokio::io::BufReader::new(stdout).lines();

    let mut discovered_port: Option<u16> = None;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(250), lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                if let Some(value) = line.strip_prefix("VAULT_PORT=") {
                    let parsed = value
                        .trim()
                        .parse::<u16>()
                        .map_err(|e| format!("invalid VAULT_PORT value '{value}': {e}"))?;
                    discovered_port = Some(parsed);
                    break;
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(err)) => return Err(format!("failed to read vault-rpc stdout: {err}")),
            Err(_) => continue,
        }
    }

    let port =
        discovered_port.ok_or_else(|| "VAULT_PORT line not emitted by vault-rpc".to_string())?;
    if !wait_for_server(port, 15).await {
        return Err(format!("vault-rpc failed health check on port {port}"));
    }

    let stdout_drain =
        tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

    Ok(VaultServerHandle {
        child,
        port,
        stdout_drain: Some(stdout_drain),
    })
}

// =============================================================================
// Accounts
// =============================================================================

#[tokio::test]
async fn test_health_and_unknown_method() {
    let temp_dir = TempDir::new().unwrap();
    let server = start_vault_server(temp_dir.path()).await.unwrap();

    let result = rpc_call(server.port, None, "health_check", json!({})).await.unwrap();
    assert_eq!(result["status"], "ok");

    let error = rpc_call(server.port, None, "no_such_method", json!({}))
        .await
        .unwrap_err();
    assert_eq!(error_code(&error), -32603);

    server.stop().await;
}

#[tokio::test]
async fn test_register_login_profile() {
    let temp_dir = TempDir::new().unwrap();
    let server = start_vault_server(temp_dir.path()).await.unwrap();
    let port = server.port;

    let registered = rpc_call(
        port,
        None,
        "register",
        json!({"email": "new@test.com", "password": "secret1"}),
    )
    .await
    .unwrap();
    assert_eq!(registered["success"], true);
    assert_eq!(registered["data"]["role"], "user");
    assert_eq!(registered["data"]["id"], 3);

    let duplicate = rpc_call(
        port,
        None,
        "register",
        json!({"email": "new@test.com", "password": "secret1"}),
    )
    .await
    .unwrap_err();
    assert_eq!(error_code(&duplicate), -32008);

    let short = rpc_call(
        port,
        None,
        "register",
        json!({"email": "short@test.com", "password": "123"}),
    )
    .await
    .unwrap_err();
    assert_eq!(error_code(&short), -32005);

    let bad_login = rpc_call(
        port,
        None,
        "login",
        json!({"email": "new@test.com", "password": "wrong-password"}),
    )
    .await
    .unwrap_err();
    assert_eq!(error_code(&bad_login), -32007);

    let token = login(port, "new@test.com", "secret1").await;
    let profile = rpc_call(port, Some(&token), "get_profile", json!({}))
        .await
        .unwrap();
    assert_eq!(profile["data"]["email"], "new@test.com");

    let anonymous = rpc_call(port, None, "get_profile", json!({}))
        .await
        .unwrap_err();
    assert_eq!(error_code(&anonymous), -32007);

    server.stop().await;
}

// =============================================================================
// Models
// =============================================================================

#[tokio::test]
async fn test_upload_serve_and_delete() {
    let temp_dir = TempDir::new().unwrap();
    let server = start_vault_server(temp_dir.path()).await.unwrap();
    let port = server.port;
    let admin = login(port, "admin@test.com", "admin123").await;

    let response = upload(port, &admin, "Scene", "scene.glb", 512, None).await;
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    let model = &body["data"];
    assert_eq!(model["file_size"], 512);
    assert_eq!(model["uploaded_by"], "admin@test.com");

    let file_url = model["file_url"].as_str().unwrap().to_string();
    assert!(file_url.starts_with("/uploads/"));
    let served = get(port, &file_url, None).await;
    assert_eq!(served.status(), reqwest::StatusCode::OK);
    assert_eq!(served.bytes().await.unwrap().len(), 512);

    let listed = rpc_call(port, None, "list_models", json!({})).await.unwrap();
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let id = model["id"].as_u64().unwrap();
    rpc_call(port, Some(&admin), "delete_model", json!({"id": id}))
        .await
        .unwrap();
    let listed = rpc_call(port, None, "list_models", json!({})).await.unwrap();
    assert!(listed["data"].as_array().unwrap().is_empty());
    assert_eq!(
        get(port, &file_url, None).await.status(),
        reqwest::StatusCode::NOT_FOUND
    );

    let missing = rpc_call(port, Some(&admin), "delete_model", json!({"id": id}))
        .await
        .unwrap_err();
    assert_eq!(error_code(&missing), -32002);

    server.stop().await;
}

#[tokio::test]
async fn test_upload_rejections() {
    let temp_dir = TempDir::new().unwrap();
    let server = start_vault_server(temp_dir.path()).await.unwrap();
    let port = server.port;

    let user = login(port, "user@test.com", "password123").await;
    let response = upload(port, &user, "Scene", "scene.glb", 8, None).await;
    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);

    let admin = login(port, "admin@test.com", "admin123").await;
    let response = upload(port, &admin, "Scene", "scene.obj", 8, None).await;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);

    let response = upload(port, &admin, "Scene", "scene.glb", 8, Some(99)).await;
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let response = upload(port, "not-a-session", "Scene", "scene.glb", 8, None).await;
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

    server.stop().await;
}

// =============================================================================
// Archives
// =============================================================================

#[tokio::test]
async fn test_archive_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let server = start_vault_server(temp_dir.path()).await.unwrap();
    let port = server.port;
    let admin = login(port, "admin@test.com", "admin123").await;

    let created = rpc_call(port, Some(&admin), "create_archive", json!({"name": "Lab A"}))
        .await
        .unwrap();
    let archive_id = created["data"]["id"].as_u64().unwrap();
    let archive_token = created["data"]["token"].as_str().unwrap().to_string();
    assert_eq!(created["data"]["name"], "Lab_A");
    assert!(temp_dir.path().join("model_archives/Lab_A/token.txt").exists());

    let response = upload(port, &admin, "Scene", "scene.glb", 512, Some(archive_id)).await;
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    let file_url = body["data"]["file_url"].as_str().unwrap().to_string();
    assert!(file_url.starts_with("/api/archives/Lab_A/files/"));
    upload(port, &admin, "Loose", "loose.glb", 8, None).await;

    let archives = rpc_call(port, Some(&admin), "list_archives", json!({}))
        .await
        .unwrap();
    assert_eq!(archives["data"][0]["count"], 1);
    assert_eq!(archives["data"][0]["token"], archive_token.as_str());

    // Archive session: scoped listing and file access
    let opened = rpc_call(port, None, "archive_login", json!({"token": archive_token}))
        .await
        .unwrap();
    assert_eq!(opened["archive"]["name"], "Lab_A");
    let session = opened["token"].as_str().unwrap().to_string();

    let scoped = rpc_call(port, Some(&session), "list_models", json!({}))
        .await
        .unwrap();
    let scoped = scoped["data"].as_array().unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0]["archive_id"], archive_id);

    let served = get(port, &file_url, Some(&session)).await;
    assert_eq!(served.status(), reqwest::StatusCode::OK);
    assert_eq!(served.bytes().await.unwrap().len(), 512);

    assert_eq!(
        get(port, &file_url, None).await.status(),
        reqwest::StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        get(port, &file_url, Some(&admin)).await.status(),
        reqwest::StatusCode::FORBIDDEN
    );

    let bad_login = rpc_call(port, None, "archive_login", json!({"token": "nope"}))
        .await
        .unwrap_err();
    assert_eq!(error_code(&bad_login), -32007);

    // Delete cascades and ends the archive session
    let deleted = rpc_call(port, Some(&admin), "delete_archive", json!({"id": archive_id}))
        .await
        .unwrap();
    assert_eq!(deleted["data"]["models_removed"], 1);
    assert!(!temp_dir.path().join("model_archives/Lab_A").exists());

    let all = rpc_call(port, None, "list_models", json!({})).await.unwrap();
    assert_eq!(all["data"].as_array().unwrap().len(), 1);
    assert_eq!(
        get(port, &file_url, Some(&session)).await.status(),
        reqwest::StatusCode::UNAUTHORIZED
    );

    server.stop().await;
}

#[tokio::test]
async fn test_archives_survive_restart() {
    let temp_dir = TempDir::new().unwrap();

    let (archive_token, file_url) = {
        let server = start_vault_server(temp_dir.path()).await.unwrap();
        let port = server.port;
        let admin = login(port, "admin@test.com", "admin123").await;

        let created = rpc_call(port, Some(&admin), "create_archive", json!({}))
            .await
            .unwrap();
        assert!(created["data"]["name"]
            .as_str()
            .unwrap()
            .starts_with("ARSIP_"));
        let archive_id = created["data"]["id"].as_u64().unwrap();

        let response = upload(port, &admin, "Scene", "scene.gltf", 64, Some(archive_id)).await;
        let body: Value = response.json().await.unwrap();

        server.stop().await;
        (
            created["data"]["token"].as_str().unwrap().to_string(),
            body["data"]["file_url"].as_str().unwrap().to_string(),
        )
    };

    let server = start_vault_server(temp_dir.path()).await.unwrap();
    let port = server.port;

    let opened = rpc_call(port, None, "archive_login", json!({"token": archive_token}))
        .await
        .unwrap();
    let session = opened["token"].as_str().unwrap().to_string();

    let scoped = rpc_call(port, Some(&session), "list_models", json!({}))
        .await
        .unwrap();
    assert_eq!(scoped["data"][0]["file_url"], file_url.as_str());
    assert_eq!(scoped["data"][0]["uploaded_by"], "admin@test.com");

    server.stop().await;
}
