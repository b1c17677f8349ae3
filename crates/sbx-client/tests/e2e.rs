//! End-to-end: ClientVault against a real sbxd router on 127.0.0.1:0

use secrecy::SecretString;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use sbx_client::{ClientVault, RecordListing, SessionState, TokenFile};
use sbx_core::config::{ClientConfig, StoreBackendKind};
use sbx_core::types::{Credentials, RecordInput, RecordType, RecordUpdateInput};
use sbx_core::SbxError;
use sbx_crypto::{KeyHierarchy, MasterKey, PasswordHasher, ScryptParams};
use sbxd::http::{router, AppState};
use sbxd::logging::LogControl;
use sbxd::metrics::Metrics;
use sbxd::repo::MemoryRepository;
use sbxd::{SessionTokenManager, VaultService};

async fn spawn_server() -> String {
    let repo = Arc::new(MemoryRepository::new());
    let service = VaultService::new(
        repo.clone(),
        repo,
        KeyHierarchy::new(MasterKey::from_bytes([5u8; 32])),
        PasswordHasher::with_params(ScryptParams::new(1024, 8, 1).unwrap()),
        SessionTokenManager::new(
            &SecretString::from("e2e-secret".to_string()),
            Duration::from_secs(300),
        ),
    );
    let app = router(AppState {
        service: Arc::new(service),
        metrics: Metrics::new(),
        log: LogControl::detached("info"),
        cookie_secure: false,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Accepts any login, then fails every record listing with a 500.
async fn spawn_failing_listing_server() -> String {
    use axum::http::{header::SET_COOKIE, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};

    let user_key = sbx_crypto::generate_user_key().to_base64().as_str().to_owned();
    let app = Router::new()
        .route(
            "/api/user/login",
            post(move || {
                let user_key = user_key.clone();
                async move {
                    (
                        [(SET_COOKIE, "auth_token=header.claims.sig; Path=/")],
                        Json(json!({ "user_key": user_key })),
                    )
                }
            }),
        )
        .route(
            "/api/records",
            get(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "status": 500,
                        "code": "internal",
                        "message": "database unavailable",
                    })),
                )
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn vault(server_url: &str, dir: &Path) -> ClientVault {
    let config = ClientConfig {
        server_url: server_url.to_string(),
        data_dir: dir.to_path_buf(),
        request_timeout_secs: 5,
        store_backend: StoreBackendKind::Json,
    };
    ClientVault::open(&config).unwrap()
}

fn creds(login: &str, password: &str) -> Credentials {
    Credentials::new(login, SecretString::from(password.to_string()))
}

fn note(metadata: &str, data: serde_json::Value) -> RecordInput {
    RecordInput {
        kind: RecordType::Text,
        metadata: metadata.to_string(),
        data,
    }
}

#[tokio::test]
async fn test_scenario_register_then_login() {
    let url = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let mut client = vault(&url, dir.path());
    assert_eq!(client.state().unwrap(), SessionState::LoggedOut);

    client.register(creds("alice", "pw1")).await.unwrap();
    assert_eq!(client.state().unwrap(), SessionState::LoggedIn);

    client.logout().await.unwrap();
    client.login(creds("alice", "pw1")).await.unwrap();
    assert_eq!(client.state().unwrap(), SessionState::LoggedIn);
    assert!(client.status().unwrap().user_key_cached);

    let wrong = client.login(creds("alice", "wrong")).await;
    assert!(matches!(wrong, Err(SbxError::IncorrectPassword)));
    assert_eq!(client.state().unwrap(), SessionState::LoggedOut);
}

#[tokio::test]
async fn test_duplicate_registration() {
    let url = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let mut client = vault(&url, dir.path());
    client.register(creds("alice", "pw1")).await.unwrap();

    let again = client.register(creds("alice", "pw2")).await;
    assert!(matches!(again, Err(SbxError::AlreadyExists(_))));
}

#[tokio::test]
async fn test_scenario_add_then_remote_get() {
    let url = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let mut client = vault(&url, dir.path());
    client.register(creds("alice", "pw1")).await.unwrap();

    let id = client.add(note("note", json!("secret"))).await.unwrap();
    let record = client.get(id, true).await.unwrap();
    assert_eq!(record.id, id);
    assert_eq!(record.kind, RecordType::Text);
    assert_eq!(record.metadata, "note");
    assert_eq!(record.data, json!("secret"));

    // Writes do not touch the local cache until a sync.
    assert!(matches!(client.get(id, false).await, Err(SbxError::NotFound(_))));
}

#[tokio::test]
async fn test_scenario_sync_from_second_session() {
    let url = spawn_server().await;
    let first_dir = tempfile::tempdir().unwrap();
    let second_dir = tempfile::tempdir().unwrap();

    let mut first = vault(&url, first_dir.path());
    first.register(creds("alice", "pw1")).await.unwrap();

    let mut second = vault(&url, second_dir.path());
    second.login(creds("alice", "pw1")).await.unwrap();
    let id = second
        .add(note("card pin", json!({"pin": "4321"})))
        .await
        .unwrap();

    assert!(first.list(false).await.unwrap().is_empty());
    assert_eq!(first.sync().await.unwrap(), 1);

    let record = first.get(id, false).await.unwrap();
    assert_eq!(record.metadata, "card pin");
    assert_eq!(record.data, json!({"pin": "4321"}));

    match first.list(false).await.unwrap() {
        RecordListing::Decrypted(records) => assert_eq!(records[0].data, json!({"pin": "4321"})),
        other => panic!("expected local listing, got {other:?}"),
    }

    let cache = std::fs::read_to_string(first_dir.path().join("cache.json")).unwrap();
    assert!(!cache.contains("4321"), "cache holds ciphertext only");
}

#[tokio::test]
async fn test_scenario_delete_not_found() {
    let url = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let mut client = vault(&url, dir.path());
    client.register(creds("alice", "pw1")).await.unwrap();

    assert!(matches!(client.delete(9_999).await, Err(SbxError::NotFound(_))));

    let id = client.add(note("tmp", json!("x"))).await.unwrap();
    client.delete(id).await.unwrap();
    assert!(matches!(client.delete(id).await, Err(SbxError::NotFound(_))));
    assert_eq!(client.state().unwrap(), SessionState::LoggedIn);
}

#[tokio::test]
async fn test_update_metadata_only() {
    let url = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let mut client = vault(&url, dir.path());
    client.register(creds("alice", "pw1")).await.unwrap();
    let id = client.add(note("old", json!("body"))).await.unwrap();

    let empty = client.update(id, RecordUpdateInput::default()).await;
    assert!(matches!(empty, Err(SbxError::NothingToUpdate)));

    client
        .update(
            id,
            RecordUpdateInput {
                metadata: Some("new".into()),
                data: None,
            },
        )
        .await
        .unwrap();
    let record = client.get(id, true).await.unwrap();
    assert_eq!(record.metadata, "new");
    assert_eq!(record.data, json!("body"));
}

#[tokio::test]
async fn test_remote_list_is_sealed() {
    let url = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let mut client = vault(&url, dir.path());
    client.register(creds("alice", "pw1")).await.unwrap();
    client.add(note("n", json!("plaintext-marker"))).await.unwrap();

    match client.list(true).await.unwrap() {
        RecordListing::Sealed(records) => {
            assert_eq!(records.len(), 1);
            assert!(!records[0]
                .data
                .windows(16)
                .any(|w| w == b"plaintext-marker"));
        }
        other => panic!("expected sealed listing, got {other:?}"),
    }
}

#[tokio::test]
async fn test_logged_out_fails_fast() {
    let url = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let mut client = vault(&url, dir.path());

    assert!(matches!(
        client.add(note("n", json!("x"))).await,
        Err(SbxError::Authentication(_))
    ));
    assert!(matches!(client.get(1, false).await, Err(SbxError::Authentication(_))));
    assert!(matches!(client.list(true).await, Err(SbxError::Authentication(_))));
    assert!(matches!(client.sync().await, Err(SbxError::Authentication(_))));
}

#[tokio::test]
async fn test_rejected_token_logs_out() {
    let url = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let mut client = vault(&url, dir.path());
    client.register(creds("alice", "pw1")).await.unwrap();

    TokenFile::new(dir.path())
        .save(&SecretString::from("forged.token.value".to_string()))
        .unwrap();

    let result = client.list(true).await;
    assert!(matches!(result, Err(SbxError::Authentication(_))));
    assert_eq!(client.state().unwrap(), SessionState::LoggedOut);
    assert!(!client.status().unwrap().user_key_cached);
}

#[tokio::test]
async fn test_logout_clears_local_cache() {
    let url = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let mut client = vault(&url, dir.path());
    client.register(creds("alice", "pw1")).await.unwrap();
    client.add(note("n", json!("x"))).await.unwrap();
    client.sync().await.unwrap();
    assert_eq!(client.status().unwrap().cached_records, 1);

    client.logout().await.unwrap();
    let status = client.status().unwrap();
    assert_eq!(status.state, SessionState::LoggedOut);
    assert_eq!(status.cached_records, 0);
    assert!(!status.user_key_cached);
    assert!(!dir.path().join("session.token").exists());
}

#[tokio::test]
async fn test_unreachable_server_keeps_local_reads() {
    let url = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let mut client = vault(&url, dir.path());
        client.register(creds("alice", "pw1")).await.unwrap();
        let id = client.add(note("offline", json!("still here"))).await.unwrap();
        client.sync().await.unwrap();
        id
    };

    let mut offline = vault("http://127.0.0.1:9", dir.path());
    assert!(matches!(offline.sync().await, Err(SbxError::Network(_))));
    assert_eq!(offline.state().unwrap(), SessionState::LoggedIn);
    assert_eq!(offline.get(id, false).await.unwrap().data, json!("still here"));
}

#[tokio::test]
async fn test_login_leaves_no_session_when_listing_fails() {
    let url = spawn_failing_listing_server().await;
    let dir = tempfile::tempdir().unwrap();
    let mut client = vault(&url, dir.path());

    let err = client.login(creds("alice", "pw1")).await.unwrap_err();
    assert!(matches!(err, SbxError::Network(_)), "{err:?}");

    let status = client.status().unwrap();
    assert_eq!(status.state, SessionState::LoggedOut);
    assert!(!status.user_key_cached);
    assert_eq!(status.cached_records, 0);
    assert!(!dir.path().join("session.token").exists());
}
