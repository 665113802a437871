//! HTTP-level integration tests for the wire protocol (C6), driven through
//! `tower::ServiceExt::oneshot` rather than a bound socket.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use statebackend_core::crypt::aes::AesProvider;
use statebackend_core::crypt::IdentityProvider;
use statebackend_core::storage::git_client::{GitClientConfig, GitStorageClient};
use statebackend_core::storage::StorageClient;
use statebackend_server::auth::BasicAuthConfig;
use statebackend_server::{build_router, AppState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tower::ServiceExt;

fn init_bare_repo_with_commit() -> TempDir {
    let bare_dir = TempDir::new().expect("bare tempdir");
    git2::Repository::init_bare(bare_dir.path()).expect("init bare");

    let work_dir = TempDir::new().expect("work tempdir");
    let mut opts = git2::RepositoryInitOptions::new();
    opts.initial_head("master");
    let work_repo = git2::Repository::init_opts(work_dir.path(), &opts).expect("init work repo");

    std::fs::write(work_dir.path().join("README.md"), b"hello\n").expect("write readme");
    let mut index = work_repo.index().expect("index");
    index.add_path(std::path::Path::new("README.md")).expect("add");
    index.write().expect("write index");
    let tree_id = index.write_tree().expect("write tree");
    let tree = work_repo.find_tree(tree_id).expect("find tree");
    let sig = git2::Signature::now("test", "test@example.com").expect("sig");
    work_repo
        .commit(Some("HEAD"), &sig, &sig, "initial commit", &tree, &[])
        .expect("commit");

    let mut remote = work_repo
        .remote("origin", bare_dir.path().to_str().expect("utf8 path"))
        .expect("add remote");
    remote
        .push(&["refs/heads/master:refs/heads/master"], None)
        .expect("push initial commit");

    bare_dir
}

fn app_state(auth: Option<BasicAuthConfig>) -> AppState {
    let mut registry: HashMap<String, Arc<dyn StorageClient>> = HashMap::new();
    registry.insert(
        "git".to_string(),
        Arc::new(GitStorageClient::new(GitClientConfig::default())),
    );

    AppState {
        registry: Arc::new(registry),
        encryption: Arc::new(IdentityProvider),
        auth: auth.map(Arc::new),
        default_backend_type: "git".to_string(),
        start_time: Instant::now(),
    }
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes()
        .to_vec()
}

#[tokio::test]
async fn lock_update_get_unlock_round_trip() {
    let bare = init_bare_repo_with_commit();
    let repository = bare.path().to_str().expect("utf8").to_string();
    let app = build_router(app_state(None));

    let uri = format!(
        "/?type=git&repository={repository}&ref=master&state=env/prod.tfstate&ID=L1"
    );

    let lock_body = br#"{"ID":"L1","Who":"alice@h"}"#.to_vec();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("LOCK")
                .uri(&uri)
                .body(Body::from(lock_body))
                .expect("build request"),
        )
        .await
        .expect("lock request");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&uri)
                .body(Body::from(br#"{"v":1}"#.to_vec()))
                .expect("build request"),
        )
        .await
        .expect("update request");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(&uri)
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("get request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, br#"{"v":1}"#.to_vec());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("UNLOCK")
                .uri(&uri)
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("unlock request");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn get_on_missing_state_returns_204() {
    let bare = init_bare_repo_with_commit();
    let repository = bare.path().to_str().expect("utf8").to_string();
    let app = build_router(app_state(None));

    let uri = format!("/?type=git&repository={repository}&ref=master&state=env/missing.tfstate");
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(&uri)
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("get request");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn conflicting_lock_returns_409_with_winners_bytes() {
    let bare = init_bare_repo_with_commit();
    let repository = bare.path().to_str().expect("utf8").to_string();
    let app = build_router(app_state(None));

    let uri_a = format!(
        "/?type=git&repository={repository}&ref=master&state=env/prod.tfstate&ID=A"
    );
    let uri_b = format!(
        "/?type=git&repository={repository}&ref=master&state=env/prod.tfstate&ID=B"
    );

    let lock_a = br#"{"ID":"A","Who":"alice@h"}"#.to_vec();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("LOCK")
                .uri(&uri_a)
                .body(Body::from(lock_a.clone()))
                .expect("build request"),
        )
        .await
        .expect("first lock");
    assert_eq!(response.status(), StatusCode::OK);

    let lock_b = br#"{"ID":"B","Who":"bob@h"}"#.to_vec();
    let response = app
        .oneshot(
            Request::builder()
                .method("LOCK")
                .uri(&uri_b)
                .body(Body::from(lock_b))
                .expect("build request"),
        )
        .await
        .expect("second lock");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_bytes(response).await, lock_a);
}

#[tokio::test]
async fn encrypted_update_returns_raw_ciphertext_to_a_server_with_no_passphrase() {
    let bare = init_bare_repo_with_commit();
    let repository = bare.path().to_str().expect("utf8").to_string();
    let uri = format!("/?type=git&repository={repository}&ref=master&state=env/prod.tfstate");

    let mut encrypted_registry: HashMap<String, Arc<dyn StorageClient>> = HashMap::new();
    encrypted_registry.insert(
        "git".to_string(),
        Arc::new(GitStorageClient::new(GitClientConfig::default())),
    );
    let encrypted_app = build_router(AppState {
        registry: Arc::new(encrypted_registry),
        encryption: Arc::new(AesProvider::new(Some("correct horse battery staple".to_string()))),
        auth: None,
        default_backend_type: "git".to_string(),
        start_time: Instant::now(),
    });

    let response = encrypted_app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&uri)
                .body(Body::from(br#"{"v":1}"#.to_vec()))
                .expect("build request"),
        )
        .await
        .expect("update request");
    assert_eq!(response.status(), StatusCode::OK);

    let response = encrypted_app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(&uri)
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("get request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, br#"{"v":1}"#.to_vec());

    // A second server instance, pointed at the same repository but with no
    // passphrase configured, reads the raw ciphertext back unchanged rather
    // than failing.
    let plain_app = build_router(app_state(None));
    let response = plain_app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(&uri)
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("get request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_ne!(body_bytes(response).await, br#"{"v":1}"#.to_vec());
}

#[tokio::test]
async fn missing_credentials_return_401_when_auth_configured() {
    let bare = init_bare_repo_with_commit();
    let repository = bare.path().to_str().expect("utf8").to_string();
    let auth = BasicAuthConfig {
        username: "ops".to_string(),
        password: "hunter2".to_string(),
        realm: "statebackend-git".to_string(),
    };
    let app = build_router(app_state(Some(auth)));

    let uri = format!("/?type=git&repository={repository}&ref=master&state=env/prod.tfstate");
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(&uri)
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("get request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(axum::http::header::WWW_AUTHENTICATE));
}
