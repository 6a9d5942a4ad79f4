//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use custody_core::config::{AppConfig, MetadataConfig, StorageConfig};
use custody_metadata::{MetadataStore, SqliteStore};
use custody_server::{AppState, create_router};
use custody_storage::{FilesystemBackend, ObjectStore};
use custody_token::{Ed25519TokenMaker, TokenMaker};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

/// Password used for every account created through [`TestServer::create_user`].
#[allow(dead_code)]
pub const TEST_PASSWORD: &str = "correct horse battery staple";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let (config, storage, metadata) = Self::default_stores(&temp_dir).await;
        let mut config = config;
        modifier(&mut config);
        Self::assemble(temp_dir, config, storage, metadata)
    }

    /// Create a test server whose stores are wrapped before use.
    ///
    /// The wrapper receives the real SQLite and filesystem stores and returns
    /// the ones the server should see.
    pub async fn with_stores<C, F>(modifier: C, wrap: F) -> Self
    where
        C: FnOnce(&mut AppConfig),
        F: FnOnce(
            Arc<dyn MetadataStore>,
            Arc<dyn ObjectStore>,
        ) -> (Arc<dyn MetadataStore>, Arc<dyn ObjectStore>),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let (mut config, storage, metadata) = Self::default_stores(&temp_dir).await;
        modifier(&mut config);
        let (metadata, storage) = wrap(metadata, storage);
        Self::assemble(temp_dir, config, storage, metadata)
    }

    async fn default_stores(
        temp_dir: &TempDir,
    ) -> (AppConfig, Arc<dyn ObjectStore>, Arc<dyn MetadataStore>) {
        let storage_path = temp_dir.path().join("storage");
        std::fs::create_dir_all(&storage_path).expect("Failed to create storage directory");
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        let config = AppConfig {
            storage: StorageConfig::Filesystem { path: storage_path },
            metadata: MetadataConfig::Sqlite {
                path: db_path,
                query_timeout_secs: None,
            },
            ..AppConfig::for_testing()
        };

        (config, storage, metadata)
    }

    fn assemble(
        temp_dir: TempDir,
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let tokens: Arc<dyn TokenMaker> = Arc::new(Ed25519TokenMaker::generate());
        let state = AppState::new(config, storage, metadata, tokens);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Get access to the underlying blob store.
    pub fn storage(&self) -> Arc<dyn ObjectStore> {
        self.state.storage.clone()
    }

    /// Number of blobs in the filesystem store.
    pub fn blob_count(&self) -> usize {
        super::storage::count_blobs(&self._temp_dir.path().join("storage"))
    }

    /// Create a user with [`TEST_PASSWORD`].
    pub async fn create_user(&self, username: &str) {
        self.state
            .coordinator
            .create_user(username, TEST_PASSWORD)
            .await
            .expect("Failed to create test user");
    }

    /// Create a user and log in through the HTTP API.
    pub async fn login_new_user(&self, username: &str) -> String {
        self.create_user(username).await;
        let (status, body) = json_request(
            &self.router,
            "POST",
            "/v1/tokens/authentication",
            Some(serde_json::json!({ "username": username, "password": TEST_PASSWORD })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "login failed: {body}");
        body["authentication_token"]["token"]
            .as_str()
            .expect("token missing from login response")
            .to_string()
    }

    /// Issue a token directly, bypassing the login endpoint.
    pub fn issue_token(&self, username: &str, lifetime: Duration) -> String {
        self.state
            .tokens
            .create_token(username, lifetime)
            .expect("Failed to issue test token")
            .0
    }
}

/// Helper to make JSON requests.
#[allow(dead_code)]
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    auth_token: Option<&str>,
) -> (StatusCode, Value) {
    let body = body.map(|v| Body::from(serde_json::to_vec(&v).unwrap()));
    raw_request(router, method, uri, body, auth_token).await
}

/// Send a request with an arbitrary body and decode a JSON response.
#[allow(dead_code)]
pub async fn raw_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Body>,
    auth_token: Option<&str>,
) -> (StatusCode, Value) {
    let (status, bytes) = send(router, method, uri, body, auth_token).await;
    let json: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// Send a request and return the raw response body.
#[allow(dead_code)]
pub async fn send(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Body>,
    auth_token: Option<&str>,
) -> (StatusCode, bytes::Bytes) {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = auth_token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let body = match body {
        Some(body) => {
            builder = builder.header("Content-Type", "application/json");
            body
        }
        None => Body::empty(),
    };

    let request = builder.body(body).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    (status, body_bytes)
}
