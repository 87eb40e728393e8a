//! Common test utilities for in-process API testing.
//!
//! The fixture builds the full router over real SQLite stores in a temp
//! directory, so every request exercises the same stack the binary serves.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use brt_core::{
    create_audit_system, create_authenticator, create_mirror, load_config_from_str, AuditHandle,
    AuditStore, Authenticator, CounterStore, InMemoryCounterStore, RateLimitPolicy, RateLimiter,
    SqliteAuditStore, SqliteRateLimitLog, SqliteTicketStore, TicketService,
};
use brt_server::api::create_router;
use brt_server::state::AppState;

/// API key accepted for `alice` when the fixture uses key auth.
pub const ALICE_KEY: &str = "alice-key";
/// API key accepted for `bob` when the fixture uses key auth.
pub const BOB_KEY: &str = "bob-key";

/// In-process server over a throwaway database.
///
/// ```rust,ignore
/// let fixture = TestFixture::new().await;
/// let response = fixture.post("/api/v1/brts", json!({ "amount": "50.00" })).await;
/// assert_eq!(response.status, StatusCode::CREATED);
/// ```
pub struct TestFixture {
    pub router: Router,
    pub audit_store: Arc<dyn AuditStore>,
    /// Kept so the writer's channel stays open for the fixture's lifetime.
    pub audit_handle: AuditHandle,
    /// Temporary directory holding the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Require `ALICE_KEY`/`BOB_KEY` instead of accepting everyone.
    pub api_keys: bool,
    pub rate_limit_enabled: bool,
    pub max_attempts: u32,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            api_keys: false,
            rate_limit_enabled: true,
            // High enough that ordinary tests never trip it.
            max_attempts: 1000,
        }
    }
}

impl TestConfig {
    pub fn with_api_keys() -> Self {
        Self {
            api_keys: true,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }
}

impl TestFixture {
    /// Create a new test fixture with anonymous access.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let auth = if test_config.api_keys {
            format!(
                "[auth]\nmethod = \"api_key\"\n[auth.api_keys]\n\"{}\" = \"alice\"\n\"{}\" = \"bob\"\n",
                ALICE_KEY, BOB_KEY
            )
        } else {
            "[auth]\nmethod = \"none\"\n".to_string()
        };
        let toml = format!(
            "{}\n[database]\npath = {:?}\n\n[rate_limit]\nenabled = {}\nmax_attempts = {}\ndecay_secs = 60\n",
            auth,
            db_path.display().to_string(),
            test_config.rate_limit_enabled,
            test_config.max_attempts,
        );
        let config = load_config_from_str(&toml).expect("Failed to parse test config");

        let authenticator: Arc<dyn Authenticator> = Arc::from(
            create_authenticator(&config.auth).expect("Failed to create authenticator"),
        );
        let audit_store: Arc<dyn AuditStore> =
            Arc::new(SqliteAuditStore::new(&db_path).expect("Failed to create audit store"));
        let ticket_store =
            Arc::new(SqliteTicketStore::new(&db_path).expect("Failed to create ticket store"));
        let rate_limit_log =
            Arc::new(SqliteRateLimitLog::new(&db_path).expect("Failed to create rate limit log"));
        let (mirror, mirror_writer) = create_mirror(rate_limit_log, 100);
        tokio::spawn(mirror_writer.run());

        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let tickets = TicketService::new(ticket_store, &config.tickets)
            .expect("Failed to create ticket service")
            .with_audit(audit_handle.clone());
        let counters: Arc<dyn CounterStore> = Arc::new(InMemoryCounterStore::new());
        let rate_limiter = RateLimiter::new(counters, RateLimitPolicy::from(&config.rate_limit))
            .with_mirror(mirror)
            .with_audit(audit_handle.clone());

        let state = Arc::new(AppState::new(
            config,
            authenticator,
            Arc::clone(&audit_store),
            tickets,
            rate_limiter,
        ));

        Self {
            router: create_router(state),
            audit_store,
            audit_handle,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, &[]).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), &[]).await
    }

    /// Send a PATCH request with JSON body.
    pub async fn patch(&self, path: &str, body: Value) -> TestResponse {
        self.request("PATCH", path, Some(body), &[]).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body), &[]).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None, &[]).await
    }

    /// Send a request authenticated with an API key.
    pub async fn as_key(
        &self,
        key: &str,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> TestResponse {
        let bearer = format!("Bearer {}", key);
        self.request(method, path, body, &[("Authorization", bearer.as_str())])
            .await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str, content_type: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Send a request with extra headers.
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            request_builder = request_builder.header(*name, *value);
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).into()))
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Poll the audit endpoint until `event_type` has at least `count` rows.
    pub async fn wait_for_audit(&self, event_type: &str, count: i64) -> TestResponse {
        let path = format!("/api/v1/audit?event_type={}", event_type);
        let mut response = self.get(&path).await;
        for _ in 0..50 {
            if response.body["total"].as_i64().unwrap_or(0) >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            response = self.get(&path).await;
        }
        response
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
