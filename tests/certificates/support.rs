use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, Response},
    Router,
};
use certplane::{
    auth::TokenService,
    config::{AuthConfig, DatabaseConfig, ProvisioningConfig, ServerConfig},
    domain::Owner,
    jobs::{InProcessJobQueue, JobQueue, JobQueueHandle},
    services::{CertificateService, UnconfiguredIssuer},
    storage::{create_pool, DbPool, SqlxHostRepository, SqlxUserRepository},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tower::ServiceExt;

pub struct TestApp {
    pub pool: DbPool,
    pub owner: Owner,
    pub token: String,
    pub tokens: Arc<TokenService>,
    certificates: Arc<CertificateService>,
    _queue: JobQueueHandle,
}

impl TestApp {
    pub fn router(&self) -> Router {
        certplane::api::build_router(
            self.certificates.clone(),
            self.tokens.clone(),
            &ServerConfig::default(),
        )
    }

    /// Attach a host to a certificate so that it counts as in use.
    pub async fn attach_host(&self, certificate_id: i64) {
        SqlxHostRepository::new(self.pool.clone())
            .create(&["www.example.com".to_string()], Some(certificate_id))
            .await
            .expect("create host");
    }
}

pub async fn setup_test_app() -> TestApp {
    let pool = create_pool(&DatabaseConfig::in_memory()).await.expect("create sqlite pool");

    let owner = SqlxUserRepository::new(pool.clone())
        .create("alice", "alice@example.com")
        .await
        .expect("seed user");

    let (queue, handle) = InProcessJobQueue::start(&ProvisioningConfig::default());
    let queue: Arc<dyn JobQueue> = Arc::new(queue);
    let certificates =
        Arc::new(CertificateService::sqlite(pool.clone(), queue, Arc::new(UnconfiguredIssuer)));

    let tokens = Arc::new(TokenService::new(&AuthConfig::default()));
    let token = tokens.issue(owner.id).expect("issue token");

    TestApp { pool, owner, token, tokens, certificates, _queue: handle }
}

pub async fn send_request(
    app: &TestApp,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let bytes = body.map(|json| serde_json::to_vec(&json).expect("serialize body"));
    send_raw(app, method, path, token, bytes).await
}

pub async fn send_raw(
    app: &TestApp,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: Option<Vec<u8>>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let request = match body {
        Some(bytes) => builder
            .header("content-type", "application/json")
            .body(Body::from(bytes))
            .expect("build request"),
        None => builder.body(Body::empty()).expect("build request"),
    };

    app.router().oneshot(request).await.expect("request")
}

pub async fn read_json<T: DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

/// Create a custom certificate through the API and return its id.
pub async fn create_custom(app: &TestApp, name: &str) -> i64 {
    let response = send_request(
        app,
        Method::POST,
        "/api/v1/certificates",
        Some(&app.token),
        Some(serde_json::json!({ "type": "custom", "name": name })),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let body: Value = read_json(response).await;
    body["id"].as_i64().expect("certificate id")
}
