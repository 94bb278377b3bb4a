//! Common test utilities for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt;

use tsm_exporter::{create_router, AppState, CollectorRegistry, Config, QueryError, QueryExecutor, Target};

enum Reply {
    Output(String),
    Timeout,
}

/// Executor answering queries by the first registered fragment they contain
#[derive(Default)]
pub struct ScriptedExecutor {
    replies: Vec<(String, Reply)>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, fragment: &str, output: &str) -> Self {
        self.replies.push((fragment.to_string(), Reply::Output(output.to_string())));
        self
    }

    pub fn timeout(mut self, fragment: &str) -> Self {
        self.replies.push((fragment.to_string(), Reply::Timeout));
        self
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn query(&self, _target: &Target, query: &str) -> Result<String, QueryError> {
        match self.replies.iter().find(|(fragment, _)| query.contains(fragment.as_str())) {
            Some((_, Reply::Output(out))) => Ok(out.clone()),
            Some((_, Reply::Timeout)) => Err(QueryError::Timeout {
                timeout: std::time::Duration::from_secs(5),
            }),
            None => Err(QueryError::Failed {
                status: Some(8),
                stderr: format!("unexpected query {query}"),
                stdout: String::new(),
            }),
        }
    }
}

/// Target file with one target restricted to the given collectors
pub fn test_config(collectors: &[&str]) -> Config {
    let yaml = format!(
        "targets:\n  tsm1:\n    servername: TSM1SRV\n    id: admin\n    password: secret\n    timezone: UTC\n    collectors: [{}]\n",
        collectors.join(", ")
    );
    Config::from_yaml(&yaml).expect("test config should load")
}

pub fn setup_test_app(config: Config, executor: ScriptedExecutor) -> Router {
    let state = AppState::new(config, CollectorRegistry::with_defaults(), Arc::new(executor));
    create_router(Arc::new(state))
}

/// Issue a GET and return status plus body text
pub async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}
