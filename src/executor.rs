//! Query executor
//!
//! Collectors never spawn processes themselves; they receive an
//! `Arc<dyn QueryExecutor>` so tests can substitute scripted output.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error};

use crate::config::Target;
use crate::error_handling::QueryError;

/// Marker dsmadmc prints when a SELECT matched no rows
pub const NO_MATCH_MARKER: &str = "ANR2034E";

/// Runs one query against one target and returns its raw delimited output
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn query(&self, target: &Target, query: &str) -> Result<String, QueryError>;
}

/// Executes queries through the dsmadmc administrative client
#[derive(Debug, Clone)]
pub struct Dsmadmc {
    pub path: PathBuf,
    pub timeout: Duration,
    /// Directory dsmadmc writes dsmerror.log into
    pub log_dir: PathBuf,
}

impl Dsmadmc {
    pub fn new<P: Into<PathBuf>, L: Into<PathBuf>>(path: P, timeout: Duration, log_dir: L) -> Self {
        Self {
            path: path.into(),
            timeout,
            log_dir: log_dir.into(),
        }
    }

    pub fn args(target: &Target, query: &str) -> Vec<String> {
        vec![
            format!("-SERVERName={}", target.servername()),
            format!("-ID={}", target.id),
            format!("-PAssword={}", target.password),
            "-DATAONLY=YES".to_string(),
            "-COMMAdelimited".to_string(),
            query.to_string(),
        ]
    }
}

#[async_trait]
impl QueryExecutor for Dsmadmc {
    async fn query(&self, target: &Target, query: &str) -> Result<String, QueryError> {
        debug!(target_name = %target.name, query, "Executing dsmadmc");

        let mut command = Command::new(&self.path);
        command
            .args(Self::args(target, query))
            .env("DSM_LOG", &self.log_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(QueryError::Timeout {
                    timeout: self.timeout,
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }
        if stdout.contains(NO_MATCH_MARKER) {
            debug!(target_name = %target.name, query, "No rows matched");
            return Ok(String::new());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        error!(
            target_name = %target.name,
            status = ?output.status.code(),
            %stderr,
            %stdout,
            "Error executing dsmadmc"
        );
        Err(QueryError::Failed {
            status: output.status.code(),
            stderr,
            stdout,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("dsmadmc");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn target() -> Target {
        let mut target = Target::new("tsm1", "admin", "secret");
        target.servername = Some("TSM1SRV".to_string());
        target
    }

    #[test]
    fn test_args_layout() {
        let args = Dsmadmc::args(&target(), "SELECT 1 FROM DB");
        assert_eq!(
            args,
            vec![
                "-SERVERName=TSM1SRV",
                "-ID=admin",
                "-PAssword=secret",
                "-DATAONLY=YES",
                "-COMMAdelimited",
                "SELECT 1 FROM DB",
            ]
        );
    }

    #[tokio::test]
    async fn test_query_returns_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "echo \"$6\"; echo \"log=$DSM_LOG\"");
        let executor = Dsmadmc::new(path, Duration::from_secs(5), "/var/log/tsm");

        let out = executor.query(&target(), "SELECT X FROM Y").await.unwrap();
        assert_eq!(out, "SELECT X FROM Y\nlog=/var/log/tsm\n");
    }

    #[tokio::test]
    async fn test_no_match_is_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "echo 'ANR2034E SELECT: No match found using this criteria.'; exit 11");
        let executor = Dsmadmc::new(path, Duration::from_secs(5), "/tmp");

        assert_eq!(executor.query(&target(), "q").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "echo 'ANS1017E Session rejected' >&2; exit 8");
        let executor = Dsmadmc::new(path, Duration::from_secs(5), "/tmp");

        match executor.query(&target(), "q").await {
            Err(QueryError::Failed { status, stderr, .. }) => {
                assert_eq!(status, Some(8));
                assert!(stderr.contains("ANS1017E"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deadline_is_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "sleep 5");
        let executor = Dsmadmc::new(path, Duration::from_millis(100), "/tmp");

        let err = executor.query(&target(), "q").await.unwrap_err();
        assert!(matches!(err, QueryError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let executor = Dsmadmc::new("/nonexistent/dsmadmc", Duration::from_secs(1), "/tmp");
        let err = executor.query(&target(), "q").await.unwrap_err();
        assert!(matches!(err, QueryError::Io(_)));
    }
}
