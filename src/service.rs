//! Caller-facing operation surface
//!
//! Transport-agnostic entry points for the four operations. Every call
//! returns a JSON payload: a success body, or a structured error carrying
//! the error kind and message. Adapter and engine failures never escape as
//! raw errors past this boundary.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::config::ServiceConfig;
use crate::engine::{ExecutionEngine, ExecutionRequest};
use crate::error::Error;
use crate::languages::Language;
use crate::manager::SandboxManager;
use crate::runtime::IsolationRuntime;

/// The sandboxed code execution service
pub struct CodeboxService {
    engine: ExecutionEngine,
    manager: SandboxManager,
    default_timeout: Duration,
}

impl CodeboxService {
    /// Create the service over an isolation runtime
    pub fn new(runtime: Arc<dyn IsolationRuntime>, config: ServiceConfig) -> Self {
        CodeboxService {
            engine: ExecutionEngine::new(runtime.clone(), config.clone()),
            default_timeout: Duration::from_secs(config.default_timeout_secs),
            manager: SandboxManager::new(runtime, config),
        }
    }

    /// Execute code in an ephemeral sandbox
    pub async fn execute_code(
        &self,
        language: &str,
        code: &str,
        timeout_secs: Option<u64>,
        dependencies: Vec<String>,
    ) -> Value {
        let language: Language = match language.parse() {
            Ok(language) => language,
            Err(e) => return error_payload(&e),
        };

        let timeout = timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);
        let request = ExecutionRequest::new(language, code)
            .with_dependencies(dependencies)
            .with_timeout(timeout);

        match self.engine.execute_ephemeral(request).await {
            Ok(result) => json!({
                "exitCode": result.exit_code,
                "stdout": result.stdout,
                "stderr": result.stderr,
                "executionTimeMs": result.execution_time.as_millis() as u64,
                "outcome": result.outcome,
            }),
            Err(e) => error_payload(&e),
        }
    }

    /// Create a named persistent sandbox
    pub async fn create_sandbox(
        &self,
        language: &str,
        name: Option<String>,
        dependencies: Vec<String>,
    ) -> Value {
        let language: Language = match language.parse() {
            Ok(language) => language,
            Err(e) => return error_payload(&e),
        };

        match self.manager.create_sandbox(language, name, dependencies).await {
            Ok(id) => json!({
                "sandboxId": id,
                "status": "created",
            }),
            Err(e) => error_payload(&e),
        }
    }

    /// List non-deleted sandboxes, creation time ascending
    pub fn list_sandboxes(&self) -> Value {
        let sandboxes: Vec<Value> = self
            .manager
            .list_sandboxes()
            .into_iter()
            .map(|s| {
                json!({
                    "id": s.id,
                    "language": s.language,
                    "status": s.status,
                    "createdAt": s.created_at.to_rfc3339(),
                })
            })
            .collect();
        Value::Array(sandboxes)
    }

    /// Delete a sandbox and its environment
    pub async fn delete_sandbox(&self, sandbox_id: &str) -> Value {
        match self.manager.delete_sandbox(sandbox_id).await {
            Ok(()) => json!({
                "sandboxId": sandbox_id,
                "status": "deleted",
            }),
            Err(e) => error_payload(&e),
        }
    }
}

/// Structured error payload
fn error_payload(err: &Error) -> Value {
    if !err.is_client_error() {
        error!("Operation failed: {}", err);
    }
    json!({
        "isError": true,
        "error": {
            "kind": err.kind(),
            "message": err.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::FakeRuntime;
    use tempfile::tempdir;

    fn service_with(runtime: Arc<FakeRuntime>, root: &std::path::Path) -> CodeboxService {
        let config = ServiceConfig {
            workspace_root: root.to_path_buf(),
            ..ServiceConfig::default()
        };
        CodeboxService::new(runtime, config)
    }

    #[tokio::test]
    async fn test_execute_code_success_payload() {
        let dir = tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::completing(0, "2\n", ""));
        let service = service_with(runtime, dir.path());

        let payload = service.execute_code("python", "print(1+1)", None, vec![]).await;

        assert_eq!(payload["exitCode"], 0);
        assert_eq!(payload["stdout"], "2\n");
        assert_eq!(payload["outcome"], "completed");
        assert!(payload.get("isError").is_none());
    }

    #[tokio::test]
    async fn test_execute_code_timeout_payload() {
        let dir = tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::timing_out("partial"));
        let service = service_with(runtime, dir.path());

        let payload = service.execute_code("bash", "sleep 60", Some(1), vec![]).await;

        assert_eq!(payload["exitCode"], Value::Null);
        assert_eq!(payload["outcome"], "timed-out");
        assert_eq!(payload["stdout"], "partial");
    }

    #[tokio::test]
    async fn test_configured_default_timeout_reaches_runtime() {
        let dir = tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::completing(0, "", ""));
        let config = ServiceConfig {
            workspace_root: dir.path().to_path_buf(),
            default_timeout_secs: 5,
            ..ServiceConfig::default()
        };
        let service = CodeboxService::new(runtime.clone(), config);

        service.execute_code("python", "print(1)", None, vec![]).await;
        service.execute_code("python", "print(1)", Some(9), vec![]).await;

        assert_eq!(
            runtime.seen_timeouts(),
            vec![Duration::from_secs(5), Duration::from_secs(9)]
        );
    }

    #[tokio::test]
    async fn test_unsupported_language_payload() {
        let dir = tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::completing(0, "", ""));
        let service = service_with(runtime.clone(), dir.path());

        let payload = service.execute_code("cobol", "...", None, vec![]).await;

        assert_eq!(payload["isError"], true);
        assert_eq!(payload["error"]["kind"], "UnsupportedLanguage");
        // the adapter is never reached
        assert!(runtime.seen_specs().is_empty());
    }

    #[tokio::test]
    async fn test_runtime_failure_becomes_structured_payload() {
        let dir = tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::failing("daemon unreachable"));
        let service = service_with(runtime, dir.path());

        let payload = service.execute_code("python", "print(1)", None, vec![]).await;

        assert_eq!(payload["isError"], true);
        assert_eq!(payload["error"]["kind"], "RuntimeUnavailable");
    }

    #[tokio::test]
    async fn test_sandbox_lifecycle_payloads() {
        let dir = tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::completing(0, "", ""));
        let service = service_with(runtime, dir.path());

        let created = service.create_sandbox("python", Some("s2".to_string()), vec![]).await;
        assert_eq!(created["sandboxId"], "s2");
        assert_eq!(created["status"], "created");

        let listed = service.list_sandboxes();
        assert_eq!(listed[0]["id"], "s2");
        assert_eq!(listed[0]["status"], "running");

        let deleted = service.delete_sandbox("s2").await;
        assert_eq!(deleted["status"], "deleted");
        assert!(service.list_sandboxes().as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sandbox_error_payloads() {
        let dir = tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::completing(0, "", ""));
        let service = service_with(runtime, dir.path());

        service.create_sandbox("javascript", Some("s1".to_string()), vec![]).await;
        let conflict = service.create_sandbox("javascript", Some("s1".to_string()), vec![]).await;
        assert_eq!(conflict["error"]["kind"], "SandboxNameConflict");

        let missing = service.delete_sandbox("does-not-exist").await;
        assert_eq!(missing["error"]["kind"], "SandboxNotFound");
    }
}
