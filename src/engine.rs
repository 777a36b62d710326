//! Execution engine for ephemeral runs
//!
//! One-shot executions: a uniquely named workspace is created, the source
//! is materialized, the isolation runtime runs it under the request timeout,
//! and the workspace is removed on every exit path before the result (or
//! error) is handed back.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::languages::Language;
use crate::runtime::{IsolationRuntime, IsolationSpec, RunOutput};

/// Request to execute code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Programming language
    pub language: Language,
    /// The code to execute
    pub code: String,
    /// Execution timeout
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
    /// Packages to install before running
    #[serde(default)]
    pub dependencies: Vec<String>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl ExecutionRequest {
    /// Create a new execution request
    pub fn new(language: Language, code: impl Into<String>) -> Self {
        ExecutionRequest {
            language,
            code: code.into(),
            timeout: default_timeout(),
            dependencies: Vec::new(),
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set dependencies
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::InvalidInput("timeout must be positive".to_string()));
        }
        Ok(())
    }
}

/// Terminal outcome of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// The program ran to its own exit
    Completed,
    /// The deadline fired and the program was killed
    TimedOut,
    /// The isolation runtime reported a failure mid-run
    RuntimeError,
}

/// Result of code execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Exit code; None when killed by timeout
    pub exit_code: Option<i32>,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Wall-clock execution time
    pub execution_time: Duration,
    /// Terminal outcome tag
    pub outcome: Outcome,
}

impl From<RunOutput> for ExecutionResult {
    fn from(output: RunOutput) -> Self {
        let outcome = if output.timed_out {
            Outcome::TimedOut
        } else if output.exit_code.is_some() {
            Outcome::Completed
        } else {
            Outcome::RuntimeError
        };

        ExecutionResult {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            execution_time: output.elapsed,
            outcome,
        }
    }
}

/// Engine for one-shot sandboxed executions
pub struct ExecutionEngine {
    runtime: Arc<dyn IsolationRuntime>,
    config: ServiceConfig,
}

impl ExecutionEngine {
    /// Create an engine over the given isolation runtime
    pub fn new(runtime: Arc<dyn IsolationRuntime>, config: ServiceConfig) -> Self {
        ExecutionEngine { runtime, config }
    }

    /// Execute a one-shot request
    ///
    /// The workspace is deleted before this returns, on success, timeout,
    /// and runtime error alike.
    pub async fn execute_ephemeral(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        request.validate()?;

        let workspace = self.create_workspace().await?;

        debug!(
            "Executing {} in workspace {}",
            request.language,
            workspace.display()
        );

        let run_result = self.run_in_workspace(&request, &workspace).await;

        if let Err(e) = tokio::fs::remove_dir_all(&workspace).await {
            warn!("Failed to remove workspace {}: {}", workspace.display(), e);
        }

        run_result.map(ExecutionResult::from)
    }

    /// Create a uniquely named workspace directory
    async fn create_workspace(&self) -> Result<PathBuf> {
        let workspace = self
            .config
            .workspace_root
            .join(format!("exec-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&workspace).await?;
        Ok(workspace)
    }

    /// Materialize the source and invoke the runtime
    async fn run_in_workspace(
        &self,
        request: &ExecutionRequest,
        workspace: &PathBuf,
    ) -> Result<RunOutput> {
        let profile = request.language.profile();

        let source_file = format!("main.{}", profile.extension);
        tokio::fs::write(workspace.join(&source_file), &request.code).await?;

        // Install-then-run when dependencies are requested and the language
        // has an installer; plain run tokens otherwise.
        let command = match profile.install_command(&request.dependencies) {
            Some(install) => vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("{} && {}", install, profile.run_line()),
            ],
            None => profile.run_command.iter().map(|s| s.to_string()).collect(),
        };

        let spec = IsolationSpec::new(profile.image, command, self.config.ephemeral.clone())
            .with_workspace(workspace.clone());

        self.runtime.run(&spec, request.timeout).await
    }
}
