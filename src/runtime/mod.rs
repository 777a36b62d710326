//! Isolation runtime adapter
//!
//! A narrow interface over the external isolation engine, so the concrete
//! backend stays swappable without touching engine or manager logic. The
//! engine/service only ever see [`IsolationSpec`] in and [`RunOutput`] out.

mod docker;

#[cfg(test)]
pub mod testing;

pub use docker::DockerRuntime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ResourceLimits;
use crate::error::Result;

/// Specification for one isolated execution context
#[derive(Debug, Clone)]
pub struct IsolationSpec {
    /// Container image reference
    pub image: String,
    /// Command tokens to run
    pub command: Vec<String>,
    /// Host workspace directory mounted into the context
    pub workspace: Option<PathBuf>,
    /// Working directory inside the context
    pub working_dir: String,
    /// Resource limits (memory, CPU, network, privileges)
    pub limits: ResourceLimits,
    /// Context name; generated when absent
    pub name: Option<String>,
}

impl IsolationSpec {
    /// Create a spec with the given image, command, and limits
    pub fn new(image: impl Into<String>, command: Vec<String>, limits: ResourceLimits) -> Self {
        IsolationSpec {
            image: image.into(),
            command,
            workspace: None,
            working_dir: "/workspace".to_string(),
            limits,
            name: None,
        }
    }

    /// Mount a host workspace directory at the working directory
    pub fn with_workspace(mut self, workspace: PathBuf) -> Self {
        self.workspace = Some(workspace);
        self
    }

    /// Use an explicit context name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Captured output of one isolated run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    /// Exit code; None when the run was killed by the timeout
    pub exit_code: Option<i32>,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Wall-clock time spent
    pub elapsed: Duration,
    /// Was the run terminated by the deadline?
    pub timed_out: bool,
}

impl RunOutput {
    /// Result of a run that reached its own exit
    pub fn completed(exit_code: i32, stdout: String, stderr: String, elapsed: Duration) -> Self {
        RunOutput {
            exit_code: Some(exit_code),
            stdout,
            stderr,
            elapsed,
            timed_out: false,
        }
    }

    /// Result of a run killed by the deadline; partial output is preserved
    pub fn timed_out(stdout: String, stderr: String, elapsed: Duration) -> Self {
        RunOutput {
            exit_code: None,
            stdout,
            stderr,
            elapsed,
            timed_out: true,
        }
    }

    /// Did the run complete with exit code zero?
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Backend-neutral interface to the isolation engine
#[async_trait]
pub trait IsolationRuntime: Send + Sync {
    /// Backend name
    fn name(&self) -> &str;

    /// Run a command to completion inside a fresh context, racing it
    /// against `timeout`. The context is removed before returning.
    async fn run(&self, spec: &IsolationSpec, timeout: Duration) -> Result<RunOutput>;

    /// Start a long-lived context and return its handle (container id)
    async fn start(&self, spec: &IsolationSpec) -> Result<String>;

    /// Run a command inside an already-running context
    async fn exec(&self, handle: &str, command: &[String], timeout: Duration)
        -> Result<RunOutput>;

    /// Stop and remove a long-lived context
    async fn remove(&self, handle: &str) -> Result<()>;
}
