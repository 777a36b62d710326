//! In-memory isolation runtime for tests
//!
//! Records every spec and exec command it sees and returns canned outputs,
//! so engine, manager, and service behavior can be exercised without a
//! Docker daemon.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::runtime::{IsolationRuntime, IsolationSpec, RunOutput};

/// What `run` should do
enum RunBehavior {
    Complete {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    TimeOut {
        partial_stdout: String,
    },
    Fail {
        message: String,
    },
    /// Read a file from the mounted workspace and record its contents
    InspectWorkspace {
        file_name: String,
    },
}

/// Fake isolation runtime backed by canned responses
pub struct FakeRuntime {
    run_behavior: RunBehavior,
    exec_failure: Option<String>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    seen_specs: Vec<IsolationSpec>,
    seen_timeouts: Vec<Duration>,
    started: Vec<IsolationSpec>,
    execs: Vec<(String, Vec<String>)>,
    removed: Vec<String>,
    inspected: Vec<String>,
    next_handle: u32,
}

impl FakeRuntime {
    /// Runs complete with the given exit code and output
    pub fn completing(exit_code: i32, stdout: &str, stderr: &str) -> Self {
        FakeRuntime {
            run_behavior: RunBehavior::Complete {
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
            exec_failure: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Runs hit the deadline, preserving partial stdout
    pub fn timing_out(partial_stdout: &str) -> Self {
        FakeRuntime {
            run_behavior: RunBehavior::TimeOut {
                partial_stdout: partial_stdout.to_string(),
            },
            exec_failure: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Runs fail as if the daemon were unreachable
    pub fn failing(message: &str) -> Self {
        FakeRuntime {
            run_behavior: RunBehavior::Fail {
                message: message.to_string(),
            },
            exec_failure: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Runs read `file_name` from the workspace and record its contents
    pub fn inspecting_workspace(file_name: &str) -> Self {
        FakeRuntime {
            run_behavior: RunBehavior::InspectWorkspace {
                file_name: file_name.to_string(),
            },
            exec_failure: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Make every `exec` fail with the given stderr and a non-zero exit
    pub fn with_failing_exec(mut self, message: &str) -> Self {
        self.exec_failure = Some(message.to_string());
        self
    }

    /// Specs seen by `run`
    pub fn seen_specs(&self) -> Vec<IsolationSpec> {
        self.state.lock().unwrap().seen_specs.clone()
    }

    /// Timeouts passed to `run`
    pub fn seen_timeouts(&self) -> Vec<Duration> {
        self.state.lock().unwrap().seen_timeouts.clone()
    }

    /// Specs seen by `start`
    pub fn started_specs(&self) -> Vec<IsolationSpec> {
        self.state.lock().unwrap().started.clone()
    }

    /// Commands seen by `exec`, with their handles
    pub fn exec_calls(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().execs.clone()
    }

    /// Handles passed to `remove`
    pub fn removed_handles(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }

    /// Workspace file contents captured by the inspecting behavior
    pub fn inspected_contents(&self) -> Vec<String> {
        self.state.lock().unwrap().inspected.clone()
    }
}

#[async_trait]
impl IsolationRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    async fn run(&self, spec: &IsolationSpec, timeout: Duration) -> Result<RunOutput> {
        {
            let mut state = self.state.lock().unwrap();
            state.seen_specs.push(spec.clone());
            state.seen_timeouts.push(timeout);
        }

        match &self.run_behavior {
            RunBehavior::Complete {
                exit_code,
                stdout,
                stderr,
            } => Ok(RunOutput::completed(
                *exit_code,
                stdout.clone(),
                stderr.clone(),
                Duration::from_millis(5),
            )),
            RunBehavior::TimeOut { partial_stdout } => Ok(RunOutput::timed_out(
                partial_stdout.clone(),
                String::new(),
                Duration::from_millis(5),
            )),
            RunBehavior::Fail { message } => Err(Error::RuntimeUnavailable(message.clone())),
            RunBehavior::InspectWorkspace { file_name } => {
                let workspace = spec
                    .workspace
                    .as_ref()
                    .expect("inspecting behavior requires a workspace");
                let contents = std::fs::read_to_string(workspace.join(file_name))
                    .expect("workspace file should exist during the run");
                self.state.lock().unwrap().inspected.push(contents);
                Ok(RunOutput::completed(
                    0,
                    String::new(),
                    String::new(),
                    Duration::from_millis(5),
                ))
            }
        }
    }

    async fn start(&self, spec: &IsolationSpec) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.started.push(spec.clone());
        state.next_handle += 1;
        Ok(format!("fake-{}", state.next_handle))
    }

    async fn exec(
        &self,
        handle: &str,
        command: &[String],
        _timeout: Duration,
    ) -> Result<RunOutput> {
        self.state
            .lock()
            .unwrap()
            .execs
            .push((handle.to_string(), command.to_vec()));

        match &self.exec_failure {
            Some(message) => Ok(RunOutput::completed(
                1,
                String::new(),
                message.clone(),
                Duration::from_millis(5),
            )),
            None => Ok(RunOutput::completed(
                0,
                String::new(),
                String::new(),
                Duration::from_millis(5),
            )),
        }
    }

    async fn remove(&self, handle: &str) -> Result<()> {
        self.state.lock().unwrap().removed.push(handle.to_string());
        Ok(())
    }
}
