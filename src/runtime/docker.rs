//! Docker-backed isolation runtime
//!
//! Drives ephemeral and long-lived containers over the Docker API. Ephemeral
//! runs race container completion against a deadline; on deadline the
//! container is force-removed (non-graceful kill) and any output captured
//! before the kill is preserved.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures::StreamExt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::runtime::{IsolationRuntime, IsolationSpec, RunOutput};

/// User id for unprivileged execution (nobody)
const UNPRIVILEGED_USER: &str = "65534:65534";

/// Docker isolation runtime
pub struct DockerRuntime {
    /// Docker client
    docker: Docker,
    /// Captured bytes cap per stream
    max_output_bytes: usize,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon and verify it responds
    pub async fn connect(max_output_bytes: usize) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::RuntimeUnavailable(format!("Failed to connect to Docker: {}", e)))?;

        docker
            .ping()
            .await
            .map_err(|e| Error::RuntimeUnavailable(format!("Docker ping failed: {}", e)))?;

        info!("Docker isolation runtime connected");

        Ok(DockerRuntime {
            docker,
            max_output_bytes,
        })
    }

    /// Ensure the referenced image is available locally, pulling it if needed
    async fn ensure_image(&self, image: &str) -> Result<()> {
        let images = self
            .docker
            .list_images::<String>(None)
            .await
            .map_err(|e| Error::Container(format!("Failed to list images: {}", e)))?;

        let image_exists = images
            .iter()
            .any(|img| img.repo_tags.iter().any(|tag| tag.contains(image)));

        if !image_exists {
            info!("Pulling image: {}", image);

            let options = CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            };

            let mut stream = self.docker.create_image(Some(options), None, None);

            while let Some(result) = stream.next().await {
                match result {
                    Ok(info) => {
                        if let Some(status) = info.status {
                            debug!("Pull status: {}", status);
                        }
                    }
                    Err(e) => {
                        return Err(Error::ImageUnavailable(format!(
                            "Failed to pull {}: {}",
                            image, e
                        )));
                    }
                }
            }

            info!("Image pulled: {}", image);
        }

        Ok(())
    }

    /// Translate a spec into a container configuration
    fn container_config(&self, spec: &IsolationSpec) -> Config<String> {
        let binds = spec.workspace.as_ref().map(|ws| {
            vec![format!(
                "{}:{}",
                ws.display(),
                spec.working_dir
            )]
        });

        let network_mode = if spec.limits.network_enabled {
            "bridge"
        } else {
            "none"
        };

        Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: Some(spec.working_dir.clone()),
            network_disabled: Some(!spec.limits.network_enabled),
            user: spec
                .limits
                .unprivileged
                .then(|| UNPRIVILEGED_USER.to_string()),
            host_config: Some(bollard::service::HostConfig {
                memory: parse_memory_limit(&spec.limits.memory_limit),
                nano_cpus: Some((spec.limits.cpu_limit * 1_000_000_000.0) as i64),
                network_mode: Some(network_mode.to_string()),
                binds,
                auto_remove: Some(false), // removed manually after log collection
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Wait for a container to stop running
    async fn wait_for_container(&self, name: &str) -> Result<i32> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(name, Some(options));

        if let Some(result) = stream.next().await {
            match result {
                Ok(response) => Ok(response.status_code as i32),
                Err(e) => Err(Error::Container(format!("Wait failed: {}", e))),
            }
        } else {
            Err(Error::Container("Container wait stream ended".to_string()))
        }
    }

    /// Collect container logs into stdout/stderr buffers
    async fn collect_logs(&self, name: &str) -> Result<(String, String)> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut stream = self.docker.logs(name, Some(options));

        let mut stdout = String::new();
        let mut stderr = String::new();

        while let Some(result) = stream.next().await {
            match result {
                Ok(LogOutput::StdOut { message }) => {
                    push_capped(&mut stdout, &message, self.max_output_bytes);
                }
                Ok(LogOutput::StdErr { message }) => {
                    push_capped(&mut stderr, &message, self.max_output_bytes);
                }
                Err(e) => {
                    warn!("Error reading logs: {}", e);
                }
                _ => {}
            }
        }

        Ok((stdout, stderr))
    }

    /// Force-remove a container
    async fn remove_container(&self, name: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        self.docker
            .remove_container(name, Some(options))
            .await
            .map_err(|e| Error::Container(format!("Failed to remove container: {}", e)))?;

        debug!("Removed container: {}", name);
        Ok(())
    }
}

#[async_trait]
impl IsolationRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn run(&self, spec: &IsolationSpec, timeout: Duration) -> Result<RunOutput> {
        self.ensure_image(&spec.image).await?;

        let start = Instant::now();

        let container_name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("codebox-exec-{}", uuid::Uuid::new_v4()));

        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        self.docker
            .create_container(Some(create_options), self.container_config(spec))
            .await
            .map_err(|e| Error::Container(format!("Failed to create container: {}", e)))?;

        debug!("Created container: {}", container_name);

        self.docker
            .start_container(&container_name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::Container(format!("Failed to start container: {}", e)))?;

        // The wait is raced against the deadline; tokio::time::timeout drops
        // the timer as soon as the wait finishes, and drops the wait (then we
        // force-remove, killing the process) when the timer fires first.
        let wait_result =
            tokio::time::timeout(timeout, self.wait_for_container(&container_name)).await;

        let elapsed = start.elapsed();

        // The container must be removed even if log collection fails; a
        // timed-out container would otherwise keep running.
        let logs = self.collect_logs(&container_name).await;

        self.remove_container(&container_name).await?;

        let (stdout, stderr) = logs.unwrap_or_else(|e| {
            warn!("Failed to collect logs from {}: {}", container_name, e);
            (String::new(), String::new())
        });

        match wait_result {
            Ok(Ok(exit_code)) => Ok(RunOutput::completed(exit_code, stdout, stderr, elapsed)),
            Ok(Err(e)) => Ok(RunOutput {
                exit_code: None,
                stdout,
                stderr: format!("{}\n{}", stderr, e),
                elapsed,
                timed_out: false,
            }),
            Err(_) => {
                warn!("Execution timed out after {:?}", timeout);
                Ok(RunOutput::timed_out(stdout, stderr, elapsed))
            }
        }
    }

    async fn start(&self, spec: &IsolationSpec) -> Result<String> {
        self.ensure_image(&spec.image).await?;

        let container_name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("codebox-sbx-{}", uuid::Uuid::new_v4()));

        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        self.docker
            .create_container(Some(create_options), self.container_config(spec))
            .await
            .map_err(|e| Error::Container(format!("Failed to create container: {}", e)))?;

        self.docker
            .start_container(&container_name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::Container(format!("Failed to start container: {}", e)))?;

        info!("Started persistent container: {}", container_name);

        Ok(container_name)
    }

    async fn exec(
        &self,
        handle: &str,
        command: &[String],
        timeout: Duration,
    ) -> Result<RunOutput> {
        let start = Instant::now();

        let exec = self
            .docker
            .create_exec(
                handle,
                CreateExecOptions {
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    cmd: Some(command.to_vec()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::Container(format!("Failed to create exec: {}", e)))?;

        let started = self
            .docker
            .start_exec(&exec.id, None::<StartExecOptions>)
            .await
            .map_err(|e| Error::Container(format!("Failed to start exec: {}", e)))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = started {
            let drain = async {
                while let Some(result) = output.next().await {
                    match result {
                        Ok(LogOutput::StdOut { message }) => {
                            push_capped(&mut stdout, &message, self.max_output_bytes);
                        }
                        Ok(LogOutput::StdErr { message }) => {
                            push_capped(&mut stderr, &message, self.max_output_bytes);
                        }
                        Err(e) => warn!("Error reading exec output: {}", e),
                        _ => {}
                    }
                }
            };

            if tokio::time::timeout(timeout, drain).await.is_err() {
                warn!("Exec in {} timed out after {:?}", handle, timeout);
                return Ok(RunOutput::timed_out(stdout, stderr, start.elapsed()));
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| Error::Container(format!("Failed to inspect exec: {}", e)))?;

        let exit_code = inspect.exit_code.map(|c| c as i32).unwrap_or(-1);

        Ok(RunOutput::completed(
            exit_code,
            stdout,
            stderr,
            start.elapsed(),
        ))
    }

    async fn remove(&self, handle: &str) -> Result<()> {
        self.remove_container(handle).await
    }
}

/// Append bytes to a buffer, capping total size in bytes
fn push_capped(buf: &mut String, bytes: &[u8], cap: usize) {
    if buf.len() >= cap {
        return;
    }
    let remaining = cap - buf.len();
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= remaining {
        buf.push_str(&text);
    } else {
        let mut end = remaining;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        buf.push_str(&text[..end]);
    }
}

/// Parse a memory limit string (e.g., "512m", "1g") to bytes
fn parse_memory_limit(limit: &str) -> Option<i64> {
    let limit = limit.to_lowercase();
    let (num_str, unit) = if limit.ends_with('g') || limit.ends_with("gb") {
        (limit.trim_end_matches(|c| c == 'g' || c == 'b'), "g")
    } else if limit.ends_with('m') || limit.ends_with("mb") {
        (limit.trim_end_matches(|c| c == 'm' || c == 'b'), "m")
    } else if limit.ends_with('k') || limit.ends_with("kb") {
        (limit.trim_end_matches(|c| c == 'k' || c == 'b'), "k")
    } else {
        (limit.as_str(), "b")
    };

    let num: i64 = num_str.parse().ok()?;

    Some(match unit {
        "g" => num * 1024 * 1024 * 1024,
        "m" => num * 1024 * 1024,
        "k" => num * 1024,
        _ => num,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceLimits;

    #[test]
    fn test_parse_memory_limit() {
        assert_eq!(parse_memory_limit("512m"), Some(512 * 1024 * 1024));
        assert_eq!(parse_memory_limit("1g"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_memory_limit("1024k"), Some(1024 * 1024));
        assert_eq!(parse_memory_limit("1024"), Some(1024));
        assert_eq!(parse_memory_limit("bogus"), None);
    }

    #[test]
    fn test_push_capped() {
        let mut buf = String::new();
        push_capped(&mut buf, b"hello", 3);
        assert_eq!(buf, "hel");
        push_capped(&mut buf, b"more", 3);
        assert_eq!(buf, "hel");
    }

    #[test]
    fn test_push_capped_respects_byte_cap_for_multibyte_output() {
        // "héllo" is h(1) é(2) l(1) l(1) o(1) bytes
        let mut buf = String::new();
        push_capped(&mut buf, "héllo".as_bytes(), 2);
        assert_eq!(buf, "h"); // cutting inside 'é' backs off to a boundary
        assert!(buf.len() <= 2);

        let mut buf = String::new();
        push_capped(&mut buf, "héllo".as_bytes(), 3);
        assert_eq!(buf, "hé");
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_ephemeral_spec_disables_network() {
        let spec = IsolationSpec::new(
            "python:3.12-slim",
            vec!["python3".into(), "main.py".into()],
            ResourceLimits::ephemeral(),
        );
        assert!(!spec.limits.network_enabled);
        assert!(spec.limits.unprivileged);
    }
}
