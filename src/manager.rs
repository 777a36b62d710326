//! Sandbox manager for persistent environments
//!
//! Named, long-lived isolated environments: create, list, delete, and
//! post-creation dependency installs. The id→record map is the only shared
//! mutable structure; mutating operations on the same id are serialized
//! through per-id async locks so a create/delete race cannot orphan a
//! container or leave a record pointing at nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::languages::Language;
use crate::runtime::{IsolationRuntime, IsolationSpec};

/// Lifecycle status of a sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStatus {
    Created,
    Running,
    Stopped,
    Deleted,
}

/// A persistent sandbox record
#[derive(Debug, Clone)]
pub struct Sandbox {
    /// Caller-supplied or generated identifier
    pub id: String,
    /// Language the environment was provisioned for
    pub language: Language,
    /// Lifecycle status
    pub status: SandboxStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Packages installed at creation
    pub dependencies: Vec<String>,
    /// Handle of the underlying container; back-reference only
    container: Option<String>,
    /// Creation order, for stable listing
    seq: u64,
}

/// Listing entry for a sandbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxInfo {
    pub id: String,
    pub language: Language,
    pub status: SandboxStatus,
    pub created_at: DateTime<Utc>,
}

/// Manager owning all persistent sandbox records
pub struct SandboxManager {
    runtime: Arc<dyn IsolationRuntime>,
    config: ServiceConfig,
    sandboxes: Mutex<HashMap<String, Sandbox>>,
    id_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    next_seq: std::sync::atomic::AtomicU64,
}

impl SandboxManager {
    /// Create a manager over the given isolation runtime
    pub fn new(runtime: Arc<dyn IsolationRuntime>, config: ServiceConfig) -> Self {
        SandboxManager {
            runtime,
            config,
            sandboxes: Mutex::new(HashMap::new()),
            id_locks: Mutex::new(HashMap::new()),
            next_seq: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Per-id lock serializing mutating operations on one sandbox id
    fn id_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.id_locks.lock().unwrap();
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Create a named persistent sandbox
    ///
    /// Starts a long-lived container for the language, records it as
    /// running, then installs dependencies inside it. A failed install
    /// tears the environment down again so no orphan survives.
    pub async fn create_sandbox(
        &self,
        language: Language,
        name: Option<String>,
        dependencies: Vec<String>,
    ) -> Result<String> {
        let id = name.unwrap_or_else(|| format!("sbx-{}", uuid::Uuid::new_v4().simple()));

        let lock = self.id_lock(&id);
        let _guard = lock.lock().await;

        // Reserve the id before any container work so a concurrent create
        // with the same name observes the conflict.
        {
            let mut sandboxes = self.sandboxes.lock().unwrap();
            if let Some(existing) = sandboxes.get(&id) {
                if existing.status != SandboxStatus::Deleted {
                    return Err(Error::SandboxNameConflict(id));
                }
            }
            let seq = self
                .next_seq
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            sandboxes.insert(
                id.clone(),
                Sandbox {
                    id: id.clone(),
                    language,
                    status: SandboxStatus::Created,
                    created_at: Utc::now(),
                    dependencies: dependencies.clone(),
                    container: None,
                    seq,
                },
            );
        }

        let profile = language.profile();
        let spec = IsolationSpec::new(
            profile.image,
            vec!["sleep".to_string(), "infinity".to_string()],
            self.config.persistent.clone(),
        )
        .with_name(format!("codebox-sbx-{}", id));

        let handle = match self.runtime.start(&spec).await {
            Ok(handle) => handle,
            Err(e) => {
                self.sandboxes.lock().unwrap().remove(&id);
                return Err(e);
            }
        };

        {
            let mut sandboxes = self.sandboxes.lock().unwrap();
            if let Some(sandbox) = sandboxes.get_mut(&id) {
                sandbox.container = Some(handle.clone());
                sandbox.status = SandboxStatus::Running;
            }
        }

        info!("Sandbox {} running ({})", id, language);

        if !dependencies.is_empty() {
            if let Err(e) = self.install_dependencies(&handle, language, &dependencies).await {
                warn!("Install failed in sandbox {}, tearing down: {}", id, e);
                if let Err(remove_err) = self.runtime.remove(&handle).await {
                    warn!("Failed to remove sandbox container {}: {}", handle, remove_err);
                }
                if let Some(sandbox) = self.sandboxes.lock().unwrap().get_mut(&id) {
                    sandbox.status = SandboxStatus::Deleted;
                }
                return Err(e);
            }
        }

        Ok(id)
    }

    /// Install packages inside a running sandbox container
    async fn install_dependencies(
        &self,
        handle: &str,
        language: Language,
        dependencies: &[String],
    ) -> Result<()> {
        let profile = language.profile();

        let install = profile.install_command(dependencies).ok_or_else(|| {
            Error::DependencyInstall(format!("{} has no package installer", language))
        })?;

        let command = vec!["sh".to_string(), "-c".to_string(), install];
        let timeout = Duration::from_secs(self.config.install_timeout_secs);

        let output = self.runtime.exec(handle, &command, timeout).await?;

        if !output.success() {
            return Err(Error::DependencyInstall(format!(
                "installer exited with {:?}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }

        Ok(())
    }

    /// List non-deleted sandboxes, creation time ascending
    pub fn list_sandboxes(&self) -> Vec<SandboxInfo> {
        let sandboxes = self.sandboxes.lock().unwrap();
        let mut live: Vec<&Sandbox> = sandboxes
            .values()
            .filter(|s| s.status != SandboxStatus::Deleted)
            .collect();
        live.sort_by_key(|s| s.seq);
        live.iter()
            .map(|s| SandboxInfo {
                id: s.id.clone(),
                language: s.language,
                status: s.status,
                created_at: s.created_at,
            })
            .collect()
    }

    /// Delete a sandbox, stopping and removing its container
    ///
    /// A repeated delete on an already-deleted id fails with
    /// `SandboxNotFound`, keeping double-deletes observable.
    pub async fn delete_sandbox(&self, id: &str) -> Result<()> {
        let lock = self.id_lock(id);
        let guard = lock.lock().await;

        let container = {
            let sandboxes = self.sandboxes.lock().unwrap();
            match sandboxes.get(id) {
                Some(sandbox) if sandbox.status != SandboxStatus::Deleted => {
                    sandbox.container.clone()
                }
                _ => return Err(Error::SandboxNotFound(id.to_string())),
            }
        };

        if let Some(handle) = container {
            self.runtime.remove(&handle).await?;
        }

        if let Some(sandbox) = self.sandboxes.lock().unwrap().get_mut(id) {
            sandbox.status = SandboxStatus::Deleted;
        }

        info!("Sandbox {} deleted", id);

        drop(guard);

        // Drop the per-id lock entry unless another operation is already
        // waiting on it; holding the id_locks mutex keeps new clones from
        // appearing between the count check and the removal.
        let mut locks = self.id_locks.lock().unwrap();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }

        Ok(())
    }

    #[cfg(test)]
    fn id_lock_count(&self) -> usize {
        self.id_locks.lock().unwrap().len()
    }
}
