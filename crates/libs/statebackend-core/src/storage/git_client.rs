//! Git-backed implementation of the storage-client capability (component
//! C4): parameter parsing, session acquisition, the lock protocol, and
//! state CRUD, all built on [`crate::git::GitSession`].

use crate::error::{CoreError, Result};
use crate::git::{CheckoutMode, GitSession};
use crate::storage::{RawParams, StorageClient};
use crate::types::{clean_state_path, GitParams, RequestMetadata};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Static configuration for the Git backend: defaults applied when the
/// request omits `repository`/`ref`/`state`, and the identity used as the
/// commit author.
#[derive(Debug, Clone)]
pub struct GitClientConfig {
    pub default_repository: Option<String>,
    pub default_ref: String,
    pub default_state: Option<String>,
    pub author_name: String,
}

impl Default for GitClientConfig {
    fn default() -> Self {
        Self {
            default_repository: None,
            default_ref: "master".to_string(),
            default_state: None,
            author_name: "statebackend-git".to_string(),
        }
    }
}

const FORCE_UNLOCK_WORKAROUND_MESSAGE: &str = "\
the unlock request arrived with an empty body; this happens when the \
client's force-unlock confirmation prompt was answered without the \
original lock ID. Re-run the force-unlock command, or pass -force with \
the lock ID reported earlier.";

/// One connected backend instance, serving however many repositories get
/// addressed against it over its lifetime. Sessions are created lazily and
/// never evicted (see component C4 note on long-lived sessions).
pub struct GitStorageClient {
    config: GitClientConfig,
    sessions: Mutex<HashMap<String, Arc<Mutex<GitSession>>>>,
    active: Mutex<HashMap<String, OwnedMutexGuard<GitSession>>>,
}

impl GitStorageClient {
    pub fn new(config: GitClientConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
        }
    }

    fn params<'a>(&self, meta: &'a RequestMetadata) -> Result<&'a GitParams> {
        meta.params_as::<GitParams>().ok_or_else(|| {
            CoreError::InvalidRequest("git backend params were never parsed for this request".into())
        })
    }

    /// `active` is keyed by repository URL, not by request id: the session
    /// mutex already guarantees at most one holder per repository at a
    /// time, and `meta.id` (the requester's lock id) can legitimately be
    /// rewritten mid-request by the force-unlock path in the orchestrator,
    /// so it is unsuitable as a stable connection key.
    async fn with_session<F, T>(&self, meta: &RequestMetadata, f: F) -> Result<T>
    where
        F: FnOnce(&mut GitSession) -> Result<T>,
    {
        let repository = &self.params(meta)?.repository;
        let mut active = self.active.lock().await;
        let guard = active.get_mut(repository).ok_or_else(|| {
            CoreError::InvalidRequest(format!("no open session for repository {repository}"))
        })?;
        f(guard)
    }

    fn commit_author(&self) -> (String, String) {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());
        let email = format!("{}@{}", self.config.author_name, host);
        (self.config.author_name.clone(), email)
    }
}

#[async_trait]
impl StorageClient for GitStorageClient {
    fn parse_metadata_params(&self, raw: &RawParams) -> Result<Box<dyn Any + Send + Sync>> {
        let repository = raw
            .get("repository")
            .cloned()
            .or_else(|| self.config.default_repository.clone())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::InvalidRequest("repository is required".into()))?;

        let git_ref = raw
            .get("ref")
            .cloned()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.default_ref.clone());

        let raw_state = raw
            .get("state")
            .cloned()
            .or_else(|| self.config.default_state.clone())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::InvalidRequest("state is required".into()))?;

        let state = clean_state_path(&raw_state)
            .ok_or_else(|| CoreError::InvalidRequest(format!("invalid state path: {raw_state}")))?;

        Ok(Box::new(GitParams {
            repository,
            git_ref,
            state,
        }))
    }

    async fn connect(&self, meta: &RequestMetadata) -> Result<()> {
        let params = self.params(meta)?.clone();

        let session = {
            let mut sessions = self.sessions.lock().await;
            if let Some(existing) = sessions.get(&params.repository) {
                existing.clone()
            } else {
                let cloned = GitSession::clone(&params.repository, &params.git_ref)?;
                let wrapped = Arc::new(Mutex::new(cloned));
                sessions.insert(params.repository.clone(), wrapped.clone());
                wrapped
            }
        };

        let guard = session.lock_owned().await;
        self.active.lock().await.insert(params.repository.clone(), guard);
        Ok(())
    }

    async fn disconnect(&self, meta: &RequestMetadata) -> Result<()> {
        let repository = self.params(meta)?.repository.clone();
        self.active.lock().await.remove(&repository);
        Ok(())
    }

    async fn lock_state(&self, meta: &RequestMetadata, raw_lock: &[u8]) -> Result<()> {
        let params = self.params(meta)?.clone();
        let lock_branch = params.lock_branch_name();
        let lock_path = params.lock_path();
        let (author_name, author_email) = self.commit_author();

        self.with_session(meta, move |session| {
            session.checkout(&params.git_ref, CheckoutMode::default())?;
            session.pull(&params.git_ref)?;
            session.delete_branch(&lock_branch, false)?;
            session.checkout(
                &lock_branch,
                CheckoutMode {
                    create: true,
                    force: true,
                },
            )?;
            session.write_file(&lock_path, raw_lock)?;
            session.add(&lock_path)?;
            session.commit(&format!("Lock {}", params.state), &author_name, &author_email)?;

            match session.push(&lock_branch) {
                Ok(()) => Ok(()),
                Err(_) if session.last_push_was_non_fast_forward() => Err(CoreError::LockingConflict),
                Err(e) => Err(e),
            }
        })
        .await
    }

    async fn read_state_lock(&self, meta: &RequestMetadata) -> Result<Vec<u8>> {
        let params = self.params(meta)?.clone();
        let lock_branch = params.lock_branch_name();
        let lock_path = params.lock_path();

        self.with_session(meta, move |session| {
            session.fetch(&[&format!(
                "refs/heads/{lock_branch}:refs/remotes/origin/{lock_branch}"
            )])?;
            let _ = session.delete_branch(&lock_branch, false);

            session
                .checkout(
                    &lock_branch,
                    CheckoutMode {
                        create: false,
                        force: true,
                    },
                )
                .map_err(|_| CoreError::LockMissing)?;

            session.pull(&lock_branch).map_err(|_| CoreError::LockMissing)?;

            session.read_file(&lock_path)
        })
        .await
    }

    async fn unlock_state(&self, meta: &RequestMetadata) -> Result<()> {
        let params = self.params(meta)?.clone();
        let lock_branch = params.lock_branch_name();

        self.with_session(meta, move |session| session.delete_branch(&lock_branch, true))
            .await
    }

    fn force_unlock_workaround_message(&self) -> &'static str {
        FORCE_UNLOCK_WORKAROUND_MESSAGE
    }

    async fn get_state(&self, meta: &RequestMetadata) -> Result<Vec<u8>> {
        let params = self.params(meta)?.clone();
        let state_path = params.state.clone();

        self.with_session(meta, move |session| {
            session.checkout(&params.git_ref, CheckoutMode::default())?;
            session.pull(&params.git_ref)?;
            if !session.file_exists(&state_path)? {
                return Err(CoreError::StateDidNotExist);
            }
            session.read_file(&state_path)
        })
        .await
    }

    async fn update_state(&self, meta: &RequestMetadata, body: &[u8]) -> Result<()> {
        let params = self.params(meta)?.clone();
        let state_path = params.state.clone();
        let (author_name, author_email) = self.commit_author();

        self.with_session(meta, move |session| {
            session.checkout(&params.git_ref, CheckoutMode::default())?;
            session.pull(&params.git_ref)?;
            session.write_file(&state_path, body)?;
            session.add(&state_path)?;
            session.commit(
                &format!("Update {}", params.state),
                &author_name,
                &author_email,
            )?;
            session.push(&params.git_ref)
        })
        .await
    }

    async fn delete_state(&self, meta: &RequestMetadata) -> Result<()> {
        let params = self.params(meta)?.clone();
        let state_path = params.state.clone();
        let (author_name, author_email) = self.commit_author();

        self.with_session(meta, move |session| {
            session.checkout(&params.git_ref, CheckoutMode::default())?;
            session.pull(&params.git_ref)?;
            session.delete_file(&state_path)?;
            session.add_removal(&state_path)?;
            session.commit(
                &format!("Delete {}", params.state),
                &author_name,
                &author_email,
            )?;
            session.push(&params.git_ref)
        })
        .await
    }
}
