//! One checked-out working copy of a remote repository (component C3).
//!
//! The original implementation clones into an in-memory filesystem
//! (`go-git` + `memfs`); `git2` has no equivalent in-memory working tree, so
//! this is backed by a disk-backed scratch checkout under a [`TempDir`] that
//! lives as long as the session does. Functionally this is the same
//! contract the orchestrator depends on: a private, exclusively-held
//! working tree that nobody else touches between `connect` and the next
//! `push`.

use crate::error::{CoreError, Result};
use crate::git::auth::{build_callbacks, discover_auth, GitAuth};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{FetchOptions, PushOptions, Repository};
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Bitflags mirroring the original `CheckoutMode`: whether a branch may be
/// created locally if it doesn't exist yet, and whether checkout should
/// force-overwrite a dirty working tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckoutMode {
    pub create: bool,
    pub force: bool,
}

/// One session's exclusively-owned clone, plus the auth used to reach it.
///
/// Held inside a `tokio::sync::Mutex` by [`crate::storage::git_client::GitStorageClient`]
/// so that the whole connect-to-disconnect window for one repository is
/// serialized, matching the original's per-repository `sync.Mutex` that is
/// locked in `Connect` and only released in `Disconnect`.
pub struct GitSession {
    pub repository_url: String,
    _scratch: TempDir,
    repo: Repository,
    auth: GitAuth,
    // Non-fast-forward rejections observed during the last push, read back
    // by the orchestrator to distinguish a lock race from a hard I/O error.
    last_push_rejected: Cell<bool>,
}

impl GitSession {
    /// Clones `repository_url` into a fresh scratch directory. `git_ref` is
    /// the branch the caller cares about; it is fetched and checked out if
    /// present, otherwise the session starts on the repository's default
    /// branch and the caller creates `git_ref` locally when needed.
    pub fn clone(repository_url: &str, git_ref: &str) -> Result<Self> {
        let scratch = TempDir::new()?;
        let auth = discover_auth(repository_url);

        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(build_callbacks(auth.clone()));
        fetch_options.depth(1);

        let repo = RepoBuilder::new()
            .fetch_options(fetch_options)
            .clone(repository_url, scratch.path())?;

        let mut session = Self {
            repository_url: repository_url.to_string(),
            _scratch: scratch,
            repo,
            auth,
            last_push_rejected: Cell::new(false),
        };

        // Best-effort: if the ref already exists on the remote, land on it.
        // If not, the caller is expected to create it locally (e.g. the
        // lock branch for a lock that hasn't been acquired yet).
        let _ = session.checkout(git_ref, CheckoutMode::default());

        Ok(session)
    }

    fn remote_callbacks(&self) -> git2::RemoteCallbacks<'static> {
        build_callbacks(self.auth.clone())
    }

    /// Fetches the given refspecs from `origin`.
    pub fn fetch(&self, refspecs: &[&str]) -> Result<()> {
        let mut remote = self.repo.find_remote("origin")?;
        let mut options = FetchOptions::new();
        options.remote_callbacks(self.remote_callbacks());
        remote.fetch(refspecs, Some(&mut options), None)?;
        Ok(())
    }

    /// Checks out `branch`, creating a local tracking branch from
    /// `origin/<branch>` if `mode.create` is set and neither exists yet.
    pub fn checkout(&mut self, branch: &str, mode: CheckoutMode) -> Result<()> {
        let local_ref = format!("refs/heads/{branch}");

        if self.repo.find_reference(&local_ref).is_err() {
            let remote_ref = format!("refs/remotes/origin/{branch}");
            if let Ok(remote_commit) = self
                .repo
                .find_reference(&remote_ref)
                .and_then(|r| r.peel_to_commit())
            {
                self.repo.branch(branch, &remote_commit, false)?;
            } else if mode.create {
                let head_commit = self.repo.head()?.peel_to_commit()?;
                self.repo.branch(branch, &head_commit, false)?;
            } else {
                return Err(CoreError::Git(git2::Error::from_str(&format!(
                    "branch {branch} does not exist locally or remotely"
                ))));
            }
        }

        self.repo
            .set_head(&format!("refs/heads/{branch}"))?;

        let mut checkout_builder = CheckoutBuilder::new();
        if mode.force {
            checkout_builder.force();
        } else {
            checkout_builder.safe();
        }
        self.repo.checkout_head(Some(&mut checkout_builder))?;
        Ok(())
    }

    /// Fast-forwards the current branch from `origin/<branch>`.
    pub fn pull(&mut self, branch: &str) -> Result<()> {
        self.fetch(&[&format!("refs/heads/{branch}:refs/remotes/origin/{branch}")])?;

        let remote_ref = format!("refs/remotes/origin/{branch}");
        let remote_commit = self.repo.find_reference(&remote_ref)?.peel_to_commit()?;

        let mut local_ref = self.repo.find_reference(&format!("refs/heads/{branch}"))?;
        local_ref.set_target(remote_commit.id(), "fast-forward pull")?;

        let mut checkout_builder = CheckoutBuilder::new();
        checkout_builder.force();
        self.repo.checkout_head(Some(&mut checkout_builder))?;
        Ok(())
    }

    /// Deletes a branch, locally and (if `also_remote`) on `origin` too.
    pub fn delete_branch(&mut self, branch: &str, also_remote: bool) -> Result<()> {
        if let Ok(mut reference) = self.repo.find_branch(branch, git2::BranchType::Local) {
            reference.delete()?;
        }

        if also_remote {
            let refspec = format!(":refs/heads/{branch}");
            self.push_refspecs(&[&refspec])?;
        }

        Ok(())
    }

    fn workdir(&self) -> Result<&Path> {
        self.repo
            .workdir()
            .ok_or_else(|| CoreError::Git(git2::Error::from_str("repository has no working directory")))
    }

    pub fn file_exists(&self, relative_path: &str) -> Result<bool> {
        Ok(self.workdir()?.join(relative_path).is_file())
    }

    pub fn read_file(&self, relative_path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.workdir()?.join(relative_path))?)
    }

    pub fn write_file(&self, relative_path: &str, contents: &[u8]) -> Result<()> {
        let path = self.workdir()?.join(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn delete_file(&self, relative_path: &str) -> Result<()> {
        let path = self.workdir()?.join(relative_path);
        if path.is_file() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn add(&self, relative_path: &str) -> Result<()> {
        let mut index = self.repo.index()?;
        index.add_path(Path::new(relative_path))?;
        index.write()?;
        Ok(())
    }

    pub fn add_removal(&self, relative_path: &str) -> Result<()> {
        let mut index = self.repo.index()?;
        index.remove_path(Path::new(relative_path))?;
        index.write()?;
        Ok(())
    }

    /// Commits the current index as `author_name <author_email>`, matching
    /// the original's convention of deriving the commit author from the
    /// acting user's name and the local hostname.
    pub fn commit(&self, message: &str, author_name: &str, author_email: &str) -> Result<git2::Oid> {
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let signature = git2::Signature::now(author_name, author_email)?;

        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        Ok(oid)
    }

    /// Pushes `branch` to `origin/<branch>`. Returns `Ok(())` on success and
    /// records whether the previous attempt was rejected for being
    /// non-fast-forward, which the orchestrator reads via
    /// [`GitSession::last_push_was_non_fast_forward`] to distinguish "lost
    /// the race" from "network/permission error".
    pub fn push(&self, branch: &str) -> Result<()> {
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        self.push_refspecs(&[&refspec])
    }

    fn push_refspecs(&self, refspecs: &[&str]) -> Result<()> {
        self.last_push_rejected.set(false);

        let mut remote = self.repo.find_remote("origin")?;
        let mut callbacks = self.remote_callbacks();

        let rejected = std::rc::Rc::new(Cell::new(false));
        let rejected_writer = rejected.clone();
        callbacks.push_update_reference(move |_refname, status| {
            if let Some(message) = status {
                if message.to_lowercase().contains("non-fast-forward")
                    || message.to_lowercase().contains("fetch first")
                    || message.to_lowercase().contains("rejected")
                {
                    rejected_writer.set(true);
                }
                return Err(git2::Error::from_str(message));
            }
            Ok(())
        });

        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);

        let result = remote.push(refspecs, Some(&mut options));
        self.last_push_rejected.set(rejected.get());

        match result {
            Ok(()) => Ok(()),
            Err(e) if rejected.get() => Err(CoreError::LockingConflict.context_from(e)),
            Err(e) => Err(CoreError::Git(e)),
        }
    }

    pub fn last_push_was_non_fast_forward(&self) -> bool {
        self.last_push_rejected.get()
    }
}

impl CoreError {
    /// Attaches the underlying git2 error as context while keeping the
    /// classified variant, for cases like a rejected push where both the
    /// classification and the raw error are worth keeping in logs.
    fn context_from(self, source: git2::Error) -> Self {
        tracing::debug!(error = %source, "git operation rejected");
        self
    }
}

pub fn repo_root(session: &GitSession) -> Result<PathBuf> {
    Ok(session.workdir()?.to_path_buf())
}
