//! Shared value types (component C1).

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::{Component, Path, PathBuf};

/// Lock metadata issued by the client when acquiring a lock.
///
/// Field names match the JSON the infra-tool client sends verbatim
/// (`ID`, `Who`, `Created`, ...) so that round-tripping through
/// [`serde_json`] preserves the shape callers expect. Only `id` is ever
/// inspected by the engine; everything else is carried for ownership
/// display and passed through byte-for-byte wherever the protocol
/// requires the raw lock bytes back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Operation", default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(rename = "Info", default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(rename = "Who", default, skip_serializing_if = "Option::is_none")]
    pub who: Option<String>,
    #[serde(rename = "Version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "Created", default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(rename = "Path", default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// One request's working tuple: requestor lock id, backend type name, and
/// backend-specific parameters.
///
/// `params` is deliberately type-erased (`Box<dyn Any>`) rather than an
/// associated type, because the storage registry (C7) holds clients of
/// different backend types behind one object-safe trait; each
/// [`crate::storage::StorageClient`] implementation downcasts it back to
/// its own concrete params type.
pub struct RequestMetadata {
    pub id: String,
    pub backend_type: String,
    pub params: Option<Box<dyn Any + Send + Sync>>,
}

impl RequestMetadata {
    pub fn new(backend_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            backend_type: backend_type.into(),
            params: None,
        }
    }

    /// Downcasts `params` to the backend-specific type `P`.
    ///
    /// Returns `None` if params were never set or belong to a different
    /// backend implementation than expected; callers treat this as a
    /// client error (metadata parsing never ran, or ran for a different
    /// backend than the one now being dispatched to).
    pub fn params_as<P: 'static>(&self) -> Option<&P> {
        self.params.as_ref().and_then(|p| p.downcast_ref::<P>())
    }
}

/// The address of one state document for the Git backend: repository,
/// branch ref, and the (cleaned) path of the state file within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitParams {
    pub repository: String,
    pub git_ref: String,
    pub state: String,
}

impl GitParams {
    /// Human-readable representation, used in request logging.
    pub fn describe(&self) -> String {
        format!(
            "repository={} ref={} state={}",
            self.repository, self.git_ref, self.state
        )
    }

    pub fn lock_path(&self) -> String {
        format!("{}.lock", self.state)
    }

    pub fn lock_branch_name(&self) -> String {
        format!("locks/{}", self.state)
    }
}

/// Path-cleans a state path the way `filepath.Clean` does for the
/// original implementation: collapses `.` segments and rejects any
/// attempt to escape the repository root via `..`.
pub fn clean_state_path(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }

    let mut out: Vec<&str> = Vec::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => {
                out.push(part.to_str()?);
            }
            Component::CurDir => {}
            Component::ParentDir => return None,
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if out.is_empty() {
        return None;
    }

    Some(out.join("/"))
}

/// Joins a cleaned relative path onto a base directory, used when
/// translating a state path into a working-tree file path.
pub fn join_relative(base: &Path, relative: &str) -> PathBuf {
    base.join(relative)
}
