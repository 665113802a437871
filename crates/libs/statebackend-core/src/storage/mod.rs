//! Storage-client capability (component C4) and the name-keyed registry of
//! backend implementations (component C7).

pub mod git_client;

use crate::error::Result;
use crate::types::RequestMetadata;
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Query-string parameters as received by the HTTP adapter, before a
/// backend has parsed them into its own concrete params type.
pub type RawParams = HashMap<String, String>;

/// The storage-client capability every backend implementation provides.
/// Mirrors the original `StorageClient` interface one-for-one so the
/// orchestrator (C5) can stay backend-agnostic.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Parses `raw` into this backend's concrete parameter type and stores
    /// it, type-erased, on `meta` via [`RequestMetadata::params`].
    fn parse_metadata_params(&self, raw: &RawParams) -> Result<Box<dyn Any + Send + Sync>>;

    /// Acquires the per-repository session lock, cloning on first use.
    /// Must be paired with exactly one [`StorageClient::disconnect`] call.
    async fn connect(&self, meta: &RequestMetadata) -> Result<()>;

    /// Releases the session lock acquired by `connect`.
    async fn disconnect(&self, meta: &RequestMetadata) -> Result<()>;

    async fn lock_state(&self, meta: &RequestMetadata, raw_lock: &[u8]) -> Result<()>;

    async fn read_state_lock(&self, meta: &RequestMetadata) -> Result<Vec<u8>>;

    async fn unlock_state(&self, meta: &RequestMetadata) -> Result<()>;

    /// Message to show the operator when a force-unlock request arrives
    /// with an empty body (the infamous broken-force-unlock UX of the
    /// upstream tool this protocol serves).
    fn force_unlock_workaround_message(&self) -> &'static str;

    async fn get_state(&self, meta: &RequestMetadata) -> Result<Vec<u8>>;

    async fn update_state(&self, meta: &RequestMetadata, body: &[u8]) -> Result<()>;

    async fn delete_state(&self, meta: &RequestMetadata) -> Result<()>;
}

/// Name-keyed lookup of configured backends, built once at startup and
/// shared read-only for the life of the process.
pub type StorageRegistry = HashMap<String, Arc<dyn StorageClient>>;
