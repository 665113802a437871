//! Backend orchestrator (component C5): stateless functions coordinating
//! the encryption capability (C2) and a storage client (C4/C7). The HTTP
//! adapter (C6) calls exactly these functions; none of them know about
//! HTTP.

use crate::crypt::EncryptionProvider;
use crate::error::{CoreError, Result};
use crate::storage::StorageClient;
use crate::types::{LockInfo, RequestMetadata};
use std::sync::Arc;

/// Acquires the lock, translating a losing race into `Locked{raw, parsed}`
/// so the caller learns who won, unless the requester already owns it
/// (idempotent re-lock).
pub async fn lock_state(
    meta: &RequestMetadata,
    client: &dyn StorageClient,
    body: &[u8],
) -> Result<()> {
    match client.lock_state(meta, body).await {
        Ok(()) => Ok(()),
        Err(CoreError::LockingConflict) => {
            let raw = client.read_state_lock(meta).await?;
            let parsed: LockInfo = serde_json::from_slice(&raw)?;
            if parsed.id == meta.id {
                Ok(())
            } else {
                Err(CoreError::Locked {
                    raw,
                    parsed: Box::new(parsed),
                })
            }
        }
        Err(e) => Err(e),
    }
}

/// Releases the lock. The body is only consulted on the force-unlock path
/// (`meta.id` empty): an empty body there is the broken-force-unlock UX
/// this protocol has to special-case, everything else is parsed as
/// `LockInfo` to recover the id being force-released.
pub async fn unlock_state(
    meta: &mut RequestMetadata,
    client: &dyn StorageClient,
    body: &[u8],
) -> Result<()> {
    if meta.id.is_empty() {
        if body.is_empty() {
            tracing::warn!("{}", client.force_unlock_workaround_message());
            return Err(CoreError::InvalidRequest(
                client.force_unlock_workaround_message().to_string(),
            ));
        }
        let parsed: LockInfo = serde_json::from_slice(body)?;
        meta.id = parsed.id;
    }

    locked_by_me(meta, client).await?;
    client.unlock_state(meta).await
}

pub async fn get_state(
    meta: &RequestMetadata,
    client: &dyn StorageClient,
    encryption: &Arc<dyn EncryptionProvider>,
) -> Result<Vec<u8>> {
    let raw = client.get_state(meta).await?;
    encryption.decrypt(&raw)
}

pub async fn update_state(
    meta: &RequestMetadata,
    client: &dyn StorageClient,
    encryption: &Arc<dyn EncryptionProvider>,
    body: &[u8],
) -> Result<()> {
    locked_by_me(meta, client).await?;
    let ciphertext = encryption.encrypt(body)?;
    client.update_state(meta, &ciphertext).await
}

pub async fn delete_state(meta: &RequestMetadata, client: &dyn StorageClient) -> Result<()> {
    locked_by_me(meta, client).await?;
    client.delete_state(meta).await
}

/// Confirms `meta.id` owns the current lock by reading it back and
/// comparing ids. A missing lock propagates as `LockMissing`; a lock held
/// by someone else becomes `Locked{raw, parsed}`.
async fn locked_by_me(meta: &RequestMetadata, client: &dyn StorageClient) -> Result<()> {
    let raw = client.read_state_lock(meta).await?;
    let parsed: LockInfo = serde_json::from_slice(&raw)?;
    if parsed.id == meta.id {
        Ok(())
    } else {
        Err(CoreError::Locked {
            raw,
            parsed: Box::new(parsed),
        })
    }
}
