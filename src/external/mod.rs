//! Collaborators the core consumes but does not implement: transactional
//! notification delivery and durable object storage. Both are best-effort
//! side channels dispatched after the authoritative state transition commits;
//! a failure is surfaced to the caller as a partial-success warning, never a
//! rollback.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::utils::error::AppResult;

/// Fire-and-forget notification delivery (email under the hood). Failures
/// are logged by the caller, not retried here.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, template: &str, data: Value) -> AppResult<()>;
}

/// Durable blob storage for QR images and proof-of-payment attachments.
/// `put` returns a durable URL for the stored object.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> AppResult<String>;
    /// Removes a stored object, e.g. an attachment whose owning operation
    /// was refused after the upload.
    async fn delete(&self, key: &str) -> AppResult<()>;
}

/// Default notifier wired when no mail provider is configured; records the
/// send in the log stream and reports success.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, recipient: &str, template: &str, data: Value) -> AppResult<()> {
        info!(%recipient, %template, %data, "Dispatching notification");
        Ok(())
    }
}

/// Default storage wired when no object-store provider is configured; keeps
/// nothing and hands back a `mem://` URL.
pub struct TracingStorage;

#[async_trait]
impl ObjectStorage for TracingStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> AppResult<String> {
        info!(%key, size = bytes.len(), "Storing object");
        Ok(format!("mem://{key}"))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        info!(%key, "Deleting object");
        Ok(())
    }
}
