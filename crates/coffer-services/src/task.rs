//! Background transfers.
//!
//! A `TransferTask` runs a whole upload or download on tokio's blocking
//! pool and resolves when it finishes. Cancellation is cooperative: the
//! flag is checked between chunk calls, and the handle is released through
//! its guard on the way out, so a cancelled task never leaks a handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;

use coffer_core::{ContainerId, ObjectId, Result, TransferError};

use crate::file_transfer::{download_with, upload_with, FileSource};
use crate::transfer::TransferClient;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A transfer running in the background.
pub struct TransferTask<T> {
    join: JoinHandle<Result<T>>,
    cancel: CancelToken,
}

impl<T: Send + 'static> TransferTask<T> {
    /// Spawn on the current tokio runtime's blocking pool. Outside a
    /// runtime this is an error.
    fn spawn(
        cancel: CancelToken,
        work: impl FnOnce(&CancelToken) -> Result<T> + Send + 'static,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            TransferError::invalid(format!("background transfers need a tokio runtime: {e}"))
        })?;
        let token = cancel.clone();
        let join = runtime.spawn_blocking(move || work(&token));
        Ok(Self { join, cancel })
    }

    /// Ask the task to stop at the next chunk boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the transfer. A cancelled task resolves to `Cancelled`.
    pub async fn join(self) -> Result<T> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "transfer task failed");
                Err(TransferError::rejected(format!("transfer task failed: {e}")))
            }
        }
    }
}

/// Upload `source` into `container` in the background. Must be called
/// from within a tokio runtime.
pub fn spawn_upload(
    client: &TransferClient,
    container: ContainerId,
    source: FileSource,
    chunk_size: usize,
    cancel: CancelToken,
) -> Result<TransferTask<ObjectId>> {
    let client = client.clone();
    TransferTask::spawn(cancel, move |cancel| {
        let result = upload_with(
            &client,
            &container,
            &source.public_meta,
            &source.private_meta,
            &source.data,
            chunk_size,
            Some(cancel),
        );
        if matches!(result, Err(TransferError::Cancelled)) {
            tracing::info!(container = %container, "upload cancelled");
        }
        result
    })
}

/// Download `object` in the background.
pub fn spawn_download(
    client: &TransferClient,
    object: ObjectId,
    chunk_size: usize,
    cancel: CancelToken,
) -> Result<TransferTask<Bytes>> {
    let client = client.clone();
    TransferTask::spawn(cancel, move |cancel| {
        let result = download_with(&client, &object, chunk_size, Some(cancel));
        if matches!(result, Err(TransferError::Cancelled)) {
            tracing::info!(object = %object, "download cancelled");
        }
        result
    })
}
