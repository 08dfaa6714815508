//! Scoped handle ownership.
//!
//! A guard releases its handle when dropped: an unfinished upload is
//! aborted (nothing becomes visible) and a download is closed. Early
//! returns and `?` on the caller's side therefore never leak a
//! backend-side handle.

use bytes::Bytes;
use coffer_core::{ContainerId, ObjectId, Result};

use crate::transfer::{TransferClient, TransferHandle};

/// Owns an open upload until `finish` or drop.
pub struct WriteGuard {
    client: TransferClient,
    handle: TransferHandle,
    released: bool,
}

impl WriteGuard {
    pub fn handle(&self) -> &TransferHandle {
        &self.handle
    }

    pub fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.client.write_chunk(&self.handle, chunk)
    }

    pub fn write_all(&mut self, data: &[u8], chunk_size: usize) -> Result<()> {
        self.client.write_all(&self.handle, data, chunk_size)
    }

    /// Finalize the upload.
    pub fn finish(mut self) -> Result<ObjectId> {
        self.released = true;
        self.client.close_for_write(&self.handle)
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.client.abort_write(&self.handle) {
            tracing::warn!(handle = %self.handle.id(), error = %e, "failed to release upload handle");
        }
    }
}

/// Owns an open download until `close`, `read_to_end`, or drop.
pub struct ReadGuard {
    client: TransferClient,
    handle: TransferHandle,
    released: bool,
}

impl ReadGuard {
    pub fn handle(&self) -> &TransferHandle {
        &self.handle
    }

    pub fn read(&mut self, max_length: usize) -> Result<Bytes> {
        self.client.read_chunk(&self.handle, max_length)
    }

    /// Drain the stream and close the handle. On a read error the handle is
    /// still closed by drop.
    pub fn read_to_end(self, chunk_size: usize) -> Result<Bytes> {
        let data = self.client.read_to_end(&self.handle, chunk_size)?;
        self.close()?;
        Ok(data)
    }

    pub fn close(mut self) -> Result<()> {
        self.released = true;
        self.client.close_for_read(&self.handle)
    }
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.client.close_for_read(&self.handle) {
            tracing::warn!(handle = %self.handle.id(), error = %e, "failed to release download handle");
        }
    }
}

impl TransferClient {
    /// `open_for_write`, wrapped in a guard.
    pub fn begin_upload(
        &self,
        container: &ContainerId,
        public_meta: &[u8],
        private_meta: &[u8],
        declared_size: i64,
    ) -> Result<WriteGuard> {
        let handle = self.open_for_write(container, public_meta, private_meta, declared_size)?;
        Ok(WriteGuard {
            client: self.clone(),
            handle,
            released: false,
        })
    }

    /// `open_for_read`, wrapped in a guard.
    pub fn begin_download(&self, object: &ObjectId) -> Result<ReadGuard> {
        let handle = self.open_for_read(object)?;
        Ok(ReadGuard {
            client: self.clone(),
            handle,
            released: false,
        })
    }
}
