//! Chunked transfer client — drives the handle-based upload/download
//! protocol against a backend.
//!
//! Each handle moves through `Opened → {Writing | Reading} → Closed`.
//! Chunk calls on a handle are strictly sequential: the client keeps one
//! mutex per open handle and holds it across the backend call. Closed
//! handles are dropped from the table, so any later call on them fails with
//! `HandleClosed`.
//!
//! Nothing here retries. The first error of a chunk call is returned as-is
//! and the caller is expected to close the handle and start over.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;

use coffer_core::config::{CofferConfig, ConfigError, TransferSettings};
use coffer_core::{ContainerId, HandleId, ObjectId, Result, TransferError};

use crate::connection::Connection;
use crate::task::CancelToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleMode {
    Write,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Opened,
    Writing,
    Reading,
    Closed,
}

/// Token for an open stream. Copyable, but only meaningful until closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferHandle {
    id: HandleId,
    mode: HandleMode,
    max_chunk_size: usize,
}

impl TransferHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn mode(&self) -> HandleMode {
        self.mode
    }

    /// Largest chunk the backend accepts on this handle.
    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }
}

#[derive(Debug)]
struct HandleEntry {
    mode: HandleMode,
    state: HandleState,
    declared: Option<u64>,
    transferred: u64,
}

type SharedEntry = Arc<Mutex<HandleEntry>>;

fn lock(entry: &Mutex<HandleEntry>) -> MutexGuard<'_, HandleEntry> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client side of the chunk protocol for one connection.
#[derive(Clone)]
pub struct TransferClient {
    conn: Connection,
    settings: TransferSettings,
    handles: Arc<DashMap<HandleId, SharedEntry>>,
}

impl TransferClient {
    pub fn new(conn: Connection) -> Self {
        Self::with_settings(conn, TransferSettings::default())
    }

    pub fn with_settings(conn: Connection, settings: TransferSettings) -> Self {
        Self {
            conn,
            settings,
            handles: Arc::new(DashMap::new()),
        }
    }

    /// Client using the `[transfer]` section of a loaded config.
    pub fn from_config(conn: Connection, config: &CofferConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        if config.transfer.write_chunk_size > conn.backend().max_chunk_size() {
            return Err(ConfigError::Invalid(
                "transfer.write_chunk_size",
                format!("larger than the backend maximum of {}", conn.backend().max_chunk_size()),
            ));
        }
        Ok(Self::with_settings(conn, config.transfer.clone()))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    /// Handles opened through this client and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    pub fn state(&self, handle: &TransferHandle) -> HandleState {
        // Clone the entry out first; never wait on a handle mutex while
        // holding a table shard.
        match self.handles.get(&handle.id).map(|e| e.value().clone()) {
            Some(entry) => lock(&entry).state,
            None => HandleState::Closed,
        }
    }

    fn entry(&self, handle: &TransferHandle) -> Result<SharedEntry> {
        self.handles
            .get(&handle.id)
            .map(|e| e.value().clone())
            .ok_or(TransferError::HandleClosed(handle.id))
    }

    fn register(&self, id: HandleId, mode: HandleMode, declared: Option<u64>) -> TransferHandle {
        self.handles.insert(
            id,
            Arc::new(Mutex::new(HandleEntry {
                mode,
                state: HandleState::Opened,
                declared,
                transferred: 0,
            })),
        );
        TransferHandle {
            id,
            mode,
            max_chunk_size: self.conn.backend().max_chunk_size(),
        }
    }

    /// Mark the handle closed and run the backend release call. The handle
    /// counts as closed afterwards even if the call fails.
    fn release<T>(
        &self,
        handle: &TransferHandle,
        mode: HandleMode,
        call: impl FnOnce(&HandleEntry) -> Result<T>,
    ) -> Result<T> {
        let entry = self.entry(handle)?;
        let mut state = lock(&entry);
        if state.state == HandleState::Closed {
            return Err(TransferError::HandleClosed(handle.id));
        }
        if state.mode != mode {
            return Err(wrong_mode(handle));
        }
        let result = call(&*state);
        state.state = HandleState::Closed;
        self.handles.remove(&handle.id);
        result
    }

    // ── Upload ────────────────────────────────────────────────────────────────

    /// Declare an upload of exactly `declared_size` bytes into `container`.
    pub fn open_for_write(
        &self,
        container: &ContainerId,
        public_meta: &[u8],
        private_meta: &[u8],
        declared_size: i64,
    ) -> Result<TransferHandle> {
        let size = u64::try_from(declared_size).map_err(|_| {
            TransferError::invalid(format!("declared size must be >= 0, got {declared_size}"))
        })?;
        let id = self.conn.backend().create_object(
            self.conn.user_id(),
            container,
            public_meta,
            private_meta,
            size,
        )?;
        tracing::debug!(handle = %id, container = %container, size, "upload opened");
        Ok(self.register(id, HandleMode::Write, Some(size)))
    }

    /// Append `chunk` as the next sequential piece of the upload.
    pub fn write_chunk(&self, handle: &TransferHandle, chunk: &[u8]) -> Result<()> {
        let entry = self.entry(handle)?;
        let mut state = lock(&entry);
        if state.state == HandleState::Closed {
            return Err(TransferError::HandleClosed(handle.id));
        }
        if state.mode != HandleMode::Write {
            return Err(wrong_mode(handle));
        }
        if chunk.len() > handle.max_chunk_size {
            return Err(TransferError::invalid(format!(
                "chunk of {} bytes exceeds maximum of {}",
                chunk.len(),
                handle.max_chunk_size
            )));
        }
        let declared = state.declared.unwrap_or(0);
        let written = state.transferred + chunk.len() as u64;
        if written > declared {
            return Err(TransferError::SizeMismatch { declared, written });
        }

        self.conn
            .backend()
            .write_chunk(self.conn.user_id(), handle.id, chunk)?;
        state.transferred = written;
        state.state = HandleState::Writing;
        Ok(())
    }

    /// Write `data` in `chunk_size` pieces.
    pub fn write_all(&self, handle: &TransferHandle, data: &[u8], chunk_size: usize) -> Result<()> {
        self.write_all_with(handle, data, chunk_size, None)
    }

    pub(crate) fn write_all_with(
        &self,
        handle: &TransferHandle,
        data: &[u8],
        chunk_size: usize,
        cancel: Option<&CancelToken>,
    ) -> Result<()> {
        if chunk_size == 0 {
            return Err(TransferError::invalid("chunk size must be at least 1"));
        }
        for chunk in data.chunks(chunk_size) {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(TransferError::Cancelled);
            }
            self.write_chunk(handle, chunk)?;
        }
        Ok(())
    }

    /// Finalize the upload. Only after this returns is the object listed.
    pub fn close_for_write(&self, handle: &TransferHandle) -> Result<ObjectId> {
        let result = self.release(handle, HandleMode::Write, |_| {
            self.conn
                .backend()
                .close_write(self.conn.user_id(), handle.id)
        });
        match &result {
            Ok(object) => tracing::debug!(handle = %handle.id, object = %object, "upload closed"),
            Err(e) => tracing::warn!(handle = %handle.id, error = %e, "upload failed to finalize"),
        }
        result
    }

    /// Release an upload without finalizing it. Nothing becomes visible.
    pub fn abort_write(&self, handle: &TransferHandle) -> Result<()> {
        self.release(handle, HandleMode::Write, |state| {
            tracing::debug!(
                handle = %handle.id,
                written = state.transferred,
                "upload aborted"
            );
            self.conn
                .backend()
                .abort_write(self.conn.user_id(), handle.id)
        })
    }

    // ── Download ──────────────────────────────────────────────────────────────

    pub fn open_for_read(&self, object: &ObjectId) -> Result<TransferHandle> {
        let id = self
            .conn
            .backend()
            .open_object(self.conn.user_id(), object)?;
        tracing::debug!(handle = %id, object = %object, "download opened");
        Ok(self.register(id, HandleMode::Read, None))
    }

    /// Up to `max_length` bytes. A chunk shorter than `max_length` marks the
    /// end of the stream; further reads return empty chunks.
    pub fn read_chunk(&self, handle: &TransferHandle, max_length: usize) -> Result<Bytes> {
        let entry = self.entry(handle)?;
        let mut state = lock(&entry);
        if state.state == HandleState::Closed {
            return Err(TransferError::HandleClosed(handle.id));
        }
        if state.mode != HandleMode::Read {
            return Err(wrong_mode(handle));
        }
        if max_length == 0 || max_length > handle.max_chunk_size {
            return Err(TransferError::invalid(format!(
                "read length must be within 1..={}, got {max_length}",
                handle.max_chunk_size
            )));
        }

        let chunk = self
            .conn
            .backend()
            .read_chunk(self.conn.user_id(), handle.id, max_length)?;
        state.transferred += chunk.len() as u64;
        state.state = HandleState::Reading;
        Ok(chunk)
    }

    /// Read until a chunk shorter than `chunk_size` arrives.
    pub fn read_to_end(&self, handle: &TransferHandle, chunk_size: usize) -> Result<Bytes> {
        self.read_to_end_with(handle, chunk_size, None)
    }

    pub(crate) fn read_to_end_with(
        &self,
        handle: &TransferHandle,
        chunk_size: usize,
        cancel: Option<&CancelToken>,
    ) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(TransferError::Cancelled);
            }
            let chunk = self.read_chunk(handle, chunk_size)?;
            buf.extend_from_slice(&chunk);
            if chunk.len() < chunk_size {
                break;
            }
        }
        Ok(buf.freeze())
    }

    pub fn close_for_read(&self, handle: &TransferHandle) -> Result<()> {
        self.release(handle, HandleMode::Read, |state| {
            tracing::debug!(handle = %handle.id, read = state.transferred, "download closed");
            self.conn
                .backend()
                .close_read(self.conn.user_id(), handle.id)
        })
    }
}

fn wrong_mode(handle: &TransferHandle) -> TransferError {
    let mode = match handle.mode {
        HandleMode::Write => "writing",
        HandleMode::Read => "reading",
    };
    TransferError::invalid(format!("handle {} is open for {mode}", handle.id))
}
