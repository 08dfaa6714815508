//! Backend trait — the boundary between the transfer client and whatever
//! actually stores the bytes.
//!
//! The real backend sits behind an encrypted connection; `MemoryBackend`
//! implements the same contract in-process. Every call names the calling
//! user so the backend can check capabilities.

use std::sync::Arc;

use bytes::Bytes;
use coffer_core::{
    ContainerId, ContainerInfo, ContainerKind, ContainerSpec, HandleId, ObjectId, ObjectInfo,
    PagingList, PagingQuery, Result, UserId,
};

/// Chunk RPCs and container calls consumed by the client.
///
/// Handles are single-owner: a handle opened by one user is not usable by
/// another. Calls on a released handle fail with `HandleClosed`.
pub trait Backend: Send + Sync {
    /// Largest chunk accepted by `write_chunk` and `read_chunk`.
    fn max_chunk_size(&self) -> usize;

    fn create_container(
        &self,
        caller: &UserId,
        kind: ContainerKind,
        spec: ContainerSpec,
    ) -> Result<ContainerId>;

    fn container_info(&self, caller: &UserId, container: &ContainerId) -> Result<ContainerInfo>;

    /// Finalized objects only. In-flight uploads are never listed.
    fn list_objects(
        &self,
        caller: &UserId,
        container: &ContainerId,
        query: &PagingQuery,
    ) -> Result<PagingList<ObjectInfo>>;

    fn object_info(&self, caller: &UserId, object: &ObjectId) -> Result<ObjectInfo>;

    /// Open a write handle for an object of exactly `size` bytes.
    fn create_object(
        &self,
        caller: &UserId,
        container: &ContainerId,
        public_meta: &[u8],
        private_meta: &[u8],
        size: u64,
    ) -> Result<HandleId>;

    /// Append the next sequential chunk.
    fn write_chunk(&self, caller: &UserId, handle: HandleId, chunk: &[u8]) -> Result<()>;

    /// Finalize and release the handle. The handle is released even when
    /// finalization fails.
    fn close_write(&self, caller: &UserId, handle: HandleId) -> Result<ObjectId>;

    /// Release a write handle without finalizing.
    fn abort_write(&self, caller: &UserId, handle: HandleId) -> Result<()>;

    fn open_object(&self, caller: &UserId, object: &ObjectId) -> Result<HandleId>;

    /// Up to `max_len` bytes from the current position. Past the end this
    /// returns an empty chunk, not an error.
    fn read_chunk(&self, caller: &UserId, handle: HandleId, max_len: usize) -> Result<Bytes>;

    fn close_read(&self, caller: &UserId, handle: HandleId) -> Result<()>;
}

/// The backend shared by every connection in a process.
pub type SharedBackend = Arc<dyn Backend>;
