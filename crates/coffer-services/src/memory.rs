//! In-process backend.
//!
//! Holds contexts, containers, finalized objects and the open-handle arena
//! in DashMaps, so independent handles can be driven from parallel tasks.
//! Uploads are buffered per handle and only become objects when the handle
//! is closed with the declared number of bytes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use dashmap::DashMap;

use coffer_core::config::BackendSettings;
use coffer_core::crypto::Hasher;
use coffer_core::paging::{matches_filter, SortKey};
use coffer_core::{
    ContainerId, ContainerInfo, ContainerKind, ContainerSpec, ContextId, HandleId, ObjectId,
    ObjectInfo, PagingList, PagingQuery, Result, TransferError, UserId,
};

use crate::backend::Backend;

struct ContainerRecord {
    info: ContainerInfo,
    /// Finalized objects, in finalization order.
    objects: Vec<ObjectId>,
}

struct StoredObject {
    info: ObjectInfo,
    seq: u64,
    data: Bytes,
}

enum OpenHandle {
    Write(PendingWrite),
    Read(ReadCursor),
}

struct PendingWrite {
    owner: UserId,
    container: ContainerId,
    declared: u64,
    public_meta: Vec<u8>,
    private_meta: Vec<u8>,
    buf: Vec<u8>,
    hasher: Hasher,
}

struct ReadCursor {
    owner: UserId,
    data: Bytes,
    position: usize,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// In-memory backend.
#[derive(Clone)]
pub struct MemoryBackend {
    settings: BackendSettings,
    contexts: Arc<DashMap<ContextId, HashSet<UserId>>>,
    containers: Arc<DashMap<ContainerId, ContainerRecord>>,
    objects: Arc<DashMap<ObjectId, StoredObject>>,
    handles: Arc<DashMap<HandleId, OpenHandle>>,
    next_handle: Arc<AtomicU64>,
    next_seq: Arc<AtomicU64>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_settings(BackendSettings::default())
    }

    pub fn with_settings(settings: BackendSettings) -> Self {
        Self {
            settings,
            contexts: Arc::new(DashMap::new()),
            containers: Arc::new(DashMap::new()),
            objects: Arc::new(DashMap::new()),
            handles: Arc::new(DashMap::new()),
            next_handle: Arc::new(AtomicU64::new(1)),
            next_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create (or extend) a context with the given members.
    pub fn register_context<I, U>(&self, context: impl Into<ContextId>, users: I)
    where
        I: IntoIterator<Item = U>,
        U: Into<UserId>,
    {
        let context = context.into();
        let mut members = self.contexts.entry(context.clone()).or_default();
        members.extend(users.into_iter().map(Into::into));
        tracing::info!(context = %context, members = members.len(), "context registered");
    }

    /// Handles currently open, across all users.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    fn allocate_handle(&self) -> HandleId {
        HandleId(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Error for a handle that is not in the table: ids below the counter
    /// were issued and since released.
    fn missing_handle(&self, handle: HandleId) -> TransferError {
        if handle.0 < self.next_handle.load(Ordering::Relaxed) {
            TransferError::HandleClosed(handle)
        } else {
            TransferError::invalid(format!("handle {handle} was never opened"))
        }
    }

    /// Container info, visible only to its members.
    fn member_view(&self, caller: &UserId, container: &ContainerId) -> Result<ContainerInfo> {
        let record = self
            .containers
            .get(container)
            .ok_or_else(|| TransferError::not_found(format!("container {container}")))?;
        if !record.info.spec.has_member(caller) {
            return Err(TransferError::not_found(format!("container {container}")));
        }
        Ok(record.info.clone())
    }

    fn check_chunk_len(&self, len: usize) -> Result<()> {
        if len > self.settings.max_chunk_size {
            return Err(TransferError::invalid(format!(
                "chunk of {len} bytes exceeds maximum of {}",
                self.settings.max_chunk_size
            )));
        }
        Ok(())
    }

    fn take_write(&self, caller: &UserId, handle: HandleId) -> Result<PendingWrite> {
        {
            let entry = self
                .handles
                .get(&handle)
                .ok_or_else(|| self.missing_handle(handle))?;
            match entry.value() {
                OpenHandle::Write(p) if p.owner == *caller => {}
                OpenHandle::Write(_) => {
                    return Err(TransferError::rejected(format!(
                        "handle {handle} belongs to another user"
                    )))
                }
                OpenHandle::Read(_) => {
                    return Err(TransferError::invalid(format!(
                        "handle {handle} is open for reading"
                    )))
                }
            }
        }
        match self.handles.remove(&handle) {
            Some((_, OpenHandle::Write(pending))) => Ok(pending),
            _ => Err(TransferError::HandleClosed(handle)),
        }
    }
}

impl Backend for MemoryBackend {
    fn max_chunk_size(&self) -> usize {
        self.settings.max_chunk_size
    }

    fn create_container(
        &self,
        caller: &UserId,
        kind: ContainerKind,
        spec: ContainerSpec,
    ) -> Result<ContainerId> {
        if spec.users.is_empty() {
            return Err(TransferError::invalid("container needs at least one user"));
        }
        {
            let members = self
                .contexts
                .get(&spec.context_id)
                .ok_or_else(|| TransferError::not_found(format!("context {}", spec.context_id)))?;
            if !members.contains(caller) {
                return Err(TransferError::rejected(format!(
                    "{caller} is not a member of context {}",
                    spec.context_id
                )));
            }
            if let Some(outsider) = spec
                .users
                .iter()
                .chain(spec.managers.iter())
                .find(|u| !members.contains(&u.user_id))
            {
                return Err(TransferError::rejected(format!(
                    "{} is not a member of context {}",
                    outsider.user_id, spec.context_id
                )));
            }
        }

        let container_id = ContainerId::generate();
        let info = ContainerInfo {
            container_id: container_id.clone(),
            kind,
            spec,
            creator: caller.clone(),
            created_at: now_ms(),
        };
        self.containers.insert(
            container_id.clone(),
            ContainerRecord {
                info,
                objects: Vec::new(),
            },
        );
        tracing::info!(container = %container_id, kind = kind.as_str(), "container created");
        Ok(container_id)
    }

    fn container_info(&self, caller: &UserId, container: &ContainerId) -> Result<ContainerInfo> {
        self.member_view(caller, container)
    }

    fn list_objects(
        &self,
        caller: &UserId,
        container: &ContainerId,
        query: &PagingQuery,
    ) -> Result<PagingList<ObjectInfo>> {
        query.validate()?;
        let filter = query.filter()?;
        let sort_key = query.sort_key()?;

        let ids = {
            let record = self
                .containers
                .get(container)
                .ok_or_else(|| TransferError::not_found(format!("container {container}")))?;
            if !record.info.spec.has_member(caller) {
                return Err(TransferError::not_found(format!("container {container}")));
            }
            record.objects.clone()
        };

        let mut found: Vec<(u64, ObjectInfo)> = ids
            .iter()
            .filter_map(|id| self.objects.get(id).map(|o| (o.seq, o.info.clone())))
            .filter(|(_, info)| {
                filter
                    .as_ref()
                    .map_or(true, |f| matches_filter(f, &info.public_meta))
            })
            .collect();

        match sort_key {
            SortKey::CreateDate => found.sort_by_key(|(seq, _)| *seq),
            SortKey::Size => found.sort_by_key(|(seq, info)| (info.size, *seq)),
        }

        let items: Vec<ObjectInfo> = found.into_iter().map(|(_, info)| info).collect();
        query.apply(items, |info| info.object_id.as_str())
    }

    fn object_info(&self, caller: &UserId, object: &ObjectId) -> Result<ObjectInfo> {
        let info = self
            .objects
            .get(object)
            .map(|o| o.info.clone())
            .ok_or_else(|| TransferError::not_found(format!("object {object}")))?;
        self.member_view(caller, &info.container_id)
            .map_err(|_| TransferError::not_found(format!("object {object}")))?;
        Ok(info)
    }

    fn create_object(
        &self,
        caller: &UserId,
        container: &ContainerId,
        public_meta: &[u8],
        private_meta: &[u8],
        size: u64,
    ) -> Result<HandleId> {
        let info = self
            .containers
            .get(container)
            .map(|r| r.info.clone())
            .ok_or_else(|| TransferError::rejected(format!("unknown container {container}")))?;
        if !info.spec.has_member(caller) {
            return Err(TransferError::rejected(format!(
                "{caller} has no write capability on container {container}"
            )));
        }
        if let Some(max) = info.spec.policy.as_ref().and_then(|p| p.max_object_size) {
            if size > max {
                return Err(TransferError::rejected(format!(
                    "object of {size} bytes exceeds container limit of {max}"
                )));
            }
        }

        let handle = self.allocate_handle();
        self.handles.insert(
            handle,
            OpenHandle::Write(PendingWrite {
                owner: caller.clone(),
                container: container.clone(),
                declared: size,
                public_meta: public_meta.to_vec(),
                private_meta: private_meta.to_vec(),
                buf: Vec::with_capacity(size.min(self.settings.max_chunk_size as u64) as usize),
                hasher: Hasher::new(),
            }),
        );
        tracing::debug!(handle = %handle, container = %container, size, "write handle opened");
        Ok(handle)
    }

    fn write_chunk(&self, caller: &UserId, handle: HandleId, chunk: &[u8]) -> Result<()> {
        self.check_chunk_len(chunk.len())?;
        let mut entry = self
            .handles
            .get_mut(&handle)
            .ok_or_else(|| self.missing_handle(handle))?;
        let pending = match entry.value_mut() {
            OpenHandle::Write(p) if p.owner == *caller => p,
            OpenHandle::Write(_) => {
                return Err(TransferError::rejected(format!(
                    "handle {handle} belongs to another user"
                )))
            }
            OpenHandle::Read(_) => {
                return Err(TransferError::invalid(format!(
                    "handle {handle} is open for reading"
                )))
            }
        };

        let written = pending.buf.len() as u64 + chunk.len() as u64;
        if written > pending.declared {
            return Err(TransferError::SizeMismatch {
                declared: pending.declared,
                written,
            });
        }
        pending.buf.extend_from_slice(chunk);
        pending.hasher.update(chunk);
        tracing::trace!(handle = %handle, bytes = chunk.len(), written, "chunk written");
        Ok(())
    }

    fn close_write(&self, caller: &UserId, handle: HandleId) -> Result<ObjectId> {
        let pending = self.take_write(caller, handle)?;
        let written = pending.buf.len() as u64;
        if written != pending.declared {
            tracing::warn!(
                handle = %handle,
                declared = pending.declared,
                written,
                "rejecting finalize: size mismatch"
            );
            return Err(TransferError::SizeMismatch {
                declared: pending.declared,
                written,
            });
        }

        let object_id = ObjectId::generate();
        let info = ObjectInfo {
            object_id: object_id.clone(),
            container_id: pending.container.clone(),
            author: pending.owner,
            size: written,
            public_meta: pending.public_meta,
            private_meta: pending.private_meta,
            created_at: now_ms(),
            checksum: pending.hasher.finalize(),
        };
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        // Object first, then the container's list, so a listing never sees
        // an id it cannot resolve.
        self.objects.insert(
            object_id.clone(),
            StoredObject {
                info,
                seq,
                data: Bytes::from(pending.buf),
            },
        );
        match self.containers.get_mut(&pending.container) {
            Some(mut record) => record.objects.push(object_id.clone()),
            None => {
                self.objects.remove(&object_id);
                return Err(TransferError::not_found(format!(
                    "container {}",
                    pending.container
                )));
            }
        }

        tracing::info!(
            object = %object_id,
            container = %pending.container,
            bytes = written,
            "object finalized"
        );
        Ok(object_id)
    }

    fn abort_write(&self, caller: &UserId, handle: HandleId) -> Result<()> {
        let pending = self.take_write(caller, handle)?;
        tracing::debug!(
            handle = %handle,
            container = %pending.container,
            discarded = pending.buf.len(),
            "write handle aborted"
        );
        Ok(())
    }

    fn open_object(&self, caller: &UserId, object: &ObjectId) -> Result<HandleId> {
        let (container, data) = self
            .objects
            .get(object)
            .map(|o| (o.info.container_id.clone(), o.data.clone()))
            .ok_or_else(|| TransferError::not_found(format!("object {object}")))?;
        self.member_view(caller, &container)
            .map_err(|_| TransferError::not_found(format!("object {object}")))?;

        let handle = self.allocate_handle();
        self.handles.insert(
            handle,
            OpenHandle::Read(ReadCursor {
                owner: caller.clone(),
                data,
                position: 0,
            }),
        );
        tracing::debug!(handle = %handle, object = %object, "read handle opened");
        Ok(handle)
    }

    fn read_chunk(&self, caller: &UserId, handle: HandleId, max_len: usize) -> Result<Bytes> {
        if max_len == 0 {
            return Err(TransferError::invalid("read length must be at least 1"));
        }
        self.check_chunk_len(max_len)?;
        let mut entry = self
            .handles
            .get_mut(&handle)
            .ok_or_else(|| self.missing_handle(handle))?;
        let cursor = match entry.value_mut() {
            OpenHandle::Read(c) if c.owner == *caller => c,
            OpenHandle::Read(_) => {
                return Err(TransferError::rejected(format!(
                    "handle {handle} belongs to another user"
                )))
            }
            OpenHandle::Write(_) => {
                return Err(TransferError::invalid(format!(
                    "handle {handle} is open for writing"
                )))
            }
        };

        let end = cursor.data.len().min(cursor.position + max_len);
        let chunk = cursor.data.slice(cursor.position..end);
        cursor.position = end;
        tracing::trace!(handle = %handle, bytes = chunk.len(), "chunk read");
        Ok(chunk)
    }

    fn close_read(&self, caller: &UserId, handle: HandleId) -> Result<()> {
        {
            let entry = self
                .handles
                .get(&handle)
                .ok_or_else(|| self.missing_handle(handle))?;
            match entry.value() {
                OpenHandle::Read(c) if c.owner == *caller => {}
                OpenHandle::Read(_) => {
                    return Err(TransferError::rejected(format!(
                        "handle {handle} belongs to another user"
                    )))
                }
                OpenHandle::Write(_) => {
                    return Err(TransferError::invalid(format!(
                        "handle {handle} is open for writing"
                    )))
                }
            }
        }
        self.handles
            .remove(&handle)
            .ok_or(TransferError::HandleClosed(handle))?;
        tracing::debug!(handle = %handle, "read handle closed");
        Ok(())
    }
}
