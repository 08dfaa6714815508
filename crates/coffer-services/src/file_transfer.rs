//! Whole-object helpers on top of the chunk protocol: upload a buffer or a
//! local file, download into memory with checksum verification.

use std::fs::File;
use std::path::Path;

use anyhow::Context;
use bytes::Bytes;
use memmap2::Mmap;

use coffer_core::crypto;
use coffer_core::{ContainerId, ObjectId, Result, TransferError};

use crate::task::CancelToken;
use crate::transfer::TransferClient;

/// Content plus metadata for one object to be uploaded.
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    pub public_meta: Vec<u8>,
    pub private_meta: Vec<u8>,
    pub data: Bytes,
}

impl FileSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn with_public_meta(mut self, meta: impl Into<Vec<u8>>) -> Self {
        self.public_meta = meta.into();
        self
    }

    pub fn with_private_meta(mut self, meta: impl Into<Vec<u8>>) -> Self {
        self.private_meta = meta.into();
        self
    }
}

impl TransferClient {
    /// Upload `data` as one object, written in `chunk_size` pieces.
    pub fn upload_buffer(
        &self,
        container: &ContainerId,
        public_meta: &[u8],
        private_meta: &[u8],
        data: &[u8],
        chunk_size: usize,
    ) -> Result<ObjectId> {
        upload_with(self, container, public_meta, private_meta, data, chunk_size, None)
    }

    /// Upload a `FileSource` using the configured write chunk size.
    pub fn upload_source(&self, container: &ContainerId, source: &FileSource) -> Result<ObjectId> {
        self.upload_buffer(
            container,
            &source.public_meta,
            &source.private_meta,
            &source.data,
            self.settings().write_chunk_size,
        )
    }

    /// Upload a local file. The public meta records the file name and size
    /// as JSON so the object can be found with a `queryAsJson` filter.
    pub fn upload_path(
        &self,
        container: &ContainerId,
        path: &Path,
        chunk_size: usize,
    ) -> anyhow::Result<ObjectId> {
        let file = File::open(path)
            .with_context(|| format!("failed to open file: {}", path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("failed to stat file: {}", path.display()))?
            .len();

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");
        let public_meta = serde_json::to_vec(&serde_json::json!({ "name": name, "size": len }))?;

        // Mapping a zero-length file fails on some platforms.
        let id = if len == 0 {
            self.upload_buffer(container, &public_meta, b"", &[], chunk_size)
        } else {
            // Safety: file is opened read-only and we don't mutate the mmap
            let mmap = unsafe {
                Mmap::map(&file).with_context(|| format!("failed to mmap file: {}", path.display()))?
            };
            self.upload_buffer(container, &public_meta, b"", &mmap, chunk_size)
        }
        .with_context(|| format!("failed to upload {}", path.display()))?;

        tracing::info!(object = %id, path = %path.display(), bytes = len, "file uploaded");
        Ok(id)
    }

    /// Download a whole object using the configured read chunk size.
    pub fn download(&self, object: &ObjectId) -> Result<Bytes> {
        self.download_to_buffer(object, self.settings().read_chunk_size)
    }

    /// Download a whole object into memory.
    pub fn download_to_buffer(&self, object: &ObjectId, chunk_size: usize) -> Result<Bytes> {
        download_with(self, object, chunk_size, None)
    }
}

pub(crate) fn upload_with(
    client: &TransferClient,
    container: &ContainerId,
    public_meta: &[u8],
    private_meta: &[u8],
    data: &[u8],
    chunk_size: usize,
    cancel: Option<&CancelToken>,
) -> Result<ObjectId> {
    let declared = i64::try_from(data.len())
        .map_err(|_| TransferError::invalid(format!("{} bytes is too large", data.len())))?;
    let upload = client.begin_upload(container, public_meta, private_meta, declared)?;
    // On error the guard aborts the upload.
    client.write_all_with(upload.handle(), data, chunk_size, cancel)?;
    if cancel.is_some_and(CancelToken::is_cancelled) {
        return Err(TransferError::Cancelled);
    }
    let id = upload.finish()?;
    tracing::debug!(object = %id, bytes = data.len(), "buffer uploaded");
    Ok(id)
}

pub(crate) fn download_with(
    client: &TransferClient,
    object: &ObjectId,
    chunk_size: usize,
    cancel: Option<&CancelToken>,
) -> Result<Bytes> {
    let download = client.begin_download(object)?;
    let data = client.read_to_end_with(download.handle(), chunk_size, cancel)?;
    download.close()?;

    if client.settings().verify_checksums {
        let conn = client.connection();
        let info = conn.backend().object_info(conn.user_id(), object)?;
        if crypto::hash(&data) != info.checksum {
            tracing::warn!(object = %object, expected = %info.checksum_hex(), "checksum mismatch");
            return Err(TransferError::rejected(format!(
                "checksum mismatch for object {object}"
            )));
        }
    }
    Ok(data)
}
