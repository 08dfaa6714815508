//! Inbox entries with attached files.
//!
//! An entry is sent in two steps. `send_files` uploads every attachment
//! into the inbox; `send_entry` then publishes the entry object, whose
//! public meta lists the attachment ids. Attachments that were uploaded
//! before a failure stay in the inbox.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use coffer_core::{
    ContainerId, ObjectId, ObjectInfo, PagingList, PagingQuery, Result, TransferError,
};

use crate::containers::ContainerApi;
use crate::file_transfer::FileSource;
use crate::transfer::TransferClient;

const ENTRY_KIND: &str = "inboxEntry";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Prepared,
    FilesSent,
    Sent,
    Error,
}

/// Public meta of an entry object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub kind: String,
    pub files: Vec<ObjectId>,
}

impl EntryMeta {
    /// Parse the public meta of a listed entry.
    pub fn from_info(info: &ObjectInfo) -> Result<Self> {
        let meta: Self = serde_json::from_slice(&info.public_meta).map_err(|e| {
            TransferError::invalid(format!("object {} is not an inbox entry: {e}", info.object_id))
        })?;
        if meta.kind != ENTRY_KIND {
            return Err(TransferError::invalid(format!(
                "object {} is not an inbox entry",
                info.object_id
            )));
        }
        Ok(meta)
    }
}

/// An inbox entry being assembled.
pub struct InboxEntryDraft {
    client: TransferClient,
    inbox: ContainerId,
    body: Bytes,
    files: Vec<FileSource>,
    file_ids: Vec<ObjectId>,
    state: EntryState,
}

impl InboxEntryDraft {
    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn inbox(&self) -> &ContainerId {
        &self.inbox
    }

    /// Ids of the attachments uploaded so far.
    pub fn file_ids(&self) -> &[ObjectId] {
        &self.file_ids
    }

    /// Upload every attachment. `Prepared → FilesSent`, or `Error`.
    pub fn send_files(&mut self) -> Result<()> {
        if self.state != EntryState::Prepared {
            return Err(TransferError::invalid(format!(
                "files can only be sent from a prepared entry, state is {:?}",
                self.state
            )));
        }
        for file in &self.files {
            match self.client.upload_source(&self.inbox, file) {
                Ok(id) => self.file_ids.push(id),
                Err(e) => {
                    tracing::warn!(inbox = %self.inbox, sent = self.file_ids.len(), error = %e, "inbox file upload failed");
                    self.state = EntryState::Error;
                    return Err(e);
                }
            }
        }
        self.state = EntryState::FilesSent;
        Ok(())
    }

    /// Publish the entry. `FilesSent → Sent`, or `Error`.
    pub fn send_entry(&mut self) -> Result<ObjectId> {
        if self.state != EntryState::FilesSent {
            return Err(TransferError::invalid(format!(
                "entry can only be sent after its files, state is {:?}",
                self.state
            )));
        }
        let meta = EntryMeta {
            kind: ENTRY_KIND.to_string(),
            files: self.file_ids.clone(),
        };
        let public_meta = serde_json::to_vec(&meta)
            .map_err(|e| TransferError::invalid(format!("entry meta: {e}")))?;

        match self.client.upload_buffer(
            &self.inbox,
            &public_meta,
            b"",
            &self.body,
            self.client.settings().write_chunk_size,
        ) {
            Ok(id) => {
                self.state = EntryState::Sent;
                tracing::info!(inbox = %self.inbox, entry = %id, files = self.file_ids.len(), "inbox entry sent");
                Ok(id)
            }
            Err(e) => {
                self.state = EntryState::Error;
                Err(e)
            }
        }
    }

    /// `send_files` then `send_entry`.
    pub fn send(mut self) -> Result<ObjectId> {
        self.send_files()?;
        self.send_entry()
    }
}

impl TransferClient {
    /// Start an entry for `inbox`, which must be an inbox container.
    pub fn prepare_entry(
        &self,
        inbox: &ContainerId,
        body: impl Into<Bytes>,
        files: Vec<FileSource>,
    ) -> Result<InboxEntryDraft> {
        ContainerApi::inboxes(self.connection().clone()).info(inbox)?;
        Ok(InboxEntryDraft {
            client: self.clone(),
            inbox: inbox.clone(),
            body: body.into(),
            files,
            file_ids: Vec::new(),
            state: EntryState::Prepared,
        })
    }

    /// Entry objects in `inbox`. Attachments are filtered out.
    pub fn list_entries(
        &self,
        inbox: &ContainerId,
        query: PagingQuery,
    ) -> Result<PagingList<ObjectInfo>> {
        let filter = serde_json::json!({ "kind": ENTRY_KIND }).to_string();
        ContainerApi::inboxes(self.connection().clone())
            .list_objects(inbox, &query.with_query_json(filter))
    }
}
