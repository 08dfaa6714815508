//! Thread messages.
//!
//! A message is an ordinary object in a thread container: the body is the
//! object content and the metas are passed through untouched. Listing
//! downloads the bodies of the requested page only.

use bytes::Bytes;

use coffer_core::{ContainerId, ObjectId, ObjectInfo, PagingList, PagingQuery, Result};

use crate::containers::ContainerApi;
use crate::transfer::TransferClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    pub info: ObjectInfo,
    pub data: Bytes,
}

impl ThreadMessage {
    pub fn message_id(&self) -> &ObjectId {
        &self.info.object_id
    }
}

/// Message calls bound to one thread.
#[derive(Clone)]
pub struct Thread {
    client: TransferClient,
    thread: ContainerId,
}

impl Thread {
    pub fn id(&self) -> &ContainerId {
        &self.thread
    }

    pub fn send_message(&self, public_meta: &[u8], private_meta: &[u8], data: &[u8]) -> Result<ObjectId> {
        let id = self.client.upload_buffer(
            &self.thread,
            public_meta,
            private_meta,
            data,
            self.client.settings().write_chunk_size,
        )?;
        tracing::debug!(thread = %self.thread, message = %id, bytes = data.len(), "message sent");
        Ok(id)
    }

    /// One page of messages with their bodies.
    pub fn list_messages(&self, query: &PagingQuery) -> Result<PagingList<ThreadMessage>> {
        let page = ContainerApi::threads(self.client.connection().clone())
            .list_objects(&self.thread, query)?;
        let items = page
            .items
            .into_iter()
            .map(|info| {
                let data = self.client.download(&info.object_id)?;
                Ok(ThreadMessage { info, data })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(PagingList {
            items,
            total_count: page.total_count,
        })
    }
}

impl TransferClient {
    /// Message calls for `thread`, which must be a thread container.
    pub fn thread(&self, thread: &ContainerId) -> Result<Thread> {
        ContainerApi::threads(self.connection().clone()).info(thread)?;
        Ok(Thread {
            client: self.clone(),
            thread: thread.clone(),
        })
    }
}
