//! coffer-services — the chunked transfer client and everything layered on
//! it: the backend boundary, an in-memory backend, RAII handle guards,
//! whole-object helpers, background tasks, thread messages, kvdb entries
//! and inbox entries.

pub mod backend;
pub mod connection;
pub mod containers;
pub mod file_transfer;
pub mod guard;
pub mod inbox;
pub mod kvdb;
pub mod memory;
pub mod task;
pub mod thread;
pub mod transfer;


pub use backend::{Backend, SharedBackend};
pub use connection::Connection;
pub use containers::ContainerApi;
pub use file_transfer::FileSource;
pub use guard::{ReadGuard, WriteGuard};
pub use inbox::{EntryMeta, EntryState, InboxEntryDraft};
pub use kvdb::{Kvdb, KvdbEntry};
pub use memory::MemoryBackend;
pub use task::{spawn_download, spawn_upload, CancelToken, TransferTask};
pub use thread::{Thread, ThreadMessage};
pub use transfer::{HandleMode, HandleState, TransferClient, TransferHandle};
