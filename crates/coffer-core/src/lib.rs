//! coffer-core — shared types, error taxonomy, configuration, and crypto helpers.
//! All other Coffer crates depend on this one.

pub mod config;
pub mod crypto;
pub mod error;
pub mod ids;
pub mod object;
pub mod paging;

pub use error::{ErrorKind, Result, TransferError};
pub use ids::{ContainerId, ContextId, HandleId, ObjectId, UserId, UserWithPubKey};
pub use object::{ContainerInfo, ContainerKind, ContainerPolicy, ContainerSpec, ObjectInfo};
pub use paging::{PagingList, PagingQuery, SortOrder};
