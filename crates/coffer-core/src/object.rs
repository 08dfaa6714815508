//! Container and object descriptors.

use serde::{Deserialize, Serialize};

use crate::ids::{ContainerId, ContextId, ObjectId, UserId, UserWithPubKey};

/// The four container flavours the backend offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Thread,
    Store,
    Inbox,
    Kvdb,
}

impl ContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thread => "thread",
            Self::Store => "store",
            Self::Inbox => "inbox",
            Self::Kvdb => "kvdb",
        }
    }
}

/// Optional per-container policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContainerPolicy {
    /// Largest object the container accepts. None = unlimited.
    pub max_object_size: Option<u64>,
}

/// Container creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    pub context_id: ContextId,
    pub users: Vec<UserWithPubKey>,
    pub managers: Vec<UserWithPubKey>,
    pub public_meta: Vec<u8>,
    pub private_meta: Vec<u8>,
    pub policy: Option<ContainerPolicy>,
}

impl ContainerSpec {
    /// A container whose only member and manager is `owner`.
    pub fn owned_by(context_id: ContextId, owner: UserWithPubKey) -> Self {
        Self {
            context_id,
            users: vec![owner.clone()],
            managers: vec![owner],
            public_meta: Vec::new(),
            private_meta: Vec::new(),
            policy: None,
        }
    }

    pub fn with_private_meta(mut self, meta: impl Into<Vec<u8>>) -> Self {
        self.private_meta = meta.into();
        self
    }

    pub fn with_public_meta(mut self, meta: impl Into<Vec<u8>>) -> Self {
        self.public_meta = meta.into();
        self
    }

    pub fn with_policy(mut self, policy: ContainerPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// True if `user` is listed as a member or manager.
    pub fn has_member(&self, user: &UserId) -> bool {
        self.users
            .iter()
            .chain(self.managers.iter())
            .any(|u| &u.user_id == user)
    }
}

/// A created container as the backend reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    pub container_id: ContainerId,
    pub kind: ContainerKind,
    pub spec: ContainerSpec,
    pub creator: UserId,
    /// Unix ms.
    pub created_at: u64,
}

/// A finalized object. Only objects whose write handle was closed with a
/// matching size ever get an `ObjectInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub object_id: ObjectId,
    pub container_id: ContainerId,
    pub author: UserId,
    /// Size declared at open time, equal to the bytes written.
    pub size: u64,
    pub public_meta: Vec<u8>,
    pub private_meta: Vec<u8>,
    /// Unix ms at finalization.
    pub created_at: u64,
    /// BLAKE3 digest of the content.
    pub checksum: [u8; 32],
}

impl ObjectInfo {
    pub fn checksum_hex(&self) -> String {
        hex::encode(self.checksum)
    }
}
