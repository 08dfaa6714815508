//! Identifiers handed out by the backend.
//!
//! Context, container, object and user ids are opaque strings. Handle ids
//! are arena indices into the backend's open-handle table and are never
//! reused within one backend instance.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Fresh random id (32 hex chars).
            pub fn generate() -> Self {
                Self(crate::crypto::random_id())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Authorization scope containing users and containers.
    ContextId
);
string_id!(
    /// A thread, store, inbox or key-value collection.
    ContainerId
);
string_id!(
    /// A finalized file or entry inside a container.
    ObjectId
);
string_id!(UserId);

/// Open read or write stream on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A container member: user id plus hex-encoded X25519 public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserWithPubKey {
    pub user_id: UserId,
    pub pub_key: String,
}

impl UserWithPubKey {
    pub fn new(user_id: impl Into<UserId>, pub_key: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            pub_key: pub_key.into(),
        }
    }
}
