//! Connection — a user identity bound to a shared backend.

use std::fmt;

use coffer_core::config::ConnectionConfig;
use coffer_core::crypto::{derive_public_key, Keypair};
use coffer_core::{Result, TransferError, UserId, UserWithPubKey};

use crate::backend::SharedBackend;

/// Cheap to clone; every clone talks to the same backend as the same user.
#[derive(Clone)]
pub struct Connection {
    backend: SharedBackend,
    user: UserWithPubKey,
}

impl Connection {
    /// Bind `user_id` to `backend`, deriving the public key from the
    /// hex-encoded private key.
    pub fn connect(
        backend: SharedBackend,
        user_id: impl Into<UserId>,
        private_key_hex: &str,
    ) -> Result<Self> {
        let pub_key = derive_public_key(private_key_hex)
            .map_err(|e| TransferError::invalid(format!("private key: {e}")))?;
        let user = UserWithPubKey::new(user_id, pub_key);
        tracing::info!(user = %user.user_id, "connected");
        Ok(Self { backend, user })
    }

    /// Connect as the user named in the `[connection]` config section.
    pub fn from_config(backend: SharedBackend, config: &ConnectionConfig) -> Result<Self> {
        if config.user_id.is_empty() {
            return Err(TransferError::invalid("connection.user_id is not set"));
        }
        Self::connect(backend, config.user_id.as_str(), &config.private_key)
    }

    /// Connect with an existing keypair.
    pub fn with_keypair(backend: SharedBackend, user_id: impl Into<UserId>, keypair: &Keypair) -> Self {
        Self {
            backend,
            user: UserWithPubKey::new(user_id, keypair.public_hex()),
        }
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    pub fn user(&self) -> &UserWithPubKey {
        &self.user
    }

    pub fn user_id(&self) -> &UserId {
        &self.user.user_id
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}
