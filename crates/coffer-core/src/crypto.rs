//! Cryptographic helpers for Coffer.
//!
//! Provides two things:
//!   1. BLAKE3 hashing — content checksums recorded when an object is finalized
//!   2. X25519 keypairs — deriving the public key a user is registered under
//!
//! Encryption of object content is the backend's business and does not
//! happen here. Private key material derives ZeroizeOnDrop.

use rand::RngCore;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

// ── BLAKE3 ────────────────────────────────────────────────────────────────────

/// Hash a byte slice, returning a 32-byte BLAKE3 digest.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Incremental BLAKE3 hasher for payloads that arrive in chunks.
///
/// # Example
/// ```
/// use coffer_core::crypto::Hasher;
/// let mut h = Hasher::new();
/// h.update(b"hello ");
/// h.update(b"world");
/// let digest = h.finalize();
/// assert_eq!(digest, coffer_core::crypto::hash(b"hello world"));
/// ```
#[derive(Clone)]
pub struct Hasher(blake3::Hasher);

impl Hasher {
    pub fn new() -> Self {
        Self(blake3::Hasher::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(&self) -> [u8; 32] {
        *self.0.finalize().as_bytes()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Random 128-bit identifier, hex-encoded.
pub fn random_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ── Keypair ───────────────────────────────────────────────────────────────────

/// A user's static X25519 keypair.
///
/// The public key is what container member lists carry. The private key
/// never leaves this struct except through `private_bytes`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Keypair {
    private: Zeroizing<[u8; 32]>,
    pub public: [u8; 32],
}

impl Keypair {
    /// Generate a new random X25519 keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = PublicKey::from(&secret);
        Self {
            private: Zeroizing::new(secret.to_bytes()),
            public: *public.as_bytes(),
        }
    }

    /// Reconstruct a keypair from stored private key bytes.
    /// The public key is derived deterministically from the private key.
    pub fn from_private(private_bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(private_bytes);
        let public = PublicKey::from(&secret);
        Self {
            private: Zeroizing::new(private_bytes),
            public: *public.as_bytes(),
        }
    }

    /// Parse a hex-encoded 32-byte private key.
    pub fn from_private_hex(private_hex: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(hex::decode(private_hex.trim()).map_err(|_| CryptoError::NotHex)?);
        let private: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::BadKeyLength(bytes.len()))?;
        Ok(Self::from_private(private))
    }

    pub fn private_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(*self.private)
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.public)
    }
}

/// Derive the hex-encoded public key for a hex-encoded private key.
pub fn derive_public_key(private_hex: &str) -> Result<String, CryptoError> {
    Ok(Keypair::from_private_hex(private_hex)?.public_hex())
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("private key is not valid hex")]
    NotHex,

    #[error("private key must be 32 bytes, got {0}")]
    BadKeyLength(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
