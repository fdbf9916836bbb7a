//! Ephemeral key exchange and session key derivation.
//!
//! Each party generates a fresh X25519 keypair per session. The public half
//! travels as standard base64 of the raw 32 bytes; the shared secret is
//! expanded with HKDF-SHA256 into an encryption key and an authentication key.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of an X25519 public key and of a derived key.
pub const KEY_LEN: usize = 32;

/// HKDF info string used for domain separation of session keys.
pub const SESSION_KEY_INFO: &[u8] = b"runit-p2p-session";

/// Peer public key (32 bytes, X25519).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Create a `PublicKey` from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        PublicKey(bytes)
    }

    /// Text form used on the wire.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Parse the wire form. Fails on bad base64 or wrong length.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|_| KeyError::Decode)?;
        let bytes: [u8; KEY_LEN] = raw.try_into().map_err(|_| KeyError::Decode)?;
        Ok(PublicKey(bytes))
    }
}

/// Ephemeral X25519 keypair. The secret half never leaves this struct.
pub struct Keypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey(X25519PublicKey::from(&secret).to_bytes());
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// ECDH with the peer's public key. Rejects non-contributory results
    /// (low-order peer points produce an all-zero secret).
    pub fn shared_secret(&self, other_public: &PublicKey) -> Result<SharedSecret, KeyError> {
        let other = X25519PublicKey::from(other_public.0);
        let shared = self.secret.diffie_hellman(&other);
        if !shared.was_contributory() {
            return Err(KeyError::KeyAgreement);
        }
        Ok(SharedSecret(shared.to_bytes()))
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public.to_base64())
            .finish_non_exhaustive()
    }
}

/// Raw ECDH output. Only lives long enough to derive [`SessionKeys`].
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; KEY_LEN]);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Per-session keys: one for AEAD, one for the outer HMAC. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    encryption: [u8; KEY_LEN],
    authentication: [u8; KEY_LEN],
}

impl SessionKeys {
    pub fn from_parts(encryption: [u8; KEY_LEN], authentication: [u8; KEY_LEN]) -> Self {
        Self {
            encryption,
            authentication,
        }
    }

    pub fn encryption_key(&self) -> &[u8; KEY_LEN] {
        &self.encryption
    }

    pub fn authentication_key(&self) -> &[u8; KEY_LEN] {
        &self.authentication
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKeys(..)")
    }
}

/// HKDF-SHA256 with no salt, expanded to 64 bytes: encryption key first,
/// authentication key second. Same secret in, same keys out.
pub fn derive_session_keys(shared_secret: &SharedSecret) -> Result<SessionKeys, KeyError> {
    let hk = Hkdf::<Sha256>::new(None, shared_secret.as_bytes());
    let mut okm = [0u8; KEY_LEN * 2];
    hk.expand(SESSION_KEY_INFO, &mut okm)
        .map_err(|_| KeyError::Derivation)?;
    let mut encryption = [0u8; KEY_LEN];
    let mut authentication = [0u8; KEY_LEN];
    encryption.copy_from_slice(&okm[..KEY_LEN]);
    authentication.copy_from_slice(&okm[KEY_LEN..]);
    okm.zeroize();
    Ok(SessionKeys {
        encryption,
        authentication,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("malformed public key")]
    Decode,
    #[error("key agreement failed")]
    KeyAgreement,
    #[error("session key derivation failed")]
    Derivation,
}
