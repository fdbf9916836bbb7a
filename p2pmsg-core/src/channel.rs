//! Secure channel codec for chat payloads.
//!
//! `MSG:<nonce>:<ciphertext>:<tag>:<mac>`, every field standard base64.
//! AES-256-GCM with a detached tag, then HMAC-SHA256 over
//! `nonce || ciphertext || tag` under the authentication key. The MAC is
//! checked first, in constant time, before the AEAD is attempted.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::keys::SessionKeys;

pub const MSG_TAG: &str = "MSG";
pub const NONCE_LEN: usize = 12;
pub const AEAD_TAG_LEN: usize = 16;
const FIELD_COUNT: usize = 5;

type HmacSha256 = Hmac<Sha256>;

/// Encrypt and authenticate `plaintext` into a wire string.
pub fn seal(keys: &SessionKeys, plaintext: &str) -> Result<String, ChannelError> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    seal_with_nonce(keys, &nonce, plaintext)
}

fn seal_with_nonce(
    keys: &SessionKeys,
    nonce: &[u8; NONCE_LEN],
    plaintext: &str,
) -> Result<String, ChannelError> {
    let cipher = Aes256Gcm::new_from_slice(keys.encryption_key())
        .map_err(|_| ChannelError::Key)?;
    let mut buf = plaintext.as_bytes().to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(nonce), b"", &mut buf)
        .map_err(|_| ChannelError::Encrypt)?;
    let mac = compute_mac(keys, nonce, &buf, &tag)?;
    Ok(format!(
        "{MSG_TAG}:{}:{}:{}:{}",
        STANDARD.encode(nonce),
        STANDARD.encode(&buf),
        STANDARD.encode(tag),
        STANDARD.encode(mac),
    ))
}

/// Verify and decrypt a wire string produced by [`seal`].
pub fn open(keys: &SessionKeys, wire: &str) -> Result<String, ChannelError> {
    let parts: Vec<&str> = wire.split(':').collect();
    if parts.len() != FIELD_COUNT || parts[0] != MSG_TAG {
        return Err(ChannelError::Malformed);
    }
    let nonce = decode_field(parts[1])?;
    let mut ciphertext = decode_field(parts[2])?;
    let tag = decode_field(parts[3])?;
    let mac = decode_field(parts[4])?;

    let mut check = new_mac(keys)?;
    check.update(&nonce);
    check.update(&ciphertext);
    check.update(&tag);
    check
        .verify_slice(&mac)
        .map_err(|_| ChannelError::Authentication)?;

    if nonce.len() != NONCE_LEN || tag.len() != AEAD_TAG_LEN {
        return Err(ChannelError::Malformed);
    }
    let cipher = Aes256Gcm::new_from_slice(keys.encryption_key())
        .map_err(|_| ChannelError::Key)?;
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&nonce),
            b"",
            &mut ciphertext,
            Tag::from_slice(&tag),
        )
        .map_err(|_| ChannelError::Decryption)?;
    Ok(String::from_utf8_lossy(&ciphertext).into_owned())
}

fn decode_field(field: &str) -> Result<Vec<u8>, ChannelError> {
    STANDARD.decode(field).map_err(|_| ChannelError::Malformed)
}

fn new_mac(keys: &SessionKeys) -> Result<HmacSha256, ChannelError> {
    <HmacSha256 as Mac>::new_from_slice(keys.authentication_key()).map_err(|_| ChannelError::Key)
}

fn compute_mac(
    keys: &SessionKeys,
    nonce: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<[u8; 32], ChannelError> {
    let mut mac = new_mac(keys)?;
    mac.update(nonce);
    mac.update(ciphertext);
    mac.update(tag);
    Ok(mac.finalize().into_bytes().into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid key")]
    Key,
    #[error("encryption failed")]
    Encrypt,
    #[error("malformed message")]
    Malformed,
    #[error("message authentication failed")]
    Authentication,
    #[error("decryption failed")]
    Decryption,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_keys() -> SessionKeys {
        let mut enc = [0u8; 32];
        let mut auth = [0u8; 32];
        OsRng.fill_bytes(&mut enc);
        OsRng.fill_bytes(&mut auth);
        SessionKeys::from_parts(enc, auth)
    }

    fn fields(wire: &str) -> Vec<Vec<u8>> {
        wire.split(':')
            .skip(1)
            .map(|f| STANDARD.decode(f).unwrap())
            .collect()
    }

    fn reassemble(fields: &[Vec<u8>]) -> String {
        let encoded: Vec<String> = fields.iter().map(|f| STANDARD.encode(f)).collect();
        format!("MSG:{}", encoded.join(":"))
    }

    #[test]
    fn seal_open_roundtrip() {
        let keys = test_keys();
        for text in ["hello", "", "ünïcödé 🚀", "colons:in:the:text"] {
            let wire = seal(&keys, text).unwrap();
            assert!(wire.starts_with("MSG:"));
            assert_eq!(wire.split(':').count(), 5);
            assert_eq!(open(&keys, &wire).unwrap(), text);
        }
    }

    #[test]
    fn fresh_nonce_per_message() {
        let keys = test_keys();
        let a = seal(&keys, "same").unwrap();
        let b = seal(&keys, "same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn any_flipped_bit_is_rejected() {
        let keys = test_keys();
        let wire = seal(&keys, "attack at dawn").unwrap();
        let original = fields(&wire);
        for field in 0..original.len() {
            for byte in 0..original[field].len() {
                for bit in 0..8 {
                    let mut tampered = original.clone();
                    tampered[field][byte] ^= 1 << bit;
                    let err = open(&keys, &reassemble(&tampered)).unwrap_err();
                    assert!(
                        matches!(err, ChannelError::Authentication | ChannelError::Decryption),
                        "field {field} byte {byte} bit {bit}: {err:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn valid_mac_but_corrupt_ciphertext_fails_aead() {
        let keys = test_keys();
        let wire = seal(&keys, "hello").unwrap();
        let mut parts = fields(&wire);
        parts[1][0] ^= 0x01;
        let mac = compute_mac(&keys, &parts[0], &parts[1], &parts[2]).unwrap();
        parts[3] = mac.to_vec();
        assert_eq!(
            open(&keys, &reassemble(&parts)),
            Err(ChannelError::Decryption)
        );
    }

    #[test]
    fn wrong_keys_fail_authentication() {
        let wire = seal(&test_keys(), "hello").unwrap();
        assert_eq!(open(&test_keys(), &wire), Err(ChannelError::Authentication));
    }

    #[test]
    fn wrong_field_count_is_malformed() {
        let keys = test_keys();
        assert_eq!(open(&keys, "MSG:AAAA:BBBB"), Err(ChannelError::Malformed));
        assert_eq!(open(&keys, "MSG:a:b:c:d:e"), Err(ChannelError::Malformed));
        assert_eq!(open(&keys, "MSG:***:AAAA:AAAA:AAAA"), Err(ChannelError::Malformed));
    }

    #[test]
    fn aes_256_gcm_known_answer() {
        // GCM test case 14: zero key, zero IV, one zero block.
        let keys = SessionKeys::from_parts([0u8; 32], [2u8; 32]);
        let wire = seal_with_nonce(&keys, &[0u8; NONCE_LEN], "\0".repeat(16).as_str()).unwrap();
        let parts = fields(&wire);
        assert_eq!(
            parts[1],
            [
                0xce, 0xa7, 0x40, 0x3d, 0x4d, 0x60, 0x6b, 0x6e, 0x07, 0x4e, 0xc5, 0xd3, 0xba, 0xf3,
                0x9d, 0x18
            ]
        );
        assert_eq!(
            parts[2],
            [
                0xd0, 0xd1, 0xc8, 0xa7, 0x99, 0x99, 0x6b, 0xf0, 0x26, 0x5b, 0x98, 0xb5, 0xd4, 0x8a,
                0xb9, 0x19
            ]
        );
        assert_eq!(open(&keys, &wire).unwrap(), "\0".repeat(16));
    }

    #[test]
    fn fixed_nonce_is_reproducible() {
        let keys = SessionKeys::from_parts([1u8; 32], [2u8; 32]);
        let nonce = [9u8; NONCE_LEN];
        let a = seal_with_nonce(&keys, &nonce, "x").unwrap();
        let b = seal_with_nonce(&keys, &nonce, "x").unwrap();
        assert_eq!(a, b);
    }
}
