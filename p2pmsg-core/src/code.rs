//! Session codes and the tokens derived from them.
//!
//! The host picks a 16-digit code and reads it out to the guest. Only the
//! SHA-256 of the code (lowercase hex) is ever put on the wire.

use std::fmt;

use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const SESSION_CODE_LEN: usize = 16;

/// Human-shared 16-digit session secret.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCode(String);

impl SessionCode {
    /// Random code; every digit is drawn independently.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let digits: String = (0..SESSION_CODE_LEN)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect();
        SessionCode(digits)
    }

    /// Accept exactly 16 ASCII digits (surrounding whitespace is trimmed).
    pub fn parse(input: &str) -> Result<Self, CodeError> {
        let s = input.trim();
        if s.len() != SESSION_CODE_LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CodeError::InvalidFormat);
        }
        Ok(SessionCode(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn token(&self) -> SessionToken {
        let digest = Sha256::digest(self.0.as_bytes());
        SessionToken(to_hex(&digest))
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionCode(****)")
    }
}

/// One-way hash of a [`SessionCode`]; what the guest proves it knows.
#[derive(Debug, Clone)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against a token received from the network.
    pub fn matches(&self, presented: &str) -> bool {
        self.0.as_bytes().ct_eq(presented.as_bytes()).into()
    }
}

/// Random six-digit value appended to handshake requests.
pub fn anti_replay_nonce() -> u32 {
    rand::thread_rng().gen_range(100_000..=999_999)
}

fn to_hex(bytes: &[u8]) -> String {
    use fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodeError {
    #[error("session code must be 16 digits")]
    InvalidFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_code_is_sixteen_digits() {
        for _ in 0..32 {
            let code = SessionCode::generate();
            assert_eq!(code.as_str().len(), SESSION_CODE_LEN);
            assert!(code.as_str().bytes().all(|b| b.is_ascii_digit()));
            assert!(SessionCode::parse(code.as_str()).is_ok());
        }
    }

    #[test]
    fn parse_rejects_bad_codes() {
        for bad in ["", "123", "12345678901234567", "12345678901234a6", "1234 5678 9012 3456"] {
            assert_eq!(SessionCode::parse(bad), Err(CodeError::InvalidFormat), "{bad:?}");
        }
        assert!(SessionCode::parse(" 1234567890123456\n").is_ok());
    }

    #[test]
    fn token_is_sha256_hex_of_code() {
        let code = SessionCode::parse("1234567890123456").unwrap();
        let token = code.token();
        assert_eq!(token.as_str().len(), 64);
        assert_eq!(
            token.as_str(),
            to_hex(&Sha256::digest(b"1234567890123456"))
        );
        assert!(token.matches(token.as_str()));
        assert!(!token.matches(SessionCode::parse("1234567890123457").unwrap().token().as_str()));
        assert!(!token.matches(""));
    }

    #[test]
    fn nonce_is_six_digits() {
        for _ in 0..64 {
            let n = anti_replay_nonce();
            assert!((100_000..=999_999).contains(&n));
        }
    }
}
