//! Datagram text encoding. Tags are matched as case-sensitive prefixes.

use crate::channel::MSG_TAG;
use crate::protocol::{
    Datagram, HandshakeRequest, TAG_HANDSHAKE_ACK, TAG_HANDSHAKE_REPLY, TAG_HANDSHAKE_REQUEST,
    TAG_PUNCH,
};

const HS1_FIELDS: usize = 5;

/// Encode a datagram into the bytes sent over UDP.
pub fn encode_datagram(msg: &Datagram) -> Vec<u8> {
    let text = match msg {
        Datagram::HandshakeRequest(req) => format!(
            "{TAG_HANDSHAKE_REQUEST}:{}:{}:{}:{}",
            req.client_id, req.token, req.public_key, req.nonce
        ),
        Datagram::HandshakeReply { public_key } => {
            format!("{TAG_HANDSHAKE_REPLY}:{public_key}")
        }
        Datagram::HandshakeAck => TAG_HANDSHAKE_ACK.to_string(),
        Datagram::Punch => TAG_PUNCH.to_string(),
        Datagram::Chat(line) => line.clone(),
        Datagram::Other => String::new(),
    };
    text.into_bytes()
}

/// Classify and parse one datagram. Invalid UTF-8 is replaced, not rejected,
/// so junk simply lands in [`Datagram::Other`].
pub fn decode_datagram(bytes: &[u8]) -> Result<Datagram, WireError> {
    let text = String::from_utf8_lossy(bytes);
    if let Some(rest) = strip_tag(&text, TAG_HANDSHAKE_REQUEST) {
        let parts: Vec<&str> = rest.splitn(HS1_FIELDS - 1, ':').collect();
        if parts.len() != HS1_FIELDS - 1 {
            return Err(WireError::MalformedHandshake);
        }
        return Ok(Datagram::HandshakeRequest(HandshakeRequest {
            client_id: parts[0].to_string(),
            token: parts[1].to_string(),
            public_key: parts[2].to_string(),
            nonce: parts[3].to_string(),
        }));
    }
    if let Some(rest) = strip_tag(&text, TAG_HANDSHAKE_REPLY) {
        return Ok(Datagram::HandshakeReply {
            public_key: rest.to_string(),
        });
    }
    if text.starts_with(TAG_HANDSHAKE_ACK) {
        return Ok(Datagram::HandshakeAck);
    }
    if text.starts_with(TAG_PUNCH) {
        return Ok(Datagram::Punch);
    }
    if strip_tag(&text, MSG_TAG).is_some() {
        return Ok(Datagram::Chat(text.into_owned()));
    }
    Ok(Datagram::Other)
}

fn strip_tag<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    text.strip_prefix(tag)?.strip_prefix(':')
}

/// Error decoding a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("handshake request must have 5 fields")]
    MalformedHandshake,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> HandshakeRequest {
        HandshakeRequest {
            client_id: "0f6f2a1e-7c55-5a5e-8a39-2f1f4c0c1b11".into(),
            token: "ab".repeat(32),
            public_key: "A".repeat(43) + "=",
            nonce: "482913".into(),
        }
    }

    #[test]
    fn handshake_request_layout() {
        let bytes = encode_datagram(&Datagram::HandshakeRequest(sample_request()));
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("HS1:0f6f2a1e-"));
        assert!(text.ends_with(":482913"));
        assert_eq!(
            decode_datagram(&bytes).unwrap(),
            Datagram::HandshakeRequest(sample_request())
        );
    }

    #[test]
    fn short_handshake_request_is_malformed() {
        assert_eq!(
            decode_datagram(b"HS1:client:token"),
            Err(WireError::MalformedHandshake)
        );
    }

    #[test]
    fn literal_tags() {
        assert_eq!(decode_datagram(b"HS_ACK").unwrap(), Datagram::HandshakeAck);
        assert_eq!(decode_datagram(b"PUNCH").unwrap(), Datagram::Punch);
        assert_eq!(encode_datagram(&Datagram::HandshakeAck), b"HS_ACK");
        assert_eq!(encode_datagram(&Datagram::Punch), b"PUNCH");
        assert_eq!(
            decode_datagram(b"HS2:abc=").unwrap(),
            Datagram::HandshakeReply {
                public_key: "abc=".into()
            }
        );
    }

    #[test]
    fn chat_is_passed_through_whole() {
        assert_eq!(
            decode_datagram(b"MSG:a:b:c").unwrap(),
            Datagram::Chat("MSG:a:b:c".into())
        );
    }

    #[test]
    fn tags_are_case_sensitive_and_unknown_is_other() {
        for junk in [&b"hs1:a:b:c:d"[..], b"msg:x", b"HELLO", b"", &[0xff, 0xfe, 0x00]] {
            assert_eq!(decode_datagram(junk).unwrap(), Datagram::Other);
        }
    }
}
