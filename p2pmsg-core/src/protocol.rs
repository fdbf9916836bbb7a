//! p2pmsg wire protocol: datagram types and tags.

/// Handshake request tag (guest → host).
pub const TAG_HANDSHAKE_REQUEST: &str = "HS1";
/// Handshake reply tag (host → guest).
pub const TAG_HANDSHAKE_REPLY: &str = "HS2";
/// Handshake acknowledgment (guest → host).
pub const TAG_HANDSHAKE_ACK: &str = "HS_ACK";
/// NAT keepalive, either direction.
pub const TAG_PUNCH: &str = "PUNCH";

/// `HS1:<client_id>:<token>:<public_key>:<nonce>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub client_id: String,
    pub token: String,
    /// Guest public key, base64.
    pub public_key: String,
    /// Anti-replay filler; never interpreted.
    pub nonce: String,
}

/// All UDP datagram kinds. Text, UTF-8, colon-delimited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram {
    HandshakeRequest(HandshakeRequest),
    /// `HS2:<host public key, base64>`
    HandshakeReply { public_key: String },
    HandshakeAck,
    Punch,
    /// Whole `MSG:...` line; the channel codec splits it.
    Chat(String),
    /// Unrecognised tag.
    Other,
}
