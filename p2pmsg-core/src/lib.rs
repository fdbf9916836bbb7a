//! p2pmsg protocol core: manually bootstrapped, end-to-end encrypted UDP chat.
//! Host-driven: no I/O; host passes datagrams and receives actions.

pub mod allowlist;
pub mod channel;
pub mod client_id;
pub mod code;
pub mod keys;
pub mod peerlock;
pub mod protocol;
pub mod ratelimit;
pub mod session;
pub mod wire;

pub use allowlist::AllowList;
pub use client_id::Fingerprint;
pub use code::{CodeError, SessionCode, SessionToken};
pub use keys::{KeyError, Keypair, PublicKey, SessionKeys};
pub use peerlock::PeerLock;
pub use protocol::{Datagram, HandshakeRequest};
pub use ratelimit::RateLimiter;
pub use wire::{decode_datagram, encode_datagram, WireError};
pub use session::{Action, ChatError, Config, Dropped, Role, SessionCore, SessionState};
