//! Host-driven API: SessionCore receives datagrams from the host, returns actions.
//!
//! One `SessionCore` is one session. It is built already in the awaiting
//! state for its role, moves to established at most once, and is closed by
//! the host on teardown. It never touches sockets, clocks or the console.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use crate::allowlist::AllowList;
use crate::channel::{self, ChannelError};
use crate::code::{anti_replay_nonce, SessionCode, SessionToken};
use crate::keys::{derive_session_keys, KeyError, Keypair, PublicKey, SessionKeys};
use crate::peerlock::PeerLock;
use crate::protocol::{Datagram, HandshakeRequest};
use crate::ratelimit::{RateLimiter, DEFAULT_BAN_WINDOW, DEFAULT_FAILURE_THRESHOLD};
use crate::wire::{decode_datagram, encode_datagram, WireError};

/// Core-level session settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Handshake failures from one IP before it is banned.
    pub failure_threshold: u32,
    /// How long a ban lasts.
    pub ban_window: Duration,
    /// Accept nothing before the peer lock is set.
    pub stealth: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            ban_window: DEFAULT_BAN_WINDOW,
            stealth: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Guest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHandshake,
    Established,
    Closed,
}

enum RoleState {
    Host {
        token: SessionToken,
        allowed: AllowList,
        /// HS2 already sent, replayed to the same guest if it retransmits HS1.
        reply: Option<Vec<u8>>,
        guest_id: Option<String>,
    },
    Guest {
        host: SocketAddr,
        request: Vec<u8>,
        /// Consumed when the host's reply arrives.
        keypair: Option<Keypair>,
    },
}

/// Main coordinator for one session.
pub struct SessionCore {
    role: RoleState,
    state: SessionState,
    keys: Option<SessionKeys>,
    peer: Option<SocketAddr>,
    lock: PeerLock,
    limiter: RateLimiter,
}

impl SessionCore {
    /// Host side: accept an `HS1` from an allow-listed client presenting
    /// the token for `code`.
    pub fn host(config: &Config, code: &SessionCode, allowed: AllowList) -> Self {
        Self::with_role(
            config,
            RoleState::Host {
                token: code.token(),
                allowed,
                reply: None,
                guest_id: None,
            },
            None,
        )
    }

    /// Guest side: a fresh keypair and a ready-to-send `HS1` for `host`.
    pub fn guest(config: &Config, code: &SessionCode, client_id: &str, host: SocketAddr) -> Self {
        let keypair = Keypair::generate();
        let request = encode_datagram(&Datagram::HandshakeRequest(HandshakeRequest {
            client_id: client_id.to_string(),
            token: code.token().as_str().to_string(),
            public_key: keypair.public_key().to_base64(),
            nonce: anti_replay_nonce().to_string(),
        }));
        Self::with_role(
            config,
            RoleState::Guest {
                host,
                request,
                keypair: Some(keypair),
            },
            Some(host),
        )
    }

    fn with_role(config: &Config, role: RoleState, peer: Option<SocketAddr>) -> Self {
        Self {
            role,
            state: SessionState::AwaitingHandshake,
            keys: None,
            peer,
            lock: PeerLock::new(config.stealth),
            limiter: RateLimiter::new(config.failure_threshold, config.ban_window),
        }
    }

    pub fn role(&self) -> Role {
        match self.role {
            RoleState::Host { .. } => Role::Host,
            RoleState::Guest { .. } => Role::Guest,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state == SessionState::Established
    }

    /// Where chat and keepalives go, once known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn peer_lock(&self) -> &PeerLock {
        &self.lock
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Guest only: the `HS1` to (re)send while the handshake is pending.
    pub fn handshake_request(&self) -> Option<(SocketAddr, Vec<u8>)> {
        match &self.role {
            RoleState::Guest { host, request, .. }
                if self.state == SessionState::AwaitingHandshake =>
            {
                Some((*host, request.clone()))
            }
            _ => None,
        }
    }

    /// `PUNCH` for the peer, if one is known and the session is still open.
    pub fn keepalive(&self) -> Option<(SocketAddr, Vec<u8>)> {
        if self.state == SessionState::Closed {
            return None;
        }
        self.peer
            .map(|peer| (peer, encode_datagram(&Datagram::Punch)))
    }

    /// Encrypt one line of chat for the peer.
    pub fn seal_chat(&self, text: &str) -> Result<(SocketAddr, Vec<u8>), ChatError> {
        if self.state == SessionState::Closed {
            return Err(ChatError::Closed);
        }
        let peer = self.peer.ok_or(ChatError::NoPeer)?;
        let keys = self.keys.as_ref().ok_or(ChatError::NotEstablished)?;
        let line = channel::seal(keys, text)?;
        Ok((peer, encode_datagram(&Datagram::Chat(line))))
    }

    /// Process one inbound datagram. Every `Err` means "drop silently"; the
    /// reason is for the host's logs only and is never sent back.
    pub fn on_datagram(
        &mut self,
        from: SocketAddr,
        bytes: &[u8],
        now: Instant,
    ) -> Result<Vec<Action>, Dropped> {
        if self.state == SessionState::Closed {
            return Err(Dropped::Closed);
        }
        let ip = from.ip();
        if self.peer.is_none() && self.lock.accepts(&ip) && !self.limiter.is_banned(&ip, now) {
            self.peer = Some(from);
        }

        let msg = match decode_datagram(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                // Only a malformed HS1 fails to decode.
                self.handshake_failure(ip, now)?;
                return Err(e.into());
            }
        };

        match msg {
            Datagram::HandshakeRequest(req) => self.on_handshake_request(from, req, now),
            Datagram::HandshakeReply { public_key } => self.on_handshake_reply(from, &public_key),
            Datagram::HandshakeAck => {
                self.check_lock(from)?;
                if self.role() != Role::Host {
                    return Err(Dropped::Unexpected);
                }
                Ok(vec![Action::Acknowledged])
            }
            Datagram::Punch => Ok(Vec::new()),
            Datagram::Chat(line) => {
                self.check_lock(from)?;
                let keys = self.keys.as_ref().ok_or(Dropped::Unexpected)?;
                let text = channel::open(keys, &line)?;
                Ok(vec![Action::Deliver(text)])
            }
            Datagram::Other => {
                self.check_lock(from)?;
                Ok(Vec::new())
            }
        }
    }

    /// Count a failed handshake attempt from `ip`. Only a host still waiting
    /// for its guest counts; a banned source is reported as such.
    fn handshake_failure(&mut self, ip: IpAddr, now: Instant) -> Result<(), Dropped> {
        if self.role() != Role::Host || self.state != SessionState::AwaitingHandshake {
            return Ok(());
        }
        if self.limiter.is_banned(&ip, now) {
            return Err(Dropped::BannedSource);
        }
        self.limiter.record_failure(ip, now);
        Ok(())
    }

    fn check_lock(&self, from: SocketAddr) -> Result<(), Dropped> {
        if self.lock.accepts(&from.ip()) {
            Ok(())
        } else {
            Err(Dropped::UnauthorizedSource)
        }
    }

    fn on_handshake_request(
        &mut self,
        from: SocketAddr,
        req: HandshakeRequest,
        now: Instant,
    ) -> Result<Vec<Action>, Dropped> {
        let ip = from.ip();
        if self.state == SessionState::AwaitingHandshake && self.limiter.is_banned(&ip, now) {
            return Err(Dropped::BannedSource);
        }
        let RoleState::Host {
            token,
            allowed,
            reply,
            guest_id,
        } = &mut self.role
        else {
            return Err(Dropped::Unexpected);
        };

        if self.state == SessionState::Established {
            // Keys are derived once. The only HS1 still answered is a
            // retransmission from the locked guest whose HS2 went missing.
            let same_guest = self.lock.authorized_ip() == Some(ip)
                && guest_id.as_deref() == Some(req.client_id.as_str())
                && token.matches(&req.token);
            return match reply {
                Some(hs2) if same_guest => Ok(vec![Action::Send(from, hs2.clone())]),
                _ if self.lock.accepts(&ip) => Err(Dropped::Unexpected),
                _ => Err(Dropped::UnauthorizedSource),
            };
        }

        if !allowed.contains(&req.client_id) || !token.matches(&req.token) {
            self.limiter.record_failure(ip, now);
            return Err(Dropped::Rejected);
        }

        let keypair = Keypair::generate();
        let keys = match PublicKey::from_base64(&req.public_key)
            .and_then(|guest_public| keypair.shared_secret(&guest_public))
            .and_then(|shared| derive_session_keys(&shared))
        {
            Ok(keys) => keys,
            Err(e) => {
                self.limiter.record_failure(ip, now);
                return Err(e.into());
            }
        };
        let hs2 = encode_datagram(&Datagram::HandshakeReply {
            public_key: keypair.public_key().to_base64(),
        });

        *reply = Some(hs2.clone());
        *guest_id = Some(req.client_id);
        self.lock.lock_to(ip);
        self.limiter.reset(&ip);
        self.peer = Some(from);
        self.keys = Some(keys);
        self.state = SessionState::Established;
        Ok(vec![Action::Send(from, hs2), Action::Established(from)])
    }

    fn on_handshake_reply(
        &mut self,
        from: SocketAddr,
        public_key: &str,
    ) -> Result<Vec<Action>, Dropped> {
        let RoleState::Guest { keypair, .. } = &mut self.role else {
            return Err(Dropped::Unexpected);
        };
        let Some(own) = keypair.as_ref() else {
            return Err(Dropped::Unexpected);
        };
        let host_public = PublicKey::from_base64(public_key)?;
        let keys = derive_session_keys(&own.shared_secret(&host_public)?)?;

        *keypair = None;
        // The reply may come from a different NAT mapping than the address
        // the operator typed in; from here on that mapping is the peer.
        self.lock.lock_to(from.ip());
        self.peer = Some(from);
        self.keys = Some(keys);
        self.state = SessionState::Established;
        Ok(vec![
            Action::Send(from, encode_datagram(&Datagram::HandshakeAck)),
            Action::Established(from),
        ])
    }

    /// Terminal. Drops (and thereby wipes) all key material.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
        self.keys = None;
        match &mut self.role {
            RoleState::Host { reply, .. } => *reply = None,
            RoleState::Guest { keypair, .. } => *keypair = None,
        }
    }
}

/// What the host should do after a datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send bytes to an address.
    Send(SocketAddr, Vec<u8>),
    /// Handshake completed with this peer.
    Established(SocketAddr),
    /// Decrypted chat text from the peer.
    Deliver(String),
    /// The guest confirmed the handshake.
    Acknowledged,
}

/// Why an inbound datagram was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Dropped {
    #[error("source is rate limited")]
    BannedSource,
    #[error("source is not the locked peer")]
    UnauthorizedSource,
    #[error("unknown client id or wrong session token")]
    Rejected,
    #[error("not expected in the current role or state")]
    Unexpected,
    #[error("session closed")]
    Closed,
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Why an outbound chat line could not be sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("peer not yet known")]
    NoPeer,
    #[error("handshake not complete")]
    NotEstablished,
    #[error("session closed")]
    Closed,
    #[error(transparent)]
    Channel(#[from] ChannelError),
}
