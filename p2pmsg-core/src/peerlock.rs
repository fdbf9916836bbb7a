//! Single-peer address lock.

use std::net::IpAddr;

/// Once locked, only the authorized IP gets through. Before that, everyone
/// does, unless stealth mode is on.
#[derive(Debug, Clone, Default)]
pub struct PeerLock {
    authorized: Option<IpAddr>,
    stealth: bool,
}

impl PeerLock {
    pub fn new(stealth: bool) -> Self {
        Self {
            authorized: None,
            stealth,
        }
    }

    /// Restrict traffic to `ip`. A later call replaces the authorized IP.
    pub fn lock_to(&mut self, ip: IpAddr) {
        self.authorized = Some(ip);
    }

    pub fn accepts(&self, ip: &IpAddr) -> bool {
        match self.authorized {
            Some(authorized) => authorized == *ip,
            None => !self.stealth,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.authorized.is_some()
    }

    pub fn authorized_ip(&self) -> Option<IpAddr> {
        self.authorized
    }

    pub fn is_stealth(&self) -> bool {
        self.stealth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    const A: IpAddr = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7));
    const B: IpAddr = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 8));

    #[test]
    fn open_before_lock() {
        let lock = PeerLock::new(false);
        assert!(!lock.is_locked());
        assert!(lock.accepts(&A));
        assert!(lock.accepts(&B));
    }

    #[test]
    fn stealth_rejects_everyone_before_lock() {
        let mut lock = PeerLock::new(true);
        assert!(!lock.accepts(&A));
        lock.lock_to(A);
        assert!(lock.accepts(&A));
        assert!(!lock.accepts(&B));
    }

    #[test]
    fn only_locked_ip_accepted() {
        let mut lock = PeerLock::new(false);
        lock.lock_to(A);
        assert_eq!(lock.authorized_ip(), Some(A));
        assert!(lock.accepts(&A));
        assert!(!lock.accepts(&B));
        assert!(!lock.accepts(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
    }

    #[test]
    fn relock_is_last_writer_wins() {
        let mut lock = PeerLock::new(false);
        lock.lock_to(A);
        lock.lock_to(B);
        assert!(lock.accepts(&B));
        assert!(!lock.accepts(&A));
    }
}
