//! Stable per-device client ID derived from a host fingerprint.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// What a device is recognised by. Collected by the platform layer;
/// any field may be empty when it could not be determined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint {
    pub hostname: String,
    pub hardware_addr: String,
    pub os: String,
    pub public_ip: String,
}

impl Fingerprint {
    fn canonical(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.hostname, self.hardware_addr, self.os, self.public_ip
        )
    }

    /// `uuid5(DNS, base64(sha256(host|mac|os|ip)))`, as text.
    pub fn client_id(&self) -> String {
        let digest = Sha256::digest(self.canonical().as_bytes());
        let name = STANDARD.encode(digest);
        Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Fingerprint {
        Fingerprint {
            hostname: "workstation".into(),
            hardware_addr: "52:54:00:12:34:56".into(),
            os: "linux x86_64 Debian GNU/Linux 12".into(),
            public_ip: "198.51.100.20".into(),
        }
    }

    #[test]
    fn client_id_is_stable_uuid() {
        let a = sample().client_id();
        let b = sample().client_id();
        assert_eq!(a, b);
        let parsed = Uuid::parse_str(&a).unwrap();
        assert_eq!(parsed.get_version_num(), 5);
    }

    #[test]
    fn any_field_changes_the_id() {
        let base = sample().client_id();
        let mut other = sample();
        other.public_ip = "198.51.100.21".into();
        assert_ne!(other.client_id(), base);
        let mut other = sample();
        other.hardware_addr.clear();
        assert_ne!(other.client_id(), base);
    }

    #[test]
    fn client_id_has_no_colons() {
        // The ID is embedded in a colon-delimited handshake field.
        assert!(!sample().client_id().contains(':'));
    }
}
