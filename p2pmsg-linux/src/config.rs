//! Load config from file and environment.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Client configuration. File: ~/.config/p2pmsg/config.toml or /etc/p2pmsg/config.toml.
/// Env overrides: P2PMSG_DATA_DIR, P2PMSG_BIND_PORT, P2PMSG_HOST_WAIT_SECS, P2PMSG_GUEST_WAIT_SECS.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Where client_id.json, allowed_clients.json and p2p_sessions.json live.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Local UDP port; 0 picks an ephemeral one.
    #[serde(default)]
    pub bind_port: u16,
    /// How long the host waits for HS1 before falling through to chat (default 120).
    #[serde(default = "default_host_wait_secs")]
    pub host_wait_secs: u64,
    /// How long the guest keeps resending HS1 (default 60).
    #[serde(default = "default_guest_wait_secs")]
    pub guest_wait_secs: u64,
    /// Interval between PUNCH datagrams (default 2).
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    /// Handshake failures per IP before a ban (default 3).
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Ban length (default 60).
    #[serde(default = "default_ban_secs")]
    pub ban_secs: u64,
    /// JSON endpoint answering `{"ip": "..."}`, used for the device fingerprint.
    #[serde(default = "default_public_ip_url")]
    pub public_ip_url: String,
}

fn default_data_dir() -> PathBuf {
    if let Some(d) = std::env::var_os("XDG_DATA_HOME") {
        return PathBuf::from(d).join("p2pmsg");
    }
    match std::env::var_os("HOME") {
        Some(h) => PathBuf::from(h).join(".local/share/p2pmsg"),
        None => PathBuf::from("data"),
    }
}
fn default_host_wait_secs() -> u64 {
    120
}
fn default_guest_wait_secs() -> u64 {
    60
}
fn default_keepalive_secs() -> u64 {
    2
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_ban_secs() -> u64 {
    60
}
fn default_public_ip_url() -> String {
    "https://api.ipify.org?format=json".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            bind_port: 0,
            host_wait_secs: default_host_wait_secs(),
            guest_wait_secs: default_guest_wait_secs(),
            keepalive_secs: default_keepalive_secs(),
            failure_threshold: default_failure_threshold(),
            ban_secs: default_ban_secs(),
            public_ip_url: default_public_ip_url(),
        }
    }
}

impl Config {
    pub fn host_wait(&self) -> Duration {
        Duration::from_secs(self.host_wait_secs)
    }

    pub fn guest_wait(&self) -> Duration {
        Duration::from_secs(self.guest_wait_secs)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.max(1))
    }

    /// Core-level settings for one session.
    pub fn core(&self, stealth: bool) -> p2pmsg_core::Config {
        p2pmsg_core::Config {
            failure_threshold: self.failure_threshold,
            ban_window: Duration::from_secs(self.ban_secs),
            stealth,
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |k| std::env::var(k).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("P2PMSG_DATA_DIR") {
        if !s.is_empty() {
            c.data_dir = PathBuf::from(s);
        }
    }
    if let Some(s) = var("P2PMSG_BIND_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.bind_port = p;
        }
    }
    if let Some(s) = var("P2PMSG_HOST_WAIT_SECS") {
        if let Ok(n) = s.parse::<u64>() {
            c.host_wait_secs = n;
        }
    }
    if let Some(s) = var("P2PMSG_GUEST_WAIT_SECS") {
        if let Ok(n) = s.parse::<u64>() {
            c.guest_wait_secs = n;
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/p2pmsg/config.toml"));
    }
    out.push(PathBuf::from("/etc/p2pmsg/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            match std::fs::read_to_string(&p) {
                Ok(s) => match toml::from_str::<Config>(&s) {
                    Ok(c) => return Some(c),
                    Err(e) => tracing::warn!(path = %p.display(), error = %e, "ignoring invalid config"),
                },
                Err(e) => tracing::warn!(path = %p.display(), error = %e, "cannot read config"),
            }
            break;
        }
    }
    None
}
