//! Local state: client identity, allow-list and the session resumption hint.
//! All JSON files in one data directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use p2pmsg_core::AllowList;
use serde::{Deserialize, Serialize};

const CLIENT_ID_FILE: &str = "client_id.json";
const ALLOWED_FILE: &str = "allowed_clients.json";
const HINT_FILE: &str = "p2p_sessions.json";

#[derive(Debug, Serialize, Deserialize)]
struct ClientIdRecord {
    client_id: String,
}

/// Metadata about the running session. Never holds key material and is not
/// enough to resume a session after the process exits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ResumeHint {
    Host {
        session_code: String,
        port: u16,
    },
    Guest {
        session_code: String,
        host_ip: String,
        host_port: u16,
    },
}

pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create data dir {}", self.dir.display()))?;
        let path = self.path(name);
        let body = serde_json::to_string_pretty(value)?;
        fs::write(&path, body).with_context(|| format!("write {}", path.display()))
    }

    fn read_json<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Option<T> {
        let path = self.path(name);
        let body = match fs::read_to_string(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read state file");
                return None;
            }
        };
        match serde_json::from_str(&body) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed state file");
                None
            }
        }
    }

    /// Persisted client ID, if one was generated before.
    pub fn client_id(&self) -> Option<String> {
        self.read_json::<ClientIdRecord>(CLIENT_ID_FILE)
            .map(|r| r.client_id)
            .filter(|id| !id.is_empty())
    }

    pub fn save_client_id(&self, client_id: &str) -> anyhow::Result<()> {
        self.write_json(
            CLIENT_ID_FILE,
            &ClientIdRecord {
                client_id: client_id.to_string(),
            },
        )
    }

    /// Missing or malformed storage reads as an empty list.
    pub fn allow_list(&self) -> AllowList {
        self.read_json(ALLOWED_FILE).unwrap_or_default()
    }

    pub fn save_allow_list(&self, list: &AllowList) -> anyhow::Result<()> {
        self.write_json(ALLOWED_FILE, list)
    }

    pub fn save_hint(&self, hint: &ResumeHint) -> anyhow::Result<()> {
        self.write_json(HINT_FILE, hint)
    }

    /// The hint left by a session that has not been torn down. `{}` means none.
    pub fn hint(&self) -> Option<ResumeHint> {
        let value: serde_json::Value = self.read_json(HINT_FILE)?;
        if value.as_object().is_some_and(|o| o.is_empty()) {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    /// Reset the hint file to `{}`.
    pub fn clear_hint(&self) -> anyhow::Result<()> {
        self.write_json(HINT_FILE, &serde_json::json!({}))
    }
}
