//! Client identity: collect the device fingerprint and persist the derived ID.

use std::net::{IpAddr, UdpSocket};
use std::path::Path;
use std::time::Duration;

use p2pmsg_core::Fingerprint;
use serde::Deserialize;

use crate::console::Console;
use crate::store::Store;

const PUBLIC_IP_TIMEOUT: Duration = Duration::from_secs(5);

/// Persisted client ID, or a new one if the operator agrees to generate it.
/// `Ok(None)` when consent is withheld or input is closed.
pub async fn get_or_create_client_id(
    store: &Store,
    console: &mut Console,
    public_ip_url: &str,
) -> anyhow::Result<Option<String>> {
    if let Some(id) = store.client_id() {
        return Ok(Some(id));
    }
    console.say("This will generate a persistent Client ID based on your device and network info.");
    let answer = console
        .ask("Do you agree? (yes/no): ")
        .await
        .unwrap_or_default()
        .to_lowercase();
    if answer != "y" && answer != "yes" {
        console.say("Generation cancelled.");
        return Ok(None);
    }
    let fingerprint = collect_fingerprint(public_ip_url).await;
    let id = fingerprint.client_id();
    store.save_client_id(&id)?;
    tracing::info!(client_id = %id, "generated client id");
    Ok(Some(id))
}

/// Best effort; any part that cannot be read is left empty.
pub async fn collect_fingerprint(public_ip_url: &str) -> Fingerprint {
    Fingerprint {
        hostname: hostname(),
        hardware_addr: hardware_addr(Path::new("/sys/class/net")).unwrap_or_default(),
        os: os_description(),
        public_ip: public_ip(public_ip_url).await,
    }
}

fn hostname() -> String {
    ["/proc/sys/kernel/hostname", "/etc/hostname"]
        .iter()
        .filter_map(|p| std::fs::read_to_string(p).ok())
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_default()
}

/// MAC of the first non-loopback interface, in interface-name order.
fn hardware_addr(sys_net: &Path) -> Option<String> {
    let mut names: Vec<_> = std::fs::read_dir(sys_net)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name())
        .collect();
    names.sort();
    names.into_iter().find_map(|name| {
        let addr = std::fs::read_to_string(sys_net.join(&name).join("address")).ok()?;
        let addr = addr.trim();
        if name == "lo" || addr.is_empty() || addr == "00:00:00:00:00:00" {
            return None;
        }
        Some(addr.to_string())
    })
}

fn os_description() -> String {
    let pretty = std::fs::read_to_string("/etc/os-release")
        .ok()
        .and_then(|s| pretty_name(&s));
    let base = format!("{} {}", std::env::consts::OS, std::env::consts::ARCH);
    match pretty {
        Some(p) => format!("{base} {p}"),
        None => base,
    }
}

fn pretty_name(os_release: &str) -> Option<String> {
    os_release.lines().find_map(|l| {
        let v = l.strip_prefix("PRETTY_NAME=")?;
        Some(v.trim_matches('"').to_string())
    })
}

#[derive(Deserialize)]
struct IpReply {
    ip: String,
}

async fn public_ip(url: &str) -> String {
    match lookup_public_ip(url).await {
        Ok(ip) => return ip,
        Err(e) => tracing::debug!(error = %e, "public ip lookup failed, using local address"),
    }
    local_ip().map(|ip| ip.to_string()).unwrap_or_default()
}

async fn lookup_public_ip(url: &str) -> anyhow::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(PUBLIC_IP_TIMEOUT)
        .build()?;
    let body = client.get(url).send().await?.error_for_status()?.text().await?;
    let reply: IpReply = serde_json::from_str(&body)?;
    Ok(reply.ip)
}

/// Address the OS would route outbound traffic from. Connecting a UDP socket
/// sends nothing.
fn local_ip() -> Option<IpAddr> {
    let sock = UdpSocket::bind(("0.0.0.0", 0)).ok()?;
    sock.connect(("8.8.8.8", 80)).ok()?;
    sock.local_addr().ok().map(|a| a.ip())
}
