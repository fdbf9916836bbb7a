//! Interactive session: role selection, UDP socket, receive + keepalive loops, chat loop.
//!
//! The receive loop is the only reader of the socket; the handshake itself
//! is decided by `SessionCore`, and completion reaches the foreground through
//! a watch channel.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use p2pmsg_core::{Action, ChatError, SessionCode, SessionCore};
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::console::{Console, Printer};
use crate::identity;
use crate::store::{ResumeHint, Store};

const RECV_POLL: Duration = Duration::from_secs(1);
const HS1_RESEND: Duration = Duration::from_secs(1);
const MAX_DATAGRAM: usize = 65_535;

/// Options taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub stealth: bool,
}

impl Options {
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Self {
        Self {
            stealth: args.iter().any(|a| a.as_ref() == "--stealth"),
        }
    }
}

/// Run one interactive session to completion.
pub async fn start(
    opts: &Options,
    cfg: &Config,
    store: &Store,
    console: &mut Console,
) -> anyhow::Result<()> {
    if let Some(stale) = store.hint() {
        tracing::info!(?stale, "previous session was not closed cleanly");
    }
    let Some(choice) = console.ask("Host or Guest? (h/g): ").await else {
        console.say("Operation cancelled.");
        return Ok(());
    };
    match choice.to_lowercase().as_str() {
        "h" => run_host(opts, cfg, store, console).await,
        "g" => run_guest(opts, cfg, store, console).await,
        _ => {
            console.say("Invalid choice. Please enter 'h' or 'g'.");
            Ok(())
        }
    }
}

async fn run_host(
    opts: &Options,
    cfg: &Config,
    store: &Store,
    console: &mut Console,
) -> anyhow::Result<()> {
    let socket = bind(cfg.bind_port).await?;
    let port = socket.local_addr()?.port();
    let code = SessionCode::generate();
    console.say(format!("Your session code: {code}"));
    console.say(format!("Listening port: {port}"));
    console.say("Waiting for guest handshake packet...");

    let mut allowed = store.allow_list();
    let add = console
        .ask("Add allowed client_id (optional): ")
        .await
        .unwrap_or_default();
    if allowed.insert(&add) {
        if let Err(e) = store.save_allow_list(&allowed) {
            tracing::warn!(error = %e, "could not persist allow-list");
        }
    }
    if allowed.is_empty() {
        console.say("Warning: allow-list is empty; no guest can connect.");
    }
    save_hint(
        store,
        &ResumeHint::Host {
            session_code: code.to_string(),
            port,
        },
    );

    let core = SessionCore::host(&cfg.core(opts.stealth), &code, allowed);
    let mut session = Session::spawn(socket, core, cfg, console.printer());
    tracing::info!(port, "host waiting for handshake");

    let deadline = tokio::time::sleep(cfg.host_wait());
    tokio::pin!(deadline);
    tokio::select! {
        peer = session.wait_established() => {
            if let Some(peer) = peer {
                tracing::info!(%peer, "guest connected");
                console.say("Guest connected. Starting encrypted P2P chat.");
            }
        }
        _ = &mut deadline => {
            console.say("No handshake received within timeout. You can keep waiting or /exit.");
        }
    }

    session.chat(console).await;
    session.close(store).await;
    Ok(())
}

async fn run_guest(
    opts: &Options,
    cfg: &Config,
    store: &Store,
    console: &mut Console,
) -> anyhow::Result<()> {
    let Some((code, host_ip, host_port)) = read_guest_details(console).await else {
        return Ok(());
    };
    let host = SocketAddr::new(host_ip, host_port);

    let client_id = match identity::get_or_create_client_id(store, console, &cfg.public_ip_url).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            console.say("Could not prepare Client ID.");
            return Ok(());
        }
        Err(e) => {
            tracing::warn!(error = %e, "client id unavailable");
            console.say("Could not prepare Client ID.");
            return Ok(());
        }
    };

    let socket = bind(cfg.bind_port).await?;
    save_hint(
        store,
        &ResumeHint::Guest {
            session_code: code.to_string(),
            host_ip: host_ip.to_string(),
            host_port,
        },
    );

    let core = SessionCore::guest(&cfg.core(opts.stealth), &code, &client_id, host);
    let mut session = Session::spawn(socket, core, cfg, console.printer());
    console.say("Sending handshake to host...");

    let deadline = Instant::now() + cfg.guest_wait();
    while Instant::now() < deadline {
        let request = session.core.lock().await.handshake_request();
        let Some((to, hs1)) = request else { break };
        if let Err(e) = session.socket.send_to(&hs1, to).await {
            tracing::debug!(error = %e, %to, "HS1 send failed");
        }
        if let Ok(Some(peer)) = tokio::time::timeout(HS1_RESEND, session.wait_established()).await {
            tracing::info!(%peer, "host accepted handshake");
            break;
        }
    }
    let acked = session.core.lock().await.is_established();
    if acked {
        console.say("Host accepted handshake. Starting encrypted P2P chat.");
    } else {
        console.say("Handshake not acknowledged yet. Continuing punches; you may still send messages after establishment.");
    }

    session.chat(console).await;
    session.close(store).await;
    Ok(())
}

async fn read_guest_details(console: &mut Console) -> Option<(SessionCode, IpAddr, u16)> {
    let code = console.ask("Enter session code: ").await;
    let ip = console.ask("Enter host public IP: ").await;
    let port = console.ask("Enter host port: ").await;
    let (Some(code), Some(ip), Some(port)) = (code, ip, port) else {
        console.say("Invalid input.");
        return None;
    };
    let (Ok(ip), Ok(port)) = (ip.parse::<IpAddr>(), port.parse::<u16>()) else {
        console.say("Invalid input.");
        return None;
    };
    match SessionCode::parse(&code) {
        Ok(code) => Some((code, ip, port)),
        Err(_) => {
            console.say("Session code must be 16 digits.");
            None
        }
    }
}

async fn bind(port: u16) -> anyhow::Result<UdpSocket> {
    UdpSocket::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("bind UDP port {port}"))
}

fn save_hint(store: &Store, hint: &ResumeHint) {
    if let Err(e) = store.save_hint(hint) {
        tracing::warn!(error = %e, "could not write resumption hint");
    }
}

/// Live session: the socket, the core and the two background loops.
struct Session {
    socket: Arc<UdpSocket>,
    core: Arc<Mutex<SessionCore>>,
    running: Arc<AtomicBool>,
    punching: Arc<AtomicBool>,
    established: watch::Receiver<Option<SocketAddr>>,
    printer: Printer,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    fn spawn(socket: UdpSocket, core: SessionCore, cfg: &Config, printer: Printer) -> Self {
        tracing::debug!(role = ?core.role(), "starting session loops");
        let socket = Arc::new(socket);
        let core = Arc::new(Mutex::new(core));
        let running = Arc::new(AtomicBool::new(true));
        let punching = Arc::new(AtomicBool::new(true));
        let (established_tx, established) = watch::channel(None);

        let recv_task = tokio::spawn(recv_loop(
            socket.clone(),
            core.clone(),
            running.clone(),
            established_tx,
            printer.clone(),
        ));
        let punch_task = tokio::spawn(punch_loop(
            socket.clone(),
            core.clone(),
            running.clone(),
            punching.clone(),
            cfg.keepalive_interval(),
        ));

        Self {
            socket,
            core,
            running,
            punching,
            established,
            printer,
            tasks: vec![recv_task, punch_task],
        }
    }

    /// Resolves with the peer address once the handshake is done, or `None`
    /// if the receive loop is gone.
    async fn wait_established(&mut self) -> Option<SocketAddr> {
        self.established
            .wait_for(|peer| peer.is_some())
            .await
            .ok()
            .and_then(|peer| *peer)
    }

    /// Foreground loop until `/exit`, end of input, or a shutdown signal.
    async fn chat(&self, console: &mut Console) {
        console.say("Type messages to send. Use /exit to terminate the session.");
        while self.running.load(Ordering::Acquire) {
            let line = tokio::select! {
                line = console.ask("> ") => line,
                _ = crate::shutdown_signal() => None,
            };
            let Some(line) = line else { break };
            if line.eq_ignore_ascii_case("/exit") {
                break;
            }
            if line.is_empty() {
                continue;
            }
            let sealed = self.core.lock().await.seal_chat(&line);
            match sealed {
                Ok((to, bytes)) => {
                    if let Err(e) = self.socket.send_to(&bytes, to).await {
                        tracing::debug!(error = %e, %to, "chat send failed");
                    }
                }
                Err(ChatError::NoPeer) => self.printer.say("Peer not yet known. Waiting for handshake..."),
                Err(ChatError::NotEstablished) => {
                    self.printer.say("Handshake not complete yet. Message not sent.")
                }
                Err(e) => tracing::warn!(error = %e, "message not sent"),
            }
        }
    }

    /// Stop both loops, drop the socket, clear the hint and wipe key material.
    async fn close(self, store: &Store) {
        self.running.store(false, Ordering::Release);
        self.punching.store(false, Ordering::Release);
        for task in self.tasks {
            let _ = task.await;
        }
        self.core.lock().await.close();
        if let Err(e) = store.clear_hint() {
            tracing::warn!(error = %e, "could not clear resumption hint");
        }
        drop(self.socket);
        self.printer.say("Session closed. Cache cleared.");
    }
}

async fn recv_loop(
    socket: Arc<UdpSocket>,
    core: Arc<Mutex<SessionCore>>,
    running: Arc<AtomicBool>,
    established: watch::Sender<Option<SocketAddr>>,
    printer: Printer,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    while running.load(Ordering::Acquire) {
        let (n, from) = match tokio::time::timeout(RECV_POLL, socket.recv_from(&mut buf)).await {
            Err(_) => continue,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "recv failed");
                continue;
            }
            Ok(Ok(v)) => v,
        };
        let result = core.lock().await.on_datagram(from, &buf[..n], Instant::now());
        let actions = match result {
            Ok(actions) => actions,
            Err(reason) => {
                tracing::debug!(%from, %reason, "datagram dropped");
                continue;
            }
        };
        for action in actions {
            match action {
                Action::Send(to, bytes) => {
                    if let Err(e) = socket.send_to(&bytes, to).await {
                        tracing::debug!(error = %e, %to, "send failed");
                    }
                }
                Action::Established(peer) => {
                    established.send_replace(Some(peer));
                }
                Action::Deliver(text) => printer.say(format!("Peer: {text}")),
                Action::Acknowledged => {
                    printer.say("Guest acknowledged handshake. Tunnel established.")
                }
            }
        }
    }
}

async fn punch_loop(
    socket: Arc<UdpSocket>,
    core: Arc<Mutex<SessionCore>>,
    running: Arc<AtomicBool>,
    punching: Arc<AtomicBool>,
    interval: Duration,
) {
    while running.load(Ordering::Acquire) && punching.load(Ordering::Acquire) {
        let punch = core.lock().await.keepalive();
        if let Some((to, bytes)) = punch {
            if let Err(e) = socket.send_to(&bytes, to).await {
                tracing::debug!(error = %e, %to, "punch failed");
            }
        }
        tokio::time::sleep(interval).await;
    }
}
