// p2pmsg Linux client: interactive encrypted chat over a direct UDP path.

mod config;
mod console;
mod identity;
mod session;
mod store;

use anyhow::Context;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE: &str = "\
usage: p2pmsg-linux [--stealth]      start an interactive session
       p2pmsg-linux cid              show (or generate) this device's client ID
       p2pmsg-linux allow <id>       add a guest client ID to the allow-list
       p2pmsg-linux --version";

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    for arg in &args {
        if arg == "--version" || arg == "-V" {
            println!("p2pmsg-linux {}", VERSION);
            return Ok(());
        }
        if arg == "--help" || arg == "-h" {
            println!("{USAGE}");
            return Ok(());
        }
    }

    init_logging();
    let cfg = config::load();
    let store = store::Store::new(cfg.data_dir.clone());
    tracing::debug!(data_dir = %store.dir().display(), "loaded config");

    let rt = tokio::runtime::Runtime::new().context("start tokio runtime")?;
    match args.first().map(String::as_str) {
        Some("cid") => rt.block_on(async {
            let mut console = console::Console::stdio();
            let id = identity::get_or_create_client_id(&store, &mut console, &cfg.public_ip_url).await?;
            if let Some(id) = id {
                console.say(format!("Your client_id: {id}"));
            }
            console.finish();
            Ok::<(), anyhow::Error>(())
        }),
        Some("allow") => {
            let Some(id) = args.get(1) else {
                eprintln!("{USAGE}");
                std::process::exit(2);
            };
            let mut list = store.allow_list();
            if list.insert(id) {
                store.save_allow_list(&list)?;
                println!("Added {} to the allow-list.", id.trim());
            } else {
                println!("Nothing to add.");
            }
            Ok(())
        }
        _ => {
            let opts = session::Options::from_args(args.as_slice());
            rt.block_on(async {
                let mut console = console::Console::stdio();
                let result = session::start(&opts, &cfg, &store, &mut console).await;
                console.finish();
                result
            })
        }
    }
}

/// Logs go to stderr so they never interleave with the chat on stdout.
/// `RUST_LOG` selects the level; quiet (`warn`) by default.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Wait for Ctrl+C or SIGTERM (Unix).
pub(crate) async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
