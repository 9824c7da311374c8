//! netsentineld: the daemon binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │                 netsentineld                  │
//!                         │                                              │
//!  intercepted connection │  ┌──────────┐   ask    ┌─────────────────┐   │      decision
//!  ────────────────────────┼─▶│ intercept │────────▶│  PolicyClient   │◀──┼────▶ server
//!                         │  │ subsystem │◀────────│  (this crate)   │   │  (unix socket
//!                         │  └──────────┘  verdict └──┬──────────┬───┘   │   or host:port)
//!                         │                           │          │       │
//!                         │                 ┌─────────▼──┐  ┌────▼─────┐ │
//!                         │                 │ reconnector│  │ config   │ │
//!                         │                 │ + keepalive│  │ watcher  │ │
//!                         │                 └────────────┘  └──────────┘ │
//!                         └──────────────────────────────────────────────┘
//! ```
//!
//! The binary wires the pieces together and runs until SIGINT/SIGTERM; the
//! interception subsystem (external) drives `PolicyClient::ask`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use netsentinel::config::ConfigStore;
use netsentinel::lifecycle::signals;
use netsentinel::observability::logging;
use netsentinel::stats::Statistics;
use netsentinel::PolicyClient;

#[derive(Parser, Debug)]
#[command(name = "netsentineld", version, about = "Policy-client daemon for intercepted connections")]
struct Cli {
    /// Path of the daemon configuration file.
    #[arg(long, default_value = "/etc/netsentineld/default-config.json")]
    config_file: PathBuf,

    /// Decision-server address, overriding the config file
    /// (unix:///path or host:port).
    #[arg(long)]
    server: Option<String>,

    /// Log level override: 0 debug, 1 info, 2 warn, 3 error.
    #[arg(long)]
    log_level: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let store = Arc::new(ConfigStore::load(&cli.config_file)?);
    logging::init(cli.log_level.or_else(|| store.log_level()));

    if let Some(address) = &cli.server {
        let mut config = (*store.snapshot()).clone();
        config.server.address = address.clone();
        store.replace(config);
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config_file.display(),
        server = %store.server_address(),
        "netsentineld starting"
    );

    let stats = Arc::new(Statistics::new());
    let (client, mut notifications) = PolicyClient::new(Arc::clone(&store), Arc::clone(&stats));

    // The rule engine consumes these; until it is wired in, surface them in
    // the log so operators see server pushes arrive.
    tokio::spawn(async move {
        while let Some(n) = notifications.recv().await {
            tracing::info!(id = n.id, kind = ?n.kind, "Server notification");
        }
    });

    signals::wait_for_termination().await;
    client.close();

    tracing::info!("Shutdown complete");
    Ok(())
}
