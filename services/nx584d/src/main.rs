// nx584d: Bridges a GE/Caddx NX-584/NX-8E security panel to networked
// clients over a small HTTP/JSON surface with a long-poll event feed.

use clap::Parser;
use nx584d::controller::Controller;
use nx584d::event_queue::EventQueue;
use nx584d::http_api::{self, ApiState};
use nx584d::state::PanelState;
use nx584d::stream::ConnectTarget;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "nx584d", about = "NX-584 security panel gateway")]
struct Args {
    /// Config file path (rewritten when zone names are learned).
    #[arg(long, default_value = "nx584.toml")]
    config: PathBuf,

    /// Serial device of the panel, e.g. /dev/ttyUSB0.
    #[arg(long, conflicts_with = "connect")]
    serial: Option<String>,

    /// Serial baud rate.
    #[arg(long, default_value_t = 38400)]
    baud: u32,

    /// TCP serial bridge, host:port.
    #[arg(long)]
    connect: Option<String>,

    /// HTTP listen address.
    #[arg(long, default_value = "0.0.0.0:5007")]
    listen: String,
}

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber for structured logging to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let target = match (&args.serial, &args.connect) {
        (Some(device), None) => ConnectTarget::Serial {
            device: device.clone(),
            baud: args.baud,
        },
        (None, Some(addr)) => ConnectTarget::Tcp { addr: addr.clone() },
        _ => {
            eprintln!("FATAL: exactly one of --serial or --connect is required");
            std::process::exit(1);
        }
    };

    let config = match nx584d::config::load_config(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        target = %target,
        max_zone = config.max_zone,
        binary = config.use_binary_protocol,
        "nx584d starting"
    );

    let panel = Arc::new(PanelState::new());
    let events = Arc::new(EventQueue::new(100));

    let controller = Controller::new(
        config,
        args.config.clone(),
        target,
        Arc::clone(&panel),
        Arc::clone(&events),
    );
    tokio::spawn(controller.run_forever());

    let app = http_api::router(ApiState { panel, events });
    let listener = match tokio::net::TcpListener::bind(&args.listen).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("FATAL: cannot bind {}: {e}", args.listen);
            std::process::exit(1);
        }
    };
    info!(listen = %args.listen, "HTTP surface up");
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("FATAL: HTTP server error: {e}");
        std::process::exit(1);
    }
}
