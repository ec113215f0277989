//! Watch motion events for one device on an eufy-security-ws server.
//!
//! Run with: cargo run -p motion-watch -- --endpoint ws://127.0.0.1:3000 --serial T8210N0123
//!
//! Press Ctrl-C to release the session and exit.

use std::time::Duration;

use clap::Parser;
use eufy_motion_core::{ConfigHandle, SessionConfig};
use eufy_motion_session::{MotionSession, SupervisorOptions};
use eufy_motion_transport::WsConnector;
use futures::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// eufy-security-ws URL.
    #[arg(long, env = "EUFY_WS_URL", default_value = "")]
    endpoint: String,

    /// Serial number of the watched device.
    #[arg(long, env = "EUFY_SERIAL")]
    serial: String,

    /// Delay before the first connection attempt, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    startup_delay_ms: u64,

    /// Delay between connection attempts, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    retry_delay_ms: u64,

    /// Keep-alive ping period, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    ping_interval_ms: u64,
}

impl Args {
    const fn options(&self) -> SupervisorOptions {
        SupervisorOptions {
            startup_delay: Duration::from_millis(self.startup_delay_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            probe_interval: Duration::from_millis(self.ping_interval_ms),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    if args.endpoint.is_empty() {
        tracing::warn!("no endpoint configured; the session will keep retrying until one is set");
    }

    let config = ConfigHandle::new(SessionConfig::new(&args.endpoint, &args.serial));
    let session = MotionSession::spawn(config, WsConnector::new(), args.options());

    let mut changes = session.motion().stream();
    loop {
        tokio::select! {
            detected = changes.next() => {
                let Some(detected) = detected else { break };
                let state = if detected { "detected" } else { "clear" };
                println!("{}: motion {state}", args.serial);
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Ctrl-C received, releasing session");
                break;
            }
        }
    }

    // A live connection is not torn down by stop; give it a moment, then exit.
    session.stop();
    if tokio::time::timeout(Duration::from_secs(1), session.join())
        .await
        .is_err()
    {
        tracing::info!("connection still open, exiting");
    }
    Ok(())
}
