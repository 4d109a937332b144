//! Studyhall terminal client.
//!
//! # Usage
//!
//! ```bash
//! export STUDYHALL_TOKEN=...   # bearer token from login
//! studyhall --group 42 --email alice@example.com --name Alice
//!
//! # Against a deployed backend, backing off up to a minute between retries
//! studyhall -g 42 -e alice@example.com \
//!     --endpoint wss://study.example.com/ws/websocket \
//!     --api https://study.example.com/api --backoff-max-secs 60
//! ```

use clap::Parser;
use studyhall_cli::{Args, Bridge, Runtime, SystemEnv, TerminalDriver};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout is the chat view; logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let group = args.group_id()?;
    let identity = args.identity();
    let config = args.connection_config();
    config.endpoint_url()?;

    tracing::info!(
        %group,
        email = %identity.email,
        endpoint = %config.endpoint,
        "joining study group"
    );

    let env = SystemEnv::new();
    let driver = TerminalDriver::new(env, &args.api, args.token(), &identity.email)?;
    let bridge = Bridge::new(env, identity, config, group, args.token());
    let runtime = Runtime::new(driver, bridge, args.session_config());

    runtime.run().await?;

    tracing::info!("left study group");
    Ok(())
}
