//! Relay Gateway entry point
//!
//! Run with:
//! ```bash
//! cargo run -p relay-gateway
//! ```
//!
//! Configuration is loaded from environment variables.

use relay_common::{try_init_tracing_with_config, AppConfig, TracingConfig};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Gateway failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // Tracing format depends on the environment, so errors here go to stderr
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        env = ?config.app.env,
        port = config.gateway.port,
        instance_id = %config.gateway.instance_id,
        store = ?config.store.backend,
        "Configuration loaded"
    );

    if let Err(e) = relay_gateway::metrics::init_metrics() {
        warn!(error = %e, "Metrics disabled");
    }

    relay_gateway::run(config).await?;
    info!("Gateway stopped");
    Ok(())
}
