use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use pgwd::bootstrap::Server;
use pgwd::config::Config;
use pgwd::telemetry::{init_tracing, TracingConfig};

#[derive(Parser, Debug)]
#[command(name = "pgwd")]
#[command(author, version, about = "PGW control-plane simulator")]
struct Args {
    /// Path to config file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (to get log settings)
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => {
            let config = Config::default();
            config.validate()?;
            config
        }
    };

    let tracing_config = TracingConfig {
        service_name: "pgwd".to_string(),
        log_level: config.telemetry.log_level.clone(),
        json_logs: config.telemetry.json_logs,
        otlp_endpoint: config.telemetry.otlp_endpoint.clone(),
        sample_rate: config.telemetry.trace_sample_rate,
    };

    init_tracing(&tracing_config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "<defaults>".to_string()),
        "starting pgwd"
    );

    info!(
        udp = %config.udp.address,
        control = %config.control.address,
        blacklist = config.blacklist.entries.len(),
        "configuration loaded"
    );

    if args.validate {
        info!("configuration is valid");
        return Ok(());
    }

    Server::new(config).run().await
}
