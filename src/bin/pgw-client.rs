use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use pgwd::client::{generate_imsi, UdpClient};
use pgwd::telemetry::{init_tracing, TracingConfig};

#[derive(Parser, Debug)]
#[command(name = "pgw-client")]
#[command(author, version, about = "Send attach requests to a pgwd gateway")]
struct Args {
    /// Gateway UDP address
    #[arg(short, long, default_value = "127.0.0.1:9000")]
    server: SocketAddr,

    /// Number of attaches to send
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,

    /// IMSI to attach; random when omitted
    imsi: Option<String>,

    /// MCC for generated IMSIs
    #[arg(long, default_value_t = 250)]
    mcc: u16,

    /// MNC for generated IMSIs
    #[arg(long, default_value_t = 99)]
    mnc: u16,

    /// Length of generated IMSIs
    #[arg(long, default_value_t = 15)]
    length: usize,

    /// Reply timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&TracingConfig {
        service_name: "pgw-client".to_string(),
        log_level: args.log_level.clone(),
        ..Default::default()
    })?;

    let client = UdpClient::connect(args.server)
        .await
        .with_context(|| format!("failed to open socket to {}", args.server))?
        .with_timeout(Duration::from_millis(args.timeout_ms));

    for i in 1..=args.count {
        let imsi = match &args.imsi {
            Some(imsi) => imsi.clone(),
            None => generate_imsi(args.mcc, args.mnc, args.length)?,
        };

        let reply = match client.attach(&imsi).await {
            Ok(reply) => reply,
            Err(e) => format!("error: {e}"),
        };

        println!("#{i} IMSI {imsi} → {reply}");
    }

    Ok(())
}
