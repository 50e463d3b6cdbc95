use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::cdr::CdrFormat;

/// Root configuration for pgwd
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// UDP attach listener
    #[serde(default)]
    pub udp: UdpConfig,

    /// HTTP control plane
    #[serde(default)]
    pub control: ControlConfig,

    /// Session expiry
    #[serde(default)]
    pub session: SessionConfig,

    /// Graceful shutdown drain
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    /// Subscriber blacklist
    #[serde(default)]
    pub blacklist: BlacklistConfig,

    /// Billing log
    #[serde(default)]
    pub cdr: CdrConfig,

    /// Logging / tracing
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// UDP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UdpConfig {
    /// Bind address
    #[serde(default = "default_udp_address")]
    pub address: SocketAddr,

    /// Capacity of each pipeline queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Receive buffer per datagram (bytes)
    #[serde(default = "default_recv_buffer")]
    pub recv_buffer: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            address: default_udp_address(),
            queue_capacity: default_queue_capacity(),
            recv_buffer: default_recv_buffer(),
        }
    }
}

fn default_udp_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9000))
}

fn default_queue_capacity() -> usize {
    4096
}

fn default_recv_buffer() -> usize {
    1024
}

/// Control plane configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// HTTP API address
    #[serde(default = "default_control_address")]
    pub address: SocketAddr,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            address: default_control_address(),
        }
    }
}

fn default_control_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Session expiry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session time-to-live since last admission
    #[serde(default = "default_session_ttl", with = "humantime_serde")]
    pub ttl: Duration,

    /// How often expired sessions are swept
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: default_session_ttl(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(30)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(1)
}

/// Graceful shutdown configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    /// Sessions offloaded per drain interval
    #[serde(default = "default_drain_rate")]
    pub drain_rate: usize,

    /// Pause between drain batches
    #[serde(default = "default_drain_interval", with = "humantime_serde")]
    pub drain_interval: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_rate: default_drain_rate(),
            drain_interval: default_drain_interval(),
        }
    }
}

fn default_drain_rate() -> usize {
    10
}

fn default_drain_interval() -> Duration {
    Duration::from_secs(1)
}

/// Blacklist configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlacklistConfig {
    /// Blacklisted IMSIs
    #[serde(default)]
    pub entries: Vec<String>,

    /// Bloom filter size in bits (default: derived from entry count)
    #[serde(default)]
    pub filter_bits: Option<usize>,
}

/// CDR configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CdrConfig {
    /// Output file
    #[serde(default = "default_cdr_path")]
    pub path: PathBuf,

    /// Line format
    #[serde(default)]
    pub format: CdrFormat,
}

impl Default for CdrConfig {
    fn default() -> Self {
        Self {
            path: default_cdr_path(),
            format: CdrFormat::default(),
        }
    }
}

fn default_cdr_path() -> PathBuf {
    PathBuf::from("cdr.log")
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable structured JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// OTLP endpoint for distributed tracing
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Trace sample rate (0.0 - 1.0)
    #[serde(default = "default_sample_rate")]
    pub trace_sample_rate: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            otlp_endpoint: None,
            trace_sample_rate: default_sample_rate(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sample_rate() -> f64 {
    1.0
}

/// Humantime serde support module
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
