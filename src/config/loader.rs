use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::types::Config;
use crate::codec::is_valid_imsi;

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(yaml).context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.shutdown.drain_rate == 0 {
            anyhow::bail!("shutdown.drain_rate must be greater than zero");
        }

        if self.shutdown.drain_interval.is_zero() {
            anyhow::bail!("shutdown.drain_interval must be greater than zero");
        }

        if self.session.sweep_interval.is_zero() {
            anyhow::bail!("session.sweep_interval must be greater than zero");
        }

        if self.udp.queue_capacity == 0 {
            anyhow::bail!("udp.queue_capacity must be greater than zero");
        }

        if self.udp.recv_buffer == 0 {
            anyhow::bail!("udp.recv_buffer must be greater than zero");
        }

        if self.blacklist.filter_bits == Some(0) {
            anyhow::bail!("blacklist.filter_bits must be greater than zero");
        }

        let mut seen = HashSet::new();
        for imsi in &self.blacklist.entries {
            if !is_valid_imsi(imsi) {
                anyhow::bail!("invalid blacklist IMSI: {:?}", imsi);
            }
            if !seen.insert(imsi) {
                anyhow::bail!("duplicate blacklist IMSI: {}", imsi);
            }
        }

        if !(0.0..=1.0).contains(&self.telemetry.trace_sample_rate) {
            anyhow::bail!(
                "telemetry.trace_sample_rate must be within 0.0..=1.0, got {}",
                self.telemetry.trace_sample_rate
            );
        }

        info!("configuration validated successfully");
        Ok(())
    }
}
