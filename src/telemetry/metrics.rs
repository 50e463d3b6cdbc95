use anyhow::Result;
use opentelemetry::metrics::MeterProvider;
use opentelemetry_prometheus::exporter;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

static GLOBAL: OnceLock<Arc<Metrics>> = OnceLock::new();

/// OTEL metrics with a Prometheus exporter.
///
/// One instance per process: the instruments in [`counters`] are bound to
/// the first provider that installs them.
pub struct Metrics {
    registry: Registry,
    meter_provider: SdkMeterProvider,
}

impl Metrics {
    /// Get the process-wide metrics pipeline, creating it on first use.
    pub fn global() -> Result<Arc<Self>> {
        if let Some(metrics) = GLOBAL.get() {
            return Ok(metrics.clone());
        }

        let registry = Registry::new();
        let exporter = exporter().with_registry(registry.clone()).build()?;
        let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

        let metrics = Arc::new(Self {
            registry,
            meter_provider,
        });

        if GLOBAL.set(metrics.clone()).is_ok() {
            opentelemetry::global::set_meter_provider(metrics.meter_provider.clone());
            counters::init(&metrics.meter_provider.meter("pgwd"));
            info!("OTEL metrics configured with Prometheus exporter");
        }

        Ok(GLOBAL.get().cloned().unwrap_or(metrics))
    }

    /// Render metrics in Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!(error = %e, "failed to encode metrics");
            return String::new();
        }

        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Flush and stop the meter provider.
    pub fn shutdown(&self) {
        if let Err(e) = self.meter_provider.shutdown() {
            warn!(error = %e, "failed to shutdown meter provider");
        }
    }
}

/// PGW metrics with the `pgw_` prefix.
///
/// Recording functions are no-ops until [`init`] has run, so library code
/// and tests can call them unconditionally.
pub mod counters {
    use opentelemetry::metrics::{Counter, Gauge};
    use opentelemetry::KeyValue;
    use std::sync::OnceLock;

    // ========================================================================
    // UDP / PIPELINE
    // ========================================================================

    static DATAGRAMS_RECEIVED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static DATAGRAM_BYTES_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static DATAGRAMS_DISCARDED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static VERDICTS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static SEND_ERRORS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static BACKPRESSURE_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();

    // ========================================================================
    // SESSIONS
    // ========================================================================

    static SESSIONS_CREATED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static SESSIONS_REMOVED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static SESSIONS_ACTIVE: OnceLock<Gauge<u64>> = OnceLock::new();
    static DRAIN_OFFLOADED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();

    // ========================================================================
    // CDR
    // ========================================================================

    static CDR_WRITTEN_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static CDR_ERRORS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();

    /// Initialize all instruments. Later calls are ignored.
    pub fn init(meter: &opentelemetry::metrics::Meter) {
        let _ = DATAGRAMS_RECEIVED_TOTAL.set(
            meter
                .u64_counter("pgw_datagrams_received_total")
                .with_description("Attach datagrams received")
                .build(),
        );
        let _ = DATAGRAM_BYTES_TOTAL.set(
            meter
                .u64_counter("pgw_datagram_bytes_total")
                .with_description("Attach payload bytes received")
                .build(),
        );
        let _ = DATAGRAMS_DISCARDED_TOTAL.set(
            meter
                .u64_counter("pgw_datagrams_discarded_total")
                .with_description("Datagrams dropped before a verdict, by reason")
                .build(),
        );
        let _ = VERDICTS_TOTAL.set(
            meter
                .u64_counter("pgw_verdicts_total")
                .with_description("Attach verdicts by kind")
                .build(),
        );
        let _ = SEND_ERRORS_TOTAL.set(
            meter
                .u64_counter("pgw_send_errors_total")
                .with_description("Verdicts that could not be sent")
                .build(),
        );
        let _ = BACKPRESSURE_TOTAL.set(
            meter
                .u64_counter("pgw_queue_backpressure_total")
                .with_description("Producer waits on a full pipeline queue")
                .build(),
        );
        let _ = SESSIONS_CREATED_TOTAL.set(
            meter
                .u64_counter("pgw_sessions_created_total")
                .with_description("Sessions created")
                .build(),
        );
        let _ = SESSIONS_REMOVED_TOTAL.set(
            meter
                .u64_counter("pgw_sessions_removed_total")
                .with_description("Sessions removed, by reason")
                .build(),
        );
        let _ = SESSIONS_ACTIVE.set(
            meter
                .u64_gauge("pgw_sessions_active")
                .with_description("Live sessions")
                .build(),
        );
        let _ = DRAIN_OFFLOADED_TOTAL.set(
            meter
                .u64_counter("pgw_drain_offloaded_total")
                .with_description("Sessions offloaded by the graceful drain")
                .build(),
        );
        let _ = CDR_WRITTEN_TOTAL.set(
            meter
                .u64_counter("pgw_cdr_written_total")
                .with_description("CDRs written, by writer")
                .build(),
        );
        let _ = CDR_ERRORS_TOTAL.set(
            meter
                .u64_counter("pgw_cdr_errors_total")
                .with_description("CDRs dropped or failed, by reason")
                .build(),
        );
    }

    pub fn datagram_received(bytes: usize) {
        if let Some(c) = DATAGRAMS_RECEIVED_TOTAL.get() {
            c.add(1, &[]);
        }
        if let Some(c) = DATAGRAM_BYTES_TOTAL.get() {
            c.add(bytes as u64, &[]);
        }
    }

    pub fn datagram_discarded(reason: &str) {
        if let Some(c) = DATAGRAMS_DISCARDED_TOTAL.get() {
            c.add(1, &[kv("reason", reason)]);
        }
    }

    pub fn verdict(verdict: &str) {
        if let Some(c) = VERDICTS_TOTAL.get() {
            c.add(1, &[kv("verdict", verdict)]);
        }
    }

    pub fn send_failed() {
        if let Some(c) = SEND_ERRORS_TOTAL.get() {
            c.add(1, &[]);
        }
    }

    pub fn queue_backpressure(queue: &str) {
        if let Some(c) = BACKPRESSURE_TOTAL.get() {
            c.add(1, &[kv("queue", queue)]);
        }
    }

    pub fn session_created() {
        if let Some(c) = SESSIONS_CREATED_TOTAL.get() {
            c.add(1, &[]);
        }
    }

    pub fn session_removed(reason: &str) {
        if let Some(c) = SESSIONS_REMOVED_TOTAL.get() {
            c.add(1, &[kv("reason", reason)]);
        }
    }

    pub fn sessions_active_set(count: usize) {
        if let Some(g) = SESSIONS_ACTIVE.get() {
            g.record(count as u64, &[]);
        }
    }

    pub fn drain_batch(offloaded: usize) {
        if let Some(c) = DRAIN_OFFLOADED_TOTAL.get() {
            c.add(offloaded as u64, &[]);
        }
    }

    pub fn cdr_written(writer: &str) {
        if let Some(c) = CDR_WRITTEN_TOTAL.get() {
            c.add(1, &[kv("writer", writer)]);
        }
    }

    pub fn cdr_write_failed(writer: &str) {
        if let Some(c) = CDR_ERRORS_TOTAL.get() {
            c.add(1, &[kv("writer", writer), kv("reason", "write")]);
        }
    }

    pub fn cdr_dropped(reason: &str) {
        if let Some(c) = CDR_ERRORS_TOTAL.get() {
            c.add(1, &[kv("reason", reason)]);
        }
    }

    #[inline]
    fn kv(key: &'static str, value: &str) -> KeyValue {
        KeyValue::new(key, value.to_string())
    }
}
