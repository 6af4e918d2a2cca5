//! Exporter metrics collection
//!
//! All families live under the `gateway_exporter_` prefix and are
//! registered against an injected registry so tests can run isolated
//! instances side by side. Per-probe families carry the label tuple
//! `{action, target, user, param, status}`.

use std::sync::Arc;

use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
};

use crate::error::Result;

/// Label names of the per-probe metric families.
pub const PROBE_LABELS: [&str; 5] = ["action", "target", "user", "param", "status"];

/// Exporter metrics collector
pub struct ExporterMetrics {
    registry: Arc<Registry>,
    scrape_requests: Counter,
    scrape_errors: Counter,
    scrape_duration: Gauge,
    config_reloads: Counter,
    probe_errors: CounterVec,
    probe_duration: HistogramVec,
}

impl ExporterMetrics {
    /// Create the metric families and register them with `registry`.
    pub fn new(registry: Arc<Registry>) -> Result<Self> {
        let scrape_requests = Counter::new(
            "gateway_exporter_scrape_requests_total",
            "Total number of scrape requests handled",
        )?;
        let scrape_errors = Counter::new(
            "gateway_exporter_scrape_errors_total",
            "Scrape cycles that hit an orchestration level error",
        )?;
        let scrape_duration = Gauge::new(
            "gateway_exporter_scrape_duration_seconds",
            "Wall-clock duration of the most recent scrape cycle",
        )?;
        let config_reloads = Counter::new(
            "gateway_exporter_config_reloads_total",
            "Number of configuration reloads applied",
        )?;
        let probe_errors = CounterVec::new(
            Opts::new(
                "gateway_exporter_probe_errors_total",
                "Probe executions that did not end in success",
            ),
            &PROBE_LABELS,
        )?;
        let probe_duration = HistogramVec::new(
            HistogramOpts::new(
                "gateway_exporter_probe_duration_seconds",
                "Wall-clock duration of probe executions",
            )
            .buckets(vec![
                0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 45.0, 60.0,
            ]),
            &PROBE_LABELS,
        )?;
        let build_info = GaugeVec::new(
            Opts::new("gateway_exporter_build_info", "Build metadata"),
            &["version"],
        )?;
        build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1.0);

        registry.register(Box::new(scrape_requests.clone()))?;
        registry.register(Box::new(scrape_errors.clone()))?;
        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(config_reloads.clone()))?;
        registry.register(Box::new(probe_errors.clone()))?;
        registry.register(Box::new(probe_duration.clone()))?;
        registry.register(Box::new(build_info))?;

        Ok(Self {
            registry,
            scrape_requests,
            scrape_errors,
            scrape_duration,
            config_reloads,
            probe_errors,
            probe_duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn inc_scrape_request(&self) {
        self.scrape_requests.inc();
    }

    pub fn inc_scrape_error(&self) {
        self.scrape_errors.inc();
    }

    pub fn set_scrape_duration(&self, seconds: f64) {
        self.scrape_duration.set(seconds);
    }

    pub fn inc_config_reload(&self) {
        self.config_reloads.inc();
    }

    pub fn observe_probe_duration(&self, labels: &[&str; 5], seconds: f64) {
        self.probe_duration.with_label_values(labels).observe(seconds);
    }

    pub fn inc_probe_error(&self, labels: &[&str; 5]) {
        self.probe_errors.with_label_values(labels).inc();
    }

    /// Ensure the error and duration series for this label set exist, so
    /// statuses that never occur still report as zero.
    pub fn declare_probe_series(&self, labels: &[&str; 5]) {
        self.probe_errors.with_label_values(labels);
        self.probe_duration.with_label_values(labels);
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        Ok(encoder.encode_to_string(&metric_families)?)
    }
}
