//! Scrape Orchestration
//!
//! One collector drives the whole scrape cycle: conditional config
//! reload, probe set rebuild, pool resize, batch execution and metric
//! recording. Cycles are serialized by an internal lock, and the active
//! probe set, its backends and the worker pool size always derive from
//! the same config snapshot. A scrape never returns an error to its
//! caller; orchestration failures are logged and counted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigSnapshot, ConfigSource};
use crate::error::Result;
use crate::metrics::ExporterMetrics;
use crate::probe::builder::{build_probe_specs, declare_probe_metrics};
use crate::probe::status::ProbeStatus;
use crate::probe::{BackendFactory, BackendSet, Probe, ProbeSpec};
use crate::scheduler::{ProbeOutcome, ProbeScheduler};

/// Probe set and backends derived from one config snapshot; replaced
/// wholesale when a reload lands.
struct ActiveState {
    snapshot: Arc<ConfigSnapshot>,
    specs: Vec<Arc<ProbeSpec>>,
    backends: BackendSet,
}

/// Drives probe batches on behalf of inbound metric scrapes.
pub struct GatewayCollector {
    source: Arc<dyn ConfigSource>,
    metrics: Arc<ExporterMetrics>,
    backend_factory: Arc<dyn BackendFactory>,
    scheduler: ProbeScheduler,
    state: Mutex<ActiveState>,
}

impl GatewayCollector {
    /// Load the initial configuration and size the pool for it. This is
    /// the one place a configuration failure surfaces as an error: a
    /// broken config at bootstrap should stop the exporter.
    pub async fn new(
        source: Arc<dyn ConfigSource>,
        metrics: Arc<ExporterMetrics>,
        backend_factory: Arc<dyn BackendFactory>,
    ) -> Result<Self> {
        let snapshot = source.current()?;
        let specs = build_probe_specs(&snapshot.config);
        let backends = backend_factory.build(&snapshot.config)?;
        declare_probe_metrics(&metrics, &specs);

        let scheduler = ProbeScheduler::new();
        scheduler.resize(specs.len()).await;

        info!(
            version = snapshot.version,
            probes = specs.len(),
            "🔄 Gateway collector initialized"
        );

        Ok(Self {
            source,
            metrics,
            backend_factory,
            scheduler,
            state: Mutex::new(ActiveState {
                snapshot,
                specs,
                backends,
            }),
        })
    }

    /// Run one scrape cycle. Never fails: errors are logged, counted on
    /// the scrape-error counter and folded into the emitted metrics.
    pub async fn on_scrape(&self) {
        let mut state = self.state.lock().await;
        self.metrics.inc_scrape_request();
        let started = std::time::Instant::now();
        if let Err(e) = self.scrape_cycle(&mut state).await {
            error!(error = %e, "scrape cycle failed");
            self.metrics.inc_scrape_error();
        }
        self.metrics
            .set_scrape_duration(started.elapsed().as_secs_f64());
    }

    async fn scrape_cycle(&self, state: &mut ActiveState) -> Result<()> {
        self.refresh_config(state)?;
        self.scheduler.resize(state.specs.len()).await;

        if state.specs.is_empty() {
            debug!("no probes configured, nothing to schedule");
            return Ok(());
        }

        let probes: Vec<Probe> = state
            .specs
            .iter()
            .map(|spec| Probe::new(Arc::clone(spec), state.backends.for_action(spec.action)))
            .collect();
        let held = probes.clone();

        let deadline = state.snapshot.config.timeout();
        let outcomes = self.scheduler.run_batch(probes, deadline).await?;
        for (probe, outcome) in held.iter().zip(outcomes.iter()) {
            self.record_outcome(probe, outcome);
        }
        Ok(())
    }

    /// Apply a pending configuration change, rebuilding every piece of
    /// derived state together. Swap-or-nothing: any failure leaves the
    /// previous generation fully active.
    fn refresh_config(&self, state: &mut ActiveState) -> Result<()> {
        if !self.source.has_changed() {
            return Ok(());
        }
        let snapshot = self.source.reload_if_changed()?;
        if Arc::ptr_eq(&snapshot, &state.snapshot) {
            return Ok(());
        }

        let specs = build_probe_specs(&snapshot.config);
        let backends = self.backend_factory.build(&snapshot.config)?;
        declare_probe_metrics(&self.metrics, &specs);
        info!(
            version = snapshot.version,
            probes = specs.len(),
            "🔄 Configuration change applied, probe set rebuilt"
        );
        *state = ActiveState {
            snapshot,
            specs,
            backends,
        };
        self.metrics.inc_config_reload();
        Ok(())
    }

    fn record_outcome(&self, probe: &Probe, outcome: &ProbeOutcome) {
        let spec = probe.spec();
        let mut status = probe.status();
        if !status.is_terminal() {
            warn!(
                spec = ?spec,
                result = ?outcome.result,
                "probe finished without a recorded status, counting as error_other"
            );
            status = ProbeStatus::ErrorOther;
        }

        let labels = spec.label_values(status.as_label());
        self.metrics
            .observe_probe_duration(&labels, outcome.duration.as_secs_f64());
        if !status.is_success() {
            self.metrics.inc_probe_error(&labels);
        }

        debug!(
            action = %spec.action,
            target = %spec.display_target,
            param = %spec.param,
            status = %status,
            duration_ms = outcome.duration.as_millis() as u64,
            cancelled = outcome.cancelled,
            "probe outcome recorded"
        );
    }

    /// Snapshot backing the currently active probe set.
    pub async fn active_snapshot(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.state.lock().await.snapshot)
    }

    pub async fn pool_size(&self) -> usize {
        self.scheduler.pool_size().await
    }

    pub fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }

    /// Drain the worker pool on exporter shutdown.
    pub async fn shutdown(&self, grace: Duration) {
        self.scheduler.shutdown(grace).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::probe::status::ProbeStatus;
    use crate::probe::{ProbeBackend, ProbeSpec};
    use async_trait::async_trait;
    use chrono::Utc;
    use prometheus::Registry;

    struct FixedBackend(ProbeStatus);

    #[async_trait]
    impl ProbeBackend for FixedBackend {
        async fn perform(&self, _spec: &ProbeSpec) -> ProbeStatus {
            self.0
        }
    }

    struct PanicBackend;

    #[async_trait]
    impl ProbeBackend for PanicBackend {
        async fn perform(&self, _spec: &ProbeSpec) -> ProbeStatus {
            panic!("backend blew up");
        }
    }

    struct FixedFactory(BackendSet);

    impl BackendFactory for FixedFactory {
        fn build(&self, _config: &GatewayConfig) -> Result<BackendSet> {
            Ok(self.0.clone())
        }
    }

    /// Config source scripted by the test: stage a snapshot (or an
    /// error) and it is served on the next reload.
    struct ScriptedSource {
        active: parking_lot::Mutex<Arc<ConfigSnapshot>>,
        pending: parking_lot::Mutex<Option<Result<Arc<ConfigSnapshot>>>>,
    }

    impl ScriptedSource {
        fn new(snapshot: Arc<ConfigSnapshot>) -> Self {
            Self {
                active: parking_lot::Mutex::new(snapshot),
                pending: parking_lot::Mutex::new(None),
            }
        }

        fn stage(&self, next: Result<Arc<ConfigSnapshot>>) {
            *self.pending.lock() = Some(next);
        }
    }

    impl ConfigSource for ScriptedSource {
        fn current(&self) -> Result<Arc<ConfigSnapshot>> {
            Ok(Arc::clone(&self.active.lock()))
        }

        fn has_changed(&self) -> bool {
            self.pending.lock().is_some()
        }

        fn reload_if_changed(&self) -> Result<Arc<ConfigSnapshot>> {
            match self.pending.lock().take() {
                Some(Ok(next)) => {
                    *self.active.lock() = Arc::clone(&next);
                    Ok(next)
                }
                Some(Err(e)) => Err(e),
                None => self.current(),
            }
        }
    }

    fn snapshot(version: u64, yaml: &str) -> Arc<ConfigSnapshot> {
        let config: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
        Arc::new(ConfigSnapshot {
            version,
            loaded_at: Utc::now(),
            config,
        })
    }

    fn metrics() -> Arc<ExporterMetrics> {
        Arc::new(ExporterMetrics::new(Arc::new(Registry::new())).unwrap())
    }

    fn backends(status: ProbeStatus, query: ProbeStatus) -> BackendSet {
        BackendSet::new(
            Arc::new(FixedBackend(status)),
            Arc::new(FixedBackend(query)),
        )
    }

    const TWO_STATUS_ONE_QUERY: &str = r#"
default_username: admin
default_password: pw
timeout_seconds: 5
status_services:
  - name: webhdfs
    url: https://gw.example:8443/gateway/default/webhdfs/v1
    status_paths:
      - /?op=GETFILESTATUS
      - /tmp?op=LISTSTATUS
query_services:
  - name: hive
    url: postgres://gw.example:5432/default
    queries:
      - SELECT 1
"#;

    #[tokio::test(flavor = "multi_thread")]
    async fn scrape_runs_probes_and_records_metrics() {
        let source = Arc::new(ScriptedSource::new(snapshot(1, TWO_STATUS_ONE_QUERY)));
        let metrics = metrics();
        let collector = GatewayCollector::new(
            source,
            Arc::clone(&metrics),
            Arc::new(FixedFactory(backends(
                ProbeStatus::Success,
                ProbeStatus::ErrorAuth,
            ))),
        )
        .await
        .unwrap();

        assert_eq!(collector.pool_size().await, 3);
        collector.on_scrape().await;

        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("gateway_exporter_scrape_requests_total 1"));
        assert!(rendered.contains("gateway_exporter_scrape_errors_total 0"));
        // the query probe failed auth, the status probes did not
        assert!(rendered.contains(
            "gateway_exporter_probe_errors_total{action=\"query_check\",param=\"SELECT 1\",status=\"error_auth\",target=\"postgres://gw.example:5432/default\",user=\"admin\"} 1"
        ));
        assert!(rendered.contains(
            "gateway_exporter_probe_errors_total{action=\"status_check\",param=\"/?op=GETFILESTATUS\",status=\"error_auth\",target=\"https://gw.example:8443/gateway/default/webhdfs/v1\",user=\"admin\"} 0"
        ));
        collector.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reload_applies_new_probe_set_and_counts_once() {
        let source = Arc::new(ScriptedSource::new(snapshot(
            1,
            "status_services:\n  - name: one\n    url: https://gw.example/a\n",
        )));
        let metrics = metrics();
        let collector = GatewayCollector::new(
            Arc::clone(&source) as Arc<dyn ConfigSource>,
            Arc::clone(&metrics),
            Arc::new(FixedFactory(backends(
                ProbeStatus::Success,
                ProbeStatus::Success,
            ))),
        )
        .await
        .unwrap();
        assert_eq!(collector.pool_size().await, 1);

        // unchanged config: no reload counted
        collector.on_scrape().await;
        assert!(metrics
            .render()
            .unwrap()
            .contains("gateway_exporter_config_reloads_total 0"));

        source.stage(Ok(snapshot(2, TWO_STATUS_ONE_QUERY)));
        collector.on_scrape().await;
        assert_eq!(collector.pool_size().await, 3);
        assert_eq!(collector.active_snapshot().await.version, 2);
        assert!(metrics
            .render()
            .unwrap()
            .contains("gateway_exporter_config_reloads_total 1"));

        // steady state again
        collector.on_scrape().await;
        assert!(metrics
            .render()
            .unwrap()
            .contains("gateway_exporter_config_reloads_total 1"));
        collector.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_reload_counts_scrape_error_and_keeps_state() {
        let source = Arc::new(ScriptedSource::new(snapshot(
            1,
            "status_services:\n  - name: one\n    url: https://gw.example/a\n",
        )));
        let metrics = metrics();
        let collector = GatewayCollector::new(
            Arc::clone(&source) as Arc<dyn ConfigSource>,
            Arc::clone(&metrics),
            Arc::new(FixedFactory(backends(
                ProbeStatus::Success,
                ProbeStatus::Success,
            ))),
        )
        .await
        .unwrap();

        source.stage(Err(crate::error::ExporterError::Configuration(
            "broken document".to_string(),
        )));
        collector.on_scrape().await;

        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("gateway_exporter_scrape_errors_total 1"));
        assert!(rendered.contains("gateway_exporter_config_reloads_total 0"));
        assert_eq!(collector.active_snapshot().await.version, 1);
        assert_eq!(collector.pool_size().await, 1);

        // the next scrape proceeds against the previous generation
        collector.on_scrape().await;
        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("gateway_exporter_scrape_requests_total 2"));
        assert!(rendered.contains("gateway_exporter_scrape_errors_total 1"));
        collector.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn zero_probe_scrape_still_reports() {
        let source = Arc::new(ScriptedSource::new(snapshot(1, "default_username: admin\n")));
        let metrics = metrics();
        let collector = GatewayCollector::new(
            source,
            Arc::clone(&metrics),
            Arc::new(FixedFactory(backends(
                ProbeStatus::Success,
                ProbeStatus::Success,
            ))),
        )
        .await
        .unwrap();

        assert_eq!(collector.pool_size().await, 0);
        collector.on_scrape().await;

        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("gateway_exporter_scrape_requests_total 1"));
        assert!(rendered.contains("gateway_exporter_scrape_errors_total 0"));
        assert!(rendered.contains("gateway_exporter_scrape_duration_seconds"));
        collector.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn faulted_probe_counts_as_error_other() {
        let source = Arc::new(ScriptedSource::new(snapshot(
            1,
            "status_services:\n  - name: one\n    url: https://gw.example/a\n",
        )));
        let metrics = metrics();
        let collector = GatewayCollector::new(
            source,
            Arc::clone(&metrics),
            Arc::new(FixedFactory(BackendSet::new(
                Arc::new(PanicBackend),
                Arc::new(FixedBackend(ProbeStatus::Success)),
            ))),
        )
        .await
        .unwrap();

        collector.on_scrape().await;
        let rendered = metrics.render().unwrap();
        assert!(rendered.contains(
            "gateway_exporter_probe_errors_total{action=\"status_check\",param=\"-\",status=\"error_other\",target=\"https://gw.example/a\",user=\"\"} 1"
        ));
        // a faulted probe is an outcome, not a scrape failure
        assert!(rendered.contains("gateway_exporter_scrape_errors_total 0"));
        collector.shutdown(Duration::from_secs(1)).await;
    }
}
