#![allow(clippy::doc_markdown)] // Allow technical terms like WebHDFS, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Gateway Exporter
//!
//! Prometheus exporter that probes gateway-fronted services on every scrape.
//!
//! ## Overview
//!
//! A Prometheus server scraping `/metrics` drives the whole system: each
//! scrape loads (or reloads) the YAML configuration, fans the configured
//! status and query checks out over a bounded worker pool, waits out one
//! shared wall-clock deadline, and reports per-probe durations and error
//! counters. Probes that outlive the deadline are cancelled, classified as
//! timeouts, and have their connections released rather than leaked.
//!
//! ## Architecture
//!
//! - [`config`] - YAML configuration, validation, and change-detecting reload
//! - [`probe`] - Probe specs, the write-once status cell, and the HTTP/SQL backends
//! - [`scheduler`] - Resizable worker pool running probe batches under a deadline
//! - [`collector`] - Per-scrape orchestration tying config, probes, and metrics together
//! - [`metrics`] - Prometheus registry, series declaration, and text exposition
//! - [`web`] - Axum routes for `/metrics` and the home page
//! - [`error`] - Structured error handling
//! - [`logging`] - Console tracing setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gateway_exporter::collector::GatewayCollector;
//! use gateway_exporter::config::FileConfigSource;
//! use gateway_exporter::metrics::ExporterMetrics;
//! use gateway_exporter::probe::ProtocolBackendFactory;
//!
//! # async fn example() -> gateway_exporter::Result<()> {
//! let source = Arc::new(FileConfigSource::new("gateway-exporter.yml"));
//! let metrics = Arc::new(ExporterMetrics::new(Arc::new(prometheus::Registry::new()))?);
//! let collector =
//!     GatewayCollector::new(source, metrics, Arc::new(ProtocolBackendFactory)).await?;
//! let app = gateway_exporter::web::router(Arc::new(collector));
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod probe;
pub mod scheduler;
pub mod web;

pub use collector::GatewayCollector;
pub use config::{ConfigSnapshot, ConfigSource, FileConfigSource, GatewayConfig};
pub use error::{ExporterError, Result};
pub use metrics::ExporterMetrics;
pub use probe::{ActionKind, Probe, ProbeSpec, ProbeStatus, ProtocolBackendFactory};
pub use scheduler::{ProbeOutcome, ProbeScheduler};
