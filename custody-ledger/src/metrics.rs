//! Metrics collection for observability
//!
//! Prometheus metrics for a collection run. Each `Metrics` owns its own
//! registry, so several sessions (or tests) can coexist in one process.
//!
//! # Metrics
//!
//! - `custody_evidence_registered_total` - Artifacts committed to the ledger
//! - `custody_registration_failures_total` - Registrations that were aborted
//! - `custody_bytes_digested_total` - Bytes read by the digest engine
//! - `custody_digest_duration_seconds` - Histogram of per-artifact digest time
//! - `custody_ledger_entries` - Current ledger length
//! - `custody_verification_runs_total` - Verifications recorded in the ledger

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Artifacts committed
    pub evidence_registered: IntCounter,

    /// Aborted registrations
    pub registration_failures: IntCounter,

    /// Bytes digested
    pub bytes_digested: IntCounter,

    /// Digest duration histogram
    pub digest_duration: Histogram,

    /// Ledger length
    pub ledger_entries: IntGauge,

    /// Verification runs recorded
    pub verification_runs: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let evidence_registered = IntCounter::new(
            "custody_evidence_registered_total",
            "Artifacts committed to the custody ledger",
        )?;
        registry.register(Box::new(evidence_registered.clone()))?;

        let registration_failures = IntCounter::new(
            "custody_registration_failures_total",
            "Registrations aborted without a ledger entry",
        )?;
        registry.register(Box::new(registration_failures.clone()))?;

        let bytes_digested = IntCounter::new(
            "custody_bytes_digested_total",
            "Bytes read by the digest engine",
        )?;
        registry.register(Box::new(bytes_digested.clone()))?;

        let digest_duration = Histogram::with_opts(
            HistogramOpts::new(
                "custody_digest_duration_seconds",
                "Histogram of per-artifact digest time",
            )
            .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]),
        )?;
        registry.register(Box::new(digest_duration.clone()))?;

        let ledger_entries = IntGauge::new("custody_ledger_entries", "Current ledger length")?;
        registry.register(Box::new(ledger_entries.clone()))?;

        let verification_runs = IntCounter::new(
            "custody_verification_runs_total",
            "Verification runs recorded in the ledger",
        )?;
        registry.register(Box::new(verification_runs.clone()))?;

        Ok(Self {
            evidence_registered,
            registration_failures,
            bytes_digested,
            digest_duration,
            ledger_entries,
            verification_runs,
            registry,
        })
    }

    /// Record a committed artifact
    pub fn record_registration(&self, size_bytes: u64, digest_seconds: f64) {
        self.evidence_registered.inc();
        self.bytes_digested.inc_by(size_bytes);
        self.digest_duration.observe(digest_seconds);
    }

    /// Record an aborted registration
    pub fn record_failure(&self) {
        self.registration_failures.inc();
    }

    /// Record a verification run
    pub fn record_verification(&self) {
        self.verification_runs.inc();
    }

    /// Update ledger length
    pub fn update_ledger_entries(&self, entries: usize) {
        self.ledger_entries.set(entries as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("evidence_registered", &self.evidence_registered.get())
            .field("registration_failures", &self.registration_failures.get())
            .field("ledger_entries", &self.ledger_entries.get())
            .finish()
    }
}
