//! Evidence manager
//!
//! The only write path collection modules get. `register` digests the
//! artifact outside the session lock, then enters the short critical
//! section that assigns the id, appends EVIDENCE_REGISTERED and indexes the
//! item. Any failure aborts that one artifact with `Error::Registration`
//! and leaves the session untouched and still appendable.

use crate::{
    digest::DigestEngine,
    metrics::Metrics,
    session::{CustodySession, EvidenceDraft},
    types::{ArtifactKind, CloseSummary, EntryPayload, EventType, Receipt},
    verifier::{VerificationReport, Verifier},
    Error, Result,
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// One artifact to register
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    label: String,
    path: PathBuf,
    collector_identity: String,
    kind: ArtifactKind,
    description: Option<String>,
    metadata: BTreeMap<String, String>,
}

impl RegistrationRequest {
    /// Request with the mandatory fields; kind defaults to `other`
    pub fn new(
        label: impl Into<String>,
        path: impl Into<PathBuf>,
        collector_identity: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
            collector_identity: collector_identity.into(),
            kind: ArtifactKind::Other,
            description: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Artifact category
    pub fn with_kind(mut self, kind: ArtifactKind) -> Self {
        self.kind = kind;
        self
    }

    /// Free-text description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add one metadata pair
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Artifact path as given
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Registration front end for one session
#[derive(Debug, Clone)]
pub struct EvidenceManager {
    session: Arc<CustodySession>,
    engine: DigestEngine,
    verifier: Verifier,
    metrics: Option<Arc<Metrics>>,
}

impl EvidenceManager {
    /// Manager computing every supported digest
    pub fn new(session: Arc<CustodySession>) -> Self {
        Self::with_engine(session, DigestEngine::default())
    }

    /// Manager with a specific digest engine
    pub fn with_engine(session: Arc<CustodySession>, engine: DigestEngine) -> Self {
        let verifier = Verifier::new().with_engine(engine.clone());
        Self {
            session,
            engine,
            verifier,
            metrics: None,
        }
    }

    /// Verify with `verifier` instead of the default
    pub fn with_verifier(mut self, verifier: Verifier) -> Self {
        self.verifier = verifier;
        self
    }

    /// Report into `metrics`
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Session handle
    pub fn session(&self) -> &Arc<CustodySession> {
        &self.session
    }

    /// Digest engine
    pub fn engine(&self) -> &DigestEngine {
        &self.engine
    }

    /// Metrics, if attached
    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    /// Register an artifact
    pub fn register(
        &self,
        label: impl Into<String>,
        path: impl AsRef<Path>,
        collector_identity: impl Into<String>,
    ) -> Result<Receipt> {
        self.register_with(RegistrationRequest::new(
            label,
            path.as_ref(),
            collector_identity,
        ))
    }

    /// Register a packaged evidence bundle as one more item
    pub fn register_bundle(
        &self,
        label: impl Into<String>,
        path: impl AsRef<Path>,
        collector_identity: impl Into<String>,
    ) -> Result<Receipt> {
        self.register_with(
            RegistrationRequest::new(label, path.as_ref(), collector_identity)
                .with_kind(ArtifactKind::Bundle),
        )
    }

    /// Register an artifact with kind, description and metadata
    pub fn register_with(&self, request: RegistrationRequest) -> Result<Receipt> {
        let label = request.label.clone();

        match self.try_register(request) {
            Ok(receipt) => {
                tracing::info!(
                    evidence_id = %receipt.id,
                    sequence_number = receipt.sequence_number,
                    label = %label,
                    size_bytes = receipt.size_bytes,
                    "Evidence registered"
                );
                Ok(receipt)
            }
            Err(e) => {
                tracing::error!(label = %label, error = %e, "Evidence registration failed");
                if let Some(metrics) = &self.metrics {
                    metrics.record_failure();
                }
                Err(Error::registration(label, e))
            }
        }
    }

    fn try_register(&self, request: RegistrationRequest) -> Result<Receipt> {
        // Refuse before spending time on a large digest
        self.session.ensure_open()?;

        let path = std::fs::canonicalize(&request.path)?;
        let started = Instant::now();
        let output = self.engine.digest_path(&path)?;
        let digest_seconds = started.elapsed().as_secs_f64();

        let draft = EvidenceDraft {
            label: request.label,
            kind: request.kind,
            description: request.description,
            path,
            size_bytes: output.size_bytes,
            collected_at: Utc::now(),
            collector_identity: request.collector_identity,
            digests: output.digests,
            metadata: request.metadata,
        };

        let receipt = self.session.commit_evidence(draft)?;

        if let Some(metrics) = &self.metrics {
            metrics.record_registration(receipt.size_bytes, digest_seconds);
            metrics.update_ledger_entries(self.session.len());
        }

        Ok(receipt)
    }

    /// Verify the session's current ledger and artifacts
    pub fn verify(&self) -> Result<VerificationReport> {
        self.verifier.verify(&self.session)
    }

    /// Verify and commit the outcome as VERIFICATION_RUN
    pub fn verify_and_record(&self) -> Result<(VerificationReport, u64)> {
        let report = self.verify()?;
        let sequence_number = self.session.append(
            EventType::VerificationRun,
            EntryPayload::VerificationRun(report.summary()),
        )?;

        if let Some(metrics) = &self.metrics {
            metrics.record_verification();
            metrics.update_ledger_entries(self.session.len());
        }

        Ok((report, sequence_number))
    }

    /// Seal the session
    pub fn close(&self, summary: CloseSummary) -> Result<u64> {
        let sequence_number = self.session.close(summary)?;
        if let Some(metrics) = &self.metrics {
            metrics.update_ledger_entries(self.session.len());
        }
        Ok(sequence_number)
    }
}
