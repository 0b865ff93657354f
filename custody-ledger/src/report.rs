//! Session report handed to the rendering layer

use crate::{
    session::CustodySession,
    types::{ArtifactKind, EvidenceItem, SessionMetadata},
    verifier::VerificationReport,
    Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Everything a rendered custody report needs, in one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Report generation time
    pub generated_at: DateTime<Utc>,

    /// Session metadata from SESSION_OPEN
    pub metadata: Option<SessionMetadata>,

    /// Ledger length
    pub entry_count: usize,

    /// Seal digest if the session is closed
    pub seal: Option<String>,

    /// Registered evidence in registration order
    pub evidence: Vec<EvidenceItem>,

    /// Item count per artifact kind
    pub evidence_by_kind: BTreeMap<ArtifactKind, usize>,

    /// Verification outcome, if one was run
    pub verification: Option<VerificationReport>,
}

impl SessionReport {
    /// Gather the report from a session snapshot
    pub fn build(session: &CustodySession, verification: Option<VerificationReport>) -> Self {
        let (entries, evidence) = session.snapshot();

        let mut evidence_by_kind = BTreeMap::new();
        for item in &evidence {
            *evidence_by_kind.entry(item.kind).or_insert(0) += 1;
        }

        let seal = entries
            .last()
            .and_then(|e| e.payload.as_seal())
            .map(|record| record.seal.clone());

        Self {
            generated_at: Utc::now(),
            metadata: session.metadata().cloned(),
            entry_count: entries.len(),
            seal,
            evidence,
            evidence_by_kind,
            verification,
        }
    }

    /// Write as pretty JSON
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
