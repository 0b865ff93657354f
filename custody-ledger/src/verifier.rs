//! Verifier
//!
//! Two independent checks over a custody ledger:
//!
//! 1. Chain walk: recompute every `entry_hash` forward from genesis and
//!    compare with the stored `prev_hash`/`entry_hash`, plus the structural
//!    rules (contiguous sequence numbers, SESSION_OPEN first, nothing after
//!    SESSION_CLOSE, seal and optional signature).
//! 2. Artifact check: re-digest every registered artifact and compare with
//!    the committed digests.
//!
//! TAMPERED, MISMATCH and MISSING_FILE are report values, never errors. Only
//! I/O problems unrelated to integrity (unreadable journal, permission
//! denied on an artifact) fail with `Error::Verification`.

use crate::{
    crypto::{compute_seal, verify_seal_signature, GENESIS_HASH},
    digest::{hex_eq, DigestAlgorithm, DigestEngine},
    session::CustodySession,
    types::{
        EntryPayload, EventType, EvidenceId, EvidenceItem, ItemStatus, LedgerEntry, LedgerStatus,
        SignatureStatus, VerificationSummary,
    },
    Error, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Outcome for one evidence item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemVerification {
    /// Evidence id
    pub id: EvidenceId,

    /// Evidence label
    pub label: String,

    /// Artifact location
    #[serde(with = "crate::types::os_path")]
    pub path: PathBuf,

    /// MATCH / MISMATCH / MISSING_FILE
    pub status: ItemStatus,

    /// Algorithms whose digest no longer matches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mismatched_algorithms: Vec<DigestAlgorithm>,
}

/// Outcome of the chain walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerVerification {
    /// INTACT / TAMPERED
    pub status: LedgerStatus,

    /// First entry that fails a check
    pub first_broken_sequence_number: Option<u64>,

    /// Entries walked
    pub entries_checked: u64,

    /// Ledger ends with SESSION_CLOSE
    pub sealed: bool,

    /// Seal signature status
    pub seal_signature: SignatureStatus,

    /// Why the chain is broken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl LedgerVerification {
    fn broken(index: usize, entries_checked: usize, reason: impl Into<String>) -> Self {
        Self {
            status: LedgerStatus::Tampered,
            first_broken_sequence_number: Some(index as u64),
            entries_checked: entries_checked as u64,
            sealed: false,
            seal_signature: SignatureStatus::Absent,
            reason: Some(reason.into()),
        }
    }

    /// True if the chain is intact
    pub fn is_intact(&self) -> bool {
        self.status == LedgerStatus::Intact
    }
}

/// Full verification outcome, ready for inclusion in a rendered report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// When verification ran
    pub verified_at: DateTime<Utc>,

    /// Session id from SESSION_OPEN, if readable
    pub session_id: Option<Uuid>,

    /// Chain outcome
    pub ledger: LedgerVerification,

    /// Per-item outcomes in registration order
    pub items: Vec<ItemVerification>,
}

impl VerificationReport {
    fn count(&self, status: ItemStatus) -> u64 {
        self.items.iter().filter(|i| i.status == status).count() as u64
    }

    /// Compact form committed as VERIFICATION_RUN
    pub fn summary(&self) -> VerificationSummary {
        VerificationSummary {
            verified_at: self.verified_at,
            ledger_status: self.ledger.status,
            first_broken_sequence_number: self.ledger.first_broken_sequence_number,
            entries_checked: self.ledger.entries_checked,
            matched: self.count(ItemStatus::Match),
            mismatched: self.count(ItemStatus::Mismatch),
            missing: self.count(ItemStatus::MissingFile),
        }
    }

    /// INTACT ledger and every item MATCH
    pub fn is_clean(&self) -> bool {
        self.ledger.is_intact() && self.items.iter().all(|i| i.status == ItemStatus::Match)
    }

    /// Pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Ledger and artifact verifier
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    engine: DigestEngine,
    trusted_key: Option<[u8; 32]>,
}

impl Verifier {
    /// Verifier reading artifacts with the default chunk size
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse an engine's chunk size for re-digesting
    pub fn with_engine(mut self, engine: DigestEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Require the seal to be signed by this Ed25519 public key
    pub fn with_trusted_key(mut self, public_key: [u8; 32]) -> Self {
        self.trusted_key = Some(public_key);
        self
    }

    /// Verify a session
    ///
    /// An open session is verified as the prefix committed so far. A closed or
    /// loaded session must end with SESSION_CLOSE.
    pub fn verify(&self, session: &CustodySession) -> Result<VerificationReport> {
        let open = session.is_open();
        if open {
            tracing::warn!(
                session_id = ?session.session_id(),
                "Verifying an open session; result covers the current prefix only"
            );
        }
        self.verify_snapshot(&session.entries(), !open)
    }

    /// Rebuild a session from a journal file and verify it
    pub fn verify_journal(&self, path: impl AsRef<Path>) -> Result<VerificationReport> {
        let session = CustodySession::load(path)?;
        self.verify(&session)
    }

    /// Verify a finished ledger and the artifacts it references
    ///
    /// The ledger must end with SESSION_CLOSE.
    pub fn verify_entries(&self, entries: &[LedgerEntry]) -> Result<VerificationReport> {
        self.verify_snapshot(entries, true)
    }

    fn verify_snapshot(&self, entries: &[LedgerEntry], require_seal: bool) -> Result<VerificationReport> {
        if entries.is_empty() {
            return Err(Error::Verification("ledger has no entries".to_string()));
        }

        let mut ledger = self.verify_chain(entries);
        if require_seal && ledger.is_intact() && !ledger.sealed {
            ledger = LedgerVerification::broken(entries.len(), entries.len(), "missing seal");
        }

        let items = entries
            .iter()
            .filter_map(|e| e.payload.as_evidence())
            .map(|item| self.verify_item(item))
            .collect::<Result<Vec<_>>>()?;

        let session_id = match &entries[0].payload {
            EntryPayload::SessionOpen(metadata) => Some(metadata.session_id),
            _ => None,
        };

        let report = VerificationReport {
            verified_at: Utc::now(),
            session_id,
            ledger,
            items,
        };

        let summary = report.summary();
        if report.is_clean() {
            tracing::info!(
                session_id = ?report.session_id,
                entries_checked = summary.entries_checked,
                matched = summary.matched,
                "Verification passed"
            );
        } else {
            tracing::warn!(
                session_id = ?report.session_id,
                ledger_status = ?summary.ledger_status,
                first_broken_sequence_number = ?summary.first_broken_sequence_number,
                mismatched = summary.mismatched,
                missing = summary.missing,
                "Verification found integrity problems"
            );
        }

        Ok(report)
    }

    /// Walk the chain
    ///
    /// An unsealed chain that links correctly is INTACT with `sealed == false`;
    /// callers verifying a finished ledger use `verify_entries`.
    pub fn verify_chain(&self, entries: &[LedgerEntry]) -> LedgerVerification {
        let mut expected_prev = GENESIS_HASH.to_string();
        let mut seal_signature = SignatureStatus::Absent;

        for (index, entry) in entries.iter().enumerate() {
            let checked = index + 1;

            if index > 0 && entries[index - 1].event_type == EventType::SessionClose {
                return LedgerVerification::broken(index, checked, "entry after SESSION_CLOSE");
            }

            let recomputed = match entry.compute_hash() {
                Ok(hash) => hash,
                Err(e) => {
                    return LedgerVerification::broken(index, checked, format!("unencodable: {}", e))
                }
            };

            if entry.sequence_number != index as u64 {
                return LedgerVerification::broken(
                    index,
                    checked,
                    format!("sequence number {} at position {}", entry.sequence_number, index),
                );
            }
            if entry.prev_hash != expected_prev {
                return LedgerVerification::broken(index, checked, "prev_hash does not link");
            }
            if entry.entry_hash != recomputed {
                return LedgerVerification::broken(index, checked, "entry_hash does not recompute");
            }
            if entry.event_type != entry.payload.event_type() {
                return LedgerVerification::broken(index, checked, "event type does not match payload");
            }
            if (index == 0) != (entry.event_type == EventType::SessionOpen) {
                return LedgerVerification::broken(index, checked, "SESSION_OPEN must be entry 0 only");
            }

            if let Some(record) = entry.payload.as_seal() {
                let expected_seal =
                    compute_seal(entries[..index].iter().map(|e| e.entry_hash.as_str()));
                if record.seal != expected_seal || record.entry_count != index as u64 {
                    return LedgerVerification::broken(index, checked, "seal does not cover history");
                }

                seal_signature = match (&record.signature, &self.trusted_key) {
                    (Some(signature), trusted) => {
                        match verify_seal_signature(&record.seal, signature, trusted.as_ref()) {
                            Ok(()) => SignatureStatus::Valid,
                            Err(e) => {
                                let mut broken = LedgerVerification::broken(
                                    index,
                                    checked,
                                    format!("seal signature: {}", e),
                                );
                                broken.seal_signature = SignatureStatus::Invalid;
                                return broken;
                            }
                        }
                    }
                    (None, Some(_)) => {
                        return LedgerVerification::broken(index, checked, "seal is not signed");
                    }
                    (None, None) => SignatureStatus::Absent,
                };
            }

            tracing::trace!(sequence_number = index, "Entry verified");
            expected_prev = recomputed;
        }

        LedgerVerification {
            status: LedgerStatus::Intact,
            first_broken_sequence_number: None,
            entries_checked: entries.len() as u64,
            sealed: entries
                .last()
                .map(|e| e.event_type == EventType::SessionClose)
                .unwrap_or(false),
            seal_signature,
            reason: None,
        }
    }

    /// Re-digest one artifact and compare with its committed digests
    pub fn verify_item(&self, item: &EvidenceItem) -> Result<ItemVerification> {
        let mut outcome = ItemVerification {
            id: item.id,
            label: item.label.clone(),
            path: item.path.clone(),
            status: ItemStatus::Match,
            mismatched_algorithms: Vec::new(),
        };

        let engine = match DigestEngine::new(item.digests.keys().copied()) {
            Ok(engine) => engine.with_chunk_size(self.engine.chunk_size()),
            Err(_) => {
                // No committed digests: nothing can vouch for the artifact
                outcome.status = ItemStatus::Mismatch;
                return Ok(outcome);
            }
        };

        let current = match engine.digest_path(&item.path) {
            Ok(output) => output,
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(evidence_id = %item.id, path = %item.path.display(), "Artifact missing");
                outcome.status = ItemStatus::MissingFile;
                return Ok(outcome);
            }
            Err(e) => {
                return Err(Error::Verification(format!(
                    "cannot read {} for {}: {}",
                    item.path.display(),
                    item.id,
                    e
                )))
            }
        };

        outcome.mismatched_algorithms = item
            .digests
            .iter()
            .filter(|(alg, stored)| {
                current
                    .digests
                    .get(*alg)
                    .map(|now| !hex_eq(now, stored))
                    .unwrap_or(true)
            })
            .map(|(alg, _)| *alg)
            .collect();

        if !outcome.mismatched_algorithms.is_empty() || current.size_bytes != item.size_bytes {
            tracing::warn!(
                evidence_id = %item.id,
                path = %item.path.display(),
                algorithms = ?outcome.mismatched_algorithms,
                "Artifact digest mismatch"
            );
            outcome.status = ItemStatus::Mismatch;
        }

        Ok(outcome)
    }
}
