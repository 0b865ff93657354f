//! Hash-chained custody ledger
//!
//! Every entry embeds the `entry_hash` of its predecessor, so any later
//! edit, insertion, deletion or reordering of history breaks the chain at
//! the first affected position. SESSION_CLOSE additionally commits a seal
//! over every prior entry hash.
//!
//! `CustodyLedger` is a plain single-owner structure (`&mut self` for
//! writes). Concurrent writers go through `CustodySession`, which holds it
//! behind a mutex.
//!
//! # Example
//!
//! ```
//! use custody_ledger::ledger::CustodyLedger;
//! use custody_ledger::system::SystemInfo;
//! use custody_ledger::types::{CloseSummary, SessionMetadata};
//!
//! let mut ledger = CustodyLedger::new();
//! ledger.open(SessionMetadata::new("case-1", "analyst", SystemInfo::capture()))?;
//! ledger.close(CloseSummary::new("analyst"), 0)?;
//! assert_eq!(ledger.len(), 2);
//! # Ok::<(), custody_ledger::Error>(())
//! ```

use crate::{
    crypto::{compute_seal, KeyPair, GENESIS_HASH},
    journal::Journal,
    types::{CloseSummary, EntryPayload, EventType, LedgerEntry, SealRecord, SessionMetadata},
    Error, Result,
};
use chrono::Utc;

/// Lifecycle of a ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerState {
    /// Created, SESSION_OPEN not yet written
    Pending,
    /// Accepting appends
    Open,
    /// Sealed or reloaded; immutable
    Closed,
}

/// Append-only hash-chained log
#[derive(Debug)]
pub struct CustodyLedger {
    state: LedgerState,
    entries: Vec<LedgerEntry>,
    journal: Option<Journal>,
    signing_key: Option<KeyPair>,
}

impl Default for CustodyLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl CustodyLedger {
    /// In-memory ledger
    pub fn new() -> Self {
        Self {
            state: LedgerState::Pending,
            entries: Vec::new(),
            journal: None,
            signing_key: None,
        }
    }

    /// Ledger that persists every entry to `journal` before committing it
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal: Some(journal),
            ..Self::new()
        }
    }

    /// Sign the seal with `key` at close
    pub fn set_signing_key(&mut self, key: KeyPair) {
        self.signing_key = Some(key);
    }

    /// Rebuild from previously written entries
    ///
    /// The result is immutable: further appends fail with `AlreadyClosed`.
    /// Chain integrity is not checked here; that is the verifier's job.
    pub fn from_entries(entries: Vec<LedgerEntry>) -> Self {
        Self {
            state: LedgerState::Closed,
            entries,
            journal: None,
            signing_key: None,
        }
    }

    /// Emit SESSION_OPEN as entry 0
    pub fn open(&mut self, metadata: SessionMetadata) -> Result<u64> {
        match self.state {
            LedgerState::Pending => {}
            LedgerState::Open => return Err(Error::AlreadyOpen),
            LedgerState::Closed => return Err(Error::AlreadyClosed),
        }

        let session_id = metadata.session_id;
        let sequence_number = self.commit(EntryPayload::SessionOpen(metadata))?;
        self.state = LedgerState::Open;

        tracing::info!(%session_id, sequence_number, "Custody session opened");
        Ok(sequence_number)
    }

    /// Append an event and return its sequence number
    ///
    /// SESSION_OPEN and SESSION_CLOSE are only emitted through `open` and
    /// `close`.
    pub fn append(&mut self, event_type: EventType, payload: EntryPayload) -> Result<u64> {
        self.ensure_open()?;

        if payload.event_type() != event_type {
            return Err(Error::PayloadMismatch {
                event_type: event_type.to_string(),
                payload: payload.event_type().to_string(),
            });
        }

        match event_type {
            EventType::SessionOpen => Err(Error::AlreadyOpen),
            EventType::SessionClose => Err(Error::PayloadMismatch {
                event_type: event_type.to_string(),
                payload: "seal (use close)".to_string(),
            }),
            EventType::EvidenceRegistered | EventType::VerificationRun => self.commit(payload),
        }
    }

    /// Emit SESSION_CLOSE with a seal over every prior entry hash
    pub fn close(&mut self, summary: CloseSummary, evidence_count: u64) -> Result<u64> {
        self.ensure_open()?;

        let seal = compute_seal(self.entries.iter().map(|e| e.entry_hash.as_str()));
        let signature = self.signing_key.as_ref().map(|key| key.sign_seal(&seal));

        let record = SealRecord {
            summary,
            entry_count: self.entries.len() as u64,
            evidence_count,
            seal: seal.clone(),
            signature,
        };

        let sequence_number = self.commit(EntryPayload::SessionClose(record))?;
        self.state = LedgerState::Closed;

        tracing::info!(sequence_number, %seal, evidence_count, "Custody session sealed");
        Ok(sequence_number)
    }

    /// Full ordered history
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Most recent entry
    pub fn last(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    /// Hash the next entry will chain from
    pub fn head_hash(&self) -> &str {
        self.entries
            .last()
            .map(|e| e.entry_hash.as_str())
            .unwrap_or(GENESIS_HASH)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was written yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current lifecycle state
    pub fn state(&self) -> LedgerState {
        self.state
    }

    /// True if the last entry is SESSION_CLOSE
    pub fn is_sealed(&self) -> bool {
        matches!(self.entries.last(), Some(e) if e.event_type == EventType::SessionClose)
    }

    /// Fail unless appends are currently accepted
    pub fn ensure_open(&self) -> Result<()> {
        match self.state {
            LedgerState::Open => Ok(()),
            LedgerState::Pending => Err(Error::NotOpen),
            LedgerState::Closed => Err(Error::AlreadyClosed),
        }
    }

    /// Build, hash, persist, then commit one entry
    ///
    /// Nothing is pushed in memory unless the journal write succeeded.
    fn commit(&mut self, payload: EntryPayload) -> Result<u64> {
        let sequence_number = self.entries.len() as u64;

        let mut entry = LedgerEntry {
            sequence_number,
            event_type: payload.event_type(),
            payload,
            timestamp_nanos: Utc::now().timestamp_nanos_opt().unwrap_or(0),
            prev_hash: self.head_hash().to_string(),
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash()?;

        if let Some(journal) = self.journal.as_mut() {
            journal.append(&entry)?;
        }

        tracing::debug!(
            sequence_number,
            event_type = %entry.event_type,
            entry_hash = %entry.entry_hash,
            "Ledger entry committed"
        );

        self.entries.push(entry);
        Ok(sequence_number)
    }
}
