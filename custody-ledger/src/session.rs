//! Custody session
//!
//! One investigation run: the hash-chained ledger plus the evidence set it
//! describes. Both sit behind a single mutex so that "read head hash,
//! assign id, build entry, persist, commit" is one critical section.
//! Concurrent registrations are linearized in lock acquisition order.
//!
//! Artifacts are digested before the lock is taken; only the commit runs
//! inside it (see `EvidenceManager`).

use crate::{
    config::Config,
    crypto::KeyPair,
    digest::Digests,
    journal::Journal,
    ledger::{CustodyLedger, LedgerState},
    store::EvidenceStore,
    types::{
        ArtifactKind, CloseSummary, EntryPayload, EventType, EvidenceId, EvidenceItem,
        LedgerEntry, Receipt, SessionMetadata,
    },
    Error, Result,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Evidence ready to commit, minus its id
#[derive(Debug, Clone)]
pub(crate) struct EvidenceDraft {
    pub label: String,
    pub kind: ArtifactKind,
    pub description: Option<String>,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub collected_at: DateTime<Utc>,
    pub collector_identity: String,
    pub digests: Digests,
    pub metadata: BTreeMap<String, String>,
}

impl EvidenceDraft {
    fn into_item(self, id: EvidenceId) -> EvidenceItem {
        EvidenceItem {
            id,
            label: self.label,
            kind: self.kind,
            description: self.description,
            path: self.path,
            size_bytes: self.size_bytes,
            collected_at: self.collected_at,
            collector_identity: self.collector_identity,
            digests: self.digests,
            metadata: self.metadata,
        }
    }
}

#[derive(Debug)]
struct SessionInner {
    ledger: CustodyLedger,
    store: EvidenceStore,
    next_id: u64,
}

impl SessionInner {
    /// Append an evidence entry and index the item
    ///
    /// The id is checked before the ledger is touched so a collision leaves
    /// no entry behind.
    fn commit_item(&mut self, item: EvidenceItem) -> Result<u64> {
        self.ledger.ensure_open()?;

        if self.store.contains(item.id) {
            return Err(Error::DuplicateId(item.id.to_string()));
        }

        let id = item.id;
        let sequence_number = self
            .ledger
            .append(EventType::EvidenceRegistered, EntryPayload::EvidenceRegistered(item.clone()))?;
        self.store.put(item)?;
        self.next_id = self.next_id.max(id.value().saturating_add(1));

        Ok(sequence_number)
    }
}

/// Shared handle to one investigation run
#[derive(Debug)]
pub struct CustodySession {
    metadata: Option<SessionMetadata>,
    inner: Mutex<SessionInner>,
}

impl CustodySession {
    /// In-memory session
    pub fn new(metadata: SessionMetadata) -> Self {
        Self::with_ledger(Some(metadata), CustodyLedger::new(), EvidenceStore::new())
    }

    /// Session persisted to a new journal file at `path`
    pub fn with_journal(
        metadata: SessionMetadata,
        path: impl AsRef<Path>,
        sync_on_append: bool,
    ) -> Result<Self> {
        let journal = Journal::create(path, sync_on_append)?;
        Ok(Self::with_ledger(
            Some(metadata),
            CustodyLedger::with_journal(journal),
            EvidenceStore::new(),
        ))
    }

    /// Session laid out according to `config`
    pub fn from_config(config: &Config, metadata: SessionMetadata) -> Result<Self> {
        if config.journal.enabled {
            Self::with_journal(metadata, config.journal_path(), config.journal.sync_on_append)
        } else {
            Ok(Self::new(metadata))
        }
    }

    /// Sign the seal with `key` at close
    pub fn with_signing_key(mut self, key: KeyPair) -> Self {
        self.inner.get_mut().ledger.set_signing_key(key);
        self
    }

    /// Rebuild a read-only session from a journal file
    ///
    /// Integrity is not judged here; a tampered journal loads and is
    /// reported by the verifier. Only an unreadable or unparseable journal
    /// is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = Journal::read(path).map_err(|e| match e {
            Error::Io(io) => {
                Error::Verification(format!("journal {} unreadable: {}", path.display(), io))
            }
            other => other,
        })?;

        let metadata = match contents.entries.first().map(|e| &e.payload) {
            Some(EntryPayload::SessionOpen(metadata)) => Some(metadata.clone()),
            _ => None,
        };

        let mut store = EvidenceStore::new();
        for entry in &contents.entries {
            if let Some(item) = entry.payload.as_evidence() {
                if store.put(item.clone()).is_err() {
                    tracing::warn!(
                        sequence_number = entry.sequence_number,
                        evidence_id = %item.id,
                        "Journal repeats an evidence id; keeping the first occurrence"
                    );
                }
            }
        }

        tracing::info!(
            path = %path.display(),
            entries = contents.entries.len(),
            evidence = store.len(),
            "Custody journal loaded"
        );

        Ok(Self::with_ledger(
            metadata,
            CustodyLedger::from_entries(contents.entries),
            store,
        ))
    }

    fn with_ledger(
        metadata: Option<SessionMetadata>,
        ledger: CustodyLedger,
        store: EvidenceStore,
    ) -> Self {
        let next_id = store
            .list()
            .iter()
            .map(|i| i.id.value().saturating_add(1))
            .max()
            .unwrap_or(1);
        Self {
            metadata,
            inner: Mutex::new(SessionInner {
                ledger,
                store,
                next_id,
            }),
        }
    }

    /// Emit SESSION_OPEN
    pub fn open(&self) -> Result<u64> {
        let metadata = self.metadata.clone().ok_or(Error::AlreadyClosed)?;
        self.inner.lock().ledger.open(metadata)
    }

    /// Append an event
    ///
    /// EVIDENCE_REGISTERED payloads are also indexed in the evidence set so
    /// the two never drift apart.
    pub fn append(&self, event_type: EventType, payload: EntryPayload) -> Result<u64> {
        let mut inner = self.inner.lock();
        match payload {
            EntryPayload::EvidenceRegistered(item) if event_type == EventType::EvidenceRegistered => {
                inner.commit_item(item)
            }
            payload => inner.ledger.append(event_type, payload),
        }
    }

    /// Assign an id and commit a digested artifact
    pub(crate) fn commit_evidence(&self, draft: EvidenceDraft) -> Result<Receipt> {
        let mut inner = self.inner.lock();
        let id = EvidenceId::new(inner.next_id);
        let item = draft.into_item(id);
        let digests = item.digests.clone();
        let size_bytes = item.size_bytes;

        let sequence_number = inner.commit_item(item)?;

        Ok(Receipt {
            id,
            digests,
            sequence_number,
            size_bytes,
        })
    }

    /// Emit SESSION_CLOSE with the seal
    pub fn close(&self, summary: CloseSummary) -> Result<u64> {
        let mut inner = self.inner.lock();
        let evidence_count = inner.store.len() as u64;
        inner.ledger.close(summary, evidence_count)
    }

    /// Copy of the ledger
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.inner.lock().ledger.entries().to_vec()
    }

    /// Copy of the evidence set in registration order
    pub fn evidence(&self) -> Vec<EvidenceItem> {
        self.inner.lock().store.list().to_vec()
    }

    /// Ledger and evidence taken under one lock, so the evidence set matches
    /// the ledger prefix exactly
    pub fn snapshot(&self) -> (Vec<LedgerEntry>, Vec<EvidenceItem>) {
        let inner = self.inner.lock();
        (inner.ledger.entries().to_vec(), inner.store.list().to_vec())
    }

    /// Look up one item
    pub fn get_evidence(&self, id: EvidenceId) -> Option<EvidenceItem> {
        self.inner.lock().store.get(id).cloned()
    }

    /// Items of one kind
    pub fn evidence_by_kind(&self, kind: ArtifactKind) -> Vec<EvidenceItem> {
        self.inner.lock().store.by_kind(kind).cloned().collect()
    }

    /// Number of registered items
    pub fn evidence_count(&self) -> usize {
        self.inner.lock().store.len()
    }

    /// Number of ledger entries
    pub fn len(&self) -> usize {
        self.inner.lock().ledger.len()
    }

    /// True before SESSION_OPEN
    pub fn is_empty(&self) -> bool {
        self.inner.lock().ledger.is_empty()
    }

    /// Metadata recorded at open; `None` for a journal without SESSION_OPEN
    pub fn metadata(&self) -> Option<&SessionMetadata> {
        self.metadata.as_ref()
    }

    /// Session id
    pub fn session_id(&self) -> Option<Uuid> {
        self.metadata.as_ref().map(|m| m.session_id)
    }

    /// True while appends are accepted
    pub fn is_open(&self) -> bool {
        self.inner.lock().ledger.state() == LedgerState::Open
    }

    /// True once closed or when loaded from a journal
    pub fn is_closed(&self) -> bool {
        self.inner.lock().ledger.state() == LedgerState::Closed
    }

    /// True if the last entry is SESSION_CLOSE
    pub fn is_sealed(&self) -> bool {
        self.inner.lock().ledger.is_sealed()
    }

    /// Fail unless the session accepts appends
    pub fn ensure_open(&self) -> Result<()> {
        self.inner.lock().ledger.ensure_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::DigestAlgorithm;
    use crate::system::SystemInfo;
    use std::sync::Arc;

    fn session() -> CustodySession {
        CustodySession::new(SessionMetadata::new("case-7", "analyst", SystemInfo::capture()))
    }

    fn draft(label: &str) -> EvidenceDraft {
        let mut digests = Digests::new();
        digests.insert(DigestAlgorithm::Sha256, "cd".repeat(32));
        EvidenceDraft {
            label: label.to_string(),
            kind: ArtifactKind::Other,
            description: None,
            path: PathBuf::from(format!("/evidence/{}", label)),
            size_bytes: 4,
            collected_at: Utc::now(),
            collector_identity: "root".to_string(),
            digests,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_commit_assigns_sequential_ids() {
        let session = session();
        session.open().unwrap();

        let first = session.commit_evidence(draft("a")).unwrap();
        let second = session.commit_evidence(draft("b")).unwrap();

        assert_eq!(first.id, EvidenceId::new(1));
        assert_eq!(second.id, EvidenceId::new(2));
        assert_eq!(first.sequence_number, 1);
        assert_eq!(second.sequence_number, 2);
        assert_eq!(session.evidence_count(), 2);
    }

    #[test]
    fn test_commit_requires_open_session() {
        let session = session();
        assert!(matches!(
            session.commit_evidence(draft("a")),
            Err(Error::NotOpen)
        ));
        assert!(session.is_empty());
    }

    #[test]
    fn test_duplicate_id_leaves_no_entry() {
        let session = session();
        session.open().unwrap();
        let receipt = session.commit_evidence(draft("a")).unwrap();

        let item = session.get_evidence(receipt.id).unwrap();
        let result = session.append(EventType::EvidenceRegistered, EntryPayload::EvidenceRegistered(item));

        assert!(matches!(result, Err(Error::DuplicateId(_))));
        assert_eq!(session.len(), 2);
        assert_eq!(session.evidence_count(), 1);
    }

    #[test]
    fn test_close_records_evidence_count() {
        let session = session();
        session.open().unwrap();
        session.commit_evidence(draft("a")).unwrap();
        session.close(CloseSummary::new("analyst")).unwrap();

        let entries = session.entries();
        let seal = entries.last().unwrap().payload.as_seal().unwrap();
        assert_eq!(seal.evidence_count, 1);
        assert!(session.is_sealed());
        assert!(session.is_closed());
        assert!(matches!(
            session.commit_evidence(draft("b")),
            Err(Error::AlreadyClosed)
        ));
    }

    #[test]
    fn test_concurrent_commits_are_linearized() {
        let session = Arc::new(session());
        session.open().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || session.commit_evidence(draft(&format!("m{}", i))))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let entries = session.entries();
        assert_eq!(entries.len(), 9);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.sequence_number, i as u64);
        }
        for pair in entries.windows(2) {
            assert_eq!(pair[1].prev_hash, pair[0].entry_hash);
        }
    }

    #[test]
    fn test_load_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("custody.jsonl");

        let session = CustodySession::with_journal(
            SessionMetadata::new("case-7", "analyst", SystemInfo::capture()),
            &path,
            false,
        )
        .unwrap();
        session.open().unwrap();
        session.commit_evidence(draft("a")).unwrap();
        session.close(CloseSummary::new("analyst")).unwrap();

        let loaded = CustodySession::load(&path).unwrap();
        assert_eq!(loaded.entries(), session.entries());
        assert_eq!(loaded.evidence(), session.evidence());
        assert_eq!(loaded.session_id(), session.session_id());
        assert!(loaded.is_sealed());
        assert!(matches!(loaded.open(), Err(Error::AlreadyClosed)));
    }

    #[test]
    fn test_load_missing_journal_is_verification_error() {
        assert!(matches!(
            CustodySession::load("/nonexistent/custody.jsonl"),
            Err(Error::Verification(_))
        ));
    }
}
