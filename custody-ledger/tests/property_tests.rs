//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Shape: open + N registrations + close yields N+2 contiguous entries
//! - Linkage: every prev_hash is the recomputed hash of its predecessor
//! - Tamper evidence: any single-byte edit is caught at the edited entry,
//!   in memory and in the journal file
//! - Determinism: digests do not depend on chunking or repetition
//! - No deduplication: re-registering a path yields a fresh id

use custody_ledger::{
    crypto::hash_entry,
    system::SystemInfo,
    types::{CloseSummary, LedgerEntry, LedgerStatus, SessionMetadata},
    CustodySession, DigestEngine, Error, EventType, EvidenceManager, Verifier,
};
use proptest::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Strategy for generating artifact contents
fn artifact_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..4096)
}

fn prop_metadata() -> SessionMetadata {
    SessionMetadata::new("prop-case", "prop", SystemInfo::capture())
}

/// Open a session and manager over a fresh temp directory
fn open_session() -> (TempDir, Arc<CustodySession>, EvidenceManager) {
    let temp = tempfile::tempdir().unwrap();
    let session = Arc::new(CustodySession::new(prop_metadata()));
    session.open().unwrap();
    let manager = EvidenceManager::new(Arc::clone(&session));
    (temp, session, manager)
}

fn write_artifact(temp: &TempDir, name: &str, data: &[u8]) -> PathBuf {
    let path = temp.path().join(name);
    std::fs::write(&path, data).unwrap();
    path
}

/// Sealed ledger with one registration per artifact
fn sealed_entries(artifacts: &[Vec<u8>]) -> (TempDir, Vec<LedgerEntry>) {
    let (temp, session, manager) = open_session();
    for (i, data) in artifacts.iter().enumerate() {
        let path = write_artifact(&temp, &format!("artifact-{}.bin", i), data);
        manager.register(format!("artifact-{}", i), &path, "root").unwrap();
    }
    manager.close(CloseSummary::new("prop")).unwrap();
    (temp, session.entries())
}

/// Sealed ledger journaled to disk; returns the journal path
fn sealed_journal(artifacts: &[Vec<u8>]) -> (TempDir, PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let journal_path = temp.path().join("chain_of_custody.jsonl");
    let session =
        Arc::new(CustodySession::with_journal(prop_metadata(), &journal_path, false).unwrap());
    session.open().unwrap();

    let manager = EvidenceManager::new(Arc::clone(&session));
    for (i, data) in artifacts.iter().enumerate() {
        let path = write_artifact(&temp, &format!("artifact-{}.bin", i), data);
        manager.register(format!("artifact-{}", i), &path, "root").unwrap();
    }
    manager.close(CloseSummary::new("prop")).unwrap();
    (temp, journal_path)
}

/// Bump one alphanumeric byte to a neighbour of the same class
fn bump(byte: u8) -> u8 {
    match byte {
        b'9' => b'0',
        b'z' => b'a',
        b'Z' => b'A',
        other => other + 1,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: open, N registrations, close gives N+2 linked entries
    #[test]
    fn prop_ledger_shape(artifacts in prop::collection::vec(artifact_strategy(), 0..8)) {
        let (_temp, entries) = sealed_entries(&artifacts);

        prop_assert_eq!(entries.len(), artifacts.len() + 2);
        prop_assert_eq!(entries[0].event_type, EventType::SessionOpen);
        prop_assert_eq!(entries.last().unwrap().event_type, EventType::SessionClose);

        for (i, entry) in entries.iter().enumerate() {
            prop_assert_eq!(entry.sequence_number, i as u64);
        }
        for pair in entries.windows(2) {
            prop_assert_eq!(&pair[1].prev_hash, &hash_entry(&pair[0]).unwrap());
        }

        let report = Verifier::new().verify_entries(&entries).unwrap();
        prop_assert_eq!(report.ledger.status, LedgerStatus::Intact);
        prop_assert!(report.is_clean());
    }

    /// Property: a single-byte edit of a stored entry is detected at that entry
    #[test]
    fn prop_single_byte_tamper_detected(
        artifacts in prop::collection::vec(artifact_strategy(), 1..4),
        entry_pick in any::<prop::sample::Index>(),
        byte_pick in any::<prop::sample::Index>(),
    ) {
        let (_temp, entries) = sealed_entries(&artifacts);
        let target = entry_pick.index(entries.len());

        let mut record = serde_json::to_vec(&entries[target]).unwrap();
        let candidates: Vec<usize> = record
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_ascii_alphanumeric())
            .map(|(i, _)| i)
            .collect();
        let position = candidates[byte_pick.index(candidates.len())];
        record[position] = bump(record[position]);

        // An unparseable record is journal corruption, covered below
        if let Ok(mutated) = serde_json::from_slice::<LedgerEntry>(&record) {
            let mut tampered = entries.clone();
            tampered[target] = mutated;

            let result = Verifier::new().verify_chain(&tampered);
            prop_assert_eq!(result.status, LedgerStatus::Tampered);
            prop_assert_eq!(result.first_broken_sequence_number, Some(target as u64));
        }
    }

    /// Property: changing any byte of the journal file never verifies INTACT
    #[test]
    fn prop_journal_byte_edit_never_intact(
        artifacts in prop::collection::vec(artifact_strategy(), 0..3),
        byte_pick in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let (_temp, journal_path) = sealed_journal(&artifacts);
        let mut bytes = std::fs::read(&journal_path).unwrap();
        let position = byte_pick.index(bytes.len());
        bytes[position] ^= flip;
        std::fs::write(&journal_path, &bytes).unwrap();

        match Verifier::new().verify_journal(&journal_path) {
            Ok(report) => {
                prop_assert_eq!(report.ledger.status, LedgerStatus::Tampered);
                prop_assert!(!report.is_clean());
            }
            Err(e) => prop_assert!(matches!(e, Error::Verification(_)), "unexpected error: {}", e),
        }
    }

    /// Property: digests are stable across runs and chunk sizes
    #[test]
    fn prop_digest_deterministic(
        data in prop::collection::vec(any::<u8>(), 0..65536),
        chunk_size in 1usize..8192,
    ) {
        let temp = tempfile::tempdir().unwrap();
        let path = write_artifact(&temp, "blob.bin", &data);

        let default_engine = DigestEngine::default();
        let chunked = DigestEngine::default().with_chunk_size(chunk_size);

        let first = default_engine.digest_path(&path).unwrap();
        let second = chunked.digest_path(&path).unwrap();
        let in_memory = default_engine.digest_bytes(&data);

        prop_assert_eq!(&first, &second);
        prop_assert_eq!(&first, &in_memory);
        prop_assert_eq!(first.size_bytes, data.len() as u64);
    }

    /// Property: registering the same path repeatedly never deduplicates
    #[test]
    fn prop_same_path_distinct_ids(data in artifact_strategy(), times in 2usize..6) {
        let (temp, session, manager) = open_session();
        let path = write_artifact(&temp, "same.bin", &data);

        let receipts: Vec<_> = (0..times)
            .map(|_| manager.register("same", &path, "root").unwrap())
            .collect();

        let ids: HashSet<_> = receipts.iter().map(|r| r.id).collect();
        let sequences: HashSet<_> = receipts.iter().map(|r| r.sequence_number).collect();
        prop_assert_eq!(ids.len(), times);
        prop_assert_eq!(sequences.len(), times);
        for receipt in &receipts {
            prop_assert_eq!(&receipt.digests, &receipts[0].digests);
        }
        prop_assert_eq!(session.evidence_count(), times);
    }
}
