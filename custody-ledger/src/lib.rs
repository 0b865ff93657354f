//! Custody Ledger
//!
//! Tamper-evident chain of custody for forensic evidence collection.
//!
//! # Architecture
//!
//! - **Digest Engine**: single-pass MD5/SHA1/SHA256/SHA512 over bounded chunks
//! - **Hash Chain**: every entry embeds the hash of its predecessor
//! - **Single Writer**: one mutex-guarded critical section per append
//! - **Journal**: fsynced JSON lines, tolerant of a torn final record
//! - **Seal**: SESSION_CLOSE commits a digest over the whole history
//!
//! # Invariants
//!
//! - Append-only: entries and evidence items are never modified or deleted
//! - Contiguous: sequence numbers run 0..n with no gaps or repeats
//! - Linked: `entries[i + 1].prev_hash == entries[i].entry_hash`
//! - All-or-nothing: a failed registration leaves no trace in the ledger
//! - Sealed: a finished ledger without a trailing SESSION_CLOSE is TAMPERED

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod collector;
pub mod config;
pub mod crypto;
pub mod digest;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod manager;
pub mod metrics;
pub mod report;
pub mod session;
pub mod store;
pub mod system;
pub mod types;
pub mod verifier;

// Re-exports
pub use collector::{run_collectors, Collector, DirectoryCollector, FileCollector};
pub use config::Config;
pub use digest::{digest, DigestAlgorithm, DigestEngine, Digests};
pub use error::{Error, Result};
pub use ledger::CustodyLedger;
pub use manager::{EvidenceManager, RegistrationRequest};
pub use session::CustodySession;
pub use types::{
    ArtifactKind, CloseSummary, EntryPayload, EventType, EvidenceId, EvidenceItem, ItemStatus,
    LedgerEntry, LedgerStatus, Receipt, SessionMetadata,
};
pub use verifier::{VerificationReport, Verifier};
