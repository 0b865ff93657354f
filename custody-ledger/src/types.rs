//! Core types for the custody ledger
//!
//! All hashed types are designed for:
//! - Deterministic serialization (bincode, fixed field order)
//! - Canonical map ordering (`BTreeMap` only)
//! - Immutability once committed to the ledger
//! - Strict decoding: journaled types reject unknown keys, so a renamed key
//!   surfaces as corruption instead of parsing back to the same entry

use crate::digest::Digests;
use crate::system::SystemInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Evidence identifier, assigned once at registration from a per-session counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceId(u64);

impl EvidenceId {
    /// Create from a raw counter value
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw counter value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EV-{:06}", self.0)
    }
}

/// Category of a collected artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    /// RAM image
    Memory,
    /// Disk or partition image
    Disk,
    /// Process listing
    Process,
    /// Network state or capture
    Network,
    /// System logs
    Logs,
    /// OS-specific artifacts (registry hives, plists, ...)
    OsArtifacts,
    /// Browser artifacts
    Browser,
    /// Packaged evidence archive
    Bundle,
    /// Anything else
    Other,
}

impl ArtifactKind {
    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Memory => "memory",
            ArtifactKind::Disk => "disk",
            ArtifactKind::Process => "process",
            ArtifactKind::Network => "network",
            ArtifactKind::Logs => "logs",
            ArtifactKind::OsArtifacts => "os-artifacts",
            ArtifactKind::Browser => "browser",
            ArtifactKind::Bundle => "bundle",
            ArtifactKind::Other => "other",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One collected artifact. Never mutated after it is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidenceItem {
    /// Session-unique id
    pub id: EvidenceId,

    /// Human-readable source description ("memory-image", "process-list")
    pub label: String,

    /// Artifact category
    pub kind: ArtifactKind,

    /// Free-text description
    pub description: Option<String>,

    /// Location of the artifact (referenced, not copied)
    #[serde(with = "os_path")]
    pub path: PathBuf,

    /// Number of bytes digested
    pub size_bytes: u64,

    /// Time the digest completed
    pub collected_at: DateTime<Utc>,

    /// User or process that performed the collection
    pub collector_identity: String,

    /// Hex digests keyed by algorithm
    pub digests: Digests,

    /// Collector-supplied metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Ledger event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Session opened (always entry 0)
    SessionOpen,
    /// Artifact registered
    EvidenceRegistered,
    /// Verification outcome recorded
    VerificationRun,
    /// Session sealed (always the last entry)
    SessionClose,
}

impl EventType {
    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SessionOpen => "SESSION_OPEN",
            EventType::EvidenceRegistered => "EVIDENCE_REGISTERED",
            EventType::VerificationRun => "VERIFICATION_RUN",
            EventType::SessionClose => "SESSION_CLOSE",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata committed by SESSION_OPEN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionMetadata {
    /// Session id (UUIDv7)
    pub session_id: Uuid,

    /// Investigation case identifier
    pub case_id: String,

    /// Operator running the collection
    pub operator: String,

    /// Version of this tool
    pub tool_version: String,

    /// Open time
    pub opened_at: DateTime<Utc>,

    /// Host snapshot taken at open
    pub system: SystemInfo,
}

impl SessionMetadata {
    /// Build metadata for a new session
    pub fn new(case_id: impl Into<String>, operator: impl Into<String>, system: SystemInfo) -> Self {
        Self {
            session_id: crate::crypto::generate_uuid_v7(),
            case_id: case_id.into(),
            operator: operator.into(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            opened_at: Utc::now(),
            system,
        }
    }
}

/// Caller-supplied summary for SESSION_CLOSE
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloseSummary {
    /// Who closed the session
    pub closed_by: String,

    /// Free-text notes
    pub notes: Option<String>,
}

impl CloseSummary {
    /// Summary with just the closing identity
    pub fn new(closed_by: impl Into<String>) -> Self {
        Self {
            closed_by: closed_by.into(),
            notes: None,
        }
    }

    /// Attach notes
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Ed25519 signature over the seal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SealSignature {
    /// Hex public key (32 bytes)
    pub public_key: String,

    /// Hex signature (64 bytes)
    pub signature: String,
}

/// Payload of SESSION_CLOSE
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SealRecord {
    /// Caller summary
    pub summary: CloseSummary,

    /// Number of entries covered by the seal
    pub entry_count: u64,

    /// Number of evidence items in the session
    pub evidence_count: u64,

    /// SHA-256 over the concatenated hex `entry_hash` of all prior entries
    pub seal: String,

    /// Optional signature over `seal`
    pub signature: Option<SealSignature>,
}

/// Ledger chain status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerStatus {
    /// Every hash recomputes and links
    Intact,
    /// A discontinuity was found
    Tampered,
}

/// Per-item verification status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    /// All stored digests recompute
    Match,
    /// At least one digest differs
    Mismatch,
    /// Artifact no longer exists at its path
    MissingFile,
}

/// Seal signature status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureStatus {
    /// Signature present and valid
    Valid,
    /// Signature present but does not verify
    Invalid,
    /// No signature (or no seal)
    Absent,
}

/// Payload of VERIFICATION_RUN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerificationSummary {
    /// When the verification ran
    pub verified_at: DateTime<Utc>,

    /// Chain status
    pub ledger_status: LedgerStatus,

    /// First broken entry, if any
    pub first_broken_sequence_number: Option<u64>,

    /// Entries walked
    pub entries_checked: u64,

    /// Items with MATCH
    pub matched: u64,

    /// Items with MISMATCH
    pub mismatched: u64,

    /// Items with MISSING_FILE
    pub missing: u64,
}

/// Event-specific ledger payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryPayload {
    /// SESSION_OPEN
    SessionOpen(SessionMetadata),
    /// EVIDENCE_REGISTERED
    EvidenceRegistered(EvidenceItem),
    /// VERIFICATION_RUN
    VerificationRun(VerificationSummary),
    /// SESSION_CLOSE
    SessionClose(SealRecord),
}

impl EntryPayload {
    /// Event type this payload belongs to
    pub fn event_type(&self) -> EventType {
        match self {
            EntryPayload::SessionOpen(_) => EventType::SessionOpen,
            EntryPayload::EvidenceRegistered(_) => EventType::EvidenceRegistered,
            EntryPayload::VerificationRun(_) => EventType::VerificationRun,
            EntryPayload::SessionClose(_) => EventType::SessionClose,
        }
    }

    /// Evidence item carried by EVIDENCE_REGISTERED
    pub fn as_evidence(&self) -> Option<&EvidenceItem> {
        match self {
            EntryPayload::EvidenceRegistered(item) => Some(item),
            _ => None,
        }
    }

    /// Seal carried by SESSION_CLOSE
    pub fn as_seal(&self) -> Option<&SealRecord> {
        match self {
            EntryPayload::SessionClose(seal) => Some(seal),
            _ => None,
        }
    }
}

/// One record of the hash-chained custody log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerEntry {
    /// Position in the chain, 0 for SESSION_OPEN
    pub sequence_number: u64,

    /// Event type
    pub event_type: EventType,

    /// Event-specific data
    pub payload: EntryPayload,

    /// Capture time (nanoseconds since Unix epoch)
    pub timestamp_nanos: i64,

    /// `entry_hash` of the previous entry (64 zeros for entry 0)
    pub prev_hash: String,

    /// SHA-256 of this entry's canonical bytes
    pub entry_hash: String,
}

/// Hashed view of an entry: every field except `entry_hash`, in fixed order
#[derive(Serialize)]
struct CanonicalEntry<'a> {
    sequence_number: u64,
    event_type: EventType,
    payload: &'a EntryPayload,
    timestamp_nanos: i64,
    prev_hash: &'a str,
}

impl LedgerEntry {
    /// Canonical bytes covered by `entry_hash`
    pub fn canonical_bytes(&self) -> crate::Result<Vec<u8>> {
        let canonical = CanonicalEntry {
            sequence_number: self.sequence_number,
            event_type: self.event_type,
            payload: &self.payload,
            timestamp_nanos: self.timestamp_nanos,
            prev_hash: &self.prev_hash,
        };
        Ok(bincode::serialize(&canonical)?)
    }

    /// Recompute the hash from content
    pub fn compute_hash(&self) -> crate::Result<String> {
        crate::crypto::hash_entry(self)
    }

    /// Capture time as a UTC timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.timestamp_nanos)
    }
}

/// Lossless path encoding
///
/// The canonical (binary) form is the raw OS bytes of the path. The JSON form
/// is the path string when it is valid UTF-8, otherwise
/// `{"os_bytes": "<hex>"}`. Non-UTF-8 paths can only be decoded on unix.
pub(crate) mod os_path {
    use serde::de::{self, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;
    use std::path::{Path, PathBuf};

    const OS_BYTES_KEY: &str = "os_bytes";

    pub fn serialize<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
        let bytes = path.as_os_str().as_encoded_bytes();
        if !serializer.is_human_readable() {
            return serializer.serialize_bytes(bytes);
        }

        match path.to_str() {
            Some(text) => serializer.serialize_str(text),
            None => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(OS_BYTES_KEY, &hex::encode(bytes))?;
                map.end()
            }
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PathBuf, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(PathVisitor)
        } else {
            deserializer.deserialize_byte_buf(PathVisitor)
        }
    }

    struct PathVisitor;

    impl<'de> Visitor<'de> for PathVisitor {
        type Value = PathBuf;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "a path string or an {{\"{}\": <hex>}} object", OS_BYTES_KEY)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(PathBuf::from(v))
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
            from_os_bytes(v.to_vec())
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
            from_os_bytes(v)
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let key: String = map
                .next_key()?
                .ok_or_else(|| <A::Error as de::Error>::missing_field(OS_BYTES_KEY))?;
            if key != OS_BYTES_KEY {
                return Err(de::Error::unknown_field(&key, &[OS_BYTES_KEY]));
            }
            let encoded: String = map.next_value()?;
            if map.next_key::<String>()?.is_some() {
                return Err(de::Error::custom("path object has more than one key"));
            }

            let bytes = hex::decode(&encoded).map_err(<A::Error as de::Error>::custom)?;
            // One spelling per path: UTF-8 paths are always written as strings
            if std::str::from_utf8(&bytes).is_ok() {
                return Err(de::Error::custom("os_bytes path is valid UTF-8"));
            }
            from_os_bytes(bytes)
        }
    }

    #[cfg(unix)]
    fn from_os_bytes<E: de::Error>(bytes: Vec<u8>) -> Result<PathBuf, E> {
        use std::os::unix::ffi::OsStringExt;
        Ok(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
    }

    #[cfg(not(unix))]
    fn from_os_bytes<E: de::Error>(bytes: Vec<u8>) -> Result<PathBuf, E> {
        String::from_utf8(bytes)
            .map(PathBuf::from)
            .map_err(|_| E::custom("non-UTF-8 path bytes can only be decoded on unix"))
    }
}

/// Proof of registration handed back to the collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Assigned evidence id
    pub id: EvidenceId,

    /// Committed digests
    pub digests: Digests,

    /// Ledger position of the EVIDENCE_REGISTERED entry
    pub sequence_number: u64,

    /// Bytes digested
    pub size_bytes: u64,
}
