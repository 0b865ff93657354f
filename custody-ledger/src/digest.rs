//! Digest engine
//!
//! Streams a source once in bounded chunks and feeds every requested
//! algorithm from the same buffer, so multi-gigabyte memory images are read
//! a single time regardless of how many digests are kept.
//!
//! A read error anywhere discards every running state; partial digests are
//! never returned.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;
use walkdir::WalkDir;

/// Default streaming chunk size (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Hex digests keyed by algorithm
pub type Digests = BTreeMap<DigestAlgorithm, String>;

/// Supported hash algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// MD5 (legacy tool compatibility)
    #[serde(rename = "MD5")]
    Md5,
    /// SHA-1 (legacy tool compatibility)
    #[serde(rename = "SHA1")]
    Sha1,
    /// SHA-256
    #[serde(rename = "SHA256")]
    Sha256,
    /// SHA-512
    #[serde(rename = "SHA512")]
    Sha512,
}

impl DigestAlgorithm {
    /// Every supported algorithm
    pub const ALL: [DigestAlgorithm; 4] = [
        DigestAlgorithm::Md5,
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha512,
    ];

    /// Canonical name
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "MD5",
            DigestAlgorithm::Sha1 => "SHA1",
            DigestAlgorithm::Sha256 => "SHA256",
            DigestAlgorithm::Sha512 => "SHA512",
        }
    }

    /// Length of the hex digest
    pub fn hex_len(&self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 32,
            DigestAlgorithm::Sha1 => 40,
            DigestAlgorithm::Sha256 => 64,
            DigestAlgorithm::Sha512 => 128,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();

        match normalized.as_str() {
            "MD5" => Ok(DigestAlgorithm::Md5),
            "SHA1" => Ok(DigestAlgorithm::Sha1),
            "SHA256" => Ok(DigestAlgorithm::Sha256),
            "SHA512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(Error::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// One running hash state
enum RunningHash {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl RunningHash {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => RunningHash::Md5(Md5::new()),
            DigestAlgorithm::Sha1 => RunningHash::Sha1(Sha1::new()),
            DigestAlgorithm::Sha256 => RunningHash::Sha256(Sha256::new()),
            DigestAlgorithm::Sha512 => RunningHash::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            RunningHash::Md5(h) => h.update(data),
            RunningHash::Sha1(h) => h.update(data),
            RunningHash::Sha256(h) => h.update(data),
            RunningHash::Sha512(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            RunningHash::Md5(h) => hex::encode(h.finalize()),
            RunningHash::Sha1(h) => hex::encode(h.finalize()),
            RunningHash::Sha256(h) => hex::encode(h.finalize()),
            RunningHash::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Every requested algorithm fed from the same input
struct MultiHasher {
    states: Vec<(DigestAlgorithm, RunningHash)>,
    size_bytes: u64,
}

impl MultiHasher {
    fn new(algorithms: &BTreeSet<DigestAlgorithm>) -> Self {
        Self {
            states: algorithms
                .iter()
                .map(|alg| (*alg, RunningHash::new(*alg)))
                .collect(),
            size_bytes: 0,
        }
    }

    fn update(&mut self, data: &[u8]) {
        for (_, state) in self.states.iter_mut() {
            state.update(data);
        }
        self.size_bytes += data.len() as u64;
    }

    fn finish(self) -> DigestOutput {
        DigestOutput {
            digests: self
                .states
                .into_iter()
                .map(|(alg, state)| (alg, state.finalize_hex()))
                .collect(),
            size_bytes: self.size_bytes,
        }
    }
}

/// Result of digesting one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestOutput {
    /// Hex digests keyed by algorithm
    pub digests: Digests,

    /// Bytes read
    pub size_bytes: u64,
}

/// Single-pass multi-algorithm digest engine
#[derive(Debug, Clone)]
pub struct DigestEngine {
    algorithms: BTreeSet<DigestAlgorithm>,
    chunk_size: usize,
}

impl Default for DigestEngine {
    fn default() -> Self {
        Self {
            algorithms: DigestAlgorithm::ALL.into_iter().collect(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl DigestEngine {
    /// Engine over the given algorithms
    pub fn new(algorithms: impl IntoIterator<Item = DigestAlgorithm>) -> Result<Self> {
        let algorithms: BTreeSet<DigestAlgorithm> = algorithms.into_iter().collect();
        if algorithms.is_empty() {
            return Err(Error::UnsupportedAlgorithm(
                "at least one algorithm is required".to_string(),
            ));
        }

        Ok(Self {
            algorithms,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Override the read chunk size (minimum 1 byte)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Algorithms computed by this engine
    pub fn algorithms(&self) -> &BTreeSet<DigestAlgorithm> {
        &self.algorithms
    }

    /// Chunk size in bytes
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Digest a reader to completion
    pub fn digest_reader<R: Read>(&self, mut reader: R) -> Result<DigestOutput> {
        let mut hasher = MultiHasher::new(&self.algorithms);
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            };
            hasher.update(&buffer[..read]);
        }

        Ok(hasher.finish())
    }

    /// Digest a file by path
    pub fn digest_path(&self, path: impl AsRef<Path>) -> Result<DigestOutput> {
        let path = path.as_ref();
        let started = Instant::now();
        let file = File::open(path)?;
        let output = self.digest_reader(file)?;

        tracing::debug!(
            path = %path.display(),
            size_bytes = output.size_bytes,
            algorithms = self.algorithms.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Artifact digested"
        );

        Ok(output)
    }

    /// Digest an in-memory buffer
    pub fn digest_bytes(&self, data: &[u8]) -> DigestOutput {
        let mut hasher = MultiHasher::new(&self.algorithms);
        hasher.update(data);
        hasher.finish()
    }
}

/// Digest `path` with the given algorithms
///
/// This is the contract the export collaborator uses to hash a finished
/// evidence bundle.
pub fn digest(
    path: impl AsRef<Path>,
    algorithms: impl IntoIterator<Item = DigestAlgorithm>,
) -> Result<Digests> {
    Ok(DigestEngine::new(algorithms)?.digest_path(path)?.digests)
}

/// Case-insensitive hex comparison
pub fn hex_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Hashes of every file under a directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashReport {
    /// Report generation time
    pub generated_at: DateTime<Utc>,

    /// Directory that was walked
    #[serde(with = "crate::types::os_path")]
    pub root: PathBuf,

    /// Number of files hashed
    pub file_count: usize,

    /// Digests keyed by path relative to `root`
    pub files: BTreeMap<String, DigestOutput>,

    /// Files that could not be read, with the error
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl HashReport {
    /// Write the report as pretty JSON, creating parent directories
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;

        tracing::info!(path = %path.display(), files = self.file_count, "Hash report written");
        Ok(())
    }
}

/// Hash every regular file under `root`
///
/// Symlinks are followed. Unreadable files and directory entries are recorded
/// in `errors` and do not abort the walk; an unreadable `root` does.
pub fn digest_directory(
    engine: &DigestEngine,
    root: impl AsRef<Path>,
    recursive: bool,
) -> Result<HashReport> {
    let root = root.as_ref();
    let walk = walk_files(root, recursive)?;

    let mut report = HashReport {
        generated_at: Utc::now(),
        root: root.to_path_buf(),
        file_count: 0,
        files: BTreeMap::new(),
        errors: BTreeMap::new(),
    };

    for (path, error) in walk.errors {
        report.errors.insert(relative_label(root, &path), error);
    }

    for file in walk.files {
        let relative = relative_label(root, &file);
        match engine.digest_path(&file) {
            Ok(output) => {
                report.files.insert(relative, output);
            }
            Err(e) => {
                tracing::warn!(path = %file.display(), error = %e, "Failed to hash file");
                report.errors.insert(relative, e.to_string());
            }
        }
    }

    report.file_count = report.files.len();
    Ok(report)
}

/// Regular files found under a directory
#[derive(Debug, Default)]
pub(crate) struct FileWalk {
    /// Files in file-name order per directory
    pub files: Vec<PathBuf>,

    /// Entries that could not be read, with the error
    pub errors: Vec<(PathBuf, String)>,
}

/// List regular files under `root`, following symlinks
pub(crate) fn walk_files(root: &Path, recursive: bool) -> Result<FileWalk> {
    let mut walker = WalkDir::new(root).follow_links(true).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut walk = FileWalk::default();
    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() => walk.files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) if e.depth() == 0 => return Err(Error::Io(e.into())),
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                walk.errors.push((path, e.to_string()));
            }
        }
    }

    Ok(walk)
}

/// Path of `path` relative to `root`, for labels and report keys
pub(crate) fn relative_label(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // Reference vectors for "abc"
    const ABC_MD5: &str = "900150983cd24fb0d6963f7d28e17f72";
    const ABC_SHA1: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    // Reference vectors for the empty input
    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";
    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_known_vectors() {
        let output = DigestEngine::default().digest_bytes(b"abc");
        assert_eq!(output.digests[&DigestAlgorithm::Md5], ABC_MD5);
        assert_eq!(output.digests[&DigestAlgorithm::Sha1], ABC_SHA1);
        assert_eq!(output.digests[&DigestAlgorithm::Sha256], ABC_SHA256);
        assert_eq!(output.digests[&DigestAlgorithm::Sha512].len(), 128);
        assert_eq!(output.size_bytes, 3);
    }

    #[test]
    fn test_zero_byte_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.flush().unwrap();

        let engine = DigestEngine::default();
        let first = engine.digest_path(file.path()).unwrap();
        let second = engine.digest_path(file.path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.size_bytes, 0);
        assert_eq!(first.digests[&DigestAlgorithm::Md5], EMPTY_MD5);
        assert_eq!(first.digests[&DigestAlgorithm::Sha256], EMPTY_SHA256);
    }

    #[test]
    fn test_chunk_size_does_not_change_digest() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let small = DigestEngine::default().with_chunk_size(7).digest_reader(&data[..]).unwrap();
        let large = DigestEngine::default().digest_bytes(&data);
        assert_eq!(small, large);
    }

    #[test]
    fn test_algorithm_subset() {
        let engine = DigestEngine::new([DigestAlgorithm::Sha256]).unwrap();
        let output = engine.digest_bytes(b"abc");
        assert_eq!(output.digests.len(), 1);
        assert!(output.digests.contains_key(&DigestAlgorithm::Sha256));
    }

    #[test]
    fn test_empty_algorithm_set_rejected() {
        assert!(matches!(
            DigestEngine::new(Vec::new()),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = digest("/nonexistent/artifact.raw", DigestAlgorithm::ALL);
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("sha-256".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha256);
        assert_eq!("md5".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Md5);
        assert_eq!("SHA_512".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha512);
        assert!("crc32".parse::<DigestAlgorithm>().is_err());
    }

    #[test]
    fn test_hex_eq_ignores_case() {
        assert!(hex_eq(ABC_MD5, &ABC_MD5.to_uppercase()));
        assert!(!hex_eq(ABC_MD5, EMPTY_MD5));
    }

    #[test]
    fn test_digest_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"abc").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("b.txt"), b"").unwrap();

        let engine = DigestEngine::default();
        let flat = digest_directory(&engine, dir.path(), false).unwrap();
        assert_eq!(flat.file_count, 1);
        assert_eq!(flat.files["a.txt"].digests[&DigestAlgorithm::Sha256], ABC_SHA256);

        let deep = digest_directory(&engine, dir.path(), true).unwrap();
        assert_eq!(deep.file_count, 2);
        assert!(deep.errors.is_empty());

        let report_path = dir.path().join("reports").join("hashes.json");
        deep.write_json(&report_path).unwrap();
        let parsed: HashReport =
            serde_json::from_slice(&std::fs::read(&report_path).unwrap()).unwrap();
        assert_eq!(parsed.file_count, 2);
    }

    #[test]
    fn test_digest_directory_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let result = digest_directory(&DigestEngine::default(), dir.path().join("absent"), true);
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_digest_directory_follows_symlinks_and_records_errors() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("target.bin"), b"abc").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"abc").unwrap();
        std::os::unix::fs::symlink(outside.path().join("target.bin"), dir.path().join("link.bin"))
            .unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.bin"), dir.path().join("dangling.bin"))
            .unwrap();

        let report = digest_directory(&DigestEngine::default(), dir.path(), true).unwrap();
        assert_eq!(report.file_count, 2);
        assert_eq!(report.files["link.bin"].digests[&DigestAlgorithm::Sha256], ABC_SHA256);
        assert!(report.errors.contains_key("dangling.bin"));
    }
}
