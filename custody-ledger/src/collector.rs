//! Collection modules
//!
//! A `Collector` produces artifacts on disk and hands each one to the
//! `EvidenceManager`. Collectors are registered explicitly and driven by
//! `run_collectors`, which runs them concurrently on the tokio blocking
//! pool. The ledger itself stays single-writer: registrations from parallel
//! collectors are linearized by the session lock.
//!
//! A failing or panicking collector is reported in its own outcome and does
//! not stop the others.

use crate::{
    digest::{relative_label, walk_files},
    manager::{EvidenceManager, RegistrationRequest},
    types::{ArtifactKind, Receipt},
    Error, Result,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Collection capability
pub trait Collector: Send + Sync {
    /// Collector name used in logs and outcomes
    fn name(&self) -> &str;

    /// Category of the artifacts this collector produces
    fn kind(&self) -> ArtifactKind;

    /// Produce artifacts and register them through `manager`
    fn collect(&self, manager: &EvidenceManager) -> Result<Collection>;
}

/// One artifact a collector could not register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionFailure {
    /// Artifact label
    pub label: String,

    /// Error text
    pub error: String,
}

/// What one collector registered
#[derive(Debug, Clone, Default)]
pub struct Collection {
    /// Receipts for committed artifacts
    pub receipts: Vec<Receipt>,

    /// Artifacts that were skipped
    pub failures: Vec<CollectionFailure>,
}

impl Collection {
    fn record(&mut self, label: &str, result: Result<Receipt>) {
        match result {
            Ok(receipt) => self.receipts.push(receipt),
            Err(e) => self.failures.push(CollectionFailure {
                label: label.to_string(),
                error: e.to_string(),
            }),
        }
    }
}

/// Result of one collector run
#[derive(Debug)]
pub struct CollectorOutcome {
    /// Collector name
    pub name: String,

    /// Artifact category
    pub kind: ArtifactKind,

    /// Collection, or why the collector itself failed
    pub result: Result<Collection>,
}

/// Registers files that were already acquired
#[derive(Debug, Clone)]
pub struct FileCollector {
    name: String,
    kind: ArtifactKind,
    identity: String,
    files: Vec<(String, PathBuf)>,
}

impl FileCollector {
    /// Empty collector
    pub fn new(name: impl Into<String>, kind: ArtifactKind, identity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            identity: identity.into(),
            files: Vec::new(),
        }
    }

    /// Add one artifact
    pub fn with_file(mut self, label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.files.push((label.into(), path.into()));
        self
    }
}

impl Collector for FileCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ArtifactKind {
        self.kind
    }

    fn collect(&self, manager: &EvidenceManager) -> Result<Collection> {
        let mut collection = Collection::default();
        for (label, path) in &self.files {
            let request = RegistrationRequest::new(label.as_str(), path.as_path(), self.identity.as_str())
                .with_kind(self.kind)
                .with_metadata("collector", self.name.as_str());
            collection.record(label, manager.register_with(request));
        }
        Ok(collection)
    }
}

/// Registers every regular file under a directory, following symlinks
#[derive(Debug, Clone)]
pub struct DirectoryCollector {
    name: String,
    kind: ArtifactKind,
    identity: String,
    root: PathBuf,
    recursive: bool,
}

impl DirectoryCollector {
    /// Collector over `root`
    pub fn new(
        name: impl Into<String>,
        kind: ArtifactKind,
        identity: impl Into<String>,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            identity: identity.into(),
            root: root.into(),
            recursive: true,
        }
    }

    /// Only the top level of `root`
    pub fn non_recursive(mut self) -> Self {
        self.recursive = false;
        self
    }
}

impl Collector for DirectoryCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ArtifactKind {
        self.kind
    }

    fn collect(&self, manager: &EvidenceManager) -> Result<Collection> {
        let walk = walk_files(&self.root, self.recursive)?;

        let mut collection = Collection::default();
        for (path, error) in walk.errors {
            collection.failures.push(CollectionFailure {
                label: relative_label(&self.root, &path),
                error,
            });
        }

        for path in walk.files {
            let label = relative_label(&self.root, &path);
            let request = RegistrationRequest::new(label.as_str(), path.as_path(), self.identity.as_str())
                .with_kind(self.kind)
                .with_metadata("collector", self.name.as_str());
            collection.record(&label, manager.register_with(request));
        }
        Ok(collection)
    }
}

/// Run collectors concurrently, at most `max_concurrent` at a time
///
/// Outcomes come back in the order the collectors were given.
pub async fn run_collectors(
    manager: Arc<EvidenceManager>,
    collectors: Vec<Arc<dyn Collector>>,
    max_concurrent: usize,
) -> Result<Vec<CollectorOutcome>> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut tasks = JoinSet::new();
    let total = collectors.len();

    for (index, collector) in collectors.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let manager = Arc::clone(&manager);

        tasks.spawn(async move {
            let name = collector.name().to_string();
            let kind = collector.kind();

            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => {
                    tracing::info!(collector = %name, kind = %kind, "Collector started");
                    let worker = Arc::clone(&collector);
                    match tokio::task::spawn_blocking(move || worker.collect(&manager)).await {
                        Ok(result) => result,
                        Err(e) => Err(Error::Concurrency(format!("collector {} aborted: {}", name, e))),
                    }
                }
                Err(e) => Err(Error::Concurrency(e.to_string())),
            };

            match &result {
                Ok(collection) => tracing::info!(
                    collector = %name,
                    registered = collection.receipts.len(),
                    failed = collection.failures.len(),
                    "Collector finished"
                ),
                Err(e) => tracing::error!(collector = %name, error = %e, "Collector failed"),
            }

            (index, CollectorOutcome { name, kind, result })
        });
    }

    let mut outcomes: Vec<Option<CollectorOutcome>> = (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        let (index, outcome) = joined.map_err(|e| Error::Concurrency(e.to_string()))?;
        outcomes[index] = Some(outcome);
    }

    Ok(outcomes.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CustodySession;
    use crate::system::SystemInfo;
    use crate::types::SessionMetadata;
    use tempfile::TempDir;

    struct Failing;

    impl Collector for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn kind(&self) -> ArtifactKind {
            ArtifactKind::Network
        }

        fn collect(&self, _manager: &EvidenceManager) -> Result<Collection> {
            Err(Error::Config("interface not available".to_string()))
        }
    }

    struct Panicking;

    impl Collector for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn kind(&self) -> ArtifactKind {
            ArtifactKind::Process
        }

        fn collect(&self, _manager: &EvidenceManager) -> Result<Collection> {
            panic!("collector bug")
        }
    }

    fn manager() -> Arc<EvidenceManager> {
        let session = Arc::new(CustodySession::new(SessionMetadata::new(
            "case",
            "analyst",
            SystemInfo::capture(),
        )));
        session.open().unwrap();
        Arc::new(EvidenceManager::new(session))
    }

    #[test]
    fn test_file_collector_records_failures() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("auth.log");
        std::fs::write(&present, b"login").unwrap();

        let collector = FileCollector::new("logs", ArtifactKind::Logs, "root")
            .with_file("auth-log", &present)
            .with_file("missing-log", temp.path().join("missing.log"));

        let manager = manager();
        let collection = collector.collect(&manager).unwrap();

        assert_eq!(collection.receipts.len(), 1);
        assert_eq!(collection.failures.len(), 1);
        assert_eq!(collection.failures[0].label, "missing-log");
        assert_eq!(manager.session().evidence_by_kind(ArtifactKind::Logs).len(), 1);
    }

    #[test]
    fn test_directory_collector_walks_tree() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("nested")).unwrap();
        std::fs::write(temp.path().join("a.txt"), b"a").unwrap();
        std::fs::write(temp.path().join("nested").join("b.txt"), b"b").unwrap();

        let manager = manager();
        let recursive = DirectoryCollector::new("os", ArtifactKind::OsArtifacts, "root", temp.path());
        assert_eq!(recursive.collect(&manager).unwrap().receipts.len(), 2);

        let shallow = DirectoryCollector::new("os", ArtifactKind::OsArtifacts, "root", temp.path())
            .non_recursive();
        assert_eq!(shallow.collect(&manager).unwrap().receipts.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_collector_follows_links_and_keeps_going() {
        let temp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("hive.dat"), b"hive").unwrap();
        std::fs::write(temp.path().join("a.txt"), b"a").unwrap();
        std::os::unix::fs::symlink(outside.path().join("hive.dat"), temp.path().join("hive.lnk"))
            .unwrap();
        std::os::unix::fs::symlink(temp.path().join("gone"), temp.path().join("broken.lnk"))
            .unwrap();

        let manager = manager();
        let collection = DirectoryCollector::new("os", ArtifactKind::OsArtifacts, "root", temp.path())
            .collect(&manager)
            .unwrap();

        assert_eq!(collection.receipts.len(), 2);
        assert_eq!(collection.failures.len(), 1);
        assert_eq!(collection.failures[0].label, "broken.lnk");
    }

    #[test]
    fn test_directory_collector_missing_root_fails() {
        let temp = TempDir::new().unwrap();
        let collector =
            DirectoryCollector::new("os", ArtifactKind::OsArtifacts, "root", temp.path().join("absent"));
        assert!(matches!(collector.collect(&manager()), Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_run_collectors_isolates_failures() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mem.raw");
        std::fs::write(&path, vec![7u8; 2048]).unwrap();

        let collectors: Vec<Arc<dyn Collector>> = vec![
            Arc::new(FileCollector::new("memory", ArtifactKind::Memory, "root").with_file("memory-image", &path)),
            Arc::new(Failing),
            Arc::new(Panicking),
        ];

        let manager = manager();
        let outcomes = run_collectors(Arc::clone(&manager), collectors, 2).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].name, "memory");
        assert_eq!(outcomes[0].result.as_ref().unwrap().receipts.len(), 1);
        assert!(matches!(outcomes[1].result, Err(Error::Config(_))));
        assert!(matches!(outcomes[2].result, Err(Error::Concurrency(_))));

        // Session still healthy after the failures
        assert!(manager.session().is_open());
        assert_eq!(manager.session().len(), 2);
    }
}
