//! File-system bootstrap backends
//!
//! Both backends scan a directory once at construction and turn every matching
//! file into a topology:
//!
//! ```text
//! topologies/
//!   ├── clicks.json   ──► uuid "clicks"
//!   ├── orders.json   ──► uuid "orders"
//!   └── notes.txt        (ignored by "*.json")
//! ```
//!
//! - [`FileStorage`] registers and enables each topology in an embedded
//!   [`MemoryStorage`] and otherwise behaves exactly like it.
//! - [`FileCoordinator`] is a stub for single-node runs: it only hands out one
//!   synthetic `start` message per file; every other operation is a no-op.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::models::{
    LeadershipStatus, Message, TopologyConfig, TopologyRecord, TopologyStatus, WorkerRecord,
    WorkerStatus,
};

use super::{
    CoordinationStorage, FilePattern, MemoryStorage, StorageError, StorageResult, StorageTimeouts,
};

// ============================================================================
// Directory scan
// ============================================================================

/// A topology definition loaded from disk
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyFile {
    pub path: PathBuf,
    pub uuid: String,
    pub config: TopologyConfig,
}

impl TopologyFile {
    /// Read and parse one definition; `None` when no uuid can be derived
    pub async fn load(path: impl AsRef<Path>) -> StorageResult<Option<Self>> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StorageError::io(format!("read {}", path.display()), e))?;

        let config: TopologyConfig =
            serde_json::from_str(&raw).map_err(|e| StorageError::Parse {
                file: path.display().to_string(),
                reason: e.to_string(),
            })?;
        if !config.0.is_object() {
            return Err(StorageError::Parse {
                file: path.display().to_string(),
                reason: "definition must be a JSON object".to_string(),
            });
        }

        let Some(uuid) = derive_uuid(path, &config) else {
            return Ok(None);
        };

        tracing::debug!(path = %path.display(), uuid = %uuid, "Loaded topology file");
        Ok(Some(Self {
            path: path.to_path_buf(),
            uuid,
            config,
        }))
    }
}

/// Uuid for a file: its stem, or `general.name` when the stem is unusable
fn derive_uuid(path: &Path, config: &TopologyConfig) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| config.general_name().map(str::to_string))
}

/// Load every file in `dir` matching at least one pattern, sorted by file name
///
/// Files that do not parse as a definition are skipped with a warning.
pub async fn scan_directory(
    dir: impl AsRef<Path>,
    patterns: &[FilePattern],
) -> StorageResult<Vec<TopologyFile>> {
    let dir = dir.as_ref();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| StorageError::io(format!("read_dir {}", dir.display()), e))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::io(format!("read_dir {}", dir.display()), e))?
    {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if is_file && patterns.iter().any(|p| p.matches_path(&path)) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        match TopologyFile::load(&path).await {
            Ok(Some(file)) => files.push(file),
            Ok(None) => {
                tracing::warn!(path = %path.display(), "Cannot derive topology uuid, skipping file");
            }
            Err(StorageError::Parse { reason, .. }) => {
                tracing::warn!(path = %path.display(), reason = %reason, "Invalid topology file, skipping");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(files)
}

// ============================================================================
// Full mode
// ============================================================================

/// Memory store pre-populated from a directory of topology files
#[derive(Debug)]
pub struct FileStorage {
    inner: MemoryStorage,
    dir: PathBuf,
}

impl FileStorage {
    /// Scan `dir`, then register and enable every topology found
    pub async fn open(dir: impl Into<PathBuf>, patterns: &[FilePattern]) -> StorageResult<Self> {
        Self::open_with_timeouts(dir, patterns, StorageTimeouts::default()).await
    }

    pub async fn open_with_timeouts(
        dir: impl Into<PathBuf>,
        patterns: &[FilePattern],
        timeouts: StorageTimeouts,
    ) -> StorageResult<Self> {
        let dir = dir.into();
        let inner = MemoryStorage::with_timeouts(timeouts);
        let files = scan_directory(&dir, patterns).await?;

        for file in &files {
            inner.register_topology(&file.uuid, file.config.clone()).await?;
            inner.enable_topology(&file.uuid).await?;
        }

        tracing::info!(dir = %dir.display(), topologies = files.len(), "File storage loaded");
        Ok(Self { inner, dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Embedded reference store
    pub fn memory(&self) -> &MemoryStorage {
        &self.inner
    }
}

#[async_trait]
impl CoordinationStorage for FileStorage {
    async fn register_worker(&self, name: &str) -> StorageResult<()> {
        self.inner.register_worker(name).await
    }

    async fn get_worker_status(&self) -> StorageResult<Vec<WorkerRecord>> {
        self.inner.get_worker_status().await
    }

    async fn get_topology_status(&self) -> StorageResult<Vec<TopologyRecord>> {
        self.inner.get_topology_status().await
    }

    async fn get_topologies_for_worker(&self, name: &str) -> StorageResult<Vec<TopologyRecord>> {
        self.inner.get_topologies_for_worker(name).await
    }

    async fn get_leadership_status(&self) -> StorageResult<LeadershipStatus> {
        self.inner.get_leadership_status().await
    }

    async fn announce_leader_candidacy(&self, name: &str) -> StorageResult<()> {
        self.inner.announce_leader_candidacy(name).await
    }

    async fn check_leader_candidacy(&self, name: &str) -> StorageResult<bool> {
        self.inner.check_leader_candidacy(name).await
    }

    async fn assign_topology(&self, uuid: &str, worker: &str) -> StorageResult<()> {
        self.inner.assign_topology(uuid, worker).await
    }

    async fn set_topology_status(
        &self,
        uuid: &str,
        status: TopologyStatus,
        error: Option<&str>,
    ) -> StorageResult<()> {
        self.inner.set_topology_status(uuid, status, error).await
    }

    async fn set_worker_status(&self, name: &str, status: WorkerStatus) -> StorageResult<()> {
        self.inner.set_worker_status(name, status).await
    }

    async fn get_messages(&self, name: &str) -> StorageResult<Vec<Message>> {
        self.inner.get_messages(name).await
    }

    async fn register_topology(&self, uuid: &str, config: TopologyConfig) -> StorageResult<()> {
        self.inner.register_topology(uuid, config).await
    }

    async fn enable_topology(&self, uuid: &str) -> StorageResult<()> {
        self.inner.enable_topology(uuid).await
    }

    async fn disable_topology(&self, uuid: &str) -> StorageResult<()> {
        self.inner.disable_topology(uuid).await
    }

    async fn delete_topology(&self, uuid: &str) -> StorageResult<()> {
        self.inner.delete_topology(uuid).await
    }

    async fn stop_topology(&self, uuid: &str) -> StorageResult<()> {
        self.inner.stop_topology(uuid).await
    }

    async fn clear_topology_error(&self, uuid: &str) -> StorageResult<()> {
        self.inner.clear_topology_error(uuid).await
    }

    async fn shut_down_worker(&self, name: &str) -> StorageResult<()> {
        self.inner.shut_down_worker(name).await
    }

    async fn get_topology_info(&self, uuid: &str) -> StorageResult<TopologyRecord> {
        self.inner.get_topology_info(uuid).await
    }
}

// ============================================================================
// Stub mode
// ============================================================================

/// Hands out one `start` message per topology file and nothing else
///
/// The first `get_messages` call drains every queued start regardless of the
/// worker name asking. Leadership always reads as taken so no worker runs
/// leader duties.
#[derive(Debug)]
pub struct FileCoordinator {
    pending: Mutex<Vec<Message>>,
    dir: PathBuf,
}

impl FileCoordinator {
    pub async fn open(dir: impl Into<PathBuf>, patterns: &[FilePattern]) -> StorageResult<Self> {
        let dir = dir.into();
        let files = scan_directory(&dir, patterns).await?;
        let pending = files
            .into_iter()
            .map(|f| Message::start("", f.uuid, f.config))
            .collect::<Vec<_>>();

        tracing::info!(dir = %dir.display(), topologies = pending.len(), "File coordinator loaded");
        Ok(Self {
            pending: Mutex::new(pending),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl CoordinationStorage for FileCoordinator {
    async fn register_worker(&self, _name: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn get_worker_status(&self) -> StorageResult<Vec<WorkerRecord>> {
        Ok(Vec::new())
    }

    async fn get_topology_status(&self) -> StorageResult<Vec<TopologyRecord>> {
        Ok(Vec::new())
    }

    async fn get_topologies_for_worker(&self, _name: &str) -> StorageResult<Vec<TopologyRecord>> {
        Ok(Vec::new())
    }

    async fn get_leadership_status(&self) -> StorageResult<LeadershipStatus> {
        Ok(LeadershipStatus::Ok)
    }

    async fn announce_leader_candidacy(&self, _name: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn check_leader_candidacy(&self, _name: &str) -> StorageResult<bool> {
        Ok(false)
    }

    async fn assign_topology(&self, _uuid: &str, _worker: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn set_topology_status(
        &self,
        _uuid: &str,
        _status: TopologyStatus,
        _error: Option<&str>,
    ) -> StorageResult<()> {
        Ok(())
    }

    async fn set_worker_status(&self, _name: &str, _status: WorkerStatus) -> StorageResult<()> {
        Ok(())
    }

    async fn get_messages(&self, name: &str) -> StorageResult<Vec<Message>> {
        let drained = std::mem::take(&mut *self.pending.lock().await);
        Ok(drained
            .into_iter()
            .map(|mut m| {
                m.worker = name.to_string();
                m
            })
            .collect())
    }

    async fn register_topology(&self, _uuid: &str, _config: TopologyConfig) -> StorageResult<()> {
        Ok(())
    }

    async fn enable_topology(&self, _uuid: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn disable_topology(&self, _uuid: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn delete_topology(&self, _uuid: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn stop_topology(&self, _uuid: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn clear_topology_error(&self, _uuid: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn shut_down_worker(&self, _name: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn get_topology_info(&self, uuid: &str) -> StorageResult<TopologyRecord> {
        Err(StorageError::topology_not_found(uuid))
    }
}
