// # File Store
//
// File-based implementation of Store with crash recovery.
//
// ## Purpose
//
// Keeps hosts, update targets and records across daemon restarts without an
// external database.
//
// ## Crash Recovery
//
// - Atomic writes: every mutation writes a temp file, then renames it
// - Backup: the previous file is copied to `.backup` before each rename
// - Corruption detection: JSON validation on load
// - Recovery: falls back to the backup if the main file is corrupted
//
// A mutation is applied to a copy of the tables and only becomes visible
// after the file write succeeded, so a failed write leaves memory and disk
// in agreement.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "hosts": [ { "id": 1, "fqdn": "a.example.com", ... } ],
//   "targets": [ { "id": 1, "name": "dynv6", ... } ],
//   "records": [ { "id": 1, "host_id": 1, ... } ]
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::tables::Tables;
use crate::error::{Error, Result};
use crate::model::{Host, HostId, Record, RecordId, TargetId, UpdateTarget};
use crate::traits::store::Store;

/// Store file format version
/// Used for future migration if format changes
const STORE_FILE_VERSION: &str = "1.0";

/// Serializable store file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    #[serde(default)]
    hosts: Vec<Host>,
    #[serde(default)]
    targets: Vec<UpdateTarget>,
    #[serde(default)]
    records: Vec<Record>,
}

/// File-based store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use ddnsbroker_core::model::UpdateTarget;
/// use ddnsbroker_core::store::FileStore;
/// use ddnsbroker_core::traits::Store;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStore::new("/var/lib/ddnsbroker/store.json").await?;
///
///     // Atomically written to disk before returning
///     store
///         .insert_target(UpdateTarget::new("dynv6", "https://dynv6.com/api/update"))
///         .await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    tables: RwLock<Tables>,
}

impl FileStore {
    /// Create or load a file store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing store file
    /// 3. If it is corrupted, load the backup and restore it
    /// 4. If neither exists, start empty
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let tables = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            tables: RwLock::new(tables),
        })
    }

    /// Load tables with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load the main file
    /// 2. If it fails to parse, try loading the backup
    /// 3. If the backup also fails, start with empty tables
    async fn load_with_recovery(path: &Path) -> Result<Tables> {
        match Self::load(path).await {
            Ok(tables) => Ok(tables),
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Store file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty store.");
                    return Ok(Tables::default());
                }

                match Self::load(&backup_path).await {
                    Ok(tables) => {
                        tracing::info!("Recovered store from backup");
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore store file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(tables)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also unreadable: {}. Starting with empty store.",
                            backup_err
                        );
                        Ok(Tables::default())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Load tables from a file; a missing file is an empty store
    async fn load(path: &Path) -> Result<Tables> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(Tables::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!("Failed to read store file {}: {}", path.display(), e))
        })?;

        let file: StoreFileFormat = serde_json::from_str(&content)?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        tracing::debug!(
            "Loaded store from {}: {} hosts, {} targets, {} records",
            path.display(),
            file.hosts.len(),
            file.targets.len(),
            file.records.len()
        );

        Ok(Tables::from_rows(file.hosts, file.targets, file.records))
    }

    /// Apply a mutation and persist it before making it visible
    async fn mutate<T>(&self, op: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut guard = self.tables.write().await;
        let mut next = guard.clone();
        let out = op(&mut next)?;
        self.write_tables(&next).await?;
        *guard = next;
        Ok(out)
    }

    /// Write tables to file atomically
    async fn write_tables(&self, tables: &Tables) -> Result<()> {
        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            hosts: tables.host_rows(),
            targets: tables.target_rows(),
            records: tables.record_rows(),
        };

        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.temp_path();
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.sync_all().await.map_err(|e| {
                Error::store(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get_host(&self, id: HostId) -> Result<Option<Host>> {
        Ok(self.tables.read().await.get_host(id))
    }

    async fn find_host(&self, fqdn: &str) -> Result<Option<Host>> {
        Ok(self.tables.read().await.find_host(fqdn))
    }

    async fn list_hosts(&self) -> Result<Vec<Host>> {
        Ok(self.tables.read().await.host_rows())
    }

    async fn insert_host(&self, host: Host) -> Result<Host> {
        self.mutate(|t| t.insert_host(host)).await
    }

    async fn update_host(&self, host: &Host) -> Result<()> {
        self.mutate(|t| t.update_host(host)).await
    }

    async fn delete_host(&self, id: HostId) -> Result<()> {
        self.mutate(|t| t.delete_host(id)).await
    }

    async fn get_target(&self, id: TargetId) -> Result<Option<UpdateTarget>> {
        Ok(self.tables.read().await.get_target(id))
    }

    async fn list_targets(&self) -> Result<Vec<UpdateTarget>> {
        Ok(self.tables.read().await.target_rows())
    }

    async fn insert_target(&self, target: UpdateTarget) -> Result<UpdateTarget> {
        self.mutate(|t| t.insert_target(target)).await
    }

    async fn update_target(&self, target: &UpdateTarget) -> Result<()> {
        self.mutate(|t| t.update_target(target)).await
    }

    async fn delete_target(&self, id: TargetId) -> Result<()> {
        self.mutate(|t| t.delete_target(id)).await
    }

    async fn get_record(&self, id: RecordId) -> Result<Option<Record>> {
        Ok(self.tables.read().await.get_record(id))
    }

    async fn records_for_host(&self, host_id: HostId) -> Result<Vec<Record>> {
        Ok(self.tables.read().await.records_for_host(host_id))
    }

    async fn insert_record(&self, record: Record) -> Result<Record> {
        self.mutate(|t| t.insert_record(record)).await
    }

    async fn update_record(&self, record: &Record) -> Result<()> {
        self.mutate(|t| t.update_record(record)).await
    }

    async fn delete_record(&self, id: RecordId) -> Result<()> {
        self.mutate(|t| t.delete_record(id)).await
    }

    async fn flush(&self) -> Result<()> {
        // Every mutation is written through; rewriting keeps the backup fresh
        let guard = self.tables.read().await;
        self.write_tables(&guard).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::new(&path).await.unwrap();
        assert!(store.list_hosts().await.unwrap().is_empty());

        let mut host = store
            .insert_host(Host::new("a.example.com", "hash", Utc::now()))
            .await
            .unwrap();
        host.set_address("203.0.113.5".parse().unwrap());
        store.update_host(&host).await.unwrap();
        assert!(path.exists());

        let reopened = FileStore::new(&path).await.unwrap();
        let loaded = reopened.find_host("a.example.com").await.unwrap().unwrap();
        assert_eq!(loaded.id, host.id);
        assert_eq!(loaded.ipv4, Some("203.0.113.5".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::new(&path).await.unwrap();
        store
            .insert_target(UpdateTarget::new("first", "https://one.example.net/update"))
            .await
            .unwrap();
        // Second write leaves the first state in the backup
        store
            .insert_target(UpdateTarget::new("second", "https://two.example.net/update"))
            .await
            .unwrap();
        assert!(FileStore::backup_path(&path).exists());

        fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = FileStore::new(&path).await.unwrap();
        let names: Vec<String> = recovered
            .list_targets()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["first"]);
    }

    #[tokio::test]
    async fn test_failed_constraint_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::new(&path).await.unwrap();
        store
            .insert_host(Host::new("a.example.com", "hash", Utc::now()))
            .await
            .unwrap();
        let before = fs::read_to_string(&path).await.unwrap();

        let err = store
            .insert_host(Host::new("a.example.com", "other", Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));

        assert_eq!(fs::read_to_string(&path).await.unwrap(), before);
        assert_eq!(store.list_hosts().await.unwrap().len(), 1);
    }
}
