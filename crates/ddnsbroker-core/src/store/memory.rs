// # Memory Store
//
// In-memory implementation of Store.
//
// ## Purpose
//
// Provides a simple, fast store that doesn't persist across restarts.
// Useful for testing and for throwaway deployments seeded at startup.
//
// ## Crash Behavior
//
// - All hosts, targets and records are lost on restart/crash
// - No recovery possible (state is in-memory only)

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::tables::Tables;
use crate::error::Result;
use crate::model::{Host, HostId, Record, RecordId, TargetId, UpdateTarget};
use crate::traits::store::Store;

/// In-memory store implementation
///
/// All tables live behind one RwLock. Clones share the same tables.
///
/// # Example
///
/// ```rust,no_run
/// use ddnsbroker_core::model::Host;
/// use ddnsbroker_core::store::MemoryStore;
/// use ddnsbroker_core::traits::Store;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new();
///
///     let host = store
///         .insert_host(Host::new("a.example.com", "hash", chrono::Utc::now()))
///         .await?;
///     assert!(store.find_host("a.example.com").await?.is_some());
///     assert_eq!(store.get_host(host.id).await?.map(|h| h.fqdn), Some(host.fqdn));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of hosts in the store
    pub async fn host_count(&self) -> usize {
        self.inner.read().await.host_rows().len()
    }

    /// Check if the store holds no hosts, targets or records
    pub async fn is_empty(&self) -> bool {
        let guard = self.inner.read().await;
        guard.host_rows().is_empty() && guard.target_rows().is_empty() && guard.record_rows().is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_host(&self, id: HostId) -> Result<Option<Host>> {
        Ok(self.inner.read().await.get_host(id))
    }

    async fn find_host(&self, fqdn: &str) -> Result<Option<Host>> {
        Ok(self.inner.read().await.find_host(fqdn))
    }

    async fn list_hosts(&self) -> Result<Vec<Host>> {
        Ok(self.inner.read().await.host_rows())
    }

    async fn insert_host(&self, host: Host) -> Result<Host> {
        self.inner.write().await.insert_host(host)
    }

    async fn update_host(&self, host: &Host) -> Result<()> {
        self.inner.write().await.update_host(host)
    }

    async fn delete_host(&self, id: HostId) -> Result<()> {
        self.inner.write().await.delete_host(id)
    }

    async fn get_target(&self, id: TargetId) -> Result<Option<UpdateTarget>> {
        Ok(self.inner.read().await.get_target(id))
    }

    async fn list_targets(&self) -> Result<Vec<UpdateTarget>> {
        Ok(self.inner.read().await.target_rows())
    }

    async fn insert_target(&self, target: UpdateTarget) -> Result<UpdateTarget> {
        self.inner.write().await.insert_target(target)
    }

    async fn update_target(&self, target: &UpdateTarget) -> Result<()> {
        self.inner.write().await.update_target(target)
    }

    async fn delete_target(&self, id: TargetId) -> Result<()> {
        self.inner.write().await.delete_target(id)
    }

    async fn get_record(&self, id: RecordId) -> Result<Option<Record>> {
        Ok(self.inner.read().await.get_record(id))
    }

    async fn records_for_host(&self, host_id: HostId) -> Result<Vec<Record>> {
        Ok(self.inner.read().await.records_for_host(host_id))
    }

    async fn insert_record(&self, record: Record) -> Result<Record> {
        self.inner.write().await.insert_record(record)
    }

    async fn update_record(&self, record: &Record) -> Result<()> {
        self.inner.write().await.update_record(record)
    }

    async fn delete_record(&self, id: RecordId) -> Result<()> {
        self.inner.write().await.delete_record(id)
    }

    async fn flush(&self) -> Result<()> {
        // No-op for memory store (everything is already "persisted")
        Ok(())
    }
}
