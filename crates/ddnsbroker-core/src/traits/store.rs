// # Store Trait
//
// Defines the persistence capability the broker consumes.
//
// ## Purpose
//
// The store keeps hosts, update targets and records, and enforces the
// relational guarantees of the data model:
// - Host.fqdn is unique
// - UpdateTarget.name is unique
// - (Record.host_id, Record.fqdn) is unique
// - Records reference an existing host and target
// - Hosts and targets referenced by a record cannot be deleted
//
// Change detection and per-entity serialisation are not the store's job;
// both live in `Repository`, which is the only writer.
//
// ## Implementations
//
// - `MemoryStore`: in-process tables
// - `FileStore`: JSON file with atomic writes and backup recovery

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Host, HostId, Record, RecordId, TargetId, UpdateTarget};

/// Trait for store implementations
///
/// Implementations must be thread-safe and usable across async tasks.
/// Every mutating call is durable when it returns `Ok`.
///
/// `insert_*` ignores the id carried by the entity and returns the entity
/// with its store-assigned id. `update_*` replaces the row with the same id
/// and fails with `Error::NotFound` if there is none.
#[async_trait]
pub trait Store: Send + Sync {
    /// Get a host by id
    async fn get_host(&self, id: HostId) -> Result<Option<Host>>;

    /// Get a host by exact fqdn
    async fn find_host(&self, fqdn: &str) -> Result<Option<Host>>;

    /// List all hosts ordered by id
    async fn list_hosts(&self) -> Result<Vec<Host>>;

    /// Insert a new host
    async fn insert_host(&self, host: Host) -> Result<Host>;

    /// Replace an existing host
    async fn update_host(&self, host: &Host) -> Result<()>;

    /// Delete a host; rejected while records reference it
    async fn delete_host(&self, id: HostId) -> Result<()>;

    /// Get an update target by id
    async fn get_target(&self, id: TargetId) -> Result<Option<UpdateTarget>>;

    /// List all update targets ordered by id
    async fn list_targets(&self) -> Result<Vec<UpdateTarget>>;

    /// Insert a new update target
    async fn insert_target(&self, target: UpdateTarget) -> Result<UpdateTarget>;

    /// Replace an existing update target
    async fn update_target(&self, target: &UpdateTarget) -> Result<()>;

    /// Delete an update target; rejected while records reference it
    async fn delete_target(&self, id: TargetId) -> Result<()>;

    /// Get a record by id
    async fn get_record(&self, id: RecordId) -> Result<Option<Record>>;

    /// Records owned by a host, ordered by fqdn
    async fn records_for_host(&self, host_id: HostId) -> Result<Vec<Record>>;

    /// Insert a new record
    async fn insert_record(&self, record: Record) -> Result<Record>;

    /// Replace an existing record
    async fn update_record(&self, record: &Record) -> Result<()>;

    /// Delete a record
    async fn delete_record(&self, id: RecordId) -> Result<()>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<()>;
}
