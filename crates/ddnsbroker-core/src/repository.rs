//! Repository: the only writer of hosts, targets and records
//!
//! Every host or record write runs read-committed / diff / write inside a
//! per-entity async lock, so the change detector always compares against
//! durable state and concurrent saves of the same identity never interleave.
//!
//! ```text
//!  handler / admin ──► Repository ──► Store
//!                          │
//!                          └── PropagationEvent ──► PropagationEngine
//! ```
//!
//! Host address changes and administrative record saves are published as
//! [`PropagationEvent`]s with `try_send`: the caller never waits on the
//! queue. A full queue hands the event to a background send. Events lost
//! to a stopped engine or a crash are caught up by the engine's startup
//! reconciliation, because the push decision only looks at persisted
//! state.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tracing::{debug, info, warn};

use crate::change::{HostChanges, RecordChanges, detect_host_changes, detect_record_changes};
use crate::error::{Error, Result};
use crate::model::{Host, HostId, Record, RecordId, TargetId, UpdateTarget};
use crate::secret;
use crate::traits::Store;

/// Work handed from the repository to the propagation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationEvent {
    /// A host save changed at least one stored address
    HostAddressChanged(HostId),
    /// A record was created or edited through the repository
    RecordSaved(RecordId),
}

/// Lazily created async lock per entity identity
struct LockMap<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Copy> LockMap<K> {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let entry = self.locks.lock().await.entry(key).or_default().clone();
        entry.lock_owned().await
    }

    async fn forget(&self, key: K) {
        self.locks.lock().await.remove(&key);
    }
}

/// Serialised access to the store plus propagation dispatch
pub struct Repository {
    store: Arc<dyn Store>,
    host_locks: LockMap<HostId>,
    record_locks: LockMap<RecordId>,
    queue: Option<mpsc::Sender<PropagationEvent>>,
}

impl Repository {
    /// Repository without a propagation queue (events are discarded)
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            host_locks: LockMap::new(),
            record_locks: LockMap::new(),
            queue: None,
        }
    }

    /// Repository publishing to a bounded propagation queue
    ///
    /// # Returns
    ///
    /// A tuple of (repository, queue_receiver) to hand to the engine
    pub fn with_queue(
        store: Arc<dyn Store>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<PropagationEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let mut repo = Self::new(store);
        repo.queue = Some(tx);
        (repo, rx)
    }

    /// Underlying store, for reads
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub async fn host(&self, id: HostId) -> Result<Option<Host>> {
        self.store.get_host(id).await
    }

    pub async fn find_host(&self, fqdn: &str) -> Result<Option<Host>> {
        self.store.find_host(fqdn).await
    }

    pub async fn target(&self, id: TargetId) -> Result<Option<UpdateTarget>> {
        self.store.get_target(id).await
    }

    pub async fn record(&self, id: RecordId) -> Result<Option<Record>> {
        self.store.get_record(id).await
    }

    pub async fn records_for_host(&self, host_id: HostId) -> Result<Vec<Record>> {
        self.store.records_for_host(host_id).await
    }

    // -- hosts --

    /// Create a host; `host.secret` is the raw secret and is stored hashed
    pub async fn create_host(&self, mut host: Host, now: DateTime<Utc>) -> Result<Host> {
        host.validate()?;
        detect_host_changes(None, &mut host, now)?;
        let host = self.store.insert_host(host).await?;
        info!("Created host {} ({})", host.fqdn, host.id);
        Ok(host)
    }

    /// Save an edited host.
    ///
    /// On return `host` holds what was committed (hashed secret, change
    /// stamps). An address change is published for propagation.
    pub async fn save_host(&self, host: &mut Host, now: DateTime<Utc>) -> Result<HostChanges> {
        let edited = host.clone();
        let (committed, changes) = self
            .modify_host(host.id, now, move |row| *row = edited)
            .await?;
        *host = committed;
        Ok(changes)
    }

    /// Apply `edit` to the committed host row and save it.
    ///
    /// The read, the edit, the diff and the write all happen under the
    /// host's lock.
    pub async fn modify_host<F>(
        &self,
        id: HostId,
        now: DateTime<Utc>,
        edit: F,
    ) -> Result<(Host, HostChanges)>
    where
        F: FnOnce(&mut Host),
    {
        let changes;
        let host;
        {
            let _guard = self.host_locks.lock(id).await;
            let committed = self
                .store
                .get_host(id)
                .await?
                .ok_or_else(|| Error::not_found(format!("host {id}")))?;

            let mut current = committed.clone();
            edit(&mut current);
            current.id = id;
            current.validate()?;

            changes = detect_host_changes(Some(&committed), &mut current, now)?;
            self.store.update_host(&current).await?;
            host = current;
        }

        if changes.address_changed() {
            info!(
                "Host {} address changed (v4: {:?}, v6: {:?})",
                host.fqdn, host.ipv4, host.ipv6
            );
            self.dispatch(PropagationEvent::HostAddressChanged(id));
        } else {
            debug!("Host {} saved without address change", host.fqdn);
        }

        Ok((host, changes))
    }

    /// Replace a host's secret with a random one.
    ///
    /// Only the hash is stored; the raw secret is returned exactly once.
    pub async fn generate_secret(&self, id: HostId, now: DateTime<Utc>) -> Result<String> {
        let raw = secret::random_secret();
        let assigned = raw.clone();
        self.modify_host(id, now, move |host| host.secret = assigned)
            .await?;
        info!("Generated new secret for host {}", id);
        Ok(raw)
    }

    /// Delete a host; rejected while records reference it
    pub async fn delete_host(&self, id: HostId) -> Result<()> {
        {
            let _guard = self.host_locks.lock(id).await;
            self.store.delete_host(id).await?;
        }
        self.host_locks.forget(id).await;
        info!("Deleted host {}", id);
        Ok(())
    }

    // -- update targets --

    pub async fn create_target(&self, target: UpdateTarget) -> Result<UpdateTarget> {
        target.validate()?;
        let target = self.store.insert_target(target).await?;
        info!("Created update target {} ({})", target.name, target.id);
        Ok(target)
    }

    pub async fn save_target(&self, target: &UpdateTarget) -> Result<()> {
        target.validate()?;
        self.store.update_target(target).await
    }

    /// Delete an update target; rejected while records reference it
    pub async fn delete_target(&self, id: TargetId) -> Result<()> {
        self.store.delete_target(id).await?;
        info!("Deleted update target {}", id);
        Ok(())
    }

    // -- records --

    /// Create a record and publish it for its first push
    pub async fn create_record(&self, mut record: Record, now: DateTime<Utc>) -> Result<Record> {
        self.prepare_record(None, &mut record, now).await?;
        let record = self.store.insert_record(record).await?;
        info!("Created record {} ({}) for host {}", record.fqdn, record.id, record.host_id);
        self.dispatch(PropagationEvent::RecordSaved(record.id));
        Ok(record)
    }

    /// Save an edited record and publish it for a push check.
    ///
    /// Effective addresses are recomputed from the owning host; whatever the
    /// caller put there is ignored.
    pub async fn save_record(&self, record: &mut Record, now: DateTime<Utc>) -> Result<RecordChanges> {
        let changes;
        {
            let _guard = self.record_locks.lock(record.id).await;
            let committed = self
                .store
                .get_record(record.id)
                .await?
                .ok_or_else(|| Error::not_found(format!("record {}", record.id)))?;

            changes = self.prepare_record(Some(&committed), record, now).await?;
            self.store.update_record(record).await?;
        }
        self.dispatch(PropagationEvent::RecordSaved(record.id));
        Ok(changes)
    }

    pub async fn delete_record(&self, id: RecordId) -> Result<()> {
        {
            let _guard = self.record_locks.lock(id).await;
            self.store.delete_record(id).await?;
        }
        self.record_locks.forget(id).await;
        info!("Deleted record {}", id);
        Ok(())
    }

    /// Hold a record's lock across a re-save and its pushes
    pub(crate) async fn lock_record(&self, id: RecordId) -> OwnedMutexGuard<()> {
        self.record_locks.lock(id).await
    }

    /// Re-save a record against its host's current address.
    ///
    /// Caller holds the record lock. `None` if the record is gone.
    pub(crate) async fn resave_record_locked(
        &self,
        id: RecordId,
        now: DateTime<Utc>,
    ) -> Result<Option<Record>> {
        let Some(committed) = self.store.get_record(id).await? else {
            return Ok(None);
        };
        let mut current = committed.clone();
        let changes = self.prepare_record(Some(&committed), &mut current, now).await?;
        if current != committed {
            self.store.update_record(&current).await?;
        }
        if changes.any() {
            debug!(
                "Record {} effective address now v4: {:?}, v6: {:?}",
                current.fqdn,
                current.effective_ipv4(),
                current.effective_ipv6()
            );
        }
        Ok(Some(current))
    }

    /// Persist push bookkeeping. Caller holds the record lock.
    pub(crate) async fn commit_push_locked(&self, record: &Record) -> Result<()> {
        self.store.update_record(record).await
    }

    /// Defaults, validation, recomposition and diff for a record save
    async fn prepare_record(
        &self,
        committed: Option<&Record>,
        record: &mut Record,
        now: DateTime<Utc>,
    ) -> Result<RecordChanges> {
        let host = self
            .store
            .get_host(record.host_id)
            .await?
            .ok_or_else(|| Error::constraint(format!("record references unknown host {}", record.host_id)))?;
        let target = self
            .store
            .get_target(record.target_id)
            .await?
            .ok_or_else(|| {
                Error::constraint(format!(
                    "record references unknown update target {}",
                    record.target_id
                ))
            })?;

        record.apply_defaults(&host, &target);
        record.validate()?;
        record.recompose(&host);
        Ok(detect_record_changes(committed, record, now))
    }

    fn dispatch(&self, event: PropagationEvent) {
        let Some(queue) = &self.queue else {
            debug!("No propagation queue, dropping {:?}", event);
            return;
        };
        match queue.try_send(event) {
            Ok(()) => debug!("Queued {:?}", event),
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Propagation queue full, deferring {:?}", event);
                let queue = queue.clone();
                tokio::spawn(async move {
                    if queue.send(event).await.is_err() {
                        warn!("Propagation engine stopped, dropping deferred {:?}", event);
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(
                    "Propagation engine stopped, dropping {:?}. The next engine start reconciles it.",
                    event
                );
            }
        }
    }
}
