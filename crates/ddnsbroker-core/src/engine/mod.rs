//! Propagation engine
//!
//! The PropagationEngine is responsible for:
//! - Consuming propagation events published by the repository
//! - Re-saving every affected record against its host's current address
//! - Deciding per record and per family whether a push is due
//! - Pushing due addresses via the UpdateClient
//! - Advancing `last_*_update` only after a confirmed push
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ Repository  │─── PropagationEvent ───┐
//! └─────────────┘                        │
//!                                        ▼
//!                             ┌───────────────────┐
//!                             │ PropagationEngine │
//!                             └───────────────────┘
//!                                        │
//!         ┌──────────────────────────────┼──────────────────────────┐
//!         │                              │                          │
//!         ▼                              ▼                          ▼
//! ┌───────────────┐            ┌──────────────┐            ┌─────────────┐
//! │ Record re-save│            │ UpdateClient │            │   Events    │
//! │ (recompose)   │            │ (push)       │            │  (notify)   │
//! └───────────────┘            └──────────────┘            └─────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. Host address changed (or record saved)
//! 2. Every affected record is re-saved under its lock
//! 3. Per family: push iff enabled, effective address present, and
//!    never pushed or changed since the last successful push
//! 4. On success, record `last_*_update`
//! 5. Emit events for monitoring/logging
//!
//! Failed pushes are logged and dropped. They are retried on the next
//! trigger, because `last_*_change` stays ahead of `last_*_update`.
//!
//! Every start begins with a [`PropagationEngine::reconcile`] sweep over all
//! hosts, which catches up on triggers lost to a stop or a crash.

use chrono::Utc;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::ip::AddressFamily;
use crate::model::{HostId, RecordId};
use crate::repository::{PropagationEvent, Repository};
use crate::traits::{PushReply, PushRequest, UpdateClient};

/// Events emitted by the PropagationEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Cascade over a host's records started
    CascadeStarted {
        host_id: HostId,
        records_count: usize,
    },

    /// Outbound push started
    PushStarted {
        record_name: String,
        address: IpAddr,
    },

    /// Provider answered good/nochg
    PushSucceeded {
        record_name: String,
        address: IpAddr,
        reply: PushReply,
    },

    /// Push not due for this family
    PushSkipped {
        record_name: String,
        family: AddressFamily,
    },

    /// Provider rejected the push or could not be reached
    PushFailed {
        record_name: String,
        address: IpAddr,
        error: String,
    },

    /// Engine stopped
    Stopped { reason: String },
}

/// Propagation engine
///
/// Cheap to clone; clones share the repository, client and event channel.
/// Each queued event is handled on its own task so a slow provider never
/// holds up other cascades.
#[derive(Clone)]
pub struct PropagationEngine {
    repo: Arc<Repository>,
    client: Arc<dyn UpdateClient>,
    event_tx: mpsc::Sender<EngineEvent>,
    drain_timeout: Duration,
}

impl PropagationEngine {
    /// Create a new propagation engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        repo: Arc<Repository>,
        client: Arc<dyn UpdateClient>,
        config: &EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            repo,
            client,
            event_tx: tx,
            drain_timeout: Duration::from_secs(config.drain_timeout_secs),
        };

        Ok((engine, rx))
    }

    /// Run the engine until Ctrl-C
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Final store flush failed
    pub async fn run(&self, queue: mpsc::Receiver<PropagationEvent>) -> Result<()> {
        self.run_internal(queue, None).await
    }

    /// Run the engine until `shutdown_rx` fires (or its sender is dropped).
    ///
    /// On the way out, already queued triggers are still handled and
    /// in-flight pushes get up to `drain_timeout_secs` to finish.
    pub async fn run_with_shutdown(
        &self,
        queue: mpsc::Receiver<PropagationEvent>,
        shutdown_rx: oneshot::Receiver<()>,
    ) -> Result<()> {
        self.run_internal(queue, Some(shutdown_rx)).await
    }

    async fn run_internal(
        &self,
        queue: mpsc::Receiver<PropagationEvent>,
        shutdown_rx: Option<oneshot::Receiver<()>>,
    ) -> Result<()> {
        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        let mut tasks = JoinSet::new();
        let mut events = ReceiverStream::new(queue);
        info!("Propagation engine started");

        // Triggers lost to a previous stop or crash are only recoverable
        // from persisted state
        let engine = self.clone();
        tasks.spawn(async move {
            if let Err(e) = engine.reconcile().await {
                error!("Startup reconciliation failed: {}", e);
            }
        });

        let reason = loop {
            tokio::select! {
                next = events.next() => match next {
                    Some(event) => self.spawn_event(&mut tasks, event),
                    None => {
                        info!("Propagation queue closed");
                        break "Queue closed";
                    }
                },

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_task_result(joined);
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break "Shutdown signal";
                }
            }
        };

        // Handle what was already queued
        let mut queue = events.into_inner();
        queue.close();
        while let Some(event) = queue.recv().await {
            self.spawn_event(&mut tasks, event);
        }

        self.drain(&mut tasks).await;
        self.emit_event(EngineEvent::Stopped {
            reason: reason.to_string(),
        });

        // Flush store before exiting
        self.repo.store().flush().await?;
        info!("Store flushed, engine stopped");

        Ok(())
    }

    /// Wait for in-flight tasks, aborting whatever outlives the drain timeout
    async fn drain(&self, tasks: &mut JoinSet<()>) {
        if tasks.is_empty() {
            return;
        }
        info!("Waiting for {} propagation tasks", tasks.len());

        let finished = tokio::time::timeout(self.drain_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                log_task_result(joined);
            }
        })
        .await;

        if finished.is_err() {
            warn!(
                "{} propagation tasks still running after {:?}, aborting",
                tasks.len(),
                self.drain_timeout
            );
            tasks.shutdown().await;
        }
    }

    /// Handle one event off the caller's path; failures are logged only
    fn spawn_event(&self, tasks: &mut JoinSet<()>, event: PropagationEvent) {
        let engine = self.clone();
        tasks.spawn(async move {
            if let Err(e) = engine.handle_event(event).await {
                error!("Failed to handle {:?}: {}", event, e);
            }
        });
    }

    /// Cascade every host.
    ///
    /// Push decisions come from persisted timestamps, so hosts whose records
    /// are already in sync cause no pushes.
    pub async fn reconcile(&self) -> Result<()> {
        let hosts = self.repo.store().list_hosts().await?;
        info!("Reconciling {} hosts", hosts.len());

        for host in hosts {
            if let Err(e) = self.process_host(host.id).await {
                error!("Failed to reconcile host {} ({}): {}", host.fqdn, host.id, e);
            }
        }

        Ok(())
    }

    /// Handle one propagation event on the current task
    pub async fn handle_event(&self, event: PropagationEvent) -> Result<()> {
        match event {
            PropagationEvent::HostAddressChanged(host_id) => self.process_host(host_id).await,
            PropagationEvent::RecordSaved(record_id) => self.process_record(record_id).await,
        }
    }

    /// Cascade a host's address to every record it owns.
    ///
    /// A failing record does not stop the others.
    pub async fn process_host(&self, host_id: HostId) -> Result<()> {
        let records = self.repo.records_for_host(host_id).await?;
        debug!("Cascading host {} to {} records", host_id, records.len());

        self.emit_event(EngineEvent::CascadeStarted {
            host_id,
            records_count: records.len(),
        });

        for record in records {
            if let Err(e) = self.process_record(record.id).await {
                error!("Failed to propagate record {} ({}): {}", record.fqdn, record.id, e);
            }
        }

        Ok(())
    }

    /// Re-save one record and push every family that is due.
    ///
    /// Outbound failures are contained here; only store errors surface.
    pub async fn process_record(&self, record_id: RecordId) -> Result<()> {
        let _guard = self.repo.lock_record(record_id).await;

        let Some(mut record) = self.repo.resave_record_locked(record_id, Utc::now()).await? else {
            debug!("Record {} no longer exists, skipping", record_id);
            return Ok(());
        };

        let target = self
            .repo
            .target(record.target_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("update target {}", record.target_id)))?;

        let mut pushed = false;
        for family in AddressFamily::ALL {
            let Some(address) = record.effective(family).filter(|_| record.push_due(family)) else {
                debug!("{} push for {} not due", family, record.fqdn);
                self.emit_event(EngineEvent::PushSkipped {
                    record_name: record.fqdn.clone(),
                    family,
                });
                continue;
            };

            self.emit_event(EngineEvent::PushStarted {
                record_name: record.fqdn.clone(),
                address,
            });

            let request = PushRequest {
                url: target.url.clone(),
                hostname: record.fqdn.clone(),
                address,
                username: record.username.clone(),
                password: record.password.clone(),
            };

            match self.client.push(&request).await {
                Ok(reply) => {
                    info!(
                        "Pushed {} -> {} via {} ({:?})",
                        record.fqdn, address, target.name, reply
                    );
                    record.mark_pushed(family, Utc::now());
                    pushed = true;
                    self.emit_event(EngineEvent::PushSucceeded {
                        record_name: record.fqdn.clone(),
                        address,
                        reply,
                    });
                }
                Err(e) => {
                    warn!(
                        "Push {} -> {} via {} ({}) failed: {}",
                        record.fqdn,
                        address,
                        target.name,
                        self.client.client_name(),
                        e
                    );
                    self.emit_event(EngineEvent::PushFailed {
                        record_name: record.fqdn.clone(),
                        address,
                        error: e.to_string(),
                    });
                }
            }
        }

        if pushed {
            self.repo.commit_push_locked(&record).await?;
        }

        Ok(())
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

fn log_task_result(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined
        && e.is_panic()
    {
        error!("Propagation task panicked: {}", e);
    }
}
