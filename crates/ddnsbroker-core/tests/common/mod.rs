//! Test doubles and common utilities for behaviour contract tests
//!
//! This module provides minimal test doubles that observe the broker from
//! the outside: a recording update client with switchable failure and
//! latency, a store wrapper that counts flushes and can hide hosts, and a
//! fixture with one host and one update target.

#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use ddnsbroker_core::error::{Error, Result};
use ddnsbroker_core::model::{Host, HostId, Record, RecordId, TargetId, UpdateTarget};
use ddnsbroker_core::traits::{PushReply, PushRequest, Store, UpdateClient};
use ddnsbroker_core::{
    EngineConfig, EngineEvent, MemoryStore, PropagationEngine, PropagationEvent, Repository,
};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

pub const HOST_FQDN: &str = "a.example.com";
pub const HOST_SECRET: &str = "s3cret";

/// An UpdateClient that records every push and can be told to fail
#[derive(Default)]
pub struct RecordingClient {
    requests: std::sync::Mutex<Vec<PushRequest>>,
    failing: AtomicBool,
    delay: Duration,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose provider takes `delay` to answer
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Make every following push fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of push attempts so far, failed ones included
    pub fn push_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every push attempt so far, in order
    pub fn requests(&self) -> Vec<PushRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl UpdateClient for RecordingClient {
    async fn push(&self, request: &PushRequest) -> Result<PushReply> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.requests.lock().unwrap().push(request.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::provider("recording", "911"));
        }
        Ok(PushReply::Good)
    }

    fn client_name(&self) -> &'static str {
        "recording"
    }
}

/// A memory store that counts flush() calls and can hide hosts from id
/// lookups, as if they were deleted right after a lookup by fqdn
#[derive(Default)]
pub struct SpyStore {
    inner: MemoryStore,
    flush_count: AtomicUsize,
    hosts_hidden: AtomicBool,
}

impl SpyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn flush_count(&self) -> usize {
        self.flush_count.load(Ordering::SeqCst)
    }

    pub fn set_hosts_hidden(&self, hidden: bool) {
        self.hosts_hidden.store(hidden, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Store for SpyStore {
    async fn get_host(&self, id: HostId) -> Result<Option<Host>> {
        if self.hosts_hidden.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.get_host(id).await
    }
    async fn find_host(&self, fqdn: &str) -> Result<Option<Host>> {
        self.inner.find_host(fqdn).await
    }
    async fn list_hosts(&self) -> Result<Vec<Host>> {
        self.inner.list_hosts().await
    }
    async fn insert_host(&self, host: Host) -> Result<Host> {
        self.inner.insert_host(host).await
    }
    async fn update_host(&self, host: &Host) -> Result<()> {
        self.inner.update_host(host).await
    }
    async fn delete_host(&self, id: HostId) -> Result<()> {
        self.inner.delete_host(id).await
    }
    async fn get_target(&self, id: TargetId) -> Result<Option<UpdateTarget>> {
        self.inner.get_target(id).await
    }
    async fn list_targets(&self) -> Result<Vec<UpdateTarget>> {
        self.inner.list_targets().await
    }
    async fn insert_target(&self, target: UpdateTarget) -> Result<UpdateTarget> {
        self.inner.insert_target(target).await
    }
    async fn update_target(&self, target: &UpdateTarget) -> Result<()> {
        self.inner.update_target(target).await
    }
    async fn delete_target(&self, id: TargetId) -> Result<()> {
        self.inner.delete_target(id).await
    }
    async fn get_record(&self, id: RecordId) -> Result<Option<Record>> {
        self.inner.get_record(id).await
    }
    async fn records_for_host(&self, host_id: HostId) -> Result<Vec<Record>> {
        self.inner.records_for_host(host_id).await
    }
    async fn insert_record(&self, record: Record) -> Result<Record> {
        self.inner.insert_record(record).await
    }
    async fn update_record(&self, record: &Record) -> Result<()> {
        self.inner.update_record(record).await
    }
    async fn delete_record(&self, id: RecordId) -> Result<()> {
        self.inner.delete_record(id).await
    }
    async fn flush(&self) -> Result<()> {
        self.flush_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One host, one update target, an engine driven by hand
pub struct Fixture {
    pub repo: Arc<Repository>,
    pub engine: PropagationEngine,
    pub client: Arc<RecordingClient>,
    pub events: mpsc::Receiver<EngineEvent>,
    pub queue: mpsc::Receiver<PropagationEvent>,
    pub host: Host,
    pub target: UpdateTarget,
}

impl Fixture {
    /// Fixture over a fresh memory store
    pub async fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new())).await
    }

    /// Fixture over `store`, reusing its host and target if present
    pub async fn with_store(store: Arc<dyn Store>) -> Self {
        let (repo, queue) = Repository::with_queue(store, 1024);
        let repo = Arc::new(repo);
        let client = Arc::new(RecordingClient::new());
        let (engine, events) =
            PropagationEngine::new(repo.clone(), client.clone(), &EngineConfig::default())
                .expect("engine construction succeeds");

        let host = match repo.find_host(HOST_FQDN).await.unwrap() {
            Some(host) => host,
            None => repo
                .create_host(Host::new(HOST_FQDN, HOST_SECRET, Utc::now()), Utc::now())
                .await
                .unwrap(),
        };
        let target = match repo.store().list_targets().await.unwrap().into_iter().next() {
            Some(target) => target,
            None => repo
                .create_target(UpdateTarget::new(
                    "dyn",
                    "https://dyn.example.net/nic/update",
                ))
                .await
                .unwrap(),
        };

        Self {
            repo,
            engine,
            client,
            events,
            queue,
            host,
            target,
        }
    }

    /// Store a new IPv4 address on the host, as an inbound update would
    pub async fn set_host_ipv4(&self, ip: &str) -> bool {
        let ip: Ipv4Addr = ip.parse().unwrap();
        let (_, changes) = self
            .repo
            .modify_host(self.host.id, Utc::now(), |h| h.ipv4 = Some(ip))
            .await
            .unwrap();
        changes.address_changed()
    }

    /// Store a new IPv6 address on the host, as an inbound update would
    pub async fn set_host_ipv6(&self, ip: &str) -> bool {
        let ip: Ipv6Addr = ip.parse().unwrap();
        let (_, changes) = self
            .repo
            .modify_host(self.host.id, Utc::now(), |h| h.ipv6 = Some(ip))
            .await
            .unwrap();
        changes.address_changed()
    }

    /// Add an IPv6-only record with the given (netmask, host id)
    pub async fn add_ipv6_record(&self, fqdn: &str, netmask: u8, host_id: &str) -> Record {
        let mut record = Record::new(self.host.id, self.target.id, Utc::now())
            .with_fqdn(fqdn)
            .with_ipv6(netmask, host_id.parse().unwrap())
            .with_credentials("user", "pw");
        record.ipv4_enabled = false;
        self.repo.create_record(record, Utc::now()).await.unwrap()
    }

    /// Hand every queued propagation event to the engine, in order.
    ///
    /// Returns how many events were handled.
    pub async fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.queue.try_recv() {
            self.engine.handle_event(event).await.unwrap();
            handled += 1;
        }
        handled
    }

    /// Add an IPv4-only record with the given (netmask, host id)
    pub async fn add_record(&self, fqdn: &str, netmask: u8, host_id: &str) -> Record {
        let mut record = Record::new(self.host.id, self.target.id, Utc::now())
            .with_fqdn(fqdn)
            .with_ipv4(netmask, host_id.parse().unwrap())
            .with_credentials("user", "pw");
        record.ipv6_enabled = false;
        self.repo.create_record(record, Utc::now()).await.unwrap()
    }

    /// Re-read a record from the store
    pub async fn record(&self, id: RecordId) -> Record {
        self.repo.record(id).await.unwrap().unwrap()
    }

    /// Drain all engine events emitted so far
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

/// `Authorization` header value for Basic-Auth
pub fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}
