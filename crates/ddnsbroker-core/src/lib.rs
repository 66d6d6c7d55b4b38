// # ddnsbroker-core
//
// Core library for the dyndns2 update broker.
//
// ## Architecture Overview
//
// One dynamically-addressed host reports its address once; the broker fans
// it out, recomposed per record, to third-party dyndns2 providers:
// - **ip**: address normalization and effective-address composition
// - **change**: diff of an entity against its last committed row
// - **Repository**: the only writer; per-entity locks, change detection,
//   propagation dispatch
// - **PropagationEngine**: host address change → record re-save → push if due
// - **UpdateClient**: trait for the outbound dyndns2 call
// - **auth** / **UpdateHandler**: the inbound `/nic/update` state machine
// - **Store**: trait for persistence, with memory and file implementations
//
// ## Design Principles
//
// 1. **Library-First**: the daemon only wires these pieces together
// 2. **Explicit Pipeline**: propagation is an event consumed by the engine,
//    not a side effect of saving
// 3. **Idempotency**: pushes are decided from persisted timestamps only, so
//    repeated triggers never re-push and failed pushes retry on the next one

pub mod auth;
pub mod change;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod ip;
pub mod model;
pub mod repository;
pub mod secret;
pub mod store;
pub mod traits;
pub mod validation;

// Re-export core types for convenience
pub use config::{BrokerConfig, EngineConfig, StoreConfig};
pub use engine::{EngineEvent, PropagationEngine};
pub use error::{Error, Result};
pub use handler::{UpdateHandler, UpdateRequest, UpdateResponse};
pub use ip::{AddressFamily, normalize_ip};
pub use model::{Host, HostId, Record, RecordId, TargetId, UpdateTarget};
pub use repository::{PropagationEvent, Repository};
pub use store::{FileStore, MemoryStore};
pub use traits::{PushReply, PushRequest, Store, UpdateClient};
