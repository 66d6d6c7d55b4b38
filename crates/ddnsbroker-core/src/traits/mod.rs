//! Core traits for the update broker
//!
//! This module defines the abstract interfaces the broker consumes.
//!
//! - [`Store`]: Persist hosts, update targets and records
//! - [`UpdateClient`]: Push one address to a third-party dyndns2 provider

pub mod store;
pub mod update_client;

pub use store::Store;
pub use update_client::{PushReply, PushRequest, UpdateClient};
