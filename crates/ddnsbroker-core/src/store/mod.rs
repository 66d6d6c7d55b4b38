// # Store Implementations
//
// This module provides implementations of the Store trait for
// different persistence strategies.

pub mod file;
pub mod memory;
mod tables;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::traits::Store;

/// Build the store described by the configuration
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn Store>> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreConfig::File { path } => Ok(Arc::new(FileStore::new(path).await?)),
    }
}
