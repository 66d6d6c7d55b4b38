//! Configuration types for the update broker
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

/// Main broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Realm announced in `WWW-Authenticate` on `badauth`
    #[serde(default = "default_realm")]
    pub realm: String,

    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl BrokerConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            realm: default_realm(),
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.realm.is_empty() {
            return Err(crate::Error::config("Realm cannot be empty"));
        }
        if self.realm.contains('"') {
            return Err(crate::Error::config("Realm cannot contain '\"'"));
        }

        self.store.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_realm() -> String {
    "ddnsbroker".to_string()
}

/// Store configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// JSON file store
    File {
        /// Path to the store file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.trim().is_empty() => {
                Err(crate::Error::config("File store path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Propagation engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the engine event channel
    ///
    /// When full, new engine events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Capacity of the propagation queue between repository and engine
    ///
    /// The inbound request never waits on this queue; when it is full the
    /// trigger is handed to a background send instead.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Timeout for one outbound update call (in seconds)
    #[serde(default = "default_outbound_timeout_secs")]
    pub outbound_timeout_secs: u64,

    /// How long shutdown waits for in-flight pushes before aborting them
    /// (in seconds)
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.queue_capacity == 0 {
            return Err(crate::Error::config("Propagation queue capacity must be > 0"));
        }
        if !(1..=300).contains(&self.outbound_timeout_secs) {
            return Err(crate::Error::config(format!(
                "Outbound timeout must be between 1 and 300 seconds, got {}",
                self.outbound_timeout_secs
            )));
        }
        if !(1..=300).contains(&self.drain_timeout_secs) {
            return Err(crate::Error::config(format!(
                "Drain timeout must be between 1 and 300 seconds, got {}",
                self.drain_timeout_secs
            )));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            queue_capacity: default_queue_capacity(),
            outbound_timeout_secs: default_outbound_timeout_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_outbound_timeout_secs() -> u64 {
    30
}

fn default_drain_timeout_secs() -> u64 {
    30
}
