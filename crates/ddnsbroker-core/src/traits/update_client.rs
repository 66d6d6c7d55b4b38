// # Update Client Trait
//
// Defines the outbound capability: one dyndns2 update call against a
// third-party provider.
//
// ## Implementations
//
// - dyndns2 over HTTP: `ddnsbroker-dyndns2` crate
//
// ## Usage
//
// ```rust,ignore
// use ddnsbroker_core::traits::{PushRequest, UpdateClient};
//
// let reply = client.push(&PushRequest {
//     url: "https://dyndns.example.com/nic/update".into(),
//     hostname: "www.example.com".into(),
//     address: "203.0.113.42".parse()?,
//     username: "user".into(),
//     password: "pass".into(),
// }).await?;
// ```

use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;

/// One outbound update call
#[derive(Clone, PartialEq, Eq)]
pub struct PushRequest {
    /// Target update URL
    pub url: String,
    /// Record fqdn, sent as `hostname`
    pub hostname: String,
    /// Effective address, sent as `myip`
    pub address: IpAddr,
    /// Basic-Auth username
    pub username: String,
    /// Basic-Auth password
    pub password: String,
}

impl fmt::Debug for PushRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushRequest")
            .field("url", &self.url)
            .field("hostname", &self.hostname)
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

/// Successful provider reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushReply {
    /// `good`: the provider applied the address
    Good,
    /// `nochg`: the provider already had the address
    NoChange,
}

impl PushReply {
    /// Classify a 200 response body; `None` for anything but good/nochg
    pub fn from_body(body: &str) -> Option<Self> {
        let body = body.trim();
        if body.starts_with("good") {
            Some(PushReply::Good)
        } else if body.starts_with("nochg") {
            Some(PushReply::NoChange)
        } else {
            None
        }
    }
}

/// Trait for outbound update clients
///
/// # Trust Level: Untrusted
///
/// Clients are stateless and single-shot:
/// - one HTTP call per invocation, bounded by a timeout
/// - no retry (the propagation engine retries on the next trigger)
/// - never touch records or the store; the caller advances
///   `last_*_update` only on `Ok`
#[async_trait]
pub trait UpdateClient: Send + Sync {
    /// Push one address for one record.
    ///
    /// # Returns
    ///
    /// - `Ok(PushReply)`: status 200 and a `good`/`nochg` body
    /// - `Err(Error::Provider)`: any other status or body, or a network error
    async fn push(&self, request: &PushRequest) -> Result<PushReply, crate::Error>;

    /// Client name (for logging)
    fn client_name(&self) -> &'static str;
}
