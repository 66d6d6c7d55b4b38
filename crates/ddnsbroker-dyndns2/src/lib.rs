// # dyndns2 Update Client
//
// This crate provides the outbound dyndns2 client for the update broker.
//
// ## Protocol
//
// One authenticated GET per push:
//
// ```http
// GET <target url>?hostname=<record fqdn>&myip=<effective address>
// Authorization: Basic <username:password>
// ```
//
// The provider answers with a short plain-text token. Status 200 with a
// body starting with `good` or `nochg` is success; everything else
// (`badauth`, `nohost`, `abuse`, `911`, other statuses, network errors,
// timeouts) is a failure.
//
// ## Architectural Constraints
//
// ### Trust Level: Untrusted (update client)
//
// - One HTTP request per push, bounded by a timeout (30 seconds by default)
// - No retry: a failed push is retried by the propagation engine on the
//   next trigger
// - Never touches records or the store
// - Credentials never appear in logs or Debug output

use async_trait::async_trait;
use ddnsbroker_core::traits::{PushReply, PushRequest, UpdateClient};
use ddnsbroker_core::{Error, Result};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for one update call (30 seconds)
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// User-Agent sent with every update call
const USER_AGENT: &str = concat!("ddnsbroker/", env!("CARGO_PKG_VERSION"));

const CLIENT_NAME: &str = "dyndns2";

/// dyndns2 update client over HTTP(S)
///
/// Holds no credentials of its own; each [`PushRequest`] carries the
/// record's username and password.
#[derive(Debug, Clone)]
pub struct Dyndns2Client {
    client: reqwest::Client,
    timeout: Duration,
}

impl Dyndns2Client {
    /// Create a client with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// Create a client with the default 30 second timeout
    pub fn with_default_timeout() -> Result<Self> {
        Self::new(DEFAULT_HTTP_TIMEOUT)
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl UpdateClient for Dyndns2Client {
    /// Push one address for one record
    ///
    /// # Returns
    ///
    /// - `Ok(PushReply)`: status 200 and a `good`/`nochg` body
    /// - `Err(Error::Provider)`: anything else, with the response context
    async fn push(&self, request: &PushRequest) -> Result<PushReply> {
        let address = request.address.to_string();

        debug!(
            "dyndns2 push: {} hostname={} myip={}",
            request.url, request.hostname, address
        );

        let response = self
            .client
            .get(&request.url)
            .query(&[("hostname", request.hostname.as_str()), ("myip", address.as_str())])
            .basic_auth(&request.username, Some(&request.password))
            .send()
            .await
            .map_err(|e| {
                warn!(
                    "dyndns2 request to {} for {} failed: {}",
                    request.url, request.hostname, e
                );
                Error::provider(CLIENT_NAME, format!("HTTP request failed: {}", e))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            Error::provider(
                CLIENT_NAME,
                format!("Failed to read response from {}: {}", request.url, e),
            )
        })?;

        if status != StatusCode::OK {
            warn!(
                "dyndns2 update {} -> {} at {} returned {}: {}",
                request.hostname,
                address,
                request.url,
                status,
                body.trim()
            );
            return Err(Error::provider(
                CLIENT_NAME,
                format!("Unexpected status {}: {}", status, body.trim()),
            ));
        }

        match PushReply::from_body(&body) {
            Some(reply) => {
                debug!("dyndns2 update {} -> {}: {}", request.hostname, address, body.trim());
                Ok(reply)
            }
            None => {
                warn!(
                    "dyndns2 update {} -> {} at {} (user {}) rejected: {}",
                    request.hostname,
                    address,
                    request.url,
                    request.username,
                    body.trim()
                );
                Err(Error::provider(
                    CLIENT_NAME,
                    format!("Update rejected: {}", body.trim()),
                ))
            }
        }
    }

    fn client_name(&self) -> &'static str {
        CLIENT_NAME
    }
}
