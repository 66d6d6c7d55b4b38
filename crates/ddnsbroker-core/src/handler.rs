//! dyndns2 update request handler
//!
//! One pass per request, each step a possible terminal response:
//!
//! 1. authenticate (`badauth`, 401)
//! 2. hostname consistency (`notfqdn` / `nohost`)
//! 3. extract candidate addresses (none parsable: `nochg`)
//! 4. apply enabled families to the host and save it once
//! 5. respond `good <ips>` or `nochg <ips>`
//!
//! Only persistence failures come back as `Err`; the HTTP layer turns
//! them into a server error.

use chrono::{DateTime, Utc};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth;
use crate::error::{Error, Result};
use crate::ip::{AddressFamily, normalize_ip};
use crate::repository::Repository;
use crate::validation::is_valid_fqdn;

/// Inbound update parameters, as taken off the wire
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    /// Raw `Authorization` header value
    pub authorization: Option<String>,
    /// `hostname` query parameter
    pub hostname: Option<String>,
    /// Every `myip` value, each possibly comma-separated
    pub myip: Vec<String>,
    /// TCP peer address of the caller
    pub remote_addr: Option<IpAddr>,
}

/// Terminal state of an update request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateResponse {
    /// Authentication failed (HTTP 401)
    BadAuth,
    /// `hostname` is not a valid FQDN
    NotFqdn,
    /// `hostname` names a different host
    NoHost,
    /// The host's address changed
    Good(String),
    /// Nothing changed, or nothing usable was supplied
    NoChange(String),
}

impl UpdateResponse {
    /// HTTP status code of the response
    pub fn status(&self) -> u16 {
        match self {
            UpdateResponse::BadAuth => 401,
            _ => 200,
        }
    }

    /// Plain-text dyndns2 response body
    pub fn body(&self) -> String {
        match self {
            UpdateResponse::BadAuth => "badauth".to_string(),
            UpdateResponse::NotFqdn => "notfqdn".to_string(),
            UpdateResponse::NoHost => "nohost".to_string(),
            UpdateResponse::Good(ips) => format!("good {ips}"),
            UpdateResponse::NoChange(ips) if ips.is_empty() => "nochg".to_string(),
            UpdateResponse::NoChange(ips) => format!("nochg {ips}"),
        }
    }
}

/// Candidate addresses extracted from a request, last valid one per family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Candidates {
    ipv4: Option<Ipv4Addr>,
    ipv6: Option<Ipv6Addr>,
}

impl Candidates {
    fn get(&self, family: AddressFamily) -> Option<IpAddr> {
        match family {
            AddressFamily::V4 => self.ipv4.map(IpAddr::V4),
            AddressFamily::V6 => self.ipv6.map(IpAddr::V6),
        }
    }

    fn is_empty(&self) -> bool {
        self.ipv4.is_none() && self.ipv6.is_none()
    }

    /// Supplied values, v4 first, comma-joined
    fn joined(&self) -> String {
        AddressFamily::ALL
            .iter()
            .filter_map(|family| self.get(*family))
            .map(|ip| ip.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn extract_candidates(request: &UpdateRequest) -> Candidates {
    let observed;
    let tokens: Vec<&str> = if request.myip.iter().all(|v| v.trim().is_empty()) {
        observed = request
            .remote_addr
            .map(|ip| normalize_ip(&ip.to_string()))
            .unwrap_or_default();
        vec![observed.as_str()]
    } else {
        request
            .myip
            .iter()
            .flat_map(|value| value.split(','))
            .collect()
    };

    let mut candidates = Candidates::default();
    for token in tokens {
        match normalize_ip(token.trim()).parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) => candidates.ipv4 = Some(v4),
            Ok(IpAddr::V6(v6)) => candidates.ipv6 = Some(v6),
            Err(_) => debug!("Ignoring unparsable myip token {:?}", token),
        }
    }
    candidates
}

/// Handles `/nic/update` requests
pub struct UpdateHandler {
    repo: Arc<Repository>,
    realm: String,
}

impl UpdateHandler {
    pub fn new(repo: Arc<Repository>, realm: impl Into<String>) -> Self {
        Self {
            repo,
            realm: realm.into(),
        }
    }

    /// `WWW-Authenticate` header value sent with `badauth`
    pub fn challenge(&self) -> String {
        format!("Basic realm=\"{}\"", self.realm)
    }

    /// Run one update request through the state machine
    pub async fn handle(&self, request: &UpdateRequest, now: DateTime<Utc>) -> Result<UpdateResponse> {
        let host = match auth::authenticate(&self.repo, request.authorization.as_deref()).await {
            Ok(host) => host,
            Err(Error::Authentication(_)) => return Ok(UpdateResponse::BadAuth),
            Err(e) => return Err(e),
        };

        if let Some(hostname) = request.hostname.as_deref().filter(|h| !h.is_empty())
            && hostname != host.fqdn
        {
            debug!("Host {} sent update for {}", host.fqdn, hostname);
            return Ok(if is_valid_fqdn(hostname) {
                UpdateResponse::NoHost
            } else {
                UpdateResponse::NotFqdn
            });
        }

        let candidates = extract_candidates(request);
        if candidates.is_empty() {
            debug!("No usable address in update for {}", host.fqdn);
            return Ok(UpdateResponse::NoChange(String::new()));
        }

        let applied = self
            .repo
            .modify_host(host.id, now, |row| {
                for family in AddressFamily::ALL {
                    if !row.family_enabled(family) {
                        continue;
                    }
                    if let Some(ip) = candidates.get(family) {
                        row.set_address(ip);
                        row.touch_update(family, now);
                    }
                }
            })
            .await;
        let (saved, changes) = match applied {
            Ok(applied) => applied,
            // Deleted after authenticating: the credentials are no longer valid
            Err(Error::NotFound(_)) => {
                debug!("Host {} vanished during update", host.fqdn);
                return Ok(UpdateResponse::BadAuth);
            }
            Err(e) => return Err(e),
        };

        let ips = candidates.joined();
        if changes.address_changed() {
            info!("Update for {}: good {}", saved.fqdn, ips);
            Ok(UpdateResponse::Good(ips))
        } else {
            debug!("Update for {}: nochg {}", saved.fqdn, ips);
            Ok(UpdateResponse::NoChange(ips))
        }
    }
}
