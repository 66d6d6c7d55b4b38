//! Authentication gate for inbound updates
//!
//! Inbound clients authenticate with HTTP Basic-Auth, using the host's
//! fqdn as username and its secret as password. Every way of failing
//! (missing header, wrong scheme, bad base64, unknown host, wrong secret)
//! produces the same [`Error::Authentication`], so callers cannot tell
//! whether a host exists.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::Host;
use crate::repository::Repository;
use crate::secret;

const AUTH_FAILED: &str = "invalid credentials";

/// Decoded Basic-Auth credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

/// Parse an `Authorization` header value of the form `Basic <base64>`.
///
/// The scheme is matched case-insensitively. The decoded payload is split
/// at the first `:`, so passwords may contain colons.
pub fn parse_basic_auth(header: &str) -> Option<Credentials> {
    let (scheme, payload) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(payload.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;

    Some(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Authenticate an inbound request.
///
/// # Returns
///
/// - `Ok(Host)`: the host whose fqdn and secret match
/// - `Err(Error::Authentication)`: any credential problem, always the same message
/// - any other error: the store failed
pub async fn authenticate(repo: &Repository, header: Option<&str>) -> Result<Host> {
    let Some(credentials) = header.and_then(parse_basic_auth) else {
        debug!("Rejecting update: missing or malformed Authorization header");
        return Err(Error::auth(AUTH_FAILED));
    };

    let Some(host) = repo.find_host(&credentials.username).await? else {
        // Burn a verification anyway so unknown hosts cost the same
        if let Some(dummy) = dummy_hash() {
            let _ = secret::verify_secret(&credentials.password, dummy);
        }
        debug!("Rejecting update: unknown host {}", credentials.username);
        return Err(Error::auth(AUTH_FAILED));
    };

    if !secret::verify_secret(&credentials.password, &host.secret) {
        debug!("Rejecting update: wrong secret for {}", host.fqdn);
        return Err(Error::auth(AUTH_FAILED));
    }

    Ok(host)
}

fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| secret::hash_secret("ddnsbroker-dummy").ok())
        .as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use std::sync::Arc;

    fn basic(user_pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(user_pass))
    }

    async fn repo_with_host() -> Repository {
        let repo = Repository::new(Arc::new(MemoryStore::new()));
        repo.create_host(Host::new("a.example.com", "s3cret", Utc::now()), Utc::now())
            .await
            .unwrap();
        repo
    }

    #[test]
    fn test_parse_basic_auth() {
        let creds = parse_basic_auth(&basic("a.example.com:pa:ss")).unwrap();
        assert_eq!(creds.username, "a.example.com");
        assert_eq!(creds.password, "pa:ss");

        let lower = format!("basic {}", STANDARD.encode("u:p"));
        assert!(parse_basic_auth(&lower).is_some());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_basic_auth("").is_none());
        assert!(parse_basic_auth("Bearer abc").is_none());
        assert!(parse_basic_auth("Basic !!!notbase64").is_none());
        assert!(parse_basic_auth(&basic("no-colon")).is_none());
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let repo = repo_with_host().await;
        let host = authenticate(&repo, Some(&basic("a.example.com:s3cret")))
            .await
            .unwrap();
        assert_eq!(host.fqdn, "a.example.com");
    }

    #[tokio::test]
    async fn test_failures_are_indistinguishable() {
        let repo = repo_with_host().await;

        let wrong_secret = basic("a.example.com:nope");
        let unknown_host = basic("b.example.com:s3cret");
        let cases = [
            None,
            Some("Basic"),
            Some("Digest abc"),
            Some(wrong_secret.as_str()),
            Some(unknown_host.as_str()),
        ];

        let messages: Vec<String> = {
            let mut out = Vec::new();
            for header in cases {
                let err = authenticate(&repo, header).await.unwrap_err();
                assert!(matches!(err, Error::Authentication(_)));
                out.push(err.to_string());
            }
            out
        };
        assert!(messages.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "a.example.com".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
