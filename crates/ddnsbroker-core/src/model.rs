//! Persisted entities: hosts, update targets and records
//!
//! A [`Host`] is the dynamically-addressed machine that reports its address.
//! Each [`Record`] belongs to one host and derives its own effective address
//! from the host's address, then pushes it to an [`UpdateTarget`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::Result;
use crate::ip::{AddressFamily, compose_ipv4, compose_ipv6};
use crate::validation;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

entity_id!(
    /// Store-assigned host identity
    HostId
);
entity_id!(
    /// Store-assigned update target identity
    TargetId
);
entity_id!(
    /// Store-assigned record identity
    RecordId
);

/// A dynamically-addressed host.
///
/// `fqdn` doubles as the Basic-Auth username of inbound updates. `secret`
/// holds an Argon2 hash once persisted; assigning a raw value and saving
/// hashes it.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub fqdn: String,
    pub secret: String,
    pub ipv4_enabled: bool,
    pub ipv6_enabled: bool,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    /// Last accepted inbound update per family
    pub last_ipv4_update: Option<DateTime<Utc>>,
    pub last_ipv6_update: Option<DateTime<Utc>>,
    /// Last time the stored address actually changed
    pub last_ipv4_change: Option<DateTime<Utc>>,
    pub last_ipv6_change: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
}

impl Host {
    /// New host with both families enabled and no addresses
    pub fn new(fqdn: impl Into<String>, secret: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            id: HostId::default(),
            fqdn: fqdn.into(),
            secret: secret.into(),
            ipv4_enabled: true,
            ipv6_enabled: true,
            ipv4: None,
            ipv6: None,
            last_ipv4_update: None,
            last_ipv6_update: None,
            last_ipv4_change: None,
            last_ipv6_change: None,
            created,
        }
    }

    pub fn family_enabled(&self, family: AddressFamily) -> bool {
        match family {
            AddressFamily::V4 => self.ipv4_enabled,
            AddressFamily::V6 => self.ipv6_enabled,
        }
    }

    pub fn address(&self, family: AddressFamily) -> Option<IpAddr> {
        match family {
            AddressFamily::V4 => self.ipv4.map(IpAddr::V4),
            AddressFamily::V6 => self.ipv6.map(IpAddr::V6),
        }
    }

    /// Store an address in the slot of its family
    pub fn set_address(&mut self, ip: IpAddr) {
        match ip {
            IpAddr::V4(v4) => self.ipv4 = Some(v4),
            IpAddr::V6(v6) => self.ipv6 = Some(v6),
        }
    }

    /// Record that an inbound update for `family` was accepted at `now`
    pub fn touch_update(&mut self, family: AddressFamily, now: DateTime<Utc>) {
        match family {
            AddressFamily::V4 => self.last_ipv4_update = Some(now),
            AddressFamily::V6 => self.last_ipv6_update = Some(now),
        }
    }

    pub fn last_change(&self, family: AddressFamily) -> Option<DateTime<Utc>> {
        match family {
            AddressFamily::V4 => self.last_ipv4_change,
            AddressFamily::V6 => self.last_ipv6_change,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_fqdn("host fqdn", &self.fqdn)?;
        if self.secret.is_empty() {
            return Err(crate::Error::validation("host secret cannot be empty"));
        }
        Ok(())
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("id", &self.id)
            .field("fqdn", &self.fqdn)
            .field("secret", &"<REDACTED>")
            .field("ipv4_enabled", &self.ipv4_enabled)
            .field("ipv6_enabled", &self.ipv6_enabled)
            .field("ipv4", &self.ipv4)
            .field("ipv6", &self.ipv6)
            .field("last_ipv4_change", &self.last_ipv4_change)
            .field("last_ipv6_change", &self.last_ipv6_change)
            .finish()
    }
}

/// A third-party dyndns2 endpoint records push to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTarget {
    pub id: TargetId,
    /// Unique display name
    pub name: String,
    /// Update URL, e.g. "https://dyndns.example.com/nic/update"
    pub url: String,
    /// Whether the outbound Basic-Auth username is the record fqdn
    pub username_is_fqdn: bool,
}

impl UpdateTarget {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: TargetId::default(),
            name: name.into(),
            url: url.into(),
            username_is_fqdn: false,
        }
    }

    pub fn with_username_is_fqdn(mut self, username_is_fqdn: bool) -> Self {
        self.username_is_fqdn = username_is_fqdn;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_target_name(&self.name)?;
        validation::validate_target_url(&self.url)
    }
}

/// A downstream DNS record derived from a host's address.
///
/// The effective addresses are a pure function of the owning host's address
/// and this record's (netmask, host id) pairs; they are only written by
/// [`Record::recompose`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub host_id: HostId,
    /// Blank means "same as the owning host"
    pub fqdn: String,
    pub ipv4_enabled: bool,
    pub ipv6_enabled: bool,
    pub ipv4_netmask: u8,
    pub ipv4_host_id: Ipv4Addr,
    pub ipv6_netmask: u8,
    pub ipv6_host_id: Ipv6Addr,
    effective_ipv4: Option<Ipv4Addr>,
    effective_ipv6: Option<Ipv6Addr>,
    pub target_id: TargetId,
    pub username: String,
    pub password: String,
    /// Last confirmed successful push per family
    pub last_ipv4_update: Option<DateTime<Utc>>,
    pub last_ipv6_update: Option<DateTime<Utc>>,
    /// Last time the effective address changed
    pub last_ipv4_change: Option<DateTime<Utc>>,
    pub last_ipv6_change: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
}

impl Record {
    /// New record using the whole host address for both families
    pub fn new(host_id: HostId, target_id: TargetId, created: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::default(),
            host_id,
            fqdn: String::new(),
            ipv4_enabled: true,
            ipv6_enabled: true,
            ipv4_netmask: 32,
            ipv4_host_id: Ipv4Addr::UNSPECIFIED,
            ipv6_netmask: 128,
            ipv6_host_id: Ipv6Addr::UNSPECIFIED,
            effective_ipv4: None,
            effective_ipv6: None,
            target_id,
            username: String::new(),
            password: String::new(),
            last_ipv4_update: None,
            last_ipv6_update: None,
            last_ipv4_change: None,
            last_ipv6_change: None,
            created,
        }
    }

    pub fn with_fqdn(mut self, fqdn: impl Into<String>) -> Self {
        self.fqdn = fqdn.into();
        self
    }

    pub fn with_ipv4(mut self, netmask: u8, host_id: Ipv4Addr) -> Self {
        self.ipv4_netmask = netmask;
        self.ipv4_host_id = host_id;
        self
    }

    pub fn with_ipv6(mut self, netmask: u8, host_id: Ipv6Addr) -> Self {
        self.ipv6_netmask = netmask;
        self.ipv6_host_id = host_id;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn effective_ipv4(&self) -> Option<Ipv4Addr> {
        self.effective_ipv4
    }

    pub fn effective_ipv6(&self) -> Option<Ipv6Addr> {
        self.effective_ipv6
    }

    pub fn effective(&self, family: AddressFamily) -> Option<IpAddr> {
        match family {
            AddressFamily::V4 => self.effective_ipv4.map(IpAddr::V4),
            AddressFamily::V6 => self.effective_ipv6.map(IpAddr::V6),
        }
    }

    pub fn family_enabled(&self, family: AddressFamily) -> bool {
        match family {
            AddressFamily::V4 => self.ipv4_enabled,
            AddressFamily::V6 => self.ipv6_enabled,
        }
    }

    pub fn last_update(&self, family: AddressFamily) -> Option<DateTime<Utc>> {
        match family {
            AddressFamily::V4 => self.last_ipv4_update,
            AddressFamily::V6 => self.last_ipv6_update,
        }
    }

    pub fn last_change(&self, family: AddressFamily) -> Option<DateTime<Utc>> {
        match family {
            AddressFamily::V4 => self.last_ipv4_change,
            AddressFamily::V6 => self.last_ipv6_change,
        }
    }

    pub(crate) fn mark_pushed(&mut self, family: AddressFamily, now: DateTime<Utc>) {
        match family {
            AddressFamily::V4 => self.last_ipv4_update = Some(now),
            AddressFamily::V6 => self.last_ipv6_update = Some(now),
        }
    }

    /// Whether `family` has to be pushed downstream.
    ///
    /// Due when the family is enabled, an effective address exists, and
    /// either nothing was ever pushed or the address changed after the last
    /// successful push.
    pub fn push_due(&self, family: AddressFamily) -> bool {
        if !self.family_enabled(family) || self.effective(family).is_none() {
            return false;
        }
        match (self.last_update(family), self.last_change(family)) {
            (None, _) => true,
            (Some(update), Some(change)) => change > update,
            (Some(_), None) => false,
        }
    }

    /// Recompute both effective addresses from the owning host.
    ///
    /// Runs for disabled families too; the enable flags only gate pushes.
    pub(crate) fn recompose(&mut self, host: &Host) {
        self.effective_ipv4 = compose_ipv4(host.ipv4, self.ipv4_netmask, self.ipv4_host_id);
        self.effective_ipv6 = compose_ipv6(host.ipv6, self.ipv6_netmask, self.ipv6_host_id);
    }

    /// Fill derived defaults: blank fqdn takes the host's, and targets that
    /// authenticate by fqdn get the fqdn as username.
    pub(crate) fn apply_defaults(&mut self, host: &Host, target: &UpdateTarget) {
        if self.fqdn.trim().is_empty() {
            self.fqdn = host.fqdn.clone();
        }
        if target.username_is_fqdn {
            self.username = self.fqdn.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_fqdn("record fqdn", &self.fqdn)?;
        validation::validate_netmask(AddressFamily::V4, self.ipv4_netmask)?;
        validation::validate_netmask(AddressFamily::V6, self.ipv6_netmask)?;
        if self.password.is_empty() {
            return Err(crate::Error::validation("record password cannot be empty"));
        }
        Ok(())
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("host_id", &self.host_id)
            .field("fqdn", &self.fqdn)
            .field("ipv4_enabled", &self.ipv4_enabled)
            .field("ipv6_enabled", &self.ipv6_enabled)
            .field("ipv4_netmask", &self.ipv4_netmask)
            .field("ipv4_host_id", &self.ipv4_host_id)
            .field("ipv6_netmask", &self.ipv6_netmask)
            .field("ipv6_host_id", &self.ipv6_host_id)
            .field("effective_ipv4", &self.effective_ipv4)
            .field("effective_ipv6", &self.effective_ipv6)
            .field("target_id", &self.target_id)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("last_ipv4_update", &self.last_ipv4_update)
            .field("last_ipv6_update", &self.last_ipv6_update)
            .field("last_ipv4_change", &self.last_ipv4_change)
            .field("last_ipv6_change", &self.last_ipv6_change)
            .finish()
    }
}
