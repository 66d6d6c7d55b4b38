//! Change detection between an entity and its last committed row.
//!
//! The repository reads the committed row, calls one of the `detect_*`
//! functions on the edited entity, and writes the result, all under the
//! entity's lock. The functions stamp `last_*_change` and re-hash a changed
//! host secret in place.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{Host, Record};
use crate::secret;

/// What a host save changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostChanges {
    pub ipv4_changed: bool,
    pub ipv6_changed: bool,
    pub secret_rehashed: bool,
}

impl HostChanges {
    /// Whether any stored address changed; this is what triggers propagation
    pub fn address_changed(&self) -> bool {
        self.ipv4_changed || self.ipv6_changed
    }
}

/// What a record save changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordChanges {
    pub ipv4_changed: bool,
    pub ipv6_changed: bool,
}

impl RecordChanges {
    pub fn any(&self) -> bool {
        self.ipv4_changed || self.ipv6_changed
    }
}

/// Compare `current` against the committed row and prepare it for writing.
///
/// - A non-empty address that differs from the committed one stamps
///   `last_ipv{4,6}_change = now`. Clearing an address is not a change.
/// - A secret that differs from the committed hash is hashed. Submitting the
///   committed hash again leaves it untouched. New hosts always hash.
pub fn detect_host_changes(
    committed: Option<&Host>,
    current: &mut Host,
    now: DateTime<Utc>,
) -> Result<HostChanges> {
    let mut changes = HostChanges::default();

    let (old_v4, old_v6, old_secret) = match committed {
        Some(row) => (row.ipv4, row.ipv6, Some(row.secret.as_str())),
        None => (None, None, None),
    };

    if current.ipv4.is_some() && current.ipv4 != old_v4 {
        current.last_ipv4_change = Some(now);
        changes.ipv4_changed = true;
    }
    if current.ipv6.is_some() && current.ipv6 != old_v6 {
        current.last_ipv6_change = Some(now);
        changes.ipv6_changed = true;
    }

    if old_secret != Some(current.secret.as_str()) {
        current.secret = secret::hash_secret(&current.secret)?;
        changes.secret_rehashed = true;
    }

    Ok(changes)
}

/// Compare a recomposed record against its committed row.
///
/// Any difference in an effective address, including to or from "absent",
/// stamps `last_ipv{4,6}_change = now`.
pub fn detect_record_changes(
    committed: Option<&Record>,
    current: &mut Record,
    now: DateTime<Utc>,
) -> RecordChanges {
    let (old_v4, old_v6) = match committed {
        Some(row) => (row.effective_ipv4(), row.effective_ipv6()),
        None => (None, None),
    };

    let changes = RecordChanges {
        ipv4_changed: current.effective_ipv4() != old_v4,
        ipv6_changed: current.effective_ipv6() != old_v6,
    };

    if changes.ipv4_changed {
        current.last_ipv4_change = Some(now);
    }
    if changes.ipv6_changed {
        current.last_ipv6_change = Some(now);
    }

    changes
}
