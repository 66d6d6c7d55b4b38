//! Field validation for hosts, records and update targets

use crate::error::{Error, Result};
use crate::ip::AddressFamily;

/// Maximum length of an update target name
pub const MAX_TARGET_NAME_LEN: usize = 32;

/// Check that a string is a fully-qualified domain name.
///
/// Accepts 4..=253 characters of dot-separated labels. Every label but the
/// last is 1..=63 characters of ASCII alphanumerics and hyphens, not
/// starting or ending with a hyphen. The last label is a 2..=63 letter TLD.
pub fn is_valid_fqdn(name: &str) -> bool {
    if !(4..=253).contains(&name.len()) {
        return false;
    }

    let labels: Vec<&str> = name.split('.').collect();
    let Some((tld, rest)) = labels.split_last() else {
        return false;
    };
    if rest.is_empty() {
        return false;
    }

    let tld_ok = (2..=63).contains(&tld.len()) && tld.chars().all(|c| c.is_ascii_alphabetic());
    tld_ok && rest.iter().all(|label| is_valid_label(label))
}

fn is_valid_label(label: &str) -> bool {
    (1..=63).contains(&label.len())
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !label.starts_with('-')
        && !label.ends_with('-')
}

/// Validate an FQDN field, naming the field in the error
pub fn validate_fqdn(field: &str, name: &str) -> Result<()> {
    if is_valid_fqdn(name) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "{field}: invalid FQDN '{name}': only \"a-z\", \"0-9\" and \"-\" is allowed"
        )))
    }
}

/// Validate a netmask against the width of its family
pub fn validate_netmask(family: AddressFamily, netmask: u8) -> Result<()> {
    if netmask > family.width() {
        return Err(Error::validation(format!(
            "{family} netmask {netmask} exceeds {}",
            family.width()
        )));
    }
    Ok(())
}

/// Validate an update target URL: must parse and use http or https
pub fn validate_target_url(raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| Error::validation(format!("invalid URL '{raw}': {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::validation(format!(
                "URL scheme '{other}' not allowed, use http or https"
            )));
        }
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::validation(format!("URL '{raw}' has no host")));
    }

    Ok(())
}

/// Validate an update target name
pub fn validate_target_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation("target name cannot be empty"));
    }
    if name.chars().count() > MAX_TARGET_NAME_LEN {
        return Err(Error::validation(format!(
            "target name longer than {MAX_TARGET_NAME_LEN} characters"
        )));
    }
    Ok(())
}
