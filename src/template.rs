//! Name templates and IP network validation.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{Result, WfaError};

/// `%(name)s` or a bare `%s`.
static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%\((\w+)\)s|%s").expect("Invalid placeholder regex"));

/// Fill a template's placeholders.
///
/// `%s` takes `positional`; `%(name)s` takes the matching entry of `named`.
/// A template without placeholders is returned unchanged.
pub fn render(template: &str, positional: Option<&str>, named: &[(&str, &str)]) -> Result<String> {
    let mut missing: Option<String> = None;

    let rendered = PLACEHOLDER_REGEX.replace_all(template, |caps: &Captures<'_>| {
        let value = match caps.get(1) {
            Some(name) => named
                .iter()
                .find(|(key, _)| *key == name.as_str())
                .map(|(_, value)| *value),
            None => positional,
        };
        match value {
            Some(value) => value.to_string(),
            None => {
                missing.get_or_insert_with(|| caps[0].to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(placeholder) => Err(WfaError::Configuration(format!(
            "no value for placeholder {} in template '{}'",
            placeholder, template
        ))),
        None => Ok(rendered.into_owned()),
    }
}

/// Workflow name for a series, e.g. `os_create_nfs_share_%s` -> `os_create_nfs_share_7m`.
pub fn workflow_name(template: &str, series_id: &str) -> Result<String> {
    render(template, Some(series_id), &[])
}

/// Backend object name built from an id, with `-` replaced by `_`.
///
/// ```
/// use wfa_share::template::object_name;
///
/// let name = object_name("manila_%(share_id)s", "share_id", "1234-abcd").unwrap();
/// assert_eq!(name, "manila_1234_abcd");
/// ```
pub fn object_name(template: &str, key: &str, id: &str) -> Result<String> {
    let id = id.replace('-', "_");
    render(template, None, &[(key, id.as_str())])
}

/// Whether `value` is an IP address or network (`addr`, `addr/prefix`,
/// `addr/netmask`).
pub fn is_ip_network(value: &str) -> bool {
    let (addr, prefix) = match value.trim().split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (value.trim(), None),
    };

    let addr: IpAddr = match addr.parse() {
        Ok(addr) => addr,
        Err(_) => return false,
    };

    let prefix = match prefix {
        Some(prefix) => prefix,
        None => return true,
    };

    let max_prefix = if addr.is_ipv4() { 32 } else { 128 };
    if let Ok(len) = prefix.parse::<u8>() {
        return len <= max_prefix;
    }

    // Dotted netmask form, IPv4 only.
    match (addr, prefix.parse::<Ipv4Addr>()) {
        (IpAddr::V4(_), Ok(mask)) => {
            let bits = u32::from(mask);
            bits.leading_ones() + bits.trailing_zeros() == 32
        }
        _ => false,
    }
}
