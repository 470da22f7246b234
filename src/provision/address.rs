//! Address family classification for target hosts.
//!
//! Classification is a shape check only. IPv4 literals are four dot-separated
//! groups of one to three digits (octet values are not range checked), IPv6
//! literals are colon-terminated hex groups followed by an optional final
//! group. Anything else is [`AddressFamily::Invalid`].
//!
//! The family decides how a host is written in a `user@host` connection
//! string: IPv6 literals are wrapped in brackets, IPv4 literals never are.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static IPV4_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{1,3}(\.[0-9]{1,3}){3}$").expect("valid IPv4 pattern"));

// At least two colons: a lone ":" is not an address.
static IPV6_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9A-Fa-f]{0,4}:){2,7}[0-9A-Fa-f]{0,4}$").expect("valid IPv6 pattern")
});

/// Address family of a target string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    IPv4,
    IPv6,
    Invalid,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::IPv4 => write!(f, "IPv4"),
            AddressFamily::IPv6 => write!(f, "IPv6"),
            AddressFamily::Invalid => write!(f, "invalid"),
        }
    }
}

/// Classify `address` as an IPv4 literal, an IPv6 literal, or neither.
pub fn classify(address: &str) -> AddressFamily {
    if IPV4_SHAPE.is_match(address) {
        AddressFamily::IPv4
    } else if IPV6_SHAPE.is_match(address) {
        AddressFamily::IPv6
    } else {
        AddressFamily::Invalid
    }
}
