//! Private / loopback address detection
//!
//! Lookups for these addresses are answered locally: the provider has
//! nothing useful to say about them and they would only burn quota.
//!
//! The ranges meant are 127.0.0.0/8, 10.0.0.0/8, 192.168.0.0/16 and
//! 172.16.0.0/12, but matching is done on the literal string prefixes
//! below. That under-covers 172.16.0.0/12 (172.17-172.31 still go to the
//! provider) and IPv6 loopback, which the provider answers for itself.

const PRIVATE_PREFIXES: [&str; 4] = ["127.", "10.", "192.168.", "172.16."];

/// Whether `ip` starts with one of the private or loopback prefixes
pub fn is_private_ip(ip: &str) -> bool {
    PRIVATE_PREFIXES.iter().any(|prefix| ip.starts_with(prefix))
}
