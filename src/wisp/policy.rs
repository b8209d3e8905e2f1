//! Destination policy for tunnel streams

use anyhow::{Context, Result};
use regex::RegexSet;

use crate::config::WispSettings;

/// Tunnel policy derived from settings at startup
#[derive(Debug)]
pub struct WispPolicy {
    blacklist: RegexSet,
    /// Whether clients may open UDP streams
    pub allow_udp: bool,
    /// Per-stream flow control buffer size, in packets
    pub buffer_size: u32,
}

impl WispPolicy {
    /// Compile the policy from settings
    pub fn new(settings: &WispSettings) -> Result<Self> {
        let blacklist = RegexSet::new(&settings.hostname_blacklist)
            .context("invalid hostname blacklist pattern")?;

        Ok(Self {
            blacklist,
            allow_udp: settings.allow_udp_streams,
            buffer_size: settings.buffer_size,
        })
    }

    /// Whether a destination hostname must not be dialed
    pub fn is_blocked(&self, hostname: &str) -> bool {
        self.blacklist.is_match(hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(patterns: &[&str]) -> WispPolicy {
        let settings = WispSettings {
            allow_udp_streams: false,
            hostname_blacklist: patterns.iter().map(|s| s.to_string()).collect(),
            buffer_size: 128,
        };
        WispPolicy::new(&settings).unwrap()
    }

    #[test]
    fn test_empty_blacklist_blocks_nothing() {
        let policy = policy(&[]);
        assert!(!policy.is_blocked("example.com"));
        assert!(!policy.is_blocked("localhost"));
    }

    #[test]
    fn test_blacklist_matches_only_listed_hosts() {
        let policy = policy(&[r"example\.com"]);
        assert!(policy.is_blocked("example.com"));
        assert!(policy.is_blocked("sub.example.com"));
        assert!(!policy.is_blocked("example.org"));
        assert!(!policy.is_blocked("examplexcom"));
    }

    #[test]
    fn test_anchored_pattern() {
        let policy = policy(&[r"^10\.", r"^192\.168\."]);
        assert!(policy.is_blocked("10.0.0.1"));
        assert!(policy.is_blocked("192.168.1.1"));
        assert!(!policy.is_blocked("110.0.0.1"));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let settings = WispSettings {
            allow_udp_streams: false,
            hostname_blacklist: vec!["(unclosed".to_string()],
            buffer_size: 128,
        };
        assert!(WispPolicy::new(&settings).is_err());
    }
}
