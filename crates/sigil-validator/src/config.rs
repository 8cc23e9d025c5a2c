//! Validator configuration.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Tunables of the validation engine.
///
/// The struct derives serde so an embedding application can load it from
/// whatever configuration format it uses; all fields have working defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Overrides the wall clock for signature validity checks, formatted
    /// `YYYYMMDDHHMMSS` in UTC. Intended for replaying recorded scenarios.
    pub override_date: Option<String>,

    /// Ordered (RSA key bits, maximum NSEC3 iterations) pairs.
    ///
    /// The highest entry whose key size is at most the size of the key that
    /// signed the NSEC3 RRset is selected; NSEC3 records iterated beyond the
    /// cap degrade the answer to insecure instead of being chased.
    pub nsec3_keysize_iterations: Vec<(u16, u16)>,

    /// DS digest type identifiers in preference order.
    ///
    /// When one key tag is covered by several DS digests, only the most
    /// preferred available digest is considered. An empty list accepts any
    /// supported digest.
    pub digest_preference: Vec<u8>,

    /// When true, every DS algorithm in a DS set must be supported or the
    /// delegation is bogus; when false any single supported algorithm
    /// suffices.
    pub harden_algo_downgrade: bool,

    /// Bound on the event dependency chain (CNAME links plus zones walked
    /// while building a trust chain).
    pub max_chain_depth: u8,

    /// Bound on upstream queries spent on one user request.
    pub max_queries_per_request: u16,

    /// Capacity of the key cache.
    pub key_cache_size: usize,

    /// Lifetime of cached bad key entries. Kept short so a transient
    /// failure does not disable a zone for the full RRset TTL.
    #[serde(with = "duration_secs")]
    pub bad_key_ttl: Duration,

    /// Deadline for each upstream query.
    #[serde(with = "duration_secs")]
    pub query_timeout: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            override_date: None,
            // unbound's val-nsec3-keysize-iterations defaults.
            nsec3_keysize_iterations: vec![(1024, 150), (2048, 500), (4096, 2500)],
            digest_preference: Vec::new(),
            harden_algo_downgrade: false,
            max_chain_depth: 32,
            max_queries_per_request: 64,
            key_cache_size: 1024,
            bad_key_ttl: Duration::from_secs(60),
            query_timeout: Duration::from_secs(5),
        }
    }
}

impl ValidatorConfig {
    /// Returns the time signature validity is checked against: the
    /// configured override, or the current wall clock.
    pub fn validation_time(&self) -> u32 {
        if let Some(date) = &self.override_date {
            if let Ok(parsed) = NaiveDateTime::parse_from_str(date, "%Y%m%d%H%M%S") {
                return parsed.and_utc().timestamp() as u32;
            }
        }
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0)
    }

    /// Returns the NSEC3 iteration cap for a signing key of `key_bits`.
    ///
    /// Selects the highest table entry whose key size does not exceed
    /// `key_bits`; keys smaller than the smallest entry use the first
    /// entry's cap.
    pub fn max_nsec3_iterations(&self, key_bits: u16) -> u16 {
        let mut cap = self.nsec3_keysize_iterations.first().map_or(u16::MAX, |e| e.1);
        for &(size, iterations) in &self.nsec3_keysize_iterations {
            if size <= key_bits {
                cap = iterations;
            }
        }
        cap
    }

    /// Returns the preference rank of a DS digest type; lower is better.
    ///
    /// Digest types absent from the preference list rank after all listed
    /// ones; with an empty list every digest ranks equally.
    pub fn digest_rank(&self, digest_type: u8) -> usize {
        self.digest_preference
            .iter()
            .position(|&d| d == digest_type)
            .unwrap_or(self.digest_preference.len())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_date_parses() {
        let config = ValidatorConfig {
            override_date: Some("20120820102025".into()),
            ..Default::default()
        };
        // 2012-08-20 10:20:25 UTC
        assert_eq!(config.validation_time(), 1345458025);
    }

    #[test]
    fn bad_override_falls_back_to_clock() {
        let config = ValidatorConfig {
            override_date: Some("not-a-date".into()),
            ..Default::default()
        };
        // The wall clock is well past 2020.
        assert!(config.validation_time() > 1577836800);
    }

    #[test]
    fn nsec3_iteration_table() {
        let config = ValidatorConfig::default();
        assert_eq!(config.max_nsec3_iterations(1024), 150);
        assert_eq!(config.max_nsec3_iterations(2048), 500);
        assert_eq!(config.max_nsec3_iterations(3000), 500);
        assert_eq!(config.max_nsec3_iterations(4096), 2500);
        // Smaller than the smallest entry: first entry's cap applies.
        assert_eq!(config.max_nsec3_iterations(256), 150);
    }

    #[test]
    fn digest_ranking() {
        let config = ValidatorConfig {
            digest_preference: vec![4, 2],
            ..Default::default()
        };
        assert!(config.digest_rank(4) < config.digest_rank(2));
        assert!(config.digest_rank(2) < config.digest_rank(1));

        let unranked = ValidatorConfig::default();
        assert_eq!(unranked.digest_rank(1), unranked.digest_rank(2));
    }
}
