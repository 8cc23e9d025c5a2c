//! Trust-chain construction: from the deepest cached verdict (or a trust
//! anchor) down to the zone that signed a response.

use crate::crypto;
use crate::engine::{Session, Upstream};
use crate::keycache::KeyEntry;
use crate::status::{Reason, SecMessage, SecurityStatus};
use crate::validate::collect_verified_denials;
use crate::verify;
use crate::{config::ValidatorConfig, nsec, nsec3};
use sigil_proto::rdata::{DNSKEY, DS, RData};
use sigil_proto::{Name, RecordClass, RecordType, Rrset};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, trace};

impl<U: Upstream + ?Sized> Session<'_, U> {
    /// Walks the trust chain until a verdict for `target` is available.
    ///
    /// Starting from the deepest cached entry covering `target` (priming
    /// from a trust anchor when the cache is cold), each missing link is
    /// established with a DS query and, when the DS set is usable, a
    /// DNSKEY query for the next zone down. Null and bad entries are
    /// verdicts in their own right and end the walk early.
    pub(crate) async fn ensure_chain(&mut self, target: &Name) -> Result<KeyEntry, Reason> {
        let mut entry = match self.validator.cache.find_closest(target) {
            Some(entry) => entry,
            None => self.prime_anchor(target).await?,
        };

        loop {
            if entry.is_null() || entry.is_bad() || entry.zone() == target {
                return Ok(entry);
            }
            self.descend()?;

            // One label further down towards the target.
            let child = target
                .ancestor_at(entry.zone().non_root_labels() + 1)
                .ok_or(Reason::Malformed)?;
            trace!(parent = %entry.zone(), child = %child, "walking down");
            entry = self.step_down(&entry, &child).await?;
        }
    }

    /// Primes the cache from the deepest trust anchor covering `target`
    /// by fetching and verifying the anchored zone's DNSKEY RRset.
    async fn prime_anchor(&mut self, target: &Name) -> Result<KeyEntry, Reason> {
        let Some((zone, anchors)) = self.validator.anchors.find_closest(target) else {
            return Err(Reason::NoTrustAnchor);
        };
        let usable: Vec<_> = anchors.iter().filter(|a| a.is_usable()).collect();
        if usable.is_empty() {
            debug!(zone = %zone, "no usable trust anchor");
            return Err(Reason::NoTrustAnchor);
        }

        let lock = self.validator.cache.fetch_lock(&zone, RecordType::DNSKEY);
        let _guard = lock.lock().await;
        if let Some(entry) = self.validator.cache.get(&zone) {
            return Ok(entry);
        }

        self.descend()?;
        let response = self.fetch(&zone, RecordType::DNSKEY).await?;
        let Some(keys) = answer_rrset(&response, &zone, RecordType::DNSKEY) else {
            debug!(zone = %zone, "anchored zone returned no DNSKEY RRset");
            return Ok(self.cache_bad(zone));
        };

        for anchor in usable {
            for key in dnskeys(&keys) {
                if anchor.matches_dnskey(key)
                    && verify_with_key(&keys, key, self.now).is_ok()
                {
                    debug!(zone = %zone, key_tag = key.key_tag(), "trust anchor primed");
                    let entry = KeyEntry::trusted(keys.clone(), entry_ttl(&keys, self.now));
                    self.validator.cache.insert(entry.clone());
                    return Ok(entry);
                }
            }
        }

        debug!(zone = %zone, "DNSKEY RRset did not verify against any trust anchor");
        Ok(self.cache_bad(zone))
    }

    /// Establishes the verdict for `child`, one label below the trusted
    /// `parent` entry, via DS and (if the DS set is usable) DNSKEY.
    async fn step_down(&mut self, parent: &KeyEntry, child: &Name) -> Result<KeyEntry, Reason> {
        let parent_keys = parent.keys().ok_or(Reason::BadKeyCached)?;

        let lock = self.validator.cache.fetch_lock(child, RecordType::DS);
        let _guard = lock.lock().await;
        if let Some(entry) = self.validator.cache.get(child) {
            return Ok(entry);
        }

        let mut ds_response = self.fetch(child, RecordType::DS).await?;
        let entry = self
            .assess_ds_response(parent_keys, child, &mut ds_response)
            .await?;
        self.validator.cache.insert(entry.clone());
        Ok(entry)
    }

    /// Turns a DS response into a key entry for `child`.
    async fn assess_ds_response(
        &mut self,
        parent_keys: &Rrset,
        child: &Name,
        response: &mut SecMessage,
    ) -> Result<KeyEntry, Reason> {
        // Authenticated DS RRset present.
        if let Some(ds_rrset) = answer_rrset(response, child, RecordType::DS) {
            if let Err(reason) = verify::verify_rrset(&ds_rrset, parent_keys, self.now) {
                debug!(child = %child, %reason, "DS RRset failed verification");
                return Ok(KeyEntry::bad(
                    child.clone(),
                    ds_rrset.class(),
                    self.validator.config.bad_key_ttl,
                ));
            }

            let config = &self.validator.config;
            if config.harden_algo_downgrade
                && dss(&ds_rrset).any(|ds| !crypto::algorithm_supported(ds.algorithm))
            {
                debug!(child = %child, "unsupported DS algorithm with downgrade hardening");
                return Ok(KeyEntry::bad(child.clone(), ds_rrset.class(), config.bad_key_ttl));
            }

            if !dss(&ds_rrset).any(|ds| {
                crypto::algorithm_supported(ds.algorithm)
                    && crypto::digest_supported(ds.digest_type)
            }) {
                // No DS this build can use: a secure end to the island of
                // trust, everything below is insecure.
                debug!(child = %child, "no supported DS digest/algorithm pair");
                return Ok(KeyEntry::null(
                    child.clone(),
                    ds_rrset.class(),
                    entry_ttl(&ds_rrset, self.now),
                ));
            }

            let key_lock = self.validator.cache.fetch_lock(child, RecordType::DNSKEY);
            let _key_guard = key_lock.lock().await;
            self.descend()?;
            let key_response = self.fetch(child, RecordType::DNSKEY).await?;
            let Some(keys) = answer_rrset(&key_response, child, RecordType::DNSKEY) else {
                debug!(child = %child, "no DNSKEY RRset for delegated zone");
                return Ok(KeyEntry::bad(
                    child.clone(),
                    ds_rrset.class(),
                    self.validator.config.bad_key_ttl,
                ));
            };

            return Ok(verify_new_dnskeys(
                &keys,
                &ds_rrset,
                &self.validator.config,
                self.now,
            ));
        }

        // No DS in the answer: the denial must be authenticated.
        let (nsecs, nsec3s, zone) =
            collect_verified_denials(response, parent_keys, self.now);

        // NSEC proofs.
        for (owner, nsec, ttl) in &nsecs {
            if owner == child {
                match nsec::proves_no_ds(nsec) {
                    SecurityStatus::Secure => {
                        return Ok(KeyEntry::null(child.clone(), RecordClass::IN, *ttl));
                    }
                    SecurityStatus::Bogus => {
                        debug!(child = %child, "NSEC contradicts the DS denial");
                        return Ok(self.bad_entry(child));
                    }
                    _ => {}
                }
            }
            if nsec::proves_nodata(owner, nsec, child, RecordType::DS) {
                return Ok(KeyEntry::null(child.clone(), RecordClass::IN, *ttl));
            }
            // An NXDOMAIN for the child name also denies its DS.
            if nsec::proves_name_error(owner, nsec, child, &zone)
                && nsecs
                    .iter()
                    .any(|(o, n, _)| nsec::proves_no_wildcard(o, n, child, &zone))
            {
                return Ok(KeyEntry::null(child.clone(), RecordClass::IN, *ttl));
            }
        }

        // NSEC3 proofs.
        let pairs: Vec<(&Name, &sigil_proto::rdata::NSEC3)> =
            nsec3s.iter().map(|(o, n, _)| (o, n)).collect();
        if let Some(set) = nsec3::Nsec3Set::new(&pairs, &zone) {
            let ttl = nsec3s
                .iter()
                .map(|(_, _, ttl)| *ttl)
                .min()
                .unwrap_or(self.validator.config.bad_key_ttl);

            let cap = self
                .validator
                .config
                .max_nsec3_iterations(zone_key_bits(parent_keys));
            if set.iterations() > cap {
                debug!(child = %child, iterations = set.iterations(), cap, "NSEC3 iterations above cap");
                return Ok(KeyEntry::null(child.clone(), RecordClass::IN, ttl));
            }

            match set.proves_no_ds(child) {
                SecurityStatus::Secure | SecurityStatus::Insecure => {
                    return Ok(KeyEntry::null(child.clone(), RecordClass::IN, ttl));
                }
                _ => {
                    if set.proves_nodata(child, RecordType::DS) {
                        return Ok(KeyEntry::null(child.clone(), RecordClass::IN, ttl));
                    }
                }
            }
        }

        debug!(child = %child, "DS existence neither answered nor denied");
        Ok(self.bad_entry(child))
    }

    fn cache_bad(&self, zone: Name) -> KeyEntry {
        let entry = KeyEntry::bad(zone, RecordClass::IN, self.validator.config.bad_key_ttl);
        self.validator.cache.insert(entry.clone());
        entry
    }

    fn bad_entry(&self, zone: &Name) -> KeyEntry {
        KeyEntry::bad(
            zone.clone(),
            RecordClass::IN,
            self.validator.config.bad_key_ttl,
        )
    }
}

/// Matches a trusted DS RRset against a fresh DNSKEY RRset and verifies
/// the keys (the `verifyNewDNSKEYs` step of the walk).
///
/// Per DS record (after digest-preference selection), DNSKEYs matching on
/// key tag and algorithm are digested and compared; on a byte-equal match
/// the DNSKEY RRset must verify with exactly that key. The result is a
/// trusted entry on success, a null entry when no DS was usable at all,
/// and a bad entry otherwise.
pub(crate) fn verify_new_dnskeys(
    keys: &Rrset,
    ds_rrset: &Rrset,
    config: &ValidatorConfig,
    now: u32,
) -> KeyEntry {
    if keys.owner() != ds_rrset.owner() {
        debug!(keys = %keys.owner(), ds = %ds_rrset.owner(), "DNSKEY and DS owner mismatch");
        return KeyEntry::bad(ds_rrset.owner().clone(), ds_rrset.class(), config.bad_key_ttl);
    }

    if config.harden_algo_downgrade
        && dss(ds_rrset).any(|ds| !crypto::algorithm_supported(ds.algorithm))
    {
        return KeyEntry::bad(ds_rrset.owner().clone(), ds_rrset.class(), config.bad_key_ttl);
    }

    let mut has_useful_ds = false;

    for ds in select_ds(ds_rrset, config) {
        if !crypto::algorithm_supported(ds.algorithm) || !crypto::digest_supported(ds.digest_type)
        {
            continue;
        }
        has_useful_ds = true;

        for key in dnskeys(keys) {
            if key.key_tag() != ds.key_tag || key.algorithm != ds.algorithm {
                continue;
            }
            if !crypto::ds_matches_key(keys.owner(), ds, key) {
                continue;
            }
            if verify_with_key(keys, key, now).is_ok() {
                trace!(zone = %keys.owner(), key_tag = ds.key_tag, "DS matched and DNSKEY RRset verified");
                return KeyEntry::trusted(keys.clone(), entry_ttl(keys, now));
            }
            // Try the next candidate key.
        }
    }

    if !has_useful_ds {
        debug!(zone = %ds_rrset.owner(), "no usable DS records; treating delegation as insecure");
        return KeyEntry::null(
            ds_rrset.owner().clone(),
            ds_rrset.class(),
            entry_ttl(ds_rrset, now),
        );
    }

    debug!(zone = %ds_rrset.owner(), "no usable DS matched a verifiable DNSKEY");
    KeyEntry::bad(ds_rrset.owner().clone(), ds_rrset.class(), config.bad_key_ttl)
}

/// Applies the DS digest preference: for each (key tag, algorithm) pair
/// only the most preferred supported digest type survives.
fn select_ds<'a>(ds_rrset: &'a Rrset, config: &ValidatorConfig) -> Vec<&'a DS> {
    let mut best: HashMap<(u16, u8), usize> = HashMap::new();
    for ds in dss(ds_rrset) {
        if !crypto::digest_supported(ds.digest_type) {
            continue;
        }
        let rank = config.digest_rank(ds.digest_type);
        best.entry((ds.key_tag, ds.algorithm))
            .and_modify(|r| *r = (*r).min(rank))
            .or_insert(rank);
    }

    dss(ds_rrset)
        .filter(|ds| {
            crypto::digest_supported(ds.digest_type)
                && best
                    .get(&(ds.key_tag, ds.algorithm))
                    .is_some_and(|&r| r == config.digest_rank(ds.digest_type))
        })
        .collect()
}

/// Verifies an RRset against a single specific DNSKEY.
pub(crate) fn verify_with_key(rrset: &Rrset, key: &DNSKEY, now: u32) -> Result<(), Reason> {
    let mut single = Rrset::new(rrset.owner().clone(), rrset.class(), RecordType::DNSKEY);
    single
        .push(rrset.ttl(), RData::DNSKEY(key.clone()))
        .map_err(|_| Reason::Malformed)?;
    verify::verify_rrset(rrset, &single, now)
}

/// A key entry lives no longer than its RRset TTL or the earliest
/// signature expiration, whichever comes first.
pub(crate) fn entry_ttl(rrset: &Rrset, now: u32) -> Duration {
    let mut secs = u64::from(rrset.ttl());
    for sig in rrset.sigs() {
        let remaining = sig.expiration.wrapping_sub(now) as i32;
        secs = secs.min(remaining.max(0) as u64);
    }
    Duration::from_secs(secs)
}

/// The size in bits of the strongest zone key, for the NSEC3 iteration
/// policy.
pub(crate) fn zone_key_bits(keys: &Rrset) -> u16 {
    dnskeys(keys)
        .filter_map(crypto::key_bits)
        .max()
        .unwrap_or(0)
}

/// Iterates the DNSKEY payloads of an RRset.
pub(crate) fn dnskeys(rrset: &Rrset) -> impl Iterator<Item = &DNSKEY> {
    rrset.rdatas().iter().filter_map(|rdata| match rdata {
        RData::DNSKEY(key) => Some(key),
        _ => None,
    })
}

/// Iterates the DS payloads of an RRset.
pub(crate) fn dss(rrset: &Rrset) -> impl Iterator<Item = &DS> {
    rrset.rdatas().iter().filter_map(|rdata| match rdata {
        RData::DS(ds) => Some(ds),
        _ => None,
    })
}

/// Finds the answer RRset with the given owner and type, cloned out of
/// the response.
fn answer_rrset(response: &SecMessage, owner: &Name, rtype: RecordType) -> Option<Rrset> {
    response
        .answer()
        .iter()
        .map(|sec| sec.rrset())
        .find(|rrset| rrset.owner() == owner && rrset.rtype() == rtype)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use sigil_proto::rdata::RRSIG;
    use std::str::FromStr;

    const NOW: u32 = 1_700_000_000;

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    struct Zone {
        signing: SigningKey,
        dnskey: DNSKEY,
        apex: Name,
    }

    impl Zone {
        fn new(apex: &str, seed: u8) -> Self {
            let signing = SigningKey::from_bytes(&[seed; 32]);
            let dnskey = DNSKEY::new(257, 15, signing.verifying_key().to_bytes().to_vec());
            Self {
                signing,
                dnskey,
                apex: name(apex),
            }
        }

        fn keyset(&self) -> Rrset {
            let mut keys = Rrset::with_rdata(
                self.apex.clone(),
                RecordType::DNSKEY,
                3600,
                RData::DNSKEY(self.dnskey.clone()),
            );
            self.sign(&mut keys);
            keys
        }

        fn ds_rrset(&self, parent: &Zone) -> Rrset {
            let digest = crypto::ds_digest(&self.apex, &self.dnskey, 2).unwrap();
            let ds = DS::new(self.dnskey.key_tag(), 15, 2, digest);
            let mut rrset =
                Rrset::with_rdata(self.apex.clone(), RecordType::DS, 3600, RData::DS(ds));
            parent.sign(&mut rrset);
            rrset
        }

        fn sign(&self, rrset: &mut Rrset) {
            let mut sig = RRSIG {
                type_covered: rrset.rtype(),
                algorithm: 15,
                labels: rrset.owner().non_root_labels() as u8,
                original_ttl: rrset.ttl(),
                expiration: NOW + 3600,
                inception: NOW - 3600,
                key_tag: self.dnskey.key_tag(),
                signer: self.apex.clone(),
                signature: Vec::new(),
            };
            sig.signature = self
                .signing
                .sign(&verify::signed_data(rrset, &sig))
                .to_bytes()
                .to_vec();
            rrset.push_sig(sig).unwrap();
        }
    }

    #[test]
    fn matching_ds_yields_trusted_entry() {
        let parent = Zone::new("com", 1);
        let child = Zone::new("example.com", 2);

        let keys = child.keyset();
        let ds = child.ds_rrset(&parent);

        let entry = verify_new_dnskeys(&keys, &ds, &ValidatorConfig::default(), NOW);
        assert!(entry.is_trusted());
        assert_eq!(entry.zone(), &name("example.com"));
    }

    #[test]
    fn unsupported_algorithms_yield_null_entry() {
        let parent = Zone::new("com", 1);
        let child = Zone::new("example.net", 2);

        let keys = child.keyset();
        // A DS set referencing only algorithm 99.
        let ds = DS::new(child.dnskey.key_tag(), 99, 2, vec![0; 32]);
        let mut ds_rrset =
            Rrset::with_rdata(child.apex.clone(), RecordType::DS, 3600, RData::DS(ds));
        parent.sign(&mut ds_rrset);

        let entry = verify_new_dnskeys(&keys, &ds_rrset, &ValidatorConfig::default(), NOW);
        assert!(entry.is_null());
    }

    #[test]
    fn tampered_ds_yields_bad_entry() {
        let parent = Zone::new("com", 1);
        let child = Zone::new("example.com", 2);

        let keys = child.keyset();
        let digest = vec![0xAB; 32]; // does not match the key
        let ds = DS::new(child.dnskey.key_tag(), 15, 2, digest);
        let mut ds_rrset =
            Rrset::with_rdata(child.apex.clone(), RecordType::DS, 3600, RData::DS(ds));
        parent.sign(&mut ds_rrset);

        let entry = verify_new_dnskeys(&keys, &ds_rrset, &ValidatorConfig::default(), NOW);
        assert!(entry.is_bad());
    }

    #[test]
    fn harden_algo_downgrade_rejects_mixed_sets() {
        let parent = Zone::new("com", 1);
        let child = Zone::new("example.com", 2);

        let keys = child.keyset();
        let good = {
            let digest = crypto::ds_digest(&child.apex, &child.dnskey, 2).unwrap();
            DS::new(child.dnskey.key_tag(), 15, 2, digest)
        };
        let exotic = DS::new(1234, 99, 2, vec![0; 32]);

        let mut ds_rrset =
            Rrset::with_rdata(child.apex.clone(), RecordType::DS, 3600, RData::DS(good));
        ds_rrset.push(3600, RData::DS(exotic)).unwrap();
        parent.sign(&mut ds_rrset);

        // Lenient mode: the supported DS carries the chain.
        let lenient = verify_new_dnskeys(&keys, &ds_rrset, &ValidatorConfig::default(), NOW);
        assert!(lenient.is_trusted());

        // Hardened mode: the unsupported algorithm poisons the set.
        let hardened_config = ValidatorConfig {
            harden_algo_downgrade: true,
            ..Default::default()
        };
        let hardened = verify_new_dnskeys(&keys, &ds_rrset, &hardened_config, NOW);
        assert!(hardened.is_bad());
    }

    #[test]
    fn digest_preference_picks_one() {
        let config = ValidatorConfig {
            digest_preference: vec![4, 2],
            ..Default::default()
        };
        let zone = Zone::new("example.com", 3);

        let sha256 = {
            let digest = crypto::ds_digest(&zone.apex, &zone.dnskey, 2).unwrap();
            DS::new(zone.dnskey.key_tag(), 15, 2, digest)
        };
        let sha384 = {
            let digest = crypto::ds_digest(&zone.apex, &zone.dnskey, 4).unwrap();
            DS::new(zone.dnskey.key_tag(), 15, 4, digest)
        };

        let mut ds_rrset = Rrset::with_rdata(
            zone.apex.clone(),
            RecordType::DS,
            3600,
            RData::DS(sha256),
        );
        ds_rrset.push(3600, RData::DS(sha384)).unwrap();

        let selected = select_ds(&ds_rrset, &config);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].digest_type, 4);

        // Without a preference both survive.
        let all = select_ds(&ds_rrset, &ValidatorConfig::default());
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn entry_ttl_respects_signature_expiry() {
        let zone = Zone::new("example.com", 4);
        let keys = zone.keyset();

        // Signature expires in 3600s, TTL is 3600s.
        assert_eq!(entry_ttl(&keys, NOW), Duration::from_secs(3600));
        // Closer to expiry the signature bounds the lifetime.
        assert_eq!(entry_ttl(&keys, NOW + 3000), Duration::from_secs(600));
        // Past expiry nothing remains.
        assert_eq!(entry_ttl(&keys, NOW + 7200), Duration::ZERO);
    }
}
