//! NSEC3 denial-of-existence proofs (RFC 5155 Section 8).
//!
//! The provers work over the set of NSEC3 records of one response. A
//! record *matches* a name when its owner hash equals the name's hash; it
//! *covers* a name when the hash falls strictly between the owner hash and
//! the next hash, with wraparound at the end of the chain.

use crate::status::SecurityStatus;
use bytes::BytesMut;
use data_encoding::BASE32HEX_NOPAD;
use sha1::{Digest, Sha1};
use sigil_proto::rdata::NSEC3;
use sigil_proto::{Name, RecordType};
use tracing::{debug, trace};

/// Computes the NSEC3 hash of a name: iterated SHA-1 over the canonical
/// wire form and the salt (RFC 5155 Section 5).
pub fn hash_name(name: &Name, salt: &[u8], iterations: u16) -> Vec<u8> {
    let mut wire = BytesMut::new();
    name.write_canonical(&mut wire);

    let mut hash = {
        let mut h = Sha1::new();
        h.update(&wire);
        h.update(salt);
        h.finalize().to_vec()
    };

    for _ in 0..iterations {
        let mut h = Sha1::new();
        h.update(&hash);
        h.update(salt);
        hash = h.finalize().to_vec();
    }

    hash
}

/// One usable NSEC3 record: the decoded owner hash plus the RDATA.
struct Nsec3Record<'a> {
    owner_hash: Vec<u8>,
    data: &'a NSEC3,
}

/// The NSEC3 records of a response, validated for shared parameters.
pub struct Nsec3Set<'a> {
    records: Vec<Nsec3Record<'a>>,
    salt: Vec<u8>,
    iterations: u16,
    zone: Name,
}

impl<'a> Nsec3Set<'a> {
    /// Assembles a proof set from `(owner, rdata)` pairs under `zone`.
    ///
    /// Records with an unknown hash algorithm or an owner name that is not
    /// `<base32hex>.<zone>` are discarded (RFC 6840 Section 5.7). Returns
    /// `None` when nothing usable remains or the remaining records do not
    /// share one parameter set (RFC 5155 Section 8.2).
    pub fn new(records: &[(&'a Name, &'a NSEC3)], zone: &Name) -> Option<Self> {
        let mut usable = Vec::new();

        for &(owner, data) in records {
            if data.hash_algorithm != NSEC3::HASH_SHA1 {
                trace!(algorithm = data.hash_algorithm, "ignoring NSEC3 with unknown hash");
                continue;
            }
            let Some(owner_hash) = decode_owner_hash(owner, zone) else {
                trace!(owner = %owner, "ignoring NSEC3 with malformed owner");
                continue;
            };
            usable.push(Nsec3Record { owner_hash, data });
        }

        let first = usable.first()?;
        let salt = first.data.salt.clone();
        let iterations = first.data.iterations;

        if usable
            .iter()
            .any(|r| r.data.salt != salt || r.data.iterations != iterations)
        {
            debug!(zone = %zone, "NSEC3 parameter mismatch within one response");
            return None;
        }

        Some(Self {
            records: usable,
            salt,
            iterations,
            zone: zone.clone(),
        })
    }

    /// Returns the iteration count shared by the set.
    pub fn iterations(&self) -> u16 {
        self.iterations
    }

    fn hash(&self, name: &Name) -> Vec<u8> {
        hash_name(name, &self.salt, self.iterations)
    }

    fn matching(&self, hash: &[u8]) -> Option<&Nsec3Record<'a>> {
        self.records.iter().find(|r| r.owner_hash == hash)
    }

    fn covering(&self, hash: &[u8]) -> Option<&Nsec3Record<'a>> {
        self.records.iter().find(|r| {
            let owner = r.owner_hash.as_slice();
            let next = r.data.next_hashed.as_slice();
            if owner < next {
                owner < hash && hash < next
            } else {
                // Last record of the chain: the interval wraps.
                owner < hash || hash < next
            }
        })
    }

    /// Finds the closest encloser of `qname`: the longest ancestor whose
    /// hash matches an NSEC3 owner. Returns the encloser and the next
    /// closer name (`None` when the encloser is `qname` itself).
    pub fn closest_encloser(&self, qname: &Name) -> Option<(Name, Option<Name>)> {
        if !qname.is_subdomain_of(&self.zone) {
            return None;
        }

        let mut candidate = qname.clone();
        let mut next_closer: Option<Name> = None;

        loop {
            if self.matching(&self.hash(&candidate)).is_some() {
                return Some((candidate, next_closer));
            }
            if candidate == self.zone {
                return None;
            }
            next_closer = Some(candidate.clone());
            candidate = candidate.parent()?;
        }
    }

    /// Proves NXDOMAIN for `qname`: a closest-encloser proof plus a record
    /// covering the wildcard at the closest encloser (RFC 5155
    /// Section 8.4/8.5).
    pub fn proves_name_error(&self, qname: &Name) -> bool {
        if self.matching(&self.hash(qname)).is_some() {
            // The name exists; NXDOMAIN is contradicted.
            return false;
        }

        let Some((ce, Some(next_closer))) = self.closest_encloser(qname) else {
            return false;
        };
        if self.covering(&self.hash(&next_closer)).is_none() {
            return false;
        }

        let Ok(wildcard) = ce.prepend_label("*") else {
            return false;
        };
        self.covering(&self.hash(&wildcard)).is_some()
    }

    /// Proves NODATA for `(qname, qtype)`: a matching record whose bitmap
    /// lacks the type and CNAME, or a wildcard NODATA via the closest
    /// encloser (RFC 5155 Section 8.5–8.7).
    pub fn proves_nodata(&self, qname: &Name, qtype: RecordType) -> bool {
        if let Some(record) = self.matching(&self.hash(qname)) {
            return !record.data.types.has_type(qtype)
                && !record.data.types.has_type(RecordType::CNAME);
        }

        // Wildcard NODATA: qname does not exist but a wildcard at the
        // closest encloser does, without the queried type.
        let Some((ce, Some(next_closer))) = self.closest_encloser(qname) else {
            return false;
        };
        if self.covering(&self.hash(&next_closer)).is_none() {
            return false;
        }
        let Ok(wildcard) = ce.prepend_label("*") else {
            return false;
        };
        match self.matching(&self.hash(&wildcard)) {
            Some(record) => {
                !record.data.types.has_type(qtype)
                    && !record.data.types.has_type(RecordType::CNAME)
            }
            None => false,
        }
    }

    /// Proves that no name closer to `qname` than its closest encloser
    /// exists: the next-closer-name part of the closest-encloser proof.
    ///
    /// A wildcard-expanded positive answer needs exactly this to show the
    /// expansion was legitimate (RFC 5155 Section 8.8).
    pub fn proves_no_closer_match(&self, qname: &Name) -> bool {
        if self.matching(&self.hash(qname)).is_some() {
            return false;
        }
        match self.closest_encloser(qname) {
            Some((_, Some(next_closer))) => self.covering(&self.hash(&next_closer)).is_some(),
            _ => false,
        }
    }

    /// Returns true if the record covering `qname`'s next closer name has
    /// the opt-out flag set; such proofs leave room for an unsigned
    /// delegation and degrade the verdict to insecure.
    pub fn next_closer_opt_out(&self, qname: &Name) -> bool {
        match self.closest_encloser(qname) {
            Some((_, Some(next_closer))) => self
                .covering(&self.hash(&next_closer))
                .is_some_and(|r| r.data.is_opt_out()),
            _ => false,
        }
    }

    /// Determines what the set proves about a DS record at `qname`
    /// (RFC 5155 Section 8.9).
    ///
    /// `Secure` is a proven insecure delegation; `Insecure` covers the
    /// opt-out span case, where an unsigned delegation may exist inside
    /// the gap; `Bogus` means no proof held.
    pub fn proves_no_ds(&self, qname: &Name) -> SecurityStatus {
        if let Some(record) = self.matching(&self.hash(qname)) {
            let types = &record.data.types;
            if types.has_type(RecordType::SOA) || types.has_type(RecordType::DS) {
                return SecurityStatus::Bogus;
            }
            if !types.has_type(RecordType::NS) {
                return SecurityStatus::Insecure;
            }
            return SecurityStatus::Secure;
        }

        // No matching record: an opt-out span covering the next closer
        // name leaves the delegation unsigned but valid.
        if let Some((_, Some(next_closer))) = self.closest_encloser(qname) {
            if let Some(record) = self.covering(&self.hash(&next_closer)) {
                if record.data.is_opt_out() {
                    return SecurityStatus::Insecure;
                }
            }
        }

        SecurityStatus::Bogus
    }
}

/// Decodes the base32hex first label of an NSEC3 owner name, requiring the
/// remainder to be the zone.
fn decode_owner_hash(owner: &Name, zone: &Name) -> Option<Vec<u8>> {
    let first = owner.labels().next()?;
    if owner.parent()? != *zone {
        return None;
    }
    let upper: Vec<u8> = first.iter().map(u8::to_ascii_uppercase).collect();
    BASE32HEX_NOPAD.decode(&upper).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_proto::rdata::TypeBitmap;
    use std::str::FromStr;

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    #[test]
    fn rfc5155_hash_vector() {
        // RFC 5155 Appendix A: H(example) with salt aabbccdd, 12 extra
        // iterations is 0p9mhaveqvm6t7vbl5lop2u3t2rp3tom.
        let hash = hash_name(&name("example"), &[0xAA, 0xBB, 0xCC, 0xDD], 12);
        assert_eq!(
            BASE32HEX_NOPAD.encode(&hash).to_ascii_lowercase(),
            "0p9mhaveqvm6t7vbl5lop2u3t2rp3tom"
        );
    }

    #[test]
    fn hash_is_case_insensitive() {
        let a = hash_name(&name("Example.COM"), b"", 0);
        let b = hash_name(&name("example.com"), b"", 0);
        assert_eq!(a, b);
    }

    /// Builds an NSEC3 zone fixture: each entry is an existing name, and
    /// the chain links the sorted hashes circularly.
    struct Fixture {
        zone: Name,
        owners: Vec<Name>,
        rdatas: Vec<NSEC3>,
    }

    impl Fixture {
        fn new(zone: &str, names: &[&str], types: &[&[RecordType]], opt_out: bool) -> Self {
            let zone = name(zone);
            let mut hashed: Vec<(Vec<u8>, &[RecordType])> = names
                .iter()
                .zip(types)
                .map(|(n, t)| (hash_name(&name(n), b"", 1), *t))
                .collect();
            hashed.sort_by(|a, b| a.0.cmp(&b.0));

            let mut owners = Vec::new();
            let mut rdatas = Vec::new();
            for (i, (hash, types)) in hashed.iter().enumerate() {
                let next = &hashed[(i + 1) % hashed.len()].0;
                let label = BASE32HEX_NOPAD.encode(hash).to_ascii_lowercase();
                owners.push(zone.prepend_label(&label).unwrap());
                rdatas.push(NSEC3 {
                    hash_algorithm: NSEC3::HASH_SHA1,
                    flags: if opt_out { NSEC3::FLAG_OPT_OUT } else { 0 },
                    iterations: 1,
                    salt: Vec::new(),
                    next_hashed: next.clone(),
                    types: TypeBitmap::from_types(types),
                });
            }

            Self {
                zone,
                owners,
                rdatas,
            }
        }

        fn set(&self) -> Nsec3Set<'_> {
            let pairs: Vec<(&Name, &NSEC3)> =
                self.owners.iter().zip(self.rdatas.iter()).collect();
            Nsec3Set::new(&pairs, &self.zone).unwrap()
        }
    }

    fn fixture() -> Fixture {
        Fixture::new(
            "example.com",
            &["example.com", "www.example.com", "mail.example.com"],
            &[
                &[RecordType::SOA, RecordType::NS, RecordType::DNSKEY],
                &[RecordType::A, RecordType::TXT],
                &[RecordType::A, RecordType::MX],
            ],
            false,
        )
    }

    #[test]
    fn name_error_proof() {
        let fx = fixture();
        let set = fx.set();

        // The closest encloser of this name is the apex; the next closer
        // and the apex wildcard both fall into gaps of the 3-record chain.
        assert!(set.proves_name_error(&name("nonexistent.example.com")));

        // Existing names are not provably absent.
        assert!(!set.proves_name_error(&name("www.example.com")));
    }

    #[test]
    fn nodata_proof() {
        let fx = fixture();
        let set = fx.set();

        assert!(set.proves_nodata(&name("www.example.com"), RecordType::MX));
        assert!(!set.proves_nodata(&name("www.example.com"), RecordType::A));
        // Nonexistent name without a wildcard: no NODATA proof.
        assert!(!set.proves_nodata(&name("nonexistent.example.com"), RecordType::A));
    }

    #[test]
    fn nodata_wildcard_proof() {
        let fx = Fixture::new(
            "example.com",
            &["example.com", "*.example.com"],
            &[
                &[RecordType::SOA, RecordType::NS],
                &[RecordType::A],
            ],
            false,
        );
        let set = fx.set();

        // The wildcard exists with only an A record; an MX query at a
        // nonexistent name proves wildcard NODATA.
        assert!(set.proves_nodata(&name("missing.example.com"), RecordType::MX));
        assert!(!set.proves_nodata(&name("missing.example.com"), RecordType::A));
    }

    #[test]
    fn no_ds_matching_delegation() {
        let fx = Fixture::new(
            "example.com",
            &["example.com", "child.example.com"],
            &[
                &[RecordType::SOA, RecordType::NS],
                &[RecordType::NS], // delegation without DS
            ],
            false,
        );
        let set = fx.set();

        assert_eq!(
            set.proves_no_ds(&name("child.example.com")),
            SecurityStatus::Secure
        );
        // At the apex the SOA bit contradicts a parent-side DS denial.
        assert_eq!(
            set.proves_no_ds(&name("example.com")),
            SecurityStatus::Bogus
        );
    }

    #[test]
    fn no_ds_opt_out_is_insecure() {
        let fx = Fixture::new(
            "example.com",
            &["example.com", "zz.example.com"],
            &[
                &[RecordType::SOA, RecordType::NS],
                &[RecordType::A],
            ],
            true,
        );
        let set = fx.set();

        // An unsigned delegation hidden in an opt-out span.
        assert_eq!(
            set.proves_no_ds(&name("unsigned.example.com")),
            SecurityStatus::Insecure
        );
    }

    #[test]
    fn parameter_mismatch_rejected() {
        let zone = name("example.com");
        let hash = hash_name(&name("a.example.com"), b"", 1);
        let label = BASE32HEX_NOPAD.encode(&hash).to_ascii_lowercase();
        let owner = zone.prepend_label(&label).unwrap();

        let one = NSEC3 {
            hash_algorithm: NSEC3::HASH_SHA1,
            flags: 0,
            iterations: 1,
            salt: Vec::new(),
            next_hashed: vec![0; 20],
            types: TypeBitmap::default(),
        };
        let two = NSEC3 {
            iterations: 5,
            ..one.clone()
        };

        let pairs: Vec<(&Name, &NSEC3)> = vec![(&owner, &one), (&owner, &two)];
        assert!(Nsec3Set::new(&pairs, &zone).is_none());
    }

    #[test]
    fn foreign_owner_ignored() {
        let zone = name("example.com");
        let foreign = name("whatever.example.org");
        let rec = NSEC3 {
            hash_algorithm: NSEC3::HASH_SHA1,
            flags: 0,
            iterations: 1,
            salt: Vec::new(),
            next_hashed: vec![0; 20],
            types: TypeBitmap::default(),
        };

        let pairs: Vec<(&Name, &NSEC3)> = vec![(&foreign, &rec)];
        assert!(Nsec3Set::new(&pairs, &zone).is_none());
    }
}
