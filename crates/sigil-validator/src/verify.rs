//! RRset signature verification (RFC 4034 Section 3.1.8).

use crate::crypto::{self, CryptoError};
use crate::status::Reason;
use bytes::BytesMut;
use sigil_proto::rdata::{RData, RRSIG};
use sigil_proto::{Name, Rrset};
use tracing::{debug, trace};

/// Builds the signed data for one RRSIG over an RRset: the RRSIG RDATA
/// without the signature, followed by the member records in canonical form
/// and canonical order (RFC 4034 Section 3.1.8.1).
///
/// The owner name is lowercased, the TTL is the original TTL from the
/// RRSIG, and when the RRSIG label count is lower than the owner's label
/// count the owner is replaced by the generating wildcard.
///
/// Signers build the identical byte string, which is what makes this
/// function public.
pub fn signed_data(rrset: &Rrset, sig: &RRSIG) -> Vec<u8> {
    let mut buf = BytesMut::new();
    sig.write_unsigned_to(&mut buf);

    let owner = effective_owner(rrset.owner(), sig).lowercased();

    let mut members: Vec<Vec<u8>> = rrset
        .rdatas()
        .iter()
        .map(RData::canonical_bytes)
        .collect();
    members.sort();

    for rdata in members {
        owner.write_wire(&mut buf);
        buf.extend_from_slice(&rrset.rtype().to_u16().to_be_bytes());
        buf.extend_from_slice(&rrset.class().to_u16().to_be_bytes());
        buf.extend_from_slice(&sig.original_ttl.to_be_bytes());
        buf.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        buf.extend_from_slice(&rdata);
    }

    buf.to_vec()
}

/// Returns the generating wildcard if the RRset was synthesized by
/// wildcard expansion, detected by the RRSIG label count being lower than
/// the owner's label count.
pub fn wildcard_of(rrset: &Rrset) -> Option<Name> {
    let sig = rrset.sigs().first()?;
    let diff = rrset
        .owner()
        .non_root_labels()
        .checked_sub(sig.labels as usize)?;
    if diff == 0 {
        return None;
    }
    rrset.owner().wild(diff).ok()
}

/// Verifies an RRset against a candidate DNSKEY RRset at time `now`.
///
/// Every attached RRSIG is tried; the first one that verifies wins. The
/// returned reason is the most specific failure observed across the
/// attempts.
pub fn verify_rrset(rrset: &Rrset, keys: &Rrset, now: u32) -> Result<(), Reason> {
    if rrset.sigs().is_empty() {
        return Err(Reason::MissingSignature);
    }

    let mut failure = Reason::MissingKey;

    for sig in rrset.sigs() {
        if sig.signer != *keys.owner() {
            trace!(signer = %sig.signer, keys = %keys.owner(), "signer does not match keyset");
            continue;
        }
        if sig.labels as usize > rrset.owner().non_root_labels() {
            failure = Reason::Malformed;
            continue;
        }
        if !crypto::algorithm_supported(sig.algorithm) {
            failure = Reason::UnsupportedAlgorithm;
            continue;
        }
        if let Err(reason) = check_validity_window(sig, now) {
            failure = reason;
            continue;
        }

        let data = signed_data(rrset, sig);

        for key in candidate_keys(keys, sig) {
            match crypto::verify(key, &data, &sig.signature) {
                Ok(()) => {
                    trace!(
                        owner = %rrset.owner(),
                        rtype = %rrset.rtype(),
                        key_tag = sig.key_tag,
                        "signature verified"
                    );
                    return Ok(());
                }
                Err(CryptoError::UnsupportedAlgorithm(_)) => {
                    failure = Reason::UnsupportedAlgorithm;
                }
                Err(_) => {
                    failure = Reason::SignatureFailed;
                }
            }
        }
    }

    debug!(
        owner = %rrset.owner(),
        rtype = %rrset.rtype(),
        %failure,
        "no RRSIG verified"
    );
    Err(failure)
}

/// Selects the DNSKEYs eligible to verify `sig`: matching algorithm and
/// key tag, zone key bit set, protocol 3, not revoked.
fn candidate_keys<'a>(keys: &'a Rrset, sig: &'a RRSIG) -> impl Iterator<Item = &'a sigil_proto::rdata::DNSKEY> {
    keys.rdatas().iter().filter_map(move |rdata| match rdata {
        RData::DNSKEY(key)
            if key.algorithm == sig.algorithm
                && key.key_tag() == sig.key_tag
                && key.is_zone_key()
                && key.protocol == 3
                && !key.is_revoked() =>
        {
            Some(key)
        }
        _ => None,
    })
}

/// Returns the owner to use in the signed data: the actual owner, or the
/// generating wildcard when the RRSIG label count is lower.
fn effective_owner(owner: &Name, sig: &RRSIG) -> Name {
    let diff = owner.non_root_labels().saturating_sub(sig.labels as usize);
    if diff > 0 {
        owner.wild(diff).unwrap_or_else(|_| owner.clone())
    } else {
        owner.clone()
    }
}

/// Checks the RRSIG validity window with RFC 4034 Section 3.1.5 serial
/// arithmetic: inception equal to `now` is accepted, expiration equal to
/// `now` is rejected.
fn check_validity_window(sig: &RRSIG, now: u32) -> Result<(), Reason> {
    if (now.wrapping_sub(sig.inception) as i32) < 0 {
        return Err(Reason::SignatureNotYetValid);
    }
    if (sig.expiration.wrapping_sub(now) as i32) <= 0 {
        return Err(Reason::SignatureExpired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use sigil_proto::rdata::DNSKEY;
    use sigil_proto::{RecordClass, RecordType};
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    struct TestSigner {
        signing: SigningKey,
        dnskey: DNSKEY,
        zone: Name,
    }

    impl TestSigner {
        fn new(zone: &str, seed: u8) -> Self {
            let signing = SigningKey::from_bytes(&[seed; 32]);
            let dnskey = DNSKEY::new(257, 15, signing.verifying_key().to_bytes().to_vec());
            Self {
                signing,
                dnskey,
                zone: name(zone),
            }
        }

        fn keyset(&self) -> Rrset {
            Rrset::with_rdata(
                self.zone.clone(),
                RecordType::DNSKEY,
                3600,
                RData::DNSKEY(self.dnskey.clone()),
            )
        }

        fn sign(&self, rrset: &mut Rrset, labels: u8, inception: u32, expiration: u32) {
            let mut sig = RRSIG {
                type_covered: rrset.rtype(),
                algorithm: 15,
                labels,
                original_ttl: rrset.ttl(),
                expiration,
                inception,
                key_tag: self.dnskey.key_tag(),
                signer: self.zone.clone(),
                signature: Vec::new(),
            };
            let data = signed_data(rrset, &sig);
            sig.signature = self.signing.sign(&data).to_bytes().to_vec();
            rrset.push_sig(sig).unwrap();
        }
    }

    fn a_rrset(owner: &str) -> Rrset {
        Rrset::with_rdata(
            name(owner),
            RecordType::A,
            300,
            RData::A(Ipv4Addr::new(192, 0, 2, 1)),
        )
    }

    const NOW: u32 = 1_700_000_000;

    #[test]
    fn valid_signature_verifies() {
        let signer = TestSigner::new("example.com", 1);
        let mut rrset = a_rrset("www.example.com");
        signer.sign(&mut rrset, 3, NOW - 100, NOW + 100);

        assert_eq!(verify_rrset(&rrset, &signer.keyset(), NOW), Ok(()));
    }

    #[test]
    fn flipped_signature_byte_fails() {
        let signer = TestSigner::new("example.com", 1);
        let mut rrset = a_rrset("www.example.com");
        signer.sign(&mut rrset, 3, NOW - 100, NOW + 100);

        // Corrupt the stored signature.
        let mut broken = a_rrset("www.example.com");
        let mut sig = rrset.sigs()[0].clone();
        sig.signature[0] ^= 0x01;
        broken.push_sig(sig).unwrap();

        assert_eq!(
            verify_rrset(&broken, &signer.keyset(), NOW),
            Err(Reason::SignatureFailed)
        );
    }

    #[test]
    fn unsigned_rrset_is_missing_signature() {
        let signer = TestSigner::new("example.com", 1);
        let rrset = a_rrset("www.example.com");
        assert_eq!(
            verify_rrset(&rrset, &signer.keyset(), NOW),
            Err(Reason::MissingSignature)
        );
    }

    #[test]
    fn validity_window_boundaries() {
        let signer = TestSigner::new("example.com", 1);

        // Inception exactly now: accepted.
        let mut at_inception = a_rrset("www.example.com");
        signer.sign(&mut at_inception, 3, NOW, NOW + 100);
        assert_eq!(verify_rrset(&at_inception, &signer.keyset(), NOW), Ok(()));

        // Expiration exactly now: rejected.
        let mut at_expiration = a_rrset("www.example.com");
        signer.sign(&mut at_expiration, 3, NOW - 100, NOW);
        assert_eq!(
            verify_rrset(&at_expiration, &signer.keyset(), NOW),
            Err(Reason::SignatureExpired)
        );

        // Not yet valid.
        let mut future = a_rrset("www.example.com");
        signer.sign(&mut future, 3, NOW + 10, NOW + 100);
        assert_eq!(
            verify_rrset(&future, &signer.keyset(), NOW),
            Err(Reason::SignatureNotYetValid)
        );
    }

    #[test]
    fn serial_arithmetic_wraps() {
        // A window that straddles the 32-bit wrap point still validates.
        let signer = TestSigner::new("example.com", 1);
        let now = u32::MAX - 50;
        let mut rrset = a_rrset("www.example.com");
        signer.sign(&mut rrset, 3, now - 100, now.wrapping_add(100));
        assert_eq!(verify_rrset(&rrset, &signer.keyset(), now), Ok(()));
    }

    #[test]
    fn wrong_keyset_owner_is_missing_key() {
        let signer = TestSigner::new("example.com", 1);
        let other = TestSigner::new("example.org", 2);
        let mut rrset = a_rrset("www.example.com");
        signer.sign(&mut rrset, 3, NOW - 100, NOW + 100);

        assert_eq!(
            verify_rrset(&rrset, &other.keyset(), NOW),
            Err(Reason::MissingKey)
        );
    }

    #[test]
    fn wildcard_expansion_detected() {
        let signer = TestSigner::new("example.com", 1);

        // Signed as *.wild.example.com (3 non-root labels) but expanded to
        // a deeper owner.
        let mut expanded = a_rrset("anything.wild.example.com");
        signer.sign(&mut expanded, 3, NOW - 100, NOW + 100);

        assert_eq!(verify_rrset(&expanded, &signer.keyset(), NOW), Ok(()));
        assert_eq!(
            wildcard_of(&expanded),
            Some(name("*.wild.example.com"))
        );

        // An unexpanded owner is not flagged.
        let mut direct = a_rrset("www.example.com");
        signer.sign(&mut direct, 3, NOW - 100, NOW + 100);
        assert_eq!(wildcard_of(&direct), None);
    }

    #[test]
    fn zone_key_bit_required() {
        let signing = SigningKey::from_bytes(&[9u8; 32]);
        // Flags 0: no zone key bit.
        let dnskey = DNSKEY::new(0, 15, signing.verifying_key().to_bytes().to_vec());
        let zone = name("example.com");

        let mut rrset = a_rrset("www.example.com");
        let mut sig = RRSIG {
            type_covered: RecordType::A,
            algorithm: 15,
            labels: 3,
            original_ttl: 300,
            expiration: NOW + 100,
            inception: NOW - 100,
            key_tag: dnskey.key_tag(),
            signer: zone.clone(),
            signature: Vec::new(),
        };
        sig.signature = signing.sign(&signed_data(&rrset, &sig)).to_bytes().to_vec();
        rrset.push_sig(sig).unwrap();

        let keys = Rrset::with_rdata(zone, RecordType::DNSKEY, 3600, RData::DNSKEY(dnskey));
        assert_eq!(verify_rrset(&rrset, &keys, NOW), Err(Reason::MissingKey));
    }

    #[test]
    fn canonical_ordering_of_members() {
        // Two A records must sort by RDATA regardless of insertion order.
        let signer = TestSigner::new("example.com", 1);

        let mut forward = Rrset::new(name("www.example.com"), RecordClass::IN, RecordType::A);
        forward.push(300, RData::A(Ipv4Addr::new(192, 0, 2, 1))).unwrap();
        forward.push(300, RData::A(Ipv4Addr::new(10, 0, 0, 1))).unwrap();
        signer.sign(&mut forward, 3, NOW - 100, NOW + 100);

        let mut reversed = Rrset::new(name("www.example.com"), RecordClass::IN, RecordType::A);
        reversed.push(300, RData::A(Ipv4Addr::new(10, 0, 0, 1))).unwrap();
        reversed.push(300, RData::A(Ipv4Addr::new(192, 0, 2, 1))).unwrap();
        let sig = forward.sigs()[0].clone();
        reversed.push_sig(sig).unwrap();

        assert_eq!(verify_rrset(&reversed, &signer.keyset(), NOW), Ok(()));
    }
}
