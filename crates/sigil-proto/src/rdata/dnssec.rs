//! DNSSEC record data types (RFC 4034, RFC 5155).

use crate::name::Name;
use crate::rtype::RecordType;
use bytes::BytesMut;
use data_encoding::{BASE32HEX_NOPAD, HEXLOWER};
use serde::{Deserialize, Serialize};
use std::fmt;

/// DNSKEY record data (RFC 4034 Section 2).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DNSKEY {
    /// Flags: zone key, secure entry point.
    pub flags: u16,
    /// Protocol, fixed at 3.
    pub protocol: u8,
    /// Signing algorithm number.
    pub algorithm: u8,
    /// Public key material, algorithm-specific encoding.
    pub public_key: Vec<u8>,
}

impl DNSKEY {
    /// Zone Key flag bit.
    pub const FLAG_ZONE_KEY: u16 = 0x0100;
    /// Secure Entry Point flag bit.
    pub const FLAG_SEP: u16 = 0x0001;
    /// Revoked flag bit (RFC 5011).
    pub const FLAG_REVOKE: u16 = 0x0080;

    /// Creates a new DNSKEY.
    pub fn new(flags: u16, algorithm: u8, public_key: impl Into<Vec<u8>>) -> Self {
        Self {
            flags,
            protocol: 3,
            algorithm,
            public_key: public_key.into(),
        }
    }

    /// Returns true if the zone key bit is set.
    ///
    /// Keys without this bit must not be used to verify RRSIGs
    /// (RFC 4034 Section 2.1.1).
    #[inline]
    pub const fn is_zone_key(&self) -> bool {
        self.flags & Self::FLAG_ZONE_KEY != 0
    }

    /// Returns true if the secure entry point bit is set (a KSK).
    #[inline]
    pub const fn is_sep(&self) -> bool {
        self.flags & Self::FLAG_SEP != 0
    }

    /// Returns true if the key is revoked (RFC 5011).
    #[inline]
    pub const fn is_revoked(&self) -> bool {
        self.flags & Self::FLAG_REVOKE != 0
    }

    /// Calculates the key tag (RFC 4034 Appendix B).
    pub fn key_tag(&self) -> u16 {
        let mut buf = BytesMut::with_capacity(4 + self.public_key.len());
        self.write_to(&mut buf);

        let mut ac: u32 = 0;
        for (i, &byte) in buf.iter().enumerate() {
            if i & 1 == 0 {
                ac += u32::from(byte) << 8;
            } else {
                ac += u32::from(byte);
            }
        }
        ac += ac >> 16;
        (ac & 0xFFFF) as u16
    }

    /// Appends the RDATA wire form.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&[self.protocol, self.algorithm]);
        buf.extend_from_slice(&self.public_key);
    }
}

impl fmt::Display for DNSKEY {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ({} bytes, tag {})",
            self.flags,
            self.protocol,
            self.algorithm,
            self.public_key.len(),
            self.key_tag()
        )
    }
}

/// DS record data (RFC 4034 Section 5).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DS {
    /// Key tag of the referenced DNSKEY.
    pub key_tag: u16,
    /// Algorithm of the referenced DNSKEY.
    pub algorithm: u8,
    /// Digest algorithm used over the DNSKEY.
    pub digest_type: u8,
    /// The digest bytes.
    pub digest: Vec<u8>,
}

impl DS {
    /// Creates a new DS record.
    pub fn new(key_tag: u16, algorithm: u8, digest_type: u8, digest: impl Into<Vec<u8>>) -> Self {
        Self {
            key_tag,
            algorithm,
            digest_type,
            digest: digest.into(),
        }
    }

    /// Appends the RDATA wire form.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&self.key_tag.to_be_bytes());
        buf.extend_from_slice(&[self.algorithm, self.digest_type]);
        buf.extend_from_slice(&self.digest);
    }
}

impl fmt::Display for DS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.key_tag,
            self.algorithm,
            self.digest_type,
            HEXLOWER.encode(&self.digest)
        )
    }
}

/// RRSIG record data (RFC 4034 Section 3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RRSIG {
    /// Type of the RRset this signature covers.
    pub type_covered: RecordType,
    /// Signing algorithm number.
    pub algorithm: u8,
    /// Label count of the owner at signing time, root excluded.
    ///
    /// A count lower than the owner's actual label count marks a
    /// wildcard-expanded RRset.
    pub labels: u8,
    /// TTL of the RRset at signing time.
    pub original_ttl: u32,
    /// Expiration of the validity window (seconds since epoch, serial
    /// arithmetic).
    pub expiration: u32,
    /// Inception of the validity window.
    pub inception: u32,
    /// Key tag of the signing DNSKEY.
    pub key_tag: u16,
    /// Name of the zone whose key produced this signature.
    pub signer: Name,
    /// The signature bytes.
    pub signature: Vec<u8>,
}

impl RRSIG {
    /// Appends the full RDATA wire form with the signer lowercased.
    pub fn write_to(&self, buf: &mut BytesMut) {
        self.write_unsigned_to(buf);
        buf.extend_from_slice(&self.signature);
    }

    /// Appends the RDATA up to, but excluding, the signature field.
    ///
    /// This is the leading portion of the signed data of RFC 4034
    /// Section 3.1.8.1. The signer name is written in canonical
    /// (lowercased) form.
    pub fn write_unsigned_to(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&self.type_covered.to_u16().to_be_bytes());
        buf.extend_from_slice(&[self.algorithm, self.labels]);
        buf.extend_from_slice(&self.original_ttl.to_be_bytes());
        buf.extend_from_slice(&self.expiration.to_be_bytes());
        buf.extend_from_slice(&self.inception.to_be_bytes());
        buf.extend_from_slice(&self.key_tag.to_be_bytes());
        self.signer.write_canonical(buf);
    }
}

impl fmt::Display for RRSIG {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {} {}",
            self.type_covered,
            self.algorithm,
            self.labels,
            self.original_ttl,
            self.expiration,
            self.inception,
            self.key_tag,
            self.signer
        )
    }
}

/// The NSEC/NSEC3 type bitmap (RFC 4034 Section 4.1.2).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeBitmap {
    raw: Vec<u8>,
}

impl TypeBitmap {
    /// Builds a bitmap covering the given types.
    pub fn from_types(types: &[RecordType]) -> Self {
        let mut values: Vec<u16> = types.iter().map(|t| t.to_u16()).collect();
        values.sort_unstable();
        values.dedup();

        let mut raw = Vec::new();
        let mut window_start = 0;
        while window_start < values.len() {
            let window = (values[window_start] >> 8) as u8;
            let in_window: Vec<u16> = values[window_start..]
                .iter()
                .copied()
                .take_while(|v| (v >> 8) as u8 == window)
                .collect();

            let mut bits = [0u8; 32];
            let mut max_byte = 0;
            for v in &in_window {
                let low = (v & 0xFF) as usize;
                bits[low / 8] |= 0x80 >> (low % 8);
                max_byte = max_byte.max(low / 8);
            }

            raw.push(window);
            raw.push(max_byte as u8 + 1);
            raw.extend_from_slice(&bits[..=max_byte]);

            window_start += in_window.len();
        }

        Self { raw }
    }

    /// Wraps raw bitmap bytes.
    pub fn from_raw(raw: impl Into<Vec<u8>>) -> Self {
        Self { raw: raw.into() }
    }

    /// Returns true if the bitmap asserts the presence of `rtype`.
    pub fn has_type(&self, rtype: RecordType) -> bool {
        let value = rtype.to_u16();
        let window = (value >> 8) as u8;
        let low = (value & 0xFF) as usize;

        let mut pos = 0;
        while pos + 2 <= self.raw.len() {
            let w = self.raw[pos];
            let len = self.raw[pos + 1] as usize;
            pos += 2;
            if pos + len > self.raw.len() {
                return false;
            }
            if w == window {
                let byte = low / 8;
                return byte < len && self.raw[pos + byte] & (0x80 >> (low % 8)) != 0;
            }
            pos += len;
        }
        false
    }

    /// Returns the raw bitmap bytes.
    pub fn as_raw(&self) -> &[u8] {
        &self.raw
    }

    /// Returns true if the bitmap asserts no types at all.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// NSEC record data (RFC 4034 Section 4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NSEC {
    /// The next owner name in canonical zone order.
    pub next_name: Name,
    /// Types present at the NSEC owner.
    pub types: TypeBitmap,
}

impl NSEC {
    /// Creates a new NSEC record.
    pub fn new(next_name: Name, types: TypeBitmap) -> Self {
        Self { next_name, types }
    }

    /// Appends the RDATA wire form.
    ///
    /// Per RFC 6840 Section 5.1 the next name is *not* downcased in the
    /// canonical form.
    pub fn write_to(&self, buf: &mut BytesMut) {
        self.next_name.write_wire(buf);
        buf.extend_from_slice(self.types.as_raw());
    }
}

/// NSEC3 record data (RFC 5155 Section 3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NSEC3 {
    /// Hash algorithm, 1 = SHA-1.
    pub hash_algorithm: u8,
    /// Flags; bit 0 is opt-out.
    pub flags: u8,
    /// Extra hash iterations.
    pub iterations: u16,
    /// Hash salt.
    pub salt: Vec<u8>,
    /// Hash of the next owner name in hash order.
    pub next_hashed: Vec<u8>,
    /// Types present at the original owner.
    pub types: TypeBitmap,
}

impl NSEC3 {
    /// Opt-out flag bit (RFC 5155 Section 3.1.2.1).
    pub const FLAG_OPT_OUT: u8 = 0x01;

    /// SHA-1 hash algorithm identifier.
    pub const HASH_SHA1: u8 = 1;

    /// Returns true if the opt-out flag is set.
    #[inline]
    pub const fn is_opt_out(&self) -> bool {
        self.flags & Self::FLAG_OPT_OUT != 0
    }

    /// Appends the RDATA wire form.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&[self.hash_algorithm, self.flags]);
        buf.extend_from_slice(&self.iterations.to_be_bytes());
        buf.extend_from_slice(&[self.salt.len() as u8]);
        buf.extend_from_slice(&self.salt);
        buf.extend_from_slice(&[self.next_hashed.len() as u8]);
        buf.extend_from_slice(&self.next_hashed);
        buf.extend_from_slice(self.types.as_raw());
    }
}

impl fmt::Display for NSEC3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let salt = if self.salt.is_empty() {
            "-".to_string()
        } else {
            HEXLOWER.encode(&self.salt)
        };
        write!(
            f,
            "{} {} {} {} {}",
            self.hash_algorithm,
            self.flags,
            self.iterations,
            salt,
            BASE32HEX_NOPAD.encode(&self.next_hashed)
        )
    }
}

/// NSEC3PARAM record data (RFC 5155 Section 4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NSEC3PARAM {
    /// Hash algorithm.
    pub hash_algorithm: u8,
    /// Flags, must be ignored by validators.
    pub flags: u8,
    /// Extra hash iterations.
    pub iterations: u16,
    /// Hash salt.
    pub salt: Vec<u8>,
}

impl NSEC3PARAM {
    /// Appends the RDATA wire form.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&[self.hash_algorithm, self.flags]);
        buf.extend_from_slice(&self.iterations.to_be_bytes());
        buf.extend_from_slice(&[self.salt.len() as u8]);
        buf.extend_from_slice(&self.salt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn dnskey_flags() {
        let zsk = DNSKEY::new(256, 8, vec![]);
        assert!(zsk.is_zone_key());
        assert!(!zsk.is_sep());

        let ksk = DNSKEY::new(257, 8, vec![]);
        assert!(ksk.is_zone_key());
        assert!(ksk.is_sep());

        let revoked = DNSKEY::new(256 | DNSKEY::FLAG_REVOKE, 8, vec![]);
        assert!(revoked.is_revoked());
    }

    #[test]
    fn key_tag_reference_vector() {
        // RFC 4034 Appendix B.1 example DNSKEY (algorithm 5, tag 9279)
        // reduced: the key tag algorithm is a plain ones-complement sum, so
        // a small synthetic key exercises it fully.
        let key = DNSKEY::new(256, 8, vec![0x01, 0x02, 0x03, 0x04]);
        // RDATA: 01 00 03 08 01 02 03 04
        // sum = 0x0100 + 0x0308 + 0x0102 + 0x0304 = 0x080E
        assert_eq!(key.key_tag(), 0x080E);
    }

    #[test]
    fn type_bitmap_roundtrip() {
        let types = [
            RecordType::A,
            RecordType::NS,
            RecordType::SOA,
            RecordType::MX,
            RecordType::RRSIG,
            RecordType::NSEC,
            RecordType::ANY,
        ];
        let bitmap = TypeBitmap::from_types(&types);

        for t in types {
            assert!(bitmap.has_type(t), "missing {}", t);
        }
        assert!(!bitmap.has_type(RecordType::CNAME));
        assert!(!bitmap.has_type(RecordType::DS));
    }

    #[test]
    fn type_bitmap_rfc_example() {
        // RFC 4034 Section 4.3: A MX RRSIG NSEC => window 0, 6 bytes,
        // 0x40 0x01 0x00 0x00 0x00 0x03.
        let bitmap = TypeBitmap::from_types(&[
            RecordType::A,
            RecordType::MX,
            RecordType::RRSIG,
            RecordType::NSEC,
        ]);
        assert_eq!(
            bitmap.as_raw(),
            &[0x00, 0x06, 0x40, 0x01, 0x00, 0x00, 0x00, 0x03]
        );
    }

    #[test]
    fn nsec3_opt_out() {
        let nsec3 = NSEC3 {
            hash_algorithm: NSEC3::HASH_SHA1,
            flags: NSEC3::FLAG_OPT_OUT,
            iterations: 10,
            salt: vec![0xAA],
            next_hashed: vec![0; 20],
            types: TypeBitmap::default(),
        };
        assert!(nsec3.is_opt_out());

        let mut buf = BytesMut::new();
        nsec3.write_to(&mut buf);
        assert_eq!(buf.len(), 4 + 1 + 1 + 1 + 20);
    }

    #[test]
    fn rrsig_unsigned_prefix_lowercases_signer() {
        let sig = RRSIG {
            type_covered: RecordType::A,
            algorithm: 15,
            labels: 2,
            original_ttl: 3600,
            expiration: 200,
            inception: 100,
            key_tag: 42,
            signer: Name::from_str("Example.COM").unwrap(),
            signature: vec![0xFF; 8],
        };

        let mut unsigned = BytesMut::new();
        sig.write_unsigned_to(&mut unsigned);
        let mut full = BytesMut::new();
        sig.write_to(&mut full);

        assert_eq!(full.len(), unsigned.len() + 8);
        let signer_wire = Name::from_str("example.com").unwrap();
        assert_eq!(&unsigned[18..], signer_wire.as_wire());
    }
}
