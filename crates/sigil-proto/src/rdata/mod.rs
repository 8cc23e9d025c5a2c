//! Record data (RDATA) types.
//!
//! Every type knows how to append its canonical wire form to a buffer
//! (RFC 4034 Section 6.2: embedded domain names lowercased for the legacy
//! record types, per the RFC 6840 Section 5.1 clarification). That form is
//! what signatures, DS digests and NSEC3 hashes are computed over.

mod dnssec;

pub use dnssec::{DNSKEY, DS, NSEC, NSEC3, NSEC3PARAM, RRSIG, TypeBitmap};

use crate::name::Name;
use crate::rtype::RecordType;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// SOA record data (RFC 1035 Section 3.3.13).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SOA {
    /// Primary name server.
    pub mname: Name,
    /// Responsible mailbox.
    pub rname: Name,
    /// Zone serial number.
    pub serial: u32,
    /// Refresh interval.
    pub refresh: u32,
    /// Retry interval.
    pub retry: u32,
    /// Expire interval.
    pub expire: u32,
    /// Minimum/negative TTL.
    pub minimum: u32,
}

/// MX record data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MX {
    /// Preference value, lower is preferred.
    pub preference: u16,
    /// Mail exchange host.
    pub exchange: Name,
}

/// Record data, discriminated by record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum RData {
    /// IPv4 address.
    A(Ipv4Addr),
    /// IPv6 address.
    AAAA(Ipv6Addr),
    /// Authoritative name server.
    NS(Name),
    /// Canonical name alias.
    CNAME(Name),
    /// Subtree redirection.
    DNAME(Name),
    /// Start of authority.
    SOA(SOA),
    /// Mail exchange.
    MX(MX),
    /// Free-form text, kept as raw character strings.
    TXT(Vec<Vec<u8>>),
    /// DNS public key.
    DNSKEY(DNSKEY),
    /// Delegation signer.
    DS(DS),
    /// RRset signature.
    RRSIG(RRSIG),
    /// Authenticated denial, plain.
    NSEC(NSEC),
    /// Authenticated denial, hashed.
    NSEC3(NSEC3),
    /// NSEC3 zone parameters.
    NSEC3PARAM(NSEC3PARAM),
    /// Anything the engine has no structured form for.
    Other {
        /// The numeric record type.
        rtype: u16,
        /// The raw RDATA bytes.
        data: Vec<u8>,
    },
}

impl RData {
    /// Returns the record type of this data, if it is a known type.
    pub fn record_type(&self) -> Option<RecordType> {
        match self {
            Self::A(_) => Some(RecordType::A),
            Self::AAAA(_) => Some(RecordType::AAAA),
            Self::NS(_) => Some(RecordType::NS),
            Self::CNAME(_) => Some(RecordType::CNAME),
            Self::DNAME(_) => Some(RecordType::DNAME),
            Self::SOA(_) => Some(RecordType::SOA),
            Self::MX(_) => Some(RecordType::MX),
            Self::TXT(_) => Some(RecordType::TXT),
            Self::DNSKEY(_) => Some(RecordType::DNSKEY),
            Self::DS(_) => Some(RecordType::DS),
            Self::RRSIG(_) => Some(RecordType::RRSIG),
            Self::NSEC(_) => Some(RecordType::NSEC),
            Self::NSEC3(_) => Some(RecordType::NSEC3),
            Self::NSEC3PARAM(_) => Some(RecordType::NSEC3PARAM),
            Self::Other { rtype, .. } => RecordType::try_from(*rtype).ok(),
        }
    }

    /// Returns the CNAME target, if this is a CNAME.
    pub fn as_cname(&self) -> Option<&Name> {
        match self {
            Self::CNAME(target) => Some(target),
            _ => None,
        }
    }

    /// Appends the canonical wire form of the RDATA.
    ///
    /// Names embedded in NS, CNAME, DNAME, SOA, MX and the RRSIG signer are
    /// lowercased; everything else is written verbatim.
    pub fn write_canonical(&self, buf: &mut BytesMut) {
        match self {
            Self::A(addr) => buf.extend_from_slice(&addr.octets()),
            Self::AAAA(addr) => buf.extend_from_slice(&addr.octets()),
            Self::NS(name) | Self::CNAME(name) | Self::DNAME(name) => {
                name.write_canonical(buf);
            }
            Self::SOA(soa) => {
                soa.mname.write_canonical(buf);
                soa.rname.write_canonical(buf);
                buf.extend_from_slice(&soa.serial.to_be_bytes());
                buf.extend_from_slice(&soa.refresh.to_be_bytes());
                buf.extend_from_slice(&soa.retry.to_be_bytes());
                buf.extend_from_slice(&soa.expire.to_be_bytes());
                buf.extend_from_slice(&soa.minimum.to_be_bytes());
            }
            Self::MX(mx) => {
                buf.extend_from_slice(&mx.preference.to_be_bytes());
                mx.exchange.write_canonical(buf);
            }
            Self::TXT(strings) => {
                for s in strings {
                    buf.extend_from_slice(&[s.len() as u8]);
                    buf.extend_from_slice(s);
                }
            }
            Self::DNSKEY(key) => key.write_to(buf),
            Self::DS(ds) => ds.write_to(buf),
            Self::RRSIG(sig) => sig.write_to(buf),
            Self::NSEC(nsec) => nsec.write_to(buf),
            Self::NSEC3(nsec3) => nsec3.write_to(buf),
            Self::NSEC3PARAM(param) => param.write_to(buf),
            Self::Other { data, .. } => buf.extend_from_slice(data),
        }
    }

    /// Returns the canonical wire form as a fresh byte vector.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.write_canonical(&mut buf);
        buf.to_vec()
    }
}

impl fmt::Display for RData {
    // The engine only renders RDATA in logs; Debug output is sufficient.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
