//! RRsets: the unit of signing and of security labeling.

use crate::class::RecordClass;
use crate::error::{Error, Result};
use crate::name::Name;
use crate::rdata::{RData, RRSIG};
use crate::rtype::RecordType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// All records sharing an owner name, class and type, together with the
/// RRSIG records covering them.
///
/// The TTL is the minimum of the member TTLs, per RFC 2181 Section 5.2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rrset {
    owner: Name,
    class: RecordClass,
    rtype: RecordType,
    ttl: u32,
    rdatas: Vec<RData>,
    sigs: Vec<RRSIG>,
}

impl Rrset {
    /// Creates an empty RRset.
    pub fn new(owner: Name, class: RecordClass, rtype: RecordType) -> Self {
        Self {
            owner,
            class,
            rtype,
            ttl: u32::MAX,
            rdatas: Vec::new(),
            sigs: Vec::new(),
        }
    }

    /// Creates an RRset with a single record.
    pub fn with_rdata(owner: Name, rtype: RecordType, ttl: u32, rdata: RData) -> Self {
        let mut rrset = Self::new(owner, RecordClass::IN, rtype);
        rrset.ttl = ttl;
        rrset.rdatas.push(rdata);
        rrset
    }

    /// Adds a data record, folding its TTL into the set minimum.
    ///
    /// The record must match the set's type.
    pub fn push(&mut self, ttl: u32, rdata: RData) -> Result<()> {
        if rdata.record_type().is_some_and(|t| t != self.rtype) {
            return Err(Error::RrsetMismatch);
        }
        self.ttl = self.ttl.min(ttl);
        self.rdatas.push(rdata);
        Ok(())
    }

    /// Attaches a covering RRSIG.
    ///
    /// The signature must cover the set's type.
    pub fn push_sig(&mut self, sig: RRSIG) -> Result<()> {
        if sig.type_covered != self.rtype {
            return Err(Error::RrsetMismatch);
        }
        self.sigs.push(sig);
        Ok(())
    }

    /// Returns the owner name.
    #[inline]
    pub fn owner(&self) -> &Name {
        &self.owner
    }

    /// Returns the record class.
    #[inline]
    pub fn class(&self) -> RecordClass {
        self.class
    }

    /// Returns the record type.
    #[inline]
    pub fn rtype(&self) -> RecordType {
        self.rtype
    }

    /// Returns the TTL (minimum of the member records).
    #[inline]
    pub fn ttl(&self) -> u32 {
        if self.rdatas.is_empty() { 0 } else { self.ttl }
    }

    /// Returns the data records.
    #[inline]
    pub fn rdatas(&self) -> &[RData] {
        &self.rdatas
    }

    /// Returns the covering RRSIGs.
    #[inline]
    pub fn sigs(&self) -> &[RRSIG] {
        &self.sigs
    }

    /// Returns true if the set has at least one covering signature.
    #[inline]
    pub fn is_signed(&self) -> bool {
        !self.sigs.is_empty()
    }

    /// Returns the signer name of the first covering RRSIG, or `None` for
    /// an unsigned set.
    ///
    /// All RRSIGs over one RRset are produced by the same zone, so the
    /// first signature identifies the signing zone.
    pub fn signer_name(&self) -> Option<&Name> {
        self.sigs.first().map(|sig| &sig.signer)
    }

    /// Returns the first NSEC payload, if this is an NSEC set.
    pub fn as_nsec(&self) -> Option<&crate::rdata::NSEC> {
        match self.rdatas.first() {
            Some(RData::NSEC(nsec)) => Some(nsec),
            _ => None,
        }
    }

    /// Returns the first NSEC3 payload, if this is an NSEC3 set.
    pub fn as_nsec3(&self) -> Option<&crate::rdata::NSEC3> {
        match self.rdatas.first() {
            Some(RData::NSEC3(nsec3)) => Some(nsec3),
            _ => None,
        }
    }
}

impl fmt::Display for Rrset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} ({} records, {} sigs)",
            self.owner,
            self.ttl(),
            self.class,
            self.rtype,
            self.rdatas.len(),
            self.sigs.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    #[test]
    fn ttl_is_minimum() {
        let mut rrset = Rrset::new(name("example.com"), RecordClass::IN, RecordType::A);
        rrset.push(300, RData::A(Ipv4Addr::new(192, 0, 2, 1))).unwrap();
        rrset.push(60, RData::A(Ipv4Addr::new(192, 0, 2, 2))).unwrap();
        rrset.push(600, RData::A(Ipv4Addr::new(192, 0, 2, 3))).unwrap();
        assert_eq!(rrset.ttl(), 60);
    }

    #[test]
    fn type_mismatch_rejected() {
        let mut rrset = Rrset::new(name("example.com"), RecordClass::IN, RecordType::A);
        let err = rrset.push(300, RData::CNAME(name("other.example.com")));
        assert_eq!(err, Err(Error::RrsetMismatch));
    }

    #[test]
    fn signer_name_from_first_sig() {
        let mut rrset = Rrset::with_rdata(
            name("www.example.com"),
            RecordType::A,
            300,
            RData::A(Ipv4Addr::new(192, 0, 2, 1)),
        );
        assert!(rrset.signer_name().is_none());
        assert!(!rrset.is_signed());

        rrset
            .push_sig(RRSIG {
                type_covered: RecordType::A,
                algorithm: 15,
                labels: 3,
                original_ttl: 300,
                expiration: 200,
                inception: 100,
                key_tag: 1,
                signer: name("example.com"),
                signature: vec![0; 64],
            })
            .unwrap();
        assert_eq!(rrset.signer_name(), Some(&name("example.com")));
    }
}
