//! Minimal EDNS(0) model: the DO bit and the Extended DNS Error option.
//!
//! The validator needs EDNS for two things only: requesting DNSSEC records
//! from the upstream (DO bit, RFC 4035 Section 4.1) and attaching an
//! Extended DNS Error (RFC 8914) to synthesized failure responses.

use crate::DEFAULT_EDNS_UDP_SIZE;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Extended DNS Error codes (RFC 8914) emitted by the validator.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u16)]
pub enum EdeCode {
    /// A DNSKEY RRset used an algorithm the validator does not implement.
    UnsupportedDnskeyAlgorithm = 1,
    /// A DS RRset used a digest type the validator does not implement.
    UnsupportedDsDigestType = 2,
    /// Validation could not determine a security status.
    DnssecIndeterminate = 5,
    /// Validation determined the answer is bogus.
    DnssecBogus = 6,
    /// An RRSIG validity window ended in the past.
    SignatureExpired = 7,
    /// An RRSIG validity window starts in the future.
    SignatureNotYetValid = 8,
    /// A required DNSKEY record was missing.
    DnskeyMissing = 9,
    /// A required RRSIG record was missing.
    RrsigsMissing = 10,
    /// No DNSKEY had the zone key bit set.
    NoZoneKeyBitSet = 11,
    /// A required NSEC/NSEC3 record was missing.
    NsecMissing = 12,
    /// No authoritative server could be reached.
    NoReachableAuthority = 22,
    /// A network error occurred talking to the upstream.
    NetworkError = 23,
    /// An NSEC3 record used more iterations than policy allows.
    UnsupportedNsec3IterationsValue = 27,
}

impl fmt::Display for EdeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EDE {}", u16::from(*self))
    }
}

/// An Extended DNS Error option with optional free-form text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedError {
    /// The error code.
    pub code: EdeCode,
    /// Extra diagnostic text.
    pub text: Option<String>,
}

impl ExtendedError {
    /// Creates a new extended error.
    pub const fn new(code: EdeCode) -> Self {
        Self { code, text: None }
    }

    /// Attaches diagnostic text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

impl fmt::Display for ExtendedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(text) = &self.text {
            write!(f, " ({})", text)?;
        }
        Ok(())
    }
}

/// EDNS(0) pseudo-section state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edns {
    /// Advertised UDP payload size.
    pub udp_payload_size: u16,
    /// The DO bit: DNSSEC records requested.
    pub dnssec_ok: bool,
    /// Attached Extended DNS Error, if any.
    pub extended_error: Option<ExtendedError>,
}

impl Edns {
    /// Creates a default EDNS section without the DO bit.
    pub fn new() -> Self {
        Self {
            udp_payload_size: DEFAULT_EDNS_UDP_SIZE,
            dnssec_ok: false,
            extended_error: None,
        }
    }

    /// Creates an EDNS section with the DO bit set.
    pub fn with_dnssec() -> Self {
        Self {
            dnssec_ok: true,
            ..Self::new()
        }
    }

    /// Sets the extended error option.
    pub fn set_extended_error(&mut self, error: ExtendedError) {
        self.extended_error = Some(error);
    }
}

impl Default for Edns {
    fn default() -> Self {
        Self::new()
    }
}
