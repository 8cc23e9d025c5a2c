//! The security-status lattice and security-annotated message types.

use serde::{Deserialize, Serialize};
use sigil_proto::edns::EdeCode;
use sigil_proto::{Edns, ExtendedError, Header, Message, Name, Question, RecordType, ResponseCode, Rrset};
use std::fmt;

/// The DNSSEC security status of an RRset or message.
///
/// The variants form a lattice ordered
/// `Unchecked < Bogus < Indeterminate < Insecure < Secure`; the numeric
/// order backs the upgrade-only rule of [`SecRrset::upgrade`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SecurityStatus {
    /// Validation has not been attempted. Never leaves the engine.
    Unchecked,
    /// Validation was attempted and failed; the data must not be used.
    Bogus,
    /// No trust anchor covers the data, so no verdict is possible.
    Indeterminate,
    /// The data is provably unsigned (an authenticated insecure
    /// delegation sits on the chain).
    Insecure,
    /// The data is cryptographically authentic.
    Secure,
}

impl SecurityStatus {
    /// Returns true for the terminal states that may not change again.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Secure | Self::Bogus)
    }
}

impl fmt::Display for SecurityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unchecked => "UNCHECKED",
            Self::Bogus => "BOGUS",
            Self::Indeterminate => "INDETERMINATE",
            Self::Insecure => "INSECURE",
            Self::Secure => "SECURE",
        };
        write!(f, "{}", s)
    }
}

/// Machine-readable cause attached to a non-Secure verdict.
///
/// The variants render as terse identifiers; human-facing phrasing belongs
/// to the embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    /// No RRSIG over a required RRset verified.
    SignatureFailed,
    /// An RRSIG validity window ended in the past.
    SignatureExpired,
    /// An RRSIG validity window starts in the future.
    SignatureNotYetValid,
    /// A required RRset carried no RRSIG at all.
    MissingSignature,
    /// No DNSKEY matched a required RRSIG.
    MissingKey,
    /// No DS record matched a verifiable DNSKEY.
    DsMismatch,
    /// The denial-of-existence proof did not hold.
    DenialFailed,
    /// A record was structurally unusable.
    Malformed,
    /// The event dependency chain exceeded its depth bound.
    MaxChainDepth,
    /// The per-request query budget was exhausted.
    MaxQueries,
    /// The upstream did not answer a required query.
    Unreachable,
    /// The response did not fit any known classification.
    Unclassifiable,
    /// A required algorithm is not implemented.
    UnsupportedAlgorithm,
    /// A required DS digest type is not implemented.
    UnsupportedDigest,
    /// An NSEC3 iteration count exceeded the configured cap.
    Nsec3IterationsExceeded,
    /// No configured trust anchor covers the query name.
    NoTrustAnchor,
    /// A previously failed key entry for the zone is still cached.
    BadKeyCached,
}

impl Reason {
    /// Maps the reason onto an RFC 8914 extended error code.
    pub const fn ede_code(self) -> EdeCode {
        match self {
            Self::SignatureExpired => EdeCode::SignatureExpired,
            Self::SignatureNotYetValid => EdeCode::SignatureNotYetValid,
            Self::MissingSignature => EdeCode::RrsigsMissing,
            Self::MissingKey => EdeCode::DnskeyMissing,
            Self::DenialFailed => EdeCode::NsecMissing,
            Self::Unreachable => EdeCode::NoReachableAuthority,
            Self::UnsupportedAlgorithm => EdeCode::UnsupportedDnskeyAlgorithm,
            Self::UnsupportedDigest => EdeCode::UnsupportedDsDigestType,
            Self::Nsec3IterationsExceeded => EdeCode::UnsupportedNsec3IterationsValue,
            Self::NoTrustAnchor => EdeCode::DnssecIndeterminate,
            _ => EdeCode::DnssecBogus,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SignatureFailed => "signature-failed",
            Self::SignatureExpired => "signature-expired",
            Self::SignatureNotYetValid => "signature-not-yet-valid",
            Self::MissingSignature => "missing-rrsig",
            Self::MissingKey => "missing-dnskey",
            Self::DsMismatch => "ds-mismatch",
            Self::DenialFailed => "denial-failed",
            Self::Malformed => "malformed",
            Self::MaxChainDepth => "max-chain-depth",
            Self::MaxQueries => "max-queries",
            Self::Unreachable => "unreachable",
            Self::Unclassifiable => "unclassifiable",
            Self::UnsupportedAlgorithm => "unsupported-algorithm",
            Self::UnsupportedDigest => "unsupported-digest",
            Self::Nsec3IterationsExceeded => "nsec3-iterations-exceeded",
            Self::NoTrustAnchor => "no-trust-anchor",
            Self::BadKeyCached => "bad-key-cached",
        };
        write!(f, "{}", s)
    }
}

/// An RRset carrying its security status.
///
/// The status only moves upward through the lattice, and the terminal
/// states (`Secure`, `Bogus`) never change once reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecRrset {
    rrset: Rrset,
    status: SecurityStatus,
}

impl SecRrset {
    /// Wraps an RRset in the `Unchecked` state.
    pub fn new(rrset: Rrset) -> Self {
        Self {
            rrset,
            status: SecurityStatus::Unchecked,
        }
    }

    /// Returns the wrapped RRset.
    #[inline]
    pub fn rrset(&self) -> &Rrset {
        &self.rrset
    }

    /// Returns the current status.
    #[inline]
    pub fn status(&self) -> SecurityStatus {
        self.status
    }

    /// Applies the upgrade-only transition rule.
    ///
    /// Returns the status in effect afterwards.
    pub fn upgrade(&mut self, status: SecurityStatus) -> SecurityStatus {
        if !self.status.is_terminal() && status > self.status {
            self.status = status;
        }
        self.status
    }
}

/// A response message annotated with per-RRset and overall security state.
#[derive(Debug, Clone)]
pub struct SecMessage {
    header: Header,
    question: Option<Question>,
    answer: Vec<SecRrset>,
    authority: Vec<SecRrset>,
    additional: Vec<Rrset>,
    edns: Option<Edns>,
    status: SecurityStatus,
    reason: Option<Reason>,
}

impl SecMessage {
    /// Annotates a plain message.
    pub fn from_message(msg: Message) -> Self {
        let header = *msg.header();
        let question = msg.question().cloned();
        let edns = msg.edns().cloned();
        Self {
            header,
            question,
            answer: msg.answer().iter().cloned().map(SecRrset::new).collect(),
            authority: msg.authority().iter().cloned().map(SecRrset::new).collect(),
            additional: msg.additional().to_vec(),
            edns,
            status: SecurityStatus::Unchecked,
            reason: None,
        }
    }

    /// Returns the header.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the question.
    #[inline]
    pub fn question(&self) -> Option<&Question> {
        self.question.as_ref()
    }

    /// Returns the response code.
    #[inline]
    pub fn rcode(&self) -> ResponseCode {
        self.header.rcode
    }

    /// Returns the annotated answer section.
    #[inline]
    pub fn answer(&self) -> &[SecRrset] {
        &self.answer
    }

    /// Returns a mutable view of the answer section.
    #[inline]
    pub fn answer_mut(&mut self) -> &mut [SecRrset] {
        &mut self.answer
    }

    /// Returns the annotated authority section.
    #[inline]
    pub fn authority(&self) -> &[SecRrset] {
        &self.authority
    }

    /// Returns a mutable view of the authority section.
    #[inline]
    pub fn authority_mut(&mut self) -> &mut [SecRrset] {
        &mut self.authority
    }

    /// Returns the overall status.
    #[inline]
    pub fn status(&self) -> SecurityStatus {
        self.status
    }

    /// Returns the failure reason, if one was recorded.
    #[inline]
    pub fn reason(&self) -> Option<Reason> {
        self.reason
    }

    /// Records the overall verdict.
    pub fn set_status(&mut self, status: SecurityStatus, reason: Option<Reason>) {
        self.status = status;
        if reason.is_some() {
            self.reason = reason;
        }
    }

    /// Returns the first NSEC or NSEC3 RRset in the authority section.
    pub fn first_denial_rrset(&self) -> Option<&SecRrset> {
        self.authority.iter().find(|s| {
            matches!(s.rrset().rtype(), RecordType::NSEC | RecordType::NSEC3)
        })
    }

    /// Rebuilds a plain message for emission.
    ///
    /// The AD bit is set iff the overall status is `Secure`. Attaching the
    /// SERVFAIL replacement for bogus answers is the orchestrator's job.
    pub fn to_message(&self) -> Message {
        let mut header = self.header;
        header.authentic_data = self.status == SecurityStatus::Secure;

        let mut msg = Message::new(header);
        if let Some(q) = &self.question {
            msg.set_question(q.clone());
        }
        for s in &self.answer {
            msg.add_answer(s.rrset().clone());
        }
        for s in &self.authority {
            msg.add_authority(s.rrset().clone());
        }
        for rrset in &self.additional {
            msg.add_additional(rrset.clone());
        }
        msg.set_edns(self.edns.clone());
        msg
    }

    /// Synthesizes the SERVFAIL replacement for a bogus answer.
    ///
    /// The question is preserved; sections are dropped; an extended error
    /// is attached when the original query negotiated EDNS.
    pub fn to_servfail(&self, query_had_edns: bool) -> Message {
        let mut header = self.header;
        header.rcode = ResponseCode::ServFail;
        header.authentic_data = false;

        let mut msg = Message::new(header);
        if let Some(q) = &self.question {
            msg.set_question(q.clone());
        }
        if query_had_edns {
            msg.set_edns(Some(Edns::new()));
            let reason = self.reason.unwrap_or(Reason::SignatureFailed);
            msg.attach_extended_error(
                ExtendedError::new(reason.ede_code()).with_text(reason.to_string()),
            );
        }
        msg
    }

    /// Returns the first answer RRset owned by `owner`, if any.
    pub fn answer_for(&self, owner: &Name) -> Option<&SecRrset> {
        self.answer.iter().find(|s| s.rrset().owner() == owner)
    }
}
