//! Response classification and signer discovery.
//!
//! Classification decides which validation strategy applies to a response;
//! the signer resolver determines which zone's keys must verify it.

use crate::status::SecMessage;
use sigil_proto::{Name, RecordType};
use tracing::debug;

/// The validation-relevant shape of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// The answer section holds an RRset of the queried type.
    Positive,
    /// The answer section holds a CNAME chain without the queried type.
    Cname,
    /// NOERROR with an empty answer section.
    NoData,
    /// NXDOMAIN with an empty answer section.
    NxDomain,
    /// A response to a qtype=ANY query.
    Any,
    /// Nothing matched; the caller treats this as bogus.
    Unknown,
}

impl ResponseClass {
    /// Returns true for the two denial-of-existence shapes.
    pub const fn is_denial(self) -> bool {
        matches!(self, Self::NoData | Self::NxDomain)
    }
}

/// Classifies a response against its question.
///
/// The rules apply in order: NXDOMAIN with an empty answer, any other
/// empty answer (NODATA), qtype ANY, an answer RRset of the queried type
/// (positive), an answer CNAME, otherwise unknown. A CNAME chain ending in
/// NXDOMAIN classifies as NXDOMAIN only when the chain is absent from the
/// answer section.
pub fn classify(response: &SecMessage) -> ResponseClass {
    let Some(question) = response.question() else {
        return ResponseClass::Unknown;
    };

    if response.rcode().is_nxdomain() && response.answer().is_empty() {
        return ResponseClass::NxDomain;
    }

    if response.answer().is_empty() {
        return ResponseClass::NoData;
    }

    if question.qtype == RecordType::ANY {
        return ResponseClass::Any;
    }

    for sec in response.answer() {
        if sec.rrset().rtype() == question.qtype {
            return ResponseClass::Positive;
        }
        if sec.rrset().rtype() == RecordType::CNAME {
            return ResponseClass::Cname;
        }
    }

    debug!(question = %question, "failed to classify response");
    ResponseClass::Unknown
}

/// Determines the name of the zone whose keys must sign the response.
///
/// For positive shapes this is the signer of the answer RRset owned by the
/// query name; for denial shapes it is the signer of the first NSEC or
/// NSEC3 RRset in the authority section. `None` means the response is
/// unsigned, which is either a provably insecure zone or bogus.
pub fn find_signer(response: &SecMessage, class: ResponseClass, qname: &Name) -> Option<Name> {
    match class {
        ResponseClass::Positive | ResponseClass::Cname | ResponseClass::Any => response
            .answer()
            .iter()
            .find(|sec| sec.rrset().owner() == qname)
            .and_then(|sec| sec.rrset().signer_name().cloned()),
        ResponseClass::NxDomain | ResponseClass::NoData => response
            .first_denial_rrset()
            .and_then(|sec| sec.rrset().signer_name().cloned()),
        ResponseClass::Unknown => None,
    }
}
