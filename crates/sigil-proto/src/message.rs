//! DNS messages with RRset-grouped sections.
//!
//! The validation engine works on RRsets, not individual records, so the
//! answer, authority and additional sections are kept as RRset lists. The
//! embedding DNS library is expected to group records into RRsets when it
//! decodes a message off the wire.

use crate::edns::{Edns, ExtendedError};
use crate::header::Header;
use crate::name::Name;
use crate::question::Question;
use crate::rcode::ResponseCode;
use crate::rrset::Rrset;
use crate::rtype::RecordType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A DNS message: header, question and three RRset sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    header: Header,
    question: Option<Question>,
    answer: Vec<Rrset>,
    authority: Vec<Rrset>,
    additional: Vec<Rrset>,
    edns: Option<Edns>,
}

impl Message {
    /// Creates an empty message with the given header.
    pub fn new(header: Header) -> Self {
        Self {
            header,
            question: None,
            answer: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            edns: None,
        }
    }

    /// Creates a query message.
    pub fn query(question: Question) -> Self {
        Self {
            header: Header::query(),
            question: Some(question),
            answer: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            edns: Some(Edns::new()),
        }
    }

    /// Creates a query message with the DO bit set.
    pub fn query_dnssec(question: Question) -> Self {
        let mut msg = Self::query(question);
        msg.edns = Some(Edns::with_dnssec());
        msg
    }

    /// Creates an empty response mirroring a query.
    pub fn response_from(query: &Message) -> Self {
        Self {
            header: Header::response_from(&query.header),
            question: query.question.clone(),
            answer: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            edns: query.edns.clone(),
        }
    }

    /// Returns the header.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns a mutable reference to the header.
    #[inline]
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// Returns the question, if present.
    #[inline]
    pub fn question(&self) -> Option<&Question> {
        self.question.as_ref()
    }

    /// Sets the question.
    pub fn set_question(&mut self, question: Question) {
        self.question = Some(question);
    }

    /// Returns the response code.
    #[inline]
    pub fn rcode(&self) -> ResponseCode {
        self.header.rcode
    }

    /// Sets the response code.
    #[inline]
    pub fn set_rcode(&mut self, rcode: ResponseCode) {
        self.header.rcode = rcode;
    }

    /// Returns the answer section.
    #[inline]
    pub fn answer(&self) -> &[Rrset] {
        &self.answer
    }

    /// Returns the authority section.
    #[inline]
    pub fn authority(&self) -> &[Rrset] {
        &self.authority
    }

    /// Returns the additional section.
    #[inline]
    pub fn additional(&self) -> &[Rrset] {
        &self.additional
    }

    /// Adds an RRset to the answer section.
    pub fn add_answer(&mut self, rrset: Rrset) {
        self.answer.push(rrset);
    }

    /// Adds an RRset to the authority section.
    pub fn add_authority(&mut self, rrset: Rrset) {
        self.authority.push(rrset);
    }

    /// Adds an RRset to the additional section.
    pub fn add_additional(&mut self, rrset: Rrset) {
        self.additional.push(rrset);
    }

    /// Returns the EDNS state, if present.
    #[inline]
    pub fn edns(&self) -> Option<&Edns> {
        self.edns.as_ref()
    }

    /// Sets the EDNS state.
    pub fn set_edns(&mut self, edns: Option<Edns>) {
        self.edns = edns;
    }

    /// Returns true if EDNS is present with the DO bit.
    pub fn wants_dnssec(&self) -> bool {
        self.edns.as_ref().map(|e| e.dnssec_ok).unwrap_or(false)
    }

    /// Attaches an extended error, creating the EDNS section if the message
    /// already negotiated EDNS; a message without EDNS stays without.
    pub fn attach_extended_error(&mut self, error: ExtendedError) {
        if let Some(edns) = &mut self.edns {
            edns.set_extended_error(error);
        }
    }

    /// Returns the first answer RRset whose owner equals `owner`.
    pub fn answer_for(&self, owner: &Name) -> Option<&Rrset> {
        self.answer.iter().find(|rrset| rrset.owner() == owner)
    }

    /// Returns answer RRsets of a given type.
    pub fn answers_of_type(&self, rtype: RecordType) -> impl Iterator<Item = &Rrset> {
        self.answer.iter().filter(move |r| r.rtype() == rtype)
    }

    /// Returns authority RRsets of a given type.
    pub fn authority_of_type(&self, rtype: RecordType) -> impl Iterator<Item = &Rrset> {
        self.authority.iter().filter(move |r| r.rtype() == rtype)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ";; {}", self.header)?;
        if let Some(q) = &self.question {
            writeln!(f, ";; question: {}", q)?;
        }
        for (section, rrsets) in [
            ("answer", &self.answer),
            ("authority", &self.authority),
            ("additional", &self.additional),
        ] {
            for rrset in rrsets.iter() {
                writeln!(f, ";; {}: {}", section, rrset)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdata::RData;
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn question() -> Question {
        Question::new(Name::from_str("example.com").unwrap(), RecordType::A)
    }

    #[test]
    fn query_has_edns() {
        let q = Message::query_dnssec(question());
        assert!(q.wants_dnssec());
        assert!(!q.header().response);
    }

    #[test]
    fn response_mirrors_query() {
        let mut q = Message::query(question());
        q.header_mut().id = 99;

        let r = Message::response_from(&q);
        assert!(r.header().response);
        assert_eq!(r.header().id, 99);
        assert_eq!(r.question(), q.question());
    }

    #[test]
    fn extended_error_requires_edns() {
        let mut with_edns = Message::query(question());
        with_edns.attach_extended_error(ExtendedError::new(crate::EdeCode::DnssecBogus));
        assert!(with_edns.edns().unwrap().extended_error.is_some());

        let mut without = Message::new(Header::default());
        without.attach_extended_error(ExtendedError::new(crate::EdeCode::DnssecBogus));
        assert!(without.edns().is_none());
    }

    #[test]
    fn answer_lookup() {
        let mut msg = Message::response_from(&Message::query(question()));
        let owner = Name::from_str("example.com").unwrap();
        msg.add_answer(Rrset::with_rdata(
            owner.clone(),
            RecordType::A,
            300,
            RData::A(Ipv4Addr::new(192, 0, 2, 1)),
        ));

        assert!(msg.answer_for(&owner).is_some());
        assert_eq!(msg.answers_of_type(RecordType::A).count(), 1);
        assert_eq!(msg.answers_of_type(RecordType::AAAA).count(), 0);
    }
}
