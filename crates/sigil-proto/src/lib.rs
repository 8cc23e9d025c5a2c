//! # Sigil DNS Data Model
//!
//! This crate provides the DNS types the sigil validation engine operates
//! on: domain names with the RFC 4034 canonical ordering, RRsets as the
//! unit of signing, message sections, and the DNSSEC record data types
//! (DNSKEY, DS, RRSIG, NSEC, NSEC3, NSEC3PARAM).
//!
//! Canonical *wire writing* is provided because signature data, DS digests
//! and NSEC3 hashes are all computed over the canonical wire form (RFC 4034
//! Section 6). Parsing complete messages off the wire is the job of the
//! embedding DNS library and is intentionally absent here.
//!
//! ## Example
//!
//! ```rust
//! use sigil_proto::{Message, Name, Question, RecordType};
//! use std::str::FromStr;
//!
//! let qname = Name::from_str("www.example.com.").unwrap();
//! let query = Message::query_dnssec(Question::new(qname, RecordType::A));
//! assert!(query.wants_dnssec());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod class;
pub mod edns;
pub mod error;
pub mod header;
pub mod message;
pub mod name;
pub mod question;
pub mod rcode;
pub mod rdata;
pub mod rrset;
pub mod rtype;

pub use class::RecordClass;
pub use edns::{Edns, EdeCode, ExtendedError};
pub use error::{Error, Result};
pub use header::Header;
pub use message::Message;
pub use name::Name;
pub use question::Question;
pub use rcode::ResponseCode;
pub use rdata::RData;
pub use rrset::Rrset;
pub use rtype::RecordType;

/// Maximum length of a DNS label (63 bytes per RFC 1035).
pub const MAX_LABEL_LENGTH: usize = 63;

/// Maximum length of a domain name in wire format (255 bytes per RFC 1035).
pub const MAX_NAME_LENGTH: usize = 255;

/// Default EDNS0 UDP payload size advertised in queries.
pub const DEFAULT_EDNS_UDP_SIZE: u16 = 4096;
