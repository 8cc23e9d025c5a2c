//! # Sigil DNSSEC Validation Engine
//!
//! A validating stub resolver core: given DNS responses obtained from an
//! untrusted upstream recursive resolver, the engine decides whether each
//! response is cryptographically authentic, provably nonexistent, or
//! bogus, per RFC 4033–4035, RFC 5155 (NSEC3) and RFC 6840.
//!
//! The engine never iterates on its own; the only outbound queries it
//! issues through the [`Upstream`] capability are the DS and DNSKEY
//! fetches needed to build a chain of trust from a configured anchor down
//! to the zone that signed a response.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sigil_validator::{TrustAnchorStore, Validator, ValidatorConfig};
//! use sigil_proto::{Message, Name, Question, RecordType};
//!
//! let mut anchors = TrustAnchorStore::new();
//! anchors.add_ds(Name::root(), root_ds);
//!
//! let validator = Validator::new(anchors, ValidatorConfig::default());
//! let query = Message::query_dnssec(Question::new(qname, RecordType::A));
//!
//! // `upstream` is anything implementing sigil_validator::Upstream.
//! let response = validator.resolve(&query, &upstream).await;
//! assert!(response.header().authentic_data);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod anchors;
mod chain;
pub mod classify;
pub mod config;
pub mod crypto;
mod engine;
pub mod keycache;
pub mod nsec;
pub mod nsec3;
pub mod status;
mod validate;
pub mod verify;

pub use anchors::{TrustAnchor, TrustAnchorStore};
pub use classify::ResponseClass;
pub use config::ValidatorConfig;
pub use engine::{Upstream, UpstreamError, Validator};
pub use keycache::{KeyCache, KeyEntry, KeyEntryKind};
pub use status::{Reason, SecMessage, SecRrset, SecurityStatus};
