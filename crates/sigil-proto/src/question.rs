//! DNS question section entry.

use crate::class::RecordClass;
use crate::name::Name;
use crate::rtype::RecordType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single question: name, type and class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Question {
    /// The name being queried.
    pub qname: Name,
    /// The record type being queried.
    pub qtype: RecordType,
    /// The record class being queried.
    pub qclass: RecordClass,
}

impl Question {
    /// Creates a new IN-class question.
    pub fn new(qname: Name, qtype: RecordType) -> Self {
        Self {
            qname,
            qtype,
            qclass: RecordClass::IN,
        }
    }

    /// Creates a question with an explicit class.
    pub fn with_class(qname: Name, qtype: RecordType, qclass: RecordClass) -> Self {
        Self {
            qname,
            qtype,
            qclass,
        }
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.qname, self.qclass, self.qtype)
    }
}
