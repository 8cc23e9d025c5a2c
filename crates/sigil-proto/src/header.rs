//! DNS message header and flag bits.

use crate::rcode::ResponseCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed DNS header, minus the section counts.
///
/// Section counts are derived from the section contents by
/// [`crate::Message`], so the header only carries identity, flags and the
/// response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Header {
    /// Message identifier.
    pub id: u16,
    /// QR: true for responses.
    pub response: bool,
    /// AA: authoritative answer.
    pub authoritative: bool,
    /// TC: message was truncated.
    pub truncated: bool,
    /// RD: recursion desired.
    pub recursion_desired: bool,
    /// RA: recursion available.
    pub recursion_available: bool,
    /// AD: authentic data (RFC 4035 Section 3.2.3).
    pub authentic_data: bool,
    /// CD: checking disabled (RFC 4035 Section 3.2.2).
    pub checking_disabled: bool,
    /// Response code.
    pub rcode: ResponseCode,
}

impl Header {
    const QR: u16 = 0x8000;
    const AA: u16 = 0x0400;
    const TC: u16 = 0x0200;
    const RD: u16 = 0x0100;
    const RA: u16 = 0x0080;
    const AD: u16 = 0x0020;
    const CD: u16 = 0x0010;

    /// Creates a query header with recursion desired.
    pub fn query() -> Self {
        Self {
            recursion_desired: true,
            ..Self::default()
        }
    }

    /// Creates a response header mirroring a query header.
    pub fn response_from(query: &Header) -> Self {
        Self {
            id: query.id,
            response: true,
            recursion_desired: query.recursion_desired,
            recursion_available: true,
            checking_disabled: query.checking_disabled,
            ..Self::default()
        }
    }

    /// Encodes the flag word (opcode is always QUERY).
    pub fn flags_word(&self) -> u16 {
        let mut w = u16::from(self.rcode.to_u8() & 0x0F);
        if self.response {
            w |= Self::QR;
        }
        if self.authoritative {
            w |= Self::AA;
        }
        if self.truncated {
            w |= Self::TC;
        }
        if self.recursion_desired {
            w |= Self::RD;
        }
        if self.recursion_available {
            w |= Self::RA;
        }
        if self.authentic_data {
            w |= Self::AD;
        }
        if self.checking_disabled {
            w |= Self::CD;
        }
        w
    }

    /// Decodes a flag word.
    pub fn from_flags_word(id: u16, w: u16) -> Self {
        Self {
            id,
            response: w & Self::QR != 0,
            authoritative: w & Self::AA != 0,
            truncated: w & Self::TC != 0,
            recursion_desired: w & Self::RD != 0,
            recursion_available: w & Self::RA != 0,
            authentic_data: w & Self::AD != 0,
            checking_disabled: w & Self::CD != 0,
            rcode: ResponseCode::try_from((w & 0x000F) as u8)
                .unwrap_or(ResponseCode::ServFail),
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id {} {} {}",
            self.id,
            if self.response { "qr" } else { "query" },
            self.rcode
        )?;
        if self.authentic_data {
            write!(f, " ad")?;
        }
        if self.checking_disabled {
            write!(f, " cd")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_word_roundtrip() {
        let mut h = Header::query();
        h.id = 0x1234;
        h.response = true;
        h.authentic_data = true;
        h.rcode = ResponseCode::NXDomain;

        let decoded = Header::from_flags_word(h.id, h.flags_word());
        assert_eq!(h, decoded);
    }

    #[test]
    fn response_mirrors_query() {
        let mut q = Header::query();
        q.id = 7;
        q.checking_disabled = true;

        let r = Header::response_from(&q);
        assert!(r.response);
        assert_eq!(r.id, 7);
        assert!(r.recursion_desired);
        assert!(r.checking_disabled);
        assert!(!r.authentic_data);
    }
}
