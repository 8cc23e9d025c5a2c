//! DNS domain names with DNSSEC ordering semantics.
//!
//! Names are kept in uncompressed wire format. Comparison is
//! case-insensitive per RFC 1035, and the total order implemented by `Ord`
//! is the canonical DNS name order of RFC 4034 Section 6.1, which the
//! NSEC denial-of-existence proofs depend on.

use crate::error::{Error, Result};
use crate::{MAX_LABEL_LENGTH, MAX_NAME_LENGTH};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A fully-qualified DNS domain name.
///
/// The name is stored as its uncompressed wire form (length-prefixed labels
/// terminated by the root label). Most names fit the inline buffer without
/// a heap allocation.
#[derive(Clone)]
pub struct Name {
    /// Wire-format bytes, always terminated by the root label.
    wire: SmallVec<[u8; 64]>,
    /// Number of labels including the root label.
    label_count: u8,
}

impl Name {
    /// Creates the root domain name.
    pub fn root() -> Self {
        let mut wire = SmallVec::new();
        wire.push(0);
        Self {
            wire,
            label_count: 1,
        }
    }

    /// Creates a name from uncompressed wire-format bytes.
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        let mut pos = 0;
        let mut labels = 0u8;

        loop {
            if pos >= bytes.len() {
                return Err(Error::UnexpectedEof { offset: pos });
            }
            let len = bytes[pos] as usize;
            if len == 0 {
                labels += 1;
                pos += 1;
                break;
            }
            if len >= 0xC0 {
                return Err(Error::CompressionPointer { offset: pos });
            }
            if len > MAX_LABEL_LENGTH {
                return Err(Error::LabelTooLong { length: len });
            }
            pos += 1 + len;
            if pos > bytes.len() {
                return Err(Error::UnexpectedEof { offset: pos });
            }
            labels += 1;
        }

        if pos > MAX_NAME_LENGTH {
            return Err(Error::NameTooLong { length: pos });
        }

        Ok(Self {
            wire: SmallVec::from_slice(&bytes[..pos]),
            label_count: labels,
        })
    }

    /// Returns the wire-format representation, including the root label.
    #[inline]
    pub fn as_wire(&self) -> &[u8] {
        &self.wire
    }

    /// Returns the wire-format length.
    #[inline]
    pub fn wire_len(&self) -> usize {
        self.wire.len()
    }

    /// Returns the number of labels including the root label.
    ///
    /// The root name has a label count of 1, `example.com.` has 3.
    #[inline]
    pub const fn label_count(&self) -> usize {
        self.label_count as usize
    }

    /// Returns the number of labels excluding the root label.
    #[inline]
    pub const fn non_root_labels(&self) -> usize {
        self.label_count as usize - 1
    }

    /// Returns true if this is the root domain.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.label_count == 1
    }

    /// Returns true if the leftmost label is `*`.
    pub fn is_wildcard(&self) -> bool {
        self.labels().next().map(|l| l == b"*").unwrap_or(false)
    }

    /// Iterates over the labels, leftmost first, excluding the root label.
    pub fn labels(&self) -> impl Iterator<Item = &[u8]> {
        LabelIter {
            wire: &self.wire,
            pos: 0,
        }
    }

    /// Returns the parent name (leftmost label removed).
    ///
    /// Returns `None` for the root domain.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let first_len = self.wire[0] as usize;
        Some(Self {
            wire: SmallVec::from_slice(&self.wire[1 + first_len..]),
            label_count: self.label_count - 1,
        })
    }

    /// Returns the ancestor consisting of the trailing `labels` non-root
    /// labels.
    ///
    /// `ancestor_at(0)` is the root; for `www.example.com.`,
    /// `ancestor_at(2)` is `example.com.`. Returns `None` if the name has
    /// fewer labels.
    pub fn ancestor_at(&self, labels: usize) -> Option<Self> {
        if labels > self.non_root_labels() {
            return None;
        }
        let mut name = self.clone();
        while name.non_root_labels() > labels {
            name = name.parent()?;
        }
        Some(name)
    }

    /// Returns the name with the leading `strip` labels replaced by `*`.
    ///
    /// This reconstructs the generating wildcard of an expanded RRset: for
    /// `a.b.example.com.` and `strip` = 2 the result is `*.example.com.`.
    pub fn wild(&self, strip: usize) -> Result<Self> {
        let base = self
            .ancestor_at(self.non_root_labels().saturating_sub(strip))
            .unwrap_or_else(Self::root);
        base.prepend_label("*")
    }

    /// Returns a new name with `label` prepended.
    pub fn prepend_label(&self, label: &str) -> Result<Self> {
        if label.is_empty() || label.len() > MAX_LABEL_LENGTH {
            return Err(Error::LabelTooLong {
                length: label.len(),
            });
        }

        let new_len = 1 + label.len() + self.wire.len();
        if new_len > MAX_NAME_LENGTH {
            return Err(Error::NameTooLong { length: new_len });
        }

        let mut wire = SmallVec::with_capacity(new_len);
        wire.push(label.len() as u8);
        wire.extend_from_slice(label.as_bytes());
        wire.extend_from_slice(&self.wire);

        Ok(Self {
            wire,
            label_count: self.label_count + 1,
        })
    }

    /// Returns true if this name equals `other` or sits below it.
    pub fn is_subdomain_of(&self, other: &Name) -> bool {
        if self.label_count < other.label_count {
            return false;
        }
        let skip = self.non_root_labels() - other.non_root_labels();
        self.labels()
            .skip(skip)
            .zip(other.labels())
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// Returns true if this name sits strictly below `other`.
    pub fn is_strict_subdomain_of(&self, other: &Name) -> bool {
        self.label_count > other.label_count && self.is_subdomain_of(other)
    }

    /// Returns the longest ancestor shared with `other`.
    pub fn common_ancestor(&self, other: &Name) -> Self {
        let a: Vec<&[u8]> = self.labels().collect();
        let b: Vec<&[u8]> = other.labels().collect();

        let mut shared = 0;
        for (la, lb) in a.iter().rev().zip(b.iter().rev()) {
            if la.eq_ignore_ascii_case(lb) {
                shared += 1;
            } else {
                break;
            }
        }

        self.ancestor_at(shared).unwrap_or_else(Self::root)
    }

    /// Lowercases the name in place.
    pub fn make_lowercase(&mut self) {
        for byte in self.wire.iter_mut() {
            byte.make_ascii_lowercase();
        }
    }

    /// Returns a lowercased copy of the name.
    #[must_use]
    pub fn lowercased(&self) -> Self {
        let mut copy = self.clone();
        copy.make_lowercase();
        copy
    }

    /// Appends the wire form to a buffer.
    pub fn write_wire(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&self.wire);
    }

    /// Appends the canonical (lowercased) wire form to a buffer.
    pub fn write_canonical(&self, buf: &mut BytesMut) {
        let start = buf.len();
        buf.extend_from_slice(&self.wire);
        buf[start..].make_ascii_lowercase();
    }
}

struct LabelIter<'a> {
    wire: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for LabelIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let len = *self.wire.get(self.pos)? as usize;
        if len == 0 {
            return None;
        }
        let start = self.pos + 1;
        self.pos = start + len;
        self.wire.get(start..start + len)
    }
}

impl FromStr for Name {
    type Err = Error;

    /// Parses a name from dotted presentation format.
    ///
    /// A trailing dot is accepted and implied when absent; every name is
    /// fully qualified.
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s == "." {
            return Ok(Self::root());
        }

        let s = s.strip_suffix('.').unwrap_or(s);
        let mut wire = SmallVec::<[u8; 64]>::new();
        let mut label_count = 1u8; // root

        for part in s.split('.') {
            if part.is_empty() || part.len() > MAX_LABEL_LENGTH {
                return Err(Error::LabelTooLong { length: part.len() });
            }
            for (i, c) in part.chars().enumerate() {
                if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '*' {
                    return Err(Error::InvalidLabelChar {
                        character: c,
                        position: i,
                    });
                }
            }
            wire.push(part.len() as u8);
            wire.extend_from_slice(part.as_bytes());
            label_count += 1;
        }

        wire.push(0);
        if wire.len() > MAX_NAME_LENGTH {
            return Err(Error::NameTooLong { length: wire.len() });
        }

        Ok(Self { wire, label_count })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, ".");
        }
        for label in self.labels() {
            for &b in label {
                if b.is_ascii_graphic() && b != b'.' {
                    write!(f, "{}", b as char)?;
                } else {
                    write!(f, "\\{:03}", b)?;
                }
            }
            write!(f, ".")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name(\"{}\")", self)
    }
}

impl PartialEq for Name {
    /// Case-insensitive comparison per DNS semantics.
    fn eq(&self, other: &Self) -> bool {
        self.label_count == other.label_count
            && self.wire.len() == other.wire.len()
            && self.wire.eq_ignore_ascii_case(&other.wire)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for &b in self.wire.iter() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    /// Canonical DNS name ordering (RFC 4034 Section 6.1).
    ///
    /// Names are compared by label from the root towards the leaf; labels
    /// compare as lowercased unsigned byte strings; a name that is a proper
    /// prefix sorts first.
    fn cmp(&self, other: &Self) -> Ordering {
        let a: Vec<&[u8]> = self.labels().collect();
        let b: Vec<&[u8]> = other.labels().collect();

        for (la, lb) in a.iter().rev().zip(b.iter().rev()) {
            let cmp = cmp_label(la, lb);
            if cmp != Ordering::Equal {
                return cmp;
            }
        }

        a.len().cmp(&b.len())
    }
}

fn cmp_label(a: &[u8], b: &[u8]) -> Ordering {
    let lhs = a.iter().map(u8::to_ascii_lowercase);
    let rhs = b.iter().map(u8::to_ascii_lowercase);
    lhs.cmp(rhs)
}

impl Default for Name {
    fn default() -> Self {
        Self::root()
    }
}

impl Serialize for Name {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
