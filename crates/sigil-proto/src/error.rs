//! DNS data model error types.

use thiserror::Error;

/// Result type alias for data model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced when constructing DNS data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Label exceeds maximum length of 63 bytes.
    #[error("label too long: {length} bytes exceeds maximum of 63")]
    LabelTooLong {
        /// Actual label length.
        length: usize,
    },

    /// Domain name exceeds maximum length of 255 bytes.
    #[error("name too long: {length} bytes exceeds maximum of 255")]
    NameTooLong {
        /// Actual name length in wire format.
        length: usize,
    },

    /// Invalid label character.
    #[error("invalid character '{character}' in label at position {position}")]
    InvalidLabelChar {
        /// The invalid character.
        character: char,
        /// Position in the label.
        position: usize,
    },

    /// A stored name may not contain compression pointers.
    #[error("compression pointer in stored name at offset {offset}")]
    CompressionPointer {
        /// Byte offset of the pointer.
        offset: usize,
    },

    /// Truncated or malformed wire data for a name.
    #[error("unexpected end of name data at offset {offset}")]
    UnexpectedEof {
        /// Byte offset where the data ended.
        offset: usize,
    },

    /// Invalid RDATA content.
    #[error("invalid RDATA for {rtype}: {message}")]
    InvalidRData {
        /// Record type.
        rtype: &'static str,
        /// Error description.
        message: &'static str,
    },

    /// Records added to an RRset must share owner, class and type.
    #[error("record does not belong to RRset (owner/class/type mismatch)")]
    RrsetMismatch,
}

impl Error {
    /// Convenience constructor for RDATA errors.
    pub const fn invalid_rdata(rtype: &'static str, message: &'static str) -> Self {
        Self::InvalidRData { rtype, message }
    }
}
