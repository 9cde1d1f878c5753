//! Book identifiers.
//!
//! A [`BookId`] wraps the store's native 12-byte `ObjectId`. At the HTTP
//! boundary it is always the 24-character hex rendering; [`BookId::parse`] is
//! the only way in from the outside and rejects anything else before the store
//! is touched.

use crate::error::IdError;
use bson::oid::{self, ObjectId};
use std::fmt;

/// Number of hex characters in an external identifier.
pub const ID_HEX_LEN: usize = 24;

/// Store-assigned identifier of a book document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BookId(ObjectId);

impl BookId {
    /// Parse a 24-character hex string (upper or lower case).
    pub fn parse(external: &str) -> Result<Self, IdError> {
        let len = external.len();
        if len != ID_HEX_LEN {
            return Err(IdError::InvalidLength {
                expected: ID_HEX_LEN,
                actual: len,
            });
        }

        ObjectId::parse_str(external)
            .map(BookId)
            .map_err(|err| match err {
                oid::Error::InvalidHexStringCharacter { c, index, .. } => {
                    IdError::InvalidCharacter {
                        found: c,
                        position: index,
                    }
                }
                _ => IdError::InvalidLength {
                    expected: ID_HEX_LEN,
                    actual: len,
                },
            })
    }

    pub fn object_id(&self) -> ObjectId {
        self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl From<ObjectId> for BookId {
    fn from(oid: ObjectId) -> Self {
        BookId(oid)
    }
}

impl From<BookId> for ObjectId {
    fn from(id: BookId) -> Self {
        id.0
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}
