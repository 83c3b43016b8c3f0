//! Leaf value types for the Ember+ DOM

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value held by a leaf node of the tree
///
/// Integers are split into 32-bit and 64-bit variants: the wire format does
/// not distinguish them, so decoders pick the 64-bit variant only when the
/// encoded form occupies more than four bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LeafValue {
    /// Boolean value
    Boolean(bool),
    /// Integer, 32-bit
    Integer32(i32),
    /// Integer, 64-bit
    Integer64(i64),
    /// IEEE754 double
    Real(f64),
    /// UTF-8 string
    Utf8String(String),
    /// Octet string
    OctetString(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Object identifier (subidentifier chain)
    ObjectIdentifier(Vec<u32>),
    /// Relative object identifier
    RelativeOid(Vec<u32>),
}

/// Kind enumeration for [`LeafValue`]
///
/// `Integer` covers both integer widths; the split is a decode-time policy,
/// not a distinct kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeafKind {
    Boolean,
    Integer,
    Real,
    Utf8String,
    OctetString,
    ObjectIdentifier,
    RelativeOid,
}

impl LeafValue {
    /// Get the kind of this value
    pub fn kind(&self) -> LeafKind {
        match self {
            LeafValue::Boolean(_) => LeafKind::Boolean,
            LeafValue::Integer32(_) | LeafValue::Integer64(_) => LeafKind::Integer,
            LeafValue::Real(_) => LeafKind::Real,
            LeafValue::Utf8String(_) => LeafKind::Utf8String,
            LeafValue::OctetString(_) => LeafKind::OctetString,
            LeafValue::ObjectIdentifier(_) => LeafKind::ObjectIdentifier,
            LeafValue::RelativeOid(_) => LeafKind::RelativeOid,
        }
    }

    /// Get the boolean value, if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            LeafValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the integer value widened to 64 bits, if this is an integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            LeafValue::Integer32(v) => Some(i64::from(*v)),
            LeafValue::Integer64(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the real value, if this is a real
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LeafValue::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the string value, if this is a UTF-8 string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LeafValue::Utf8String(v) => Some(v),
            _ => None,
        }
    }

    /// Get the raw bytes, if this is an octet string
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            LeafValue::OctetString(v) => Some(v),
            _ => None,
        }
    }

    /// Get the subidentifier chain, if this is an OID or relative OID
    pub fn as_oid(&self) -> Option<&[u32]> {
        match self {
            LeafValue::ObjectIdentifier(v) | LeafValue::RelativeOid(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for LeafValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafValue::Boolean(v) => write!(f, "{}", v),
            LeafValue::Integer32(v) => write!(f, "{}", v),
            LeafValue::Integer64(v) => write!(f, "{}", v),
            LeafValue::Real(v) => write!(f, "{}", v),
            LeafValue::Utf8String(v) => write!(f, "{:?}", v),
            LeafValue::OctetString(v) => {
                for byte in v {
                    write!(f, "{:02X}", byte)?;
                }
                Ok(())
            }
            LeafValue::ObjectIdentifier(v) | LeafValue::RelativeOid(v) => {
                let parts: Vec<String> = v.iter().map(|n| n.to_string()).collect();
                write!(f, "{}", parts.join("."))
            }
        }
    }
}

impl From<bool> for LeafValue {
    fn from(v: bool) -> Self {
        LeafValue::Boolean(v)
    }
}

impl From<i32> for LeafValue {
    fn from(v: i32) -> Self {
        LeafValue::Integer32(v)
    }
}

impl From<i64> for LeafValue {
    fn from(v: i64) -> Self {
        LeafValue::Integer64(v)
    }
}

impl From<f64> for LeafValue {
    fn from(v: f64) -> Self {
        LeafValue::Real(v)
    }
}

impl From<String> for LeafValue {
    fn from(v: String) -> Self {
        LeafValue::Utf8String(v)
    }
}

impl From<&str> for LeafValue {
    fn from(v: &str) -> Self {
        LeafValue::Utf8String(v.to_string())
    }
}

impl From<Vec<u8>> for LeafValue {
    fn from(v: Vec<u8>) -> Self {
        LeafValue::OctetString(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind() {
        assert_eq!(LeafValue::Boolean(true).kind(), LeafKind::Boolean);
        assert_eq!(LeafValue::Integer32(1).kind(), LeafKind::Integer);
        assert_eq!(LeafValue::Integer64(1).kind(), LeafKind::Integer);
        assert_eq!(LeafValue::from("x").kind(), LeafKind::Utf8String);
    }

    #[test]
    fn test_as_i64_widens() {
        assert_eq!(LeafValue::Integer32(-5).as_i64(), Some(-5));
        assert_eq!(LeafValue::Integer64(1 << 40).as_i64(), Some(1 << 40));
        assert_eq!(LeafValue::Boolean(true).as_i64(), None);
    }

    #[test]
    fn test_display_oid() {
        let v = LeafValue::ObjectIdentifier(vec![1, 3, 6, 1]);
        assert_eq!(format!("{}", v), "1.3.6.1");
    }
}
