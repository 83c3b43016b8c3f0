//! Primitive content codecs
//!
//! Pure functions shared by the streaming reader, the synchronous decoder
//! and the tree encoder. Encoders produce minimal content bytes; parsers
//! accept exactly the encoded forms described by X.690 for the Ember+
//! subset. All multi-byte arithmetic is explicit big-endian; nothing here
//! depends on host byte order.

use crate::types::{universal, BerClass, BerLength, BerTag};
use crate::{codes, decode_error};
use ember_core::{ByteSource, EmberError, EmberResult, LeafKind, LeafValue};

/// Maximum number of tag continuation octets accepted on decode.
pub const MAX_TAG_OCTETS: usize = 12;

/// Maximum total number of length octets accepted on decode.
pub const MAX_LENGTH_OCTETS: usize = 5;

fn invalid(message: impl Into<String>) -> EmberError {
    decode_error(codes::INVALID_VALUE, message, "root".to_string())
}

/// Universal type number used to encode a leaf kind.
pub fn universal_type_of(kind: LeafKind) -> u32 {
    match kind {
        LeafKind::Boolean => universal::BOOLEAN,
        LeafKind::Integer => universal::INTEGER,
        LeafKind::Real => universal::REAL,
        LeafKind::Utf8String => universal::UTF8_STRING,
        LeafKind::OctetString => universal::OCTET_STRING,
        LeafKind::ObjectIdentifier => universal::OBJECT_IDENTIFIER,
        LeafKind::RelativeOid => universal::RELATIVE_OID,
    }
}

/// Encode a boolean content octet.
pub fn boolean_bytes(value: bool) -> Vec<u8> {
    vec![if value { 0xFF } else { 0x00 }]
}

/// Parse a boolean content octet.
pub fn parse_boolean(data: &[u8]) -> EmberResult<bool> {
    if data.len() != 1 {
        return Err(invalid(format!(
            "boolean content must be one octet, got {}",
            data.len()
        )));
    }
    Ok(data[0] != 0)
}

/// Encode an integer as minimal two's complement content bytes.
///
/// A leading zero octet is kept when the top bit of a positive value's
/// leading byte would otherwise read as a sign bit; the mirror rule applies
/// to 0xFF octets of negative values.
pub fn integer_bytes(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    if value >= 0 {
        while start < 7 && bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0 {
            start += 1;
        }
    } else {
        while start < 7 && bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0 {
            start += 1;
        }
    }
    bytes[start..].to_vec()
}

/// Parse two's complement integer content bytes.
pub fn parse_integer(data: &[u8]) -> EmberResult<i64> {
    if data.is_empty() {
        return Err(invalid("empty integer content"));
    }
    if data.len() > 8 {
        return Err(invalid(format!(
            "integer content of {} octets exceeds 64 bits",
            data.len()
        )));
    }
    let mut value: i64 = if data[0] & 0x80 != 0 { -1 } else { 0 };
    for &byte in data {
        value = (value << 8) | i64::from(byte);
    }
    Ok(value)
}

/// Encode an IEEE754 double as X.690 binary-real content bytes.
///
/// Zero encodes as empty content; the infinities and NaN use their one-byte
/// special forms. Finite values carry a base-2 preamble, the unbiased
/// exponent as two's complement, and the mantissa with the implicit leading
/// bit made explicit and trailing zero bits trimmed.
pub fn real_bytes(value: f64) -> Vec<u8> {
    if value == 0.0 {
        return Vec::new();
    }
    if value.is_infinite() {
        return vec![if value > 0.0 { 0x40 } else { 0x41 }];
    }
    if value.is_nan() {
        return vec![0x42];
    }

    let bits = value.to_bits();
    let negative = bits & 0x8000_0000_0000_0000 != 0;
    let exponent = ((bits >> 52) & 0x7FF) as i64 - 1023;
    let mut mantissa = (bits & 0x000F_FFFF_FFFF_FFFF) | 0x0010_0000_0000_0000;
    while mantissa & 0xFF == 0 {
        mantissa >>= 8;
    }
    while mantissa & 0x01 == 0 {
        mantissa >>= 1;
    }

    let exponent_bytes = integer_bytes(exponent);
    let mut out = Vec::with_capacity(1 + exponent_bytes.len() + 7);
    out.push(0x80 | if negative { 0x40 } else { 0x00 } | (exponent_bytes.len() - 1) as u8);
    out.extend_from_slice(&exponent_bytes);
    let mantissa_bytes = mantissa.to_be_bytes();
    let first = mantissa_bytes
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(mantissa_bytes.len() - 1);
    out.extend_from_slice(&mantissa_bytes[first..]);
    out
}

/// Parse X.690 binary-real content bytes back into an IEEE754 double.
pub fn parse_real(data: &[u8]) -> EmberResult<f64> {
    if data.is_empty() {
        return Ok(0.0);
    }
    if data.len() == 1 {
        return match data[0] {
            0x40 => Ok(f64::INFINITY),
            0x41 => Ok(f64::NEG_INFINITY),
            0x42 => Ok(f64::NAN),
            other => Err(invalid(format!(
                "unrecognized one-octet real form 0x{:02X}",
                other
            ))),
        };
    }

    let preamble = data[0];
    if preamble & 0x80 == 0 {
        return Err(invalid("only binary real encodings are supported"));
    }
    if preamble & 0x03 == 0x03 {
        return Err(invalid("extended exponent length is not supported"));
    }
    let exponent_len = (preamble & 0x03) as usize + 1;
    if data.len() < 1 + exponent_len + 1 {
        return Err(invalid("truncated real content"));
    }

    let mut exponent = i64::from(data[1] as i8);
    for &byte in &data[2..1 + exponent_len] {
        exponent = (exponent << 8) | i64::from(byte);
    }

    let mut mantissa: u64 = 0;
    for &byte in &data[1 + exponent_len..] {
        mantissa = mantissa
            .checked_shl(8)
            .filter(|m| *m >> 8 == mantissa)
            .ok_or_else(|| invalid("real mantissa too wide"))?
            | u64::from(byte);
    }
    if mantissa == 0 {
        return Err(invalid("zero mantissa in binary real"));
    }
    if mantissa >= 1 << 53 {
        return Err(invalid("real mantissa too wide"));
    }
    while mantissa & 0x7FF0_0000_0000_0000 == 0 {
        mantissa <<= 1;
    }
    mantissa &= 0x000F_FFFF_FFFF_FFFF;

    let biased = exponent + 1023;
    if !(0..=0x7FF).contains(&biased) {
        return Err(invalid(format!("real exponent {} out of range", exponent)));
    }
    let sign = if preamble & 0x40 != 0 { 1u64 << 63 } else { 0 };
    Ok(f64::from_bits(sign | (biased as u64) << 52 | mantissa))
}

fn push_subidentifier(out: &mut Vec<u8>, value: u32) {
    let mut chunks = Vec::new();
    let mut remaining = value;
    loop {
        chunks.push((remaining & 0x7F) as u8);
        remaining >>= 7;
        if remaining == 0 {
            break;
        }
    }
    for (i, &chunk) in chunks.iter().rev().enumerate() {
        if i < chunks.len() - 1 {
            out.push(chunk | 0x80);
        } else {
            out.push(chunk);
        }
    }
}

/// Encode an object identifier; the first two components combine as
/// `x * 40 + y`, the rest follow as base-128 subidentifiers.
pub fn oid_bytes(subids: &[u32]) -> EmberResult<Vec<u8>> {
    if subids.len() < 2 {
        return Err(EmberError::InvalidData(
            "object identifier needs at least 2 components".to_string(),
        ));
    }
    let first = subids[0]
        .checked_mul(40)
        .and_then(|x| x.checked_add(subids[1]))
        .ok_or_else(|| EmberError::InvalidData("OID component too large".to_string()))?;
    let mut out = Vec::new();
    push_subidentifier(&mut out, first);
    for &subid in &subids[2..] {
        push_subidentifier(&mut out, subid);
    }
    Ok(out)
}

/// Parse object identifier content bytes.
pub fn parse_oid(data: &[u8]) -> EmberResult<Vec<u32>> {
    let raw = parse_relative_oid(data)?;
    if raw.is_empty() {
        return Err(invalid("empty object identifier content"));
    }
    let first = raw[0];
    let (x, y) = if first < 80 {
        (first / 40, first % 40)
    } else {
        (2, first - 80)
    };
    let mut out = Vec::with_capacity(raw.len() + 1);
    out.push(x);
    out.push(y);
    out.extend_from_slice(&raw[1..]);
    Ok(out)
}

/// Encode a relative object identifier as a plain base-128 chain.
pub fn relative_oid_bytes(subids: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    for &subid in subids {
        push_subidentifier(&mut out, subid);
    }
    out
}

/// Parse relative object identifier content bytes.
pub fn parse_relative_oid(data: &[u8]) -> EmberResult<Vec<u32>> {
    let mut out = Vec::new();
    let mut acc: u64 = 0;
    let mut octets = 0;
    for &byte in data {
        octets += 1;
        if octets > 5 {
            return Err(invalid("OID subidentifier exceeds 5 octets"));
        }
        acc = (acc << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            if acc > u64::from(u32::MAX) {
                return Err(invalid("OID subidentifier out of range"));
            }
            out.push(acc as u32);
            acc = 0;
            octets = 0;
        }
    }
    if octets != 0 {
        return Err(invalid("truncated OID subidentifier"));
    }
    Ok(out)
}

/// Encode the content bytes of a leaf value.
pub fn leaf_value_bytes(value: &LeafValue) -> EmberResult<Vec<u8>> {
    Ok(match value {
        LeafValue::Boolean(v) => boolean_bytes(*v),
        LeafValue::Integer32(v) => integer_bytes(i64::from(*v)),
        LeafValue::Integer64(v) => integer_bytes(*v),
        LeafValue::Real(v) => real_bytes(*v),
        LeafValue::Utf8String(v) => v.as_bytes().to_vec(),
        LeafValue::OctetString(v) => v.clone(),
        LeafValue::ObjectIdentifier(v) => oid_bytes(v)?,
        LeafValue::RelativeOid(v) => relative_oid_bytes(v),
    })
}

/// Parse leaf content bytes according to the expected kind.
///
/// Integer content wider than four octets yields the 64-bit variant; this is
/// the only place the width policy is applied.
pub fn parse_leaf_value(kind: LeafKind, data: &[u8]) -> EmberResult<LeafValue> {
    Ok(match kind {
        LeafKind::Boolean => LeafValue::Boolean(parse_boolean(data)?),
        LeafKind::Integer => {
            let value = parse_integer(data)?;
            if data.len() > 4 {
                LeafValue::Integer64(value)
            } else {
                LeafValue::Integer32(value as i32)
            }
        }
        LeafKind::Real => LeafValue::Real(parse_real(data)?),
        LeafKind::Utf8String => LeafValue::Utf8String(
            String::from_utf8(data.to_vec())
                .map_err(|_| invalid("invalid UTF-8 in string content"))?,
        ),
        LeafKind::OctetString => LeafValue::OctetString(data.to_vec()),
        LeafKind::ObjectIdentifier => LeafValue::ObjectIdentifier(parse_oid(data)?),
        LeafKind::RelativeOid => LeafValue::RelativeOid(parse_relative_oid(data)?),
    })
}

/// Read a tag from a byte source.
///
/// Returns the tag and the number of bytes consumed.
pub fn read_tag(source: &mut dyn ByteSource) -> EmberResult<(BerTag, usize)> {
    let first = source.read_byte()?;
    read_tag_tail(first, source)
}

/// Read the remainder of a tag whose leading octet is already in hand.
pub fn read_tag_tail(first: u8, source: &mut dyn ByteSource) -> EmberResult<(BerTag, usize)> {
    let class = BerClass::from_bits(first);
    let container = first & 0x20 != 0;
    let bits = first & 0x1F;
    let (number, consumed) = if bits < 0x1F {
        (u32::from(bits), 1)
    } else {
        let mut acc: u64 = 0;
        let mut octets = 0;
        loop {
            let byte = source.read_byte()?;
            octets += 1;
            if octets > MAX_TAG_OCTETS {
                return Err(decode_error(
                    codes::TAG_TOO_LONG,
                    format!("tag exceeds {} continuation octets", MAX_TAG_OCTETS),
                    "root".to_string(),
                ));
            }
            acc = (acc << 7) | u64::from(byte & 0x7F);
            if acc > u64::from(u32::MAX) {
                return Err(decode_error(
                    codes::TAG_TOO_LONG,
                    "tag number out of range",
                    "root".to_string(),
                ));
            }
            if byte & 0x80 == 0 {
                break;
            }
        }
        (acc as u32, 1 + octets)
    };
    let tag = BerTag::new(class, number);
    Ok((if container { tag.as_container() } else { tag }, consumed))
}

/// Read a length from a byte source.
///
/// Returns the length and the number of bytes consumed.
pub fn read_length(source: &mut dyn ByteSource) -> EmberResult<(BerLength, usize)> {
    let first = source.read_byte()?;
    if first & 0x80 == 0 {
        return Ok((BerLength::Definite(first as usize), 1));
    }
    let count = (first & 0x7F) as usize;
    if count == 0 {
        return Ok((BerLength::Indefinite, 1));
    }
    if count + 1 > MAX_LENGTH_OCTETS {
        return Err(decode_error(
            codes::LENGTH_TOO_LONG,
            format!("length field exceeds {} octets", MAX_LENGTH_OCTETS),
            "root".to_string(),
        ));
    }
    let mut length: usize = 0;
    for _ in 0..count {
        length = (length << 8) | source.read_byte()? as usize;
    }
    Ok((BerLength::Definite(length), 1 + count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::MemoryBuffer;

    #[test]
    fn test_integer_bytes_minimal() {
        assert_eq!(integer_bytes(0), vec![0x00]);
        assert_eq!(integer_bytes(127), vec![0x7F]);
        assert_eq!(integer_bytes(128), vec![0x00, 0x80]);
        assert_eq!(integer_bytes(-1), vec![0xFF]);
        assert_eq!(integer_bytes(-128), vec![0x80]);
        assert_eq!(integer_bytes(-129), vec![0xFF, 0x7F]);
        assert_eq!(integer_bytes(0x1_0000_0000), vec![0x01, 0, 0, 0, 0]);
    }

    #[test]
    fn test_integer_round_trip() {
        for value in [0i64, 1, -1, 42, 300, -300, i32::MAX as i64, i64::MIN] {
            let bytes = integer_bytes(value);
            assert_eq!(parse_integer(&bytes).unwrap(), value, "value {}", value);
        }
    }

    #[test]
    fn test_integer_width_policy() {
        let small = parse_leaf_value(LeafKind::Integer, &integer_bytes(1000)).unwrap();
        assert_eq!(small, LeafValue::Integer32(1000));
        let wide = parse_leaf_value(LeafKind::Integer, &integer_bytes(1 << 40)).unwrap();
        assert_eq!(wide, LeafValue::Integer64(1 << 40));
    }

    #[test]
    fn test_real_round_trip() {
        for value in [
            0.0,
            1.0,
            -1.0,
            0.5,
            -32.25,
            1234.5678,
            f64::MAX,
            f64::MIN_POSITIVE,
        ] {
            let bytes = real_bytes(value);
            assert_eq!(parse_real(&bytes).unwrap(), value, "value {}", value);
        }
    }

    #[test]
    fn test_real_specials() {
        assert_eq!(real_bytes(f64::INFINITY), vec![0x40]);
        assert_eq!(real_bytes(f64::NEG_INFINITY), vec![0x41]);
        assert_eq!(parse_real(&[0x40]).unwrap(), f64::INFINITY);
        assert_eq!(parse_real(&[0x41]).unwrap(), f64::NEG_INFINITY);
        assert!(parse_real(&real_bytes(f64::NAN)).unwrap().is_nan());
        assert!(real_bytes(0.0).is_empty());
    }

    #[test]
    fn test_oid_round_trip() {
        let oid = vec![1, 3, 6, 1, 4, 1, 9999];
        let bytes = oid_bytes(&oid).unwrap();
        assert_eq!(parse_oid(&bytes).unwrap(), oid);
    }

    #[test]
    fn test_oid_first_pair_packing() {
        // 1.3 packs into the single octet 43
        assert_eq!(oid_bytes(&[1, 3]).unwrap(), vec![43]);
        assert_eq!(parse_oid(&[43]).unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_relative_oid_round_trip() {
        let path = vec![1, 5, 300, 7];
        let bytes = relative_oid_bytes(&path);
        assert_eq!(parse_relative_oid(&bytes).unwrap(), path);
    }

    #[test]
    fn test_relative_oid_truncated() {
        // continuation bit set on the final octet
        assert!(parse_relative_oid(&[0x81]).is_err());
    }

    #[test]
    fn test_boolean_content() {
        assert_eq!(parse_boolean(&boolean_bytes(true)).unwrap(), true);
        assert_eq!(parse_boolean(&boolean_bytes(false)).unwrap(), false);
        assert!(parse_boolean(&[]).is_err());
        assert!(parse_boolean(&[1, 0]).is_err());
    }

    #[test]
    fn test_read_tag_high_number() {
        let mut source = MemoryBuffer::from_bytes(vec![0xBF, 0x81, 0x00, 0xAA]);
        let (tag, consumed) = read_tag(&mut source).unwrap();
        assert_eq!(tag, BerTag::context(128));
        assert!(tag.is_container());
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_read_length_forms() {
        let mut source = MemoryBuffer::from_bytes(vec![0x05]);
        assert_eq!(
            read_length(&mut source).unwrap(),
            (BerLength::Definite(5), 1)
        );

        let mut source = MemoryBuffer::from_bytes(vec![0x82, 0x01, 0x2C]);
        assert_eq!(
            read_length(&mut source).unwrap(),
            (BerLength::Definite(300), 3)
        );

        let mut source = MemoryBuffer::from_bytes(vec![0x80]);
        assert_eq!(read_length(&mut source).unwrap(), (BerLength::Indefinite, 1));
    }

    #[test]
    fn test_read_length_too_long() {
        let mut source = MemoryBuffer::from_bytes(vec![0x85, 1, 2, 3, 4, 5]);
        let err = read_length(&mut source).unwrap_err();
        assert_eq!(err.decode_code(), Some(codes::LENGTH_TOO_LONG));
    }
}
