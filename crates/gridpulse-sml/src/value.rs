//! TLV primitives: type-length fields, octet strings and the scalar
//! `Value` choice.
//!
//! SML prefixes every element with a type-length (TL) field: type in bits
//! 6-4, length in bits 3-0, bit 7 marking a continuation TL byte carrying
//! four more length bits. For octet strings and scalars the length counts
//! the TL bytes themselves; for lists it counts the entries. A bare `0x01`
//! (octet string of zero content) marks an omitted optional field, and
//! `0x00` ends a message.

use std::fmt;

use data_encoding::HEXUPPER_PERMISSIVE;

use crate::cursor::ParseCursor;
use crate::error::Error;

pub(crate) const TYPE_OCTET_STRING: u8 = 0x00;
pub(crate) const TYPE_BOOLEAN: u8 = 0x04;
pub(crate) const TYPE_INTEGER: u8 = 0x05;
pub(crate) const TYPE_UNSIGNED: u8 = 0x06;
pub(crate) const TYPE_LIST: u8 = 0x07;

/// Marks the end of an SML message.
pub const END_OF_MESSAGE: u8 = 0x00;

/// Marks an omitted optional field.
pub const OPTIONAL_OMITTED: u8 = 0x01;

/// A decoded type-length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TypeLength {
    pub ty: u8,
    pub len: usize,
    pub tl_bytes: usize,
}

impl TypeLength {
    /// Content bytes following the TL field. Only meaningful for
    /// non-list types, whose length includes the TL bytes.
    pub fn content_len(&self, first_byte: u8) -> Result<usize, Error> {
        self.len
            .checked_sub(self.tl_bytes)
            .ok_or(Error::InvalidTypeLength(first_byte))
    }
}

pub(crate) fn read_tl(cursor: &mut ParseCursor) -> Result<(TypeLength, u8), Error> {
    let first = cursor.try_get_u8()?;
    let ty = (first >> 4) & 0x07;
    let mut len = (first & 0x0f) as usize;
    let mut tl_bytes = 1;

    let mut cont = first & 0x80 != 0;
    while cont {
        let byte = cursor.try_get_u8()?;
        // continuation bytes carry length nibbles only
        if byte & 0x70 != 0 {
            return Err(Error::InvalidTypeLength(byte));
        }
        len = (len << 4) | (byte & 0x0f) as usize;
        tl_bytes += 1;
        if tl_bytes > 4 {
            return Err(Error::OverlongTypeLength);
        }
        cont = byte & 0x80 != 0;
    }

    Ok((TypeLength { ty, len, tl_bytes }, first))
}

/// Write a TL field for an octet string of `content_len` bytes. The
/// declared length includes the TL bytes, so widening the TL field can in
/// turn widen the length; iterate until stable.
pub(crate) fn write_octet_tl(out: &mut Vec<u8>, content_len: usize) {
    let mut tl_bytes = 1;
    loop {
        let needed = tl_bytes_for(content_len + tl_bytes);
        if needed == tl_bytes {
            break;
        }
        tl_bytes = needed;
    }
    write_tl(out, TYPE_OCTET_STRING, content_len + tl_bytes, tl_bytes);
}

/// Write a TL field for a list of `entries` elements (TL bytes excluded).
pub(crate) fn write_list_tl(out: &mut Vec<u8>, entries: usize) {
    write_tl(out, TYPE_LIST, entries, tl_bytes_for(entries));
}

fn tl_bytes_for(len: usize) -> usize {
    let mut bytes = 1;
    let mut max = 0x0f;
    while len > max {
        bytes += 1;
        max = (max << 4) | 0x0f;
    }
    bytes
}

fn write_tl(out: &mut Vec<u8>, ty: u8, len: usize, tl_bytes: usize) {
    for i in (0..tl_bytes).rev() {
        let nibble = ((len >> (4 * i)) & 0x0f) as u8;
        let mut byte = nibble;
        if i == tl_bytes - 1 {
            byte |= ty << 4;
        }
        if i > 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
}

/// An SML octet string.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct OctetStr(Vec<u8>);

impl OctetStr {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Build an octet string from a hex literal, e.g. `"8181C78501FF"`.
    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        Ok(Self(HEXUPPER_PERMISSIVE.decode(hex.as_bytes())?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn parse(cursor: &mut ParseCursor) -> Result<Self, Error> {
        let (tl, first) = read_tl(cursor)?;
        if tl.ty != TYPE_OCTET_STRING {
            return Err(Error::UnexpectedElement {
                expected: "octet string",
                found: tl.ty,
            });
        }
        let content = cursor.try_get_slice(tl.content_len(first)?)?;
        Ok(Self(content.to_vec()))
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        write_octet_tl(out, self.0.len());
        out.extend_from_slice(&self.0);
    }
}

impl fmt::Debug for OctetStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OctetStr({})", HEXUPPER_PERMISSIVE.encode(&self.0))
    }
}

impl From<&[u8]> for OctetStr {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// An SML scalar value, the implicit choice distinguished by its TL type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Bytes(OctetStr),
}

impl Value {
    /// Numeric view of the value, matching how readings are consumed:
    /// integers widen to `f64`, booleans count as 0/1, octet strings as 0.
    pub fn to_f64(&self) -> f64 {
        match self {
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Int(v) => *v as f64,
            Value::UInt(v) => *v as f64,
            Value::Bytes(_) => 0.0,
        }
    }

    pub(crate) fn parse(cursor: &mut ParseCursor) -> Result<Self, Error> {
        let (tl, first) = read_tl(cursor)?;
        match tl.ty {
            TYPE_OCTET_STRING => {
                let content = cursor.try_get_slice(tl.content_len(first)?)?;
                Ok(Value::Bytes(OctetStr(content.to_vec())))
            }
            TYPE_BOOLEAN => {
                let width = tl.content_len(first)?;
                if width != 1 {
                    return Err(Error::IntegerWidth(width));
                }
                Ok(Value::Bool(cursor.try_get_u8()? != 0))
            }
            TYPE_INTEGER => {
                let width = tl.content_len(first)?;
                Ok(Value::Int(parse_int(cursor, width)?))
            }
            TYPE_UNSIGNED => {
                let width = tl.content_len(first)?;
                Ok(Value::UInt(parse_uint(cursor, width)?))
            }
            other => Err(Error::UnexpectedElement {
                expected: "scalar value",
                found: other,
            }),
        }
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Value::Bool(b) => {
                out.push(0x42);
                out.push(if *b { 0x01 } else { 0x00 });
            }
            Value::Int(v) => {
                out.push(0x59);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Value::UInt(v) => {
                out.push(0x69);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Value::Bytes(bytes) => bytes.encode(out),
        }
    }
}

fn parse_uint(cursor: &mut ParseCursor, width: usize) -> Result<u64, Error> {
    if width == 0 || width > 8 {
        return Err(Error::IntegerWidth(width));
    }
    let mut value = 0u64;
    for &byte in cursor.try_get_slice(width)? {
        value = (value << 8) | byte as u64;
    }
    Ok(value)
}

fn parse_int(cursor: &mut ParseCursor, width: usize) -> Result<i64, Error> {
    if width == 0 || width > 8 {
        return Err(Error::IntegerWidth(width));
    }
    let bytes = cursor.try_get_slice(width)?;
    // sign-extend from the declared width
    let mut value: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
    for &byte in bytes {
        value = (value << 8) | byte as i64;
    }
    Ok(value)
}

/// Consume the `0x01` optional marker if present; returns whether the
/// field carries a value.
pub(crate) fn take_optional(cursor: &mut ParseCursor) -> Result<bool, Error> {
    if cursor.try_peek_u8()? == OPTIONAL_OMITTED {
        cursor.try_skip(1)?;
        Ok(false)
    } else {
        Ok(true)
    }
}

pub(crate) fn encode_omitted(out: &mut Vec<u8>) {
    out.push(OPTIONAL_OMITTED);
}

pub(crate) fn parse_u8(cursor: &mut ParseCursor) -> Result<u8, Error> {
    match Value::parse(cursor)? {
        Value::UInt(v) if v <= u8::MAX as u64 => Ok(v as u8),
        Value::Int(v) if (0..=u8::MAX as i64).contains(&v) => Ok(v as u8),
        _ => Err(Error::IntegerRange("u8")),
    }
}

pub(crate) fn parse_u16(cursor: &mut ParseCursor) -> Result<u16, Error> {
    match Value::parse(cursor)? {
        Value::UInt(v) if v <= u16::MAX as u64 => Ok(v as u16),
        _ => Err(Error::IntegerRange("u16")),
    }
}

pub(crate) fn parse_u32(cursor: &mut ParseCursor) -> Result<u32, Error> {
    match Value::parse(cursor)? {
        Value::UInt(v) if v <= u32::MAX as u64 => Ok(v as u32),
        _ => Err(Error::IntegerRange("u32")),
    }
}

pub(crate) fn parse_i8(cursor: &mut ParseCursor) -> Result<i8, Error> {
    match Value::parse(cursor)? {
        Value::Int(v) if (i8::MIN as i64..=i8::MAX as i64).contains(&v) => Ok(v as i8),
        Value::UInt(v) if v <= i8::MAX as u64 => Ok(v as i8),
        _ => Err(Error::IntegerRange("i8")),
    }
}

pub(crate) fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(0x62);
    out.push(value);
}

pub(crate) fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.push(0x63);
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.push(0x65);
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn write_i8(out: &mut Vec<u8>, value: i8) {
    out.push(0x52);
    out.push(value as u8);
}

/// Read past one element of any type, recursing through lists. Used to
/// tolerate message bodies and choice arms outside the supported subset.
pub(crate) fn skip_element(cursor: &mut ParseCursor) -> Result<(), Error> {
    let (tl, first) = read_tl(cursor)?;
    if tl.ty == TYPE_LIST {
        for _ in 0..tl.len {
            skip_element(cursor)?;
        }
        Ok(())
    } else {
        cursor.try_skip(tl.content_len(first)?)
    }
}

/// Expect a list TL of exactly `entries` elements.
pub(crate) fn expect_list(cursor: &mut ParseCursor, entries: usize) -> Result<(), Error> {
    let (tl, _) = read_tl(cursor)?;
    if tl.ty != TYPE_LIST {
        return Err(Error::UnexpectedElement {
            expected: "list",
            found: tl.ty,
        });
    }
    if tl.len != entries {
        return Err(Error::WrongListLength(entries, tl.len));
    }
    Ok(())
}
