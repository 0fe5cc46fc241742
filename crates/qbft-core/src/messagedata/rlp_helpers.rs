//! Small RLP building blocks shared by the payload and message codecs.
//!
//! Decoding goes through these helpers so every structural failure is reported as
//! [`QbftError::MalformedMessage`] naming the field that could not be read.

use alloy_rlp::{BufMut, Decodable, Header, EMPTY_LIST_CODE};

use crate::error::QbftError;

pub(crate) fn decode_field<T: Decodable>(buf: &mut &[u8], field: &'static str) -> Result<T, QbftError> {
    T::decode(buf).map_err(|e| QbftError::malformed(field, e))
}

/// Reads a list header and returns the list body, leaving `buf` positioned after the list.
pub(crate) fn take_list<'a>(buf: &mut &'a [u8], field: &'static str) -> Result<&'a [u8], QbftError> {
    let header = Header::decode(buf).map_err(|e| QbftError::malformed(field, e))?;
    if !header.list {
        return Err(QbftError::malformed(field, "expected an RLP list"));
    }
    if buf.len() < header.payload_length {
        return Err(QbftError::malformed(field, "list length exceeds available input"));
    }
    let (body, rest) = buf.split_at(header.payload_length);
    *buf = rest;
    Ok(body)
}

pub(crate) fn ensure_consumed(body: &[u8], field: &'static str) -> Result<(), QbftError> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(QbftError::malformed(field, format!("{} unexpected trailing bytes", body.len())))
    }
}

/// Consumes an empty list (`0xc0`) if one is next. Used for absent optional values.
pub(crate) fn take_empty_list(buf: &mut &[u8]) -> bool {
    if buf.first() == Some(&EMPTY_LIST_CODE) {
        *buf = &buf[1..];
        true
    } else {
        false
    }
}

pub(crate) fn write_empty_list(out: &mut dyn BufMut) {
    out.put_u8(EMPTY_LIST_CODE);
}

/// Wraps an already encoded body in a list header.
pub(crate) fn write_list(body: &[u8], out: &mut dyn BufMut) {
    Header { list: true, payload_length: body.len() }.encode(out);
    out.put_slice(body);
}

/// Decodes every item of a list body.
pub(crate) fn decode_items<T>(
    mut body: &[u8],
    mut decode: impl FnMut(&mut &[u8]) -> Result<T, QbftError>,
) -> Result<Vec<T>, QbftError> {
    let mut items = Vec::new();
    while !body.is_empty() {
        items.push(decode(&mut body)?);
    }
    Ok(items)
}
