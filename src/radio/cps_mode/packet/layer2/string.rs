use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::StringQuery;
use crate::{
    error::ProtocolError,
    radio::common::payload::{read_reserved, Payload},
};

pub fn pack_get_string_request(selector: u8) -> Vec<u8> {
    vec![selector]
}

pub fn unpack_get_string_request(query: StringQuery, data: &[u8]) -> Result<Payload, ProtocolError> {
    match data {
        [selector] => Ok(Payload::GetString {
            query,
            selector: *selector,
        }),
        _ => Err(ProtocolError::LengthMismatch {
            field: "string request",
            expected: 1,
            found: data.len(),
        }),
    }
}

pub fn pack_get_string_response(unk1: u8, selector: u8, s: &str) -> Vec<u8> {
    let mut ret = Vec::with_capacity(8 + 2 * s.len());

    ret.push(unk1);
    ret.extend([0u8; 3]);
    ret.push(selector);
    ret.extend([0u8; 3]);

    for x in s.encode_utf16() {
        // Writing into a Vec cannot fail.
        let _ = ret.write_u16::<LittleEndian>(x);
    }

    ret
}

pub fn unpack_get_string_response(
    query: StringQuery,
    data: &[u8],
) -> Result<Payload, ProtocolError> {
    let mut cursor = Cursor::new(data);

    let unk1 = cursor.read_u8()?;

    read_reserved(&mut cursor, "string response padding", &[0u8; 3])?;

    let selector = cursor.read_u8()?;

    read_reserved(&mut cursor, "string response padding", &[0u8; 3])?;

    let remaining = data.len() - cursor.position() as usize;

    if remaining % 2 == 1 {
        return Err(ProtocolError::InvalidString);
    }

    let mut char_buf = vec![0u16; remaining >> 1];

    cursor.read_u16_into::<LittleEndian>(&mut char_buf)?;

    let text = String::from_utf16(&char_buf).map_err(|_| ProtocolError::InvalidString)?;

    Ok(Payload::GetStringResponse {
        query,
        unk1,
        selector,
        text,
    })
}
