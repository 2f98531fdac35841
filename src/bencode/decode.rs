use std::collections::BTreeMap;

use super::error::BencodeError;
use crate::bencode::bvalue::BValue;

/// Decodes the first bencode value in `input`.
///
/// Returns the number of bytes consumed together with the value, so callers
/// can walk a stream of values or locate the byte range a value occupies.
pub fn decode_bencode(input: &[u8]) -> Result<(usize, BValue), BencodeError> {
    if input.is_empty() {
        return Err(BencodeError::UnexpectedEnd);
    }

    match input[0] {
        b'i' => decode_integer(input),
        b'l' => decode_list(input),
        b'd' => decode_dict(input),
        c if c.is_ascii_digit() => decode_string(input),
        c => Err(BencodeError::InvalidFormat(format!(
            "unexpected type byte: 0x{c:02x}"
        ))),
    }
}

/// Decodes `i<ascii-signed-decimal>e`.
fn decode_integer(input: &[u8]) -> Result<(usize, BValue), BencodeError> {
    let end_pos = input
        .iter()
        .position(|&b| b == b'e')
        .ok_or_else(|| BencodeError::InvalidFormat("missing 'e' for integer".to_string()))?;

    let num_str = std::str::from_utf8(&input[1..end_pos])
        .map_err(|_| BencodeError::InvalidFormat("non-ASCII data in integer".to_string()))?;

    // i0e is the only zero; -0 and leading zeros are malformed.
    let digits = num_str.strip_prefix('-').unwrap_or(num_str);
    if digits.len() > 1 && digits.starts_with('0') {
        return Err(BencodeError::InvalidInteger(format!(
            "leading zeros are not allowed: {num_str}"
        )));
    }
    if num_str == "-0" {
        return Err(BencodeError::InvalidInteger("-0 is not a valid integer".to_string()));
    }

    let parsed = num_str.parse::<i64>().map_err(|e| {
        BencodeError::InvalidInteger(format!("failed to parse integer '{num_str}': {e}"))
    })?;

    // add 1 to account for 'e'
    Ok((end_pos + 1, BValue::Integer(parsed)))
}

/// Decodes a string of the form `<length>:<bytes>`.
fn decode_string(encoded: &[u8]) -> Result<(usize, BValue), BencodeError> {
    let colon_index = encoded
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| BencodeError::InvalidFormat("missing ':' in string".to_string()))?;

    let len_str = std::str::from_utf8(&encoded[..colon_index])
        .map_err(|_| BencodeError::InvalidFormat("non-ASCII string length".to_string()))?;

    if !len_str.bytes().all(|b| b.is_ascii_digit()) || len_str.is_empty() {
        return Err(BencodeError::InvalidFormat(format!(
            "invalid string length: {len_str:?}"
        )));
    }

    let length = len_str.parse::<usize>().map_err(|e| {
        BencodeError::InvalidFormat(format!("invalid string length {len_str}: {e}"))
    })?;

    let start_data = colon_index + 1;
    let end_data = start_data + length;

    if end_data > encoded.len() {
        return Err(BencodeError::UnexpectedEnd);
    }

    let data = &encoded[start_data..end_data];
    Ok((end_data, BValue::ByteString(data.to_vec())))
}

/// Decodes a list of the form `l<items>e`.
fn decode_list(encoded: &[u8]) -> Result<(usize, BValue), BencodeError> {
    let mut idx = 1; // skip 'l'
    let mut items = Vec::new();

    while idx < encoded.len() && encoded[idx] != b'e' {
        let (consumed, val) = decode_bencode(&encoded[idx..])?;
        idx += consumed;
        items.push(val);
    }

    if idx >= encoded.len() {
        return Err(BencodeError::InvalidFormat(
            "unclosed list (missing 'e')".to_string(),
        ));
    }

    // add 1 to account for 'e'
    Ok((idx + 1, BValue::List(items)))
}

/// Decodes a dictionary of the form `d<pairs>e`.
///
/// Keys must be strings and unique. Out-of-order keys in the input are
/// accepted; the map type reorders them, so a re-encode is always canonical.
fn decode_dict(encoded: &[u8]) -> Result<(usize, BValue), BencodeError> {
    let mut idx = 1; // skip 'd'
    let mut map = BTreeMap::new();

    while idx < encoded.len() && encoded[idx] != b'e' {
        if !encoded[idx].is_ascii_digit() {
            return Err(BencodeError::InvalidFormat(
                "dictionary key must be a string".to_string(),
            ));
        }
        let (key_consumed, key_value) = decode_string(&encoded[idx..])?;
        idx += key_consumed;
        let key = match key_value {
            BValue::ByteString(bytes) => bytes,
            _ => unreachable!("decode_string only yields byte strings"),
        };

        let (val_consumed, value) = decode_bencode(&encoded[idx..])?;
        idx += val_consumed;

        if map.insert(key.clone(), value).is_some() {
            return Err(BencodeError::DuplicateKey(
                String::from_utf8_lossy(&key).into_owned(),
            ));
        }
    }

    if idx >= encoded.len() {
        return Err(BencodeError::InvalidFormat(
            "unclosed dictionary (missing 'e')".to_string(),
        ));
    }

    // add 1 to account for 'e'
    Ok((idx + 1, BValue::Dict(map)))
}
