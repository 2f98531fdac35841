use serde_json::{json, Value};

use super::BValue;

/// Encode a `BValue` back into bencoded bytes.
///
/// The output is canonical: integers carry no leading zeros, strings are
/// length-prefixed raw bytes, and dictionary keys are emitted in ascending
/// byte order (the map iterates sorted). For input that was itself canonical,
/// `encode_bvalue(decode_bencode(b)) == b`.
pub fn encode_bvalue(value: &BValue) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &BValue, out: &mut Vec<u8>) {
    match value {
        BValue::Integer(i) => {
            out.push(b'i');
            out.extend_from_slice(i.to_string().as_bytes());
            out.push(b'e');
        }
        BValue::ByteString(bytes) => {
            out.extend_from_slice(bytes.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(bytes);
        }
        BValue::List(items) => {
            out.push(b'l');
            for item in items {
                encode_into(item, out);
            }
            out.push(b'e');
        }
        BValue::Dict(dict) => {
            out.push(b'd');
            for (key, val) in dict {
                out.extend_from_slice(key.len().to_string().as_bytes());
                out.push(b':');
                out.extend_from_slice(key);
                encode_into(val, out);
            }
            out.push(b'e');
        }
    }
}

/// Convert a `BValue` into JSON for the `decode` subcommand.
///
/// Byte strings are rendered as JSON strings when they are valid UTF-8;
/// otherwise the bytes are surfaced as hex under `"_bytes_hex"`. Dictionary
/// keys that are not UTF-8 get the same hex treatment.
pub fn bvalue_to_json(bv: &BValue) -> Value {
    match bv {
        BValue::Integer(i) => json!(i),

        BValue::ByteString(bytes) => match std::str::from_utf8(bytes) {
            Ok(utf8_str) => Value::String(utf8_str.to_string()),
            Err(_) => json!({ "_bytes_hex": hex::encode(bytes) }),
        },

        BValue::List(items) => Value::Array(items.iter().map(bvalue_to_json).collect()),

        BValue::Dict(map) => {
            let mut json_map = serde_json::Map::new();
            for (k, v) in map {
                let key = match std::str::from_utf8(k) {
                    Ok(s) => s.to_string(),
                    Err(_) => hex::encode(k),
                };
                json_map.insert(key, bvalue_to_json(v));
            }
            Value::Object(json_map)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::bencode::decode_bencode;

    #[test]
    fn encode_atoms() {
        assert_eq!(encode_bvalue(&BValue::Integer(-42)), b"i-42e");
        assert_eq!(encode_bvalue(&BValue::ByteString(b"hello".to_vec())), b"5:hello");
        assert_eq!(encode_bvalue(&BValue::List(Vec::new())), b"le");
        assert_eq!(encode_bvalue(&BValue::Dict(BTreeMap::new())), b"de");
    }

    #[test]
    fn dict_keys_emitted_sorted() {
        let mut map = BTreeMap::new();
        map.insert(b"zebra".to_vec(), BValue::Integer(1));
        map.insert(b"apple".to_vec(), BValue::Integer(2));
        let encoded = encode_bvalue(&BValue::Dict(map));
        assert_eq!(encoded, b"d5:applei2e5:zebrai1ee");
    }

    #[test]
    fn decode_encode_round_trip() {
        let inputs: &[&[u8]] = &[
            b"i0e",
            b"i-42e",
            b"5:hello",
            b"0:",
            b"l4:spami42ee",
            b"d3:cow3:moo4:spaml1:a1:bee",
            b"d4:infod6:lengthi12e4:name1:xee",
        ];
        for input in inputs {
            let (_, value) = decode_bencode(input).unwrap();
            let encoded = encode_bvalue(&value);
            assert_eq!(&encoded, input, "round trip failed for {input:?}");
            let (_, reparsed) = decode_bencode(&encoded).unwrap();
            assert_eq!(reparsed, value);
        }
    }

    #[test]
    fn out_of_order_input_reencodes_canonically() {
        let (_, value) = decode_bencode(b"d5:zebrai1e5:applei2ee").unwrap();
        assert_eq!(encode_bvalue(&value), b"d5:applei2e5:zebrai1ee");
    }

    #[test]
    fn synthetic_info_dict_bytes() {
        let mut map = BTreeMap::new();
        map.insert(b"length".to_vec(), BValue::Integer(12));
        map.insert(b"name".to_vec(), BValue::ByteString(b"x".to_vec()));
        map.insert(b"piece length".to_vec(), BValue::Integer(16));
        map.insert(b"pieces".to_vec(), BValue::ByteString(vec![0u8; 20]));
        let encoded = encode_bvalue(&BValue::Dict(map));

        let mut expected = b"d6:lengthi12e4:name1:x12:piece lengthi16e6:pieces20:".to_vec();
        expected.extend_from_slice(&[0u8; 20]);
        expected.push(b'e');
        assert_eq!(encoded, expected);
    }

    #[test]
    fn json_rendering() {
        let (_, value) = decode_bencode(b"d3:cow3:moo4:spaml1:a1:bee").unwrap();
        assert_eq!(
            bvalue_to_json(&value),
            serde_json::json!({"cow": "moo", "spam": ["a", "b"]})
        );
    }

    #[test]
    fn json_rendering_binary_string() {
        let value = BValue::ByteString(vec![0xde, 0xad]);
        assert_eq!(bvalue_to_json(&value), serde_json::json!({"_bytes_hex": "dead"}));
    }
}
