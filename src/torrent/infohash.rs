use std::ops::Range;

use sha1::{Digest, Sha1};

use crate::bencode::{decode_bencode, encode_bvalue, BValue};
use crate::error::ClientError;
use crate::torrent::TorrentInfo;

/// SHA-1 of an arbitrary byte slice. Shared by the info digest, piece
/// verification, and the resume scan.
pub fn sha1_digest(bytes: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let result = hasher.finalize();

    let mut digest = [0u8; 20];
    digest.copy_from_slice(&result);
    digest
}

/// Locates the byte range of the `info` value inside a raw torrent blob.
///
/// Hashing this slice directly reproduces the digest any other client
/// computes, regardless of key order or other non-canonical quirks in the
/// source file. The walk leans on the decoder's consumed-byte counts: skip
/// key/value pairs at the top level until the key `info` is found.
pub fn info_span(buf: &[u8]) -> Result<Range<usize>, ClientError> {
    if buf.first() != Some(&b'd') {
        return Err(ClientError::InvalidMetainfo(
            "root of a torrent file must be a dictionary".to_string(),
        ));
    }

    let mut idx = 1;
    while idx < buf.len() && buf[idx] != b'e' {
        let (key_consumed, key_value) = decode_bencode(&buf[idx..])?;
        let key = match key_value {
            BValue::ByteString(bytes) => bytes,
            _ => {
                return Err(ClientError::InvalidMetainfo(
                    "dictionary key must be a string".to_string(),
                ))
            }
        };
        idx += key_consumed;

        let (val_consumed, _) = decode_bencode(&buf[idx..])?;
        if key == b"info" {
            return Ok(idx..idx + val_consumed);
        }
        idx += val_consumed;
    }

    Err(ClientError::InvalidMetainfo(
        "missing 'info' dictionary".to_string(),
    ))
}

/// Digest of the canonical re-encoding of a parsed info record.
///
/// Equals the `info_span` digest whenever the source file was itself
/// canonically encoded. Used where no raw source bytes exist.
pub fn encoded_info_digest(info: &TorrentInfo) -> [u8; 20] {
    sha1_digest(&encode_bvalue(&info_to_bvalue(info)))
}

fn info_to_bvalue(info: &TorrentInfo) -> BValue {
    use std::collections::BTreeMap;

    let mut map = BTreeMap::new();
    map.insert(b"length".to_vec(), BValue::Integer(info.length as i64));
    map.insert(
        b"name".to_vec(),
        BValue::ByteString(info.name.clone().into_bytes()),
    );
    map.insert(
        b"piece length".to_vec(),
        BValue::Integer(info.piece_length as i64),
    );

    let mut concat_pieces = Vec::with_capacity(info.pieces.len() * 20);
    for piece_hash in &info.pieces {
        concat_pieces.extend_from_slice(piece_hash);
    }
    map.insert(b"pieces".to_vec(), BValue::ByteString(concat_pieces));

    BValue::Dict(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    // d6:lengthi12e4:name1:x12:piece lengthi16e6:pieces20:<zeros>e
    fn synthetic_info_bytes() -> Vec<u8> {
        let mut info = b"d6:lengthi12e4:name1:x12:piece lengthi16e6:pieces20:".to_vec();
        info.extend_from_slice(&[0u8; 20]);
        info.push(b'e');
        info
    }

    fn synthetic_torrent_bytes() -> Vec<u8> {
        let mut buf = b"d8:announce21:http://tracker.test/a4:info".to_vec();
        buf.extend_from_slice(&synthetic_info_bytes());
        buf.push(b'e');
        buf
    }

    #[test]
    fn span_covers_exactly_the_info_value() {
        let buf = synthetic_torrent_bytes();
        let span = info_span(&buf).unwrap();
        assert_eq!(&buf[span], synthetic_info_bytes().as_slice());
    }

    #[test]
    fn span_found_after_other_keys() {
        // info is not the first key here
        let mut buf = b"d8:announce3:url7:comment2:hi4:info".to_vec();
        buf.extend_from_slice(&synthetic_info_bytes());
        buf.push(b'e');
        let span = info_span(&buf).unwrap();
        assert_eq!(&buf[span], synthetic_info_bytes().as_slice());
    }

    #[test]
    fn span_missing_info_is_an_error() {
        assert!(info_span(b"d8:announce3:urle").is_err());
    }

    #[test]
    fn span_requires_dict_root() {
        assert!(info_span(b"l4:infoe").is_err());
    }

    #[test]
    fn slice_digest_matches_reencoded_digest() {
        let buf = synthetic_torrent_bytes();
        let span = info_span(&buf).unwrap();
        let slice_digest = sha1_digest(&buf[span]);

        let info = TorrentInfo {
            name: "x".to_string(),
            length: 12,
            piece_length: 16,
            pieces: vec![[0u8; 20]],
        };
        assert_eq!(slice_digest, encoded_info_digest(&info));
    }

    #[test]
    fn digest_is_plain_sha1_of_the_encoding() {
        let info_bytes = synthetic_info_bytes();
        let info = TorrentInfo {
            name: "x".to_string(),
            length: 12,
            piece_length: 16,
            pieces: vec![[0u8; 20]],
        };
        assert_eq!(encoded_info_digest(&info), sha1_digest(&info_bytes));
    }
}
