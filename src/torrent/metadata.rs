use std::collections::BTreeMap;
use std::path::Path;

use crate::bencode::{decode_bencode, BValue};
use crate::error::ClientError;
use crate::torrent::infohash;

/// A parsed .torrent file: the tracker URL and the content metadata.
#[derive(Debug, Clone)]
pub struct Torrent {
    pub announce: String,
    pub info: TorrentInfo,
    pub info_hash: [u8; 20],
}

/// The single-file `info` dictionary.
#[derive(Debug, Clone)]
pub struct TorrentInfo {
    pub name: String,
    pub length: u64,
    pub piece_length: u64,
    pub pieces: Vec<[u8; 20]>,
}

impl Torrent {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ClientError> {
        let buf = std::fs::read(path).map_err(ClientError::FileIo)?;
        Self::from_bytes(&buf)
    }

    /// Parses a torrent blob. The info digest is taken over the raw byte
    /// range of the `info` value in `buf`, so it matches what any other
    /// client computes even for non-canonical input.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, ClientError> {
        let (_consumed, value) = decode_bencode(buf)?;
        let span = infohash::info_span(buf)?;
        let info_hash = infohash::sha1_digest(&buf[span]);
        Self::from_parts(&value, info_hash)
    }

    /// Builds a `Torrent` from an already-parsed value, deriving the digest
    /// from a canonical re-encoding of the info dictionary.
    pub fn from_bvalue(value: &BValue) -> Result<Self, ClientError> {
        let root = value
            .as_dict()
            .ok_or_else(|| invalid("root of a torrent file must be a dictionary"))?;
        let info_value = root
            .get(b"info".as_slice())
            .ok_or_else(|| invalid("missing 'info' dictionary"))?;
        let info_dict = info_value
            .as_dict()
            .ok_or_else(|| invalid("'info' must be a dictionary"))?;
        let info = TorrentInfo::from_dict(info_dict)?;
        let info_hash = infohash::encoded_info_digest(&info);
        Self::from_parts(value, info_hash)
    }

    fn from_parts(value: &BValue, info_hash: [u8; 20]) -> Result<Self, ClientError> {
        let root = value
            .as_dict()
            .ok_or_else(|| invalid("root of a torrent file must be a dictionary"))?;

        let announce = get_string(root, b"announce")?;

        let info_dict = root
            .get(b"info".as_slice())
            .ok_or_else(|| invalid("missing 'info' dictionary"))?
            .as_dict()
            .ok_or_else(|| invalid("'info' must be a dictionary"))?;
        let info = TorrentInfo::from_dict(info_dict)?;

        Ok(Torrent {
            announce,
            info,
            info_hash,
        })
    }
}

impl TorrentInfo {
    pub fn from_dict(info_dict: &BTreeMap<Vec<u8>, BValue>) -> Result<Self, ClientError> {
        let name = get_string(info_dict, b"name")?;
        let length = get_positive_integer(info_dict, b"length")?;
        let piece_length = get_positive_integer(info_dict, b"piece length")?;
        let pieces_bytes = get_bytes(info_dict, b"pieces")?;

        if pieces_bytes.is_empty() || pieces_bytes.len() % 20 != 0 {
            return Err(invalid(format!(
                "'pieces' length {} is not a positive multiple of 20",
                pieces_bytes.len()
            )));
        }

        let pieces: Vec<[u8; 20]> = pieces_bytes
            .chunks_exact(20)
            .map(|chunk| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect();

        let count = pieces.len() as u64;
        if length <= (count - 1) * piece_length || length > count * piece_length {
            return Err(invalid(format!(
                "{count} pieces of {piece_length} bytes cannot cover a length of {length}"
            )));
        }

        Ok(TorrentInfo {
            name,
            length,
            piece_length,
            pieces,
        })
    }

    pub fn piece_count(&self) -> u32 {
        self.pieces.len() as u32
    }

    /// Actual byte length of piece `index`: every piece is `piece_length`
    /// bytes except the last, which holds whatever remains. Note the last
    /// piece is *not* `length % piece_length`, which collapses to zero when
    /// the length is an exact multiple.
    pub fn piece_len(&self, index: u32) -> u64 {
        let count = self.piece_count() as u64;
        if (index as u64) < count - 1 {
            self.piece_length
        } else {
            self.length - (count - 1) * self.piece_length
        }
    }

    /// Byte offset of piece `index` in the output file.
    pub fn piece_offset(&self, index: u32) -> u64 {
        index as u64 * self.piece_length
    }

    pub fn piece_hash(&self, index: u32) -> &[u8; 20] {
        &self.pieces[index as usize]
    }
}

fn invalid(msg: impl Into<String>) -> ClientError {
    ClientError::InvalidMetainfo(msg.into())
}

fn get_bytes<'a>(
    dict: &'a BTreeMap<Vec<u8>, BValue>,
    key: &[u8],
) -> Result<&'a [u8], ClientError> {
    let val = dict
        .get(key)
        .ok_or_else(|| invalid(format!("missing '{}'", String::from_utf8_lossy(key))))?;
    val.as_bytes()
        .ok_or_else(|| invalid(format!("'{}' must be a string", String::from_utf8_lossy(key))))
}

fn get_string(dict: &BTreeMap<Vec<u8>, BValue>, key: &[u8]) -> Result<String, ClientError> {
    let bytes = get_bytes(dict, key)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| invalid(format!("'{}' is not valid UTF-8", String::from_utf8_lossy(key))))
}

fn get_positive_integer(dict: &BTreeMap<Vec<u8>, BValue>, key: &[u8]) -> Result<u64, ClientError> {
    let val = dict
        .get(key)
        .ok_or_else(|| invalid(format!("missing '{}'", String::from_utf8_lossy(key))))?;
    let n = val
        .as_integer()
        .ok_or_else(|| invalid(format!("'{}' must be an integer", String::from_utf8_lossy(key))))?;
    if n <= 0 {
        return Err(invalid(format!(
            "'{}' must be positive, got {n}",
            String::from_utf8_lossy(key)
        )));
    }
    Ok(n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::encode_bvalue;

    fn torrent_bytes(length: i64, piece_length: i64, piece_count: usize) -> Vec<u8> {
        let mut info = BTreeMap::new();
        info.insert(b"length".to_vec(), BValue::Integer(length));
        info.insert(b"name".to_vec(), BValue::ByteString(b"sample.bin".to_vec()));
        info.insert(b"piece length".to_vec(), BValue::Integer(piece_length));
        info.insert(
            b"pieces".to_vec(),
            BValue::ByteString(vec![0xabu8; piece_count * 20]),
        );

        let mut root = BTreeMap::new();
        root.insert(
            b"announce".to_vec(),
            BValue::ByteString(b"http://tracker.test/announce".to_vec()),
        );
        root.insert(b"info".to_vec(), BValue::Dict(info));
        encode_bvalue(&BValue::Dict(root))
    }

    #[test]
    fn parse_well_formed_torrent() {
        let torrent = Torrent::from_bytes(&torrent_bytes(40000, 16384, 3)).unwrap();
        assert_eq!(torrent.announce, "http://tracker.test/announce");
        assert_eq!(torrent.info.name, "sample.bin");
        assert_eq!(torrent.info.length, 40000);
        assert_eq!(torrent.info.piece_length, 16384);
        assert_eq!(torrent.info.piece_count(), 3);
    }

    #[test]
    fn from_bytes_digest_agrees_with_reencoding() {
        let buf = torrent_bytes(40000, 16384, 3);
        let torrent = Torrent::from_bytes(&buf).unwrap();
        let (_, value) = crate::bencode::decode_bencode(&buf).unwrap();
        let reparsed = Torrent::from_bvalue(&value).unwrap();
        assert_eq!(torrent.info_hash, reparsed.info_hash);
    }

    #[test]
    fn last_piece_length_partition() {
        // length=40000, piece_length=16384 -> P=3, last piece 7232 bytes
        let torrent = Torrent::from_bytes(&torrent_bytes(40000, 16384, 3)).unwrap();
        assert_eq!(torrent.info.piece_len(0), 16384);
        assert_eq!(torrent.info.piece_len(1), 16384);
        assert_eq!(torrent.info.piece_len(2), 7232);
    }

    #[test]
    fn exact_multiple_keeps_full_last_piece() {
        let torrent = Torrent::from_bytes(&torrent_bytes(32768, 16384, 2)).unwrap();
        assert_eq!(torrent.info.piece_len(1), 16384);
    }

    #[test]
    fn piece_lengths_cover_the_file() {
        let torrent = Torrent::from_bytes(&torrent_bytes(40000, 16384, 3)).unwrap();
        let info = &torrent.info;
        let total: u64 = (0..info.piece_count()).map(|i| info.piece_len(i)).sum();
        assert_eq!(total, info.length);
        for i in 0..info.piece_count() {
            assert!(info.piece_len(i) > 0);
            assert!(info.piece_len(i) <= info.piece_length);
        }
    }

    #[test]
    fn piece_offsets() {
        let torrent = Torrent::from_bytes(&torrent_bytes(40000, 16384, 3)).unwrap();
        assert_eq!(torrent.info.piece_offset(0), 0);
        assert_eq!(torrent.info.piece_offset(2), 32768);
    }

    #[test]
    fn reject_missing_announce() {
        let mut info = BTreeMap::new();
        info.insert(b"length".to_vec(), BValue::Integer(1));
        info.insert(b"name".to_vec(), BValue::ByteString(b"x".to_vec()));
        info.insert(b"piece length".to_vec(), BValue::Integer(16));
        info.insert(b"pieces".to_vec(), BValue::ByteString(vec![0u8; 20]));
        let mut root = BTreeMap::new();
        root.insert(b"info".to_vec(), BValue::Dict(info));
        let buf = encode_bvalue(&BValue::Dict(root));
        assert!(matches!(
            Torrent::from_bytes(&buf),
            Err(ClientError::InvalidMetainfo(_))
        ));
    }

    #[test]
    fn reject_pieces_not_multiple_of_twenty() {
        let mut info = BTreeMap::new();
        info.insert(b"length".to_vec(), BValue::Integer(100));
        info.insert(b"name".to_vec(), BValue::ByteString(b"x".to_vec()));
        info.insert(b"piece length".to_vec(), BValue::Integer(100));
        info.insert(b"pieces".to_vec(), BValue::ByteString(vec![0u8; 19]));
        let mut root = BTreeMap::new();
        root.insert(b"announce".to_vec(), BValue::ByteString(b"u".to_vec()));
        root.insert(b"info".to_vec(), BValue::Dict(info));
        let buf = encode_bvalue(&BValue::Dict(root));
        assert!(matches!(
            Torrent::from_bytes(&buf),
            Err(ClientError::InvalidMetainfo(_))
        ));
    }

    #[test]
    fn reject_non_positive_lengths() {
        assert!(Torrent::from_bytes(&torrent_bytes(0, 16384, 1)).is_err());
        assert!(Torrent::from_bytes(&torrent_bytes(100, 0, 1)).is_err());
        assert!(Torrent::from_bytes(&torrent_bytes(100, -3, 1)).is_err());
    }

    #[test]
    fn reject_inconsistent_piece_count() {
        // 3 pieces of 16384 cannot describe 100 bytes
        assert!(Torrent::from_bytes(&torrent_bytes(100, 16384, 3)).is_err());
        // 1 piece of 16384 cannot describe 20000 bytes
        assert!(Torrent::from_bytes(&torrent_bytes(20000, 16384, 1)).is_err());
    }

    #[test]
    fn reject_wrong_field_type() {
        let mut info = BTreeMap::new();
        info.insert(b"length".to_vec(), BValue::ByteString(b"12".to_vec()));
        info.insert(b"name".to_vec(), BValue::ByteString(b"x".to_vec()));
        info.insert(b"piece length".to_vec(), BValue::Integer(16));
        info.insert(b"pieces".to_vec(), BValue::ByteString(vec![0u8; 20]));
        let mut root = BTreeMap::new();
        root.insert(b"announce".to_vec(), BValue::ByteString(b"u".to_vec()));
        root.insert(b"info".to_vec(), BValue::Dict(info));
        let buf = encode_bvalue(&BValue::Dict(root));
        assert!(matches!(
            Torrent::from_bytes(&buf),
            Err(ClientError::InvalidMetainfo(_))
        ));
    }
}
