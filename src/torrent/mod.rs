pub mod infohash;
pub mod metadata;

pub use infohash::{encoded_info_digest, info_span, sha1_digest};
pub use metadata::{Torrent, TorrentInfo};
