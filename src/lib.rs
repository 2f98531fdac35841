//! Minimal single-file BitTorrent leech client: bencode codec, metainfo
//! parsing, HTTP tracker announce, peer-wire sessions, and a piece download
//! pipeline with resume and retry.

pub mod bencode;
pub mod config;
pub mod downloader;
pub mod engine;
pub mod error;
pub mod file_io;
pub mod message;
pub mod peer;
pub mod progress;
pub mod torrent;
pub mod tracker;
pub mod utils;
pub mod work_queue;

pub use error::ClientError;
pub use torrent::Torrent;
