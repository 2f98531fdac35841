use std::net::{Ipv4Addr, SocketAddrV4};

use log::debug;
use reqwest::Client;

use crate::bencode::{decode_bencode, BValue};
use crate::error::ClientError;
use crate::utils::{percent_encode_all, url_encode_bytes};

/// Assembles the announce URL by hand: `info_hash` and `peer_id` are raw
/// bytes that must be percent-encoded byte-by-byte, which typed query
/// builders would re-encode as UTF-8.
pub fn build_announce_url(
    announce: &str,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    port: u16,
    uploaded: u64,
    downloaded: u64,
    left: u64,
) -> String {
    format!(
        "{announce}?info_hash={info_hash}&peer_id={peer_id}&port={port}&uploaded={uploaded}&downloaded={downloaded}&left={left}&compact=1",
        announce = announce,
        info_hash = percent_encode_all(info_hash),
        peer_id = url_encode_bytes(peer_id),
        port = port,
        uploaded = uploaded,
        downloaded = downloaded,
        left = left
    )
}

/// Announces to the tracker and returns the compact peer list in tracker
/// order.
pub async fn announce(
    client: &Client,
    announce_url: &str,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    port: u16,
    left: u64,
) -> Result<Vec<SocketAddrV4>, ClientError> {
    let url = build_announce_url(announce_url, info_hash, peer_id, port, 0, 0, left);
    debug!("announcing to {url}");

    let response_bytes = client
        .get(&url)
        .send()
        .await
        .map_err(|e| ClientError::TrackerFailure(format!("announce request failed: {e}")))?
        .bytes()
        .await
        .map_err(|e| ClientError::TrackerFailure(format!("reading announce response failed: {e}")))?;
    parse_tracker_response(&response_bytes)
}

/// Parses the bencoded tracker response: surfaces `failure reason`, then
/// splits the compact `peers` string into 6-byte `{IPv4, port}` records.
fn parse_tracker_response(bytes: &[u8]) -> Result<Vec<SocketAddrV4>, ClientError> {
    let (_consumed, value) = decode_bencode(bytes)?;
    let dict = value
        .as_dict()
        .ok_or_else(|| ClientError::TrackerFailure("response is not a dictionary".to_string()))?;

    if let Some(reason) = dict.get(b"failure reason".as_slice()) {
        let text = reason
            .as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_else(|| "unspecified".to_string());
        return Err(ClientError::TrackerFailure(text));
    }

    let peers = dict
        .get(b"peers".as_slice())
        .and_then(|v| v.as_bytes())
        .ok_or_else(|| ClientError::TrackerFailure("missing compact 'peers' string".to_string()))?;

    if peers.len() % 6 != 0 {
        return Err(ClientError::TrackerFailure(format!(
            "compact peers length {} is not a multiple of 6",
            peers.len()
        )));
    }

    let list = peers
        .chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddrV4::new(ip, port)
        })
        .collect();
    Ok(list)
}
