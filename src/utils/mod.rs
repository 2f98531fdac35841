mod url_encode;

pub use url_encode::{percent_encode_all, url_encode_bytes};

use rand::Rng;

/// Builds the 20-byte peer id: the configured client prefix followed by a
/// random alphanumeric tail. Generated once per process and reused for every
/// tracker announce and peer handshake.
pub fn generate_peer_id(prefix: &str) -> [u8; 20] {
    let mut rng = rand::thread_rng();
    let mut peer_id = [0u8; 20];

    let prefix_bytes = prefix.as_bytes();
    let split = prefix_bytes.len().min(20);
    peer_id[..split].copy_from_slice(&prefix_bytes[..split]);

    const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    for byte in peer_id[split..].iter_mut() {
        *byte = ALPHANUMERIC[rng.gen_range(0..ALPHANUMERIC.len())];
    }
    peer_id
}
