/// Percent-encodes every byte as `%xx`, unconditionally.
///
/// The tracker's `info_hash` parameter is a raw 20-byte digest; encoding
/// each byte keeps the URL unambiguous regardless of which bytes happen to
/// be printable.
pub fn percent_encode_all(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 3);
    for &b in bytes {
        encoded.push_str(&format!("%{b:02x}"));
    }
    encoded
}

/// Percent-encodes arbitrary bytes, keeping the RFC 3986 "unreserved" set
/// literal. Used for the peer id, whose printable prefix stays readable in
/// tracker logs.
///
/// Produces uppercase hex (e.g. "%3A" not "%3a").
pub fn url_encode_bytes(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 3);
    for &b in bytes {
        if is_unreserved(b) {
            encoded.push(b as char);
        } else {
            encoded.push_str(&format!("%{b:02X}"));
        }
    }
    encoded
}

/// Unreserved = ALPHA / DIGIT / "-" / "." / "_" / "~"
/// https://datatracker.ietf.org/doc/html/rfc3986
fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'.' || byte == b'-' || byte == b'_' || byte == b'~'
}
