//! The two byte sequences ever written back to a client.

/// Join `base_url` and `key` into the `"<base>/<key>\n"` line.
///
/// The key is written verbatim; the store is trusted to return URL-safe keys.
pub fn compose(base_url: &str, key: &str) -> Vec<u8> {
    let mut line = Vec::with_capacity(base_url.len() + key.len() + 2);
    line.extend_from_slice(base_url.as_bytes());
    line.push(b'/');
    line.extend_from_slice(key.as_bytes());
    line.push(b'\n');
    line
}

/// Message sent to a client whose payload grew past `limit` bytes.
pub fn rejection_message(limit: usize) -> Vec<u8> {
    format!("Pastes may not exceed {} bytes of data", limit).into_bytes()
}
