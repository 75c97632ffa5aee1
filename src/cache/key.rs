//! Mapping of caller-supplied keys to file names
//!
//! Raw keys are author names, IDs or free-text queries and may contain
//! whitespace, path separators or dots. They are escaped so that the result is
//! always a single path component inside the cache directory.

use sha2::{Digest, Sha256};

/// Longest sanitized name kept as-is
const MAX_NAME_LEN: usize = 128;

/// Length a too-long name is cut to before the digest suffix is appended
const TRUNCATED_LEN: usize = 96;

/// Converts a raw key into a filesystem-safe file stem
///
/// ASCII alphanumerics, `-` and `_` pass through, whitespace becomes `_`, and
/// every other byte is written as `~XX`. No `/`, `\` or `.` survives, so the
/// result cannot escape the cache directory. The empty key maps to `~`.
///
/// Distinct keys can collide (`"a b"` and `"a_b"`); that is accepted.
pub fn sanitize_key(key: &str) -> String {
    if key.is_empty() {
        return "~".to_string();
    }

    let mut name = String::with_capacity(key.len());
    for ch in key.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            name.push(ch);
        } else if ch.is_whitespace() {
            name.push('_');
        } else {
            let mut buf = [0u8; 4];
            for byte in ch.encode_utf8(&mut buf).bytes() {
                name.push_str(&format!("~{:02X}", byte));
            }
        }
    }

    if name.len() > MAX_NAME_LEN {
        let digest = Sha256::digest(key.as_bytes());
        // Only ASCII is ever pushed, so any byte index is a char boundary
        name.truncate(TRUNCATED_LEN);
        name.push('-');
        name.push_str(&hex::encode(digest)[..16]);
    }

    name
}
