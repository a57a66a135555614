//! Evidence fingerprinting.
//!
//! All digests are BLAKE3 rendered as 64 lowercase hex characters. The same
//! function fingerprints recordings, telemetry payloads and ledger records,
//! so a digest in one place can always be compared with a digest in another.

use std::fs::File;
use std::path::Path;

use serde_json::Value;

use crate::error::{Error, Result};

/// Length of a hex-encoded digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Hash arbitrary bytes.
#[must_use]
pub fn hash_bytes(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Hash a file's contents without loading it whole.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the file does not exist and
/// [`Error::Io`] if it cannot be read.
pub fn hash_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::not_found(path)
        } else {
            Error::Io(e)
        }
    })?;
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Hash the canonical JSON form of a payload.
///
/// Object keys serialize in sorted order, so two payloads with the same
/// content hash identically regardless of how they were built.
#[must_use]
pub fn hash_json(value: &Value) -> String {
    hash_bytes(value.to_string().as_bytes())
}

/// Check whether a string looks like a digest produced by this module.
#[must_use]
pub fn is_digest(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
