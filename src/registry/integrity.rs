use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

/// Content hash of archive bytes in the form `sha256-<base64 digest>`.
/// Deterministic and side-effect-free; consumers use it for tamper and
/// corruption detection.
#[must_use]
pub fn compute_integrity(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("sha256-{}", STANDARD.encode(digest))
}
