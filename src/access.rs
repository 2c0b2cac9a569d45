//! Access secrets for third-party downloads.
//!
//! The lifecycle only stores the opaque string produced by [`hash_secret`];
//! this module is the single place that knows how to check a presented
//! secret against it.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use ring::rand::{SecureRandom, SystemRandom};
use ring::{digest, pbkdf2};
use std::num::NonZeroU32;
use thiserror::Error;

use crate::storage::ObjectRecord;

static ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;
const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(n) => n,
    None => unreachable!(),
};

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Failed to generate salt")]
    Rng,
}

/// Hash a plaintext secret into `pbkdf2-sha256$<iterations>$<salt>$<hash>`.
pub fn hash_secret(secret: &str) -> Result<String, AccessError> {
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| AccessError::Rng)?;

    let mut hash = [0u8; digest::SHA256_OUTPUT_LEN];
    pbkdf2::derive(ALGORITHM, ITERATIONS, &salt, secret.as_bytes(), &mut hash);

    Ok(format!(
        "{SCHEME}${ITERATIONS}${}${}",
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(hash)
    ))
}

/// Check a presented secret against a stored hash. Malformed hashes never verify.
pub fn verify_secret(stored: &str, presented: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    let Ok(iterations) = iterations.parse::<NonZeroU32>() else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (STANDARD_NO_PAD.decode(salt), STANDARD_NO_PAD.decode(hash)) else {
        return false;
    };

    pbkdf2::verify(ALGORITHM, iterations, &salt, presented.as_bytes(), &hash).is_ok()
}

/// Whether `caller` (if signed in) presenting `secret` (if any) may download
/// `object`. Owners always may; everyone may when no secret is set.
pub fn can_download(object: &ObjectRecord, caller: Option<u64>, secret: Option<&str>) -> bool {
    if caller == Some(object.owner_id) {
        return true;
    }
    match (&object.access_secret, secret) {
        (None, _) => true,
        (Some(stored), Some(presented)) => verify_secret(stored, presented),
        (Some(_), None) => false,
    }
}
