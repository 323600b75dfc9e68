//! API-key format, hashing, and minting (spec §4.5 "API-key shape").

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::AppError;

const KEY_PREFIX: &str = "tfa_live_";
const RAW_SUFFIX_LEN: usize = 64;
const MIN_SALT_LEN: usize = 32;
const DISPLAY_PREFIX_LEN: usize = 16;

type HmacSha256 = Hmac<Sha256>;

/// A newly-minted key: the raw secret (shown to the caller exactly once)
/// plus the row fields that get persisted.
pub struct MintedKey {
    pub raw: String,
    pub key_hash: String,
    pub key_prefix: String,
}

/// Fails startup if the salt is missing, too short, or a well-known
/// placeholder (spec §4.5).
pub fn validate_salt(salt: &str) -> Result<(), AppError> {
    const PLACEHOLDERS: &[&str] = &["changeme", "secret", "default", "placeholder"];
    if salt.len() < MIN_SALT_LEN {
        return Err(AppError::Internal(format!(
            "API key salt must be at least {MIN_SALT_LEN} characters"
        )));
    }
    let lower = salt.to_lowercase();
    if PLACEHOLDERS.iter().any(|p| lower.contains(p)) {
        return Err(AppError::Internal("API key salt is a well-known placeholder".into()));
    }
    Ok(())
}

pub fn mint(salt: &str) -> MintedKey {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    let suffix = hex::encode(bytes);
    debug_assert_eq!(suffix.len(), RAW_SUFFIX_LEN);

    let raw = format!("{KEY_PREFIX}{suffix}");
    let key_hash = hash(salt, &raw);
    let key_prefix = raw.chars().take(DISPLAY_PREFIX_LEN).collect();

    MintedKey { raw, key_hash, key_prefix }
}

/// `HMAC-SHA256(keySalt, rawKey)`, hex-encoded.
pub fn hash(salt: &str, raw_key: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes()).expect("HMAC accepts any key length");
    mac.update(raw_key.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Shape validation only (`tfa_live_` + 64 lowercase hex chars); does not
/// consult the database.
pub fn looks_well_formed(raw_key: &str) -> bool {
    match raw_key.strip_prefix(KEY_PREFIX) {
        Some(suffix) => suffix.len() == RAW_SUFFIX_LEN && suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mints_well_formed_keys() {
        let minted = mint("0123456789abcdef0123456789abcdef");
        assert!(looks_well_formed(&minted.raw));
        assert_eq!(minted.key_prefix.len(), DISPLAY_PREFIX_LEN);
    }

    #[test]
    fn hash_is_deterministic() {
        let salt = "0123456789abcdef0123456789abcdef";
        let a = hash(salt, "tfa_live_abc");
        let b = hash(salt, "tfa_live_abc");
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_short_salt() {
        assert!(validate_salt("tooshort").is_err());
    }

    #[test]
    fn rejects_placeholder_salt() {
        assert!(validate_salt(&"changeme".repeat(5)).is_err());
    }
}
