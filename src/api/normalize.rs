//! Query-parameter normalization and grammar validation for the public
//! provider-gateway paths (spec §6 "Query parameter normalization",
//! "timeRange grammar", "Address & mint grammar").

use std::collections::HashMap;

use crate::error::AppError;

const TOKEN_ALIASES: &[&str] = &["tokenaddress", "token_address", "token address"];
const ADDRESS_ALIASES: &[&str] = &["walletaddress", "wallet_address", "addr"];
const DIRECTION_ALIASES: &[&str] = &["flowdirection", "flow_direction"];
const MAX_DEPTH_ALIASES: &[&str] = &["max_depth", "max depth", "depth"];
const TIME_RANGE_ALIASES: &[&str] = &["time_range", "time range", "window", "range"];
const LIMIT_ALIASES: &[&str] = &["max", "count", "page_size"];

pub fn canonical_key(key: &str) -> String {
    let folded = key.trim().to_ascii_lowercase();
    if folded == "token" || TOKEN_ALIASES.contains(&folded.as_str()) {
        return "token".to_string();
    }
    if folded == "address" || ADDRESS_ALIASES.contains(&folded.as_str()) {
        return "address".to_string();
    }
    if folded == "direction" || DIRECTION_ALIASES.contains(&folded.as_str()) {
        return "direction".to_string();
    }
    if folded == "maxdepth" || MAX_DEPTH_ALIASES.contains(&folded.as_str()) {
        return "maxDepth".to_string();
    }
    if folded == "timerange" || TIME_RANGE_ALIASES.contains(&folded.as_str()) {
        return "timeRange".to_string();
    }
    if folded == "limit" || LIMIT_ALIASES.contains(&folded.as_str()) {
        return "limit".to_string();
    }
    key.to_string()
}

/// Folds every known alias of `token`, `address`, `direction`, `maxDepth`,
/// `timeRange`, and `limit` onto their canonical key. Unrecognized keys pass
/// through unchanged.
pub fn normalize_params(raw: &HashMap<String, String>) -> HashMap<String, String> {
    raw.iter()
        .map(|(k, v)| (canonical_key(k), v.clone()))
        .collect()
}

/// Folds a normalized query string and a parsed JSON body into a single
/// canonical-key string map, body taking precedence (spec §6: "Accept both
/// GET (query) and POST (body)").
pub fn merge(body: Option<&serde_json::Value>, query: &HashMap<String, String>) -> HashMap<String, String> {
    let mut merged = normalize_params(query);
    if let Some(serde_json::Value::Object(map)) = body {
        for (k, v) in map {
            let scalar = match v {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            merged.insert(canonical_key(k), scalar);
        }
    }
    merged
}

pub fn is_base58(s: &str) -> bool {
    !s.is_empty() && bs58::decode(s).into_vec().is_ok()
}

pub fn validate_address(s: &str) -> Result<(), AppError> {
    if (32..=44).contains(&s.len()) && is_base58(s) {
        Ok(())
    } else {
        Err(AppError::InvalidRequest(format!("invalid address: {s}")))
    }
}

pub fn validate_mint(s: &str) -> Result<(), AppError> {
    validate_address(s).map_err(|_| AppError::InvalidRequest(format!("invalid token mint: {s}")))
}

pub fn validate_signature(s: &str) -> Result<(), AppError> {
    if (87..=88).contains(&s.len()) && is_base58(s) {
        Ok(())
    } else {
        Err(AppError::InvalidRequest(format!("invalid signature: {s}")))
    }
}

/// `^(\d+)(d|h|m)$`, clamped: ≤1440 m, ≤720 h, ≤365 d (spec §6).
pub fn parse_time_range_secs(raw: &str) -> Result<i64, AppError> {
    let bad = || AppError::InvalidRequest(format!("invalid time range: {raw}"));
    if raw.len() < 2 {
        return Err(bad());
    }
    let (digits, unit) = raw.split_at(raw.len() - 1);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(bad());
    }
    let n: i64 = digits.parse().map_err(|_| bad())?;
    match unit {
        "m" if n <= 1440 => Ok(n * 60),
        "h" if n <= 720 => Ok(n * 3600),
        "d" if n <= 365 => Ok(n * 86400),
        "m" | "h" | "d" => Err(bad()),
        _ => Err(bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_token_aliases() {
        let mut raw = HashMap::new();
        raw.insert("Token_Address".to_string(), "MINT".to_string());
        let normalized = normalize_params(&raw);
        assert_eq!(normalized.get("token"), Some(&"MINT".to_string()));
    }

    #[test]
    fn clamps_time_range() {
        assert!(parse_time_range_secs("1440m").is_ok());
        assert!(parse_time_range_secs("1441m").is_err());
        assert!(parse_time_range_secs("366d").is_err());
        assert_eq!(parse_time_range_secs("30d").unwrap(), 30 * 86400);
    }

    #[test]
    fn rejects_malformed_time_range() {
        assert!(parse_time_range_secs("abc").is_err());
        assert!(parse_time_range_secs("").is_err());
    }

    #[test]
    fn validates_address_length_and_alphabet() {
        assert!(validate_address(&"1".repeat(32)).is_ok());
        assert!(validate_address(&"1".repeat(31)).is_err());
        assert!(validate_address("not-base58-0OIl").is_err());
    }

    #[test]
    fn validates_signature_length() {
        assert!(validate_signature(&"1".repeat(87)).is_ok());
        assert!(validate_signature(&"1".repeat(86)).is_err());
    }
}
