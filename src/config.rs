//! Process configuration, loaded once at startup from the environment
//! (spec §6 "Environment contract"). The process refuses to start if a
//! required secret is missing, too short, or a known placeholder.

use anyhow::{bail, Context, Result};

const PLACEHOLDER_SECRETS: &[&str] = &[
    "changeme-please-use-a-real-32-byte-secret",
    "replace-this-with-a-random-secret-value!!",
    "00000000000000000000000000000000000000",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// API key / credential for the upstream RPC + enhanced-transactions provider.
    pub upstream_api_key: String,
    pub upstream_base_url: String,

    /// KV cache host. Optional — absence means the degraded no-op cache.
    pub kv_host: Option<String>,

    pub db_path: String,

    /// HMAC salt for API-key hashing (spec §4.5).
    pub api_key_salt: String,
    /// Bootstrap admin key, used by ops tooling outside this crate's surface.
    pub admin_api_key: String,
    /// HMAC secret for `/webhooks/apix` signature verification (spec §4.5).
    pub webhook_secret: String,

    pub production: bool,
    /// Required in production; comma-separated origin allowlist.
    pub allowed_origins: Vec<String>,

    /// Base URL of the external intent-prediction classifier (spec §4.6).
    pub intent_service_url: Option<String>,
}

fn require_secret(name: &str, value: &str) -> Result<()> {
    if value.len() < 32 {
        bail!("{name} must be at least 32 characters");
    }
    let lower = value.to_ascii_lowercase();
    if PLACEHOLDER_SECRETS.iter().any(|p| lower == *p) {
        bail!("{name} is set to a well-known placeholder value");
    }
    Ok(())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let production = std::env::var("ENVIRONMENT")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let upstream_api_key = std::env::var("UPSTREAM_API_KEY")
            .context("UPSTREAM_API_KEY must be set")?;
        let db_password = std::env::var("DB_PASSWORD").context("DB_PASSWORD must be set")?;
        let _ = db_password; // consumed only to satisfy the startup contract; the
                              // connection string itself is assembled by ops tooling.

        let api_key_salt =
            std::env::var("API_KEY_SALT").context("API_KEY_SALT must be set")?;
        require_secret("API_KEY_SALT", &api_key_salt)?;

        let admin_api_key =
            std::env::var("ADMIN_API_KEY").context("ADMIN_API_KEY must be set")?;
        require_secret("ADMIN_API_KEY", &admin_api_key)?;

        let webhook_secret = std::env::var("APIX_WEBHOOK_SECRET")
            .context("APIX_WEBHOOK_SECRET must be set")?;
        require_secret("APIX_WEBHOOK_SECRET", &webhook_secret)?;

        let allowed_origins: Vec<String> = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if production && allowed_origins.is_empty() {
            bail!("ALLOWED_ORIGINS must be set in production");
        }

        Ok(Config {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .context("invalid PORT")?,
            upstream_api_key,
            upstream_base_url: std::env::var("UPSTREAM_BASE_URL")
                .unwrap_or_else(|_| "https://api.helius.xyz".into()),
            kv_host: std::env::var("KV_HOST").ok().filter(|s| !s.is_empty()),
            db_path: std::env::var("DB_PATH")
                .unwrap_or_else(|_| "./data/token-flow.db".into()),
            api_key_salt,
            admin_api_key,
            webhook_secret,
            production,
            allowed_origins,
            intent_service_url: std::env::var("INTENT_SERVICE_URL").ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_secret() {
        assert!(require_secret("X", "short").is_err());
    }

    #[test]
    fn rejects_placeholder() {
        assert!(require_secret("X", PLACEHOLDER_SECRETS[0]).is_err());
    }

    #[test]
    fn accepts_long_random_secret() {
        assert!(require_secret("X", "a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6").is_ok());
    }
}
