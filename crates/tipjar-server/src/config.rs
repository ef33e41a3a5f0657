use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

use tipjar_crypto::WalletAddress;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "changeme",
    "secret",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub session_ttl: chrono::Duration,
    pub overlay_key: String,
    pub rpc_url: String,
    pub rpc_timeout: Duration,
    /// Donations and transfer building fail with a configuration error
    /// while this is unset.
    pub treasury: Option<WalletAddress>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = get("TIPJAR_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("TIPJAR_JWT_SECRET is unset or still a placeholder");
        }

        let overlay_key = get("TIPJAR_OVERLAY_KEY").unwrap_or_default();
        if overlay_key.is_empty() {
            bail!("TIPJAR_OVERLAY_KEY is unset; overlays could never authenticate");
        }

        let port: u16 = var("TIPJAR_PORT", "3000")
            .parse()
            .context("TIPJAR_PORT must be a port number")?;
        let session_hours: i64 = var("TIPJAR_SESSION_TTL_HOURS", "24")
            .parse()
            .context("TIPJAR_SESSION_TTL_HOURS must be a whole number of hours")?;
        let rpc_timeout_secs: u64 = var("TIPJAR_RPC_TIMEOUT_SECS", "10")
            .parse()
            .context("TIPJAR_RPC_TIMEOUT_SECS must be a whole number of seconds")?;

        let treasury = match get("TIPJAR_TREASURY_WALLET").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<WalletAddress>()
                    .context("TIPJAR_TREASURY_WALLET is not a valid wallet address")?,
            ),
            None => None,
        };

        Ok(Self {
            host: var("TIPJAR_HOST", "0.0.0.0"),
            port,
            db_path: var("TIPJAR_DB_PATH", "tipjar.db").into(),
            jwt_secret,
            session_ttl: chrono::Duration::hours(session_hours),
            overlay_key,
            rpc_url: var("TIPJAR_RPC_URL", "https://api.devnet.solana.com"),
            rpc_timeout: Duration::from_secs(rpc_timeout_secs),
            treasury,
        })
    }
}
