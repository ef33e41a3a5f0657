use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Kinds of donation an overlay can render. Each kind has a fixed price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationType {
    Text,
    Gif,
    Image,
    Audio,
    Video,
}

impl DonationType {
    pub const ALL: [DonationType; 5] = [
        DonationType::Text,
        DonationType::Gif,
        DonationType::Image,
        DonationType::Audio,
        DonationType::Video,
    ];

    /// Price in lamports. This table is the only source of truth for
    /// what a donation costs; client-declared amounts are never read.
    pub const fn price_lamports(self) -> u64 {
        match self {
            Self::Text => 10_000_000,
            Self::Gif => 20_000_000,
            Self::Image => 30_000_000,
            Self::Audio => 50_000_000,
            Self::Video => 100_000_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Gif => "gif",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// Media donations carry a URL to already-hosted content.
    pub fn is_media(self) -> bool {
        !matches!(self, Self::Text)
    }
}

impl fmt::Display for DonationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown donation type '{0}'")]
pub struct UnknownDonationType(pub String);

impl FromStr for DonationType {
    type Err = UnknownDonationType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownDonationType(s.to_string()))
    }
}

/// An accepted donation. Created once per transaction signature and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: i64,
    pub tx_signature: String,
    pub wallet: String,
    pub username: String,
    #[serde(rename = "type")]
    pub donation_type: DonationType,
    pub amount_lamports: u64,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A wallet that has completed the challenge handshake at least once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAccount {
    pub wallet: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}
