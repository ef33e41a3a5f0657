use std::sync::Arc;

use chrono::{SecondsFormat, SubsecRound, Utc};
use thiserror::Error;
use tracing::info;

use tipjar_db::models::NewDonation;
use tipjar_db::{Database, DbError};
use tipjar_gateway::OverlayHub;
use tipjar_types::events::OverlayEvent;
use tipjar_types::models::{Donation, DonationType};

/// Most donations a single `recent` call returns.
pub const MAX_RECENT: u32 = 100;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("donation for transaction {0} already recorded")]
    Duplicate(String),

    #[error("{0}")]
    Storage(String),
}

impl LedgerError {
    fn from_db(tx_signature: &str, err: DbError) -> Self {
        match err {
            DbError::Conflict(_) => Self::Duplicate(tx_signature.to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

/// A payment-verified donation ready to be recorded. `verified_amount` is
/// what the verifier settled on, never a client-declared figure.
#[derive(Debug, Clone)]
pub struct DonationRecord {
    pub tx_signature: String,
    pub wallet: String,
    pub username: String,
    pub donation_type: DonationType,
    pub verified_amount: u64,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
}

/// Durable record of accepted donations, one per transaction signature.
/// Every acceptance is announced to the overlay hub exactly once.
pub struct DonationLedger {
    db: Arc<Database>,
    hub: OverlayHub,
}

impl DonationLedger {
    pub fn new(db: Arc<Database>, hub: OverlayHub) -> Self {
        Self { db, hub }
    }

    pub async fn exists(&self, tx_signature: &str) -> Result<bool, LedgerError> {
        let db = self.db.clone();
        let sig = tx_signature.to_string();
        tokio::task::spawn_blocking(move || db.donation_exists(&sig))
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?
            .map_err(|e| LedgerError::Storage(e.to_string()))
    }

    /// Record `record` and broadcast it. Concurrent submissions of the same
    /// signature resolve to one `Ok` and `Duplicate` for the rest; the
    /// lookup below is only a fast path, the UNIQUE constraint decides.
    pub async fn submit(&self, record: DonationRecord) -> Result<Donation, LedgerError> {
        if self.exists(&record.tx_signature).await? {
            return Err(LedgerError::Duplicate(record.tx_signature));
        }

        let db = self.db.clone();
        let donation = tokio::task::spawn_blocking(move || -> Result<Donation, LedgerError> {
            let created = Utc::now()
                .trunc_subsecs(3)
                .to_rfc3339_opts(SecondsFormat::Millis, true);
            let metadata = record.metadata.as_ref().map(|m| m.to_string());

            db.insert_donation(&NewDonation {
                tx_signature: &record.tx_signature,
                wallet: &record.wallet,
                username: &record.username,
                donation_type: record.donation_type.as_str(),
                amount_lamports: record.verified_amount,
                content: &record.content,
                metadata: metadata.as_deref(),
                created_at: &created,
            })
            .map_err(|e| LedgerError::from_db(&record.tx_signature, e))?;

            // Broadcast what was stored, not what was asked for.
            let row = db
                .get_donation_by_signature(&record.tx_signature)
                .map_err(|e| LedgerError::Storage(e.to_string()))?
                .ok_or_else(|| {
                    LedgerError::Storage(format!("donation {} missing after insert", record.tx_signature))
                })?;
            Donation::try_from(row).map_err(|e| LedgerError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))??;

        info!(
            "Donation {} accepted: {} {} from {}",
            donation.id, donation.donation_type, donation.tx_signature, donation.wallet
        );

        let delivered = self.hub.broadcast(&OverlayEvent::Donation(donation.clone())).await;
        info!("Donation {} broadcast to {} overlays", donation.id, delivered);

        Ok(donation)
    }

    pub async fn count(&self) -> Result<u64, LedgerError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.count_donations())
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?
            .map_err(|e| LedgerError::Storage(e.to_string()))
    }

    /// Newest first, at most `MAX_RECENT`.
    pub async fn recent(&self, limit: u32) -> Result<Vec<Donation>, LedgerError> {
        let db = self.db.clone();
        let limit = limit.min(MAX_RECENT);
        let rows = tokio::task::spawn_blocking(move || db.recent_donations(limit))
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        rows.into_iter()
            .map(|row| Donation::try_from(row).map_err(|e| LedgerError::Storage(e.to_string())))
            .collect()
    }
}
