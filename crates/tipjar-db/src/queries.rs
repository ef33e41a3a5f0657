use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use tipjar_types::models::{Donation, WalletAccount};

use crate::models::{DonationRow, NewDonation, WalletRow};
use crate::{Database, DbError, DbResult};

const DONATION_COLUMNS: &str = "id, tx_signature, wallet, username, donation_type, amount_lamports, content, metadata, created_at";

impl Database {
    // -- Wallets --

    /// Record a successful login, creating the wallet on first sight.
    pub fn upsert_wallet(&self, wallet: &str, now: &str) -> DbResult<WalletRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO wallets (wallet, created_at, last_login_at) VALUES (?1, ?2, ?2)
                 ON CONFLICT(wallet) DO UPDATE SET last_login_at = excluded.last_login_at",
                (wallet, now),
            )
            .map_err(DbError::from_write)?;

            let row = conn.query_row(
                "SELECT wallet, created_at, last_login_at FROM wallets WHERE wallet = ?1",
                [wallet],
                |row| {
                    Ok(WalletRow {
                        wallet: row.get(0)?,
                        created_at: row.get(1)?,
                        last_login_at: row.get(2)?,
                    })
                },
            )?;
            Ok(row)
        })
    }

    // -- Donations --

    /// Insert a donation. The UNIQUE constraint on `tx_signature` is the
    /// authoritative duplicate guard: a second insert of the same signature
    /// fails with `DbError::Conflict` no matter how the callers interleave.
    pub fn insert_donation(&self, new: &NewDonation<'_>) -> DbResult<i64> {
        let amount = i64::try_from(new.amount_lamports)
            .map_err(|_| DbError::Corrupt(format!("amount {} out of range", new.amount_lamports)))?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO donations (tx_signature, wallet, username, donation_type, amount_lamports, content, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    new.tx_signature,
                    new.wallet,
                    new.username,
                    new.donation_type,
                    amount,
                    new.content,
                    new.metadata,
                    new.created_at,
                ],
            )
            .map_err(DbError::from_write)?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn donation_exists(&self, tx_signature: &str) -> DbResult<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM donations WHERE tx_signature = ?1",
                    [tx_signature],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn get_donation_by_signature(&self, tx_signature: &str) -> DbResult<Option<DonationRow>> {
        self.with_conn(|conn| query_donation_by_signature(conn, tx_signature))
    }

    /// Newest donations first.
    pub fn recent_donations(&self, limit: u32) -> DbResult<Vec<DonationRow>> {
        self.with_conn(|conn| query_recent_donations(conn, limit))
    }

    pub fn count_donations(&self) -> DbResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM donations", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }
}

fn map_donation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DonationRow> {
    Ok(DonationRow {
        id: row.get(0)?,
        tx_signature: row.get(1)?,
        wallet: row.get(2)?,
        username: row.get(3)?,
        donation_type: row.get(4)?,
        amount_lamports: row.get(5)?,
        content: row.get(6)?,
        metadata: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn query_donation_by_signature(conn: &Connection, tx_signature: &str) -> DbResult<Option<DonationRow>> {
    let sql = format!("SELECT {} FROM donations WHERE tx_signature = ?1", DONATION_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([tx_signature], map_donation_row).optional()?;
    Ok(row)
}

fn query_recent_donations(conn: &Connection, limit: u32) -> DbResult<Vec<DonationRow>> {
    let sql = format!(
        "SELECT {} FROM donations ORDER BY created_at DESC, id DESC LIMIT ?1",
        DONATION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([limit], map_donation_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn parse_timestamp(raw: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Corrupt(format!("timestamp '{}': {}", raw, e)))
}

impl TryFrom<DonationRow> for Donation {
    type Error = DbError;

    fn try_from(row: DonationRow) -> Result<Self, Self::Error> {
        let donation_type = row
            .donation_type
            .parse()
            .map_err(|e| DbError::Corrupt(format!("donation {}: {}", row.id, e)))?;
        let amount_lamports = u64::try_from(row.amount_lamports)
            .map_err(|_| DbError::Corrupt(format!("donation {} amount {}", row.id, row.amount_lamports)))?;
        let metadata = row
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| DbError::Corrupt(format!("donation {} metadata: {}", row.id, e)))?;

        Ok(Donation {
            id: row.id,
            created_at: parse_timestamp(&row.created_at)?,
            tx_signature: row.tx_signature,
            wallet: row.wallet,
            username: row.username,
            donation_type,
            amount_lamports,
            content: row.content,
            metadata,
        })
    }
}

impl TryFrom<WalletRow> for WalletAccount {
    type Error = DbError;

    fn try_from(row: WalletRow) -> Result<Self, Self::Error> {
        Ok(WalletAccount {
            created_at: parse_timestamp(&row.created_at)?,
            last_login_at: parse_timestamp(&row.last_login_at)?,
            wallet: row.wallet,
        })
    }
}
