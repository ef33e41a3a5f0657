use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS wallets (
            wallet          TEXT PRIMARY KEY,
            created_at      TEXT NOT NULL,
            last_login_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS donations (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            tx_signature    TEXT NOT NULL UNIQUE,
            wallet          TEXT NOT NULL,
            username        TEXT NOT NULL,
            donation_type   TEXT NOT NULL,
            amount_lamports INTEGER NOT NULL,
            content         TEXT NOT NULL,
            metadata        TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_donations_created
            ON donations(created_at);

        CREATE INDEX IF NOT EXISTS idx_donations_wallet
            ON donations(wallet);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
