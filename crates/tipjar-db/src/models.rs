/// Database row types. These map directly to SQLite rows.
/// Distinct from tipjar-types API models to keep the DB layer independent.

pub struct WalletRow {
    pub wallet: String,
    pub created_at: String,
    pub last_login_at: String,
}

pub struct DonationRow {
    pub id: i64,
    pub tx_signature: String,
    pub wallet: String,
    pub username: String,
    pub donation_type: String,
    pub amount_lamports: i64,
    pub content: String,
    pub metadata: Option<String>,
    pub created_at: String,
}

/// Insert payload for a donation. `amount_lamports` must come from payment
/// verification, never from the request body.
pub struct NewDonation<'a> {
    pub tx_signature: &'a str,
    pub wallet: &'a str,
    pub username: &'a str,
    pub donation_type: &'a str,
    pub amount_lamports: u64,
    pub content: &'a str,
    pub metadata: Option<&'a str>,
    pub created_at: &'a str,
}
