use std::sync::Arc;

use tipjar_chain::{PaymentVerifier, TransactionRelay};
use tipjar_db::Database;
use tipjar_gateway::OverlayHub;

use crate::authenticator::NonceAuthenticator;
use crate::ledger::DonationLedger;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub session_ttl: chrono::Duration,
    pub authenticator: NonceAuthenticator,
    pub relay: TransactionRelay,
    pub verifier: PaymentVerifier,
    pub ledger: DonationLedger,
    pub hub: OverlayHub,
}
