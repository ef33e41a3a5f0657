use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use ed25519_dalek::{Signer, SigningKey};
use serde_json::{Value, json};
use tower::ServiceExt;

use tipjar_api::{AppState, AppStateInner, DonationLedger, NonceAuthenticator, router};
use tipjar_chain::testing::FakeChain;
use tipjar_chain::{PaymentVerifier, RelayPolicy, SettledTransaction, TransactionRelay};
use tipjar_crypto::WalletAddress;
use tipjar_db::Database;
use tipjar_gateway::OverlayHub;
use tipjar_types::models::LAMPORTS_PER_SOL;

const SECRET: &str = "integration-test-secret";

struct Harness {
    app: Router,
    chain: Arc<FakeChain>,
    hub: OverlayHub,
    treasury: WalletAddress,
}

fn harness() -> Harness {
    let chain = Arc::new(FakeChain::new());
    let treasury = WalletAddress::new([9u8; 32]);
    let db = Arc::new(Database::open_in_memory().unwrap());
    let hub = OverlayHub::new("overlay-key");

    let policy = RelayPolicy {
        backoff_step: Duration::ZERO,
        confirm_interval: Duration::ZERO,
        ..RelayPolicy::default()
    };

    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: SECRET.into(),
        session_ttl: chrono::Duration::hours(1),
        authenticator: NonceAuthenticator::new(),
        relay: TransactionRelay::new(chain.clone(), Some(treasury), policy),
        verifier: PaymentVerifier::new(chain.clone(), Some(treasury)),
        ledger: DonationLedger::new(db, hub.clone()),
        hub: hub.clone(),
    });

    Harness {
        app: router(state),
        chain,
        hub,
        treasury,
    }
}

fn donor() -> (SigningKey, WalletAddress) {
    let key = SigningKey::from_bytes(&[11u8; 32]);
    let wallet = WalletAddress::new(key.verifying_key().to_bytes());
    (key, wallet)
}

fn tx_signature(seed: u8) -> String {
    bs58::encode([seed; 64]).into_string()
}

/// Settled transfer of `paid` lamports from `sender` to `treasury`.
fn transfer(sender: &WalletAddress, treasury: &WalletAddress, paid: u64) -> SettledTransaction {
    SettledTransaction {
        account_keys: vec![
            sender.to_string(),
            treasury.to_string(),
            "11111111111111111111111111111111".into(),
        ],
        pre_balances: vec![2 * LAMPORTS_PER_SOL, LAMPORTS_PER_SOL, 1],
        post_balances: vec![2 * LAMPORTS_PER_SOL - paid - 5_000, LAMPORTS_PER_SOL + paid, 1],
        err: None,
    }
}

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn login(app: &Router, key: &SigningKey, wallet: &WalletAddress) -> String {
    let (status, challenge) = send(app, "POST", "/auth/nonce", None, Some(json!({ "wallet": wallet.to_string() }))).await;
    assert_eq!(status, StatusCode::OK);

    let message = challenge["message"].as_str().unwrap();
    let signature = hex::encode(key.sign(message.as_bytes()).to_bytes());

    let (status, session) = send(
        app,
        "POST",
        "/auth/verify",
        None,
        Some(json!({
            "wallet": wallet.to_string(),
            "signature": signature,
            "nonce": challenge["nonce"],
            "timestamp": challenge["timestamp"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "verify failed: {}", session);
    assert_eq!(session["user"]["wallet"], wallet.to_string());
    session["token"].as_str().unwrap().to_string()
}

fn donate_body(wallet: &WalletAddress, kind: &str, content: &str, tx: &str) -> Value {
    json!({
        "type": kind,
        "content": content,
        "username": "alice",
        "wallet": wallet.to_string(),
        "txHash": tx,
    })
}

#[tokio::test]
async fn login_donate_then_duplicate_is_conflict() {
    let h = harness();
    let (key, wallet) = donor();
    let (_, mut overlay) = h.hub.register().await;

    let sig1 = tx_signature(1);
    h.chain.insert_transaction(&sig1, transfer(&wallet, &h.treasury, LAMPORTS_PER_SOL / 100));

    let token = login(&h.app, &key, &wallet).await;

    let (status, body) = send(&h.app, "POST", "/donate", Some(&token), Some(donate_body(&wallet, "text", "gm", &sig1))).await;
    assert_eq!(status, StatusCode::OK, "donate failed: {}", body);
    assert_eq!(body["donation"]["txSignature"], sig1);
    assert_eq!(body["donation"]["amountLamports"], 10_000_000);
    assert_eq!(body["donation"]["type"], "text");

    let frame: Value = serde_json::from_str(&overlay.recv().await.unwrap()).unwrap();
    assert_eq!(frame["event"], "DONATION");
    assert_eq!(frame["payload"]["txSignature"], sig1);

    let (status, body) = send(&h.app, "POST", "/donate", Some(&token), Some(donate_body(&wallet, "text", "gm", &sig1))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "duplicate-transaction");
    assert!(overlay.try_recv().is_err(), "duplicate must not reach overlays");

    let (status, body) = send(&h.app, "GET", "/overlay/recent", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["donations"].as_array().unwrap().len(), 1);

    let (_, health) = send(&h.app, "GET", "/health", None, None).await;
    assert_eq!(health["donations"], 1);
    assert_eq!(health["overlays"], 1);
}

#[tokio::test]
async fn underpaid_image_is_forbidden() {
    let h = harness();
    let (key, wallet) = donor();

    let sig = tx_signature(2);
    // 0.005 SOL against a 0.03 SOL image
    h.chain.insert_transaction(&sig, transfer(&wallet, &h.treasury, 5 * LAMPORTS_PER_SOL / 1000));

    let token = login(&h.app, &key, &wallet).await;
    let (status, body) = send(
        &h.app,
        "POST",
        "/donate",
        Some(&token),
        Some(donate_body(&wallet, "image", "https://cdn.example/cat.png", &sig)),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "insufficient-amount");

    let (_, recent) = send(&h.app, "GET", "/overlay/recent", None, None).await;
    assert!(recent["donations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn failed_transaction_is_forbidden() {
    let h = harness();
    let (key, wallet) = donor();

    let sig = tx_signature(6);
    let mut tx = transfer(&wallet, &h.treasury, LAMPORTS_PER_SOL / 100);
    tx.err = Some(json!({ "InstructionError": [0, { "Custom": 1 }] }));
    h.chain.insert_transaction(&sig, tx);

    let token = login(&h.app, &key, &wallet).await;
    let (status, body) = send(&h.app, "POST", "/donate", Some(&token), Some(donate_body(&wallet, "text", "gm", &sig))).await;

    assert_eq!(status, StatusCode::FORBIDDEN, "{}", body);
    assert_eq!(body["error"], "transaction-failed");
}

#[tokio::test]
async fn unknown_signature_is_forbidden() {
    let h = harness();
    let (key, wallet) = donor();

    let token = login(&h.app, &key, &wallet).await;
    let (status, body) = send(
        &h.app,
        "POST",
        "/donate",
        Some(&token),
        Some(donate_body(&wallet, "text", "gm", &tx_signature(7))),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN, "{}", body);
    assert_eq!(body["error"], "transaction-not-found");

    let (_, recent) = send(&h.app, "GET", "/overlay/recent", None, None).await;
    assert!(recent["donations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn reused_nonce_is_unauthorized() {
    let h = harness();
    let (key, wallet) = donor();

    let (_, challenge) = send(&h.app, "POST", "/auth/nonce", None, Some(json!({ "wallet": wallet.to_string() }))).await;
    let signature = hex::encode(key.sign(challenge["message"].as_str().unwrap().as_bytes()).to_bytes());
    let body = json!({
        "wallet": wallet.to_string(),
        "signature": signature,
        "nonce": challenge["nonce"],
        "timestamp": challenge["timestamp"],
    });

    let (status, _) = send(&h.app, "POST", "/auth/verify", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, err) = send(&h.app, "POST", "/auth/verify", None, Some(body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["error"], "invalid-challenge");
}

#[tokio::test]
async fn donating_for_another_wallet_is_forbidden() {
    let h = harness();
    let (key, wallet) = donor();
    let other = WalletAddress::new([5u8; 32]);

    let token = login(&h.app, &key, &wallet).await;
    let (status, body) = send(
        &h.app,
        "POST",
        "/donate",
        Some(&token),
        Some(donate_body(&other, "text", "gm", &tx_signature(3))),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "wallet-mismatch");
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let h = harness();
    let (_, wallet) = donor();

    let (status, body) = send(&h.app, "POST", "/donate", None, Some(donate_body(&wallet, "text", "gm", &tx_signature(4)))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing-credential");

    let (status, body) = send(&h.app, "POST", "/tx/build", Some("not-a-jwt"), Some(json!({ "type": "gif" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid-credential");
}

#[tokio::test]
async fn malformed_requests_are_bad_requests() {
    let h = harness();
    let (key, wallet) = donor();

    let (status, body) = send(&h.app, "POST", "/auth/nonce", None, Some(json!({ "wallet": "0OIl" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid-wallet");

    let (status, _) = send(&h.app, "POST", "/auth/nonce", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&h.app, "GET", "/overlay/recent?limit=abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid-query");

    let token = login(&h.app, &key, &wallet).await;
    let (status, body) = send(&h.app, "POST", "/donate", Some(&token), Some(donate_body(&wallet, "hologram", "gm", &tx_signature(5)))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
}

#[tokio::test]
async fn build_transfer_targets_treasury_at_list_price() {
    let h = harness();
    let (key, wallet) = donor();
    let token = login(&h.app, &key, &wallet).await;

    let (status, body) = send(&h.app, "POST", "/tx/build", Some(&token), Some(json!({ "type": "gif" }))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["amount"], 20_000_000);

    use base64::Engine;
    let tx = base64::engine::general_purpose::STANDARD
        .decode(body["transaction"].as_str().unwrap())
        .unwrap();
    // One empty signature slot up front
    assert_eq!(tx[0], 1);
    assert!(tx[1..65].iter().all(|b| *b == 0));
}

#[tokio::test]
async fn prices_and_health_are_public() {
    let h = harness();

    let (status, body) = send(&h.app, "GET", "/donations/prices", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prices"].as_array().unwrap().len(), 5);

    let (status, body) = send(&h.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
