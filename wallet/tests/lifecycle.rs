//! End-to-end integration tests for the VELA wallet engine.
//!
//! These tests exercise complete money flows from account creation through
//! settled history. They prove that the engine's components compose
//! correctly: account funding from the reserve, direct transfers, QR
//! charge issuance and redemption, payment request resolution, history
//! queries, and database persistence.
//!
//! Each test stands alone with its own temporary database. No shared
//! state, no test ordering dependencies, no flaky failures.

use chrono::{Duration, Utc};

use vela_wallet::account::{Account, AccountStatus};
use vela_wallet::config::{QR_REDEEM_GRACE_SECS, QR_TOKEN_BYTES, QR_TTL_SECS};
use vela_wallet::error::{ErrorKind, WalletError};
use vela_wallet::ledger::{HistoryFilter, Ledger, TransactionKind, Transfer};
use vela_wallet::money::Amount;
use vela_wallet::qr::{QrCode, QrCodes, QrId, QrStatus};
use vela_wallet::request::{PaymentRequests, RequestStatus};
use vela_wallet::store::WalletStore;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Spins up the full engine over temporary storage, with a bootstrapped
/// reserve holding a large float.
fn setup() -> (Ledger, QrCodes, PaymentRequests, WalletStore, Account) {
    let store = WalletStore::open_temporary().expect("temp store");
    let reserve = store
        .create_funded_account(Amount::from_reais(1_000_000))
        .expect("reserve account");
    store.set_reserve_account(&reserve.id).expect("reserve id");
    (
        Ledger::new(store.clone()),
        QrCodes::new(store.clone()),
        PaymentRequests::new(store.clone()),
        store,
        reserve,
    )
}

/// Opens a zero-balance account and funds it from the reserve, the same
/// path an operator deposit takes.
fn member_with(ledger: &Ledger, store: &WalletStore, reserve: &Account, reais: u64) -> Account {
    let account = store.create_account().expect("account");
    if reais > 0 {
        ledger
            .deposit(&Transfer {
                sender: reserve.id,
                recipient: account.id,
                amount: Amount::from_reais(reais),
                description: None,
            })
            .expect("funding deposit");
    }
    store.account(&account.id).unwrap().unwrap()
}

fn balance(store: &WalletStore, account: &Account) -> Amount {
    store.account(&account.id).unwrap().unwrap().balance
}

/// Stores a charge whose advertised window closed `seconds_ago` seconds
/// before now, for exercising the grace boundary without sleeping.
fn charge_expired_ago(store: &WalletStore, owner: &Account, reais: u64, seconds_ago: i64) -> QrCode {
    let now = Utc::now();
    let qr = QrCode {
        id: QrId::new(),
        owner: owner.id,
        amount: Amount::from_reais(reais),
        description: None,
        token: hex::encode([9u8; QR_TOKEN_BYTES]),
        status: QrStatus::Active,
        created_at: now - Duration::seconds(QR_TTL_SECS + seconds_ago),
        expires_at: now - Duration::seconds(seconds_ago),
        redeemed_by: None,
        redeemed_at: None,
        transaction: None,
    };
    store.put_qr_code(&qr).unwrap();
    qr
}

// ---------------------------------------------------------------------------
// 1. Full Transfer Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn full_transfer_lifecycle() {
    let (ledger, _, _, store, reserve) = setup();

    // Open and fund two accounts through the reserve.
    let alice = member_with(&ledger, &store, &reserve, 50);
    let bob = member_with(&ledger, &store, &reserve, 10);
    assert_eq!(balance(&store, &alice), Amount::from_reais(50));
    assert_eq!(balance(&store, &bob), Amount::from_reais(10));

    // Alice pays Bob 20.
    let record = ledger
        .transfer(&Transfer {
            sender: alice.id,
            recipient: bob.id,
            amount: Amount::from_reais(20),
            description: Some("rent split".to_string()),
        })
        .unwrap();

    assert_eq!(balance(&store, &alice), Amount::from_reais(30));
    assert_eq!(balance(&store, &bob), Amount::from_reais(30));

    // Both parties see the same record at the top of their histories.
    let alice_history = ledger.history(&alice.id, &HistoryFilter::default()).unwrap();
    let bob_history = ledger.history(&bob.id, &HistoryFilter::default()).unwrap();
    assert_eq!(alice_history[0].id, record.id);
    assert_eq!(bob_history[0].id, record.id);
    assert_eq!(alice_history[0].description.as_deref(), Some("rent split"));

    // Each history also carries the funding deposit underneath.
    assert_eq!(alice_history.len(), 2);
    assert_eq!(alice_history[1].kind, TransactionKind::Deposit);

    // The record is retrievable on its own.
    let stored = store.transaction_record(&record.id).unwrap().unwrap();
    assert_eq!(stored.amount, Amount::from_reais(20));
    assert_eq!(stored.sender, alice.id);
    assert_eq!(stored.recipient, bob.id);
}

// ---------------------------------------------------------------------------
// 2. QR Charge Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn qr_charge_lifecycle() {
    let (ledger, qrs, _, store, reserve) = setup();
    let shop = member_with(&ledger, &store, &reserve, 0);
    let customer = member_with(&ledger, &store, &reserve, 40);

    // The shop issues a charge for 15.
    let qr = qrs
        .issue(&shop.id, Amount::from_reais(15), Some("espresso".to_string()))
        .unwrap();
    assert_eq!(qr.status, QrStatus::Active);
    assert!(qr.expires_at > qr.created_at);

    // The customer scans it and sees what they would pay before paying.
    let shown = qrs.read(&qr.id).unwrap();
    assert_eq!(shown.owner, shop.id);
    assert_eq!(shown.amount, Amount::from_reais(15));

    // Redemption settles the exact amount.
    let (redeemed, record) = qrs.redeem(&customer.id, &qr.id).unwrap();
    assert_eq!(balance(&store, &customer), Amount::from_reais(25));
    assert_eq!(balance(&store, &shop), Amount::from_reais(15));
    assert_eq!(redeemed.status, QrStatus::Expired);
    assert_eq!(redeemed.redeemed_by, Some(customer.id));
    assert_eq!(record.qr_code, Some(qr.id));
    assert_eq!(redeemed.transaction, Some(record.id));

    // A consumed charge reads as expired and refuses a second payer.
    assert!(matches!(
        qrs.read(&qr.id).unwrap_err(),
        WalletError::QrExpired { .. }
    ));
    let late = member_with(&ledger, &store, &reserve, 40);
    assert!(matches!(
        qrs.redeem(&late.id, &qr.id).unwrap_err(),
        WalletError::AlreadyRedeemed { .. }
    ));
    assert_eq!(balance(&store, &shop), Amount::from_reais(15));
}

// ---------------------------------------------------------------------------
// 3. Payment Request Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn payment_request_lifecycle() {
    let (ledger, _, requests, store, reserve) = setup();
    let landlord = member_with(&ledger, &store, &reserve, 0);
    let tenant = member_with(&ledger, &store, &reserve, 100);

    let request = requests
        .create(
            &landlord.id,
            &tenant.id,
            Amount::from_reais(60),
            Some("october".to_string()),
        )
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);

    // Both parties can see the open request.
    assert!(requests
        .involving(&landlord.id)
        .unwrap()
        .iter()
        .any(|r| r.id == request.id));
    assert!(requests
        .involving(&tenant.id)
        .unwrap()
        .iter()
        .any(|r| r.id == request.id));

    // The tenant accepts; money moves tenant -> landlord.
    let (accepted, record) = requests.accept(&tenant.id, &request.id).unwrap();
    assert_eq!(accepted.status, RequestStatus::Accepted);
    assert_eq!(balance(&store, &tenant), Amount::from_reais(40));
    assert_eq!(balance(&store, &landlord), Amount::from_reais(60));
    assert_eq!(
        record.description.as_deref(),
        Some("Payment Request: october")
    );

    // The settlement shows up in both histories.
    let landlord_history = ledger
        .history(&landlord.id, &HistoryFilter::default())
        .unwrap();
    assert_eq!(landlord_history[0].id, record.id);
}

// ---------------------------------------------------------------------------
// 4. Declined Request Leaves Money Alone
// ---------------------------------------------------------------------------

#[test]
fn declined_request_moves_nothing() {
    let (ledger, _, requests, store, reserve) = setup();
    let requester = member_with(&ledger, &store, &reserve, 0);
    let payer = member_with(&ledger, &store, &reserve, 100);
    let records_before = store.transaction_count();

    let request = requests
        .create(&requester.id, &payer.id, Amount::from_reais(30), None)
        .unwrap();
    let declined = requests.decline(&payer.id, &request.id).unwrap();

    assert_eq!(declined.status, RequestStatus::Declined);
    assert_eq!(balance(&store, &payer), Amount::from_reais(100));
    assert_eq!(balance(&store, &requester), Amount::ZERO);
    assert_eq!(store.transaction_count(), records_before);

    // Final means final: the payer cannot change their mind.
    assert!(matches!(
        requests.accept(&payer.id, &request.id).unwrap_err(),
        WalletError::RequestNotPending { .. }
    ));
}

// ---------------------------------------------------------------------------
// 5. Failures Leave No Trace
// ---------------------------------------------------------------------------

#[test]
fn failed_operations_change_nothing() {
    let (ledger, qrs, requests, store, reserve) = setup();
    let poor = member_with(&ledger, &store, &reserve, 5);
    let rich = member_with(&ledger, &store, &reserve, 100);
    let records_before = store.transaction_count();

    // A transfer the balance cannot cover.
    let err = ledger
        .transfer(&Transfer {
            sender: poor.id,
            recipient: rich.id,
            amount: Amount::from_reais(20),
            description: None,
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // A QR charge the balance cannot cover.
    let qr = qrs.issue(&rich.id, Amount::from_reais(15), None).unwrap();
    qrs.redeem(&poor.id, &qr.id).unwrap_err();

    // A payment request the balance cannot cover.
    let request = requests
        .create(&rich.id, &poor.id, Amount::from_reais(30), None)
        .unwrap();
    requests.accept(&poor.id, &request.id).unwrap_err();

    // Three rejections, zero movement.
    assert_eq!(balance(&store, &poor), Amount::from_reais(5));
    assert_eq!(balance(&store, &rich), Amount::from_reais(100));
    assert_eq!(store.transaction_count(), records_before);

    // Both the charge and the request survived their failed attempts.
    assert_eq!(
        store.qr_code(&qr.id).unwrap().unwrap().status,
        QrStatus::Active
    );
    assert_eq!(
        store.payment_request(&request.id).unwrap().unwrap().status,
        RequestStatus::Pending
    );

    // After a top-up, the identical retries settle.
    ledger
        .deposit(&Transfer {
            sender: reserve.id,
            recipient: poor.id,
            amount: Amount::from_reais(100),
            description: None,
        })
        .unwrap();
    qrs.redeem(&poor.id, &qr.id).unwrap();
    requests.accept(&poor.id, &request.id).unwrap();
}

// ---------------------------------------------------------------------------
// 6. Grace Window Boundary
// ---------------------------------------------------------------------------

#[test]
fn grace_window_boundary() {
    let (ledger, qrs, _, store, reserve) = setup();
    let shop = member_with(&ledger, &store, &reserve, 0);
    let customer = member_with(&ledger, &store, &reserve, 100);

    // One second inside the grace window: still payable.
    let inside = charge_expired_ago(&store, &shop, 10, QR_REDEEM_GRACE_SECS - 1);
    qrs.redeem(&customer.id, &inside.id).unwrap();
    assert_eq!(balance(&store, &shop), Amount::from_reais(10));

    // One second outside: dead, and reported with the nominal expiry.
    let outside = charge_expired_ago(&store, &shop, 10, QR_REDEEM_GRACE_SECS + 1);
    let err = qrs.redeem(&customer.id, &outside.id).unwrap_err();
    match err {
        WalletError::QrExpired { id, expired_at } => {
            assert_eq!(id, outside.id);
            assert_eq!(expired_at, outside.expires_at);
        }
        other => panic!("expected QrExpired, got {other:?}"),
    }
    assert_eq!(balance(&store, &customer), Amount::from_reais(90));
}

// ---------------------------------------------------------------------------
// 7. Money Conservation Across Mixed Flows
// ---------------------------------------------------------------------------

#[test]
fn mixed_flows_conserve_total_balance() {
    let (ledger, qrs, requests, store, reserve) = setup();
    let alice = member_with(&ledger, &store, &reserve, 200);
    let bob = member_with(&ledger, &store, &reserve, 100);
    let carol = member_with(&ledger, &store, &reserve, 50);
    let total = Amount::from_reais(350);

    // Direct transfer.
    ledger
        .transfer(&Transfer {
            sender: alice.id,
            recipient: bob.id,
            amount: Amount::from_reais(35),
            description: None,
        })
        .unwrap();

    // QR redemption.
    let qr = qrs.issue(&carol.id, Amount::from_reais(12), None).unwrap();
    qrs.redeem(&bob.id, &qr.id).unwrap();

    // Payment request.
    let request = requests
        .create(&alice.id, &carol.id, Amount::from_reais(8), None)
        .unwrap();
    requests.accept(&carol.id, &request.id).unwrap();

    // A failed attempt in the middle changes nothing either.
    ledger
        .transfer(&Transfer {
            sender: carol.id,
            recipient: alice.id,
            amount: Amount::from_reais(10_000),
            description: None,
        })
        .unwrap_err();

    let sum = balance(&store, &alice)
        .checked_add(balance(&store, &bob))
        .and_then(|s| s.checked_add(balance(&store, &carol)))
        .unwrap();
    assert_eq!(sum, total);
}

// ---------------------------------------------------------------------------
// 8. Persistence Across Reopen
// ---------------------------------------------------------------------------

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");

    let (alice_id, bob_id, qr_id) = {
        let store = WalletStore::open(dir.path()).unwrap();
        let ledger = Ledger::new(store.clone());
        let qrs = QrCodes::new(store.clone());
        let reserve = store
            .create_funded_account(Amount::from_reais(1_000))
            .unwrap();
        store.set_reserve_account(&reserve.id).unwrap();

        let alice = member_with(&ledger, &store, &reserve, 80);
        let bob = member_with(&ledger, &store, &reserve, 0);
        ledger
            .transfer(&Transfer {
                sender: alice.id,
                recipient: bob.id,
                amount: Amount::from_reais(30),
                description: None,
            })
            .unwrap();
        let qr = qrs.issue(&bob.id, Amount::from_reais(7), None).unwrap();
        qrs.redeem(&alice.id, &qr.id).unwrap();

        store.flush().unwrap();
        (alice.id, bob.id, qr.id)
    };

    // Everything is still there after a cold start.
    let store = WalletStore::open(dir.path()).unwrap();
    let ledger = Ledger::new(store.clone());

    assert_eq!(
        store.account(&alice_id).unwrap().unwrap().balance,
        Amount::from_reais(43)
    );
    assert_eq!(
        store.account(&bob_id).unwrap().unwrap().balance,
        Amount::from_reais(37)
    );
    assert!(store.reserve_account().unwrap().is_some());

    let qr = store.qr_code(&qr_id).unwrap().unwrap();
    assert_eq!(qr.status, QrStatus::Expired);
    assert_eq!(qr.redeemed_by, Some(alice_id));

    let history = ledger.history(&alice_id, &HistoryFilter::default()).unwrap();
    assert_eq!(history.len(), 3);
}

// ---------------------------------------------------------------------------
// 9. Concurrent Double Redemption
// ---------------------------------------------------------------------------

#[test]
fn concurrent_double_redemption_settles_once() {
    use std::sync::Arc;
    use std::thread;

    let (ledger, qrs, _, store, reserve) = setup();
    let shop = member_with(&ledger, &store, &reserve, 0);
    let first = member_with(&ledger, &store, &reserve, 50);
    let second = member_with(&ledger, &store, &reserve, 50);
    let qr = qrs.issue(&shop.id, Amount::from_reais(10), None).unwrap();
    let records_before = store.transaction_count();

    let qrs = Arc::new(qrs);
    let handles: Vec<_> = [first.id, second.id]
        .into_iter()
        .map(|payer| {
            let qrs = Arc::clone(&qrs);
            let id = qr.id;
            thread::spawn(move || qrs.redeem(&payer, &id))
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("redeem thread"))
        .collect();

    // Exactly one settlement, and the loser got a truthful answer.
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(WalletError::AlreadyRedeemed { .. }))));
    assert_eq!(balance(&store, &shop), Amount::from_reais(10));
    assert_eq!(store.transaction_count(), records_before + 1);
}

// ---------------------------------------------------------------------------
// 10. Blocked Accounts
// ---------------------------------------------------------------------------

#[test]
fn blocked_accounts_cannot_spend_but_can_receive() {
    let (ledger, qrs, _, store, reserve) = setup();
    let alice = member_with(&ledger, &store, &reserve, 50);
    let bob = member_with(&ledger, &store, &reserve, 50);

    store
        .set_account_status(&alice.id, AccountStatus::Blocked)
        .unwrap();

    // Outbound movement is refused in every flow.
    let err = ledger
        .transfer(&Transfer {
            sender: alice.id,
            recipient: bob.id,
            amount: Amount::from_reais(5),
            description: None,
        })
        .unwrap_err();
    assert!(matches!(err, WalletError::AccountBlocked { id } if id == alice.id));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let qr = qrs.issue(&bob.id, Amount::from_reais(5), None).unwrap();
    assert!(matches!(
        qrs.redeem(&alice.id, &qr.id).unwrap_err(),
        WalletError::AccountBlocked { .. }
    ));

    // Inbound still lands.
    ledger
        .transfer(&Transfer {
            sender: bob.id,
            recipient: alice.id,
            amount: Amount::from_reais(5),
            description: None,
        })
        .unwrap();
    assert_eq!(balance(&store, &alice), Amount::from_reais(55));

    // Unblocking restores the account fully.
    store
        .set_account_status(&alice.id, AccountStatus::Active)
        .unwrap();
    ledger
        .transfer(&Transfer {
            sender: alice.id,
            recipient: bob.id,
            amount: Amount::from_reais(55),
            description: None,
        })
        .unwrap();
    assert_eq!(balance(&store, &alice), Amount::ZERO);
}
