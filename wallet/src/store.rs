//! # WalletStore — Persistent Storage Engine
//!
//! The persistence layer for the wallet, built on sled's embedded key-value
//! store. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! sled organizes data into named "trees" (analogous to column families in
//! RocksDB or tables in SQL). Each tree is an independent B+ tree with its
//! own keyspace:
//!
//! | Tree               | Key                                   | Value                      |
//! |--------------------|---------------------------------------|----------------------------|
//! | `accounts`         | account id (16B)                      | `bincode(Account)`         |
//! | `transactions`     | transaction id (16B)                  | `bincode(TransactionRecord)` |
//! | `tx_by_account`    | account (16B) + nanos (8B BE) + id (16B) | transaction id (16B)    |
//! | `qr_codes`         | QR id (16B)                           | `bincode(QrCode)`          |
//! | `payment_requests` | request id (16B)                      | `bincode(PaymentRequest)`  |
//! | `metadata`         | key (UTF-8)                           | value (bytes)              |
//!
//! Timestamps in the history index are stored as big-endian u64 nanoseconds
//! so that sled's lexicographic ordering matches chronological ordering —
//! a reverse range scan is "newest first" with no sorting step. Nanosecond
//! resolution keeps back-to-back settlements in insertion order.
//!
//! ## Atomicity
//!
//! Balance mutations, record creation, and lifecycle status flips happen
//! inside [`WalletStore::atomic`]: a serializable transaction across all
//! five domain trees. The closure either commits as a whole or leaves no
//! trace — any error path rolls back every write in the scope. sled detects
//! write conflicts optimistically and re-runs the closure with fresh reads,
//! which is exactly the serialization the check-then-mutate money paths
//! need; a business rejection aborts the scope and is surfaced once, never
//! re-run into a different answer.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Db, Transactional, Tree};

use crate::account::{Account, AccountId, AccountStatus};
use crate::error::{WalletError, WalletResult};
use crate::ledger::{HistoryFilter, TransactionId, TransactionRecord};
use crate::money::Amount;
use crate::qr::{QrCode, QrId};
use crate::request::{PaymentRequest, RequestId};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for operations running inside a [`WalletStore::atomic`]
/// scope. The error side distinguishes "abort with this domain error" from
/// sled's internal conflict signal.
pub type ScopeResult<T> = Result<T, ConflictableTransactionError<WalletError>>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Well-known key in the `metadata` tree holding the reserve account id.
const META_RESERVE_ACCOUNT: &[u8] = b"reserve_account_id";

// ---------------------------------------------------------------------------
// Serialization Helpers
// ---------------------------------------------------------------------------

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Lift a storage error into a scope abort.
fn store_abort(err: StoreError) -> ConflictableTransactionError<WalletError> {
    ConflictableTransactionError::Abort(WalletError::Store(err))
}

/// History index timestamps as big-endian-sortable u64 nanoseconds.
/// Instants outside the nanosecond-representable range clamp to the
/// nearest edge.
fn index_timestamp(at: DateTime<Utc>) -> u64 {
    match at.timestamp_nanos_opt() {
        Some(nanos) => nanos.max(0) as u64,
        None if at < DateTime::<Utc>::UNIX_EPOCH => 0,
        None => u64::MAX,
    }
}

/// Key into the `tx_by_account` history index: account, then timestamp,
/// then transaction id so identical timestamps cannot collide.
fn history_key(account: &AccountId, at: DateTime<Utc>, tx: &TransactionId) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..16].copy_from_slice(account.as_bytes());
    key[16..24].copy_from_slice(&index_timestamp(at).to_be_bytes());
    key[24..].copy_from_slice(tx.as_bytes());
    key
}

// ---------------------------------------------------------------------------
// WalletStore
// ---------------------------------------------------------------------------

/// Persistent storage engine for the wallet.
///
/// Wraps a sled `Db` instance and exposes typed accessors for accounts,
/// ledger records, QR charges, and payment requests. All serialization uses
/// bincode for compactness and speed.
///
/// # Thread Safety
///
/// sled is inherently thread-safe — all trees support lock-free concurrent
/// reads and serialized writes. `WalletStore` is `Clone` (handles share the
/// same underlying database) and can cross threads freely.
#[derive(Debug, Clone)]
pub struct WalletStore {
    /// The underlying sled database handle.
    db: Db,
    /// Account balance rows keyed by account id.
    accounts: Tree,
    /// Immutable ledger records keyed by transaction id.
    transactions: Tree,
    /// Chronological per-account index into `transactions`.
    tx_by_account: Tree,
    /// QR charge rows keyed by QR id.
    qr_codes: Tree,
    /// Payment request rows keyed by request id.
    payment_requests: Tree,
    /// Arbitrary key-value metadata (reserve account id, etc.).
    metadata: Tree,
}

impl WalletStore {
    /// Open or create a database at the given filesystem path.
    ///
    /// If the directory doesn't exist, sled creates it. If the database
    /// already exists, it's opened and all existing data is available
    /// immediately.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is cleaned up automatically when
    /// the `WalletStore` is dropped.
    ///
    /// Ideal for tests — no filesystem side effects, no cleanup needed.
    pub fn open_temporary() -> StoreResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    /// Internal constructor: opens named trees from an existing sled `Db`.
    fn from_db(db: Db) -> StoreResult<Self> {
        let accounts = db.open_tree("accounts")?;
        let transactions = db.open_tree("transactions")?;
        let tx_by_account = db.open_tree("tx_by_account")?;
        let qr_codes = db.open_tree("qr_codes")?;
        let payment_requests = db.open_tree("payment_requests")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            accounts,
            transactions,
            tx_by_account,
            qr_codes,
            payment_requests,
            metadata,
        })
    }

    /// Open a named sled tree from the underlying database.
    ///
    /// Used by the collaborator layers (user directory, sessions) that need
    /// dedicated key-value storage within the same database instance. The
    /// tree is created if it doesn't exist.
    pub fn open_tree(&self, name: &str) -> StoreResult<Tree> {
        Ok(self.db.open_tree(name)?)
    }

    // -- Transactional scope --------------------------------------------------

    /// Run `body` inside one serializable transaction across the domain
    /// trees. Everything the closure writes commits together, or nothing
    /// does.
    ///
    /// The closure may run more than once: sled retries it when another
    /// writer conflicts, re-reading fresh state each time, so balance and
    /// status checks inside the scope can never act on stale rows. A
    /// returned abort stops the retries and surfaces the domain error
    /// unchanged.
    pub fn atomic<T, F>(&self, body: F) -> WalletResult<T>
    where
        F: Fn(&TxScope<'_>) -> ScopeResult<T>,
    {
        let result = [
            &self.accounts,
            &self.transactions,
            &self.tx_by_account,
            &self.qr_codes,
            &self.payment_requests,
        ]
        .transaction(|trees| {
            let scope = TxScope {
                accounts: &trees[0],
                transactions: &trees[1],
                tx_by_account: &trees[2],
                qr_codes: &trees[3],
                payment_requests: &trees[4],
            };
            body(&scope)
        });

        match result {
            Ok(value) => Ok(value),
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(WalletError::Store(StoreError::Sled(err))),
        }
    }

    // -- Account operations ---------------------------------------------------

    /// Create a fresh active account with a zero balance.
    pub fn create_account(&self) -> StoreResult<Account> {
        let account = Account::open(Utc::now());
        self.accounts
            .insert(account.id.as_bytes(), encode(&account)?)?;
        Ok(account)
    }

    /// Create a fresh active account under a caller-chosen id.
    ///
    /// Exists for layers that bind the id into their own records before
    /// the account itself comes to life.
    pub fn create_account_with_id(&self, id: AccountId) -> StoreResult<Account> {
        let mut account = Account::open(Utc::now());
        account.id = id;
        self.accounts
            .insert(account.id.as_bytes(), encode(&account)?)?;
        Ok(account)
    }

    /// Create an account carrying an initial balance.
    ///
    /// This mints money without a ledger record and exists solely for the
    /// one-time reserve bootstrap; every later movement of that float goes
    /// through the ledger like anything else.
    pub fn create_funded_account(&self, balance: Amount) -> StoreResult<Account> {
        let mut account = Account::open(Utc::now());
        account.balance = balance;
        self.accounts
            .insert(account.id.as_bytes(), encode(&account)?)?;
        Ok(account)
    }

    /// Retrieve an account by id. `None` if it was never created.
    pub fn account(&self, id: &AccountId) -> StoreResult<Option<Account>> {
        match self.accounts.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Flip an account's administrative status.
    ///
    /// Runs in an atomic scope because a concurrent transfer may be
    /// rewriting the same row; a plain read-modify-write could silently
    /// drop its credit.
    pub fn set_account_status(
        &self,
        id: &AccountId,
        status: AccountStatus,
    ) -> WalletResult<Account> {
        let target = *id;
        self.atomic(|scope| {
            let mut account = scope
                .account(&target)?
                .ok_or(ConflictableTransactionError::Abort(
                    WalletError::AccountNotFound { id: target },
                ))?;
            account.status = status;
            account.updated_at = Utc::now();
            scope.put_account(&account)?;
            Ok(account)
        })
    }

    /// Number of accounts, the reserve included.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    // -- Ledger record operations ---------------------------------------------

    /// Retrieve a ledger record by id.
    pub fn transaction_record(&self, id: &TransactionId) -> StoreResult<Option<TransactionRecord>> {
        match self.transactions.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Scan an account's ledger history, newest first.
    ///
    /// Walks the `tx_by_account` index over the requested time window, so
    /// cost is proportional to the rows returned, not to ledger size. The
    /// kind filter and limit apply after the time window.
    pub fn transactions_for_account(
        &self,
        account: &AccountId,
        filter: &HistoryFilter,
    ) -> WalletResult<Vec<TransactionRecord>> {
        let from_nanos = filter.from.map(index_timestamp).unwrap_or(0);
        // The upper bound is exclusive, so an inclusive `to` instant needs
        // one extra nanosecond.
        let to_nanos = filter
            .to
            .map(|t| index_timestamp(t).saturating_add(1))
            .unwrap_or(u64::MAX);

        let mut lo = [0u8; 24];
        lo[..16].copy_from_slice(account.as_bytes());
        lo[16..].copy_from_slice(&from_nanos.to_be_bytes());
        let mut hi = [0u8; 24];
        hi[..16].copy_from_slice(account.as_bytes());
        hi[16..].copy_from_slice(&to_nanos.to_be_bytes());

        let mut records = Vec::new();
        for entry in self.tx_by_account.range(lo.to_vec()..hi.to_vec()).rev() {
            let (_key, value) = entry.map_err(StoreError::from)?;
            let id_bytes: [u8; 16] = value.as_ref().try_into().map_err(|_| {
                StoreError::Serialization("history index value is not a 16-byte id".to_string())
            })?;
            let id = TransactionId::from_bytes(id_bytes);
            let record = self
                .transaction_record(&id)?
                .ok_or(WalletError::RecordMissing { id })?;

            if let Some(kind) = filter.kind {
                if record.kind != kind {
                    continue;
                }
            }
            records.push(record);
            if let Some(limit) = filter.limit {
                if records.len() >= limit {
                    break;
                }
            }
        }
        Ok(records)
    }

    /// Number of ledger records.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Total amount moved across all ledger records. Reporting only;
    /// saturates rather than overflowing.
    pub fn transaction_volume(&self) -> StoreResult<Amount> {
        let mut total = Amount::ZERO;
        for entry in self.transactions.iter() {
            let (_key, bytes) = entry?;
            let record: TransactionRecord = decode(&bytes)?;
            total = total.saturating_add(record.amount);
        }
        Ok(total)
    }

    // -- QR charge operations -------------------------------------------------

    /// Persist a QR charge row. Used at issuance; redemption rewrites the
    /// row inside an atomic scope instead.
    pub fn put_qr_code(&self, qr: &QrCode) -> StoreResult<()> {
        self.qr_codes.insert(qr.id.as_bytes(), encode(qr)?)?;
        Ok(())
    }

    /// Retrieve a QR charge by id.
    pub fn qr_code(&self, id: &QrId) -> StoreResult<Option<QrCode>> {
        match self.qr_codes.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Number of QR charges ever issued.
    pub fn qr_count(&self) -> usize {
        self.qr_codes.len()
    }

    // -- Payment request operations -------------------------------------------

    /// Persist a payment request row. Used at creation; accept/decline
    /// rewrite the row inside an atomic scope instead.
    pub fn put_payment_request(&self, request: &PaymentRequest) -> StoreResult<()> {
        self.payment_requests
            .insert(request.id.as_bytes(), encode(request)?)?;
        Ok(())
    }

    /// Retrieve a payment request by id.
    pub fn payment_request(&self, id: &RequestId) -> StoreResult<Option<PaymentRequest>> {
        match self.payment_requests.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All payment requests in which the account is requester or payer,
    /// newest first. Request volume is orders of magnitude below ledger
    /// volume, so a full scan is fine here where it wouldn't be for
    /// transactions.
    pub fn requests_involving(&self, account: &AccountId) -> StoreResult<Vec<PaymentRequest>> {
        let mut requests = Vec::new();
        for entry in self.payment_requests.iter() {
            let (_key, bytes) = entry?;
            let request: PaymentRequest = decode(&bytes)?;
            if request.requester == *account || request.payer == *account {
                requests.push(request);
            }
        }
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    // -- Metadata operations --------------------------------------------------

    /// The reserve account id, if the store has been bootstrapped.
    pub fn reserve_account(&self) -> StoreResult<Option<AccountId>> {
        match self.metadata.get(META_RESERVE_ACCOUNT)? {
            Some(bytes) => {
                let raw: [u8; 16] = bytes.as_ref().try_into().map_err(|_| {
                    StoreError::Serialization("reserve account id is not 16 bytes".to_string())
                })?;
                Ok(Some(AccountId::from_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    /// Record the reserve account id at bootstrap.
    pub fn set_reserve_account(&self, id: &AccountId) -> StoreResult<()> {
        self.metadata.insert(META_RESERVE_ACCOUNT, id.as_bytes())?;
        Ok(())
    }

    // -- Utility operations ---------------------------------------------------

    /// Force a flush of all pending writes to disk.
    ///
    /// sled buffers writes in memory for performance. This call blocks
    /// until all data is durable on the underlying storage device.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TxScope
// ---------------------------------------------------------------------------

/// Typed view of the domain trees inside one atomic transaction.
///
/// Everything read through a scope is consistent with everything written
/// through it; everything written commits together or not at all.
pub struct TxScope<'a> {
    accounts: &'a TransactionalTree,
    transactions: &'a TransactionalTree,
    tx_by_account: &'a TransactionalTree,
    qr_codes: &'a TransactionalTree,
    payment_requests: &'a TransactionalTree,
}

impl TxScope<'_> {
    /// Read an account row within the scope.
    pub fn account(&self, id: &AccountId) -> ScopeResult<Option<Account>> {
        match self.accounts.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes).map_err(store_abort)?)),
            None => Ok(None),
        }
    }

    /// Write an account row within the scope.
    pub fn put_account(&self, account: &Account) -> ScopeResult<()> {
        let bytes = encode(account).map_err(store_abort)?;
        self.accounts.insert(account.id.as_bytes(), bytes)?;
        Ok(())
    }

    /// Read a QR charge row within the scope.
    pub fn qr_code(&self, id: &QrId) -> ScopeResult<Option<QrCode>> {
        match self.qr_codes.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes).map_err(store_abort)?)),
            None => Ok(None),
        }
    }

    /// Write a QR charge row within the scope.
    pub fn put_qr_code(&self, qr: &QrCode) -> ScopeResult<()> {
        let bytes = encode(qr).map_err(store_abort)?;
        self.qr_codes.insert(qr.id.as_bytes(), bytes)?;
        Ok(())
    }

    /// Read a payment request row within the scope.
    pub fn payment_request(&self, id: &RequestId) -> ScopeResult<Option<PaymentRequest>> {
        match self.payment_requests.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes).map_err(store_abort)?)),
            None => Ok(None),
        }
    }

    /// Write a payment request row within the scope.
    pub fn put_payment_request(&self, request: &PaymentRequest) -> ScopeResult<()> {
        let bytes = encode(request).map_err(store_abort)?;
        self.payment_requests.insert(request.id.as_bytes(), bytes)?;
        Ok(())
    }

    /// Append a ledger record and both sides of its history index.
    ///
    /// Records are append-only: this is the only writer of the
    /// `transactions` tree, and nothing ever rewrites an existing id.
    pub fn insert_record(&self, record: &TransactionRecord) -> ScopeResult<()> {
        let bytes = encode(record).map_err(store_abort)?;
        self.transactions.insert(record.id.as_bytes(), bytes)?;

        let sender_key = history_key(&record.sender, record.created_at, &record.id);
        let recipient_key = history_key(&record.recipient, record.created_at, &record.id);
        self.tx_by_account
            .insert(&sender_key[..], record.id.as_bytes())?;
        self.tx_by_account
            .insert(&recipient_key[..], record.id.as_bytes())?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
