//! # Ledger — Balance Movement Engine
//!
//! Every centavo that changes hands goes through this module. A movement
//! debits one account, credits another, and appends an immutable
//! [`TransactionRecord`], all inside one atomic storage scope, so the sum
//! of balances is the same before and after no matter how the operation
//! ends.
//!
//! The engine exposes one primitive, [`apply_transfer`], and the QR and
//! payment-request flows reuse it inside their own scopes. That keeps the
//! conservation property in exactly one place instead of three.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::AccountId;
use crate::config::MAX_DESCRIPTION_LENGTH;
use crate::error::{WalletError, WalletResult};
use crate::money::Amount;
use crate::qr::QrId;
use crate::store::{ScopeResult, TxScope, WalletStore};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier of a ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The raw 16 bytes, used as a storage key.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Rebuild an id from its raw storage key.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Record Types
// ---------------------------------------------------------------------------

/// What kind of movement a ledger record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money moved between two user accounts (direct, QR, or request).
    Transfer,
    /// Money entered a user account from the reserve.
    Deposit,
    /// Money returned to a user account from the reserve.
    Refund,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transfer => write!(f, "transfer"),
            Self::Deposit => write!(f, "deposit"),
            Self::Refund => write!(f, "refund"),
        }
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transfer" => Ok(Self::Transfer),
            "deposit" => Ok(Self::Deposit),
            "refund" => Ok(Self::Refund),
            other => Err(format!("unknown transaction kind: {other}")),
        }
    }
}

/// Settlement state of a ledger record.
///
/// Movements settle synchronously, so records are written `Completed`.
/// The other states exist for the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    Pending,
    Failed,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Pending => write!(f, "pending"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// An immutable record of one settled movement.
///
/// Once written, a record is never modified or deleted. Both parties see
/// the same record through the per-account history index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique record id.
    pub id: TransactionId,
    /// Account that was debited.
    pub sender: AccountId,
    /// Account that was credited.
    pub recipient: AccountId,
    /// Amount moved.
    pub amount: Amount,
    /// Free-form note attached by the initiator, if any.
    pub description: Option<String>,
    /// What kind of movement this was.
    pub kind: TransactionKind,
    /// Settlement state.
    pub status: TransactionStatus,
    /// The QR charge that produced this record, when redeemed from one.
    pub qr_code: Option<QrId>,
    /// When the movement settled.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Transfer Order
// ---------------------------------------------------------------------------

/// A request to move money from one account to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Account to debit.
    pub sender: AccountId,
    /// Account to credit.
    pub recipient: AccountId,
    /// Amount to move. Must be positive.
    pub amount: Amount,
    /// Optional note, carried verbatim onto the record.
    pub description: Option<String>,
}

impl Transfer {
    /// Check the shape of the order before touching storage.
    fn validate(&self) -> WalletResult<()> {
        if self.amount.is_zero() {
            return Err(WalletError::InvalidAmount);
        }
        if self.sender == self.recipient {
            return Err(WalletError::SelfTransfer);
        }
        if let Some(description) = &self.description {
            if description.len() > MAX_DESCRIPTION_LENGTH {
                return Err(WalletError::DescriptionTooLong {
                    limit: MAX_DESCRIPTION_LENGTH,
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scope Primitive
// ---------------------------------------------------------------------------

/// Execute a transfer inside an open atomic scope.
///
/// Reads both accounts fresh, enforces the sender-side guards, applies the
/// debit and credit, and appends the record plus its history index entries.
/// Callers wrap this in [`WalletStore::atomic`], possibly alongside their
/// own writes (a QR status flip, a request status flip), and the whole
/// scope commits or rolls back as one.
///
/// A blocked sender cannot move money out; a blocked recipient can still
/// be paid, the block stops the holder acting, not others paying them.
pub(crate) fn apply_transfer(
    scope: &TxScope<'_>,
    order: &Transfer,
    kind: TransactionKind,
    qr_code: Option<QrId>,
    now: DateTime<Utc>,
) -> ScopeResult<TransactionRecord> {
    use sled::transaction::ConflictableTransactionError::Abort;

    if order.amount.is_zero() {
        return Err(Abort(WalletError::InvalidAmount));
    }
    if order.sender == order.recipient {
        return Err(Abort(WalletError::SelfTransfer));
    }

    let mut sender = scope
        .account(&order.sender)?
        .ok_or(Abort(WalletError::AccountNotFound { id: order.sender }))?;
    if !sender.status.is_active() {
        return Err(Abort(WalletError::AccountBlocked { id: sender.id }));
    }
    let mut recipient = scope
        .account(&order.recipient)?
        .ok_or(Abort(WalletError::AccountNotFound {
            id: order.recipient,
        }))?;

    sender.debit(order.amount, now).map_err(Abort)?;
    recipient.credit(order.amount, now).map_err(Abort)?;

    let record = TransactionRecord {
        id: TransactionId::new(),
        sender: sender.id,
        recipient: recipient.id,
        amount: order.amount,
        description: order.description.clone(),
        kind,
        status: TransactionStatus::Completed,
        qr_code,
        created_at: now,
    };

    scope.put_account(&sender)?;
    scope.put_account(&recipient)?;
    scope.insert_record(&record)?;
    Ok(record)
}

// ---------------------------------------------------------------------------
// History Filter
// ---------------------------------------------------------------------------

/// Narrowing options for a history query. The default selects everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryFilter {
    /// Only records at or after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Only records at or before this instant.
    pub to: Option<DateTime<Utc>>,
    /// Only records of this kind.
    pub kind: Option<TransactionKind>,
    /// Stop after this many records (applied newest-first).
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Ledger Service
// ---------------------------------------------------------------------------

/// The balance movement service.
#[derive(Debug, Clone)]
pub struct Ledger {
    store: WalletStore,
}

impl Ledger {
    /// Create a ledger over the given store.
    pub fn new(store: WalletStore) -> Self {
        Self { store }
    }

    /// Move money between two accounts.
    ///
    /// Either both balances change and a record exists, or neither balance
    /// changed and no record exists. Rejections name the first guard that
    /// failed: a bad order shape, a missing party, a blocked sender, or an
    /// insufficient balance.
    pub fn transfer(&self, order: &Transfer) -> WalletResult<TransactionRecord> {
        order.validate()?;
        let record = self.store.atomic(|scope| {
            apply_transfer(scope, order, TransactionKind::Transfer, None, Utc::now())
        })?;
        tracing::info!(
            transaction = %record.id,
            sender = %record.sender,
            recipient = %record.recipient,
            amount = %record.amount,
            "transfer settled"
        );
        Ok(record)
    }

    /// Move money out of the reserve into a user account.
    ///
    /// Same guards and same conservation as [`Ledger::transfer`]; only the
    /// record kind differs. The reserve float bounds how much can ever be
    /// deposited.
    pub fn deposit(&self, order: &Transfer) -> WalletResult<TransactionRecord> {
        order.validate()?;
        let record = self.store.atomic(|scope| {
            apply_transfer(scope, order, TransactionKind::Deposit, None, Utc::now())
        })?;
        tracing::info!(
            transaction = %record.id,
            recipient = %record.recipient,
            amount = %record.amount,
            "deposit settled"
        );
        Ok(record)
    }

    /// An account's movement history, newest first.
    pub fn history(
        &self,
        account: &AccountId,
        filter: &HistoryFilter,
    ) -> WalletResult<Vec<TransactionRecord>> {
        if self.store.account(account)?.is_none() {
            return Err(WalletError::AccountNotFound { id: *account });
        }
        self.store.transactions_for_account(account, filter)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
