//! # Accounts — Balance Rows
//!
//! An account is deliberately boring: an id, a balance, a status flag, two
//! timestamps. Who owns the account, how they log in, what their CPF is —
//! none of that lives here. Identity is the directory's problem; this row
//! is the one the ledger fights over under concurrency, so it stays small.
//!
//! Accounts are never deleted. Administration flips them to `Blocked`,
//! which the ledger treats as a hard stop for outgoing money.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WalletError;
use crate::money::Amount;

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// Opaque account identifier. A UUIDv4 under the hood; the 16 raw bytes
/// double as the storage key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Mint a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The raw 16 bytes, used as the sled key for this account's row.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Rebuild an id from raw key bytes (index scans).
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ---------------------------------------------------------------------------
// Account Status
// ---------------------------------------------------------------------------

/// Administrative standing of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Normal operation. Money in, money out.
    Active,
    /// Frozen by administration. The account keeps its balance and can
    /// still receive, but the ledger refuses to debit it.
    Blocked,
}

impl AccountStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, AccountStatus::Active)
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "active"),
            AccountStatus::Blocked => write!(f, "blocked"),
        }
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// A wallet balance row. Mutated exclusively inside ledger scopes; everyone
/// else gets a read-only copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Amount,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Open a fresh account: zero balance, active, new random id.
    pub fn open(now: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::new(),
            balance: Amount::ZERO,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add to the balance. Overflow is rejected, not wrapped.
    pub(crate) fn credit(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<(), WalletError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(WalletError::BalanceOverflow { id: self.id })?;
        self.updated_at = now;
        Ok(())
    }

    /// Remove from the balance. The non-negative invariant is enforced right
    /// here: a debit that would go below zero fails with the shortfall.
    pub(crate) fn debit(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<(), WalletError> {
        self.balance = self.balance.checked_sub(amount).ok_or_else(|| {
            WalletError::InsufficientBalance {
                available: self.balance,
                requested: amount,
            }
        })?;
        self.updated_at = now;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
