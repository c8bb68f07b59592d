//! # Error Taxonomy
//!
//! Every fallible wallet operation returns a [`WalletError`]. The enum is
//! exhaustive over the failure modes of the three money flows (transfer,
//! QR redemption, payment request) plus the storage layer underneath them.
//!
//! Variants group into five families, exposed via [`WalletError::kind`]:
//! validation (rejected before any state is touched), not-found, forbidden,
//! conflict (business-rule rejection, state unchanged), and persistence
//! (storage abort, the whole scope rolled back). Callers that only want to
//! pick a response code or decide on a retry can match on the kind; callers
//! that want the details match on the variant.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::account::AccountId;
use crate::ledger::TransactionId;
use crate::money::Amount;
use crate::qr::QrId;
use crate::request::{RequestId, RequestStatus};
use crate::store::StoreError;

// ---------------------------------------------------------------------------
// Error Kind
// ---------------------------------------------------------------------------

/// Coarse classification of a [`WalletError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is malformed; nothing was looked up or mutated.
    Validation,
    /// An id did not resolve to a row.
    NotFound,
    /// The actor is not the authorized party for this operation.
    Forbidden,
    /// A business rule said no. State is exactly as it was before the call.
    Conflict,
    /// The storage layer aborted. The atomic scope rolled back; nothing
    /// partial is observable, and the call may be retried.
    Persistence,
}

// ---------------------------------------------------------------------------
// WalletError
// ---------------------------------------------------------------------------

/// Errors surfaced by wallet operations.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Amounts must be strictly positive. Zero-value transfers are noise
    /// and negative ones are impossible by construction (`u64` centavos).
    #[error("amount must be positive")]
    InvalidAmount,

    /// Sender and recipient resolved to the same account.
    #[error("sender and recipient are the same account")]
    SelfTransfer,

    /// The scanner of a QR charge is also its owner.
    #[error("cannot redeem your own QR code")]
    SelfRedemption,

    /// A payment request where requester and payer are the same account.
    #[error("cannot request payment from yourself")]
    SelfRequest,

    /// Free-text description exceeded the configured cap.
    #[error("description exceeds {limit} characters")]
    DescriptionTooLong {
        /// The configured maximum, [`crate::config::MAX_DESCRIPTION_LENGTH`].
        limit: usize,
    },

    /// No account row for this id.
    #[error("account {id} not found")]
    AccountNotFound {
        /// The id that failed to resolve.
        id: AccountId,
    },

    /// No QR charge row for this id.
    #[error("QR code {id} not found")]
    QrNotFound {
        /// The id that failed to resolve.
        id: QrId,
    },

    /// No payment request row for this id.
    #[error("payment request {id} not found")]
    RequestNotFound {
        /// The id that failed to resolve.
        id: RequestId,
    },

    /// The acting account is not the payer the request was addressed to.
    #[error("account {actor} is not the payer of request {request}")]
    NotThePayer {
        /// Who tried to act on the request.
        actor: AccountId,
        /// The request they tried to act on.
        request: RequestId,
    },

    /// The sender's balance does not cover the amount.
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        /// What the account actually holds.
        available: Amount,
        /// What the operation asked for.
        requested: Amount,
    },

    /// The sender account is administratively blocked.
    #[error("account {id} is blocked")]
    AccountBlocked {
        /// The blocked account.
        id: AccountId,
    },

    /// The QR charge's redemption window has closed (grace included).
    #[error("QR code {id} expired at {expired_at}")]
    QrExpired {
        /// The expired charge.
        id: QrId,
        /// Its nominal expiry instant (grace comes on top of this).
        expired_at: DateTime<Utc>,
    },

    /// The QR charge was already settled by an earlier redemption.
    #[error("QR code {id} was already redeemed")]
    AlreadyRedeemed {
        /// The settled charge.
        id: QrId,
    },

    /// The payment request already reached a terminal state.
    #[error("payment request {id} is already {status}")]
    RequestNotPending {
        /// The request that was acted on.
        id: RequestId,
        /// The terminal state it is in.
        status: RequestStatus,
    },

    /// Crediting this account would overflow its `u64` centavo balance.
    #[error("balance overflow crediting account {id}")]
    BalanceOverflow {
        /// The account whose balance would wrap.
        id: AccountId,
    },

    /// A ledger entry id did not resolve while following the history index.
    #[error("transaction {id} missing from the ledger")]
    RecordMissing {
        /// The dangling entry id.
        id: TransactionId,
    },

    /// The storage layer failed underneath the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WalletError {
    /// The coarse family this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::InvalidAmount
            | WalletError::SelfTransfer
            | WalletError::SelfRedemption
            | WalletError::SelfRequest
            | WalletError::DescriptionTooLong { .. } => ErrorKind::Validation,

            WalletError::AccountNotFound { .. }
            | WalletError::QrNotFound { .. }
            | WalletError::RequestNotFound { .. } => ErrorKind::NotFound,

            WalletError::NotThePayer { .. } => ErrorKind::Forbidden,

            WalletError::InsufficientBalance { .. }
            | WalletError::AccountBlocked { .. }
            | WalletError::QrExpired { .. }
            | WalletError::AlreadyRedeemed { .. }
            | WalletError::RequestNotPending { .. }
            | WalletError::BalanceOverflow { .. } => ErrorKind::Conflict,

            WalletError::RecordMissing { .. } | WalletError::Store(_) => ErrorKind::Persistence,
        }
    }

    /// Whether the caller may retry the exact same call. Only persistence
    /// failures qualify: the scope rolled back, so no state changed, and
    /// the fault may have been transient. Everything else will fail the
    /// same way again until the world changes.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Persistence
    }
}

/// Shorthand used throughout the crate.
pub type WalletResult<T> = Result<T, WalletError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
