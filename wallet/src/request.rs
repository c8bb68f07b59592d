//! # Payment Requests — Asking to Be Paid
//!
//! The inverse of a transfer: instead of pushing money, an account asks
//! another account to push it. The addressed payer either accepts, which
//! settles a transfer from payer to requester on the spot, or declines,
//! which closes the request with no movement. Either answer is final.
//!
//! Only the addressed payer can answer. The requester can watch the
//! status, nothing more.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::AccountId;
use crate::config::MAX_DESCRIPTION_LENGTH;
use crate::error::{WalletError, WalletResult};
use crate::ledger::{apply_transfer, TransactionKind, TransactionRecord, Transfer};
use crate::money::Amount;
use crate::store::WalletStore;

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// Unique identifier of a payment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
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

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Request Row
// ---------------------------------------------------------------------------

/// Lifecycle state of a payment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Waiting for the payer's answer.
    Pending,
    /// The payer paid. Terminal.
    Accepted,
    /// The payer refused. Terminal.
    Declined,
}

impl RequestStatus {
    /// Whether this state can never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Accepted => write!(f, "accepted"),
            Self::Declined => write!(f, "declined"),
        }
    }
}

/// A standing request for payment from one account to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Unique request id.
    pub id: RequestId,
    /// Account asking to be paid.
    pub requester: AccountId,
    /// Account being asked to pay.
    pub payer: AccountId,
    /// Amount requested.
    pub amount: Amount,
    /// Optional note shown to the payer.
    pub description: Option<String>,
    /// Lifecycle state.
    pub status: RequestStatus,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// When the state last changed.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// The payment request service.
#[derive(Debug, Clone)]
pub struct PaymentRequests {
    store: WalletStore,
}

impl PaymentRequests {
    /// Create the service over the given store.
    pub fn new(store: WalletStore) -> Self {
        Self { store }
    }

    /// Ask `payer` to pay `requester` the given amount.
    pub fn create(
        &self,
        requester: &AccountId,
        payer: &AccountId,
        amount: Amount,
        description: Option<String>,
    ) -> WalletResult<PaymentRequest> {
        if amount.is_zero() {
            return Err(WalletError::InvalidAmount);
        }
        if requester == payer {
            return Err(WalletError::SelfRequest);
        }
        if let Some(text) = &description {
            if text.len() > MAX_DESCRIPTION_LENGTH {
                return Err(WalletError::DescriptionTooLong {
                    limit: MAX_DESCRIPTION_LENGTH,
                });
            }
        }
        if self.store.account(requester)?.is_none() {
            return Err(WalletError::AccountNotFound { id: *requester });
        }
        if self.store.account(payer)?.is_none() {
            return Err(WalletError::AccountNotFound { id: *payer });
        }

        let now = Utc::now();
        let request = PaymentRequest {
            id: RequestId::new(),
            requester: *requester,
            payer: *payer,
            amount,
            description,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.store.put_payment_request(&request)?;

        tracing::info!(
            request = %request.id,
            requester = %request.requester,
            payer = %request.payer,
            amount = %request.amount,
            "payment request created"
        );
        Ok(request)
    }

    /// Accept a pending request as the addressed payer.
    ///
    /// Settles a transfer from payer to requester and flips the request in
    /// the same atomic scope. A rejection, a short balance included,
    /// leaves the request pending so it can be answered again later.
    pub fn accept(
        &self,
        actor: &AccountId,
        id: &RequestId,
    ) -> WalletResult<(PaymentRequest, TransactionRecord)> {
        let (request, record) = self.store.atomic(|scope| {
            use sled::transaction::ConflictableTransactionError::Abort;

            let now = Utc::now();
            let mut request = scope
                .payment_request(id)?
                .ok_or(Abort(WalletError::RequestNotFound { id: *id }))?;

            if request.payer != *actor {
                return Err(Abort(WalletError::NotThePayer {
                    actor: *actor,
                    request: request.id,
                }));
            }
            if request.status.is_terminal() {
                return Err(Abort(WalletError::RequestNotPending {
                    id: request.id,
                    status: request.status,
                }));
            }

            let description = match &request.description {
                Some(text) => format!("Payment Request: {text}"),
                None => "Payment Request".to_string(),
            };
            let order = Transfer {
                sender: request.payer,
                recipient: request.requester,
                amount: request.amount,
                description: Some(description),
            };
            let record = apply_transfer(scope, &order, TransactionKind::Transfer, None, now)?;

            request.status = RequestStatus::Accepted;
            request.updated_at = now;
            scope.put_payment_request(&request)?;

            Ok((request, record))
        })?;

        tracing::info!(
            request = %request.id,
            payer = %actor,
            amount = %request.amount,
            transaction = %record.id,
            "payment request accepted"
        );
        Ok((request, record))
    }

    /// Decline a pending request as the addressed payer. No money moves.
    pub fn decline(&self, actor: &AccountId, id: &RequestId) -> WalletResult<PaymentRequest> {
        let request = self.store.atomic(|scope| {
            use sled::transaction::ConflictableTransactionError::Abort;

            let mut request = scope
                .payment_request(id)?
                .ok_or(Abort(WalletError::RequestNotFound { id: *id }))?;

            if request.payer != *actor {
                return Err(Abort(WalletError::NotThePayer {
                    actor: *actor,
                    request: request.id,
                }));
            }
            if request.status.is_terminal() {
                return Err(Abort(WalletError::RequestNotPending {
                    id: request.id,
                    status: request.status,
                }));
            }

            request.status = RequestStatus::Declined;
            request.updated_at = Utc::now();
            scope.put_payment_request(&request)?;
            Ok(request)
        })?;

        tracing::info!(request = %request.id, payer = %actor, "payment request declined");
        Ok(request)
    }

    /// All requests in which the account appears, as requester or payer,
    /// newest first.
    pub fn involving(&self, account: &AccountId) -> WalletResult<Vec<PaymentRequest>> {
        if self.store.account(account)?.is_none() {
            return Err(WalletError::AccountNotFound { id: *account });
        }
        Ok(self.store.requests_involving(account)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
