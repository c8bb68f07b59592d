//! # QR Charges — Single-Use Payment Codes
//!
//! A QR charge is an invitation to pay: the owner fixes an amount, the
//! wallet mints an unguessable token, and whoever scans it within the
//! validity window pays exactly that amount to the owner. One scan, one
//! settlement. The second scan finds a consumed charge.
//!
//! ## Expiry Model
//!
//! A charge advertises a ten-minute lifetime, plus a short grace window so
//! a payer who scanned in time doesn't lose the race to the clock while
//! confirming. Expiry is evaluated lazily against the stored `expires_at`
//! at redemption and read time; no background sweeper rewrites rows. The
//! stored status only ever flips through a successful redemption, which
//! means a stored `Expired` row always denotes "already paid", and a
//! stale-but-`Active` row denotes "timed out".

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::AccountId;
use crate::config::{MAX_DESCRIPTION_LENGTH, QR_REDEEM_GRACE_SECS, QR_TOKEN_BYTES, QR_TTL_SECS};
use crate::error::{WalletError, WalletResult};
use crate::ledger::{apply_transfer, TransactionId, TransactionKind, TransactionRecord, Transfer};
use crate::money::Amount;
use crate::store::WalletStore;

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// Unique identifier of a QR charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QrId(Uuid);

impl QrId {
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

impl Default for QrId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for QrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for QrId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Charge Row
// ---------------------------------------------------------------------------

/// Stored lifecycle state of a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QrStatus {
    /// Issued and not yet redeemed. May still be past its window; time
    /// expiry is judged against `expires_at`, not stored here.
    Active,
    /// Consumed by a successful redemption.
    Expired,
}

/// A single-use payment charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrCode {
    /// Unique charge id.
    pub id: QrId,
    /// Account that gets paid on redemption.
    pub owner: AccountId,
    /// Exact amount the redeemer will pay.
    pub amount: Amount,
    /// Optional note, copied onto the settlement record.
    pub description: Option<String>,
    /// Unguessable token embedded in the rendered code.
    pub token: String,
    /// Stored lifecycle state.
    pub status: QrStatus,
    /// When the charge was issued.
    pub created_at: DateTime<Utc>,
    /// Advertised end of the validity window.
    pub expires_at: DateTime<Utc>,
    /// Who paid, once redeemed.
    pub redeemed_by: Option<AccountId>,
    /// When it was paid, once redeemed.
    pub redeemed_at: Option<DateTime<Utc>>,
    /// The ledger record the redemption produced.
    pub transaction: Option<TransactionId>,
}

impl QrCode {
    /// Whether the redemption window, grace included, has closed at `now`.
    ///
    /// At exactly the grace boundary the charge is still redeemable; one
    /// instant later it is not.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at + Duration::seconds(QR_REDEEM_GRACE_SECS)
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// The QR charge service.
#[derive(Debug, Clone)]
pub struct QrCodes {
    store: WalletStore,
}

impl QrCodes {
    /// Create the service over the given store.
    pub fn new(store: WalletStore) -> Self {
        Self { store }
    }

    /// Issue a new charge owned by `owner`.
    ///
    /// The charge is immediately live and stays redeemable until its
    /// window closes or someone pays it, whichever comes first.
    pub fn issue(
        &self,
        owner: &AccountId,
        amount: Amount,
        description: Option<String>,
    ) -> WalletResult<QrCode> {
        if amount.is_zero() {
            return Err(WalletError::InvalidAmount);
        }
        if let Some(text) = &description {
            if text.len() > MAX_DESCRIPTION_LENGTH {
                return Err(WalletError::DescriptionTooLong {
                    limit: MAX_DESCRIPTION_LENGTH,
                });
            }
        }
        if self.store.account(owner)?.is_none() {
            return Err(WalletError::AccountNotFound { id: *owner });
        }

        let mut token_bytes = [0u8; QR_TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut token_bytes);

        let now = Utc::now();
        let qr = QrCode {
            id: QrId::new(),
            owner: *owner,
            amount,
            description,
            token: hex::encode(token_bytes),
            status: QrStatus::Active,
            created_at: now,
            expires_at: now + Duration::seconds(QR_TTL_SECS),
            redeemed_by: None,
            redeemed_at: None,
            transaction: None,
        };
        self.store.put_qr_code(&qr)?;

        tracing::info!(qr = %qr.id, owner = %qr.owner, amount = %qr.amount, "QR charge issued");
        Ok(qr)
    }

    /// Redeem a charge: `payer` pays the owner the charge's amount.
    ///
    /// The payment and the status flip commit in one atomic scope. When
    /// two payers race, exactly one settles; the loser's scope re-reads
    /// the flipped row and reports it as already redeemed. A rejection of
    /// any kind leaves the charge exactly as it was, so a payer whose
    /// balance fell short can fund the account and try again.
    pub fn redeem(
        &self,
        payer: &AccountId,
        id: &QrId,
    ) -> WalletResult<(QrCode, TransactionRecord)> {
        let (qr, record) = self.store.atomic(|scope| {
            use sled::transaction::ConflictableTransactionError::Abort;

            let now = Utc::now();
            let mut qr = scope
                .qr_code(id)?
                .ok_or(Abort(WalletError::QrNotFound { id: *id }))?;

            if qr.owner == *payer {
                return Err(Abort(WalletError::SelfRedemption));
            }
            if qr.status == QrStatus::Expired {
                return Err(Abort(WalletError::AlreadyRedeemed { id: qr.id }));
            }
            if qr.is_expired_at(now) {
                return Err(Abort(WalletError::QrExpired {
                    id: qr.id,
                    expired_at: qr.expires_at,
                }));
            }

            let order = Transfer {
                sender: *payer,
                recipient: qr.owner,
                amount: qr.amount,
                description: qr.description.clone(),
            };
            let record = apply_transfer(scope, &order, TransactionKind::Transfer, Some(qr.id), now)?;

            qr.status = QrStatus::Expired;
            qr.redeemed_by = Some(*payer);
            qr.redeemed_at = Some(now);
            qr.transaction = Some(record.id);
            scope.put_qr_code(&qr)?;

            Ok((qr, record))
        })?;

        tracing::info!(
            qr = %qr.id,
            payer = %payer,
            owner = %qr.owner,
            amount = %qr.amount,
            transaction = %record.id,
            "QR charge redeemed"
        );
        Ok((qr, record))
    }

    /// Look up a charge for display before paying it.
    ///
    /// Purely a read: a charge past its window is reported expired but the
    /// stored row is left untouched, so a later redemption attempt gets
    /// judged against the clock again rather than against a stale flag.
    pub fn read(&self, id: &QrId) -> WalletResult<QrCode> {
        let qr = self
            .store
            .qr_code(id)?
            .ok_or(WalletError::QrNotFound { id: *id })?;

        if qr.status == QrStatus::Expired || qr.is_expired_at(Utc::now()) {
            return Err(WalletError::QrExpired {
                id: qr.id,
                expired_at: qr.expires_at,
            });
        }
        Ok(qr)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
