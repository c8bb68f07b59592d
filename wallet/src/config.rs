//! # Wallet Configuration & Constants
//!
//! Every magic number in VELA lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! Most of these values are contractual: client apps render countdowns from
//! the QR lifetime, support scripts assume the grace window, and the mobile
//! team has the password rules copied into their validators. Change them
//! here and you are changing them everywhere, so coordinate first.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// Centavos per real. All balances and amounts are integer centavos; this is
/// the only place the display scale is defined.
pub const CENTAVOS_PER_REAL: u64 = 100;

// ---------------------------------------------------------------------------
// QR Charges
// ---------------------------------------------------------------------------

/// How long an issued QR charge stays redeemable. Ten minutes matches what
/// the big instant-payment rails settled on: long enough to fumble with a
/// phone at a counter, short enough that a photographed QR code on social
/// media is worthless by lunchtime.
pub const QR_TTL: Duration = Duration::from_secs(10 * 60);

/// `QR_TTL` in whole seconds, for the chrono call sites that want an integer
/// rather than a `Duration`. Keep in sync with `QR_TTL` or face the wrath of
/// the sanity tests below.
pub const QR_TTL_SECS: i64 = 600;

/// Tolerance past the nominal expiry during which a redemption still goes
/// through. Covers clock skew between client and server plus request latency;
/// a customer who scanned at 9:59 should not lose the payment because the
/// request landed at 10:01.
pub const QR_REDEEM_GRACE: Duration = Duration::from_secs(30);

/// `QR_REDEEM_GRACE` in whole seconds.
pub const QR_REDEEM_GRACE_SECS: i64 = 30;

/// Length in bytes of the random redemption token minted per QR charge.
/// 32 bytes of OS randomness, hex-encoded to 64 characters. Unguessable,
/// unique for any realistic issuance volume, and small enough to encode
/// into a scannable image without going blurry.
pub const QR_TOKEN_BYTES: usize = 32;

// ---------------------------------------------------------------------------
// Transaction Limits
// ---------------------------------------------------------------------------

/// Maximum description length in characters. Enough for "aluguel março +
/// condomínio", not enough for your novel.
pub const MAX_DESCRIPTION_LENGTH: usize = 256;

// ---------------------------------------------------------------------------
// Sessions & Credentials
// ---------------------------------------------------------------------------

/// How long a login session stays valid. One day, same as the web app has
/// always promised. Sessions are checked lazily; there is no reaper.
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// `SESSION_TTL` in whole seconds.
pub const SESSION_TTL_SECS: i64 = 86_400;

/// Length in bytes of the random bearer token minted per session.
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Minimum password length accepted at registration and password change.
/// Six characters is the floor the product launched with; raising it means
/// migrating existing users, so it stays until someone owns that project.
pub const MIN_PASSWORD_LENGTH: usize = 6;

// ---------------------------------------------------------------------------
// Server Defaults
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 8081;

/// Default float for the operator reserve account, in centavos.
/// R$ 1 000 000,00 — the till the custodian operates from. Deposits drain
/// it, so ops monitors the balance and tops it up out of band.
pub const DEFAULT_RESERVE_FLOAT_CENTAVOS: u64 = 100_000_000;

/// Username shown for ledger entries whose counterparty is the reserve
/// account rather than a registered user.
pub const RESERVE_DISPLAY_NAME: &str = "reserve";
