//! # Authentication — Passwords, Sessions, Extractors
//!
//! Credentials are verified against Argon2id hashes; nothing recoverable
//! is ever stored. Logins mint an opaque random token, and only its
//! SHA-256 digest touches disk, so a leaked database cannot be replayed
//! into live sessions.
//!
//! Sessions expire lazily: each authentication checks the stored deadline
//! and deletes the row when it has passed. No background sweeper.

use argon2::password_hash::rand_core::OsRng as HashOsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sled::Tree;

use vela_wallet::account::{Account, AccountId};
use vela_wallet::config::{SESSION_TOKEN_BYTES, SESSION_TTL_SECS};
use vela_wallet::store::{StoreError, WalletStore};

use crate::api::AppState;
use crate::directory::{Role, UserRecord};
use crate::error::{ServerError, ServerResult};

// ---------------------------------------------------------------------------
// Password Hashing
// ---------------------------------------------------------------------------

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> ServerResult<String> {
    let salt = SaltString::generate(&mut HashOsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ServerError::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash. A wrong password is `Ok(false)`;
/// only a malformed hash or an internal failure is an error.
pub fn verify_password(password: &str, hash: &str) -> ServerResult<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| ServerError::PasswordHash(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(ServerError::PasswordHash(e.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// A live login, stored under the SHA-256 digest of its bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRecord {
    /// The account this session authenticates.
    account: AccountId,
    /// When the session was opened.
    created_at: DateTime<Utc>,
    /// Hard deadline after which the session is dead.
    expires_at: DateTime<Utc>,
}

/// Session store backed by its own sled tree.
#[derive(Debug, Clone)]
pub struct Sessions {
    tree: Tree,
}

impl Sessions {
    /// Open the session tree inside the wallet database.
    pub fn new(store: &WalletStore) -> ServerResult<Self> {
        Ok(Self {
            tree: store.open_tree("sessions")?,
        })
    }

    /// Open a session for an account and return the bearer token.
    ///
    /// The plaintext token exists only in this return value; the store
    /// keeps its digest.
    pub fn open(&self, account: AccountId) -> ServerResult<String> {
        let mut token_bytes = [0u8; SESSION_TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut token_bytes);
        let token = hex::encode(token_bytes);

        let now = Utc::now();
        let record = SessionRecord {
            account,
            created_at: now,
            expires_at: now + Duration::seconds(SESSION_TTL_SECS),
        };
        let bytes = bincode::serialize(&record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.tree
            .insert(token_digest(&token), bytes)
            .map_err(StoreError::from)?;
        Ok(token)
    }

    /// Resolve a bearer token to its account, enforcing expiry.
    ///
    /// An expired session is deleted on sight and reported exactly like a
    /// missing one.
    pub fn authenticate(&self, token: &str) -> ServerResult<AccountId> {
        let digest = token_digest(token);
        let bytes = self
            .tree
            .get(digest)
            .map_err(StoreError::from)?
            .ok_or(ServerError::Unauthorized)?;
        let record: SessionRecord = bincode::deserialize(&bytes)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        if Utc::now() > record.expires_at {
            self.tree.remove(digest).map_err(StoreError::from)?;
            return Err(ServerError::Unauthorized);
        }
        Ok(record.account)
    }

    /// Close a session. Closing an unknown token is a no-op.
    pub fn close(&self, token: &str) -> ServerResult<bool> {
        let removed = self
            .tree
            .remove(token_digest(token))
            .map_err(StoreError::from)?;
        Ok(removed.is_some())
    }
}

/// SHA-256 digest of a bearer token, the only form that touches disk.
fn token_digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// The authenticated caller: directory record plus live wallet account.
///
/// Extracting this rejects requests without a valid bearer token (401)
/// and requests from blocked accounts (403).
pub struct AuthedUser {
    /// The caller's directory record.
    pub record: UserRecord,
    /// The caller's wallet account, read fresh for this request.
    pub account: Account,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthedUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let result = resolve_user(&parts.headers, state);
        if matches!(result, Err(ServerError::Unauthorized)) {
            state.metrics.auth_failures_total.inc();
        }
        result
    }
}

/// Resolve the bearer token to a live, unblocked caller.
fn resolve_user(headers: &HeaderMap, state: &AppState) -> ServerResult<AuthedUser> {
    let token = bearer_token(headers).ok_or(ServerError::Unauthorized)?;
    let account_id = state.sessions.authenticate(token)?;

    let record = state
        .directory
        .get(&account_id)?
        .ok_or(ServerError::Unauthorized)?;
    let account = state
        .store
        .account(&account_id)?
        .ok_or(ServerError::Unauthorized)?;

    if !account.status.is_active() {
        return Err(ServerError::Blocked);
    }
    Ok(AuthedUser { record, account })
}

/// An authenticated caller who is also an operator.
pub struct AdminUser(pub AuthedUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthedUser::from_request_parts(parts, state).await?;
        if user.record.role != Role::Admin {
            return Err(ServerError::AdminOnly);
        }
        Ok(AdminUser(user))
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sessions() -> Sessions {
        let store = WalletStore::open_temporary().expect("temp store");
        Sessions::new(&store).expect("session tree")
    }

    #[test]
    fn password_verifies_against_its_own_hash() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(verify_password("correct horse battery", &hash).unwrap());
        assert!(!verify_password("correct horse battery staple", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same password").unwrap();
        let b = hash_password("same password").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same password", &a).unwrap());
        assert!(verify_password("same password", &b).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error_not_a_mismatch() {
        let err = verify_password("anything", "not a phc string").unwrap_err();
        assert!(matches!(err, ServerError::PasswordHash(_)));
    }

    #[test]
    fn session_round_trip() {
        let sessions = sessions();
        let account = AccountId::new();

        let token = sessions.open(account).unwrap();
        assert_eq!(token.len(), SESSION_TOKEN_BYTES * 2);
        assert_eq!(sessions.authenticate(&token).unwrap(), account);

        assert!(sessions.close(&token).unwrap());
        assert!(matches!(
            sessions.authenticate(&token).unwrap_err(),
            ServerError::Unauthorized
        ));
    }

    #[test]
    fn unknown_and_garbage_tokens_are_rejected() {
        let sessions = sessions();
        assert!(matches!(
            sessions.authenticate("deadbeef").unwrap_err(),
            ServerError::Unauthorized
        ));
        // Closing a token that never existed is fine.
        assert!(!sessions.close("deadbeef").unwrap());
    }

    #[test]
    fn expired_sessions_are_deleted_on_sight() {
        let sessions = sessions();
        let account = AccountId::new();
        let token = sessions.open(account).unwrap();

        // Rewrite the stored record with a deadline in the past.
        let now = Utc::now();
        let stale = SessionRecord {
            account,
            created_at: now - Duration::seconds(SESSION_TTL_SECS * 2),
            expires_at: now - Duration::seconds(1),
        };
        sessions
            .tree
            .insert(token_digest(&token), bincode::serialize(&stale).unwrap())
            .unwrap();

        assert!(matches!(
            sessions.authenticate(&token).unwrap_err(),
            ServerError::Unauthorized
        ));
        // The lazy reaper removed the row.
        assert!(sessions.tree.get(token_digest(&token)).unwrap().is_none());
    }

    #[test]
    fn tokens_never_touch_disk_in_plaintext() {
        let sessions = sessions();
        let token = sessions.open(AccountId::new()).unwrap();

        for entry in sessions.tree.iter() {
            let (key, value) = entry.unwrap();
            assert_ne!(key.as_ref(), token.as_bytes());
            assert!(!value
                .windows(token.len())
                .any(|w| w == token.as_bytes()));
        }
    }
}
