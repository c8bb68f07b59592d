//! # User Directory — Identity Records and Lookups
//!
//! Maps people onto wallet accounts. Each user owns exactly one account,
//! keyed by the same id, along with a unique username, email, and CPF.
//!
//! ## Tree Layout
//!
//! | Tree                | Key                  | Value               |
//! |---------------------|----------------------|---------------------|
//! | `users`             | account id (16B)     | `bincode(UserRecord)` |
//! | `users_by_username` | normalized username  | account id (16B)    |
//! | `users_by_email`    | normalized email     | account id (16B)    |
//! | `users_by_cpf`      | CPF digits           | account id (16B)    |
//!
//! Uniqueness is enforced with compare-and-swap claims on the index
//! trees: a registration claims username, then email, then CPF, and
//! releases what it already claimed if a later claim loses. Two racing
//! registrations of the same username agree on one winner without locks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Tree;

use vela_wallet::account::{Account, AccountId};
use vela_wallet::config::MIN_PASSWORD_LENGTH;
use vela_wallet::store::{StoreError, WalletStore};

use crate::auth::{hash_password, verify_password};
use crate::error::{ServerError, ServerResult};

// ---------------------------------------------------------------------------
// Record Types
// ---------------------------------------------------------------------------

/// What a user may do beyond moving their own money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A regular account holder.
    User,
    /// An operator: may list users, block accounts, and fund deposits.
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// A registered user. The administrative status of the person lives on
/// their wallet account, not here; this record is who they are, not what
/// they may currently do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// The wallet account this user owns. Also the record key.
    pub account: AccountId,
    /// Unique handle, stored normalized (lowercase).
    pub username: String,
    /// Name shown to counterparties.
    pub full_name: String,
    /// Unique contact email, stored normalized (lowercase).
    pub email: String,
    /// Unique Brazilian taxpayer id, stored as bare digits.
    pub cpf: String,
    /// Argon2id hash of the password in PHC string format.
    pub password_hash: String,
    /// Authorization role.
    pub role: Role,
    /// When the user registered.
    pub created_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

/// Input for a new registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub cpf: String,
    pub password: String,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Lowercase and validate a username: 3 to 32 characters from
/// `[a-z0-9._]`.
fn normalize_username(raw: &str) -> ServerResult<String> {
    let username = raw.trim().to_lowercase();
    let ok_len = (3..=32).contains(&username.len());
    let ok_chars = username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '_');
    if !ok_len || !ok_chars {
        return Err(ServerError::InvalidUsername);
    }
    Ok(username)
}

/// Lowercase and sanity-check an email address. This is deliverability
/// triage, not RFC 5321.
fn normalize_email(raw: &str) -> ServerResult<String> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ServerError::InvalidEmail),
    }
}

/// Strip CPF punctuation and require exactly eleven digits.
fn normalize_cpf(raw: &str) -> ServerResult<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let stripped: String = raw
        .chars()
        .filter(|c| !matches!(c, '.' | '-' | ' '))
        .collect();
    if digits.len() != 11 || stripped != digits {
        return Err(ServerError::InvalidCpf);
    }
    Ok(digits)
}

fn check_password_strength(password: &str) -> ServerResult<()> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ServerError::WeakPassword);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// The user directory, backed by dedicated sled trees.
#[derive(Debug, Clone)]
pub struct Directory {
    store: WalletStore,
    users: Tree,
    by_username: Tree,
    by_email: Tree,
    by_cpf: Tree,
}

impl Directory {
    /// Open the directory trees inside the wallet database.
    pub fn new(store: WalletStore) -> ServerResult<Self> {
        let users = store.open_tree("users")?;
        let by_username = store.open_tree("users_by_username")?;
        let by_email = store.open_tree("users_by_email")?;
        let by_cpf = store.open_tree("users_by_cpf")?;
        Ok(Self {
            store,
            users,
            by_username,
            by_email,
            by_cpf,
        })
    }

    /// Register a new user and open their wallet account.
    ///
    /// Claims username, email, and CPF in that order; the first claim
    /// that loses releases the earlier ones and reports what was taken.
    pub fn register(
        &self,
        registration: &Registration,
        role: Role,
    ) -> ServerResult<(UserRecord, Account)> {
        let username = normalize_username(&registration.username)?;
        let email = normalize_email(&registration.email)?;
        let cpf = normalize_cpf(&registration.cpf)?;
        check_password_strength(&registration.password)?;

        let id = AccountId::new();

        if !claim(&self.by_username, username.as_bytes(), &id)? {
            return Err(ServerError::UsernameTaken);
        }
        if !claim(&self.by_email, email.as_bytes(), &id)? {
            release(&self.by_username, username.as_bytes(), &id)?;
            return Err(ServerError::EmailTaken);
        }
        if !claim(&self.by_cpf, cpf.as_bytes(), &id)? {
            release(&self.by_username, username.as_bytes(), &id)?;
            release(&self.by_email, email.as_bytes(), &id)?;
            return Err(ServerError::CpfTaken);
        }

        let now = Utc::now();
        let record = UserRecord {
            account: id,
            username,
            full_name: registration.full_name.trim().to_string(),
            email,
            cpf,
            password_hash: hash_password(&registration.password)?,
            role,
            created_at: now,
            updated_at: now,
        };
        self.put(&record)?;
        let account = self.store.create_account_with_id(id)?;

        tracing::info!(user = %record.username, account = %id, role = %role, "user registered");
        Ok((record, account))
    }

    /// Check an email and password pair. Both an unknown email and a
    /// wrong password come back as the same error.
    pub fn authenticate(&self, email: &str, password: &str) -> ServerResult<UserRecord> {
        let record = self
            .by_mail(email)?
            .ok_or(ServerError::InvalidCredentials)?;
        if !verify_password(password, &record.password_hash)? {
            return Err(ServerError::InvalidCredentials);
        }
        Ok(record)
    }

    /// Look up a user by account id.
    pub fn get(&self, account: &AccountId) -> ServerResult<Option<UserRecord>> {
        match self.users.get(account.as_bytes()).map_err(StoreError::from)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Look up a user by username, case-insensitively.
    pub fn by_name(&self, username: &str) -> ServerResult<Option<UserRecord>> {
        let key = username.trim().to_lowercase();
        self.by_index(&self.by_username, key.as_bytes())
    }

    /// Look up a user by email, case-insensitively.
    pub fn by_mail(&self, email: &str) -> ServerResult<Option<UserRecord>> {
        let key = email.trim().to_lowercase();
        self.by_index(&self.by_email, key.as_bytes())
    }

    fn by_index(&self, tree: &Tree, key: &[u8]) -> ServerResult<Option<UserRecord>> {
        let id = match tree.get(key).map_err(StoreError::from)? {
            Some(bytes) => decode_id(&bytes)?,
            None => return Ok(None),
        };
        self.get(&id)
    }

    /// Resolve a username to its account id, case-insensitively.
    pub fn resolve_username(&self, username: &str) -> ServerResult<Option<AccountId>> {
        Ok(self.by_name(username)?.map(|record| record.account))
    }

    /// Replace the password after verifying the current one.
    pub fn change_password(
        &self,
        account: &AccountId,
        current: &str,
        new: &str,
    ) -> ServerResult<()> {
        let mut record = self
            .get(account)?
            .ok_or_else(|| ServerError::UserNotFound(account.to_string()))?;
        if !verify_password(current, &record.password_hash)? {
            return Err(ServerError::InvalidCredentials);
        }
        check_password_strength(new)?;

        record.password_hash = hash_password(new)?;
        record.updated_at = Utc::now();
        self.put(&record)?;
        tracing::info!(user = %record.username, "password changed");
        Ok(())
    }

    /// All registered users, sorted by username.
    pub fn list(&self) -> ServerResult<Vec<UserRecord>> {
        let mut records = Vec::new();
        for entry in self.users.iter() {
            let (_key, bytes) = entry.map_err(StoreError::from)?;
            records.push(decode(&bytes)?);
        }
        records.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(records)
    }

    /// Number of registered users. The reserve is not a user.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Whether any operator account exists yet.
    pub fn has_admin(&self) -> ServerResult<bool> {
        Ok(self.list()?.iter().any(|r| r.role == Role::Admin))
    }

    fn put(&self, record: &UserRecord) -> ServerResult<()> {
        let bytes =
            bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.users
            .insert(record.account.as_bytes(), bytes)
            .map_err(StoreError::from)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Index Claims
// ---------------------------------------------------------------------------

/// Atomically claim an index key for an account. `false` means someone
/// else holds it.
fn claim(tree: &Tree, key: &[u8], id: &AccountId) -> ServerResult<bool> {
    let outcome = tree
        .compare_and_swap(key, None::<&[u8]>, Some(id.as_bytes().to_vec()))
        .map_err(StoreError::from)?;
    Ok(outcome.is_ok())
}

/// Release a claim we hold. A claim held by someone else is left alone.
fn release(tree: &Tree, key: &[u8], id: &AccountId) -> ServerResult<()> {
    let _ = tree
        .compare_and_swap(key, Some(id.as_bytes()), None::<Vec<u8>>)
        .map_err(StoreError::from)?;
    Ok(())
}

fn decode(bytes: &[u8]) -> ServerResult<UserRecord> {
    bincode::deserialize(bytes)
        .map_err(|e| ServerError::Store(StoreError::Serialization(e.to_string())))
}

fn decode_id(bytes: &[u8]) -> ServerResult<AccountId> {
    let raw: [u8; 16] = bytes.try_into().map_err(|_| {
        ServerError::Store(StoreError::Serialization(
            "user index value is not a 16-byte id".to_string(),
        ))
    })?;
    Ok(AccountId::from_bytes(raw))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
