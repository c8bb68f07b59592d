// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # VELA Wallet — Core Library
//!
//! This is the beating heart of VELA: a digital wallet engine for people
//! who move real money between real accounts, in centavos, with no
//! floating point anywhere near a balance.
//!
//! VELA takes a pragmatic stance: one `u64` per balance (because `f64`
//! and money should never meet), one atomic storage scope per movement
//! (because half a transfer is theft), and lazy expiry for QR charges
//! (because background sweepers are a pager waiting to fire).
//!
//! ## Architecture
//!
//! The engine is split into modules that mirror the actual concerns of a
//! wallet:
//!
//! - **money** — Centavo amounts. Addition that refuses to lie.
//! - **account** — Balances and administrative status.
//! - **ledger** — Transfers and the immutable record of every one.
//! - **qr** — Single-use QR charges with a grace window for slow thumbs.
//! - **request** — Asking someone to pay you, politely and exactly once.
//! - **store** — Persistent storage over sled, transactions included.
//! - **error** — One error type, honestly classified.
//! - **config** — Engine constants and limits.
//!
//! ## Design Philosophy
//!
//! 1. Money is conserved. Every debit has a credit in the same commit.
//! 2. Rejections change nothing. Read the error, fix the cause, retry.
//! 3. Every public API is documented. Internal shame is documented too.
//! 4. If it touches money, it has tests. Plural.

pub mod account;
pub mod config;
pub mod error;
pub mod ledger;
pub mod money;
pub mod qr;
pub mod request;
pub mod store;
