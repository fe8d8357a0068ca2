//! Encrypted per-connection directory credentials.
//!
//! Each (principal, connection) pair holds at most one active credential: a
//! directory login plus an AES-256-CBC encrypted password, valid for a fixed
//! number of hours after its last write.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       CredentialStore                    │
//! │  - upsert / get / list / revoke          │
//! │  - metadata reads never decrypt          │
//! └─────────────────────────────────────────┘
//!          ↓ (encrypt)
//! ┌─────────────────────────────────────────┐
//! │       Cipher                             │
//! │  - AES-256-CBC + PKCS#7                  │
//! │  - fresh IV per password, HMAC tag       │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       SQLite (credentials table)         │
//! │  - caller-scoped transaction             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Security
//!
//! - Passwords encrypted at rest, ciphertext and IV always written together
//! - Key derived from the operator passphrase, held in memory only
//! - Inactive rows are kept for history, never hard-deleted

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

mod encryption;
mod storage;

pub use encryption::{Cipher, CipherError, SealedPassword};
pub use storage::{CredentialStore, NewCredential};

/// Metadata of an active credential, as exposed by reads.
///
/// Carries no password material; `expires_at` and `is_valid` are derived
/// from `updated_at` and `expires_in_hours` at read time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CredentialView {
    pub id: i64,
    pub connection_id: i64,
    pub connection_name: String,
    pub protocol: String,
    #[serde(rename = "ad_login")]
    pub directory_login: String,
    pub updated_at: DateTime<Utc>,
    pub expires_in_hours: i64,
    pub expires_at: DateTime<Utc>,
    pub is_valid: bool,
}

/// End of the validity window that starts at `updated_at`.
///
/// Windows that run past the representable range end at `DateTime::MAX_UTC`.
pub fn expires_at(updated_at: DateTime<Utc>, expires_in_hours: i64) -> DateTime<Utc> {
    Duration::try_hours(expires_in_hours)
        .and_then(|window| updated_at.checked_add_signed(window))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A credential is valid strictly before its window ends.
pub fn is_valid_at(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now < expires_at
}
