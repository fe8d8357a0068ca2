//! Encrypted credential storage using SQLite.
//!
//! Stores one directory login and encrypted password per (username,
//! connection). Every method takes the caller's transaction; the store never
//! opens or commits one itself.

use super::{encryption::Cipher, expires_at, is_valid_at, CredentialView, SealedPassword};
use crate::error::{BrokerError, Result};
use crate::gateway::connections;
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, OptionalExtension, Row, Transaction};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Columns read for a [`CredentialView`], joined with the connection table.
const VIEW_COLUMNS: &str = r#"
    c.id, c.connection_id, g.connection_name, g.protocol, c.directory_login,
    c.updated_at, c.expires_in_hours
"#;

/// Input of a credential write.
pub struct NewCredential<'a> {
    pub username: &'a str,
    pub connection_id: i64,
    pub login: &'a str,
    pub password: &'a str,
    pub expires_in_hours: u32,
}

impl fmt::Debug for NewCredential<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewCredential")
            .field("username", &self.username)
            .field("connection_id", &self.connection_id)
            .field("login", &self.login)
            .field("password", &"***")
            .field("expires_in_hours", &self.expires_in_hours)
            .finish()
    }
}

/// Encrypted credential storage.
///
/// # Schema
/// ```sql
/// CREATE TABLE credentials (
///     id INTEGER PRIMARY KEY,
///     username TEXT NOT NULL,
///     connection_id INTEGER NOT NULL,
///     directory_login TEXT NOT NULL,
///     encrypted_password TEXT NOT NULL,  -- base64(AES-CBC output || tag)
///     encryption_iv TEXT NOT NULL,       -- base64 IV
///     updated_at TEXT NOT NULL,          -- RFC 3339
///     expires_in_hours INTEGER NOT NULL, -- captured at write time
///     is_active INTEGER NOT NULL,
///     UNIQUE(username, connection_id)
/// );
/// ```
#[derive(Clone)]
pub struct CredentialStore {
    cipher: Arc<Cipher>,
}

impl CredentialStore {
    pub fn new(cipher: Arc<Cipher>) -> Self {
        Self { cipher }
    }

    /// Encrypts and stores a credential, replacing any previous one for the
    /// same (username, connection).
    ///
    /// The row is always reactivated and its `updated_at` reset to `now`.
    ///
    /// # Returns
    /// * `Ok(())` - Credential stored
    /// * `Err(ConnectionNotFound)` - The connection does not exist (nothing written)
    /// * `Err` - If encryption or the database operation fails
    pub fn upsert(
        &self,
        tx: &Transaction<'_>,
        credential: &NewCredential<'_>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !connections::exists(tx, credential.connection_id)? {
            return Err(BrokerError::ConnectionNotFound(credential.connection_id));
        }

        let sealed = self.cipher.encrypt(credential.password)?;

        tx.execute(
            r#"
            INSERT INTO credentials (
                username, connection_id, directory_login,
                encrypted_password, encryption_iv,
                updated_at, expires_in_hours, is_active
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)
            ON CONFLICT(username, connection_id) DO UPDATE SET
                directory_login = excluded.directory_login,
                encrypted_password = excluded.encrypted_password,
                encryption_iv = excluded.encryption_iv,
                updated_at = excluded.updated_at,
                expires_in_hours = excluded.expires_in_hours,
                is_active = 1
            "#,
            params![
                credential.username,
                credential.connection_id,
                credential.login,
                sealed.ciphertext,
                sealed.iv,
                now.to_rfc3339(),
                credential.expires_in_hours,
            ],
        )?;

        debug!(
            username = %credential.username,
            connection_id = credential.connection_id,
            "Credential row written"
        );

        Ok(())
    }

    /// Ciphertext and IV currently stored for a user and connection.
    ///
    /// Only the save path reads this, to forward the stored password to the
    /// gateway inside the same transaction.
    pub(crate) fn sealed_password(
        &self,
        tx: &Transaction<'_>,
        username: &str,
        connection_id: i64,
    ) -> Result<SealedPassword> {
        let sealed = tx.query_row(
            r#"
            SELECT encrypted_password, encryption_iv
            FROM credentials
            WHERE username = ?1 AND connection_id = ?2 AND is_active = 1
            "#,
            params![username, connection_id],
            |row| {
                Ok(SealedPassword {
                    ciphertext: row.get(0)?,
                    iv: row.get(1)?,
                })
            },
        )?;

        Ok(sealed)
    }

    /// Metadata of the active credential for a user and connection.
    ///
    /// # Returns
    /// * `Ok(Some(view))` - Active credential found (possibly expired, see `is_valid`)
    /// * `Ok(None)` - No active credential
    pub fn get(
        &self,
        tx: &Transaction<'_>,
        username: &str,
        connection_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<CredentialView>> {
        let sql = format!(
            r#"
            SELECT {VIEW_COLUMNS}
            FROM credentials c
            JOIN connections g ON g.connection_id = c.connection_id
            WHERE c.username = ?1 AND c.connection_id = ?2 AND c.is_active = 1
            "#
        );

        let view = tx
            .query_row(&sql, params![username, connection_id], |row| {
                view_from_row(row, now)
            })
            .optional()?;

        Ok(view)
    }

    /// All active credentials of a user, ordered by connection name.
    pub fn list(
        &self,
        tx: &Transaction<'_>,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<CredentialView>> {
        let sql = format!(
            r#"
            SELECT {VIEW_COLUMNS}
            FROM credentials c
            JOIN connections g ON g.connection_id = c.connection_id
            WHERE c.username = ?1 AND c.is_active = 1
            ORDER BY g.connection_name
            "#
        );

        let mut stmt = tx.prepare(&sql)?;
        let views = stmt
            .query_map(params![username], |row| view_from_row(row, now))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(views)
    }

    /// Soft-deletes the active credential for a user and connection.
    ///
    /// # Returns
    /// * `Ok(true)` - An active credential was deactivated
    /// * `Ok(false)` - Nothing was active (not an error)
    pub fn revoke(&self, tx: &Transaction<'_>, username: &str, connection_id: i64) -> Result<bool> {
        let rows_affected = tx.execute(
            r#"
            UPDATE credentials
            SET is_active = 0
            WHERE username = ?1 AND connection_id = ?2 AND is_active = 1
            "#,
            params![username, connection_id],
        )?;

        Ok(rows_affected > 0)
    }
}

fn view_from_row(row: &Row<'_>, now: DateTime<Utc>) -> rusqlite::Result<CredentialView> {
    let updated_at: String = row.get(5)?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    let expires_in_hours: i64 = row.get(6)?;
    let expires_at = expires_at(updated_at, expires_in_hours);

    Ok(CredentialView {
        id: row.get(0)?,
        connection_id: row.get(1)?,
        connection_name: row.get(2)?,
        protocol: row.get(3)?,
        directory_login: row.get(4)?,
        updated_at,
        expires_in_hours,
        expires_at,
        is_valid: is_valid_at(expires_at, now),
    })
}
