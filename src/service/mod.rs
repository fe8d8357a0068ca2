//! Credential lifecycle orchestration.
//!
//! Each operation is one unit of work on one database transaction:
//!
//! ```text
//! save:   validate → resolve connection → encrypt + upsert → read-back decrypt → project → commit
//! revoke: deactivate row → clear gateway parameters (only if a row was active) → commit
//! get / list: metadata reads only, never decrypt
//! ```
//!
//! The principal is supplied by the caller; the service never inspects
//! request headers.

use crate::auth::Principal;
use crate::credentials::{Cipher, CredentialStore, CredentialView, NewCredential};
use crate::database::Database;
use crate::error::{BrokerError, Result};
use crate::gateway::{self, GatewayConnection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};


/// Login/password pair submitted for a connection.
///
/// Both fields are optional at the type level so that a missing field is
/// reported as a validation error rather than a deserialization failure.
#[derive(Default, Deserialize)]
pub struct SaveCredential {
    pub login: Option<String>,
    pub password: Option<String>,
}

impl SaveCredential {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: Some(login.into()),
            password: Some(password.into()),
        }
    }

    fn validate(&self) -> Result<(&str, &str)> {
        match (self.login.as_deref(), self.password.as_deref()) {
            (Some(login), Some(password)) if !login.trim().is_empty() => Ok((login, password)),
            _ => Err(BrokerError::Validation(
                "Login and password are required".to_string(),
            )),
        }
    }
}

impl fmt::Debug for SaveCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveCredential")
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Result of a successful save.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CredentialSummary {
    pub connection_id: i64,
    pub connection_name: String,
    pub login: String,
    pub expires_in_hours: u32,
    pub message: String,
}

/// Outcome of a single-credential lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum CredentialLookup {
    Found(CredentialView),
    Missing { connection_id: i64 },
}

impl CredentialLookup {
    pub fn has_credentials(&self) -> bool {
        matches!(self, CredentialLookup::Found(_))
    }
}

/// Save/get/list/revoke over the credential store and the gateway.
pub struct CredentialService {
    database: Arc<Database>,
    cipher: Arc<Cipher>,
    store: CredentialStore,
    expiry_hours: u32,
}

impl CredentialService {
    /// # Arguments
    /// * `database` - Shared database holding both credential and gateway tables
    /// * `cipher` - Process-wide password cipher
    /// * `expiry_hours` - Validity window applied to new writes
    pub fn new(database: Arc<Database>, cipher: Arc<Cipher>, expiry_hours: u32) -> Self {
        Self {
            store: CredentialStore::new(Arc::clone(&cipher)),
            database,
            cipher,
            expiry_hours,
        }
    }

    /// Stores a credential and pushes it to the gateway.
    ///
    /// # Errors
    /// - Validation: login or password missing (no database access)
    /// - ConnectionNotFound: the connection does not exist (nothing written)
    /// - Cipher / Store: the whole unit is rolled back
    pub fn save(
        &self,
        principal: &Principal,
        connection_id: i64,
        request: &SaveCredential,
    ) -> Result<CredentialSummary> {
        self.save_at(principal, connection_id, request, Utc::now())
    }

    pub fn save_at(
        &self,
        principal: &Principal,
        connection_id: i64,
        request: &SaveCredential,
        now: DateTime<Utc>,
    ) -> Result<CredentialSummary> {
        let (login, password) = request.validate()?;

        let connection: GatewayConnection = self.database.transaction(|tx| {
            let connection = gateway::connections::find(tx, connection_id)?
                .ok_or(BrokerError::ConnectionNotFound(connection_id))?;

            let credential = NewCredential {
                username: principal.as_str(),
                connection_id,
                login,
                password,
                expires_in_hours: self.expiry_hours,
            };
            self.store.upsert(tx, &credential, now)?;

            // Project what was actually stored, so an unreadable record aborts the save
            let sealed = self.store.sealed_password(tx, principal.as_str(), connection_id)?;
            let forwarded = self.cipher.decrypt(&sealed.ciphertext, &sealed.iv)?;
            gateway::project(tx, connection_id, login, &forwarded)?;

            Ok(connection)
        })?;

        info!(
            username = %principal,
            connection_id,
            connection_name = %connection.connection_name,
            login = %login,
            expires_in_hours = self.expiry_hours,
            "Credential saved"
        );

        Ok(CredentialSummary {
            connection_id,
            message: format!("Credentials saved for {}", connection.connection_name),
            connection_name: connection.connection_name,
            login: login.to_string(),
            expires_in_hours: self.expiry_hours,
        })
    }

    /// Metadata of the principal's credential for one connection.
    pub fn get(&self, principal: &Principal, connection_id: i64) -> Result<CredentialLookup> {
        self.get_at(principal, connection_id, Utc::now())
    }

    pub fn get_at(
        &self,
        principal: &Principal,
        connection_id: i64,
        now: DateTime<Utc>,
    ) -> Result<CredentialLookup> {
        let view = self
            .database
            .read(|tx| self.store.get(tx, principal.as_str(), connection_id, now))?;

        debug!(
            username = %principal,
            connection_id,
            found = view.is_some(),
            "Credential lookup"
        );

        Ok(match view {
            Some(view) => CredentialLookup::Found(view),
            None => CredentialLookup::Missing { connection_id },
        })
    }

    /// All active credentials of the principal, ordered by connection name.
    pub fn list(&self, principal: &Principal) -> Result<Vec<CredentialView>> {
        self.list_at(principal, Utc::now())
    }

    pub fn list_at(&self, principal: &Principal, now: DateTime<Utc>) -> Result<Vec<CredentialView>> {
        let views = self
            .database
            .read(|tx| self.store.list(tx, principal.as_str(), now))?;

        debug!(username = %principal, count = views.len(), "Credentials listed");
        Ok(views)
    }

    /// Deactivates the principal's credential and clears the gateway
    /// parameters of the connection, atomically.
    ///
    /// Revoking a credential that is not active is a no-op: the gateway
    /// parameters, which may belong to another user's live credential, are
    /// left untouched.
    pub fn revoke(&self, principal: &Principal, connection_id: i64) -> Result<()> {
        let (revoked, cleared) = self.database.transaction(|tx| {
            let revoked = self.store.revoke(tx, principal.as_str(), connection_id)?;
            let cleared = if revoked {
                gateway::clear(tx, connection_id)?
            } else {
                0
            };
            Ok((revoked, cleared))
        })?;

        info!(
            username = %principal,
            connection_id,
            revoked,
            cleared,
            "Credential revoked"
        );
        Ok(())
    }

    /// Gateway connections available for credential assignment.
    pub fn connections(&self) -> Result<Vec<GatewayConnection>> {
        self.database.read(|tx| gateway::connections::list(tx))
    }
}
