use crate::credentials::CipherError;

/// Failures surfaced by the credential service.
///
/// `Validation`, `ConnectionNotFound` and `Unauthenticated` are caller errors;
/// everything else is an internal failure whose detail stays in the logs.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("{0}")]
    Validation(String),

    #[error("Connection {0} not found")]
    ConnectionNotFound(i64),

    #[error("Stored credential could not be decrypted: {0}")]
    Cipher(#[from] CipherError),

    #[error("Credential store failure: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Database session unavailable (poisoned lock)")]
    SessionPoisoned,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Identity provider failure: {0}")]
    IdentityProvider(String),
}

impl BrokerError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrokerError::Store(_) | BrokerError::SessionPoisoned | BrokerError::IdentityProvider(_)
        )
    }
}

pub type Result<T, E = BrokerError> = std::result::Result<T, E>;
