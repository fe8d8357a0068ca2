use crate::error::BrokerError;
use axum::http::HeaderMap;
use std::fmt;


/// Header set by the authenticating proxy with the preferred username
pub const PREFERRED_USERNAME_HEADER: &str = "x-forwarded-preferred-username";
/// Header set by the authenticating proxy with the user identifier
pub const USER_HEADER: &str = "x-forwarded-user";
/// Header set by the authenticating proxy with the user's email address
pub const EMAIL_HEADER: &str = "x-forwarded-email";

/// Authenticated human on whose behalf a request is made.
///
/// Asserted by the upstream proxy; the broker trusts it as-is and never
/// verifies credentials itself.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Principal(String);

impl Principal {
    /// Wraps an identifier, rejecting empty or blank values.
    pub fn new(identifier: impl Into<String>) -> Result<Self, BrokerError> {
        let identifier = identifier.into();
        let trimmed = identifier.trim();
        if trimmed.is_empty() {
            return Err(BrokerError::Unauthenticated);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the principal from the proxy headers
///
/// Tried in order: preferred username, user, local part of the email.
/// Empty or non-UTF-8 values fall through to the next header.
pub fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, BrokerError> {
    let identifier = header_value(headers, PREFERRED_USERNAME_HEADER)
        .or_else(|| header_value(headers, USER_HEADER))
        .or_else(|| header_value(headers, EMAIL_HEADER).and_then(email_local_part))
        .ok_or(BrokerError::Unauthenticated)?;

    Principal::new(identifier)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Part of an email address before the first `@`
fn email_local_part(email: &str) -> Option<&str> {
    let local = email.split('@').next()?.trim();
    if local.is_empty() {
        None
    } else {
        Some(local)
    }
}
