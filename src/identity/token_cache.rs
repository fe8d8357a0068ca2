//! Service account token cache.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Mutex;

/// Seconds subtracted from the advertised token lifetime.
const TOKEN_SAFETY_MARGIN_SECS: i64 = 30;

/// Advertised lifetimes are capped at one day.
const MAX_TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Single cached access token with an expiry.
///
/// Shared by `Arc` between request handlers. Concurrent refreshes are
/// tolerated; the last stored token wins.
#[derive(Default)]
pub struct TokenCache {
    entry: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached token if it is still usable at `now`.
    pub fn get(&self, now: DateTime<Utc>) -> Option<String> {
        let entry = self.entry.lock().unwrap_or_else(|e| e.into_inner());
        entry
            .as_ref()
            .filter(|cached| now < cached.expires_at)
            .map(|cached| cached.token.clone())
    }

    /// Store a token valid for `expires_in_secs` from `now`, minus the safety margin.
    ///
    /// The lifetime is clamped to `0..=MAX_TOKEN_LIFETIME_SECS`. Returns the
    /// instant the cached token stops being served.
    pub fn store(&self, token: String, expires_in_secs: i64, now: DateTime<Utc>) -> DateTime<Utc> {
        let lifetime = expires_in_secs.clamp(0, MAX_TOKEN_LIFETIME_SECS) - TOKEN_SAFETY_MARGIN_SECS;
        let expires_at = now
            .checked_add_signed(Duration::seconds(lifetime))
            .unwrap_or(now);
        let mut entry = self.entry.lock().unwrap_or_else(|e| e.into_inner());
        *entry = Some(CachedToken { token, expires_at });
        expires_at
    }
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entry = self.entry.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("TokenCache")
            .field("expires_at", &entry.as_ref().map(|cached| cached.expires_at))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_cache() {
        let cache = TokenCache::new();
        assert!(cache.get(t0()).is_none());
    }

    #[test]
    fn test_token_served_until_margin() {
        let cache = TokenCache::new();
        let expires_at = cache.store("tok".to_string(), 300, t0());
        assert_eq!(expires_at, t0() + Duration::seconds(270));

        assert_eq!(cache.get(t0()).as_deref(), Some("tok"));
        assert_eq!(cache.get(t0() + Duration::seconds(269)).as_deref(), Some("tok"));
        assert!(cache.get(t0() + Duration::seconds(270)).is_none());
    }

    #[test]
    fn test_short_lived_token_never_served() {
        let cache = TokenCache::new();
        cache.store("tok".to_string(), 20, t0());
        assert!(cache.get(t0()).is_none());
    }

    #[test]
    fn test_store_replaces() {
        let cache = TokenCache::new();
        cache.store("first".to_string(), 300, t0());
        cache.store("second".to_string(), 300, t0());
        assert_eq!(cache.get(t0()).as_deref(), Some("second"));

        // A short-lived replacement evicts the usable one
        cache.store("third".to_string(), 10, t0());
        assert!(cache.get(t0()).is_none());
    }

    #[test]
    fn test_extreme_lifetimes_clamped() {
        let cache = TokenCache::new();

        let expires_at = cache.store("tok".to_string(), i64::MAX, t0());
        assert_eq!(expires_at, t0() + Duration::seconds(86_400 - 30));
        assert_eq!(cache.get(t0() + Duration::hours(23)).as_deref(), Some("tok"));
        assert!(cache.get(t0() + Duration::hours(24)).is_none());

        let expires_at = cache.store("tok".to_string(), i64::MIN, t0());
        assert_eq!(expires_at, t0() - Duration::seconds(30));
        assert!(cache.get(t0()).is_none());
    }

    #[test]
    fn test_debug_hides_token() {
        let cache = TokenCache::new();
        cache.store("very-secret-token".to_string(), 300, t0());
        assert!(!format!("{:?}", cache).contains("very-secret-token"));
    }
}
