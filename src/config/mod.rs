use anyhow::Context;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Passphrase used when `ENCRYPTION_KEY` is not provided.
///
/// Only suitable for development; startup warns when it is in effect.
pub const DEFAULT_PASSPHRASE: &str = "ChangeThisKeyInProduction!!";

/// Longest accepted validity window (one year).
pub const MAX_EXPIRY_HOURS: u32 = 24 * 365;

/// Complete broker configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
    #[serde(default)]
    pub keycloak: KeycloakConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// SQLite database holding credentials and gateway parameters
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
    /// How long a statement waits on a locked database (milliseconds)
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> String {
    "credentials.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Password encryption and credential lifetime
#[derive(Clone, Deserialize)]
pub struct EncryptionConfig {
    #[serde(default = "default_passphrase")]
    pub passphrase: String,
    /// Validity window applied to newly saved credentials
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: u32,
}

fn default_passphrase() -> String {
    DEFAULT_PASSPHRASE.to_string()
}

fn default_expiry_hours() -> u32 {
    8
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            passphrase: default_passphrase(),
            expiry_hours: default_expiry_hours(),
        }
    }
}

impl fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("passphrase", &"***")
            .field("expiry_hours", &self.expiry_hours)
            .finish()
    }
}

/// Keycloak service account used to list portal applications
#[derive(Clone, Deserialize)]
pub struct KeycloakConfig {
    /// Base URL, e.g. `https://kc.example.com`; empty disables the integration
    #[serde(default)]
    pub url: String,
    /// Realm the service account authenticates against
    #[serde(default = "default_auth_realm")]
    pub auth_realm: String,
    /// Realms whose clients are listed
    #[serde(default = "default_realms")]
    pub realms: Vec<String>,
    #[serde(default = "default_service_client_id")]
    pub service_client_id: String,
    #[serde(default)]
    pub service_client_secret: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_auth_realm() -> String {
    "master".to_string()
}

fn default_realms() -> Vec<String> {
    vec!["oidc".to_string()]
}

fn default_service_client_id() -> String {
    "portal-api".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl KeycloakConfig {
    /// Both the URL and the service account secret are required.
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.service_client_secret.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for KeycloakConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            auth_realm: default_auth_realm(),
            realms: default_realms(),
            service_client_id: default_service_client_id(),
            service_client_secret: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl fmt::Debug for KeycloakConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeycloakConfig")
            .field("url", &self.url)
            .field("auth_realm", &self.auth_realm)
            .field("realms", &self.realms)
            .field("service_client_id", &self.service_client_id)
            .field(
                "service_client_secret",
                &if self.service_client_secret.is_empty() { "" } else { "***" },
            )
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl BrokerConfig {
    /// Build from env vars, falling back to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Override fields with the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Override fields with values from `lookup`.
    ///
    /// Unparseable numbers keep the current value, as does an expiry above
    /// [`MAX_EXPIRY_HOURS`].
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BROKER_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("BROKER_DATABASE_PATH") {
            self.database.path = v;
        }
        if let Some(v) = lookup("BROKER_DB_BUSY_TIMEOUT_MS") {
            if let Ok(n) = v.trim().parse::<u64>() {
                self.database.busy_timeout_ms = n;
            }
        }
        if let Some(v) = lookup("ENCRYPTION_KEY") {
            self.encryption.passphrase = v;
        }
        if let Some(v) = lookup("CREDENTIALS_EXPIRY_HOURS") {
            match v.trim().parse::<u32>() {
                Ok(n) if n <= MAX_EXPIRY_HOURS => self.encryption.expiry_hours = n,
                _ => {}
            }
        }
        if let Some(v) = lookup("KEYCLOAK_URL") {
            self.keycloak.url = v.trim().trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("KEYCLOAK_AUTH_REALM") {
            self.keycloak.auth_realm = v;
        }
        if let Some(v) = lookup("KEYCLOAK_REALMS") {
            self.keycloak.realms = v
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("KEYCLOAK_SERVICE_CLIENT_ID") {
            self.keycloak.service_client_id = v;
        }
        if let Some(v) = lookup("KEYCLOAK_SERVICE_CLIENT_SECRET") {
            self.keycloak.service_client_secret = v;
        }
        if let Some(v) = lookup("KEYCLOAK_TIMEOUT_SECS") {
            if let Ok(n) = v.trim().parse::<u64>() {
                self.keycloak.timeout_secs = n;
            }
        }
    }

    /// Operational warnings to log at startup. None of them is fatal.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.encryption.passphrase.is_empty() {
            warnings.push("ENCRYPTION_KEY is empty; stored passwords are weakly protected".to_string());
        } else if self.encryption.passphrase == DEFAULT_PASSPHRASE {
            warnings.push("ENCRYPTION_KEY not set; using the development passphrase".to_string());
        }

        if self.encryption.expiry_hours == 0 {
            warnings.push(
                "CREDENTIALS_EXPIRY_HOURS is 0; saved credentials are never valid".to_string(),
            );
        } else if self.encryption.expiry_hours > MAX_EXPIRY_HOURS {
            warnings.push(format!(
                "expiry_hours {} exceeds {}; credentials will not expire in practice",
                self.encryption.expiry_hours, MAX_EXPIRY_HOURS
            ));
        }

        if !self.keycloak.is_configured() {
            warnings.push(
                "Keycloak service account not configured; client listing is disabled".to_string(),
            );
        } else if self.keycloak.realms.is_empty() {
            warnings.push("KEYCLOAK_REALMS is empty; no clients will be listed".to_string());
        }

        warnings
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> anyhow::Result<BrokerConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
    let config: BrokerConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config {}", path))?;
    Ok(config)
}
