use anyhow::{Context, Result};
use credential_broker::api::{create_router, BrokerAppState};
use credential_broker::config::{load_config, BrokerConfig};
use credential_broker::credentials::Cipher;
use credential_broker::database::Database;
use credential_broker::identity::{KeycloakClient, TokenCache};
use credential_broker::service::CredentialService;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "credential_broker=info".into()),
        )
        .init();

    info!("Credential broker starting...");

    // TOML file first (optional), environment on top
    let config = match std::env::var("BROKER_CONFIG") {
        Ok(path) => {
            let mut config = load_config(&path)?;
            config.apply_env();
            info!(path = %path, "Configuration file loaded");
            config
        }
        Err(_) => BrokerConfig::from_env(),
    };

    for warning in config.warnings() {
        warn!("{}", warning);
    }

    info!(
        bind_addr = %config.server.bind_addr,
        database = %config.database.path,
        expiry_hours = config.encryption.expiry_hours,
        keycloak_configured = config.keycloak.is_configured(),
        realms = ?config.keycloak.realms,
        "Configuration loaded"
    );

    let database = Arc::new(
        Database::open(&config.database.path, config.database.busy_timeout())
            .context("Failed to open credential database")?,
    );
    info!(path = %config.database.path, "Database ready");

    let cipher = Arc::new(
        Cipher::from_passphrase(&config.encryption.passphrase)
            .context("Failed to derive encryption keys")?,
    );
    let service = Arc::new(CredentialService::new(
        Arc::clone(&database),
        cipher,
        config.encryption.expiry_hours,
    ));

    let token_cache = Arc::new(TokenCache::new());
    let keycloak = KeycloakClient::new(&config.keycloak, token_cache)
        .context("Failed to create Keycloak client")?;

    let state = BrokerAppState {
        service,
        identity: Arc::new(keycloak),
        realms: config.keycloak.realms.clone(),
    };

    let router = create_router(state).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "Credential broker listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Credential broker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl_c signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
