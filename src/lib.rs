// HTTP API (axum router, principal middleware)
pub mod api;

// Principal extraction from proxy headers
pub mod auth;

// Broker configuration (env + TOML)
pub mod config;

// Password encryption and credential storage
pub mod credentials;

// SQLite session and schema
pub mod database;

pub mod error;

// Downstream connection-parameter store
pub mod gateway;

// Identity provider client and portal application listing
pub mod identity;

// Credential lifecycle service
pub mod service;
