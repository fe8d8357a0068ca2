//! Projection of directory credentials into the gateway's connection
//! parameters.
//!
//! The gateway reads per-connection named parameters when it opens a session.
//! Two channels are written with the same pair: the primary `username` /
//! `password` and the `gateway-username` / `gateway-password` used when the
//! session goes through a remote desktop gateway.
//!
//! Both operations take the caller's transaction so they commit or roll back
//! together with the matching credential row.

pub mod connections;

use crate::error::Result;
use rusqlite::{params, Connection, Transaction};
use tracing::{debug, info};

pub use connections::GatewayConnection;

/// Parameter names owned by the broker, as (name, carries_password).
const PARAMETERS: [(&str, bool); 4] = [
    ("username", false),
    ("password", true),
    ("gateway-username", false),
    ("gateway-password", true),
];

/// Names of the four parameters the broker writes for each connection.
pub fn parameter_names() -> impl Iterator<Item = &'static str> {
    PARAMETERS.iter().map(|(name, _)| *name)
}

/// Writes `login`/`password` into all four parameters of `connection_id`,
/// replacing any previous values.
pub fn project(tx: &Transaction<'_>, connection_id: i64, login: &str, password: &str) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        r#"
        INSERT INTO connection_parameters (connection_id, parameter_name, parameter_value)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(connection_id, parameter_name) DO UPDATE SET
            parameter_value = excluded.parameter_value
        "#,
    )?;

    for (name, carries_password) in PARAMETERS {
        let value = if carries_password { password } else { login };
        stmt.execute(params![connection_id, name, value])?;
        debug!(
            connection_id,
            parameter = name,
            value = if carries_password { "***" } else { login },
            "Gateway parameter written"
        );
    }

    info!(connection_id, login = %login, "Gateway connection updated");
    Ok(())
}

/// Removes the four broker-owned parameters of `connection_id`.
///
/// Missing parameters are not an error. Returns the number of rows removed.
pub fn clear(tx: &Transaction<'_>, connection_id: i64) -> Result<usize> {
    let mut stmt = tx.prepare_cached(
        r#"
        DELETE FROM connection_parameters
        WHERE connection_id = ?1 AND parameter_name = ?2
        "#,
    )?;

    let mut removed = 0;
    for name in parameter_names() {
        removed += stmt.execute(params![connection_id, name])?;
    }

    info!(connection_id, removed, "Gateway credentials cleared");
    Ok(removed)
}

/// Current parameters of a connection, ordered by name.
pub fn parameters(conn: &Connection, connection_id: i64) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT parameter_name, parameter_value
        FROM connection_parameters
        WHERE connection_id = ?1
        ORDER BY parameter_name
        "#,
    )?;

    let rows = stmt
        .query_map(params![connection_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<(String, String)>>>()?;

    Ok(rows)
}
