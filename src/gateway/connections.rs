//! Read-only access to the gateway's connection table.

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

/// A remote-desktop connection defined in the gateway.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GatewayConnection {
    pub connection_id: i64,
    pub connection_name: String,
    pub protocol: String,
}

/// Looks up one connection by id.
pub fn find(conn: &Connection, connection_id: i64) -> Result<Option<GatewayConnection>> {
    let found = conn
        .query_row(
            "SELECT connection_id, connection_name, protocol FROM connections WHERE connection_id = ?1",
            params![connection_id],
            |row| {
                Ok(GatewayConnection {
                    connection_id: row.get(0)?,
                    connection_name: row.get(1)?,
                    protocol: row.get(2)?,
                })
            },
        )
        .optional()?;

    Ok(found)
}

/// Whether a connection with this id exists.
pub fn exists(conn: &Connection, connection_id: i64) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM connections WHERE connection_id = ?1",
            params![connection_id],
            |_| Ok(()),
        )
        .optional()?;

    Ok(found.is_some())
}

/// All connections, ordered by name.
pub fn list(conn: &Connection) -> Result<Vec<GatewayConnection>> {
    let mut stmt = conn.prepare(
        "SELECT connection_id, connection_name, protocol FROM connections ORDER BY connection_name",
    )?;

    let connections = stmt
        .query_map([], |row| {
            Ok(GatewayConnection {
                connection_id: row.get(0)?,
                connection_name: row.get(1)?,
                protocol: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(connections)
}
