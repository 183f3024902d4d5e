//! Schema migrations.
//!
//! The schema version lives in SQLite's `user_version` pragma. Opening
//! a database compares it against [`CURRENT_VERSION`] and applies the
//! missing steps in order, bumping the pragma after each one, so a
//! current database is left untouched and an old one catches up in a
//! single open.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Version the newest migration leaves the schema at.
const CURRENT_VERSION: u32 = 1;

/// Bring the connection's schema up to [`CURRENT_VERSION`].
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let mut version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < CURRENT_VERSION {
        tracing::info!(from = version, to = CURRENT_VERSION, "migrating database schema");
    }

    if version < 1 {
        v001_initial::up(conn).map_err(|e| StoreError::Migration(e.to_string()))?;
        conn.pragma_update(None, "user_version", 1)?;
        version = 1;
    }

    debug_assert_eq!(version, CURRENT_VERSION);
    Ok(())
}
