//! CRUD operations for [`Job`] records.
//!
//! The chat core only needs enough of a job to anchor rooms and chat
//! requests: title and owner.

use chrono::{DateTime, Utc};
use rusqlite::params;

use hirelink_shared::{JobId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Job;

impl Database {
    /// Insert a new job.
    pub fn create_job(&self, job: &Job) -> Result<()> {
        self.conn().execute(
            "INSERT INTO jobs (id, title, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                job.id.to_string(),
                job.title,
                job.created_by.to_string(),
                job.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a single job by id.
    pub fn get_job(&self, id: JobId) -> Result<Job> {
        self.conn()
            .query_row(
                "SELECT id, title, created_by, created_at FROM jobs WHERE id = ?1",
                params![id.to_string()],
                row_to_job,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }
}

/// Map a `rusqlite::Row` to a [`Job`].
fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let id_str: String = row.get(0)?;
    let title: String = row.get(1)?;
    let owner_str: String = row.get(2)?;
    let created_str: String = row.get(3)?;

    let id = JobId::parse(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let created_by = UserId::parse(&owner_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Job {
        id,
        title,
        created_by,
        created_at,
    })
}
