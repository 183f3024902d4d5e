//! CRUD operations for [`ChatRequest`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;

use hirelink_shared::{JobId, RequestId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ChatRequest, RequestStatus};

impl Database {
    /// Insert a new chat request.
    pub fn create_chat_request(&self, request: &ChatRequest) -> Result<()> {
        self.conn().execute(
            "INSERT INTO chat_requests (id, from_user, to_user, job_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                request.id.to_string(),
                request.from_user.to_string(),
                request.to_user.to_string(),
                request.job_id.to_string(),
                request.status.as_str(),
                request.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a single chat request by id.
    pub fn get_chat_request(&self, id: RequestId) -> Result<ChatRequest> {
        self.conn()
            .query_row(
                "SELECT id, from_user, to_user, job_id, status, created_at
                 FROM chat_requests WHERE id = ?1",
                params![id.to_string()],
                row_to_request,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Look for an existing PENDING request for the same (from, to, job)
    /// triple. Used to reject duplicates.
    pub fn find_pending_request(
        &self,
        from: UserId,
        to: UserId,
        job: JobId,
    ) -> Result<Option<ChatRequest>> {
        let found = self
            .conn()
            .query_row(
                "SELECT id, from_user, to_user, job_id, status, created_at
                 FROM chat_requests
                 WHERE from_user = ?1 AND to_user = ?2 AND job_id = ?3 AND status = 'PENDING'",
                params![from.to_string(), to.to_string(), job.to_string()],
                row_to_request,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Sqlite(other)),
            })?;
        Ok(found)
    }

    /// Requests addressed to `user`, filtered by status.
    pub fn list_requests_to(&self, user: UserId, status: RequestStatus) -> Result<Vec<ChatRequest>> {
        self.list_requests(
            "SELECT id, from_user, to_user, job_id, status, created_at
             FROM chat_requests
             WHERE to_user = ?1 AND status = ?2
             ORDER BY created_at DESC",
            user,
            status,
        )
    }

    /// Requests sent by `user`, filtered by status.
    pub fn list_requests_from(
        &self,
        user: UserId,
        status: RequestStatus,
    ) -> Result<Vec<ChatRequest>> {
        self.list_requests(
            "SELECT id, from_user, to_user, job_id, status, created_at
             FROM chat_requests
             WHERE from_user = ?1 AND status = ?2
             ORDER BY created_at DESC",
            user,
            status,
        )
    }

    /// Transition a request to its answered state.
    pub fn set_request_status(&self, id: RequestId, status: RequestStatus) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE chat_requests SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn list_requests(
        &self,
        sql: &str,
        user: UserId,
        status: RequestStatus,
    ) -> Result<Vec<ChatRequest>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map(params![user.to_string(), status.as_str()], row_to_request)?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }
}

/// Map a `rusqlite::Row` to a [`ChatRequest`].
fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatRequest> {
    let id_str: String = row.get(0)?;
    let from_str: String = row.get(1)?;
    let to_str: String = row.get(2)?;
    let job_str: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let created_str: String = row.get(5)?;

    let id = RequestId::parse(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let from_user = UserId::parse(&from_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let to_user = UserId::parse(&to_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let job_id = JobId::parse(&job_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status = RequestStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown request status: {status_str}").into(),
        )
    })?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ChatRequest {
        id,
        from_user,
        to_user,
        job_id,
        status,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{open_test_db, seed_job, seed_user};

    fn seed_request(db: &Database) -> (ChatRequest, UserId, UserId, JobId) {
        let from = seed_user(db, "Applicant").id;
        let to = seed_user(db, "Recruiter").id;
        let job = seed_job(db, to, "Backend Role").id;
        let request = ChatRequest {
            id: RequestId::new(),
            from_user: from,
            to_user: to,
            job_id: job,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        };
        db.create_chat_request(&request).unwrap();
        (request, from, to, job)
    }

    #[test]
    fn pending_lookup_finds_duplicate() {
        let (db, _dir) = open_test_db();
        let (request, from, to, job) = seed_request(&db);

        let found = db.find_pending_request(from, to, job).unwrap().unwrap();
        assert_eq!(found.id, request.id);
    }

    #[test]
    fn answered_request_no_longer_pending() {
        let (db, _dir) = open_test_db();
        let (request, from, to, job) = seed_request(&db);

        db.set_request_status(request.id, RequestStatus::Accepted)
            .unwrap();

        assert!(db.find_pending_request(from, to, job).unwrap().is_none());
        let accepted = db.list_requests_from(from, RequestStatus::Accepted).unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].id, request.id);
    }

    #[test]
    fn incoming_listing_is_scoped_to_recipient() {
        let (db, _dir) = open_test_db();
        let (request, _from, to, _job) = seed_request(&db);

        let incoming = db.list_requests_to(to, RequestStatus::Pending).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].id, request.id);

        let stranger = seed_user(&db, "Bystander").id;
        assert!(db
            .list_requests_to(stranger, RequestStatus::Pending)
            .unwrap()
            .is_empty());
    }
}
