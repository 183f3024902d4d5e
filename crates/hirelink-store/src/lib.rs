//! # hirelink-store
//!
//! SQLite persistence for the Hirelink chat service.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection` with typed CRUD helpers for every domain
//! record the chat core touches: users, jobs, chat requests, rooms,
//! messages (with their read-by / deleted-for / starred-by / reaction
//! sets), and scheduled messages.

pub mod database;
pub mod jobs;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod requests;
pub mod rooms;
pub mod scheduled;
pub mod users;

mod error;

#[cfg(test)]
pub(crate) mod test_support;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
