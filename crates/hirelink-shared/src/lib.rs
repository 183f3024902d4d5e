//! # hirelink-shared
//!
//! Types shared across the Hirelink chat service: id newtypes, tuning
//! constants, and the error taxonomy every crate maps into.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{ChatError, ChatResult};
pub use types::*;
