//! rollcall-store — SQLite-backed attendance ledger.
//!
//! Owns the durable side of the system: enrolled students (with their feature
//! vector blobs), instructors, class sessions and presence records. The
//! at-most-one-record-per-(session, student) guarantee lives here, in a
//! UNIQUE constraint, not in any in-memory set.

pub mod codec;
mod store;

pub use codec::{decode_vector, encode_vector, CodecError};
pub use store::{
    AttendanceRow, AttendanceStore, ClassSession, Instructor, MarkOutcome, NewStudent,
    SessionStats, Student, StudentStats,
};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("a record with email {0} already exists")]
    DuplicateEmail(String),
    #[error("student {0} not found")]
    StudentNotFound(i64),
    #[error("session {0} not found")]
    SessionNotFound(i64),
    #[error(transparent)]
    Gallery(#[from] rollcall_core::GalleryError),
}

/// Default location of the attendance database.
pub fn default_db_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall/attendance.db")
}
