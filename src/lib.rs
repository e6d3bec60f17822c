//! Hawkeyes Bank is a small ledger for running a classroom economy.
//!
//! Students and admins log in, admins record debits and credits for each
//! student, balances are computed from the ledger, and the whole ledger can be
//! exported to (and re-imported from) a zip archive of per-grade spreadsheets.
//!
//! This library provides the ledger store, the balance calculations, the grade
//! archive codec and the session checks used by the command line tools.

#![warn(missing_docs)]

pub mod admin;
pub mod balance;
mod database_id;
pub mod db;
pub mod grade_archive;
pub mod logging;
mod password;
pub mod payroll;
pub mod session;
pub mod student;
pub mod transaction;

pub use database_id::{DatabaseId, TransactionId};
pub use db::initialize as initialize_db;
pub use password::{PasswordHash, ValidatedPassword};
pub use session::{Session, log_in};

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The name and password did not match a registered student or admin.
    #[error("invalid name or password")]
    InvalidCredentials,

    /// The admin account exists but its permission level is inactive.
    #[error("this account is not active")]
    InactiveAccount,

    /// The session does not grant access to the requested operation.
    #[error("you do not have permission to do that")]
    Unauthorized,

    /// The user provided a password that is too easy to guess.
    #[error("password is too weak: {0}")]
    TooWeak(String),

    /// The new password and its confirmation differ.
    #[error("new passwords do not match")]
    PasswordMismatch,

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging. When reporting to
    /// the user this should be replaced with a general error message.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// An empty string was used as a student or admin name.
    #[error("name cannot be empty")]
    EmptyName,

    /// An empty string was used as a grade label.
    #[error("grade cannot be empty")]
    EmptyGrade,

    /// The student name already exists in the database.
    #[error("student \"{0}\" already exists")]
    DuplicateStudentName(String),

    /// The admin name already exists in the database.
    #[error("admin \"{0}\" already exists")]
    DuplicateAdminName(String),

    /// A permission level outside of the known levels was read or requested.
    #[error("{0} is not a valid permission level")]
    InvalidPermissionLevel(i64),

    /// A transaction referred to a student that does not exist.
    #[error("the student ID does not refer to a registered student")]
    InvalidStudent,

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// Tried to update a transaction that does not exist
    #[error("tried to update a transaction that is not in the database")]
    UpdateMissingTransaction,

    /// Tried to delete a transaction that does not exist
    #[error("tried to delete a transaction that is not in the database")]
    DeleteMissingTransaction,

    /// Tried to delete a student that does not exist
    #[error("tried to delete a student that is not in the database")]
    DeleteMissingStudent,

    /// Tried to delete an admin that does not exist
    #[error("tried to delete an admin that is not in the database")]
    DeleteMissingAdmin,

    /// The uploaded archive could not be read or the export archive could
    /// not be written.
    #[error("could not process zip archive: {0}")]
    Archive(String),

    /// A workbook inside an uploaded archive could not be parsed.
    #[error("could not read workbook: {0}")]
    Workbook(String),

    /// A workbook could not be generated for export.
    #[error("could not write spreadsheet: {0}")]
    Spreadsheet(String),

    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
                },
                _,
            ) => Error::InvalidStudent,
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value.to_string())
    }
}

/// Returns `true` if `error` is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: _,
                extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
            },
            _,
        )
    )
}
