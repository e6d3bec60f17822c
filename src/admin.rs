//! Admin accounts: the teachers and staff who run the bank.

use std::fmt::Display;

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::{Error, PasswordHash, is_unique_violation};

/// A newtype wrapper for integer admin IDs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct AdminId(i64);

impl AdminId {
    /// Create a new admin ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the admin ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for AdminId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What an admin account is allowed to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub enum PermissionLevel {
    /// The account exists but cannot log in.
    Inactive,
    /// Can manage students, transactions, payroll and grade archives.
    Staff,
    /// Can do everything staff can, and manage admin accounts.
    Super,
}

impl PermissionLevel {
    /// The integer stored in the database for this level.
    pub fn as_i64(&self) -> i64 {
        match self {
            PermissionLevel::Inactive => 0,
            PermissionLevel::Staff => 1,
            PermissionLevel::Super => 2,
        }
    }
}

impl TryFrom<i64> for PermissionLevel {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PermissionLevel::Inactive),
            1 => Ok(PermissionLevel::Staff),
            2 => Ok(PermissionLevel::Super),
            other => Err(Error::InvalidPermissionLevel(other)),
        }
    }
}

/// An admin account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Admin {
    /// The admin's ID in the application database.
    pub id: AdminId,
    /// The name the admin logs in with.
    pub name: String,
    /// The admin's password hash.
    pub password_hash: PasswordHash,
    /// What the admin is allowed to do.
    pub permission: PermissionLevel,
}

/// Create the admin table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_admin_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS admin (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                permissions INTEGER NOT NULL DEFAULT 1
                )",
        (),
    )?;

    Ok(())
}

fn map_admin_row(row: &Row) -> Result<Admin, rusqlite::Error> {
    let raw_password_hash: String = row.get(2)?;
    let raw_permission: i64 = row.get(3)?;
    let permission = PermissionLevel::try_from(raw_permission).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Integer, Box::new(error))
    })?;

    Ok(Admin {
        id: AdminId::new(row.get(0)?),
        name: row.get(1)?,
        password_hash: PasswordHash::new_unchecked(&raw_password_hash),
        permission,
    })
}

/// Create and insert a new admin into the database.
///
/// # Errors
///
/// This function will return a:
/// - [Error::EmptyName] if `name` is empty,
/// - [Error::DuplicateAdminName] if an admin with the same name exists,
/// - or [Error::SqlError] if some other SQL error occurred.
pub fn create_admin(
    name: &str,
    password_hash: PasswordHash,
    permission: PermissionLevel,
    connection: &Connection,
) -> Result<Admin, Error> {
    let name = name.trim();

    if name.is_empty() {
        return Err(Error::EmptyName);
    }

    connection
        .prepare(
            "INSERT INTO admin (name, password, permissions) VALUES (?1, ?2, ?3)
             RETURNING id, name, password, permissions",
        )?
        .query_row(
            (name, password_hash.as_ref(), permission.as_i64()),
            map_admin_row,
        )
        .map_err(|error| {
            if is_unique_violation(&error) {
                Error::DuplicateAdminName(name.to_owned())
            } else {
                error.into()
            }
        })
}

/// Find the admin whose name is exactly `name`.
pub fn find_admin_by_name(name: &str, connection: &Connection) -> Result<Option<Admin>, Error> {
    let result = connection
        .prepare("SELECT id, name, password, permissions FROM admin WHERE name = :name")?
        .query_row(&[(":name", &name)], map_admin_row);

    match result {
        Ok(admin) => Ok(Some(admin)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

/// Get all admin accounts.
pub fn list_admins(connection: &Connection) -> Result<Vec<Admin>, Error> {
    connection
        .prepare("SELECT id, name, password, permissions FROM admin ORDER BY id")?
        .query_map([], map_admin_row)?
        .map(|maybe_admin| maybe_admin.map_err(Error::from))
        .collect()
}

/// Delete an admin account.
///
/// # Errors
///
/// Returns [Error::DeleteMissingAdmin] if `admin_id` does not refer to an admin.
pub fn delete_admin(admin_id: AdminId, connection: &Connection) -> Result<(), Error> {
    let rows_affected =
        connection.execute("DELETE FROM admin WHERE id = ?1", (admin_id.as_i64(),))?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingAdmin);
    }

    Ok(())
}
