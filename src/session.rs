//! Logging in, and the checks that decide what a logged-in user may do.
//!
//! A [Session] is created by [log_in] and handed to every operation that needs
//! to know who is asking.

use rusqlite::Connection;

use crate::{
    Error, PasswordHash, TransactionId,
    admin::{
        Admin, AdminId, PermissionLevel, create_admin, delete_admin, find_admin_by_name,
        list_admins,
    },
    student::{
        Grade, Student, StudentId, create_student, delete_student, find_student_by_name,
        get_student, update_student_password,
    },
    transaction::{Transaction, TransactionBuilder, update_transaction},
};

/// Who is logged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Session {
    /// A student, who may only see their own account.
    Student(StudentId),
    /// An admin with the given permission level.
    Admin(PermissionLevel),
}

impl Session {
    /// Check that the session belongs to an active admin.
    ///
    /// # Errors
    ///
    /// Returns [Error::Unauthorized] for student sessions and inactive admins.
    pub fn require_admin(&self) -> Result<(), Error> {
        match self {
            Session::Admin(PermissionLevel::Staff | PermissionLevel::Super) => Ok(()),
            _ => Err(Error::Unauthorized),
        }
    }

    /// Check that the session belongs to a super admin.
    ///
    /// # Errors
    ///
    /// Returns [Error::Unauthorized] for any other session.
    pub fn require_super_admin(&self) -> Result<(), Error> {
        match self {
            Session::Admin(PermissionLevel::Super) => Ok(()),
            _ => Err(Error::Unauthorized),
        }
    }

    /// Get the ID of the logged-in student.
    ///
    /// # Errors
    ///
    /// Returns [Error::Unauthorized] for admin sessions.
    pub fn require_student(&self) -> Result<StudentId, Error> {
        match self {
            Session::Student(student_id) => Ok(*student_id),
            Session::Admin(_) => Err(Error::Unauthorized),
        }
    }

    /// Check that the session belongs to an admin or to the student `student_id`.
    ///
    /// # Errors
    ///
    /// Returns [Error::Unauthorized] for any other session.
    pub fn require_student_or_admin(&self, student_id: StudentId) -> Result<(), Error> {
        match self {
            Session::Student(id) if *id == student_id => Ok(()),
            Session::Student(_) => Err(Error::Unauthorized),
            Session::Admin(_) => self.require_admin(),
        }
    }
}

/// Log in with a student or admin name and password.
///
/// Students are checked first, so a student and an admin with the same name
/// and password log in as the student.
///
/// # Errors
///
/// This function will return a:
/// - [Error::InvalidCredentials] if no account matches the name and password,
/// - [Error::InactiveAccount] if the matching admin account is inactive,
/// - or [Error::SqlError] / [Error::HashingError] if something unexpected went wrong.
pub fn log_in(name: &str, password: &str, connection: &Connection) -> Result<Session, Error> {
    let name = name.trim();

    if let Some(student) = find_student_by_name(name, connection)? {
        if student.password_hash.verify(password)? {
            tracing::info!("Student {} logged in", student.id);
            return Ok(Session::Student(student.id));
        }
    }

    if let Some(admin) = find_admin_by_name(name, connection)? {
        if !admin.password_hash.verify(password)? {
            return Err(Error::InvalidCredentials);
        }

        if admin.permission == PermissionLevel::Inactive {
            tracing::info!("Rejected log in for inactive admin {}", admin.id);
            return Err(Error::InactiveAccount);
        }

        tracing::info!("Admin {} logged in", admin.id);
        return Ok(Session::Admin(admin.permission));
    }

    Err(Error::InvalidCredentials)
}

fn hash_new_password(new_password: &str, confirm: &str, cost: u32) -> Result<PasswordHash, Error> {
    if new_password != confirm {
        return Err(Error::PasswordMismatch);
    }

    PasswordHash::from_raw_password(new_password, cost)
}

/// Change the password of the logged-in student.
///
/// # Errors
///
/// This function will return a:
/// - [Error::Unauthorized] if the session is not a student session,
/// - [Error::PasswordMismatch] if `new_password` and `confirm` differ,
/// - [Error::InvalidCredentials] if `old_password` is wrong,
/// - or [Error::TooWeak] if the new password is too easy to guess.
pub fn change_password(
    session: &Session,
    old_password: &str,
    new_password: &str,
    confirm: &str,
    cost: u32,
    connection: &Connection,
) -> Result<(), Error> {
    let student_id = session.require_student()?;

    if new_password != confirm {
        return Err(Error::PasswordMismatch);
    }

    let student = get_student(student_id, connection)?;
    if !student.password_hash.verify(old_password)? {
        return Err(Error::InvalidCredentials);
    }

    let password_hash = PasswordHash::from_raw_password(new_password, cost)?;
    update_student_password(student.id, &password_hash, connection)?;

    tracing::info!("Student {} changed their password", student.id);

    Ok(())
}

/// Set a new password for a student on their behalf.
///
/// # Errors
///
/// This function will return a:
/// - [Error::Unauthorized] if the session is not an admin session,
/// - [Error::PasswordMismatch] if `new_password` and `confirm` differ,
/// - [Error::TooWeak] if the new password is too easy to guess,
/// - or [Error::NotFound] if the student does not exist.
pub fn reset_student_password(
    session: &Session,
    student_id: StudentId,
    new_password: &str,
    confirm: &str,
    cost: u32,
    connection: &Connection,
) -> Result<(), Error> {
    session.require_admin()?;

    let password_hash = hash_new_password(new_password, confirm, cost)?;
    update_student_password(student_id, &password_hash, connection)?;

    tracing::info!("Reset password for student {student_id}");

    Ok(())
}

/// Register a new student with an initial password.
///
/// # Errors
///
/// This function will return a:
/// - [Error::Unauthorized] if the session is not an admin session,
/// - [Error::TooWeak] if the password is too easy to guess,
/// - or any error from [create_student].
pub fn register_student(
    session: &Session,
    name: &str,
    grade: Grade,
    password: &str,
    cost: u32,
    connection: &Connection,
) -> Result<Student, Error> {
    session.require_admin()?;

    let password_hash = PasswordHash::from_raw_password(password, cost)?;
    let student = create_student(name, grade, password_hash, connection)?;

    tracing::info!("Registered student {} in grade {}", student.id, student.grade);

    Ok(student)
}

/// Register a new admin account.
///
/// # Errors
///
/// This function will return a:
/// - [Error::Unauthorized] if the session is not a super admin session,
/// - [Error::TooWeak] if the password is too easy to guess,
/// - or any error from [create_admin].
pub fn register_admin(
    session: &Session,
    name: &str,
    password: &str,
    permission: PermissionLevel,
    cost: u32,
    connection: &Connection,
) -> Result<Admin, Error> {
    session.require_super_admin()?;

    let password_hash = PasswordHash::from_raw_password(password, cost)?;

    create_admin(name, password_hash, permission, connection)
}

/// Delete a student and all of their transactions.
pub fn remove_student(
    session: &Session,
    student_id: StudentId,
    connection: &Connection,
) -> Result<(), Error> {
    session.require_admin()?;
    delete_student(student_id, connection)
}

/// List every admin account.
///
/// # Errors
///
/// Returns [Error::Unauthorized] if the session is not a super admin session.
pub fn admin_accounts(session: &Session, connection: &Connection) -> Result<Vec<Admin>, Error> {
    session.require_super_admin()?;
    list_admins(connection)
}

/// Overwrite the transaction `id` with the values in `builder`.
///
/// # Errors
///
/// This function will return a:
/// - [Error::Unauthorized] if the session is not an admin session,
/// - or any error from [update_transaction].
pub fn edit_transaction(
    session: &Session,
    id: TransactionId,
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    session.require_admin()?;

    let transaction = update_transaction(id, builder, connection)?;
    tracing::info!("Edited transaction {id} of student {}", transaction.student_id);

    Ok(transaction)
}

/// Delete an admin account.
pub fn remove_admin(
    session: &Session,
    admin_id: AdminId,
    connection: &Connection,
) -> Result<(), Error> {
    session.require_super_admin()?;
    delete_admin(admin_id, connection)
}
