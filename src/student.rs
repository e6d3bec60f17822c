//! Code for creating the student table and fetching students from the database.

use std::fmt::Display;

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::{Error, PasswordHash, is_unique_violation};

/// A newtype wrapper for integer student IDs.
///
/// This helps disambiguate student IDs from other types of IDs, leading to better compile time
/// errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct StudentId(i64);

impl StudentId {
    /// Create a new student ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the student ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for StudentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The grade a student is in, e.g. "K", "1", ..., "12".
///
/// Grades are compared by their string form, so "10" sorts before "2" and
/// "K" sorts after all the numeric grades.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct Grade(String);

impl Grade {
    /// Create a grade from a label, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [Error::EmptyGrade] if the label is empty.
    pub fn new(label: &str) -> Result<Self, Error> {
        let label = label.trim();

        if label.is_empty() {
            return Err(Error::EmptyGrade);
        }

        Ok(Self(label.to_owned()))
    }

    /// Create a grade without validation, e.g. for values read back from the database.
    pub fn new_unchecked(label: &str) -> Self {
        Self(label.to_owned())
    }
}

impl AsRef<str> for Grade {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A student with a bank account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    /// The student's ID in the application database.
    pub id: StudentId,
    /// The student's full name. Names are unique and are used as worksheet
    /// names in grade archives.
    pub name: String,
    /// The student's grade.
    pub grade: Grade,
    /// The student's password hash.
    pub password_hash: PasswordHash,
    /// The amount last paid to the student in a payroll run.
    pub default_payroll: Option<u32>,
}

/// Create the student table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_student_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS student (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                grade TEXT NOT NULL,
                password TEXT NOT NULL,
                default_payroll INTEGER
                )",
        (),
    )?;

    Ok(())
}

const SELECT_STUDENT: &str = "SELECT id, name, grade, password, default_payroll FROM student";

fn map_student_row(row: &Row) -> Result<Student, rusqlite::Error> {
    let raw_grade: String = row.get(2)?;
    let raw_password_hash: String = row.get(3)?;

    Ok(Student {
        id: StudentId::new(row.get(0)?),
        name: row.get(1)?,
        grade: Grade::new_unchecked(&raw_grade),
        password_hash: PasswordHash::new_unchecked(&raw_password_hash),
        default_payroll: row.get(4)?,
    })
}

/// Create and insert a new student into the database.
///
/// Surrounding whitespace is trimmed from `name`.
///
/// # Errors
///
/// This function will return a:
/// - [Error::EmptyName] if `name` is empty,
/// - [Error::DuplicateStudentName] if a student with the same name exists,
/// - or [Error::SqlError] if some other SQL error occurred.
pub fn create_student(
    name: &str,
    grade: Grade,
    password_hash: PasswordHash,
    connection: &Connection,
) -> Result<Student, Error> {
    let name = name.trim();

    if name.is_empty() {
        return Err(Error::EmptyName);
    }

    connection
        .prepare(
            "INSERT INTO student (name, grade, password) VALUES (?1, ?2, ?3)
             RETURNING id, name, grade, password, default_payroll",
        )?
        .query_row(
            (name, grade.as_ref(), password_hash.as_ref()),
            map_student_row,
        )
        .map_err(|error| {
            if is_unique_violation(&error) {
                Error::DuplicateStudentName(name.to_owned())
            } else {
                error.into()
            }
        })
}

/// Get the student with an ID equal to `student_id`.
///
/// # Errors
///
/// This function will return a [Error::NotFound] if `student_id` does not
/// belong to a registered student.
pub fn get_student(student_id: StudentId, connection: &Connection) -> Result<Student, Error> {
    connection
        .prepare(&format!("{SELECT_STUDENT} WHERE id = :id"))?
        .query_row(&[(":id", &student_id.as_i64())], map_student_row)
        .map_err(|error| error.into())
}

/// Find the student whose name is exactly `name`.
pub fn find_student_by_name(name: &str, connection: &Connection) -> Result<Option<Student>, Error> {
    let result = connection
        .prepare(&format!("{SELECT_STUDENT} WHERE name = :name"))?
        .query_row(&[(":name", &name)], map_student_row);

    match result {
        Ok(student) => Ok(Some(student)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

/// Get all students in the order they were registered.
pub fn list_students(connection: &Connection) -> Result<Vec<Student>, Error> {
    connection
        .prepare(&format!("{SELECT_STUDENT} ORDER BY id"))?
        .query_map([], map_student_row)?
        .map(|maybe_student| maybe_student.map_err(Error::from))
        .collect()
}

/// Get all students sorted by name, ignoring case.
pub fn list_students_by_name(connection: &Connection) -> Result<Vec<Student>, Error> {
    let mut students = list_students(connection)?;
    students.sort_by_cached_key(|student| student.name.to_lowercase());

    Ok(students)
}

/// Get the students whose names contain `query`.
///
/// An empty query matches every student.
pub fn search_students(query: &str, connection: &Connection) -> Result<Vec<Student>, Error> {
    connection
        .prepare(&format!(
            "{SELECT_STUDENT} WHERE name LIKE '%' || :query || '%' ORDER BY id"
        ))?
        .query_map(&[(":query", &query)], map_student_row)?
        .map(|maybe_student| maybe_student.map_err(Error::from))
        .collect()
}

/// Replace the password hash of a student.
///
/// # Errors
///
/// Returns [Error::NotFound] if `student_id` does not belong to a registered student.
pub fn update_student_password(
    student_id: StudentId,
    password_hash: &PasswordHash,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE student SET password = ?1 WHERE id = ?2",
        (password_hash.as_ref(), student_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Remember `amount` as the payroll amount suggested for the student next time.
///
/// # Errors
///
/// Returns [Error::NotFound] if `student_id` does not belong to a registered student.
pub fn set_default_payroll(
    student_id: StudentId,
    amount: u32,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE student SET default_payroll = ?1 WHERE id = ?2",
        (amount, student_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Delete a student and, through the foreign key cascade, all of their transactions.
///
/// # Errors
///
/// Returns [Error::DeleteMissingStudent] if `student_id` does not belong to a registered student.
pub fn delete_student(student_id: StudentId, connection: &Connection) -> Result<(), Error> {
    let rows_affected =
        connection.execute("DELETE FROM student WHERE id = ?1", (student_id.as_i64(),))?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingStudent);
    }

    tracing::info!("Deleted student {student_id}");

    Ok(())
}

/// Get the number of students in the database.
pub fn count_students(connection: &Connection) -> Result<usize, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM student;", [], |row| row.get(0))
        .map_err(|error| error.into())
}
