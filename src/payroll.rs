//! Paying every student in one go.

use rusqlite::Connection;
use time::Date;

use crate::{
    Error, Session,
    student::{StudentId, list_students_by_name, set_default_payroll},
    transaction::{Transaction, create_transaction},
};

/// The description given to payroll credits.
pub const PAYROLL_DESCRIPTION: &str = "Payroll";

/// A row of the payroll form: who to pay and how much was paid last time.
#[derive(Debug, Clone, PartialEq)]
pub struct PayrollLine {
    /// The student to pay.
    pub student_id: StudentId,
    /// The student's name.
    pub name: String,
    /// The amount suggested for this run, zero if the student has never been paid.
    pub default_amount: u32,
}

/// List every student, sorted by name ignoring case, with their default pay.
///
/// # Errors
///
/// Returns [Error::Unauthorized] if the session is not an admin session.
pub fn payroll_sheet(session: &Session, connection: &Connection) -> Result<Vec<PayrollLine>, Error> {
    session.require_admin()?;

    let lines = list_students_by_name(connection)?
        .into_iter()
        .map(|student| PayrollLine {
            student_id: student.id,
            name: student.name,
            default_amount: student.default_payroll.unwrap_or(0),
        })
        .collect();

    Ok(lines)
}

/// Credit each student in `amounts` and remember the amount as their default.
///
/// Either every payment is recorded or none are. Returns the number of
/// payments made.
///
/// # Errors
///
/// This function will return a:
/// - [Error::Unauthorized] if the session is not an admin session,
/// - [Error::NotFound] if any student does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn run_payroll(
    session: &Session,
    date: Date,
    amounts: &[(StudentId, u32)],
    connection: &Connection,
) -> Result<usize, Error> {
    session.require_admin()?;

    let tx = connection.unchecked_transaction()?;

    for &(student_id, amount) in amounts {
        set_default_payroll(student_id, amount, &tx)?;
        create_transaction(
            Transaction::build(student_id, date)
                .description(PAYROLL_DESCRIPTION)
                .credit(amount),
            &tx,
        )?;
    }

    tx.commit()?;

    tracing::info!("Paid {} students on {date}", amounts.len());

    Ok(amounts.len())
}
