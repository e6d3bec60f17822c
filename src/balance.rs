//! Account balances derived from a student's transactions.

use rusqlite::Connection;

use crate::{
    Error, Session,
    student::{Student, StudentId, get_student},
    transaction::{Transaction, list_transactions},
};

/// The balance of a list of transactions: total credits minus total debits.
///
/// An empty list has a balance of zero.
pub fn calculate_balance(transactions: &[Transaction]) -> i64 {
    transactions.iter().map(Transaction::net_amount).sum()
}

/// The balance after each transaction, in the order given.
///
/// The last element (if any) equals [calculate_balance] of the whole list.
pub fn running_balances(transactions: &[Transaction]) -> Vec<i64> {
    transactions
        .iter()
        .scan(0_i64, |balance, transaction| {
            *balance += transaction.net_amount();
            Some(*balance)
        })
        .collect()
}

/// A student together with their transactions (oldest first) and balance.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentStatement {
    /// The account holder.
    pub student: Student,
    /// The student's transactions sorted by date, oldest first.
    pub transactions: Vec<Transaction>,
    /// Total credits minus total debits.
    pub balance: i64,
}

/// Get the statement for `student_id`.
///
/// Admins may view any student's statement, students only their own.
///
/// # Errors
///
/// This function will return a:
/// - [Error::Unauthorized] if the session may not view the statement,
/// - [Error::NotFound] if `student_id` does not belong to a registered student,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn student_statement(
    session: &Session,
    student_id: StudentId,
    connection: &Connection,
) -> Result<StudentStatement, Error> {
    session.require_student_or_admin(student_id)?;

    let student = get_student(student_id, connection)?;
    let transactions = list_transactions(Some(student_id), connection)?;
    let balance = calculate_balance(&transactions);

    Ok(StudentStatement {
        student,
        transactions,
        balance,
    })
}
