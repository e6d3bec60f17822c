//! Defines the core data model and database queries for ledger transactions.

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{Error, TransactionId, student::StudentId};

// ============================================================================
// MODELS
// ============================================================================

/// A debit from or credit to a student's account.
///
/// To create a new `Transaction`, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The student whose account the transaction belongs to.
    pub student_id: StudentId,
    /// When the transaction happened.
    pub date: Date,
    /// A text description of what the transaction was for. Empty if none was given.
    pub description: String,
    /// The amount taken out of the account.
    pub debit: u32,
    /// The amount paid into the account.
    pub credit: u32,
}

impl Transaction {
    /// Create a new transaction for `student_id` on `date`.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(student_id: StudentId, date: Date) -> TransactionBuilder {
        TransactionBuilder {
            student_id,
            date,
            description: String::new(),
            debit: 0,
            credit: 0,
        }
    }

    /// Start a builder holding this transaction's current values.
    pub fn to_builder(&self) -> TransactionBuilder {
        TransactionBuilder {
            student_id: self.student_id,
            date: self.date,
            description: self.description.clone(),
            debit: self.debit,
            credit: self.credit,
        }
    }

    /// The change this transaction makes to the account balance.
    pub fn net_amount(&self) -> i64 {
        i64::from(self.credit) - i64::from(self.debit)
    }
}

/// A builder for creating [Transaction] instances.
///
/// Debit and credit default to zero and the description defaults to empty.
///
/// # Examples
///
/// ```
/// use time::macros::date;
///
/// use hawkeyes_bank::{student::StudentId, transaction::Transaction};
///
/// let builder = Transaction::build(StudentId::new(1), date!(2025 - 01 - 15))
///     .description("Snack shop")
///     .debit(3);
///
/// assert_eq!(builder.credit, 0);
/// ```
#[derive(Debug, PartialEq, Clone)]
pub struct TransactionBuilder {
    /// The student whose account the transaction belongs to.
    pub student_id: StudentId,
    /// When the transaction happened.
    pub date: Date,
    /// What the transaction was for.
    pub description: String,
    /// The amount taken out of the account.
    pub debit: u32,
    /// The amount paid into the account.
    pub credit: u32,
}

impl TransactionBuilder {
    /// Set the description for the transaction.
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_owned();
        self
    }

    /// Set the debit for the transaction.
    pub fn debit(mut self, debit: u32) -> Self {
        self.debit = debit;
        self
    }

    /// Set the credit for the transaction.
    pub fn credit(mut self, credit: u32) -> Self {
        self.credit = credit;
        self
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

const SELECT_TRANSACTION: &str =
    "SELECT id, student_id, date, description, debit, credit FROM \"transaction\"";

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                debit INTEGER NOT NULL DEFAULT 0 CHECK (debit >= 0),
                credit INTEGER NOT NULL DEFAULT 0 CHECK (credit >= 0),
                FOREIGN KEY(student_id) REFERENCES student(id) ON UPDATE CASCADE ON DELETE CASCADE
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_student_date ON \"transaction\"(student_id, date);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: row.get(0)?,
        student_id: StudentId::new(row.get(1)?),
        date: row.get(2)?,
        description: row.get(3)?,
        debit: row.get(4)?,
        credit: row.get(5)?,
    })
}

/// Create a new transaction in the database from a builder.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidStudent] if the student ID does not refer to a registered student,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(
            "INSERT INTO \"transaction\" (student_id, date, description, debit, credit)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id, student_id, date, description, debit, credit",
        )?
        .query_row(
            (
                builder.student_id.as_i64(),
                builder.date,
                builder.description,
                builder.debit,
                builder.credit,
            ),
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Retrieve a transaction from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_transaction(id: TransactionId, connection: &Connection) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(&format!("{SELECT_TRANSACTION} WHERE id = :id"))?
        .query_row(&[(":id", &id)], map_transaction_row)?;

    Ok(transaction)
}

/// Get transactions sorted by date, oldest first.
///
/// Transactions on the same day keep the order they were inserted in.
/// If `student_id` is `None`, the transactions of every student are returned.
pub fn list_transactions(
    student_id: Option<StudentId>,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    match student_id {
        Some(student_id) => connection
            .prepare(&format!(
                "{SELECT_TRANSACTION} WHERE student_id = :student_id ORDER BY date, id"
            ))?
            .query_map(&[(":student_id", &student_id.as_i64())], map_transaction_row)?
            .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
            .collect(),
        None => connection
            .prepare(&format!("{SELECT_TRANSACTION} ORDER BY date, id"))?
            .query_map([], map_transaction_row)?
            .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
            .collect(),
    }
}

/// Get a student's transactions sorted by date, newest first.
pub fn list_transactions_newest_first(
    student_id: StudentId,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(&format!(
            "{SELECT_TRANSACTION} WHERE student_id = :student_id ORDER BY date DESC, id DESC"
        ))?
        .query_map(&[(":student_id", &student_id.as_i64())], map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
        .collect()
}

/// Overwrite the transaction `id` with the values in `builder`.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingTransaction] if `id` does not refer to a valid transaction,
/// - [Error::InvalidStudent] if the builder's student ID does not refer to a registered student,
/// - or [Error::SqlError] there is some other SQL error.
pub fn update_transaction(
    id: TransactionId,
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let result = connection
        .prepare(
            "UPDATE \"transaction\"
             SET student_id = ?1, date = ?2, description = ?3, debit = ?4, credit = ?5
             WHERE id = ?6
             RETURNING id, student_id, date, description, debit, credit",
        )?
        .query_row(
            (
                builder.student_id.as_i64(),
                builder.date,
                builder.description,
                builder.debit,
                builder.credit,
                id,
            ),
            map_transaction_row,
        );

    match result {
        Ok(transaction) => Ok(transaction),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::UpdateMissingTransaction),
        Err(error) => Err(error.into()),
    }
}

/// Delete a transaction, returning the ID of the student it belonged to.
///
/// # Errors
/// This function will return a:
/// - [Error::DeleteMissingTransaction] if `id` does not refer to a valid transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn delete_transaction(id: TransactionId, connection: &Connection) -> Result<StudentId, Error> {
    let result = connection
        .prepare("DELETE FROM \"transaction\" WHERE id = ?1 RETURNING student_id")?
        .query_row((id,), |row| row.get(0));

    match result {
        Ok(raw_student_id) => Ok(StudentId::new(raw_student_id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::DeleteMissingTransaction),
        Err(error) => Err(error.into()),
    }
}

/// Get the total number of transactions in the database.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
pub fn count_transactions(connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM \"transaction\";", [], |row| {
            row.get(0)
        })
        .map_err(|error| error.into())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        Error, PasswordHash,
        db::initialize,
        student::{Grade, Student, StudentId, create_student},
    };

    use super::{
        Transaction, count_transactions, create_transaction, delete_transaction, get_transaction,
        list_transactions, list_transactions_newest_first, update_transaction,
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn create_test_student(name: &str, conn: &Connection) -> Student {
        create_student(
            name,
            Grade::new("3").unwrap(),
            PasswordHash::new_unchecked("hunter2"),
            conn,
        )
        .unwrap()
    }

    #[test]
    fn create_succeeds() {
        let conn = get_test_connection();
        let student = create_test_student("Ada", &conn);

        let transaction = create_transaction(
            Transaction::build(student.id, date!(2025 - 10 - 05))
                .description("Lunch")
                .debit(4),
            &conn,
        )
        .unwrap();

        assert_eq!(transaction.student_id, student.id);
        assert_eq!(transaction.description, "Lunch");
        assert_eq!(transaction.debit, 4);
        assert_eq!(transaction.credit, 0);
        assert_eq!(get_transaction(transaction.id, &conn), Ok(transaction));
    }

    #[test]
    fn create_fails_on_invalid_student() {
        let conn = get_test_connection();

        let result = create_transaction(
            Transaction::build(StudentId::new(42), date!(2025 - 10 - 05)),
            &conn,
        );

        assert_eq!(result, Err(Error::InvalidStudent));
    }

    #[test]
    fn list_orders_by_date_then_insertion() {
        let conn = get_test_connection();
        let student = create_test_student("Ada", &conn);
        let other = create_test_student("Alan", &conn);
        for (student_id, date, description) in [
            (student.id, date!(2025 - 02 - 01), "second day, first"),
            (student.id, date!(2025 - 01 - 01), "first day"),
            (other.id, date!(2025 - 01 - 15), "other student"),
            (student.id, date!(2025 - 02 - 01), "second day, second"),
        ] {
            create_transaction(
                Transaction::build(student_id, date).description(description),
                &conn,
            )
            .unwrap();
        }

        let descriptions: Vec<String> = list_transactions(Some(student.id), &conn)
            .unwrap()
            .into_iter()
            .map(|transaction| transaction.description)
            .collect();
        assert_eq!(
            descriptions,
            vec!["first day", "second day, first", "second day, second"]
        );

        let newest_first: Vec<String> = list_transactions_newest_first(student.id, &conn)
            .unwrap()
            .into_iter()
            .map(|transaction| transaction.description)
            .collect();
        assert_eq!(
            newest_first,
            vec!["second day, second", "second day, first", "first day"]
        );

        assert_eq!(list_transactions(None, &conn).unwrap().len(), 4);
    }

    #[test]
    fn update_overwrites_fields() {
        let conn = get_test_connection();
        let student = create_test_student("Ada", &conn);
        let transaction =
            create_transaction(Transaction::build(student.id, date!(2025 - 01 - 01)), &conn)
                .unwrap();

        let updated = update_transaction(
            transaction.id,
            Transaction::build(student.id, date!(2025 - 01 - 02))
                .description("Fixed")
                .credit(10),
            &conn,
        )
        .unwrap();

        assert_eq!(updated.id, transaction.id);
        assert_eq!(updated.date, date!(2025 - 01 - 02));
        assert_eq!(updated.description, "Fixed");
        assert_eq!(updated.credit, 10);
    }

    #[test]
    fn update_fails_on_missing_transaction() {
        let conn = get_test_connection();
        let student = create_test_student("Ada", &conn);

        let result = update_transaction(
            99,
            Transaction::build(student.id, date!(2025 - 01 - 02)),
            &conn,
        );

        assert_eq!(result, Err(Error::UpdateMissingTransaction));
    }

    #[test]
    fn delete_returns_owner() {
        let conn = get_test_connection();
        let student = create_test_student("Ada", &conn);
        let transaction =
            create_transaction(Transaction::build(student.id, date!(2025 - 01 - 01)), &conn)
                .unwrap();

        assert_eq!(delete_transaction(transaction.id, &conn), Ok(student.id));
        assert_eq!(
            delete_transaction(transaction.id, &conn),
            Err(Error::DeleteMissingTransaction)
        );
        assert_eq!(count_transactions(&conn), Ok(0));
    }

    #[test]
    fn net_amount_is_credit_minus_debit() {
        let transaction = Transaction {
            id: 1,
            student_id: StudentId::new(1),
            date: date!(2025 - 01 - 01),
            description: String::new(),
            debit: 7,
            credit: 3,
        };

        assert_eq!(transaction.net_amount(), -4);
    }
}
