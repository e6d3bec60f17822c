//! Restores transactions from a zip archive of per-grade workbooks.

use std::{
    io::{Cursor, Read},
    path::Path,
    time::Instant,
};

use calamine::{Data, Range, Reader, Xlsx, open_workbook_from_rs};
use rusqlite::Connection;
use zip::ZipArchive;

use crate::{
    Error, PasswordHash, Session, ValidatedPassword,
    grade_archive::{
        DEFAULT_IMPORT_PASSWORD, clean_amount, grade_from_entry_name, is_workbook_entry,
        parse_row_date,
    },
    student::{StudentId, create_student, find_student_by_name},
    transaction::{Transaction, create_transaction},
};

use super::cells::cell_text;

const DATE_COLUMN: u32 = 0;
const DESCRIPTION_COLUMN: u32 = 1;
const DEBIT_COLUMN: u32 = 2;
const CREDIT_COLUMN: u32 = 3;

/// What an import added to the ledger.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    /// The number of grade workbooks that were read.
    pub workbooks: usize,
    /// The number of students created for sheets that matched no existing student.
    pub students_created: usize,
    /// The number of transactions inserted.
    pub transactions_imported: usize,
    /// The number of rows with a date that could not be read.
    ///
    /// Rows with an empty date are not counted.
    pub rows_skipped: usize,
}

/// Read the archive at `path` and import it with [import_grades].
pub fn import_grades_from_path(
    session: &Session,
    path: &Path,
    cost: u32,
    connection: &Connection,
) -> Result<ImportSummary, Error> {
    let archive = std::fs::read(path)?;

    import_grades(session, &archive, cost, connection)
}

/// Import every numeric grade workbook in `archive`.
///
/// Each worksheet is matched to the student with the same name, ignoring
/// leading and trailing whitespace. If no
/// such student exists, one is created in the workbook's grade with the
/// password [DEFAULT_IMPORT_PASSWORD], hashed with `cost`. Every row with a
/// readable date becomes a transaction of that student, in row order.
///
/// Entries that are not `.xlsx` workbooks, or whose grade is not a number, are
/// skipped.
///
/// Either the whole archive is imported or nothing is.
///
/// # Errors
///
/// This function will return a:
/// - [Error::Unauthorized] if the session is not an admin session,
/// - [Error::Archive] if the zip file cannot be read,
/// - [Error::Workbook] if a grade workbook cannot be read,
/// - or [Error::SqlError] if the ledger could not be updated.
pub fn import_grades(
    session: &Session,
    archive: &[u8],
    cost: u32,
    connection: &Connection,
) -> Result<ImportSummary, Error> {
    session.require_admin()?;

    let start_time = Instant::now();
    let mut zip =
        ZipArchive::new(Cursor::new(archive)).map_err(|error| Error::Archive(error.to_string()))?;

    let tx = connection.unchecked_transaction()?;
    let mut summary = ImportSummary::default();
    let mut default_password: Option<PasswordHash> = None;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|error| Error::Archive(error.to_string()))?;
        let entry_name = entry.name().to_owned();

        if entry.is_dir() || !is_workbook_entry(&entry_name) {
            continue;
        }

        let Some(grade) = grade_from_entry_name(&entry_name) else {
            tracing::debug!("Skipping {entry_name}: no numeric grade in the file name");
            continue;
        };

        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|error| Error::Archive(format!("{entry_name}: {error}")))?;

        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
            .map_err(|error| Error::Workbook(format!("{entry_name}: {error}")))?;
        summary.workbooks += 1;

        for sheet_name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&sheet_name)
                .map_err(|error| Error::Workbook(format!("{entry_name}/{sheet_name}: {error}")))?;

            // Truncated names can end in a space, and students are stored trimmed.
            let student_name = sheet_name.trim();
            if student_name.is_empty() {
                tracing::debug!("Skipping {entry_name}/{sheet_name:?}: blank sheet name");
                continue;
            }

            let student_id = match find_student_by_name(student_name, &tx)? {
                Some(student) => student.id,
                None => {
                    let password_hash = match &default_password {
                        Some(hash) => hash.clone(),
                        None => {
                            let hash = PasswordHash::new(
                                ValidatedPassword::new_unchecked(DEFAULT_IMPORT_PASSWORD),
                                cost,
                            )?;
                            default_password = Some(hash.clone());
                            hash
                        }
                    };

                    let student = create_student(student_name, grade.clone(), password_hash, &tx)?;
                    summary.students_created += 1;
                    tracing::info!("Created student {} in grade {grade}", student.name);

                    student.id
                }
            };

            import_sheet(student_id, &range, &tx, &mut summary)?;
        }
    }

    tx.commit()?;

    tracing::info!(
        "Imported {} transactions from {} workbooks in {}ms ({} students created, {} rows skipped)",
        summary.transactions_imported,
        summary.workbooks,
        start_time.elapsed().as_millis(),
        summary.students_created,
        summary.rows_skipped
    );

    Ok(summary)
}

fn import_sheet(
    student_id: StudentId,
    range: &Range<Data>,
    connection: &Connection,
    summary: &mut ImportSummary,
) -> Result<(), Error> {
    let Some((last_row, _)) = range.end() else {
        return Ok(());
    };

    // Row 0 is the header.
    for row in 1..=last_row {
        let date_cell = range.get_value((row, DATE_COLUMN));

        let Some(date) = parse_row_date(date_cell) else {
            if !is_blank(date_cell) {
                tracing::debug!("Skipping row {} of student {student_id}: unreadable date", row + 1);
                summary.rows_skipped += 1;
            }
            continue;
        };

        let description = range
            .get_value((row, DESCRIPTION_COLUMN))
            .map(cell_text)
            .unwrap_or_default();

        create_transaction(
            Transaction::build(student_id, date)
                .description(&description)
                .debit(clean_amount(range.get_value((row, DEBIT_COLUMN))))
                .credit(clean_amount(range.get_value((row, CREDIT_COLUMN)))),
            connection,
        )?;
        summary.transactions_imported += 1;
    }

    Ok(())
}

fn is_blank(cell: Option<&Data>) -> bool {
    match cell {
        None | Some(Data::Empty) => true,
        Some(Data::String(text)) => text.trim().is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use rusqlite::Connection;
    use rust_xlsxwriter::{Workbook, Worksheet};
    use time::{Date, Duration, macros::date};
    use zip::{ZipWriter, write::FileOptions};

    use crate::{
        Error, PasswordHash, Session,
        admin::PermissionLevel,
        db::initialize,
        grade_archive::{
            DEFAULT_IMPORT_PASSWORD, EXPORT_FILE_NAME, export_grades_from_db, export_grades_to_path,
        },
        log_in,
        student::{Grade, StudentId, count_students, create_student, find_student_by_name},
        transaction::{Transaction, count_transactions, create_transaction, list_transactions},
    };

    use super::{ImportSummary, import_grades, import_grades_from_path};

    const ADMIN: Session = Session::Admin(PermissionLevel::Staff);
    const TEST_COST: u32 = 4;

    fn get_db_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn create_test_student(name: &str, grade: &str, conn: &Connection) -> StudentId {
        create_student(
            name,
            Grade::new(grade).unwrap(),
            PasswordHash::new_unchecked("hunter2"),
            conn,
        )
        .unwrap()
        .id
    }

    /// Zip up `(entry name, bytes)` pairs in order.
    fn zip_entries(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        for (name, bytes) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(bytes).unwrap();
        }

        zip.finish().unwrap().into_inner()
    }

    /// Build a workbook with one sheet per `(name, rows)`, each row being
    /// `[date, description, debit, credit]` written as text.
    fn text_workbook(sheets: &[(&str, &[[&str; 4]])]) -> Vec<u8> {
        let mut workbook = Workbook::new();

        for (name, rows) in sheets {
            let mut worksheet = Worksheet::new();
            worksheet.set_name(*name).unwrap();
            worksheet.write_string(0, 0, "DATE").unwrap();

            for (row, cells) in (1_u32..).zip(rows.iter()) {
                for (column, value) in (0_u16..).zip(cells) {
                    if !value.is_empty() {
                        worksheet.write_string(row, column, *value).unwrap();
                    }
                }
            }

            workbook.push_worksheet(worksheet);
        }

        workbook.save_to_buffer().unwrap()
    }

    fn student_grade(name: &str, conn: &Connection) -> Option<Grade> {
        find_student_by_name(name, conn)
            .unwrap()
            .map(|student| student.grade)
    }

    fn ledger_rows(student_id: StudentId, conn: &Connection) -> Vec<(Date, String, u32, u32)> {
        list_transactions(Some(student_id), conn)
            .unwrap()
            .into_iter()
            .map(|t| (t.date, t.description, t.debit, t.credit))
            .collect()
    }

    fn round_trip(transaction_count: i64) {
        let source = get_db_connection();
        let student_id = create_test_student("Ada Lovelace", "7", &source);
        let start = date!(2024 - 01 - 01);
        for i in 0..transaction_count {
            let description = if i % 5 == 0 {
                String::new()
            } else {
                format!("item {i}")
            };
            create_transaction(
                Transaction::build(student_id, start + Duration::days(i / 2))
                    .description(&description)
                    .debit((i % 7) as u32 * 10)
                    .credit((i % 11) as u32 * 25),
                &source,
            )
            .unwrap();
        }
        let archive = export_grades_from_db(&ADMIN, &source).unwrap();

        let target = get_db_connection();
        let summary = import_grades(&ADMIN, &archive, TEST_COST, &target).unwrap();

        let imported = find_student_by_name("Ada Lovelace", &target)
            .unwrap()
            .unwrap();
        assert_eq!(summary.transactions_imported, transaction_count as usize);
        assert_eq!(summary.rows_skipped, 0);
        assert_eq!(imported.grade, Grade::new("7").unwrap());
        assert_eq!(
            ledger_rows(imported.id, &target),
            ledger_rows(student_id, &source)
        );
    }

    #[test]
    fn round_trip_without_transactions() {
        round_trip(0);
    }

    #[test]
    fn round_trip_with_a_few_transactions() {
        round_trip(3);
    }

    #[test]
    fn round_trip_with_full_sheet() {
        round_trip(500);
    }

    #[test]
    fn unknown_sheet_creates_one_student_with_default_password() {
        let conn = get_db_connection();
        let archive = zip_entries(&[(
            "Grade_3.xlsx",
            text_workbook(&[(
                "Grace Hopper",
                &[
                    ["2025-01-02", "Allowance", "", "20"],
                    ["01/05/2025", "Snack", "5", ""],
                ],
            )]),
        )]);

        let summary = import_grades(&ADMIN, &archive, TEST_COST, &conn).unwrap();

        assert_eq!(
            summary,
            ImportSummary {
                workbooks: 1,
                students_created: 1,
                transactions_imported: 2,
                rows_skipped: 0,
            }
        );
        assert_eq!(count_students(&conn), Ok(1));
        assert_eq!(
            student_grade("Grace Hopper", &conn),
            Some(Grade::new("3").unwrap())
        );
        let student = find_student_by_name("Grace Hopper", &conn).unwrap().unwrap();
        assert_eq!(
            ledger_rows(student.id, &conn),
            vec![
                (date!(2025 - 01 - 02), "Allowance".to_owned(), 0, 20),
                (date!(2025 - 01 - 05), "Snack".to_owned(), 5, 0),
            ]
        );
        assert_eq!(
            log_in("Grace Hopper", DEFAULT_IMPORT_PASSWORD, &conn),
            Ok(Session::Student(student.id))
        );
    }

    #[test]
    fn existing_student_is_matched_by_name() {
        let conn = get_db_connection();
        let student_id = create_test_student("Grace Hopper", "5", &conn);
        let archive = zip_entries(&[(
            "Grade_3.xlsx",
            text_workbook(&[("Grace Hopper", &[["2025-01-02", "Allowance", "", "20"]])]),
        )]);

        let summary = import_grades(&ADMIN, &archive, TEST_COST, &conn).unwrap();

        assert_eq!(summary.students_created, 0);
        assert_eq!(count_students(&conn), Ok(1));
        assert_eq!(
            student_grade("Grace Hopper", &conn),
            Some(Grade::new("5").unwrap())
        );
        assert_eq!(ledger_rows(student_id, &conn).len(), 1);
    }

    #[test]
    fn sheet_names_with_surrounding_spaces_match_existing_student() {
        let conn = get_db_connection();
        let student_id = create_test_student("Ada", "3", &conn);
        let archive = zip_entries(&[(
            "Grade_3.xlsx",
            text_workbook(&[("Ada ", &[["2025-01-02", "Allowance", "", "20"]])]),
        )]);

        let summary = import_grades(&ADMIN, &archive, TEST_COST, &conn).unwrap();

        assert_eq!(summary.students_created, 0);
        assert_eq!(count_students(&conn), Ok(1));
        assert_eq!(
            ledger_rows(student_id, &conn),
            vec![(date!(2025 - 01 - 02), "Allowance".to_owned(), 0, 20)]
        );
    }

    #[test]
    fn name_truncated_at_a_space_can_be_imported_twice() {
        let source = get_db_connection();
        let long_name = format!("{} Smith", "A".repeat(30));
        let student_id = create_test_student(&long_name, "4", &source);
        create_transaction(
            Transaction::build(student_id, date!(2025 - 02 - 03)).credit(10),
            &source,
        )
        .unwrap();
        let archive = export_grades_from_db(&ADMIN, &source).unwrap();
        let target = get_db_connection();

        let first = import_grades(&ADMIN, &archive, TEST_COST, &target).unwrap();
        let second = import_grades(&ADMIN, &archive, TEST_COST, &target).unwrap();

        assert_eq!(first.students_created, 1);
        assert_eq!(second.students_created, 0);
        assert_eq!(count_students(&target), Ok(1));
        let imported = find_student_by_name(&"A".repeat(30), &target)
            .unwrap()
            .unwrap();
        assert_eq!(ledger_rows(imported.id, &target).len(), 2);
    }

    #[test]
    fn rows_without_a_readable_date_are_skipped() {
        let conn = get_db_connection();
        let archive = zip_entries(&[(
            "Grade_3.xlsx",
            text_workbook(&[(
                "Grace Hopper",
                &[
                    ["", "no date", "1", "1"],
                    ["13/45/2024", "bad date", "1", "1"],
                    ["March 7, 2024", "worded date", "1", "1"],
                    ["2024-03-07", "kept", "1,200", "abc"],
                ],
            )]),
        )]);

        let summary = import_grades(&ADMIN, &archive, TEST_COST, &conn).unwrap();

        assert_eq!(summary.transactions_imported, 1);
        assert_eq!(summary.rows_skipped, 2);
        let student = find_student_by_name("Grace Hopper", &conn).unwrap().unwrap();
        assert_eq!(
            ledger_rows(student.id, &conn),
            vec![(date!(2024 - 03 - 07), "kept".to_owned(), 1200, 0)]
        );
    }

    #[test]
    fn non_numeric_grades_are_not_imported() {
        let source = get_db_connection();
        let student_id = create_test_student("Kim", "K", &source);
        create_transaction(
            Transaction::build(student_id, date!(2025 - 02 - 03)).credit(10),
            &source,
        )
        .unwrap();
        let archive = export_grades_from_db(&ADMIN, &source).unwrap();

        let target = get_db_connection();
        let summary = import_grades(&ADMIN, &archive, TEST_COST, &target).unwrap();

        assert_eq!(summary, ImportSummary::default());
        assert_eq!(count_transactions(&target), Ok(0));
        assert_eq!(count_students(&target), Ok(0));
    }

    #[test]
    fn other_entries_are_ignored() {
        let conn = get_db_connection();
        let archive = zip_entries(&[
            ("notes.txt", b"not a workbook".to_vec()),
            ("Grade_1.csv", b"DATE,DESCRIPTION".to_vec()),
        ]);

        let summary = import_grades(&ADMIN, &archive, TEST_COST, &conn).unwrap();

        assert_eq!(summary, ImportSummary::default());
    }

    #[test]
    fn broken_workbook_rolls_back_whole_import() {
        let conn = get_db_connection();
        let archive = zip_entries(&[
            (
                "Grade_1.xlsx",
                text_workbook(&[("Grace Hopper", &[["2025-01-02", "Allowance", "", "20"]])]),
            ),
            ("Grade_2.xlsx", b"this is not a spreadsheet".to_vec()),
        ]);

        let result = import_grades(&ADMIN, &archive, TEST_COST, &conn);

        assert!(matches!(result, Err(Error::Workbook(_))));
        assert_eq!(count_students(&conn), Ok(0));
        assert_eq!(count_transactions(&conn), Ok(0));
    }

    #[test]
    fn corrupt_archive_is_rejected() {
        let conn = get_db_connection();

        let result = import_grades(&ADMIN, b"definitely not a zip file", TEST_COST, &conn);

        assert!(matches!(result, Err(Error::Archive(_))));
    }

    #[test]
    fn archive_round_trips_through_a_file() {
        let source = get_db_connection();
        let student_id = create_test_student("Ada Lovelace", "7", &source);
        create_transaction(
            Transaction::build(student_id, date!(2025 - 02 - 03))
                .description("Allowance")
                .credit(15),
            &source,
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EXPORT_FILE_NAME);

        export_grades_to_path(&ADMIN, &path, &source).unwrap();
        let target = get_db_connection();
        let summary = import_grades_from_path(&ADMIN, &path, TEST_COST, &target).unwrap();

        assert_eq!(summary.transactions_imported, 1);
        let imported = find_student_by_name("Ada Lovelace", &target).unwrap().unwrap();
        assert_eq!(
            ledger_rows(imported.id, &target),
            vec![(date!(2025 - 02 - 03), "Allowance".to_owned(), 0, 15)]
        );
    }

    #[test]
    fn failed_export_writes_no_file() {
        let conn = get_db_connection();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EXPORT_FILE_NAME);

        let result = export_grades_to_path(&Session::Student(StudentId::new(1)), &path, &conn);

        assert_eq!(result, Err(Error::Unauthorized));
        assert!(!path.exists());
    }

    #[test]
    fn students_cannot_import() {
        let conn = get_db_connection();
        let archive = zip_entries(&[]);

        let result = import_grades(&Session::Student(StudentId::new(1)), &archive, TEST_COST, &conn);

        assert_eq!(result, Err(Error::Unauthorized));
    }
}
