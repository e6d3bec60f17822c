//! Packs the ledger into a zip archive of per-grade workbooks.

use std::{
    collections::BTreeMap,
    io::{Cursor, Write},
    path::Path,
    time::Instant,
};

use rusqlite::Connection;
use rust_xlsxwriter::{
    Color, ExcelDateTime, Format, FormatAlign, FormatBorder, Formula, Workbook, Worksheet,
    XlsxError,
};
use zip::{CompressionMethod, ZipWriter, write::FileOptions};

use crate::{
    Error, Session,
    balance::running_balances,
    grade_archive::{HEADERS, SHEET_DATA_ROWS, grade_entry_name, sheet_name},
    student::{Grade, Student, StudentId, list_students},
    transaction::{Transaction, list_transactions},
};

const DEBIT_COLOR: u32 = 0xFF7C80;
const CREDIT_COLOR: u32 = 0xA9D08E;

const DATE_COLUMN: u16 = 0;
const DESCRIPTION_COLUMN: u16 = 1;
const DEBIT_COLUMN: u16 = 2;
const CREDIT_COLUMN: u16 = 3;
const BALANCE_COLUMN: u16 = 4;
const TOTAL_COLUMN: u16 = 5;

/// Build the export archive from every student and transaction in the store.
///
/// # Errors
///
/// Returns [Error::Unauthorized] if the session is not an admin session, or
/// any error from [export_grades].
pub fn export_grades_from_db(session: &Session, connection: &Connection) -> Result<Vec<u8>, Error> {
    session.require_admin()?;

    let students = list_students(connection)?;
    let transactions = list_transactions(None, connection)?;

    export_grades(&students, &transactions)
}

/// Write the export archive to `path`.
///
/// The file is only created once the whole archive has been built.
pub fn export_grades_to_path(
    session: &Session,
    path: &Path,
    connection: &Connection,
) -> Result<(), Error> {
    let archive = export_grades_from_db(session, connection)?;
    std::fs::write(path, archive)?;

    tracing::info!("Wrote grade archive to {}", path.display());

    Ok(())
}

/// Pack students and their transactions into a zip archive of per-grade workbooks.
///
/// Grades are written in string order. Each student's transactions are
/// written oldest first; transactions on the same day keep the order they are
/// given in.
///
/// # Errors
///
/// Returns an [Error::Spreadsheet] if a workbook cannot be built (for example
/// when two students in a grade share the same first 31 characters of their
/// name) or an [Error::Archive] if the zip file cannot be written. Nothing is
/// returned unless every workbook was written.
pub fn export_grades(students: &[Student], transactions: &[Transaction]) -> Result<Vec<u8>, Error> {
    let start_time = Instant::now();

    let mut grades: BTreeMap<&Grade, Vec<&Student>> = BTreeMap::new();
    for student in students {
        grades.entry(&student.grade).or_default().push(student);
    }

    let mut ledgers: BTreeMap<StudentId, Vec<Transaction>> = BTreeMap::new();
    for transaction in transactions {
        ledgers
            .entry(transaction.student_id)
            .or_default()
            .push(transaction.clone());
    }
    for ledger in ledgers.values_mut() {
        ledger.sort_by_key(|transaction| transaction.date);
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (grade, grade_students) in &grades {
        let workbook = build_grade_workbook(grade_students, &ledgers)
            .map_err(|error| Error::Spreadsheet(format!("grade {grade}: {error}")))?;

        zip.start_file(grade_entry_name(grade), options)
            .map_err(|error| Error::Archive(error.to_string()))?;
        zip.write_all(&workbook)
            .map_err(|error| Error::Archive(error.to_string()))?;

        tracing::debug!(
            "Packed {} students into the workbook for grade {grade}",
            grade_students.len()
        );
    }

    let archive = zip
        .finish()
        .map_err(|error| Error::Archive(error.to_string()))?
        .into_inner();

    tracing::info!(
        "Exported {} students in {} grades in {}ms",
        students.len(),
        grades.len(),
        start_time.elapsed().as_millis()
    );

    Ok(archive)
}

struct SheetFormats {
    header: Format,
    debit_header: Format,
    credit_header: Format,
    total: Format,
    date: Format,
    debit: Format,
    credit: Format,
}

impl SheetFormats {
    fn new() -> Self {
        let header = Format::new()
            .set_bold()
            .set_border_bottom(FormatBorder::Medium)
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter);

        Self {
            debit_header: header
                .clone()
                .set_background_color(Color::RGB(DEBIT_COLOR))
                .set_font_color(Color::Black),
            credit_header: header
                .clone()
                .set_background_color(Color::RGB(CREDIT_COLOR))
                .set_font_color(Color::Black),
            total: header.clone().set_border_right(FormatBorder::Medium),
            header,
            date: Format::new().set_num_format("yyyy/mm/dd"),
            debit: Format::new()
                .set_background_color(Color::RGB(DEBIT_COLOR))
                .set_font_color(Color::Black)
                .set_border_top(FormatBorder::Thin)
                .set_border_bottom(FormatBorder::Thin),
            credit: Format::new()
                .set_background_color(Color::RGB(CREDIT_COLOR))
                .set_font_color(Color::Black)
                .set_border_top(FormatBorder::Thin)
                .set_border_bottom(FormatBorder::Thin),
        }
    }
}

fn build_grade_workbook(
    students: &[&Student],
    ledgers: &BTreeMap<StudentId, Vec<Transaction>>,
) -> Result<Vec<u8>, XlsxError> {
    let formats = SheetFormats::new();
    let mut workbook = Workbook::new();

    for student in students {
        let transactions = ledgers
            .get(&student.id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let worksheet = build_student_sheet(student, transactions, &formats)?;
        workbook.push_worksheet(worksheet);
    }

    workbook.save_to_buffer()
}

fn build_student_sheet(
    student: &Student,
    transactions: &[Transaction],
    formats: &SheetFormats,
) -> Result<Worksheet, XlsxError> {
    let mut worksheet = Worksheet::new();
    worksheet.set_name(sheet_name(&student.name))?;

    for (column, header) in (0_u16..).zip(HEADERS) {
        let format = match column {
            DEBIT_COLUMN => &formats.debit_header,
            CREDIT_COLUMN => &formats.credit_header,
            _ => &formats.header,
        };
        worksheet.write_string_with_format(0, column, header, format)?;
    }

    worksheet.set_column_width(DATE_COLUMN, 12)?;
    worksheet.set_column_format(DATE_COLUMN, &formats.date)?;
    worksheet.set_column_width(DESCRIPTION_COLUMN, 30)?;
    worksheet.set_column_width(DEBIT_COLUMN, 12)?;
    worksheet.set_column_format(DEBIT_COLUMN, &formats.debit)?;
    worksheet.set_column_width(CREDIT_COLUMN, 12)?;
    worksheet.set_column_format(CREDIT_COLUMN, &formats.credit)?;
    worksheet.set_column_width(BALANCE_COLUMN, 12)?;

    let balances = running_balances(transactions);

    for (row, transaction) in (1_u32..).zip(transactions) {
        let date = transaction.date;
        let excel_date = ExcelDateTime::from_ymd(
            u16::try_from(date.year()).map_err(|_| {
                XlsxError::ParameterError(format!("{date} is outside the spreadsheet date range"))
            })?,
            u8::from(date.month()),
            date.day(),
        )?;

        worksheet.write_datetime_with_format(row, DATE_COLUMN, &excel_date, &formats.date)?;
        if !transaction.description.is_empty() {
            worksheet.write_string(row, DESCRIPTION_COLUMN, &transaction.description)?;
        }
        worksheet.write_number_with_format(
            row,
            DEBIT_COLUMN,
            f64::from(transaction.debit),
            &formats.debit,
        )?;
        worksheet.write_number_with_format(
            row,
            CREDIT_COLUMN,
            f64::from(transaction.credit),
            &formats.credit,
        )?;
    }

    let data_rows = data_row_count(transactions.len())?;
    let final_balance = balances.last().copied().unwrap_or(0);

    for row in 1..=data_rows {
        let balance = balances
            .get(row as usize - 1)
            .copied()
            .unwrap_or(final_balance);
        let formula = Formula::new(balance_formula(row)).set_result(balance.to_string());
        worksheet.write_formula(row, BALANCE_COLUMN, formula)?;
    }

    let total = Formula::new(format!("=E{}", data_rows + 1)).set_result(final_balance.to_string());
    worksheet.write_formula_with_format(0, TOTAL_COLUMN, total, &formats.total)?;

    Ok(worksheet)
}

/// The number of data rows in a sheet: the padding, or more if needed.
fn data_row_count(transaction_count: usize) -> Result<u32, XlsxError> {
    let transaction_count = u32::try_from(transaction_count).map_err(|_| {
        XlsxError::ParameterError(format!(
            "{transaction_count} transactions do not fit in one worksheet"
        ))
    })?;

    Ok(SHEET_DATA_ROWS.max(transaction_count))
}

/// The running balance formula for the zero-based worksheet `row` (row 0 is the header).
///
/// The first data row is its own credit minus debit, every later row adds its
/// credit minus debit to the balance of the row above.
fn balance_formula(row: u32) -> String {
    let excel_row = row + 1;

    if row == 1 {
        format!("=D{excel_row}-C{excel_row}")
    } else {
        format!("=E{}+D{excel_row}-C{excel_row}", excel_row - 1)
    }
}
