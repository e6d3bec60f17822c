//! Bulk export and import of the ledger as per-grade spreadsheets.
//!
//! An archive is a zip file with one `Grade_<label>.xlsx` workbook per grade.
//! Each workbook has one worksheet per student, named after the student, with
//! the columns:
//!
//! | DATE | DESCRIPTION | DEBIT (-) | CREDIT (+) | BALANCE: |
//!
//! Exported sheets are padded to [SHEET_DATA_ROWS] rows so that admins can add
//! transactions by hand before importing the archive again. Only workbooks
//! whose grade label is a number can be imported, see [grade_from_entry_name].

mod cells;
mod export;
mod import;

pub use cells::{clean_amount, clean_amount_text, parse_date_text, parse_row_date};
pub use export::{export_grades, export_grades_from_db, export_grades_to_path};
pub use import::{ImportSummary, import_grades, import_grades_from_path};

use crate::student::Grade;

/// The file name offered for an exported archive.
pub const EXPORT_FILE_NAME: &str = "Hawkeyes_By_Grade.zip";

/// The number of data rows (excluding the header) in every exported sheet.
pub const SHEET_DATA_ROWS: u32 = 500;

/// The longest worksheet name a workbook allows.
pub const MAX_SHEET_NAME_LENGTH: usize = 31;

/// The password given to students created by an import.
pub const DEFAULT_IMPORT_PASSWORD: &str = "Eaya2025";

/// The header row of every student sheet.
pub const HEADERS: [&str; 5] = ["DATE", "DESCRIPTION", "DEBIT (-)", "CREDIT (+)", "BALANCE:"];

const ENTRY_PREFIX: &str = "Grade_";
const WORKBOOK_EXTENSION: &str = ".xlsx";

/// The name of the archive entry holding the workbook for `grade`.
pub fn grade_entry_name(grade: &Grade) -> String {
    format!("{ENTRY_PREFIX}{grade}{WORKBOOK_EXTENSION}")
}

/// Extract the grade from an archive entry name such as `Grade_7.xlsx`.
///
/// The name must start with `Grade_` followed by at least one digit; the
/// grade is the run of digits. Entries for non-numeric grades such as
/// `Grade_K.xlsx` are not recognised.
pub fn grade_from_entry_name(entry_name: &str) -> Option<Grade> {
    let rest = entry_name.strip_prefix(ENTRY_PREFIX)?;
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());

    if digits_end == 0 {
        return None;
    }

    Some(Grade::new_unchecked(&rest[..digits_end]))
}

fn is_workbook_entry(entry_name: &str) -> bool {
    entry_name.to_lowercase().ends_with(WORKBOOK_EXTENSION)
}

/// Truncate a student name to a valid worksheet name length.
fn sheet_name(student_name: &str) -> String {
    student_name.chars().take(MAX_SHEET_NAME_LENGTH).collect()
}
