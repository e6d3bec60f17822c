//! Coercion of spreadsheet cells into ledger values.

use calamine::Data;
use time::{
    Date, Duration,
    format_description::BorrowedFormatItem,
    macros::{date, format_description},
};

const ISO_DATE_FORMAT: &[BorrowedFormatItem] =
    format_description!("[year]-[month padding:none]-[day padding:none]");
const US_DATE_FORMAT: &[BorrowedFormatItem] =
    format_description!("[month padding:none]/[day padding:none]/[year]");

/// Read the date of a sheet row.
///
/// Accepts date cells and text in the forms `YYYY-MM-DD` and `MM/DD/YYYY`.
/// Returns `None` for empty cells, numbers, and text in any other form; such
/// rows are not imported.
pub fn parse_row_date(cell: Option<&Data>) -> Option<Date> {
    match cell? {
        Data::DateTime(date_time) => date_from_serial(date_time.as_f64()),
        Data::DateTimeIso(text) => Date::parse(text.get(..10)?, &ISO_DATE_FORMAT).ok(),
        Data::String(text) => parse_date_text(text),
        _ => None,
    }
}

/// Parse text in the form `YYYY-MM-DD` or `MM/DD/YYYY`.
///
/// Month and day may have one or two digits, the year must have four.
pub fn parse_date_text(text: &str) -> Option<Date> {
    let text = text.trim();

    Date::parse(text, &ISO_DATE_FORMAT)
        .or_else(|_| Date::parse(text, &US_DATE_FORMAT))
        .ok()
}

/// Convert a spreadsheet date serial number (1900 date system) to a date.
///
/// The time of day, if any, is dropped. Serial 60 is the nonexistent
/// 29 February 1900 and has no date.
fn date_from_serial(serial: f64) -> Option<Date> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }

    let days = serial.floor() as i64;
    let epoch = match days {
        1..=59 => date!(1899 - 12 - 31),
        60 => return None,
        _ => date!(1899 - 12 - 30),
    };

    epoch.checked_add(Duration::days(days))
}

/// Read a debit or credit cell as a whole number.
///
/// Empty cells are zero. Anything else is turned into text and cleaned with
/// [clean_amount_text].
pub fn clean_amount(cell: Option<&Data>) -> u32 {
    match cell {
        None | Some(Data::Empty) => 0,
        Some(cell) => clean_amount_text(&cell_text(cell)),
    }
}

/// Strip non-breaking spaces and thousands separators, then parse the digits.
///
/// Text that is not made only of digits (including negative and decimal
/// numbers) and numbers too large for the ledger are treated as zero.
pub fn clean_amount_text(text: &str) -> u32 {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|&c| c != '\u{a0}' && c != ',')
        .collect();

    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return 0;
    }

    cleaned.parse().unwrap_or(0)
}

/// The text form of a cell, with whole numbers written without a decimal point.
pub(super) fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.clone(),
        Data::Int(value) => value.to_string(),
        Data::Float(value) if value.fract() == 0.0 => format!("{value:.0}"),
        other => other.to_string(),
    }
}
