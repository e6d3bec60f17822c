use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;
use time::{Duration, macros::date};

use hawkeyes_bank::{
    PasswordHash, ValidatedPassword,
    admin::{PermissionLevel, create_admin},
    initialize_db,
    payroll::PAYROLL_DESCRIPTION,
    student::{Grade, create_student},
    transaction::{Transaction, create_transaction},
};

/// The students created for manual testing, as (name, grade) pairs.
const SAMPLE_STUDENTS: [(&str, &str); 6] = [
    ("Kiri Walker", "K"),
    ("Mele Tonga", "K"),
    ("Ava Chen", "1"),
    ("Noah Singh", "1"),
    ("Isla Brown", "2"),
    ("Leo Martin", "2"),
];

/// A utility for creating a test database for the Hawkeyes Bank tools.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,
}

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    println!("Creating test admin...");

    let admin_password = PasswordHash::new(
        ValidatedPassword::new_unchecked("test"),
        PasswordHash::DEFAULT_COST,
    )?;
    create_admin("admin", admin_password, PermissionLevel::Super, &conn)?;

    println!("Creating test students...");

    let student_password = PasswordHash::new(
        ValidatedPassword::new_unchecked("student"),
        PasswordHash::DEFAULT_COST,
    )?;
    let start_date = date!(2025 - 09 - 01);

    for (index, (name, grade)) in (0_u32..).zip(SAMPLE_STUDENTS) {
        let student = create_student(
            name,
            Grade::new(grade)?,
            student_password.clone(),
            &conn,
        )?;

        for week in 0..4 {
            let date = start_date + Duration::weeks(week);
            create_transaction(
                Transaction::build(student.id, date)
                    .description(PAYROLL_DESCRIPTION)
                    .credit(10 + index),
                &conn,
            )?;
            create_transaction(
                Transaction::build(student.id, date + Duration::days(2))
                    .description("Class store")
                    .debit(3 * (week as u32 + 1)),
                &conn,
            )?;
        }
    }

    println!("Success!");

    Ok(())
}
