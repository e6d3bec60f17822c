use std::{error::Error, io, path::Path, process::ExitCode};

use clap::Parser;
use rusqlite::Connection;

use hawkeyes_bank::{
    PasswordHash, ValidatedPassword, initialize_db,
    student::{find_student_by_name, update_student_password},
};

/// Reset a student's password without logging in, for when no admin can.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// The name of the student whose password should be reset.
    #[arg(long, short)]
    student: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match reset_password(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("\x1b[31;1m{error}\x1b[0m");
            ExitCode::FAILURE
        }
    }
}

fn reset_password(args: &Args) -> Result<(), Box<dyn Error>> {
    let db_path = Path::new(&args.db_path);
    if !db_path.is_file() {
        return Err(format!("no database at {db_path:#?}").into());
    }

    let conn = Connection::open(db_path)?;
    initialize_db(&conn)?;

    let student = find_student_by_name(args.student.trim(), &conn)?
        .ok_or_else(|| format!("no student named {:?} in {db_path:#?}", args.student))?;
    println!("Resetting password for {} (grade {})", student.name, student.grade);

    let Some(password_hash) = read_new_password_hash()? else {
        println!("No password entered, nothing changed.");
        return Ok(());
    };

    update_student_password(student.id, &password_hash, &conn)?;
    println!("Password updated successfully!");

    Ok(())
}

/// Prompt until two matching, strong passwords are entered.
///
/// Returns `None` if stdin is closed.
fn read_new_password_hash() -> Result<Option<PasswordHash>, Box<dyn Error>> {
    loop {
        let Some(password) = prompt("Enter a new password: ")? else {
            return Ok(None);
        };

        let validated_password = match ValidatedPassword::new(&password) {
            Ok(validated_password) => validated_password,
            Err(error) => {
                eprintln!("{error}");
                continue;
            }
        };

        let Some(confirmation) = prompt("Enter the same password again: ")? else {
            return Ok(None);
        };

        if password != confirmation {
            eprintln!("Passwords must match, try again.");
            continue;
        }

        return Ok(Some(PasswordHash::new(
            validated_password,
            PasswordHash::DEFAULT_COST,
        )?));
    }
}

fn prompt(message: &str) -> io::Result<Option<String>> {
    match rpassword::prompt_password(message) {
        Ok(password) => Ok(Some(password)),
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(error) => Err(error),
    }
}
