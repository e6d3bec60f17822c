use std::{
    env,
    error::Error as StdError,
    io::{self, BufRead, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use rusqlite::Connection;
use time::Date;

use hawkeyes_bank::{
    Error, PasswordHash, Session, TransactionId, ValidatedPassword,
    admin::{PermissionLevel, create_admin, find_admin_by_name, list_admins},
    balance::{calculate_balance, running_balances, student_statement},
    grade_archive::{
        EXPORT_FILE_NAME, export_grades_to_path, import_grades_from_path, parse_date_text,
    },
    initialize_db, log_in,
    logging::setup_logging,
    payroll::{payroll_sheet, run_payroll},
    session::{
        admin_accounts, change_password, edit_transaction, register_admin, register_student,
        remove_admin, remove_student, reset_student_password,
    },
    student::{Grade, Student, StudentId, find_student_by_name, list_students, search_students},
    transaction::{
        Transaction, create_transaction, delete_transaction, get_transaction, list_transactions,
    },
};

/// The environment variable read for the operator's password before prompting.
const PASSWORD_VARIABLE: &str = "HAWKEYES_PASSWORD";

/// Manage the Hawkeyes Bank ledger.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: PathBuf,

    /// The student or admin name to log in with.
    #[arg(long, short)]
    user: Option<String>,

    /// Show debug log messages.
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database tables and, if there are no admins yet, a super admin.
    Init {
        /// The name of the first super admin.
        #[arg(long)]
        admin: Option<String>,
    },
    /// Export every student's transactions as a zip of per-grade workbooks.
    Export {
        /// Where to write the archive. Directories get the default file name.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Import transactions from a zip of per-grade workbooks.
    Import {
        /// The archive to import.
        #[arg(long, short)]
        input: PathBuf,
    },
    /// List students and their balances.
    Students {
        /// Only show students whose name contains this text.
        #[arg(long, short)]
        search: Option<String>,
    },
    /// Show a student's transactions, newest first.
    Statement {
        /// The student's name. Defaults to the logged-in student.
        #[arg(long, short)]
        student: Option<String>,
    },
    /// Register a new student. Their password is read from the terminal.
    AddStudent {
        #[arg(long, short)]
        name: String,
        #[arg(long, short)]
        grade: String,
    },
    /// Delete a student and all of their transactions.
    DeleteStudent {
        #[arg(long, short)]
        student: String,
    },
    /// Set a new password for a student. The password is read from the terminal.
    ResetStudentPassword {
        #[arg(long, short)]
        student: String,
    },
    /// List admin accounts.
    Admins,
    /// Delete an admin account.
    DeleteAdmin {
        #[arg(long, short)]
        name: String,
    },
    /// Register a new admin. Their password is read from the terminal.
    AddAdmin {
        #[arg(long, short)]
        name: String,
        /// Allow the new admin to manage other admins.
        #[arg(long = "super")]
        super_admin: bool,
    },
    /// Record a debit and/or credit for a student.
    AddTransaction {
        #[arg(long, short)]
        student: String,
        /// YYYY-MM-DD or MM/DD/YYYY.
        #[arg(long, short, value_parser = parse_date_arg)]
        date: Date,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value_t = 0)]
        debit: u32,
        #[arg(long, default_value_t = 0)]
        credit: u32,
    },
    /// Change the date, description or amounts of a transaction.
    EditTransaction {
        #[arg(long)]
        id: TransactionId,
        /// YYYY-MM-DD or MM/DD/YYYY.
        #[arg(long, short, value_parser = parse_date_arg)]
        date: Option<Date>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        debit: Option<u32>,
        #[arg(long)]
        credit: Option<u32>,
    },
    /// Delete a transaction by its ID.
    DeleteTransaction {
        #[arg(long)]
        id: TransactionId,
    },
    /// Credit students their pay.
    ///
    /// Without any `--amount`, every student with a default pay gets it.
    Payroll {
        /// YYYY-MM-DD or MM/DD/YYYY.
        #[arg(long, short, value_parser = parse_date_arg)]
        date: Date,
        /// A payment in the form NAME=AMOUNT. May be repeated.
        #[arg(long = "amount", value_parser = parse_payment_arg)]
        amounts: Vec<(String, u32)>,
    },
    /// Change the logged-in student's password.
    ChangePassword,
}

fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            print_error(error);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn StdError>> {
    let conn = Connection::open(&args.db_path)?;
    initialize_db(&conn)?;

    if let Command::Init { admin } = &args.command {
        return Ok(init(admin.as_deref(), &conn)?);
    }

    let user = match args.user {
        Some(user) => user,
        None => read_operator_name()?,
    };
    let password = read_operator_password()?;
    let session = log_in(&user, &password, &conn)?;

    match args.command {
        Command::Init { .. } => Ok(()),
        Command::Export { output } => {
            let path = match output {
                Some(path) if path.is_dir() => path.join(EXPORT_FILE_NAME),
                Some(path) => path,
                None => PathBuf::from(EXPORT_FILE_NAME),
            };
            export_grades_to_path(&session, &path, &conn)?;
            println!("Exported grades to {path:#?}");
            Ok(())
        }
        Command::Import { input } => {
            let summary =
                import_grades_from_path(&session, &input, PasswordHash::DEFAULT_COST, &conn)?;
            println!(
                "Imported {} transactions from {} workbooks, created {} students, skipped {} rows.",
                summary.transactions_imported,
                summary.workbooks,
                summary.students_created,
                summary.rows_skipped
            );
            Ok(())
        }
        Command::Students { search } => {
            session.require_admin()?;
            let students = match search {
                Some(query) => search_students(&query, &conn)?,
                None => list_students(&conn)?,
            };
            print_students(&students, &conn)?;
            Ok(())
        }
        Command::Statement { student } => {
            let student_id = match (student, session) {
                (Some(name), _) => student_id_by_name(&name, &conn)?,
                (None, Session::Student(student_id)) => student_id,
                (None, Session::Admin(_)) => {
                    return Err("--student is required when logged in as an admin".into());
                }
            };
            print_statement(&session, student_id, &conn)?;
            Ok(())
        }
        Command::AddStudent { name, grade } => {
            let grade = Grade::new(&grade)?;
            let password = prompt_new_password(&format!("Password for {name}"))?;
            let student = register_student(
                &session,
                &name,
                grade,
                &password,
                PasswordHash::DEFAULT_COST,
                &conn,
            )?;
            println!("Registered {} (ID {}) in grade {}", student.name, student.id, student.grade);
            Ok(())
        }
        Command::DeleteStudent { student } => {
            let student_id = student_id_by_name(&student, &conn)?;
            remove_student(&session, student_id, &conn)?;
            println!("Deleted {student} and their transactions.");
            Ok(())
        }
        Command::ResetStudentPassword { student } => {
            session.require_admin()?;
            let student_id = student_id_by_name(&student, &conn)?;
            let new_password = prompt_new_password(&format!("New password for {student}"))?;
            reset_student_password(
                &session,
                student_id,
                &new_password,
                &new_password,
                PasswordHash::DEFAULT_COST,
                &conn,
            )?;
            println!("Password reset for {student}.");
            Ok(())
        }
        Command::Admins => {
            let admins = admin_accounts(&session, &conn)?;
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{:>5}  {:<32} {}", "ID", "NAME", "PERMISSION")?;
            for admin in admins {
                writeln!(
                    stdout,
                    "{:>5}  {:<32} {:?}",
                    admin.id, admin.name, admin.permission
                )?;
            }
            Ok(())
        }
        Command::DeleteAdmin { name } => {
            let admin = find_admin_by_name(name.trim(), &conn)?.ok_or(Error::NotFound)?;
            remove_admin(&session, admin.id, &conn)?;
            println!("Deleted admin {}.", admin.name);
            Ok(())
        }
        Command::AddAdmin { name, super_admin } => {
            let permission = if super_admin {
                PermissionLevel::Super
            } else {
                PermissionLevel::Staff
            };
            let password = prompt_new_password(&format!("Password for {name}"))?;
            let admin = register_admin(
                &session,
                &name,
                &password,
                permission,
                PasswordHash::DEFAULT_COST,
                &conn,
            )?;
            println!("Registered admin {} (ID {})", admin.name, admin.id);
            Ok(())
        }
        Command::AddTransaction {
            student,
            date,
            description,
            debit,
            credit,
        } => {
            session.require_admin()?;
            let student_id = student_id_by_name(&student, &conn)?;
            let transaction = create_transaction(
                Transaction::build(student_id, date)
                    .description(&description)
                    .debit(debit)
                    .credit(credit),
                &conn,
            )?;
            println!("Recorded transaction {} for {student}", transaction.id);
            Ok(())
        }
        Command::EditTransaction {
            id,
            date,
            description,
            debit,
            credit,
        } => {
            session.require_admin()?;
            let current = get_transaction(id, &conn)?;
            let mut builder = current.to_builder();
            if let Some(date) = date {
                builder.date = date;
            }
            if let Some(description) = description {
                builder = builder.description(&description);
            }
            if let Some(debit) = debit {
                builder = builder.debit(debit);
            }
            if let Some(credit) = credit {
                builder = builder.credit(credit);
            }
            let transaction = edit_transaction(&session, id, builder, &conn)?;
            println!(
                "Transaction {}: {} {:?} debit {} credit {}",
                transaction.id,
                transaction.date,
                transaction.description,
                transaction.debit,
                transaction.credit
            );
            Ok(())
        }
        Command::DeleteTransaction { id } => {
            session.require_admin()?;
            let student_id = delete_transaction(id, &conn)?;
            println!("Deleted transaction {id} of student {student_id}");
            Ok(())
        }
        Command::Payroll { date, amounts } => {
            let payments = if amounts.is_empty() {
                payroll_sheet(&session, &conn)?
                    .into_iter()
                    .filter(|line| line.default_amount > 0)
                    .map(|line| (line.student_id, line.default_amount))
                    .collect()
            } else {
                amounts
                    .iter()
                    .map(|(name, amount)| Ok((student_id_by_name(name, &conn)?, *amount)))
                    .collect::<Result<Vec<_>, Error>>()?
            };
            let paid = run_payroll(&session, date, &payments, &conn)?;
            println!("Paid {paid} students.");
            Ok(())
        }
        Command::ChangePassword => {
            session.require_student()?;
            let new_password = prompt_new_password("New password")?;
            change_password(
                &session,
                &password,
                &new_password,
                &new_password,
                PasswordHash::DEFAULT_COST,
                &conn,
            )?;
            println!("Password changed.");
            Ok(())
        }
    }
}

fn init(admin_name: Option<&str>, conn: &Connection) -> Result<(), Error> {
    if !list_admins(conn)?.is_empty() {
        println!("Database is ready.");
        return Ok(());
    }

    let Some(admin_name) = admin_name else {
        println!("Database is ready. Run `init --admin <NAME>` to create the first super admin.");
        return Ok(());
    };

    let password = prompt_new_password(&format!("Password for {admin_name}"))?;
    let password_hash = PasswordHash::new(ValidatedPassword::new(&password)?, PasswordHash::DEFAULT_COST)?;
    let admin = create_admin(admin_name, password_hash, PermissionLevel::Super, conn)?;

    println!("Created super admin {} (ID {})", admin.name, admin.id);

    Ok(())
}

fn student_id_by_name(name: &str, conn: &Connection) -> Result<StudentId, Error> {
    find_student_by_name(name.trim(), conn)?
        .map(|student| student.id)
        .ok_or(Error::NotFound)
}

fn print_students(students: &[Student], conn: &Connection) -> Result<(), Error> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{:>5}  {:<32} {:>5} {:>10}", "ID", "NAME", "GRADE", "BALANCE")?;

    for student in students {
        let balance = calculate_balance(&list_transactions(Some(student.id), conn)?);
        writeln!(
            stdout,
            "{:>5}  {:<32} {:>5} {:>10}",
            student.id, student.name, student.grade, balance
        )?;
    }

    Ok(())
}

fn print_statement(session: &Session, student_id: StudentId, conn: &Connection) -> Result<(), Error> {
    let statement = student_statement(session, student_id, conn)?;
    let balances = running_balances(&statement.transactions);
    let mut stdout = io::stdout().lock();

    writeln!(
        stdout,
        "{} (grade {}): balance {}",
        statement.student.name, statement.student.grade, statement.balance
    )?;
    writeln!(
        stdout,
        "{:>6}  {:<10}  {:<30} {:>8} {:>8} {:>9}",
        "ID", "DATE", "DESCRIPTION", "DEBIT", "CREDIT", "BALANCE"
    )?;

    for (transaction, balance) in statement.transactions.iter().zip(balances).rev() {
        writeln!(
            stdout,
            "{:>6}  {:<10}  {:<30} {:>8} {:>8} {:>9}",
            transaction.id,
            transaction.date,
            transaction.description,
            transaction.debit,
            transaction.credit,
            balance
        )?;
    }

    Ok(())
}

fn read_operator_name() -> Result<String, Error> {
    print!("Name: ");
    io::stdout().flush()?;

    let mut name = String::new();
    io::stdin().lock().read_line(&mut name)?;

    Ok(name.trim().to_owned())
}

fn read_operator_password() -> Result<String, Error> {
    match env::var(PASSWORD_VARIABLE) {
        Ok(password) => Ok(password),
        Err(_) => Ok(rpassword::prompt_password("Password: ")?),
    }
}

fn prompt_new_password(prompt: &str) -> Result<String, Error> {
    loop {
        let first_password = rpassword::prompt_password(format!("{prompt}: "))?;

        if let Err(error) = ValidatedPassword::new(&first_password) {
            print_error(error);
            continue;
        }

        let second_password = rpassword::prompt_password("Enter the same password again: ")?;

        if first_password != second_password {
            print_error("Passwords must match, try again.");
            continue;
        }

        return Ok(first_password);
    }
}

fn parse_date_arg(text: &str) -> Result<Date, String> {
    parse_date_text(text).ok_or_else(|| format!("{text:?} is not a YYYY-MM-DD or MM/DD/YYYY date"))
}

fn parse_payment_arg(text: &str) -> Result<(String, u32), String> {
    let (name, amount) = text
        .rsplit_once('=')
        .ok_or_else(|| format!("{text:?} is not in the form NAME=AMOUNT"))?;
    let amount = amount
        .trim()
        .parse()
        .map_err(|error| format!("invalid amount in {text:?}: {error}"))?;

    Ok((name.trim().to_owned(), amount))
}

fn print_error(error: impl ToString) {
    eprintln!(
        "\x1b[31;1m{}\x1b[0m",
        capitalise_first_char(&error.to_string())
    )
}

fn capitalise_first_char(string: &str) -> String {
    let mut chars = string.chars();
    let Some(first) = chars.next() else {
        return String::with_capacity(0);
    };
    first.to_uppercase().chain(chars).collect()
}
