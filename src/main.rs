use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{Local, NaiveDate, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod attendance;
mod config;
mod db;
mod enrollment;
mod models;
mod register;
mod report;
mod risk;
mod roster;
mod schedule;
mod snapshot;
mod store;
mod watch;

use crate::config::StoreConfig;
use crate::enrollment::EnrollmentIndex;
use crate::models::{EnrollmentOrigin, Holiday};
use crate::register::Register;
use crate::schedule::ClassDraft;
use crate::store::Store;

#[derive(Parser)]
#[command(name = "campus-attendance")]
#[command(about = "Attendance and enrollment reporting for CampusERP records", long_about = None)]
struct Cli {
    /// Record-store export to read and write instead of Postgres
    #[arg(long, env = "CAMPUS_SNAPSHOT", global = true)]
    snapshot: Option<PathBuf>,
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,
    #[arg(long, default_value_t = 5, global = true)]
    max_connections: u32,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Add or update students from a roster CSV
    ImportRoster {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Enroll one student, or every student listed in a CSV, in a class
    #[command(group(
        ArgGroup::new("source")
            .args(["student", "csv"])
            .required(true)
            .multiple(false)
    ))]
    Enroll {
        #[arg(long)]
        class: String,
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Enrollment date, defaults to today
        #[arg(long)]
        on: Option<NaiveDate>,
    },
    /// Remove a student from a class; attendance history is kept
    Unenroll {
        #[arg(long)]
        class: String,
        #[arg(long)]
        student: String,
    },
    /// Take a student off the active roster
    Disable {
        #[arg(long)]
        student: String,
    },
    /// Put a student back on the active roster
    Enable {
        #[arg(long)]
        student: String,
    },
    /// Create a scheduled class
    AddClass {
        #[arg(long)]
        name: String,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        teacher: String,
        /// Weekdays, e.g. "Mon, Wed, Fri"
        #[arg(long)]
        days: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
    },
    /// Mark attendance for a class; unlisted students are marked present
    Mark {
        #[arg(long)]
        class: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, value_delimiter = ',')]
        absent: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        late: Vec<String>,
        #[arg(long)]
        by: String,
    },
    /// Subject-wise attendance for one student
    Student {
        #[arg(long)]
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Overall standing for every active student
    Roster {
        #[arg(long)]
        json: bool,
    },
    /// Per-class counts and absentees for one date
    ClassDay {
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "attendance-report.md")]
        out: PathBuf,
    },
    /// Change the minimum attendance percentage
    SetThreshold {
        #[arg(long, allow_hyphen_values = true)]
        value: i64,
        /// Hours after a school day during which attendance stays editable
        #[arg(long)]
        edit_window: Option<i64>,
    },
    /// Mark a date as a school holiday
    AddHoliday {
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        name: String,
    },
    /// Recompute standings whenever the records change
    Watch {
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn set_disabled(store: &Store, student: &str, disabled: bool) -> anyhow::Result<()> {
    if !store.set_student_disabled(student, disabled).await? {
        bail!("unknown student {student}");
    }
    let state = if disabled { "disabled" } else { "active" };
    println!("Student {student} is now {state}.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let store_config = StoreConfig::resolve(cli.snapshot, cli.database_url, cli.max_connections)?;
    tracing::debug!(store = %store_config.describe(), "using record store");
    let store = Store::connect(&store_config).await?;
    let today = Local::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            store.init().await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            store::seed(&store).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportRoster { csv } => {
            let profiles = roster::read_roster(&csv)?;
            if profiles.is_empty() {
                bail!("no rows with a Student ID found in {}", csv.display());
            }
            let written = store.upsert_students(&profiles).await?;
            println!("Processed {written} students from {}.", csv.display());
        }
        Commands::Enroll {
            class,
            student,
            csv,
            on,
        } => {
            let snapshot = store.load_snapshot().await?;
            let Some(target) = snapshot.classes.get(&class) else {
                bail!("unknown class {class}");
            };

            let requested = match (student, csv) {
                (Some(id), _) => vec![id],
                (None, Some(path)) => roster::read_enrollment_ids(&path)?,
                (None, None) => Vec::new(),
            };
            let (known, unknown): (Vec<String>, Vec<String>) = requested
                .into_iter()
                .partition(|id| snapshot.students.contains_key(id));
            for id in &unknown {
                tracing::warn!(student = %id, "skipping unknown student");
            }
            if known.is_empty() {
                bail!("none of the given students exist");
            }

            store.enroll(&known, &class, on.unwrap_or(today)).await?;
            println!("Enrolled {} students in {}.", known.len(), target.name);
        }
        Commands::Unenroll { class, student } => {
            let snapshot = store.load_snapshot().await?;
            let enrolled = snapshot
                .students
                .get(&student)
                .is_some_and(|record| record.is_enrolled_in(&class));
            if !enrolled {
                bail!("student {student} is not enrolled in {class}");
            }
            store.unenroll(&student, &class).await?;
            println!("Removed {student} from {class}.");
        }
        Commands::Disable { student } => set_disabled(&store, &student, true).await?,
        Commands::Enable { student } => set_disabled(&store, &student, false).await?,
        Commands::AddClass {
            name,
            subject,
            teacher,
            days,
            start,
            end,
            start_date,
            end_date,
        } => {
            let class = ClassDraft {
                name,
                subject_name: subject,
                teacher_id: Some(teacher),
                days,
                start_time: start,
                end_time: end,
                start_date,
                end_date,
            }
            .into_class()?;
            store.upsert_class(&class).await?;
            println!("Created class {} ({}).", class.name, class.id);
        }
        Commands::Mark {
            class,
            date,
            absent,
            late,
            by,
        } => {
            let snapshot = store.load_snapshot().await?;
            let index = EnrollmentIndex::from_snapshot(&snapshot);
            let mut sheet = Register::open(
                &snapshot,
                &index,
                &class,
                date,
                Local::now().naive_local(),
            )?;
            sheet.apply(&absent, &late)?;

            let submission = sheet.submit(&by, Utc::now().timestamp_millis())?;
            store.write_attendance(&submission.writes).await?;

            println!(
                "Attendance for {} on {} saved ({} students).",
                sheet.class_name,
                sheet.date,
                submission.writes.len()
            );
            println!("{} student(s) absent", submission.absent_names.len());
            for name in submission.absent_names.iter().take(5) {
                println!("- {name}");
            }
            if submission.absent_names.len() > 5 {
                println!("... and {} more.", submission.absent_names.len() - 5);
            }
        }
        Commands::Student { id, json } => {
            let snapshot = store.load_snapshot().await?;
            let Some(student) = snapshot.students.get(&id) else {
                bail!("unknown student {id}");
            };
            let index = EnrollmentIndex::from_snapshot(&snapshot);
            let summary = attendance::student_attendance(&snapshot, &index, student);
            let threshold = snapshot.settings.min_attendance;
            let standing = risk::classify(summary.overall_percentage, threshold);

            if json {
                let subjects: Vec<_> = risk::subject_standings(&summary, threshold)
                    .into_iter()
                    .map(|(subject, standing)| {
                        serde_json::json!({ "subject": subject, "standing": standing })
                    })
                    .collect();
                let value = serde_json::json!({
                    "student": summary,
                    "standing": standing,
                    "threshold": threshold,
                    "subjects": subjects,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }

            let status = if student.disabled { ", disabled" } else { "" };
            println!("{} ({}{})", summary.student_name, summary.student_id, status);
            let contact = &student.contact;
            let guardians: Vec<&str> = [&contact.father_name, &contact.mother_name]
                .into_iter()
                .map(String::as_str)
                .filter(|name| !name.is_empty())
                .collect();
            if !guardians.is_empty() {
                println!("Guardians: {}", guardians.join(", "));
            }
            let reach: Vec<&str> = [
                &contact.parent_phone,
                &contact.parent_email,
                &contact.student_phone,
                &contact.student_email,
            ]
            .into_iter()
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .collect();
            if !reach.is_empty() {
                println!("Contact: {}", reach.join(" / "));
            }
            if summary.subjects.is_empty() {
                println!("Not enrolled in any classes.");
            }
            for class in index.classes_for(&student.id) {
                let Some(enrollment) = student.enrollments.get(&class.id) else {
                    continue;
                };
                let since = enrollment
                    .enrolled_on
                    .map(|date| format!(" since {date}"))
                    .unwrap_or_default();
                let legacy = if enrollment.origin == EnrollmentOrigin::Legacy {
                    " (legacy class link)"
                } else {
                    ""
                };
                println!("  enrolled in {} [{}]{since}{legacy}", class.name, class.subject());
            }
            for (subject, standing) in risk::subject_standings(&summary, threshold) {
                println!(
                    "- {}: {} of {} attended, {} late, {} absent, {} {}",
                    subject.subject_name,
                    subject.totals.present,
                    subject.totals.total,
                    subject.totals.late,
                    subject.totals.absent,
                    report::display_pct(subject.percentage),
                    standing
                );
            }
            println!(
                "Overall: {} of {} attended, {} {} (minimum {}%)",
                summary.overall.present,
                summary.overall.total,
                report::display_pct(summary.overall_percentage),
                standing,
                threshold
            );
        }
        Commands::Roster { json } => {
            let snapshot = store.load_snapshot().await?;
            let roster = risk::roster_report(&snapshot);

            if json {
                println!("{}", serde_json::to_string_pretty(&roster)?);
                return Ok(());
            }

            println!(
                "{} good, {} at risk (minimum {}%)",
                roster.good, roster.at_risk, roster.threshold
            );
            for row in &roster.rows {
                println!(
                    "- {} ({}) {} of {} attended, {} {}",
                    row.attendance.student_name,
                    row.attendance.student_id,
                    row.attendance.overall.present,
                    row.attendance.overall.total,
                    report::display_pct(row.attendance.overall_percentage),
                    row.standing
                );
            }
        }
        Commands::ClassDay { date } => {
            let date = date.unwrap_or(today);
            let snapshot = store.load_snapshot().await?;
            if let Some(holiday) = snapshot.holiday_on(date) {
                println!("{date} is a holiday: {}", holiday.name);
            }

            let summaries = attendance::class_day(&snapshot, date);
            if summaries.is_empty() {
                println!("No attendance recorded on {date}.");
                return Ok(());
            }
            for summary in summaries {
                println!(
                    "- {}: {} present, {} late, {} absent",
                    summary.class_name,
                    summary.totals.present - summary.totals.late,
                    summary.totals.late,
                    summary.totals.absent
                );
                if let Some(marker) = &summary.marked_by {
                    println!("  marked by {marker}");
                }
                if !summary.absent_students.is_empty() {
                    println!("  absent: {}", summary.absent_students.join(", "));
                }
            }
        }
        Commands::Report { out } => {
            let snapshot = store.load_snapshot().await?;
            let roster = risk::roster_report(&snapshot);
            let report = report::build_report(today, &roster);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::SetThreshold { value, edit_window } => {
            let min_attendance = risk::validate_threshold(value)?;
            let mut settings = store.load_snapshot().await?.settings;
            settings.min_attendance = min_attendance;
            if let Some(hours) = edit_window {
                settings.edit_window_hours = risk::validate_edit_window(hours)?;
            }
            store.set_settings(&settings).await?;
            println!(
                "Minimum attendance set to {}% (edit window {}h).",
                settings.min_attendance, settings.edit_window_hours
            );
        }
        Commands::AddHoliday { date, name } => {
            if name.trim().is_empty() {
                bail!("holiday name is required");
            }
            store
                .add_holiday(&Holiday {
                    date,
                    name: name.trim().to_string(),
                })
                .await?;
            println!("Holiday added on {date}.");
        }
        Commands::Watch { interval_secs } => {
            let every = Duration::from_secs(interval_secs.max(1));
            watch::watch(&store, every, |roster| {
                println!(
                    "{} good, {} at risk (minimum {}%)",
                    roster.good, roster.at_risk, roster.threshold
                );
            })
            .await?;
        }
    }

    Ok(())
}
