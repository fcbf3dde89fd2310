use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod cache;
mod db;
mod engine;
mod error;
mod models;
mod report;

use cache::{Cache, MemoryCache, RedisCache};
use engine::AttendanceReportEngine;
use models::{AttendanceFilter, AttendanceStatus, BulkEntry, StudentFilter};

#[derive(Parser)]
#[command(name = "school-attendance")]
#[command(about = "Attendance recording and reporting for a school roster", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Record one day of attendance from a CSV file
    Record {
        /// CSV with student_id,status,note columns
        #[arg(long)]
        csv: PathBuf,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        recorded_by: Uuid,
    },
    /// Generate a monthly attendance report as markdown
    Report {
        /// Month in YYYY-MM format
        #[arg(long)]
        month: String,
        #[arg(long)]
        class: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Print daily attendance statistics as JSON
    Stats {
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Print status totals over a date range as JSON
    RangeStats {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
    /// List recorded attendance entries, newest first
    Attendance {
        #[arg(long)]
        date: Option<NaiveDate>,
        /// External student number
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        status: Option<AttendanceStatus>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// List the student roster
    Roster {
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        section: Option<String>,
        /// Substring match on student names
        #[arg(long)]
        search: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let cache: Arc<dyn Cache> = match std::env::var("REDIS_URL") {
        Ok(url) => Arc::new(
            RedisCache::new(&url)
                .await
                .context("failed to connect to Redis")?,
        ),
        Err(_) => Arc::new(MemoryCache::new()),
    };
    let engine = AttendanceReportEngine::new(pool.clone(), cache);

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Record {
            csv,
            date,
            recorded_by,
        } => {
            let entries = load_entries(&csv)?;
            let records = engine.record_bulk(date, &entries, recorded_by).await?;
            println!(
                "Recorded {} attendance entries from {}.",
                records.len(),
                csv.display()
            );
        }
        Commands::Report { month, class, out } => {
            let entries = engine.monthly_report(&month, class.as_deref()).await?;
            let rendered = report::render_report(&month, class.as_deref(), &entries);
            std::fs::write(&out, rendered)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Stats { date } => {
            let stats = match date {
                Some(date) => engine.statistics_for(date).await?,
                None => engine.today_statistics().await?,
            };
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::RangeStats { start, end } => {
            let stats = engine.statistics_for_range(start, end).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Attendance {
            date,
            student,
            status,
            limit,
        } => {
            let filter = AttendanceFilter {
                date,
                student_id: student,
                status,
            };
            let entries = db::list_attendance(&pool, &filter, limit).await?;
            if entries.is_empty() {
                println!("No attendance entries matched.");
                return Ok(());
            }
            for entry in &entries {
                println!(
                    "- {} {} ({}) {}{}",
                    entry.record.date,
                    entry.student.name,
                    entry.student.student_id,
                    entry.record.status,
                    entry
                        .record
                        .note
                        .as_deref()
                        .map(|note| format!(": {note}"))
                        .unwrap_or_default()
                );
            }
        }
        Commands::Roster {
            class,
            section,
            search,
        } => {
            let filter = StudentFilter {
                class,
                section,
                search,
            };
            let students = db::list_students(&pool, &filter).await?;
            if students.is_empty() {
                println!("No students matched.");
                return Ok(());
            }
            for student in &students {
                println!(
                    "- {} ({}) class {} section {}",
                    student.name, student.student_id, student.class, student.section
                );
            }
        }
    }

    Ok(())
}

fn load_entries(path: &Path) -> anyhow::Result<Vec<BulkEntry>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("could not open {}", path.display()))?;
    let mut entries = Vec::new();
    for result in reader.deserialize::<BulkEntry>() {
        entries.push(result?);
    }
    Ok(entries)
}
