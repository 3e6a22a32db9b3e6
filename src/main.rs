use std::path::PathBuf;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

mod api;
mod config;
mod db;
mod error;
mod events;
mod export;
mod import;
mod models;
mod predictions;
mod records;
mod report;
mod risk;
mod validate;

use config::Config;
use events::EventBus;
use validate::{MetricValue, MetricsInput};

#[derive(Parser)]
#[command(name = "student-risk-tracker")]
#[command(about = "Academic performance tracking and risk-of-failure scoring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample students
    Seed,
    /// Import students from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Score a metrics snapshot without storing anything
    Score {
        #[command(flatten)]
        metrics: MetricsArgs,
    },
    /// Score a student and store the prediction
    Predict {
        #[arg(long)]
        student: String,
        /// Derive omitted grade, attendance and exam metrics from stored records
        #[arg(long)]
        from_records: bool,
        #[command(flatten)]
        metrics: MetricsArgs,
    },
    /// Write a markdown report for one prediction, or a cohort summary
    Report {
        #[arg(long)]
        prediction: Option<Uuid>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export the student directory as CSV
    Export {
        #[arg(long, default_value = "students.csv")]
        out: PathBuf,
    },
    /// Run the HTTP API
    Serve {
        /// Overrides BIND_ADDR
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Args)]
struct MetricsArgs {
    /// Average grade on the 0-10 scale
    #[arg(long)]
    average_grade: Option<f64>,
    #[arg(long)]
    attendance: Option<f64>,
    #[arg(long)]
    study_hours: Option<f64>,
    /// low, medium or high
    #[arg(long)]
    participation: Option<String>,
    #[arg(long)]
    submissions: Option<f64>,
    /// Exam average on the 0-10 scale
    #[arg(long)]
    exam_average: Option<f64>,
}

impl From<MetricsArgs> for MetricsInput {
    fn from(args: MetricsArgs) -> Self {
        Self {
            average_grade: args.average_grade.map(MetricValue::from),
            attendance_percentage: args.attendance.map(MetricValue::from),
            weekly_study_hours: args.study_hours.map(MetricValue::from),
            class_participation: args.participation,
            assignment_submission_percentage: args.submissions.map(MetricValue::from),
            exam_average: args.exam_average.map(MetricValue::from),
        }
    }
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_tracing();
    let cli = Cli::parse();

    if let Commands::Score { metrics } = cli.command {
        let metrics = MetricsInput::from(metrics).validate()?;
        let assessment = risk::score(&metrics);
        println!("Risk tier: {} (score {}/100)", assessment.tier, assessment.score);
        for factor in &assessment.factors {
            println!("- {factor}");
        }
        return Ok(());
    }

    let config = Config::from_env()?;
    let pool = connect(&config).await?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let file = std::fs::File::open(&csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let parsed = import::read_students(file)?;
            let inserted = db::import_students(&pool, &parsed.students).await?;
            println!("Inserted {inserted} students from {}.", csv.display());
            for row in &parsed.rejected {
                println!("- skipped line {}: {}", row.line, row.reason);
            }
        }
        Commands::Score { .. } => {}
        Commands::Predict {
            student,
            from_records,
            metrics,
        } => {
            let events = EventBus::new();
            let input = MetricsInput::from(metrics);
            let record = if from_records {
                predictions::generate_from_records(&pool, &events, &student, input).await?
            } else {
                predictions::generate(&pool, &events, &student, input).await?
            };
            println!(
                "Prediction {} for {}: {} (score {}/100)",
                record.id, record.student_id, record.risk_tier, record.score
            );
            for factor in &record.key_factors {
                println!("- {factor}");
            }
        }
        Commands::Report { prediction, out } => {
            let report = match prediction {
                Some(id) => {
                    let record = db::fetch_prediction(&pool, id).await?;
                    let student = db::fetch_student(&pool, &record.student_id).await?;
                    report::prediction_report(&student, &record)
                }
                None => {
                    let predictions = db::list_predictions(&pool).await?;
                    report::cohort_summary(&predictions)
                }
            };
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { out } => {
            let students = db::list_students(&pool).await?;
            let csv = export::students_csv(&students)?;
            std::fs::write(&out, csv)?;
            println!("Exported {} students to {}.", students.len(), out.display());
        }
        Commands::Serve { bind } => {
            let bind_addr = bind.unwrap_or(config.bind_addr);
            let state = web::Data::new(api::AppState {
                pool,
                events: EventBus::new(),
            });

            tracing::info!(addr = %bind_addr, "starting HTTP API");
            HttpServer::new(move || App::new().app_data(state.clone()).configure(api::configure))
                .bind(bind_addr.as_str())
                .with_context(|| format!("failed to bind {bind_addr}"))?
                .run()
                .await?;
        }
    }

    Ok(())
}
