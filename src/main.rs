use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;
use sqlx::PgPool;

mod artifact;
mod behavior;
mod config;
mod db;
mod engine;
mod error;
mod estimator;
mod evaluation;
mod features;
mod logging;
mod models;
mod performance;
mod preprocessing;
mod recommendation;
mod records;
mod registry;
mod report;
mod scheduling;
mod scoring;
mod source;

use artifact::FileArtifactStore;
use config::EngineConfig;
use engine::Engine;
use error::EngineError;
use models::ModelType;
use registry::ModelRegistry;
use source::{DataSource, SyntheticDataSource, SYNTHETIC_SEED};

#[derive(Parser)]
#[command(name = "study-forecast")]
#[command(about = "Study scheduling, course recommendation and performance forecasts", long_about = None)]
struct Cli {
    /// Use the built-in synthetic corpus instead of Postgres
    #[arg(long, global = true)]
    synthetic: bool,
    /// Directory holding trained model artifacts (overrides MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the synthetic corpus into the database
    Seed,
    /// Import study sessions from a CSV file or a JSON export
    #[command(group(
        ArgGroup::new("source")
            .args(["csv", "json"])
            .required(true)
            .multiple(false)
    ))]
    Import {
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Train one model: scheduling, recommendation or performance
    Train {
        #[arg(long)]
        model: String,
        /// Train on this learner's sessions only
        #[arg(long)]
        user: Option<String>,
    },
    /// Train every model
    TrainAll,
    /// Show trained state and last stored metrics per model
    Status,
    /// Show the last stored metrics for one model
    Metrics {
        #[arg(long)]
        model: String,
    },
    /// Count the sessions, learners and courses available for training
    DataStats,
    /// Recommend a study method for a learner
    PredictSchedule {
        #[arg(long)]
        user: String,
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..24))]
        hour: Option<u32>,
        /// Day of week, Monday = 0
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..7))]
        weekday: Option<u32>,
    },
    /// Rank courses for a learner
    Recommend {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Forecast completion rate, quiz score and risk for a learner
    PredictPerformance {
        #[arg(long)]
        user: String,
        #[arg(long)]
        course: String,
    },
    /// Write a markdown study report for a learner
    Analyze {
        #[arg(long)]
        user: String,
        #[arg(long)]
        course: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints the JSON error body, then fails the command.
fn fail(err: EngineError, action: &str) -> anyhow::Result<()> {
    print_json(&serde_json::json!({
        "success": false,
        "status": err.status_code(),
        "error": err.to_string(),
    }))?;
    Err(err).with_context(|| action.to_string())
}

async fn connect(config: &EngineConfig) -> anyhow::Result<PgPool> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to a Postgres instance (or pass --synthetic)")?;
    db::connect(database_url, config.max_connections)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging()?;
    let cli = Cli::parse();
    let mut config = EngineConfig::from_env()?;
    if let Some(model_dir) = cli.model_dir {
        config.model_dir = model_dir;
    }

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
            return Ok(());
        }
        Commands::Seed => {
            let pool = connect(&config).await?;
            let inserted = db::seed(&pool).await?;
            println!("Seed data inserted ({inserted} new sessions).");
            return Ok(());
        }
        Commands::Import { csv, json } => {
            let pool = connect(&config).await?;
            let (inserted, path) = match (csv, json) {
                (Some(path), _) => (db::import_csv(&pool, &path).await, path),
                (None, Some(path)) => (db::import_json(&pool, &path).await, path),
                (None, None) => anyhow::bail!("pass --csv or --json"),
            };
            let inserted =
                inserted.with_context(|| format!("failed to import {}", path.display()))?;
            println!("Inserted {inserted} sessions from {}.", path.display());
            return Ok(());
        }
        _ => {}
    }

    let data: Arc<dyn DataSource> = if cli.synthetic {
        Arc::new(SyntheticDataSource::new(SYNTHETIC_SEED))
    } else {
        Arc::new(db::PgDataSource::new(connect(&config).await?))
    };
    let registry = ModelRegistry::load(
        Box::new(FileArtifactStore::new(&config.model_dir)),
        config.min_training_samples,
    );
    let mut engine = Engine::new(data, registry);

    let result = run(&mut engine, cli.command).await;
    engine.flush().await;
    result
}

async fn run(engine: &mut Engine, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Train { model, user } => {
            let outcome = match model.parse::<ModelType>() {
                Ok(model_type) => engine.train(model_type, user.as_deref()).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(outcome) => print_json(&outcome)?,
                Err(err) => return fail(err, &format!("training {model} failed")),
            }
        }
        Commands::TrainAll => {
            print_json(&engine.train_all().await)?;
        }
        Commands::Status => {
            print_json(&engine.status().await)?;
        }
        Commands::Metrics { model } => {
            let stored = match model.parse::<ModelType>() {
                Ok(model_type) => engine.model_metrics(model_type).await,
                Err(err) => Err(err),
            };
            match stored {
                Ok(stored) => print_json(&stored)?,
                Err(err) => return fail(err, &format!("reading {model} metrics failed")),
            }
        }
        Commands::DataStats => match engine.training_data_statistics().await {
            Ok(stats) => print_json(&stats)?,
            Err(err) => return fail(err, "reading training data statistics failed"),
        },
        Commands::PredictSchedule {
            user,
            hour,
            weekday,
        } => {
            print_json(&engine.predict_schedule(&user, hour, weekday).await)?;
        }
        Commands::Recommend { user, limit } => {
            print_json(&engine.recommend_courses(&user, limit).await)?;
        }
        Commands::PredictPerformance { user, course } => {
            print_json(&engine.predict_performance(&user, Some(&course)).await)?;
        }
        Commands::Analyze { user, course, out } => {
            let summary = engine
                .analyze_user(&user)
                .await
                .with_context(|| format!("failed to load study history for {user}"))?;
            let schedule = engine.predict_schedule(&user, None, None).await;
            let performance = engine.predict_performance(&user, course.as_deref()).await;
            let report = report::build_report(
                &user,
                chrono::Utc::now(),
                summary.as_ref(),
                &schedule,
                &performance,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::InitDb | Commands::Seed | Commands::Import { .. } => {}
    }

    Ok(())
}
