//! Coralwatch CLI - coral bleaching prediction store and API server

use anyhow::Context;
use clap::{Parser, Subcommand};
use coralwatch::config::{self, CoralConfig};
use coralwatch::inference::{self, Classifier};
use coralwatch::output::{emit_success, is_quiet, OutputMode};
use coralwatch::server::{self, AppState};
use coralwatch::ui::{self, Icons};
use coralwatch::{ClassificationOutcome, CoralClass, PredictionDraft, PredictionRepository, Store};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "coralwatch")]
#[command(version)]
#[command(about = "Coral reef bleaching prediction store - history, statistics and HTTP API")]
#[command(long_about = r#"
Coralwatch keeps the history of coral-reef image classifications
("Healthy" / "Bleached") and serves it over HTTP.

Predictions are stored in SQLite. When the database file cannot be
opened the store falls back to memory and nothing survives a restart;
`coralwatch status` shows which backend is active.

Example usage:
  coralwatch serve --port 3000
  coralwatch list --limit 10
  coralwatch classify --image ./reef.jpg
  PREDICTIONS_DB_PATH=/var/lib/coral.db coralwatch stats
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides PREDICTIONS_DB_PATH and the config file)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Port to listen on (default 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List predictions, newest first
    List {
        /// Only the N most recent predictions
        #[arg(short, long)]
        limit: Option<usize>,

        /// Filter by class (healthy, bleached)
        #[arg(short = 'k', long)]
        class: Option<String>,
    },

    /// Show one prediction
    Show {
        #[arg(long)]
        id: i64,
    },

    /// Show prediction statistics
    Stats,

    /// Delete a prediction by id
    Delete {
        #[arg(long)]
        id: i64,
    },

    /// Classify an image and store the result
    Classify {
        /// Image file to classify
        #[arg(short, long)]
        image: PathBuf,

        /// Name to record (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show which storage backend is active
    Status,

    /// Write a default coralwatch.toml
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        "debug"
    } else if is_quiet() {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output_mode = OutputMode::from_flag(cli.json);
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);

    if let Commands::Init { force } = cli.command {
        return run_init(&config_path, force, output_mode);
    }

    let base = std::env::current_dir().context("Failed to resolve working directory")?;
    let coral_config = config::load_config(Some(&config_path))
        .with_context(|| format!("Failed to load config {}", config_path.display()))?
        .unwrap_or_default();
    let db_path = coral_config.database_path(cli.database.as_deref(), config::database_path_from_env(), &base);

    let store = Arc::new(Store::new(coral_config.store_config(db_path)));
    let repository = PredictionRepository::new(store.clone());

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or_else(|| coral_config.port());
            let images_dir = coral_config.images_dir_in(&base);
            let classifier = build_classifier(&coral_config, &base);
            let state = Arc::new(AppState::new(store, classifier, images_dir));

            if output_mode.is_human() {
                ui::header(&format!("Coralwatch API {}", Icons::ROCKET));
                ui::info("Database", &state.store.config().path.display().to_string());
                ui::info(&format!("{} Images", Icons::IMAGE), &state.images_dir.display().to_string());
            }
            server::start_server(port, state, coral_config.max_upload_bytes()).await?;
        }

        Commands::List { limit, class } => {
            store.acquire().await;
            let predictions = match (class, limit) {
                (Some(class), _) => {
                    let class: CoralClass = class.parse()?;
                    let mut rows = repository.list_by_class(class).await?;
                    if let Some(limit) = limit.filter(|l| *l > 0) {
                        rows.truncate(limit);
                    }
                    rows
                }
                (None, Some(limit)) if limit > 0 => repository.list_recent(limit).await?,
                (None, _) => repository.list_all().await?,
            };

            if output_mode.is_human() {
                if predictions.is_empty() {
                    println!("{} No predictions found.", Icons::CROSS);
                } else {
                    println!("{}", ui::predictions_table(&predictions));
                }
            } else {
                emit_success(output_mode, "list", &predictions)?;
            }
        }

        Commands::Show { id } => {
            store.acquire().await;
            match repository.get_by_id(id).await? {
                Some(prediction) => {
                    if output_mode.is_human() {
                        ui::section(&format!("Prediction #{}", prediction.id));
                        ui::summary_row("Image:", &prediction.image_name);
                        if let Some(url) = &prediction.image_url {
                            ui::summary_row("URL:", url);
                        }
                        ui::summary_row("Class:", &ui::class_badge(prediction.predicted_class));
                        ui::summary_row("Confidence:", &format!("{:.1}%", prediction.confidence));
                        ui::summary_row("Bleached:", &format!("{:.1}%", prediction.probability_bleached));
                        ui::summary_row("Healthy:", &format!("{:.1}%", prediction.probability_healthy));
                        ui::summary_row("Created:", &prediction.created_at.to_rfc3339());
                    } else {
                        emit_success(output_mode, "show", &prediction)?;
                    }
                }
                None => anyhow::bail!("Prediction {} not found", id),
            }
        }

        Commands::Stats => {
            store.acquire().await;
            let stats = repository.stats().await?;

            if output_mode.is_human() {
                println!("{} Coralwatch Statistics ({})", Icons::STATS, store.config().path.display());
                println!("{}", ui::stats_table(&stats));
            } else {
                emit_success(output_mode, "stats", stats)?;
            }
        }

        Commands::Delete { id } => {
            store.acquire().await;
            let outcome = repository.delete_by_id(id).await?;

            if output_mode.is_human() {
                if outcome.rows_affected > 0 {
                    ui::success(&format!("{} Deleted prediction {}", Icons::DEL, id));
                } else {
                    ui::warn(&format!("No prediction with id {}", id));
                }
            } else {
                emit_success(output_mode, "delete", outcome)?;
            }
        }

        Commands::Classify { image, name } => {
            store.acquire().await;
            if !image.is_file() {
                anyhow::bail!("Image not found: {}", image.display());
            }
            let image_name = name.unwrap_or_else(|| {
                image
                    .file_name()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "upload".to_string())
            });

            let classifier = build_classifier(&coral_config, &base);
            let spinner = output_mode
                .is_human()
                .then(|| ui::Spinner::new(&format!("{} Classifying {}...", Icons::BRAIN, image_name)));
            let path = image.clone();
            let outcome = match tokio::task::spawn_blocking(move || classifier.classify(&path)).await? {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!("Prediction failed, storing placeholder values: {}", e);
                    ClassificationOutcome::pending()
                }
            };
            if let Some(spinner) = &spinner {
                spinner.finish_and_clear();
            }

            let draft = PredictionDraft::new(image_name, outcome)
                .with_image_url(Some(image.display().to_string()));
            let result = repository.insert(draft).await?;

            if output_mode.is_human() {
                ui::success(&format!("Prediction #{} saved", result.last_insert_id));
                ui::summary_row("Class:", &ui::class_badge(outcome.predicted_class));
                ui::summary_row("Confidence:", &format!("{:.1}%", outcome.confidence));
            } else {
                emit_success(
                    output_mode,
                    "classify",
                    serde_json::json!({ "id": result.last_insert_id, "prediction": outcome }),
                )?;
            }
        }

        Commands::Status => {
            store.acquire().await;
            let status = store
                .status()
                .context("Store did not initialize")?;

            if output_mode.is_human() {
                ui::info(&format!("{} Backend", Icons::DATABASE), status.backend.as_str());
                match &status.path {
                    Some(path) => ui::info("Database", &path.display().to_string()),
                    None => ui::warn("In-memory store: predictions are lost on exit"),
                }
            } else {
                emit_success(output_mode, "status", &status)?;
            }
        }

        Commands::Init { .. } => unreachable!("handled before the store is built"),
    }

    Ok(())
}

fn build_classifier(config: &CoralConfig, base: &Path) -> Arc<dyn Classifier> {
    inference::load_classifier(config.model_path_in(base))
}

fn run_init(path: &Path, force: bool, output_mode: OutputMode) -> anyhow::Result<()> {
    let defaults = CoralConfig {
        database: Some("data/coral-predictions.db".to_string()),
        images_dir: Some("public/coral-images".to_string()),
        port: Some(config::DEFAULT_PORT),
        ..Default::default()
    };
    config::write_config(path, &defaults, force)?;

    if output_mode.is_human() {
        ui::success(&format!("Wrote {}", path.display()));
    } else {
        emit_success(output_mode, "init", serde_json::json!({ "path": path }))?;
    }
    Ok(())
}
