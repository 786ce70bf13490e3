//! # Showcase command line
//!
//! Registers GitHub repositories in the configured storage backend and
//! prints catalogue views as JSON.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use showcase::{
    config::{AppConfig, BackendKind, ConfigLoader},
    db,
    error::SourceError,
    metadata::metadata_template,
    migrate,
    reconciler::Reconciler,
    source::{GitHubConfig, GitHubSource, RepositorySource},
    store::{self, RepositoryStore},
    telemetry,
};

#[derive(Debug, Parser)]
#[command(name = "showcase", version, about = "Showcase catalogue of GitHub repositories")]
struct Cli {
    /// Storage backend to use instead of the configured one
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch a repository from GitHub and start tracking it
    Add { url: String },
    /// Re-fetch a tracked repository and overwrite its stored summary
    Update { url: String },
    /// Re-fetch every tracked repository
    RefreshAll,
    /// Stop tracking a repository
    Remove { url: String },
    /// List tracked repositories, most recently synced first
    List,
    /// Show one tracked repository
    Show {
        url: String,
        /// Also fetch README and recent commits from GitHub
        #[arg(long)]
        fresh: bool,
    },
    /// Technology counts, highest first
    Stats,
    /// Print a starter project metadata file
    MetadataTemplate,
    /// Print configuration and storage counts
    Info,
    /// Copy repositories and technology counts into another backend
    Migrate {
        #[arg(long)]
        to: BackendKind,
    },
    /// Run SQLite maintenance
    Maintenance {
        #[arg(value_enum)]
        task: MaintenanceTask,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MaintenanceTask {
    Vacuum,
    Checkpoint,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("serializing output")?
    );
    Ok(())
}

fn load_config(backend: Option<BackendKind>) -> Result<AppConfig> {
    let mut config = ConfigLoader::new()
        .load_unvalidated()
        .context("loading configuration")?;
    if let Some(backend) = backend {
        config.backend = backend;
    }
    config.validate().context("validating configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.backend) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            return ExitCode::from(2);
        }
    };

    if let Err(err) = telemetry::init_tracing(&config) {
        eprintln!("Warning: {}", err);
    }

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: AppConfig) -> Result<()> {
    match command {
        Command::MetadataTemplate => print_json(&metadata_template()),
        Command::Migrate { to } => run_migrate(&config, to).await,
        Command::Maintenance { task } => run_maintenance(&config, task).await,
        Command::Add { url } => {
            let catalogue = Catalogue::open(&config).await;
            match catalogue.source.fetch_repository(&url).await {
                Ok(fetched) => print_json(&catalogue.reconciler.add(&url, &fetched).await),
                Err(err) => print_upstream_failure(&err),
            }
        }
        Command::Update { url } => {
            let catalogue = Catalogue::open(&config).await;
            match catalogue.source.fetch_repository(&url).await {
                Ok(fetched) => print_json(&catalogue.reconciler.update(&url, &fetched).await),
                Err(err) => print_upstream_failure(&err),
            }
        }
        Command::RefreshAll => {
            let catalogue = Catalogue::open(&config).await;
            print_json(
                &catalogue
                    .reconciler
                    .refresh_all_stored(&catalogue.source)
                    .await,
            )
        }
        Command::Remove { url } => {
            let catalogue = Catalogue::open(&config).await;
            print_json(&catalogue.reconciler.remove(&url).await)
        }
        Command::List => {
            let catalogue = Catalogue::open(&config).await;
            print_json(&catalogue.reconciler.list().await)
        }
        Command::Show { url, fresh } => Catalogue::open(&config).await.show(&url, fresh).await,
        Command::Stats => {
            let catalogue = Catalogue::open(&config).await;
            print_json(&catalogue.reconciler.technology_stats().await)
        }
        Command::Info => Catalogue::open(&config).await.info(&config).await,
    }
}

fn print_upstream_failure(err: &SourceError) -> Result<()> {
    print_json(&serde_json::json!({
        "status": "upstream_fetch_failed",
        "detail": err.to_string(),
    }))
}

/// Store, reconciler and GitHub source for the catalogue commands.
struct Catalogue {
    store: Arc<dyn RepositoryStore>,
    reconciler: Reconciler,
    source: GitHubSource,
}

impl Catalogue {
    async fn open(config: &AppConfig) -> Self {
        let store = store::connect_or_disconnected(config).await;
        Self {
            reconciler: Reconciler::new(store.clone()),
            source: GitHubSource::new(GitHubConfig::from_app_config(config)),
            store,
        }
    }

    async fn show(&self, url: &str, fresh: bool) -> Result<()> {
        let record = match self.reconciler.get(url).await {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(url, error = %err, "Failed to read repository");
                None
            }
        };
        let Some(record) = record else {
            return print_json(&serde_json::json!({
                "status": "not_found",
                "detail": url,
            }));
        };

        if !fresh {
            return print_json(&record);
        }

        let upstream = match self.source.fetch_repository(&record.repo_url).await {
            Ok(fetched) => serde_json::to_value(fetched)?,
            Err(err) => serde_json::json!({ "error": err.to_string() }),
        };
        print_json(&serde_json::json!({
            "record": record,
            "upstream": upstream,
        }))
    }

    async fn info(&self, config: &AppConfig) -> Result<()> {
        let summary = match migrate::describe(self.store.as_ref()).await {
            Ok(summary) => serde_json::to_value(summary)?,
            Err(err) => serde_json::json!({
                "backend": self.store.backend_name(),
                "error": err.to_string(),
            }),
        };
        let config_json: serde_json::Value = serde_json::from_str(&config.redacted_json()?)?;
        print_json(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "storage": summary,
            "config": config_json,
        }))
    }
}

async fn run_migrate(config: &AppConfig, to: BackendKind) -> Result<()> {
    if to == config.backend {
        bail!("source and target backend are both {}", to);
    }

    let target_config = AppConfig {
        backend: to,
        ..config.clone()
    };
    target_config
        .validate()
        .context("validating target backend configuration")?;

    let source = store::connect(config)
        .await
        .with_context(|| format!("connecting to {}", config.backend))?;
    let target = store::connect_backend(config, to)
        .await
        .with_context(|| format!("connecting to {}", to))?;

    let report = migrate::copy_between(source.as_ref(), target.as_ref())
        .await
        .context("copying repositories")?;
    print_json(&report)
}

async fn run_maintenance(config: &AppConfig, task: MaintenanceTask) -> Result<()> {
    if config.backend != BackendKind::Sqlite {
        bail!("maintenance is only available for the sqlite backend");
    }

    let conn = db::init_pool(config).await?;
    match task {
        MaintenanceTask::Vacuum => {
            db::vacuum(&conn).await?;
            print_json(&serde_json::json!({ "vacuum": "ok" }))
        }
        MaintenanceTask::Checkpoint => {
            let stats = db::checkpoint_wal(&conn).await?;
            print_json(&serde_json::json!({
                "busy": stats.busy,
                "log_frames": stats.log_frames,
                "checkpointed_frames": stats.checkpointed_frames,
            }))
        }
    }
}
