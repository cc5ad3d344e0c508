use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mesa_core::SystemClock;
use mesa_core::model::AccessWrite;
use mesa_server::cli::{Cli, Command};
use mesa_server::config::{AppConfig, LogFormat};
use mesa_server::error::ApiError;
use mesa_server::metrics::Metrics;
use mesa_server::service::AccessService;
use mesa_storage::{AccessStore, InMemoryStore, PostgresStore};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const EXIT_DENIED: u8 = 2;

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    // stdout carries command output, so logs go to stderr.
    let registry = tracing_subscriber::registry().with(filter);

    match config.log.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr);
            registry.with(fmt_layer).init();
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr);
            registry.with(fmt_layer).init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config);

    let metrics = Arc::new(Metrics::new());
    let outcome = match cli.fixture.as_deref() {
        Some(path) => {
            let writes = read_writes(path)?;
            let store = Arc::new(InMemoryStore::new());
            let service = build_service(store, &config, Arc::clone(&metrics));
            service.apply(&writes).await?;
            tracing::info!(fixture = %path.display(), writes = writes.len(), "seeded in-memory store");
            run(&service, cli.command, None, &config).await
        }
        None => {
            let store = Arc::new(PostgresStore::connect_lazy(
                &config.database.url,
                config.database.max_connections,
                config.store_timeout(),
            )?);
            let service = build_service(Arc::clone(&store), &config, Arc::clone(&metrics));
            run(&service, cli.command, Some(store.as_ref()), &config).await
        }
    };

    if cli.metrics {
        eprint!("{}", metrics.render_prometheus());
    }

    Ok(outcome?)
}

fn build_service<S: AccessStore>(
    store: Arc<S>,
    config: &AppConfig,
    metrics: Arc<Metrics>,
) -> AccessService<S> {
    AccessService::from_config(store, config, Arc::new(SystemClock), metrics)
}

fn read_writes(path: &Path) -> Result<Vec<AccessWrite>, ApiError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

async fn run<S: AccessStore>(
    service: &AccessService<S>,
    command: Command,
    postgres: Option<&PostgresStore>,
    config: &AppConfig,
) -> Result<ExitCode, ApiError> {
    let sweeper = service.start_sweeper(config);
    let outcome = execute(service, command, postgres).await;
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    outcome
}

async fn execute<S: AccessStore>(
    service: &AccessService<S>,
    command: Command,
    postgres: Option<&PostgresStore>,
) -> Result<ExitCode, ApiError> {
    match command {
        Command::Migrate => {
            match postgres {
                Some(store) => {
                    tracing::info!("running database migrations");
                    store.migrate().await?;
                    tracing::info!("migrations completed successfully");
                }
                None => tracing::info!("in-memory store needs no migrations"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Check {
            tenant,
            user,
            module,
            operation,
        } => {
            let allowed = service.has_access(&user, &tenant, &module, operation).await?;
            println!("{}", if allowed { "allow" } else { "deny" });
            Ok(if allowed {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_DENIED)
            })
        }
        Command::Permissions { tenant, user } => {
            let access = service.resolve(&user, &tenant).await?;
            println!("{}", serde_json::to_string_pretty(&*access)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Seed { file } => {
            let writes = read_writes(&file)?;
            let revision = service.apply(&writes).await?;
            println!("applied {} writes at revision {revision}", writes.len());
            Ok(ExitCode::SUCCESS)
        }
    }
}
