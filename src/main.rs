use anyhow::{Context, Result};
use catalog_indexer::{
    attributes::{AttributeCacheBuilder, AttributeCacheStore, CacheError, LocalePreference},
    config::{Config, ObservabilityConfig},
    context::JobContext,
    error::AppError,
    metrics::{MetricsSink, NoopMetrics, PrometheusMetrics},
    reindex::{ReindexError, ReindexManager, ReindexOptions, ReindexVerifier},
    search::{IndexNaming, ListingIndexer, OpenSearchClient, SearchBackend},
    state::{create_repository, CatalogRepository},
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Exit code when verification rejects an index
const EXIT_INVALID: u8 = 2;

#[derive(Parser)]
#[command(name = "catalog-indexer", version)]
#[command(about = "Attribute cache and search index maintenance for the marketplace catalog", long_about = None)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "CATALOG_INDEXER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the inactive index version and switch the alias to it
    Reindex {
        /// Listings per bulk request during a full rebuild
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Wall-clock budget for the whole run
        #[arg(short, long)]
        timeout_secs: Option<u64>,
    },

    /// Verify the live index or an explicit version; exits 2 when invalid
    Verify {
        /// `current`, `v1`, `v2` or a physical index name
        #[arg(short, long, default_value = "current")]
        target: String,
    },

    /// Bind the alias back to an earlier version
    Rollback {
        #[arg(value_name = "VERSION")]
        target: String,
    },

    /// Show the alias binding and both index versions
    Status,

    /// Check search engine cluster health
    Health,

    /// Attribute cache maintenance
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Index one listing into the live alias
    Index {
        #[arg(value_name = "LISTING_ID")]
        id: i64,
    },

    /// Remove one listing from the live alias
    Unindex {
        #[arg(value_name = "LISTING_ID")]
        id: i64,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Rebuild the cache for every listing with attributes
    Populate {
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Rebuild the cache for the given listings
    Refresh {
        #[arg(value_name = "LISTING_ID", required = true)]
        ids: Vec<i64>,
    },

    /// Drop the cache rows of the given listings
    Invalidate {
        #[arg(value_name = "LISTING_ID", required = true)]
        ids: Vec<i64>,
    },

    /// Print the cached attributes of one listing
    Show {
        #[arg(value_name = "LISTING_ID")]
        id: i64,
    },
}

/// Wired components shared by all commands
struct App {
    config: Config,
    backend: Arc<dyn SearchBackend>,
    cache: AttributeCacheStore,
    indexer: ListingIndexer,
    manager: ReindexManager,
    prometheus: Option<Arc<PrometheusMetrics>>,
}

impl App {
    async fn build(config: Config) -> Result<Self> {
        let prometheus = if config.observability.prometheus_enabled {
            Some(Arc::new(PrometheusMetrics::new()?))
        } else {
            None
        };
        let metrics: Arc<dyn MetricsSink> = match &prometheus {
            Some(prometheus) => prometheus.clone() as Arc<dyn MetricsSink>,
            None => NoopMetrics::shared(),
        };

        let repository: Arc<dyn CatalogRepository> = create_repository(&config.database)
            .await
            .context("Failed to initialize catalog repository")?;
        let backend: Arc<dyn SearchBackend> = Arc::new(
            OpenSearchClient::new(&config.search).map_err(AppError::from)?,
        );

        let builder = AttributeCacheBuilder::new(
            repository.clone(),
            LocalePreference::from(&config.attributes),
        );
        let cache = AttributeCacheStore::new(repository.clone(), builder, metrics.clone());
        let indexer = ListingIndexer::new(
            repository.clone(),
            cache.clone(),
            backend.clone(),
            IndexNaming::new(&config.search.alias),
            metrics.clone(),
        );
        let verifier = Arc::new(ReindexVerifier::new(
            repository.clone(),
            backend.clone(),
            config.reindex.sanity_queries.clone(),
            metrics.clone(),
        ));
        let manager = ReindexManager::new(
            indexer.clone(),
            backend.clone(),
            repository,
            verifier,
            ReindexOptions::from(&config.reindex),
            metrics,
        );

        Ok(Self {
            config,
            backend,
            cache,
            indexer,
            manager,
            prometheus,
        })
    }

    /// Context bounded by `timeout` and cancelled on Ctrl-C
    fn job_context(&self, timeout: Duration) -> JobContext {
        let ctx = JobContext::with_timeout(timeout);
        let token = ctx.cancel_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling job");
                token.cancel();
            }
        });
        ctx
    }

    fn flush_metrics(&self) {
        let (Some(prometheus), Some(path)) = (
            &self.prometheus,
            &self.config.observability.metrics_textfile,
        ) else {
            return;
        };
        if let Err(e) = prometheus.write_textfile(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write metrics textfile");
        }
    }
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("catalog_indexer={}", config.log_level)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config =
        Config::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Commands::Reindex {
        batch_size: Some(batch_size),
        ..
    } = &cli.command
    {
        config.reindex.batch_size = *batch_size;
    }
    init_tracing(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        alias = %config.search.alias,
        backend = ?config.database.backend,
        "Starting catalog indexer"
    );

    let app = App::build(config).await?;
    let result = run(&app, cli.command).await;
    app.flush_metrics();
    result
}

async fn run(app: &App, command: Commands) -> Result<ExitCode> {
    let reindex_config = &app.config.reindex;

    match command {
        Commands::Reindex { timeout_secs, .. } => {
            let timeout = timeout_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| reindex_config.timeout());
            let ctx = app.job_context(timeout);

            match app.manager.run(&ctx).await {
                Ok(outcome) => print_json(&outcome)?,
                Err(ReindexError::VerificationFailed(result)) => {
                    print_json(&result)?;
                    eprintln!("Verification failed, alias unchanged");
                    return Ok(ExitCode::from(EXIT_INVALID));
                }
                Err(e) => return Err(AppError::from(e)).context("Reindex failed"),
            }
        }

        Commands::Verify { target } => {
            let ctx = app.job_context(reindex_config.timeout());
            let result = app
                .manager
                .verify(&ctx, Some(&target))
                .await
                .map_err(AppError::from)?;
            print_json(&result)?;
            if !result.valid {
                return Ok(ExitCode::from(EXIT_INVALID));
            }
        }

        Commands::Rollback { target } => {
            let ctx = app.job_context(app.config.search.request_timeout() * 4);
            let outcome = app
                .manager
                .rollback(&ctx, &target)
                .await
                .map_err(AppError::from)
                .context("Rollback failed")?;
            print_json(&outcome)?;
        }

        Commands::Status => {
            let ctx = app.job_context(app.config.search.request_timeout() * 4);
            let status = app.manager.status(&ctx).await.map_err(AppError::from)?;
            print_json(&status)?;
        }

        Commands::Health => {
            let health = app.backend.cluster_health().await.map_err(AppError::from)?;
            print_json(&health)?;
            if !health.is_available() {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Cache { command } => return run_cache(app, command).await,

        Commands::Index { id } => {
            let outcome = app.indexer.index_listing(id).await?;
            println!("listing {}: {:?}", id, outcome);
        }

        Commands::Unindex { id } => {
            let removed = app.indexer.delete_listing(id).await?;
            println!("listing {}: {}", id, if removed { "removed" } else { "not indexed" });
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn run_cache(app: &App, command: CacheCommands) -> Result<ExitCode> {
    let cache_result = match command {
        CacheCommands::Populate { batch_size } => {
            let ctx = app.job_context(app.config.reindex.timeout());
            let batch_size = batch_size.unwrap_or(app.config.reindex.cache_batch_size);
            app.cache.populate_all(&ctx, batch_size).await
        }
        CacheCommands::Refresh { ids } => app.cache.bulk_upsert(&ids).await,
        CacheCommands::Invalidate { ids } => {
            let removed = app
                .cache
                .invalidate_many(&ids)
                .await
                .map_err(AppError::from)?;
            println!("{} of {} cache rows invalidated", removed, ids.len());
            return Ok(ExitCode::SUCCESS);
        }
        CacheCommands::Show { id } => {
            let entry = app.cache.get(id).await.map_err(AppError::from)?;
            print_json(&entry)?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    match cache_result {
        Ok(report) => {
            print_json(&report)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(CacheError::PartialFailure(report)) => {
            print_json(&report)?;
            eprintln!("Attribute cache: {}", report.summary());
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(AppError::from(e)).context("Attribute cache command failed"),
    }
}
