use anyhow::Context;
use clap::{Parser, Subcommand};
use pghealth::checker::HealthChecker;
use pghealth::cluster::HostIdentity;
use pghealth::config::ClusterConfig;
use pghealth::context::{
    DEFAULT_BLOAT_PERCENTAGE_THRESHOLD, DEFAULT_REMAINING_PERCENTAGE_THRESHOLD,
};
use pghealth::queries::QueryCatalog;
use pghealth::reporter::{ReportFormat, Reporter};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// PostgreSQL Health Checker - Runs schema and index diagnostics across a primary and its replicas
#[derive(Parser, Debug)]
#[command(name = "pghealth")]
#[command(version = "0.1.0")]
#[command(about = "Cluster-aware PostgreSQL health diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value = "markdown")]
    format: ReportFormat,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a single cluster
    Check {
        /// Cluster member as host[:port]; repeat or comma-separate for replicas
        #[arg(
            short = 'H',
            long = "host",
            env = "POSTGRES_HOSTS",
            value_delimiter = ',',
            default_value = "localhost:5432"
        )]
        hosts: Vec<HostIdentity>,

        /// Database name
        #[arg(short = 'd', long = "database", env = "POSTGRES_DATABASE")]
        database: String,

        /// Username
        #[arg(short = 'u', long = "username", env = "POSTGRES_USER")]
        username: String,

        /// Password
        #[arg(short = 'p', long = "password", env = "POSTGRES_PASSWORD")]
        password: String,

        /// Schema to check
        #[arg(short = 's', long = "schema", env = "POSTGRES_SCHEMA", default_value = "public")]
        schema: String,

        /// Minimum bloat percentage reported by the bloat diagnostics
        #[arg(long = "bloat-threshold", default_value_t = DEFAULT_BLOAT_PERCENTAGE_THRESHOLD)]
        bloat_threshold: f64,

        /// Remaining-values percentage under which a sequence is reported
        #[arg(long = "remaining-threshold", default_value_t = DEFAULT_REMAINING_PERCENTAGE_THRESHOLD)]
        remaining_threshold: f64,

        /// Per-host query timeout in seconds
        #[arg(long = "query-timeout", default_value = "30")]
        query_timeout: u64,

        /// Directory of *.sql files overriding the built-in queries
        #[arg(long = "queries-dir")]
        queries_dir: Option<PathBuf>,
    },
    /// Check multiple clusters from a YAML config file
    Config {
        /// Path to YAML config file
        #[arg(short = 'c', long = "config")]
        config_path: String,
    },
    /// List every diagnostic without connecting anywhere
    Diagnostics,
    /// Verify that a directory provides a query for every diagnostic
    ValidateQueries {
        /// Directory of *.sql files
        #[arg(long = "queries-dir")]
        queries_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let reporter = Reporter::new(cli.format);
    match cli.command {
        Commands::Check {
            hosts,
            database,
            username,
            password,
            schema,
            bloat_threshold,
            remaining_threshold,
            query_timeout,
            queries_dir,
        } => {
            let mut config =
                ClusterConfig::from_connection_params(hosts, database, username, password, schema);
            config.bloat_percentage_threshold = bloat_threshold;
            config.remaining_percentage_threshold = remaining_threshold;
            config.query_timeout_secs = query_timeout;
            config.queries_dir = queries_dir;
            config.validate()?;
            check_cluster(&config, &reporter).await?;
        }
        Commands::Config { config_path } => {
            info!("Loading config from: {}", config_path);
            let configs = ClusterConfig::from_config_file(&config_path)?;

            let mut failed = Vec::new();
            for config in &configs {
                if let Err(err) = check_cluster(config, &reporter).await {
                    error!("{:#}", err);
                    failed.push(config.display_name());
                }
            }
            if !failed.is_empty() {
                anyhow::bail!(
                    "{} of {} cluster(s) could not be checked: {}",
                    failed.len(),
                    configs.len(),
                    failed.join(", ")
                );
            }
        }
        Commands::Diagnostics => {
            reporter.report_catalog()?;
        }
        Commands::ValidateQueries { queries_dir } => {
            let catalog = QueryCatalog::from_dir(&queries_dir)?;
            let missing = catalog.missing();
            if !missing.is_empty() {
                for diagnostic in &missing {
                    warn!("No query for {}", diagnostic);
                }
                anyhow::bail!(
                    "{} is missing queries for {} diagnostic(s): {}",
                    queries_dir.display(),
                    missing.len(),
                    missing
                        .iter()
                        .map(|d| d.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            println!(
                "{} queries loaded from {}, every diagnostic is covered",
                catalog.len(),
                queries_dir.display()
            );
        }
    }

    Ok(())
}

async fn check_cluster(config: &ClusterConfig, reporter: &Reporter) -> anyhow::Result<()> {
    let name = config.display_name();
    info!("Checking cluster: {}", name);

    let checker = HealthChecker::new(config.hosts.clone(), Arc::new(config.connection_factory()))
        .with_queries(config.query_catalog()?)
        .with_query_timeout(config.query_timeout())
        .with_cluster_name(name.clone());
    let ctx = config.schema_context()?;

    let report = checker
        .log_all_until(&config.exclusions, &ctx, async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await
        .with_context(|| format!("health check of {} failed", name))?;

    reporter.report(&report)?;
    Ok(())
}
