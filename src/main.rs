//! monsoon: batch analytics pipeline stages as CLI subcommands.
//!
//! Each subcommand runs one stage adapter against the configured AWS
//! account and prints the structured outcome as JSON. A non-failure
//! outcome exits 0; a failed one exits 1.

use aws_config::BehaviorVersion;
use clap::{Parser, Subcommand, ValueEnum};
use snafu::prelude::*;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use monsoon::adapters::check::CheckRequest;
use monsoon::adapters::ingest::IngestRequest;
use monsoon::adapters::load::{LoadRequest, LoadTarget};
use monsoon::adapters::provision::AsgRequest;
use monsoon::adapters::query::QueryVariant;
use monsoon::adapters::{check, etl, ingest, load, notify, provision, query, train};
use monsoon::config::{Config, StorageConfig};
use monsoon::error::{AdapterError, ConfigSnafu, StorageSnafu};
use monsoon::outcome::Outcome;
use monsoon::services::{
    AthenaQueryEngine, AwsInfrastructure, GlueJobs, MySqlTableStore, SageMakerJobs, SnsNotifier,
};
use monsoon::signal;
use monsoon::storage::StorageProvider;

/// Batch analytics pipeline runner.
#[derive(Parser, Debug)]
#[command(name = "monsoon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file. Built-in defaults apply when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration without calling any service.
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the managed ETL job over the raw source object.
    Etl,
    /// Start the catalog crawler once processed data is present.
    Ingest {
        /// Source object name override.
        #[arg(long)]
        object: Option<String>,
    },
    /// Run a fixed query and copy its result to the stable key.
    Query {
        #[arg(long, value_enum)]
        variant: QueryVariantArg,
    },
    /// Run caller-supplied SQL and copy its result to a key.
    QuerySql {
        #[arg(long)]
        sql: String,
        /// Key the result object is copied to.
        #[arg(long)]
        key: String,
    },
    /// Create a training job and wait for it to finish.
    Train,
    /// Load a fixed query export into the relational store.
    Load {
        #[arg(long, value_enum)]
        target: LoadTargetArg,
        /// Table name override.
        #[arg(long)]
        table: Option<String>,
        /// Source object key override.
        #[arg(long)]
        key: Option<String>,
    },
    /// Create serving infrastructure (idempotent).
    Provision {
        #[command(subcommand)]
        resource: ProvisionCommand,
    },
    /// Report whether a fixed export contains any data rows.
    Check {
        /// Object key override.
        #[arg(long)]
        key: Option<String>,
    },
    /// Publish the pipeline-complete notification.
    Notify,
}

#[derive(Subcommand, Debug)]
enum ProvisionCommand {
    /// Managed database instance.
    Database,
    /// Target group in the default VPC.
    TargetGroup,
    /// Load balancer with its forwarding listener.
    LoadBalancer,
    /// Autoscaling group over the launch template.
    Asg {
        /// Comma-separated subnet ids; default-for-AZ subnets when absent.
        #[arg(long)]
        subnet_ids: Option<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum QueryVariantArg {
    MlExport,
    PropertyInsights,
    PriceRange,
}

impl From<QueryVariantArg> for QueryVariant {
    fn from(arg: QueryVariantArg) -> Self {
        match arg {
            QueryVariantArg::MlExport => QueryVariant::MlExport,
            QueryVariantArg::PropertyInsights => QueryVariant::PropertyInsights,
            QueryVariantArg::PriceRange => QueryVariant::PriceRange,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum LoadTargetArg {
    Insights,
    PriceRange,
}

impl From<LoadTargetArg> for LoadTarget {
    fn from(arg: LoadTargetArg) -> Self {
        match arg {
            LoadTargetArg::Insights => LoadTarget::Insights,
            LoadTargetArg::PriceRange => LoadTarget::PriceRange,
        }
    }
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), AdapterError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("monsoon starting");

    let config = build_config(&args)?;

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Raw bucket: {}", config.storage.raw_bucket);
        info!("Results bucket: {}", config.storage.results_bucket);
        info!("Query database: {}", config.query.database);
        info!("Crawler: {}", config.ingest.crawler);
        info!("ETL job: {}", config.etl.job_name);
        info!("Database instance: {}", config.database.instance_id);
        info!("Configuration is valid");
        return Ok(());
    }

    // Set up signal handler for graceful shutdown
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            signal::shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let outcome = dispatch(args.command, &config, &shutdown).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).unwrap_or_else(|_| outcome.message.clone())
    );

    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn dispatch(
    command: Command,
    config: &Config,
    shutdown: &CancellationToken,
) -> Result<Outcome, AdapterError> {
    let sdk = aws_config::load_defaults(BehaviorVersion::latest()).await;

    match command {
        Command::Etl => {
            let jobs = GlueJobs::new(aws_sdk_glue::Client::new(&sdk));
            Ok(etl::run(&jobs, &config.etl).await)
        }
        Command::Ingest { object } => {
            let storage = bucket_provider(&config.storage, &config.storage.raw_bucket).await?;
            let crawler = GlueJobs::new(aws_sdk_glue::Client::new(&sdk));
            Ok(ingest::run(&storage, &crawler, &config.ingest, IngestRequest { object }).await)
        }
        Command::Query { variant } => {
            let engine = AthenaQueryEngine::new(aws_sdk_athena::Client::new(&sdk));
            let results = bucket_provider(&config.storage, &config.storage.results_bucket).await?;
            Ok(query::run(&engine, &results, &config.query, variant.into(), shutdown).await)
        }
        Command::QuerySql { sql, key } => {
            let engine = AthenaQueryEngine::new(aws_sdk_athena::Client::new(&sdk));
            let results = bucket_provider(&config.storage, &config.storage.results_bucket).await?;
            Ok(query::run_sql(&engine, &results, &config.query, &sql, &key, shutdown).await)
        }
        Command::Train => {
            let jobs = SageMakerJobs::new(aws_sdk_sagemaker::Client::new(&sdk));
            let crawler = GlueJobs::new(aws_sdk_glue::Client::new(&sdk));
            let notifier = SnsNotifier::new(aws_sdk_sns::Client::new(&sdk));
            Ok(train::run(
                &jobs,
                &crawler,
                &notifier,
                &config.training,
                &config.notify,
                shutdown,
            )
            .await)
        }
        Command::Load { target, table, key } => {
            let infra = infrastructure(&sdk);
            let store = MySqlTableStore::new(&config.database.user, &config.database.password);
            let storage = bucket_provider(&config.storage, &config.storage.results_bucket).await?;
            Ok(load::run(
                &infra,
                &store,
                &storage,
                &config.database,
                &config.query,
                target.into(),
                LoadRequest { table, key },
            )
            .await)
        }
        Command::Provision { resource } => {
            let infra = infrastructure(&sdk);
            Ok(match resource {
                ProvisionCommand::Database => provision::database(&infra, &config.database).await,
                ProvisionCommand::TargetGroup => {
                    provision::target_group(&infra, &config.serving).await
                }
                ProvisionCommand::LoadBalancer => {
                    provision::load_balancer(&infra, &config.serving).await
                }
                ProvisionCommand::Asg { subnet_ids } => {
                    provision::auto_scaling_group(&infra, &config.serving, AsgRequest { subnet_ids })
                        .await
                }
            })
        }
        Command::Check { key } => {
            let storage = bucket_provider(&config.storage, &config.storage.results_bucket).await?;
            Ok(check::run(&storage, &config.query, CheckRequest { key }).await)
        }
        Command::Notify => {
            let notifier = SnsNotifier::new(aws_sdk_sns::Client::new(&sdk));
            notify::run(&notifier, &config.notify, &config.storage, &config.query).await
        }
    }
}

fn infrastructure(sdk: &aws_config::SdkConfig) -> AwsInfrastructure {
    AwsInfrastructure::new(
        aws_sdk_rds::Client::new(sdk),
        aws_sdk_ec2::Client::new(sdk),
        aws_sdk_elasticloadbalancingv2::Client::new(sdk),
        aws_sdk_autoscaling::Client::new(sdk),
    )
}

async fn bucket_provider(
    storage: &StorageConfig,
    bucket: &str,
) -> Result<StorageProvider, AdapterError> {
    StorageProvider::connect(&format!("s3://{bucket}"), storage.storage_options.clone())
        .await
        .context(StorageSnafu)
}

/// Build configuration from arguments.
fn build_config(args: &Args) -> Result<Config, AdapterError> {
    let config = match &args.config {
        Some(path) => Config::from_file(path).context(ConfigSnafu)?,
        None => Config::default(),
    };
    Ok(config)
}
