//! Command-line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::auth;
use crate::client::{DryRunClient, MailboxClient, ProductionMailboxClient};
use crate::config::Config;
use crate::error::Result;
use crate::models::PipelineReport;
use crate::pipeline::{Pipeline, PipelineOptions};

#[derive(Parser, Debug)]
#[command(name = "gmail-sweep")]
#[command(version = "0.1.0")]
#[command(about = "Bulk label changes over Gmail search results", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-sweep/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authorize access and cache the credential
    Auth {
        /// Force re-authorization even if a token is cached
        #[arg(long)]
        force: bool,
    },

    /// Apply the configured label change to every matching message
    Run {
        #[command(flatten)]
        overrides: RunOverrides,

        /// Write a JSON report of the run to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Command-line settings that take precedence over the config file
#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOverrides {
    /// Gmail search query selecting the messages to change
    #[arg(short, long)]
    pub query: Option<String>,

    /// Number of concurrent workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Capacity of the job queue between listing and workers
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// List matching messages without modifying them
    #[arg(long)]
    pub dry_run: bool,
}

impl RunOverrides {
    /// Merge into `config` and re-validate the result
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(query) = &self.query {
            config.query.filter = query.clone();
        }
        if let Some(workers) = self.workers {
            config.pipeline.workers = workers;
        }
        if let Some(capacity) = self.queue_capacity {
            config.pipeline.queue_capacity = capacity;
        }
        if self.dry_run {
            config.execution.dry_run = true;
        }
        config.validate()
    }
}

impl From<&Config> for PipelineOptions {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.pipeline.workers,
            queue_capacity: config.pipeline.queue_capacity,
            collect_outcomes: config.execution.collect_outcomes,
        }
    }
}

/// Run one sweep against `client` with the settings in `config`
pub async fn run_with_client<C>(client: C, config: &Config) -> Result<PipelineReport>
where
    C: MailboxClient + 'static,
{
    let pipeline = Pipeline::new(
        Arc::new(client),
        config.labels.clone(),
        PipelineOptions::from(config),
    )?;
    pipeline.run(&config.query.filter).await
}

/// Load config, authorize and run the sweep
pub async fn run_sweep(
    cli: &Cli,
    overrides: &RunOverrides,
    report_path: Option<&PathBuf>,
) -> Result<PipelineReport> {
    let mut config = Config::load(&cli.config).await?;
    overrides.apply(&mut config)?;
    info!("Configuration loaded from {:?}", cli.config);

    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache, &config.auth).await?;
    let client = ProductionMailboxClient::new(hub, config.pipeline.page_size);
    info!("Listing up to {} messages per page", client.page_size());

    let report = if config.execution.dry_run {
        info!("Dry run: messages will be listed but not modified");
        run_with_client(DryRunClient::new(client), &config).await?
    } else {
        run_with_client(client, &config).await?
    };

    if let Some(path) = report_path {
        report.save(path).await?;
        info!("Report written to {:?}", path);
    }

    Ok(report)
}
