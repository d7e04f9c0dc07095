//! Gmail bulk label sweep
//!
//! Applies one label change (by default: remove `UNREAD`) to every message
//! matching a Gmail search query.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 with token caching; the consent redirect is
//!   captured by a one-shot local callback server
//! - **Listing**: a single producer walks the paginated search results and
//!   feeds a bounded job queue
//! - **Mutation**: a fixed pool of workers drains the queue concurrently and
//!   applies the label change to each message
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_sweep::{auth, client::ProductionMailboxClient, config::Config};
//! use gmail_sweep::pipeline::{Pipeline, PipelineOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".gmail-sweep/token.json".as_ref(),
//!         &config.auth,
//!     )
//!     .await?;
//!
//!     let client = Arc::new(ProductionMailboxClient::new(hub, config.pipeline.page_size));
//!     let pipeline = Pipeline::new(client, config.labels.clone(), PipelineOptions::from(&config))?;
//!     let report = pipeline.run(&config.query.filter).await?;
//!     println!("modified {} messages", report.succeeded());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authorization and Gmail API initialization
//! - [`callback`] - One-shot HTTP listener for the authorization redirect
//! - [`client`] - Mailbox client trait and Gmail implementation
//! - [`cli`] - Command-line interface and sweep orchestration
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`models`] - Core data structures
//! - [`pipeline`] - Producer, worker pool and run coordination
//! - [`stopwatch`] - Elapsed-time measurement for progress logs

pub mod auth;
pub mod callback;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod stopwatch;

// Re-export commonly used types for convenience
pub use error::{GmailError, Result};

pub use models::{FailedItem, ItemOutcome, LabelChange, MessagePage, PipelineReport, WorkerSummary};

pub use callback::{CallbackServer, CallbackState};

pub use client::{DryRunClient, MailboxClient, ProductionMailboxClient};

pub use config::{AuthConfig, Config, ExecutionConfig, PipelineConfig, QueryConfig};

pub use pipeline::{Pipeline, PipelineOptions, Producer, WorkerPool};

pub use cli::{Cli, Commands, RunOverrides};
