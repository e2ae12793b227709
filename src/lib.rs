//! monsoon: serverless-style batch analytics pipeline stages as a CLI.
//!
//! Each subcommand is one pipeline stage adapter: trigger the ETL job,
//! start the catalog crawler over processed data, run a fixed query and
//! pin its result to a stable key, train a model and wait for it, load an
//! export into the relational store, provision serving infrastructure, or
//! publish the completion notification. Every stage returns a structured
//! [`Outcome`](outcome::Outcome) the invoker can act on.
//!
//! # Example
//!
//! ```ignore
//! use monsoon::adapters::query::{self, QueryVariant};
//! use monsoon::config::Config;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(
//! #     engine: &dyn monsoon::services::QueryEngine,
//! #     results: &monsoon::storage::StorageProvider,
//! # ) {
//! let config = Config::default();
//! let outcome = query::run(
//!     engine,
//!     results,
//!     &config.query,
//!     QueryVariant::MlExport,
//!     &CancellationToken::new(),
//! )
//! .await;
//! assert!(outcome.is_success());
//! # }
//! ```

pub mod adapters;
pub mod config;
pub mod error;
pub mod outcome;
pub mod poll;
pub mod services;
pub mod signal;
pub mod storage;

// Re-export main types
pub use config::Config;
pub use outcome::{Outcome, OutcomeStatus, Provisioned};
pub use storage::StorageProvider;
