//! crd-migrator CLI library

pub mod config;
pub mod driver;
pub mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Copy custom resources from one API group/version to another
#[derive(Parser, Debug)]
#[command(name = "crd-migrator")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// API group/version to migrate from (e.g. "old.example.com/v1")
    #[arg(long)]
    pub from: Option<String>,

    /// API group/version to migrate to (e.g. "new.example.com/v1")
    #[arg(long)]
    pub to: Option<String>,

    /// Only migrate these resources (plural names)
    #[arg(long, value_delimiter = ',')]
    pub resources: Vec<String>,

    /// Namespace renames as "old:new"
    #[arg(long, value_delimiter = ',')]
    pub namespace_mappings: Vec<String>,

    /// Label key substring rewrites as "find:replace", applied in order
    #[arg(long, value_delimiter = ',')]
    pub label_mappings: Vec<String>,

    /// Annotation key substring rewrites as "find:replace", applied in order
    #[arg(long, value_delimiter = ',')]
    pub annotation_mappings: Vec<String>,

    /// Owner relationships as "owner:dependent"; owners are migrated first
    /// and dependents' ownerReferences are pointed at the new owners
    #[arg(long, value_delimiter = ',')]
    pub update_owner_refs: Vec<String>,

    /// Path to kubeconfig (defaults to in-cluster config, then KUBECONFIG)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Maximum sustained API requests per second
    #[arg(long)]
    pub qps: Option<f32>,

    /// Maximum API request burst
    #[arg(long)]
    pub burst: Option<u32>,

    /// Seconds between passes; runs a single pass when omitted
    #[arg(long)]
    pub interval: Option<u64>,

    /// YAML file providing any of the options above
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Log level filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Run the migration
    pub async fn run(self) -> Result<()> {
        let settings = config::Settings::from_cli(&self)?;
        driver::run(settings).await
    }
}
