//! Command-line argument parsing for the headless Bdash runner.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::dispatcher::OverwriteDecision;
use crate::error::{BdashError, Result};
use crate::format::ResultFormat;
use crate::logging::LogTarget;
use crate::model::DataSourceId;

/// Sharing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShareTarget {
    Gist,
    BdashServer,
}

/// How to treat a query that was already shared on Bdash Server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnConflict {
    /// Update the existing remote record.
    Update,
    /// Create a new remote record.
    Create,
    /// Do not share.
    Cancel,
}

impl From<OnConflict> for OverwriteDecision {
    fn from(value: OnConflict) -> Self {
        match value {
            OnConflict::Update => OverwriteDecision::Update,
            OnConflict::Create => OverwriteDecision::Create,
            OnConflict::Cancel => OverwriteDecision::Cancel,
        }
    }
}

/// Run a query through the Bdash core and print, copy or share its result.
#[derive(Parser, Debug)]
#[command(name = "bdash")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Query text
    #[arg(value_name = "SQL")]
    pub sql: String,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Data source id (defaults to the configured default)
    #[arg(short = 'd', long, value_name = "ID")]
    pub data_source: Option<u64>,

    /// 0-based cursor line selecting the statement to run
    #[arg(short = 'l', long, value_name = "N")]
    pub line: Option<usize>,

    /// Result format: json, tsv, csv or markdown
    #[arg(short = 'f', long, value_name = "FORMAT", default_value = "csv")]
    pub format: String,

    /// Copy the formatted result to the clipboard
    #[arg(long)]
    pub copy: bool,

    /// Share the query after it succeeds
    #[arg(long, value_enum, value_name = "TARGET")]
    pub share: Option<ShareTarget>,

    /// Existing Bdash Server identity of this query
    #[arg(long, value_name = "ID_HASH")]
    pub remote_id: Option<String>,

    /// Required with --remote-id when sharing on Bdash Server
    #[arg(long, value_enum, value_name = "ACTION")]
    pub on_conflict: Option<OnConflict>,

    /// Cancel the run after this many seconds (overrides config)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Write logs to a file instead of stderr (default location if no path)
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    pub log_file: Option<Option<PathBuf>>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::Config::default_path)
    }

    pub fn data_source_id(&self) -> Option<DataSourceId> {
        self.data_source.map(DataSourceId::new)
    }

    pub fn result_format(&self) -> Result<ResultFormat> {
        self.format.parse()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    pub fn log_target(&self) -> LogTarget {
        match &self.log_file {
            None => LogTarget::Stderr,
            Some(None) => LogTarget::default_file(),
            Some(Some(path)) => LogTarget::File(path.clone()),
        }
    }

    /// Checks combinations clap cannot express.
    pub fn validate(&self) -> Result<()> {
        self.result_format()?;

        if self.timeout == Some(0) {
            return Err(BdashError::config("--timeout must be at least 1 second"));
        }

        if self.share == Some(ShareTarget::BdashServer)
            && self.remote_id.is_some()
            && self.on_conflict.is_none()
        {
            return Err(BdashError::config(
                "--remote-id with --share bdash-server requires --on-conflict update|create|cancel",
            ));
        }
        Ok(())
    }
}
