mod plan;
mod sample;

use crate::cancel::CancelToken;
use crate::config::{ConfigFile, OneOrMany, RunConfig};
use crate::sample::StagingMode;
use anyhow::Context;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "dbsample")]
#[command(version)]
#[command(
    about = "Sample a referentially consistent subset of a PostgreSQL database into a SQL script",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sample the database and write a loadable SQL script
    Sample {
        #[command(flatten)]
        args: RunArgs,

        /// Output file (default: stdout); a .gz extension compresses
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Gzip the output
        #[arg(long, visible_alias = "gzip")]
        compress: bool,

        /// client_encoding written to the script
        #[arg(short = 'E', long, env = "PGCLIENTENCODING")]
        encoding: Option<String>,

        /// Only emit data and sequence values, no definitions
        #[arg(short = 'a', long)]
        data_only: bool,

        /// Oldest server version the script must load into (e.g. 9.6, 16)
        #[arg(long)]
        target_version: Option<String>,

        /// Check every followed foreign key over the final sample
        #[arg(long)]
        verify: bool,

        /// Print the plan instead of sampling
        #[arg(long)]
        dry_run: bool,

        /// Write a JSON audit record
        #[arg(long)]
        audit_file: Option<PathBuf>,
    },

    /// Show what a run would sample, without reading any rows
    Plan {
        #[command(flatten)]
        args: RunArgs,

        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Connection, rule and staging flags shared by `sample` and `plan`
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// YAML or JSON config file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Database server host
    #[arg(long, env = "PGHOST")]
    pub host: Option<String>,

    /// Database server port
    #[arg(short, long, env = "PGPORT")]
    pub port: Option<u16>,

    /// Database user
    #[arg(short = 'U', long, env = "PGUSER")]
    pub username: Option<String>,

    /// Database password
    #[arg(short = 'W', long, env = "PGPASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Database name
    #[arg(short, long, env = "PGDATABASE")]
    pub dbname: Option<String>,

    /// Connection URI; overrides the individual connection flags
    #[arg(long)]
    pub connection_uri: Option<String>,

    /// SSL mode: disable, allow, prefer, require, verify-ca, verify-full
    #[arg(long)]
    pub ssl_mode: Option<String>,

    /// Limit rule, e.g. "users=500", "*=10%", "orders=created_at > now() - interval '1 day'"
    #[arg(long)]
    pub limit: Vec<String>,

    /// Only sample these schemas
    #[arg(long)]
    pub schema: Vec<String>,

    /// Leave out schemas matching this pattern
    #[arg(long)]
    pub exclude_schema: Vec<String>,

    /// Leave out tables matching this pattern
    #[arg(long)]
    pub exclude_table: Vec<String>,

    /// Write NULL for columns matching this pattern, e.g. "*.password"
    #[arg(long)]
    pub exclude_column: Vec<String>,

    /// Drop mandatory foreign keys into excluded tables instead of failing
    #[arg(long)]
    pub allow_excluded_parents: bool,

    /// Order rows by primary key (descending unless --ordered-asc)
    #[arg(long)]
    pub ordered: bool,

    #[arg(long, conflicts_with_all = ["ordered_desc", "random"])]
    pub ordered_asc: bool,

    #[arg(long, conflicts_with = "random")]
    pub ordered_desc: bool,

    /// Random row order
    #[arg(long, conflicts_with = "ordered")]
    pub random: bool,

    /// Seed for --random
    #[arg(long)]
    pub seed: Option<u64>,

    /// Staging mode: auto, on, off
    #[arg(long)]
    pub staging: Option<StagingMode>,

    /// Force staged sampling (same as --staging on)
    #[arg(long, conflicts_with_all = ["staging", "no_staging"])]
    pub use_staging: bool,

    /// Never stage (same as --staging off)
    #[arg(long, conflicts_with = "staging")]
    pub no_staging: bool,

    /// Scratch schema for staged sampling
    #[arg(long)]
    pub sample_schema: Option<String>,

    /// Drop an existing scratch schema of the same name
    #[arg(long)]
    pub force: bool,

    /// Keep the scratch schema after a successful run
    #[arg(long)]
    pub keep: bool,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: Option<String>,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Show progress
    #[arg(long)]
    pub progress: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn flag(set: bool) -> Option<bool> {
    set.then_some(true)
}

fn list(values: Vec<String>) -> Option<OneOrMany> {
    (!values.is_empty()).then_some(OneOrMany::Many(values))
}

impl RunArgs {
    /// Flags as a config layer; unset flags stay `None` so that the file
    /// value survives
    fn into_layer(self) -> ConfigFile {
        let staging = if self.use_staging {
            Some(StagingMode::On)
        } else if self.no_staging {
            Some(StagingMode::Off)
        } else {
            self.staging
        };
        let log_level = self
            .log_level
            .or_else(|| self.verbose.then(|| "debug".to_string()));

        ConfigFile {
            host: self.host,
            port: self.port,
            username: self.username,
            password: self.password,
            dbname: self.dbname,
            connection_uri: self.connection_uri,
            ssl_mode: self.ssl_mode,
            limit: list(self.limit),
            schema: list(self.schema),
            exclude_schema: list(self.exclude_schema),
            exclude_table: list(self.exclude_table),
            exclude_column: list(self.exclude_column),
            allow_excluded_parents: flag(self.allow_excluded_parents),
            ordered: flag(self.ordered),
            ordered_asc: flag(self.ordered_asc),
            ordered_desc: flag(self.ordered_desc),
            random: flag(self.random),
            seed: self.seed,
            staging,
            sample_schema: self.sample_schema,
            force: flag(self.force),
            keep: flag(self.keep),
            log_level,
            log_file: self.log_file,
            progress: flag(self.progress),
            ..ConfigFile::default()
        }
    }

    /// Merge the config file (if any) with these flags and the extra
    /// command-specific layer
    pub fn resolve(self, extra: ConfigFile) -> anyhow::Result<RunConfig> {
        let base = match &self.config {
            Some(path) => ConfigFile::load(path)
                .with_context(|| format!("loading config file {}", path.display()))?,
            None => ConfigFile::default(),
        };
        let merged = base.overlay(self.into_layer()).overlay(extra);
        Ok(RunConfig::resolve(merged)?)
    }
}

/// Install the tracing subscriber: stderr, plus the log file when set.
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &RunConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("invalid log level '{}'", config.log_level))?,
    };

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(file_layer)
        .try_init()
        .context("installing log subscriber")?;
    Ok(())
}

pub fn run(cli: Cli, cancel: CancelToken) -> anyhow::Result<()> {
    match cli.command {
        Commands::Sample {
            args,
            file,
            compress,
            encoding,
            data_only,
            target_version,
            verify,
            dry_run,
            audit_file,
        } => sample::run(
            args,
            file,
            compress,
            encoding,
            data_only,
            target_version,
            verify,
            dry_run,
            audit_file,
            cancel,
        ),
        Commands::Plan { args, format } => plan::run(args, &format),
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "dbsample", &mut io::stdout());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_unset_flags_keep_file_values() {
        let file = ConfigFile {
            dbname: Some("shop".to_string()),
            keep: Some(true),
            ..ConfigFile::default()
        };
        let args = RunArgs {
            no_staging: true,
            limit: vec!["users=5".to_string()],
            ..RunArgs::default()
        };
        let config = RunConfig::resolve(file.overlay(args.into_layer())).unwrap();
        assert_eq!(config.connection.dbname.as_deref(), Some("shop"));
        assert!(config.keep);
        assert_eq!(config.staging, StagingMode::Off);
        assert_eq!(config.limits, vec!["users=5".to_string()]);
    }

    #[test]
    fn test_parse_sample_flags() {
        let cli = Cli::try_parse_from([
            "dbsample",
            "sample",
            "--dbname",
            "shop",
            "--limit",
            "users=50",
            "--limit",
            "*=10",
            "--exclude-column",
            "*.password",
            "--random",
            "--seed",
            "42",
            "-f",
            "out.sql.gz",
        ])
        .unwrap();
        let Commands::Sample { args, file, .. } = cli.command else {
            panic!("expected sample command");
        };
        assert_eq!(file, Some(PathBuf::from("out.sql.gz")));
        assert_eq!(args.limit, vec!["users=50".to_string(), "*=10".to_string()]);
        assert_eq!(args.seed, Some(42));
    }
}
