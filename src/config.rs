//! Run configuration.
//!
//! Values come from an optional config file (YAML or JSON) overlaid by
//! command-line flags. Both are first collected as a `ConfigFile`, merged
//! with `ConfigFile::overlay`, then resolved into a `RunConfig`.
//!
//! Example YAML:
//!
//! ```yaml
//! database: shop
//! limit:
//!   - "users=500"
//!   - "*=100"
//! exclude_column: ["*.password"]
//! tables:
//!   public.audit_log:
//!     skip: true
//!   public.orders:
//!     where: "created_at > now() - interval '30 days'"
//! ```

use crate::emit::{EmitOptions, TargetVersion};
use crate::error::{Result, SampleError};
use crate::rules::{LimitAction, RowOrder, RuleSet, TableOverride, TablePattern};
use crate::sample::{SamplingOptions, StagingMode, DEFAULT_SCRATCH_SCHEMA};
use postgres::config::{Host, SslMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A string or a list of strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Per-table settings under `tables:`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableConfig {
    /// Fixed row count
    pub rows: Option<u64>,
    /// Percentage of the row estimate
    pub percent: Option<f64>,
    /// Filter predicate
    #[serde(rename = "where")]
    pub predicate: Option<String>,
    /// Every row
    pub full: bool,
    /// Leave the table out
    pub skip: bool,
}

impl TableConfig {
    fn into_override(self, name: &str) -> Result<TableOverride> {
        let pattern = TablePattern::new(name)?;
        let mut actions = Vec::new();
        if let Some(rows) = self.rows {
            actions.push(LimitAction::Rows(rows));
        }
        if let Some(percent) = self.percent {
            if !(0.0..=100.0).contains(&percent) {
                return Err(SampleError::rule(
                    name,
                    "percentage must be between 0 and 100",
                ));
            }
            actions.push(LimitAction::Percent(percent));
        }
        if let Some(predicate) = self.predicate {
            actions.push(LimitAction::parse(name, &predicate)?);
        }
        if self.full {
            actions.push(LimitAction::Full);
        }

        if actions.len() > 1 {
            return Err(SampleError::rule(
                name,
                "set only one of rows, percent, where or full",
            ));
        }
        let action = actions.pop();
        if action.is_none() && !self.skip {
            return Err(SampleError::rule(
                name,
                "table override needs rows, percent, where, full or skip",
            ));
        }
        Ok(TableOverride {
            pattern,
            action,
            skip: self.skip,
        })
    }
}

/// Configuration as written in a file or given on the command line.
/// Keys mirror the long command-line flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(alias = "user")]
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "database")]
    pub dbname: Option<String>,
    pub connection_uri: Option<String>,
    pub ssl_mode: Option<String>,

    pub limit: Option<OneOrMany>,
    pub schema: Option<OneOrMany>,
    pub exclude_schema: Option<OneOrMany>,
    pub exclude_table: Option<OneOrMany>,
    pub exclude_column: Option<OneOrMany>,
    pub allow_excluded_parents: Option<bool>,

    pub ordered: Option<bool>,
    pub ordered_asc: Option<bool>,
    pub ordered_desc: Option<bool>,
    pub random: Option<bool>,
    pub seed: Option<u64>,

    #[serde(alias = "output", alias = "output_file")]
    pub file: Option<PathBuf>,
    #[serde(alias = "gzip", alias = "compression")]
    pub compress: Option<bool>,
    pub encoding: Option<String>,
    pub data_only: Option<bool>,
    pub target_version: Option<String>,

    pub staging: Option<StagingMode>,
    pub sample_schema: Option<String>,
    pub force: Option<bool>,
    pub keep: Option<bool>,

    pub verify: Option<bool>,
    pub dry_run: Option<bool>,
    pub audit_file: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub progress: Option<bool>,

    pub tables: BTreeMap<String, TableConfig>,
}

impl ConfigFile {
    /// Load a config file. Format follows the extension (`.json`,
    /// `.yaml`/`.yml`); anything else is tried as JSON, then YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SampleError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let parse_json = |text: &str| {
            serde_json::from_str::<ConfigFile>(text).map_err(|e| {
                SampleError::Config(format!("invalid JSON in {}: {}", path.display(), e))
            })
        };
        let parse_yaml = |text: &str| {
            serde_yaml_ng::from_str::<Option<ConfigFile>>(text)
                .map(Option::unwrap_or_default)
                .map_err(|e| {
                    SampleError::Config(format!("invalid YAML in {}: {}", path.display(), e))
                })
        };

        match ext.as_deref() {
            Some("json") => parse_json(&content),
            Some("yaml") | Some("yml") => parse_yaml(&content),
            _ => parse_json(&content).or_else(|_| parse_yaml(&content)),
        }
    }

    /// Values set in `over` replace ours; lists replace wholesale and
    /// table overrides merge by name
    pub fn overlay(mut self, over: ConfigFile) -> Self {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if over.$field.is_some() { self.$field = over.$field; })*
            };
        }
        take!(
            host,
            port,
            username,
            password,
            dbname,
            connection_uri,
            ssl_mode,
            limit,
            schema,
            exclude_schema,
            exclude_table,
            exclude_column,
            allow_excluded_parents,
            ordered,
            ordered_asc,
            ordered_desc,
            random,
            seed,
            file,
            compress,
            encoding,
            data_only,
            target_version,
            staging,
            sample_schema,
            force,
            keep,
            verify,
            dry_run,
            audit_file,
            log_level,
            log_file,
            progress,
        );
        self.tables.extend(over.tables);
        self
    }
}

/// Where to connect. `Debug` is hand-written so that the password never
/// reaches a log line.
#[derive(Clone, Default)]
pub struct ConnectionConfig {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,
    pub connection_uri: Option<String>,
    pub ssl_mode: String,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("dbname", &self.dbname)
            .field("connection_uri", &self.connection_uri.as_ref().map(|_| "<set>"))
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

impl ConnectionConfig {
    /// Driver configuration. A connection URI wins over individual fields.
    pub fn to_pg_config(&self) -> Result<postgres::Config> {
        let mut config = match &self.connection_uri {
            Some(uri) => uri
                .parse::<postgres::Config>()
                .map_err(|_| SampleError::Config("invalid connection URI".to_string()))?,
            None => {
                let mut config = postgres::Config::new();
                config.host(self.host.as_deref().unwrap_or("localhost"));
                config.port(self.port);
                if let Some(user) = &self.username {
                    config.user(user);
                }
                if let Some(password) = &self.password {
                    config.password(password);
                }
                if let Some(dbname) = &self.dbname {
                    config.dbname(dbname);
                }
                config
            }
        };
        config.application_name(env!("CARGO_PKG_NAME"));
        config.ssl_mode(parse_ssl_mode(&self.ssl_mode)?);
        Ok(config)
    }

    /// Host and database name for audit records; nothing else
    pub fn describe(&self) -> (Option<String>, Option<String>) {
        match self.to_pg_config() {
            Ok(config) => {
                let host = config.get_hosts().first().map(|h| match h {
                    Host::Tcp(name) => name.clone(),
                    #[cfg(unix)]
                    Host::Unix(path) => path.display().to_string(),
                });
                (host, config.get_dbname().map(str::to_string))
            }
            Err(_) => (self.host.clone(), self.dbname.clone()),
        }
    }
}

fn parse_ssl_mode(mode: &str) -> Result<SslMode> {
    match mode.to_ascii_lowercase().as_str() {
        "disable" => Ok(SslMode::Disable),
        "allow" | "prefer" | "" => Ok(SslMode::Prefer),
        "require" | "verify-ca" | "verify-full" => Ok(SslMode::Require),
        other => Err(SampleError::Config(format!(
            "unknown ssl mode '{}'; expected disable, allow, prefer, require, verify-ca or verify-full",
            other
        ))),
    }
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub connection: ConnectionConfig,
    pub limits: Vec<String>,
    pub schemas: Vec<String>,
    pub exclude_schemas: Vec<String>,
    pub exclude_tables: Vec<String>,
    pub exclude_columns: Vec<String>,
    pub allow_excluded_parents: bool,
    pub tables: BTreeMap<String, TableConfig>,
    pub ordering: RowOrder,
    pub seed: Option<u64>,
    pub output: Option<PathBuf>,
    pub compress: bool,
    pub encoding: String,
    pub data_only: bool,
    pub target_version: TargetVersion,
    pub staging: StagingMode,
    pub scratch_schema: String,
    pub force: bool,
    pub keep: bool,
    pub verify: bool,
    pub dry_run: bool,
    pub audit_file: Option<PathBuf>,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub progress: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig {
                port: 5432,
                ssl_mode: "prefer".to_string(),
                ..ConnectionConfig::default()
            },
            limits: Vec::new(),
            schemas: Vec::new(),
            exclude_schemas: Vec::new(),
            exclude_tables: Vec::new(),
            exclude_columns: Vec::new(),
            allow_excluded_parents: false,
            tables: BTreeMap::new(),
            ordering: RowOrder::None,
            seed: None,
            output: None,
            compress: false,
            encoding: "UTF8".to_string(),
            data_only: false,
            target_version: TargetVersion::CURRENT,
            staging: StagingMode::Auto,
            scratch_schema: DEFAULT_SCRATCH_SCHEMA.to_string(),
            force: false,
            keep: false,
            verify: false,
            dry_run: false,
            audit_file: None,
            log_level: "info".to_string(),
            log_file: None,
            progress: false,
        }
    }
}

impl RunConfig {
    pub fn resolve(file: ConfigFile) -> Result<Self> {
        let defaults = RunConfig::default();

        let ordering = if file.random.unwrap_or(false) {
            RowOrder::Random
        } else if file.ordered_asc.unwrap_or(false) {
            RowOrder::Ascending
        } else if file.ordered.unwrap_or(false) || file.ordered_desc.unwrap_or(false) {
            RowOrder::Descending
        } else {
            RowOrder::None
        };
        if file.seed.is_some() && ordering != RowOrder::Random {
            return Err(SampleError::Config(
                "--seed only applies together with --random".to_string(),
            ));
        }

        let target_version = match &file.target_version {
            Some(v) => v.parse().map_err(SampleError::Config)?,
            None => defaults.target_version,
        };

        let scratch_schema = file.sample_schema.unwrap_or(defaults.scratch_schema);
        if scratch_schema.trim().is_empty() {
            return Err(SampleError::Config("scratch schema name is empty".to_string()));
        }

        let list = |v: Option<OneOrMany>| v.map(OneOrMany::into_vec).unwrap_or_default();

        Ok(Self {
            connection: ConnectionConfig {
                host: file.host,
                port: file.port.unwrap_or(defaults.connection.port),
                username: file.username,
                password: file.password,
                dbname: file.dbname,
                connection_uri: file.connection_uri,
                ssl_mode: file.ssl_mode.unwrap_or(defaults.connection.ssl_mode),
            },
            limits: list(file.limit),
            schemas: list(file.schema),
            exclude_schemas: list(file.exclude_schema),
            exclude_tables: list(file.exclude_table),
            exclude_columns: list(file.exclude_column),
            allow_excluded_parents: file.allow_excluded_parents.unwrap_or(false),
            tables: file.tables,
            ordering,
            seed: file.seed,
            output: file.file,
            compress: file.compress.unwrap_or(false),
            encoding: file.encoding.unwrap_or(defaults.encoding),
            data_only: file.data_only.unwrap_or(false),
            target_version,
            staging: file.staging.unwrap_or(defaults.staging),
            scratch_schema,
            force: file.force.unwrap_or(false),
            keep: file.keep.unwrap_or(false),
            verify: file.verify.unwrap_or(false),
            dry_run: file.dry_run.unwrap_or(false),
            audit_file: file.audit_file,
            log_level: file.log_level.unwrap_or(defaults.log_level),
            log_file: file.log_file,
            progress: file.progress.unwrap_or(false),
        })
    }

    /// Compile limit, exclusion and per-table rules
    pub fn rule_set(&self) -> Result<RuleSet> {
        let mut rules = RuleSet::new().ordering(self.ordering);
        for limit in &self.limits {
            rules = rules.limit(limit)?;
        }
        for schema in &self.exclude_schemas {
            rules = rules.exclude_schema(schema)?;
        }
        for table in &self.exclude_tables {
            rules = rules.exclude_table(table)?;
        }
        for column in &self.exclude_columns {
            rules = rules.exclude_column(column)?;
        }
        for (name, table) in &self.tables {
            rules.overrides.push(table.clone().into_override(name)?);
        }
        rules.include_schemas = self.schemas.clone();
        rules.allow_excluded_parents = self.allow_excluded_parents;
        Ok(rules)
    }

    pub fn sampling_options(&self) -> SamplingOptions {
        SamplingOptions {
            staging: self.staging,
            scratch_schema: self.scratch_schema.clone(),
            force: self.force,
            keep: self.keep,
        }
    }

    pub fn emit_options(&self) -> EmitOptions {
        EmitOptions {
            data_only: self.data_only,
            encoding: self.encoding.clone(),
            target: self.target_version,
            header: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_yaml_aliases_and_tables() {
        let file = write_temp(
            ".yaml",
            r#"
database: shop
output: sample.sql.gz
limit: "users=50"
exclude_column: ["*.password"]
tables:
  public.audit_log:
    skip: true
  orders:
    where: "total > 100"
"#,
        );
        let config = RunConfig::resolve(ConfigFile::load(file.path()).unwrap()).unwrap();
        assert_eq!(config.connection.dbname.as_deref(), Some("shop"));
        assert_eq!(config.output, Some(PathBuf::from("sample.sql.gz")));
        assert_eq!(config.limits, vec!["users=50".to_string()]);

        let rules = config.rule_set().unwrap();
        assert_eq!(rules.overrides.len(), 2);
        let orders = rules.overrides.iter().find(|o| o.pattern.text == "orders").unwrap();
        assert_eq!(orders.action, Some(LimitAction::Predicate("total > 100".to_string())));
    }

    #[test]
    fn test_json_detected_without_extension() {
        let file = write_temp(".conf", r#"{"dbname": "shop", "random": true, "seed": 7}"#);
        let config = RunConfig::resolve(ConfigFile::load(file.path()).unwrap()).unwrap();
        assert_eq!(config.ordering, RowOrder::Random);
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = ConfigFile {
            dbname: Some("from_file".to_string()),
            limit: Some(OneOrMany::One("*=10".to_string())),
            ..ConfigFile::default()
        };
        let cli = ConfigFile {
            dbname: Some("from_cli".to_string()),
            ordered: Some(true),
            ..ConfigFile::default()
        };
        let config = RunConfig::resolve(file.overlay(cli)).unwrap();
        assert_eq!(config.connection.dbname.as_deref(), Some("from_cli"));
        assert_eq!(config.limits, vec!["*=10".to_string()]);
        assert_eq!(config.ordering, RowOrder::Descending);
    }

    #[test]
    fn test_conflicting_table_override() {
        let mut file = ConfigFile::default();
        file.tables.insert(
            "orders".to_string(),
            TableConfig {
                rows: Some(5),
                full: true,
                ..TableConfig::default()
            },
        );
        let config = RunConfig::resolve(file).unwrap();
        assert!(matches!(
            config.rule_set(),
            Err(SampleError::RuleValidation { .. })
        ));
    }

    #[test]
    fn test_password_never_in_debug_output() {
        let config = ConnectionConfig {
            password: Some("hunter2".to_string()),
            connection_uri: Some("postgres://u:hunter2@db/shop".to_string()),
            ..RunConfig::default().connection
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
        assert_eq!(
            config.describe(),
            (Some("db".to_string()), Some("shop".to_string()))
        );
    }

    #[test]
    fn test_seed_requires_random() {
        let file = ConfigFile {
            seed: Some(3),
            ..ConfigFile::default()
        };
        assert!(matches!(RunConfig::resolve(file), Err(SampleError::Config(_))));
    }
}
