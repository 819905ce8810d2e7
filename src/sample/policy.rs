//! Strategy selection between direct and staged sampling.

use crate::catalog::Catalog;
use serde::{Deserialize, Serialize};

/// Above this many tables, auto mode stages
pub const STAGING_TABLE_THRESHOLD: usize = 50;

/// Above this many foreign keys per table on average, auto mode stages
pub const STAGING_FK_RATIO_THRESHOLD: f64 = 5.0;

/// User choice for `--staging`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingMode {
    #[default]
    Auto,
    On,
    Off,
}

impl std::str::FromStr for StagingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(StagingMode::Auto),
            "on" | "true" | "yes" => Ok(StagingMode::On),
            "off" | "false" | "no" => Ok(StagingMode::Off),
            _ => Err(format!(
                "Unknown staging mode: {}. Valid options: auto, on, off",
                s
            )),
        }
    }
}

impl std::fmt::Display for StagingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StagingMode::Auto => write!(f, "auto"),
            StagingMode::On => write!(f, "on"),
            StagingMode::Off => write!(f, "off"),
        }
    }
}

/// Sampling strategy actually used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Live queries, closure through batched key lookups
    Direct,
    /// Scratch tables, closure through anti-joins
    Staged,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Direct => write!(f, "direct"),
            Strategy::Staged => write!(f, "staged"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyPolicy {
    pub mode: StagingMode,
}

impl StrategyPolicy {
    pub fn new(mode: StagingMode) -> Self {
        Self { mode }
    }

    pub fn choose(&self, catalog: &Catalog) -> Strategy {
        match self.mode {
            StagingMode::On => Strategy::Staged,
            StagingMode::Off => Strategy::Direct,
            StagingMode::Auto => {
                let tables = catalog.len();
                let fk_ratio = if tables == 0 {
                    0.0
                } else {
                    catalog.foreign_key_count() as f64 / tables as f64
                };
                if tables > STAGING_TABLE_THRESHOLD || fk_ratio > STAGING_FK_RATIO_THRESHOLD {
                    Strategy::Staged
                } else {
                    Strategy::Direct
                }
            }
        }
    }

    /// Whether a failed scratch setup may fall back to direct mode
    pub fn may_fall_back(&self) -> bool {
        self.mode != StagingMode::On
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, Table};

    fn catalog_with(tables: usize) -> Catalog {
        let mut catalog = Catalog::new();
        for i in 0..tables {
            catalog.add_table(
                Table::new("public", format!("t{}", i)).column(Column::new("id", "integer")),
            );
        }
        catalog
    }

    #[test]
    fn test_auto_stages_large_catalogs() {
        let policy = StrategyPolicy::new(StagingMode::Auto);
        assert_eq!(policy.choose(&catalog_with(50)), Strategy::Direct);
        assert_eq!(policy.choose(&catalog_with(51)), Strategy::Staged);
    }

    #[test]
    fn test_forced_modes_ignore_size() {
        assert_eq!(
            StrategyPolicy::new(StagingMode::On).choose(&catalog_with(1)),
            Strategy::Staged
        );
        assert_eq!(
            StrategyPolicy::new(StagingMode::Off).choose(&catalog_with(500)),
            Strategy::Direct
        );
        assert!(!StrategyPolicy::new(StagingMode::On).may_fall_back());
    }

    #[test]
    fn test_parse_staging_mode() {
        assert_eq!("AUTO".parse::<StagingMode>().unwrap(), StagingMode::Auto);
        assert_eq!("off".parse::<StagingMode>().unwrap(), StagingMode::Off);
        assert!("sometimes".parse::<StagingMode>().is_err());
    }
}
