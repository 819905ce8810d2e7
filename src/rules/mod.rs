//! Rule engine: turns limit and exclusion directives into a `SamplingPlan`.
//!
//! Limit rules resolve first-match-wins in the order given, with per-table
//! overrides checked before any pattern rule and an implicit `*` rule
//! (100 rows) behind all of them. Exclusions are checked independently in
//! a fixed order: schema, then table, then column. A column exclusion only
//! nulls values; it never removes a table.
//!
//! Resolution is a pure function of the catalog and the rule set, so
//! resolving twice yields equal plans.

pub mod limit;
pub mod pattern;

pub use limit::{LimitAction, LimitRule};
pub use pattern::{ColumnPattern, SchemaPattern, TablePattern};

use crate::catalog::{Catalog, Partitioning, Table, TableId};
use crate::error::{Result, SampleError};
use serde::Serialize;

/// Default row cap for tables no rule matches
pub const DEFAULT_ROW_LIMIT: u64 = 100;

/// Row ordering within a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowOrder {
    /// Whatever order the source returns
    #[default]
    None,
    /// Primary key (or physical row identity) ascending
    Ascending,
    /// Primary key (or physical row identity) descending
    Descending,
    Random,
}

impl std::str::FromStr for RowOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(RowOrder::None),
            "asc" | "ascending" => Ok(RowOrder::Ascending),
            "desc" | "descending" => Ok(RowOrder::Descending),
            "random" => Ok(RowOrder::Random),
            _ => Err(format!(
                "Unknown ordering: {}. Valid options: none, asc, desc, random",
                s
            )),
        }
    }
}

/// Per-table override from the configuration file
#[derive(Debug, Clone)]
pub struct TableOverride {
    pub pattern: TablePattern,
    /// Limit to apply (None with `skip` set)
    pub action: Option<LimitAction>,
    /// Exclude the table entirely
    pub skip: bool,
}

/// The compiled rule set
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub limits: Vec<LimitRule>,
    pub overrides: Vec<TableOverride>,
    pub exclude_schemas: Vec<SchemaPattern>,
    pub exclude_tables: Vec<TablePattern>,
    pub exclude_columns: Vec<ColumnPattern>,
    /// Only these schemas are sampled (all when empty)
    pub include_schemas: Vec<String>,
    pub ordering: RowOrder,
    pub default_action: LimitAction,
    /// Drop mandatory foreign keys into excluded tables instead of failing
    pub allow_excluded_parents: bool,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            limits: Vec::new(),
            overrides: Vec::new(),
            exclude_schemas: Vec::new(),
            exclude_tables: Vec::new(),
            exclude_columns: Vec::new(),
            include_schemas: Vec::new(),
            ordering: RowOrder::None,
            default_action: LimitAction::Rows(DEFAULT_ROW_LIMIT),
            allow_excluded_parents: false,
        }
    }
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one or more comma-separated limit rules
    pub fn limit(mut self, text: &str) -> Result<Self> {
        self.limits.extend(LimitRule::parse_list(text)?);
        Ok(self)
    }

    pub fn exclude_schema(mut self, text: &str) -> Result<Self> {
        self.exclude_schemas.push(SchemaPattern::new(text)?);
        Ok(self)
    }

    pub fn exclude_table(mut self, text: &str) -> Result<Self> {
        self.exclude_tables.push(TablePattern::new(text)?);
        Ok(self)
    }

    pub fn exclude_column(mut self, text: &str) -> Result<Self> {
        self.exclude_columns.push(ColumnPattern::new(text)?);
        Ok(self)
    }

    pub fn ordering(mut self, ordering: RowOrder) -> Self {
        self.ordering = ordering;
        self
    }
}

/// Which directive produced a table's limit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "rule", rename_all = "snake_case")]
pub enum RuleSource {
    Override(String),
    Rule(String),
    Default,
}

/// Resolved sampling decision for one table
#[derive(Debug, Clone, PartialEq)]
pub struct TablePlan {
    pub table: TableId,
    pub action: LimitAction,
    /// Concrete row cap (None = no cap)
    pub cap: Option<u64>,
    /// Column positions rendered as NULL, sorted
    pub excluded_columns: Vec<usize>,
    pub ordering: RowOrder,
    pub source: RuleSource,
    /// Foreign keys (constraint positions) neither followed nor emitted
    pub dropped_foreign_keys: Vec<usize>,
}

impl TablePlan {
    pub fn predicate(&self) -> Option<&str> {
        match &self.action {
            LimitAction::Predicate(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_excluded(&self, column: usize) -> bool {
        self.excluded_columns.binary_search(&column).is_ok()
    }

    /// Upper bound on rows selected before closure
    pub fn estimated_rows(&self, row_estimate: u64) -> u64 {
        match self.cap {
            Some(cap) => cap.min(row_estimate),
            None => row_estimate,
        }
    }

    /// Per-column exclusion mask in table column order
    pub fn exclusion_mask(&self, column_count: usize) -> Vec<bool> {
        (0..column_count).map(|c| self.is_excluded(c)).collect()
    }
}

/// Why a table is left out
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "rule", rename_all = "snake_case")]
pub enum Exclusion {
    NotIncluded,
    Schema(String),
    Table(String),
    Override(String),
    ParentExcluded,
}

/// Decision for one table
#[derive(Debug, Clone, PartialEq)]
pub enum TableDecision {
    /// Sampled on its own
    Sampled(TablePlan),
    /// Partition whose rows are sampled through its parent
    Partition { parent: TableId },
    Excluded(Exclusion),
}

/// Directive kind, for match accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Limit,
    Override,
    ExcludeSchema,
    ExcludeTable,
    ExcludeColumn,
}

/// How many tables a directive matched
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleMatch {
    pub rule: String,
    pub kind: RuleKind,
    pub matches: usize,
}

/// Resolved plan for every table in the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingPlan {
    /// Indexed by TableId
    pub decisions: Vec<TableDecision>,
    pub rule_matches: Vec<RuleMatch>,
    pub warnings: Vec<String>,
}

impl SamplingPlan {
    pub fn decision(&self, id: TableId) -> &TableDecision {
        &self.decisions[id.index()]
    }

    pub fn table_plan(&self, id: TableId) -> Option<&TablePlan> {
        match self.decisions.get(id.index()) {
            Some(TableDecision::Sampled(plan)) => Some(plan),
            _ => None,
        }
    }

    /// Sampled tables, in TableId order
    pub fn sampled(&self) -> impl Iterator<Item = &TablePlan> {
        self.decisions.iter().filter_map(|d| match d {
            TableDecision::Sampled(plan) => Some(plan),
            _ => None,
        })
    }

    /// True when the table appears in the output at all
    pub fn is_kept(&self, id: TableId) -> bool {
        !matches!(self.decisions.get(id.index()), Some(TableDecision::Excluded(_)) | None)
    }

    /// Table whose row set holds this table's rows (itself, or the
    /// partition parent)
    pub fn data_table(&self, id: TableId) -> Option<TableId> {
        match self.decisions.get(id.index())? {
            TableDecision::Sampled(_) => Some(id),
            TableDecision::Partition { parent } => self.data_table(*parent),
            TableDecision::Excluded(_) => None,
        }
    }

    pub fn is_column_excluded(&self, id: TableId, column: usize) -> bool {
        self.table_plan(id).is_some_and(|p| p.is_excluded(column))
    }

    /// Directives that matched no table
    pub fn zero_match_rules(&self) -> impl Iterator<Item = &RuleMatch> {
        self.rule_matches.iter().filter(|m| m.matches == 0)
    }

    /// Excluded columns as `schema.table.column`
    pub fn excluded_column_names(&self, catalog: &Catalog) -> Vec<String> {
        self.sampled()
            .flat_map(|plan| {
                let table = catalog.table(plan.table);
                plan.excluded_columns
                    .iter()
                    .map(move |&c| format!("{}.{}", table.display_name(), table.columns[c].name))
            })
            .collect()
    }
}

/// Resolves a `RuleSet` against a catalog
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: RuleSet,
}

impl RuleEngine {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn resolve(&self, catalog: &Catalog) -> Result<SamplingPlan> {
        let rules = &self.rules;
        let mut limit_hits = vec![0usize; rules.limits.len()];
        let mut override_hits = vec![0usize; rules.overrides.len()];
        let mut schema_hits = vec![0usize; rules.exclude_schemas.len()];
        let mut table_hits = vec![0usize; rules.exclude_tables.len()];
        let mut column_hits = vec![0usize; rules.exclude_columns.len()];
        let mut warnings = Vec::new();

        // Pass 1: table-level exclusion and limits for non-partition tables
        let mut decisions: Vec<Option<TableDecision>> = vec![None; catalog.len()];
        for table in catalog.iter() {
            if !rules.include_schemas.is_empty() && !rules.include_schemas.contains(&table.schema)
            {
                decisions[table.id.index()] = Some(TableDecision::Excluded(Exclusion::NotIncluded));
                continue;
            }

            if let Some(exclusion) = self.schema_exclusion(table, &mut schema_hits) {
                decisions[table.id.index()] = Some(TableDecision::Excluded(exclusion));
                continue;
            }

            let table_exclusion = self.table_exclusion(table, &mut table_hits, &mut override_hits);

            if table.is_partition_child() {
                if let Some(Exclusion::Table(rule)) | Some(Exclusion::Override(rule)) =
                    &table_exclusion
                {
                    warnings.push(format!(
                        "'{}' matches partition {}, which follows its parent",
                        rule,
                        table.display_name()
                    ));
                }
                continue;
            }

            if let Some(exclusion) = table_exclusion {
                decisions[table.id.index()] = Some(TableDecision::Excluded(exclusion));
                continue;
            }

            let (action, source) = self.resolve_limit(table, &mut limit_hits, &mut override_hits);
            let excluded_columns = self.excluded_columns(table, &mut column_hits);

            decisions[table.id.index()] = Some(TableDecision::Sampled(TablePlan {
                table: table.id,
                cap: action.cap(table.row_estimate),
                action,
                excluded_columns,
                ordering: rules.ordering,
                source,
                dropped_foreign_keys: Vec::new(),
            }));
        }

        // Pass 2: partitions follow their parent
        for table in catalog.iter() {
            if decisions[table.id.index()].is_some() {
                continue;
            }
            let parent = match &table.partitioning {
                Partitioning::Child { parent, .. } => *parent,
                _ => None,
            };
            let root_sampled = partition_root(catalog, table.id).is_some_and(|root| {
                matches!(decisions[root.index()], Some(TableDecision::Sampled(_)))
            });
            decisions[table.id.index()] = Some(match parent {
                Some(parent) if root_sampled => TableDecision::Partition { parent },
                _ => TableDecision::Excluded(Exclusion::ParentExcluded),
            });
        }

        let mut decisions: Vec<TableDecision> = decisions
            .into_iter()
            .map(|d| d.unwrap_or(TableDecision::Excluded(Exclusion::ParentExcluded)))
            .collect();

        self.apply_foreign_key_exclusions(catalog, &mut decisions, &mut warnings)?;
        check_referenced_columns(catalog, &decisions)?;
        check_primary_keys(catalog, &decisions)?;

        let mut rule_matches = Vec::new();
        let mut record = |kind: RuleKind, texts: Vec<&str>, hits: &[usize]| {
            for (text, &matches) in texts.into_iter().zip(hits) {
                rule_matches.push(RuleMatch {
                    rule: text.to_string(),
                    kind,
                    matches,
                });
            }
        };
        record(
            RuleKind::ExcludeSchema,
            rules.exclude_schemas.iter().map(|p| p.text.as_str()).collect(),
            &schema_hits,
        );
        record(
            RuleKind::ExcludeTable,
            rules.exclude_tables.iter().map(|p| p.text.as_str()).collect(),
            &table_hits,
        );
        record(
            RuleKind::Override,
            rules.overrides.iter().map(|o| o.pattern.text.as_str()).collect(),
            &override_hits,
        );
        record(
            RuleKind::Limit,
            rules.limits.iter().map(|r| r.text.as_str()).collect(),
            &limit_hits,
        );
        record(
            RuleKind::ExcludeColumn,
            rules.exclude_columns.iter().map(|p| p.text.as_str()).collect(),
            &column_hits,
        );

        for m in rule_matches.iter().filter(|m| m.matches == 0) {
            warnings.push(format!("rule '{}' matched no tables", m.rule));
        }

        Ok(SamplingPlan {
            decisions,
            rule_matches,
            warnings,
        })
    }

    fn schema_exclusion(&self, table: &Table, hits: &mut [usize]) -> Option<Exclusion> {
        let mut exclusion = None;
        for (i, pattern) in self.rules.exclude_schemas.iter().enumerate() {
            if pattern.matches(&table.schema) {
                hits[i] += 1;
                exclusion.get_or_insert_with(|| Exclusion::Schema(pattern.text.clone()));
            }
        }
        exclusion
    }

    fn table_exclusion(
        &self,
        table: &Table,
        hits: &mut [usize],
        override_hits: &mut [usize],
    ) -> Option<Exclusion> {
        let mut exclusion = None;
        for (i, pattern) in self.rules.exclude_tables.iter().enumerate() {
            if pattern.matches(&table.schema, &table.name) {
                hits[i] += 1;
                exclusion.get_or_insert_with(|| Exclusion::Table(pattern.text.clone()));
            }
        }
        if exclusion.is_none() {
            if let Some((i, o)) = self.first_override(table) {
                if o.skip {
                    override_hits[i] += 1;
                    return Some(Exclusion::Override(o.pattern.text.clone()));
                }
            }
        }
        exclusion
    }

    fn first_override(&self, table: &Table) -> Option<(usize, &TableOverride)> {
        self.rules
            .overrides
            .iter()
            .enumerate()
            .find(|(_, o)| o.pattern.matches(&table.schema, &table.name))
    }

    fn resolve_limit(
        &self,
        table: &Table,
        hits: &mut [usize],
        override_hits: &mut [usize],
    ) -> (LimitAction, RuleSource) {
        let mut resolved = None;

        if let Some((i, o)) = self.first_override(table) {
            override_hits[i] += 1;
            if let Some(action) = &o.action {
                resolved = Some((action.clone(), RuleSource::Override(o.pattern.text.clone())));
            }
        }

        for (i, rule) in self.rules.limits.iter().enumerate() {
            if rule.pattern.matches(&table.schema, &table.name) {
                hits[i] += 1;
                resolved.get_or_insert_with(|| {
                    (rule.action.clone(), RuleSource::Rule(rule.text.clone()))
                });
            }
        }

        resolved.unwrap_or_else(|| (self.rules.default_action.clone(), RuleSource::Default))
    }

    fn excluded_columns(&self, table: &Table, hits: &mut [usize]) -> Vec<usize> {
        let mut excluded = Vec::new();
        for (i, pattern) in self.rules.exclude_columns.iter().enumerate() {
            let mut matched = false;
            for (pos, column) in table.columns.iter().enumerate() {
                if pattern.matches(&table.schema, &table.name, &column.name) {
                    matched = true;
                    if !excluded.contains(&pos) {
                        excluded.push(pos);
                    }
                }
            }
            if matched {
                hits[i] += 1;
            }
        }
        excluded.sort_unstable();
        excluded
    }

    /// Foreign keys into tables that are not sampled: nullable ones are
    /// nulled out, mandatory ones are a structural error unless the rule
    /// set allows dropping them.
    fn apply_foreign_key_exclusions(
        &self,
        catalog: &Catalog,
        decisions: &mut [TableDecision],
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        let kept: Vec<bool> = decisions
            .iter()
            .map(|d| !matches!(d, TableDecision::Excluded(_)))
            .collect();

        for table in catalog.iter() {
            let TableDecision::Sampled(plan) = &mut decisions[table.id.index()] else {
                continue;
            };

            for (pos, constraint, fk) in table.foreign_keys() {
                let parent_kept = fk.referenced.is_some_and(|p| kept[p.index()]);
                if parent_kept {
                    continue;
                }
                if constraint.columns.iter().all(|&c| plan.is_excluded(c)) {
                    continue;
                }

                let mandatory = constraint
                    .columns
                    .iter()
                    .all(|&c| table.columns[c].not_null);

                if mandatory {
                    if !self.rules.allow_excluded_parents {
                        return Err(SampleError::structural(
                            table.display_name(),
                            format!(
                                "foreign key '{}' requires rows from excluded table {}",
                                constraint.name, fk.referenced_name
                            ),
                        ));
                    }
                    plan.dropped_foreign_keys.push(pos);
                    warnings.push(format!(
                        "{}: foreign key '{}' into excluded table {} is dropped",
                        table.display_name(),
                        constraint.name,
                        fk.referenced_name
                    ));
                } else {
                    for &c in &constraint.columns {
                        if !plan.excluded_columns.contains(&c) {
                            plan.excluded_columns.push(c);
                        }
                    }
                    plan.excluded_columns.sort_unstable();
                    warnings.push(format!(
                        "{}: columns of foreign key '{}' are set to NULL because {} is excluded",
                        table.display_name(),
                        constraint.name,
                        fk.referenced_name
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Topmost partitioned ancestor of a partition
fn partition_root(catalog: &Catalog, mut id: TableId) -> Option<TableId> {
    for _ in 0..catalog.len() {
        match &catalog.table(id).partitioning {
            Partitioning::Child {
                parent: Some(parent),
                ..
            } => id = *parent,
            Partitioning::Child { parent: None, .. } => return None,
            _ => return Some(id),
        }
    }
    None
}

/// A followed foreign key whose referenced columns are nulled in the parent
/// would leave every child reference dangling.
fn check_referenced_columns(catalog: &Catalog, decisions: &[TableDecision]) -> Result<()> {
    for table in catalog.iter() {
        let TableDecision::Sampled(plan) = &decisions[table.id.index()] else {
            continue;
        };
        for (pos, constraint, fk) in table.foreign_keys() {
            if plan.dropped_foreign_keys.contains(&pos)
                || constraint.columns.iter().any(|&c| plan.is_excluded(c))
            {
                continue;
            }
            let Some(parent) = fk.referenced else {
                continue;
            };
            if let TableDecision::Sampled(parent_plan) = &decisions[parent.index()] {
                if let Some(&col) = fk.referenced_columns.iter().find(|&&c| parent_plan.is_excluded(c)) {
                    let parent_table = catalog.table(parent);
                    return Err(SampleError::structural(
                        parent_table.display_name(),
                        format!(
                            "column '{}' is excluded but referenced by foreign key '{}' of {}",
                            parent_table.columns[col].name,
                            constraint.name,
                            table.display_name()
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn check_primary_keys(catalog: &Catalog, decisions: &[TableDecision]) -> Result<()> {
    for table in catalog.iter() {
        let TableDecision::Sampled(plan) = &decisions[table.id.index()] else {
            continue;
        };
        if let Some(&col) = table
            .primary_key_columns()
            .iter()
            .find(|&&c| plan.is_excluded(c))
        {
            return Err(SampleError::structural(
                table.display_name(),
                format!("primary key column '{}' is excluded", table.columns[col].name),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, QualifiedName};

    fn shop() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.add_table(
            Table::new("public", "users")
                .column(Column::new("id", "integer").not_null())
                .column(Column::new("email", "text"))
                .column(Column::new("password", "text"))
                .primary_key("users_pkey", &["id"])
                .estimate(1000),
        );
        catalog.add_table(
            Table::new("public", "orders")
                .column(Column::new("id", "integer").not_null())
                .column(Column::new("user_id", "integer").not_null())
                .primary_key("orders_pkey", &["id"])
                .foreign_key(
                    "orders_user_id_fkey",
                    &["user_id"],
                    QualifiedName::new("public", "users"),
                    &["id"],
                )
                .estimate(5000),
        );
        catalog.add_table(
            Table::new("logs", "events")
                .column(Column::new("id", "bigint").not_null())
                .column(Column::new("user_id", "integer"))
                .primary_key("events_pkey", &["id"])
                .foreign_key(
                    "events_user_id_fkey",
                    &["user_id"],
                    QualifiedName::new("public", "users"),
                    &["id"],
                )
                .estimate(100_000),
        );
        catalog.finish().unwrap()
    }

    fn plan(rules: RuleSet) -> Result<SamplingPlan> {
        RuleEngine::new(rules).resolve(&shop())
    }

    #[test]
    fn test_first_match_wins() {
        let rules = RuleSet::new().limit("users=50").unwrap().limit("*=10").unwrap();
        let plan = plan(rules).unwrap();
        assert_eq!(plan.table_plan(TableId(0)).unwrap().cap, Some(50));
        assert_eq!(plan.table_plan(TableId(1)).unwrap().cap, Some(10));
        assert_eq!(
            plan.table_plan(TableId(1)).unwrap().source,
            RuleSource::Rule("*=10".to_string())
        );
    }

    #[test]
    fn test_unmatched_tables_use_default() {
        let plan = plan(RuleSet::new().limit("users=50").unwrap()).unwrap();
        let orders = plan.table_plan(TableId(1)).unwrap();
        assert_eq!(orders.cap, Some(DEFAULT_ROW_LIMIT));
        assert_eq!(orders.source, RuleSource::Default);
    }

    #[test]
    fn test_percent_uses_row_estimate() {
        let plan = plan(RuleSet::new().limit("orders=10%").unwrap()).unwrap();
        assert_eq!(plan.table_plan(TableId(1)).unwrap().cap, Some(500));
    }

    #[test]
    fn test_schema_exclusion_beats_limit_rule() {
        let rules = RuleSet::new()
            .limit("events=*")
            .unwrap()
            .exclude_schema("logs")
            .unwrap();
        let plan = plan(rules).unwrap();
        assert_eq!(
            plan.decision(TableId(2)),
            &TableDecision::Excluded(Exclusion::Schema("logs".to_string()))
        );
        // the limit rule matched nothing that survived exclusion
        assert!(plan.zero_match_rules().any(|m| m.rule == "events=*"));
    }

    #[test]
    fn test_column_exclusion_keeps_table() {
        let plan = plan(RuleSet::new().exclude_column("*.password").unwrap()).unwrap();
        let users = plan.table_plan(TableId(0)).unwrap();
        assert_eq!(users.excluded_columns, vec![2]);
        assert!(plan.is_kept(TableId(0)));
    }

    #[test]
    fn test_excluded_primary_key_is_structural() {
        let err = plan(RuleSet::new().exclude_column("users.id").unwrap()).unwrap_err();
        assert!(matches!(err, SampleError::StructuralDependency { .. }));
        assert!(err.to_string().contains("public.users"));
    }

    #[test]
    fn test_mandatory_fk_into_excluded_table_fails() {
        let err = plan(RuleSet::new().exclude_table("users").unwrap()).unwrap_err();
        assert!(matches!(err, SampleError::StructuralDependency { .. }));
        assert!(err.to_string().contains("orders_user_id_fkey"));
    }

    #[test]
    fn test_mandatory_fk_dropped_with_override() {
        let mut rules = RuleSet::new().exclude_table("users").unwrap();
        rules.allow_excluded_parents = true;
        let plan = plan(rules).unwrap();
        assert_eq!(plan.table_plan(TableId(1)).unwrap().dropped_foreign_keys, vec![1]);
        // nullable FK from logs.events is nulled instead
        assert_eq!(plan.table_plan(TableId(2)).unwrap().excluded_columns, vec![1]);
    }

    #[test]
    fn test_zero_match_rules_are_warnings() {
        let plan = plan(RuleSet::new().limit("nothing_here=5").unwrap()).unwrap();
        assert_eq!(plan.zero_match_rules().count(), 1);
        assert!(plan.warnings.iter().any(|w| w.contains("nothing_here=5")));
    }

    #[test]
    fn test_override_beats_rules_and_skip_excludes() {
        let mut rules = RuleSet::new().limit("*=10").unwrap();
        rules.overrides.push(TableOverride {
            pattern: TablePattern::new("public.users").unwrap(),
            action: Some(LimitAction::Full),
            skip: false,
        });
        rules.overrides.push(TableOverride {
            pattern: TablePattern::new("events").unwrap(),
            action: None,
            skip: true,
        });
        let plan = plan(rules).unwrap();
        assert_eq!(plan.table_plan(TableId(0)).unwrap().cap, None);
        assert!(matches!(
            plan.decision(TableId(2)),
            TableDecision::Excluded(Exclusion::Override(_))
        ));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let engine = RuleEngine::new(
            RuleSet::new()
                .limit("users=50,*=10")
                .unwrap()
                .exclude_column("*.password")
                .unwrap(),
        );
        let catalog = shop();
        assert_eq!(engine.resolve(&catalog).unwrap(), engine.resolve(&catalog).unwrap());
    }
}
