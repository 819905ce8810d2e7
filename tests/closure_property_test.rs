//! Closure invariant over generated schemas: whatever the limits and the
//! strategy, every non-NULL foreign key value in the sample resolves to a
//! sampled parent row.

use ahash::{AHashMap, AHashSet};
use dbsample::cancel::CancelToken;
use dbsample::catalog::{Catalog, Column, QualifiedName, Table, TableId};
use dbsample::pipeline::{prepare, sample_phase, SampledData};
use dbsample::progress::NoProgress;
use dbsample::rules::{RowOrder, RuleSet};
use dbsample::sample::{SamplingOptions, StagingMode};
use dbsample::source::MemorySource;
use dbsample::value::Value;
use test_data_gen::{Fixture, Generator, Scale};

fn to_value(value: &test_data_gen::Value) -> Value {
    match value {
        test_data_gen::Value::Int(i) => Value::Int(*i),
        test_data_gen::Value::Text(s) => Value::Text(s.clone()),
        test_data_gen::Value::Null => Value::Null,
    }
}

fn load(fixture: &Fixture) -> (Catalog, MemorySource) {
    let mut catalog = Catalog::new();
    let mut source = MemorySource::new().with_seed(fixture.seed);

    for spec in &fixture.tables {
        let mut table = Table::new("public", spec.name.as_str());
        for column in &spec.columns {
            let mut c = Column::new(column.name.as_str(), column.kind.to_postgres());
            if column.not_null {
                c = c.not_null();
            }
            table = table.column(c);
        }
        table = table.primary_key(&format!("{}_pkey", spec.name), &["id"]);
        for fk in &spec.foreign_keys {
            table = table.foreign_key(
                &fk.name,
                &[spec.columns[fk.column].name.as_str()],
                QualifiedName::new("public", fixture.tables[fk.references].name.as_str()),
                &["id"],
            );
        }
        catalog.add_table(table.estimate(spec.rows.len() as u64));

        source = source.with_rows(
            QualifiedName::new("public", spec.name.as_str()),
            spec.rows
                .iter()
                .map(|row| row.iter().map(to_value).collect())
                .collect(),
        );
    }
    (catalog.finish().unwrap(), source)
}

fn run(fixture: &Fixture, rules: &RuleSet, staging: StagingMode) -> (Catalog, SampledData) {
    let (catalog, mut source) = load(fixture);
    let prepared = prepare(catalog, rules).unwrap();
    let options = SamplingOptions {
        staging,
        ..SamplingOptions::default()
    };
    let sampled = sample_phase(
        &mut source,
        &prepared,
        &options,
        true,
        &CancelToken::new(),
        &NoProgress,
    )
    .unwrap_or_else(|e| panic!("seed {}: {}", fixture.seed, e));
    (prepared.catalog, sampled)
}

fn ids(sampled: &SampledData, table: TableId) -> AHashSet<i64> {
    sampled
        .output
        .row_sets
        .get(table)
        .rows()
        .iter()
        .filter_map(|r| r.values[0].as_i64())
        .collect()
}

fn assert_closed(fixture: &Fixture, catalog: &Catalog, sampled: &SampledData) {
    let by_name: AHashMap<&str, TableId> = catalog.iter().map(|t| (t.name.as_str(), t.id)).collect();
    for spec in &fixture.tables {
        let child = by_name[spec.name.as_str()];
        for fk in &spec.foreign_keys {
            let parent_ids = ids(sampled, by_name[fixture.tables[fk.references].name.as_str()]);
            for row in sampled.output.row_sets.get(child).rows() {
                if let Some(value) = row.values[fk.column].as_i64() {
                    assert!(
                        parent_ids.contains(&value),
                        "seed {}: {}.{} = {} has no parent",
                        fixture.seed,
                        spec.name,
                        spec.columns[fk.column].name,
                        value
                    );
                }
            }
        }
    }
}

#[test]
fn test_closure_holds_for_generated_schemas() {
    let rules = RuleSet::new().limit("*=3").unwrap();
    for seed in 0..30 {
        let fixture = Generator::new(seed, Scale::Small).generate();
        let (catalog, sampled) = run(&fixture, &rules, StagingMode::Off);
        assert_closed(&fixture, &catalog, &sampled);
    }
}

#[test]
fn test_closure_holds_with_random_order() {
    let rules = RuleSet::new()
        .limit("*=10%")
        .unwrap()
        .ordering(RowOrder::Random);
    for seed in 100..115 {
        let fixture = Generator::new(seed, Scale::Medium).generate();
        let (catalog, sampled) = run(&fixture, &rules, StagingMode::Off);
        assert_closed(&fixture, &catalog, &sampled);
    }
}

#[test]
fn test_staged_and_direct_close_to_the_same_rows() {
    let rules = RuleSet::new().limit("*=2").unwrap();
    for seed in 0..15 {
        let fixture = Generator::new(seed, Scale::Small).generate();
        let (catalog, direct) = run(&fixture, &rules, StagingMode::Off);
        let (_, staged) = run(&fixture, &rules, StagingMode::On);

        assert_closed(&fixture, &catalog, &staged);
        for table in catalog.iter() {
            assert_eq!(
                ids(&direct, table.id),
                ids(&staged, table.id),
                "seed {}: {} differs between strategies",
                seed,
                table.name
            );
        }
    }
}
