//! Benchmarks for plan resolution and foreign key closure.
//!
//! Tests:
//! - Rule resolution, graph and emission order over generated schemas
//! - Direct closure over generated rows with varying limits

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dbsample::cancel::CancelToken;
use dbsample::catalog::{Catalog, Column, QualifiedName, Table};
use dbsample::pipeline::{prepare, sample_phase};
use dbsample::progress::NoProgress;
use dbsample::rules::RuleSet;
use dbsample::sample::{SamplingOptions, StagingMode};
use dbsample::source::MemorySource;
use dbsample::value::Value;
use std::hint::black_box;
use test_data_gen::{Fixture, Generator, Scale};

fn catalog(fixture: &Fixture) -> Catalog {
    let mut catalog = Catalog::new();
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
    }
    catalog.finish().expect("generated catalog is valid")
}

fn source(fixture: &Fixture) -> MemorySource {
    let mut source = MemorySource::new();
    for spec in &fixture.tables {
        let rows = spec
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| match v {
                        test_data_gen::Value::Int(i) => Value::Int(*i),
                        test_data_gen::Value::Text(s) => Value::Text(s.clone()),
                        test_data_gen::Value::Null => Value::Null,
                    })
                    .collect()
            })
            .collect();
        source = source.with_rows(QualifiedName::new("public", spec.name.as_str()), rows);
    }
    source
}

fn bench_prepare(c: &mut Criterion) {
    let mut group = c.benchmark_group("prepare");
    let rules = RuleSet::new()
        .limit("t00=10,*=5%")
        .expect("valid rules")
        .exclude_column("*.email")
        .expect("valid pattern");

    for (label, scale) in [("medium", Scale::Medium), ("large", Scale::Large)] {
        let fixture = Generator::new(7, scale).generate();
        group.bench_with_input(BenchmarkId::new("schema", label), &fixture, |b, fixture| {
            b.iter(|| black_box(prepare(catalog(fixture), &rules).expect("plan resolves")))
        });
    }

    group.finish();
}

fn bench_closure(c: &mut Criterion) {
    let mut group = c.benchmark_group("closure");
    group.sample_size(20);

    let fixture = Generator::new(7, Scale::Large).generate();
    let options = SamplingOptions {
        staging: StagingMode::Off,
        ..SamplingOptions::default()
    };

    for limit in ["*=1", "*=1%", "*=10%"] {
        let rules = RuleSet::new().limit(limit).expect("valid rule");
        let prepared = prepare(catalog(&fixture), &rules).expect("plan resolves");
        group.bench_with_input(BenchmarkId::new("direct", limit), &prepared, |b, prepared| {
            b.iter(|| {
                let mut source = source(&fixture);
                let sampled = sample_phase(
                    &mut source,
                    prepared,
                    &options,
                    false,
                    &CancelToken::new(),
                    &NoProgress,
                )
                .expect("sample succeeds");
                black_box(sampled.output.total_rows())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_prepare, bench_closure);
criterion_main!(benches);
