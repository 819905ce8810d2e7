//! End-to-end runs over the in-memory source: plan, sample, close and emit.

use dbsample::cancel::CancelToken;
use dbsample::catalog::{Catalog, Column, QualifiedName, Sequence, Table};
use dbsample::emit::{check_target, EmitOptions, TargetVersion};
use dbsample::error::SampleError;
use dbsample::pipeline::{emit_phase, prepare, sample_phase, Prepared, SampledData};
use dbsample::progress::NoProgress;
use dbsample::rules::RuleSet;
use dbsample::sample::{SamplingOptions, StagingMode};
use dbsample::source::MemorySource;
use dbsample::value::Value;
use dbsample::writer::{Output, ScriptWriter};
use tempfile::TempDir;

fn name(schema: &str, table: &str) -> QualifiedName {
    QualifiedName::new(schema, table)
}

fn int_rows(rows: &[&[i64]]) -> Vec<Vec<Value>> {
    rows.iter()
        .map(|r| r.iter().map(|&v| Value::Int(v)).collect())
        .collect()
}

fn sample(
    catalog: Catalog,
    mut source: MemorySource,
    rules: &RuleSet,
    staging: StagingMode,
) -> (Prepared, SampledData) {
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
    .unwrap();
    (prepared, sampled)
}

fn script(prepared: &Prepared, sampled: &SampledData, options: &EmitOptions) -> String {
    let mut writer = ScriptWriter::new(Vec::new());
    emit_phase(&mut writer, prepared, sampled, options).unwrap();
    String::from_utf8(writer.into_inner().unwrap()).unwrap()
}

fn rows_of(prepared: &Prepared, sampled: &SampledData, table: &str) -> usize {
    let id = prepared.catalog.table_id(&name("public", table)).unwrap();
    sampled.output.row_sets.get(id).len()
}

fn shop() -> (Catalog, MemorySource) {
    let mut catalog = Catalog::new();
    catalog.add_table(
        Table::new("public", "users")
            .column(Column::new("id", "integer").not_null())
            .column(Column::new("email", "text"))
            .column(Column::new("password", "text"))
            .primary_key("users_pkey", &["id"])
            .estimate(200),
    );
    catalog.add_table(
        Table::new("public", "orders")
            .column(Column::new("id", "integer").not_null())
            .column(Column::new("user_id", "integer").not_null())
            .primary_key("orders_pkey", &["id"])
            .foreign_key("orders_user_id_fkey", &["user_id"], name("public", "users"), &["id"])
            .estimate(200),
    );
    catalog.add_table(
        Table::new("logs", "events")
            .column(Column::new("id", "integer").not_null())
            .column(Column::new("message", "text"))
            .primary_key("events_pkey", &["id"])
            .estimate(200),
    );

    let users = (1..=200)
        .map(|i| {
            vec![
                Value::Int(i),
                Value::from(format!("user{}@example.com", i).as_str()),
                Value::from("hunter2"),
            ]
        })
        .collect();
    let orders = (1..=200).map(|i| vec![Value::Int(i), Value::Int(201 - i)]).collect();
    let events = (1..=200)
        .map(|i| vec![Value::Int(i), Value::from("login")])
        .collect();
    let source = MemorySource::new()
        .with_rows(name("public", "users"), users)
        .with_rows(name("public", "orders"), orders)
        .with_rows(name("logs", "events"), events);
    (catalog.finish().unwrap(), source)
}

#[test]
fn test_rule_precedence_first_match_wins() {
    let (catalog, source) = shop();
    let rules = RuleSet::new()
        .limit("users=50")
        .unwrap()
        .limit("*=10")
        .unwrap()
        .exclude_schema("logs")
        .unwrap();
    let (prepared, sampled) = sample(catalog, source, &rules, StagingMode::Off);

    // orders 1..=10 reference users 200..=191, none of which are in the
    // first 50 users
    assert_eq!(rows_of(&prepared, &sampled, "orders"), 10);
    assert_eq!(rows_of(&prepared, &sampled, "users"), 60);

    let users = sampled
        .output
        .tables
        .iter()
        .find(|t| t.table == "public.users")
        .unwrap();
    assert_eq!(users.selected, 50);
    assert_eq!(users.closure_added, 10);
}

#[test]
fn test_column_and_schema_exclusion() {
    let (catalog, source) = shop();
    let rules = RuleSet::new()
        .limit("*=5")
        .unwrap()
        .exclude_column("*.password")
        .unwrap()
        .exclude_schema("logs")
        .unwrap();
    let (prepared, sampled) = sample(catalog, source, &rules, StagingMode::Off);
    let text = script(&prepared, &sampled, &EmitOptions::default());

    assert!(text.contains("\"password\" text"));
    assert!(text.contains("'user1@example.com', NULL)"));
    assert!(!text.contains("hunter2"));
    assert!(!text.contains("\"logs\""));
    assert!(!text.contains("login"));
}

#[test]
fn test_cycle_is_sampled_and_emitted() {
    let mut catalog = Catalog::new();
    for (table, parent) in [("a", "b"), ("b", "c"), ("c", "a")] {
        let column = format!("{}_id", parent);
        catalog.add_table(
            Table::new("public", table)
                .column(Column::new("id", "integer").not_null())
                .column(Column::new(column.as_str(), "integer"))
                .primary_key(&format!("{}_pkey", table), &["id"])
                .foreign_key(
                    &format!("{}_{}_fkey", table, column),
                    &[column.as_str()],
                    name("public", parent),
                    &["id"],
                )
                .estimate(2),
        );
    }
    let source = MemorySource::new()
        .with_rows(name("public", "a"), int_rows(&[&[1, 1], &[2, 2]]))
        .with_rows(name("public", "b"), int_rows(&[&[1, 1], &[2, 2]]))
        .with_rows(name("public", "c"), int_rows(&[&[1, 1], &[2, 2]]));
    let rules = RuleSet::new()
        .limit("a=1")
        .unwrap()
        .limit("*=0")
        .unwrap();

    let (prepared, sampled) = sample(catalog.finish().unwrap(), source, &rules, StagingMode::Off);
    assert_eq!(prepared.order.cycles.len(), 1);
    assert_eq!(prepared.order.deferred.len(), 3);
    for table in ["a", "b", "c"] {
        assert_eq!(rows_of(&prepared, &sampled, table), 1, "table {}", table);
    }

    let text = script(&prepared, &sampled, &EmitOptions::default());
    let last_insert = text.rfind("INSERT INTO").unwrap();
    let foreign_keys = text.find("-- Foreign keys").unwrap();
    assert!(foreign_keys > last_insert);
    assert_eq!(text.matches("FOREIGN KEY").count(), 3);
    assert!(text.contains("SET session_replication_role = replica;"));
}

/// a(i) references b(i), b(i) references a(i + 1); the last b row ends
/// the chain with a NULL
fn long_pair_chain(length: i64) -> (Catalog, MemorySource) {
    let mut catalog = Catalog::new();
    for (table, parent) in [("a", "b"), ("b", "a")] {
        let column = format!("{}_id", parent);
        catalog.add_table(
            Table::new("public", table)
                .column(Column::new("id", "integer").not_null())
                .column(Column::new(column.as_str(), "integer"))
                .primary_key(&format!("{}_pkey", table), &["id"])
                .foreign_key(
                    &format!("{}_{}_fkey", table, column),
                    &[column.as_str()],
                    name("public", parent),
                    &["id"],
                )
                .estimate(length as u64),
        );
    }
    let a = (1..=length).map(|i| vec![Value::Int(i), Value::Int(i)]).collect();
    let b = (1..=length)
        .map(|i| {
            let next = if i < length { Value::Int(i + 1) } else { Value::Null };
            vec![Value::Int(i), next]
        })
        .collect();
    let source = MemorySource::new()
        .with_rows(name("public", "a"), a)
        .with_rows(name("public", "b"), b);
    (catalog.finish().unwrap(), source)
}

#[test]
fn test_long_chain_through_cycle_is_closed() {
    let length = 1200;
    let rules = RuleSet::new().limit("a=1,b=0").unwrap();

    for staging in [StagingMode::Off, StagingMode::On] {
        let (catalog, source) = long_pair_chain(length);
        let (prepared, sampled) = sample(catalog, source, &rules, staging);
        assert_eq!(rows_of(&prepared, &sampled, "a"), length as usize, "{:?}", staging);
        assert_eq!(rows_of(&prepared, &sampled, "b"), length as usize, "{:?}", staging);
        assert!(sampled.output.closure.iterations <= 3, "{:?}", staging);
    }
}

#[test]
fn test_sequence_set_past_every_bound_column() {
    let mut catalog = Catalog::new();
    for table in ["t1", "t2"] {
        catalog.add_table(
            Table::new("public", table)
                .column(
                    Column::new("id", "integer")
                        .not_null()
                        .default_expr("nextval('public.seq1'::regclass)"),
                )
                .primary_key(&format!("{}_pkey", table), &["id"])
                .estimate(100),
        );
    }
    catalog.sequences.push(
        Sequence::new(name("public", "seq1"))
            .bind(name("public", "t1"), "id")
            .bind(name("public", "t2"), "id"),
    );
    let t1: Vec<Vec<Value>> = (1..=40).map(|i| vec![Value::Int(i)]).collect();
    let t2: Vec<Vec<Value>> = (1..=87).map(|i| vec![Value::Int(i)]).collect();
    let source = MemorySource::new()
        .with_rows(name("public", "t1"), t1)
        .with_rows(name("public", "t2"), t2);

    let rules = RuleSet::new().limit("*=*").unwrap();
    let (prepared, sampled) = sample(catalog.finish().unwrap(), source, &rules, StagingMode::Off);
    assert_eq!(sampled.sequences.len(), 1);
    assert_eq!(sampled.sequences[0].next_value, 88);

    let text = script(&prepared, &sampled, &EmitOptions::default());
    assert!(text.contains("SELECT pg_catalog.setval('\"public\".\"seq1\"', 88, false);"));
}

#[test]
fn test_empty_table_gets_definition_and_no_inserts() {
    let mut catalog = Catalog::new();
    catalog.add_table(
        Table::new("public", "empty")
            .column(Column::new("id", "integer").not_null())
            .primary_key("empty_pkey", &["id"]),
    );
    let (prepared, sampled) = sample(
        catalog.finish().unwrap(),
        MemorySource::new(),
        &RuleSet::new(),
        StagingMode::Off,
    );
    let text = script(&prepared, &sampled, &EmitOptions::default());

    assert!(text.contains("CREATE TABLE \"public\".\"empty\""));
    assert!(text.contains("ADD CONSTRAINT \"empty_pkey\" PRIMARY KEY"));
    assert!(!text.contains("INSERT INTO"));
}

#[test]
fn test_all_columns_excluded() {
    let mut catalog = Catalog::new();
    catalog.add_table(
        Table::new("public", "notes")
            .column(Column::new("author", "text"))
            .column(Column::new("body", "text")),
    );
    let source = MemorySource::new().with_rows(
        name("public", "notes"),
        vec![vec![Value::from("ann"), Value::from("secret")]],
    );
    let rules = RuleSet::new().exclude_column("notes.*").unwrap();
    let (prepared, sampled) = sample(catalog.finish().unwrap(), source, &rules, StagingMode::Off);
    let text = script(&prepared, &sampled, &EmitOptions::default());
    assert!(text.contains("(NULL, NULL);"));
    assert!(!text.contains("secret"));

    let (keyed, _) = shop();
    let rules = RuleSet::new().exclude_column("users.*").unwrap();
    match prepare(keyed, &rules) {
        Err(SampleError::StructuralDependency { table, message }) => {
            assert_eq!(table, "public.users");
            assert!(message.contains("'id'"));
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("excluding the primary key must fail"),
    }
}

#[test]
fn test_planning_is_idempotent() {
    let rules = RuleSet::new()
        .limit("users=5%")
        .unwrap()
        .exclude_column("*.password")
        .unwrap();
    let (first, _) = shop();
    let (second, _) = shop();
    let a = prepare(first, &rules).unwrap();
    let b = prepare(second, &rules).unwrap();
    assert_eq!(a.plan, b.plan);
    assert_eq!(a.order.data, b.order.data);
}

#[test]
fn test_staged_script_matches_direct_script() {
    let rules = RuleSet::new().limit("orders=20,*=3").unwrap();

    let (catalog, source) = shop();
    let (prepared, direct) = sample(catalog, source, &rules, StagingMode::Off);
    let direct_text = script(&prepared, &direct, &EmitOptions::default());

    let (catalog, source) = shop();
    let (prepared, staged) = sample(catalog, source, &rules, StagingMode::On);
    let staged_text = script(&prepared, &staged, &EmitOptions::default());

    assert_eq!(rows_of(&prepared, &staged, "users"), 23);
    assert_eq!(direct_text, staged_text);
}

#[test]
fn test_data_only_for_old_target() {
    let (catalog, source) = shop();
    let rules = RuleSet::new().limit("*=2").unwrap();
    let (prepared, sampled) = sample(catalog, source, &rules, StagingMode::Off);

    let options = EmitOptions {
        data_only: true,
        target: "9.6".parse::<TargetVersion>().unwrap(),
        ..EmitOptions::default()
    };
    let text = script(&prepared, &sampled, &options);
    assert!(!text.contains("CREATE TABLE"));
    assert!(!text.contains("ADD CONSTRAINT"));
    assert!(text.contains("INSERT INTO \"public\".\"orders\""));
    assert!(text.trim_end().ends_with("COMMIT;"));
}

#[test]
fn test_unsupported_target_fails_before_output() {
    let mut total = Column::new("total", "integer");
    total.generated = Some("price * 2".to_string());
    let mut catalog = Catalog::new();
    catalog.add_table(
        Table::new("public", "items")
            .column(Column::new("id", "integer").not_null())
            .column(Column::new("price", "integer"))
            .column(total)
            .primary_key("items_pkey", &["id"])
            .estimate(1),
    );
    let prepared = prepare(catalog.finish().unwrap(), &RuleSet::new()).unwrap();
    let old = EmitOptions {
        target: "11".parse::<TargetVersion>().unwrap(),
        ..EmitOptions::default()
    };

    let err = check_target(&prepared.catalog, &prepared.plan, &prepared.order, &old).unwrap_err();
    assert!(matches!(err, SampleError::Config(_)));
    assert!(err.to_string().contains("generated columns need target version 12"));

    let data_only = EmitOptions {
        data_only: true,
        ..old.clone()
    };
    check_target(&prepared.catalog, &prepared.plan, &prepared.order, &data_only).unwrap();
    check_target(&prepared.catalog, &prepared.plan, &prepared.order, &EmitOptions::default()).unwrap();

    // an emit that fails partway leaves no script on disk
    let mut source = MemorySource::new().with_rows(name("public", "items"), int_rows(&[&[1, 5, 10]]));
    let sampled = sample_phase(
        &mut source,
        &prepared,
        &SamplingOptions::default(),
        false,
        &CancelToken::new(),
        &NoProgress,
    )
    .unwrap();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sample.sql");
    let mut writer = ScriptWriter::new(Output::open(Some(&path), false).unwrap());
    assert!(emit_phase(&mut writer, &prepared, &sampled, &old).is_err());
    drop(writer);
    assert!(!path.exists());
}
