//! Config files driving a full run: rules, per-table overrides and a
//! compressed output file.

use dbsample::audit::AuditRecord;
use dbsample::cancel::CancelToken;
use dbsample::catalog::{Catalog, Column, QualifiedName, Table};
use dbsample::config::{ConfigFile, RunConfig};
use dbsample::pipeline::{emit_phase, prepare, sample_phase, PlanReport};
use dbsample::progress::NoProgress;
use dbsample::rules::{Exclusion, TableDecision};
use dbsample::sample::StagingMode;
use dbsample::source::MemorySource;
use dbsample::value::Value;
use dbsample::writer::{Output, ScriptWriter};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Read;
use tempfile::TempDir;

fn catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.add_table(
        Table::new("public", "users")
            .column(Column::new("id", "integer").not_null())
            .column(Column::new("password", "text"))
            .primary_key("users_pkey", &["id"])
            .estimate(10),
    );
    catalog.add_table(
        Table::new("public", "orders")
            .column(Column::new("id", "integer").not_null())
            .column(Column::new("user_id", "integer").not_null())
            .column(Column::new("total", "numeric"))
            .primary_key("orders_pkey", &["id"])
            .foreign_key(
                "orders_user_id_fkey",
                &["user_id"],
                QualifiedName::new("public", "users"),
                &["id"],
            )
            .estimate(10),
    );
    catalog.add_table(
        Table::new("public", "audit_log")
            .column(Column::new("id", "integer").not_null())
            .primary_key("audit_log_pkey", &["id"])
            .estimate(10),
    );
    catalog.finish().unwrap()
}

fn source() -> MemorySource {
    let users = (1..=10)
        .map(|i| vec![Value::Int(i), Value::from("hunter2")])
        .collect();
    let orders = (1..=10)
        .map(|i| vec![Value::Int(i), Value::Int(i), Value::from(format!("{}.00", i * 50).as_str())])
        .collect();
    let audit = (1..=10).map(|i| vec![Value::Int(i)]).collect();
    MemorySource::new()
        .with_rows(QualifiedName::new("public", "users"), users)
        .with_rows(QualifiedName::new("public", "orders"), orders)
        .with_rows(QualifiedName::new("public", "audit_log"), audit)
        .with_predicate("total > 400", |row| {
            row[2].as_text().and_then(|t| t.parse::<f64>().ok()).is_some_and(|t| t > 400.0)
        })
}

const CONFIG: &str = r#"
database: shop
file: sample.sql.gz
staging: off
limit:
  - "users=2"
exclude_column: "*.password"
tables:
  public.audit_log:
    skip: true
  orders:
    where: "total > 400"
"#;

fn load(dir: &TempDir) -> RunConfig {
    let path = dir.path().join("dbsample.yaml");
    fs::write(&path, CONFIG).unwrap();
    let mut config = RunConfig::resolve(ConfigFile::load(&path).unwrap()).unwrap();
    config.output = Some(dir.path().join("sample.sql.gz"));
    config
}

#[test]
fn test_overrides_resolve_against_catalog() {
    let dir = TempDir::new().unwrap();
    let config = load(&dir);
    assert_eq!(config.staging, StagingMode::Off);

    let prepared = prepare(catalog(), &config.rule_set().unwrap()).unwrap();
    let audit = prepared
        .catalog
        .table_id(&QualifiedName::new("public", "audit_log"))
        .unwrap();
    assert!(matches!(
        prepared.plan.decision(audit),
        TableDecision::Excluded(Exclusion::Override(_))
    ));

    let report = PlanReport::build(&prepared, config.staging);
    let orders = report
        .tables
        .iter()
        .find(|t| t.table == "public.orders")
        .unwrap();
    assert_eq!(orders.limit, "WHERE total > 400");
    assert!(orders.rule.contains("orders"));
}

#[test]
fn test_run_writes_compressed_script_and_audit() {
    let dir = TempDir::new().unwrap();
    let config = load(&dir);

    let prepared = prepare(catalog(), &config.rule_set().unwrap()).unwrap();
    let mut source = source();
    let sampled = sample_phase(
        &mut source,
        &prepared,
        &config.sampling_options(),
        true,
        &CancelToken::new(),
        &NoProgress,
    )
    .unwrap();

    let output = Output::open(config.output.as_deref(), config.compress).unwrap();
    let mut writer = ScriptWriter::new(output);
    emit_phase(&mut writer, &prepared, &sampled, &config.emit_options()).unwrap();
    writer.into_inner().unwrap().finish().unwrap();

    let mut text = String::new();
    GzDecoder::new(File::open(dir.path().join("sample.sql.gz")).unwrap())
        .read_to_string(&mut text)
        .unwrap();

    // users 1..=2 by rule, 9 and 10 through orders 9 and 10
    assert!(text.contains("INSERT INTO \"public\".\"orders\""));
    assert!(text.contains("(9, 9, 450.00)"));
    assert!(text.contains("(10, NULL)"));
    assert!(!text.contains("hunter2"));
    assert!(!text.contains("audit_log"));

    let audit_path = dir.path().join("audit.json");
    let mut audit = AuditRecord::start(None, config.connection.dbname.clone(), false);
    audit.record_rules(
        &prepared.plan.rule_matches,
        prepared.plan.excluded_column_names(&prepared.catalog),
    );
    audit.record_sample(&sampled.output, &sampled.sequences);
    audit.succeed();
    audit.write(&audit_path).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&audit_path).unwrap()).unwrap();
    assert_eq!(json["database"], "shop");
    assert_eq!(json["total_rows"], 6);
    assert_eq!(json["excluded_columns"][0], "public.users.password");
    assert_eq!(json["outcome"], "success");
}
