use super::*;
use crate::{Expr, PostgresDialect, Returning, UpdateField, Value};
use chrono::TimeZone;
use pretty_assertions::assert_eq;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
}

fn table() -> TableSchema {
    TableSchema::new("widgets")
        .field(FieldSpec::new("id", "integer").primary_key().auto_generated())
        .field(FieldSpec::new("code", "varchar(32)"))
        .field(FieldSpec::new("count", "integer").column("hit_count"))
        .field(FieldSpec::new("label", "text"))
}

fn records() -> Vec<Record> {
    vec![
        Record::new().with("code", "b").with("count", 2).with("label", "second"),
        Record::new().with("code", "a").with("count", 1).with("label", "first"),
    ]
}

fn build(
    records: Vec<Record>,
    unique: &[&str],
    update: &UpdateSpec,
    options: &UpsertOptions,
) -> Result<Option<Statement>> {
    build_upsert(&PostgresDialect, &table(), records, unique, update, options, now())
}

#[test]
fn test_basic_upsert_shape() {
    let stmt = build(records(), &["code"], &UpdateSpec::All, &UpsertOptions::default())
        .unwrap()
        .unwrap();
    assert_eq!(
        stmt.sql,
        "INSERT INTO \"widgets\" AS \"widgets\" (\"code\", \"hit_count\", \"label\") \
         VALUES ($1::varchar(32), $2::integer, $3::text), ($4, $5, $6) \
         ON CONFLICT (\"code\") DO UPDATE SET \
         \"hit_count\" = EXCLUDED.\"hit_count\", \"label\" = EXCLUDED.\"label\" \
         WHERE (\"widgets\".\"hit_count\", \"widgets\".\"label\") \
         IS DISTINCT FROM (EXCLUDED.\"hit_count\", EXCLUDED.\"label\")"
    );
    // sorted by key: "a" first
    assert_eq!(
        stmt.params,
        vec![
            Value::from("a"),
            Value::Int32(1),
            Value::from("first"),
            Value::from("b"),
            Value::Int32(2),
            Value::from("second"),
        ]
    );
}

#[test]
fn test_each_column_cast_exactly_once() {
    let stmt = build(records(), &["code"], &UpdateSpec::All, &UpsertOptions::default())
        .unwrap()
        .unwrap();
    assert_eq!(stmt.sql.matches("::varchar(32)").count(), 1);
    assert_eq!(stmt.sql.matches("::integer").count(), 1);
    assert_eq!(stmt.sql.matches("::text").count(), 1);
}

#[test]
fn test_empty_update_list_is_do_nothing() {
    let stmt = build(records(), &["code"], &UpdateSpec::none(), &UpsertOptions::default())
        .unwrap()
        .unwrap();
    assert!(stmt.sql.ends_with("ON CONFLICT (\"code\") DO NOTHING"));
}

#[test]
fn test_guard_can_be_disabled() {
    let options = UpsertOptions::default().suppress_redundant(false);
    let stmt = build(records(), &["code"], &UpdateSpec::fields(["label"]), &options)
        .unwrap()
        .unwrap();
    assert!(stmt.sql.ends_with("DO UPDATE SET \"label\" = EXCLUDED.\"label\""));
    assert!(!stmt.sql.contains("IS DISTINCT FROM"));
}

#[test]
fn test_returning_adds_aliases_and_status() {
    let options = UpsertOptions::default().returning(Returning::fields(["id", "count"]));
    let stmt = build(records(), &["code"], &UpdateSpec::fields(["label"]), &options)
        .unwrap()
        .unwrap();
    assert!(stmt.sql.ends_with(
        "RETURNING \"widgets\".\"id\" AS \"id\", \"widgets\".\"hit_count\" AS \"count\", \
         CASE WHEN \"widgets\".xmax = 0 THEN 'c' ELSE 'u' END AS \"_status\""
    ));
}

#[test]
fn test_expression_directive() {
    let update = UpdateSpec::Fields(vec![UpdateField::expr(
        "count",
        Expr::col("count") + Expr::proposed("count"),
    )]);
    let stmt = build(records(), &["code"], &update, &UpsertOptions::default())
        .unwrap()
        .unwrap();
    assert!(stmt.sql.contains(
        "DO UPDATE SET \"hit_count\" = (\"widgets\".\"hit_count\" + EXCLUDED.\"hit_count\") \
         WHERE (\"widgets\".\"hit_count\") IS DISTINCT FROM \
         ((\"widgets\".\"hit_count\" + EXCLUDED.\"hit_count\"))"
    ));
}

#[test]
fn test_missing_fields_become_defaults() {
    let records = vec![Record::new().with("code", "a")];
    let stmt = build(records, &["code"], &UpdateSpec::All, &UpsertOptions::default())
        .unwrap()
        .unwrap();
    assert!(stmt.sql.contains("VALUES ($1::varchar(32), DEFAULT, DEFAULT)"));
    assert_eq!(stmt.params, vec![Value::from("a")]);
}

#[test]
fn test_generated_key_is_inserted_when_it_is_the_conflict_target() {
    let records = vec![Record::new().with("id", 5).with("code", "x")];
    let stmt = build(records, &["id"], &UpdateSpec::All, &UpsertOptions::default())
        .unwrap()
        .unwrap();
    assert!(stmt
        .sql
        .starts_with("INSERT INTO \"widgets\" AS \"widgets\" (\"id\", \"code\", \"hit_count\", \"label\")"));
    assert!(stmt.sql.contains("SET \"code\" = EXCLUDED.\"code\""));
}

#[test]
fn test_empty_batch_returns_none() {
    let stmt = build(vec![], &["code"], &UpdateSpec::All, &UpsertOptions::default()).unwrap();
    assert!(stmt.is_none());
}

#[test]
fn test_unknown_fields_fail_before_empty_batch_short_circuit() {
    let err = build(vec![], &["nope"], &UpdateSpec::All, &UpsertOptions::default()).unwrap_err();
    assert!(err.is_configuration());

    let err = build(
        vec![],
        &["code"],
        &UpdateSpec::fields(["missing"]),
        &UpsertOptions::default(),
    )
    .unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_empty_unique_key_is_rejected() {
    let err = build(records(), &[], &UpdateSpec::All, &UpsertOptions::default()).unwrap_err();
    assert!(matches!(err, BulkError::Configuration(_)));
}

#[test]
fn test_composite_conflict_target() {
    let records = vec![
        Record::new().with("code", "x").with("label", "b"),
        Record::new().with("code", "x").with("label", "a"),
    ];
    let stmt = build(records, &["code", "label"], &UpdateSpec::All, &UpsertOptions::default())
        .unwrap()
        .unwrap();
    assert!(stmt.sql.contains("ON CONFLICT (\"code\", \"label\")"));
    assert_eq!(stmt.params[1], Value::from("a"));
    assert_eq!(stmt.params[3], Value::from("b"));
}

#[test]
fn test_untouched_statement_shape() {
    let records = vec![Record::new()
        .with("code", "a")
        .with("count", 1)
        .with("label", "x")];
    let options = UpsertOptions::default()
        .returning(Returning::fields(["code"]))
        .return_untouched(true);
    let stmt = build(records, &["code"], &UpdateSpec::fields(["label"]), &options)
        .unwrap()
        .unwrap();

    assert_eq!(
        stmt.sql,
        "WITH input_rows(\"_row_index\", \"code\", \"hit_count\", \"label\") AS \
         (VALUES (0, $1::varchar(32), $2::integer, $3::text)), \
         ins AS (INSERT INTO \"widgets\" AS \"widgets\" (\"code\", \"hit_count\", \"label\") \
         SELECT \"code\", \"hit_count\", \"label\" FROM input_rows ORDER BY \"_row_index\" \
         ON CONFLICT (\"code\") DO UPDATE SET \"label\" = EXCLUDED.\"label\" \
         WHERE (\"widgets\".\"label\") IS DISTINCT FROM (EXCLUDED.\"label\") \
         RETURNING \"widgets\".\"code\" AS \"code\", \"widgets\".\"id\" AS \"id\", \
         CASE WHEN \"widgets\".xmax = 0 THEN 'c' ELSE 'u' END AS \"_status\") \
         SELECT DISTINCT ON (\"id\") * FROM (\
         SELECT \"_status\", \"code\", \"id\" FROM ins \
         UNION ALL \
         SELECT 'n' AS \"_status\", \"c\".\"code\" AS \"code\", \"c\".\"id\" AS \"id\" \
         FROM input_rows JOIN \"widgets\" AS \"c\" USING (\"code\")\
         ) AS results \
         ORDER BY results.\"id\", CASE WHEN results.\"_status\" = 'n' THEN 1 ELSE 0 END"
    );
}

#[test]
fn test_untouched_rejects_database_defaults() {
    let records = vec![Record::new().with("code", "a")];
    let options = UpsertOptions::default().return_untouched(true);
    let err = build(records, &["code"], &UpdateSpec::All, &options).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_untouched_requires_primary_key() {
    let table = TableSchema::new("nokey").field(FieldSpec::new("code", "text"));
    let options = UpsertOptions::default().return_untouched(true);
    let err = build_upsert(
        &PostgresDialect,
        &table,
        vec![Record::new().with("code", "a")],
        &["code"],
        &UpdateSpec::All,
        &options,
        now(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("primary key"));
}

#[test]
fn test_auto_timestamps_are_filled_and_not_updated_on_create_fields() {
    let table = TableSchema::new("logs")
        .field(FieldSpec::new("key", "text"))
        .field(FieldSpec::new("created", "timestamp with time zone").auto_now_add())
        .field(FieldSpec::new("modified", "timestamp with time zone").auto_now());
    let stmt = build_upsert(
        &PostgresDialect,
        &table,
        vec![Record::new().with("key", "k")],
        &["key"],
        &UpdateSpec::All,
        &UpsertOptions::default(),
        now(),
    )
    .unwrap()
    .unwrap();

    assert_eq!(
        stmt.params,
        vec![
            Value::from("k"),
            Value::DateTimeUtc(now()),
            Value::DateTimeUtc(now())
        ]
    );
    assert!(stmt.sql.contains("DO UPDATE SET \"modified\" = EXCLUDED.\"modified\""));
    assert!(!stmt.sql.contains("\"created\" = EXCLUDED"));
}
