//! Streaming COPY in text and binary format.

#[cfg(test)]
mod tests {
    use crate::fixtures::{TestTable, column, test_connection};
    use anyhow::Result;
    use pgbulk_core::{BulkError, CopyOptions, Record, Value, copy};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const EVENTS: &str = "id bigserial PRIMARY KEY, \
                          kind varchar(20) NOT NULL, \
                          payload jsonb, \
                          amount numeric(10,3), \
                          tags text[], \
                          blob bytea, \
                          at timestamptz";

    fn event(n: i64) -> Record {
        Record::new()
            .with("kind", format!("kind\t{}\\x", n))
            .with("payload", serde_json::json!({"n": n, "note": "line\nbreak"}))
            .with("amount", Value::Decimal(format!("{}.125", n)))
            .with(
                "tags",
                Value::Array(vec![Value::from("a b"), Value::from("q\"t"), Value::Null]),
            )
            .with("blob", vec![0_u8, 1, 0xff])
            .with(
                "at",
                chrono::DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
                    .map(|t| t.with_timezone(&chrono::Utc))
                    .expect("valid timestamp"),
            )
    }

    #[rstest]
    #[case::text(false)]
    #[case::binary(true)]
    #[tokio::test]
    async fn test_copy_round_trip(#[case] binary: bool) -> Result<()> {
        let conn = test_connection().await?;
        let table = TestTable::create(&conn, "events", EVENTS).await?;

        let records: Vec<Record> = (1..=250).map(event).collect();
        let copied = copy(
            &conn,
            &table.schema,
            records,
            &[],
            &CopyOptions::default().binary(binary),
        )
        .await?;
        assert_eq!(copied, 250);

        let rows = table.rows(&conn, "id").await?;
        assert_eq!(rows.len(), 250);
        let first = &rows[0];
        assert_eq!(first.get_by_name("kind"), Some(&Value::from("kind\t1\\x")));
        assert_eq!(
            first.get_by_name("payload"),
            Some(&Value::Json(serde_json::json!({"n": 1, "note": "line\nbreak"})))
        );
        assert_eq!(first.get_by_name("amount"), Some(&Value::Decimal("1.125".into())));
        assert_eq!(
            first.get_by_name("tags"),
            Some(&Value::Array(vec![
                Value::from("a b"),
                Value::from("q\"t"),
                Value::Null
            ]))
        );
        assert_eq!(first.get_by_name("blob"), Some(&Value::Bytes(vec![0, 1, 0xff])));
        Ok(())
    }

    #[rstest]
    #[case::text(false)]
    #[case::binary(true)]
    #[tokio::test]
    async fn test_copy_named_fields_and_nulls(#[case] binary: bool) -> Result<()> {
        let conn = test_connection().await?;
        let table = TestTable::create(&conn, "events", EVENTS).await?;

        let records = vec![
            Record::new().with("kind", "a").with("amount", Value::Null),
            Record::new().with("kind", "b").with("amount", Value::Int32(4)),
        ];
        copy(
            &conn,
            &table.schema,
            records,
            &["kind", "amount"],
            &CopyOptions::default().binary(binary),
        )
        .await?;

        let rows = table.rows(&conn, "kind").await?;
        assert_eq!(
            column(&rows, "amount"),
            vec![Value::Null, Value::Decimal("4.000".into())]
        );
        assert_eq!(column(&rows, "payload"), vec![Value::Null, Value::Null]);
        Ok(())
    }

    #[tokio::test]
    async fn test_copy_rejects_missing_values_before_sending() -> Result<()> {
        let conn = test_connection().await?;
        let table = TestTable::create(&conn, "events", EVENTS).await?;

        let err = copy(
            &conn,
            &table.schema,
            vec![Record::new().with("kind", "a")],
            &["kind", "amount"],
            &CopyOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BulkError::Configuration(_)));
        assert_eq!(table.count(&conn).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_binary_copy_of_custom_type_is_not_supported() -> Result<()> {
        let conn = test_connection().await?;
        let type_name = format!("mood_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        conn.batch_execute(&format!("CREATE TYPE {} AS ENUM ('ok', 'meh')", type_name))
            .await?;
        let table = TestTable::create(&conn, "moods", &format!("feeling {}", type_name)).await?;
        let records = || vec![Record::new().with("feeling", "ok")];

        let err = copy(
            &conn,
            &table.schema,
            records(),
            &[],
            &CopyOptions::default().binary(true),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BulkError::NotSupported(_)), "unexpected error: {err}");

        // The text format lets the server parse the label
        let copied = copy(&conn, &table.schema, records(), &[], &CopyOptions::default()).await?;
        assert_eq!(copied, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_copy_empty_batch() -> Result<()> {
        let conn = test_connection().await?;
        let table = TestTable::create(&conn, "events", EVENTS).await?;
        let copied = copy(&conn, &table.schema, vec![], &[], &CopyOptions::default()).await?;
        assert_eq!(copied, 0);
        Ok(())
    }
}
