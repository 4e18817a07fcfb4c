//! Bulk update keyed by the primary key.

#[cfg(test)]
mod tests {
    use crate::fixtures::{TestTable, column, test_connection};
    use anyhow::Result;
    use pgbulk_core::{
        Expr, Record, Returning, RowStatus, UpdateField, UpdateOptions, UpdateSpec,
        UpsertOptions, Value, update, upsert,
    };
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const ACCOUNTS: &str = "id bigint PRIMARY KEY, owner text NOT NULL, balance numeric(12,2)";

    fn account(id: i64, owner: &str, balance: &str) -> Record {
        Record::new()
            .with("id", id)
            .with("owner", owner)
            .with("balance", Value::Decimal(balance.into()))
    }

    async fn seeded(conn: &pgbulk_postgres::PostgresConnection) -> Result<TestTable> {
        let table = TestTable::create(conn, "accounts", ACCOUNTS).await?;
        upsert(
            conn,
            &table.schema,
            vec![account(1, "al", "10.00"), account(2, "bo", "20.00"), account(3, "cy", "30.00")],
            &["id"],
            &UpdateSpec::All,
            &UpsertOptions::default(),
        )
        .await?;
        Ok(table)
    }

    #[tokio::test]
    async fn test_update_changes_only_listed_fields() -> Result<()> {
        let conn = test_connection().await?;
        let table = seeded(&conn).await?;

        update(
            &conn,
            &table.schema,
            vec![account(2, "bob", "99.00"), account(1, "alan", "99.00")],
            &UpdateSpec::fields(["owner"]),
            &UpdateOptions::default(),
        )
        .await?;

        let rows = table.rows(&conn, "id").await?;
        assert_eq!(
            column(&rows, "owner"),
            vec![Value::from("alan"), Value::from("bob"), Value::from("cy")]
        );
        assert_eq!(
            column(&rows, "balance"),
            vec![
                Value::Decimal("10.00".into()),
                Value::Decimal("20.00".into()),
                Value::Decimal("30.00".into())
            ]
        );
        Ok(())
    }

    #[rstest]
    #[case::suppressed(true, 1)]
    #[case::always_written(false, 2)]
    #[tokio::test]
    async fn test_update_returning_reports_written_rows(
        #[case] suppress: bool,
        #[case] expected: usize,
    ) -> Result<()> {
        let conn = test_connection().await?;
        let table = seeded(&conn).await?;

        // Row 1 is unchanged, row 2 gets a new owner
        let result = update(
            &conn,
            &table.schema,
            vec![account(1, "al", "10.00"), account(2, "bea", "20.00")],
            &UpdateSpec::All,
            &UpdateOptions::default()
                .suppress_redundant(suppress)
                .returning(Returning::fields(["id", "owner"])),
        )
        .await?
        .expect("rows were requested");

        assert_eq!(result.len(), expected);
        assert!(result.iter().all(|r| r.status() == RowStatus::Updated));
        assert!(
            result
                .iter()
                .any(|r| r.get("owner") == Some(&Value::from("bea")))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_update_with_expression() -> Result<()> {
        let conn = test_connection().await?;
        let table = seeded(&conn).await?;

        let spec = UpdateSpec::Fields(vec![UpdateField::expr(
            "balance",
            Expr::col("balance") + Expr::proposed("balance"),
        )]);
        update(
            &conn,
            &table.schema,
            vec![
                Record::new().with("id", 3_i64).with("balance", Value::Decimal("0.50".into())),
            ],
            &spec,
            &UpdateOptions::default(),
        )
        .await?;

        let rows = table.rows(&conn, "id").await?;
        assert_eq!(column(&rows, "balance")[2], Value::Decimal("30.50".into()));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_with_no_fields_is_a_no_op() -> Result<()> {
        let conn = test_connection().await?;
        let table = seeded(&conn).await?;

        let result = update(
            &conn,
            &table.schema,
            vec![account(1, "zed", "0.00")],
            &UpdateSpec::none(),
            &UpdateOptions::default(),
        )
        .await?;
        assert!(result.is_none());

        let rows = table.rows(&conn, "id").await?;
        assert_eq!(column(&rows, "owner")[0], Value::from("al"));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_ignores_unknown_keys() -> Result<()> {
        let conn = test_connection().await?;
        let table = seeded(&conn).await?;

        let result = update(
            &conn,
            &table.schema,
            vec![account(42, "ghost", "1.00")],
            &UpdateSpec::All,
            &UpdateOptions::default().returning(true),
        )
        .await?
        .expect("rows were requested");
        assert!(result.is_empty());
        assert_eq!(table.count(&conn).await?, 3);
        Ok(())
    }
}
