//! Schema helpers against a recording client: checks the statements sent and
//! the savepoint discipline around them.

use sqlfrag::schema::{self, ColumnSpec};
use sqlfrag::{GenericClient, OnDelete, SqlError, SqlResult};
use std::sync::Mutex;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// Records every statement; queries return no rows.
#[derive(Default)]
struct RecordingClient {
    log: Mutex<Vec<(String, usize)>>,
    fail_on: Option<&'static str>,
}

impl RecordingClient {
    fn failing_on(pattern: &'static str) -> Self {
        Self {
            fail_on: Some(pattern),
            ..Self::default()
        }
    }

    fn record(&self, sql: &str, params: usize) -> SqlResult<()> {
        self.log.lock().unwrap().push((sql.to_string(), params));
        match self.fail_on {
            Some(pattern) if sql.contains(pattern) => {
                Err(SqlError::Other(format!("simulated failure on {pattern:?}")))
            }
            _ => Ok(()),
        }
    }

    /// Statements with the savepoint names normalized to `sp`.
    fn statements(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|(sql, _)| normalize_savepoint(sql))
            .collect()
    }

    fn params_of(&self, index: usize) -> usize {
        self.log.lock().unwrap()[index].1
    }
}

fn normalize_savepoint(sql: &str) -> String {
    match sql.find("sqlfrag_sp_") {
        Some(pos) if sql.contains("SAVEPOINT") => format!("{}sp", &sql[..pos]),
        _ => sql.to_string(),
    }
}

impl GenericClient for RecordingClient {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<Vec<Row>> {
        self.record(sql, params.len())?;
        Ok(vec![])
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<u64> {
        self.record(sql, params.len())?;
        Ok(0)
    }
}

#[tokio::test]
async fn create_column_runs_in_savepoint_with_comment() {
    let client = RecordingClient::default();
    schema::create_column(&client, "res_partner", "ref", "varchar", Some("Partner's ref"))
        .await
        .unwrap();

    assert_eq!(
        client.statements(),
        [
            "SAVEPOINT sp",
            r#"ALTER TABLE "res_partner" ADD COLUMN "ref" varchar"#,
            r#"COMMENT ON COLUMN "res_partner"."ref" IS 'Partner''s ref'"#,
            "RELEASE SAVEPOINT sp",
        ]
    );
}

#[tokio::test]
async fn boolean_columns_default_to_false() {
    let client = RecordingClient::default();
    schema::create_column(&client, "res_partner", "active", "BOOLEAN", None)
        .await
        .unwrap();

    assert_eq!(
        client.statements()[1],
        r#"ALTER TABLE "res_partner" ADD COLUMN "active" BOOLEAN DEFAULT false"#
    );
}

#[tokio::test]
async fn failing_statement_rolls_back_savepoint() {
    let client = RecordingClient::failing_on("COMMENT ON");
    let err = schema::create_column(&client, "res_partner", "ref", "varchar", Some("Ref"))
        .await
        .unwrap_err();

    assert!(matches!(err, SqlError::Other(_)));
    let statements = client.statements();
    assert_eq!(statements.last().unwrap(), "ROLLBACK TO SAVEPOINT sp");
    assert!(!statements.iter().any(|s| s.starts_with("RELEASE")));
}

#[tokio::test]
async fn invalid_identifier_sends_nothing() {
    let client = RecordingClient::default();
    let err = schema::rename_column(&client, "res_partner", "name", "name; DROP TABLE x")
        .await
        .unwrap_err();

    assert!(matches!(err, SqlError::InvalidIdentifier(_)));
    assert!(client.statements().is_empty());
}

#[tokio::test]
async fn create_model_table_with_comments() {
    let client = RecordingClient::default();
    let columns = [
        ColumnSpec::new("name", "varchar").comment("Name"),
        ColumnSpec::new("active", "boolean"),
    ];
    schema::create_model_table(&client, "res_partner", Some("Contact"), &columns)
        .await
        .unwrap();

    assert_eq!(
        client.statements(),
        [
            "SAVEPOINT sp",
            r#"CREATE TABLE "res_partner" (id SERIAL NOT NULL, "name" varchar, "active" boolean, PRIMARY KEY(id))"#,
            r#"COMMENT ON TABLE "res_partner" IS 'Contact'"#,
            r#"COMMENT ON COLUMN "res_partner"."name" IS 'Name'"#,
            "RELEASE SAVEPOINT sp",
        ]
    );
}

#[tokio::test]
async fn add_constraint_failure_is_fatal() {
    let client = RecordingClient::failing_on("ADD CONSTRAINT");
    let err = schema::add_constraint(&client, "res_partner", "res_partner_check_ratio", "CHECK (ratio <= 100%)")
        .await
        .unwrap_err();

    assert!(matches!(err, SqlError::Schema(_)), "{err:?}");
    assert_eq!(
        client.statements()[1],
        r#"ALTER TABLE "res_partner" ADD CONSTRAINT "res_partner_check_ratio" CHECK (ratio <= 100%)"#
    );
}

#[tokio::test]
async fn add_constraint_stores_definition_as_comment() {
    let client = RecordingClient::default();
    schema::add_constraint(&client, "res_partner", "name_uniq", "unique(name)")
        .await
        .unwrap();

    assert_eq!(
        client.statements()[2],
        r#"COMMENT ON CONSTRAINT "name_uniq" ON "res_partner" IS 'unique(name)'"#
    );
}

#[tokio::test]
async fn drop_constraint_failure_is_swallowed() {
    let client = RecordingClient::failing_on("DROP CONSTRAINT");
    let dropped = schema::drop_constraint(&client, "res_partner", "name_uniq")
        .await
        .unwrap();
    assert!(!dropped);

    let client = RecordingClient::default();
    assert!(schema::drop_constraint(&client, "res_partner", "name_uniq").await.unwrap());
}

#[tokio::test]
async fn introspection_binds_names_as_parameters() {
    let client = RecordingClient::default();
    assert!(!schema::table_exists(&client, "res_partner").await.unwrap());
    assert!(!schema::column_exists(&client, "res_partner", "name").await.unwrap());
    assert_eq!(schema::column_type(&client, "res_partner", "name").await.unwrap(), None);
    assert_eq!(schema::table_kind(&client, "res_partner").await.unwrap(), None);

    let statements = client.statements();
    assert!(statements[0].contains("c.relname IN ($1)"), "{}", statements[0]);
    assert!(statements.iter().all(|s| !s.contains("res_partner")));
    assert_eq!(client.params_of(0), 1);
    assert_eq!(client.params_of(1), 2);
}

#[tokio::test]
async fn existing_tables_of_nothing_skips_the_query() {
    let client = RecordingClient::default();
    assert!(schema::existing_tables(&client, &[]).await.unwrap().is_empty());
    assert!(client.statements().is_empty());
}

#[tokio::test]
async fn create_index_when_missing() {
    let client = RecordingClient::default();
    let created = schema::create_index(
        &client,
        "res_partner_name_index",
        "res_partner",
        &["name", "lower(email)"],
        "btree",
        Some("active"),
    )
    .await
    .unwrap();

    assert!(created);
    assert_eq!(client.statements()[1], "SAVEPOINT sp");
    assert_eq!(
        client.statements()[2],
        r#"CREATE INDEX "res_partner_name_index" ON "res_partner" USING btree (name, lower(email)) WHERE active"#
    );
}

#[tokio::test]
async fn create_index_rejects_unknown_method() {
    let client = RecordingClient::default();
    let err = schema::create_index(&client, "i", "t", &["a"], "btree; --", None)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlError::InvalidIdentifier(_)));
}

#[tokio::test]
async fn fix_foreign_key_creates_missing_key() {
    let client = RecordingClient::default();
    let fix = schema::fix_foreign_key(
        &client,
        "res_partner",
        "country_id",
        "res_country",
        "id",
        OnDelete::SetNull,
    )
    .await
    .unwrap();

    assert!(fix.created);
    assert!(fix.dropped.is_empty());
    assert_eq!(
        &client.statements()[1..],
        [
            "SAVEPOINT sp",
            r#"ALTER TABLE "res_partner" ADD FOREIGN KEY ("country_id") REFERENCES "res_country"("id") ON DELETE SET NULL"#,
            "RELEASE SAVEPOINT sp",
        ]
    );
}

#[tokio::test]
async fn convert_column_propagates_other_errors() {
    let client = RecordingClient::failing_on("ALTER COLUMN");
    let err = schema::convert_column(&client, "res_partner", "ref", "int4")
        .await
        .unwrap_err();

    assert!(matches!(err, SqlError::Other(_)));
    assert_eq!(
        client.statements()[1],
        r#"ALTER TABLE "res_partner" ALTER COLUMN "ref" DROP DEFAULT, ALTER COLUMN "ref" TYPE int4 USING "ref"::int4"#
    );
    assert_eq!(client.statements().last().unwrap(), "ROLLBACK TO SAVEPOINT sp");
}

#[tokio::test]
async fn drop_view_if_exists_skips_missing_views() {
    let client = RecordingClient::default();
    assert!(!schema::drop_view_if_exists(&client, "res_partner_report").await.unwrap());
    assert_eq!(client.statements().len(), 1);
}

#[tokio::test]
async fn drop_index_uses_if_exists() {
    let client = RecordingClient::default();
    schema::drop_index(&client, "res_partner_name_index")
        .await
        .unwrap();
    assert_eq!(
        client.statements(),
        [r#"DROP INDEX IF EXISTS "res_partner_name_index""#]
    );
}

#[tokio::test]
async fn single_statement_mutations_run_in_savepoint() {
    let client = RecordingClient::default();
    schema::rename_column(&client, "res_partner", "ref", "code").await.unwrap();
    schema::set_not_null(&client, "res_partner", "code").await.unwrap();
    schema::drop_not_null(&client, "res_partner", "code").await.unwrap();

    assert_eq!(
        client.statements(),
        [
            "SAVEPOINT sp",
            r#"ALTER TABLE "res_partner" RENAME COLUMN "ref" TO "code""#,
            "RELEASE SAVEPOINT sp",
            "SAVEPOINT sp",
            r#"ALTER TABLE "res_partner" ALTER COLUMN "code" SET NOT NULL"#,
            "RELEASE SAVEPOINT sp",
            "SAVEPOINT sp",
            r#"ALTER TABLE "res_partner" ALTER COLUMN "code" DROP NOT NULL"#,
            "RELEASE SAVEPOINT sp",
        ]
    );
}

#[tokio::test]
async fn set_not_null_failure_names_table_and_column() {
    let client = RecordingClient::failing_on("SET NOT NULL");
    let err = schema::set_not_null(&client, "res_partner", "code")
        .await
        .unwrap_err();

    match &err {
        SqlError::Schema(message) => {
            assert!(
                message.starts_with(r#"Table "res_partner": unable to set NOT NULL on column "code""#),
                "{message}"
            );
        }
        other => panic!("expected a schema error, got {other:?}"),
    }
    assert_eq!(client.statements().last().unwrap(), "ROLLBACK TO SAVEPOINT sp");
}

#[tokio::test]
async fn failed_mutations_roll_back_and_report_schema_errors() {
    let client = RecordingClient::failing_on("RENAME COLUMN");
    let err = schema::rename_column(&client, "res_partner", "ref", "code")
        .await
        .unwrap_err();
    assert!(matches!(err, SqlError::Schema(_)), "{err:?}");
    assert_eq!(client.statements().last().unwrap(), "ROLLBACK TO SAVEPOINT sp");

    let client = RecordingClient::failing_on("DROP NOT NULL");
    let err = schema::drop_not_null(&client, "res_partner", "code")
        .await
        .unwrap_err();
    assert!(matches!(err, SqlError::Schema(_)), "{err:?}");
    assert_eq!(client.statements().last().unwrap(), "ROLLBACK TO SAVEPOINT sp");

    let client = RecordingClient::failing_on("ADD FOREIGN KEY");
    let err = schema::add_foreign_key(
        &client,
        "res_partner",
        "country_id",
        "res_country",
        "id",
        OnDelete::Restrict,
    )
    .await
    .unwrap_err();
    match &err {
        SqlError::Schema(message) => assert!(message.contains("res_country(id)"), "{message}"),
        other => panic!("expected a schema error, got {other:?}"),
    }
    let statements = client.statements();
    assert_eq!(statements[0], "SAVEPOINT sp");
    assert_eq!(statements.last().unwrap(), "ROLLBACK TO SAVEPOINT sp");
}

#[tokio::test]
async fn remove_column_looks_up_views_then_drops_in_savepoint() {
    let client = RecordingClient::default();
    schema::remove_column(&client, "res_partner", "ref", true).await.unwrap();

    let statements = client.statements();
    assert!(statements[0].contains("pg_depend"), "{}", statements[0]);
    assert_eq!(client.params_of(0), 2);
    assert_eq!(
        &statements[1..],
        [
            "SAVEPOINT sp",
            r#"ALTER TABLE "res_partner" DROP COLUMN IF EXISTS "ref" CASCADE"#,
            "RELEASE SAVEPOINT sp",
        ]
    );
}

#[tokio::test]
async fn remove_column_without_cascade() {
    let client = RecordingClient::failing_on("DROP COLUMN");
    let err = schema::remove_column(&client, "res_partner", "ref", false)
        .await
        .unwrap_err();

    assert!(matches!(err, SqlError::Schema(_)), "{err:?}");
    let statements = client.statements();
    assert_eq!(statements[2], r#"ALTER TABLE "res_partner" DROP COLUMN IF EXISTS "ref""#);
    assert_eq!(statements.last().unwrap(), "ROLLBACK TO SAVEPOINT sp");
}

#[tokio::test]
async fn remove_column_validates_names_first() {
    let client = RecordingClient::default();
    let err = schema::remove_column(&client, "res_partner", "ref\"", false)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlError::InvalidIdentifier(_)));
    assert!(client.statements().is_empty());
}

#[tokio::test]
async fn get_index_on_binds_table_and_sorted_columns() {
    let client = RecordingClient::default();
    let index = schema::get_index_on(&client, "res_partner", &["name", "company_id"])
        .await
        .unwrap();

    assert_eq!(index, None);
    let statements = client.statements();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].contains("attrs = $2::text[]"), "{}", statements[0]);
    assert!(!statements[0].contains("res_partner"));
    assert_eq!(client.params_of(0), 2);
}
