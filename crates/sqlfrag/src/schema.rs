//! Schema introspection and migration helpers.
//!
//! Every statement here is built from [`Sql`] fragments: names go through
//! [`Sql::identifier`], values are bound or quoted with [`Sql::literal`].
//! Helpers expect the client to be inside a transaction. Multi-statement
//! mutations run in a savepoint and are all-or-nothing per call.
//!
//! Logging goes to the `sqlfrag.schema` tracing target.

use crate::client::GenericClient;
use crate::error::{SqlError, SqlResult};
use crate::ident::is_valid_identifier;
use crate::row::RowExt;
use crate::savepoint::execute_in_savepoint;
use crate::sql::Sql;
use crate::value::Value;
use crate::sql;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tokio_postgres::error::SqlState;

/// Relation kind as reported by `pg_class`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Regular,
    Temporary,
    View,
    Materialized,
    Foreign,
    Other,
}

impl TableKind {
    /// Map `pg_class.relkind` / `relpersistence` to a kind.
    ///
    /// Ordinary, temporary and unlogged tables all have `relkind = 'r'`; only
    /// `relpersistence` tells temporary tables apart.
    pub fn from_pg(relkind: &str, relpersistence: &str) -> Self {
        match relkind {
            "r" if relpersistence == "t" => Self::Temporary,
            "r" => Self::Regular,
            "v" => Self::View,
            "m" => Self::Materialized,
            "f" => Self::Foreign,
            _ => Self::Other,
        }
    }
}

/// A column as described by `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub udt_name: String,
    pub max_length: Option<i32>,
    pub nullable: bool,
}

/// Column definition for [`create_model_table`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: String,
    pub comment: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            comment: None,
        }
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// A view depending on a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependingView {
    pub name: String,
    pub materialized: bool,
}

/// `ON DELETE` action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OnDelete {
    Restrict,
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
}

impl OnDelete {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Restrict => "RESTRICT",
            Self::NoAction => "NO ACTION",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// Code stored in `pg_constraint.confdeltype`.
    pub fn confdeltype(self) -> &'static str {
        match self {
            Self::Restrict => "r",
            Self::NoAction => "a",
            Self::Cascade => "c",
            Self::SetNull => "n",
            Self::SetDefault => "d",
        }
    }
}

impl fmt::Display for OnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for OnDelete {
    type Err = SqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RESTRICT" => Ok(Self::Restrict),
            "NO ACTION" => Ok(Self::NoAction),
            "CASCADE" => Ok(Self::Cascade),
            "SET NULL" => Ok(Self::SetNull),
            "SET DEFAULT" => Ok(Self::SetDefault),
            other => Err(SqlError::construction(format!(
                "unknown ON DELETE action {other:?}"
            ))),
        }
    }
}

/// An index found by [`get_index_on`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    pub primary: bool,
}

/// Outcome of [`fix_foreign_key`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForeignKeyFix {
    /// Constraints that were dropped because they did not match.
    pub dropped: Vec<String>,
    /// Whether the requested foreign key had to be created.
    pub created: bool,
}

fn is_sqlstate(err: &SqlError, state: &SqlState) -> bool {
    match err {
        SqlError::Query(e) => e.code() == Some(state),
        _ => false,
    }
}

// ==================== Introspection ====================

/// Return the subset of `tables` that exist in the current schema.
///
/// Regular tables, views and materialized views count.
pub async fn existing_tables(conn: &impl GenericClient, tables: &[&str]) -> SqlResult<Vec<String>> {
    if tables.is_empty() {
        return Ok(Vec::new());
    }
    let query = sql!(
        "SELECT c.relname::text
           FROM pg_class c
           JOIN pg_namespace n ON (n.oid = c.relnamespace)
          WHERE c.relname IN %s
            AND c.relkind IN ('r', 'v', 'm')
            AND n.nspname = current_schema",
        Value::list(tables.iter().copied()),
    )?;
    query.fetch_scalar_all(conn).await
}

/// Whether `table` exists (as a table, view or materialized view).
pub async fn table_exists(conn: &impl GenericClient, table: &str) -> SqlResult<bool> {
    Ok(existing_tables(conn, &[table]).await?.len() == 1)
}

/// Kind of the relation `table`, or `None` when it does not exist.
pub async fn table_kind(conn: &impl GenericClient, table: &str) -> SqlResult<Option<TableKind>> {
    let query = sql!(
        "SELECT c.relkind::text AS relkind, c.relpersistence::text AS relpersistence
           FROM pg_class c
           JOIN pg_namespace n ON (n.oid = c.relnamespace)
          WHERE c.relname = %s
            AND n.nspname = current_schema",
        table,
    )?;
    let Some(row) = query.fetch_opt(conn).await? else {
        return Ok(None);
    };
    let relkind: String = row.try_get_column("relkind")?;
    let relpersistence: String = row.try_get_column("relpersistence")?;
    Ok(Some(TableKind::from_pg(&relkind, &relpersistence)))
}

/// Columns of `table`, keyed by name.
pub async fn table_columns(
    conn: &impl GenericClient,
    table: &str,
) -> SqlResult<BTreeMap<String, ColumnInfo>> {
    let query = sql!(
        "SELECT column_name::text AS column_name, udt_name::text AS udt_name,
                character_maximum_length::int4 AS max_length, is_nullable::text AS is_nullable
           FROM information_schema.columns
          WHERE table_name = %s",
        table,
    )?;
    let mut columns = BTreeMap::new();
    for row in query.fetch_all(conn).await? {
        let info = ColumnInfo {
            name: row.try_get_column("column_name")?,
            udt_name: row.try_get_column("udt_name")?,
            max_length: row.try_get_column("max_length")?,
            nullable: row.try_get_column::<String>("is_nullable")? == "YES",
        };
        columns.insert(info.name.clone(), info);
    }
    Ok(columns)
}

/// Whether `table.column` exists.
pub async fn column_exists(conn: &impl GenericClient, table: &str, column: &str) -> SqlResult<bool> {
    let query = sql!(
        "SELECT 1 FROM information_schema.columns WHERE table_name = %s AND column_name = %s",
        table,
        column,
    )?;
    query.exists(conn).await
}

/// The `udt_name` of `table.column`, if the column exists.
pub async fn column_type(
    conn: &impl GenericClient,
    table: &str,
    column: &str,
) -> SqlResult<Option<String>> {
    let query = sql!(
        "SELECT udt_name::text FROM information_schema.columns
          WHERE table_name = %s AND column_name = %s",
        table,
        column,
    )?;
    query.fetch_scalar_opt(conn).await
}

/// Definition of a constraint: its comment if any, else the catalog definition.
pub async fn constraint_definition(
    conn: &impl GenericClient,
    table: &str,
    constraint: &str,
) -> SqlResult<Option<String>> {
    let query = sql!(
        "SELECT COALESCE(d.description, pg_get_constraintdef(c.oid))
           FROM pg_constraint c
           JOIN pg_class t ON t.oid = c.conrelid
           LEFT JOIN pg_description d ON c.oid = d.objoid
          WHERE t.relname = %s AND c.conname = %s",
        table,
        constraint,
    )?;
    query.fetch_scalar_opt(conn).await
}

/// Whether an index named `index` exists.
pub async fn index_exists(conn: &impl GenericClient, index: &str) -> SqlResult<bool> {
    sql!("SELECT 1 FROM pg_indexes WHERE indexname = %s", index)?
        .exists(conn)
        .await
}

/// The index of `table` built on exactly `columns` (in any order), if any.
pub async fn get_index_on(
    conn: &impl GenericClient,
    table: &str,
    columns: &[&str],
) -> SqlResult<Option<IndexInfo>> {
    let mut columns = columns.to_vec();
    columns.sort_unstable();
    let query = sql!(
        "SELECT name, indisunique, indisprimary
           FROM (SELECT i.relname::text AS name, x.indisunique, x.indisprimary,
                        array_agg(a.attname::text ORDER BY a.attname) AS attrs
                   FROM (SELECT *, unnest(indkey) AS unnest_indkey FROM pg_index) x
                   JOIN pg_class c ON c.oid = x.indrelid
                   JOIN pg_class i ON i.oid = x.indexrelid
                   JOIN pg_attribute a ON (a.attrelid = c.oid AND a.attnum = x.unnest_indkey)
                  WHERE c.relkind IN ('r', 'm')
                    AND i.relkind = 'i'
                    AND c.relname = %s
                  GROUP BY 1, 2, 3) idx
          WHERE attrs = %s::text[]",
        table,
        Value::array(columns),
    )?;
    let Some(row) = query.fetch_opt(conn).await? else {
        return Ok(None);
    };
    Ok(Some(IndexInfo {
        name: row.try_get_column("name")?,
        unique: row.try_get_column("indisunique")?,
        primary: row.try_get_column("indisprimary")?,
    }))
}

/// Views and materialized views that depend on `table.column`.
pub async fn get_depending_views(
    conn: &impl GenericClient,
    table: &str,
    column: &str,
) -> SqlResult<Vec<DependingView>> {
    let query = sql!(
        "SELECT DISTINCT dependee.relname::text AS name, dependee.relkind::text AS relkind
           FROM pg_depend
           JOIN pg_rewrite ON pg_depend.objid = pg_rewrite.oid
           JOIN pg_class AS dependee ON pg_rewrite.ev_class = dependee.oid
           JOIN pg_class AS dependent ON pg_depend.refobjid = dependent.oid
           JOIN pg_attribute ON pg_depend.refobjid = pg_attribute.attrelid
                AND pg_depend.refobjsubid = pg_attribute.attnum
          WHERE dependent.relname = %s
            AND pg_attribute.attnum > 0
            AND pg_attribute.attname = %s
            AND dependee.relkind IN ('v', 'm')",
        table,
        column,
    )?;
    query
        .fetch_all(conn)
        .await?
        .iter()
        .map(|row| -> SqlResult<DependingView> {
            Ok(DependingView {
                name: row.try_get_column("name")?,
                materialized: row.try_get_column::<String>("relkind")? == "m",
            })
        })
        .collect()
}

/// Names of foreign keys `table1(column1) -> table2(column2)` with the given action.
pub async fn get_foreign_keys(
    conn: &impl GenericClient,
    table1: &str,
    column1: &str,
    table2: &str,
    column2: &str,
    on_delete: OnDelete,
) -> SqlResult<Vec<String>> {
    let query = sql!(
        "SELECT fk.conname::text
           FROM pg_constraint AS fk
           JOIN pg_class AS c1 ON fk.conrelid = c1.oid
           JOIN pg_class AS c2 ON fk.confrelid = c2.oid
           JOIN pg_attribute AS a1 ON a1.attrelid = c1.oid AND fk.conkey[1] = a1.attnum
           JOIN pg_attribute AS a2 ON a2.attrelid = c2.oid AND fk.confkey[1] = a2.attnum
          WHERE fk.contype = 'f'
            AND c1.relname = %s
            AND a1.attname = %s
            AND c2.relname = %s
            AND a2.attname = %s
            AND fk.confdeltype::text = %s",
        table1,
        column1,
        table2,
        column2,
        on_delete.confdeltype(),
    )?;
    query.fetch_scalar_all(conn).await
}

// ==================== Mutations ====================

/// Create the table of a model: `id SERIAL` primary key plus `columns`.
pub async fn create_model_table(
    conn: &impl GenericClient,
    table: &str,
    comment: Option<&str>,
    columns: &[ColumnSpec],
) -> SqlResult<()> {
    let mut colspecs = vec![Sql::verbatim("id SERIAL NOT NULL")];
    for column in columns {
        colspecs.push(sql!(
            "%s %s",
            Sql::identifier(&column.name)?,
            Sql::verbatim(&column.sql_type),
        )?);
    }
    colspecs.push(Sql::verbatim("PRIMARY KEY(id)"));

    let mut statements = vec![sql!(
        "CREATE TABLE %s (%s)",
        Sql::identifier(table)?,
        Sql::verbatim(", ").join(colspecs),
    )?];
    if let Some(comment) = comment {
        statements.push(sql!(
            "COMMENT ON TABLE %s IS %s",
            Sql::identifier(table)?,
            Sql::literal(comment),
        )?);
    }
    for column in columns {
        if let Some(comment) = &column.comment {
            statements.push(sql!(
                "COMMENT ON COLUMN %s IS %s",
                Sql::qualified(table, &column.name)?,
                Sql::literal(comment),
            )?);
        }
    }

    execute_in_savepoint(conn, &statements).await?;
    tracing::debug!(target: "sqlfrag.schema", table, "created table");
    Ok(())
}

/// Add `column` of type `column_type` to `table`.
///
/// Boolean columns get `DEFAULT false`.
pub async fn create_column(
    conn: &impl GenericClient,
    table: &str,
    column: &str,
    column_type: &str,
    comment: Option<&str>,
) -> SqlResult<()> {
    let default = if column_type.eq_ignore_ascii_case("boolean") {
        Sql::verbatim(" DEFAULT false")
    } else {
        Sql::empty()
    };
    let mut statements = vec![sql!(
        "ALTER TABLE %s ADD COLUMN %s %s%s",
        Sql::identifier(table)?,
        Sql::identifier(column)?,
        Sql::verbatim(column_type),
        default,
    )?];
    if let Some(comment) = comment {
        statements.push(sql!(
            "COMMENT ON COLUMN %s IS %s",
            Sql::qualified(table, column)?,
            Sql::literal(comment),
        )?);
    }

    execute_in_savepoint(conn, &statements).await?;
    tracing::debug!(target: "sqlfrag.schema", table, column, column_type, "added column");
    Ok(())
}

/// Run `statements` in a savepoint, turning a failure into `SqlError::Schema`.
async fn apply_or_fail(
    conn: &impl GenericClient,
    statements: &[Sql],
    context: impl FnOnce() -> String,
) -> SqlResult<()> {
    if let Err(e) = execute_in_savepoint(conn, statements).await {
        let message = format!("{}: {e}", context());
        tracing::error!(target: "sqlfrag.schema", "{message}");
        return Err(SqlError::schema(message));
    }
    Ok(())
}

/// Rename `table.old` to `table.new`.
pub async fn rename_column(
    conn: &impl GenericClient,
    table: &str,
    old: &str,
    new: &str,
) -> SqlResult<()> {
    let query = sql!(
        "ALTER TABLE %s RENAME COLUMN %s TO %s",
        Sql::identifier(table)?,
        Sql::identifier(old)?,
        Sql::identifier(new)?,
    )?;
    apply_or_fail(conn, &[query], || {
        format!("Table {table:?}: unable to rename column {old:?} to {new:?}")
    })
    .await?;
    tracing::debug!(target: "sqlfrag.schema", table, old, new, "renamed column");
    Ok(())
}

/// Change the type of `table.column`, casting existing values.
///
/// If Postgres refuses because views depend on the column, those views are
/// dropped and the conversion is retried once, both in a single savepoint.
pub async fn convert_column(
    conn: &impl GenericClient,
    table: &str,
    column: &str,
    column_type: &str,
) -> SqlResult<()> {
    let using = sql!(
        "%s::%s",
        Sql::identifier(column)?,
        Sql::verbatim(column_type)
    )?;
    let query = sql!(
        "ALTER TABLE %s ALTER COLUMN %s DROP DEFAULT, ALTER COLUMN %s TYPE %s USING %s",
        Sql::identifier(table)?,
        Sql::identifier(column)?,
        Sql::identifier(column)?,
        Sql::verbatim(column_type),
        using,
    )?;

    let first = execute_in_savepoint(conn, std::slice::from_ref(&query)).await;
    match first {
        Ok(()) => {}
        Err(e) if is_sqlstate(&e, &SqlState::FEATURE_NOT_SUPPORTED) => {
            let mut statements = depending_view_drops(conn, table, column).await?;
            statements.push(query);
            execute_in_savepoint(conn, &statements).await?;
        }
        Err(e) => return Err(e),
    }
    tracing::debug!(target: "sqlfrag.schema", table, column, column_type, "changed column type");
    Ok(())
}

/// `DROP ... CASCADE` statements for the views depending on `table.column`.
async fn depending_view_drops(
    conn: &impl GenericClient,
    table: &str,
    column: &str,
) -> SqlResult<Vec<Sql>> {
    get_depending_views(conn, table, column)
        .await?
        .iter()
        .map(|view| -> SqlResult<Sql> {
            let kind = if view.materialized {
                "MATERIALIZED VIEW"
            } else {
                "VIEW"
            };
            sql!(
                "DROP %s IF EXISTS %s CASCADE",
                Sql::verbatim(kind),
                Sql::identifier(&view.name)?,
            )
        })
        .collect()
}

/// Drop every view depending on `table.column`, so the column can be altered.
pub async fn drop_depending_views(
    conn: &impl GenericClient,
    table: &str,
    column: &str,
) -> SqlResult<()> {
    let drops = depending_view_drops(conn, table, column).await?;
    if drops.is_empty() {
        return Ok(());
    }
    execute_in_savepoint(conn, &drops).await?;
    tracing::debug!(target: "sqlfrag.schema", table, column, views = drops.len(), "dropped depending views");
    Ok(())
}

/// Drop `table.column` together with the views depending on it.
///
/// With `cascade`, other objects depending on the column (foreign keys
/// pointing at it, for instance) are dropped too. A missing column is not an
/// error.
pub async fn remove_column(
    conn: &impl GenericClient,
    table: &str,
    column: &str,
    cascade: bool,
) -> SqlResult<()> {
    let cascade_clause = if cascade {
        Sql::verbatim(" CASCADE")
    } else {
        Sql::empty()
    };
    let drop_column = sql!(
        "ALTER TABLE %s DROP COLUMN IF EXISTS %s%s",
        Sql::identifier(table)?,
        Sql::identifier(column)?,
        cascade_clause,
    )?;
    let mut statements = depending_view_drops(conn, table, column).await?;
    statements.push(drop_column);

    apply_or_fail(conn, &statements, || {
        format!("Table {table:?}: unable to drop column {column:?}")
    })
    .await?;
    tracing::debug!(target: "sqlfrag.schema", table, column, cascade, "dropped column");
    Ok(())
}

/// Add a `NOT NULL` constraint on `table.column`.
pub async fn set_not_null(conn: &impl GenericClient, table: &str, column: &str) -> SqlResult<()> {
    let query = sql!(
        "ALTER TABLE %s ALTER COLUMN %s SET NOT NULL",
        Sql::identifier(table)?,
        Sql::identifier(column)?,
    )?;
    apply_or_fail(conn, &[query], || {
        format!("Table {table:?}: unable to set NOT NULL on column {column:?}")
    })
    .await?;
    tracing::debug!(target: "sqlfrag.schema", table, column, "added NOT NULL");
    Ok(())
}

/// Drop the `NOT NULL` constraint on `table.column`.
pub async fn drop_not_null(conn: &impl GenericClient, table: &str, column: &str) -> SqlResult<()> {
    let query = sql!(
        "ALTER TABLE %s ALTER COLUMN %s DROP NOT NULL",
        Sql::identifier(table)?,
        Sql::identifier(column)?,
    )?;
    apply_or_fail(conn, &[query], || {
        format!("Table {table:?}: unable to drop NOT NULL on column {column:?}")
    })
    .await?;
    tracing::debug!(target: "sqlfrag.schema", table, column, "dropped NOT NULL");
    Ok(())
}

/// Add constraint `name` with `definition` to `table`.
///
/// The definition is also stored as the constraint's comment, which
/// [`constraint_definition`] returns. Failure is fatal.
pub async fn add_constraint(
    conn: &impl GenericClient,
    table: &str,
    name: &str,
    definition: &str,
) -> SqlResult<()> {
    let statements = [
        sql!(
            "ALTER TABLE %s ADD CONSTRAINT %s %s",
            Sql::identifier(table)?,
            Sql::identifier(name)?,
            Sql::verbatim(definition),
        )?,
        sql!(
            "COMMENT ON CONSTRAINT %s ON %s IS %s",
            Sql::identifier(name)?,
            Sql::identifier(table)?,
            Sql::literal(definition),
        )?,
    ];

    apply_or_fail(conn, &statements, || {
        format!("Table {table:?}: unable to add constraint {name:?} as {definition}")
    })
    .await?;
    tracing::debug!(target: "sqlfrag.schema", table, constraint = name, definition, "added constraint");
    Ok(())
}

/// Drop constraint `name` from `table`.
///
/// Database failures are logged and swallowed; returns whether the
/// constraint was dropped.
pub async fn drop_constraint(conn: &impl GenericClient, table: &str, name: &str) -> SqlResult<bool> {
    let query = sql!(
        "ALTER TABLE %s DROP CONSTRAINT %s",
        Sql::identifier(table)?,
        Sql::identifier(name)?,
    )?;
    match execute_in_savepoint(conn, std::slice::from_ref(&query)).await {
        Ok(()) => {
            tracing::debug!(target: "sqlfrag.schema", table, constraint = name, "dropped constraint");
            Ok(true)
        }
        Err(e) => {
            tracing::warn!(target: "sqlfrag.schema", table, constraint = name, error = %e, "unable to drop constraint");
            Ok(false)
        }
    }
}

/// Add a foreign key `table1(column1) -> table2(column2)`.
pub async fn add_foreign_key(
    conn: &impl GenericClient,
    table1: &str,
    column1: &str,
    table2: &str,
    column2: &str,
    on_delete: OnDelete,
) -> SqlResult<()> {
    let query = sql!(
        "ALTER TABLE %s ADD FOREIGN KEY (%s) REFERENCES %s(%s) ON DELETE %s",
        Sql::identifier(table1)?,
        Sql::identifier(column1)?,
        Sql::identifier(table2)?,
        Sql::identifier(column2)?,
        Sql::verbatim(on_delete.as_sql()),
    )?;
    apply_or_fail(conn, &[query], || {
        format!("Table {table1:?}: unable to add foreign key ({column1}) referencing {table2}({column2})")
    })
    .await?;
    tracing::debug!(
        target: "sqlfrag.schema",
        table = table1,
        column = column1,
        references = %format!("{table2}({column2})"),
        on_delete = %on_delete,
        "added foreign key"
    );
    Ok(())
}

/// Make the foreign keys on `table1.column1` match exactly one key
/// `-> table2(column2) ON DELETE on_delete`.
///
/// Single-column keys on the column that differ are dropped; the requested
/// key is created when it does not exist yet.
pub async fn fix_foreign_key(
    conn: &impl GenericClient,
    table1: &str,
    column1: &str,
    table2: &str,
    column2: &str,
    on_delete: OnDelete,
) -> SqlResult<ForeignKeyFix> {
    let query = sql!(
        "SELECT con.conname::text AS conname, c2.relname::text AS table2,
                a2.attname::text AS column2, con.confdeltype::text AS deltype
           FROM pg_constraint AS con, pg_class AS c1, pg_class AS c2,
                pg_attribute AS a1, pg_attribute AS a2
          WHERE con.contype = 'f' AND con.conrelid = c1.oid AND con.confrelid = c2.oid
            AND array_lower(con.conkey, 1) = 1 AND con.conkey[1] = a1.attnum
            AND array_lower(con.confkey, 1) = 1 AND con.confkey[1] = a2.attnum
            AND a1.attrelid = c1.oid AND a2.attrelid = c2.oid
            AND c1.relname = %s AND a1.attname = %s",
        table1,
        column1,
    )?;

    let mut fix = ForeignKeyFix::default();
    let mut found = false;
    for row in query.fetch_all(conn).await? {
        let conname: String = row.try_get_column("conname")?;
        let target_table: String = row.try_get_column("table2")?;
        let target_column: String = row.try_get_column("column2")?;
        let deltype: String = row.try_get_column("deltype")?;

        let matches = target_table == table2
            && target_column == column2
            && deltype == on_delete.confdeltype();
        if matches && !found {
            found = true;
        } else if drop_constraint(conn, table1, &conname).await? {
            fix.dropped.push(conname);
        }
    }

    if !found {
        add_foreign_key(conn, table1, column1, table2, column2, on_delete).await?;
        fix.created = true;
    }
    Ok(fix)
}

/// Create index `name` on `table` unless an index with that name exists.
///
/// `expressions` and `where_clause` are trusted SQL. Returns whether the index
/// was created.
pub async fn create_index(
    conn: &impl GenericClient,
    name: &str,
    table: &str,
    expressions: &[&str],
    method: &str,
    where_clause: Option<&str>,
) -> SqlResult<bool> {
    if !is_valid_identifier(method) {
        return Err(SqlError::InvalidIdentifier(method.to_string()));
    }
    if index_exists(conn, name).await? {
        return Ok(false);
    }
    let predicate = match where_clause {
        Some(clause) if !clause.is_empty() => sql!(" WHERE %s", Sql::verbatim(clause))?,
        _ => Sql::empty(),
    };
    let query = sql!(
        "CREATE INDEX %s ON %s USING %s (%s)%s",
        Sql::identifier(name)?,
        Sql::identifier(table)?,
        Sql::verbatim(method),
        Sql::verbatim(", ").join(expressions.iter().map(|e| Sql::verbatim(e))),
        predicate,
    )?;
    apply_or_fail(conn, &[query], || {
        format!("Table {table:?}: unable to create index {name:?}")
    })
    .await?;
    tracing::debug!(target: "sqlfrag.schema", table, index = name, expressions = %expressions.join(", "), "created index");
    Ok(true)
}

/// Create unique index `name` on `table` unless it exists.
pub async fn create_unique_index(
    conn: &impl GenericClient,
    name: &str,
    table: &str,
    expressions: &[&str],
) -> SqlResult<bool> {
    if index_exists(conn, name).await? {
        return Ok(false);
    }
    let query = sql!(
        "CREATE UNIQUE INDEX %s ON %s (%s)",
        Sql::identifier(name)?,
        Sql::identifier(table)?,
        Sql::verbatim(", ").join(expressions.iter().map(|e| Sql::verbatim(e))),
    )?;
    apply_or_fail(conn, &[query], || {
        format!("Table {table:?}: unable to create unique index {name:?}")
    })
    .await?;
    tracing::debug!(target: "sqlfrag.schema", table, index = name, expressions = %expressions.join(", "), "created unique index");
    Ok(true)
}

/// Drop index `name` if it exists.
pub async fn drop_index(conn: &impl GenericClient, name: &str) -> SqlResult<()> {
    sql!("DROP INDEX IF EXISTS %s", Sql::identifier(name)?)?
        .execute(conn)
        .await?;
    tracing::debug!(target: "sqlfrag.schema", index = name, "dropped index");
    Ok(())
}

/// Drop `view` if it is a view or materialized view. Returns whether it was dropped.
pub async fn drop_view_if_exists(conn: &impl GenericClient, view: &str) -> SqlResult<bool> {
    let kind = match table_kind(conn, view).await? {
        Some(TableKind::View) => "VIEW",
        Some(TableKind::Materialized) => "MATERIALIZED VIEW",
        _ => return Ok(false),
    };
    sql!(
        "DROP %s %s CASCADE",
        Sql::verbatim(kind),
        Sql::identifier(view)?
    )?
    .execute(conn)
    .await?;
    tracing::debug!(target: "sqlfrag.schema", view, "dropped view");
    Ok(true)
}

// ==================== Utilities ====================

/// `VARCHAR(size)`, or unbounded `VARCHAR` for size 0.
pub fn pg_varchar(size: usize) -> String {
    if size > 0 {
        format!("VARCHAR({size})")
    } else {
        "VARCHAR".to_string()
    }
}

/// Escape `\`, `%` and `_` so `s` matches literally in a `LIKE` pattern.
pub fn escape_psql(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Reverse an `ORDER BY` specification: `"a, b desc"` becomes `"a desc, b asc"`.
pub fn reverse_order(order: &str) -> String {
    order
        .split(',')
        .filter_map(|item| {
            let mut words = item.split_whitespace();
            let term = words.next()?.to_lowercase();
            let rest: Vec<String> = words.map(str::to_lowercase).collect();
            let direction = if rest == ["desc"] { "asc" } else { "desc" };
            Some(format!("{term} {direction}"))
        })
        .collect::<Vec<_>>()
        .join(", ")
}
