//! Generic client trait for unified database access.

use crate::error::{SqlError, SqlResult};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// A trait that unifies database clients and transactions.
///
/// Fragments and schema helpers accept any `GenericClient`, so the same call
/// works on a plain connection, a transaction, or a pooled client.
pub trait GenericClient: Send + Sync {
    /// Execute a query and return all rows.
    fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = SqlResult<Vec<Row>>> + Send;

    /// Execute a query and return the **first** row.
    ///
    /// Returns `SqlError::NotFound` if no rows are returned. Extra rows are ignored.
    fn query_one(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = SqlResult<Row>> + Send {
        async move {
            let rows = self.query(sql, params).await?;
            rows.into_iter()
                .next()
                .ok_or_else(|| SqlError::not_found("Expected one row, got none"))
        }
    }

    /// Execute a query and return the first row, if any.
    fn query_opt(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = SqlResult<Option<Row>>> + Send {
        async move {
            let rows = self.query(sql, params).await?;
            Ok(rows.into_iter().next())
        }
    }

    /// Execute a statement and return the number of affected rows.
    fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = SqlResult<u64>> + Send;

    /// Execute one or more statements without parameters.
    ///
    /// Used for transaction control (`SAVEPOINT`, `RELEASE`, ...). The default
    /// implementation goes through [`GenericClient::execute`].
    fn batch_execute(
        &self,
        sql: &str,
    ) -> impl std::future::Future<Output = SqlResult<()>> + Send {
        async move {
            self.execute(sql, &[]).await?;
            Ok(())
        }
    }
}

impl GenericClient for tokio_postgres::Client {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<Vec<Row>> {
        tokio_postgres::Client::query(self, sql, params)
            .await
            .map_err(SqlError::from_db_error)
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<u64> {
        tokio_postgres::Client::execute(self, sql, params)
            .await
            .map_err(SqlError::from_db_error)
    }

    async fn batch_execute(&self, sql: &str) -> SqlResult<()> {
        tokio_postgres::Client::batch_execute(self, sql)
            .await
            .map_err(SqlError::from_db_error)
    }
}

impl GenericClient for tokio_postgres::Transaction<'_> {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<Vec<Row>> {
        tokio_postgres::Transaction::query(self, sql, params)
            .await
            .map_err(SqlError::from_db_error)
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<u64> {
        tokio_postgres::Transaction::execute(self, sql, params)
            .await
            .map_err(SqlError::from_db_error)
    }

    async fn batch_execute(&self, sql: &str) -> SqlResult<()> {
        tokio_postgres::Transaction::batch_execute(self, sql)
            .await
            .map_err(SqlError::from_db_error)
    }
}

// ===== deadpool-postgres support =====

#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::Client {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<Vec<Row>> {
        // Delegate to the deref target (ClientWrapper / tokio_postgres::Client).
        GenericClient::query(&**self, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<u64> {
        GenericClient::execute(&**self, sql, params).await
    }

    async fn batch_execute(&self, sql: &str) -> SqlResult<()> {
        GenericClient::batch_execute(&**self, sql).await
    }
}

#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::ClientWrapper {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<Vec<Row>> {
        GenericClient::query(&**self, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<u64> {
        GenericClient::execute(&**self, sql, params).await
    }

    async fn batch_execute(&self, sql: &str) -> SqlResult<()> {
        GenericClient::batch_execute(&**self, sql).await
    }
}

#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::Transaction<'_> {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<Vec<Row>> {
        GenericClient::query(&**self, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<u64> {
        GenericClient::execute(&**self, sql, params).await
    }

    async fn batch_execute(&self, sql: &str) -> SqlResult<()> {
        GenericClient::batch_execute(&**self, sql).await
    }
}
