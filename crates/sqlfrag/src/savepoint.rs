//! Savepoint scoping over any [`GenericClient`].
//!
//! Schema helpers run their statements between `SAVEPOINT` and `RELEASE`, and
//! roll back to the savepoint if any statement fails, so a failing call leaves
//! the surrounding transaction usable. The client must be inside a
//! transaction block.

use crate::client::GenericClient;
use crate::error::SqlResult;
use crate::sql::Sql;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for anonymous savepoint naming.
static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique savepoint name.
pub fn next_savepoint_name() -> String {
    let n = SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("sqlfrag_sp_{n}")
}

/// Execute `statements` in order inside a fresh savepoint.
///
/// Either every statement is applied, or the savepoint is rolled back and the
/// first error is returned.
pub async fn execute_in_savepoint(
    conn: &impl GenericClient,
    statements: &[Sql],
) -> SqlResult<()> {
    let name = next_savepoint_name();
    conn.batch_execute(&format!("SAVEPOINT {name}")).await?;

    for statement in statements {
        if let Err(error) = statement.execute(conn).await {
            if let Err(rollback_err) = conn
                .batch_execute(&format!("ROLLBACK TO SAVEPOINT {name}"))
                .await
            {
                tracing::error!(
                    target: "sqlfrag.schema",
                    savepoint = %name,
                    error = %rollback_err,
                    "rollback to savepoint failed"
                );
            }
            return Err(error);
        }
    }

    conn.batch_execute(&format!("RELEASE SAVEPOINT {name}")).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn savepoint_names_are_unique() {
        let a = next_savepoint_name();
        let b = next_savepoint_name();
        assert_ne!(a, b);
        assert!(a.starts_with("sqlfrag_sp_"));
    }
}
