//! # sqlfrag
//!
//! Immutable, composable SQL fragments for PostgreSQL.
//!
//! ## Features
//!
//! - **Composable**: fragments nest inside fragments; parameters follow placeholders
//! - **Never interpolated**: values are always bound, identifiers always quoted and checked
//! - **Immutable**: every operation returns a new [`Sql`]; fragments are `Send + Sync`
//! - **Schema helpers**: introspection and DDL built from fragments, savepoint-scoped
//! - **Transaction-friendly**: pass a transaction anywhere a `GenericClient` is expected
//!
//! ## Composing fragments
//!
//! ```ignore
//! use sqlfrag::{Sql, sql};
//!
//! let ids = Sql::verbatim(", ").join([1, 2, 3]);
//! let cond = sql!("%s IN (%s)", Sql::qualified("p", "id")?, ids)?;
//! let query = sql!(
//!     "SELECT %(col)s FROM %(table)s p WHERE %(cond)s",
//!     col = Sql::identifier("name")?,
//!     table = Sql::identifier("res_partner")?,
//!     cond = cond,
//! )?;
//!
//! assert_eq!(
//!     query.code(),
//!     r#"SELECT "name" FROM "res_partner" p WHERE "p"."id" IN (%s, %s, %s)"#,
//! );
//! let names: Vec<String> = query.fetch_scalar_all(&client).await?;
//! ```
//!
//! ## Schema helpers
//!
//! ```ignore
//! use sqlfrag::schema;
//!
//! let tx = client.transaction().await?;
//! if !schema::column_exists(&tx, "res_partner", "ref").await? {
//!     schema::create_column(&tx, "res_partner", "ref", "varchar", Some("Reference")).await?;
//! }
//! tx.commit().await?;
//! ```

pub mod client;
pub mod error;
pub mod ident;
pub mod row;
pub mod savepoint;
pub mod schema;
pub mod sql;
pub mod template;
pub mod value;

pub use client::GenericClient;
pub use error::{SqlError, SqlResult};
pub use ident::{make_identifier, make_index_name};
pub use row::RowExt;
pub use schema::{ForeignKeyFix, IndexInfo, OnDelete, TableKind};
pub use sql::{Arg, FieldRef, PlaceholderStyle, Sql, SqlBuilder, Template};
pub use value::Value;

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config};
