//! Immutable, composable SQL fragments.
//!
//! A [`Sql`] pairs code containing `%s` placeholders with the ordered values
//! bound to them. Fragments nest: a fragment passed as an argument is spliced
//! into the template in place of its `%s`, and its parameters are spliced into
//! the parameter list at the same position. The number of `%s` in
//! [`Sql::code`] always equals the length of [`Sql::params`].
//!
//! # Example
//!
//! ```ignore
//! use sqlfrag::{Sql, sql};
//!
//! let table = Sql::identifier("res_partner")?;
//! let cond = sql!("active = %s AND name ILIKE %s", true, "%acme%")?;
//! let query = sql!("SELECT id FROM %s WHERE %s", table, cond)?;
//!
//! assert_eq!(query.code(), r#"SELECT id FROM "res_partner" WHERE active = %s AND name ILIKE %s"#);
//! let ids: Vec<i32> = query.fetch_scalar_all(&client).await?;
//! ```

mod builder;


pub use builder::{SqlBuilder, Template};

use crate::client::GenericClient;
use crate::error::{SqlError, SqlResult};
use crate::ident;
use crate::template;
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::borrow::Cow;
use std::fmt;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, ToSql};
use uuid::Uuid;

/// A reference to an ORM field whose pending writes should reach the
/// database before a fragment mentioning it runs.
///
/// Purely advisory: it never affects the code or parameters of a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub model: String,
    pub name: String,
}

impl FieldRef {
    pub fn new(model: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.model, self.name)
    }
}

/// How placeholders are written when a fragment is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `%s` placeholders and `%%` escapes, as stored.
    #[default]
    Format,
    /// `$1, $2, ...` placeholders as expected by `tokio-postgres`.
    ///
    /// [`Value::List`] parameters expand to `($1, $2, ...)`.
    Numbered,
}

/// An argument to fragment construction or [`Sql::join`].
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// A nested fragment, spliced into the code.
    Sql(Sql),
    /// A plain value, bound to a `%s` placeholder.
    Value(Value),
}

impl From<Sql> for Arg {
    fn from(v: Sql) -> Self {
        Arg::Sql(v)
    }
}

impl From<&Sql> for Arg {
    fn from(v: &Sql) -> Self {
        Arg::Sql(v.clone())
    }
}

impl From<Value> for Arg {
    fn from(v: Value) -> Self {
        Arg::Value(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Arg {
    fn from(v: Option<T>) -> Self {
        Arg::Value(v.into())
    }
}

macro_rules! impl_from_arg {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Arg {
                fn from(v: $ty) -> Self {
                    Arg::Value(Value::from(v))
                }
            }
        )*
    };
}

impl_from_arg!(
    bool,
    i16,
    i32,
    i64,
    u32,
    f32,
    f64,
    String,
    &str,
    &String,
    Vec<u8>,
    NaiveDate,
    NaiveDateTime,
    DateTime<Utc>,
    Uuid,
    serde_json::Value,
);

#[cfg(feature = "rust_decimal")]
impl_from_arg!(rust_decimal::Decimal);

/// An immutable piece of parameterized SQL.
///
/// Equality compares code and parameters only; flush hints are ignored.
#[derive(Clone, Default)]
pub struct Sql {
    code: String,
    params: Vec<Value>,
    to_flush: Vec<FieldRef>,
}

impl Sql {
    /// The empty fragment.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A fragment of literal code without parameters.
    ///
    /// Fails if `code` contains placeholders or a stray `%`.
    pub fn new(code: impl Into<String>) -> SqlResult<Self> {
        let code = code.into();
        template::validate_literal(&code)?;
        Ok(Self {
            code,
            params: Vec::new(),
            to_flush: Vec::new(),
        })
    }

    /// Build a fragment from a `%s` template and positional arguments.
    pub fn positional<I, A>(template: &str, args: I) -> SqlResult<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        Self::compose(template, args.into_iter().map(Into::into).collect(), None)
    }

    /// Build a fragment from a `%(name)s` template and named arguments.
    pub fn named<I, K, A>(template: &str, args: I) -> SqlResult<Self>
    where
        I: IntoIterator<Item = (K, A)>,
        K: Into<String>,
        A: Into<Arg>,
    {
        args.into_iter()
            .fold(Self::build(template), |b, (k, v)| b.named(k, v))
            .finish()
    }

    /// Start a general construction; see [`SqlBuilder`].
    pub fn build(template: impl Into<Template>) -> SqlBuilder {
        SqlBuilder::new(template.into())
    }

    /// Quote `name` as an identifier: `"name"`.
    pub fn identifier(name: &str) -> SqlResult<Self> {
        Self::quoted(name, None, None)
    }

    /// Quote a qualified identifier: `"name"."subname"`.
    pub fn qualified(name: &str, subname: &str) -> SqlResult<Self> {
        Self::quoted(name, Some(subname), None)
    }

    /// Like [`Sql::identifier`] / [`Sql::qualified`], recording a flush hint.
    pub fn identifier_to_flush(
        name: &str,
        subname: Option<&str>,
        field: FieldRef,
    ) -> SqlResult<Self> {
        Self::quoted(name, subname, Some(field))
    }

    fn quoted(name: &str, subname: Option<&str>, to_flush: Option<FieldRef>) -> SqlResult<Self> {
        ident::check_identifier(name)?;
        let mut code = String::with_capacity(name.len() + 2);
        ident::quote(name, &mut code);
        if let Some(subname) = subname {
            ident::check_identifier(subname)?;
            code.push('.');
            ident::quote(subname, &mut code);
        }
        Ok(Self {
            code,
            params: Vec::new(),
            to_flush: to_flush.into_iter().collect(),
        })
    }

    /// Quote `text` as a string literal inside the code.
    ///
    /// For utility statements that cannot take bind parameters, such as
    /// `COMMENT ON ... IS '...'`. Prefer a bound value everywhere else.
    pub fn literal(text: &str) -> Self {
        let mut code = String::with_capacity(text.len() + 3);
        if text.contains('\\') {
            code.push('E');
        }
        code.push('\'');
        for c in text.chars() {
            match c {
                '\'' => code.push_str("''"),
                '\\' => code.push_str("\\\\"),
                '%' => code.push_str("%%"),
                c => code.push(c),
            }
        }
        code.push('\'');
        Self {
            code,
            params: Vec::new(),
            to_flush: Vec::new(),
        }
    }

    /// Trusted code taken as-is, with every `%` escaped.
    ///
    /// Meant for DDL pieces owned by the caller (column types, constraint
    /// definitions, index expressions). Never pass user input here.
    pub fn verbatim(code: &str) -> Self {
        Self {
            code: code.replace('%', "%%"),
            params: Vec::new(),
            to_flush: Vec::new(),
        }
    }

    /// Positional construction: splice fragments, bind plain values.
    pub(crate) fn compose(
        template: &str,
        args: Vec<Arg>,
        to_flush: Option<FieldRef>,
    ) -> SqlResult<Self> {
        if args.is_empty() {
            template::validate_literal(template)?;
            return Ok(Self {
                code: template.to_string(),
                params: Vec::new(),
                to_flush: to_flush.into_iter().collect(),
            });
        }

        let mut codes: Vec<Cow<'static, str>> = Vec::with_capacity(args.len());
        let mut params = Vec::with_capacity(args.len());
        let mut hints = Vec::new();
        for arg in args {
            match arg {
                Arg::Sql(sql) => {
                    codes.push(Cow::Owned(sql.code));
                    params.extend(sql.params);
                    hints.extend(sql.to_flush);
                }
                Arg::Value(value) => {
                    codes.push(Cow::Borrowed("%s"));
                    params.push(value);
                }
            }
        }
        hints.extend(to_flush);

        Ok(Self {
            code: template::substitute(template, &codes)?,
            params,
            to_flush: hints,
        })
    }

    /// Concatenate `items` with `self` between consecutive items.
    ///
    /// - no items: the empty fragment
    /// - a single fragment: that fragment, unchanged
    /// - otherwise parameters follow document order: item, separator, item, ...
    pub fn join<I, A>(&self, items: I) -> Sql
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        let mut items: Vec<Arg> = items.into_iter().map(Into::into).collect();
        if items.is_empty() {
            return Sql::empty();
        }
        if items.len() == 1 && matches!(items[0], Arg::Sql(_)) {
            if let Some(Arg::Sql(only)) = items.pop() {
                return only;
            }
        }

        let gaps = items.len() - 1;
        let mut code = String::with_capacity(self.code.len() * gaps + items.len() * 8);
        let mut params = Vec::with_capacity(items.len() + self.params.len() * gaps);
        let mut to_flush = Vec::new();
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                code.push_str(&self.code);
                params.extend_from_slice(&self.params);
                to_flush.extend_from_slice(&self.to_flush);
            }
            match item {
                Arg::Sql(sql) => {
                    code.push_str(&sql.code);
                    params.extend(sql.params);
                    to_flush.extend(sql.to_flush);
                }
                Arg::Value(value) => {
                    code.push_str("%s");
                    params.push(value);
                }
            }
        }
        Sql {
            code,
            params,
            to_flush,
        }
    }

    /// The combined code, with `%s` placeholders.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The combined parameters, in placeholder order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Flush hints gathered through composition, in encounter order.
    pub fn to_flush(&self) -> impl Iterator<Item = &FieldRef> + '_ {
        self.to_flush.iter()
    }

    /// `true` for the empty fragment (code is `""`).
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Number of `%s` placeholders in [`Sql::code`].
    pub fn placeholder_count(&self) -> usize {
        template::placeholder_count(&self.code)
    }

    /// Split into `(code, params)`.
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.code, self.params)
    }

    /// Render the code in the given placeholder style.
    pub fn render(&self, style: PlaceholderStyle) -> String {
        match style {
            PlaceholderStyle::Format => self.code.clone(),
            PlaceholderStyle::Numbered => self.render_numbered(),
        }
    }

    fn render_numbered(&self) -> String {
        use std::fmt::Write;

        let bytes = self.code.as_bytes();
        let mut out = String::with_capacity(self.code.len() + self.params.len() * 2);
        let mut params = self.params.iter();
        let mut idx: usize = 0;
        let mut start = 0;
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] != b'%' {
                i += 1;
                continue;
            }
            out.push_str(&self.code[start..i]);
            match bytes.get(i + 1) {
                Some(b'%') => out.push('%'),
                Some(b's') => match params.next() {
                    Some(Value::List(items)) if items.is_empty() => out.push_str("(NULL)"),
                    Some(Value::List(items)) => {
                        out.push('(');
                        for n in 0..items.len() {
                            if n > 0 {
                                out.push_str(", ");
                            }
                            idx += 1;
                            let _ = write!(&mut out, "${idx}");
                        }
                        out.push(')');
                    }
                    _ => {
                        idx += 1;
                        let _ = write!(&mut out, "${idx}");
                    }
                },
                _ => out.push_str(&self.code[i..(i + 2).min(bytes.len())]),
            }
            i += 2;
            start = i.min(bytes.len());
        }
        if start < bytes.len() {
            out.push_str(&self.code[start..]);
        }
        out
    }

    /// Render SQL with `$1, $2, ...` placeholders.
    pub fn to_sql(&self) -> String {
        self.render(PlaceholderStyle::Numbered)
    }

    /// Number of bind values once IN-lists are expanded.
    pub fn bind_count(&self) -> usize {
        self.params.iter().map(Value::bind_width).sum()
    }

    /// Parameter refs compatible with `tokio-postgres`, matching [`Sql::to_sql`].
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        let mut out: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(self.bind_count());
        for param in &self.params {
            match param {
                Value::List(items) => out.extend(items.iter().map(|v| v as &(dyn ToSql + Sync))),
                other => out.push(other),
            }
        }
        out
    }

    fn validate(&self) -> SqlResult<()> {
        let placeholders = self.placeholder_count();
        if placeholders != self.params.len() {
            return Err(SqlError::mismatch(format!(
                "fragment has {placeholders} placeholder(s) but {} parameter(s)",
                self.params.len()
            )));
        }
        let nested_list = self.params.iter().any(|p| match p {
            Value::List(items) => items.iter().any(|v| matches!(v, Value::List(_))),
            _ => false,
        });
        if nested_list {
            return Err(SqlError::mismatch("IN-lists cannot be nested"));
        }
        Ok(())
    }

    fn prepare(&self) -> SqlResult<(String, Vec<&(dyn ToSql + Sync)>)> {
        self.validate()?;
        let sql = self.to_sql();
        tracing::trace!(target: "sqlfrag.sql", sql = %sql, params = self.bind_count(), "executing fragment");
        Ok((sql, self.params_ref()))
    }

    /// Execute the fragment and return the affected row count.
    pub async fn execute(&self, conn: &impl GenericClient) -> SqlResult<u64> {
        let (sql, params) = self.prepare()?;
        conn.execute(&sql, &params).await
    }

    /// Execute the fragment and return all rows.
    pub async fn fetch_all(&self, conn: &impl GenericClient) -> SqlResult<Vec<Row>> {
        let (sql, params) = self.prepare()?;
        conn.query(&sql, &params).await
    }

    /// Execute the fragment and return the first row.
    pub async fn fetch_one(&self, conn: &impl GenericClient) -> SqlResult<Row> {
        let (sql, params) = self.prepare()?;
        conn.query_one(&sql, &params).await
    }

    /// Execute the fragment and return the first row, if any.
    pub async fn fetch_opt(&self, conn: &impl GenericClient) -> SqlResult<Option<Row>> {
        let (sql, params) = self.prepare()?;
        conn.query_opt(&sql, &params).await
    }

    /// First column of the first row.
    pub async fn fetch_scalar_one<T>(&self, conn: &impl GenericClient) -> SqlResult<T>
    where
        T: for<'b> FromSql<'b> + Send + Sync,
    {
        let row = self.fetch_one(conn).await?;
        row.try_get(0).map_err(|e| SqlError::decode("0", e.to_string()))
    }

    /// First column of the first row, if there is a row.
    pub async fn fetch_scalar_opt<T>(&self, conn: &impl GenericClient) -> SqlResult<Option<T>>
    where
        T: for<'b> FromSql<'b> + Send + Sync,
    {
        match self.fetch_opt(conn).await? {
            Some(row) => row
                .try_get(0)
                .map(Some)
                .map_err(|e| SqlError::decode("0", e.to_string())),
            None => Ok(None),
        }
    }

    /// First column of every row.
    pub async fn fetch_scalar_all<T>(&self, conn: &impl GenericClient) -> SqlResult<Vec<T>>
    where
        T: for<'b> FromSql<'b> + Send + Sync,
    {
        let rows = self.fetch_all(conn).await?;
        rows.iter()
            .map(|r| r.try_get(0).map_err(|e| SqlError::decode("0", e.to_string())))
            .collect()
    }

    /// Whether the query returns at least one row.
    pub async fn exists(&self, conn: &impl GenericClient) -> SqlResult<bool> {
        Ok(self.fetch_opt(conn).await?.is_some())
    }
}

impl PartialEq for Sql {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.params == other.params
    }
}

impl fmt::Debug for Sql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sql({:?}", self.code)?;
        for param in &self.params {
            write!(f, ", {param}")?;
        }
        f.write_str(")")
    }
}

impl From<Sql> for (String, Vec<Value>) {
    fn from(sql: Sql) -> Self {
        sql.into_parts()
    }
}

/// Build a [`Sql`] from a template and positional or named arguments.
///
/// ```ignore
/// let a = sql!("SELECT 1")?;
/// let b = sql!("id = %s AND %s", 42, a)?;
/// let c = sql!("%(lo)s <= x AND x < %(hi)s", lo = 1, hi = 10)?;
/// ```
#[macro_export]
macro_rules! sql {
    ($template:expr $(,)?) => {
        $crate::Sql::new($template)
    };
    ($template:expr, $($name:ident = $value:expr),+ $(,)?) => {
        $crate::Sql::build($template)
            $(.named(stringify!($name), $value))+
            .finish()
    };
    ($template:expr, $($value:expr),+ $(,)?) => {
        $crate::Sql::build($template)
            $(.arg($value))+
            .finish()
    };
}
