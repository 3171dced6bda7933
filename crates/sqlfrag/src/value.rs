//! Bind parameter values.
//!
//! [`Value`] is the closed set of payloads a fragment can carry. It implements
//! [`ToSql`] so the flattened parameter list of a fragment can be handed to
//! `tokio-postgres` directly.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::error::Error;
use std::fmt;
use tokio_postgres::types::{IsNull, ToSql, Type};
use uuid::Uuid;

/// A single bind parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    #[cfg(feature = "rust_decimal")]
    Decimal(rust_decimal::Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
    /// Bound as a single Postgres array (`col = ANY(%s)`).
    Array(Vec<Value>),
    /// Expanded into a parenthesized tuple at render time (`col IN %s`).
    ///
    /// An empty list renders as `(NULL)`, which matches nothing.
    List(Vec<Value>),
}

impl Value {
    /// Build an IN-clause tuple.
    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Build a Postgres array value.
    pub fn array<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Number of `$n` placeholders this value occupies once rendered.
    pub(crate) fn bind_width(&self) -> usize {
        match self {
            Value::List(items) => items.len(),
            _ => 1,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            #[cfg(feature = "rust_decimal")]
            Value::Decimal(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v:?}"),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Date(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{v}"),
            Value::TimestampTz(v) => write!(f, "{v}"),
            Value::Uuid(v) => write!(f, "{v}"),
            Value::Json(v) => write!(f, "{v}"),
            Value::Array(items) | Value::List(items) => {
                let (open, close) = match self {
                    Value::Array(_) => ('[', ']'),
                    _ => ('(', ')'),
                };
                write!(f, "{open}")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "{close}")
            }
        }
    }
}

type BoxError = Box<dyn Error + Sync + Send>;

// Every arm goes through `to_sql_checked` so a value bound to an
// incompatible parameter type fails with `WrongType` instead of sending
// bytes the server would misread.
impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql_checked(ty, out),
            Value::Int(v) => match *ty {
                Type::INT2 => i16::try_from(*v)?.to_sql_checked(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql_checked(ty, out),
                Type::OID => u32::try_from(*v)?.to_sql_checked(ty, out),
                Type::FLOAT4 => (*v as f32).to_sql_checked(ty, out),
                Type::FLOAT8 => (*v as f64).to_sql_checked(ty, out),
                Type::NUMERIC => int_to_numeric(*v, ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            Value::Float(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql_checked(ty, out),
                Type::NUMERIC => float_to_numeric(*v, ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            #[cfg(feature = "rust_decimal")]
            Value::Decimal(v) => v.to_sql_checked(ty, out),
            Value::Text(v) => v.to_sql_checked(ty, out),
            Value::Bytes(v) => v.to_sql_checked(ty, out),
            Value::Date(v) => v.to_sql_checked(ty, out),
            Value::Timestamp(v) => v.to_sql_checked(ty, out),
            Value::TimestampTz(v) => v.to_sql_checked(ty, out),
            Value::Uuid(v) => v.to_sql_checked(ty, out),
            Value::Json(v) => v.to_sql_checked(ty, out),
            Value::Array(items) => items.to_sql_checked(ty, out),
            Value::List(_) => {
                Err("IN-list values are expanded when rendering and cannot be bound directly".into())
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

#[cfg(feature = "rust_decimal")]
fn int_to_numeric(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    rust_decimal::Decimal::from(v).to_sql_checked(ty, out)
}

#[cfg(feature = "rust_decimal")]
fn float_to_numeric(v: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    rust_decimal::Decimal::try_from(v)?.to_sql_checked(ty, out)
}

#[cfg(not(feature = "rust_decimal"))]
fn int_to_numeric(v: i64, _ty: &Type, _out: &mut BytesMut) -> Result<IsNull, BoxError> {
    Err(format!("cannot bind integer {v} to numeric without the `rust_decimal` feature").into())
}

#[cfg(not(feature = "rust_decimal"))]
fn float_to_numeric(v: f64, _ty: &Type, _out: &mut BytesMut) -> Result<IsNull, BoxError> {
    Err(format!("cannot bind float {v} to numeric without the `rust_decimal` feature").into())
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident $(as $cast:ty)?),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v $(as $cast)?)
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int,
    u32 => Int as i64,
    f32 => Float as f64,
    f64 => Float,
    String => Text,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    Uuid => Uuid,
    serde_json::Value => Json,
}

#[cfg(feature = "rust_decimal")]
impl From<rust_decimal::Decimal> for Value {
    fn from(v: rust_decimal::Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_maps_to_null() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }

    #[test]
    fn integers_widen() {
        assert_eq!(Value::from(7_i32), Value::Int(7));
        assert_eq!(Value::from(7_u32), Value::Int(7));
    }

    #[test]
    fn list_width_is_element_count() {
        assert_eq!(Value::list([1, 2, 3]).bind_width(), 3);
        assert_eq!(Value::list(Vec::<i64>::new()).bind_width(), 0);
        assert_eq!(Value::array([1, 2, 3]).bind_width(), 1);
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(Value::list([1, 2]).to_string(), "(1, 2)");
        assert_eq!(Value::array(["a"]).to_string(), "[\"a\"]");
        assert_eq!(Value::Null.to_string(), "NULL");
    }

    #[test]
    fn int_narrows_to_int4() {
        let mut buf = BytesMut::new();
        let res = Value::Int(42).to_sql(&Type::INT4, &mut buf).unwrap();
        assert!(matches!(res, IsNull::No));
        assert_eq!(&buf[..], &42_i32.to_be_bytes());
    }

    #[test]
    fn int_overflow_is_an_error() {
        let mut buf = BytesMut::new();
        assert!(Value::Int(i64::MAX).to_sql(&Type::INT2, &mut buf).is_err());
    }

    #[test]
    fn null_is_null() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            Value::Null.to_sql(&Type::TEXT, &mut buf).unwrap(),
            IsNull::Yes
        ));
    }

    #[test]
    fn mismatched_types_are_rejected() {
        let mut buf = BytesMut::new();
        assert!(Value::Text("abcd".into()).to_sql(&Type::INT4, &mut buf).is_err());
        assert!(Value::Bool(true).to_sql(&Type::TEXT, &mut buf).is_err());
        assert!(Value::Float(1.5).to_sql(&Type::INT4, &mut buf).is_err());
        assert!(Value::Int(1).to_sql(&Type::TEXT, &mut buf).is_err());
        assert!(Value::Bytes(vec![1]).to_sql(&Type::UUID, &mut buf).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn compatible_types_are_accepted() {
        let mut buf = BytesMut::new();
        assert!(Value::Text("x".into()).to_sql(&Type::VARCHAR, &mut buf).is_ok());
        assert!(Value::Text("x".into()).to_sql(&Type::NAME, &mut buf).is_ok());
        assert!(Value::Int(1).to_sql(&Type::INT8, &mut buf).is_ok());
        assert!(Value::Int(1).to_sql(&Type::FLOAT4, &mut buf).is_ok());
        assert!(Value::Null.to_sql(&Type::INT4, &mut buf).is_ok());
    }

    #[test]
    fn array_elements_are_checked() {
        let mut buf = BytesMut::new();
        assert!(Value::array([1, 2]).to_sql(&Type::INT4_ARRAY, &mut buf).is_ok());
        assert!(Value::array(["a"]).to_sql(&Type::INT4_ARRAY, &mut buf).is_err());
        assert!(Value::array([1]).to_sql(&Type::INT4, &mut buf).is_err());
    }

    #[cfg(not(feature = "rust_decimal"))]
    #[test]
    fn numeric_needs_decimal_support() {
        let mut buf = BytesMut::new();
        assert!(Value::Int(5).to_sql(&Type::NUMERIC, &mut buf).is_err());
        assert!(Value::Float(0.5).to_sql(&Type::NUMERIC, &mut buf).is_err());
    }

    #[cfg(feature = "rust_decimal")]
    #[test]
    fn numeric_goes_through_decimal() {
        use tokio_postgres::types::FromSql;

        let mut buf = BytesMut::new();
        Value::Int(5).to_sql(&Type::NUMERIC, &mut buf).unwrap();
        let decoded = rust_decimal::Decimal::from_sql(&Type::NUMERIC, &buf[..]).unwrap();
        assert_eq!(decoded, rust_decimal::Decimal::from(5));
    }

    #[test]
    fn list_cannot_be_bound() {
        let mut buf = BytesMut::new();
        assert!(Value::list([1]).to_sql(&Type::INT8, &mut buf).is_err());
    }
}
