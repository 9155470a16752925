//! Runtime values and parameter binders.
//!
//! Every literal handed to a statement is boxed into a [`Value`]. When a statement is composed
//! each value becomes a [`Binder`]: the value plus the [`ValueKind`] chosen for it. The kind is
//! what `reproduce` uses to re-extract replacement values, so a statement compiled with an
//! `int8` parameter keeps binding `int8` no matter which integer width the caller passes later.

use crate::error::{OrmError, OrmResult};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Serialize, Serializer};
use std::error::Error;
use std::fmt;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

/// The SQL type family of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Text,
    Bytea,
    Uuid,
    Date,
    Time,
    Timestamp,
    Timestamptz,
    Json,
    /// Untyped NULL or a column type this crate does not decode.
    Unknown,
}

impl ValueKind {
    /// Map a PostgreSQL column type to a kind.
    pub fn from_pg_type(ty: &Type) -> Self {
        if *ty == Type::BOOL {
            Self::Bool
        } else if *ty == Type::INT2 {
            Self::Int2
        } else if *ty == Type::INT4 {
            Self::Int4
        } else if *ty == Type::INT8 {
            Self::Int8
        } else if *ty == Type::FLOAT4 {
            Self::Float4
        } else if *ty == Type::FLOAT8 {
            Self::Float8
        } else if *ty == Type::NUMERIC {
            Self::Numeric
        } else if *ty == Type::TEXT
            || *ty == Type::VARCHAR
            || *ty == Type::BPCHAR
            || *ty == Type::NAME
        {
            Self::Text
        } else if *ty == Type::BYTEA {
            Self::Bytea
        } else if *ty == Type::UUID {
            Self::Uuid
        } else if *ty == Type::DATE {
            Self::Date
        } else if *ty == Type::TIME {
            Self::Time
        } else if *ty == Type::TIMESTAMP {
            Self::Timestamp
        } else if *ty == Type::TIMESTAMPTZ {
            Self::Timestamptz
        } else if *ty == Type::JSON || *ty == Type::JSONB {
            Self::Json
        } else {
            Self::Unknown
        }
    }

    /// PostgreSQL name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int2 => "int2",
            Self::Int4 => "int4",
            Self::Int8 => "int8",
            Self::Float4 => "float4",
            Self::Float8 => "float8",
            Self::Numeric => "numeric",
            Self::Text => "text",
            Self::Bytea => "bytea",
            Self::Uuid => "uuid",
            Self::Date => "date",
            Self::Time => "time",
            Self::Timestamp => "timestamp",
            Self::Timestamptz => "timestamptz",
            Self::Json => "jsonb",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A boxed SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL, remembering the kind it stands in for.
    Null(ValueKind),
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    #[cfg(feature = "rust_decimal")]
    Numeric(rust_decimal::Decimal),
    Text(String),
    Bytea(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Timestamptz(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Value {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null(kind) => *kind,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int2(_) => ValueKind::Int2,
            Value::Int4(_) => ValueKind::Int4,
            Value::Int8(_) => ValueKind::Int8,
            Value::Float4(_) => ValueKind::Float4,
            Value::Float8(_) => ValueKind::Float8,
            #[cfg(feature = "rust_decimal")]
            Value::Numeric(_) => ValueKind::Numeric,
            Value::Text(_) => ValueKind::Text,
            Value::Bytea(_) => ValueKind::Bytea,
            Value::Uuid(_) => ValueKind::Uuid,
            Value::Date(_) => ValueKind::Date,
            Value::Time(_) => ValueKind::Time,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::Timestamptz(_) => ValueKind::Timestamptz,
            Value::Json(_) => ValueKind::Json,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    /// Convert this value so it can be written by a binder of `kind`.
    ///
    /// NULL adopts the target kind, integers widen, `float4` widens to `float8`.
    /// Everything else must already match.
    pub fn coerce(self, kind: ValueKind) -> Result<Value, Value> {
        if kind == ValueKind::Unknown || self.kind() == kind {
            return Ok(self);
        }
        match (self, kind) {
            (Value::Null(_), kind) => Ok(Value::Null(kind)),
            (Value::Int2(v), ValueKind::Int4) => Ok(Value::Int4(v.into())),
            (Value::Int2(v), ValueKind::Int8) => Ok(Value::Int8(v.into())),
            (Value::Int4(v), ValueKind::Int8) => Ok(Value::Int8(v.into())),
            (Value::Float4(v), ValueKind::Float8) => Ok(Value::Float8(v.into())),
            (other, _) => Err(other),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null(_) => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql(ty, out),
            Value::Int2(v) => v.to_sql(ty, out),
            Value::Int4(v) => v.to_sql(ty, out),
            Value::Int8(v) => v.to_sql(ty, out),
            Value::Float4(v) => v.to_sql(ty, out),
            Value::Float8(v) => v.to_sql(ty, out),
            #[cfg(feature = "rust_decimal")]
            Value::Numeric(v) => v.to_sql(ty, out),
            Value::Text(v) => v.to_sql(ty, out),
            Value::Bytea(v) => v.to_sql(ty, out),
            Value::Uuid(v) => v.to_sql(ty, out),
            Value::Date(v) => v.to_sql(ty, out),
            Value::Time(v) => v.to_sql(ty, out),
            Value::Timestamp(v) => v.to_sql(ty, out),
            Value::Timestamptz(v) => v.to_sql(ty, out),
            Value::Json(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    // Type checking is delegated to the wrapped value so a mismatch surfaces as the
    // driver's own WrongType error.
    fn to_sql_checked(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null(_) => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql_checked(ty, out),
            Value::Int2(v) => v.to_sql_checked(ty, out),
            Value::Int4(v) => v.to_sql_checked(ty, out),
            Value::Int8(v) => v.to_sql_checked(ty, out),
            Value::Float4(v) => v.to_sql_checked(ty, out),
            Value::Float8(v) => v.to_sql_checked(ty, out),
            #[cfg(feature = "rust_decimal")]
            Value::Numeric(v) => v.to_sql_checked(ty, out),
            Value::Text(v) => v.to_sql_checked(ty, out),
            Value::Bytea(v) => v.to_sql_checked(ty, out),
            Value::Uuid(v) => v.to_sql_checked(ty, out),
            Value::Date(v) => v.to_sql_checked(ty, out),
            Value::Time(v) => v.to_sql_checked(ty, out),
            Value::Timestamp(v) => v.to_sql_checked(ty, out),
            Value::Timestamptz(v) => v.to_sql_checked(ty, out),
            Value::Json(v) => v.to_sql_checked(ty, out),
        }
    }
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(match ValueKind::from_pg_type(ty) {
            ValueKind::Bool => Value::Bool(bool::from_sql(ty, raw)?),
            ValueKind::Int2 => Value::Int2(i16::from_sql(ty, raw)?),
            ValueKind::Int4 => Value::Int4(i32::from_sql(ty, raw)?),
            ValueKind::Int8 => Value::Int8(i64::from_sql(ty, raw)?),
            ValueKind::Float4 => Value::Float4(f32::from_sql(ty, raw)?),
            ValueKind::Float8 => Value::Float8(f64::from_sql(ty, raw)?),
            #[cfg(feature = "rust_decimal")]
            ValueKind::Numeric => Value::Numeric(rust_decimal::Decimal::from_sql(ty, raw)?),
            ValueKind::Text => Value::Text(String::from_sql(ty, raw)?),
            ValueKind::Bytea => Value::Bytea(Vec::<u8>::from_sql(ty, raw)?),
            ValueKind::Uuid => Value::Uuid(Uuid::from_sql(ty, raw)?),
            ValueKind::Date => Value::Date(NaiveDate::from_sql(ty, raw)?),
            ValueKind::Time => Value::Time(NaiveTime::from_sql(ty, raw)?),
            ValueKind::Timestamp => Value::Timestamp(NaiveDateTime::from_sql(ty, raw)?),
            ValueKind::Timestamptz => Value::Timestamptz(DateTime::<Utc>::from_sql(ty, raw)?),
            ValueKind::Json => Value::Json(serde_json::Value::from_sql(ty, raw)?),
            _ => return Err(format!("unsupported column type {ty}").into()),
        })
    }

    fn from_sql_null(ty: &Type) -> Result<Self, BoxError> {
        Ok(Value::Null(ValueKind::from_pg_type(ty)))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null(_) => serializer.serialize_none(),
            Value::Bool(v) => v.serialize(serializer),
            Value::Int2(v) => v.serialize(serializer),
            Value::Int4(v) => v.serialize(serializer),
            Value::Int8(v) => v.serialize(serializer),
            Value::Float4(v) => v.serialize(serializer),
            Value::Float8(v) => v.serialize(serializer),
            #[cfg(feature = "rust_decimal")]
            Value::Numeric(v) => v.serialize(serializer),
            Value::Text(v) => v.serialize(serializer),
            Value::Bytea(v) => v.serialize(serializer),
            Value::Uuid(v) => v.serialize(serializer),
            Value::Date(v) => v.serialize(serializer),
            Value::Time(v) => v.serialize(serializer),
            Value::Timestamp(v) => v.serialize(serializer),
            Value::Timestamptz(v) => v.serialize(serializer),
            Value::Json(v) => v.serialize(serializer),
        }
    }
}

/// Rust types with a fixed SQL kind.
///
/// Used to give `None` a typed NULL.
pub trait ValueType {
    const KIND: ValueKind;
}

macro_rules! impl_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }

            impl ValueType for $ty {
                const KIND: ValueKind = ValueKind::$variant;
            }
        )*
    };
}

impl_value! {
    bool => Bool,
    i16 => Int2,
    i32 => Int4,
    i64 => Int8,
    f32 => Float4,
    f64 => Float8,
    String => Text,
    Vec<u8> => Bytea,
    Uuid => Uuid,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => Timestamptz,
    serde_json::Value => Json,
}

#[cfg(feature = "rust_decimal")]
impl_value! {
    rust_decimal::Decimal => Numeric,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl ValueType for &str {
    const KIND: ValueKind = ValueKind::Text;
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl<T: Into<Value> + ValueType> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null(T::KIND),
        }
    }
}

/// Typed extraction from a [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> OrmResult<Self>;
}

fn unexpected<T>(value: &Value, wanted: &str) -> OrmResult<T> {
    Err(OrmError::Other(format!(
        "cannot read {} value as {}",
        value.kind(),
        wanted
    )))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> OrmResult<Self> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Bool(v) => Ok(*v),
            other => unexpected(other, "bool"),
        }
    }
}

impl FromValue for i16 {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Int2(v) => Ok(*v),
            other => unexpected(other, "i16"),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Int2(v) => Ok((*v).into()),
            Value::Int4(v) => Ok(*v),
            other => unexpected(other, "i32"),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Int2(v) => Ok((*v).into()),
            Value::Int4(v) => Ok((*v).into()),
            Value::Int8(v) => Ok(*v),
            other => unexpected(other, "i64"),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Float4(v) => Ok(*v),
            other => unexpected(other, "f32"),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Float4(v) => Ok((*v).into()),
            Value::Float8(v) => Ok(*v),
            other => unexpected(other, "f64"),
        }
    }
}

#[cfg(feature = "rust_decimal")]
impl FromValue for rust_decimal::Decimal {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Numeric(v) => Ok(*v),
            other => unexpected(other, "Decimal"),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Text(v) => Ok(v.clone()),
            other => unexpected(other, "String"),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Bytea(v) => Ok(v.clone()),
            other => unexpected(other, "Vec<u8>"),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Uuid(v) => Ok(*v),
            other => unexpected(other, "Uuid"),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Date(v) => Ok(*v),
            other => unexpected(other, "NaiveDate"),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Time(v) => Ok(*v),
            other => unexpected(other, "NaiveTime"),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Timestamp(v) => Ok(*v),
            other => unexpected(other, "NaiveDateTime"),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Timestamptz(v) => Ok(*v),
            other => unexpected(other, "DateTime<Utc>"),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            other => unexpected(other, "serde_json::Value"),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Null(_) => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// A value bound to a parameter slot, with the kind chosen at composition time.
#[derive(Debug, Clone, PartialEq)]
pub struct Binder {
    kind: ValueKind,
    value: Value,
}

impl Binder {
    /// Bind a value, choosing its binder kind from the value itself.
    pub fn new(value: Value) -> Self {
        Self {
            kind: value.kind(),
            value,
        }
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Re-extract `value` through this binder's kind, for the 1-based parameter `position`.
    pub fn rebind(&self, position: usize, value: Value) -> OrmResult<Binder> {
        let found = value.kind();
        match value.coerce(self.kind) {
            Ok(value) => Ok(Binder {
                kind: self.kind,
                value,
            }),
            Err(_) => Err(OrmError::TypeMismatch {
                position,
                expected: self.kind,
                found,
            }),
        }
    }
}

impl ToSql for Binder {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        self.value.to_sql(ty, out)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn to_sql_checked(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        self.value.to_sql_checked(ty, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_keeps_its_kind() {
        let v: Value = Option::<i64>::None.into();
        assert_eq!(v, Value::Null(ValueKind::Int8));
        assert!(v.is_null());
    }

    #[test]
    fn rebind_widens_integers_to_the_original_kind() {
        let binder = Binder::new(Value::Int8(1));
        let rebound = binder.rebind(1, Value::Int4(7)).unwrap();
        assert_eq!(rebound.kind(), ValueKind::Int8);
        assert_eq!(rebound.value(), &Value::Int8(7));
    }

    #[test]
    fn rebind_rejects_unrelated_kinds() {
        let binder = Binder::new(Value::Int4(1));
        let err = binder.rebind(3, Value::Text("x".into())).unwrap_err();
        match err {
            OrmError::TypeMismatch {
                position,
                expected,
                found,
            } => {
                assert_eq!(position, 3);
                assert_eq!(expected, ValueKind::Int4);
                assert_eq!(found, ValueKind::Text);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rebind_null_adopts_binder_kind() {
        let binder = Binder::new(Value::Text("a".into()));
        let rebound = binder.rebind(1, Value::Null(ValueKind::Unknown)).unwrap();
        assert_eq!(rebound.value(), &Value::Null(ValueKind::Text));
    }

    #[test]
    fn from_value_reads_nullable_columns() {
        let some: Option<i64> = FromValue::from_value(&Value::Int4(5)).unwrap();
        let none: Option<i64> = FromValue::from_value(&Value::Null(ValueKind::Int8)).unwrap();
        assert_eq!(some, Some(5));
        assert_eq!(none, None);
        assert!(String::from_value(&Value::Int4(1)).is_err());
    }

    #[test]
    fn pg_type_mapping() {
        assert_eq!(ValueKind::from_pg_type(&Type::VARCHAR), ValueKind::Text);
        assert_eq!(ValueKind::from_pg_type(&Type::JSONB), ValueKind::Json);
        assert_eq!(ValueKind::from_pg_type(&Type::INET), ValueKind::Unknown);
    }

    #[test]
    fn serializes_to_json_scalars() {
        let json = serde_json::to_value(vec![
            Value::Int8(1),
            Value::Text("a".into()),
            Value::Null(ValueKind::Bool),
        ])
        .unwrap();
        assert_eq!(json, serde_json::json!([1, "a", null]));
    }
}
