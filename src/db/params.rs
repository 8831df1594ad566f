//! Parameter binding utilities for database queries.
//!
//! This module binds coerced `BoundValue`s to backend-specific query objects.
//! PostgreSQL parameters are strictly typed on the server, so numeric values are
//! narrowed to the width the compiled statement declared.

use crate::models::{BoundValue, ParamType};
use sqlx::postgres::{PgArguments, PgTypeInfo};
use sqlx::sqlite::SqliteArguments;
use sqlx::{Postgres, Sqlite, TypeInfo};

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Bind a parameter to a PostgreSQL query, honoring the declared parameter type.
pub(crate) fn bind_postgres_param<'q>(
    query: PgQuery<'q>,
    param: &BoundValue,
    declared: Option<&PgTypeInfo>,
) -> PgQuery<'q> {
    let declared = declared.map(|ty| ty.name().to_ascii_uppercase());

    match (param, declared.as_deref()) {
        (BoundValue::Null(_), Some("INT2")) => query.bind(None::<i16>),
        (BoundValue::Null(_), Some("INT4")) => query.bind(None::<i32>),
        (BoundValue::Null(_), Some("FLOAT4")) => query.bind(None::<f32>),
        (BoundValue::Null(ParamType::Integer), _) => query.bind(None::<i64>),
        (BoundValue::Null(ParamType::Float), _) => query.bind(None::<f64>),
        (BoundValue::Null(ParamType::Text), _) => query.bind(None::<String>),
        (BoundValue::Null(ParamType::Blob), _) => query.bind(None::<Vec<u8>>),
        (BoundValue::Integer(v), Some("INT2")) => match i16::try_from(*v) {
            Ok(narrow) => query.bind(narrow),
            Err(_) => query.bind(*v),
        },
        (BoundValue::Integer(v), Some("INT4")) => match i32::try_from(*v) {
            Ok(narrow) => query.bind(narrow),
            Err(_) => query.bind(*v),
        },
        (BoundValue::Integer(v), Some("FLOAT4")) => query.bind(*v as f32),
        (BoundValue::Integer(v), Some("FLOAT8")) => query.bind(*v as f64),
        (BoundValue::Integer(v), _) => query.bind(*v),
        (BoundValue::Float(v), Some("FLOAT4")) => query.bind(*v as f32),
        (BoundValue::Float(v), _) => query.bind(*v),
        (BoundValue::Text(v), _) => query.bind(v.clone()),
        (BoundValue::Blob(v), _) => query.bind(v.clone()),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &BoundValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        BoundValue::Null(_) => query.bind(None::<String>),
        BoundValue::Integer(v) => query.bind(*v),
        BoundValue::Float(v) => query.bind(*v),
        BoundValue::Text(v) => query.bind(v.clone()),
        BoundValue::Blob(v) => query.bind(v.clone()),
    }
}
