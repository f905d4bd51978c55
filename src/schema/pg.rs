// src/schema/pg.rs

use anyhow::Result;
use arrow::datatypes::{DataType, Field, Schema};

use crate::error::IngestError;

/// Map an Arrow DataType onto the PostgreSQL column type it is loaded into.
///
/// Covers:
/// - Boolean                       → BOOLEAN
/// - Int8, Int16, UInt8            → SMALLINT
/// - Int32, UInt16                 → INTEGER
/// - Int64, UInt32                 → BIGINT
/// - UInt64                        → NUMERIC(20, 0)
/// - Float16, Float32              → REAL
/// - Float64                       → DOUBLE PRECISION
/// - Decimal128/256(p, s)          → NUMERIC(p, s)
/// - Utf8, LargeUtf8, Utf8View     → TEXT
/// - Dictionary(_, string)         → TEXT
/// - Date32, Date64                → DATE
/// - Time32, Time64                → TIME
/// - Timestamp(_, None)            → TIMESTAMP
/// - Timestamp(_, Some(tz))        → TIMESTAMPTZ
/// - Null                          → TEXT
///
/// Returns `None` for anything the CSV encoding can't round-trip
/// (binary, nested, interval, duration).
pub fn pg_type(dt: &DataType) -> Option<String> {
    let ty = match dt {
        DataType::Boolean => "BOOLEAN".to_string(),
        DataType::Int8 | DataType::Int16 | DataType::UInt8 => "SMALLINT".to_string(),
        DataType::Int32 | DataType::UInt16 => "INTEGER".to_string(),
        DataType::Int64 | DataType::UInt32 => "BIGINT".to_string(),
        DataType::UInt64 => "NUMERIC(20, 0)".to_string(),
        DataType::Float16 | DataType::Float32 => "REAL".to_string(),
        DataType::Float64 => "DOUBLE PRECISION".to_string(),
        DataType::Decimal128(p, s) | DataType::Decimal256(p, s) => {
            format!("NUMERIC({}, {})", p, s)
        }
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Null => {
            "TEXT".to_string()
        }
        DataType::Dictionary(_, value) => match value.as_ref() {
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => "TEXT".to_string(),
            _ => return None,
        },
        DataType::Date32 | DataType::Date64 => "DATE".to_string(),
        DataType::Time32(_) | DataType::Time64(_) => "TIME".to_string(),
        DataType::Timestamp(_, None) => "TIMESTAMP".to_string(),
        DataType::Timestamp(_, Some(_)) => "TIMESTAMPTZ".to_string(),
        _ => return None,
    };
    Some(ty)
}

/// Double-quote an identifier, doubling any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// One `"<name>" <TYPE>` column definition per field, or an error naming the
/// first column with no PostgreSQL counterpart.
pub fn column_defs(schema: &Schema) -> Result<Vec<String>> {
    schema
        .fields()
        .iter()
        .map(|field| column_def(field))
        .collect()
}

fn column_def(field: &Field) -> Result<String> {
    let ty = pg_type(field.data_type()).ok_or_else(|| IngestError::UnsupportedColumnType {
        column: field.name().clone(),
        data_type: field.data_type().clone(),
    })?;
    Ok(format!("{} {}", quote_ident(field.name()), ty))
}

/// `CREATE TABLE` statement for `table` mirroring `schema`, columns in order.
pub fn create_table_sql(table: &str, schema: &Schema) -> Result<String> {
    let cols = column_defs(schema)?;
    Ok(format!(
        "CREATE TABLE {} ({})",
        quote_ident(table),
        cols.join(", ")
    ))
}

pub fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(table))
}

/// NULL marker shared by the batch encoder and the `COPY` statement, so an
/// unquoted empty field loads as `''` rather than NULL.
pub const COPY_NULL: &str = "\\N";

/// `COPY ... FROM STDIN` statement matching the CSV produced for a batch.
pub fn copy_in_sql(table: &str, schema: &Schema) -> String {
    let cols: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| quote_ident(f.name()))
        .collect();
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT csv, NULL '{}')",
        quote_ident(table),
        cols.join(", "),
        COPY_NULL
    )
}
