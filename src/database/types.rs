//! SQL Server type mapping to Rust types.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use tiberius::{ColumnData, FromSql};
use uuid::Uuid;

/// A SQL value that can be serialized to JSON.
///
/// Decimals serialize as strings to keep their precision, temporal values as
/// ISO-8601 strings, and binary data as a `0x`-prefixed hex string.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    U8(u8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Decimal(Decimal),
    /// Numeric value that does not fit `Decimal`, kept in its text form.
    NumericText(String),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
}

impl SqlValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Read the value as a signed integer, widening smaller integer types.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::U8(v) => Some(i64::from(*v)),
            SqlValue::I16(v) => Some(i64::from(*v)),
            SqlValue::I32(v) => Some(i64::from(*v)),
            SqlValue::I64(v) => Some(*v),
            SqlValue::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Read the value as a boolean. Integers are true when non-zero.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(v) => Some(*v),
            other => other.as_i64().map(|v| v != 0),
        }
    }

    /// Convert to a display string.
    pub fn to_display_string(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(v) => v.to_string(),
            SqlValue::U8(v) => v.to_string(),
            SqlValue::I16(v) => v.to_string(),
            SqlValue::I32(v) => v.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F32(v) => v.to_string(),
            SqlValue::F64(v) => v.to_string(),
            SqlValue::String(v) => v.clone(),
            SqlValue::Bytes(v) => format!("0x{}", hex::encode(v)),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::NumericText(v) => v.clone(),
            SqlValue::Uuid(v) => v.to_string(),
            SqlValue::Date(v) => v.format("%Y-%m-%d").to_string(),
            SqlValue::Time(v) => v.format("%H:%M:%S%.f").to_string(),
            SqlValue::DateTime(v) => v.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            SqlValue::DateTimeOffset(v) => v.to_rfc3339(),
        }
    }

    /// Convert a driver column value.
    pub fn from_column_data(data: ColumnData<'static>) -> Self {
        match data {
            ColumnData::U8(v) => v.map_or(SqlValue::Null, SqlValue::U8),
            ColumnData::I16(v) => v.map_or(SqlValue::Null, SqlValue::I16),
            ColumnData::I32(v) => v.map_or(SqlValue::Null, SqlValue::I32),
            ColumnData::I64(v) => v.map_or(SqlValue::Null, SqlValue::I64),
            ColumnData::F32(v) => v.map_or(SqlValue::Null, SqlValue::F32),
            ColumnData::F64(v) => v.map_or(SqlValue::Null, SqlValue::F64),
            ColumnData::Bit(v) => v.map_or(SqlValue::Null, SqlValue::Bool),
            ColumnData::String(v) => {
                v.map_or(SqlValue::Null, |s| SqlValue::String(s.into_owned()))
            }
            ColumnData::Guid(v) => v.map_or(SqlValue::Null, SqlValue::Uuid),
            ColumnData::Binary(v) => {
                v.map_or(SqlValue::Null, |b| SqlValue::Bytes(b.into_owned()))
            }
            ColumnData::Numeric(v) => v.map_or(SqlValue::Null, |n| {
                match Decimal::try_from_i128_with_scale(n.value(), u32::from(n.scale())) {
                    Ok(d) => SqlValue::Decimal(d),
                    Err(_) => SqlValue::NumericText(n.to_string()),
                }
            }),
            ColumnData::Xml(v) => v.map_or(SqlValue::Null, |x| {
                SqlValue::String(x.into_owned().into_string())
            }),
            ref temporal @ (ColumnData::DateTime(_)
            | ColumnData::SmallDateTime(_)
            | ColumnData::DateTime2(_)) => from_sql(temporal, SqlValue::DateTime),
            ref temporal @ ColumnData::Date(_) => from_sql(temporal, SqlValue::Date),
            ref temporal @ ColumnData::Time(_) => from_sql(temporal, SqlValue::Time),
            ref temporal @ ColumnData::DateTimeOffset(_) => {
                from_sql(temporal, SqlValue::DateTimeOffset)
            }
        }
    }

    /// Convert a MONEY or SMALLMONEY value to a decimal with four places.
    ///
    /// The driver decodes money as a float; rounding to the type's fixed
    /// scale restores the stored value.
    pub fn from_money_data(data: ColumnData<'static>) -> Self {
        let value = match data {
            ColumnData::F64(v) => v,
            ColumnData::F32(v) => v.map(f64::from),
            other => return Self::from_column_data(other),
        };

        value.map_or(SqlValue::Null, |v| match Decimal::from_f64_retain(v) {
            Some(d) => {
                let mut d = d.round_dp(MONEY_SCALE);
                d.rescale(MONEY_SCALE);
                SqlValue::Decimal(d)
            }
            None => SqlValue::F64(v),
        })
    }
}

/// Fixed scale of the MONEY and SMALLMONEY types.
const MONEY_SCALE: u32 = 4;

/// Whether a result column holds MONEY or SMALLMONEY values.
pub fn is_money_column(col: &tiberius::Column) -> bool {
    matches!(
        col.column_type(),
        tiberius::ColumnType::Money | tiberius::ColumnType::Money4
    )
}

fn from_sql<'a, T, F>(data: &'a ColumnData<'static>, wrap: F) -> SqlValue
where
    T: FromSql<'a>,
    F: FnOnce(T) -> SqlValue,
{
    match T::from_sql(data) {
        Ok(Some(v)) => wrap(v),
        Ok(None) => SqlValue::Null,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to convert temporal column value");
            SqlValue::Null
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Bool(v) => serializer.serialize_bool(*v),
            SqlValue::U8(v) => serializer.serialize_u8(*v),
            SqlValue::I16(v) => serializer.serialize_i16(*v),
            SqlValue::I32(v) => serializer.serialize_i32(*v),
            SqlValue::I64(v) => serializer.serialize_i64(*v),
            SqlValue::F32(v) => serializer.serialize_f32(*v),
            SqlValue::F64(v) => serializer.serialize_f64(*v),
            SqlValue::String(v) | SqlValue::NumericText(v) => serializer.serialize_str(v),
            other => serializer.serialize_str(&other.to_display_string()),
        }
    }
}

/// Get the SQL type name for a result column.
pub fn sql_type_name(col: &tiberius::Column) -> &'static str {
    use tiberius::ColumnType;

    match col.column_type() {
        ColumnType::Null => "NULL",
        ColumnType::Int1 => "TINYINT",
        ColumnType::Int2 => "SMALLINT",
        ColumnType::Int4 => "INT",
        ColumnType::Int8 => "BIGINT",
        ColumnType::Float4 => "REAL",
        ColumnType::Float8 => "FLOAT",
        ColumnType::Money => "MONEY",
        ColumnType::Money4 => "SMALLMONEY",
        ColumnType::Datetime => "DATETIME",
        ColumnType::Datetime4 => "SMALLDATETIME",
        ColumnType::Bit | ColumnType::Bitn => "BIT",
        ColumnType::Guid => "UNIQUEIDENTIFIER",
        ColumnType::Decimaln => "DECIMAL",
        ColumnType::Numericn => "NUMERIC",
        ColumnType::Intn => "INT",
        ColumnType::Floatn => "FLOAT",
        ColumnType::Datetimen => "DATETIME",
        ColumnType::Daten => "DATE",
        ColumnType::Timen => "TIME",
        ColumnType::Datetime2 => "DATETIME2",
        ColumnType::DatetimeOffsetn => "DATETIMEOFFSET",
        ColumnType::BigVarBin => "VARBINARY",
        ColumnType::BigVarChar => "VARCHAR",
        ColumnType::BigBinary => "BINARY",
        ColumnType::BigChar => "CHAR",
        ColumnType::NVarchar => "NVARCHAR",
        ColumnType::NChar => "NCHAR",
        ColumnType::Xml => "XML",
        ColumnType::Text => "TEXT",
        ColumnType::Image => "IMAGE",
        ColumnType::NText => "NTEXT",
        ColumnType::SSVariant => "SQL_VARIANT",
        _ => "UNKNOWN",
    }
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02X}", b)).collect()
    }
}
