//! Conversions between pgbulk values and the PostgreSQL wire format

use bytes::{BufMut, BytesMut};
use pgbulk_core::{BulkError, Result, Value};
use postgres_types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};
use tokio_postgres::Row as PgRow;

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// Owned parameter value with a `ToSql` impl matching the target type.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PgValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// NUMERIC in its decimal text form, encoded to the binary format on send
    Numeric(String),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    DateTimeUtc(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    DateTime(chrono::NaiveDateTime),
    Array(Vec<PgValue>),
}

impl PgValue {
    /// Convert a value into the variant matching the target column type so
    /// tokio-postgres writes the right binary representation (4 bytes for
    /// INT4 rather than 8 from an i64, NUMERIC digits rather than text).
    pub(crate) fn from_value_for_type(value: &Value, target_type: &Type) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),

            Value::Int16(v) => Self::coerce_int(*v as i64, target_type),
            Value::Int32(v) => Self::coerce_int(*v as i64, target_type),
            Value::Int64(v) => Self::coerce_int(*v, target_type),

            Value::Float32(v) => match *target_type {
                Type::FLOAT8 => PgValue::Float64(*v as f64),
                Type::NUMERIC => PgValue::Numeric(v.to_string()),
                _ => PgValue::Float32(*v),
            },
            Value::Float64(v) => match *target_type {
                Type::FLOAT4 => PgValue::Float32(*v as f32),
                Type::NUMERIC => PgValue::Numeric(v.to_string()),
                _ => PgValue::Float64(*v),
            },

            Value::Decimal(v) => match *target_type {
                Type::FLOAT8 => v
                    .parse::<f64>()
                    .map(PgValue::Float64)
                    .unwrap_or_else(|_| PgValue::Numeric(v.clone())),
                Type::FLOAT4 => v
                    .parse::<f32>()
                    .map(PgValue::Float32)
                    .unwrap_or_else(|_| PgValue::Numeric(v.clone())),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => PgValue::String(v.clone()),
                _ => PgValue::Numeric(v.clone()),
            },
            Value::String(v) => Self::coerce_string(v, target_type),
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Uuid(v) => match *target_type {
                Type::TEXT | Type::VARCHAR => PgValue::String(v.to_string()),
                _ => PgValue::Uuid(*v),
            },
            Value::Json(v) => match *target_type {
                Type::TEXT | Type::VARCHAR => PgValue::String(v.to_string()),
                _ => PgValue::Json(v.clone()),
            },
            Value::DateTimeUtc(v) => match *target_type {
                Type::TIMESTAMP => PgValue::DateTime(v.naive_utc()),
                _ => PgValue::DateTimeUtc(*v),
            },
            Value::Date(v) => PgValue::Date(*v),
            Value::Time(v) => PgValue::Time(*v),
            Value::DateTime(v) => match *target_type {
                Type::TIMESTAMPTZ => PgValue::DateTimeUtc(v.and_utc()),
                _ => PgValue::DateTime(*v),
            },
            Value::Array(items) => match target_type.kind() {
                Kind::Array(member) => PgValue::Array(
                    items
                        .iter()
                        .map(|item| Self::from_value_for_type(item, member))
                        .collect(),
                ),
                _ => PgValue::Array(items.iter().map(Self::from_value).collect()),
            },
        }
    }

    /// Pick the integer variant matching the target column type. Values
    /// that do not fit stay 64-bit and are rejected by the encoder.
    fn coerce_int(value: i64, target_type: &Type) -> Self {
        match *target_type {
            Type::INT2 => i16::try_from(value)
                .map(PgValue::Int16)
                .unwrap_or(PgValue::Int64(value)),
            Type::INT4 => i32::try_from(value)
                .map(PgValue::Int32)
                .unwrap_or(PgValue::Int64(value)),
            Type::FLOAT4 => PgValue::Float32(value as f32),
            Type::FLOAT8 => PgValue::Float64(value as f64),
            Type::NUMERIC => PgValue::Numeric(value.to_string()),
            Type::TEXT | Type::VARCHAR => PgValue::String(value.to_string()),
            _ => PgValue::Int64(value),
        }
    }

    /// Coerce strings into strongly typed parameters when the prepared
    /// statement provides a concrete target type.
    fn coerce_string(value: &str, target_type: &Type) -> Self {
        let fallback = || PgValue::String(value.to_string());
        match *target_type {
            Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(value)
                .map(PgValue::Json)
                .unwrap_or_else(|_| PgValue::Json(serde_json::Value::String(value.to_string()))),
            Type::NUMERIC => PgValue::Numeric(value.to_string()),
            Type::UUID => uuid::Uuid::parse_str(value)
                .map(PgValue::Uuid)
                .unwrap_or_else(|_| fallback()),
            Type::DATE => chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(PgValue::Date)
                .unwrap_or_else(|_| fallback()),
            Type::TIME => chrono::NaiveTime::parse_from_str(value, "%H:%M:%S%.f")
                .map(PgValue::Time)
                .unwrap_or_else(|_| fallback()),
            Type::TIMESTAMP => chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
                .map(PgValue::DateTime)
                .unwrap_or_else(|_| fallback()),
            Type::TIMESTAMPTZ => chrono::DateTime::parse_from_rfc3339(value)
                .map(|ts| PgValue::DateTimeUtc(ts.with_timezone(&chrono::Utc)))
                .unwrap_or_else(|_| fallback()),
            _ => fallback(),
        }
    }

    /// Used when the target type is unknown
    pub(crate) fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int16(v) => PgValue::Int16(*v),
            Value::Int32(v) => PgValue::Int32(*v),
            Value::Int64(v) => PgValue::Int64(*v),
            Value::Float32(v) => PgValue::Float32(*v),
            Value::Float64(v) => PgValue::Float64(*v),
            Value::Decimal(v) => PgValue::Numeric(v.clone()),
            Value::String(v) => PgValue::String(v.clone()),
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Uuid(v) => PgValue::Uuid(*v),
            Value::Json(v) => PgValue::Json(v.clone()),
            Value::DateTimeUtc(v) => PgValue::DateTimeUtc(*v),
            Value::Date(v) => PgValue::Date(*v),
            Value::Time(v) => PgValue::Time(*v),
            Value::DateTime(v) => PgValue::DateTime(*v),
            Value::Array(items) => PgValue::Array(items.iter().map(Self::from_value).collect()),
        }
    }
}

impl ToSql for PgValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self {
            PgValue::Null => Ok(IsNull::Yes),
            PgValue::Bool(v) => v.to_sql(ty, out),
            PgValue::Int16(v) => v.to_sql(ty, out),
            PgValue::Int32(v) => v.to_sql(ty, out),
            PgValue::Int64(v) => v.to_sql(ty, out),
            PgValue::Float32(v) => v.to_sql(ty, out),
            PgValue::Float64(v) => v.to_sql(ty, out),
            PgValue::Numeric(v) if *ty == Type::NUMERIC => {
                encode_numeric(v, out)?;
                Ok(IsNull::No)
            }
            PgValue::Numeric(v) => v.to_sql(ty, out),
            PgValue::String(v) => v.to_sql(ty, out),
            PgValue::Bytes(v) => v.to_sql(ty, out),
            PgValue::Uuid(v) => v.to_sql(ty, out),
            PgValue::Json(v) => v.to_sql(ty, out),
            PgValue::DateTimeUtc(v) => v.to_sql(ty, out),
            PgValue::Date(v) => v.to_sql(ty, out),
            PgValue::Time(v) => v.to_sql(ty, out),
            PgValue::DateTime(v) => v.to_sql(ty, out),
            PgValue::Array(items) => match ty.kind() {
                Kind::Array(_) => items.to_sql(ty, out),
                _ => Err(format!("cannot encode an array as {}", ty).into()),
            },
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;
/// Largest display scale the server stores
const NUMERIC_MAX_DSCALE: i64 = 0x3FFF;
/// Integer digits representable with an i16 weight of base-10000 groups
const NUMERIC_MAX_INT_DIGITS: i64 = (i16::MAX as i64 + 1) * 4;

/// Encode a decimal string (`-12.340`, `1e-3`, `NaN`, `Infinity`) in the
/// NUMERIC binary format: base-10000 digit groups with a weight, sign and
/// display scale.
pub(crate) fn encode_numeric(text: &str, out: &mut BytesMut) -> std::result::Result<(), BoxError> {
    let text = text.trim();
    let special = match text.to_ascii_lowercase().as_str() {
        "nan" => Some(NUMERIC_NAN),
        "infinity" | "+infinity" | "inf" => Some(NUMERIC_PINF),
        "-infinity" | "-inf" => Some(NUMERIC_NINF),
        _ => None,
    };
    if let Some(sign) = special {
        out.put_i16(0);
        out.put_i16(0);
        out.put_u16(sign);
        out.put_u16(0);
        return Ok(());
    }

    let (negative, unsigned) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(pos) => (
            &unsigned[..pos],
            unsigned[pos + 1..]
                .parse::<i32>()
                .map_err(|_| format!("invalid numeric exponent in '{}'", text))?,
        ),
        None => (unsigned, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if (int_part.is_empty() && frac_part.is_empty())
        || !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit())
    {
        return Err(format!("invalid numeric value '{}'", text).into());
    }

    // Shift the decimal point by the exponent, bounded before any padding
    // is allocated
    let int_part = int_part.trim_start_matches('0');
    let digits: String = format!("{}{}", int_part, frac_part);
    let point = int_part.len() as i64 + exponent as i64;
    if point > NUMERIC_MAX_INT_DIGITS {
        return Err(format!("numeric value '{}' out of range", text).into());
    }
    if -point > NUMERIC_MAX_DSCALE {
        return Err(format!("numeric scale of '{}' out of range", text).into());
    }
    let (int_digits, frac_digits) = if point <= 0 {
        (String::new(), format!("{}{}", "0".repeat((-point) as usize), digits))
    } else if point as usize >= digits.len() {
        (format!("{}{}", digits, "0".repeat(point as usize - digits.len())), String::new())
    } else {
        let (i, f) = digits.split_at(point as usize);
        (i.to_string(), f.to_string())
    };
    let dscale = frac_digits.len();
    let int_digits = int_digits.trim_start_matches('0');

    // Group into base-10000 digits aligned on the decimal point
    let int_pad = (4 - int_digits.len() % 4) % 4;
    let int_aligned = format!("{}{}", "0".repeat(int_pad), int_digits);
    let frac_pad = (4 - frac_digits.len() % 4) % 4;
    let frac_aligned = format!("{}{}", frac_digits, "0".repeat(frac_pad));

    let mut groups: Vec<u16> = int_aligned
        .as_bytes()
        .chunks(4)
        .chain(frac_aligned.as_bytes().chunks(4))
        .map(|chunk| chunk.iter().fold(0u16, |acc, d| acc * 10 + (d - b'0') as u16))
        .collect();
    let mut weight = (int_aligned.len() / 4) as i32 - 1;

    let leading = groups.iter().take_while(|g| **g == 0).count();
    groups.drain(..leading);
    weight -= leading as i32;
    while groups.last() == Some(&0) {
        groups.pop();
    }
    if groups.is_empty() {
        weight = 0;
    }

    let ndigits = i16::try_from(groups.len()).map_err(|_| "numeric value has too many digits")?;
    let weight = i16::try_from(weight).map_err(|_| "numeric value out of range")?;
    let dscale = u16::try_from(dscale)
        .ok()
        .filter(|d| i64::from(*d) <= NUMERIC_MAX_DSCALE)
        .ok_or("numeric scale out of range")?;

    out.put_i16(ndigits);
    out.put_i16(weight);
    out.put_u16(if negative && !groups.is_empty() { NUMERIC_NEG } else { NUMERIC_POS });
    out.put_u16(dscale);
    for group in groups {
        out.put_u16(group);
    }
    Ok(())
}

/// NUMERIC decoded to its decimal text, keeping the display scale
#[derive(Debug)]
pub(crate) struct PgNumericString(pub String);

impl PgNumericString {
    pub(crate) fn parse(raw: &[u8]) -> std::result::Result<String, BoxError> {
        if raw.len() < 8 {
            return Err("invalid NUMERIC payload: too short".into());
        }

        let ndigits = i16::from_be_bytes([raw[0], raw[1]]).max(0) as usize;
        let weight = i16::from_be_bytes([raw[2], raw[3]]) as i32;
        let sign = u16::from_be_bytes([raw[4], raw[5]]);
        let dscale = i16::from_be_bytes([raw[6], raw[7]]).max(0) as usize;

        match sign {
            NUMERIC_NAN => return Ok("NaN".to_string()),
            NUMERIC_PINF => return Ok("Infinity".to_string()),
            NUMERIC_NINF => return Ok("-Infinity".to_string()),
            _ => {}
        }
        if raw.len() < 8 + ndigits * 2 {
            return Err("invalid NUMERIC payload: truncated digits".into());
        }

        let mut digits = Vec::with_capacity(ndigits);
        for index in 0..ndigits {
            let offset = 8 + index * 2;
            let group = u16::from_be_bytes([raw[offset], raw[offset + 1]]);
            if group > 9999 {
                return Err("invalid NUMERIC payload: group out of range".into());
            }
            digits.push(group);
        }
        let group_at = |position: i32| -> u16 {
            // position 0 is the group with weight `weight`
            usize::try_from(position)
                .ok()
                .and_then(|p| digits.get(p).copied())
                .unwrap_or(0)
        };

        let mut integer_text = String::new();
        for w in (0..=weight).rev() {
            let group = group_at(weight - w);
            if integer_text.is_empty() {
                if group != 0 {
                    integer_text.push_str(&group.to_string());
                }
            } else {
                integer_text.push_str(&format!("{group:04}"));
            }
        }
        if integer_text.is_empty() {
            integer_text.push('0');
        }

        let mut fraction_text = String::new();
        let mut w = -1;
        while fraction_text.len() < dscale {
            fraction_text.push_str(&format!("{:04}", group_at(weight - w)));
            w -= 1;
        }
        fraction_text.truncate(dscale);

        let mut output = String::new();
        let is_zero = digits.iter().all(|g| *g == 0);
        if sign == NUMERIC_NEG && !is_zero {
            output.push('-');
        }
        output.push_str(&integer_text);
        if !fraction_text.is_empty() {
            output.push('.');
            output.push_str(&fraction_text);
        }
        Ok(output)
    }
}

impl<'a> FromSql<'a> for PgNumericString {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(Self(Self::parse(raw)?))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Raw UTF-8 payload, used for types without a dedicated decoder (enums,
/// domains over text)
#[derive(Debug)]
pub(crate) struct PgFallbackString(pub String);

impl<'a> FromSql<'a> for PgFallbackString {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(Self(String::from_utf8(raw.to_vec())?))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn decode_error(row: &PgRow, idx: usize, error: tokio_postgres::Error) -> BulkError {
    BulkError::Query(format!(
        "failed to decode column '{}': {}",
        row.columns()[idx].name(),
        error
    ))
}

fn scalar<'a, T: FromSql<'a>>(row: &'a PgRow, idx: usize, wrap: fn(T) -> Value) -> Result<Value> {
    row.try_get::<_, Option<T>>(idx)
        .map(|v| v.map(wrap).unwrap_or(Value::Null))
        .map_err(|e| decode_error(row, idx, e))
}

fn array<'a, T: FromSql<'a>>(row: &'a PgRow, idx: usize, wrap: fn(T) -> Value) -> Result<Value> {
    row.try_get::<_, Option<Vec<Option<T>>>>(idx)
        .map(|v| {
            v.map(|items| {
                Value::Array(
                    items
                        .into_iter()
                        .map(|item| item.map(wrap).unwrap_or(Value::Null))
                        .collect(),
                )
            })
            .unwrap_or(Value::Null)
        })
        .map_err(|e| decode_error(row, idx, e))
}

/// Decode column `idx` of a result row
pub(crate) fn postgres_to_value(row: &PgRow, idx: usize) -> Result<Value> {
    let type_name = row.columns()[idx].type_().name();

    match type_name {
        "bool" => scalar(row, idx, Value::Bool),
        "int2" => scalar(row, idx, Value::Int16),
        "int4" => scalar(row, idx, Value::Int32),
        "int8" => scalar(row, idx, Value::Int64),
        "oid" => scalar(row, idx, |v: u32| Value::Int64(v as i64)),
        "float4" => scalar(row, idx, Value::Float32),
        "float8" => scalar(row, idx, Value::Float64),
        "numeric" => scalar(row, idx, |v: PgNumericString| Value::Decimal(v.0)),
        "text" | "varchar" | "bpchar" | "name" | "citext" => scalar(row, idx, Value::String),
        "bytea" => scalar(row, idx, Value::Bytes),
        "uuid" => scalar(row, idx, Value::Uuid),
        "json" | "jsonb" => scalar(row, idx, Value::Json),
        "date" => scalar(row, idx, Value::Date),
        "time" => scalar(row, idx, Value::Time),
        "timestamp" => scalar(row, idx, Value::DateTime),
        "timestamptz" => scalar(row, idx, Value::DateTimeUtc),
        // Array types carry a leading underscore
        "_bool" => array(row, idx, Value::Bool),
        "_int2" => array(row, idx, Value::Int16),
        "_int4" => array(row, idx, Value::Int32),
        "_int8" => array(row, idx, Value::Int64),
        "_float4" => array(row, idx, Value::Float32),
        "_float8" => array(row, idx, Value::Float64),
        "_numeric" => array(row, idx, |v: PgNumericString| Value::Decimal(v.0)),
        "_text" | "_varchar" | "_bpchar" | "_name" => array(row, idx, Value::String),
        "_bytea" => array(row, idx, Value::Bytes),
        "_uuid" => array(row, idx, Value::Uuid),
        "_json" | "_jsonb" => array(row, idx, Value::Json),
        "_date" => array(row, idx, Value::Date),
        "_timestamp" => array(row, idx, Value::DateTime),
        "_timestamptz" => array(row, idx, Value::DateTimeUtc),
        _ => scalar(row, idx, |v: PgFallbackString| Value::String(v.0)),
    }
}
