//! Deadlock-avoidance ordering of a batch
//!
//! Records are ordered by the tuple of their coerced unique-key values so
//! two workers writing overlapping key sets take row locks in the same
//! order. The ordering mirrors the server's: numbers compare numerically
//! regardless of width, NaN sorts above every number and NULL sorts last.

use crate::{FieldSpec, Record, Result, SqlDialect, TableSchema, Value, ValueSlot, coerce};
use chrono::NaiveDateTime;
use std::cmp::Ordering;

/// Sort records by their key tuple. The sort is stable.
pub fn sort_by_key(
    dialect: &dyn SqlDialect,
    table: &TableSchema,
    records: Vec<Record>,
    key_fields: &[&FieldSpec],
) -> Result<Vec<Record>> {
    if key_fields.is_empty() || records.len() < 2 {
        return Ok(records);
    }

    let mut keyed = records
        .into_iter()
        .map(|record| {
            let key = key_fields
                .iter()
                .map(|field| coerce::coerce(dialect, table, field, coerce::lookup(&record, field)))
                .collect::<Result<Vec<_>>>()?;
            Ok((key, record))
        })
        .collect::<Result<Vec<_>>>()?;

    keyed.sort_by(|(a, _), (b, _)| cmp_key(a, b));
    Ok(keyed.into_iter().map(|(_, record)| record).collect())
}

/// Compare two key tuples slot by slot
pub fn cmp_key(a: &[ValueSlot], b: &[ValueSlot]) -> Ordering {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| cmp_slots(x, y))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

fn slot_rank(slot: &ValueSlot) -> u8 {
    match slot {
        ValueSlot::Literal(Value::Null) => 3,
        ValueSlot::Literal(_) => 0,
        ValueSlot::Expression(_) => 1,
        ValueSlot::DatabaseDefault => 2,
    }
}

fn cmp_slots(a: &ValueSlot, b: &ValueSlot) -> Ordering {
    match (a, b) {
        (ValueSlot::Literal(x), ValueSlot::Literal(y)) => cmp_values(x, y),
        (ValueSlot::Expression(x), ValueSlot::Expression(y)) => x.cmp(y),
        _ => slot_rank(a).cmp(&slot_rank(b)),
    }
}

fn value_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Int16(_)
        | Value::Int32(_)
        | Value::Int64(_)
        | Value::Float32(_)
        | Value::Float64(_)
        | Value::Decimal(_) => 1,
        Value::String(_) => 2,
        Value::Bytes(_) => 3,
        Value::Uuid(_) => 4,
        Value::Date(_) | Value::DateTime(_) | Value::DateTimeUtc(_) => 5,
        Value::Time(_) => 6,
        Value::Json(_) => 7,
        Value::Array(_) => 8,
        Value::Null => 9,
    }
}

/// Total order over values
pub fn cmp_values(a: &Value, b: &Value) -> Ordering {
    let (rank_a, rank_b) = (value_rank(a), value_rank(b));
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
        (Value::Uuid(x), Value::Uuid(y)) => x.cmp(y),
        (Value::Time(x), Value::Time(y)) => x.cmp(y),
        (Value::Json(x), Value::Json(y)) => x.to_string().cmp(&y.to_string()),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| cmp_values(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ if rank_a == 1 => cmp_numbers(a, b),
        _ => match (as_timestamp(a), as_timestamp(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => Ordering::Equal,
        },
    }
}

fn is_integer(value: &Value) -> bool {
    matches!(value, Value::Int16(_) | Value::Int32(_) | Value::Int64(_))
}

fn cmp_numbers(a: &Value, b: &Value) -> Ordering {
    if is_integer(a) && is_integer(b) {
        return a.as_i64().cmp(&b.as_i64());
    }
    if let (Some(x), Some(y)) = (ExactNumber::of(a), ExactNumber::of(b)) {
        return x.cmp(&y);
    }

    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

/// Finite decimal held as digit strings, compared without rounding.
///
/// Integers take part through their decimal text so `Int64` and `Decimal`
/// keys order exactly against each other.
#[derive(Debug, PartialEq, Eq)]
struct ExactNumber {
    negative: bool,
    /// No leading zeros
    int: String,
    /// No trailing zeros
    frac: String,
}

impl ExactNumber {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Decimal(text) => Self::parse(text),
            Value::Int16(_) | Value::Int32(_) | Value::Int64(_) => {
                Self::parse(&value.as_i64()?.to_string())
            }
            _ => None,
        }
    }

    /// Plain `[+-]digits[.digits]` text. Exponents, NaN and infinities are
    /// left to the float comparison.
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (negative, unsigned) = match text.as_bytes().first()? {
            b'-' => (true, &text[1..]),
            b'+' => (false, &text[1..]),
            _ => (false, text),
        };
        let (int, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        if (int.is_empty() && frac.is_empty())
            || !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit())
        {
            return None;
        }

        let int = int.trim_start_matches('0').to_string();
        let frac = frac.trim_end_matches('0').to_string();
        // -0 and 0 are the same key
        let negative = negative && !(int.is_empty() && frac.is_empty());
        Some(Self {
            negative,
            int,
            frac,
        })
    }

    fn cmp_magnitude(&self, other: &Self) -> Ordering {
        self.int
            .len()
            .cmp(&other.int.len())
            .then_with(|| self.int.cmp(&other.int))
            .then_with(|| self.frac.cmp(&other.frac))
    }
}

impl Ord for ExactNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.cmp_magnitude(other),
            (true, true) => other.cmp_magnitude(self),
        }
    }
}

impl PartialOrd for ExactNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn as_timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Date(d) => d.and_hms_opt(0, 0, 0),
        Value::DateTime(dt) => Some(*dt),
        Value::DateTimeUtc(dt) => Some(dt.naive_utc()),
        _ => None,
    }
}
