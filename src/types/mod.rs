//! Types Module
//!
//! The closed set of column types and the runtime values stored in rows.
//!
//! ## Responsibilities
//! - Declare the supported column types and their tag bytes
//! - Hold typed values with a total order (indexes need `Ord` + `Hash`)
//! - Validate / coerce values against a declared column type
//! - Encode and decode values (see [`codec`])
//!
//! ## Type Tags
//! ```text
//! ┌──────┬───────────┬────────────────────────────────────────┐
//! │ Tag  │ Type      │ Encoding                               │
//! ├──────┼───────────┼────────────────────────────────────────┤
//! │ 0x01 │ Int       │ i64 LE (8)                             │
//! │ 0x02 │ Str       │ u16 len + UTF-8                        │
//! │ 0x03 │ Float     │ f64 LE (8)                             │
//! │ 0x04 │ Bool      │ u8 (1)                                 │
//! │ 0x05 │ Bytes     │ u32 len + raw                          │
//! │ 0x06 │ Timestamp │ i64 micros + i16 offset (0x7FFF = none)│
//! │ 0x07 │ Date      │ i32 days since 1970-01-01              │
//! │ 0x08 │ Duration  │ f64 seconds                            │
//! │ 0x09 │ List      │ u32 count + tagged elements            │
//! │ 0x0A │ Map       │ u32 count + (u16 key, tagged element)  │
//! │ 0xFF │ (null)    │ no payload                             │
//! └──────┴───────────┴────────────────────────────────────────┘
//! ```

pub mod codec;
mod reader;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

use crate::error::{Result, TuckError};

pub(crate) use reader::SliceReader;

/// A row: column name → value
pub type Record = BTreeMap<String, Value>;

/// Row identifier: the primary-key value, or a synthetic `Value::Int`
/// for tables without a primary key
pub type RowId = Value;

/// Tag byte marking a null value
pub const NULL_TAG: u8 = 0xFF;

// =============================================================================
// Column Types
// =============================================================================

/// Declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnType {
    Int = 1,
    Str = 2,
    Float = 3,
    Bool = 4,
    Bytes = 5,
    Timestamp = 6,
    Date = 7,
    Duration = 8,
    List = 9,
    Map = 10,
}

impl ColumnType {
    /// Tag byte used on disk
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Convert from a tag byte
    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            1 => ColumnType::Int,
            2 => ColumnType::Str,
            3 => ColumnType::Float,
            4 => ColumnType::Bool,
            5 => ColumnType::Bytes,
            6 => ColumnType::Timestamp,
            7 => ColumnType::Date,
            8 => ColumnType::Duration,
            9 => ColumnType::List,
            10 => ColumnType::Map,
            other => {
                return Err(TuckError::decode(format!(
                    "Unknown type tag: 0x{:02x}",
                    other
                )))
            }
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Str => "str",
            ColumnType::Float => "float",
            ColumnType::Bool => "bool",
            ColumnType::Bytes => "bytes",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Date => "date",
            ColumnType::Duration => "duration",
            ColumnType::List => "list",
            ColumnType::Map => "map",
        }
    }

    /// Check a value against this type, widening Int → Float.
    ///
    /// Null passes through; nullability is the column's concern.
    pub fn coerce(self, value: Value) -> Result<Value> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (ColumnType::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (ty, value) if value.column_type() == Some(ty) => Ok(value),
            (ty, value) => Err(TuckError::validation(format!(
                "Expected {}, got {}",
                ty.name(),
                value.type_name()
            ))),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Timestamp
// =============================================================================

/// Microsecond timestamp with an optional timezone offset.
///
/// `offset_minutes == None` is a naive timestamp; its micros are the wall
/// clock read as UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub micros: i64,
    pub offset_minutes: Option<i16>,
}

impl Timestamp {
    /// Sentinel offset meaning "no timezone"
    pub const NAIVE_OFFSET: i16 = 0x7FFF;

    pub fn from_micros(micros: i64, offset_minutes: Option<i16>) -> Self {
        Self {
            micros,
            offset_minutes,
        }
    }

    /// Timezone-aware timestamp
    pub fn from_datetime(dt: &DateTime<FixedOffset>) -> Self {
        Self {
            micros: dt.timestamp_micros(),
            offset_minutes: Some((dt.offset().local_minus_utc() / 60) as i16),
        }
    }

    /// Naive timestamp
    pub fn from_naive(dt: &NaiveDateTime) -> Self {
        Self {
            micros: dt.and_utc().timestamp_micros(),
            offset_minutes: None,
        }
    }

    /// Current time in UTC
    pub fn now() -> Self {
        Self {
            micros: Utc::now().timestamp_micros(),
            offset_minutes: Some(0),
        }
    }

    /// Aware view; `None` for naive timestamps or out-of-range values
    pub fn to_datetime(&self) -> Option<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(i32::from(self.offset_minutes?) * 60)?;
        let utc = DateTime::<Utc>::from_timestamp_micros(self.micros)?;
        Some(utc.with_timezone(&offset))
    }

    /// Wall-clock view (UTC wall clock for aware timestamps)
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        DateTime::<Utc>::from_timestamp_micros(self.micros).map(|dt| dt.naive_utc())
    }
}

// =============================================================================
// Values
// =============================================================================

/// A typed value stored in a record
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Int(i64),
    Str(String),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Timestamp(Timestamp),
    Date(NaiveDate),
    Duration(chrono::Duration),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// The column type this value belongs to (`None` for null)
    pub fn column_type(&self) -> Option<ColumnType> {
        Some(match self {
            Value::Null => return None,
            Value::Int(_) => ColumnType::Int,
            Value::Str(_) => ColumnType::Str,
            Value::Float(_) => ColumnType::Float,
            Value::Bool(_) => ColumnType::Bool,
            Value::Bytes(_) => ColumnType::Bytes,
            Value::Timestamp(_) => ColumnType::Timestamp,
            Value::Date(_) => ColumnType::Date,
            Value::Duration(_) => ColumnType::Duration,
            Value::List(_) => ColumnType::List,
            Value::Map(_) => ColumnType::Map,
        })
    }

    pub fn type_name(&self) -> &'static str {
        self.column_type().map(ColumnType::name).unwrap_or("null")
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Rank used to order values of different variants
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Str(_) => 4,
            Value::Bytes(_) => 5,
            Value::Timestamp(_) => 6,
            Value::Date(_) => 7,
            Value::Duration(_) => 8,
            Value::List(_) => 9,
            Value::Map(_) => 10,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Duration(a), Value::Duration(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Int(i) => i.hash(state),
            Value::Str(s) => s.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Timestamp(t) => t.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Duration(d) => d.hash(state),
            Value::List(items) => items.hash(state),
            Value::Map(map) => map.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Timestamp(t) => match t.to_datetime() {
                Some(dt) => write!(f, "{}", dt.to_rfc3339()),
                None => match t.to_naive() {
                    Some(dt) => write!(f, "{}", dt),
                    None => write!(f, "{}us", t.micros),
                },
            },
            Value::Date(d) => write!(f, "{}", d),
            Value::Duration(d) => write!(f, "{}", d),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}: {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Conversions
// -----------------------------------------------------------------------------

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<chrono::Duration> for Value {
    fn from(v: chrono::Duration) -> Self {
        Value::Duration(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Build a [`Record`] from `"column" => value` pairs
///
/// ```
/// let r = tuckdb::record! { "name" => "Alice", "age" => 30 };
/// assert_eq!(r.len(), 2);
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::types::Record::new() };
    ($($col:expr => $val:expr),+ $(,)?) => {{
        let mut r = $crate::types::Record::new();
        $( r.insert(::std::string::String::from($col), $crate::types::Value::from($val)); )+
        r
    }};
}
