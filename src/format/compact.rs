//! Compact value encoding for the index region
//!
//! Index payloads repeat the same small ints and short strings many times,
//! so they get a denser encoding than the general codec:
//!
//! ```text
//! 0x00 null          0x04 int, 4 bytes      0x08 str, u16 len
//! 0x01 bool (1)      0x05 int, 8 bytes      0xFF fallback:
//! 0x02 int, 1 byte   0x06 float (8)              type tag + u32 len
//! 0x03 int, 2 bytes  0x07 str, u8 len            + general codec bytes
//! ```

use bytes::BufMut;

use crate::error::{Result, TuckError};
use crate::types::{codec, ColumnType, SliceReader, Value};

const NULL: u8 = 0x00;
const BOOL: u8 = 0x01;
const INT8: u8 = 0x02;
const INT16: u8 = 0x03;
const INT32: u8 = 0x04;
const INT64: u8 = 0x05;
const FLOAT: u8 = 0x06;
const SHORT_STR: u8 = 0x07;
const LONG_STR: u8 = 0x08;
const FALLBACK: u8 = 0xFF;

pub(crate) fn put_value<B: BufMut>(buf: &mut B, value: &Value) -> Result<()> {
    match value {
        Value::Null => buf.put_u8(NULL),
        Value::Bool(b) => {
            buf.put_u8(BOOL);
            buf.put_u8(u8::from(*b));
        }
        Value::Int(i) => {
            let i = *i;
            if let Ok(v) = i8::try_from(i) {
                buf.put_u8(INT8);
                buf.put_i8(v);
            } else if let Ok(v) = i16::try_from(i) {
                buf.put_u8(INT16);
                buf.put_i16_le(v);
            } else if let Ok(v) = i32::try_from(i) {
                buf.put_u8(INT32);
                buf.put_i32_le(v);
            } else {
                buf.put_u8(INT64);
                buf.put_i64_le(i);
            }
        }
        Value::Float(f) => {
            buf.put_u8(FLOAT);
            buf.put_f64_le(*f);
        }
        Value::Str(s) if s.len() <= u8::MAX as usize => {
            buf.put_u8(SHORT_STR);
            buf.put_u8(s.len() as u8);
            buf.put_slice(s.as_bytes());
        }
        Value::Str(s) if s.len() <= u16::MAX as usize => {
            buf.put_u8(LONG_STR);
            buf.put_u16_le(s.len() as u16);
            buf.put_slice(s.as_bytes());
        }
        other => {
            let ty = other
                .column_type()
                .ok_or_else(|| TuckError::validation("null has no fallback encoding"))?;
            let payload = codec::encode(ty, other)?;
            let len = u32::try_from(payload.len())
                .map_err(|_| TuckError::validation("index value exceeds 4 GiB"))?;
            buf.put_u8(FALLBACK);
            buf.put_u8(ty.tag());
            buf.put_u32_le(len);
            buf.put_slice(&payload);
        }
    }
    Ok(())
}

pub(crate) fn get_value(r: &mut SliceReader<'_>) -> Result<Value> {
    let tag = r.u8("compact tag")?;
    Ok(match tag {
        NULL => Value::Null,
        BOOL => Value::Bool(r.u8("compact bool")? != 0),
        INT8 => Value::Int(i64::from(r.u8("compact int8")? as i8)),
        INT16 => Value::Int(i64::from(r.u16("compact int16")? as i16)),
        INT32 => Value::Int(i64::from(r.i32("compact int32")?)),
        INT64 => Value::Int(r.i64("compact int64")?),
        FLOAT => Value::Float(r.f64("compact float")?),
        SHORT_STR => {
            let len = r.u8("compact str length")? as usize;
            Value::Str(r.utf8(len, "compact str")?)
        }
        LONG_STR => {
            let len = r.u16("compact str length")? as usize;
            Value::Str(r.utf8(len, "compact str")?)
        }
        FALLBACK => {
            let ty = ColumnType::from_tag(r.u8("compact fallback type")?)?;
            let len = r.u32("compact fallback length")? as usize;
            let payload = r.bytes(len, "compact fallback payload")?;
            let (value, used) = codec::decode(ty, payload)?;
            if used != len {
                return Err(TuckError::decode(format!(
                    "Compact fallback declared {} bytes but decoded {}",
                    len, used
                )));
            }
            value
        }
        other => {
            return Err(TuckError::decode(format!(
                "Unknown compact tag: 0x{:02x}",
                other
            )))
        }
    })
}
