//! MDA array codec for `firings.mda`.
//!
//! Header layout (little-endian):
//!
//! | field | type |
//! |-------|------|
//! | data type code | i32 |
//! | bytes per entry | i32 |
//! | number of dims (negative for 64-bit dims) | i32 |
//! | dims | i32 or i64 each |
//!
//! Data follows in column-major order.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::sorting::SpikeEvent;

/// Data type code for float64 entries.
pub const MDA_FLOAT64: i32 = -7;

/// Largest frame index a float64 entry holds exactly (2^53).
pub const MAX_EXACT_FRAME: u64 = 1 << 53;

/// Rows of a firings array.
const FIRINGS_ROWS: usize = 3;

/// Upper bound on events reserved up front from a header.
const PREALLOC_LIMIT: usize = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MdaType {
    UInt8,
    Float32,
    Int16,
    Int32,
    UInt16,
    Float64,
    UInt32,
}

impl MdaType {
    fn from_code(code: i32) -> Option<Self> {
        match code {
            -2 => Some(MdaType::UInt8),
            -3 => Some(MdaType::Float32),
            -4 => Some(MdaType::Int16),
            -5 => Some(MdaType::Int32),
            -6 => Some(MdaType::UInt16),
            -7 => Some(MdaType::Float64),
            -8 => Some(MdaType::UInt32),
            _ => None,
        }
    }

    fn size(self) -> usize {
        match self {
            MdaType::UInt8 => 1,
            MdaType::Int16 | MdaType::UInt16 => 2,
            MdaType::Float32 | MdaType::Int32 | MdaType::UInt32 => 4,
            MdaType::Float64 => 8,
        }
    }

    fn read_value<R: Read>(self, r: &mut R) -> std::io::Result<f64> {
        Ok(match self {
            MdaType::UInt8 => r.read_u8()? as f64,
            MdaType::Float32 => r.read_f32::<LittleEndian>()? as f64,
            MdaType::Int16 => r.read_i16::<LittleEndian>()? as f64,
            MdaType::Int32 => r.read_i32::<LittleEndian>()? as f64,
            MdaType::UInt16 => r.read_u16::<LittleEndian>()? as f64,
            MdaType::Float64 => r.read_f64::<LittleEndian>()?,
            MdaType::UInt32 => r.read_u32::<LittleEndian>()? as f64,
        })
    }
}

/// Writes events as a 3×L float64 firings array.
///
/// Events are written in the order given; callers sort them first. Arrays
/// with more than `i32::MAX` columns use 64-bit dims.
pub fn write_firings<W: Write>(w: &mut W, events: &[SpikeEvent]) -> std::io::Result<()> {
    w.write_i32::<LittleEndian>(MDA_FLOAT64)?;
    w.write_i32::<LittleEndian>(8)?;
    match i32::try_from(events.len()) {
        Ok(cols) => {
            w.write_i32::<LittleEndian>(2)?;
            w.write_i32::<LittleEndian>(FIRINGS_ROWS as i32)?;
            w.write_i32::<LittleEndian>(cols)?;
        }
        Err(_) => {
            w.write_i32::<LittleEndian>(-2)?;
            w.write_i64::<LittleEndian>(FIRINGS_ROWS as i64)?;
            w.write_i64::<LittleEndian>(events.len() as i64)?;
        }
    }
    for event in events {
        w.write_f64::<LittleEndian>(event.channel as f64)?;
        w.write_f64::<LittleEndian>(event.frame as f64)?;
        w.write_f64::<LittleEndian>(event.label as f64)?;
    }
    Ok(())
}

/// Reads a firings array.
///
/// Errors are returned as strings; the caller wraps them with the location.
pub fn read_firings<R: Read>(r: &mut R) -> Result<Vec<SpikeEvent>, String> {
    let io = |e: std::io::Error| format!("truncated header: {}", e);

    let code = r.read_i32::<LittleEndian>().map_err(io)?;
    let dtype =
        MdaType::from_code(code).ok_or_else(|| format!("unsupported data type code {}", code))?;
    let bytes_per_entry = r.read_i32::<LittleEndian>().map_err(io)?;
    if bytes_per_entry as usize != dtype.size() {
        return Err(format!(
            "bytes per entry {} does not match data type code {}",
            bytes_per_entry, code
        ));
    }

    let ndims = r.read_i32::<LittleEndian>().map_err(io)?;
    let wide = ndims < 0;
    let ndims = ndims.unsigned_abs() as usize;
    if !(1..=50).contains(&ndims) {
        return Err(format!("invalid number of dimensions {}", ndims));
    }
    let mut dims = Vec::with_capacity(ndims);
    for _ in 0..ndims {
        let d = if wide {
            r.read_i64::<LittleEndian>().map_err(io)?
        } else {
            r.read_i32::<LittleEndian>().map_err(io)? as i64
        };
        if d < 0 {
            return Err(format!("negative dimension {}", d));
        }
        dims.push(d as usize);
    }

    // A firings array is 3×L; trailing singleton dims are tolerated.
    if dims.len() < 2 || dims[0] != FIRINGS_ROWS || dims.iter().skip(2).any(|&d| d != 1) {
        return Err(format!("expected shape 3xL, found {:?}", dims));
    }
    let cols = dims[1];
    if cols.checked_mul(FIRINGS_ROWS * dtype.size()).is_none() {
        return Err(format!("data size of {} columns overflows", cols));
    }

    let mut events = Vec::with_capacity(cols.min(PREALLOC_LIMIT));
    let data = |e: std::io::Error| format!("truncated data: {}", e);
    for _ in 0..cols {
        let channel = dtype.read_value(r).map_err(data)?;
        let frame = dtype.read_value(r).map_err(data)?;
        let label = dtype.read_value(r).map_err(data)?;
        events.push(SpikeEvent::new(
            to_u32(channel, "channel")?,
            to_index(frame, "frame")?,
            to_u32(label, "label")?,
        ));
    }
    Ok(events)
}

fn to_index(value: f64, what: &str) -> Result<u64, String> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(format!("{} value {} is not a non-negative integer", what, value));
    }
    if value > MAX_EXACT_FRAME as f64 {
        return Err(format!("{} value {} is too large", what, value));
    }
    Ok(value as u64)
}

fn to_u32(value: f64, what: &str) -> Result<u32, String> {
    let index = to_index(value, what)?;
    u32::try_from(index).map_err(|_| format!("{} value {} does not fit in u32", what, index))
}
