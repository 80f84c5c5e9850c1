//! Minimal reader for 2-D NumPy `.npy` arrays (e.g. Kilosort's `clus_Table.npy`).
//!
//! Supports format versions 1-3, fixed-width integer and float dtypes in
//! either byte order, and C or Fortran memory layout. Values are widened to
//! `f64`.

use crate::clusters::ChannelMapEntry;
use crate::error::{QcError, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::path::Path;

const MAGIC: &[u8] = b"\x93NUMPY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Header {
    dtype: Dtype,
    big_endian: bool,
    fortran_order: bool,
    shape: Vec<usize>,
}

/// A dense row-major matrix read from a `.npy` file
#[derive(Debug, Clone, PartialEq)]
pub struct NpyMatrix {
    pub rows: usize,
    pub cols: usize,
    data: Vec<f64>,
}

impl NpyMatrix {
    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.rows).map(move |r| self.row(r))
    }
}

pub fn read_npy_matrix(path: &Path) -> Result<NpyMatrix> {
    if !path.exists() {
        return Err(QcError::FileNotFound(path.display().to_string()));
    }
    let bytes = std::fs::read(path)?;
    parse_npy_matrix(&bytes)
}

/// Read a cluster table (`[spike_count, channel, ...]` per row).
pub fn read_cluster_table(path: &Path) -> Result<Vec<ChannelMapEntry>> {
    let matrix = read_npy_matrix(path)?;
    if matrix.cols < 2 {
        return Err(QcError::MalformedInput(format!(
            "{}: cluster table needs at least 2 columns, found {}",
            path.display(),
            matrix.cols
        )));
    }
    matrix.iter_rows().map(ChannelMapEntry::from_row).collect()
}

pub fn parse_npy_matrix(bytes: &[u8]) -> Result<NpyMatrix> {
    let mut cursor = Cursor::new(bytes);

    let mut magic = [0u8; 6];
    cursor.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(QcError::UnsupportedFormat("missing NPY magic string".to_string()));
    }

    let major = cursor.read_u8()?;
    let _minor = cursor.read_u8()?;
    let header_len = match major {
        1 => cursor.read_u16::<LittleEndian>()? as usize,
        2 | 3 => cursor.read_u32::<LittleEndian>()? as usize,
        v => {
            return Err(QcError::UnsupportedFormat(format!(
                "NPY format version {}",
                v
            )))
        }
    };

    let mut header_bytes = vec![0u8; header_len];
    cursor.read_exact(&mut header_bytes)?;
    let header = parse_header(&String::from_utf8_lossy(&header_bytes))?;

    let (rows, cols) = match header.shape.as_slice() {
        [rows, cols] => (*rows, *cols),
        [rows] => (*rows, 1),
        shape => {
            return Err(QcError::UnsupportedFormat(format!(
                "expected a 2-D array, got shape {:?}",
                shape
            )))
        }
    };

    let (count, needed) = rows
        .checked_mul(cols)
        .and_then(|count| Some((count, count.checked_mul(dtype_size(header.dtype))?)))
        .ok_or_else(|| {
            QcError::MalformedInput(format!("NPY shape ({}, {}) is too large", rows, cols))
        })?;
    let payload = &bytes[cursor.position() as usize..];
    if payload.len() < needed {
        return Err(QcError::MalformedInput(format!(
            "NPY payload has {} bytes, expected {}",
            payload.len(),
            needed
        )));
    }

    let stored = if header.big_endian {
        decode::<BigEndian>(payload, header.dtype, count)?
    } else {
        decode::<LittleEndian>(payload, header.dtype, count)?
    };

    let data = if header.fortran_order {
        let mut row_major = vec![0.0; count];
        for c in 0..cols {
            for r in 0..rows {
                row_major[r * cols + c] = stored[c * rows + r];
            }
        }
        row_major
    } else {
        stored
    };

    Ok(NpyMatrix { rows, cols, data })
}

fn decode<B: ByteOrder>(payload: &[u8], dtype: Dtype, count: usize) -> Result<Vec<f64>> {
    let mut reader = Cursor::new(payload);
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let v = match dtype {
            Dtype::I8 => reader.read_i8()? as f64,
            Dtype::U8 => reader.read_u8()? as f64,
            Dtype::I16 => reader.read_i16::<B>()? as f64,
            Dtype::U16 => reader.read_u16::<B>()? as f64,
            Dtype::I32 => reader.read_i32::<B>()? as f64,
            Dtype::U32 => reader.read_u32::<B>()? as f64,
            Dtype::I64 => reader.read_i64::<B>()? as f64,
            Dtype::U64 => reader.read_u64::<B>()? as f64,
            Dtype::F32 => reader.read_f32::<B>()? as f64,
            Dtype::F64 => reader.read_f64::<B>()?,
        };
        values.push(v);
    }
    Ok(values)
}

fn dtype_size(dtype: Dtype) -> usize {
    match dtype {
        Dtype::I8 | Dtype::U8 => 1,
        Dtype::I16 | Dtype::U16 => 2,
        Dtype::I32 | Dtype::U32 | Dtype::F32 => 4,
        Dtype::I64 | Dtype::U64 | Dtype::F64 => 8,
    }
}

/// Parse the Python-literal header dict, e.g.
/// `{'descr': '<u4', 'fortran_order': False, 'shape': (12, 2), }`
fn parse_header(header: &str) -> Result<Header> {
    let descr = quoted_value(header, "descr")
        .ok_or_else(|| QcError::UnsupportedFormat("NPY header has no descr".to_string()))?;
    let (big_endian, dtype) = parse_descr(descr)?;

    let fortran_order = match raw_value(header, "fortran_order") {
        Some(v) if v.starts_with("True") => true,
        Some(v) if v.starts_with("False") => false,
        _ => {
            return Err(QcError::UnsupportedFormat(
                "NPY header has no fortran_order".to_string(),
            ))
        }
    };

    let shape_text = raw_value(header, "shape")
        .and_then(|v| {
            let open = v.find('(')?;
            let close = v.find(')')?;
            v.get(open + 1..close)
        })
        .ok_or_else(|| QcError::UnsupportedFormat("NPY header has no shape".to_string()))?;
    let shape = shape_text
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim_end_matches('L').parse::<usize>().map_err(|_| {
                QcError::UnsupportedFormat(format!("bad NPY shape entry '{}'", s))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Header {
        dtype,
        big_endian,
        fortran_order,
        shape,
    })
}

fn parse_descr(descr: &str) -> Result<(bool, Dtype)> {
    let (order, code) = match descr.chars().next() {
        Some(c @ ('<' | '>' | '|' | '=')) => (c, &descr[1..]),
        _ => ('=', descr),
    };
    let dtype = match code {
        "i1" => Dtype::I8,
        "u1" => Dtype::U8,
        "i2" => Dtype::I16,
        "u2" => Dtype::U16,
        "i4" => Dtype::I32,
        "u4" => Dtype::U32,
        "i8" => Dtype::I64,
        "u8" => Dtype::U64,
        "f4" => Dtype::F32,
        "f8" => Dtype::F64,
        other => {
            return Err(QcError::UnsupportedFormat(format!(
                "NPY dtype '{}'",
                other
            )))
        }
    };
    let big_endian = order == '>' || (order == '=' && cfg!(target_endian = "big"));
    Ok((big_endian, dtype))
}

/// Text following `'key':`, trimmed.
fn raw_value<'h>(header: &'h str, key: &str) -> Option<&'h str> {
    let marker = format!("'{}':", key);
    let start = header.find(&marker)? + marker.len();
    Some(header[start..].trim_start())
}

fn quoted_value<'h>(header: &'h str, key: &str) -> Option<&'h str> {
    let rest = raw_value(header, key)?.strip_prefix('\'')?;
    let end = rest.find('\'')?;
    Some(&rest[..end])
}
