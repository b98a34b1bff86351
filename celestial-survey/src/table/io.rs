//! Table persistence.
//!
//! [`TableStore`] is the seam through which every shard, tile table and merged
//! catalog is read or written. [`ColumnarFile`] is the bundled implementation,
//! a little-endian binary layout:
//!
//! 1. **Header** (20 bytes): magic `CTAB`, format version, column count, row count
//! 2. **Columns**, in order: name length + UTF-8 name, kind tag, payload
//!
//! Payloads are `rows × 8` bytes for `Int` and `Float`, `rows` bytes for
//! `Bool`, and a `u32` length plus UTF-8 bytes per row for `Str`.
//!
//! Files are memory-mapped, decoded in full and released before returning.
//! Writes go to a sibling temp file that is renamed into place.

use super::{Column, ColumnKind, Table};
use crate::error::{Result, SurveyError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const TABLE_MAGIC: &[u8; 4] = b"CTAB";
const TABLE_VERSION: u32 = 1;
const HEADER_SIZE: usize = 20;

/// Reads and writes whole tables.
pub trait TableStore {
    /// File extension (without the dot) used for tables this store writes.
    fn extension(&self) -> &str;

    fn read_table(&self, path: &Path) -> Result<Table>;

    /// Write `table` to `path`. With `overwrite = false` an existing file is
    /// an [`Io`](SurveyError::Io) error of kind `AlreadyExists`.
    fn write_table(&self, table: &Table, path: &Path, overwrite: bool) -> Result<()>;
}

/// The binary columnar table format.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnarFile;

impl ColumnarFile {
    pub const EXTENSION: &'static str = "ctab";
}

impl TableStore for ColumnarFile {
    fn extension(&self) -> &str {
        Self::EXTENSION
    }

    fn read_table(&self, path: &Path) -> Result<Table> {
        let file = File::open(path).map_err(|e| SurveyError::io(path, e))?;
        let len = file.metadata().map_err(|e| SurveyError::io(path, e))?.len();
        if len < HEADER_SIZE as u64 {
            return Err(SurveyError::corrupt(
                path,
                format!("file too small: {len} bytes"),
            ));
        }

        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| SurveyError::io(path, e))?;
        let table = decode(&mmap).map_err(|message| SurveyError::corrupt(path, message))?;
        debug!(
            path = %path.display(),
            rows = table.num_rows(),
            columns = table.num_columns(),
            "read table"
        );
        Ok(table)
    }

    fn write_table(&self, table: &Table, path: &Path, overwrite: bool) -> Result<()> {
        if !overwrite && path.exists() {
            return Err(SurveyError::io(
                path,
                io::Error::new(io::ErrorKind::AlreadyExists, "refusing to overwrite"),
            ));
        }

        let tmp = temp_path(path);
        let written = File::create(&tmp).and_then(|file| {
            let mut writer = BufWriter::new(file);
            encode(table, &mut writer)?;
            writer.flush()
        });
        if let Err(e) = written.and_then(|_| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(SurveyError::io(path, e));
        }
        debug!(path = %path.display(), rows = table.num_rows(), "wrote table");
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

fn encode<W: Write>(table: &Table, w: &mut W) -> io::Result<()> {
    w.write_all(TABLE_MAGIC)?;
    w.write_u32::<LittleEndian>(TABLE_VERSION)?;
    w.write_u32::<LittleEndian>(table.num_columns() as u32)?;
    w.write_u64::<LittleEndian>(table.num_rows() as u64)?;

    for (name, column) in table.columns() {
        w.write_u32::<LittleEndian>(name.len() as u32)?;
        w.write_all(name.as_bytes())?;
        w.write_u8(column.kind().tag())?;
        match column {
            Column::Int(v) => {
                for &x in v {
                    w.write_i64::<LittleEndian>(x)?;
                }
            }
            Column::Float(v) => {
                for &x in v {
                    w.write_f64::<LittleEndian>(x)?;
                }
            }
            Column::Bool(v) => {
                for &x in v {
                    w.write_u8(u8::from(x))?;
                }
            }
            Column::Str(v) => {
                for s in v {
                    w.write_u32::<LittleEndian>(s.len() as u32)?;
                    w.write_all(s.as_bytes())?;
                }
            }
        }
    }
    Ok(())
}

/// Decode a whole table; errors are messages for [`SurveyError::CorruptTable`].
fn decode(bytes: &[u8]) -> std::result::Result<Table, String> {
    let mut r = Cursor::new(bytes);
    let truncated = |e: io::Error| format!("truncated payload: {e}");

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(truncated)?;
    if &magic != TABLE_MAGIC {
        return Err(format!(
            "invalid magic: expected {TABLE_MAGIC:?}, got {magic:?}"
        ));
    }
    let version = r.read_u32::<LittleEndian>().map_err(truncated)?;
    if version != TABLE_VERSION {
        return Err(format!(
            "unsupported version: expected {TABLE_VERSION}, got {version}"
        ));
    }
    let ncols = r.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    let rows = r.read_u64::<LittleEndian>().map_err(truncated)? as usize;

    let mut table = Table::new();
    for _ in 0..ncols {
        let name_len = r.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        ensure_remaining(&r, name_len)?;
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name).map_err(truncated)?;
        let name = String::from_utf8(name).map_err(|_| "column name is not UTF-8".to_string())?;
        if table.has_column(&name) {
            return Err(format!("duplicate column '{name}'"));
        }

        let tag = r.read_u8().map_err(truncated)?;
        let kind = ColumnKind::from_tag(tag)
            .ok_or_else(|| format!("unknown kind tag {tag} for column '{name}'"))?;
        let column = match kind {
            ColumnKind::Int => {
                ensure_remaining(&r, rows.saturating_mul(8))?;
                let mut v = vec![0i64; rows];
                r.read_i64_into::<LittleEndian>(&mut v).map_err(truncated)?;
                Column::Int(v)
            }
            ColumnKind::Float => {
                ensure_remaining(&r, rows.saturating_mul(8))?;
                let mut v = vec![0f64; rows];
                r.read_f64_into::<LittleEndian>(&mut v).map_err(truncated)?;
                Column::Float(v)
            }
            ColumnKind::Bool => {
                ensure_remaining(&r, rows)?;
                let mut v = vec![0u8; rows];
                r.read_exact(&mut v).map_err(truncated)?;
                Column::Bool(v.into_iter().map(|b| b != 0).collect())
            }
            ColumnKind::Str => {
                ensure_remaining(&r, rows.saturating_mul(4))?;
                let mut v = Vec::with_capacity(rows);
                for _ in 0..rows {
                    let len = r.read_u32::<LittleEndian>().map_err(truncated)? as usize;
                    ensure_remaining(&r, len)?;
                    let mut s = vec![0u8; len];
                    r.read_exact(&mut s).map_err(truncated)?;
                    v.push(
                        String::from_utf8(s)
                            .map_err(|_| format!("non UTF-8 string in column '{name}'"))?,
                    );
                }
                Column::Str(v)
            }
        };
        table
            .push_column(name, column)
            .map_err(|e| e.to_string())?;
    }

    if (r.position() as usize) != bytes.len() {
        return Err(format!(
            "{} trailing bytes after last column",
            bytes.len() - r.position() as usize
        ));
    }
    Ok(table)
}

fn ensure_remaining(r: &Cursor<&[u8]>, needed: usize) -> std::result::Result<(), String> {
    let remaining = r.get_ref().len().saturating_sub(r.position() as usize);
    if needed > remaining {
        return Err(format!(
            "truncated payload: need {needed} bytes, {remaining} left"
        ));
    }
    Ok(())
}
