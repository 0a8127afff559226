//! Recycle Bin `$I` deletion descriptor parsing.
//!
//! Every deleted file leaves a pair in `$Recycle.Bin\<SID>\`: a small `$I…`
//! descriptor holding the original path and deletion time, and the `$R…`
//! payload holding the content. Two descriptor layouts exist:
//!
//! ```text
//! common   +0x00 version (i64)   +0x08 file size (i64)   +0x10 deleted FILETIME (i64)
//! legacy   +0x18 path, UTF-16LE, fixed 520 bytes (260 chars, NUL padded)
//! current  +0x18 path length in chars (i32)   +0x1C path, UTF-16LE
//! ```
//! Version 2 selects the current layout; every other value is read as legacy.

use crate::error::{Error, Result};
use crate::wide_string::strip_nulls_decode;
use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds between 1601-01-01 and 1970-01-01
pub const WINDOWS_EPOCH_OFFSET_SECS: i64 = 11644473600;

/// Version field value selecting the current layout
pub const CURRENT_FORMAT_VERSION: i64 = 2;

const VERSION_FIELD: usize = 0;
const FILE_SIZE_FIELD: usize = 8;
const DELETED_FIELD: usize = 16;
const PATH_FIELD: usize = 24;
const CURRENT_NAME_LENGTH_FIELD: usize = 24;
const CURRENT_PATH_FIELD: usize = 28;

/// Fixed width of the legacy path field
pub const LEGACY_PATH_BYTES: usize = 520;

/// Layout tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordFormat {
    Legacy,
    Current,
}

impl RecordFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordFormat::Legacy => "legacy",
            RecordFormat::Current => "current",
        }
    }
}

/// Descriptor in the fixed-width layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRecord {
    /// Raw version field (anything other than 2)
    pub version: i64,
    /// Declared size of the deleted file; not checked against the payload
    pub file_size: i64,
    /// Deletion time, Unix seconds
    pub deleted_at: i64,
    /// Original path
    pub original_path: String,
}

/// Descriptor in the length-prefixed layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentRecord {
    /// Declared size of the deleted file; not checked against the payload
    pub file_size: i64,
    /// Deletion time, Unix seconds
    pub deleted_at: i64,
    /// Path length in UTF-16 code units, as stored
    pub name_length: i32,
    /// Original path
    pub original_path: String,
}

/// A decoded `$I` descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum RecycleRecord {
    Legacy(LegacyRecord),
    Current(CurrentRecord),
}

impl RecycleRecord {
    pub fn format(&self) -> RecordFormat {
        match self {
            RecycleRecord::Legacy(_) => RecordFormat::Legacy,
            RecycleRecord::Current(_) => RecordFormat::Current,
        }
    }

    pub fn file_size(&self) -> i64 {
        match self {
            RecycleRecord::Legacy(r) => r.file_size,
            RecycleRecord::Current(r) => r.file_size,
        }
    }

    /// Deletion time in Unix seconds
    pub fn deleted_at(&self) -> i64 {
        match self {
            RecycleRecord::Legacy(r) => r.deleted_at,
            RecycleRecord::Current(r) => r.deleted_at,
        }
    }

    pub fn original_path(&self) -> &str {
        match self {
            RecycleRecord::Legacy(r) => &r.original_path,
            RecycleRecord::Current(r) => &r.original_path,
        }
    }

    /// Deletion time as UTC, `None` if outside chrono's range
    pub fn deleted_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.deleted_at(), 0)
    }
}

/// Convert a raw FILETIME to Unix seconds by keeping its first 11 decimal digits.
///
/// For any FILETIME between 1604 and 5138 this equals `raw / 10_000_000` minus
/// the epoch offset. Values with fewer digits (zero, negatives, small numbers)
/// are used as-is, so `0` maps to `-11644473600`.
pub fn filetime_to_unix_seconds(raw: i64) -> i64 {
    let digits = raw.to_string();
    let prefix: String = digits.chars().take(11).collect();
    // Prefix of an integer's decimal form is itself an integer
    prefix.parse::<i64>().unwrap_or_default() - WINDOWS_EPOCH_OFFSET_SECS
}

fn read_i64(data: &[u8], field: usize) -> Result<i64> {
    data.get(field..field + 8)
        .map(LittleEndian::read_i64)
        .ok_or_else(|| Error::truncated(field as i64, 8, data.len()))
}

fn span(data: &[u8], offset: usize, length: i64) -> Result<&[u8]> {
    if length < 0 || offset as i64 + length > data.len() as i64 {
        return Err(Error::truncated(offset as i64, length, data.len()));
    }
    Ok(&data[offset..offset + length as usize])
}

/// Decode a `$I` descriptor.
///
/// Any version other than 2 is parsed with the legacy layout. Fails with
/// [`Error::TruncatedRecord`] when the header or path span does not fit.
pub fn decode(data: &[u8]) -> Result<RecycleRecord> {
    let version = read_i64(data, VERSION_FIELD)?;
    let file_size = read_i64(data, FILE_SIZE_FIELD)?;
    let deleted_at = filetime_to_unix_seconds(read_i64(data, DELETED_FIELD)?);

    if version == CURRENT_FORMAT_VERSION {
        let name_length = data
            .get(CURRENT_NAME_LENGTH_FIELD..CURRENT_PATH_FIELD)
            .map(LittleEndian::read_i32)
            .ok_or_else(|| Error::truncated(CURRENT_NAME_LENGTH_FIELD as i64, 4, data.len()))?;
        let path = span(data, CURRENT_PATH_FIELD, name_length as i64 * 2)?;

        Ok(RecycleRecord::Current(CurrentRecord {
            file_size,
            deleted_at,
            name_length,
            original_path: strip_nulls_decode(path),
        }))
    } else {
        if version != 1 {
            log::debug!("unrecognised $I version {}, reading as legacy layout", version);
        }
        let path = span(data, PATH_FIELD, LEGACY_PATH_BYTES as i64)?;

        Ok(RecycleRecord::Legacy(LegacyRecord {
            version,
            file_size,
            deleted_at,
            original_path: strip_nulls_decode(path),
        }))
    }
}

/// Name of the `$R` payload paired with a `$I` descriptor, if `name` is one.
pub fn payload_name_for(descriptor_name: &str) -> Option<String> {
    descriptor_name
        .strip_prefix("$I")
        .map(|rest| format!("$R{}", rest))
}

/// Account RID from a recycle directory name such as `S-1-5-21-…-1000`.
///
/// Takes the text after the last `-`, drops path separators, and parses it as
/// decimal. Returns `None` when that text is not a number.
pub fn rid_from_directory(directory: &str) -> Option<u64> {
    let tail = match directory.rfind('-') {
        Some(pos) => &directory[pos + 1..],
        None => directory,
    };
    let cleaned: String = tail.chars().filter(|c| *c != '/' && *c != '\\').collect();
    cleaned.parse().ok()
}

/// Test helpers producing descriptor bytes
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    fn header(version: i64, file_size: i64, filetime: i64) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&version.to_le_bytes());
        data.extend_from_slice(&file_size.to_le_bytes());
        data.extend_from_slice(&filetime.to_le_bytes());
        data
    }

    pub fn current_descriptor(path: &str, file_size: i64, filetime: i64) -> Vec<u8> {
        let units: Vec<u16> = path.encode_utf16().chain(std::iter::once(0)).collect();
        let mut data = header(2, file_size, filetime);
        data.extend_from_slice(&(units.len() as i32).to_le_bytes());
        data.extend(units.iter().flat_map(|u| u.to_le_bytes()));
        data
    }

    pub fn legacy_descriptor(version: i64, path: &str, file_size: i64, filetime: i64) -> Vec<u8> {
        let mut data = header(version, file_size, filetime);
        let mut field: Vec<u8> = path.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        field.resize(LEGACY_PATH_BYTES, 0);
        data.extend_from_slice(&field);
        data
    }
}
