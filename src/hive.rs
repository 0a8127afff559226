//! On-disk registry hive (`regf`) container parsing.
//!
//! Layout handled here:
//! ```text
//! +0x0000  base block ("regf", 4096 bytes)
//!   +0x04  primary / secondary sequence numbers
//!   +0x0C  last written FILETIME
//!   +0x24  root cell offset (relative to +0x1000)
//!   +0x28  hive bins data size
//!   +0x30  embedded file name, UTF-16LE, 64 bytes
//! +0x1000  hive bins ("hbin"), holding cells: |size (i32)|payload...|
//!          allocated cells carry a negative size
//! ```
//! Cell payloads are identified by a two-byte signature: `nk` key node,
//! `vk` value, `lf`/`lh`/`li`/`ri` subkey index lists, `db` big data.

use crate::error::{Error, Result};
use crate::registry::{HiveContainer, RegistryKey, RegistryValue, RegistryValueType};
use crate::wide_string::{decode_latin1, decode_utf16le};
use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};

/// Hive bins start right after the base block
pub const HBIN_START_OFFSET: usize = 0x1000;
/// Marker for "no cell" in offset fields
pub const NO_CELL: u32 = 0xFFFF_FFFF;

const REGF_SIGNATURE: &[u8; 4] = b"regf";
const HBIN_SIGNATURE: &[u8; 4] = b"hbin";
const NK_SIGNATURE: &[u8; 2] = b"nk";
const VK_SIGNATURE: &[u8; 2] = b"vk";
const LF_SIGNATURE: &[u8; 2] = b"lf";
const LH_SIGNATURE: &[u8; 2] = b"lh";
const LI_SIGNATURE: &[u8; 2] = b"li";
const RI_SIGNATURE: &[u8; 2] = b"ri";
const DB_SIGNATURE: &[u8; 2] = b"db";

// nk payload offsets, relative to the signature
const NK_FLAGS: usize = 2;
const NK_LAST_WRITTEN: usize = 4;
const NK_PARENT: usize = 16;
const NK_SUBKEY_COUNT: usize = 20;
const NK_SUBKEY_LIST: usize = 28;
const NK_VALUE_COUNT: usize = 36;
const NK_VALUE_LIST: usize = 40;
const NK_NAME_LENGTH: usize = 72;
const NK_NAME_START: usize = 76;

// vk payload offsets, relative to the signature
const VK_NAME_LENGTH: usize = 2;
const VK_DATA_LENGTH: usize = 4;
const VK_DATA_OFFSET: usize = 8;
const VK_TYPE: usize = 12;
const VK_FLAGS: usize = 16;
const VK_NAME_START: usize = 20;

/// High bit of the vk data length: data lives in the offset field itself
const VK_DATA_RESIDENT: u32 = 0x8000_0000;
/// Largest value stored in a single cell before hives switch to `db` records
pub const BIG_DATA_THRESHOLD: usize = 16344;

/// Upper bound on list entries, far above anything a real SAM holds
const MAX_LIST_ENTRIES: usize = 0x10000;

/// FILETIME epoch difference (100-nanosecond intervals)
const FILETIME_UNIX_EPOCH: u64 = 116444736000000000;

bitflags! {
    /// Key node flags
    pub struct NodeKeyFlags: u16 {
        const KEY_IS_VOLATILE   = 0x0001;
        const KEY_HIVE_EXIT     = 0x0002;
        const KEY_HIVE_ENTRY    = 0x0004;
        const KEY_NO_DELETE     = 0x0008;
        const KEY_SYM_LINK      = 0x0010;
        const KEY_COMP_NAME     = 0x0020;
        const KEY_PREDEF_HANDLE = 0x0040;
        const KEY_VIRT_MIRRORED = 0x0080;
        const KEY_VIRT_TARGET   = 0x0100;
        const KEY_VIRTUAL_STORE = 0x0200;
    }
}

bitflags! {
    /// Value key flags
    pub struct ValueKeyFlags: u16 {
        const VALUE_COMP_NAME = 0x0001;
    }
}

/// Registry hive base block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiveHeader {
    /// Primary sequence number
    pub primary_sequence: u32,
    /// Secondary sequence number
    pub secondary_sequence: u32,
    /// Last written timestamp (FILETIME)
    pub last_written: u64,
    /// Major version
    pub major_version: u32,
    /// Minor version
    pub minor_version: u32,
    /// File type (0 = primary, 1 = log)
    pub file_type: u32,
    /// File format (1 = direct memory load)
    pub file_format: u32,
    /// Root cell offset
    pub root_cell_offset: u32,
    /// Size of the hive bins data
    pub hive_bins_size: u32,
    /// Clustering factor
    pub clustering_factor: u32,
    /// Embedded file name
    pub file_name: String,
}

impl HiveHeader {
    /// Parse the 4096-byte base block
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HBIN_START_OFFSET {
            return Err(Error::MalformedHive(format!(
                "hive too small for base block ({} bytes)",
                data.len()
            )));
        }

        let mut cursor = Cursor::new(data);
        let mut signature = [0u8; 4];
        cursor.read_exact(&mut signature)?;
        if &signature != REGF_SIGNATURE {
            return Err(Error::MalformedHive("invalid regf signature".to_string()));
        }

        let primary_sequence = cursor.read_u32::<LittleEndian>()?;
        let secondary_sequence = cursor.read_u32::<LittleEndian>()?;
        let last_written = cursor.read_u64::<LittleEndian>()?;
        let major_version = cursor.read_u32::<LittleEndian>()?;
        let minor_version = cursor.read_u32::<LittleEndian>()?;
        let file_type = cursor.read_u32::<LittleEndian>()?;
        let file_format = cursor.read_u32::<LittleEndian>()?;
        let root_cell_offset = cursor.read_u32::<LittleEndian>()?;
        let hive_bins_size = cursor.read_u32::<LittleEndian>()?;
        let clustering_factor = cursor.read_u32::<LittleEndian>()?;

        let mut name_buffer = [0u8; 64];
        cursor.read_exact(&mut name_buffer)?;
        let file_name = decode_utf16le(&name_buffer);

        Ok(HiveHeader {
            primary_sequence,
            secondary_sequence,
            last_written,
            major_version,
            minor_version,
            file_type,
            file_format,
            root_cell_offset,
            hive_bins_size,
            clustering_factor,
            file_name,
        })
    }

    /// Whether the last write completed (sequence numbers agree)
    pub fn is_consistent(&self) -> bool {
        self.primary_sequence == self.secondary_sequence
    }

    /// Last written time as UTC
    pub fn last_written_utc(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.last_written)
    }
}

/// Convert FILETIME to DateTime<Utc>
pub fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
    if filetime == 0 {
        return None;
    }

    let unix_time = (filetime.saturating_sub(FILETIME_UNIX_EPOCH)) / 10000000;
    DateTime::from_timestamp(unix_time as i64, 0)
}

/// Immutable hive image plus its parsed base block.
///
/// `D` is any byte container: an owned `Vec<u8>` or a memory map.
#[derive(Debug)]
pub struct RegfHive<D: AsRef<[u8]> = Vec<u8>> {
    data: D,
    header: HiveHeader,
}

impl<D: AsRef<[u8]>> RegfHive<D> {
    /// Take ownership of `data` and validate the base block and first bin
    pub fn parse(data: D) -> Result<Self> {
        let bytes = data.as_ref();
        let header = HiveHeader::parse(bytes)?;

        if bytes.get(HBIN_START_OFFSET..HBIN_START_OFFSET + 4) != Some(&HBIN_SIGNATURE[..]) {
            return Err(Error::MalformedHive("missing first hbin".to_string()));
        }
        if !header.is_consistent() {
            log::warn!(
                "hive sequence numbers differ ({} != {}), hive may be dirty",
                header.primary_sequence,
                header.secondary_sequence
            );
        }

        Ok(Self { data, header })
    }

    /// Parsed base block
    pub fn header(&self) -> &HiveHeader {
        &self.header
    }

    /// Raw hive bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Payload of the cell at `offset` (bin-relative), without its size prefix.
    fn cell(&self, offset: u32) -> Result<&[u8]> {
        if offset == NO_CELL {
            return Err(Error::MalformedHive("dereferenced empty cell offset".to_string()));
        }

        let data = self.as_bytes();
        let start = HBIN_START_OFFSET + offset as usize;
        if start + 4 > data.len() {
            return Err(Error::MalformedHive(format!(
                "cell offset {:#x} beyond end of hive",
                offset
            )));
        }

        let size = LittleEndian::read_i32(&data[start..start + 4]).unsigned_abs() as usize;
        if size < 4 || start + size > data.len() {
            return Err(Error::MalformedHive(format!(
                "cell at {:#x} has invalid size {}",
                offset, size
            )));
        }

        Ok(&data[start + 4..start + size])
    }

    /// Cell payload that must start with `signature` and be at least `min_len` long
    fn signed_cell(&self, offset: u32, signature: &[u8; 2], min_len: usize) -> Result<&[u8]> {
        let payload = self.cell(offset)?;
        if payload.len() < min_len.max(2) || &payload[0..2] != signature {
            return Err(Error::MalformedHive(format!(
                "expected '{}' cell at {:#x}",
                String::from_utf8_lossy(signature),
                offset
            )));
        }
        Ok(payload)
    }

    fn read_key_node(&self, offset: u32) -> Result<RegistryKey> {
        let nk = self.signed_cell(offset, NK_SIGNATURE, NK_NAME_START)?;

        let flags = NodeKeyFlags::from_bits_truncate(LittleEndian::read_u16(&nk[NK_FLAGS..]));
        let name_length = LittleEndian::read_u16(&nk[NK_NAME_LENGTH..]) as usize;
        let name_bytes = nk
            .get(NK_NAME_START..NK_NAME_START + name_length)
            .ok_or_else(|| {
                Error::MalformedHive(format!("key name overruns cell at {:#x}", offset))
            })?;

        let name = if flags.contains(NodeKeyFlags::KEY_COMP_NAME) {
            decode_latin1(name_bytes)
        } else {
            decode_utf16le(name_bytes)
        };

        Ok(RegistryKey {
            name,
            cell_offset: offset,
            parent_offset: LittleEndian::read_u32(&nk[NK_PARENT..]),
            flags,
            last_written: LittleEndian::read_u64(&nk[NK_LAST_WRITTEN..]),
            subkey_count: LittleEndian::read_u32(&nk[NK_SUBKEY_COUNT..]),
            subkey_list_offset: LittleEndian::read_u32(&nk[NK_SUBKEY_LIST..]),
            value_count: LittleEndian::read_u32(&nk[NK_VALUE_COUNT..]),
            value_list_offset: LittleEndian::read_u32(&nk[NK_VALUE_LIST..]),
        })
    }

    /// Child nk offsets from an index list, flattening one level of `ri`.
    fn read_subkey_list(&self, offset: u32, allow_root: bool) -> Result<Vec<u32>> {
        let list = self.cell(offset)?;
        if list.len() < 4 {
            return Err(Error::MalformedHive(format!("subkey list at {:#x} too short", offset)));
        }

        let signature = [list[0], list[1]];
        let count = LittleEndian::read_u16(&list[2..4]) as usize;
        let entry_size = match &signature {
            LF_SIGNATURE | LH_SIGNATURE => 8,
            LI_SIGNATURE | RI_SIGNATURE => 4,
            _ => {
                return Err(Error::MalformedHive(format!(
                    "unknown subkey list signature {:02x}{:02x} at {:#x}",
                    signature[0], signature[1], offset
                )))
            }
        };

        if 4 + count * entry_size > list.len() {
            return Err(Error::MalformedHive(format!(
                "subkey list at {:#x} declares {} entries beyond its cell",
                offset, count
            )));
        }

        let entries = (0..count).map(|i| LittleEndian::read_u32(&list[4 + i * entry_size..]));

        if &signature == RI_SIGNATURE {
            if !allow_root {
                return Err(Error::MalformedHive(format!("nested ri list at {:#x}", offset)));
            }
            let mut offsets = Vec::new();
            for leaf in entries {
                offsets.extend(self.read_subkey_list(leaf, false)?);
            }
            Ok(offsets)
        } else {
            Ok(entries.collect())
        }
    }

    fn read_value(&self, offset: u32) -> Result<RegistryValue> {
        let vk = self.signed_cell(offset, VK_SIGNATURE, VK_NAME_START)?;

        let name_length = LittleEndian::read_u16(&vk[VK_NAME_LENGTH..]) as usize;
        let raw_length = LittleEndian::read_u32(&vk[VK_DATA_LENGTH..]);
        let data_offset = LittleEndian::read_u32(&vk[VK_DATA_OFFSET..]);
        let value_type = RegistryValueType::from(LittleEndian::read_u32(&vk[VK_TYPE..]));
        let flags = ValueKeyFlags::from_bits_truncate(LittleEndian::read_u16(&vk[VK_FLAGS..]));

        let name_bytes = vk
            .get(VK_NAME_START..VK_NAME_START + name_length)
            .ok_or_else(|| {
                Error::MalformedHive(format!("value name overruns cell at {:#x}", offset))
            })?;
        let name = if flags.contains(ValueKeyFlags::VALUE_COMP_NAME) {
            decode_latin1(name_bytes)
        } else {
            decode_utf16le(name_bytes)
        };

        let length = (raw_length & !VK_DATA_RESIDENT) as usize;
        let data = if length == 0 {
            Vec::new()
        } else if raw_length & VK_DATA_RESIDENT != 0 {
            vk[VK_DATA_OFFSET..VK_DATA_OFFSET + length.min(4)].to_vec()
        } else if length > BIG_DATA_THRESHOLD && self.header.minor_version > 3 {
            self.read_big_data(data_offset, length)?
        } else {
            let cell = self.cell(data_offset)?;
            cell.get(..length)
                .ok_or_else(|| {
                    Error::MalformedHive(format!(
                        "value data at {:#x} shorter than declared {} bytes",
                        data_offset, length
                    ))
                })?
                .to_vec()
        };

        Ok(RegistryValue {
            name,
            value_type,
            data,
        })
    }

    /// Reassemble a segmented value from its `db` record
    fn read_big_data(&self, offset: u32, length: usize) -> Result<Vec<u8>> {
        let db = self.signed_cell(offset, DB_SIGNATURE, 8)?;
        let segment_count = LittleEndian::read_u16(&db[2..4]) as usize;
        let list_offset = LittleEndian::read_u32(&db[4..8]);

        let list = self.cell(list_offset)?;
        if segment_count * 4 > list.len() {
            return Err(Error::MalformedHive(format!(
                "big data segment list at {:#x} too short",
                list_offset
            )));
        }

        let mut data = Vec::with_capacity(length);
        for i in 0..segment_count {
            let segment = self.cell(LittleEndian::read_u32(&list[i * 4..]))?;
            let take = (length - data.len()).min(segment.len()).min(BIG_DATA_THRESHOLD);
            data.extend_from_slice(&segment[..take]);
            if data.len() == length {
                break;
            }
        }

        if data.len() < length {
            return Err(Error::MalformedHive(format!(
                "big data at {:#x} holds {} of {} bytes",
                offset,
                data.len(),
                length
            )));
        }
        Ok(data)
    }
}

impl<D: AsRef<[u8]>> HiveContainer for RegfHive<D> {
    fn root(&self) -> Result<RegistryKey> {
        self.read_key_node(self.header.root_cell_offset)
    }

    fn subkeys(&self, key: &RegistryKey) -> Result<Vec<RegistryKey>> {
        if key.subkey_count == 0 || key.subkey_list_offset == NO_CELL {
            return Ok(Vec::new());
        }

        let offsets = self.read_subkey_list(key.subkey_list_offset, true)?;
        if offsets.len() != key.subkey_count as usize {
            log::debug!(
                "key '{}' declares {} subkeys, index lists {}",
                key.name,
                key.subkey_count,
                offsets.len()
            );
        }

        offsets.into_iter().map(|off| self.read_key_node(off)).collect()
    }

    fn values(&self, key: &RegistryKey) -> Result<Vec<RegistryValue>> {
        if key.value_count == 0 || key.value_list_offset == NO_CELL {
            return Ok(Vec::new());
        }

        let count = key.value_count as usize;
        if count > MAX_LIST_ENTRIES {
            return Err(Error::MalformedHive(format!(
                "value count {} is unreasonably large",
                count
            )));
        }

        let list = self.cell(key.value_list_offset)?;
        if count * 4 > list.len() {
            return Err(Error::MalformedHive(format!(
                "value list of '{}' shorter than {} entries",
                key.name, count
            )));
        }

        (0..count)
            .map(|i| self.read_value(LittleEndian::read_u32(&list[i * 4..])))
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use chrono::Datelike;

    fn tree() -> KeySpec {
        KeySpec::new("CMI-CreateHive{C4E7BA2B}")
            .value("small", 4, vec![0x2A, 0, 0, 0])
            .value("blob", 3, (0u8..40).collect())
            .child(KeySpec::new("alpha"))
            .child(KeySpec::new("beta"))
            .child(KeySpec::new("gamma"))
            .child(KeySpec::new("delta"))
    }

    fn child_names(hive: &RegfHive) -> Vec<String> {
        let root = hive.root().unwrap();
        hive.subkeys(&root).unwrap().into_iter().map(|k| k.name).collect()
    }

    #[test]
    fn test_header_fields() {
        let hive = RegfHive::parse(build_hive(&tree())).unwrap();
        let header = hive.header();
        assert_eq!(header.major_version, 1);
        assert_eq!(header.minor_version, 5);
        assert_eq!(header.file_name, "\\SystemRoot\\System32\\Config\\SAM");
        assert!(header.is_consistent());
        assert_eq!(header.last_written_utc().unwrap().year(), 2019);
    }

    #[test]
    fn test_root_key() {
        let hive = RegfHive::parse(build_hive(&tree())).unwrap();
        let root = hive.root().unwrap();
        assert_eq!(root.name, "CMI-CreateHive{C4E7BA2B}");
        assert!(root.flags.contains(NodeKeyFlags::KEY_HIVE_ENTRY));
        assert_eq!(root.subkey_count, 4);
        assert_eq!(root.value_count, 2);
    }

    #[test]
    fn test_every_list_kind_keeps_disk_order() {
        for kind in [ListKind::Lf, ListKind::Lh, ListKind::Li, ListKind::Ri] {
            let hive = RegfHive::parse(build_hive_with(&tree(), kind)).unwrap();
            assert_eq!(
                child_names(&hive),
                vec!["alpha", "beta", "gamma", "delta"],
                "list kind {:?}",
                kind
            );
        }
    }

    #[test]
    fn test_children_point_back_to_parent() {
        let hive = RegfHive::parse(build_hive(&tree())).unwrap();
        let root = hive.root().unwrap();
        for child in hive.subkeys(&root).unwrap() {
            assert_eq!(child.parent_offset, root.cell_offset);
        }
    }

    #[test]
    fn test_resident_and_external_values() {
        let hive = RegfHive::parse(build_hive(&tree())).unwrap();
        let root = hive.root().unwrap();
        let values = hive.values(&root).unwrap();
        assert_eq!(values.len(), 2);

        assert_eq!(values[0].name, "small");
        assert_eq!(values[0].value_type, RegistryValueType::DWord);
        assert_eq!(values[0].data, vec![0x2A, 0, 0, 0]);

        assert_eq!(values[1].name, "blob");
        assert_eq!(values[1].data, (0u8..40).collect::<Vec<u8>>());
    }

    #[test]
    fn test_big_data_value() {
        let payload: Vec<u8> = (0..40000u32).map(|i| (i % 251) as u8).collect();
        let spec = KeySpec::new("root").value("big", 3, payload.clone());
        let hive = RegfHive::parse(build_hive(&spec)).unwrap();
        let values = hive.values(&hive.root().unwrap()).unwrap();
        assert_eq!(values[0].data.len(), 40000);
        assert_eq!(values[0].data, payload);
    }

    #[test]
    fn test_bad_signature() {
        let mut image = build_hive(&tree());
        image[0] = b'x';
        assert!(matches!(RegfHive::parse(image), Err(Error::MalformedHive(_))));
    }

    #[test]
    fn test_missing_hbin() {
        let mut image = build_hive(&tree());
        image[HBIN_START_OFFSET] = 0;
        assert!(matches!(RegfHive::parse(image), Err(Error::MalformedHive(_))));
    }

    #[test]
    fn test_truncated_image_reports_malformed() {
        let image = build_hive(&tree());
        let root_offset = LittleEndian::read_u32(&image[0x24..]) as usize;
        // Cut the image inside the root key cell
        let cut = image[..HBIN_START_OFFSET + root_offset + 10].to_vec();
        let hive = RegfHive::parse(cut).unwrap();
        assert!(matches!(hive.root(), Err(Error::MalformedHive(_))));
    }

    #[test]
    fn test_corrupt_subkey_list() {
        let image = build_hive(&tree());
        let hive = RegfHive::parse(image.clone()).unwrap();
        let root = hive.root().unwrap();

        let mut corrupt = image;
        let at = HBIN_START_OFFSET + root.subkey_list_offset as usize + 4;
        corrupt[at..at + 2].copy_from_slice(b"zz");
        let hive = RegfHive::parse(corrupt).unwrap();
        assert!(matches!(hive.subkeys(&root), Err(Error::MalformedHive(_))));
    }

    #[test]
    fn test_filetime_conversion() {
        assert!(filetime_to_datetime(0).is_none());
        let dt = filetime_to_datetime(125911584000000000).unwrap();
        assert_eq!(dt.year(), 2000);
        assert_eq!(dt.month(), 1);
        assert_eq!(dt.day(), 1);
    }
}
