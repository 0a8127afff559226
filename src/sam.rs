//! SAM user account ("V" value) decoding.
//!
//! Each subkey of `SAM/Domains/Account/Users` is named by the account's RID in
//! hex and carries a binary "V" value. The value starts with a table of
//! (offset, length) pairs; string offsets are relative to the end of that
//! 0xCC-byte header:
//!
//! | field     | offset @ | length @ |
//! |-----------|----------|----------|
//! | username  | 12       | 16       |
//! | full name | 24       | 28       |
//! | comment   | 36       | 40       |

use crate::error::{Error, Result};
use crate::wide_string::strip_nulls_decode;
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// Size of the fixed "V" header; string offsets are relative to its end
pub const V_HEADER_SIZE: i64 = 0xCC;

const USERNAME_FIELD: usize = 12;
const FULL_NAME_FIELD: usize = 24;
const COMMENT_FIELD: usize = 36;
/// Bytes needed to read the last (offset, length) pair
const V_MIN_HEADER: usize = COMMENT_FIELD + 8;

/// Strings decoded from one account's "V" value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Absolute byte offset of the username inside the value
    pub username_offset: usize,
    /// Username length in bytes
    pub username_length: usize,
    /// Logon name
    pub username: String,
    /// Display name
    pub full_name: String,
    /// Account comment
    pub comment: String,
}

/// Read the (offset, length) pair at `field` and return the bounds-checked span.
fn string_span(data: &[u8], field: usize) -> Result<(usize, usize)> {
    let offset = LittleEndian::read_i32(&data[field..]) as i64 + V_HEADER_SIZE;
    let length = LittleEndian::read_i32(&data[field + 4..]) as i64;

    if offset < 0 || length < 0 || offset + length > data.len() as i64 {
        return Err(Error::truncated(offset, length, data.len()));
    }
    Ok((offset as usize, length as usize))
}

/// Decode the username, full name and comment embedded in a "V" value.
///
/// Fails with [`Error::TruncatedRecord`] when the header is short or any
/// string span falls outside `data`.
pub fn decode_account(data: &[u8]) -> Result<UserAccount> {
    if data.len() < V_MIN_HEADER {
        return Err(Error::truncated(0, V_MIN_HEADER as i64, data.len()));
    }

    let (username_offset, username_length) = string_span(data, USERNAME_FIELD)?;
    let (full_name_offset, full_name_length) = string_span(data, FULL_NAME_FIELD)?;
    let (comment_offset, comment_length) = string_span(data, COMMENT_FIELD)?;

    Ok(UserAccount {
        username_offset,
        username_length,
        username: strip_nulls_decode(&data[username_offset..username_offset + username_length]),
        full_name: strip_nulls_decode(&data[full_name_offset..full_name_offset + full_name_length]),
        comment: strip_nulls_decode(&data[comment_offset..comment_offset + comment_length]),
    })
}

/// Account RID from a Users subkey name such as `000003E8`.
pub fn rid_from_key_name(name: &str) -> Result<u64> {
    u64::from_str_radix(name, 16)
        .map_err(|e| Error::InvalidInput(format!("account key '{}' is not a hex RID: {}", name, e)))
}

/// Test helper: lay out a "V" value with the given strings, UTF-16LE encoded.
#[cfg(test)]
pub(crate) fn build_v_value(username: &str, full_name: &str, comment: &str) -> Vec<u8> {
    let encode = |s: &str| -> Vec<u8> { s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect() };
    let strings = [encode(username), encode(full_name), encode(comment)];

    let mut data = vec![0u8; V_HEADER_SIZE as usize];
    let mut relative = 0usize;
    for (field, bytes) in [USERNAME_FIELD, FULL_NAME_FIELD, COMMENT_FIELD].iter().zip(&strings) {
        data[*field..*field + 4].copy_from_slice(&(relative as i32).to_le_bytes());
        data[*field + 4..*field + 8].copy_from_slice(&(bytes.len() as i32).to_le_bytes());
        data.extend_from_slice(bytes);
        // strings are padded to 4-byte boundaries
        while data.len() % 4 != 0 {
            data.push(0);
        }
        relative = data.len() - V_HEADER_SIZE as usize;
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plant(buffer: &mut [u8], field: usize, offset: i32, length: i32) {
        buffer[field..field + 4].copy_from_slice(&offset.to_le_bytes());
        buffer[field + 4..field + 8].copy_from_slice(&length.to_le_bytes());
    }

    #[test]
    fn test_decode_admin_in_250_byte_buffer() {
        let mut buffer = vec![0u8; 250];
        let name: Vec<u8> = "admin".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        buffer[204..214].copy_from_slice(&name);
        plant(&mut buffer, USERNAME_FIELD, 0, 10);
        plant(&mut buffer, FULL_NAME_FIELD, 12, 0);
        plant(&mut buffer, COMMENT_FIELD, 12, 0);

        let account = decode_account(&buffer).unwrap();
        assert_eq!(account.username, "admin");
        assert_eq!(account.username_offset, 204);
        assert_eq!(account.username_length, 10);
        assert_eq!(account.full_name, "");
        assert_eq!(account.comment, "");
    }

    #[test]
    fn test_decode_all_three_strings() {
        let data = build_v_value("alice", "Alice Liddell", "Built-in account");
        let account = decode_account(&data).unwrap();
        assert_eq!(account.username, "alice");
        assert_eq!(account.full_name, "Alice Liddell");
        assert_eq!(account.comment, "Built-in account");
    }

    #[test]
    fn test_username_span_past_end() {
        let mut buffer = vec![0u8; 210];
        plant(&mut buffer, USERNAME_FIELD, 0, 10);
        match decode_account(&buffer) {
            Err(Error::TruncatedRecord {
                offset,
                length,
                available,
            }) => {
                assert_eq!(offset, 204);
                assert_eq!(length, 10);
                assert_eq!(available, 210);
            }
            other => panic!("expected TruncatedRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_comment_span_past_end() {
        let mut data = build_v_value("bob", "", "");
        let len = data.len() as i32;
        plant(&mut data, COMMENT_FIELD, len, 2);
        assert!(matches!(decode_account(&data), Err(Error::TruncatedRecord { .. })));
    }

    #[test]
    fn test_negative_length_is_truncation() {
        let mut buffer = vec![0u8; 250];
        plant(&mut buffer, USERNAME_FIELD, 0, -4);
        assert!(matches!(decode_account(&buffer), Err(Error::TruncatedRecord { .. })));
    }

    #[test]
    fn test_short_header() {
        assert!(matches!(decode_account(&[0u8; 20]), Err(Error::TruncatedRecord { .. })));
        assert!(matches!(decode_account(&[]), Err(Error::TruncatedRecord { .. })));
    }

    #[test]
    fn test_rid_from_key_name() {
        assert_eq!(rid_from_key_name("000003E8").unwrap(), 1000);
        assert_eq!(rid_from_key_name("3E8").unwrap(), 1000);
        assert_eq!(rid_from_key_name("000001F4").unwrap(), 500);
        assert_eq!(rid_from_key_name("1FFFFFFFF").unwrap(), 0x1_FFFF_FFFF);
        assert!(matches!(rid_from_key_name("Names"), Err(Error::InvalidInput(_))));
    }
}
