//! Registry key/value navigation over a parsed hive container.
//!
//! The navigator walks slash-delimited key paths (`SAM/Domains/Account/Users`)
//! with exact, case-sensitive name matching and enumerates subkeys and values.
//! It never touches hive bytes itself: cell-level parsing is behind the
//! [`HiveContainer`] trait, implemented for on-disk `regf` images by
//! [`RegfHive`](crate::hive::RegfHive).

use crate::error::{Error, Result};
use crate::hive::{NodeKeyFlags, RegfHive};
use serde::{Deserialize, Serialize};

/// Key path holding one subkey per local account, named by hex RID
pub const ACCOUNT_USERS_PATH: &str = "SAM/Domains/Account/Users";

/// Capability needed from a hive container: a root key plus child enumeration.
///
/// Every method fails with [`Error::MalformedHive`] on structural corruption.
pub trait HiveContainer {
    /// The hive's root key
    fn root(&self) -> Result<RegistryKey>;
    /// Child keys of `key`, in on-disk order
    fn subkeys(&self, key: &RegistryKey) -> Result<Vec<RegistryKey>>;
    /// Values attached to `key`, in on-disk order
    fn values(&self, key: &RegistryKey) -> Result<Vec<RegistryValue>>;
}

/// Registry key node
#[derive(Debug, Clone)]
pub struct RegistryKey {
    /// Key name (case-sensitive)
    pub name: String,
    /// Cell offset of this key, relative to the first hive bin
    pub cell_offset: u32,
    /// Cell offset of the parent key; navigation only, never dereferenced for ownership
    pub parent_offset: u32,
    /// Node flags
    pub flags: NodeKeyFlags,
    /// Last written timestamp (FILETIME)
    pub last_written: u64,
    /// Number of stable subkeys
    pub subkey_count: u32,
    /// Subkey index list cell offset (0xFFFFFFFF = none)
    pub subkey_list_offset: u32,
    /// Number of values
    pub value_count: u32,
    /// Value list cell offset (0xFFFFFFFF = none)
    pub value_list_offset: u32,
}

/// Registry value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryValue {
    /// Value name (empty = default value)
    pub name: String,
    /// Value type
    pub value_type: RegistryValueType,
    /// Raw data, exclusively owned by this value
    pub data: Vec<u8>,
}

/// Registry value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryValueType {
    None,
    String,                   // REG_SZ
    ExpandString,             // REG_EXPAND_SZ
    Binary,                   // REG_BINARY
    DWord,                    // REG_DWORD
    DWordBigEndian,           // REG_DWORD_BIG_ENDIAN
    Link,                     // REG_LINK
    MultiString,              // REG_MULTI_SZ
    ResourceList,             // REG_RESOURCE_LIST
    FullResourceDescriptor,   // REG_FULL_RESOURCE_DESCRIPTOR
    ResourceRequirementsList, // REG_RESOURCE_REQUIREMENTS_LIST
    QWord,                    // REG_QWORD
    Unknown(u32),
}

impl From<u32> for RegistryValueType {
    fn from(value: u32) -> Self {
        match value {
            0 => RegistryValueType::None,
            1 => RegistryValueType::String,
            2 => RegistryValueType::ExpandString,
            3 => RegistryValueType::Binary,
            4 => RegistryValueType::DWord,
            5 => RegistryValueType::DWordBigEndian,
            6 => RegistryValueType::Link,
            7 => RegistryValueType::MultiString,
            8 => RegistryValueType::ResourceList,
            9 => RegistryValueType::FullResourceDescriptor,
            10 => RegistryValueType::ResourceRequirementsList,
            11 => RegistryValueType::QWord,
            other => RegistryValueType::Unknown(other),
        }
    }
}

/// Path-based navigator over any [`HiveContainer`]
pub struct RegistryNavigator<H: HiveContainer = RegfHive> {
    hive: H,
}

impl<D: AsRef<[u8]>> RegistryNavigator<RegfHive<D>> {
    /// Parse `hive_bytes` as a `regf` image and take ownership of it
    pub fn open(hive_bytes: D) -> Result<Self> {
        Ok(Self::new(RegfHive::parse(hive_bytes)?))
    }
}

impl<H: HiveContainer> RegistryNavigator<H> {
    /// Wrap an already-parsed container
    pub fn new(hive: H) -> Self {
        Self { hive }
    }

    /// Underlying container
    pub fn hive(&self) -> &H {
        &self.hive
    }

    /// Root key of the hive
    pub fn root(&self) -> Result<RegistryKey> {
        self.hive.root()
    }

    /// Walk `path` from `root`, one exact-name child lookup per `/` segment.
    ///
    /// Empty segments (leading, trailing or doubled slashes) are ignored. Fails
    /// with [`Error::KeyNotFound`] naming the first absent segment.
    pub fn resolve_path(&self, root: &RegistryKey, path: &str) -> Result<RegistryKey> {
        let mut current = root.clone();

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            log::debug!("resolving '{}' under '{}'", segment, current.name);
            current = self
                .hive
                .subkeys(&current)?
                .into_iter()
                .find(|k| k.name == segment)
                .ok_or_else(|| Error::KeyNotFound(segment.to_string()))?;
        }

        Ok(current)
    }

    /// Resolve `path` starting at the hive root
    pub fn open_key(&self, path: &str) -> Result<RegistryKey> {
        let root = self.root()?;
        self.resolve_path(&root, path)
    }

    /// Child keys in on-disk order
    pub fn list_subkeys(&self, key: &RegistryKey) -> Result<Vec<RegistryKey>> {
        self.hive.subkeys(key)
    }

    /// Values of `key`
    pub fn list_values(&self, key: &RegistryKey) -> Result<Vec<RegistryValue>> {
        self.hive.values(key)
    }

    /// Exact-name value lookup
    pub fn find_value(&self, key: &RegistryKey, name: &str) -> Result<Option<RegistryValue>> {
        Ok(self.hive.values(key)?.into_iter().find(|v| v.name == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hive::test_support::{build_hive, KeySpec};

    fn sam_tree() -> KeySpec {
        KeySpec::new("ROOT").child(
            KeySpec::new("SAM").child(
                KeySpec::new("Domains").child(
                    KeySpec::new("Account").child(
                        KeySpec::new("Users")
                            .child(KeySpec::new("000001F4").value("V", 3, vec![1u8; 8]))
                            .child(KeySpec::new("000003E8").value("F", 3, vec![2u8; 8]))
                            .child(KeySpec::new("Names")),
                    ),
                ),
            ),
        )
    }

    #[test]
    fn test_value_type_conversion() {
        assert_eq!(RegistryValueType::from(3), RegistryValueType::Binary);
        assert_eq!(RegistryValueType::from(11), RegistryValueType::QWord);
        assert_eq!(RegistryValueType::from(0x20), RegistryValueType::Unknown(0x20));
    }

    #[test]
    fn test_resolve_account_path() {
        let nav = RegistryNavigator::open(build_hive(&sam_tree())).unwrap();
        let users = nav.open_key(ACCOUNT_USERS_PATH).unwrap();
        assert_eq!(users.name, "Users");

        let names: Vec<String> = nav
            .list_subkeys(&users)
            .unwrap()
            .into_iter()
            .map(|k| k.name)
            .collect();
        // On-disk order, not alphabetical
        assert_eq!(names, vec!["000001F4", "000003E8", "Names"]);
    }

    #[test]
    fn test_resolve_ignores_empty_segments() {
        let nav = RegistryNavigator::open(build_hive(&sam_tree())).unwrap();
        let key = nav.open_key("/SAM//Domains/").unwrap();
        assert_eq!(key.name, "Domains");
    }

    #[test]
    fn test_resolve_missing_segment() {
        let nav = RegistryNavigator::open(build_hive(&sam_tree())).unwrap();
        match nav.open_key("SAM/Domains/Builtin/Users") {
            Err(Error::KeyNotFound(segment)) => assert_eq!(segment, "Builtin"),
            other => panic!("expected KeyNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        let nav = RegistryNavigator::open(build_hive(&sam_tree())).unwrap();
        assert!(matches!(
            nav.open_key("sam/domains"),
            Err(Error::KeyNotFound(ref s)) if s == "sam"
        ));
    }

    #[test]
    fn test_find_value() {
        let nav = RegistryNavigator::open(build_hive(&sam_tree())).unwrap();
        let account = nav.open_key("SAM/Domains/Account/Users/000001F4").unwrap();
        let v = nav.find_value(&account, "V").unwrap().unwrap();
        assert_eq!(v.value_type, RegistryValueType::Binary);
        assert_eq!(v.data, vec![1u8; 8]);
        assert!(nav.find_value(&account, "F").unwrap().is_none());
    }

    #[test]
    fn test_open_rejects_garbage() {
        assert!(matches!(
            RegistryNavigator::open(vec![0u8; 64]),
            Err(Error::MalformedHive(_))
        ));
    }
}
