//! Attribution of Recycle Bin descriptors to SAM accounts.
//!
//! A run builds a RID -> username table from one SAM hive, decodes each `$I`
//! descriptor, and joins the two on the RID suffix of the descriptor's
//! directory name. Per-record failures are collected in the report; a hive
//! that cannot produce a table only leaves every username unresolved.

use crate::error::{Error, Result};
use crate::recycle::{self, rid_from_directory};
use crate::registry::{HiveContainer, RegistryNavigator};
use crate::sam::{decode_account, rid_from_key_name};
use crate::types::{
    AccountIdentity, CorrelatedDeletion, CorrelationReport, CorrelatorConfig, DescriptorInput,
    SkipStage, SkippedRecord,
};
use std::collections::BTreeMap;

/// Name of the account value carrying the embedded strings
const ACCOUNT_VALUE_NAME: &str = "V";

/// RID -> username table owned by one correlation run
#[derive(Debug, Clone, Default)]
pub struct IdentityTable {
    accounts: BTreeMap<u64, String>,
}

impl IdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the username for `rid`
    pub fn insert(&mut self, rid: u64, username: String) {
        self.accounts.insert(rid, username);
    }

    pub fn get(&self, rid: u64) -> Option<&str> {
        self.accounts.get(&rid).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Accounts in ascending RID order
    pub fn iter(&self) -> impl Iterator<Item = AccountIdentity> + '_ {
        self.accounts.iter().map(|(rid, username)| AccountIdentity {
            rid: *rid,
            username: username.clone(),
        })
    }
}

impl FromIterator<AccountIdentity> for IdentityTable {
    fn from_iter<I: IntoIterator<Item = AccountIdentity>>(iter: I) -> Self {
        Self {
            accounts: iter.into_iter().map(|a| (a.rid, a.username)).collect(),
        }
    }
}

/// Runs the account-table build and the descriptor join
#[derive(Debug, Clone, Default)]
pub struct DeletionCorrelator {
    config: CorrelatorConfig,
}

impl DeletionCorrelator {
    pub fn new(config: CorrelatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    /// Walk the account key of `navigator` and decode every "V" value.
    ///
    /// A missing key path or a corrupt account key list fails the whole
    /// build. An account whose values cannot be read or decoded is pushed to
    /// `skipped` and the walk continues.
    pub fn build_identity_table<H: HiveContainer>(
        &self,
        navigator: &RegistryNavigator<H>,
        skipped: &mut Vec<SkippedRecord>,
    ) -> Result<IdentityTable> {
        let users = navigator.open_key(&self.config.account_key_path)?;
        let mut table = IdentityTable::new();

        for account_key in navigator.list_subkeys(&users)? {
            let values = match navigator.list_values(&account_key) {
                Ok(values) => values,
                Err(e) => {
                    log::warn!("skipping account key '{}': {}", account_key.name, e);
                    skipped.push(SkippedRecord {
                        stage: SkipStage::Account,
                        source: account_key.name.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            for value in values {
                if value.name != ACCOUNT_VALUE_NAME {
                    continue;
                }

                let decoded = rid_from_key_name(&account_key.name)
                    .and_then(|rid| decode_account(&value.data).map(|account| (rid, account)));
                match decoded {
                    Ok((rid, account)) => {
                        log::debug!("account {} -> '{}'", rid, account.username);
                        table.insert(rid, account.username);
                    }
                    Err(e) => {
                        log::warn!("skipping account key '{}': {}", account_key.name, e);
                        skipped.push(SkippedRecord {
                            stage: SkipStage::Account,
                            source: account_key.name.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        log::info!("built account table with {} entries", table.len());
        Ok(table)
    }

    /// Parse `hive_bytes` and build its account table.
    ///
    /// Any hive-level failure comes back as [`Error::AccountTableUnavailable`].
    pub fn identity_table_from_hive<D: AsRef<[u8]>>(
        &self,
        hive_bytes: D,
        skipped: &mut Vec<SkippedRecord>,
    ) -> Result<IdentityTable> {
        RegistryNavigator::open(hive_bytes)
            .and_then(|navigator| self.build_identity_table(&navigator, skipped))
            .map_err(|e| Error::AccountTableUnavailable(e.to_string()))
    }

    /// Decode and attribute each input against an existing table.
    ///
    /// `cancel` is polled before every input; once it returns true the records
    /// produced so far are returned with `cancelled` set.
    pub fn correlate_with_table<F>(
        &self,
        table: &IdentityTable,
        inputs: &[DescriptorInput],
        cancel: F,
    ) -> CorrelationReport
    where
        F: Fn() -> bool,
    {
        let mut report = CorrelationReport::default();
        self.join_into(&mut report, table, inputs, cancel);
        report
    }

    fn join_into<F>(
        &self,
        report: &mut CorrelationReport,
        table: &IdentityTable,
        inputs: &[DescriptorInput],
        cancel: F,
    ) where
        F: Fn() -> bool,
    {
        for input in inputs {
            if cancel() {
                log::info!(
                    "correlation cancelled after {} of {} descriptors",
                    report.deletions.len(),
                    inputs.len()
                );
                report.cancelled = true;
                return;
            }

            let record = match recycle::decode(&input.data) {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("skipping descriptor '{}': {}", input.descriptor, e);
                    report.skipped.push(SkippedRecord {
                        stage: SkipStage::Descriptor,
                        source: input.descriptor.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let rid = rid_from_directory(&input.directory);
            let username = rid.and_then(|rid| table.get(rid));
            if rid.is_none() {
                log::debug!("no RID in directory name '{}'", input.directory);
            }

            report.deletions.push(CorrelatedDeletion {
                descriptor: input.descriptor.clone(),
                payload: input.payload.clone(),
                rid,
                username: username.unwrap_or(self.config.not_found_username.as_str()).to_string(),
                account_found: username.is_some(),
                record,
            });
        }
    }

    /// Full run: account table from `hive_bytes`, then the descriptor join.
    ///
    /// Never fails. Without a hive, or when the table cannot be built, every
    /// username resolves to the not-found sentinel.
    pub fn correlate<D, F>(
        &self,
        hive_bytes: Option<D>,
        inputs: &[DescriptorInput],
        cancel: F,
    ) -> CorrelationReport
    where
        D: AsRef<[u8]>,
        F: Fn() -> bool,
    {
        let mut report = CorrelationReport::default();

        let table = match hive_bytes {
            Some(bytes) => match self.identity_table_from_hive(bytes, &mut report.skipped) {
                Ok(table) => table,
                Err(e) => {
                    log::warn!("{}; usernames will not be resolved", e);
                    report.account_table_error = Some(e.to_string());
                    IdentityTable::new()
                }
            },
            None => IdentityTable::new(),
        };

        self.join_into(&mut report, &table, inputs, cancel);
        log::info!(
            "correlated {} descriptors, skipped {}",
            report.deletions.len(),
            report.skipped.len()
        );
        report
    }
}

/// [`DeletionCorrelator::correlate`] with the default configuration
pub fn correlate<F>(hive_bytes: Vec<u8>, inputs: &[DescriptorInput], cancel: F) -> CorrelationReport
where
    F: Fn() -> bool,
{
    DeletionCorrelator::default().correlate(Some(hive_bytes), inputs, cancel)
}
