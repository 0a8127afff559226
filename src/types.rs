//! Core data types shared by the correlator and the output writers.

use crate::recycle::RecycleRecord;
use crate::registry::ACCOUNT_USERS_PATH;
use serde::{Deserialize, Serialize};

/// Username reported when a descriptor's RID has no account in the hive
pub const NOT_FOUND_USERNAME: &str = "Not Found!";

/// A local account: RID plus decoded logon name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIdentity {
    /// Relative identifier, from the hex account key name
    pub rid: u64,
    /// Decoded username
    pub username: String,
}

/// One descriptor/payload pair handed to the correlator
#[derive(Debug, Clone)]
pub struct DescriptorInput {
    /// Caller's identifier for the `$I` descriptor (usually its path)
    pub descriptor: String,
    /// Caller's identifier for the matching `$R` payload
    pub payload: String,
    /// Name of the directory holding the pair, e.g. `S-1-5-21-…-1000`
    pub directory: String,
    /// Raw descriptor bytes
    pub data: Vec<u8>,
}

/// A decoded descriptor attributed to an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelatedDeletion {
    /// Caller's descriptor identifier
    pub descriptor: String,
    /// Caller's payload identifier
    pub payload: String,
    /// RID parsed from the directory name
    pub rid: Option<u64>,
    /// Resolved username, or the not-found sentinel
    pub username: String,
    /// Whether `username` came from the account table
    pub account_found: bool,
    /// Decoded descriptor
    pub record: RecycleRecord,
}

/// Which step dropped a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipStage {
    /// A Users subkey whose "V" value or name could not be decoded
    Account,
    /// A `$I` descriptor that failed to decode
    Descriptor,
}

/// A record left out of the results, with the reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub stage: SkipStage,
    /// Account key name or descriptor identifier
    pub source: String,
    pub reason: String,
}

/// Everything one correlation run produced
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrelationReport {
    /// Correlated records in input order
    pub deletions: Vec<CorrelatedDeletion>,
    /// Per-record failures
    pub skipped: Vec<SkippedRecord>,
    /// Why the account table is empty, if it could not be built
    pub account_table_error: Option<String>,
    /// Whether the run stopped early on cancellation
    pub cancelled: bool,
}

/// Correlator settings
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// Slash-delimited path to the per-account keys
    pub account_key_path: String,
    /// Username used when no account matches
    pub not_found_username: String,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            account_key_path: ACCOUNT_USERS_PATH.to_string(),
            not_found_username: NOT_FOUND_USERNAME.to_string(),
        }
    }
}
