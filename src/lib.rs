//! # rbin - Recycle Bin Deletion Correlator
//!
//! Decodes Windows Recycle Bin `$I` descriptors and attributes each deletion
//! to a local account by joining the RID in the recycle directory name
//! against the account table of a SAM registry hive.
//!
//! ## Features
//!
//! - `$I` descriptors in both the legacy (fixed 520-byte path) and current
//!   (length-prefixed path) layouts
//! - Read-only `regf` hive container with path navigation
//! - SAM "V" value decoding (username, full name, comment)
//! - Multiple output formats (human-readable, JSON, CSV, timeline)
//!
//! ## Author
//!
//! Albert Hui <albert@securityronin.com>

pub mod app;
pub mod cli;
pub mod correlate;
pub mod datetime;
pub mod error;
pub mod hive;
pub mod output;
pub mod recycle;
pub mod registry;
pub mod sam;
pub mod types;
pub mod wide_string;

pub use correlate::{correlate, DeletionCorrelator, IdentityTable};
pub use error::{Error, Result};
pub use hive::RegfHive;
pub use output::{OutputFormat, OutputWriter};
pub use recycle::RecycleRecord;
pub use registry::{HiveContainer, RegistryNavigator};
pub use sam::{decode_account, UserAccount};
pub use types::{CorrelatedDeletion, CorrelationReport, CorrelatorConfig, DescriptorInput};
