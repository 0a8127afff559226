//! Main application logic and orchestration.

use crate::{
    cli::Config,
    correlate::DeletionCorrelator,
    datetime::deletion_in_date_range,
    error::{Error, Result},
    output::{create_writer, OutputWriter},
    recycle::payload_name_for,
    types::{
        CorrelatedDeletion, CorrelationReport, CorrelatorConfig, DescriptorInput, SkipStage,
        SkippedRecord,
    },
};
use anyhow::Context;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Hives larger than this are memory-mapped instead of read
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Hive bytes, read into memory or mapped from disk
pub enum HiveImage {
    Owned(Vec<u8>),
    Mapped(memmap2::Mmap),
}

impl HiveImage {
    /// Load `path`, mapping it when it is larger than 1 MiB
    pub fn load(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("opening SAM hive {}", path.display()))?;
        let length = file.metadata()?.len();

        if length > MMAP_THRESHOLD {
            // SAFETY: read-only mapping; the hive is not written while mapped
            let mmap = unsafe { memmap2::Mmap::map(&file) }
                .with_context(|| format!("mapping SAM hive {}", path.display()))?;
            log::debug!("memory-mapped {} ({} bytes)", path.display(), mmap.len());
            Ok(HiveImage::Mapped(mmap))
        } else {
            let data = fs::read(path)
                .with_context(|| format!("reading SAM hive {}", path.display()))?;
            Ok(HiveImage::Owned(data))
        }
    }
}

impl AsRef<[u8]> for HiveImage {
    fn as_ref(&self) -> &[u8] {
        match self {
            HiveImage::Owned(data) => data.as_slice(),
            HiveImage::Mapped(mmap) => &mmap[..],
        }
    }
}

/// Main application runner
pub struct App {
    config: Config,
    correlator: DeletionCorrelator,
    cancel: Arc<AtomicBool>,
}

impl App {
    /// Create a new application instance with the given configuration
    pub fn new(config: Config) -> Self {
        let correlator = DeletionCorrelator::new(CorrelatorConfig {
            account_key_path: config.key_path.clone(),
            ..CorrelatorConfig::default()
        });

        Self {
            config,
            correlator,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the run before the next descriptor once set
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run the application with the configured parameters
    pub fn run(self) -> Result<()> {
        let report = self.build_report()?;

        let writer = create_writer(self.config.output.clone())?;
        OutputWriter::write_report(
            &report,
            self.config.format.clone(),
            writer,
            self.config.timezone,
        )?;

        Self::print_summary(&report);
        Ok(())
    }

    /// Discover, pair, decode and correlate every input, then apply the filters
    pub fn build_report(&self) -> Result<CorrelationReport> {
        let descriptors = collect_descriptors(&self.config.inputs)?;
        eprintln!("Found {} $I descriptor(s)", descriptors.len());

        let (inputs, mut unpaired) = pair_descriptors(&descriptors);

        let (hive, load_error) = match &self.config.sam {
            Some(path) => match HiveImage::load(path) {
                Ok(image) => (Some(image), None),
                Err(e) => {
                    log::warn!("SAM hive {} unusable: {}", path.display(), e);
                    (None, Some(Error::AccountTableUnavailable(e.to_string())))
                }
            },
            None => {
                log::info!("no SAM hive given, usernames will not be resolved");
                (None, None)
            }
        };

        let cancel = Arc::clone(&self.cancel);
        let mut report = self
            .correlator
            .correlate(hive, &inputs, || cancel.load(Ordering::Relaxed));
        if let Some(e) = load_error {
            report.account_table_error = Some(e.to_string());
        }
        report.skipped.append(&mut unpaired);

        let before = report.deletions.len();
        report.deletions.retain(|deletion| self.keep(deletion));
        if report.deletions.len() != before {
            log::info!("filters kept {} of {} deletions", report.deletions.len(), before);
        }

        Ok(report)
    }

    /// Apply the regex filter and date range
    fn keep(&self, deletion: &CorrelatedDeletion) -> bool {
        if let Some(regex) = &self.config.filter_regex {
            if !regex.is_match(deletion.record.original_path())
                && !regex.is_match(&deletion.username)
            {
                return false;
            }
        }
        deletion_in_date_range(deletion, &self.config.after_date, &self.config.before_date)
    }

    fn print_summary(report: &CorrelationReport) {
        if let Some(reason) = &report.account_table_error {
            eprintln!("Warning: account table unavailable ({}), usernames not resolved", reason);
        }
        for skipped in &report.skipped {
            eprintln!("Skipped {:?} '{}': {}", skipped.stage, skipped.source, skipped.reason);
        }
        if report.cancelled {
            eprintln!("Run cancelled, output is partial");
        }
        eprintln!(
            "{} deletion(s) written, {} skipped",
            report.deletions.len(),
            report.skipped.len()
        );
    }
}

fn is_descriptor_name(name: &str) -> bool {
    name.starts_with("$I")
}

/// Expand directories into the `$I` files beneath them, in name order
pub fn collect_descriptors(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for input in inputs {
        if input.is_dir() {
            walk_directory(input, &mut found)?;
        } else {
            found.push(input.clone());
        }
    }
    Ok(found)
}

fn walk_directory(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk_directory(&path, found)?;
        } else if entry.file_name().to_str().map_or(false, is_descriptor_name) {
            found.push(path);
        }
    }
    Ok(())
}

/// Read each descriptor and locate its `$R` sibling, in parallel.
///
/// Input order is preserved. Descriptors without a payload, with a non-`$I`
/// name, or that cannot be read come back as skipped records.
pub fn pair_descriptors(paths: &[PathBuf]) -> (Vec<DescriptorInput>, Vec<SkippedRecord>) {
    let paired: Vec<_> = paths.par_iter().map(|path| (path, pair_descriptor(path))).collect();

    let mut inputs = Vec::with_capacity(paired.len());
    let mut skipped = Vec::new();
    for (path, result) in paired {
        match result {
            Ok(input) => inputs.push(input),
            Err(reason) => {
                log::warn!("skipping {}: {}", path.display(), reason);
                skipped.push(SkippedRecord {
                    stage: SkipStage::Descriptor,
                    source: path.display().to_string(),
                    reason,
                });
            }
        }
    }
    (inputs, skipped)
}

fn pair_descriptor(path: &Path) -> std::result::Result<DescriptorInput, String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| "file name is not valid UTF-8".to_string())?;
    let payload_name =
        payload_name_for(name).ok_or_else(|| "not a $I descriptor name".to_string())?;

    let payload = path.with_file_name(&payload_name);
    if !payload.is_file() {
        return Err(format!("no matching {} payload", payload_name));
    }

    let directory = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let data = fs::read(path).map_err(|e| format!("read failed: {}", e))?;

    Ok(DescriptorInput {
        descriptor: path.display().to_string(),
        payload: payload.display().to_string(),
        directory,
        data,
    })
}
