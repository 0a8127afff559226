//! Output formatting for correlated deletions.

use crate::datetime::format_deletion_time;
use crate::error::Result;
use crate::types::{CorrelatedDeletion, CorrelationReport};
use chrono_tz::Tz;
use std::io::{BufWriter, Write};

/// Supported output formats
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable format with one block per deletion
    Human,
    /// JSON format for programmatic consumption
    Json,
    /// CSV format for spreadsheet analysis
    Csv,
    /// One line per deletion in ascending deletion-time order
    Timeline,
}

/// Handles output formatting and writing
pub struct OutputWriter;

impl OutputWriter {
    /// Write a report in the specified format with timezone conversion
    pub fn write_report(
        report: &CorrelationReport,
        format: OutputFormat,
        writer: Box<dyn Write>,
        timezone: Tz,
    ) -> Result<()> {
        match format {
            OutputFormat::Human => Self::write_human(&report.deletions, writer, timezone),
            OutputFormat::Json => Self::write_json(report, writer),
            OutputFormat::Csv => Self::write_csv(&report.deletions, writer, timezone),
            OutputFormat::Timeline => Self::write_timeline(&report.deletions, writer, timezone),
        }
    }

    /// Write deletions in human-readable format
    fn write_human(
        deletions: &[CorrelatedDeletion],
        writer: Box<dyn Write>,
        timezone: Tz,
    ) -> Result<()> {
        let mut writer = BufWriter::new(writer);

        for deletion in deletions {
            writeln!(writer, "{}", deletion.descriptor)?;
            writeln!(writer, "  {:<15} {}", "Original Path:", deletion.record.original_path())?;
            writeln!(writer, "  {:<15} {}", "Deleted:", format_deletion_time(deletion, timezone))?;

            let rid = deletion
                .rid
                .map(|r| r.to_string())
                .unwrap_or_else(|| "?".to_string());
            writeln!(writer, "  {:<15} {} (RID {})", "User:", deletion.username, rid)?;
            writeln!(writer, "  {:<15} {} bytes", "Size:", deletion.record.file_size())?;
            writeln!(writer, "  {:<15} {}", "Format:", deletion.record.format().as_str())?;
            writeln!(writer, "  {:<15} {}", "Payload:", deletion.payload)?;
            writeln!(writer)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Write the whole report as JSON (deletion times stay as Unix seconds)
    fn write_json(report: &CorrelationReport, mut writer: Box<dyn Write>) -> Result<()> {
        serde_json::to_writer_pretty(&mut writer, report)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Write deletions in CSV format with timezone conversion
    fn write_csv(
        deletions: &[CorrelatedDeletion],
        writer: Box<dyn Write>,
        timezone: Tz,
    ) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "descriptor",
            "payload",
            "rid",
            "username",
            "account_found",
            "format",
            "file_size",
            "deleted_at",
            "deleted",
            "original_path",
        ])?;

        for deletion in deletions {
            csv_writer.write_record([
                deletion.descriptor.clone(),
                deletion.payload.clone(),
                deletion.rid.map(|r| r.to_string()).unwrap_or_default(),
                deletion.username.clone(),
                deletion.account_found.to_string(),
                deletion.record.format().as_str().to_string(),
                deletion.record.file_size().to_string(),
                deletion.record.deleted_at().to_string(),
                format_deletion_time(deletion, timezone),
                deletion.record.original_path().to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Write `time,username,original_path` lines, oldest deletion first
    fn write_timeline(
        deletions: &[CorrelatedDeletion],
        writer: Box<dyn Write>,
        timezone: Tz,
    ) -> Result<()> {
        let mut ordered: Vec<&CorrelatedDeletion> = deletions.iter().collect();
        // Stable, so equal times keep input order
        ordered.sort_by_key(|d| d.record.deleted_at());

        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        for deletion in ordered {
            csv_writer.write_record([
                format_deletion_time(deletion, timezone).trim_end(),
                deletion.username.as_str(),
                deletion.record.original_path(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }
}

/// Create output writer (stdout or file)
pub fn create_writer(output_path: Option<String>) -> Result<Box<dyn Write>> {
    match output_path {
        Some(path) if path != "-" => {
            let file = std::fs::File::create(path)?;
            Ok(Box::new(BufWriter::new(file)))
        }
        _ => Ok(Box::new(std::io::stdout())),
    }
}
