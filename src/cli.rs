//! Command-line interface definitions and parsing.

use crate::error::{Error, Result};
use crate::output::OutputFormat;
use crate::registry::ACCOUNT_USERS_PATH;
use clap::Parser;
use std::path::PathBuf;

/// rbin - attribute Recycle Bin deletions to local accounts
#[derive(Parser, Debug)]
#[command(name = "rbin")]
#[command(about = "rbin - Recycle Bin deletion correlator", version)]
#[command(long_about = "Decodes Recycle Bin $I descriptors and attributes each deletion to a \
local account:
• $I descriptors in both the legacy (fixed 520-byte path) and current (length-prefixed) layouts
• SAM hive account table (SAM/Domains/Account/Users) for RID to username lookup
• Directories are searched recursively for $I files, each paired with its $R sibling

Deletions whose RID has no account are reported with the username \"Not Found!\".")]
pub struct Args {
    /// $I descriptor files, or directories (e.g. "$Recycle.Bin") to search for them
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// SAM registry hive used to resolve RIDs to usernames
    #[arg(long)]
    pub sam: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "human")]
    pub format: OutputFormat,

    /// Filter by original path and username (supports regex patterns)
    #[arg(long)]
    pub filter: Option<String>,

    /// Show deletions after this date (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)
    #[arg(long)]
    pub after: Option<String>,

    /// Show deletions before this date (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)
    #[arg(long)]
    pub before: Option<String>,

    /// Output file (use "-" for stdout, default: stdout)
    #[arg(long)]
    pub output: Option<String>,

    /// Display timestamps in specified timezone (e.g., "UTC+8", "UTC-5", "UTC")
    #[arg(long, default_value = "UTC")]
    pub timezone: String,

    /// Slash-delimited path of the per-account keys inside the SAM hive
    #[arg(long, default_value = ACCOUNT_USERS_PATH)]
    pub key_path: String,
}

/// Parsed and validated CLI configuration
#[derive(Debug)]
pub struct Config {
    pub inputs: Vec<PathBuf>,
    pub sam: Option<PathBuf>,
    pub format: OutputFormat,
    pub filter_regex: Option<regex::Regex>,
    pub after_date: Option<chrono::DateTime<chrono::Utc>>,
    pub before_date: Option<chrono::DateTime<chrono::Utc>>,
    pub output: Option<String>,
    pub timezone: chrono_tz::Tz,
    pub key_path: String,
}

impl Config {
    /// Parse and validate CLI arguments into a configuration
    pub fn from_args(args: Args) -> Result<Self> {
        if args.inputs.is_empty() {
            return Err(Error::InvalidInput(
                "At least one $I descriptor or directory is required".to_string(),
            ));
        }

        let timezone = crate::datetime::parse_timezone(&args.timezone)?;

        let filter_regex = match &args.filter {
            Some(pattern) => {
                log::info!("compiling filter: {}", pattern);
                Some(
                    regex::RegexBuilder::new(pattern)
                        .case_insensitive(true)
                        .build()
                        .map_err(|e| {
                            Error::InvalidInput(format!(
                                "Invalid regex pattern '{}': {}",
                                pattern, e
                            ))
                        })?,
                )
            }
            None => None,
        };

        let after_date = args
            .after
            .as_deref()
            .map(crate::datetime::parse_date_filter)
            .transpose()?;
        let before_date = args
            .before
            .as_deref()
            .map(crate::datetime::parse_date_filter)
            .transpose()?;

        if let (Some(after), Some(before)) = (after_date, before_date) {
            if after > before {
                return Err(Error::InvalidInput(format!(
                    "--after ({}) is later than --before ({})",
                    after, before
                )));
            }
        }

        if args.key_path.split('/').all(|segment| segment.is_empty()) {
            return Err(Error::InvalidInput("--key-path must name at least one key".to_string()));
        }

        Ok(Config {
            inputs: args.inputs,
            sam: args.sam,
            format: args.format,
            filter_regex,
            after_date,
            before_date,
            output: args.output,
            timezone,
            key_path: args.key_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<Config> {
        let args = Args::try_parse_from(argv).unwrap();
        Config::from_args(args)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["rbin", "$IABC.txt"]).unwrap();
        assert_eq!(config.inputs, vec![PathBuf::from("$IABC.txt")]);
        assert!(config.sam.is_none());
        assert_eq!(config.format, OutputFormat::Human);
        assert_eq!(config.timezone, chrono_tz::Tz::UTC);
        assert_eq!(config.key_path, "SAM/Domains/Account/Users");
        assert!(config.filter_regex.is_none());
    }

    #[test]
    fn test_all_options() {
        let config = parse(&[
            "rbin",
            "--sam",
            "SAM",
            "--format",
            "csv",
            "--filter",
            "DOCS",
            "--after",
            "2012-01-01",
            "--before",
            "2013-01-01 12:00:00",
            "--timezone",
            "UTC+8",
            "--output",
            "out.csv",
            "bin1",
            "bin2",
        ])
        .unwrap();
        assert_eq!(config.sam, Some(PathBuf::from("SAM")));
        assert_eq!(config.format, OutputFormat::Csv);
        assert_eq!(config.inputs.len(), 2);
        assert!(config.filter_regex.unwrap().is_match("c:\\docs\\a.txt"));
        assert!(config.after_date.is_some());
        assert!(config.before_date.is_some());
        assert_eq!(config.output.as_deref(), Some("out.csv"));
    }

    #[test]
    fn test_inputs_required() {
        assert!(Args::try_parse_from(["rbin"]).is_err());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            parse(&["rbin", "--filter", "(", "x"]),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            parse(&["rbin", "--timezone", "Mars/Base", "x"]),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            parse(&["rbin", "--after", "2013-01-01", "--before", "2012-01-01", "x"]),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            parse(&["rbin", "--key-path", "//", "x"]),
            Err(Error::InvalidInput(_))
        ));
        assert!(Args::try_parse_from(["rbin", "--format", "xml", "x"]).is_err());
    }
}
