//! CLI argument definitions for logwheel.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments. The
//! parsed arguments are applied on top of the file/environment-derived
//! configuration, so a flag always wins over every other layer.

use std::path::PathBuf;

use clap::Parser;

use logwheel_core::config::{self, LogwheelConfig};
use logwheel_core::error::ConfigError;

/// Rotate log lines from standard input into time-bucketed files.
///
/// Reads one line at a time, classifies it against an optional
/// hot-reloadable rules file, appends accepted lines to NAME plus a
/// time-format suffix, and can relay alert lines to an email address
/// through a sendmail subprocess.
#[derive(Parser, Debug)]
#[command(name = "logwheel")]
#[command(version, about, long_about = None)]
pub struct LogwheelCli {
    /// Base name of the output file.
    pub name: Option<String>,

    /// Rotation interval: NUMBER with an optional unit
    /// (seconds, minutes, hours, days, weeks). 0 disables rotation.
    pub interval: Option<String>,

    /// Maintain a NAME -> current file symlink, updated on each rotation.
    #[arg(short = 'l', long)]
    pub symlink: bool,

    /// strftime(3) format for the file name suffix
    /// (default: "." followed by the epoch seconds of the bucket).
    #[arg(short, long)]
    pub format: Option<String>,

    /// Email alert lines to this address.
    #[arg(short, long)]
    pub email: Option<String>,

    /// Rules file selecting which lines are logged and/or emailed.
    #[arg(short, long)]
    pub rules: Option<PathBuf>,

    /// Octal mode for created output files.
    #[arg(long)]
    pub mode: Option<String>,

    /// Owner (user[:group]) for created output files.
    #[arg(long)]
    pub owner: Option<String>,

    /// Minimum interval between alert messages, e.g. "1800" or "30 minutes".
    #[arg(long)]
    pub min_email_interval: Option<String>,

    /// Path to the sendmail binary.
    #[arg(long)]
    pub sendmail: Option<String>,

    /// Path to a logwheel.toml configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and exit without processing input.
    #[arg(long)]
    pub validate: bool,
}

impl LogwheelCli {
    /// Apply CLI overrides on top of a file/env-derived configuration.
    pub fn apply_to(&self, config: &mut LogwheelConfig) -> Result<(), ConfigError> {
        if let Some(name) = &self.name {
            config.output.name = name.clone();
        }
        if let Some(interval) = &self.interval {
            config.output.interval_secs = config::parse_interval(interval)?;
        }
        if self.symlink {
            config.output.make_symlink = true;
        }
        if let Some(format) = &self.format {
            config.output.format = format.clone();
        }
        if let Some(email) = &self.email {
            config.alert.address = Some(email.clone());
        }
        if let Some(rules) = &self.rules {
            config.rules.path = Some(rules.display().to_string());
        }
        if let Some(mode) = &self.mode {
            config.output.mode = mode.parse()?;
        }
        if let Some(owner) = &self.owner {
            config.output.owner = Some(owner.parse()?);
        }
        if let Some(min) = &self.min_email_interval {
            config.alert.min_interval_secs =
                config::parse_interval(min).map_err(|_| ConfigError::InvalidValue {
                    field: "alert.min_interval".to_owned(),
                    reason: format!("'{min}' is not a valid interval"),
                })?;
        }
        if let Some(sendmail) = &self.sendmail {
            config.alert.sendmail = sendmail.clone();
        }
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> LogwheelCli {
        LogwheelCli::try_parse_from(std::iter::once("logwheel").chain(args.iter().copied()))
            .expect("argument parsing failed")
    }

    #[test]
    fn positional_name_and_interval() {
        let cli = parse(&["/var/log/app", "1 day"]);
        assert_eq!(cli.name.as_deref(), Some("/var/log/app"));
        assert_eq!(cli.interval.as_deref(), Some("1 day"));
    }

    #[test]
    fn flags_apply_over_defaults() {
        let cli = parse(&[
            "/var/log/app",
            "3600",
            "-l",
            "-e",
            "ops@example.org",
            "-r",
            "/etc/logwheel/rules",
            "--mode",
            "0600",
            "--owner",
            "syslog:adm",
            "--min-email-interval",
            "30 minutes",
        ]);

        let mut config = LogwheelConfig::default();
        cli.apply_to(&mut config).unwrap();

        assert_eq!(config.output.name, "/var/log/app");
        assert_eq!(config.output.interval_secs, 3600);
        assert!(config.output.make_symlink);
        assert_eq!(config.alert.address.as_deref(), Some("ops@example.org"));
        assert_eq!(config.rules.path.as_deref(), Some("/etc/logwheel/rules"));
        assert_eq!(config.output.mode.bits(), 0o600);
        assert_eq!(config.output.owner.as_ref().unwrap().group.as_deref(), Some("adm"));
        assert_eq!(config.alert.min_interval_secs, 1800);
        config.validate().unwrap();
    }

    #[test]
    fn cli_wins_over_existing_config() {
        let cli = parse(&["--log-level", "debug", "--sendmail", "/usr/lib/sendmail"]);

        let mut config = LogwheelConfig::default();
        config.general.log_level = "warn".to_owned();
        config.alert.sendmail = "/usr/sbin/sendmail".to_owned();
        cli.apply_to(&mut config).unwrap();

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.alert.sendmail, "/usr/lib/sendmail");
    }

    #[test]
    fn zero_interval_is_accepted() {
        let cli = parse(&["/var/log/app", "0"]);
        let mut config = LogwheelConfig::default();
        cli.apply_to(&mut config).unwrap();
        assert_eq!(config.output.interval_secs, 0);
        config.validate().unwrap();
    }

    #[test]
    fn bad_interval_is_a_startup_error() {
        let cli = parse(&["/var/log/app", "soon"]);
        let mut config = LogwheelConfig::default();
        assert!(cli.apply_to(&mut config).is_err());
    }

    #[test]
    fn bad_mode_is_a_startup_error() {
        let cli = parse(&["/var/log/app", "0", "--mode", "rw-r--r--"]);
        let mut config = LogwheelConfig::default();
        assert!(cli.apply_to(&mut config).is_err());
    }
}
