//! Configuration CLI commands.
//!
//! Provides `config show` and `config check` for inspecting pager settings
//! loaded from an INI file.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use pagecurl::PagerConfig;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective pager settings
    Show {
        /// INI file with a [pager] section (defaults when omitted)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Validate an INI file without printing the settings
    Check {
        /// INI file with a [pager] section
        file: PathBuf,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show { file } => run_show(file.as_deref()),
        ConfigCommands::Check { file } => run_check(&file),
    }
}

/// Load the pager config from `file`, or defaults.
pub fn load(file: Option<&Path>) -> Result<PagerConfig, CliError> {
    match file {
        Some(path) => Ok(PagerConfig::from_ini_file(path)?),
        None => Ok(PagerConfig::default()),
    }
}

fn run_show(file: Option<&Path>) -> Result<(), CliError> {
    let config = load(file)?;

    match file {
        Some(path) => println!("Pager settings from {}", path.display()),
        None => println!("Pager settings (defaults)"),
    }
    println!();
    for (key, value) in describe(&config) {
        println!("  {:<28} {}", key, value);
    }
    Ok(())
}

fn run_check(file: &Path) -> Result<(), CliError> {
    PagerConfig::from_ini_file(file)?;
    println!("{}: ok", file.display());
    Ok(())
}

fn describe(config: &PagerConfig) -> Vec<(&'static str, String)> {
    vec![
        ("settle_delay", format!("{:?}", config.settle_delay)),
        ("capture.max_retries", config.capture.max_retries.to_string()),
        ("capture.retry_delay", format!("{:?}", config.capture.retry_delay)),
        (
            "capture.max_surface_waits",
            config.capture.max_surface_waits.to_string(),
        ),
        (
            "initial_capture.max_retries",
            config.initial_capture.max_retries.to_string(),
        ),
        (
            "initial_capture.surface_waits",
            config.initial_capture.max_surface_waits.to_string(),
        ),
        (
            "stabilization_timeout",
            format!("{:?}", config.stabilization_timeout),
        ),
        ("late_refresh_delay", format!("{:?}", config.late_refresh_delay)),
        ("event_capacity", config.event_capacity.to_string()),
        (
            "reading_direction",
            if config.reading_direction.is_rtl() {
                "rtl".to_string()
            } else {
                "ltr".to_string()
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_defaults_without_file() {
        let config = load(None).unwrap();
        assert_eq!(config, PagerConfig::default());
    }

    #[test]
    fn test_load_rejects_bad_value() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pager]\nsettle_delay_ms = soon").unwrap();

        let err = load(Some(file.path())).unwrap_err();
        assert!(matches!(err, CliError::PagerConfig(_)));
    }

    #[test]
    fn test_describe_lists_reading_direction() {
        let config = PagerConfig::default()
            .with_reading_direction(pagecurl::ReadingDirection::RightToLeft);
        let rows = describe(&config);
        assert!(rows
            .iter()
            .any(|(key, value)| *key == "reading_direction" && value == "rtl"));
    }
}
