//! Validator configuration. Defaults live here as constants and can be
//! overridden from a TOML file and `B64RULES_*` environment variables.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default log filter for the command-line front end
pub const RUST_LOG: &str = "b64rules=info";

/// Prefix for transient files holding decoded payloads
pub const TEMP_PREFIX: &str = "b64rules-";

/// Largest accepted difference between a requested aspect ratio and the
/// probed one
pub const RATIO_TOLERANCE: f64 = 0.01;

/// Config file looked up by the binary when no path is given
pub const CONFIG_FILE: &str = "b64rules.toml";

/// Environment prefix, e.g. `B64RULES_RATIO_TOLERANCE=0.05`
pub const ENV_PREFIX: &str = "B64RULES";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Directory for transient files; the system temp dir when unset
    pub temp_dir: Option<PathBuf>,

    /// File name prefix for transient files
    pub temp_prefix: String,

    /// Tolerance used by the `ratio` dimension check
    pub ratio_tolerance: f64,

    /// `tracing` filter directive used when `RUST_LOG` is not set
    pub log: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            temp_dir: None,
            temp_prefix: TEMP_PREFIX.into(),
            ratio_tolerance: RATIO_TOLERANCE,
            log: RUST_LOG.into(),
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file, then the environment.
    /// A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(CONFIG_FILE));
        let settings: Settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .with_context(|| format!("failed to read configuration from {}", path.display()))?
            .try_deserialize()
            .context("invalid configuration")?;

        settings.check()?;
        Ok(settings)
    }

    fn check(&self) -> Result<()> {
        if !self.ratio_tolerance.is_finite() || self.ratio_tolerance < 0.0 {
            bail!(
                "ratio_tolerance must be a non-negative number, got {}",
                self.ratio_tolerance
            );
        }
        if self.temp_prefix.contains(std::path::is_separator) {
            bail!("temp_prefix must not contain path separators");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.temp_dir, None);
        assert_eq!(settings.temp_prefix, TEMP_PREFIX);
        assert_eq!(settings.ratio_tolerance, RATIO_TOLERANCE);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(settings.temp_prefix, TEMP_PREFIX);
        assert_eq!(settings.ratio_tolerance, RATIO_TOLERANCE);
    }

    #[test]
    fn test_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "ratio_tolerance = 0.05\ntemp_prefix = \"upload-\"").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.ratio_tolerance, 0.05);
        assert_eq!(settings.temp_prefix, "upload-");
        assert_eq!(settings.log, RUST_LOG);
    }

    #[test]
    fn test_rejects_negative_tolerance() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "ratio_tolerance = -1.0").unwrap();

        assert!(Settings::load(Some(file.path())).is_err());
    }
}
