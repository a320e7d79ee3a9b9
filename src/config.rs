// Runtime configuration: an optional TOML file, overridden by CLI flags.
//
// Example:
//
//   [data]
//   stations = "stations.csv"
//   usage = "usage.csv"
//   pnl = "pnl.csv"
//   output_dir = "out"
//
//   [proximity]
//   radius_km = 5.0
//
//   [utilization]
//   ac_capacity = 7
//   dc_capacity = 30

use crate::error::{ReportError, Result};
use crate::geo::{DEFAULT_RADIUS_KM, MAX_RADIUS_KM, MIN_RADIUS_KM};
use crate::utilization::UtilizationConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "charging_report.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub stations: PathBuf,
    pub usage: PathBuf,
    pub pnl: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            stations: PathBuf::from("stations.csv"),
            usage: PathBuf::from("usage.csv"),
            pnl: PathBuf::from("pnl.csv"),
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    pub radius_km: f64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        ProximityConfig {
            radius_km: DEFAULT_RADIUS_KM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub proximity: ProximityConfig,
    pub utilization: UtilizationConfig,
}

/// Values given on the command line; `None` keeps the file/default value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub stations: Option<PathBuf>,
    pub usage: Option<PathBuf>,
    pub pnl: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub radius_km: Option<f64>,
    pub ac_capacity: Option<u32>,
    pub dc_capacity: Option<u32>,
}

impl AppConfig {
    /// Load from `path`, or from [`DEFAULT_CONFIG_FILE`] when it exists.
    ///
    /// An explicitly named file must exist; the default one is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        if !required && !path.exists() {
            return Ok(AppConfig::default());
        }
        let text = std::fs::read_to_string(&path)?;
        let config = Self::from_toml(&text)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(p) = overrides.stations {
            self.data.stations = p;
        }
        if let Some(p) = overrides.usage {
            self.data.usage = p;
        }
        if let Some(p) = overrides.pnl {
            self.data.pnl = p;
        }
        if let Some(p) = overrides.output_dir {
            self.data.output_dir = p;
        }
        if let Some(r) = overrides.radius_km {
            self.proximity.radius_km = r;
        }
        if let Some(c) = overrides.ac_capacity {
            self.utilization.ac_capacity = c;
        }
        if let Some(c) = overrides.dc_capacity {
            self.utilization.dc_capacity = c;
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_radius(self.proximity.radius_km)?;
        UtilizationConfig::new(self.utilization.ac_capacity, self.utilization.dc_capacity)?;
        Ok(())
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.data.output_dir.join(file_name)
    }
}

pub fn validate_radius(radius_km: f64) -> Result<f64> {
    if (MIN_RADIUS_KM..=MAX_RADIUS_KM).contains(&radius_km) {
        Ok(radius_km)
    } else {
        Err(ReportError::InvalidParameter(format!(
            "radius must be between {} and {} km, got {}",
            MIN_RADIUS_KM, MAX_RADIUS_KM, radius_km
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_dashboard_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.proximity.radius_km, 5.0);
        assert_eq!(config.utilization.ac_capacity, 7);
        assert_eq!(config.utilization.dc_capacity, 30);
        assert_eq!(config.data.stations, PathBuf::from("stations.csv"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = AppConfig::from_toml("[utilization]\ndc_capacity = 60\n").unwrap();
        assert_eq!(config.utilization.dc_capacity, 60);
        assert_eq!(config.utilization.ac_capacity, 7);
        assert_eq!(config.proximity.radius_km, 5.0);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let err = AppConfig::from_toml("[proximity]\nradius_km = \"far\"\n").unwrap_err();
        assert!(matches!(err, ReportError::ConfigParse(_)));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(err, ReportError::Io(_)));
    }

    #[test]
    fn load_reads_file_then_overrides_apply() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[data]\noutput_dir = \"reports\"\n[proximity]\nradius_km = 2.5").unwrap();
        let mut config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.proximity.radius_km, 2.5);

        config.apply(Overrides {
            radius_km: Some(8.0),
            ac_capacity: Some(11),
            ..Default::default()
        });
        assert_eq!(config.proximity.radius_km, 8.0);
        assert_eq!(config.utilization.ac_capacity, 11);
        assert_eq!(config.output_path("x.csv"), PathBuf::from("reports").join("x.csv"));
    }

    #[test]
    fn out_of_range_tunables_are_rejected() {
        let mut config = AppConfig::default();
        config.proximity.radius_km = 10.5;
        assert!(matches!(config.validate(), Err(ReportError::InvalidParameter(_))));
        config.proximity.radius_km = 0.1;
        config.utilization.dc_capacity = 0;
        assert!(config.validate().is_err());
        assert!(validate_radius(0.05).is_err());
        assert_eq!(validate_radius(10.0).unwrap(), 10.0);
    }
}
