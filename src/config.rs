//! Run Configuration Module
//!
//! Thresholds, organism selection and worker count for a single detection
//! run, plus the on-disk locations of the reference databases.
//!
//! Configuration is always passed explicitly into the pipeline so that
//! independent runs can share a process.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigurationError;

pub const DEFAULT_PID_THRESHOLD: f64 = 98.0;
pub const DEFAULT_PLENGTH_THRESHOLD: f64 = 60.0;
pub const DEFAULT_THREADS: usize = 1;

// ============================================================================
// Detection Config
// ============================================================================

/// Parameters of one detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum percent identity (0-100, inclusive).
    pub pid_threshold: f64,
    /// Minimum percent of the reference length covered (0-100, inclusive).
    pub plength_threshold: f64,
    /// Organism whose point mutation database is searched. None disables
    /// point mutation detection.
    pub pointfinder_organism: Option<String>,
    /// Report genomes without resistance calls in the summary.
    pub include_negatives: bool,
    /// Size of the alignment worker pool.
    pub threads: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            pid_threshold: DEFAULT_PID_THRESHOLD,
            plength_threshold: DEFAULT_PLENGTH_THRESHOLD,
            pointfinder_organism: None,
            include_negatives: false,
            threads: DEFAULT_THREADS,
        }
    }
}

impl DetectionConfig {
    /// Loads a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        use anyhow::Context;

        let text = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid config: {}", path.as_ref().display()))
    }

    /// Checks thresholds and thread count.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_percentage("pid threshold", self.pid_threshold)?;
        check_percentage("percent length overlap", self.plength_threshold)?;
        if self.threads == 0 {
            return Err(ConfigurationError::InvalidThreadCount(self.threads));
        }
        Ok(())
    }
}

fn check_percentage(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidThreshold { name, value })
    }
}

// ============================================================================
// Database Layout
// ============================================================================

/// Locations of the gene and point mutation databases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseLayout {
    /// Directory of ResFinder-style `*.fsa` files.
    pub resfinder_dir: PathBuf,
    /// Directory holding one PointFinder-style subdirectory per organism.
    pub pointfinder_root: PathBuf,
}

impl DatabaseLayout {
    /// Standard layout: `<root>/resfinder` and `<root>/pointfinder`.
    pub fn from_root<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            resfinder_dir: root.join("resfinder"),
            pointfinder_root: root.join("pointfinder"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = DetectionConfig::default();
        assert_eq!(config.pid_threshold, 98.0);
        assert_eq!(config.plength_threshold, 60.0);
        assert_eq!(config.threads, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_threshold_bounds() {
        let mut config = DetectionConfig { pid_threshold: 100.0, plength_threshold: 0.0, ..Default::default() };
        assert!(config.validate().is_ok());

        config.pid_threshold = 100.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidThreshold { name: "pid threshold", .. })
        ));

        config.pid_threshold = 98.0;
        config.plength_threshold = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_threads_rejected() {
        let config = DetectionConfig { threads: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigurationError::InvalidThreadCount(0))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DetectionConfig =
            serde_json::from_str(r#"{"pid_threshold": 95.0, "pointfinder_organism": "salmonella"}"#).unwrap();
        assert_eq!(config.pid_threshold, 95.0);
        assert_eq!(config.plength_threshold, 60.0);
        assert_eq!(config.pointfinder_organism.as_deref(), Some("salmonella"));
    }

    #[test]
    fn test_layout_from_root() {
        let layout = DatabaseLayout::from_root("/db");
        assert_eq!(layout.resfinder_dir, PathBuf::from("/db/resfinder"));
        assert_eq!(layout.pointfinder_root, PathBuf::from("/db/pointfinder"));
    }
}
