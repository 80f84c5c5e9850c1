use crate::error::{QcError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of refractory violations tolerated before a `good` cluster with a
/// high ISI violation rate is demoted to `mua`.
pub const NUM_VIOL_MAX: f64 = 3.0;

/// All numeric cutoffs used by the QC stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcThresholds {
    /// Start of the noise analysis window (seconds)
    #[serde(default = "default_noise_delay")]
    pub noise_delay: f64,

    /// Length of the noise analysis window (seconds)
    #[serde(default = "default_noise_interval")]
    pub noise_interval: f64,

    /// RMS excess over the spatial median (µV) above which a channel is noisy
    #[serde(default = "default_noise_threshold")]
    pub noise_threshold: f64,

    /// Min SNR for non-noise clusters
    #[serde(default = "default_snr_min")]
    pub snr_min: f64,

    /// Max halfwidth for non-noise clusters
    #[serde(default = "default_halfwidth_max")]
    pub halfwidth_max: f64,

    /// Max halfwidth (combined with repo_slope) for non-noise clusters
    #[serde(default = "default_wide_halfwidth_max")]
    pub wide_halfwidth_max: f64,

    /// Min repolarization slope for wide, non-noise clusters
    #[serde(default = "default_repo_slope")]
    pub repo_slope: f64,

    /// Min firing rate for non-noise clusters
    #[serde(default = "default_mua_fr_min")]
    pub mua_fr_min: f64,

    /// Depth (microns) from probe tip to brain surface
    #[serde(default = "default_depth_max", alias = "depth")]
    pub depth_max: f64,

    /// Max % ISI violations for good clusters
    #[serde(default = "default_isi_viol_max")]
    pub isi_viol_max: f64,

    /// Max contamination rate for good clusters
    #[serde(default = "default_contam_rate_max")]
    pub contam_rate_max: f64,
}

fn default_noise_delay() -> f64 {
    5.0
}
fn default_noise_interval() -> f64 {
    10.0
}
fn default_noise_threshold() -> f64 {
    20.0
}
fn default_snr_min() -> f64 {
    2.0
}
fn default_halfwidth_max() -> f64 {
    0.3
}
fn default_wide_halfwidth_max() -> f64 {
    0.3
}
fn default_repo_slope() -> f64 {
    0.05
}
fn default_mua_fr_min() -> f64 {
    0.01
}
fn default_depth_max() -> f64 {
    3200.0
}
fn default_isi_viol_max() -> f64 {
    0.2
}
fn default_contam_rate_max() -> f64 {
    15.0
}

impl Default for QcThresholds {
    fn default() -> Self {
        Self {
            noise_delay: default_noise_delay(),
            noise_interval: default_noise_interval(),
            noise_threshold: default_noise_threshold(),
            snr_min: default_snr_min(),
            halfwidth_max: default_halfwidth_max(),
            wide_halfwidth_max: default_wide_halfwidth_max(),
            repo_slope: default_repo_slope(),
            mua_fr_min: default_mua_fr_min(),
            depth_max: default_depth_max(),
            isi_viol_max: default_isi_viol_max(),
            contam_rate_max: default_contam_rate_max(),
        }
    }
}

impl QcThresholds {
    /// Load thresholds from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(QcError::FileNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let thresholds: Self = serde_json::from_str(text)?;
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Check that every cutoff is usable.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("noise_delay", self.noise_delay),
            ("noise_interval", self.noise_interval),
            ("noise_threshold", self.noise_threshold),
            ("snr_min", self.snr_min),
            ("halfwidth_max", self.halfwidth_max),
            ("wide_halfwidth_max", self.wide_halfwidth_max),
            ("repo_slope", self.repo_slope),
            ("mua_fr_min", self.mua_fr_min),
            ("depth_max", self.depth_max),
            ("isi_viol_max", self.isi_viol_max),
            ("contam_rate_max", self.contam_rate_max),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(QcError::InvalidParameter(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }

        if self.noise_delay < 0.0 {
            return Err(QcError::InvalidParameter(format!(
                "noise_delay must be non-negative, got {}",
                self.noise_delay
            )));
        }
        if self.noise_interval <= 0.0 {
            return Err(QcError::InvalidParameter(format!(
                "noise_interval must be positive, got {}",
                self.noise_interval
            )));
        }

        Ok(())
    }

    /// True when a "wide but flat" halfwidth band is configured.
    pub fn has_wide_halfwidth_band(&self) -> bool {
        self.halfwidth_max < self.wide_halfwidth_max
    }
}
