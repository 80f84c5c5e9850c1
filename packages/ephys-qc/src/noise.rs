//! Noise channel detection
//!
//! Band-passes a short stretch of every channel, takes its RMS, and compares it
//! to a spatial median of neighbouring channels' RMS. Channels that stand far
//! above their neighbourhood are masked out before sorting.

use crate::error::{QcError, Result};
use crate::filter::BandpassDesign;
use crate::recording::RawRecording;
use crate::stats::{median_filter, rms};
use crate::thresholds::QcThresholds;
use rayon::prelude::*;
use serde::Serialize;

/// Width (in channels) of the spatial median used as the RMS baseline
pub const BASELINE_KERNEL: usize = 11;

/// Sample range `[start_sample, end_sample)` analysed for noise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnalysisWindow {
    pub start_sample: usize,
    pub end_sample: usize,
    /// True when the requested end lay past the end of the recording
    pub clipped: bool,
}

impl AnalysisWindow {
    pub fn resolve(num_samples: usize, sample_rate: f64, thresholds: &QcThresholds) -> Result<Self> {
        let start_sample = (thresholds.noise_delay * sample_rate) as usize;
        let requested_end =
            ((thresholds.noise_delay + thresholds.noise_interval) * sample_rate) as usize;

        let clipped = requested_end > num_samples;
        let end_sample = if clipped {
            log::warn!(
                "Noise interval ends at sample {} but recording has {} samples; clipping window",
                requested_end,
                num_samples
            );
            num_samples
        } else {
            requested_end
        };

        if start_sample >= end_sample {
            return Err(QcError::EmptyAnalysisWindow {
                start: start_sample,
                available: num_samples,
            });
        }

        Ok(Self {
            start_sample,
            end_sample,
            clipped,
        })
    }

    pub fn len(&self) -> usize {
        self.end_sample - self.start_sample
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-channel usability, indexed by channel; `true` = usable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChannelNoiseMask(Vec<bool>);

impl ChannelNoiseMask {
    pub fn from_usable(usable: Vec<bool>) -> Self {
        Self(usable)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    /// Out-of-range channels are reported as unusable.
    pub fn is_usable(&self, channel: usize) -> bool {
        self.0.get(channel).copied().unwrap_or(false)
    }

    pub fn noisy_channels(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter(|&(_, &usable)| !usable)
            .map(|(channel, _)| channel)
            .collect()
    }

    pub fn usable_channels(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter(|&(_, &usable)| usable)
            .map(|(channel, _)| channel)
            .collect()
    }

    pub fn noisy_count(&self) -> usize {
        self.0.iter().filter(|&&usable| !usable).count()
    }

    /// A copy of this mask with `channels` additionally marked unusable
    /// (e.g. reference channels known ahead of time).
    pub fn with_forced_noisy(&self, channels: &[usize]) -> Result<Self> {
        let mut usable = self.0.clone();
        for &channel in channels {
            let slot = usable.get_mut(channel).ok_or_else(|| {
                QcError::InvalidParameter(format!(
                    "channel {} out of range for {} channels",
                    channel,
                    self.0.len()
                ))
            })?;
            *slot = false;
        }
        Ok(Self(usable))
    }
}

/// Flag channels whose RMS exceeds the baseline by strictly more than `threshold`.
pub fn mask_from_statistics(rms: &[f64], baseline: &[f64], threshold: f64) -> ChannelNoiseMask {
    ChannelNoiseMask(
        rms.iter()
            .zip(baseline)
            .map(|(r, b)| !(r - b > threshold))
            .collect(),
    )
}

/// Output of a detector run
#[derive(Debug, Clone, Serialize)]
pub struct NoiseReport {
    pub mask: ChannelNoiseMask,
    pub rms: Vec<f64>,
    pub baseline: Vec<f64>,
    pub window: AnalysisWindow,
    pub filter: BandpassDesign,
}

impl NoiseReport {
    pub fn noisy_count(&self) -> usize {
        self.mask.noisy_count()
    }
}

pub struct NoiseChannelDetector;

impl NoiseChannelDetector {
    pub fn detect(recording: &RawRecording<'_>, thresholds: &QcThresholds) -> Result<NoiseReport> {
        let window =
            AnalysisWindow::resolve(recording.num_samples(), recording.sample_rate(), thresholds)?;
        let design = BandpassDesign::for_sample_rate(recording.sample_rate())?;
        let filter = design.build();

        log::debug!(
            "Noise window samples {}..{} ({} channels), band {:.1}-{:.1} Hz{}",
            window.start_sample,
            window.end_sample,
            recording.num_channels(),
            design.low_hz,
            design.high_hz,
            if design.clamped { " (clamped)" } else { "" }
        );

        // Channels are independent until the spatial baseline
        let rms_values: Vec<f64> = {
            crate::time_stage!("noise channels: filter + rms");
            (0..recording.num_channels())
                .into_par_iter()
                .map(|channel| {
                    let trace =
                        recording.channel_window(channel, window.start_sample, window.end_sample);
                    rms(&filter.filtfilt(&trace))
                })
                .collect()
        };

        let baseline = median_filter(&rms_values, BASELINE_KERNEL)?;
        let mask = mask_from_statistics(&rms_values, &baseline, thresholds.noise_threshold);

        log::info!("number of noise channels: {}", mask.noisy_count());

        Ok(NoiseReport {
            mask,
            rms: rms_values,
            baseline,
            window,
            filter: design,
        })
    }
}
