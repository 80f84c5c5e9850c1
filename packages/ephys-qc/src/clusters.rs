use crate::error::{QcError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Vertical spacing between site rows (microns)
pub const SITE_ROW_PITCH_UM: f64 = 20.0;

/// Quality tier of a sorted unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterLabel {
    Good,
    Mua,
    Noise,
}

impl ClusterLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterLabel::Good => "good",
            ClusterLabel::Mua => "mua",
            ClusterLabel::Noise => "noise",
        }
    }
}

impl fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterLabel {
    type Err = QcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "good" => Ok(ClusterLabel::Good),
            "mua" => Ok(ClusterLabel::Mua),
            "noise" => Ok(ClusterLabel::Noise),
            other => Err(QcError::MalformedInput(format!(
                "unknown cluster label '{}'",
                other
            ))),
        }
    }
}

/// Per-cluster quality metrics as read from the metrics tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMetrics {
    pub cluster_id: u32,
    pub snr: f64,
    pub halfwidth: f64,
    pub repolarization_slope: f64,
    pub firing_rate: f64,
    /// Percent of inter-spike intervals inside the refractory period
    pub isi_viol: f64,
    pub num_viol: f64,
    /// Percent
    pub contam_rate: f64,
}

/// Metrics plus the depth derived from the cluster's representative channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterMetricsRow {
    pub cluster_id: u32,
    pub snr: f64,
    pub halfwidth: f64,
    pub repolarization_slope: f64,
    pub firing_rate: f64,
    pub isi_viol: f64,
    pub num_viol: f64,
    pub contam_rate: f64,
    /// Microns from the probe tip
    pub depth: f64,
}

impl ClusterMetricsRow {
    pub fn from_metrics(metrics: &ClusterMetrics, depth: f64) -> Self {
        Self {
            cluster_id: metrics.cluster_id,
            snr: metrics.snr,
            halfwidth: metrics.halfwidth,
            repolarization_slope: metrics.repolarization_slope,
            firing_rate: metrics.firing_rate,
            isi_viol: metrics.isi_viol,
            num_viol: metrics.num_viol,
            contam_rate: metrics.contam_rate,
            depth,
        }
    }
}

/// One row of the cluster table: spike count and representative channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelMapEntry {
    pub spike_count: u64,
    pub channel: usize,
}

impl ChannelMapEntry {
    /// Build from a numeric row; column 0 is the spike count, column 1 the channel.
    pub fn from_row(row: &[f64]) -> Result<Self> {
        let (count, channel) = match row {
            [count, channel, ..] => (*count, *channel),
            _ => {
                return Err(QcError::MalformedInput(format!(
                    "cluster table row has {} columns, expected at least 2",
                    row.len()
                )))
            }
        };

        if !(count.is_finite() && count >= 0.0 && channel.is_finite() && channel >= 0.0) {
            return Err(QcError::MalformedInput(format!(
                "invalid cluster table row: spike count {}, channel {}",
                count, channel
            )));
        }

        Ok(Self {
            spike_count: count as u64,
            channel: channel as usize,
        })
    }

    pub fn has_spikes(&self) -> bool {
        self.spike_count != 0
    }
}

/// Depth of a site row: `floor(channel / 2 + 1) * 20` microns
pub fn depth_for_channel(channel: usize) -> f64 {
    (channel / 2 + 1) as f64 * SITE_ROW_PITCH_UM
}

/// Pair each metrics row with a depth.
///
/// Cluster-table entries without spikes are dropped; the remaining entries are
/// matched to metrics rows by position.
pub fn attach_depths(
    metrics: &[ClusterMetrics],
    channel_map: &[ChannelMapEntry],
) -> Result<Vec<ClusterMetricsRow>> {
    let populated: Vec<&ChannelMapEntry> = channel_map.iter().filter(|e| e.has_spikes()).collect();

    if populated.len() != metrics.len() {
        return Err(QcError::MalformedInput(format!(
            "cluster table has {} clusters with spikes but metrics table has {} rows",
            populated.len(),
            metrics.len()
        )));
    }

    Ok(metrics
        .iter()
        .zip(populated)
        .map(|(m, entry)| ClusterMetricsRow::from_metrics(m, depth_for_channel(entry.channel)))
        .collect())
}

/// A `cluster_id` / `group` pair from a label table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEntry {
    pub cluster_id: u32,
    pub group: ClusterLabel,
}

/// Original (pre-reclassification) labels keyed by cluster
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    entries: Vec<LabelEntry>,
    index: HashMap<u32, Vec<ClusterLabel>>,
}

impl LabelTable {
    pub fn new(entries: Vec<LabelEntry>) -> Self {
        let mut index: HashMap<u32, Vec<ClusterLabel>> = HashMap::new();
        for entry in &entries {
            index.entry(entry.cluster_id).or_default().push(entry.group);
        }
        Self { entries, index }
    }

    pub fn entries(&self) -> &[LabelEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The single label recorded for `cluster_id`.
    pub fn lookup(&self, cluster_id: u32) -> Result<ClusterLabel> {
        match self.index.get(&cluster_id).map(Vec::as_slice) {
            None | Some([]) => Err(QcError::MissingLabel(cluster_id)),
            Some([label]) => Ok(*label),
            Some(labels) => Err(QcError::AmbiguousLabel {
                cluster_id,
                count: labels.len(),
            }),
        }
    }
}

impl FromIterator<(u32, ClusterLabel)> for LabelTable {
    fn from_iter<I: IntoIterator<Item = (u32, ClusterLabel)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(cluster_id, group)| LabelEntry { cluster_id, group })
                .collect(),
        )
    }
}
