//! Cluster quality reclassification
//!
//! Every cluster starts from its original sorter label and is run through a
//! fixed, ordered list of rules. A rule that fires sets the label and bumps its
//! counter; all rules except the first end evaluation for that cluster.
//!
//! Counters record rule firings, not distinct clusters: a cluster hit by both
//! noise rules is counted twice in `noise_rule_firings`. Final label
//! populations are reported separately in [`LabelTotals`].

use crate::clusters::{
    attach_depths, ChannelMapEntry, ClusterLabel, ClusterMetrics, ClusterMetricsRow, LabelEntry,
    LabelTable,
};
use crate::error::{QcError, Result};
use crate::thresholds::{QcThresholds, NUM_VIOL_MAX};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Wide but flat waveform inside the configured halfwidth band
    WideFlatNoise,
    /// Low SNR, too wide, too sparse, or above the brain surface
    HardNoise,
    /// MUA clean enough to be promoted to good
    MuaRescue,
    /// Good unit with too many refractory violations or too much contamination
    GoodDemotion,
}

/// Evaluation order. Later rules see the label left by earlier ones.
pub const RULE_ORDER: [Rule; 4] = [
    Rule::WideFlatNoise,
    Rule::HardNoise,
    Rule::MuaRescue,
    Rule::GoodDemotion,
];

impl Rule {
    pub fn matches(&self, row: &ClusterMetricsRow, label: ClusterLabel, t: &QcThresholds) -> bool {
        match self {
            Rule::WideFlatNoise => {
                t.has_wide_halfwidth_band()
                    && row.halfwidth > t.halfwidth_max
                    && row.halfwidth < t.wide_halfwidth_max
                    && row.repolarization_slope < t.repo_slope
            }
            Rule::HardNoise => {
                row.snr < t.snr_min
                    || row.halfwidth > t.wide_halfwidth_max
                    || row.firing_rate < t.mua_fr_min
                    || row.depth > t.depth_max
            }
            Rule::MuaRescue => {
                label == ClusterLabel::Mua
                    && row.isi_viol <= t.isi_viol_max
                    && row.contam_rate <= t.contam_rate_max
                    && row.firing_rate >= t.mua_fr_min
            }
            Rule::GoodDemotion => {
                label == ClusterLabel::Good
                    && ((row.isi_viol > t.isi_viol_max && row.num_viol > NUM_VIOL_MAX)
                        || row.contam_rate > t.contam_rate_max
                        || row.firing_rate < t.mua_fr_min)
            }
        }
    }

    pub fn target(&self) -> ClusterLabel {
        match self {
            Rule::WideFlatNoise | Rule::HardNoise => ClusterLabel::Noise,
            Rule::MuaRescue => ClusterLabel::Good,
            Rule::GoodDemotion => ClusterLabel::Mua,
        }
    }

    /// Whether firing this rule ends evaluation for the cluster.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Rule::WideFlatNoise)
    }
}

/// Rule-firing counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReclassifyCounts {
    /// good -> mua
    pub demoted_to_mua: usize,
    /// mua -> good
    pub promoted_to_good: usize,
    pub noise_rule_firings: usize,
}

impl ReclassifyCounts {
    fn record(&mut self, rule: Rule) {
        match rule {
            Rule::WideFlatNoise | Rule::HardNoise => self.noise_rule_firings += 1,
            Rule::MuaRescue => self.promoted_to_good += 1,
            Rule::GoodDemotion => self.demoted_to_mua += 1,
        }
    }
}

impl Add for ReclassifyCounts {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            demoted_to_mua: self.demoted_to_mua + other.demoted_to_mua,
            promoted_to_good: self.promoted_to_good + other.promoted_to_good,
            noise_rule_firings: self.noise_rule_firings + other.noise_rule_firings,
        }
    }
}

impl AddAssign for ReclassifyCounts {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sum for ReclassifyCounts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Number of clusters carrying each final label
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabelTotals {
    pub good: usize,
    pub mua: usize,
    pub noise: usize,
}

impl LabelTotals {
    pub fn from_labels<I: IntoIterator<Item = ClusterLabel>>(labels: I) -> Self {
        let mut totals = Self::default();
        for label in labels {
            match label {
                ClusterLabel::Good => totals.good += 1,
                ClusterLabel::Mua => totals.mua += 1,
                ClusterLabel::Noise => totals.noise += 1,
            }
        }
        totals
    }
}

/// Outcome of running the rule list over one cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterDecision {
    pub label: ClusterLabel,
    pub fired: Vec<Rule>,
    pub counts: ReclassifyCounts,
}

/// Evaluate one cluster, starting from its original label.
pub fn classify(row: &ClusterMetricsRow, original: ClusterLabel, t: &QcThresholds) -> ClusterDecision {
    let mut label = original;
    let mut fired = Vec::new();
    let mut counts = ReclassifyCounts::default();

    for rule in RULE_ORDER {
        if !rule.matches(row, label, t) {
            continue;
        }
        label = rule.target();
        counts.record(rule);
        fired.push(rule);
        if rule.is_terminal() {
            break;
        }
    }

    ClusterDecision {
        label,
        fired,
        counts,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterAssignment {
    pub cluster_id: u32,
    pub original: ClusterLabel,
    pub label: ClusterLabel,
    pub depth: f64,
    pub fired: Vec<Rule>,
}

/// Result of reclassifying a whole cluster table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reclassification {
    /// In metrics-table order
    pub assignments: Vec<ClusterAssignment>,
    pub counts: ReclassifyCounts,
    pub totals: LabelTotals,
}

impl Reclassification {
    pub fn final_labels(&self) -> Vec<LabelEntry> {
        self.assignments
            .iter()
            .map(|a| LabelEntry {
                cluster_id: a.cluster_id,
                group: a.label,
            })
            .collect()
    }

    pub fn original_labels(&self) -> Vec<LabelEntry> {
        self.assignments
            .iter()
            .map(|a| LabelEntry {
                cluster_id: a.cluster_id,
                group: a.original,
            })
            .collect()
    }

    pub fn changed_count(&self) -> usize {
        self.assignments
            .iter()
            .filter(|a| a.label != a.original)
            .count()
    }
}

/// Reclassify every cluster in `metrics`.
///
/// `channel_map` supplies depths (see [`attach_depths`]); `labels` must hold
/// exactly one original label per metrics row.
pub fn reclassify(
    metrics: &[ClusterMetrics],
    labels: &LabelTable,
    channel_map: &[ChannelMapEntry],
    thresholds: &QcThresholds,
) -> Result<Reclassification> {
    if metrics.is_empty() {
        return Err(QcError::MalformedInput("metrics table is empty".to_string()));
    }

    let mut seen = HashSet::with_capacity(metrics.len());
    for m in metrics {
        if !seen.insert(m.cluster_id) {
            return Err(QcError::DuplicateCluster(m.cluster_id));
        }
    }

    let rows = attach_depths(metrics, channel_map)?;
    reclassify_rows(&rows, labels, thresholds)
}

/// Reclassify rows that already carry a depth.
pub fn reclassify_rows(
    rows: &[ClusterMetricsRow],
    labels: &LabelTable,
    thresholds: &QcThresholds,
) -> Result<Reclassification> {
    // Resolve every label before evaluating anything
    let originals = rows
        .iter()
        .map(|row| labels.lookup(row.cluster_id))
        .collect::<Result<Vec<_>>>()?;

    let assignments: Vec<(ClusterAssignment, ReclassifyCounts)> = rows
        .par_iter()
        .zip(originals.par_iter())
        .map(|(row, &original)| {
            let decision = classify(row, original, thresholds);
            let assignment = ClusterAssignment {
                cluster_id: row.cluster_id,
                original,
                label: decision.label,
                depth: row.depth,
                fired: decision.fired,
            };
            (assignment, decision.counts)
        })
        .collect();

    let counts: ReclassifyCounts = assignments.iter().map(|(_, c)| *c).sum();
    let assignments: Vec<ClusterAssignment> = assignments.into_iter().map(|(a, _)| a).collect();
    let totals = LabelTotals::from_labels(assignments.iter().map(|a| a.label));

    log::info!(
        "Reclassified {} good clusters as MUA, {} MUA clusters as good, and {} clusters as noise from {} clusters",
        counts.demoted_to_mua,
        counts.promoted_to_good,
        counts.noise_rule_firings,
        rows.len()
    );

    Ok(Reclassification {
        assignments,
        counts,
        totals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_row() -> ClusterMetricsRow {
        ClusterMetricsRow {
            cluster_id: 0,
            snr: 5.0,
            halfwidth: 0.2,
            repolarization_slope: 0.5,
            firing_rate: 3.0,
            isi_viol: 0.05,
            num_viol: 1.0,
            contam_rate: 2.0,
            depth: 1000.0,
        }
    }

    fn wide_band() -> QcThresholds {
        QcThresholds {
            halfwidth_max: 0.3,
            wide_halfwidth_max: 0.6,
            ..Default::default()
        }
    }

    #[test]
    fn test_clean_cluster_keeps_label() {
        let t = QcThresholds::default();
        for original in [ClusterLabel::Good, ClusterLabel::Noise] {
            let d = classify(&clean_row(), original, &t);
            assert_eq!(d.label, original);
            assert!(d.fired.is_empty());
            assert_eq!(d.counts, ReclassifyCounts::default());
        }
    }

    #[test]
    fn test_low_snr_is_noise_regardless_of_original() {
        let t = QcThresholds::default();
        let row = ClusterMetricsRow {
            snr: 1.5,
            halfwidth: 0.2,
            firing_rate: 0.5,
            depth: 1000.0,
            ..clean_row()
        };
        for original in [ClusterLabel::Good, ClusterLabel::Mua, ClusterLabel::Noise] {
            let d = classify(&row, original, &t);
            assert_eq!(d.label, ClusterLabel::Noise);
            assert_eq!(d.fired, vec![Rule::HardNoise]);
            assert_eq!(d.counts.noise_rule_firings, 1);
        }
    }

    #[test]
    fn test_hard_noise_cutoffs() {
        let t = QcThresholds::default();
        let cases = [
            ClusterMetricsRow { halfwidth: 0.31, ..clean_row() },
            ClusterMetricsRow { firing_rate: 0.001, ..clean_row() },
            ClusterMetricsRow { depth: 3220.0, ..clean_row() },
        ];
        for row in cases {
            assert_eq!(classify(&row, ClusterLabel::Good, &t).label, ClusterLabel::Noise);
        }
        // depth exactly at the surface is still inside the brain
        let at_surface = ClusterMetricsRow { depth: 3200.0, ..clean_row() };
        assert_eq!(classify(&at_surface, ClusterLabel::Good, &t).label, ClusterLabel::Good);
    }

    #[test]
    fn test_wide_flat_then_hard_noise_both_fire() {
        let t = wide_band();
        let row = ClusterMetricsRow {
            halfwidth: 0.45,
            repolarization_slope: 0.01,
            snr: 1.0,
            ..clean_row()
        };
        let d = classify(&row, ClusterLabel::Good, &t);
        assert_eq!(d.label, ClusterLabel::Noise);
        assert_eq!(d.fired, vec![Rule::WideFlatNoise, Rule::HardNoise]);
        assert_eq!(d.counts.noise_rule_firings, 2);
    }

    #[test]
    fn test_wide_flat_blocks_rescue() {
        let t = wide_band();
        let row = ClusterMetricsRow {
            halfwidth: 0.45,
            repolarization_slope: 0.01,
            ..clean_row()
        };
        let d = classify(&row, ClusterLabel::Mua, &t);
        assert_eq!(d.label, ClusterLabel::Noise);
        assert_eq!(d.fired, vec![Rule::WideFlatNoise]);
    }

    #[test]
    fn test_wide_but_steep_survives_band() {
        let t = wide_band();
        let row = ClusterMetricsRow {
            halfwidth: 0.45,
            repolarization_slope: 0.2,
            ..clean_row()
        };
        assert_eq!(classify(&row, ClusterLabel::Good, &t).label, ClusterLabel::Good);
    }

    #[test]
    fn test_wide_flat_inactive_without_band() {
        let t = QcThresholds::default();
        assert!(!Rule::WideFlatNoise.matches(
            &ClusterMetricsRow {
                halfwidth: 0.3,
                repolarization_slope: 0.0,
                ..clean_row()
            },
            ClusterLabel::Good,
            &t
        ));
    }

    #[test]
    fn test_mua_rescue() {
        let t = QcThresholds::default();
        let row = ClusterMetricsRow {
            isi_viol: 0.1,
            contam_rate: 10.0,
            firing_rate: 1.0,
            ..clean_row()
        };
        let d = classify(&row, ClusterLabel::Mua, &t);
        assert_eq!(d.label, ClusterLabel::Good);
        assert_eq!(d.fired, vec![Rule::MuaRescue]);
        assert_eq!(d.counts.promoted_to_good, 1);
        assert_eq!(d.counts.demoted_to_mua, 0);
    }

    #[test]
    fn test_rescue_ends_evaluation() {
        let t = QcThresholds::default();
        let row = ClusterMetricsRow {
            isi_viol: 0.2,
            contam_rate: 15.0,
            firing_rate: t.mua_fr_min,
            ..clean_row()
        };
        let d = classify(&row, ClusterLabel::Mua, &t);
        assert_eq!(d.label, ClusterLabel::Good);
        assert!(!d.fired.contains(&Rule::GoodDemotion));
    }

    #[test]
    fn test_mua_stays_mua_when_contaminated() {
        let t = QcThresholds::default();
        let row = ClusterMetricsRow { contam_rate: 40.0, ..clean_row() };
        let d = classify(&row, ClusterLabel::Mua, &t);
        assert_eq!(d.label, ClusterLabel::Mua);
        assert!(d.fired.is_empty());
    }

    #[test]
    fn test_good_demotion() {
        let t = QcThresholds::default();

        let violating = ClusterMetricsRow { isi_viol: 0.5, num_viol: 4.0, ..clean_row() };
        let d = classify(&violating, ClusterLabel::Good, &t);
        assert_eq!(d.label, ClusterLabel::Mua);
        assert_eq!(d.counts.demoted_to_mua, 1);

        let contaminated = ClusterMetricsRow { contam_rate: 16.0, ..clean_row() };
        assert_eq!(classify(&contaminated, ClusterLabel::Good, &t).label, ClusterLabel::Mua);

        // high ISI rate but only a handful of violations is tolerated
        let few = ClusterMetricsRow { isi_viol: 0.5, num_viol: 3.0, ..clean_row() };
        assert_eq!(classify(&few, ClusterLabel::Good, &t).label, ClusterLabel::Good);
    }

    #[test]
    fn test_nan_metrics_never_match() {
        let t = QcThresholds::default();
        let row = ClusterMetricsRow { contam_rate: f64::NAN, ..clean_row() };
        assert_eq!(classify(&row, ClusterLabel::Good, &t).label, ClusterLabel::Good);
        assert_eq!(classify(&row, ClusterLabel::Mua, &t).label, ClusterLabel::Mua);
    }

    #[test]
    fn test_counts_sum() {
        let a = ReclassifyCounts { demoted_to_mua: 1, promoted_to_good: 2, noise_rule_firings: 3 };
        let total: ReclassifyCounts = vec![a, a].into_iter().sum();
        assert_eq!(total, ReclassifyCounts { demoted_to_mua: 2, promoted_to_good: 4, noise_rule_firings: 6 });
    }

    #[test]
    fn test_reclassify_rejects_bad_tables() {
        let t = QcThresholds::default();
        let labels = LabelTable::default();
        assert!(matches!(
            reclassify(&[], &labels, &[], &t),
            Err(QcError::MalformedInput(_))
        ));

        let m = ClusterMetrics {
            cluster_id: 4,
            snr: 5.0,
            halfwidth: 0.2,
            repolarization_slope: 0.5,
            firing_rate: 3.0,
            isi_viol: 0.0,
            num_viol: 0.0,
            contam_rate: 0.0,
        };
        let map = [
            ChannelMapEntry { spike_count: 1, channel: 0 },
            ChannelMapEntry { spike_count: 1, channel: 2 },
        ];
        assert!(matches!(
            reclassify(&[m.clone(), m.clone()], &labels, &map, &t),
            Err(QcError::DuplicateCluster(4))
        ));
        assert!(matches!(
            reclassify(&[m], &labels, &map[..1], &t),
            Err(QcError::MissingLabel(4))
        ));
    }
}
