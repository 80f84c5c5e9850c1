pub mod clusters;
pub mod error;
pub mod filter;
pub mod io;
pub mod noise;
pub mod reclassify;
pub mod recording;
pub mod stats;
pub mod thresholds;
pub mod timing;

pub use clusters::{ChannelMapEntry, ClusterLabel, ClusterMetrics, ClusterMetricsRow, LabelEntry, LabelTable};
pub use error::{QcError, Result};
pub use filter::BandpassDesign;
pub use noise::{AnalysisWindow, ChannelNoiseMask, NoiseChannelDetector, NoiseReport};
pub use reclassify::{reclassify, ClusterAssignment, LabelTotals, Reclassification, ReclassifyCounts, Rule};
pub use recording::{MappedRecording, RawRecording};
pub use thresholds::QcThresholds;
pub use timing::StageTimer;
