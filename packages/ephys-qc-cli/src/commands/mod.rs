pub mod noise_channels;
pub mod reclassify;
pub mod thresholds;

use crate::exit_codes;
use ephys_qc::QcThresholds;
use std::path::Path;

/// Thresholds from `--config`, or the defaults. Prints the error and returns
/// an exit code on failure.
pub(crate) fn load_thresholds(config: Option<&str>) -> Result<QcThresholds, i32> {
    let thresholds = match config {
        Some(path) => QcThresholds::from_json_file(Path::new(path)),
        None => Ok(QcThresholds::default()),
    };
    thresholds.map_err(|e| {
        eprintln!("Error loading thresholds: {}", e);
        match e {
            ephys_qc::QcError::FileNotFound(_) => exit_codes::INPUT_ERROR,
            _ => exit_codes::CONFIG_ERROR,
        }
    })
}
