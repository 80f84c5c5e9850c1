//! Readers and writers for the files surrounding the QC stage: Kilosort label
//! tables, metrics CSVs, and NumPy cluster tables.

pub mod labels;
pub mod metrics;
pub mod npy;
pub mod versioned;

use crate::error::{QcError, Result};
use std::fs::File;
use std::path::Path;

/// Parse a cluster id written either as an integer or as an integral float.
pub(crate) fn parse_cluster_id(raw: &str) -> Result<u32> {
    let trimmed = raw.trim();
    if let Ok(id) = trimmed.parse::<u32>() {
        return Ok(id);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v >= 0.0 && v <= u32::MAX as f64 => Ok(v as u32),
        _ => Err(QcError::MalformedInput(format!(
            "invalid cluster_id '{}'",
            raw
        ))),
    }
}

/// Write a file through a temporary sibling and rename it into place, so a
/// failed write never leaves `path` half-written.
pub(crate) fn replace_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| QcError::InvalidParameter(format!("not a file path: {}", path.display())))?;
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let mut file = File::create(&tmp_path)?;
    if let Err(e) = write(&mut file).and_then(|_| file.sync_all().map_err(QcError::from)) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }
    drop(file);

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
