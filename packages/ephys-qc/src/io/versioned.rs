//! Versioned output files: `metrics.csv`, `metrics_1.csv`, `metrics_2.csv`, ...

use crate::error::{QcError, Result};
use glob::Pattern;
use std::path::{Path, PathBuf};

/// Newest existing version of `path` and its version number.
///
/// Falls back to `(path, 0)` when no `_N` sibling exists, whether or not
/// `path` itself exists.
pub fn latest_version(path: &Path) -> Result<(PathBuf, u32)> {
    let (Some(stem), Some(dir)) = (path.file_stem().and_then(|s| s.to_str()), path.parent()) else {
        return Err(QcError::InvalidParameter(format!(
            "not a file path: {}",
            path.display()
        )));
    };
    let extension = path.extension().and_then(|e| e.to_str());

    let dir_pattern = Pattern::escape(&dir.to_string_lossy());
    let name_pattern = match extension {
        Some(ext) => format!("{}_*.{}", Pattern::escape(stem), Pattern::escape(ext)),
        None => format!("{}_*", Pattern::escape(stem)),
    };
    let pattern = if dir_pattern.is_empty() {
        name_pattern
    } else {
        format!("{}/{}", dir_pattern, name_pattern)
    };

    let entries = glob::glob(&pattern)
        .map_err(|e| QcError::InvalidParameter(format!("bad file pattern '{}': {}", pattern, e)))?;

    let mut latest = (path.to_path_buf(), 0u32);
    for candidate in entries.flatten() {
        let Some(version) = version_of(&candidate, stem) else {
            continue;
        };
        if version > latest.1 {
            latest = (candidate, version);
        }
    }

    if latest.1 > 0 {
        log::debug!("Using {} (version {})", latest.0.display(), latest.1);
    }
    Ok(latest)
}

fn version_of(candidate: &Path, stem: &str) -> Option<u32> {
    candidate
        .file_stem()?
        .to_str()?
        .strip_prefix(stem)?
        .strip_prefix('_')?
        .parse()
        .ok()
}
