//! Tab-separated cluster label tables (`cluster_group.tsv`).

use crate::clusters::{ClusterLabel, LabelEntry, LabelTable};
use crate::error::{QcError, Result};
use crate::io::{parse_cluster_id, replace_file};
use csv::{ReaderBuilder, WriterBuilder};
use std::path::{Path, PathBuf};

const ID_COLUMN: &str = "cluster_id";
const GROUP_COLUMN: &str = "group";
const ORIGINAL_GROUP_COLUMN: &str = "original_group";

pub fn read_label_table(path: &Path) -> Result<LabelTable> {
    if !path.exists() {
        return Err(QcError::FileNotFound(path.display().to_string()));
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| QcError::MissingColumn {
                column: name.to_string(),
                source_name: path.display().to_string(),
            })
    };
    let id_idx = column(ID_COLUMN)?;
    let group_idx = column(GROUP_COLUMN)?;

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record?;
        let id = record.get(id_idx).unwrap_or("");
        let group = record.get(group_idx).unwrap_or("");
        entries.push(LabelEntry {
            cluster_id: parse_cluster_id(id)?,
            group: group.parse::<ClusterLabel>()?,
        });
    }

    log::debug!("Read {} labels from {}", entries.len(), path.display());
    Ok(LabelTable::new(entries))
}

/// Overwrite `path` with `cluster_id` / `group` rows.
pub fn write_label_table(path: &Path, entries: &[LabelEntry]) -> Result<()> {
    write_table(path, GROUP_COLUMN, entries)
}

/// `cluster_group.tsv` -> `cluster_group_original.tsv`
pub fn original_copy_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}_original.tsv", stem))
}

/// Save the labels as they were before reclassification. Returns the copy's path.
pub fn write_original_copy(path: &Path, table: &LabelTable) -> Result<PathBuf> {
    let copy_path = original_copy_path(path);
    write_table(&copy_path, ORIGINAL_GROUP_COLUMN, table.entries())?;
    Ok(copy_path)
}

fn write_table(path: &Path, group_column: &str, entries: &[LabelEntry]) -> Result<()> {
    replace_file(path, |file| {
        let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(file);
        writer.write_record([ID_COLUMN, group_column])?;
        for entry in entries {
            writer.write_record([entry.cluster_id.to_string(), entry.group.to_string()])?;
        }
        writer.flush()?;
        Ok(())
    })
}
