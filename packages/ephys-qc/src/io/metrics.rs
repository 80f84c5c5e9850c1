//! Cluster metrics CSVs.
//!
//! The base metrics table may lack waveform columns (e.g. when the waveform
//! module ran separately); in that case the waveform-metrics table is joined
//! on `cluster_id` before rows are built.

use crate::clusters::ClusterMetrics;
use crate::error::{QcError, Result};
use crate::io::parse_cluster_id;
use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use std::path::Path;

pub const REQUIRED_COLUMNS: [&str; 8] = [
    "cluster_id",
    "snr",
    "halfwidth",
    "repolarization_slope",
    "firing_rate",
    "isi_viol",
    "num_viol",
    "contam_rate",
];

/// Column present in the base table only when waveform metrics were merged upstream
const WAVEFORM_MARKER_COLUMN: &str = "snr";

struct CsvTable {
    name: String,
    columns: HashMap<String, usize>,
    records: Vec<StringRecord>,
}

impl CsvTable {
    fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(QcError::FileNotFound(path.display().to_string()));
        }

        let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
        let columns = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_string(), i))
            .collect();
        let records = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            name: path.display().to_string(),
            columns,
            records,
        })
    }

    fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    fn get<'r>(&self, record: &'r StringRecord, column: &str) -> Option<&'r str> {
        self.columns.get(column).and_then(|&i| record.get(i))
    }
}

/// Read cluster metrics, merging waveform metrics when the base table has no `snr`.
pub fn read_cluster_metrics(
    metrics_path: &Path,
    waveform_metrics_path: Option<&Path>,
) -> Result<Vec<ClusterMetrics>> {
    let base = CsvTable::read(metrics_path)?;
    require_column(&base, "cluster_id")?;

    let waveform = if base.has_column(WAVEFORM_MARKER_COLUMN) {
        None
    } else {
        match waveform_metrics_path {
            Some(path) => {
                log::info!(
                    "'{}' has no {} column; merging {}",
                    base.name,
                    WAVEFORM_MARKER_COLUMN,
                    path.display()
                );
                let table = CsvTable::read(path)?;
                require_column(&table, "cluster_id")?;
                Some(table)
            }
            None => {
                return Err(QcError::MissingColumn {
                    column: WAVEFORM_MARKER_COLUMN.to_string(),
                    source_name: base.name.clone(),
                })
            }
        }
    };

    let merged_name = match &waveform {
        Some(w) => format!("{} + {}", base.name, w.name),
        None => base.name.clone(),
    };
    for column in REQUIRED_COLUMNS {
        let present = base.has_column(column) || waveform.as_ref().is_some_and(|w| w.has_column(column));
        if !present {
            return Err(QcError::MissingColumn {
                column: column.to_string(),
                source_name: merged_name,
            });
        }
    }

    let waveform_rows = match &waveform {
        Some(table) => Some(index_by_cluster(table)?),
        None => None,
    };

    let mut rows = Vec::with_capacity(base.records.len());
    for (line, record) in base.records.iter().enumerate() {
        let cluster_id = parse_cluster_id(base.get(record, "cluster_id").unwrap_or(""))?;

        // Inner join: base rows without waveform metrics are dropped
        let partner = match (&waveform, &waveform_rows) {
            (Some(table), Some(index)) => match index.get(&cluster_id) {
                Some(&i) => Some((table, &table.records[i])),
                None => {
                    log::debug!("cluster {} has no waveform metrics; dropped", cluster_id);
                    continue;
                }
            },
            _ => None,
        };

        let value = |column: &str| -> Result<f64> {
            let raw = base
                .get(record, column)
                .or_else(|| partner.and_then(|(t, r)| t.get(r, column)))
                .unwrap_or("");
            parse_metric(raw, column, line + 2)
        };

        rows.push(ClusterMetrics {
            cluster_id,
            snr: value("snr")?,
            halfwidth: value("halfwidth")?,
            repolarization_slope: value("repolarization_slope")?,
            firing_rate: value("firing_rate")?,
            isi_viol: value("isi_viol")?,
            num_viol: value("num_viol")?,
            contam_rate: value("contam_rate")?,
        });
    }

    log::debug!("Read {} metrics rows from {}", rows.len(), merged_name);
    Ok(rows)
}

fn require_column(table: &CsvTable, column: &str) -> Result<()> {
    if table.has_column(column) {
        Ok(())
    } else {
        Err(QcError::MissingColumn {
            column: column.to_string(),
            source_name: table.name.clone(),
        })
    }
}

fn index_by_cluster(table: &CsvTable) -> Result<HashMap<u32, usize>> {
    let mut index = HashMap::with_capacity(table.records.len());
    for (i, record) in table.records.iter().enumerate() {
        let id = parse_cluster_id(table.get(record, "cluster_id").unwrap_or(""))?;
        if index.insert(id, i).is_some() {
            return Err(QcError::DuplicateCluster(id));
        }
    }
    Ok(index)
}

/// Empty cells read as NaN, which fails every threshold comparison.
fn parse_metric(raw: &str, column: &str, line: usize) -> Result<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(f64::NAN);
    }
    trimmed.parse::<f64>().map_err(|_| {
        QcError::MalformedInput(format!(
            "line {}: column '{}' has non-numeric value '{}'",
            line, column, raw
        ))
    })
}
