use crate::cli::ReclassifyArgs;
use crate::commands::load_thresholds;
use crate::exit_codes;
use crate::output;
use chrono::{DateTime, Utc};
use ephys_qc::io::labels::{read_label_table, write_label_table, write_original_copy};
use ephys_qc::io::metrics::read_cluster_metrics;
use ephys_qc::io::npy::read_cluster_table;
use ephys_qc::io::versioned::latest_version;
use ephys_qc::{
    reclassify, ClusterAssignment, LabelTotals, QcError, ReclassifyCounts, StageTimer,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct ReclassifyOutput {
    kilosort_dir: String,
    cluster_group_file: String,
    /// `None` on a dry run
    original_copy: Option<String>,
    metrics_file: String,
    metrics_version: u32,
    waveform_metrics_file: Option<String>,
    dry_run: bool,
    counts: ReclassifyCounts,
    totals: LabelTotals,
    changed: usize,
    assignments: Vec<ClusterAssignment>,
    execution_time: f64,
    created_at: DateTime<Utc>,
}

pub fn execute(args: ReclassifyArgs) -> i32 {
    let timer = StageTimer::new("reclassify");

    let thresholds = match load_thresholds(args.config.as_deref()) {
        Ok(t) => t,
        Err(code) => return code,
    };

    let kilosort_dir = Path::new(&args.kilosort_dir);
    if !kilosort_dir.is_dir() {
        eprintln!("Error: Kilosort directory not found: {}", args.kilosort_dir);
        return exit_codes::INPUT_ERROR;
    }
    let label_path = kilosort_dir.join(&args.cluster_group_file);
    let table_path = kilosort_dir.join(&args.cluster_table);

    let inputs = match resolve_inputs(&args) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };

    if !args.quiet {
        eprintln!("Reclassifying clusters in {}...", args.kilosort_dir);
        eprintln!(
            "  Metrics: {} (version {})",
            inputs.metrics.display(),
            inputs.metrics_version
        );
        if let Some(ref waveform) = inputs.waveform_metrics {
            eprintln!("  Waveform metrics: {}", waveform.display());
        }
    }

    // Everything is read and evaluated before any file is touched
    let loaded = read_label_table(&label_path).and_then(|labels| {
        let metrics = read_cluster_metrics(&inputs.metrics, inputs.waveform_metrics.as_deref())?;
        let channel_map = read_cluster_table(&table_path)?;
        let result = reclassify(&metrics, &labels, &channel_map, &thresholds)?;
        Ok((labels, result))
    });
    let (labels, result) = match loaded {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Reclassification failed: {}", e);
            return exit_codes::for_error(&e);
        }
    };

    let original_copy = if args.dry_run {
        None
    } else {
        let written = write_original_copy(&label_path, &labels)
            .and_then(|copy| write_label_table(&label_path, &result.final_labels()).map(|_| copy));
        match written {
            Ok(copy) => Some(copy.display().to_string()),
            Err(e) => {
                eprintln!("Failed to write labels: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    };

    let manifest = ReclassifyOutput {
        kilosort_dir: args.kilosort_dir.clone(),
        cluster_group_file: label_path.display().to_string(),
        original_copy,
        metrics_file: inputs.metrics.display().to_string(),
        metrics_version: inputs.metrics_version,
        waveform_metrics_file: inputs.waveform_metrics.map(|p| p.display().to_string()),
        dry_run: args.dry_run,
        counts: result.counts,
        totals: result.totals,
        changed: result.changed_count(),
        assignments: result.assignments,
        execution_time: timer.elapsed_secs(),
        created_at: Utc::now(),
    };

    if let Err(code) = output::emit(&manifest, args.compact, args.output.as_deref()) {
        return code;
    }

    if !args.quiet {
        eprintln!(
            "good -> mua: {}, mua -> good: {}, noise rule firings: {}",
            manifest.counts.demoted_to_mua,
            manifest.counts.promoted_to_good,
            manifest.counts.noise_rule_firings
        );
        if args.dry_run {
            eprintln!("Dry run: {} left unchanged", manifest.cluster_group_file);
        }
        if let Some(ref path) = args.output {
            eprintln!("Manifest written to {}", path);
        }
    }

    exit_codes::SUCCESS
}

struct ResolvedInputs {
    metrics: PathBuf,
    metrics_version: u32,
    waveform_metrics: Option<PathBuf>,
}

/// Pick the newest version of each metrics file.
fn resolve_inputs(args: &ReclassifyArgs) -> Result<ResolvedInputs, QcError> {
    let (metrics, metrics_version) = latest_version(Path::new(&args.metrics))?;
    let waveform_metrics = match &args.waveform_metrics {
        Some(path) => Some(latest_version(Path::new(path))?.0),
        None => None,
    };
    Ok(ResolvedInputs {
        metrics,
        metrics_version,
        waveform_metrics,
    })
}
