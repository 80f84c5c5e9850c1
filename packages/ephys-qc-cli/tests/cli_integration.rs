use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn ephys_qc() -> Command {
    let mut cmd = Command::cargo_bin("ephys-qc").unwrap();
    cmd.env_remove("EPHYS_QC_CONFIG");
    cmd
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    let stdout = String::from_utf8(output.stdout.clone()).unwrap();
    serde_json::from_str(&stdout).unwrap()
}

/// `channels` x `frames` int16 recording; `loud` gets a large square wave
fn write_recording(path: &Path, channels: usize, frames: usize, loud: Option<usize>) {
    let mut bytes = Vec::with_capacity(channels * frames * 2);
    for frame in 0..frames {
        for ch in 0..channels {
            let value: i16 = match loud {
                Some(l) if l == ch => {
                    if (frame / 5) % 2 == 0 {
                        3000
                    } else {
                        -3000
                    }
                }
                _ => ((frame * 7 + ch * 13) % 21) as i16 - 10,
            };
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    std::fs::write(path, bytes).unwrap();
}

fn write_npy_u32(path: &Path, rows: &[[u32; 2]]) {
    let mut header = format!(
        "{{'descr': '<u4', 'fortran_order': False, 'shape': ({}, 2), }}",
        rows.len()
    );
    while (10 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');

    let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for row in rows {
        for v in row {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
    }
    std::fs::write(path, bytes).unwrap();
}

/// Kilosort folder with three clusters: good stays good, mua promoted, good -> noise
fn write_kilosort_dir(dir: &Path) {
    std::fs::write(
        dir.join("cluster_group.tsv"),
        "cluster_id\tgroup\n0\tgood\n1\tmua\n2\tgood\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("metrics.csv"),
        "cluster_id,firing_rate,isi_viol,num_viol,contam_rate,snr,halfwidth,repolarization_slope\n\
         0,2.0,0.0,0,1.0,4.0,0.2,0.5\n\
         1,3.0,0.1,1,5.0,4.0,0.2,0.5\n\
         2,3.0,0.0,0,1.0,0.5,0.2,0.5\n",
    )
    .unwrap();
    write_npy_u32(&dir.join("clus_Table.npy"), &[[100, 4], [100, 8], [100, 12]]);
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    ephys_qc()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    ephys_qc()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ephys-qc"));
}

#[test]
fn test_help_lists_subcommands() {
    ephys_qc()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("noise-channels"))
        .stdout(predicate::str::contains("reclassify"))
        .stdout(predicate::str::contains("thresholds"));
}

// =============================================================================
// THRESHOLDS SUBCOMMAND
// =============================================================================

#[test]
fn test_thresholds_defaults() {
    ephys_qc()
        .arg("thresholds")
        .assert()
        .success()
        .stdout(predicate::str::contains("built-in defaults"))
        .stdout(predicate::str::contains("depth_max"));
}

#[test]
fn test_thresholds_json_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("qc.json");
    std::fs::write(&config, r#"{"snr_min": 3.5, "depth": 2800}"#).unwrap();

    let output = ephys_qc()
        .arg("thresholds")
        .arg("--config")
        .arg(&config)
        .arg("--json")
        .assert()
        .success();

    let parsed = stdout_json(output.get_output());
    assert_eq!(parsed["snr_min"], 3.5);
    assert_eq!(parsed["depth_max"], 2800.0);
    assert_eq!(parsed["noise_threshold"], 20.0);
}

#[test]
fn test_thresholds_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("qc.json");
    std::fs::write(&config, "{ not json").unwrap();

    ephys_qc()
        .arg("thresholds")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .code(3);
}

// =============================================================================
// NOISE-CHANNELS SUBCOMMAND
// =============================================================================

#[test]
fn test_noise_channels_flags_loud_channel() {
    let dir = tempfile::tempdir().unwrap();
    let rec = dir.path().join("continuous.dat");
    write_recording(&rec, 12, 1000, Some(6));

    let output = ephys_qc()
        .args(["noise-channels", "--file"])
        .arg(&rec)
        .args(["--num-channels", "12", "--sample-rate", "1000", "--bit-volts", "0.195"])
        .args(["--noise-delay", "0", "--noise-interval", "1"])
        .args(["--reference-channels", "0", "--quiet", "--compact"])
        .assert()
        .success();

    let parsed = stdout_json(output.get_output());
    assert_eq!(parsed["num_channels"], 12);
    assert_eq!(parsed["noise_channel_count"], 1);
    assert_eq!(parsed["mask_channels"], serde_json::json!([0, 6]));
    assert_eq!(parsed["usable"].as_array().unwrap().len(), 12);
    assert_eq!(parsed["usable"][6], false);
    assert_eq!(parsed["window"]["end_sample"], 1000);
    assert_eq!(parsed["filter"]["clamped"], true);
    assert!(parsed.get("created_at").is_some());
}

#[test]
fn test_noise_channels_writes_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let rec = dir.path().join("continuous.dat");
    let out = dir.path().join("noise.json");
    write_recording(&rec, 4, 1000, None);

    ephys_qc()
        .args(["noise-channels", "--file"])
        .arg(&rec)
        .args(["--num-channels", "4", "--sample-rate", "1000", "--bit-volts", "0.195"])
        .args(["--noise-delay", "0", "--noise-interval", "1", "--output"])
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("Results written to"));

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(parsed["mask_channels"], serde_json::json!([]));
}

#[test]
fn test_noise_channels_nonexistent_file() {
    ephys_qc()
        .args(["noise-channels", "--file", "/nonexistent/continuous.dat"])
        .args(["--num-channels", "4", "--sample-rate", "1000", "--bit-volts", "0.195"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_noise_channels_recording_shorter_than_delay() {
    let dir = tempfile::tempdir().unwrap();
    let rec = dir.path().join("continuous.dat");
    write_recording(&rec, 4, 2000, None);

    ephys_qc()
        .args(["noise-channels", "--file"])
        .arg(&rec)
        .args(["--num-channels", "4", "--sample-rate", "1000", "--bit-volts", "0.195"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("window is empty"));
}

#[test]
fn test_noise_channels_uneven_channel_count() {
    let dir = tempfile::tempdir().unwrap();
    let rec = dir.path().join("continuous.dat");
    write_recording(&rec, 3, 100, None);

    ephys_qc()
        .args(["noise-channels", "--file"])
        .arg(&rec)
        .args(["--num-channels", "4", "--sample-rate", "1000", "--bit-volts", "0.195"])
        .assert()
        .failure()
        .code(2);
}

// =============================================================================
// RECLASSIFY SUBCOMMAND
// =============================================================================

#[test]
fn test_reclassify_rewrites_labels() {
    let dir = tempfile::tempdir().unwrap();
    write_kilosort_dir(dir.path());

    let output = ephys_qc()
        .arg("reclassify")
        .arg("--kilosort-dir")
        .arg(dir.path())
        .arg("--metrics")
        .arg(dir.path().join("metrics.csv"))
        .arg("--quiet")
        .assert()
        .success();

    let parsed = stdout_json(output.get_output());
    assert_eq!(parsed["counts"]["promoted_to_good"], 1);
    assert_eq!(parsed["counts"]["noise_rule_firings"], 1);
    assert_eq!(parsed["totals"]["good"], 2);
    assert_eq!(parsed["changed"], 2);
    assert_eq!(parsed["assignments"][2]["label"], "noise");
    assert_eq!(parsed["assignments"][2]["fired"], serde_json::json!(["hard_noise"]));

    assert_eq!(
        std::fs::read_to_string(dir.path().join("cluster_group.tsv")).unwrap(),
        "cluster_id\tgroup\n0\tgood\n1\tgood\n2\tnoise\n"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("cluster_group_original.tsv")).unwrap(),
        "cluster_id\toriginal_group\n0\tgood\n1\tmua\n2\tgood\n"
    );
}

#[test]
fn test_reclassify_dry_run_leaves_labels() {
    let dir = tempfile::tempdir().unwrap();
    write_kilosort_dir(dir.path());

    let output = ephys_qc()
        .arg("reclassify")
        .arg("--kilosort-dir")
        .arg(dir.path())
        .arg("--metrics")
        .arg(dir.path().join("metrics.csv"))
        .arg("--dry-run")
        .assert()
        .success()
        .stderr(predicate::str::contains("Dry run"));

    let parsed = stdout_json(output.get_output());
    assert_eq!(parsed["dry_run"], true);
    assert!(parsed["original_copy"].is_null());
    assert!(!dir.path().join("cluster_group_original.tsv").exists());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("cluster_group.tsv")).unwrap(),
        "cluster_id\tgroup\n0\tgood\n1\tmua\n2\tgood\n"
    );
}

#[test]
fn test_reclassify_missing_label_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_kilosort_dir(dir.path());
    std::fs::write(
        dir.path().join("cluster_group.tsv"),
        "cluster_id\tgroup\n0\tgood\n1\tmua\n",
    )
    .unwrap();

    ephys_qc()
        .arg("reclassify")
        .arg("--kilosort-dir")
        .arg(dir.path())
        .arg("--metrics")
        .arg(dir.path().join("metrics.csv"))
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("No label found for cluster 2"));

    assert!(!dir.path().join("cluster_group_original.tsv").exists());
}

#[test]
fn test_reclassify_missing_snr_without_waveform_metrics() {
    let dir = tempfile::tempdir().unwrap();
    write_kilosort_dir(dir.path());
    std::fs::write(
        dir.path().join("metrics.csv"),
        "cluster_id,firing_rate,isi_viol,num_viol,contam_rate\n0,2.0,0.0,0,1.0\n",
    )
    .unwrap();

    ephys_qc()
        .arg("reclassify")
        .arg("--kilosort-dir")
        .arg(dir.path())
        .arg("--metrics")
        .arg(dir.path().join("metrics.csv"))
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("snr"));
}

#[test]
fn test_reclassify_nonexistent_dir() {
    ephys_qc()
        .args(["reclassify", "--kilosort-dir", "/nonexistent/ks", "--metrics", "m.csv"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("not found"));
}
