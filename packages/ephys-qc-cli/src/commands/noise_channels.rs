use crate::cli::NoiseChannelsArgs;
use crate::commands::load_thresholds;
use crate::exit_codes;
use crate::output;
use chrono::{DateTime, Utc};
use ephys_qc::{AnalysisWindow, BandpassDesign, MappedRecording, NoiseChannelDetector, StageTimer};
use serde::Serialize;

#[derive(Serialize)]
struct NoiseChannelsOutput {
    file: String,
    num_channels: usize,
    /// Per-channel usability after reference channels are masked
    usable: Vec<bool>,
    /// Channels to exclude from sorting
    mask_channels: Vec<usize>,
    /// Channels flagged by the detector alone
    noise_channel_count: usize,
    window: AnalysisWindow,
    filter: BandpassDesign,
    rms: Vec<f64>,
    execution_time: f64,
    created_at: DateTime<Utc>,
}

pub fn execute(args: NoiseChannelsArgs) -> i32 {
    let timer = StageTimer::new("noise-channels");

    let mut thresholds = match load_thresholds(args.config.as_deref()) {
        Ok(t) => t,
        Err(code) => return code,
    };
    if let Some(delay) = args.noise_delay {
        thresholds.noise_delay = delay;
    }
    if let Some(interval) = args.noise_interval {
        thresholds.noise_interval = interval;
    }
    if let Some(threshold) = args.noise_threshold {
        thresholds.noise_threshold = threshold;
    }
    if let Err(e) = thresholds.validate() {
        eprintln!("Error: {}", e);
        return exit_codes::INPUT_ERROR;
    }

    let mapped = match MappedRecording::open(&args.file) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };
    let recording = match mapped.view(args.num_channels, args.sample_rate, args.bit_volts) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };

    if !args.quiet {
        eprintln!("Detecting noise channels in {}...", args.file);
        eprintln!(
            "  {} channels, {:.1} s at {} Hz",
            recording.num_channels(),
            recording.duration_secs(),
            recording.sample_rate()
        );
        eprintln!(
            "  Window: {} s + {} s, threshold {} µV",
            thresholds.noise_delay, thresholds.noise_interval, thresholds.noise_threshold
        );
    }

    let report = match NoiseChannelDetector::detect(&recording, &thresholds) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Noise detection failed: {}", e);
            return exit_codes::for_error(&e);
        }
    };

    let mask = match report.mask.with_forced_noisy(&args.reference_channels) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let result = NoiseChannelsOutput {
        file: args.file.clone(),
        num_channels: recording.num_channels(),
        usable: mask.as_slice().to_vec(),
        mask_channels: mask.noisy_channels(),
        noise_channel_count: report.noisy_count(),
        window: report.window,
        filter: report.filter,
        rms: report.rms,
        execution_time: timer.elapsed_secs(),
        created_at: Utc::now(),
    };

    if let Err(code) = output::emit(&result, args.compact, args.output.as_deref()) {
        return code;
    }

    if !args.quiet {
        eprintln!(
            "{} noise channels, {} masked in total",
            result.noise_channel_count,
            result.mask_channels.len()
        );
        if let Some(ref path) = args.output {
            eprintln!("Results written to {}", path);
        }
    }

    exit_codes::SUCCESS
}
