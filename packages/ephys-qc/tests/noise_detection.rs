use ephys_qc::recording::encode_samples;
use ephys_qc::{MappedRecording, NoiseChannelDetector, QcError, QcThresholds, RawRecording};
use std::io::Write;

const BIT_VOLTS: f64 = 0.195;

/// Deterministic pseudo-random samples in `[-amplitude, amplitude]`
fn lcg_noise(seed: u64, len: usize, amplitude: i16) -> Vec<i16> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let unit = ((state >> 33) as f64) / ((1u64 << 31) as f64);
            ((unit * 2.0 - 1.0) * amplitude as f64) as i16
        })
        .collect()
}

/// Interleave per-channel traces into frame-major int16 bytes
fn interleave(channels: &[Vec<i16>]) -> Vec<u8> {
    let frames = channels[0].len();
    let mut samples = Vec::with_capacity(frames * channels.len());
    for frame in 0..frames {
        for channel in channels {
            samples.push(channel[frame]);
        }
    }
    encode_samples(&samples)
}

fn one_second_window() -> QcThresholds {
    QcThresholds {
        noise_delay: 0.0,
        noise_interval: 1.0,
        ..QcThresholds::default()
    }
}

#[test]
fn test_single_loud_channel_is_flagged() {
    let sample_rate = 2000.0;
    let frames = 2000;
    let channels: Vec<Vec<i16>> = (0..16)
        .map(|ch| {
            let amplitude = if ch == 8 { 2000 } else { 50 };
            lcg_noise(ch as u64 + 1, frames, amplitude)
        })
        .collect();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&interleave(&channels)).unwrap();
    file.flush().unwrap();

    let mapped = MappedRecording::open(file.path()).unwrap();
    let recording = mapped.view(16, sample_rate, BIT_VOLTS).unwrap();
    let report = NoiseChannelDetector::detect(&recording, &one_second_window()).unwrap();

    assert_eq!(report.mask.len(), 16);
    assert_eq!(report.mask.noisy_channels(), vec![8]);
    assert_eq!(report.noisy_count(), 1);
    assert!(report.rms[8] > 10.0 * report.rms[7]);
    assert_eq!(report.window.start_sample, 0);
    assert_eq!(report.window.end_sample, 2000);
    assert!(!report.window.clipped);
}

#[test]
fn test_silent_recording_has_no_noise_channels() {
    let bytes = vec![0u8; 8 * 1000 * 2];
    let recording = RawRecording::new(&bytes, 8, 1000.0, BIT_VOLTS).unwrap();
    let report = NoiseChannelDetector::detect(&recording, &one_second_window()).unwrap();

    assert_eq!(report.noisy_count(), 0);
    assert!(report.rms.iter().all(|&r| r == 0.0));
    assert!((0..8).all(|ch| report.mask.is_usable(ch)));
}

#[test]
fn test_short_recording_clips_window() {
    // 12 s at 1 kHz: default window 5..15 s becomes 5..12 s
    let sample_rate = 1000.0;
    let channels: Vec<Vec<i16>> = (0..4).map(|ch| lcg_noise(ch + 7, 12_000, 40)).collect();
    let bytes = interleave(&channels);
    let recording = RawRecording::new(&bytes, 4, sample_rate, BIT_VOLTS).unwrap();

    let report = NoiseChannelDetector::detect(&recording, &QcThresholds::default()).unwrap();
    assert!(report.window.clipped);
    assert_eq!(report.window.start_sample, 5000);
    assert_eq!(report.window.end_sample, 12_000);
    assert_eq!(report.filter.high_hz, 0.99 * 500.0);
}

#[test]
fn test_recording_shorter_than_delay_is_an_error() {
    let bytes = vec![0u8; 4 * 4000 * 2];
    let recording = RawRecording::new(&bytes, 4, 1000.0, BIT_VOLTS).unwrap();

    let err = NoiseChannelDetector::detect(&recording, &QcThresholds::default()).unwrap_err();
    assert!(matches!(
        err,
        QcError::EmptyAnalysisWindow {
            start: 5000,
            available: 4000
        }
    ));
}

#[test]
fn test_reference_channels_forced_noisy() {
    let bytes = vec![0u8; 8 * 1000 * 2];
    let recording = RawRecording::new(&bytes, 8, 1000.0, BIT_VOLTS).unwrap();
    let report = NoiseChannelDetector::detect(&recording, &one_second_window()).unwrap();

    let masked = report.mask.with_forced_noisy(&[2, 5]).unwrap();
    assert_eq!(masked.noisy_channels(), vec![2, 5]);
    assert_eq!(report.mask.noisy_count(), 0);
    assert!(report.mask.with_forced_noisy(&[8]).is_err());
}
