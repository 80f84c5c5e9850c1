use crate::error::{QcError, Result};
use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

const BYTES_PER_SAMPLE: usize = 2;

/// A raw recording file mapped into memory
pub struct MappedRecording {
    path: PathBuf,
    mmap: Mmap,
}

impl MappedRecording {
    /// Map `path` read-only. The file must not be truncated while mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(QcError::FileNotFound(path.display().to_string()));
        }
        let file = File::open(&path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        log::debug!("Mapped {} ({} bytes)", path.display(), mmap.len());
        Ok(Self { path, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Interpret the mapped bytes as a recording with the given layout.
    pub fn view(&self, num_channels: usize, sample_rate: f64, bit_volts: f64) -> Result<RawRecording<'_>> {
        RawRecording::new(&self.mmap, num_channels, sample_rate, bit_volts)
    }
}

/// Immutable view over channel-interleaved little-endian `i16` samples
#[derive(Debug, Clone, Copy)]
pub struct RawRecording<'a> {
    data: &'a [u8],
    num_channels: usize,
    sample_rate: f64,
    bit_volts: f64,
}

impl<'a> RawRecording<'a> {
    pub fn new(data: &'a [u8], num_channels: usize, sample_rate: f64, bit_volts: f64) -> Result<Self> {
        if num_channels == 0 {
            return Err(QcError::InvalidParameter(
                "num_channels must be at least 1".to_string(),
            ));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(QcError::InvalidParameter(format!(
                "sample_rate must be positive, got {}",
                sample_rate
            )));
        }
        if !bit_volts.is_finite() {
            return Err(QcError::InvalidParameter(format!(
                "bit_volts must be finite, got {}",
                bit_volts
            )));
        }
        if data.len() % BYTES_PER_SAMPLE != 0 {
            return Err(QcError::MalformedInput(format!(
                "recording has {} bytes, not a whole number of int16 samples",
                data.len()
            )));
        }

        let total = data.len() / BYTES_PER_SAMPLE;
        if total % num_channels != 0 {
            return Err(QcError::MalformedInput(format!(
                "{} samples cannot be split evenly across {} channels",
                total, num_channels
            )));
        }

        Ok(Self {
            data,
            num_channels,
            sample_rate,
            bit_volts,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn bit_volts(&self) -> f64 {
        self.bit_volts
    }

    /// Total number of stored values across all channels
    pub fn total_samples(&self) -> usize {
        self.data.len() / BYTES_PER_SAMPLE
    }

    /// Number of time points (samples per channel)
    pub fn num_samples(&self) -> usize {
        self.total_samples() / self.num_channels
    }

    pub fn duration_secs(&self) -> f64 {
        self.num_samples() as f64 / self.sample_rate
    }

    /// Raw value at time point `frame` on `channel`.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> i16 {
        let offset = (frame * self.num_channels + channel) * BYTES_PER_SAMPLE;
        LittleEndian::read_i16(&self.data[offset..offset + BYTES_PER_SAMPLE])
    }

    /// Samples `[start, end)` of one channel, scaled to physical units.
    pub fn channel_window(&self, channel: usize, start: usize, end: usize) -> Vec<f64> {
        let end = end.min(self.num_samples());
        if channel >= self.num_channels || start >= end {
            return Vec::new();
        }
        (start..end)
            .map(|frame| self.sample(frame, channel) as f64 * self.bit_volts)
            .collect()
    }
}

/// Encode samples as the little-endian byte stream `RawRecording` reads.
pub fn encode_samples(samples: &[i16]) -> Vec<u8> {
    let mut bytes = vec![0u8; samples.len() * BYTES_PER_SAMPLE];
    LittleEndian::write_i16_into(samples, &mut bytes);
    bytes
}
