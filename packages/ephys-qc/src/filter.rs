//! Digital Filter Implementations
//!
//! Butterworth band-pass design in zero-pole-gain form, realised as cascaded
//! second-order sections (biquads) for numerical stability, plus zero-phase
//! forward-backward filtering.

use crate::error::{QcError, Result};
use num_complex::Complex64;
use serde::Serialize;
use std::f64::consts::PI;

/// Low cutoff of the noise-detection band (Hz)
pub const LOW_CUTOFF_HZ: f64 = 10.0;
/// Requested high cutoff of the noise-detection band (Hz)
pub const HIGH_CUTOFF_HZ: f64 = 10_000.0;
/// High cutoff used when the requested one is at or above Nyquist
pub const NYQUIST_FRACTION: f64 = 0.99;
/// Butterworth order of the noise-detection band-pass
pub const FILTER_ORDER: usize = 3;

/// Bilinear transform constant for frequencies normalised to Nyquist (2 * fs with fs = 2)
const BILINEAR_FS2: f64 = 4.0;

/// Second-order section (biquad) coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    fn response(&self, z_inv: Complex64) -> Complex64 {
        let z_inv2 = z_inv * z_inv;
        let num = self.b0 + z_inv * self.b1 + z_inv2 * self.b2;
        let den = 1.0 + z_inv * self.a1 + z_inv2 * self.a2;
        num / den
    }
}

/// State for a single biquad section (Direct Form II Transposed)
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

/// Single biquad filter section
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    state: BiquadState,
}

impl BiquadFilter {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            state: BiquadState::default(),
        }
    }

    pub fn coeffs(&self) -> BiquadCoeffs {
        self.coeffs
    }

    /// Process a single sample using Direct Form II Transposed
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.coeffs.b0 * input + self.state.z1;
        self.state.z1 = self.coeffs.b1 * input - self.coeffs.a1 * output + self.state.z2;
        self.state.z2 = self.coeffs.b2 * input - self.coeffs.a2 * output;
        output
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.state = BiquadState::default();
    }
}

/// Cascaded second-order sections filter
#[derive(Debug, Clone)]
pub struct SosFilter {
    sections: Vec<BiquadFilter>,
    gain: f64,
}

impl SosFilter {
    pub fn new(sections: Vec<BiquadCoeffs>, gain: f64) -> Self {
        Self {
            sections: sections.into_iter().map(BiquadFilter::new).collect(),
            gain,
        }
    }

    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn coefficients(&self) -> Vec<BiquadCoeffs> {
        self.sections.iter().map(BiquadFilter::coeffs).collect()
    }

    /// Process a single sample through all sections
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let mut output = input * self.gain;
        for section in &mut self.sections {
            output = section.process(output);
        }
        output
    }

    /// Process a signal and return a new array (original unchanged)
    pub fn filter(&mut self, signal: &[f64]) -> Vec<f64> {
        signal.iter().map(|&s| self.process(s)).collect()
    }

    /// Reset all section states
    pub fn reset(&mut self) {
        for section in &mut self.sections {
            section.reset();
        }
    }

    /// Samples of odd extension added to each end before forward-backward filtering.
    pub fn pad_len(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    /// Zero-phase filtering: forward pass, then backward pass over the reversed output.
    ///
    /// The signal is extended at both ends by odd reflection and each pass starts
    /// from the steady state of a step of the first input value, so edges do not
    /// ring. The padding shrinks for signals shorter than [`Self::pad_len`].
    pub fn filtfilt(&self, signal: &[f64]) -> Vec<f64> {
        let n = signal.len();
        if n == 0 {
            return Vec::new();
        }

        let pad = self.pad_len().min(n - 1);
        let extended = odd_extension(signal, pad);
        let steady = self.step_steady_state();

        let mut forward = self.clone();
        forward.load_state(&steady, extended[0]);
        let mut y = forward.filter(&extended);
        y.reverse();

        let mut backward = self.clone();
        backward.load_state(&steady, y[0]);
        let mut out = backward.filter(&y);
        out.reverse();

        out.drain(..pad);
        out.truncate(n);
        out
    }

    /// Magnitude of the frequency response at `freq_hz`.
    pub fn magnitude_at(&self, freq_hz: f64, sample_rate: f64) -> f64 {
        let omega = 2.0 * PI * freq_hz / sample_rate;
        let z_inv = Complex64::from_polar(1.0, -omega);
        self.sections
            .iter()
            .fold(Complex64::new(self.gain, 0.0), |acc, s| acc * s.coeffs.response(z_inv))
            .norm()
    }

    /// Per-section (z1, z2) reached after a unit step has settled.
    fn step_steady_state(&self) -> Vec<(f64, f64)> {
        let mut level = self.gain;
        self.sections
            .iter()
            .map(|section| {
                let c = section.coeffs;
                let out = c.dc_gain() * level;
                let z1 = out - c.b0 * level;
                let z2 = c.b2 * level - c.a2 * out;
                level = out;
                (z1, z2)
            })
            .collect()
    }

    fn load_state(&mut self, steady: &[(f64, f64)], scale: f64) {
        for (section, &(z1, z2)) in self.sections.iter_mut().zip(steady) {
            section.state = BiquadState {
                z1: z1 * scale,
                z2: z2 * scale,
            };
        }
    }
}

fn odd_extension(signal: &[f64], pad: usize) -> Vec<f64> {
    let n = signal.len();
    let first = signal[0];
    let last = signal[n - 1];

    let mut extended = Vec::with_capacity(n + 2 * pad);
    extended.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
    extended.extend_from_slice(signal);
    extended.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));
    extended
}

/// Butterworth filter designer
pub struct ButterworthFilter;

impl ButterworthFilter {
    /// Design a Butterworth band-pass filter of the given prototype order.
    ///
    /// The result has `order` sections (`2 * order` poles), with `order` zeros
    /// at DC and `order` at Nyquist.
    pub fn bandpass(low: f64, high: f64, sample_rate: f64, order: usize) -> SosFilter {
        let warped_low = Self::prewarp(low, sample_rate);
        let warped_high = Self::prewarp(high, sample_rate);
        let bandwidth = warped_high - warped_low;
        let center = (warped_low * warped_high).sqrt();

        // Low-pass prototype -> band-pass: every prototype pole splits in two
        let mut analog_poles = Vec::with_capacity(2 * order);
        for p in Self::prototype_poles(order) {
            let scaled = p * (bandwidth / 2.0);
            let offset = (scaled * scaled - center * center).sqrt();
            analog_poles.push(scaled + offset);
            analog_poles.push(scaled - offset);
        }

        // Bilinear transform; the `order` analog zeros at s = 0 map to z = 1
        let digital_poles: Vec<Complex64> = analog_poles
            .iter()
            .map(|&p| (BILINEAR_FS2 + p) / (BILINEAR_FS2 - p))
            .collect();
        let pole_product = analog_poles
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, &p| acc * (BILINEAR_FS2 - p));
        let gain = (bandwidth.powi(order as i32) * BILINEAR_FS2.powi(order as i32) / pole_product).re;

        log::debug!(
            "Butterworth band-pass {:.3}-{:.3} Hz @ {} Hz: order {}, gain {:.6e}",
            low,
            high,
            sample_rate,
            order,
            gain
        );

        SosFilter::new(Self::pair_poles(&digital_poles), gain)
    }

    /// Prewarp a frequency for the bilinear transform (Nyquist-normalised plane)
    fn prewarp(freq: f64, sample_rate: f64) -> f64 {
        BILINEAR_FS2 * (PI * freq / sample_rate).tan()
    }

    /// Poles of the analog Butterworth low-pass prototype (unit cutoff)
    fn prototype_poles(order: usize) -> Vec<Complex64> {
        let n = order as i64;
        (0..n)
            .map(|k| {
                let m = (2 * k - n + 1) as f64;
                -Complex64::from_polar(1.0, PI * m / (2.0 * n as f64))
            })
            .collect()
    }

    /// Group digital poles into biquads, each with one zero at DC and one at Nyquist.
    fn pair_poles(poles: &[Complex64]) -> Vec<BiquadCoeffs> {
        let mut sections = Vec::with_capacity(poles.len() / 2);
        let mut real = Vec::new();

        for p in poles {
            if p.im.abs() <= 1e-10 * p.norm().max(1.0) {
                real.push(p.re);
            } else if p.im > 0.0 {
                sections.push(Self::section(-2.0 * p.re, p.norm_sqr()));
            }
        }

        real.sort_by(f64::total_cmp);
        let pairs = real.chunks_exact(2);
        debug_assert!(pairs.remainder().is_empty(), "unpaired real pole");
        for pair in pairs {
            sections.push(Self::section(-(pair[0] + pair[1]), pair[0] * pair[1]));
        }

        sections
    }

    fn section(a1: f64, a2: f64) -> BiquadCoeffs {
        BiquadCoeffs {
            b0: 1.0,
            b1: 0.0,
            b2: -1.0,
            a1,
            a2,
        }
    }
}

/// Cutoffs of the noise-detection band-pass for a given sample rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandpassDesign {
    pub order: usize,
    pub low_hz: f64,
    pub high_hz: f64,
    pub nyquist_hz: f64,
    /// True when the requested high cutoff was at or above Nyquist
    pub clamped: bool,
}

impl BandpassDesign {
    pub fn for_sample_rate(sample_rate: f64) -> Result<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(QcError::InvalidParameter(format!(
                "sample_rate must be positive, got {}",
                sample_rate
            )));
        }

        let nyquist = sample_rate / 2.0;
        let requested = HIGH_CUTOFF_HZ / nyquist;
        let clamped = requested >= 1.0;
        let high_norm = if clamped { NYQUIST_FRACTION } else { requested };
        let high_hz = high_norm * nyquist;

        if LOW_CUTOFF_HZ >= high_hz {
            return Err(QcError::InvalidParameter(format!(
                "sample rate {} Hz too low for a {} Hz high-pass edge",
                sample_rate, LOW_CUTOFF_HZ
            )));
        }

        Ok(Self {
            order: FILTER_ORDER,
            low_hz: LOW_CUTOFF_HZ,
            high_hz,
            nyquist_hz: nyquist,
            clamped,
        })
    }

    /// Low cutoff as a fraction of Nyquist
    pub fn normalized_low(&self) -> f64 {
        self.low_hz / self.nyquist_hz
    }

    /// High cutoff as a fraction of Nyquist
    pub fn normalized_high(&self) -> f64 {
        self.high_hz / self.nyquist_hz
    }

    pub fn sample_rate(&self) -> f64 {
        2.0 * self.nyquist_hz
    }

    pub fn build(&self) -> SosFilter {
        ButterworthFilter::bandpass(self.low_hz, self.high_hz, self.sample_rate(), self.order)
    }
}
