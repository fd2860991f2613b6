//! MFCC-style audio fingerprints and the shared similarity metric.
//!
//! A fingerprint is a `(N_COEFFS, frames)` matrix: Hann-windowed STFT
//! power spectrum, Slaney-style mel filterbank, log energies, orthonormal
//! DCT-II, first `N_COEFFS` coefficients kept. The frame count varies with
//! the window length; the frame hop is fixed, which is what lets callers
//! derive a template's duration from its frame count.

use std::f32::consts::PI;
use std::sync::Arc;

use ndarray::Array2;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use thiserror::Error;

/// Number of coefficients kept per frame.
pub const N_COEFFS: usize = 13;

/// FFT size.
pub const N_FFT: usize = 2048;

/// Frame hop in samples. Template durations are derived from this.
pub const FRAME_HOP: usize = 512;

/// Mel filterbank size.
const N_MELS: usize = 40;

/// Additive guard before taking logs.
const LOG_GUARD: f32 = 1e-10;

/// Errors from fingerprint computation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("empty audio input")]
    EmptyInput,
}

/// Computes fingerprints for one sample rate.
///
/// The mel filterbank depends on the sample rate, so the extractor is
/// constructed once per rate and reused across windows.
pub struct Fingerprinter {
    sample_rate: u32,
    window: Vec<f32>,
    mel_basis: Array2<f32>,
    dct_basis: Array2<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl Fingerprinter {
    /// Create a fingerprinter for the given sample rate.
    pub fn new(sample_rate: u32) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            sample_rate,
            window: hann_window(N_FFT),
            mel_basis: mel_filterbank(sample_rate),
            dct_basis: dct_basis(),
            fft: planner.plan_fft_forward(N_FFT),
        }
    }

    /// The sample rate this extractor was built for.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Compute the fingerprint of a mono sample buffer.
    ///
    /// Deterministic: identical input yields an identical matrix.
    pub fn compute(&self, samples: &[f32]) -> Result<Array2<f32>, FingerprintError> {
        if samples.is_empty() {
            return Err(FingerprintError::EmptyInput);
        }

        let power = self.power_spectrogram(samples);
        let mel = self.mel_basis.dot(&power);
        let log_mel = mel.mapv(|x| (x + LOG_GUARD).ln());
        Ok(self.dct_basis.dot(&log_mel))
    }

    /// Centered STFT power spectrum, `(N_FFT/2 + 1, frames)`.
    fn power_spectrogram(&self, samples: &[f32]) -> Array2<f32> {
        let pad = N_FFT / 2;
        let mut padded = vec![0.0f32; pad];
        padded.extend_from_slice(samples);
        padded.extend(std::iter::repeat(0.0).take(pad));

        let num_frames = (padded.len() - N_FFT) / FRAME_HOP + 1;
        let freq_bins = N_FFT / 2 + 1;
        let mut spectrogram = Array2::<f32>::zeros((freq_bins, num_frames));

        let mut frame = vec![Complex::new(0.0f32, 0.0); N_FFT];
        for frame_idx in 0..num_frames {
            let start = frame_idx * FRAME_HOP;
            for i in 0..N_FFT {
                frame[i] = Complex::new(padded[start + i] * self.window[i], 0.0);
            }

            self.fft.process(&mut frame);
            for k in 0..freq_bins {
                let magnitude = frame[k].norm();
                spectrogram[[k, frame_idx]] = magnitude * magnitude;
            }
        }

        spectrogram
    }
}

/// Generate a Hann window.
fn hann_window(window_length: usize) -> Vec<f32> {
    (0..window_length)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / window_length as f32).cos())
        .collect()
}

/// Convert Hz to mel (Slaney formula).
fn hz_to_mel(hz: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = (6.4f64).ln() / 27.0;

    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

/// Convert mel to Hz (Slaney formula).
fn mel_to_hz(mel: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = (6.4f64).ln() / 27.0;

    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        f_sp * mel
    }
}

/// Triangular mel filterbank with Slaney area normalization.
fn mel_filterbank(sample_rate: u32) -> Array2<f32> {
    let freq_bins = N_FFT / 2 + 1;
    let mut filterbank = Array2::<f32>::zeros((N_MELS, freq_bins));

    let fftfreqs: Vec<f64> = (0..freq_bins)
        .map(|k| k as f64 * sample_rate as f64 / N_FFT as f64)
        .collect();

    let fmax_mel = hz_to_mel(sample_rate as f64 / 2.0);
    let mel_f: Vec<f64> = (0..=N_MELS + 1)
        .map(|i| mel_to_hz(fmax_mel * i as f64 / (N_MELS + 1) as f64))
        .collect();

    let fdiff: Vec<f64> = mel_f.windows(2).map(|w| w[1] - w[0]).collect();

    for i in 0..N_MELS {
        for k in 0..freq_bins {
            let lower = (fftfreqs[k] - mel_f[i]) / fdiff[i];
            let upper = (mel_f[i + 2] - fftfreqs[k]) / fdiff[i + 1];
            filterbank[[i, k]] = 0.0f64.max(lower.min(upper)) as f32;
        }
    }

    for i in 0..N_MELS {
        let enorm = 2.0 / (mel_f[i + 2] - mel_f[i]);
        for k in 0..freq_bins {
            filterbank[[i, k]] *= enorm as f32;
        }
    }

    filterbank
}

/// Orthonormal DCT-II basis, `(N_COEFFS, N_MELS)`.
fn dct_basis() -> Array2<f32> {
    let mut basis = Array2::<f32>::zeros((N_COEFFS, N_MELS));
    let n = N_MELS as f32;
    for k in 0..N_COEFFS {
        let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
        for m in 0..N_MELS {
            basis[[k, m]] = scale * (PI / n * (m as f32 + 0.5) * k as f32).cos();
        }
    }
    basis
}

/// Similarity between two fingerprints in `[0, 1]`-ish cosine terms.
///
/// Both matrices are zero-padded on the frame axis to the wider of the
/// two, flattened, and compared by cosine. Padding instead of truncating
/// means a frame-count mismatch lowers the score; the detection
/// thresholds were tuned against exactly this behavior, so it is kept.
pub fn similarity(a: &Array2<f32>, b: &Array2<f32>) -> f64 {
    let width = a.ncols().max(b.ncols());
    let a = pad_frames(a, width);
    let b = pad_frames(b, width);

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Zero-pad a matrix to `width` columns.
fn pad_frames(m: &Array2<f32>, width: usize) -> Array2<f32> {
    if m.ncols() == width {
        return m.clone();
    }
    let mut padded = Array2::<f32>::zeros((m.nrows(), width));
    padded.slice_mut(ndarray::s![.., ..m.ncols()]).assign(m);
    padded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, secs: f64, sample_rate: u32) -> Vec<f32> {
        let n = (secs * sample_rate as f64) as usize;
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64).sin() as f32 * 0.5)
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let fp = Fingerprinter::new(16_000);
        assert_eq!(fp.compute(&[]), Err(FingerprintError::EmptyInput));
    }

    #[test]
    fn test_output_shape() {
        let fp = Fingerprinter::new(8_000);
        let samples = sine(440.0, 1.0, 8_000);
        let m = fp.compute(&samples).unwrap();
        assert_eq!(m.nrows(), N_COEFFS);
        assert_eq!(m.ncols(), samples.len() / FRAME_HOP + 1);
    }

    #[test]
    fn test_deterministic() {
        let fp = Fingerprinter::new(8_000);
        let samples = sine(440.0, 0.5, 8_000);
        let a = fp.compute(&samples).unwrap();
        let b = fp.compute(&samples).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_similarity_reflexive() {
        let fp = Fingerprinter::new(8_000);
        let m = fp.compute(&sine(440.0, 1.0, 8_000)).unwrap();
        assert!((similarity(&m, &m) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_similarity_penalizes_frame_mismatch() {
        let fp = Fingerprinter::new(8_000);
        let short = fp.compute(&sine(440.0, 1.0, 8_000)).unwrap();
        let long = fp.compute(&sine(440.0, 2.0, 8_000)).unwrap();
        let sim = similarity(&short, &long);
        assert!(sim < 1.0 - 1e-6, "padding must lower the score, got {sim}");
    }

    #[test]
    fn test_similarity_zero_norm() {
        let a = Array2::<f32>::zeros((N_COEFFS, 4));
        let b = Array2::<f32>::zeros((N_COEFFS, 4));
        assert_eq!(similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_mel_scale_roundtrip() {
        for hz in [100.0, 800.0, 1000.0, 4000.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((back - hz).abs() < 1e-6, "{hz} -> {back}");
        }
    }
}
