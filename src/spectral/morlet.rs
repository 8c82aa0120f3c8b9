//! Morlet-wavelet time-frequency power over a selected window.
//!
//! Wavelet for frequency `f` with `n` cycles:
//!   σ = n / (2πf),  t ∈ [-5σ, 5σ] sampled at 1/sfreq
//!   W(t) = (exp(2iπft) - exp(-2(πfσ)²)) · exp(-t² / 2σ²)
//!   W /= √0.5 · ‖W‖
//! Power is `|x ⊛ W|²` with the convolution centred on the input.
use std::f64::consts::PI;

use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};
use tracing::debug;

use super::TfrTable;
use crate::error::{RatatError, Result};
use crate::recording::Recording;

/// Frequency grid and cycle count of the wavelet family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MorletParams {
    pub freq_min: f64,
    pub freq_max: f64,
    pub freq_step: f64,
    pub n_cycles: f64,
}

impl MorletParams {
    /// `arange(freq_min, freq_max, freq_step)`.
    pub fn freqs(&self) -> Result<Vec<f64>> {
        if !(self.freq_step > 0.0) || !self.freq_min.is_finite() || !self.freq_max.is_finite() {
            return Err(RatatError::InvalidParameter(format!(
                "invalid wavelet frequency grid {}..{} step {}",
                self.freq_min, self.freq_max, self.freq_step
            )));
        }
        let n = ((self.freq_max - self.freq_min) / self.freq_step).ceil().max(0.0) as usize;
        let freqs: Vec<f64> = (0..n).map(|i| self.freq_min + i as f64 * self.freq_step).collect();
        if freqs.is_empty() {
            return Err(RatatError::InvalidParameter(format!(
                "no wavelet frequencies in [{}, {})",
                self.freq_min, self.freq_max
            )));
        }
        if freqs.iter().any(|&f| f <= 0.0) || self.n_cycles <= 0.0 {
            return Err(RatatError::InvalidParameter(
                "wavelet frequencies and cycle count must be positive".to_string(),
            ));
        }
        Ok(freqs)
    }
}

/// Time-frequency power of `channel` over `[xmin, xmax]`.
///
/// # Errors
///
/// * `RatatError::EmptySelection` - the window touches a `BAD_` annotation
/// * `RatatError::InvalidParameter` - empty or non-positive frequency grid
/// * `RatatError::Transform` - a wavelet is longer than the window; callers
///   treat this as a warning
pub fn morlet_power(
    recording: &Recording,
    channel: &str,
    window: (f64, f64),
    params: &MorletParams,
) -> Result<TfrTable> {
    let (xmin, xmax) = window;
    let cropped = recording.pick_channels(&[channel])?.crop(xmin, xmax)?;
    if recording.overlaps_bad(xmin, xmax) {
        return Err(RatatError::EmptySelection(format!(
            "selected range [{xmin:.2}, {xmax:.2}] overlaps a BAD annotation"
        )));
    }

    let freqs = params.freqs()?;
    let sfreq = recording.sfreq();

    // 固定长度的单个epoch
    let n_epoch = (((xmax - xmin) * sfreq).round() as usize).clamp(1, cropped.n_times());
    let x: Vec<f64> = cropped.data().row(0).iter().take(n_epoch).cloned().collect();

    let power = cwt_power(&x, sfreq, &freqs, params.n_cycles)?;
    debug!(channel, n_freqs = freqs.len(), n_times = x.len(), "computed morlet power");

    Ok(TfrTable {
        channel: channel.to_string(),
        times: (0..x.len()).map(|i| xmin + i as f64 / sfreq).collect(),
        freqs,
        power,
    })
}

/// One wavelet per frequency.
///
/// # Errors
///
/// `RatatError::InvalidParameter` unless `sfreq`, `n_cycles` and every
/// frequency are positive and finite.
pub fn morlet_wavelets(sfreq: f64, freqs: &[f64], n_cycles: f64) -> Result<Vec<Vec<Complex<f64>>>> {
    let positive = |v: f64| v.is_finite() && v > 0.0;
    if !positive(sfreq) || !positive(n_cycles) || !freqs.iter().all(|&f| positive(f)) {
        return Err(RatatError::InvalidParameter(format!(
            "wavelets need positive sfreq, n_cycles and frequencies (sfreq {sfreq}, n_cycles {n_cycles})"
        )));
    }
    let wavelets = freqs
        .iter()
        .map(|&f| {
            let sigma = n_cycles / (2.0 * PI * f);
            let n_half = ((5.0 * sigma * sfreq).ceil() as usize).max(1);
            let real_offset = (-2.0 * (PI * f * sigma).powi(2)).exp();

            let mut w: Vec<Complex<f64>> = (0..2 * n_half - 1)
                .map(|i| {
                    let t = (i as f64 - (n_half - 1) as f64) / sfreq;
                    let oscillation = Complex::from_polar(1.0, 2.0 * PI * f * t) - real_offset;
                    oscillation * (-(t * t) / (2.0 * sigma * sigma)).exp()
                })
                .collect();

            let norm = w.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt() * 0.5_f64.sqrt();
            w.iter_mut().for_each(|c| *c /= norm);
            w
        })
        .collect();
    Ok(wavelets)
}

fn cwt_power(x: &[f64], sfreq: f64, freqs: &[f64], n_cycles: f64) -> Result<Array2<f64>> {
    let wavelets = morlet_wavelets(sfreq, freqs, n_cycles)?;
    let n = x.len();
    let max_len = wavelets.iter().map(Vec::len).max().unwrap_or(0);
    if max_len > n {
        return Err(RatatError::Transform(
            "At least one of the wavelets is longer than the signal. Use a longer signal or shorter wavelets."
                .to_string(),
        ));
    }

    let n_fft = n + max_len - 1;
    let mut planner = FftPlanner::<f64>::new();
    let fwd = planner.plan_fft_forward(n_fft);
    let inv = planner.plan_fft_inverse(n_fft);

    let mut x_fft: Vec<Complex<f64>> = x
        .iter()
        .map(|&v| Complex { re: v, im: 0.0 })
        .chain(std::iter::repeat(Complex::default()))
        .take(n_fft)
        .collect();
    fwd.process(&mut x_fft);

    let mut power = Array2::<f64>::zeros((freqs.len(), n));
    for (k, w) in wavelets.iter().enumerate() {
        let mut buf: Vec<Complex<f64>> = w
            .iter()
            .cloned()
            .chain(std::iter::repeat(Complex::default()))
            .take(n_fft)
            .collect();
        fwd.process(&mut buf);
        for (b, xf) in buf.iter_mut().zip(&x_fft) {
            *b *= xf;
        }
        inv.process(&mut buf);

        // 取与输入等长的中间部分
        let full = n + w.len() - 1;
        let start = (full - n) / 2;
        for t in 0..n {
            power[[k, t]] = (buf[start + t] / n_fft as f64).norm_sqr();
        }
    }

    Ok(power)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Annotation;
    use approx::assert_abs_diff_eq;

    fn params(freq_min: f64, freq_max: f64) -> MorletParams {
        MorletParams { freq_min, freq_max, freq_step: 0.25, n_cycles: 8.0 }
    }

    fn tone_recording(freq: f64) -> Recording {
        let sfreq = 250.0;
        let data = Array2::from_shape_fn((1, 5000), |(_, t)| 1e-5 * (2.0 * PI * freq * t as f64 / sfreq).sin());
        Recording::new(vec!["Cx".into()], data, sfreq).unwrap()
    }

    #[test]
    fn frequency_grid_is_half_open() {
        let freqs = params(1.0, 15.0).freqs().unwrap();
        assert_eq!(freqs.len(), 56);
        assert_eq!(freqs[0], 1.0);
        assert_abs_diff_eq!(freqs[55], 14.75);
        assert!(params(5.0, 5.0).freqs().is_err());
    }

    #[test]
    fn wavelet_is_normalised() {
        let w = &morlet_wavelets(250.0, &[10.0], 8.0).unwrap()[0];
        assert_eq!(w.len() % 2, 1);
        let energy: f64 = w.iter().map(|c| c.norm_sqr()).sum();
        assert_abs_diff_eq!(energy, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn wavelets_reject_non_positive_inputs() {
        for n_cycles in [0.0, -3.0, f64::NAN] {
            let err = morlet_wavelets(250.0, &[10.0], n_cycles).unwrap_err();
            assert!(matches!(err, RatatError::InvalidParameter(_)));
        }
        assert!(morlet_wavelets(250.0, &[0.0, 10.0], 7.0).is_err());
        assert!(morlet_wavelets(0.0, &[10.0], 7.0).is_err());
    }

    #[test]
    fn peak_power_at_tone_frequency() {
        let rec = tone_recording(8.0);
        let p = MorletParams { freq_min: 4.0, freq_max: 13.0, freq_step: 1.0, n_cycles: 7.0 };
        let tfr = morlet_power(&rec, "Cx", (5.0, 15.0), &p).unwrap();

        assert_eq!(tfr.times.len(), 2500);
        assert_abs_diff_eq!(tfr.times[0], 5.0);

        let mid = tfr.times.len() / 2;
        let best = (0..tfr.freqs.len())
            .max_by(|&a, &b| tfr.power[[a, mid]].total_cmp(&tfr.power[[b, mid]]))
            .unwrap();
        assert_eq!(tfr.freqs[best], 8.0);
    }

    #[test]
    fn short_window_is_recoverable_transform_error() {
        let rec = tone_recording(8.0);
        let err = morlet_power(&rec, "Cx", (1.0, 1.6), &params(1.0, 15.0)).unwrap_err();
        assert!(matches!(err, RatatError::Transform(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn bad_overlap_is_empty_selection() {
        let rec = tone_recording(8.0).with_annotations(vec![Annotation::new(2.0, 1.0, "BAD_")]);
        let err = morlet_power(&rec, "Cx", (1.0, 10.0), &params(1.0, 15.0)).unwrap_err();
        assert!(matches!(err, RatatError::EmptySelection(_)));
    }
}
