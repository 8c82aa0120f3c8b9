//! Welch power spectral density.
//!
//! Periodic Hamming window, segment length `n_fft`, no overlap and no
//! detrending, one-sided density scaling `1 / (fs · Σw²)`. Segment
//! periodograms are averaged with the arithmetic mean. Spectra of a
//! [`Recording`] leave out every segment touching a `BAD_` span.
use std::f64::consts::PI;

use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};

use super::PsdTable;
use crate::error::{RatatError, Result};
use crate::recording::Recording;

/// FFT length for full-recording spectra.
pub const DEFAULT_N_FFT: usize = 2000;

/// Upper FFT length for epochs and selection windows.
pub const EPOCH_N_FFT: usize = 256;

/// Welch PSD of one signal. Returns `(freqs, psd)` with
/// `freqs[k] = k · sfreq / n_fft` for `k = 0..=n_fft/2`.
pub fn welch(x: &[f64], sfreq: f64, n_fft: usize) -> Result<(Vec<f64>, Vec<f64>)> {
    let mut planner = FftPlanner::new();
    welch_with(&mut planner, x, sfreq, n_fft, |_| true)
}

/// Welch over the segments whose first sample index passes `keep`.
fn welch_with<F>(
    planner: &mut FftPlanner<f64>,
    x: &[f64],
    sfreq: f64,
    n_fft: usize,
    keep: F,
) -> Result<(Vec<f64>, Vec<f64>)>
where
    F: Fn(usize) -> bool,
{
    if n_fft == 0 {
        return Err(RatatError::InvalidParameter("n_fft must be positive".to_string()));
    }
    if n_fft > x.len() {
        return Err(RatatError::InvalidParameter(format!(
            "n_fft ({n_fft}) is not allowed to be > n_times ({})",
            x.len()
        )));
    }

    let window = periodic_hamming(n_fft);
    let win_power: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (sfreq * win_power);
    let n_freqs = n_fft / 2 + 1;
    let mut n_segments = 0_usize;

    let fft = planner.plan_fft_forward(n_fft);
    let mut psd = vec![0.0; n_freqs];
    let mut buf = vec![Complex::default(); n_fft];

    for (i, seg) in x.chunks_exact(n_fft).enumerate() {
        if !keep(i * n_fft) {
            continue;
        }
        n_segments += 1;
        for ((b, &v), &w) in buf.iter_mut().zip(seg).zip(&window) {
            *b = Complex { re: v * w, im: 0.0 };
        }
        fft.process(&mut buf);
        for (p, c) in psd.iter_mut().zip(&buf) {
            *p += c.norm_sqr();
        }
    }
    if n_segments == 0 {
        return Err(RatatError::EmptySelection(format!(
            "every {n_fft}-sample segment overlaps a BAD_ span"
        )));
    }

    for (k, p) in psd.iter_mut().enumerate() {
        // 单边谱：除直流和奈奎斯特外乘2
        let one_sided = if k == 0 || (n_fft % 2 == 0 && k == n_fft / 2) { 1.0 } else { 2.0 };
        *p *= scale * one_sided / n_segments as f64;
    }

    let freqs = (0..n_freqs).map(|k| k as f64 * sfreq / n_fft as f64).collect();
    Ok((freqs, psd))
}

/// `0.54 - 0.46·cos(2πi/N)`, the DFT-even Hamming window.
fn periodic_hamming(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

/// Welch PSD of the named channels over the whole recording, skipping
/// segments that touch a `BAD_` annotation.
///
/// # Errors
///
/// `EmptySelection` when every segment touches a `BAD_` span.
///
/// # Examples
///
/// ```rust
/// use ndarray::Array2;
/// use ratat::Recording;
/// use ratat::spectral::{welch_psd, DEFAULT_N_FFT};
///
/// let data = Array2::from_shape_fn((1, 10_000), |(_, t)| (t as f64 * 0.3).sin() * 1e-5);
/// let rec = Recording::new(vec!["Cx".into()], data, 1000.0)?;
/// let psd = welch_psd(&rec, &["Cx"], DEFAULT_N_FFT)?;
/// assert_eq!(psd.freqs.len(), 1001);
/// assert_eq!(psd.freqs[1], 0.5);
/// # Ok::<(), ratat::RatatError>(())
/// ```
pub fn welch_psd<S: AsRef<str>>(recording: &Recording, channels: &[S], n_fft: usize) -> Result<PsdTable> {
    let mut planner = FftPlanner::new();
    let mut columns = Vec::with_capacity(channels.len());
    let mut freqs = Vec::new();
    let sfreq = recording.sfreq();
    let clean = |start: usize| {
        let last = start + n_fft.saturating_sub(1);
        !recording.overlaps_bad(start as f64 / sfreq, last as f64 / sfreq)
    };

    for name in channels {
        let row = recording.channel_data(name.as_ref())?.to_vec();
        let (f, p) = welch_with(&mut planner, &row, sfreq, n_fft, clean)?;
        freqs = f;
        columns.push(p);
    }

    Ok(PsdTable {
        values: Array2::from_shape_fn((freqs.len(), columns.len()), |(i, c)| columns[c][i]),
        freqs,
        channels: channels.iter().map(|c| c.as_ref().to_string()).collect(),
    })
}

/// PSD of one channel over `[xmin, xmax]`, with `n_fft = min(256, window length)`.
pub fn windowed_psd(recording: &Recording, channel: &str, xmin: f64, xmax: f64) -> Result<PsdTable> {
    let window = recording.pick_channels(&[channel])?.crop(xmin, xmax)?;
    let n_fft = EPOCH_N_FFT.min(window.n_times());
    welch_psd(&window, &[channel], n_fft)
}
