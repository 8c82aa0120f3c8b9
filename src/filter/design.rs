//! FIR band design matching `mne.filter.create_filter(fir_design='firwin',
//! fir_window='hamming', phase='zero')`.
//!
//! For a pass band `[l_freq, h_freq]` at sampling rate `sfreq`:
//!   • low transition  = min(max(0.25 * l_freq, 2.0), l_freq)
//!   • high transition = min(max(0.25 * h_freq, 2.0), sfreq / 2 - h_freq)
//!   • filter length N = ceil(3.3 / min(transitions) * sfreq), rounded to odd
//!   • each gain step is a windowed-sinc lowpass centred on its transition,
//!     added or subtracted into a length-N accumulator
use std::f64::consts::PI;

use crate::error::{RatatError, Result};

/// Main-lobe width factor of the Hamming window.
const HAMMING_LENGTH_FACTOR: f64 = 3.3;

/// A validated pass band with MNE's automatic transition bandwidths.
#[derive(Debug, Clone, PartialEq)]
pub struct BandSpec {
    pub l_freq: Option<f64>,
    pub h_freq: Option<f64>,
    pub l_trans_bandwidth: f64,
    pub h_trans_bandwidth: f64,
    pub filter_length: usize,
    sfreq: f64,
}

impl BandSpec {
    /// Returns `None` when both bounds are absent (nothing to filter).
    pub fn new(l_freq: Option<f64>, h_freq: Option<f64>, sfreq: f64) -> Result<Option<Self>> {
        if l_freq.is_none() && h_freq.is_none() {
            return Ok(None);
        }
        if !(sfreq.is_finite() && sfreq > 0.0) {
            return Err(RatatError::InvalidParameter(format!("sampling rate must be positive, got {sfreq}")));
        }

        let nyq = sfreq / 2.0;
        for (name, bound) in [("low", l_freq), ("high", h_freq)] {
            if let Some(f) = bound {
                if !(f.is_finite() && f > 0.0 && f < nyq) {
                    return Err(RatatError::InvalidParameter(format!(
                        "{name} cutoff {f} Hz must lie in (0, {nyq}) Hz"
                    )));
                }
            }
        }
        if let (Some(l), Some(h)) = (l_freq, h_freq) {
            if l >= h {
                return Err(RatatError::InvalidParameter(format!(
                    "low cutoff {l} Hz must be below high cutoff {h} Hz"
                )));
            }
        }

        let l_trans_bandwidth = l_freq.map_or(f64::INFINITY, |l| (0.25 * l).max(2.0).min(l));
        let h_trans_bandwidth = h_freq.map_or(f64::INFINITY, |h| (0.25 * h).max(2.0).min(nyq - h));
        let filter_length = auto_filter_length(l_trans_bandwidth.min(h_trans_bandwidth), sfreq);

        Ok(Some(BandSpec {
            l_freq,
            h_freq,
            l_trans_bandwidth,
            h_trans_bandwidth,
            filter_length,
            sfreq,
        }))
    }

    /// Gain breakpoints normalised to Nyquist, starting at 0 and ending at 1.
    fn breakpoints(&self) -> (Vec<f64>, Vec<f64>) {
        let nyq = self.sfreq / 2.0;
        let mut points: Vec<(f64, f64)> = vec![(0.0, 0.0)];

        match (self.l_freq, self.h_freq) {
            (Some(l), Some(h)) => {
                points[0].1 = 0.0;
                points.push((l - self.l_trans_bandwidth, 0.0));
                points.push((l, 1.0));
                points.push((h, 1.0));
                points.push((h + self.h_trans_bandwidth, 0.0));
                points.push((nyq, 0.0));
            }
            (Some(l), None) => {
                points.push((l - self.l_trans_bandwidth, 0.0));
                points.push((l, 1.0));
                points.push((nyq, 1.0));
            }
            (None, Some(h)) => {
                points[0].1 = 1.0;
                points.push((h, 1.0));
                points.push((h + self.h_trans_bandwidth, 0.0));
                points.push((nyq, 0.0));
            }
            (None, None) => points.push((nyq, 1.0)),
        }

        // 重复的频率点只保留第一个
        points.dedup_by(|b, a| (b.0 - a.0).abs() < 1e-12);
        points.iter().map(|&(f, g)| (f / nyq, g)).unzip()
    }
}

/// Number of FIR taps for a transition bandwidth, always odd.
///
/// Formula: `ceil(3.3 / trans_bw * sfreq)` rounded up to odd.
pub fn auto_filter_length(trans_bw: f64, sfreq: f64) -> usize {
    let n_raw = (HAMMING_LENGTH_FACTOR / trans_bw * sfreq).ceil().max(1.0) as usize;
    if n_raw % 2 == 0 { n_raw + 1 } else { n_raw }
}

/// Designs the zero-phase impulse response for `[l_freq, h_freq]`.
///
/// `l_freq = None` gives a lowpass, `h_freq = None` a highpass, and both
/// `None` returns `Ok(None)`.
pub fn design_band_filter(l_freq: Option<f64>, h_freq: Option<f64>, sfreq: f64) -> Result<Option<Vec<f64>>> {
    let Some(spec) = BandSpec::new(l_freq, h_freq, sfreq)? else {
        return Ok(None);
    };
    let (freqs, gains) = spec.breakpoints();
    Ok(Some(firwin_design(spec.filter_length, &freqs, &gains)))
}

/// Sum of lowpass kernels, one per gain step, walking down from Nyquist.
fn firwin_design(n: usize, freqs: &[f64], gains: &[f64]) -> Vec<f64> {
    let mut h = vec![0.0; n];
    let mut prev_freq = freqs[freqs.len() - 1];
    let mut prev_gain = gains[gains.len() - 1];
    if prev_gain == 1.0 {
        h[n / 2] = 1.0;
    }

    for (&this_freq, &this_gain) in freqs.iter().rev().zip(gains.iter().rev()).skip(1) {
        if this_gain != prev_gain {
            let transition = (prev_freq - this_freq) / 2.0;
            let mut this_n = (HAMMING_LENGTH_FACTOR / transition).round() as usize;
            this_n += 1 - this_n % 2;
            let this_n = this_n.min(n);

            let this_h = firwin_lowpass(this_n, (prev_freq + this_freq) / 2.0);
            let offset = (n - this_n) / 2;
            let sign = if this_gain == 0.0 { -1.0 } else { 1.0 };
            for (dst, v) in h[offset..offset + this_n].iter_mut().zip(this_h) {
                *dst += sign * v;
            }
        }
        prev_gain = this_gain;
        prev_freq = this_freq;
    }

    h
}

/// Lowpass FIR with a Hamming-windowed sinc and unit DC gain.
///
/// `cutoff` is normalised to Nyquist (`0..1`) and marks the -6 dB point.
pub fn firwin_lowpass(n: usize, cutoff: f64) -> Vec<f64> {
    let alpha = (n as f64 - 1.0) / 2.0;
    let win = hamming(n);

    let mut h: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64 - alpha;
            // f(x) = sin(π·fc·x) / (π·x);  lim_{x→0} f(x) = fc
            let sinc = if x == 0.0 { cutoff } else { (PI * cutoff * x).sin() / (PI * x) };
            sinc * win[i]
        })
        .collect();

    let s: f64 = h.iter().sum();
    if s != 0.0 {
        h.iter_mut().for_each(|v| *v /= s);
    }
    h
}

/// Symmetric Hamming window of length `n`.
pub fn hamming(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}
