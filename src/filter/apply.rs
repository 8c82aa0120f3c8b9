//! Overlap-add zero-phase FIR convolution.
//!
//! Zero phase comes from shifting the output left by `(N-1)/2` samples, not
//! from a forward-backward pass. Edge transients are suppressed with
//! reflect-limited padding of `N-1` samples on each side.
use std::sync::Arc;

use ndarray::{Array2, ArrayView1};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Filters every row of `data` (`[channels, times]`) in place.
///
/// `h` must have odd length, which [`design_band_filter`](super::design_band_filter) guarantees.
pub fn apply_fir_zero_phase(data: &mut Array2<f64>, h: &[f64]) {
    if h.is_empty() || data.ncols() == 0 {
        return;
    }
    // 所有通道长度相同，FFT 规划一次即可
    let ola = OverlapAdd::new(h, data.ncols());
    for mut row in data.rows_mut() {
        let filtered = ola.run(&row.to_vec());
        row.assign(&ArrayView1::from(&filtered));
    }
}

fn filter_1d(x: &[f64], h: &[f64]) -> Vec<f64> {
    if x.is_empty() || h.is_empty() {
        return x.to_vec();
    }
    OverlapAdd::new(h, x.len()).run(x)
}

/// Planned overlap-add convolution for signals of one length.
struct OverlapAdd {
    n_h: usize,
    n_fft: usize,
    h_fft: Vec<Complex<f64>>,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl OverlapAdd {
    fn new(h: &[f64], n_x: usize) -> Self {
        let n_h = h.len();
        let n_fft = choose_fft_len(n_h, n_x + 2 * (n_h - 1));
        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(n_fft);
        let inverse = planner.plan_fft_inverse(n_fft);

        let mut h_fft = zero_padded(h, n_fft);
        forward.process(&mut h_fft);
        OverlapAdd { n_h, n_fft, h_fft, forward, inverse }
    }

    /// Output has the length of `x`, shifted left by `(N-1)/2` for zero phase.
    fn run(&self, x: &[f64]) -> Vec<f64> {
        let n_edge = self.n_h - 1;
        let shift = n_edge / 2;
        let padded = reflect_limited_pad(x, n_edge, n_edge);
        let n_ext = padded.len();
        let block = self.n_fft - self.n_h + 1;
        let scale = 1.0 / self.n_fft as f64;

        let mut acc = vec![0.0_f64; n_ext];
        for (k, chunk) in padded.chunks(block).enumerate() {
            let mut buf = zero_padded(chunk, self.n_fft);
            self.forward.process(&mut buf);
            buf.iter_mut().zip(&self.h_fft).for_each(|(b, h)| *b *= *h);
            self.inverse.process(&mut buf);

            // 第 k 块的卷积结果起点为 k*block，整体左移 shift
            let origin = k * block;
            let skip = shift.saturating_sub(origin);
            let first = origin.saturating_sub(shift);
            for (out, v) in acc[first..].iter_mut().zip(&buf[skip..]) {
                *out += v.re * scale;
            }
        }

        acc.drain(..n_edge);
        acc.truncate(x.len());
        acc
    }
}

fn zero_padded(x: &[f64], n: usize) -> Vec<Complex<f64>> {
    let mut buf = vec![Complex::default(); n];
    buf.iter_mut().zip(x).for_each(|(b, &v)| b.re = v);
    buf
}

/// Odd reflection about the end samples, zero-filled past the signal length.
///
/// Left:  `pad[i] = 2*x[0] - x[n_l-i]`
/// Right: `pad[i] = 2*x[-1] - x[-(i+1)]`
fn reflect_limited_pad(x: &[f64], n_l: usize, n_r: usize) -> Vec<f64> {
    let n = x.len();
    let (first, last) = (x[0], x[n - 1]);
    let left = n_l.min(n - 1);
    let right = n_r.min(n - 1);

    let zeros = |k: usize| std::iter::repeat(0.0).take(k);
    zeros(n_l - left)
        .chain((1..=left).rev().map(|i| 2.0 * first - x[i]))
        .chain(x.iter().copied())
        .chain((1..=right).map(|i| 2.0 * last - x[n - 1 - i]))
        .chain(zeros(n_r - right))
        .collect()
}

/// Power-of-two block size with the lowest estimated cost
/// `ceil(n_x / (N - n_h + 1)) * N * (log2(N) + 1) + 4e-5 * N * n_x`.
fn choose_fft_len(n_h: usize, n_x: usize) -> usize {
    let min_pow = ((2 * n_h - 1) as f64).log2().ceil() as u32;
    let max_pow = ((n_x as f64).log2().ceil() as u32 + 1).max(min_pow);
    let cost = |pow: u32| {
        let n = (1_usize << pow) as f64;
        (n_x as f64 / (n - n_h as f64 + 1.0)).ceil() * n * (pow as f64 + 1.0) + 4e-5 * n * n_x as f64
    };
    let best = (min_pow..=max_pow).min_by(|&a, &b| cost(a).total_cmp(&cost(b))).unwrap_or(max_pow);
    1_usize << best
}
