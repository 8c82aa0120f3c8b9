//! Spectral parameterisation: a fixed (knee-less) aperiodic component plus
//! Gaussian peaks, fitted to a power spectrum in log10 space.
//!
//! Fitting proceeds in four steps:
//!   1. robust aperiodic fit: linear fit of `offset - χ·log10(f)`, then a
//!      refit on the points of the flattened spectrum at or below its
//!      0.025th percentile
//!   2. iterative peak search on the flattened spectrum, subtracting each
//!      Gaussian guess until the residual maximum falls under
//!      `peak_threshold · std` or `min_peak_height`
//!   3. edge and overlap pruning, then a bounded least-squares refinement
//!      of all Gaussians together
//!   4. aperiodic refit on the spectrum with the peaks removed
use crate::error::{RatatError, Result};

const AP_PERCENTILE_THRESH: f64 = 0.025;
const BW_STD_EDGE: f64 = 1.0;
const GAUSS_OVERLAP_THRESH: f64 = 0.75;
const CF_BOUND: f64 = 1.5;
const MAX_LM_ITERATIONS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FooofSettings {
    /// Bandwidth limits in Hz; the Gaussian std is bounded by half of each.
    pub peak_width_limits: (f64, f64),
    pub max_n_peaks: usize,
    /// Absolute height threshold, log10 power.
    pub min_peak_height: f64,
    /// Relative threshold in units of the flattened spectrum's std.
    pub peak_threshold: f64,
}

impl Default for FooofSettings {
    fn default() -> Self {
        FooofSettings {
            peak_width_limits: (0.5, 12.0),
            max_n_peaks: usize::MAX,
            min_peak_height: 0.05,
            peak_threshold: 2.0,
        }
    }
}

/// Gaussian `height · exp(-(f - center)² / 2·std²)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gaussian {
    pub center: f64,
    pub height: f64,
    pub std: f64,
}

impl Gaussian {
    fn eval(&self, f: f64) -> f64 {
        let d = f - self.center;
        self.height * (-(d * d) / (2.0 * self.std * self.std)).exp()
    }
}

/// Reported peak: center frequency, power over the aperiodic fit, bandwidth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakParams {
    pub cf: f64,
    pub pw: f64,
    pub bw: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FooofFit {
    pub offset: f64,
    pub exponent: f64,
    pub peaks: Vec<PeakParams>,
    pub gaussians: Vec<Gaussian>,
    pub r_squared: f64,
    pub error: f64,
    pub freqs: Vec<f64>,
    /// log10 of the input power.
    pub spectrum: Vec<f64>,
    pub aperiodic_fit: Vec<f64>,
    pub peak_fit: Vec<f64>,
    /// Aperiodic plus periodic model.
    pub model: Vec<f64>,
}

impl FooofFit {
    /// Spectrum minus the aperiodic fit.
    pub fn flattened(&self) -> Vec<f64> {
        self.spectrum.iter().zip(&self.aperiodic_fit).map(|(s, a)| s - a).collect()
    }
}

/// Fits one power spectrum given in linear units. A leading 0 Hz bin is skipped.
pub fn fit_spectrum(freqs: &[f64], power: &[f64], settings: &FooofSettings) -> Result<FooofFit> {
    if freqs.len() != power.len() {
        return Err(RatatError::InvalidParameter("frequency and power lengths differ".to_string()));
    }
    let skip = usize::from(freqs.first() == Some(&0.0));
    let freqs = &freqs[skip..];
    let power = &power[skip..];
    if freqs.len() < 3 {
        return Err(RatatError::InvalidParameter("too few frequency bins to fit".to_string()));
    }
    if power.iter().any(|&p| !(p > 0.0) || !p.is_finite()) {
        return Err(RatatError::InvalidParameter("power values must be positive and finite".to_string()));
    }

    let spectrum: Vec<f64> = power.iter().map(|p| p.log10()).collect();
    let freq_res = freqs[1] - freqs[0];

    let (offset, exponent) = robust_aperiodic_fit(freqs, &spectrum);
    let flat: Vec<f64> = spectrum
        .iter()
        .zip(freqs)
        .map(|(s, &f)| s - aperiodic(f, offset, exponent))
        .collect();

    let guesses = find_peaks(freqs, &flat, freq_res, settings);
    let guesses = drop_peak_overlap(drop_peak_cf(guesses, freqs));
    let mut gaussians = refine_gaussians(freqs, &flat, &guesses, settings);
    gaussians.sort_by(|a, b| a.center.total_cmp(&b.center));

    let peak_fit: Vec<f64> = freqs.iter().map(|&f| gaussians.iter().map(|g| g.eval(f)).sum()).collect();
    let peak_removed: Vec<f64> = spectrum.iter().zip(&peak_fit).map(|(s, p)| s - p).collect();
    let (offset, exponent) = simple_aperiodic_fit(freqs, &peak_removed).unwrap_or((offset, exponent));

    let aperiodic_fit: Vec<f64> = freqs.iter().map(|&f| aperiodic(f, offset, exponent)).collect();
    let model: Vec<f64> = aperiodic_fit.iter().zip(&peak_fit).map(|(a, p)| a + p).collect();

    let peaks = gaussians
        .iter()
        .map(|g| {
            let ind = nearest_index(freqs, g.center);
            PeakParams { cf: g.center, pw: model[ind] - aperiodic_fit[ind], bw: 2.0 * g.std }
        })
        .collect();

    let r = correlation(&spectrum, &model);
    let error = spectrum.iter().zip(&model).map(|(s, m)| (s - m).abs()).sum::<f64>() / spectrum.len() as f64;

    Ok(FooofFit {
        offset,
        exponent,
        peaks,
        gaussians,
        r_squared: r * r,
        error,
        freqs: freqs.to_vec(),
        spectrum,
        aperiodic_fit,
        peak_fit,
        model,
    })
}

fn aperiodic(f: f64, offset: f64, exponent: f64) -> f64 {
    offset - exponent * f.log10()
}

/// Least squares for `y = offset - exponent·log10(f)`.
fn simple_aperiodic_fit(freqs: &[f64], spectrum: &[f64]) -> Option<(f64, f64)> {
    let n = freqs.len() as f64;
    if freqs.len() < 2 {
        return None;
    }
    let xs: Vec<f64> = freqs.iter().map(|f| f.log10()).collect();
    let mx = xs.iter().sum::<f64>() / n;
    let my = spectrum.iter().sum::<f64>() / n;
    let sxx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    if sxx <= 0.0 {
        return None;
    }
    let sxy: f64 = xs.iter().zip(spectrum).map(|(x, y)| (x - mx) * (y - my)).sum();
    let slope = sxy / sxx;
    Some((my - slope * mx, -slope))
}

fn robust_aperiodic_fit(freqs: &[f64], spectrum: &[f64]) -> (f64, f64) {
    let Some((offset, exponent)) = simple_aperiodic_fit(freqs, spectrum) else {
        return (spectrum[0], 0.0);
    };

    let flat: Vec<f64> = spectrum
        .iter()
        .zip(freqs)
        .map(|(s, &f)| (s - aperiodic(f, offset, exponent)).max(0.0))
        .collect();
    let thresh = percentile(&flat, AP_PERCENTILE_THRESH);

    let (f_sel, s_sel): (Vec<f64>, Vec<f64>) = freqs
        .iter()
        .zip(spectrum)
        .zip(&flat)
        .filter(|&(_, &fl)| fl <= thresh)
        .map(|((&f, &s), _)| (f, s))
        .unzip();

    simple_aperiodic_fit(&f_sel, &s_sel).unwrap_or((offset, exponent))
}

/// Linear-interpolated percentile, `q` in percent.
fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

fn find_peaks(freqs: &[f64], flat: &[f64], freq_res: f64, settings: &FooofSettings) -> Vec<Gaussian> {
    let std_limits = (settings.peak_width_limits.0 / 2.0, settings.peak_width_limits.1 / 2.0);
    let mut flat_iter = flat.to_vec();
    let mut guesses = Vec::new();

    while guesses.len() < settings.max_n_peaks {
        let (max_ind, max_height) = flat_iter
            .iter()
            .cloned()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });

        if max_height <= settings.peak_threshold * std_dev(&flat_iter) {
            break;
        }
        if max_height <= settings.min_peak_height {
            break;
        }

        // 半高宽取较短的一侧
        let half_height = 0.5 * max_height;
        let left = (1..max_ind).rev().find(|&i| flat_iter[i] <= half_height);
        let right = (max_ind + 1..flat_iter.len()).find(|&i| flat_iter[i] <= half_height);
        let short_side = [left, right].iter().flatten().map(|&i| i.abs_diff(max_ind)).min();

        let std = match short_side {
            Some(side) => {
                let fwhm = side as f64 * 2.0 * freq_res;
                fwhm / (2.0 * (2.0 * 2.0_f64.ln()).sqrt())
            }
            None => (settings.peak_width_limits.0 + settings.peak_width_limits.1) / 2.0,
        }
        .clamp(std_limits.0, std_limits.1);

        let guess = Gaussian { center: freqs[max_ind], height: max_height, std };
        for (v, &f) in flat_iter.iter_mut().zip(freqs) {
            *v -= guess.eval(f);
        }
        guesses.push(guess);
    }

    guesses
}

/// Drops peaks whose center lies within one std of the frequency range edges.
fn drop_peak_cf(guesses: Vec<Gaussian>, freqs: &[f64]) -> Vec<Gaussian> {
    let (lo, hi) = (freqs[0], freqs[freqs.len() - 1]);
    guesses
        .into_iter()
        .filter(|g| (g.center - lo).abs() > g.std * BW_STD_EDGE && (g.center - hi).abs() > g.std * BW_STD_EDGE)
        .collect()
}

/// Of two neighbouring peaks whose ±0.75·std bounds overlap, drops the lower one.
fn drop_peak_overlap(mut guesses: Vec<Gaussian>) -> Vec<Gaussian> {
    guesses.sort_by(|a, b| a.center.total_cmp(&b.center));
    let bounds: Vec<(f64, f64)> = guesses
        .iter()
        .map(|g| (g.center - g.std * GAUSS_OVERLAP_THRESH, g.center + g.std * GAUSS_OVERLAP_THRESH))
        .collect();

    let mut drop = vec![false; guesses.len()];
    for i in 0..guesses.len().saturating_sub(1) {
        if bounds[i].1 > bounds[i + 1].0 {
            let lower = if guesses[i].height <= guesses[i + 1].height { i } else { i + 1 };
            drop[lower] = true;
        }
    }

    guesses.into_iter().zip(drop).filter(|(_, d)| !d).map(|(g, _)| g).collect()
}

/// Bounded Levenberg-Marquardt fit of the summed Gaussians to `flat`.
fn refine_gaussians(freqs: &[f64], flat: &[f64], guesses: &[Gaussian], settings: &FooofSettings) -> Vec<Gaussian> {
    if guesses.is_empty() {
        return Vec::new();
    }
    let std_limits = (settings.peak_width_limits.0 / 2.0, settings.peak_width_limits.1 / 2.0);
    let bounds: Vec<[(f64, f64); 3]> = guesses
        .iter()
        .map(|g| {
            let cf_span = 2.0 * CF_BOUND * g.std;
            [
                (g.center - cf_span, g.center + cf_span),
                (0.0, f64::INFINITY),
                std_limits,
            ]
        })
        .collect();

    let to_gaussians = |p: &[f64]| -> Vec<Gaussian> {
        p.chunks_exact(3)
            .map(|c| Gaussian { center: c[0], height: c[1], std: c[2] })
            .collect()
    };
    let cost = |p: &[f64]| -> f64 {
        let gs = to_gaussians(p);
        freqs
            .iter()
            .zip(flat)
            .map(|(&f, &y)| {
                let r = y - gs.iter().map(|g| g.eval(f)).sum::<f64>();
                r * r
            })
            .sum()
    };

    let mut params: Vec<f64> = guesses.iter().flat_map(|g| [g.center, g.height, g.std]).collect();
    let n_params = params.len();
    let mut current = cost(&params);
    let mut lambda = 1e-3;

    for _ in 0..MAX_LM_ITERATIONS {
        let gs = to_gaussians(&params);
        let mut jtj = vec![vec![0.0; n_params]; n_params];
        let mut jtr = vec![0.0; n_params];

        for (&f, &y) in freqs.iter().zip(flat) {
            let mut row = vec![0.0; n_params];
            let mut model = 0.0;
            for (k, g) in gs.iter().enumerate() {
                let d = f - g.center;
                let s2 = g.std * g.std;
                let e = (-(d * d) / (2.0 * s2)).exp();
                let v = g.height * e;
                model += v;
                row[3 * k] = v * d / s2;
                row[3 * k + 1] = e;
                row[3 * k + 2] = v * d * d / (s2 * g.std);
            }
            let r = y - model;
            for a in 0..n_params {
                jtr[a] += row[a] * r;
                for b in 0..n_params {
                    jtj[a][b] += row[a] * row[b];
                }
            }
        }

        let mut system = jtj.clone();
        for (a, sys_row) in system.iter_mut().enumerate() {
            sys_row[a] += lambda * jtj[a][a].max(1e-12);
        }
        let Some(step) = solve_linear(system, jtr) else {
            break;
        };

        let candidate: Vec<f64> = params
            .iter()
            .zip(&step)
            .enumerate()
            .map(|(i, (p, d))| {
                let (lo, hi) = bounds[i / 3][i % 3];
                (p + d).clamp(lo, hi)
            })
            .collect();
        let next = cost(&candidate);

        if next < current {
            let improvement = (current - next) / current.max(f64::MIN_POSITIVE);
            params = candidate;
            current = next;
            lambda = (lambda / 10.0).max(1e-12);
            if improvement < 1e-10 {
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e10 {
                break;
            }
        }
    }

    to_gaussians(&params)
}

/// Gaussian elimination with partial pivoting.
fn solve_linear(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-300 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let sum: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - sum) / a[row][row];
    }
    Some(x)
}

fn std_dev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let ma = a.iter().sum::<f64>() / n;
    let mb = b.iter().sum::<f64>() / n;
    let cov: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
    let va: f64 = a.iter().map(|x| (x - ma).powi(2)).sum();
    let vb: f64 = b.iter().map(|y| (y - mb).powi(2)).sum();
    cov / (va * vb).sqrt()
}

fn nearest_index(freqs: &[f64], target: f64) -> usize {
    freqs
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - target).abs().total_cmp(&(*b - target).abs()))
        .map_or(0, |(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Linear power for offset 1, exponent 2 and a 10 Hz peak of height 0.6.
    fn synthetic(freqs: &[f64], with_peak: bool) -> Vec<f64> {
        freqs
            .iter()
            .map(|&f| {
                let mut log_p = 1.0 - 2.0 * f.log10();
                if with_peak {
                    log_p += Gaussian { center: 10.0, height: 0.6, std: 1.0 }.eval(f);
                }
                10f64.powf(log_p)
            })
            .collect()
    }

    fn grid() -> Vec<f64> {
        (0..=160).map(|i| i as f64 * 0.25).collect()
    }

    #[test]
    fn pure_aperiodic_spectrum() {
        let freqs = grid();
        let fit = fit_spectrum(&freqs, &synthetic(&freqs, false), &FooofSettings::default()).unwrap();
        assert_eq!(fit.freqs[0], 0.25);
        assert_abs_diff_eq!(fit.offset, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(fit.exponent, 2.0, epsilon = 1e-6);
        assert!(fit.peaks.is_empty());
        assert!(fit.error < 1e-6);
    }

    #[test]
    fn recovers_single_peak() {
        let freqs = grid();
        let fit = fit_spectrum(&freqs, &synthetic(&freqs, true), &FooofSettings::default()).unwrap();

        assert_eq!(fit.peaks.len(), 1);
        let peak = fit.peaks[0];
        assert_abs_diff_eq!(peak.cf, 10.0, epsilon = 0.1);
        assert_abs_diff_eq!(peak.pw, 0.6, epsilon = 0.05);
        assert_abs_diff_eq!(peak.bw, 2.0, epsilon = 0.2);
        assert_abs_diff_eq!(fit.exponent, 2.0, epsilon = 0.05);
        assert!(fit.r_squared > 0.99);
    }

    #[test]
    fn peak_without_half_height_uses_mean_width() {
        let freqs: Vec<f64> = (2..=40).map(|i| i as f64 * 0.5).collect();
        // never drops to half height inside the range
        let flat: Vec<f64> = freqs.iter().map(|f| (-(f - 10.0).powi(2) / 200.0).exp()).collect();
        let settings = FooofSettings { max_n_peaks: 1, ..FooofSettings::default() };

        let guesses = find_peaks(&freqs, &flat, 0.5, &settings);
        assert_eq!(guesses.len(), 1);
        assert_abs_diff_eq!(guesses[0].center, 10.0);
        // mean(0.5, 12) = 6.25, clamped to the upper std limit 12 / 2
        assert_abs_diff_eq!(guesses[0].std, 6.0);
    }

    #[test]
    fn percentile_interpolates() {
        assert_abs_diff_eq!(percentile(&[4.0, 1.0, 3.0, 2.0], 50.0), 2.5);
        assert_abs_diff_eq!(percentile(&[0.0, 0.0, 5.0], 0.025), 0.0);
    }

    #[test]
    fn overlapping_lower_peak_dropped() {
        let kept = drop_peak_overlap(vec![
            Gaussian { center: 10.0, height: 1.0, std: 1.0 },
            Gaussian { center: 11.0, height: 0.5, std: 1.0 },
            Gaussian { center: 20.0, height: 0.3, std: 1.0 },
        ]);
        let centers: Vec<f64> = kept.iter().map(|g| g.center).collect();
        assert_eq!(centers, vec![10.0, 20.0]);
    }

    #[test]
    fn edge_peaks_dropped() {
        let freqs = grid();
        let kept = drop_peak_cf(
            vec![
                Gaussian { center: 0.5, height: 1.0, std: 1.0 },
                Gaussian { center: 20.0, height: 1.0, std: 1.0 },
            ],
            &freqs[1..],
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].center, 20.0);
    }

    #[test]
    fn rejects_non_positive_power() {
        let freqs = [1.0, 2.0, 3.0];
        assert!(fit_spectrum(&freqs, &[1.0, 0.0, 1.0], &FooofSettings::default()).is_err());
        assert!(fit_spectrum(&freqs[..2], &[1.0, 1.0], &FooofSettings::default()).is_err());
    }
}
