//! PSD averaged over epochs anchored at annotated events.
use ndarray::{s, Array2};
use tracing::debug;

use super::welch::{welch, EPOCH_N_FFT};
use super::PsdTable;
use crate::error::{RatatError, Result};
use crate::recording::Recording;

/// Epoch start relative to the event, seconds.
pub const EPOCH_TMIN: f64 = -0.2;
/// Epoch end relative to the event, seconds (inclusive).
pub const EPOCH_TMAX: f64 = 0.5;

/// Sample window of one surviving epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Epoch {
    start: usize,
    stop: usize, // inclusive
}

/// Averages the Welch PSD of `[-0.2 s, +0.5 s]` epochs around every
/// non-`BAD_` annotation onset.
///
/// Epochs that run off either end of the recording or touch a `BAD_`
/// annotation are dropped. Each epoch is baseline-corrected with its mean
/// over `t <= 0` before the PSD.
///
/// # Errors
///
/// `RatatError::EmptySelection` when no epoch survives.
pub fn event_averaged_psd<S: AsRef<str>>(recording: &Recording, channels: &[S]) -> Result<PsdTable> {
    let epochs = build_epochs(recording);
    if epochs.is_empty() {
        return Err(RatatError::EmptySelection("no event epochs left after rejection".to_string()));
    }

    let rows = channels
        .iter()
        .map(|c| recording.channel_index(c.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    let sfreq = recording.sfreq();
    let pre = (-EPOCH_TMIN * sfreq).round() as usize;
    let n_epoch = epochs[0].stop - epochs[0].start + 1;
    let n_fft = EPOCH_N_FFT.min(n_epoch);
    let n_freqs = n_fft / 2 + 1;

    let mut sum = Array2::<f64>::zeros((n_freqs, rows.len()));
    let mut freqs = Vec::new();
    let data = recording.data();

    for epoch in &epochs {
        for (c, &row) in rows.iter().enumerate() {
            let mut x = data.slice(s![row, epoch.start..=epoch.stop]).to_vec();
            let baseline = x[..=pre].iter().sum::<f64>() / (pre + 1) as f64;
            x.iter_mut().for_each(|v| *v -= baseline);

            let (f, p) = welch(&x, sfreq, n_fft)?;
            freqs = f;
            for (i, v) in p.into_iter().enumerate() {
                sum[[i, c]] += v;
            }
        }
    }

    debug!(epochs = epochs.len(), n_fft, "averaged event PSD");
    Ok(PsdTable {
        freqs,
        channels: channels.iter().map(|c| c.as_ref().to_string()).collect(),
        values: sum / epochs.len() as f64,
    })
}

/// Number of epochs [`event_averaged_psd`] would average.
pub fn count_event_epochs(recording: &Recording) -> usize {
    build_epochs(recording).len()
}

fn build_epochs(recording: &Recording) -> Vec<Epoch> {
    let sfreq = recording.sfreq();
    let n_times = recording.n_times() as i64;
    let first = (EPOCH_TMIN * sfreq).round() as i64;
    let last = (EPOCH_TMAX * sfreq).round() as i64;

    let mut seen = Vec::new();
    let mut epochs = Vec::new();

    for event in recording.non_bad_events() {
        let sample = (event.onset * sfreq).round() as i64;
        // 重复的事件样本只取第一个
        if seen.contains(&sample) {
            debug!(description = %event.description, sample, "duplicate event sample skipped");
            continue;
        }
        seen.push(sample);

        let (start, stop) = (sample + first, sample + last);
        if start < 0 || stop >= n_times {
            debug!(description = %event.description, "epoch out of bounds, dropped");
            continue;
        }
        let (t0, t1) = (start as f64 / sfreq, stop as f64 / sfreq);
        if recording.overlaps_bad(t0, t1) {
            debug!(description = %event.description, "epoch overlaps BAD annotation, dropped");
            continue;
        }
        epochs.push(Epoch { start: start as usize, stop: stop as usize });
    }

    epochs
}
