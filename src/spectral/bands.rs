//! Frequency-band aggregation of a [`PsdTable`].
//!
//! Two boundary rules coexist. The display rule extends each band up to the
//! first frequency sample strictly greater than its upper boundary (so a
//! boundary of 5 Hz on an integer grid ends at 6 Hz, inclusive). The report
//! rule is the plain half-open interval `low < f <= high`.
use ndarray::Array2;

use super::{BandTable, PsdTable};
use crate::error::{RatatError, Result};

/// A named frequency band, bounds in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub label: &'static str,
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandRule {
    /// Inclusive bins up to the first sample above each boundary.
    FirstSampleAbove,
    /// `low < f <= high`.
    HalfOpen,
}

/// Bands shaded on the PSD chart.
pub const DISPLAY_BANDS: [Band; 4] = [
    Band { label: "delta", low: 0.0, high: 5.0 },
    Band { label: "theta", low: 5.0, high: 10.0 },
    Band { label: "beta", low: 10.0, high: 20.0 },
    Band { label: "gamma", low: 20.0, high: 40.0 },
];

/// Bands written to the PSD report.
pub const REPORT_BANDS: [Band; 4] = [
    Band { label: "1 < f <= 5", low: 1.0, high: 5.0 },
    Band { label: "5 < f <= 10", low: 5.0, high: 10.0 },
    Band { label: "10 < f <= 20", low: 10.0, high: 20.0 },
    Band { label: "20 < f <= 50", low: 20.0, high: 50.0 },
];

/// Index of the first frequency strictly greater than each boundary.
///
/// # Examples
///
/// ```rust
/// use ratat::spectral::band_bins;
///
/// let freqs: Vec<f64> = (0..=60).map(f64::from).collect();
/// assert_eq!(band_bins(&freqs, &[5.0, 10.0]).unwrap(), vec![6, 11]);
/// ```
///
/// # Errors
///
/// `RatatError::InvalidParameter` when no frequency lies above a boundary.
pub fn band_bins(freqs: &[f64], boundaries: &[f64]) -> Result<Vec<usize>> {
    boundaries
        .iter()
        .map(|&b| {
            freqs.iter().position(|&f| f > b).ok_or_else(|| {
                RatatError::InvalidParameter(format!("no frequency sample above {b} Hz"))
            })
        })
        .collect()
}

/// Inclusive bin range `(first, last)` a band covers under `rule`, or
/// `None` when it covers nothing.
pub fn band_range(freqs: &[f64], band: &Band, rule: BandRule) -> Result<Option<(usize, usize)>> {
    let range = match rule {
        BandRule::FirstSampleAbove => {
            let first = if freqs.first().is_some_and(|&f| band.low <= f) {
                0
            } else {
                band_bins(freqs, &[band.low])?[0]
            };
            let last = band_bins(freqs, &[band.high])?[0];
            Some((first, last))
        }
        BandRule::HalfOpen => {
            let first = freqs.iter().position(|&f| f > band.low);
            let last = freqs.iter().rposition(|&f| f <= band.high);
            match (first, last) {
                (Some(first), Some(last)) if first <= last => Some((first, last)),
                _ => None,
            }
        }
    };
    Ok(range)
}

/// Mean power per band per channel, always averaged in the power domain.
///
/// A band with no bins yields `NaN`.
pub fn band_average(table: &PsdTable, bands: &[Band], rule: BandRule) -> Result<BandTable> {
    let mut values = Array2::from_elem((table.channels.len(), bands.len()), f64::NAN);

    for (b, band) in bands.iter().enumerate() {
        let Some((first, last)) = band_range(&table.freqs, band, rule)? else {
            continue;
        };
        let count = (last - first + 1) as f64;
        for c in 0..table.channels.len() {
            let sum: f64 = (first..=last).map(|i| table.values[[i, c]]).sum();
            values[[c, b]] = sum / count;
        }
    }

    Ok(BandTable {
        labels: bands.iter().map(|b| b.label.to_string()).collect(),
        channels: table.channels.clone(),
        values,
    })
}
