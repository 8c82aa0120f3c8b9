//! Spectral engine: Welch PSD, frequency banding, event-averaged PSD and
//! Morlet time-frequency power over a recording or a window of it.
//!
//! All spectra are power densities in V²/Hz. Amplitude views take the
//! square root element-wise, after any band averaging.
use ndarray::{Array2, ArrayView1, Axis};

pub mod bands;
pub mod events;
pub mod morlet;
pub mod welch;

pub use bands::{band_average, band_bins, band_range, Band, BandRule, DISPLAY_BANDS, REPORT_BANDS};
pub use events::{count_event_epochs, event_averaged_psd, EPOCH_TMAX, EPOCH_TMIN};
pub use morlet::{morlet_power, MorletParams};
pub use welch::{welch, welch_psd, windowed_psd, DEFAULT_N_FFT, EPOCH_N_FFT};

/// Whether spectra are shown as power (V²/Hz) or amplitude (V/√Hz).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayMode {
    #[default]
    Power,
    Amplitude,
}

impl DisplayMode {
    pub fn is_amplitude(self) -> bool {
        self == DisplayMode::Amplitude
    }

    pub fn psd(self, table: &PsdTable) -> PsdTable {
        match self {
            DisplayMode::Power => table.clone(),
            DisplayMode::Amplitude => table.amplitude(),
        }
    }

    pub fn bands(self, table: &BandTable) -> BandTable {
        match self {
            DisplayMode::Power => table.clone(),
            DisplayMode::Amplitude => table.amplitude(),
        }
    }
}

/// Per-channel spectrum, `values[[freq, channel]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PsdTable {
    pub freqs: Vec<f64>,
    pub channels: Vec<String>,
    pub values: Array2<f64>,
}

impl PsdTable {
    pub fn column(&self, channel: &str) -> Option<ArrayView1<'_, f64>> {
        let idx = self.channels.iter().position(|c| c == channel)?;
        Some(self.values.column(idx))
    }

    /// Element-wise square root (V/√Hz).
    pub fn amplitude(&self) -> PsdTable {
        PsdTable {
            freqs: self.freqs.clone(),
            channels: self.channels.clone(),
            values: self.values.mapv(f64::sqrt),
        }
    }

    /// Rows whose frequency satisfies `keep`.
    pub fn filter_freqs(&self, keep: impl Fn(f64) -> bool) -> PsdTable {
        let rows: Vec<usize> = (0..self.freqs.len()).filter(|&i| keep(self.freqs[i])).collect();
        PsdTable {
            freqs: rows.iter().map(|&i| self.freqs[i]).collect(),
            channels: self.channels.clone(),
            values: self.values.select(Axis(0), &rows),
        }
    }
}

/// Band means per channel, `values[[channel, band]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BandTable {
    pub labels: Vec<String>,
    pub channels: Vec<String>,
    pub values: Array2<f64>,
}

impl BandTable {
    pub fn amplitude(&self) -> BandTable {
        BandTable {
            labels: self.labels.clone(),
            channels: self.channels.clone(),
            values: self.values.mapv(f64::sqrt),
        }
    }
}

/// Time-frequency power of one channel, `power[[freq, time]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TfrTable {
    pub channel: String,
    pub freqs: Vec<f64>,
    pub times: Vec<f64>,
    pub power: Array2<f64>,
}
