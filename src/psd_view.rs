//! Whole-recording PSD view: visible channels, power/amplitude mode and an
//! optional average over annotated events.
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, info};

use crate::error::{RatatError, Result};
use crate::recording::Recording;
use crate::report::write_psd_report;
use crate::session::{Notifier, Session};
use crate::spectral::{
    band_range, event_averaged_psd, welch_psd, Band, BandRule, DisplayMode, PsdTable, DEFAULT_N_FFT, DISPLAY_BANDS,
};

/// Upper y-limit of the power chart, V²/Hz.
pub const POWER_YMAX: f64 = 2e-9;

/// Upper x-limit of the chart, Hz.
pub const CHART_XMAX: f64 = 60.0;

/// Everything needed to draw the PSD chart.
#[derive(Debug, Clone, PartialEq)]
pub struct PsdChart {
    /// Spectrum of the visible channels, already in the display mode.
    pub table: PsdTable,
    /// Inclusive bin range shaded for each display band.
    pub bands: Vec<(Band, (usize, usize))>,
    /// Shading opacity; grows as channels are hidden.
    pub fill_alpha: f64,
    pub ymax: f64,
    pub mode: DisplayMode,
}

pub struct PsdSession {
    source: PathBuf,
    recording: Recording,
    visible: Vec<bool>,
    mode: DisplayMode,
    over_events: bool,
    event_count: usize,
    notifier: Rc<dyn Notifier>,
}

impl PsdSession {
    /// `source` is the raw recording path, used to place the report.
    /// Channels marked bad start hidden.
    pub fn new<P: AsRef<Path>>(session: &Session, source: P, recording: Recording) -> Self {
        let visible = recording
            .ch_names()
            .iter()
            .map(|c| !recording.bad_channels().contains(c))
            .collect();
        let event_count = recording.count_non_bad_events();
        info!(events = event_count, "PSD session started");

        PsdSession {
            source: source.as_ref().to_path_buf(),
            visible,
            mode: DisplayMode::Power,
            over_events: false,
            event_count,
            notifier: session.notifier(),
            recording,
        }
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: DisplayMode) {
        self.mode = mode;
    }

    /// Number of non-`BAD_` events, when averaging over events is offered.
    pub fn events_available(&self) -> Option<usize> {
        (self.event_count > 0).then_some(self.event_count)
    }

    pub fn average_over_events(&self) -> bool {
        self.over_events
    }

    pub fn set_average_over_events(&mut self, on: bool) -> Result<()> {
        if on && self.event_count == 0 {
            return Err(RatatError::InvalidSelection("recording has no events to average".to_string()));
        }
        self.over_events = on;
        Ok(())
    }

    pub fn visible_channels(&self) -> Vec<&str> {
        self.recording
            .ch_names()
            .iter()
            .zip(&self.visible)
            .filter(|&(_, &v)| v)
            .map(|(c, _)| c.as_str())
            .collect()
    }

    pub fn is_visible(&self, channel: &str) -> bool {
        self.recording
            .channel_index(channel)
            .map(|i| self.visible[i])
            .unwrap_or(false)
    }

    pub fn set_visible(&mut self, channel: &str, visible: bool) -> Result<()> {
        let idx = self.recording.channel_index(channel)?;
        self.visible[idx] = visible;
        Ok(())
    }

    /// Chart data for the visible channels; `None` when all are hidden.
    pub fn chart(&self) -> Result<Option<PsdChart>> {
        let channels = self.visible_channels();
        if channels.is_empty() {
            return Ok(None);
        }

        let power = if self.over_events {
            event_averaged_psd(&self.recording, &channels)?
        } else {
            welch_psd(&self.recording, &channels, DEFAULT_N_FFT)?
        };

        let bands = DISPLAY_BANDS
            .iter()
            .map(|band| {
                let range = band_range(&power.freqs, band, BandRule::FirstSampleAbove)?;
                Ok(range.map(|r| (*band, r)))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();

        let hidden = self.visible.len() - channels.len();
        let ymax = match self.mode {
            DisplayMode::Power => POWER_YMAX,
            DisplayMode::Amplitude => POWER_YMAX.sqrt(),
        };
        debug!(channels = channels.len(), over_events = self.over_events, "PSD chart computed");

        Ok(Some(PsdChart {
            table: self.mode.psd(&power),
            bands,
            fill_alpha: 0.05 * (hidden + 1) as f64,
            ymax,
            mode: self.mode,
        }))
    }

    /// Writes the PSD report in the current display mode.
    pub fn export(&self) -> Result<PathBuf> {
        let path = write_psd_report(&self.source, &self.recording, self.mode)?;
        self.notifier.success(&format!("Saved file: {}", path.display()));
        Ok(path)
    }
}
