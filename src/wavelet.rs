//! Interactive wavelet analysis over one channel of a recording.
//!
//! The session owns the selection span and the mark catalogue. Each change
//! of selection or channel recomputes the windowed views; the full-length
//! trace itself is the caller's to draw.
use std::rc::Rc;

use tracing::{debug, error, info, warn};

use crate::error::{RatatError, Result};
use crate::marks::{Mark, MarkCatalogue};
use crate::recording::Recording;
use crate::selection::{SelectionSpan, SpanOutcome};
use crate::session::{Notifier, Session};
use crate::spectral::{morlet_power, windowed_psd, MorletParams, PsdTable, TfrTable};

/// Views derived from the active selection. Both are `None` without one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowedView {
    pub tfr: Option<TfrTable>,
    /// Amplitude spectrum (V/√Hz) of the window.
    pub psd: Option<PsdTable>,
}

pub struct WaveletSession {
    recording: Recording,
    marks: MarkCatalogue,
    selection: SelectionSpan,
    channel: String,
    params: MorletParams,
    pending_mark_name: String,
    view: WindowedView,
    notifier: Rc<dyn Notifier>,
}

impl WaveletSession {
    /// Starts on the first channel with marks seeded from the annotations.
    pub fn new(session: &Session, recording: Recording) -> Result<Self> {
        let channel = recording
            .ch_names()
            .first()
            .cloned()
            .ok_or_else(|| RatatError::ChannelNotFound("recording has no channels".to_string()))?;
        let marks = MarkCatalogue::from_annotations(recording.annotations());
        info!(channel = %channel, marks = marks.len(), "wavelet session started");

        Ok(WaveletSession {
            marks,
            selection: SelectionSpan::default(),
            channel,
            params: session.settings().morlet_params(),
            pending_mark_name: String::new(),
            view: WindowedView::default(),
            notifier: session.notifier(),
            recording,
        })
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    pub fn marks(&self) -> &MarkCatalogue {
        &self.marks
    }

    pub fn selection(&self) -> &SelectionSpan {
        &self.selection
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn params(&self) -> &MorletParams {
        &self.params
    }

    pub fn view(&self) -> &WindowedView {
        &self.view
    }

    /// Label pre-filled by [`show_mark`](Self::show_mark).
    pub fn pending_mark_name(&self) -> &str {
        &self.pending_mark_name
    }

    pub fn set_pending_mark_name(&mut self, name: &str) {
        self.pending_mark_name = name.to_string();
    }

    pub fn select_span(&mut self, xmin: f64, xmax: f64) -> SpanOutcome {
        let outcome = self.selection.set(xmin, xmax);
        if let SpanOutcome::TooShort { duration } = outcome {
            self.notifier.warning(&format!("selected duration [{duration:.2}] is too small"));
        }
        self.recompute();
        outcome
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.recompute();
    }

    pub fn set_channel(&mut self, name: &str) -> Result<()> {
        self.recording.channel_index(name)?;
        self.channel = name.to_string();
        self.recompute();
        Ok(())
    }

    /// Stores the active selection under `label` and clears the selection.
    pub fn add_mark(&mut self, label: &str) -> Result<()> {
        let span = self.selection.get().ok_or_else(|| {
            warn!("interval is not specified");
            RatatError::EmptySpan
        })?;
        self.marks.add(label, span)?;
        debug!(label, start = span.0, end = span.1, "mark added");

        self.selection.clear();
        self.view = WindowedView::default();
        Ok(())
    }

    pub fn remove_mark(&mut self, label: &str) -> Result<Mark> {
        self.marks.remove(label)
    }

    pub fn rename_mark(&mut self, old: &str, new: &str) -> Result<()> {
        self.marks.rename(old, new)
    }

    /// Selects the mark's span and pre-fills its label.
    pub fn show_mark(&mut self, label: &str) -> Result<SpanOutcome> {
        let (start, end) = self.marks.span(label)?;
        let outcome = self.select_span(start, end);
        self.pending_mark_name = label.to_string();
        Ok(outcome)
    }

    pub fn page(&self) -> Vec<&Mark> {
        self.marks.page(self.marks.current_page())
    }

    pub fn next_page(&mut self) -> usize {
        self.marks.next_page()
    }

    pub fn prev_page(&mut self) -> usize {
        self.marks.prev_page()
    }

    fn recompute(&mut self) {
        self.view = WindowedView::default();
        let Some((xmin, xmax)) = self.selection.get() else {
            return;
        };

        let tfr = match morlet_power(&self.recording, &self.channel, (xmin, xmax), &self.params) {
            Ok(tfr) => Some(tfr),
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "time-frequency view left blank");
                self.notifier.warning(&e.to_string());
                None
            }
            Err(e) => {
                error!(error = ?e, "failed to build epochs from selection");
                self.notifier.error(&e.to_string());
                return;
            }
        };

        let psd = match windowed_psd(&self.recording, &self.channel, xmin, xmax) {
            Ok(psd) => Some(psd.amplitude()),
            Err(e) => {
                warn!(error = %e, "window spectrum left blank");
                self.notifier.warning(&e.to_string());
                None
            }
        };

        self.view = WindowedView { tfr, psd };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemoryNotifier, NoticeLevel};
    use crate::types::Annotation;
    use crate::Settings;
    use ndarray::Array2;
    use std::f64::consts::PI;

    fn setup(annotations: Vec<Annotation>) -> (WaveletSession, MemoryNotifier) {
        let sfreq = 250.0;
        let data = Array2::from_shape_fn((2, 7500), |(c, t)| {
            1e-5 * (2.0 * PI * (6.0 + c as f64) * t as f64 / sfreq).sin()
        });
        let rec = Recording::new(vec!["Cx".into(), "Hp".into()], data, sfreq)
            .unwrap()
            .with_annotations(annotations);
        let notes = MemoryNotifier::new();
        let session = Session::new(Settings::default(), notes.clone());
        (WaveletSession::new(&session, rec).unwrap(), notes)
    }

    #[test]
    fn selection_builds_views() {
        let (mut ws, notes) = setup(vec![]);
        assert!(ws.view().tfr.is_none());

        assert_eq!(ws.select_span(16.0, 2.0), SpanOutcome::Accepted);
        let tfr = ws.view().tfr.as_ref().unwrap();
        assert_eq!(tfr.channel, "Cx");
        assert_eq!(tfr.freqs.len(), 56);
        assert!(ws.view().psd.is_some());
        assert!(notes.notices().is_empty());

        ws.clear_selection();
        assert_eq!(ws.view(), &WindowedView::default());
    }

    #[test]
    fn short_window_degrades_to_warning() {
        let (mut ws, notes) = setup(vec![]);
        ws.select_span(1.0, 2.0);
        let view = ws.view();
        assert!(view.tfr.is_none());
        assert!(view.psd.is_some());
        assert_eq!(notes.count(NoticeLevel::Warning), 1);
    }

    #[test]
    fn bad_window_is_error_and_blank() {
        let (mut ws, notes) = setup(vec![Annotation::new(4.0, 1.0, "BAD_")]);
        ws.select_span(2.0, 16.0);
        assert_eq!(ws.view(), &WindowedView::default());
        assert_eq!(notes.count(NoticeLevel::Error), 1);
    }

    #[test]
    fn too_short_selection_warns() {
        let (mut ws, notes) = setup(vec![]);
        assert!(matches!(ws.select_span(3.0, 3.3), SpanOutcome::TooShort { .. }));
        assert!(ws.selection().is_empty());
        assert_eq!(notes.count(NoticeLevel::Warning), 1);
    }

    #[test]
    fn add_mark_consumes_selection() {
        let (mut ws, _) = setup(vec![Annotation::new(1.0, 2.0, "Tone")]);
        assert!(matches!(ws.add_mark("x"), Err(RatatError::EmptySpan)));

        ws.select_span(2.0, 16.0);
        assert!(matches!(ws.add_mark("Tone"), Err(RatatError::DuplicateLabel(_))));
        ws.add_mark("rest").unwrap();
        assert!(ws.selection().is_empty());
        assert!(ws.view().tfr.is_none());

        let labels: Vec<_> = ws.page().iter().map(|m| m.label.clone()).collect();
        assert_eq!(labels, ["Tone", "rest"]);
    }

    #[test]
    fn show_mark_selects_and_prefills() {
        let (mut ws, _) = setup(vec![]);
        ws.select_span(2.0, 16.0);
        ws.add_mark("rest").unwrap();

        assert_eq!(ws.show_mark("rest").unwrap(), SpanOutcome::Accepted);
        assert_eq!(ws.selection().bounds(), (2.0, 16.0));
        assert_eq!(ws.pending_mark_name(), "rest");
        assert!(ws.view().tfr.is_some());
        assert!(matches!(ws.show_mark("nope"), Err(RatatError::NotFound(_))));
    }

    #[test]
    fn channel_switch_recomputes() {
        let (mut ws, _) = setup(vec![]);
        ws.select_span(2.0, 16.0);
        ws.set_channel("Hp").unwrap();
        assert_eq!(ws.view().tfr.as_ref().unwrap().channel, "Hp");
        assert!(ws.set_channel("Zz").is_err());
        assert_eq!(ws.channel(), "Hp");
    }
}
