//! Accept/cancel flow around a filtered recording whose bad spans and bad
//! channels are being edited.
//!
//! ```text
//! Editing --accept--> Accepted(path)   (filtered EDF written)
//!         --cancel--> Cancelled        (nothing written)
//! ```
//! Both end states are terminal; any further action fails with
//! `RatatError::FlowClosed`.
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::info;

use crate::error::{RatatError, Result};
use crate::paths::filtered_path;
use crate::recording::{OnMissing, Recording};
use crate::session::{Notifier, Session};
use crate::types::{Annotation, BAD_PREFIX};

/// Channels removed before filtering unless the caller says otherwise.
pub const DEFAULT_DROP_CHANNELS: [&str; 1] = ["Accelerometer"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorState {
    Editing,
    Accepted(PathBuf),
    Cancelled,
}

pub struct BadEditor {
    source: PathBuf,
    recording: Recording,
    state: EditorState,
    plot_scaling: f64,
    notifier: Rc<dyn Notifier>,
}

impl BadEditor {
    /// Loads `source`, drops `drop_channels` (missing ones ignored) and
    /// band-passes with the session's filter settings.
    pub fn open<P: AsRef<Path>>(session: &Session, source: P, drop_channels: &[&str]) -> Result<Self> {
        let source = source.as_ref();
        info!(file = %source.display(), "opening for bad-segment editing");
        let recording = Recording::load(source)?;
        Self::new(session, source, recording, drop_channels)
    }

    pub fn new<P: AsRef<Path>>(
        session: &Session,
        source: P,
        recording: Recording,
        drop_channels: &[&str],
    ) -> Result<Self> {
        if !drop_channels.is_empty() {
            info!(channels = %drop_channels.join(", "), "removing channels");
        }
        let (low, high) = session.settings().filter_band();
        let recording = recording.drop_channels(drop_channels, OnMissing::Ignore)?.filter(low, high)?;

        Ok(BadEditor {
            source: source.as_ref().to_path_buf(),
            recording,
            state: EditorState::Editing,
            plot_scaling: session.settings().plot_scalings_input,
            notifier: session.notifier(),
        })
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    /// `Some(true)` once accepted, `Some(false)` once cancelled.
    pub fn outcome(&self) -> Option<bool> {
        match self.state {
            EditorState::Editing => None,
            EditorState::Accepted(_) => Some(true),
            EditorState::Cancelled => Some(false),
        }
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    /// Trace scaling for the inspector, from settings.
    pub fn plot_scaling(&self) -> f64 {
        self.plot_scaling
    }

    fn editing(&mut self) -> Result<&mut Recording> {
        match self.state {
            EditorState::Editing => Ok(&mut self.recording),
            _ => Err(RatatError::FlowClosed),
        }
    }

    /// Marks `[onset, onset + duration]` as `BAD_`.
    pub fn add_bad_span(&mut self, onset: f64, duration: f64) -> Result<()> {
        self.editing()?.add_annotation(Annotation::new(onset, duration, BAD_PREFIX));
        Ok(())
    }

    pub fn add_annotation(&mut self, annotation: Annotation) -> Result<()> {
        self.editing()?.add_annotation(annotation);
        Ok(())
    }

    pub fn remove_annotation(&mut self, index: usize) -> Result<Annotation> {
        self.editing()?.remove_annotation(index)
    }

    pub fn toggle_bad_channel(&mut self, name: &str) -> Result<bool> {
        self.editing()?.toggle_bad_channel(name)
    }

    /// Writes the filtered recording to `01_filtered/<stem>__F.edf`,
    /// overwriting, and closes the flow. On failure the flow stays open.
    pub fn accept(&mut self) -> Result<PathBuf> {
        self.editing()?;
        let path = filtered_path(&self.source)?;
        info!(path = %path.display(), "saving data to file");
        self.recording.export(&path, true)?;

        self.notifier.success(&format!("Saved file: {}", path.display()));
        self.state = EditorState::Accepted(path.clone());
        Ok(path)
    }

    /// Closes the flow without writing.
    pub fn cancel(&mut self) -> Result<()> {
        self.editing()?;
        self.state = EditorState::Cancelled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryNotifier;
    use crate::Settings;
    use ndarray::Array2;
    use std::f64::consts::PI;

    fn raw() -> Recording {
        let sfreq = 250.0;
        let data = Array2::from_shape_fn((2, 5000), |(c, t)| {
            let t = t as f64 / sfreq;
            1e-5 * (2.0 * PI * 8.0 * t).sin() + 1e-4 * c as f64 + 5e-6 * (2.0 * PI * 80.0 * t).sin()
        });
        Recording::new(vec!["Cx".into(), "Accelerometer".into()], data, sfreq).unwrap()
    }

    fn editor(dir: &Path) -> BadEditor {
        let session = Session::new(Settings::default(), MemoryNotifier::new());
        BadEditor::new(&session, dir.join("rat.bdf"), raw(), &DEFAULT_DROP_CHANNELS).unwrap()
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ratat_editor_{}_{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn opens_filtered_without_accelerometer() {
        let dir = scratch("open");
        let ed = editor(&dir);
        assert_eq!(ed.recording().ch_names(), ["Cx"]);
        assert_eq!(ed.recording().prefilter(), "HP:0.6Hz LP:40Hz");
        assert_eq!(ed.state(), &EditorState::Editing);
        assert_eq!(ed.plot_scaling(), 2e-3);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn accept_writes_filtered_file() {
        let dir = scratch("accept");
        let mut ed = editor(&dir);
        ed.add_bad_span(2.0, 1.5).unwrap();

        let path = ed.accept().unwrap();
        assert_eq!(path, dir.join("01_filtered").join("rat__F.edf"));
        assert_eq!(ed.outcome(), Some(true));

        let back = Recording::load(&path).unwrap();
        assert_eq!(back.ch_names(), ["Cx"]);
        assert_eq!(back.bad_spans().len(), 1);

        // 已关闭
        assert!(matches!(ed.add_bad_span(0.0, 1.0), Err(RatatError::FlowClosed)));
        assert!(matches!(ed.accept(), Err(RatatError::FlowClosed)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn cancel_writes_nothing() {
        let dir = scratch("cancel");
        let mut ed = editor(&dir);
        ed.cancel().unwrap();
        assert_eq!(ed.outcome(), Some(false));
        assert!(!dir.join("01_filtered").exists());
        assert!(matches!(ed.cancel(), Err(RatatError::FlowClosed)));
        assert!(matches!(ed.toggle_bad_channel("Cx"), Err(RatatError::FlowClosed)));
        std::fs::remove_dir_all(&dir).ok();
    }
}
