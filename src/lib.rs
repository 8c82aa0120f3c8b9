//! # ratat
//!
//! Filtering, bad-segment editing, spectral analysis and reporting for
//! rodent electrophysiology recordings stored as EDF/EDF+ or BDF/BDF+.
//!
//! The crate is organised around a [`Recording`]: a multichannel signal in
//! volts plus its annotations. Every analysis flow takes a recording, derives
//! something from it and writes the result next to the source file:
//!
//! | Flow | Output |
//! |------|--------|
//! | [`BadEditor`] | `01_filtered/<stem>__F.edf` |
//! | [`PsdSession`] / [`report::write_psd_report`] | `02_psd/<stem>__report.xlsx` |
//! | [`report::write_fooof_report`] | `foof_report/<stem>__psd.{xlsx,png}` |
//! | [`ChannelSplitter`] | `<stem>_1.edf`, `<stem>_2.edf` |
//!
//! ## Quick Start
//!
//! ### Building and exporting a recording
//!
//! ```rust
//! use ratat::{Annotation, Recording, Result};
//! use ndarray::Array2;
//!
//! fn main() -> Result<()> {
//!     # let dir = std::env::temp_dir().join(format!("ratat_doc_lib_{}", std::process::id()));
//!     # std::fs::create_dir_all(&dir)?;
//!     let sfreq = 250.0;
//!     let data = Array2::from_shape_fn((2, 2500), |(c, t)| {
//!         (c + 1) as f64 * 1e-5 * (t as f64 / sfreq * 8.0 * std::f64::consts::TAU).sin()
//!     });
//!     let recording = Recording::new(vec!["Cx".into(), "Hp".into()], data, sfreq)?
//!         .with_annotations(vec![Annotation::new(2.0, 0.5, "Tone")]);
//!
//!     let path = dir.join("rat.edf");
//!     recording.export(&path, true)?;
//!
//!     let back = Recording::load(&path)?;
//!     assert_eq!(back.ch_names(), recording.ch_names());
//!     assert_eq!(back.n_times(), recording.n_times());
//!     assert_eq!(back.count_non_bad_events(), 1);
//!     # std::fs::remove_dir_all(&dir).ok();
//!     Ok(())
//! }
//! ```
//!
//! ### Spectra and frequency bands
//!
//! ```rust
//! use ratat::spectral::{band_average, welch_psd, BandRule, REPORT_BANDS};
//! use ratat::Recording;
//! use ndarray::Array2;
//!
//! let sfreq = 250.0;
//! let data = Array2::from_shape_fn((1, 5000), |(_, t)| {
//!     1e-5 * (t as f64 / sfreq * 7.0 * std::f64::consts::TAU).sin()
//! });
//! let rec = Recording::new(vec!["Cx".into()], data, sfreq).unwrap();
//!
//! let psd = welch_psd(&rec, rec.ch_names(), 2000).unwrap();
//! assert_eq!(psd.freqs.len(), 1001);
//!
//! // 7 Hz lands in the "5 < f <= 10" band
//! let bands = band_average(&psd, &REPORT_BANDS, BandRule::HalfOpen).unwrap();
//! let theta = bands.values[[0, 1]];
//! assert!(bands.values.row(0).iter().all(|&v| v <= theta));
//! ```
//!
//! ### Marks and selections
//!
//! ```rust
//! use ratat::{Annotation, MarkCatalogue, SelectionSpan, SpanOutcome};
//!
//! let marks = MarkCatalogue::from_annotations(&[
//!     Annotation::new(0.0, 1.0, "Tone"),
//!     Annotation::new(2.0, 1.0, "Tone"),
//! ]);
//! let labels: Vec<&str> = marks.ordered().iter().map(|m| m.label.as_str()).collect();
//! assert_eq!(labels, ["Tone", "Tone1"]);
//!
//! let mut span = SelectionSpan::default();
//! assert_eq!(marks.select("Tone1", &mut span).unwrap(), SpanOutcome::Accepted);
//! assert_eq!(span.get(), Some((2.0, 3.0)));
//! ```
//!
//! ## Units
//!
//! Physical values are held in volts. `uV`, `µV`, `mV` and `nV` channels are
//! scaled on load and scaled back on export, so PSDs come out in V²/Hz.
//!
//! ## Errors
//!
//! Every fallible call returns [`Result`] with a [`RatatError`]. Interactive
//! callers wrap their actions in [`Session::run`], which logs the failure,
//! raises a notice and carries on.

pub mod error;
pub mod types;
pub mod utils;
pub mod reader;
pub mod writer;

pub mod filter;
pub mod recording;
pub mod spectral;
pub mod fooof;

pub mod selection;
pub mod marks;
pub mod settings;
pub mod paths;
pub mod session;

pub mod wavelet;
pub mod psd_view;
pub mod bad_editor;
pub mod splitter;
pub mod report;

pub use error::{RatatError, Result};
pub use types::{Annotation, EdfHeader, FileType, RecordingInfo, SignalParam};
pub use reader::EdfReader;
pub use writer::EdfWriter;

pub use recording::{OnMissing, Recording};
pub use spectral::{BandTable, DisplayMode, MorletParams, PsdTable, TfrTable};
pub use fooof::{FooofFit, FooofSettings};

pub use selection::{SelectionSpan, SpanOutcome};
pub use marks::{Mark, MarkCatalogue};
pub use settings::Settings;
pub use session::{LogNotifier, MemoryNotifier, NoticeLevel, Notifier, Session};

pub use wavelet::{WaveletSession, WindowedView};
pub use psd_view::{PsdChart, PsdSession};
pub use bad_editor::{BadEditor, EditorState};
pub use splitter::{ChannelSplitter, Side};

// 时间单位: 100 纳秒
pub const EDFLIB_TIME_DIMENSION: i64 = 10_000_000;
pub const EDFLIB_MAXSIGNALS: usize = 640;
pub const EDFLIB_MAX_ANNOTATION_LEN: usize = 512;

/// Library version.
///
/// ```rust
/// assert!(ratat::version().contains('.'));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
