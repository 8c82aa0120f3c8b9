//! In-memory multichannel recording with its annotation store.
//!
//! A [`Recording`] is loaded fully into memory from an EDF/BDF file (or built
//! from an array), and every transform (`pick_channels`, `drop_channels`,
//! `crop`, `filter`) returns a new value, leaving the source untouched.
//! Samples are held in volts, shape `[channels, times]`.
use std::path::Path;

use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use tracing::{debug, info, warn};

use crate::error::{RatatError, Result};
use crate::filter::{apply_fir_zero_phase, design_band_filter};
use crate::reader::EdfReader;
use crate::types::{Annotation, RecordingInfo, SignalParam};
use crate::utils::{atof_nonlocalized, format_edf_number, format_tal_time, Rounding};
use crate::writer::EdfWriter;

/// Extensions accepted by [`Recording::load`] (case-sensitive).
pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["edf", "bdf"];

/// Unit written for channels that were not loaded from a file.
const DEFAULT_UNIT: &str = "uV";

/// Longest data record tried when laying out an export.
const MAX_RECORD_SECONDS: u32 = 60;

/// Longest data record the writer accepts.
const MAX_HEADER_RECORD_SECONDS: f64 = 3600.0;

/// What to do when a channel named for removal does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnMissing {
    Raise,
    Ignore,
}

#[derive(Debug, Clone)]
pub struct Recording {
    ch_names: Vec<String>,
    units: Vec<String>,
    data: Array2<f64>,
    sfreq: f64,
    annotations: Vec<Annotation>,
    bad_channels: Vec<String>,
    highpass: Option<f64>,
    lowpass: Option<f64>,
    info: RecordingInfo,
}

/// Volts per unit of a physical dimension; unknown dimensions pass through.
pub fn unit_scale(dimension: &str) -> f64 {
    match dimension.trim() {
        "uV" | "µV" | "μV" => 1e-6,
        "mV" => 1e-3,
        "nV" => 1e-9,
        _ => 1.0,
    }
}

/// Micro prefixes are stored as ASCII so they survive a round trip.
fn normalize_unit(dimension: &str) -> String {
    match dimension.trim() {
        "µV" | "μV" => "uV".to_string(),
        other => other.to_string(),
    }
}

impl Recording {
    /// Builds a recording from samples in volts, one row per channel.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ndarray::Array2;
    /// use ratat::Recording;
    ///
    /// let data = Array2::zeros((2, 1000));
    /// let rec = Recording::new(vec!["Cx".into(), "Hp".into()], data, 250.0)?;
    /// assert_eq!(rec.n_times(), 1000);
    /// assert_eq!(rec.duration(), 4.0);
    /// # Ok::<(), ratat::RatatError>(())
    /// ```
    pub fn new(ch_names: Vec<String>, data: Array2<f64>, sfreq: f64) -> Result<Self> {
        if !(sfreq.is_finite() && sfreq > 0.0) {
            return Err(RatatError::InvalidParameter(format!("sampling rate must be positive, got {sfreq}")));
        }
        if data.nrows() != ch_names.len() {
            return Err(RatatError::InvalidParameter(format!(
                "{} channel names for {} data rows",
                ch_names.len(),
                data.nrows()
            )));
        }
        for (i, name) in ch_names.iter().enumerate() {
            if ch_names[..i].contains(name) {
                return Err(RatatError::InvalidParameter(format!("duplicate channel name {name}")));
            }
        }

        Ok(Recording {
            units: vec![DEFAULT_UNIT.to_string(); ch_names.len()],
            ch_names,
            data,
            sfreq,
            annotations: Vec::new(),
            bad_channels: Vec::new(),
            highpass: None,
            lowpass: None,
            info: RecordingInfo::default(),
        })
    }

    /// Replaces the annotation list, builder style.
    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations = annotations;
        self
    }

    /// Loads an `.edf` or `.bdf` file fully into memory.
    ///
    /// Channels with a lower sampling rate than the fastest one are
    /// linearly interpolated up to it.
    ///
    /// # Errors
    ///
    /// * `RatatError::UnsupportedFormat` - the extension is not `edf` or `bdf`
    /// * any error from [`EdfReader::open`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !SUPPORTED_EXTENSIONS.contains(&extension) {
            return Err(RatatError::UnsupportedFormat(path.display().to_string()));
        }

        let mut reader = EdfReader::open(path)?;
        let header = reader.header();
        let n_signals = header.signals.len();
        if n_signals == 0 {
            return Err(RatatError::InvalidFormat(format!("{} has no data channels", path.display())));
        }

        let mut rates = Vec::with_capacity(n_signals);
        for i in 0..n_signals {
            let rate = header
                .sample_rate(i)
                .ok_or_else(|| RatatError::InvalidFormat(format!("signal {i} has no sampling rate")))?;
            rates.push(rate);
        }
        let sfreq = rates.iter().cloned().fold(0.0_f64, f64::max);
        let record_seconds = header.datarecord_duration as f64 / crate::EDFLIB_TIME_DIMENSION as f64;
        let n_times = (header.datarecords_in_file.max(0) as f64 * record_seconds * sfreq).round() as usize;

        let params: Vec<SignalParam> = header.signals.clone();
        let info = header.info.clone();
        let annotations = reader.annotations().to_vec();

        let mut data = Array2::<f64>::zeros((n_signals, n_times));
        for (i, param) in params.iter().enumerate() {
            let raw = reader.read_physical_samples(i, param.samples_in_file.max(0) as usize)?;
            let scale = unit_scale(&param.physical_dimension);
            let volts: Vec<f64> = raw.iter().map(|v| v * scale).collect();
            let row = if (rates[i] - sfreq).abs() > f64::EPSILON {
                debug!(channel = %param.label, from = rates[i], to = sfreq, "resampling channel");
                resample_linear(&volts, rates[i], sfreq, n_times)
            } else {
                volts
            };
            let n = row.len().min(n_times);
            data.row_mut(i).slice_mut(s![..n]).assign(&ArrayView1::from(&row[..n]));
        }

        info!(
            path = %path.display(),
            channels = n_signals,
            n_times,
            sfreq,
            annotations = annotations.len(),
            "loaded recording"
        );

        Ok(Recording {
            ch_names: params.iter().map(|p| p.label.clone()).collect(),
            units: params.iter().map(|p| normalize_unit(&p.physical_dimension)).collect(),
            data,
            sfreq,
            annotations,
            bad_channels: Vec::new(),
            highpass: None,
            lowpass: None,
            info,
        })
    }

    pub fn ch_names(&self) -> &[String] {
        &self.ch_names
    }

    pub fn sfreq(&self) -> f64 {
        self.sfreq
    }

    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.n_times() as f64 / self.sfreq
    }

    /// Sample times in seconds from the first sample.
    pub fn times(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.n_times(), |i| i as f64 / self.sfreq)
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn info(&self) -> &RecordingInfo {
        &self.info
    }

    pub fn channel_index(&self, name: &str) -> Result<usize> {
        self.ch_names
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| RatatError::ChannelNotFound(name.to_string()))
    }

    pub fn channel_data(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        Ok(self.data.row(self.channel_index(name)?))
    }

    /// Ordered subset of channels.
    pub fn pick_channels<S: AsRef<str>>(&self, names: &[S]) -> Result<Recording> {
        let indices = names
            .iter()
            .map(|n| self.channel_index(n.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.select_rows(&indices))
    }

    /// Removes the named channels.
    ///
    /// With `OnMissing::Ignore` names that aren't present are skipped and
    /// the call never fails.
    pub fn drop_channels<S: AsRef<str>>(&self, names: &[S], on_missing: OnMissing) -> Result<Recording> {
        if on_missing == OnMissing::Raise {
            for name in names {
                self.channel_index(name.as_ref())?;
            }
        }
        let keep: Vec<usize> = (0..self.ch_names.len())
            .filter(|&i| !names.iter().any(|n| n.as_ref() == self.ch_names[i]))
            .collect();
        Ok(self.select_rows(&keep))
    }

    fn select_rows(&self, indices: &[usize]) -> Recording {
        let ch_names: Vec<String> = indices.iter().map(|&i| self.ch_names[i].clone()).collect();
        Recording {
            units: indices.iter().map(|&i| self.units[i].clone()).collect(),
            data: self.data.select(Axis(0), indices),
            bad_channels: self
                .bad_channels
                .iter()
                .filter(|b| ch_names.contains(b))
                .cloned()
                .collect(),
            ch_names,
            sfreq: self.sfreq,
            annotations: self.annotations.clone(),
            highpass: self.highpass,
            lowpass: self.lowpass,
            info: self.info.clone(),
        }
    }

    /// Keeps samples `round(tmin·sfreq) ..= round(tmax·sfreq)`.
    ///
    /// Annotations overlapping the window are clipped to it and shifted so
    /// that onsets stay relative to the new first sample.
    pub fn crop(&self, tmin: f64, tmax: f64) -> Result<Recording> {
        if !(tmin.is_finite() && tmax.is_finite()) || tmin < 0.0 || tmin > tmax {
            return Err(RatatError::InvalidSelection(format!("cannot crop to [{tmin}, {tmax}]")));
        }
        let start = (tmin * self.sfreq).round() as usize;
        if start >= self.n_times() {
            return Err(RatatError::InvalidSelection(format!(
                "crop start {tmin} s is past the end ({} s)",
                self.duration()
            )));
        }
        let stop = ((tmax * self.sfreq).round() as usize).min(self.n_times() - 1);

        let t0 = start as f64 / self.sfreq;
        let t1 = stop as f64 / self.sfreq;
        let annotations = self
            .annotations
            .iter()
            .filter(|a| a.overlaps(t0, t1))
            .map(|a| {
                let onset = a.onset.max(t0);
                let end = a.end().min(t1);
                Annotation::new(onset - t0, (end - onset).max(0.0), a.description.clone())
            })
            .collect();

        Ok(Recording {
            ch_names: self.ch_names.clone(),
            units: self.units.clone(),
            data: self.data.slice(s![.., start..=stop]).to_owned(),
            sfreq: self.sfreq,
            annotations,
            bad_channels: self.bad_channels.clone(),
            highpass: self.highpass,
            lowpass: self.lowpass,
            info: self.info.clone(),
        })
    }

    /// Zero-phase FIR band-pass. `None` on one side gives a low- or
    /// high-pass; `None` on both sides returns an unchanged copy.
    pub fn filter(&self, low_hz: Option<f64>, high_hz: Option<f64>) -> Result<Recording> {
        let mut filtered = self.clone();
        let Some(h) = design_band_filter(low_hz, high_hz, self.sfreq)? else {
            return Ok(filtered);
        };

        debug!(?low_hz, ?high_hz, taps = h.len(), "filtering recording");
        apply_fir_zero_phase(&mut filtered.data, &h);
        if low_hz.is_some() {
            filtered.highpass = low_hz;
        }
        if high_hz.is_some() {
            filtered.lowpass = high_hz;
        }
        Ok(filtered)
    }

    /// Prefilter text written to the signal headers.
    pub fn prefilter(&self) -> String {
        let mut parts = Vec::new();
        if let Some(hp) = self.highpass {
            parts.push(format!("HP:{hp}Hz"));
        }
        if let Some(lp) = self.lowpass {
            parts.push(format!("LP:{lp}Hz"));
        }
        parts.join(" ")
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Annotations without the `BAD_` prefix, in stored order.
    pub fn non_bad_events(&self) -> Vec<&Annotation> {
        self.annotations.iter().filter(|a| !a.is_bad()).collect()
    }

    /// `(onset, duration)` of every `BAD_` annotation.
    pub fn bad_spans(&self) -> Vec<(f64, f64)> {
        self.annotations
            .iter()
            .filter(|a| a.is_bad())
            .map(|a| (a.onset, a.duration))
            .collect()
    }

    pub fn count_non_bad_events(&self) -> usize {
        self.annotations.iter().filter(|a| !a.is_bad()).count()
    }

    /// Whether any `BAD_` annotation touches `[tmin, tmax]`.
    pub fn overlaps_bad(&self, tmin: f64, tmax: f64) -> bool {
        self.annotations.iter().any(|a| a.is_bad() && a.overlaps(tmin, tmax))
    }

    pub fn add_annotation(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    pub fn remove_annotation(&mut self, index: usize) -> Result<Annotation> {
        if index >= self.annotations.len() {
            return Err(RatatError::NotFound(format!("annotation #{index}")));
        }
        Ok(self.annotations.remove(index))
    }

    pub fn bad_channels(&self) -> &[String] {
        &self.bad_channels
    }

    /// Flips the bad flag of a channel and returns the new state.
    pub fn toggle_bad_channel(&mut self, name: &str) -> Result<bool> {
        self.channel_index(name)?;
        if let Some(pos) = self.bad_channels.iter().position(|b| b == name) {
            self.bad_channels.remove(pos);
            Ok(false)
        } else {
            self.bad_channels.push(name.to_string());
            Ok(true)
        }
    }

    /// Writes the recording as EDF+C.
    ///
    /// Records are laid out so that they hold exactly `n_times` samples:
    /// the shortest whole-second record when it divides the length, else the
    /// longest record dividing the length whose duration fits the header
    /// field. Only when no such record exists is the last one padded with the
    /// final sample. Physical limits are taken from the data.
    ///
    /// # Errors
    ///
    /// `RatatError::Export` when `path` exists and `overwrite` is false, or
    /// when the recording can't be represented in EDF.
    pub fn export<P: AsRef<Path>>(&self, path: P, overwrite: bool) -> Result<()> {
        let path = path.as_ref();
        if path.exists() && !overwrite {
            return Err(RatatError::Export(format!(
                "{} already exists, consider setting overwrite=true",
                path.display()
            )));
        }

        self.write_edf(path)
            .map_err(|e| RatatError::Export(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), channels = self.ch_names.len(), "exported recording");
        Ok(())
    }

    fn write_edf(&self, path: &Path) -> Result<()> {
        if self.ch_names.is_empty() {
            return Err(RatatError::InvalidFormat("no channels to export".to_string()));
        }
        if self.n_times() == 0 {
            return Err(RatatError::InvalidFormat("no samples to export".to_string()));
        }
        let (record_seconds, spr) = match record_layout(self.sfreq, self.n_times()) {
            Some(layout) => layout,
            None => {
                let layout = whole_second_layout(self.sfreq).ok_or_else(|| {
                    RatatError::InvalidFormat(format!(
                        "sampling rate {} Hz gives no integer record length up to {} s",
                        self.sfreq, MAX_RECORD_SECONDS
                    ))
                })?;
                warn!(n_times = self.n_times(), spr = layout.1, "no record length divides the recording, last record padded");
                layout
            }
        };
        let n_records = self.n_times().div_ceil(spr);

        // 物理值按通道单位换算
        let scaled: Vec<Vec<f64>> = self
            .data
            .rows()
            .into_iter()
            .zip(&self.units)
            .map(|(row, unit)| {
                let scale = unit_scale(unit);
                row.iter().map(|v| v / scale).collect()
            })
            .collect();

        let mut writer = EdfWriter::create(path)?;
        writer.set_recording_info(self.info.clone())?;
        writer.set_datarecord_duration(record_seconds)?;
        writer.set_expected_datarecords(n_records)?;

        let prefilter = self.prefilter();
        for ((name, unit), samples) in self.ch_names.iter().zip(&self.units).zip(&scaled) {
            let (physical_min, physical_max) = physical_range(samples)?;
            writer.add_signal(SignalParam {
                label: name.clone(),
                samples_in_file: 0,
                physical_max,
                physical_min,
                digital_max: 32767,
                digital_min: -32768,
                samples_per_record: spr as i32,
                physical_dimension: unit.clone(),
                prefilter: prefilter.clone(),
                transducer: String::new(),
            })?;
        }

        for annotation in &self.annotations {
            if annotation.onset < 0.0 || annotation.description.is_empty() {
                warn!(description = %annotation.description, onset = annotation.onset, "annotation can't be exported, skipped");
                continue;
            }
            let duration = (annotation.duration > 0.0).then_some(annotation.duration);
            writer.add_annotation(annotation.onset, duration, &annotation.description)?;
        }

        let mut record = vec![Vec::with_capacity(spr); scaled.len()];
        for r in 0..n_records {
            for (buf, samples) in record.iter_mut().zip(&scaled) {
                buf.clear();
                let start = r * spr;
                let end = (start + spr).min(samples.len());
                buf.extend_from_slice(&samples[start..end]);
                let last = samples[samples.len() - 1];
                buf.resize(spr, last);
            }
            writer.write_samples(&record)?;
        }
        writer.finalize()
    }
}

/// Shortest whole-second record length with an integer samples-per-record.
fn whole_second_layout(sfreq: f64) -> Option<(f64, usize)> {
    (1..=MAX_RECORD_SECONDS).find_map(|d| {
        let samples = sfreq * d as f64;
        let rounded = samples.round();
        ((samples - rounded).abs() < 1e-6 && rounded >= 1.0).then_some((d as f64, rounded as usize))
    })
}

/// Record length and samples-per-record that tile `n_times` without padding.
fn record_layout(sfreq: f64, n_times: usize) -> Option<(f64, usize)> {
    if n_times == 0 {
        return None;
    }
    if let Some((seconds, spr)) = whole_second_layout(sfreq) {
        if n_times % spr == 0 {
            return Some((seconds, spr));
        }
    }
    let mut divisors: Vec<usize> = (1..)
        .take_while(|d| d * d <= n_times)
        .filter(|d| n_times % d == 0)
        .flat_map(|d| [d, n_times / d])
        .collect();
    divisors.sort_unstable_by(|a, b| b.cmp(a));
    divisors.dedup();
    divisors
        .into_iter()
        .filter_map(|spr| stored_duration(sfreq, spr).map(|seconds| (seconds, spr)))
        .find(|&(seconds, _)| seconds <= MAX_RECORD_SECONDS as f64)
        .or_else(|| stored_duration(sfreq, n_times).map(|seconds| (seconds, n_times)))
}

/// Duration of `spr` samples as the header stores it, when the stored
/// value reproduces `sfreq` on reload.
fn stored_duration(sfreq: f64, spr: usize) -> Option<f64> {
    let units = (spr as f64 / sfreq * crate::EDFLIB_TIME_DIMENSION as f64).round();
    let seconds = units / crate::EDFLIB_TIME_DIMENSION as f64;
    let fits = units >= 1.0 && seconds <= MAX_HEADER_RECORD_SECONDS && format_tal_time(seconds).len() <= 8;
    (fits && (seconds * sfreq - spr as f64).abs() < 1e-6).then_some(seconds)
}

/// Physical limits of a channel, already fitted to the 8-character header
/// fields so the stored calibration matches the encoded samples.
fn physical_range(samples: &[f64]) -> Result<(f64, f64)> {
    let (mut lo, mut hi) = samples
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() || !hi.is_finite() {
        lo = -1.0;
        hi = 1.0;
    } else if lo == hi {
        lo -= 1.0;
        hi += 1.0;
    }
    let lo = atof_nonlocalized(&format_edf_number(lo, 8, Rounding::Down)?);
    let hi = atof_nonlocalized(&format_edf_number(hi, 8, Rounding::Up)?);
    Ok((lo, hi))
}

/// Linear interpolation of `samples` taken at `from` Hz onto `n_out` points at `to` Hz.
fn resample_linear(samples: &[f64], from: f64, to: f64, n_out: usize) -> Vec<f64> {
    if samples.is_empty() {
        return vec![0.0; n_out];
    }
    let last = samples.len() - 1;
    (0..n_out)
        .map(|k| {
            let pos = k as f64 * from / to;
            let i = (pos.floor() as usize).min(last);
            let j = (i + 1).min(last);
            let frac = pos - i as f64;
            if i == j {
                samples[i]
            } else {
                samples[i] + (samples[j] - samples[i]) * frac
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn recording(names: &[&str], n_times: usize, sfreq: f64) -> Recording {
        let data = Array2::from_shape_fn((names.len(), n_times), |(c, t)| (c * 1000 + t) as f64 * 1e-7);
        Recording::new(names.iter().map(|s| s.to_string()).collect(), data, sfreq).unwrap()
    }

    #[test]
    fn test_new_validates_shape() {
        assert!(Recording::new(vec!["a".into()], Array2::zeros((2, 10)), 100.0).is_err());
        assert!(Recording::new(vec!["a".into(), "a".into()], Array2::zeros((2, 10)), 100.0).is_err());
        assert!(Recording::new(vec!["a".into()], Array2::zeros((1, 10)), 0.0).is_err());
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let err = Recording::load("/tmp/recording.EDF").unwrap_err();
        assert!(matches!(err, RatatError::UnsupportedFormat(_)));
        assert!(matches!(Recording::load("/tmp/notes.txt"), Err(RatatError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_drop_channels_ignore_and_raise() {
        let rec = recording(&["Cx", "Hp", "Accelerometer"], 100, 100.0);

        let dropped = rec.drop_channels(&["Accelerometer", "Missing"], OnMissing::Ignore).unwrap();
        assert_eq!(dropped.ch_names(), &["Cx".to_string(), "Hp".to_string()]);
        assert_eq!(dropped.data().row(1), rec.data().row(1));

        let err = rec.drop_channels(&["Missing"], OnMissing::Raise).unwrap_err();
        assert!(matches!(err, RatatError::ChannelNotFound(name) if name == "Missing"));
    }

    #[test]
    fn test_pick_channels_keeps_requested_order() {
        let rec = recording(&["a", "b", "c"], 10, 10.0);
        let picked = rec.pick_channels(&["c", "a"]).unwrap();
        assert_eq!(picked.ch_names(), &["c".to_string(), "a".to_string()]);
        assert_eq!(picked.data().row(0), rec.data().row(2));
        assert!(rec.pick_channels(&["z"]).is_err());
    }

    #[test]
    fn test_crop_is_inclusive_and_shifts_annotations() {
        let rec = recording(&["a"], 1000, 100.0).with_annotations(vec![
            Annotation::new(1.0, 2.0, "BAD_move"),
            Annotation::new(5.0, 0.0, "Tone"),
            Annotation::new(9.0, 0.5, "Late"),
        ]);

        let cropped = rec.crop(2.0, 6.0).unwrap();
        assert_eq!(cropped.n_times(), 401);
        assert_abs_diff_eq!(cropped.data()[[0, 0]], rec.data()[[0, 200]]);

        let ann = cropped.annotations();
        assert_eq!(ann.len(), 2);
        assert_abs_diff_eq!(ann[0].onset, 0.0);
        assert_abs_diff_eq!(ann[0].duration, 1.0);
        assert_abs_diff_eq!(ann[1].onset, 3.0);

        assert!(rec.crop(6.0, 2.0).is_err());
        assert!(rec.crop(20.0, 30.0).is_err());
    }

    #[test]
    fn test_annotation_queries() {
        let mut rec = recording(&["a"], 1000, 100.0).with_annotations(vec![
            Annotation::new(1.0, 0.5, "Tone"),
            Annotation::new(2.0, 1.0, "BAD_"),
            Annotation::new(4.0, 0.5, "Shock"),
        ]);
        let events: Vec<&str> = rec.non_bad_events().iter().map(|a| a.description.as_str()).collect();
        assert_eq!(events, ["Tone", "Shock"]);
        assert_eq!(rec.bad_spans(), vec![(2.0, 1.0)]);
        assert!(rec.overlaps_bad(2.5, 2.6));
        assert!(rec.overlaps_bad(3.0, 3.5));
        assert!(!rec.overlaps_bad(3.1, 3.5));

        let removed = rec.remove_annotation(1).unwrap();
        assert!(removed.is_bad());
        assert_eq!(rec.count_non_bad_events(), 2);
        assert!(matches!(rec.remove_annotation(9), Err(RatatError::NotFound(_))));
    }

    #[test]
    fn test_toggle_bad_channel() {
        let mut rec = recording(&["a", "b"], 10, 10.0);
        assert!(rec.toggle_bad_channel("b").unwrap());
        assert_eq!(rec.bad_channels(), &["b".to_string()]);
        assert!(!rec.toggle_bad_channel("b").unwrap());
        assert!(rec.toggle_bad_channel("zz").is_err());

        rec.toggle_bad_channel("a").unwrap();
        let picked = rec.drop_channels(&["a"], OnMissing::Ignore).unwrap();
        assert!(picked.bad_channels().is_empty());
    }

    #[test]
    fn test_filter_none_is_copy_and_records_band() {
        let rec = recording(&["a"], 2000, 250.0);
        let same = rec.filter(None, None).unwrap();
        assert_eq!(same.data(), rec.data());
        assert_eq!(same.prefilter(), "");

        let filtered = rec.filter(Some(1.0), Some(40.0)).unwrap();
        assert_eq!(filtered.prefilter(), "HP:1Hz LP:40Hz");
        assert!(rec.filter(Some(40.0), Some(1.0)).is_err());
    }

    #[test]
    fn test_record_layout() {
        assert_eq!(whole_second_layout(250.0), Some((1.0, 250)));
        assert_eq!(whole_second_layout(0.5), Some((2.0, 1)));
        assert_eq!(whole_second_layout(2.5), Some((2.0, 5)));
        assert_eq!(whole_second_layout(1.0 / 61.0), None);

        assert_eq!(record_layout(250.0, 5000), Some((1.0, 250)));
        assert_eq!(record_layout(250.0, 2501), Some((10.004, 2501)));
        // 25001 = 23 * 1087
        assert_eq!(record_layout(250.0, 25001), Some((4.348, 1087)));
        // prime length over a minute: one record holds everything
        assert_eq!(record_layout(250.0, 15013), Some((60.052, 15013)));
        // odd length at 256 Hz has no exact 7-decimal duration
        assert_eq!(record_layout(256.0, 2561), None);
    }

    #[test]
    fn test_physical_range_fits_header_and_flat_channels() {
        let (lo, hi) = physical_range(&[3.0, 3.0]).unwrap();
        assert_eq!((lo, hi), (2.0, 4.0));

        let (lo, hi) = physical_range(&[-123.456789123, 98.7654321]).unwrap();
        assert!(lo <= -123.456789123 && hi >= 98.7654321);
        assert!(format_edf_number(lo, 8, Rounding::Down).unwrap().len() <= 8);
    }

    #[test]
    fn test_resample_linear() {
        let up = resample_linear(&[0.0, 2.0, 4.0], 1.0, 2.0, 6);
        assert_eq!(up, vec![0.0, 1.0, 2.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn test_unit_scale() {
        assert_eq!(unit_scale("uV"), 1e-6);
        assert_eq!(unit_scale("µV"), 1e-6);
        assert_eq!(unit_scale("mV"), 1e-3);
        assert_eq!(unit_scale("g"), 1.0);
        assert_eq!(normalize_unit("µV"), "uV");
    }
}
