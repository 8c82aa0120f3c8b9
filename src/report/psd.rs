use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Workbook, Worksheet};
use tracing::{info, warn};

use super::{write_bands, write_spectrum};
use crate::error::Result;
use crate::paths::psd_report_path;
use crate::recording::Recording;
use crate::spectral::{
    band_average, event_averaged_psd, welch_psd, BandRule, BandTable, DisplayMode, PsdTable,
    DEFAULT_N_FFT, REPORT_BANDS,
};

// (power title, amplitude title); sheet names are capped at 31 characters
const CHANNELS_SHEET: (&str, &str) = ("PSD channels", "PSD channels (Ampl)");
const BANDS_SHEET: (&str, &str) = ("PSD average by group", "PSD average by group (Ampl)");
const EVENTS_SHEET: (&str, &str) = ("PSD average in events", "PSD average in events (Ampl)");
const EVENT_BANDS_SHEET: (&str, &str) = ("PSD average in events by group", "PSD events by group (Ampl)");

#[derive(Debug, Clone, PartialEq)]
pub enum SheetData {
    Spectrum(PsdTable),
    Bands(BandTable),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSheet {
    pub title: String,
    pub data: SheetData,
}

fn title(names: (&str, &str), mode: DisplayMode) -> String {
    let name = if mode.is_amplitude() { names.1 } else { names.0 };
    name.to_string()
}

/// Computes the sheets of the PSD report, in workbook order.
///
/// Channels marked bad are left out. Band means are taken over power and
/// converted to amplitude afterwards in amplitude mode.
pub fn build_psd_report(recording: &Recording, mode: DisplayMode) -> Result<Vec<ReportSheet>> {
    let channels: Vec<&str> = recording
        .ch_names()
        .iter()
        .filter(|c| !recording.bad_channels().contains(*c))
        .map(String::as_str)
        .collect();

    let psd = welch_psd(recording, &channels, DEFAULT_N_FFT)?;
    let bands = band_average(&psd, &REPORT_BANDS, BandRule::HalfOpen)?;
    let mut sheets = vec![
        ReportSheet { title: title(CHANNELS_SHEET, mode), data: SheetData::Spectrum(mode.psd(&psd)) },
        ReportSheet { title: title(BANDS_SHEET, mode), data: SheetData::Bands(mode.bands(&bands)) },
    ];

    if recording.count_non_bad_events() > 0 {
        match event_averaged_psd(recording, &channels) {
            Ok(events) => {
                let event_bands = band_average(&events, &REPORT_BANDS, BandRule::HalfOpen)?;
                sheets.push(ReportSheet {
                    title: title(EVENTS_SHEET, mode),
                    data: SheetData::Spectrum(mode.psd(&events)),
                });
                sheets.push(ReportSheet {
                    title: title(EVENT_BANDS_SHEET, mode),
                    data: SheetData::Bands(mode.bands(&event_bands)),
                });
            }
            Err(e) => warn!(error = %e, "event sheets skipped"),
        }
    }

    Ok(sheets)
}

/// Writes `sheets` to a new workbook at `path`, replacing any existing file.
pub fn save_sheets<P: AsRef<Path>>(path: P, sheets: &[ReportSheet]) -> Result<()> {
    let mut workbook = Workbook::new();
    for sheet in sheets {
        let mut worksheet = Worksheet::new();
        worksheet.set_name(sheet.title.as_str())?;
        match &sheet.data {
            SheetData::Spectrum(table) => write_spectrum(&mut worksheet, table)?,
            SheetData::Bands(table) => write_bands(&mut worksheet, table)?,
        }
        workbook.push_worksheet(worksheet);
    }
    workbook.save(path.as_ref())?;
    Ok(())
}

/// Writes `02_psd/<stem>__report.xlsx` next to `source` and returns its path.
pub fn write_psd_report<P: AsRef<Path>>(source: P, recording: &Recording, mode: DisplayMode) -> Result<PathBuf> {
    let path = psd_report_path(source)?;
    let sheets = build_psd_report(recording, mode)?;
    save_sheets(&path, &sheets)?;
    info!(path = %path.display(), sheets = sheets.len(), "PSD report saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Annotation;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use std::f64::consts::PI;

    fn recording(annotations: Vec<Annotation>) -> Recording {
        let sfreq = 250.0;
        let data = Array2::from_shape_fn((2, 5000), |(c, t)| {
            (c + 1) as f64 * 1e-5 * (2.0 * PI * 7.0 * t as f64 / sfreq).sin()
        });
        Recording::new(vec!["Cx".into(), "Hp".into()], data, sfreq)
            .unwrap()
            .with_annotations(annotations)
    }

    fn titles(sheets: &[ReportSheet]) -> Vec<&str> {
        sheets.iter().map(|s| s.title.as_str()).collect()
    }

    #[test]
    fn power_sheets_without_events() {
        let sheets = build_psd_report(&recording(vec![]), DisplayMode::Power).unwrap();
        assert_eq!(titles(&sheets), ["PSD channels", "PSD average by group"]);
        let SheetData::Spectrum(psd) = &sheets[0].data else { panic!("spectrum expected") };
        assert_eq!(psd.channels, ["Cx", "Hp"]);
        assert_eq!(psd.freqs.len(), 1001);
    }

    #[test]
    fn amplitude_sheets_with_events() {
        let events = vec![Annotation::new(5.0, 0.0, "Tone"), Annotation::new(10.0, 0.0, "Tone")];
        let sheets = build_psd_report(&recording(events), DisplayMode::Amplitude).unwrap();
        assert_eq!(
            titles(&sheets),
            [
                "PSD channels (Ampl)",
                "PSD average by group (Ampl)",
                "PSD average in events (Ampl)",
                "PSD events by group (Ampl)",
            ]
        );
        assert!(sheets.iter().all(|s| s.title.len() <= 31));
    }

    #[test]
    fn amplitude_bands_are_sqrt_of_power_means() {
        let rec = recording(vec![]);
        let power = build_psd_report(&rec, DisplayMode::Power).unwrap();
        let ampl = build_psd_report(&rec, DisplayMode::Amplitude).unwrap();
        let (SheetData::Bands(p), SheetData::Bands(a)) = (&power[1].data, &ampl[1].data) else {
            panic!("band tables expected")
        };
        assert_eq!(p.labels, ["1 < f <= 5", "5 < f <= 10", "10 < f <= 20", "20 < f <= 50"]);
        assert_relative_eq!(a.values[[1, 1]], p.values[[1, 1]].sqrt());
    }

    #[test]
    fn bad_channels_are_excluded() {
        let mut rec = recording(vec![]);
        rec.toggle_bad_channel("Hp").unwrap();
        let sheets = build_psd_report(&rec, DisplayMode::Power).unwrap();
        let SheetData::Bands(bands) = &sheets[1].data else { panic!("band table expected") };
        assert_eq!(bands.channels, ["Cx"]);
    }
}
