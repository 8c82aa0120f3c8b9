use std::path::{Path, PathBuf};

use plotters::prelude::*;
use rust_xlsxwriter::Workbook;
use tracing::info;

use super::{plot_err, write_finite};
use crate::error::{RatatError, Result};
use crate::fooof::{fit_spectrum, FooofFit, FooofSettings};
use crate::paths::fooof_report_paths;
use crate::recording::Recording;
use crate::spectral::{welch_psd, PsdTable, EPOCH_N_FFT};

pub const FILE_COL: u16 = 0;
pub const CHANNEL_COL: u16 = 1;
pub const R2_COL: u16 = 2;
pub const ERROR_COL: u16 = 3;
pub const OFFSET_COL: u16 = 5;
pub const EXPONENT_COL: u16 = 6;
/// First column of the `(CF, PW, BW)` triples.
pub const PERIODIC_COL: u16 = 8;
/// Columns taken by one triple, including the blank separator.
pub const PEAK_STRIDE: u16 = 4;

const PANEL_SIZE: (u32, u32) = (400, 300);

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelFit {
    pub channel: String,
    pub fit: FooofFit,
}

/// Welch PSD of every channel with `n_fft = min(256, n_times)`, cut to
/// `freq < max_freq` when given.
pub fn fooof_spectra(recording: &Recording, max_freq: Option<f64>) -> Result<PsdTable> {
    let n_fft = EPOCH_N_FFT.min(recording.n_times());
    let psd = welch_psd(recording, recording.ch_names(), n_fft)?;
    Ok(match max_freq {
        Some(max) => psd.filter_freqs(|f| f < max),
        None => psd,
    })
}

pub fn fit_channels(recording: &Recording, max_freq: Option<f64>, settings: &FooofSettings) -> Result<Vec<ChannelFit>> {
    let psd = fooof_spectra(recording, max_freq)?;
    psd.channels
        .iter()
        .enumerate()
        .map(|(c, channel)| {
            let power = psd.values.column(c).to_vec();
            let fit = fit_spectrum(&psd.freqs, &power, settings)?;
            Ok(ChannelFit { channel: channel.clone(), fit })
        })
        .collect()
}

/// One row per channel under a fixed header row.
pub fn write_fooof_workbook<P: AsRef<Path>>(path: P, file_name: &str, fits: &[ChannelFit]) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    sheet.write_string(0, FILE_COL, "File")?;
    sheet.write_string(0, CHANNEL_COL, "Channel")?;
    sheet.write_string(0, R2_COL, "R^2 of model")?;
    sheet.write_string(0, ERROR_COL, "Error of the fit")?;
    sheet.write_string(0, OFFSET_COL, "Offset (apper)")?;
    sheet.write_string(0, EXPONENT_COL, "Exponent (apper)")?;
    sheet.write_string(0, PERIODIC_COL, "Periodic component data (CF, PW, BW)")?;

    for (i, ChannelFit { channel, fit }) in fits.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_string(row, FILE_COL, file_name)?;
        sheet.write_string(row, CHANNEL_COL, channel.as_str())?;
        write_finite(sheet, row, R2_COL, fit.r_squared)?;
        write_finite(sheet, row, ERROR_COL, fit.error)?;
        write_finite(sheet, row, OFFSET_COL, fit.offset)?;
        write_finite(sheet, row, EXPONENT_COL, fit.exponent)?;

        for (k, peak) in fit.peaks.iter().enumerate() {
            let col = super::column(PERIODIC_COL as usize + k * PEAK_STRIDE as usize)?;
            write_finite(sheet, row, col, peak.cf)?;
            write_finite(sheet, row, col + 1, peak.pw)?;
            write_finite(sheet, row, col + 2, peak.bw)?;
        }
    }

    workbook.save(path.as_ref())?;
    Ok(())
}

fn value_range<'a>(series: impl IntoIterator<Item = &'a [f64]>) -> (f64, f64) {
    let (lo, hi) = series
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.05).max(1e-3);
    (lo - pad, hi + pad)
}

fn points(freqs: &[f64], values: &[f64]) -> Vec<(f64, f64)> {
    freqs
        .iter()
        .zip(values)
        .filter(|(_, v)| v.is_finite())
        .map(|(&f, &v)| (f, v))
        .collect()
}

/// 3 × n grid: log spectrum; spectrum with model and aperiodic fit;
/// flattened spectrum over shaded peaks.
pub fn draw_fooof_figure<P: AsRef<Path>>(path: P, fits: &[ChannelFit]) -> Result<()> {
    if fits.is_empty() {
        return Err(RatatError::InvalidParameter("no channels to draw".to_string()));
    }
    let n = fits.len();
    let size = (PANEL_SIZE.0 * n as u32, PANEL_SIZE.1 * 3);
    let root = BitMapBackend::new(path.as_ref(), size).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    let panels = root.split_evenly((3, n));

    for (col, ChannelFit { fit, .. }) in fits.iter().enumerate() {
        let x = match (fit.freqs.first(), fit.freqs.last()) {
            (Some(&a), Some(&b)) if b > a => a..b,
            _ => 0.0..1.0,
        };
        let flattened = fit.flattened();

        // 行0: 对数功率谱
        let (lo, hi) = value_range([fit.spectrum.as_slice()]);
        let mut chart = ChartBuilder::on(&panels[col])
            .margin(10)
            .build_cartesian_2d(x.clone(), lo..hi)
            .map_err(plot_err)?;
        chart
            .draw_series(LineSeries::new(points(&fit.freqs, &fit.spectrum), &BLACK))
            .map_err(plot_err)?;

        // 行1: 模型拟合
        let (lo, hi) = value_range([fit.spectrum.as_slice(), fit.model.as_slice(), fit.aperiodic_fit.as_slice()]);
        let mut chart = ChartBuilder::on(&panels[n + col])
            .margin(10)
            .build_cartesian_2d(x.clone(), lo..hi)
            .map_err(plot_err)?;
        chart
            .draw_series(LineSeries::new(points(&fit.freqs, &fit.spectrum), &BLACK))
            .map_err(plot_err)?;
        chart
            .draw_series(LineSeries::new(points(&fit.freqs, &fit.model), RED.stroke_width(2)))
            .map_err(plot_err)?;
        chart
            .draw_series(LineSeries::new(points(&fit.freqs, &fit.aperiodic_fit), &BLUE))
            .map_err(plot_err)?;

        // 行2: 去除非周期成分后的谱
        let (lo, hi) = value_range([flattened.as_slice(), fit.peak_fit.as_slice(), [0.0].as_slice()]);
        let mut chart = ChartBuilder::on(&panels[2 * n + col])
            .margin(10)
            .build_cartesian_2d(x, lo..hi)
            .map_err(plot_err)?;
        chart
            .draw_series(AreaSeries::new(points(&fit.freqs, &fit.peak_fit), 0.0, GREEN.mix(0.3)))
            .map_err(plot_err)?;
        chart
            .draw_series(LineSeries::new(points(&fit.freqs, &flattened), &BLACK))
            .map_err(plot_err)?;
    }

    root.present().map_err(plot_err)?;
    Ok(())
}

/// Fits every channel of the filtered `recording` and writes
/// `foof_report/<stem>__psd.{xlsx,png}` next to `source`.
pub fn write_fooof_report<P: AsRef<Path>>(
    source: P,
    recording: &Recording,
    max_freq: Option<f64>,
) -> Result<(PathBuf, PathBuf)> {
    let source = source.as_ref();
    info!(source = %source.display(), "starting FOOOF report");
    let file_name = source
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let fits = fit_channels(recording, max_freq, &FooofSettings::default())?;
    let (xlsx, png) = fooof_report_paths(source)?;

    write_fooof_workbook(&xlsx, &file_name, &fits)?;
    info!(path = %xlsx.display(), "FOOOF workbook saved");
    draw_fooof_figure(&png, &fits)?;
    info!(path = %png.display(), "FOOOF figure saved");

    Ok((xlsx, png))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use std::f64::consts::PI;

    fn recording() -> Recording {
        let sfreq = 250.0;
        // 1/f 背景近似: 随机游走 + 8 Hz 节律
        let mut walk = 0.0;
        let mut state: u64 = 0x2545_F491_4F6C_DD1D;
        let data = Array2::from_shape_fn((1, 10_000), |(_, t)| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            walk = 0.98 * walk + (state as f64 / u64::MAX as f64 - 0.5);
            1e-6 * walk + 2e-6 * (2.0 * PI * 8.0 * t as f64 / sfreq).sin()
        });
        Recording::new(vec!["Cx".into()], data, sfreq).unwrap()
    }

    #[test]
    fn spectra_use_short_fft_and_cut() {
        let rec = recording();
        let psd = fooof_spectra(&rec, Some(40.0)).unwrap();
        assert_eq!(psd.freqs[1], 250.0 / 256.0);
        assert!(psd.freqs.iter().all(|&f| f < 40.0));
    }

    #[test]
    fn channel_fit_has_rhythm_peak() {
        let fits = fit_channels(&recording(), Some(40.0), &FooofSettings::default()).unwrap();
        assert_eq!(fits.len(), 1);
        let fit = &fits[0].fit;
        assert!(fit.r_squared > 0.5);
        assert!(fit.peaks.iter().any(|p| (p.cf - 8.0).abs() < 1.5), "peaks: {:?}", fit.peaks);
    }

    #[test]
    fn report_files_written() {
        let dir = std::env::temp_dir().join(format!("ratat_fooof_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let source = dir.join("rat1.edf");

        let (xlsx, png) = write_fooof_report(&source, &recording(), Some(40.0)).unwrap();
        assert_eq!(xlsx, dir.join("foof_report").join("rat1__psd.xlsx"));
        assert!(xlsx.is_file());
        assert!(png.is_file());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_figure_rejected() {
        let err = draw_fooof_figure(std::env::temp_dir().join("never.png"), &[]).unwrap_err();
        assert!(matches!(err, RatatError::InvalidParameter(_)));
    }
}
