//! Spreadsheet and figure exports over spectral results.
use rust_xlsxwriter::Worksheet;

use crate::error::{RatatError, Result};
use crate::spectral::{BandTable, PsdTable};

pub mod fooof;
pub mod psd;

pub use fooof::{fit_channels, fooof_spectra, write_fooof_report, ChannelFit};
pub use psd::{build_psd_report, write_psd_report, ReportSheet, SheetData};

/// Writes `value` at `(row, col)`; NaN and infinities leave the cell empty.
pub(crate) fn write_finite(sheet: &mut Worksheet, row: u32, col: u16, value: f64) -> Result<()> {
    if value.is_finite() {
        sheet.write_number(row, col, value)?;
    }
    Ok(())
}

/// Header `freq, ch…`, then one row per frequency.
pub(crate) fn write_spectrum(sheet: &mut Worksheet, table: &PsdTable) -> Result<()> {
    sheet.write_string(0, 0, "freq")?;
    for (c, name) in table.channels.iter().enumerate() {
        sheet.write_string(0, column(c + 1)?, name.as_str())?;
    }
    for (i, &f) in table.freqs.iter().enumerate() {
        let row = (i + 1) as u32;
        write_finite(sheet, row, 0, f)?;
        for c in 0..table.channels.len() {
            write_finite(sheet, row, column(c + 1)?, table.values[[i, c]])?;
        }
    }
    Ok(())
}

/// Header `channel, band…`, then one row per channel.
pub(crate) fn write_bands(sheet: &mut Worksheet, table: &BandTable) -> Result<()> {
    sheet.write_string(0, 0, "channel")?;
    for (b, label) in table.labels.iter().enumerate() {
        sheet.write_string(0, column(b + 1)?, label.as_str())?;
    }
    for (c, name) in table.channels.iter().enumerate() {
        let row = (c + 1) as u32;
        sheet.write_string(row, 0, name.as_str())?;
        for b in 0..table.labels.len() {
            write_finite(sheet, row, column(b + 1)?, table.values[[c, b]])?;
        }
    }
    Ok(())
}

pub(crate) fn column(index: usize) -> Result<u16> {
    u16::try_from(index)
        .map_err(|_| RatatError::InvalidParameter(format!("column {index} out of spreadsheet range")))
}

pub(crate) fn plot_err<E: std::fmt::Display>(e: E) -> RatatError {
    RatatError::Plot(e.to_string())
}
