//! Numeric analysis parameters persisted as a flat JSON document.
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::spectral::MorletParams;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Keys in the order they are saved.
pub const SETTING_KEYS: [&str; 7] = [
    "min_freq_input",
    "max_freq_input",
    "plot_scalings_input",
    "wl_freq_min",
    "wl_freq_max",
    "wl_freq_step",
    "wl_n_cycles",
];

/// Filter band, plot scaling and wavelet grid.
///
/// Integer-typed keys stay integers through load and text edits; a value
/// that cannot be coerced to a key's type leaves that key unchanged.
///
/// ```rust
/// use ratat::Settings;
///
/// let mut settings = Settings::default();
/// settings.set_from_strings([("wl_n_cycles", "6"), ("max_freq_input", "oops")]);
/// assert_eq!(settings.wl_n_cycles, 6);
/// assert_eq!(settings.max_freq_input, 40.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub min_freq_input: f64,
    pub max_freq_input: f64,
    pub plot_scalings_input: f64,
    pub wl_freq_min: i64,
    pub wl_freq_max: i64,
    pub wl_freq_step: f64,
    pub wl_n_cycles: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            min_freq_input: 0.6,
            max_freq_input: 40.0,
            plot_scalings_input: 2e-3,
            wl_freq_min: 1,
            wl_freq_max: 15,
            wl_freq_step: 0.25,
            wl_n_cycles: 8,
        }
    }
}

enum FieldMut<'a> {
    Float(&'a mut f64),
    Int(&'a mut i64),
}

impl Settings {
    /// Defaults overridden by whatever keys `path` holds. A missing file
    /// yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut settings = Settings::default();
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(settings);
        }

        let text = fs::read_to_string(path)?;
        let values: serde_json::Map<String, Value> = serde_json::from_str(&text)?;
        for (key, value) in &values {
            settings.apply_json(key, value);
        }

        info!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "settings saved");
        Ok(())
    }

    /// Applies text edits. Unknown keys and unparsable text are skipped.
    pub fn set_from_strings<'a, I>(&mut self, values: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, text) in values {
            let text = text.trim();
            match self.field_mut(key) {
                Some(FieldMut::Float(field)) => match text.parse::<f64>() {
                    Ok(v) => *field = v,
                    Err(_) => warn!(key, text, "not a number, setting unchanged"),
                },
                Some(FieldMut::Int(field)) => match text.parse::<i64>() {
                    Ok(v) => *field = v,
                    Err(_) => warn!(key, text, "not an integer, setting unchanged"),
                },
                None => warn!(key, "unknown setting"),
            }
        }
    }

    /// Band-pass bounds for the editor flow.
    pub fn filter_band(&self) -> (Option<f64>, Option<f64>) {
        (Some(self.min_freq_input), Some(self.max_freq_input))
    }

    pub fn morlet_params(&self) -> MorletParams {
        MorletParams {
            freq_min: self.wl_freq_min as f64,
            freq_max: self.wl_freq_max as f64,
            freq_step: self.wl_freq_step,
            n_cycles: self.wl_n_cycles as f64,
        }
    }

    fn apply_json(&mut self, key: &str, value: &Value) {
        let text = value.as_str().map(str::trim);
        match self.field_mut(key) {
            Some(FieldMut::Float(field)) => {
                match value.as_f64().or_else(|| text.and_then(|t| t.parse().ok())) {
                    Some(v) => *field = v,
                    None => warn!(key, %value, "ignored non-numeric setting"),
                }
            }
            Some(FieldMut::Int(field)) => {
                let coerced = value
                    .as_i64()
                    .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
                    .or_else(|| text.and_then(|t| t.parse().ok()));
                match coerced {
                    Some(v) => *field = v,
                    None => warn!(key, %value, "ignored non-integer setting"),
                }
            }
            None => debug!(key, "ignored unknown setting"),
        }
    }

    fn field_mut(&mut self, key: &str) -> Option<FieldMut<'_>> {
        Some(match key {
            "min_freq_input" => FieldMut::Float(&mut self.min_freq_input),
            "max_freq_input" => FieldMut::Float(&mut self.max_freq_input),
            "plot_scalings_input" => FieldMut::Float(&mut self.plot_scalings_input),
            "wl_freq_min" => FieldMut::Int(&mut self.wl_freq_min),
            "wl_freq_max" => FieldMut::Int(&mut self.wl_freq_max),
            "wl_freq_step" => FieldMut::Float(&mut self.wl_freq_step),
            "wl_n_cycles" => FieldMut::Int(&mut self.wl_n_cycles),
            _ => return None,
        })
    }
}
