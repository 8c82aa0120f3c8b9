#![allow(dead_code)]

use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use ratat::{Annotation, Recording, SignalParam};

// 每个测试使用独立的临时目录
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ratat_it_{}_{}", std::process::id(), name));
    if dir.exists() {
        fs::remove_dir_all(&dir).ok();
    }
    fs::create_dir_all(&dir).unwrap();
    dir
}

// 清理测试目录的辅助函数
pub fn cleanup_dir(dir: &Path) {
    if dir.exists() {
        fs::remove_dir_all(dir).ok();
    }
}

/// Sine channels at 4, 10, 16 ... Hz plus a slow drift, in volts.
pub fn synthetic_recording(channels: &[&str], seconds: usize, sfreq: f64) -> Recording {
    let n = seconds * sfreq as usize;
    let data = Array2::from_shape_fn((channels.len(), n), |(c, t)| {
        let t = t as f64 / sfreq;
        let f = 4.0 + 6.0 * c as f64;
        2e-5 * (2.0 * PI * f * t).sin() + 5e-6 * (2.0 * PI * 0.3 * t).cos()
    });
    Recording::new(channels.iter().map(|c| c.to_string()).collect(), data, sfreq).unwrap()
}

pub fn with_events(recording: Recording) -> Recording {
    recording.with_annotations(vec![
        Annotation::new(2.0, 0.0, "Tone"),
        Annotation::new(5.0, 0.0, "Tone"),
        Annotation::new(8.0, 1.0, "BAD_"),
        Annotation::new(12.0, 0.0, "Shock"),
    ])
}

// 创建测试信号的辅助函数
pub fn eeg_signal(label: &str, samples_per_record: i32) -> SignalParam {
    SignalParam {
        label: label.to_string(),
        samples_in_file: 0,
        physical_max: 200.0,
        physical_min: -200.0,
        digital_max: 32767,
        digital_min: -32768,
        samples_per_record,
        physical_dimension: "uV".to_string(),
        prefilter: "HP:0.1Hz LP:70Hz".to_string(),
        transducer: "AgAgCl electrodes".to_string(),
    }
}
