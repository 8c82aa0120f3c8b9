mod common;

use approx::assert_abs_diff_eq;
use common::{cleanup_dir, eeg_signal, scratch_dir, synthetic_recording, with_events};
use ndarray::Array2;
use ratat::{Annotation, EdfReader, EdfWriter, OnMissing, RatatError, Recording};

#[test]
fn test_export_reload_round_trip() {
    let dir = scratch_dir("round_trip");
    let path = dir.join("rat.edf");

    let original = with_events(synthetic_recording(&["Cx", "Hp", "EMG"], 20, 250.0));
    original.export(&path, false).unwrap();
    let back = Recording::load(&path).unwrap();

    assert_eq!(back.ch_names(), original.ch_names());
    assert_eq!(back.n_times(), original.n_times());
    assert_eq!(back.sfreq(), 250.0);

    // 16位量化误差
    for c in 0..3 {
        let range = original.data().row(c).iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        for (a, b) in original.data().row(c).iter().zip(back.data().row(c)) {
            assert_abs_diff_eq!(a, b, epsilon = range * 1e-3);
        }
    }

    let labels: Vec<&str> = back.annotations().iter().map(|a| a.description.as_str()).collect();
    assert_eq!(labels, ["Tone", "Tone", "BAD_", "Shock"]);
    assert_eq!(back.count_non_bad_events(), 3);
    assert_eq!(back.bad_spans(), vec![(8.0, 1.0)]);

    cleanup_dir(&dir);
}

#[test]
fn test_export_keeps_partial_second_lengths() {
    let dir = scratch_dir("partial_second");

    // 10.004 s, 100.004 s (23 records of 1087) and 60.052 s (prime, one record)
    for n_times in [2501, 25001, 15013] {
        let path = dir.join(format!("rat_{n_times}.edf"));
        let data = Array2::from_shape_fn((2, n_times), |(c, t)| {
            2e-5 * ((c + 1) as f64 * t as f64 / 250.0 * std::f64::consts::TAU * 3.0).sin()
        });
        let original = Recording::new(vec!["Cx".into(), "Hp".into()], data, 250.0)
            .unwrap()
            .with_annotations(vec![Annotation::new(1.0, 0.5, "Tone")]);
        original.export(&path, true).unwrap();

        let back = Recording::load(&path).unwrap();
        assert_eq!(back.n_times(), n_times);
        assert_abs_diff_eq!(back.sfreq(), 250.0, epsilon = 1e-9);
        assert_abs_diff_eq!(back.data()[[1, n_times - 1]], original.data()[[1, n_times - 1]], epsilon = 1e-7);
        assert_eq!(back.count_non_bad_events(), 1);
    }

    cleanup_dir(&dir);
}

#[test]
fn test_export_refuses_to_overwrite() {
    let dir = scratch_dir("no_overwrite");
    let path = dir.join("rat.edf");
    let rec = synthetic_recording(&["Cx"], 4, 250.0);

    rec.export(&path, false).unwrap();
    assert!(matches!(rec.export(&path, false), Err(RatatError::Export(_))));
    rec.export(&path, true).unwrap();

    cleanup_dir(&dir);
}

#[test]
fn test_load_scales_microvolts_to_volts() {
    let dir = scratch_dir("units");
    let path = dir.join("uv.edf");

    let mut writer = EdfWriter::create(&path).unwrap();
    writer.add_signal(eeg_signal("EEG Fp1", 250)).unwrap();
    for _ in 0..4 {
        writer.write_samples(&[vec![50.0; 250]]).unwrap();
    }
    writer.finalize().unwrap();

    let rec = Recording::load(&path).unwrap();
    assert_eq!(rec.n_times(), 1000);
    assert_abs_diff_eq!(rec.data()[[0, 10]], 50e-6, epsilon = 1e-8);

    let reader = EdfReader::open(&path).unwrap();
    assert_eq!(reader.header().signals[0].physical_dimension.trim(), "uV");

    cleanup_dir(&dir);
}

#[test]
fn test_mixed_rates_resampled_to_fastest() {
    let dir = scratch_dir("mixed_rates");
    let path = dir.join("mixed.edf");

    let mut writer = EdfWriter::create(&path).unwrap();
    writer.add_signal(eeg_signal("fast", 200)).unwrap();
    writer.add_signal(eeg_signal("slow", 100)).unwrap();
    for _ in 0..3 {
        let slow: Vec<f64> = (0..100).map(|i| i as f64).collect();
        writer.write_samples(&[vec![0.0; 200], slow]).unwrap();
    }
    writer.finalize().unwrap();

    let rec = Recording::load(&path).unwrap();
    assert_eq!(rec.sfreq(), 200.0);
    assert_eq!(rec.n_times(), 600);
    // 线性插值: 慢通道第 1 个样本落在快通道第 2 个样本上
    assert_abs_diff_eq!(rec.data()[[1, 2]], 1e-6, epsilon = 1e-8);

    cleanup_dir(&dir);
}

#[test]
fn test_unsupported_extension() {
    let err = Recording::load("recording.fif").unwrap_err();
    assert!(matches!(err, RatatError::UnsupportedFormat(_)));
    // 扩展名区分大小写
    assert!(matches!(Recording::load("RAT.EDF"), Err(RatatError::UnsupportedFormat(_))));
}

#[test]
fn test_drop_channels_ignore_never_fails() {
    let rec = synthetic_recording(&["Cx", "Hp", "Accelerometer"], 2, 250.0);
    let cases: [&[&str]; 4] = [&[], &["Accelerometer"], &["nope", "Hp"], &["x", "y", "z"]];

    for names in cases {
        let dropped = rec.drop_channels(names, OnMissing::Ignore).unwrap();
        let expected: Vec<&String> = rec.ch_names().iter().filter(|c| !names.contains(&c.as_str())).collect();
        assert_eq!(dropped.ch_names().iter().collect::<Vec<_>>(), expected);
        assert_eq!(dropped.n_times(), rec.n_times());
    }

    assert!(matches!(
        rec.drop_channels(&["nope"], OnMissing::Raise),
        Err(RatatError::ChannelNotFound(_))
    ));
}

#[test]
fn test_filter_attenuates_out_of_band() {
    let rec = synthetic_recording(&["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"], 20, 250.0);
    // 通道 j 为 58 Hz, 在 40 Hz 低通的阻带内
    let filtered = rec.filter(Some(0.6), Some(40.0)).unwrap();
    let rms = |r: &Recording, c: usize| {
        let row = r.data().row(c);
        (row.iter().map(|v| v * v).sum::<f64>() / row.len() as f64).sqrt()
    };
    assert!(rms(&filtered, 9) < 0.2 * rms(&rec, 9));
    assert!(rms(&filtered, 1) > 0.5 * 2e-5 / 2f64.sqrt());
    assert_eq!(filtered.prefilter(), "HP:0.6Hz LP:40Hz");
}
