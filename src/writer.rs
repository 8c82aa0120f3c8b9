use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use chrono::{Datelike, Timelike};
use tracing::warn;

use crate::types::{Annotation, RecordingInfo, SignalParam};
use crate::error::{RatatError, Result};
use crate::utils::{format_edf_number, format_tal_time, to_ascii, Rounding};
use crate::{EDFLIB_MAX_ANNOTATION_LEN, EDFLIB_TIME_DIMENSION};

/// 每条记录注释信号的最小字节数（遵循edflib）
const EDFLIB_ANNOTATION_BYTES: usize = 120;

/// EDF+ file writer
///
/// Writes continuous EDF+ (`EDF+C`) files with 16-bit samples and a single
/// `EDF Annotations` signal. Data is streamed one data record at a time;
/// the header is written before the first record and the record count is
/// patched in [`finalize`](EdfWriter::finalize).
///
/// The annotation signal is sized at header time to hold the largest list
/// of TALs that falls into one data record, so annotations should be added
/// before the first call to [`write_samples`](EdfWriter::write_samples).
///
/// # Examples
///
/// ```rust
/// use ratat::{EdfReader, EdfWriter, SignalParam};
///
/// # let path = std::env::temp_dir().join("ratat_writer_doc.edf");
/// let mut writer = EdfWriter::create(&path)?;
/// writer.add_signal(SignalParam {
///     label: "EEG Cx".to_string(),
///     samples_in_file: 0,
///     physical_max: 500.0,
///     physical_min: -500.0,
///     digital_max: 32767,
///     digital_min: -32768,
///     samples_per_record: 250,
///     physical_dimension: "uV".to_string(),
///     prefilter: "HP:0.6Hz LP:40Hz".to_string(),
///     transducer: String::new(),
/// })?;
/// writer.add_annotation(0.5, Some(1.0), "Tone")?;
///
/// for _ in 0..4 {
///     writer.write_samples(&[vec![12.5; 250]])?;
/// }
/// writer.finalize()?;
///
/// let reader = EdfReader::open(&path)?;
/// assert_eq!(reader.header().datarecords_in_file, 4);
/// assert_eq!(reader.annotations()[0].description, "Tone");
/// # std::fs::remove_file(&path).ok();
/// # Ok::<(), ratat::RatatError>(())
/// ```
pub struct EdfWriter {
    file: BufWriter<File>,
    signals: Vec<SignalParam>,
    info: RecordingInfo,
    datarecord_duration: i64,
    records_written: usize,
    expected_records: Option<usize>,
    header_written: bool,
    annotations: Vec<Annotation>,
    annotation_bytes: usize,
}

impl EdfWriter {
    /// Creates (or truncates) the output file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(&path)
            .map_err(|e| RatatError::FileNotFound(format!("{}: {}", path.as_ref().display(), e)))?;

        Ok(EdfWriter {
            file: BufWriter::new(file),
            signals: Vec::new(),
            info: RecordingInfo::default(),
            datarecord_duration: EDFLIB_TIME_DIMENSION, // 1秒
            records_written: 0,
            expected_records: None,
            header_written: false,
            annotations: Vec::new(),
            annotation_bytes: EDFLIB_ANNOTATION_BYTES,
        })
    }

    /// Adds a data signal. Must be called before the first record is written.
    pub fn add_signal(&mut self, signal: SignalParam) -> Result<()> {
        self.ensure_header_pending("add signal")?;

        // 验证信号参数
        if signal.physical_min == signal.physical_max {
            return Err(RatatError::PhysicalMinEqualsMax);
        }
        if signal.digital_min == signal.digital_max {
            return Err(RatatError::DigitalMinEqualsMax);
        }
        if signal.samples_per_record < 1 {
            return Err(RatatError::InvalidFormat(format!(
                "Signal {} needs at least one sample per record", signal.label
            )));
        }

        self.signals.push(signal);
        Ok(())
    }

    /// Sets the start date/time and identification fields.
    pub fn set_recording_info(&mut self, info: RecordingInfo) -> Result<()> {
        self.ensure_header_pending("modify recording info")?;
        self.info = info;
        Ok(())
    }

    /// Sets the duration of one data record in seconds (default 1).
    pub fn set_datarecord_duration(&mut self, duration_seconds: f64) -> Result<()> {
        self.ensure_header_pending("modify data record duration")?;

        if duration_seconds <= 0.0 || duration_seconds > 3600.0 {
            return Err(RatatError::InvalidFormat(
                "Data record duration must be between 0 and 3600 seconds".to_string(),
            ));
        }

        self.datarecord_duration = (duration_seconds * EDFLIB_TIME_DIMENSION as f64).round() as i64;
        Ok(())
    }

    /// Declares how many records will be written.
    ///
    /// The header then carries the final count from the start, and
    /// annotations whose onset lies past the last record are stored in it
    /// instead of being dropped.
    pub fn set_expected_datarecords(&mut self, records: usize) -> Result<()> {
        self.ensure_header_pending("modify record count")?;
        self.expected_records = Some(records);
        Ok(())
    }

    /// Queues an annotation. `duration_seconds = None` stores an instantaneous event.
    pub fn add_annotation(&mut self, onset_seconds: f64, duration_seconds: Option<f64>, description: &str) -> Result<()> {
        if !onset_seconds.is_finite() || onset_seconds < 0.0 {
            return Err(RatatError::InvalidFormat("Annotation onset cannot be negative".to_string()));
        }
        if let Some(duration) = duration_seconds {
            if !duration.is_finite() || duration < 0.0 {
                return Err(RatatError::InvalidFormat("Annotation duration cannot be negative".to_string()));
            }
        }
        if description.is_empty() {
            return Err(RatatError::InvalidFormat("Annotation description cannot be empty".to_string()));
        }
        if description.len() > EDFLIB_MAX_ANNOTATION_LEN {
            return Err(RatatError::InvalidFormat(format!(
                "Annotation description too long (max {} bytes)", EDFLIB_MAX_ANNOTATION_LEN
            )));
        }

        self.annotations.push(Annotation::new(
            onset_seconds,
            duration_seconds.unwrap_or(0.0),
            description,
        ));
        Ok(())
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    /// Writes one data record: `samples[i]` holds exactly
    /// `samples_per_record` physical values of signal `i`.
    pub fn write_samples(&mut self, samples: &[Vec<f64>]) -> Result<()> {
        if samples.len() != self.signals.len() {
            return Err(RatatError::InvalidFormat("Sample count must match signal count".to_string()));
        }

        for (i, signal_samples) in samples.iter().enumerate() {
            let expected_samples = self.signals[i].samples_per_record as usize;
            if signal_samples.len() != expected_samples {
                return Err(RatatError::InvalidFormat(format!(
                    "Signal {} expected {} samples per record, got {}",
                    i, expected_samples, signal_samples.len()
                )));
            }
        }

        if !self.header_written {
            self.write_header()?;
        }

        // 按照edflib的顺序写入数据：信号数据 + 注释信号
        let mut record = Vec::with_capacity(
            samples.iter().map(|s| s.len() * 2).sum::<usize>() + self.annotation_bytes,
        );
        for (signal, signal_samples) in self.signals.iter().zip(samples) {
            for &physical_value in signal_samples {
                // 写入为16位小端序
                let digital_value = signal.to_digital(physical_value) as i16;
                record.extend_from_slice(&digital_value.to_le_bytes());
            }
        }

        let mut tal = self.record_tal(self.records_written, Some(self.annotation_bytes));
        tal.resize(self.annotation_bytes, 0x00);
        record.extend_from_slice(&tal);

        self.file.write_all(&record)?;
        self.records_written += 1;
        Ok(())
    }

    /// Flushes the file and writes the final record count into the header.
    pub fn finalize(mut self) -> Result<()> {
        if !self.header_written {
            return Err(RatatError::InvalidFormat("No data records were written".to_string()));
        }

        if let Some(expected) = self.expected_records {
            if expected != self.records_written {
                warn!(expected, written = self.records_written, "record count differs from declared count");
            }
        }

        // 更新头部中的数据记录数 (236-244字节)
        self.file.flush()?;
        self.file.seek(SeekFrom::Start(236))?;
        let datarecords_str = format!("{:<8}", self.records_written);
        self.file.write_all(datarecords_str.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }

    fn ensure_header_pending(&self, action: &str) -> Result<()> {
        if self.header_written {
            return Err(RatatError::InvalidFormat(format!("Cannot {} after writing header", action)));
        }
        Ok(())
    }

    fn datarecord_seconds(&self) -> f64 {
        self.datarecord_duration as f64 / EDFLIB_TIME_DIMENSION as f64
    }

    /// 注释所属的数据记录
    fn record_of(&self, annotation: &Annotation) -> usize {
        let record = (annotation.onset / self.datarecord_seconds()).floor() as usize;
        match self.expected_records {
            Some(n) if n > 0 => record.min(n - 1),
            _ => record,
        }
    }

    /// Builds the TAL list for one data record: the time-keeping TAL
    /// followed by every annotation assigned to that record.
    fn record_tal(&self, record: usize, limit: Option<usize>) -> Vec<u8> {
        let mut tal_data = Vec::with_capacity(EDFLIB_ANNOTATION_BYTES);

        // 时间戳注释，格式: "+<onset>\x14\x14\x00"
        let record_start = record as f64 * self.datarecord_seconds();
        tal_data.push(b'+');
        tal_data.extend_from_slice(format_tal_time(record_start).as_bytes());
        tal_data.extend_from_slice(&[0x14, 0x14, 0x00]);

        for annotation in self.annotations.iter().filter(|a| self.record_of(a) == record) {
            let entry = encode_annotation_tal(annotation);
            if let Some(limit) = limit {
                if tal_data.len() + entry.len() > limit {
                    warn!(record, description = %annotation.description, "annotation does not fit in data record, skipped");
                    continue;
                }
            }
            tal_data.extend_from_slice(&entry);
        }

        tal_data
    }

    fn write_header(&mut self) -> Result<()> {
        if self.signals.is_empty() {
            return Err(RatatError::InvalidFormat("Cannot write a file without signals".to_string()));
        }

        // 根据最长的TAL确定注释信号大小（偶数字节）
        let mut records: Vec<usize> = self.annotations.iter().map(|a| self.record_of(a)).collect();
        records.push(0);
        records.sort_unstable();
        records.dedup();
        let longest = records
            .iter()
            .map(|&r| self.record_tal(r, None).len())
            .max()
            .unwrap_or(0);
        self.annotation_bytes = longest.max(EDFLIB_ANNOTATION_BYTES).div_ceil(2) * 2;

        let annotation_signal = SignalParam {
            label: "EDF Annotations".to_string(),
            samples_in_file: 0,
            physical_max: 1.0,
            physical_min: -1.0,
            digital_max: 32767,
            digital_min: -32768,
            samples_per_record: (self.annotation_bytes / 2) as i32,
            physical_dimension: String::new(),
            prefilter: String::new(),
            transducer: String::new(),
        };

        let total_signals = self.signals.len() + 1;
        if total_signals > crate::EDFLIB_MAXSIGNALS {
            return Err(RatatError::InvalidSignalCount(total_signals as i32));
        }
        let header_size = (total_signals + 1) * 256;

        let mut main_header = vec![b' '; 256];

        // 版本 (8字节)
        main_header[0..8].copy_from_slice(b"0       ");

        // 患者字段: "code sex birthdate name"，子字段内不允许空格
        let patient_field = [
            &self.info.patient_code,
            &self.info.sex,
            &self.info.birthdate,
            &self.info.patient_name,
        ]
        .iter()
        .map(|s| subfield(s))
        .collect::<Vec<_>>()
        .join(" ");
        put_field(&mut main_header[8..88], &patient_field);

        // 记录字段: "Startdate dd-MMM-yyyy admin tech equipment"
        let recording_field = format!(
            "Startdate {:02}-{}-{:04} {} {} {}",
            self.info.start_date.day(),
            self.info.start_date.format("%b").to_string().to_uppercase(),
            self.info.start_date.year(),
            subfield(&self.info.admin_code),
            subfield(&self.info.technician),
            subfield(&self.info.equipment),
        );
        put_field(&mut main_header[88..168], &recording_field);

        // 开始日期 "dd.mm.yy" 和时间 "hh.mm.ss"
        let date_str = format!("{:02}.{:02}.{:02}",
            self.info.start_date.day(), self.info.start_date.month(), self.info.start_date.year() % 100);
        put_field(&mut main_header[168..176], &date_str);
        let time_str = format!("{:02}.{:02}.{:02}",
            self.info.start_time.hour(), self.info.start_time.minute(), self.info.start_time.second());
        put_field(&mut main_header[176..184], &time_str);

        put_field(&mut main_header[184..192], &header_size.to_string());
        put_field(&mut main_header[192..236], "EDF+C");

        let records = self.expected_records.map(|n| n as i64).unwrap_or(-1);
        put_field(&mut main_header[236..244], &records.to_string());

        let duration_str = format_tal_time(self.datarecord_seconds());
        if duration_str.len() > 8 {
            return Err(RatatError::InvalidFormat(format!("Data record duration {} does not fit", duration_str)));
        }
        put_field(&mut main_header[244..252], &duration_str);
        put_field(&mut main_header[252..256], &total_signals.to_string());

        let mut all_signals = self.signals.clone();
        all_signals.push(annotation_signal);
        let signal_header = encode_signal_headers(&all_signals)?;

        self.file.write_all(&main_header)?;
        self.file.write_all(&signal_header)?;
        self.header_written = true;
        Ok(())
    }
}

/// "+onset[\x15duration]\x14description\x14\x00"
fn encode_annotation_tal(annotation: &Annotation) -> Vec<u8> {
    let mut entry = Vec::new();
    entry.push(b'+');
    entry.extend_from_slice(format_tal_time(annotation.onset).as_bytes());
    if annotation.duration > 0.0 {
        entry.push(0x15);
        entry.extend_from_slice(format_tal_time(annotation.duration).as_bytes());
    }
    entry.push(0x14);
    entry.extend_from_slice(annotation.description.as_bytes());
    entry.extend_from_slice(&[0x14, 0x00]);
    entry
}

/// 按照edflib的字段顺序写入，每个字段所有信号一起写
fn encode_signal_headers(signals: &[SignalParam]) -> Result<Vec<u8>> {
    let n = signals.len();
    let mut header = vec![b' '; n * 256];

    let mut offset = 0;
    let mut put_column = |width: usize, values: Vec<String>| {
        for (i, value) in values.iter().enumerate() {
            let start = offset + i * width;
            put_field(&mut header[start..start + width], value);
        }
        offset += n * width;
    };

    put_column(16, signals.iter().map(|s| to_ascii(&s.label)).collect());
    put_column(80, signals.iter().map(|s| to_ascii(&s.transducer)).collect());
    put_column(8, signals.iter().map(|s| to_ascii(&s.physical_dimension)).collect());

    let mut physical_min = Vec::with_capacity(n);
    let mut physical_max = Vec::with_capacity(n);
    for s in signals {
        physical_min.push(format_edf_number(s.physical_min, 8, Rounding::Down)?);
        physical_max.push(format_edf_number(s.physical_max, 8, Rounding::Up)?);
    }
    put_column(8, physical_min);
    put_column(8, physical_max);

    put_column(8, signals.iter().map(|s| s.digital_min.to_string()).collect());
    put_column(8, signals.iter().map(|s| s.digital_max.to_string()).collect());
    put_column(80, signals.iter().map(|s| to_ascii(&s.prefilter)).collect());
    put_column(8, signals.iter().map(|s| s.samples_per_record.to_string()).collect());
    // 保留字段 (32字节 × 信号数) 保持空格

    Ok(header)
}

/// 写入定长ASCII字段，超出部分截断
fn put_field(field: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(field.len());
    field[..len].copy_from_slice(&bytes[..len]);
}

/// EDF+子字段：ASCII、无空格，空值写为 "X"
fn subfield(value: &str) -> String {
    let value = to_ascii(value.trim()).replace(' ', "_");
    if value.is_empty() { "X".to_string() } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EdfReader;
    use std::fs;
    use std::path::PathBuf;

    fn create_test_signal() -> SignalParam {
        SignalParam {
            label: "Test EEG".to_string(),
            samples_in_file: 0,
            physical_max: 100.0,
            physical_min: -100.0,
            digital_max: 32767,
            digital_min: -32768,
            samples_per_record: 256,
            physical_dimension: "uV".to_string(),
            prefilter: "HP:0.1Hz LP:70Hz".to_string(),
            transducer: "AgAgCl electrodes".to_string(),
        }
    }

    fn test_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ratat_writer_{}_{}", std::process::id(), name))
    }

    fn cleanup_test_file(path: &Path) {
        if path.exists() {
            fs::remove_file(path).ok();
        }
    }

    #[test]
    fn test_modification_after_header_written() {
        let path = test_path("locked.edf");
        let mut writer = EdfWriter::create(&path).unwrap();
        writer.add_signal(create_test_signal()).unwrap();

        writer.write_samples(&[vec![10.0; 256]]).unwrap();

        assert!(writer.add_signal(create_test_signal()).is_err());
        assert!(writer.set_datarecord_duration(2.0).is_err());
        assert!(writer.set_recording_info(RecordingInfo::default()).is_err());
        cleanup_test_file(&path);
    }

    #[test]
    fn test_rejects_invalid_annotations() {
        let path = test_path("invalid_annot.edf");
        let mut writer = EdfWriter::create(&path).unwrap();

        assert!(writer.add_annotation(-1.0, None, "Tone").is_err());
        assert!(writer.add_annotation(1.0, Some(-0.5), "Tone").is_err());
        assert!(writer.add_annotation(1.0, None, "").is_err());
        assert!(writer.add_annotation(1.0, None, &"x".repeat(EDFLIB_MAX_ANNOTATION_LEN + 1)).is_err());
        assert_eq!(writer.annotation_count(), 0);
        cleanup_test_file(&path);
    }

    #[test]
    fn test_annotation_tal_generation() {
        let path = test_path("tal.edf");
        let mut writer = EdfWriter::create(&path).unwrap();
        writer.add_annotation(0.0, None, "Test Event").unwrap();
        writer.add_annotation(1.5, Some(2.0), "Another Event").unwrap();
        writer.add_signal(create_test_signal()).unwrap();

        let tal_0 = writer.record_tal(0, None);
        let tal_1 = writer.record_tal(1, None);

        assert_eq!(tal_0, b"+0\x14\x14\x00+0\x14Test Event\x14\x00".to_vec());
        assert_eq!(tal_1, b"+1\x14\x14\x00+1.5\x152\x14Another Event\x14\x00".to_vec());
        cleanup_test_file(&path);
    }

    #[test]
    fn test_annotation_signal_grows_for_crowded_records() {
        let path = test_path("crowded.edf");
        let mut writer = EdfWriter::create(&path).unwrap();
        writer.add_signal(create_test_signal()).unwrap();
        for i in 0..20 {
            writer.add_annotation(0.01 * i as f64, None, &format!("Event number {}", i)).unwrap();
        }

        writer.write_samples(&[vec![0.0; 256]]).unwrap();
        writer.finalize().unwrap();

        let reader = EdfReader::open(&path).unwrap();
        assert_eq!(reader.annotations().len(), 20);
        assert_eq!(reader.annotations()[19].description, "Event number 19");
        cleanup_test_file(&path);
    }

    #[test]
    fn test_late_annotations_kept_in_last_record() {
        let path = test_path("late.edf");
        let mut writer = EdfWriter::create(&path).unwrap();
        writer.add_signal(create_test_signal()).unwrap();
        writer.set_expected_datarecords(2).unwrap();
        writer.add_annotation(7.5, None, "After the end").unwrap();

        for _ in 0..2 {
            writer.write_samples(&[vec![0.0; 256]]).unwrap();
        }
        writer.finalize().unwrap();

        let reader = EdfReader::open(&path).unwrap();
        assert_eq!(reader.annotations().len(), 1);
        approx::assert_abs_diff_eq!(reader.annotations()[0].onset, 7.5, epsilon = 1e-7);
        cleanup_test_file(&path);
    }

    #[test]
    fn test_complete_workflow_round_trip() {
        let path = test_path("workflow.edf");

        let mut writer = EdfWriter::create(&path).unwrap();
        for i in 0..4 {
            let mut signal = create_test_signal();
            signal.label = format!("EEG_Ch{}", i + 1);
            signal.physical_max = 200.0;
            signal.physical_min = -200.0;
            writer.add_signal(signal).unwrap();
        }
        writer.add_annotation(2.5, Some(1.0), "BAD_artifact").unwrap();
        writer.add_annotation(5.0, None, "Tone").unwrap();

        for second in 0..10 {
            let all_samples: Vec<Vec<f64>> = (0..4)
                .map(|ch| {
                    (0..256)
                        .map(|sample| {
                            let t = (second * 256 + sample) as f64 / 256.0;
                            let freq = 10.0 + ch as f64 * 2.0;
                            50.0 * (2.0 * std::f64::consts::PI * freq * t).sin()
                        })
                        .collect()
                })
                .collect();
            writer.write_samples(&all_samples).unwrap();
        }
        writer.finalize().unwrap();

        let mut reader = EdfReader::open(&path).unwrap();
        let header = reader.header();
        assert_eq!(header.signals.len(), 4);
        assert_eq!(header.datarecords_in_file, 10);
        assert_eq!(header.signals[3].label, "EEG_Ch4");
        assert_eq!(header.signals[0].samples_in_file, 2560);

        let annotations = reader.annotations().to_vec();
        assert_eq!(annotations.len(), 2);
        assert!(annotations[0].is_bad());
        approx::assert_abs_diff_eq!(annotations[0].duration, 1.0, epsilon = 1e-7);

        let samples = reader.read_physical_samples(0, 2560).unwrap();
        assert_eq!(samples.len(), 2560);
        let expected = 50.0 * (2.0 * std::f64::consts::PI * 10.0 * (300.0 / 256.0)).sin();
        approx::assert_abs_diff_eq!(samples[300], expected, epsilon = 0.01);
        cleanup_test_file(&path);
    }
}
