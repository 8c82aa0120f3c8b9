use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use chrono::{NaiveDate, NaiveTime};
use tracing::debug;

use crate::types::{Annotation, EdfHeader, FileType, RecordingInfo, SignalParam};
use crate::error::{RatatError, Result};
use crate::utils::{atoi_nonlocalized, atof_nonlocalized, parse_edf_time};
use crate::EDFLIB_TIME_DIMENSION;

/// EDF/BDF file reader
///
/// Opens EDF, EDF+ (continuous or discontinuous), BDF and BDF+ files. The
/// header is parsed eagerly, annotations are collected from every
/// `EDF Annotations` / `BDF Annotations` signal at open time, and samples
/// are read on demand per signal.
///
/// Annotation signals are hidden: `header().signals` only lists data
/// channels and signal indices refer to that list.
///
/// # Examples
///
/// ```rust
/// use ndarray::Array2;
/// use ratat::{EdfReader, Recording};
///
/// # let path = std::env::temp_dir().join("ratat_reader_doc.edf");
/// let data = Array2::from_shape_fn((2, 512), |(c, t)| (c as f64 + 1.0) * 1e-5 * (t as f64 / 10.0).sin());
/// let recording = Recording::new(vec!["Cx".to_string(), "Hp".to_string()], data, 256.0)?;
/// recording.export(&path, true)?;
///
/// let mut reader = EdfReader::open(&path)?;
/// assert_eq!(reader.header().signals.len(), 2);
/// assert_eq!(reader.header().signals[0].label, "Cx");
///
/// let samples = reader.read_physical_samples(0, 256)?;
/// assert_eq!(samples.len(), 256);
/// # std::fs::remove_file(&path).ok();
/// # Ok::<(), ratat::RatatError>(())
/// ```
pub struct EdfReader {
    file: BufReader<File>,
    header: EdfHeader,
    signal_info: Vec<SignalInfo>,
    sample_positions: Vec<i64>,
    header_size: usize,
    record_size: usize,
    annotations: Vec<Annotation>,
}

#[derive(Debug, Clone)]
struct SignalInfo {
    buffer_offset: usize,
    samples_per_record: usize,
}

/// 解析后的头部（内部使用）
struct ParsedHeader {
    header: EdfHeader,
    signal_info: Vec<SignalInfo>,
    annotation_info: Vec<SignalInfo>,
    header_size: usize,
    record_size: usize,
}

impl EdfReader {
    /// Opens a file and parses its header and annotations.
    ///
    /// # Errors
    ///
    /// * `RatatError::FileNotFound` - the file can't be opened
    /// * `RatatError::InvalidFormat` - the header is neither EDF nor BDF
    /// * `RatatError::InvalidHeader` - header size disagrees with the signal count
    /// * `RatatError::InvalidSignalCount` - signal count out of range
    /// * `RatatError::PhysicalMinEqualsMax` / `DigitalMinEqualsMax` - degenerate calibration
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)
            .map_err(|e| RatatError::FileNotFound(format!("{}: {}", path.as_ref().display(), e)))?;
        let file_len = file.metadata()?.len();

        let mut reader = BufReader::new(file);

        // 读取并解析头部
        let mut parsed = Self::parse_header(&mut reader)?;

        // 数据记录数为 -1 时根据文件大小推算
        if parsed.header.datarecords_in_file < 0 {
            let data_bytes = file_len.saturating_sub(parsed.header_size as u64);
            let records = if parsed.record_size == 0 { 0 } else { data_bytes / parsed.record_size as u64 };
            debug!(records, "record count not stored in header, derived from file size");
            Self::set_record_count(&mut parsed.header, records as i64);
        }

        let sample_positions = vec![0i64; parsed.header.signals.len()];

        let mut reader = EdfReader {
            file: reader,
            header: parsed.header,
            signal_info: parsed.signal_info,
            sample_positions,
            header_size: parsed.header_size,
            record_size: parsed.record_size,
            annotations: Vec::new(),
        };

        // 读取所有注释信号中的TAL
        reader.read_annotations(&parsed.annotation_info)?;

        Ok(reader)
    }

    /// Header information, data channels only.
    pub fn header(&self) -> &EdfHeader {
        &self.header
    }

    /// Annotations parsed from the file, onsets relative to the first sample.
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Reads up to `count` physical samples of one signal from its current position.
    ///
    /// Values are in the unit named by the signal's `physical_dimension`.
    /// Fewer samples are returned near the end of the file.
    pub fn read_physical_samples(&mut self, signal: usize, count: usize) -> Result<Vec<f64>> {
        let digital_samples = self.read_digital_samples(signal, count)?;

        let signal_param = &self.header.signals[signal];
        let physical_samples = digital_samples
            .into_iter()
            .map(|d| signal_param.to_physical(d))
            .collect();

        Ok(physical_samples)
    }

    /// Reads up to `count` raw digital samples of one signal from its current position.
    pub fn read_digital_samples(&mut self, signal: usize, count: usize) -> Result<Vec<i32>> {
        if signal >= self.header.signals.len() {
            return Err(RatatError::InvalidSignalIndex(signal));
        }

        if count == 0 {
            return Ok(Vec::new());
        }

        let bytes_per_sample = self.header.file_type.bytes_per_sample();
        let info = self.signal_info[signal].clone();
        let (digital_min, digital_max) = {
            let param = &self.header.signals[signal];
            (param.digital_min, param.digital_max)
        };

        // 计算可读取的最大样本数
        let samples_in_file = info.samples_per_record as i64 * self.header.datarecords_in_file;
        let available_samples = (samples_in_file - self.sample_positions[signal]).max(0) as usize;
        let actual_count = count.min(available_samples);

        let mut samples = Vec::with_capacity(actual_count);
        let mut buf = Vec::new();

        while samples.len() < actual_count {
            let current_pos = self.sample_positions[signal];
            let record_index = current_pos / info.samples_per_record as i64;
            let sample_in_record = (current_pos % info.samples_per_record as i64) as usize;

            let file_offset = self.header_size as u64
                + record_index as u64 * self.record_size as u64
                + info.buffer_offset as u64
                + (sample_in_record * bytes_per_sample) as u64;

            self.file.seek(SeekFrom::Start(file_offset))?;

            // 当前记录中一次性读取连续的样本
            let samples_to_read = (actual_count - samples.len())
                .min(info.samples_per_record - sample_in_record);
            buf.resize(samples_to_read * bytes_per_sample, 0);
            self.file.read_exact(&mut buf)?;

            for chunk in buf.chunks_exact(bytes_per_sample) {
                let digital_value = decode_sample(chunk);
                samples.push(digital_value.clamp(digital_min, digital_max));
            }

            self.sample_positions[signal] = current_pos + samples_to_read as i64;
        }

        Ok(samples)
    }

    fn set_record_count(header: &mut EdfHeader, records: i64) {
        header.datarecords_in_file = records;
        header.file_duration = header.datarecord_duration * records;
        for signal in header.signals.iter_mut() {
            signal.samples_in_file = signal.samples_per_record as i64 * records;
        }
    }

    fn read_annotations(&mut self, annotation_info: &[SignalInfo]) -> Result<()> {
        if annotation_info.is_empty() {
            return Ok(());
        }

        let bytes_per_sample = self.header.file_type.bytes_per_sample();
        let mut annotations = Vec::new();
        let mut first_timekeeping = None;

        for record in 0..self.header.datarecords_in_file.max(0) as u64 {
            let record_start = self.header_size as u64 + record * self.record_size as u64;

            for (chn, info) in annotation_info.iter().enumerate() {
                let mut tal_bytes = vec![0u8; info.samples_per_record * bytes_per_sample];
                self.file.seek(SeekFrom::Start(record_start + info.buffer_offset as u64))?;
                self.file.read_exact(&mut tal_bytes)?;

                let (timekeeping, mut parsed) = parse_tal_block(&tal_bytes)?;
                if record == 0 && chn == 0 {
                    first_timekeeping = timekeeping;
                }
                annotations.append(&mut parsed);
            }
        }

        // 第一个时间戳TAL给出亚秒开始时间
        let offset = first_timekeeping.unwrap_or(0.0);
        if offset != 0.0 {
            for annotation in annotations.iter_mut() {
                annotation.onset -= offset;
            }
        }
        self.header.starttime_subsecond =
            ((offset.fract()) * EDFLIB_TIME_DIMENSION as f64).round() as i64;
        self.header.annotations_in_file = annotations.len() as i64;

        debug!(count = annotations.len(), "parsed annotations");
        self.annotations = annotations;
        Ok(())
    }

    fn parse_header(reader: &mut BufReader<File>) -> Result<ParsedHeader> {
        // 读取主头部（256字节）
        reader.seek(SeekFrom::Start(0))?;
        let mut main_header = vec![0u8; 256];
        reader.read_exact(&mut main_header)?;

        // BDF: 0xFF + "BIOSEMI"，EDF: "0       "
        let is_bdf = main_header[0] == 0xFF && &main_header[1..8] == b"BIOSEMI";
        if !is_bdf {
            let version = String::from_utf8_lossy(&main_header[0..8]);
            if !version.trim().starts_with('0') {
                return Err(RatatError::InvalidFormat(format!("Not an EDF/BDF file: {}", version)));
            }
        }

        // 解析信号数量
        let signals_str = String::from_utf8_lossy(&main_header[252..256]);
        let total_signal_count = atoi_nonlocalized(&signals_str);
        if total_signal_count < 1 || total_signal_count > crate::EDFLIB_MAXSIGNALS as i32 {
            return Err(RatatError::InvalidSignalCount(total_signal_count));
        }

        // 验证头部大小
        let header_size_str = String::from_utf8_lossy(&main_header[184..192]);
        let expected_header_size = (total_signal_count + 1) * 256;
        if atoi_nonlocalized(&header_size_str) != expected_header_size {
            return Err(RatatError::InvalidHeader);
        }

        // 检查EDF+/BDF+标识
        let reserved = String::from_utf8_lossy(&main_header[192..236]);
        let file_type = match (is_bdf, reserved.starts_with("EDF+") || reserved.starts_with("BDF+")) {
            (false, false) => FileType::Edf,
            (false, true) => FileType::EdfPlus,
            (true, false) => FileType::Bdf,
            (true, true) => FileType::BdfPlus,
        };

        let patient_field = String::from_utf8_lossy(&main_header[8..88]).trim().to_string();
        let recording_field = String::from_utf8_lossy(&main_header[88..168]).trim().to_string();

        // 解析日期和时间
        let date_str = String::from_utf8_lossy(&main_header[168..176]);
        let time_str = String::from_utf8_lossy(&main_header[176..184]);
        let (start_date, start_time) = Self::parse_datetime(&date_str, &time_str)?;

        // 解析数据记录信息
        let datarecords_str = String::from_utf8_lossy(&main_header[236..244]);
        let datarecords = atoi_nonlocalized(&datarecords_str) as i64;

        let duration_str = String::from_utf8_lossy(&main_header[244..252]);
        let datarecord_duration = parse_edf_time(&duration_str)?;
        if datarecord_duration <= 0 {
            return Err(RatatError::InvalidFormat(format!(
                "Data record duration must be positive, got {}", duration_str.trim()
            )));
        }

        // 读取信号头部信息
        let signal_header_size = total_signal_count as usize * 256;
        let mut signal_header = vec![0u8; signal_header_size];
        reader.read_exact(&mut signal_header)?;

        let (signals, signal_info, annotation_info, record_size) = Self::parse_signals(
            &signal_header,
            total_signal_count as usize,
            datarecords,
            file_type,
        )?;

        let mut info = RecordingInfo {
            start_date,
            start_time,
            ..RecordingInfo::default()
        };
        let (patient_additional, recording_additional) = if matches!(file_type, FileType::EdfPlus | FileType::BdfPlus) {
            Self::parse_plus_fields(&patient_field, &recording_field, &mut info)
        } else {
            (patient_field, recording_field)
        };

        let header = EdfHeader {
            file_type,
            signals,
            file_duration: datarecord_duration * datarecords.max(0),
            starttime_subsecond: 0,
            datarecords_in_file: datarecords,
            datarecord_duration,
            annotations_in_file: 0,
            info,
            patient_additional,
            recording_additional,
        };

        Ok(ParsedHeader {
            header,
            signal_info,
            annotation_info,
            header_size: expected_header_size as usize,
            record_size,
        })
    }

    fn parse_datetime(date_str: &str, time_str: &str) -> Result<(NaiveDate, NaiveTime)> {
        // 解析日期 "dd.mm.yy"
        let date_parts: Vec<&str> = date_str.split('.').collect();
        if date_parts.len() != 3 {
            return Err(RatatError::InvalidFormat(format!("Invalid start date: {}", date_str)));
        }

        let day = atoi_nonlocalized(date_parts[0]);
        let month = atoi_nonlocalized(date_parts[1]);
        let year = {
            let yy = atoi_nonlocalized(date_parts[2]);
            if yy > 84 { 1900 + yy } else { 2000 + yy }
        };

        let start_date = NaiveDate::from_ymd_opt(year, month as u32, day as u32)
            .ok_or_else(|| RatatError::InvalidFormat(format!("Invalid start date: {}", date_str)))?;

        // 解析时间 "hh.mm.ss"
        let time_parts: Vec<&str> = time_str.split('.').collect();
        if time_parts.len() != 3 {
            return Err(RatatError::InvalidFormat(format!("Invalid start time: {}", time_str)));
        }

        let hour = atoi_nonlocalized(time_parts[0]);
        let minute = atoi_nonlocalized(time_parts[1]);
        let second = atoi_nonlocalized(time_parts[2]);

        let start_time = NaiveTime::from_hms_opt(hour as u32, minute as u32, second as u32)
            .ok_or_else(|| RatatError::InvalidFormat(format!("Invalid start time: {}", time_str)))?;

        Ok((start_date, start_time))
    }

    fn parse_signals(
        signal_header: &[u8],
        total_signal_count: usize,
        datarecords: i64,
        file_type: FileType,
    ) -> Result<(Vec<SignalParam>, Vec<SignalInfo>, Vec<SignalInfo>, usize)> {
        let field = |offset: usize, width: usize, i: usize| -> String {
            let start = total_signal_count * offset + i * width;
            String::from_utf8_lossy(&signal_header[start..start + width]).trim().to_string()
        };

        let bytes_per_sample = file_type.bytes_per_sample();
        let annotation_label = file_type.annotation_label();

        let mut signals = Vec::new();
        let mut signal_info = Vec::new();
        let mut annotation_info = Vec::new();
        let mut buffer_offset = 0;

        // 头部按字段存储：每个字段依次包含所有信号
        for i in 0..total_signal_count {
            let label = field(0, 16, i);
            let transducer = field(16, 80, i);
            let physical_dimension = field(96, 8, i);
            let physical_min = atof_nonlocalized(&field(104, 8, i));
            let physical_max = atof_nonlocalized(&field(112, 8, i));
            let digital_min = atoi_nonlocalized(&field(120, 8, i));
            let digital_max = atoi_nonlocalized(&field(128, 8, i));
            let prefilter = field(136, 80, i);
            let samples_per_record = atoi_nonlocalized(&field(216, 8, i));

            if samples_per_record < 1 {
                return Err(RatatError::InvalidFormat(format!(
                    "Signal {} has {} samples per record", label, samples_per_record
                )));
            }

            let info = SignalInfo {
                buffer_offset,
                samples_per_record: samples_per_record as usize,
            };
            buffer_offset += samples_per_record as usize * bytes_per_sample;

            // 注释信号不出现在用户可见的信号列表中
            if label == annotation_label {
                annotation_info.push(info);
                continue;
            }

            if physical_min == physical_max {
                return Err(RatatError::PhysicalMinEqualsMax);
            }
            if digital_min == digital_max {
                return Err(RatatError::DigitalMinEqualsMax);
            }

            signals.push(SignalParam {
                label,
                samples_in_file: samples_per_record as i64 * datarecords.max(0),
                physical_max,
                physical_min,
                digital_max,
                digital_min,
                samples_per_record,
                physical_dimension,
                prefilter,
                transducer,
            });
            signal_info.push(info);
        }

        Ok((signals, signal_info, annotation_info, buffer_offset))
    }

    /// 解析EDF+患者与记录字段，返回无法归类的附加文本
    fn parse_plus_fields(patient_field: &str, recording_field: &str, info: &mut RecordingInfo) -> (String, String) {
        // 患者字段: "patientcode sex birthdate patientname additional"
        let parts: Vec<&str> = patient_field.split_whitespace().collect();
        let pick = |parts: &[&str], i: usize| parts.get(i).map(|s| s.to_string()).unwrap_or_else(|| "X".to_string());
        info.patient_code = pick(&parts, 0);
        info.sex = pick(&parts, 1);
        info.birthdate = pick(&parts, 2);
        info.patient_name = pick(&parts, 3);
        let patient_additional = parts.get(4..).map(|s| s.join(" ")).unwrap_or_default();

        // 记录字段: "Startdate dd-MMM-yyyy admincode technician equipment additional"
        let parts: Vec<&str> = recording_field.split_whitespace().collect();
        info.admin_code = pick(&parts, 2);
        info.technician = pick(&parts, 3);
        info.equipment = pick(&parts, 4);
        let recording_additional = parts.get(5..).map(|s| s.join(" ")).unwrap_or_default();

        (patient_additional, recording_additional)
    }
}

/// 小端序解码一个样本（2字节EDF或3字节BDF）
fn decode_sample(bytes: &[u8]) -> i32 {
    match bytes.len() {
        2 => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
        _ => {
            let value = bytes[0] as i32 | (bytes[1] as i32) << 8 | (bytes[2] as i32) << 16;
            // 24位符号扩展
            if value & 0x80_0000 != 0 { value - 0x100_0000 } else { value }
        }
    }
}

/// Parses one record's worth of annotation-signal bytes.
///
/// Returns the onset of the time-keeping TAL (the first TAL without any
/// description) and every annotation found, one per description.
pub(crate) fn parse_tal_block(bytes: &[u8]) -> Result<(Option<f64>, Vec<Annotation>)> {
    let mut timekeeping = None;
    let mut annotations = Vec::new();

    for tal in bytes.split(|&b| b == 0x00) {
        if tal.is_empty() {
            continue;
        }

        let mut parts = tal.split(|&b| b == 0x14);
        let time_field = parts.next().unwrap_or_default();

        // "+onset[\x15duration]"
        let mut time_parts = time_field.splitn(2, |&b| b == 0x15);
        let onset_text = String::from_utf8_lossy(time_parts.next().unwrap_or_default());
        let onset = parse_edf_time(&onset_text)? as f64 / EDFLIB_TIME_DIMENSION as f64;
        let duration = match time_parts.next() {
            Some(d) if !d.is_empty() => {
                parse_edf_time(&String::from_utf8_lossy(d))? as f64 / EDFLIB_TIME_DIMENSION as f64
            }
            _ => 0.0,
        };

        let mut has_description = false;
        for description in parts.filter(|d| !d.is_empty()) {
            has_description = true;
            annotations.push(Annotation::new(
                onset,
                duration,
                String::from_utf8_lossy(description).to_string(),
            ));
        }

        if !has_description && timekeeping.is_none() {
            timekeeping = Some(onset);
        }
    }

    Ok((timekeeping, annotations))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_sample_widths() {
        assert_eq!(decode_sample(&[0xFF, 0x7F]), 32767);
        assert_eq!(decode_sample(&[0x00, 0x80]), -32768);
        assert_eq!(decode_sample(&[0xFF, 0xFF, 0x7F]), 8_388_607);
        assert_eq!(decode_sample(&[0x00, 0x00, 0x80]), -8_388_608);
        assert_eq!(decode_sample(&[0xFE, 0xFF, 0xFF]), -2);
    }

    #[test]
    fn test_parse_tal_block() {
        let mut bytes = b"+0\x14\x14\x00+1.5\x152\x14Tone\x14\x00+3\x14BAD_move\x14Second\x14\x00".to_vec();
        bytes.resize(120, 0);

        let (timekeeping, annotations) = parse_tal_block(&bytes).unwrap();
        assert_eq!(timekeeping, Some(0.0));
        assert_eq!(annotations.len(), 3);
        assert_eq!(annotations[0], Annotation::new(1.5, 2.0, "Tone"));
        assert_eq!(annotations[1], Annotation::new(3.0, 0.0, "BAD_move"));
        assert_eq!(annotations[2].description, "Second");
        assert!(annotations[1].is_bad());
    }

    #[test]
    fn test_parse_tal_block_rejects_bad_onset() {
        assert!(parse_tal_block(b"+abc\x14Tone\x14\x00").is_err());
    }
}
