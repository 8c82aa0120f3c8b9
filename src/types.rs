use chrono::{NaiveDate, NaiveTime};

/// Prefix marking an annotation as a rejected span.
pub const BAD_PREFIX: &str = "BAD_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Edf,
    EdfPlus,
    Bdf,
    BdfPlus,
}

impl FileType {
    /// 每个样本的字节数
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            FileType::Edf | FileType::EdfPlus => 2,
            FileType::Bdf | FileType::BdfPlus => 3,
        }
    }

    pub fn is_bdf(&self) -> bool {
        matches!(self, FileType::Bdf | FileType::BdfPlus)
    }

    /// 注释信号的标准标签
    pub fn annotation_label(&self) -> &'static str {
        if self.is_bdf() {
            "BDF Annotations"
        } else {
            "EDF Annotations"
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalParam {
    pub label: String,
    pub samples_in_file: i64,
    pub physical_max: f64,
    pub physical_min: f64,
    pub digital_max: i32,
    pub digital_min: i32,
    pub samples_per_record: i32,
    pub physical_dimension: String,
    pub prefilter: String,
    pub transducer: String,
}

impl SignalParam {
    /// 计算物理值转换参数
    pub fn bit_value(&self) -> f64 {
        (self.physical_max - self.physical_min) /
        (self.digital_max - self.digital_min) as f64
    }

    /// 计算偏移量
    pub fn offset(&self) -> f64 {
        self.physical_max / self.bit_value() - self.digital_max as f64
    }

    /// 将数字值转换为物理值
    pub fn to_physical(&self, digital_value: i32) -> f64 {
        self.bit_value() * (self.offset() + digital_value as f64)
    }

    /// 将物理值转换为数字值（限制在数字范围内）
    pub fn to_digital(&self, physical_value: f64) -> i32 {
        let digital = (physical_value / self.bit_value()) - self.offset();
        (digital.round() as i64).clamp(self.digital_min as i64, self.digital_max as i64) as i32
    }
}

/// A labelled span on the recording timeline, shared by every channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub onset: f64,           // 开始时间（秒）
    pub duration: f64,        // 持续时间（秒，0表示瞬时事件）
    pub description: String,  // UTF-8描述
}

impl Annotation {
    pub fn new(onset: f64, duration: f64, description: impl Into<String>) -> Self {
        Annotation {
            onset,
            duration,
            description: description.into(),
        }
    }

    /// `BAD_` 前缀表示被剔除的片段
    pub fn is_bad(&self) -> bool {
        self.description.starts_with(BAD_PREFIX)
    }

    pub fn end(&self) -> f64 {
        self.onset + self.duration
    }

    /// Closed-interval overlap with `[tmin, tmax]`.
    pub fn overlaps(&self, tmin: f64, tmax: f64) -> bool {
        self.onset <= tmax && self.end() >= tmin
    }
}

/// Identification fields carried from the source file into exports.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingInfo {
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub patient_code: String,
    pub sex: String,
    pub birthdate: String,
    pub patient_name: String,
    pub admin_code: String,
    pub technician: String,
    pub equipment: String,
}

impl Default for RecordingInfo {
    fn default() -> Self {
        RecordingInfo {
            start_date: NaiveDate::from_ymd_opt(1985, 1, 1).unwrap_or_default(),
            start_time: NaiveTime::default(),
            patient_code: "X".to_string(),
            sex: "X".to_string(),
            birthdate: "X".to_string(),
            patient_name: "X".to_string(),
            admin_code: "X".to_string(),
            technician: "X".to_string(),
            equipment: "X".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct EdfHeader {
    pub file_type: FileType,
    pub signals: Vec<SignalParam>,
    pub file_duration: i64,           // 文件持续时间（100纳秒为单位）
    pub starttime_subsecond: i64,     // 亚秒开始时间
    pub datarecords_in_file: i64,
    pub datarecord_duration: i64,     // 数据记录持续时间（100纳秒为单位）
    pub annotations_in_file: i64,
    pub info: RecordingInfo,
    pub patient_additional: String,
    pub recording_additional: String,
}

impl EdfHeader {
    /// 信号的采样率（Hz）
    pub fn sample_rate(&self, signal: usize) -> Option<f64> {
        let param = self.signals.get(signal)?;
        let seconds = self.datarecord_duration as f64 / crate::EDFLIB_TIME_DIMENSION as f64;
        if seconds <= 0.0 {
            return None;
        }
        Some(param.samples_per_record as f64 / seconds)
    }
}
