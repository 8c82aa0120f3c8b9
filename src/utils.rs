use crate::error::{RatatError, Result};

/// 解析EDF时间字符串为100纳秒单位
pub fn parse_edf_time(s: &str) -> Result<i64> {
    let s = s.trim();

    if s.is_empty() {
        return Err(RatatError::InvalidFormat("Empty time string".to_string()));
    }

    // 处理符号
    let (negative, s) = if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    };

    let mut value = 0i64;

    if let Some(dot_pos) = s.find('.') {
        let integer_part = &s[..dot_pos];
        let decimal_part = &s[dot_pos + 1..];

        if !integer_part.is_empty() {
            value += integer_part.parse::<i64>()
                .map_err(|_| RatatError::InvalidFormat(format!("Invalid integer part: {}", s)))?
                * crate::EDFLIB_TIME_DIMENSION;
        }

        // 小数部分最多7位精度
        if !decimal_part.is_empty() {
            let decimal_str = if decimal_part.len() > 7 {
                &decimal_part[..7]
            } else {
                decimal_part
            };

            let decimal_value = decimal_str.parse::<i64>()
                .map_err(|_| RatatError::InvalidFormat(format!("Invalid decimal part: {}", s)))?;

            let scale = 10i64.pow(7 - decimal_str.len() as u32);
            value += decimal_value * scale;
        }
    } else {
        value = s.parse::<i64>()
            .map_err(|_| RatatError::InvalidFormat(format!("Invalid integer: {}", s)))?
            * crate::EDFLIB_TIME_DIMENSION;
    }

    if negative {
        value = -value;
    }

    Ok(value)
}

/// 将秒转换为TAL时间字符串（最多7位小数，去掉多余的0）
pub fn format_tal_time(seconds: f64) -> String {
    let s = format!("{:.7}", seconds);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Which way to round a value that needs fewer decimals to fit a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

/// 将数值格式化为不超过 `width` 字节的头部字段
///
/// Physical limits in the signal header are 8 ASCII characters. Values that
/// don't fit are rounded outward to the precision that does fit, so data
/// inside `[min, max]` stays inside after the header is re-parsed.
pub fn format_edf_number(value: f64, width: usize, rounding: Rounding) -> Result<String> {
    if !value.is_finite() {
        return Err(RatatError::InvalidFormat(format!("Cannot store {} in a header field", value)));
    }

    for decimals in (0..width).rev() {
        let scale = 10f64.powi(decimals as i32);
        let scaled = value * scale;
        let rounded = match rounding {
            Rounding::Down => scaled.floor(),
            Rounding::Up => scaled.ceil(),
        } / scale;
        let text = format!("{:.*}", decimals, rounded);
        let text = if text.contains('.') {
            text.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            text
        };
        let text = if text == "-0" { "0".to_string() } else { text };
        if text.len() <= width {
            return Ok(text);
        }
    }

    Err(RatatError::InvalidFormat(format!("Value {} does not fit in {} characters", value, width)))
}

/// 非本地化的整数解析（避免受系统locale影响）
pub fn atoi_nonlocalized(s: &str) -> i32 {
    let s = s.trim();
    if s.is_empty() {
        return 0;
    }

    s.parse().unwrap_or(0)
}

/// 非本地化的浮点数解析
pub fn atof_nonlocalized(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }

    s.parse().unwrap_or(0.0)
}

/// 将字符串转换为 7-bit ASCII，非 ASCII 替换为 '_'
pub fn to_ascii(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_edf_time() {
        assert_eq!(parse_edf_time("1").unwrap(), 10_000_000);
        assert_eq!(parse_edf_time("1.5").unwrap(), 15_000_000);
        assert_eq!(parse_edf_time("-2.5").unwrap(), -25_000_000);
        assert_eq!(parse_edf_time("+0.0000001").unwrap(), 1);
        assert!(parse_edf_time("abc").is_err());
    }

    #[test]
    fn test_format_tal_time() {
        assert_eq!(format_tal_time(0.0), "0");
        assert_eq!(format_tal_time(12.0), "12");
        assert_eq!(format_tal_time(1.25), "1.25");
        assert_eq!(format_tal_time(0.1234567), "0.1234567");
    }

    #[test]
    fn test_format_edf_number_rounds_outward() {
        assert_eq!(format_edf_number(-100.0, 8, Rounding::Down).unwrap(), "-100");
        assert_eq!(format_edf_number(3.25, 8, Rounding::Up).unwrap(), "3.25");

        let low = format_edf_number(-123.456789123, 8, Rounding::Down).unwrap();
        assert!(low.len() <= 8);
        assert!(low.parse::<f64>().unwrap() <= -123.456789123);

        let high = format_edf_number(98765.4321987, 8, Rounding::Up).unwrap();
        assert!(high.len() <= 8);
        assert!(high.parse::<f64>().unwrap() >= 98765.4321987);
    }

    #[test]
    fn test_format_edf_number_rejects_oversized() {
        assert!(format_edf_number(1.0e12, 8, Rounding::Up).is_err());
        assert!(format_edf_number(f64::NAN, 8, Rounding::Up).is_err());
    }

    #[test]
    fn test_nonlocalized_parsing() {
        assert_eq!(atoi_nonlocalized("  256 "), 256);
        assert_eq!(atoi_nonlocalized("junk"), 0);
        assert_eq!(atof_nonlocalized("-3.5  "), -3.5);
        assert_eq!(to_ascii("µV"), "_V");
    }
}
