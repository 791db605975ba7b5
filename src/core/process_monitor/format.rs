//! Value projections used in log rows and summary lines.

const BYTE_UNITS: [&str; 9] = ["B", "K", "M", "G", "T", "P", "E", "Z", "Y"];

/// How a metric renders its aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formatter {
    /// Bare number (`3.0`, `12.34`)
    Raw,
    /// Binary byte units with two decimals (`1.5K`, `2.25G`)
    ByteUnit,
    /// Fixed number of decimals (`0.1234`)
    FixedDecimal(usize),
}

impl Formatter {
    pub fn apply(&self, value: f64) -> String {
        match self {
            Formatter::Raw => format_number(value),
            Formatter::ByteUnit => format_bytes(value),
            Formatter::FixedDecimal(decimals) => format!("{:.*}", *decimals, value),
        }
    }
}

/// Format a byte count using the largest binary unit whose magnitude is >= 1
pub fn format_bytes(bytes: f64) -> String {
    if bytes <= 0.0 || !bytes.is_finite() {
        return "0B".to_string();
    }

    let mut scaled = bytes;
    let mut unit = 0;
    while scaled >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        scaled /= 1024.0;
        unit += 1;
    }

    format!("{}{}", format_number(round2(scaled)), BYTE_UNITS[unit])
}

/// Shortest decimal form, keeping at least one fractional digit
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes_zero() {
        assert_eq!(format_bytes(0.0), "0B");
    }

    #[test]
    fn test_format_bytes_units() {
        assert_eq!(format_bytes(512.0), "512.0B");
        assert_eq!(format_bytes(1024.0), "1.0K");
        assert_eq!(format_bytes(1536.0), "1.5K");
        assert_eq!(format_bytes(1024.0 * 1024.0 * 1.25), "1.25M");
        assert_eq!(format_bytes(3.0 * 1024f64.powi(3)), "3.0G");
    }

    #[test]
    fn test_format_bytes_rounds_to_two_decimals() {
        // 1000 KiB + a bit
        assert_eq!(format_bytes(1_234_567.0), "1.18M");
    }

    #[test]
    fn test_format_bytes_fractional_byte() {
        assert_eq!(format_bytes(0.5), "0.5B");
    }

    #[test]
    fn test_format_bytes_caps_at_largest_unit() {
        let huge = 1024f64.powi(9);
        assert_eq!(format_bytes(huge), "1024.0Y");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3.0");
        assert_eq!(format_number(12.34), "12.34");
        assert_eq!(format_number(0.0), "0.0");
    }

    #[test]
    fn test_formatter_apply() {
        assert_eq!(Formatter::Raw.apply(2.5), "2.5");
        assert_eq!(Formatter::ByteUnit.apply(2048.0), "2.0K");
        assert_eq!(Formatter::FixedDecimal(4).apply(0.123456), "0.1235");
    }
}
