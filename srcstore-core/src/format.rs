//! Human-readable sizes and durations for logs and reports

use std::time::Duration;

const SIZES: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Byte count with SI (1000-based) units, e.g. `512B`, `1.5KB`, `12MB`.
pub fn bytes_string(size: u64) -> String {
    if size < 10 {
        return format!("{size}B");
    }
    let mut exp = 0;
    let mut scaled = size as f64;
    while scaled >= 1000.0 && exp < SIZES.len() - 1 {
        scaled /= 1000.0;
        exp += 1;
    }
    let rounded = (scaled * 10.0 + 0.5).floor() / 10.0;
    if rounded < 10.0 {
        format!("{rounded:.1}{}", SIZES[exp])
    } else {
        format!("{rounded:.0}{}", SIZES[exp])
    }
}

/// Duration rounded to a readable precision: whole microseconds below a
/// millisecond, whole milliseconds below a second, else milliseconds kept
/// as a fraction of seconds.
pub fn duration_string(d: Duration) -> String {
    let rounded = if d < Duration::from_millis(1) {
        Duration::from_micros(d.as_micros() as u64)
    } else {
        Duration::from_millis(d.as_millis() as u64)
    };
    format!("{rounded:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_string() {
        assert_eq!(bytes_string(0), "0B");
        assert_eq!(bytes_string(9), "9B");
        assert_eq!(bytes_string(512), "512B");
        assert_eq!(bytes_string(1500), "1.5KB");
        assert_eq!(bytes_string(12_345_678), "12MB");
        assert_eq!(bytes_string(2_000_000_000), "2.0GB");
    }

    #[test]
    fn test_duration_string() {
        assert_eq!(duration_string(Duration::from_millis(1500)), "1.5s");
        assert_eq!(duration_string(Duration::from_micros(12_345)), "12ms");
        assert_eq!(duration_string(Duration::from_nanos(1_500)), "1µs");
    }
}
