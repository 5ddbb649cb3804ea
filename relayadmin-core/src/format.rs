//! Human-readable byte sizes and durations for the connection tables.

pub const NOT_AVAILABLE: &str = "N/A";
pub const DEFAULT_DECIMALS: usize = 2;

const BYTES_PER_UNIT: f64 = 1024.0;
const BYTE_UNITS: [&str; 9] = ["Bytes", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Scales `bytes` down by 1024 until it fits the largest unit below 1024.
///
/// Missing and non-finite values render as [`NOT_AVAILABLE`].
pub fn format_bytes(bytes: Option<f64>, decimals: usize) -> String {
    let Some(bytes) = bytes.filter(|b| b.is_finite()) else {
        return NOT_AVAILABLE.to_owned();
    };
    if bytes == 0.0 {
        return "0 Bytes".to_owned();
    }

    let mut value = bytes;
    let mut unit = 0;
    while value.abs() >= BYTES_PER_UNIT && unit < BYTE_UNITS.len() - 1 {
        value /= BYTES_PER_UNIT;
        unit += 1;
    }

    format!("{:.*} {}", decimals, value, BYTE_UNITS[unit])
}

/// Each unit floor-truncates what is left over from the unit above it.
pub fn format_duration(ms: Option<f64>) -> String {
    let Some(ms) = ms.filter(|m| m.is_finite()) else {
        return NOT_AVAILABLE.to_owned();
    };
    if ms < 1000.0 {
        return format!("{ms} ms");
    }

    let seconds = (ms / 1000.0).floor() as u64;
    if seconds < 60 {
        return format!("{seconds} s");
    }

    let minutes = seconds / 60;
    let remaining_seconds = seconds % 60;
    if minutes < 60 {
        return format!("{minutes}m {remaining_seconds}s");
    }

    let hours = minutes / 60;
    let remaining_minutes = minutes % 60;
    format!("{hours}h {remaining_minutes}m {remaining_seconds}s")
}
