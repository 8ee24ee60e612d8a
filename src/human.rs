use std::time::Duration;

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;

pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let value = bytes as f64;
    if value >= GIB {
        format!("{:.2} GB", value / GIB)
    } else if value >= MIB {
        format!("{:.2} MB", value / MIB)
    } else {
        format!("{:.2} KB", value / KIB)
    }
}

pub fn format_optional_size(bytes: Option<u64>) -> String {
    match bytes {
        Some(bytes) => format_size(bytes),
        None => "Unknown".to_string(),
    }
}

pub fn format_speed(bytes_per_second: f64) -> String {
    if bytes_per_second >= MIB {
        format!("{:.2} MB/s", bytes_per_second / MIB)
    } else if bytes_per_second >= KIB {
        format!("{:.2} KB/s", bytes_per_second / KIB)
    } else {
        format!("{:.2} B/s", bytes_per_second)
    }
}

pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs_f64();
    if seconds > 3600.0 {
        format!("{:.1}h", seconds / 3600.0)
    } else if seconds > 60.0 {
        format!("{:.1}m", seconds / 60.0)
    } else {
        format!("{:.1}s", seconds)
    }
}
