//! Small formatting and path helpers

use std::time::Duration;

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    let b = bytes as f64;
    if b > GIB {
        format!("{:.1} GiB", b / GIB)
    } else if b > MIB {
        format!("{:.1} MiB", b / MIB)
    } else if b > KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Human-readable duration: milliseconds below one second, else seconds
pub fn format_duration(elapsed: Duration) -> String {
    if elapsed > Duration::from_secs(1) {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        format!("{}ms", elapsed.as_millis())
    }
}

/// Normalise a virtual directory to `""` (root) or `/a/b`
pub fn normalize_dir(dir: &str) -> String {
    let trimmed = dir.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

pub fn join_virtual_path(dir_path: &str, name: &str) -> String {
    format!("{}/{}", normalize_dir(dir_path), name)
}

/// Split a virtual path into `(dir_path, name)`
pub fn split_virtual_path(path: &str) -> Option<(String, String)> {
    let path = format!("/{}", path.trim().trim_start_matches('/'));
    let (dir, name) = path.rsplit_once('/')?;
    if name.is_empty() {
        return None;
    }
    Some((normalize_dir(dir), name.to_string()))
}
