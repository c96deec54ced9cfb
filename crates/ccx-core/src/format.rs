//! Human-readable formatting shared by the explorer, cleanup and CLI tables.

/// `42.0s`, `3.5m`, `1.2h`; `Unknown` when the duration isn't known.
pub fn format_duration(seconds: Option<f64>) -> String {
    match seconds {
        None => "Unknown".to_string(),
        Some(s) if s < 60.0 => format!("{s:.1}s"),
        Some(s) if s < 3600.0 => format!("{:.1}m", s / 60.0),
        Some(s) => format!("{:.1}h", s / 3600.0),
    }
}

/// `0B`, `500B`, `1.0KB`, `2.5MB`, ... up to TB.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes}B");
    }
    let mut size = bytes as f64 / 1024.0;
    for unit in ["KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1}{unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1}TB")
}

/// Shorten `s` to at most `max_len` characters, ending in `...` when cut.
pub fn ellipsize(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let head: String = s.chars().take(keep).collect();
    format!("{head}...")
}

/// First `n` characters of `s` (char-boundary safe).
pub fn head_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
