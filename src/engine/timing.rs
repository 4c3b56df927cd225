//! Sample-count arithmetic shared by the session and the CLI.

/// Whole seconds covered by `total_samples` at `sample_rate`.
///
/// Integer division; 0 when either value is not positive.
pub fn duration_seconds(total_samples: i64, sample_rate: i64) -> i64 {
    if sample_rate <= 0 || total_samples <= 0 {
        return 0;
    }
    total_samples / sample_rate
}

/// `m:ss` with the seconds zero-padded to two digits
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Convert a `m:ss`, `h:mm:ss` or plain seconds string to seconds
pub fn parse_duration(input: &str) -> Option<i64> {
    let input = input.trim().trim_end_matches('s');
    if input.is_empty() {
        return None;
    }
    let mut total: i64 = 0;
    let parts: Vec<&str> = input.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    for (i, part) in parts.iter().enumerate() {
        let value: i64 = part.parse().ok()?;
        if value < 0 || (i > 0 && value >= 60) {
            return None;
        }
        total = total * 60 + value;
    }
    Some(total)
}

/// Seconds to a sample offset at `sample_rate`
pub fn seconds_to_samples(seconds: i64, sample_rate: u32) -> i64 {
    seconds.max(0).saturating_mul(sample_rate as i64)
}
