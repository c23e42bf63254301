//! Level Results
//!
//! Star rating and time formatting for the per-level summary record.

/// Stars (0-3) for a finished level.
///
/// `score >= 1500 -> 3`, `>= 1000 -> 2`, `> 0 -> 1`, else 0; one star is
/// lost (floored at 0) when the level took more than five minutes.
pub fn calculate_stars(score: u32, elapsed_secs: u64) -> u8 {
    let stars: u8 = if score >= 1500 {
        3
    } else if score >= 1000 {
        2
    } else if score > 0 {
        1
    } else {
        0
    };

    if elapsed_secs > 5 * 60 {
        stars.saturating_sub(1)
    } else {
        stars
    }
}

/// Format seconds as `MM:SS`.
pub fn format_time(elapsed_secs: u64) -> String {
    format!("{:02}:{:02}", elapsed_secs / 60, elapsed_secs % 60)
}

/// Parse a `MM:SS` string back to seconds.
pub fn parse_time(text: &str) -> Option<u64> {
    let (minutes, seconds) = text.split_once(':')?;
    let minutes: u64 = minutes.trim().parse().ok()?;
    let seconds: u64 = seconds.trim().parse().ok()?;
    if seconds >= 60 {
        return None;
    }
    Some(minutes * 60 + seconds)
}
