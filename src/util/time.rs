//! Time utilities

/// Format a number of seconds as a short human-readable string
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        match secs % 60 {
            0 => format!("{}m", secs / 60),
            rem => format!("{}m {}s", secs / 60, rem),
        }
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_each_scale() {
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(60), "1m");
        assert_eq!(format_duration(95), "1m 35s");
        assert_eq!(format_duration(7260), "2h 1m");
    }
}
