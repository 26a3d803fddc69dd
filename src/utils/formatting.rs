pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else if ms < 3_600_000 {
        let mins = ms / 60_000;
        let secs = (ms % 60_000) / 1000;
        format!("{}m {}s", mins, secs)
    } else {
        let hours = ms / 3_600_000;
        let mins = (ms % 3_600_000) / 60_000;
        format!("{}h {}m", hours, mins)
    }
}

/// `"3/12 (25%)"` style progress label.
pub fn format_progress(done: usize, total: usize) -> String {
    if total == 0 {
        return "0/0".to_string();
    }
    format!("{}/{} ({}%)", done, total, done * 100 / total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_ranges() {
        assert_eq!(format_duration(250), "250ms");
        assert_eq!(format_duration(1_500), "1.5s");
        assert_eq!(format_duration(125_000), "2m 5s");
        assert_eq!(format_duration(3_720_000), "1h 2m");
    }

    #[test]
    fn test_format_progress() {
        assert_eq!(format_progress(3, 12), "3/12 (25%)");
        assert_eq!(format_progress(0, 0), "0/0");
    }
}
