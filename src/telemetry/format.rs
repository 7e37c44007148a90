//! Display formatting for ratios and durations

/// Render a ratio as a percentage, e.g. `0.875` → `"87.5%"`
pub fn percentage(ratio: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, ratio * 100.0)
}

/// Render seconds as `"Xh Ym"`, `"Ym Zs"` or `"Zs"`
pub fn duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(0.875, 1), "87.5%");
        assert_eq!(percentage(0.70875, 0), "71%");
    }

    #[test]
    fn test_duration() {
        assert_eq!(duration(45), "45s");
        assert_eq!(duration(125), "2m 5s");
        assert_eq!(duration(3 * 3600 + 20 * 60 + 7), "3h 20m");
    }
}
