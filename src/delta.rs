use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    pub fn arrow(self) -> &'static str {
        match self {
            Direction::Up => "▲",
            Direction::Down => "▼",
            Direction::Flat => "—",
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            Direction::Up => "delta-up",
            Direction::Down => "delta-down",
            Direction::Flat => "delta-flat",
        }
    }
}

/// Relative change from `previous` to `current`.
///
/// A zero baseline never divides: 0 → 0 is `0.0` and 0 → anything is `1.0`,
/// which renders as "+100%".
pub fn percent_change(current: u64, previous: u64) -> f64 {
    if previous == 0 {
        return if current == 0 { 0.0 } else { 1.0 };
    }
    (current as f64 - previous as f64) / previous as f64
}

pub fn classify(current: u64, previous: u64) -> Direction {
    match current.cmp(&previous) {
        std::cmp::Ordering::Greater => Direction::Up,
        std::cmp::Ordering::Less => Direction::Down,
        std::cmp::Ordering::Equal => Direction::Flat,
    }
}

/// `1234567` → `"1,234,567"`.
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Whole-percent rendering of a ratio: `+50%`, `-33%`, `0%`.
///
/// The sign follows the unrounded ratio, so tiny moves still read `+0%` or
/// `-0%`. Halves round to even.
pub fn format_percent(ratio: f64) -> String {
    let rounded = (ratio * 100.0).round_ties_even();
    if ratio > 0.0 {
        format!("+{rounded:.0}%")
    } else {
        format!("{rounded:.0}%")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_to_zero_is_flat_and_zero() {
        assert_eq!(percent_change(0, 0), 0.0);
        assert_eq!(classify(0, 0), Direction::Flat);
        assert_eq!(format_percent(percent_change(0, 0)), "0%");
    }

    #[test]
    fn growth_from_zero_is_reported_as_one_hundred_percent() {
        for current in [1, 7, 1_000_000] {
            assert_eq!(percent_change(current, 0), 1.0);
            assert_eq!(classify(current, 0), Direction::Up);
        }
        assert_eq!(format_percent(percent_change(42, 0)), "+100%");
    }

    #[test]
    fn growth_renders_with_plus_sign() {
        let ratio = percent_change(150, 100);
        assert_eq!(ratio, 0.5);
        assert_eq!(format_percent(ratio), "+50%");
    }

    #[test]
    fn decline_renders_with_minus_from_numeral() {
        let ratio = percent_change(100, 150);
        assert!((ratio - (-1.0 / 3.0)).abs() < 1e-9);
        assert_eq!(format_percent(ratio), "-33%");
        assert_eq!(classify(100, 150), Direction::Down);
    }

    #[test]
    fn tiny_changes_keep_their_sign() {
        assert_eq!(format_percent(percent_change(1_000_001, 1_000_000)), "+0%");
        assert_eq!(format_percent(-0.0001), "-0%");
        assert_eq!(format_percent(0.0), "0%");
    }

    #[test]
    fn halves_round_to_even() {
        assert_eq!(format_percent(percent_change(1_025, 1_000)), "+2%");
        assert_eq!(format_percent(percent_change(203, 200)), "+2%");
        assert_eq!(format_percent(percent_change(201, 200)), "+0%");
        assert_eq!(format_percent(percent_change(975, 1_000)), "-2%");
    }

    #[test]
    fn counts_get_thousands_separators() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
        assert_eq!(format_count(12_345_678_901), "12,345,678,901");
    }

    #[test]
    fn arrows_follow_direction() {
        assert_eq!(Direction::Up.arrow(), "▲");
        assert_eq!(Direction::Down.arrow(), "▼");
        assert_eq!(Direction::Flat.arrow(), "—");
    }
}
