//! Parses the `ping --interval <duration>` argument (spec.md §8, property
//! 9). Deliberately narrow: only whole-number `ms`/`s`/`m` durations are
//! accepted, matching the accepted/rejected cases in the collaborator's own
//! command-line tests.

use std::time::Duration;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

pub fn parse_interval(input: &str) -> Option<Duration> {
    let (digits, unit) = split_unit(input)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;
    if amount == 0 {
        return None;
    }
    match unit {
        "ms" => Some(Duration::from_millis(amount)),
        "s" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_secs(amount * 60)),
        _ => None,
    }
}

fn split_unit(input: &str) -> Option<(&str, &str)> {
    for unit in ["ms", "s", "m"] {
        if let Some(digits) = input.strip_suffix(unit) {
            return Some((digits, unit));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_whole_number_durations() {
        assert_eq!(parse_interval("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_interval("3s"), Some(Duration::from_secs(3)));
        assert_eq!(parse_interval("10m"), Some(Duration::from_secs(600)));
    }

    #[test]
    fn rejects_garbage_zero_fractional_and_empty() {
        for input in ["hello", "0s", "8h", "1.5m", ""] {
            assert!(parse_interval(input).is_none(), "{input} should be rejected");
        }
    }
}
