//! Unix-millisecond clock helpers. All bridge timestamps are `u64` unix ms.

/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Converts a duration threshold into the whole-minute form the store's
/// age-filtered endpoints accept, never rounding a non-zero threshold to 0.
pub fn duration_as_age_minutes(duration: std::time::Duration) -> u64 {
    (duration.as_secs() / 60).max(1)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn timestamp_is_plausibly_current() {
        // 2023-01-01 as a floor; catches unit mixups (seconds vs millis).
        assert!(current_unix_timestamp_ms() > 1_672_531_200_000);
    }

    #[test]
    fn age_minutes_floor_is_one() {
        assert_eq!(duration_as_age_minutes(Duration::from_secs(30)), 1);
        assert_eq!(duration_as_age_minutes(Duration::from_secs(60)), 1);
        assert_eq!(duration_as_age_minutes(Duration::from_secs(300)), 5);
    }
}
