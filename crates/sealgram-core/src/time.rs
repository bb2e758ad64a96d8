//! Wall-clock helper for record timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in milliseconds. Clamps to zero if the system clock
/// reports a time before the epoch.
pub fn now_ms() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis() as u64,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::now_ms;

    #[test]
    fn now_is_after_2020() {
        // 2020-01-01 in unix millis
        assert!(now_ms() > 1_577_836_800_000);
    }
}
