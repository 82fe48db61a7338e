use chrono::{DateTime, Duration, Utc};

/// Supplies the signing time, shifted by the configured clock offset.
///
/// Injectable so tests can pin the timestamp instead of reading the wall
/// clock.
#[derive(Debug, Clone)]
pub struct DateProvider {
    clock_offset: Duration,
}

impl DateProvider {
    pub fn new(clock_offset_ms: i64) -> Self {
        Self {
            clock_offset: Duration::milliseconds(clock_offset_ms),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc::now() + self.clock_offset
    }
}

impl Default for DateProvider {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_shifts_the_clock() {
        let plain = DateProvider::default();
        let shifted = DateProvider::new(60_000);
        let delta = shifted.now() - plain.now();
        // Allow slack for the two wall-clock reads.
        assert!(delta >= Duration::milliseconds(59_000));
        assert!(delta <= Duration::milliseconds(61_000));
    }
}
