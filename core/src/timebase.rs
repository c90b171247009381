//! Nominal sample timestamps.
//!
//! Timestamps are never measured. Each sample's time is derived from its
//! position in collection order and the configured frequency, in integer
//! arithmetic so the host can compare against the sentinel exactly.

/// Returns `floor(index × 1000 / frequency_hz)`.
///
/// A zero frequency has no meaningful time base and maps every index to `0`.
#[must_use]
pub fn nominal_time_ms(index: u32, frequency_hz: u32) -> u32 {
    if frequency_hz == 0 {
        return 0;
    }
    let millis = u64::from(index) * 1_000 / u64::from(frequency_hz);
    u32::try_from(millis).unwrap_or(u32::MAX)
}

/// Iterator over the nominal timestamps of a run.
#[derive(Clone, Debug)]
pub struct NominalTimes {
    next: u32,
    count: u32,
    frequency_hz: u32,
}

impl NominalTimes {
    pub const fn new(count: u32, frequency_hz: u32) -> Self {
        Self {
            next: 0,
            count,
            frequency_hz,
        }
    }
}

impl Iterator for NominalTimes {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let time = nominal_time_ms(self.next, self.frequency_hz);
        self.next += 1;
        Some(time)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.count - self.next).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}
