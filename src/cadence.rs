use chrono::{Local, Timelike};

pub trait Clock {
    /// Wall-clock minute of the hour, 0..=59.
    fn minute(&self) -> u32;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn minute(&self) -> u32 {
        Local::now().minute()
    }
}

/// Decides when the interval destination gets a reading: at most once per
/// qualifying minute, judged on the first outdoor reading seen in that minute.
#[derive(Debug, Clone)]
pub struct CadenceGate {
    interval_minutes: u32,
    last_dispatch_minute: u32,
}

impl CadenceGate {
    /// Starts as if the previous minute was already handled, so the first
    /// reading is judged on its own minute.
    pub fn new(interval_minutes: u32, current_minute: u32) -> Self {
        Self {
            interval_minutes: interval_minutes.max(1),
            last_dispatch_minute: previous_minute(current_minute),
        }
    }

    pub fn interval_minutes(&self) -> u32 {
        self.interval_minutes
    }

    #[cfg(test)]
    pub fn last_dispatch_minute(&self) -> u32 {
        self.last_dispatch_minute
    }

    pub fn admit(&mut self, current_minute: u32) -> bool {
        if current_minute == self.last_dispatch_minute {
            return false;
        }
        self.last_dispatch_minute = current_minute;
        current_minute == 0 || current_minute % self.interval_minutes == 0
    }
}

fn previous_minute(minute: u32) -> u32 {
    (minute % 60 + 59) % 60
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admitted(gate: &mut CadenceGate, minutes: &[u32]) -> Vec<u32> {
        minutes
            .iter()
            .copied()
            .filter(|minute| gate.admit(*minute))
            .collect()
    }

    #[test]
    fn fires_once_per_qualifying_new_minute() {
        let mut gate = CadenceGate::new(2, 4);
        assert_eq!(admitted(&mut gate, &[5, 5, 6, 7, 8, 10]), vec![6, 8, 10]);
    }

    #[test]
    fn repeated_qualifying_minute_fires_once() {
        let mut gate = CadenceGate::new(2, 3);
        assert_eq!(admitted(&mut gate, &[4, 4, 4, 5, 6, 6]), vec![4, 6]);
    }

    #[test]
    fn first_reading_after_start_is_judged_on_its_minute() {
        let mut gate = CadenceGate::new(2, 10);
        assert_eq!(gate.last_dispatch_minute(), 9);
        assert!(gate.admit(10));

        let mut gate = CadenceGate::new(2, 11);
        assert!(!gate.admit(11));
    }

    #[test]
    fn start_wraps_at_top_of_hour() {
        let gate = CadenceGate::new(2, 0);
        assert_eq!(gate.last_dispatch_minute(), 59);
        let mut gate = gate;
        assert!(gate.admit(0));
        assert!(!gate.admit(0));
    }

    #[test]
    fn minute_zero_always_qualifies() {
        let mut gate = CadenceGate::new(7, 58);
        assert_eq!(admitted(&mut gate, &[58, 59, 0, 1, 7]), vec![0, 7]);
    }

    #[test]
    fn non_qualifying_first_reading_blocks_rest_of_minute() {
        let mut gate = CadenceGate::new(5, 0);
        assert!(!gate.admit(3));
        assert!(!gate.admit(3));
        assert!(gate.admit(5));
    }

    #[test]
    fn zero_interval_is_treated_as_every_minute() {
        let mut gate = CadenceGate::new(0, 0);
        assert_eq!(admitted(&mut gate, &[1, 1, 2]), vec![1, 2]);
    }
}
