//! Timing gates.

/// Rate limiter driven by the caller's wall-clock timestamps.
///
/// It is designed to work with the polling pattern of the machine's
/// `tick`. The gate fires when strictly more than `interval` milliseconds
/// have elapsed since it last fired. The first poll only latches the
/// timestamp, so nothing fires on the very first call.
///
/// When the caller falls behind, the gate fires once and starts counting
/// from the current time, rather than trying to catch up on missed cycles.
#[derive(Debug, Clone)]
pub(crate) struct Gate {
    interval: u64,
    last: Option<u64>,
}

impl Gate {
    pub(crate) fn new(interval: u64) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Forget the latched time. The next poll starts counting afresh.
    pub(crate) fn reset(&mut self) {
        self.last = None;
    }

    /// Latch the time if nothing was latched yet, without ever firing.
    pub(crate) fn arm(&mut self, now: u64) {
        self.last.get_or_insert(now);
    }

    /// Check whether the gate should fire at the given time.
    ///
    /// Time going backwards never fires.
    pub(crate) fn poll(&mut self, now: u64) -> bool {
        match self.last {
            None => {
                self.last = Some(now);
                false
            }
            Some(last) if now.saturating_sub(last) > self.interval => {
                self.last = Some(now);
                true
            }
            Some(_) => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_first_poll_latches() {
        let mut gate = Gate::new(16);
        assert!(!gate.poll(1000));
        assert!(!gate.poll(1016));
        assert!(gate.poll(1017));
        // counts from the last time it fired
        assert!(!gate.poll(1030));
        assert!(gate.poll(1034));
    }

    #[test]
    fn test_reset() {
        let mut gate = Gate::new(3);
        gate.poll(0);
        assert!(gate.poll(10));
        gate.reset();
        assert!(!gate.poll(100));
        assert!(gate.poll(104));
    }

    #[test]
    fn test_arm() {
        let mut gate = Gate::new(3);
        gate.arm(10);
        gate.arm(20);
        assert!(gate.poll(14));
    }

    #[test]
    fn test_backwards_time() {
        let mut gate = Gate::new(3);
        gate.poll(50);
        assert!(!gate.poll(10));
        assert!(gate.poll(54));
    }
}
