//! Rotating frame counters
//!
//! Every frame carries a 4-bit counter. There is one counter per direction:
//! the one we expect to see on the next frame we hear, and the one we stamp
//! on the next frame we send.

/// Counters wrap after this value
pub const COUNTER_MAX: u8 = 0x0f;

#[inline]
fn advance(counter: u8) -> u8 {
    (counter + 1) & COUNTER_MAX
}

/// Receive and transmit counter state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct CounterTracker {
    expected: u8,
    own_tx: u8,
}

impl CounterTracker {
    /// Create a tracker with both counters at zero
    pub const fn new() -> Self {
        Self {
            expected: 0,
            own_tx: 0,
        }
    }

    /// The counter the next received frame must carry
    #[inline]
    pub fn expected(&self) -> u8 {
        self.expected
    }

    /// The counter stamped on the most recently sent frame
    #[inline]
    pub fn own_tx(&self) -> u8 {
        self.own_tx
    }

    /// Record that a frame carrying `counter` was accepted.
    ///
    /// When `force_resync` is set we no longer trust our own idea of the
    /// counter, and adopt the one from the bus instead.
    pub fn on_accept(&mut self, counter: u8, force_resync: bool) {
        if force_resync {
            hcp_debug!("Reset counter to {=u8}", counter);
            self.expected = counter & COUNTER_MAX;
        }
        self.expected = advance(self.expected);
    }

    /// Draw the counter for the next outgoing frame
    pub fn next_tx_counter(&mut self) -> u8 {
        self.own_tx = advance(self.own_tx);
        self.own_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_counter_wraps() {
        let mut ct = CounterTracker::new();
        let drawn: Vec<u8> = (0..16).map(|_| ct.next_tx_counter()).collect();
        assert_eq!(drawn[0], 1);
        assert_eq!(drawn[14], 15);
        assert_eq!(drawn[15], 0);
        assert_eq!(ct.own_tx(), 0);
    }

    #[test]
    fn expected_advances_and_wraps() {
        let mut ct = CounterTracker::new();
        for i in 0..16u8 {
            assert_eq!(ct.expected(), i);
            ct.on_accept(i, false);
        }
        assert_eq!(ct.expected(), 0);
    }

    #[test]
    fn resync_adopts_bus_counter() {
        let mut ct = CounterTracker::new();
        ct.on_accept(9, true);
        assert_eq!(ct.expected(), 10);
        ct.on_accept(15, true);
        assert_eq!(ct.expected(), 0);
    }

    #[test]
    fn directions_are_independent() {
        let mut ct = CounterTracker::new();
        ct.on_accept(0, false);
        ct.on_accept(1, false);
        assert_eq!(ct.next_tx_counter(), 1);
        assert_eq!(ct.expected(), 2);
    }
}
