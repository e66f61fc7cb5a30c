//! Byte framer
//!
//! Turns the stream of single received bytes back into frames.
//!
//! There is no reliable start or end marker on the bus. The Line Break that
//! starts each transmission is either swallowed by the UART, or shows up as a
//! single spurious zero byte. So instead:
//!
//! * A new frame starts with the first byte heard while idle
//! * The second byte tells us how long the frame will be
//! * From the third byte onwards, we check both the buffer as-is, and the
//!   buffer without its first byte (in case that was the break), and take the
//!   first one that validates
//! * Once the buffer is as long as any reading of it could need, and nothing
//!   validated, the buffer is thrown away as noise
//!
//! If a frame appears to run on for longer than the force resync interval,
//! something went badly wrong (usually a missed frame), so we start over and
//! take the counter of the next good frame as gospel.

use embassy_time::{Duration, Instant};
use heapless::Vec;

use crate::{
    counter::CounterTracker,
    frame::{declared_size, CrcPolicy, Frame, Validator, MAX_FRAME_SIZE},
    TimedChunk,
};

/// Room for the largest frame plus a spurious leading byte
pub const BUFFER_SIZE: usize = MAX_FRAME_SIZE + 1;

/// Default inter-byte gap that forces a new frame, even mid-frame
pub const DEFAULT_FORCE_RESYNC_INTERVAL: Duration = Duration::from_millis(6);

/// Framer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum Phase {
    /// Waiting for the first byte of a frame
    Idle,
    /// Got the first byte, length not yet known
    Collecting,
    /// Length known, collecting payload until a CRC checks out
    AwaitingCrc,
}

/// Which reading of the buffer validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum Candidate {
    /// The buffer as received
    Whole,
    /// The buffer minus its first byte, which was a Line Break
    Truncated,
}

/// A validated frame, along with when it started
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct RxFrame {
    /// The frame itself
    pub frame: Frame,
    /// Arrival time of the first byte of the buffer
    pub start: Instant,
    /// Which reading of the buffer this frame came from
    pub candidate: Candidate,
    /// Was the receive counter resynchronized to this frame?
    pub resynced: bool,
}

/// Return the first reading of `buf` that validates
///
/// The whole buffer is preferred over the buffer minus its first byte.
pub fn select_candidate(buf: &[u8], validator: &Validator) -> Option<(Candidate, Frame)> {
    let truncated = buf.get(1..).unwrap_or_default();
    [(Candidate::Whole, buf), (Candidate::Truncated, truncated)]
        .into_iter()
        .find_map(|(kind, cand)| match validator.validate(cand) {
            Ok(frame) => Some((kind, frame)),
            Err(_rej) => {
                hcp_trace!("{} reading rejected: {}", kind, _rej);
                None
            }
        })
}

/// The most bytes any plausible reading of `buf` needs, or `None` if there is
/// no plausible reading.
///
/// A leading zero may be a Line Break, so the buffer minus its first byte is
/// given the chance to complete as well.
fn completion_limit(buf: &[u8]) -> Option<usize> {
    let whole = buf.get(1).copied().and_then(declared_size);
    let truncated = match buf.first() {
        Some(0) => buf.get(2).copied().and_then(declared_size).map(|n| n + 1),
        _ => None,
    };
    whole.max(truncated)
}

/// Has the buffer run past the end of its whole reading?
fn past_whole_reading(buf: &[u8]) -> bool {
    buf.get(1)
        .copied()
        .and_then(declared_size)
        .map_or(false, |n| buf.len() > n)
}

/// Frame assembly state for one byte stream
pub struct Framer {
    buffer: Vec<u8, BUFFER_SIZE>,
    phase: Phase,
    start_time: Instant,
    last_byte: Option<Instant>,
    force_resync: bool,
    lost: bool,
    force_interval: Duration,
    crc_policy: CrcPolicy,
}

impl Framer {
    /// Create a new, idle, framer
    pub fn new(force_interval: Duration, crc_policy: CrcPolicy) -> Self {
        Self {
            buffer: Vec::new(),
            phase: Phase::Idle,
            start_time: Instant::from_ticks(0),
            last_byte: None,
            force_resync: false,
            lost: false,
            force_interval,
            crc_policy,
        }
    }

    /// Current state
    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Will the next accepted frame reset the receive counter?
    #[inline]
    pub fn force_resync(&self) -> bool {
        self.force_resync
    }

    /// Bytes collected for the frame in progress
    #[inline]
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Process a chunk from the transport.
    ///
    /// Anything other than a single byte breaks the timing assumptions, and
    /// is dropped.
    pub fn feed_chunk(
        &mut self,
        chunk: &TimedChunk<'_>,
        counters: &mut CounterTracker,
    ) -> Option<RxFrame> {
        let [byte] = chunk.data else {
            hcp_error!("Chunk length should always be 1, got {=usize}", chunk.data.len());
            return None;
        };
        self.feed(*byte, chunk.at, counters)
    }

    /// Process one byte that arrived at `at`.
    ///
    /// On success, `counters` has already been advanced past the returned
    /// frame.
    pub fn feed(&mut self, byte: u8, at: Instant, counters: &mut CounterTracker) -> Option<RxFrame> {
        let delay = self.last_byte.map(|last| at.saturating_duration_since(last));
        self.last_byte = Some(at);
        let overdue = delay.map_or(false, |d| d > self.force_interval);

        match self.phase {
            Phase::Idle => {
                // The last buffer was noise. If the bus then went quiet for a
                // long time, we have probably lost count too.
                if self.lost && overdue {
                    self.force_resync = true;
                }
                self.begin(at);
            }
            Phase::Collecting | Phase::AwaitingCrc if overdue => {
                hcp_debug!(
                    "Forcing new frame after {=u64}us",
                    delay.map_or(0, |d| d.as_micros())
                );
                self.begin(at);
                self.force_resync = true;
            }
            Phase::Collecting | Phase::AwaitingCrc => {}
        }

        if self.buffer.push(byte).is_err() {
            self.discard();
            return None;
        }
        self.phase = match self.buffer.len() {
            0 | 1 => Phase::Collecting,
            _ => Phase::AwaitingCrc,
        };
        if self.buffer.len() < 3 {
            return None;
        }

        let validator = Validator::new(counters.expected(), self.force_resync, self.crc_policy);
        if let Some((candidate, frame)) = select_candidate(&self.buffer, &validator) {
            hcp_trace!("{} reading checks out", candidate);
            let resynced = self.force_resync;
            counters.on_accept(frame.counter(), resynced);
            let rx = RxFrame {
                frame,
                start: self.start_time,
                candidate,
                resynced,
            };
            self.force_resync = false;
            self.lost = false;
            self.reset();
            return Some(rx);
        }

        match completion_limit(&self.buffer) {
            Some(limit) if self.buffer.len() < limit => {}
            _ => {
                // A corrupted broadcast waits one byte longer than it needs
                // to. That byte is the start of whatever came next.
                let carry = past_whole_reading(&self.buffer);
                self.discard();
                if carry {
                    self.begin(at);
                    // Can't fail, the buffer was just cleared
                    let _ = self.buffer.push(byte);
                }
            }
        }
        None
    }

    fn begin(&mut self, at: Instant) {
        self.buffer.clear();
        self.start_time = at;
        self.phase = Phase::Collecting;
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.phase = Phase::Idle;
    }

    fn discard(&mut self) {
        hcp_debug!("Dropping noise: {=[u8]:x}", &self.buffer[..]);
        self.lost = true;
        self.reset();
    }
}
