//! Frame layout and validation
//!
//! ```text
//! [address][counter << 4 | length][payload: length bytes][crc]
//! ```
//!
//! `length` is `1..=3`, so a frame is always 4 to 6 bytes long.

use heapless::Vec;

use crate::{counter::COUNTER_MAX, crc8};

/// Address used by the Master for broadcasts
pub const BROADCAST: u8 = 0x00;

/// Largest payload a frame can carry
pub const MAX_PAYLOAD: usize = 3;

/// Address, counter/length, and CRC bytes
pub const OVERHEAD: usize = 3;

/// Largest frame on the wire
pub const MAX_FRAME_SIZE: usize = MAX_PAYLOAD + OVERHEAD;

/// Wire bytes of a single frame
pub type WireFrame = Vec<u8, MAX_FRAME_SIZE>;

/// Reasons a candidate frame is not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[non_exhaustive]
pub enum Reject {
    /// Fewer than 3 bytes, can't be a frame
    TooShort,
    /// The counter nibble isn't the one we expected
    BadCounter {
        /// Counter found in the frame
        got: u8,
        /// Counter we were waiting for
        expected: u8,
    },
    /// The length nibble is zero or above [`MAX_PAYLOAD`]
    BadLength(u8),
    /// The buffer size doesn't match the length nibble
    LengthMismatch {
        /// Bytes in the buffer
        got: usize,
        /// Bytes required by the length nibble
        expected: usize,
    },
    /// The CRC byte doesn't match the frame contents
    BadCrc {
        /// CRC byte found in the frame
        got: u8,
        /// CRC computed over the frame
        expected: u8,
    },
}

/// What to do with a frame whose CRC doesn't match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum CrcPolicy {
    /// Reject the frame
    #[default]
    Enforce,
    /// Log the mismatch, but accept the frame if everything else checks out
    Advisory,
}

/// A single validated HCP frame
///
/// Only ever built by [`Frame::new`] or [`Validator::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Frame {
    address: u8,
    counter: u8,
    payload: Vec<u8, MAX_PAYLOAD>,
    crc: u8,
}

impl Frame {
    /// Build a frame, computing its CRC.
    ///
    /// `counter` is truncated to four bits. Returns [`Reject::BadLength`] if
    /// the payload is empty or longer than [`MAX_PAYLOAD`].
    pub fn new(address: u8, counter: u8, payload: &[u8]) -> Result<Self, Reject> {
        let payload = match payload.len() {
            1..=MAX_PAYLOAD => Vec::from_slice(payload).map_err(|_| Reject::BadLength(0))?,
            n => return Err(Reject::BadLength(n.min(0x0f) as u8)),
        };
        let mut frame = Self {
            address,
            counter: counter & COUNTER_MAX,
            payload,
            crc: 0,
        };
        let mut dig = crc8::digest();
        dig.update(&[frame.address, frame.nibble_byte()]);
        dig.update(&frame.payload);
        frame.crc = dig.finalize();
        Ok(frame)
    }

    /// The destination address
    #[inline]
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Is this a broadcast from the Master?
    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.address == BROADCAST
    }

    /// The rotating counter, `0..=15`
    #[inline]
    pub fn counter(&self) -> u8 {
        self.counter
    }

    /// The payload length, `1..=3`
    #[inline]
    pub fn length(&self) -> u8 {
        self.payload.len() as u8
    }

    /// The payload
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The first payload byte, which is the command for addressed frames
    #[inline]
    pub fn command(&self) -> u8 {
        // Frames always carry at least one payload byte
        self.payload.first().copied().unwrap_or_default()
    }

    /// The CRC byte, as received or computed
    #[inline]
    pub fn crc(&self) -> u8 {
        self.crc
    }

    /// The counter/length byte
    #[inline]
    pub fn nibble_byte(&self) -> u8 {
        (self.counter << 4) | self.length()
    }

    /// Serialize for sending
    pub fn to_wire(&self) -> WireFrame {
        let mut out = WireFrame::new();
        // Can't overflow, MAX_FRAME_SIZE covers the largest payload
        let _ = out.push(self.address);
        let _ = out.push(self.nibble_byte());
        let _ = out.extend_from_slice(&self.payload);
        let _ = out.push(self.crc);
        out
    }
}

/// Counter nibble of a counter/length byte
#[inline]
pub fn counter_nibble(byte: u8) -> u8 {
    byte >> 4
}

/// Length nibble of a counter/length byte
#[inline]
pub fn length_nibble(byte: u8) -> u8 {
    byte & 0x0f
}

/// Total wire size declared by a counter/length byte, if its length nibble
/// is plausible.
#[inline]
pub fn declared_size(byte: u8) -> Option<usize> {
    match length_nibble(byte) as usize {
        n @ 1..=MAX_PAYLOAD => Some(n + OVERHEAD),
        _ => None,
    }
}

/// Checks candidate buffers against the current counter state
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    /// `None` while resynchronizing, in which case any counter is accepted
    expected_counter: Option<u8>,
    crc_policy: CrcPolicy,
}

impl Validator {
    /// Create a validator.
    ///
    /// If `force_resync` is set, the counter check is skipped.
    pub fn new(expected_counter: u8, force_resync: bool, crc_policy: CrcPolicy) -> Self {
        Self {
            expected_counter: (!force_resync).then_some(expected_counter),
            crc_policy,
        }
    }

    /// Check `buf`, returning the frame it holds, or the first reason it
    /// doesn't hold one.
    pub fn validate(&self, buf: &[u8]) -> Result<Frame, Reject> {
        let [address, nibbles, rest @ ..] = buf else {
            return Err(Reject::TooShort);
        };
        if rest.is_empty() {
            return Err(Reject::TooShort);
        }

        let counter = counter_nibble(*nibbles);
        if let Some(expected) = self.expected_counter {
            if counter != expected {
                return Err(Reject::BadCounter {
                    got: counter,
                    expected,
                });
            }
        }

        let len = length_nibble(*nibbles);
        let Some(size) = declared_size(*nibbles) else {
            return Err(Reject::BadLength(len));
        };
        if buf.len() != size {
            return Err(Reject::LengthMismatch {
                got: buf.len(),
                expected: size,
            });
        }

        let (body, crc) = buf.split_at(size - 1);
        let expected_crc = crc8::compute(body);
        if crc[0] != expected_crc {
            let rej = Reject::BadCrc {
                got: crc[0],
                expected: expected_crc,
            };
            match self.crc_policy {
                CrcPolicy::Enforce => return Err(rej),
                CrcPolicy::Advisory => {
                    hcp_warn!("Accepting frame despite {}", rej);
                }
            }
        }

        Ok(Frame {
            address: *address,
            counter,
            payload: Vec::from_slice(&body[2..]).map_err(|_| Reject::BadLength(len))?,
            crc: crc[0],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "serde")]
    #[test]
    fn frames_are_serialize_only() {
        fn serializable<T: serde::Serialize>() {}
        serializable::<Frame>();
        serializable::<crate::emulator::BusEvent>();
    }

    fn wire(address: u8, counter: u8, payload: &[u8]) -> WireFrame {
        Frame::new(address, counter, payload).unwrap().to_wire()
    }

    #[test]
    fn frame_layout() {
        let fr = Frame::new(0x28, 3, &[0x01, 0x80]).unwrap();
        assert_eq!(fr.nibble_byte(), 0x32);
        assert_eq!(fr.command(), 0x01);
        let w = fr.to_wire();
        assert_eq!(w.len(), 5);
        assert_eq!(&w[..4], &[0x28, 0x32, 0x01, 0x80]);
        assert_eq!(w[4], crc8::compute(&w[..4]));
    }

    #[test]
    fn frame_new_rejects_bad_payloads() {
        assert_eq!(Frame::new(0x28, 0, &[]), Err(Reject::BadLength(0)));
        assert_eq!(Frame::new(0x28, 0, &[1, 2, 3, 4]), Err(Reject::BadLength(4)));
    }

    #[test]
    fn accepts_good_frame() {
        let v = Validator::new(0, false, CrcPolicy::Enforce);
        let fr = v.validate(&[0x00, 0x01, 0x41, 0x04]).unwrap();
        assert!(fr.is_broadcast());
        assert_eq!(fr.counter(), 0);
        assert_eq!(fr.payload(), &[0x41]);
        assert_eq!(fr.crc(), 0x04);
    }

    #[test]
    fn too_short() {
        let v = Validator::new(0, false, CrcPolicy::Enforce);
        assert_eq!(v.validate(&[]), Err(Reject::TooShort));
        assert_eq!(v.validate(&[0x00, 0x01]), Err(Reject::TooShort));
    }

    #[test]
    fn counter_checked_unless_resyncing() {
        let w = wire(0x00, 7, &[0x41]);
        let v = Validator::new(2, false, CrcPolicy::Enforce);
        assert_eq!(
            v.validate(&w),
            Err(Reject::BadCounter {
                got: 7,
                expected: 2
            })
        );

        let v = Validator::new(2, true, CrcPolicy::Enforce);
        assert_eq!(v.validate(&w).unwrap().counter(), 7);
    }

    #[test]
    fn length_nibble_bounds() {
        let v = Validator::new(0, false, CrcPolicy::Enforce);
        assert_eq!(v.validate(&[0x00, 0x00, 0x41]), Err(Reject::BadLength(0)));
        assert_eq!(
            v.validate(&[0x00, 0x04, 1, 2, 3, 4, 0]),
            Err(Reject::BadLength(4))
        );
    }

    #[test]
    fn length_mismatch() {
        let v = Validator::new(0, false, CrcPolicy::Enforce);
        assert_eq!(
            v.validate(&[0x00, 0x02, 0x41, 0x04]),
            Err(Reject::LengthMismatch {
                got: 4,
                expected: 5
            })
        );
    }

    #[test]
    fn crc_policy() {
        let mut w = wire(0x28, 0, &[0x20]);
        let last = w.len() - 1;
        w[last] ^= 0xff;

        let strict = Validator::new(0, false, CrcPolicy::Enforce);
        assert!(matches!(strict.validate(&w), Err(Reject::BadCrc { .. })));

        let lax = Validator::new(0, false, CrcPolicy::Advisory);
        let fr = lax.validate(&w).unwrap();
        assert_eq!(fr.command(), 0x20);
        assert_eq!(fr.crc(), w[last]);
    }

    #[test]
    fn declared_sizes() {
        assert_eq!(declared_size(0x01), Some(4));
        assert_eq!(declared_size(0xf3), Some(6));
        assert_eq!(declared_size(0x10), None);
        assert_eq!(declared_size(0x28), None);
    }
}
