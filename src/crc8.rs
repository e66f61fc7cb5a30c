//! CRC-8 used by every HCP frame
//!
//! Polynomial 0x07, initial value 0xF3, no reflection, no final XOR. These
//! are fixed by the devices on the bus, changing any of them breaks wire
//! compatibility.

use crc::{Algorithm, Crc, Digest};

/// The HCP CRC-8 parameters
pub const CRC_8_HCP: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x07,
    init: 0xf3,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0xd9,
    residue: 0x00,
};

static HCP_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_HCP);

/// Compute the CRC of `bytes`
#[inline]
pub fn compute(bytes: &[u8]) -> u8 {
    HCP_CRC.checksum(bytes)
}

/// Start an incremental CRC computation
pub fn digest() -> Digest<'static, u8> {
    HCP_CRC.digest()
}
