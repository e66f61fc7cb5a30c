//! # HCP Comms
//!
//! This is a small "netstack" for the half-duplex serial bus used between
//! Hörmann-style gate operators and their accessories (HCP). It listens to
//! the bus, keeps track of what the operator (the bus master) is doing, and
//! emulates a single slave device that answers the master's queries.
//!
//! The bus is expected to run on an RS-485 style transceiver at 19200 baud,
//! 8N1.
//!
//! ## Entities
//!
//! There are two roles on the bus:
//!
//! 1. The Master, which is the gate operator itself. It drives all
//!    communication, polling slaves and broadcasting its own status.
//! 2. Slaves, which only ever speak when addressed by the Master.
//!
//! This crate only implements the Slave role, and only for a single
//! (configurable) address.
//!
//! ## Message Framing
//!
//! Every frame on the bus looks like this:
//!
//! ```text
//! ┌─────────┬─────────┬────────┬───────────┬─────┐
//! │ ADDRESS │ COUNTER │ LENGTH │ PAYLOAD   │ CRC │
//! │ 1B      │ 4 bits  │ 4 bits │ 1..=3B    │ 1B  │
//! └─────────┴─────────┴────────┴───────────┴─────┘
//! ```
//!
//! * Address 0 is a broadcast, sent by the Master to everyone
//! * The counter rotates through `0..=15`, and is used to detect missed frames
//! * The CRC is a CRC-8 (poly 0x07, init 0xF3) over everything before it
//!
//! Each transmission is started with a Line Break. Unfortunately, not all
//! UARTs report the break the same way: some drop it entirely, others report
//! it as a single zero byte ahead of the frame. There is also no "end of
//! frame" marker, so the [`framer`] has to use the length nibble, the
//! counter, and the CRC to figure out where frames start and end, falling
//! back to inter-byte timing when it gets hopelessly lost.
//!
//! ## Time Division
//!
//! Slaves answer the Master inside a reply slot that starts a fixed time after
//! the Master's query. The [`Slave`] worker schedules each reply relative to the
//! arrival of the first byte of the query that triggered it.
//!
//! ## Sending a Line Break
//!
//! Most serial ports can't be asked to send a break directly, at least not
//! with any useful timing. Instead, the [`transmit`] module switches the port
//! to a slower baud rate and 7 data bits, and sends a single zero byte, which
//! holds the line low long enough for other devices to see a break. The port
//! is then switched back to the normal configuration and the frame is sent.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![allow(async_fn_in_trait)]
#![warn(missing_docs)]

#[macro_use]
mod macros;

pub mod counter;
pub mod crc8;
pub mod emulator;
pub mod frame;
pub mod framer;
pub mod slave;
pub mod status;
pub mod transmit;

#[cfg(test)]
mod mock;

use embassy_time::Instant;

pub use crate::{
    emulator::{DeviceConfig, Emulator},
    frame::{CrcPolicy, Frame, Reject},
    slave::{Slave, SlaveCfg},
};

/// An error type for the [`BusSerial`] trait
#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error<E> {
    /// Some error with the underlying hardware serial port
    Serial(E),
}

impl<E> From<E> for Error<E> {
    fn from(value: E) -> Self {
        Self::Serial(value)
    }
}

/// A time-snapshotted chunk of received bytes
pub struct TimedChunk<'a> {
    /// The timestamp measured as closely as possible to the arrival of
    /// the data.
    pub at: Instant,
    /// The received bytes. The timing logic expects exactly one.
    pub data: &'a [u8],
}

/// Number of data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum StopBits {
    One,
    Two,
}

/// Serial line parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct LineConfig {
    /// Baud rate, in bits per second
    pub baud: u32,
    /// Data bits per character
    pub data_bits: DataBits,
    /// Parity mode
    pub parity: Parity,
    /// Stop bits per character
    pub stop_bits: StopBits,
}

impl LineConfig {
    /// The configuration the bus normally runs at: 19200 8N1
    pub const NORMAL: Self = Self {
        baud: 19200,
        data_bits: DataBits::Eight,
        parity: Parity::None,
        stop_bits: StopBits::One,
    };

    /// The configuration used to fake a Line Break: 9600 7N1
    ///
    /// At this speed a single zero byte holds the line low for eight bit
    /// times (start bit plus seven data bits) of the slower clock, which is
    /// roughly 833us, or sixteen bit times of the normal configuration.
    pub const BREAK: Self = Self {
        baud: 9600,
        data_bits: DataBits::Seven,
        parity: Parity::None,
        stop_bits: StopBits::One,
    };
}

/// A trait representing the communication interface of the HCP bus
pub trait BusSerial {
    /// The error type of the underlying serial port
    type SerError;

    /// Receive the next chunk of data, waiting until at least one byte
    /// arrives.
    ///
    /// Implementations should deliver exactly one byte per call, stamped with
    /// its arrival time. Handing over several bytes at once destroys the
    /// inter-byte timing the framer depends on.
    ///
    /// This function MUST be cancellation safe: if the future is dropped
    /// before completing, no received byte may be lost.
    async fn recv<'a>(&mut self, buf: &'a mut [u8])
        -> Result<TimedChunk<'a>, Error<Self::SerError>>;

    /// Change the line parameters without closing the port.
    async fn set_line_config(&mut self, config: &LineConfig) -> Result<(), Error<Self::SerError>>;

    /// Queue data for sending.
    ///
    /// This function is responsible for activating the "send mode" of the
    /// transceiver if the hardware needs it (e.g. asserting DE).
    async fn write(&mut self, data: &[u8]) -> Result<(), Error<Self::SerError>>;

    /// Wait until all written data has physically left the wire.
    ///
    /// The future MUST not return until the transmitter is completely idle,
    /// not merely when the data has been loaded into a FIFO.
    async fn drain(&mut self) -> Result<(), Error<Self::SerError>>;
}
