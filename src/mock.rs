//! A fake serial port that records everything done to it

use std::{collections::VecDeque, vec::Vec};

use embassy_time::{Duration, Instant};

use crate::{BusSerial, Error, LineConfig, TimedChunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    /// Failure requested by the test
    Injected,
}

/// Something for the next `recv` to return
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Chunk(Instant, Vec<u8>),
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    SetConfig(LineConfig),
    Write(Vec<u8>),
    Drain,
}

pub struct MockSerial {
    /// Successful operations, in order
    pub ops: Vec<Op>,
    /// Current line configuration
    pub config: LineConfig,
    /// Fail the n-th attempted operation (receives not included)
    pub fail_at: Option<usize>,
    /// Waiting to be received. Once empty, `recv` never completes.
    pub incoming: VecDeque<Incoming>,
    attempts: usize,
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            config: LineConfig::NORMAL,
            fail_at: None,
            incoming: VecDeque::new(),
            attempts: 0,
        }
    }

    /// Queue `bytes` one at a time, `spacing` apart, the first at `start`
    pub fn hear(&mut self, start: Instant, spacing: Duration, bytes: &[u8]) {
        let mut at = start;
        for b in bytes {
            self.incoming.push_back(Incoming::Chunk(at, std::vec![*b]));
            at += spacing;
        }
    }

    /// All bytes written, in order
    pub fn written(&self) -> Vec<u8> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Write(data) => Some(data.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    fn attempt(&mut self, op: Op) -> Result<(), Error<MockError>> {
        let n = self.attempts;
        self.attempts += 1;
        if self.fail_at == Some(n) {
            return Err(Error::Serial(MockError::Injected));
        }
        if let Op::SetConfig(cfg) = &op {
            self.config = *cfg;
        }
        self.ops.push(op);
        Ok(())
    }
}

impl BusSerial for MockSerial {
    type SerError = MockError;

    async fn recv<'a>(
        &mut self,
        buf: &'a mut [u8],
    ) -> Result<TimedChunk<'a>, Error<Self::SerError>> {
        let (at, data) = match self.incoming.pop_front() {
            Some(Incoming::Chunk(at, data)) => (at, data),
            Some(Incoming::Fail) => return Err(Error::Serial(MockError::Injected)),
            None => return core::future::pending().await,
        };
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(TimedChunk {
            at,
            data: &buf[..len],
        })
    }

    async fn set_line_config(&mut self, config: &LineConfig) -> Result<(), Error<Self::SerError>> {
        self.attempt(Op::SetConfig(*config))
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), Error<Self::SerError>> {
        self.attempt(Op::Write(data.to_vec()))
    }

    async fn drain(&mut self) -> Result<(), Error<Self::SerError>> {
        self.attempt(Op::Drain)
    }
}
