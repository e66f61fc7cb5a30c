//! Half-duplex transmission
//!
//! Every transmission on the bus starts with a Line Break. We can't ask most
//! serial ports for one, so we fake it: switch to [`LineConfig::BREAK`], send
//! a single zero byte, wait for it to leave, then switch back and send the
//! actual frame.

use crate::{frame::Frame, BusSerial, Error, LineConfig};

/// Which step of a transmission failed
#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[non_exhaustive]
pub enum TxError<E> {
    /// Switching to the break configuration failed
    Reconfigure(Error<E>),
    /// Sending or draining the break byte failed
    Break(Error<E>),
    /// Switching back to the normal configuration failed
    Restore(Error<E>),
    /// Sending or draining the frame failed
    Write(Error<E>),
}

/// Sends frames, each preceded by a Line Break
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfDuplexTx {
    normal: LineConfig,
    brk: LineConfig,
}

impl HalfDuplexTx {
    /// Create a transmitter using the given line configurations
    pub const fn new(normal: LineConfig, brk: LineConfig) -> Self {
        Self { normal, brk }
    }

    /// Send a break, then `frame`.
    ///
    /// The line is always returned to the normal configuration before the
    /// frame is sent, even if sending the break fails. Nothing is sent if
    /// the line could not be restored.
    pub async fn send<S: BusSerial>(
        &self,
        serial: &mut S,
        frame: &Frame,
    ) -> Result<(), TxError<S::SerError>> {
        let wire = frame.to_wire();

        // Sending the break COULD fail, so don't early return here, the
        // line config has to be put back regardless.
        let brk = self.send_break(serial).await;
        let restore = serial.set_line_config(&self.normal).await;

        if let Err(e) = brk {
            if restore.is_err() {
                hcp_error!("Error restoring line config after failed break");
            }
            return Err(e);
        }
        restore.map_err(TxError::Restore)?;

        hcp_debug!("Sending {=[u8]:x}", &wire[..]);
        serial.write(&wire).await.map_err(TxError::Write)?;
        serial.drain().await.map_err(TxError::Write)?;
        Ok(())
    }

    async fn send_break<S: BusSerial>(&self, serial: &mut S) -> Result<(), TxError<S::SerError>> {
        serial
            .set_line_config(&self.brk)
            .await
            .map_err(TxError::Reconfigure)?;
        serial.write(&[0]).await.map_err(TxError::Break)?;
        serial.drain().await.map_err(TxError::Break)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;
    use crate::mock::{MockError, MockSerial, Op};

    fn reply() -> Frame {
        Frame::new(0x80, 1, &[20, 0x28]).unwrap()
    }

    #[test]
    fn break_then_frame() {
        let mut serial = MockSerial::new();
        let tx = HalfDuplexTx::new(LineConfig::NORMAL, LineConfig::BREAK);
        block_on(tx.send(&mut serial, &reply())).unwrap();

        let wire = reply().to_wire();
        assert_eq!(
            serial.ops,
            std::vec![
                Op::SetConfig(LineConfig::BREAK),
                Op::Write(std::vec![0]),
                Op::Drain,
                Op::SetConfig(LineConfig::NORMAL),
                Op::Write(wire.to_vec()),
                Op::Drain,
            ]
        );
        assert_eq!(serial.config, LineConfig::NORMAL);
    }

    #[test]
    fn reconfigure_failure_still_restores() {
        let mut serial = MockSerial::new();
        serial.fail_at = Some(0);
        let tx = HalfDuplexTx::new(LineConfig::NORMAL, LineConfig::BREAK);
        let res = block_on(tx.send(&mut serial, &reply()));
        assert_eq!(res, Err(TxError::Reconfigure(Error::Serial(MockError::Injected))));
        assert_eq!(serial.ops.last(), Some(&Op::SetConfig(LineConfig::NORMAL)));
        assert_eq!(serial.config, LineConfig::NORMAL);
    }

    #[test]
    fn break_write_failure_still_restores() {
        let mut serial = MockSerial::new();
        serial.fail_at = Some(1);
        let tx = HalfDuplexTx::new(LineConfig::NORMAL, LineConfig::BREAK);
        let res = block_on(tx.send(&mut serial, &reply()));
        assert_eq!(res, Err(TxError::Break(Error::Serial(MockError::Injected))));
        assert_eq!(
            serial.ops,
            std::vec![
                Op::SetConfig(LineConfig::BREAK),
                Op::SetConfig(LineConfig::NORMAL),
            ]
        );
        assert_eq!(serial.config, LineConfig::NORMAL);
    }

    #[test]
    fn restore_failure_sends_nothing() {
        let mut serial = MockSerial::new();
        serial.fail_at = Some(3);
        let tx = HalfDuplexTx::new(LineConfig::NORMAL, LineConfig::BREAK);
        let res = block_on(tx.send(&mut serial, &reply()));
        assert_eq!(res, Err(TxError::Restore(Error::Serial(MockError::Injected))));
        assert_eq!(serial.written(), std::vec![0]);
    }

    #[test]
    fn frame_write_failure() {
        let mut serial = MockSerial::new();
        serial.fail_at = Some(5);
        let tx = HalfDuplexTx::new(LineConfig::NORMAL, LineConfig::BREAK);
        let res = block_on(tx.send(&mut serial, &reply()));
        assert_eq!(res, Err(TxError::Write(Error::Serial(MockError::Injected))));
        assert_eq!(serial.config, LineConfig::NORMAL);
    }
}
