//! Slave interface
//!
//! This interface is used to run the emulated device on a bus.

use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    channel::{Receiver, Sender},
};
use embassy_time::{Duration, Instant, Timer};
use futures::future::{select, Either};

use crate::{
    emulator::{BusEvent, DeviceConfig, Emulator},
    frame::Frame,
    framer::{Framer, RxFrame},
    status::OperatorInput,
    transmit::{HalfDuplexTx, TxError},
    BusSerial, Error, LineConfig, TimedChunk,
};

/// The default number of "in-flight" events FROM Slave TO application
pub const EVENT_QUEUE_SIZE: usize = 8;
/// The default number of "in-flight" inputs FROM application TO Slave
pub const INPUT_QUEUE_SIZE: usize = 4;

/// Receive scratch space. Only one byte is expected, a little more lets us
/// notice (and drop) transports that batch.
const RECV_SCRATCH: usize = 8;

/// Metadata trait to contain relevant generics
pub trait SlaveCfg {
    /// Mutex type used for channels
    type Mutex: RawMutex + 'static;

    /// Serial interface type
    type Serial: BusSerial;

    /// Amount of time from the start of a query to the start of our reply
    const REPLY_SLOT_DELAY: Duration;

    /// Inter-byte gap after which a frame in progress is abandoned, and the
    /// receive counter resynchronized
    const FORCE_RESYNC_INTERVAL: Duration;

    /// Line configuration the bus runs at, and that the port is left in
    const NORMAL_LINE: LineConfig = LineConfig::NORMAL;

    /// Line configuration used to fake a Line Break before each reply
    const BREAK_LINE: LineConfig = LineConfig::BREAK;
}

/// Errors reported by [`Slave::step`]
#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[non_exhaustive]
pub enum SlaveError<E> {
    /// Receiving from the serial port failed
    Recv(Error<E>),
    /// Sending a reply failed
    Transmit(TxError<E>),
}

impl<E> From<Error<E>> for SlaveError<E> {
    fn from(value: Error<E>) -> Self {
        Self::Recv(value)
    }
}

impl<E> From<TxError<E>> for SlaveError<E> {
    fn from(value: TxError<E>) -> Self {
        Self::Transmit(value)
    }
}

struct PendingReply {
    due: Instant,
    frame: Frame,
}

/// Interface for the Slave
///
/// Like the Target of a polled bus, we must never make the Master wait, so
/// the application side is decoupled with a pair of
/// [`Channel`][embassy_sync::channel::Channel]s: events go out with
/// `try_send`, and are dropped if the application falls behind.
pub struct Slave<'a, Cfg, const EV: usize = EVENT_QUEUE_SIZE, const IN: usize = INPUT_QUEUE_SIZE>
where
    Cfg: SlaveCfg,
{
    serial: Cfg::Serial,
    to_app: Sender<'a, Cfg::Mutex, BusEvent, EV>,
    from_app: Receiver<'a, Cfg::Mutex, OperatorInput, IN>,
    framer: Framer,
    emulator: Emulator,
    tx: HalfDuplexTx,
    pending: Option<PendingReply>,
}

impl<'a, Cfg, const EV: usize, const IN: usize> Slave<'a, Cfg, EV, IN>
where
    Cfg: SlaveCfg,
{
    /// Create a new [Slave] worker.
    ///
    /// The serial port must already be open, in [`SlaveCfg::NORMAL_LINE`].
    pub fn new(
        serial: Cfg::Serial,
        to_app: Sender<'a, Cfg::Mutex, BusEvent, EV>,
        from_app: Receiver<'a, Cfg::Mutex, OperatorInput, IN>,
        config: DeviceConfig,
    ) -> Self {
        Self {
            serial,
            to_app,
            from_app,
            framer: Framer::new(Cfg::FORCE_RESYNC_INTERVAL, config.crc_policy),
            emulator: Emulator::new(config),
            tx: HalfDuplexTx::new(Cfg::NORMAL_LINE, Cfg::BREAK_LINE),
            pending: None,
        }
    }

    /// The emulated device
    #[inline]
    pub fn emulator(&self) -> &Emulator {
        &self.emulator
    }

    /// Run forever, listening and answering
    pub async fn run(&mut self) -> ! {
        loop {
            // A busy, noisy bus is normal. Log and keep listening.
            match self.step().await {
                Ok(()) => {}
                Err(SlaveError::Recv(_)) => hcp_error!("Error receiving"),
                Err(SlaveError::Transmit(_)) => hcp_error!("Error sending reply"),
            }
        }
    }

    /// Wait for and handle one event: either a received byte, or a
    /// scheduled reply coming due.
    pub async fn step(
        &mut self,
    ) -> Result<(), SlaveError<<Cfg::Serial as BusSerial>::SerError>> {
        self.poll_operator();

        let mut scratch = [0u8; RECV_SCRATCH];
        let received = match self.pending.as_ref().map(|p| p.due) {
            None => Some(self.serial.recv(&mut scratch).await),
            Some(due) => {
                let rx = self.serial.recv(&mut scratch);
                futures::pin_mut!(rx);
                match select(rx, Timer::at(due)).await {
                    Either::Left((res, _)) => Some(res),
                    Either::Right(((), _)) => None,
                }
            }
        };

        match received {
            Some(res) => {
                let chunk = res?;
                self.on_chunk(&chunk);
                Ok(())
            }
            None => self.flush_reply().await,
        }
    }

    fn poll_operator(&mut self) {
        while let Ok(input) = self.from_app.try_receive() {
            self.emulator.apply(input);
        }
    }

    fn on_chunk(&mut self, chunk: &TimedChunk<'_>) {
        let counters = &mut self.emulator.session_mut().counters;
        if let Some(rx) = self.framer.feed_chunk(chunk, counters) {
            self.on_frame(rx);
        }
    }

    fn on_frame(&mut self, rx: RxFrame) {
        hcp_trace!("Frame RX: {}", rx.frame);
        let decision = self.emulator.handle(&rx.frame);
        if let Some(ev) = decision.event {
            self.report(ev);
        }
        let Some(reply) = decision.reply else {
            return;
        };

        if self.emulator.config().read_only {
            hcp_info!("Read only, not sending {}", reply);
            return;
        }
        if self.pending.is_some() {
            hcp_warn!("Replacing a reply that was never sent");
        }
        self.pending = Some(PendingReply {
            due: rx.start + Cfg::REPLY_SLOT_DELAY,
            frame: reply,
        });
    }

    async fn flush_reply(
        &mut self,
    ) -> Result<(), SlaveError<<Cfg::Serial as BusSerial>::SerError>> {
        let Some(PendingReply { frame, .. }) = self.pending.take() else {
            return Ok(());
        };
        self.tx.send(&mut self.serial, &frame).await?;
        self.report(BusEvent::ReplySent(frame));
        Ok(())
    }

    fn report(&mut self, ev: BusEvent) {
        if self.to_app.try_send(ev).is_err() {
            hcp_warn!("Event queue full, dropping event");
        }
    }
}
