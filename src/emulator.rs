//! Device emulation
//!
//! Interprets validated frames the way a real slave device would, and
//! decides what (if anything) to say back to the Master.

use crate::{
    counter::CounterTracker,
    frame::{CrcPolicy, Frame},
    status::{Commands, MasterStatus, OperatorInput},
};

/// Default address we answer on, in the "intelligent control panel"
/// range (16..=45)
pub const DEFAULT_ADDRESS: u8 = 0x28;

/// Device type reported in slave query replies. This is the type of a
/// UAP1 universal adapter.
pub const DEFAULT_DEVICE_TYPE: u8 = 20;

/// Command byte of a slave query (bus scan)
pub const CMD_SLAVE_QUERY: u8 = 0x01;

/// Command byte of a slave status request
pub const CMD_SLAVE_STATUS_REQUEST: u8 = 0x20;

/// First byte of a slave status reply
pub const SLAVE_STATUS_TAG: u8 = 0x29;

/// Last byte of a slave status reply. The operator won't accept the reply
/// without it, it seems to mean "no error".
pub const SLAVE_STATUS_NO_ERROR: u8 = 0x10;

/// Runtime settings of the emulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct DeviceConfig {
    /// Bus address to answer on
    pub address: u8,
    /// Device type reported to the Master
    pub device_type: u8,
    /// Whether frames with a bad CRC are dropped
    pub crc_policy: CrcPolicy,
    /// Report frames addressed to other devices too
    pub promiscuous: bool,
    /// Never send anything
    pub read_only: bool,
}

impl DeviceConfig {
    /// Default settings for a device at `address`
    pub const fn new(address: u8) -> Self {
        Self {
            address,
            device_type: DEFAULT_DEVICE_TYPE,
            crc_policy: CrcPolicy::Enforce,
            promiscuous: false,
            read_only: false,
        }
    }

    /// Set the reported device type
    pub const fn with_device_type(mut self, device_type: u8) -> Self {
        self.device_type = device_type;
        self
    }

    /// Set the CRC policy
    pub const fn with_crc_policy(mut self, crc_policy: CrcPolicy) -> Self {
        self.crc_policy = crc_policy;
        self
    }

    /// Enable or disable promiscuous observation
    pub const fn with_promiscuous(mut self, promiscuous: bool) -> Self {
        self.promiscuous = promiscuous;
        self
    }

    /// Enable or disable listen-only operation
    pub const fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS)
    }
}

/// Things the application may want to know about
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[non_exhaustive]
pub enum BusEvent {
    /// The Master broadcast a new status
    MasterStatus(MasterStatus),
    /// The Master introduced itself with a slave query
    MasterAddress(u8),
    /// A frame for some other device (promiscuous mode only)
    Observed(Frame),
    /// We answered the Master
    ReplySent(Frame),
}

/// Protocol state, kept for as long as the device lives
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Receive and transmit counters
    pub counters: CounterTracker,
    master_address: Option<u8>,
    observed_master_status: Option<MasterStatus>,
    own_status: Commands,
}

impl Session {
    /// A fresh session, nothing heard yet
    pub const fn new() -> Self {
        Self {
            counters: CounterTracker::new(),
            master_address: None,
            observed_master_status: None,
            own_status: Commands::empty(),
        }
    }

    /// Address of the Master, once it has queried us
    #[inline]
    pub fn master_address(&self) -> Option<u8> {
        self.master_address
    }

    /// Last status broadcast by the Master
    #[inline]
    pub fn master_status(&self) -> Option<MasterStatus> {
        self.observed_master_status
    }

    /// Commands waiting to be reported to the Master
    #[inline]
    pub fn own_status(&self) -> Commands {
        self.own_status
    }
}

/// Result of handling one frame
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Decision {
    /// Frame to send back to the Master
    pub reply: Option<Frame>,
    /// Event to pass on to the application
    pub event: Option<BusEvent>,
}

/// The emulated slave device
pub struct Emulator {
    config: DeviceConfig,
    session: Session,
}

impl Emulator {
    /// Create a device with a fresh session
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            session: Session::new(),
        }
    }

    /// Device settings
    #[inline]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Protocol state
    #[inline]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable protocol state, for the framer's counter bookkeeping
    #[inline]
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Apply input from the operator of the emulated device
    pub fn apply(&mut self, input: OperatorInput) {
        match input {
            OperatorInput::Toggle(cmds) => self.session.own_status.toggle(cmds),
            OperatorInput::Reset => self.session.own_status = Commands::empty(),
        }
        hcp_info!("Own status: {=u8:b}", self.session.own_status.bits());
    }

    /// Handle a validated frame
    pub fn handle(&mut self, frame: &Frame) -> Decision {
        if frame.is_broadcast() {
            return Decision {
                reply: None,
                event: self.on_broadcast(frame),
            };
        }

        if frame.address() != self.config.address {
            if self.config.promiscuous {
                hcp_debug!("Frame for {=u8:#x}", frame.address());
                return Decision {
                    reply: None,
                    event: Some(BusEvent::Observed(frame.clone())),
                };
            }
            return Decision::default();
        }

        match frame.command() {
            CMD_SLAVE_QUERY => self.on_slave_query(frame),
            CMD_SLAVE_STATUS_REQUEST => Decision {
                reply: self.on_status_request(),
                event: None,
            },
            _cmd => {
                hcp_warn!("Unknown message for us: {=u8:#x}", _cmd);
                Decision::default()
            }
        }
    }

    fn on_broadcast(&mut self, frame: &Frame) -> Option<BusEvent> {
        let status = MasterStatus(frame.command());
        if self.session.observed_master_status == Some(status) {
            return None;
        }
        hcp_info!("New master status: {=u8:b}", status.bits());
        self.session.observed_master_status = Some(status);
        Some(BusEvent::MasterStatus(status))
    }

    fn on_slave_query(&mut self, frame: &Frame) -> Decision {
        let Some(&master) = frame.payload().get(1) else {
            hcp_warn!("Slave query without a master address");
            return Decision::default();
        };
        hcp_debug!("Slave query from {=u8:#x}", master);

        let event = (self.session.master_address != Some(master)).then(|| {
            hcp_info!("Master is at {=u8:#x}", master);
            BusEvent::MasterAddress(master)
        });
        self.session.master_address = Some(master);

        let reply = self.make_reply(&[self.config.device_type, self.config.address]);
        Decision { reply, event }
    }

    fn on_status_request(&mut self) -> Option<Frame> {
        if self.session.master_address.is_none() {
            // Keep the commands, there will be another request once the
            // Master has scanned the bus.
            hcp_warn!("Status request before any slave query, not answering");
            return None;
        }
        let cmds = self.session.own_status.bits();
        let reply = self.make_reply(&[SLAVE_STATUS_TAG, cmds, SLAVE_STATUS_NO_ERROR]);
        // Commands are one-shot
        self.session.own_status.take();
        reply
    }

    fn make_reply(&mut self, payload: &[u8]) -> Option<Frame> {
        let master = self.session.master_address?;
        let counter = self.session.counters.next_tx_counter();
        Frame::new(master, counter, payload).ok()
    }
}
