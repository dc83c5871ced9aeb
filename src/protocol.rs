//! Protocol façade: the role-specific calling surface.
//!
//! [`EndPoint`] and [`Gateway`] assemble the addressing registry, the MAC
//! frame scheduler, and the physical bridge into one protocol instance
//! per device, and expose only the operations that exist for the role:
//! an End Point connects, disconnects, and transfers; a Gateway stages
//! data responses and arbitrates link requests.
//!
//! Both types expose the two interrupt entry points the application
//! wires to its vectors:
//!
//! - [`EndPoint::engine`] / [`Gateway::engine`] from the GDO/edge
//!   interrupt, passing the port interrupt flag register through, and
//! - [`EndPoint::engine_tick`] / [`Gateway::engine_tick`] from the 1 ms
//!   hardware timer interrupt.
//!
//! Application notifications are delivered to a [`LinkEvents`]
//! implementation passed into the entry points, so the handlers run in
//! the same interrupt context that completed the frame.
//!
//! ## Example (End Point)
//!
//! ```ignore
//! let setup = EndPointSetup {
//!     channel: 0,
//!     pan_id: [0x00, 0x01],
//!     address: [0x00, 0x02],
//!     backup: None,
//!     rx_timeout: Some(rx_timeout_ticks(38_400)),
//! };
//! let mut node = EndPoint::new(radio, setup);
//!
//! // Main loop: connect, then transfer; sleep whenever the scheduler
//! // is busy and let the interrupts drive the protocol.
//! while !node.connect(&[]) {
//!     mcu_sleep();
//! }
//! loop {
//!     if node.transfer(&packet).is_err() {
//!         mcu_sleep();
//!     }
//! }
//! ```

use crate::address::{AddressRegistry, Backup, NoBackup, NodeAddress, PanId};
use crate::error::SendError;
use crate::frame::{FrameScheduler, FrameType, LinkEvents, NodeRole};
use crate::phy::{PhyBridge, PhyEvent, Radio, StreamStatus, TickEvent};
use core::convert::Infallible;

/// Setup information for an End Point node.
///
/// A broadcast `pan_id` means the PAN is not known ahead of time: the
/// node will adopt the PAN identifier of whichever Gateway accepts its
/// link request. A non-broadcast `pan_id` is fixed for the lifetime of
/// the node.
#[derive(Debug)]
pub struct EndPointSetup<B: Backup> {
    /// Physical channel to operate on.
    pub channel: u8,
    /// Physical addressing PAN identifier.
    pub pan_id: PanId,
    /// Physical address of this node. Must be unique in the network.
    pub address: NodeAddress,
    /// Optional non-volatile backup for the addressing record. When
    /// provided, a record persisted by a previous boot is restored during
    /// construction.
    pub backup: Option<B>,
    /// Optional receive timeout in millisecond ticks (see
    /// [`crate::phy::rx_timeout_ticks`]). `None` disables the timeout.
    pub rx_timeout: Option<u32>,
}

/// Setup information for a Gateway node.
///
/// A Gateway's PAN identifier is mandatory and must not be the broadcast
/// identifier; that is a configuration contract, not a runtime check.
#[derive(Debug)]
pub struct GatewaySetup {
    /// Physical channel to operate on.
    pub channel: u8,
    /// Physical addressing PAN identifier.
    pub pan_id: PanId,
    /// Physical address of this node. Must be unique in the network.
    pub address: NodeAddress,
}

/// Data Link layer addressing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct AddressingInfo {
    /// The local PAN identifier.
    pub pan_id: PanId,
    /// Whether a link with a Gateway currently exists.
    pub connected: bool,
}

/// MAC frame status: source and sequence number of the most recently
/// built or received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct FrameInfo {
    /// Source address of the frame.
    pub src_addr: NodeAddress,
    /// Sequence number of the frame.
    pub seq_number: u8,
}

/// An End Point protocol instance: a leaf node that initiates links and
/// transfers, and sleeps between operations.
#[derive(Debug)]
pub struct EndPoint<R: Radio, B: Backup> {
    phy: PhyBridge<R>,
    registry: AddressRegistry<B>,
    mac: FrameScheduler,
}

impl<R: Radio, B: Backup> EndPoint<R, B> {
    /// Builds and starts an End Point node.
    ///
    /// Configures the channel and addressing, restores a persisted link
    /// record if the backup holds one, and leaves the node in its idle
    /// policy (low power) with the radio interrupt enabled.
    pub fn new(radio: R, setup: EndPointSetup<B>) -> Self {
        let mut phy = PhyBridge::new(radio, setup.rx_timeout);
        let _ = phy.set_channel(setup.channel);

        let mut registry = AddressRegistry::init_end_point(
            setup.pan_id,
            setup.address,
            setup.backup,
            &mut phy,
        );
        let _ = registry.restore(&mut phy);

        let mut mac = FrameScheduler::new(NodeRole::EndPoint);
        mac.idle(&mut phy);
        phy.enable();

        Self { phy, registry, mac }
    }

    /// Requests a link with a Gateway.
    ///
    /// Returns true when a link already exists. Otherwise a single
    /// Link-Request frame carrying `payload` is sent (if the scheduler is
    /// idle; a busy scheduler sends nothing) and false is returned — the
    /// link is reported on a later call, once the Gateway's response has
    /// been processed.
    pub fn connect(&mut self, payload: &[u8]) -> bool {
        if !self.registry.link_exists() {
            let _ = self.mac.send(
                &mut self.phy,
                &self.registry,
                FrameType::LinkRequest,
                true,
                payload,
            );
            return false;
        }

        true
    }

    /// Destroys the link with the Gateway.
    pub fn disconnect(&mut self) {
        self.registry.link_destroy(&mut self.phy);
    }

    /// Performs a simplex (fire-and-forget) transfer.
    ///
    /// No link is required and no reply is expected; an unlinked node
    /// addresses the broadcast destination.
    pub fn simple_transfer(&mut self, payload: &[u8]) -> Result<(), SendError> {
        self.mac
            .send(&mut self.phy, &self.registry, FrameType::Data, false, payload)
    }

    /// Performs a half-duplex transfer: sends `payload` and awaits a
    /// single reply.
    ///
    /// Requires an established link. The reply is delivered through
    /// [`LinkEvents::transfer_complete`] once it arrives.
    pub fn transfer(&mut self, payload: &[u8]) -> Result<(), SendError> {
        if !self.registry.link_exists() {
            return Err(SendError::NotLinked);
        }

        self.mac
            .send(&mut self.phy, &self.registry, FrameType::Data, true, payload)
    }

    /// Whether the protocol has an operation in flight.
    ///
    /// Applications keeping their own packet sequence counter should
    /// only advance it once this reports idle, so a retried transfer
    /// does not advance it twice.
    pub fn busy(&self) -> bool {
        self.mac.busy()
    }

    /// Non-blocking idle poll, for `nb`-style callers.
    pub fn wait_idle(&self) -> nb::Result<(), Infallible> {
        if self.mac.busy() {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(())
        }
    }

    /// Data Link layer addressing status.
    pub fn addressing_info(&self) -> AddressingInfo {
        AddressingInfo {
            pan_id: *self.registry.pan_id(),
            connected: self.registry.link_exists(),
        }
    }

    /// Source and sequence number of the most recent frame.
    pub fn frame_info(&self) -> FrameInfo {
        FrameInfo {
            src_addr: self.mac.header().src_addr,
            seq_number: self.mac.header().seq_number,
        }
    }

    /// Status footer of the last received data stream (RSSI, LQI, CRC).
    pub fn stream_info(&self) -> StreamStatus {
        *self.phy.stream_status()
    }

    /// Shared access to the radio driver.
    pub fn radio(&self) -> &R {
        self.phy.radio()
    }

    /// Exclusive access to the radio driver.
    pub fn radio_mut(&mut self) -> &mut R {
        self.phy.radio_mut()
    }

    /// GDO/edge interrupt entry point.
    ///
    /// Pass the port interrupt flag register through as `event`; the
    /// protocol determines whether the radio pin was involved and runs
    /// the appropriate completion path. Returns the status byte of the
    /// notification raised, if any.
    pub fn engine<E: LinkEvents>(&mut self, event: u8, events: &mut E) -> u8 {
        let status = match self.phy.eop_event(event) {
            PhyEvent::None => return 0,
            PhyEvent::Pending => 0,
            PhyEvent::Sent => self.mac.disassemble(&mut self.phy, events),
            PhyEvent::Received => {
                let count = self.phy.fetch_stream(self.mac.stream_mut());
                self.mac
                    .assemble(&mut self.phy, &mut self.registry, events, count)
            }
        };
        self.phy.eop_complete();

        status
    }

    /// Millisecond timer interrupt entry point.
    ///
    /// Advances the receive-timeout counter; on expiry the pending
    /// receive is abandoned and [`LinkEvents::rx_timeout`] is raised.
    pub fn engine_tick<E: LinkEvents>(&mut self, events: &mut E) {
        if self.phy.tick() == TickEvent::RxTimeout {
            let _ = self.mac.timeout(&mut self.phy);
            events.rx_timeout();
        }
    }
}

/// A Gateway protocol instance: the always-listening coordinator that
/// accepts links and answers requests.
#[derive(Debug)]
pub struct Gateway<R: Radio> {
    phy: PhyBridge<R>,
    registry: AddressRegistry<NoBackup>,
    mac: FrameScheduler,
}

impl<R: Radio> Gateway<R> {
    /// Builds and starts a Gateway node.
    ///
    /// Configures the channel and addressing and leaves the node in its
    /// idle policy — listening — with the radio interrupt enabled.
    pub fn new(radio: R, setup: GatewaySetup) -> Self {
        let mut phy = PhyBridge::new(radio, None);
        let _ = phy.set_channel(setup.channel);

        let registry =
            AddressRegistry::init_gateway(setup.pan_id, setup.address, &mut phy);

        let mut mac = FrameScheduler::new(NodeRole::Gateway);
        mac.idle(&mut phy);
        phy.enable();

        Self { phy, registry, mac }
    }

    /// Stages a reply for the next incoming data request.
    ///
    /// The payload is copied and consumed by at most one data-request
    /// turnaround. An empty payload clears the staged response.
    pub fn load_data_response(&mut self, payload: &[u8]) -> Result<(), SendError> {
        self.mac.set_data_response(payload)
    }

    /// Whether the protocol has an operation in flight. A Gateway is
    /// normally always busy listening.
    pub fn busy(&self) -> bool {
        self.mac.busy()
    }

    /// Non-blocking idle poll, for `nb`-style callers.
    pub fn wait_idle(&self) -> nb::Result<(), Infallible> {
        if self.mac.busy() {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(())
        }
    }

    /// The local PAN identifier.
    pub fn pan_id(&self) -> PanId {
        *self.registry.pan_id()
    }

    /// Source and sequence number of the most recent frame.
    pub fn frame_info(&self) -> FrameInfo {
        FrameInfo {
            src_addr: self.mac.header().src_addr,
            seq_number: self.mac.header().seq_number,
        }
    }

    /// Status footer of the last received data stream (RSSI, LQI, CRC).
    pub fn stream_info(&self) -> StreamStatus {
        *self.phy.stream_status()
    }

    /// Shared access to the radio driver.
    pub fn radio(&self) -> &R {
        self.phy.radio()
    }

    /// Exclusive access to the radio driver.
    pub fn radio_mut(&mut self) -> &mut R {
        self.phy.radio_mut()
    }

    /// GDO/edge interrupt entry point. See [`EndPoint::engine`].
    pub fn engine<E: LinkEvents>(&mut self, event: u8, events: &mut E) -> u8 {
        let status = match self.phy.eop_event(event) {
            PhyEvent::None => return 0,
            PhyEvent::Pending => 0,
            PhyEvent::Sent => self.mac.disassemble(&mut self.phy, events),
            PhyEvent::Received => {
                let count = self.phy.fetch_stream(self.mac.stream_mut());
                self.mac
                    .assemble(&mut self.phy, &mut self.registry, events, count)
            }
        };
        self.phy.eop_complete();

        status
    }

    /// Millisecond timer interrupt entry point. A Gateway runs no
    /// receive timeout; the tick only advances bridge bookkeeping.
    pub fn engine_tick<E: LinkEvents>(&mut self, events: &mut E) {
        let _ = events;
        let _ = self.phy.tick();
    }
}
