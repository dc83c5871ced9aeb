//! Data Link layer Media Access Control (MAC) framing and scheduling.
//!
//! This module defines the structure of a frame and the scheduler that
//! multiplexes transmit and receive over the half-duplex radio. The
//! scheduler owns the single shared frame arena, builds outgoing frames,
//! validates and dispatches incoming ones, and tracks the busy/idle
//! lifecycle that gates every new operation.
//!
//! ## Frame structure
//!
//! ```text
//!          --------------------------------------------------------------
//!         | PAN ID | Destination | Source | Control | Sequence | Payload |
//!          --------------------------------------------------------------
//!   Bytes:    n           n           n        1         1          n
//! ```
//!
//! The control byte carries the frame type (Data or Link Request), the
//! data-request flag (simplex vs half duplex), and the mode bit naming
//! the originating role; the remaining bits are reserved.
//!
//! ## Scheduler lifecycle
//!
//! Exactly one of idle, listening, or transmitting holds at any time,
//! enforced by the busy flag: [`FrameScheduler::send`] and
//! [`FrameScheduler::listen`] fail while an operation is in flight, and
//! the physical completion handlers ([`FrameScheduler::assemble`],
//! [`FrameScheduler::disassemble`], [`FrameScheduler::timeout`]) clear
//! the flag before any dispatch runs. All of them are expected to be
//! invoked with the exclusion the surrounding interrupt context provides;
//! none of them block.

use crate::address::{AddressRegistry, Backup, is_broadcast};
use crate::consts::{
    CONTROL_DATA_REQUEST, CONTROL_MODE, CONTROL_MODE_ENDPOINT,
    CONTROL_MODE_GATEWAY, CONTROL_TYPE, DATA_STREAM_MAX_LEN,
    FRAME_HEADER_LEN, FRAME_OVERHEAD_LEN, MAX_PAYLOAD_LEN, NODE_ADDRESS_LEN,
    PAN_ID_LEN,
};
use crate::error::SendError;
use crate::phy::{PhyBridge, Radio};
use core::mem;
use heapless::Vec;

/// Intent of a frame to the scheduler.
///
/// A Data frame carries a message. A Link Request frame carries the
/// intent to complete a link, plus an optional message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum FrameType {
    /// Data frame.
    Data = 0x00,
    /// Link request frame.
    LinkRequest = 0x40,
}

/// Role of the local node, chosen at construction time.
///
/// An End Point initiates links and transfers and sleeps in between; a
/// Gateway listens continuously, accepts links, and answers requests.
/// The two roles cannot be combined on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum NodeRole {
    /// A leaf node that initiates links/transfers and sleeps between
    /// operations.
    EndPoint,
    /// The always-listening coordinator node.
    Gateway,
}

impl NodeRole {
    /// The mode bit this role stamps into outgoing control bytes.
    fn mode_bit(self) -> u8 {
        match self {
            NodeRole::EndPoint => CONTROL_MODE_ENDPOINT,
            NodeRole::Gateway => CONTROL_MODE_GATEWAY,
        }
    }
}

/// Application notifications raised from the scheduler's dispatch paths.
///
/// The handlers run in interrupt context and must run to completion;
/// keep them short. Role-specific notifications have default
/// implementations so each role only implements what concerns it.
pub trait LinkEvents {
    /// A transfer has completed.
    ///
    /// On reception this delivers the validated frame payload; on
    /// transmit completion it is invoked with an empty payload. On a
    /// Gateway, `data_request` reports whether the sender asked for a
    /// reply (an End Point cannot be asked for data, so it always sees
    /// `false`). The returned status byte is passed through to the
    /// interrupt entry point's caller and is otherwise unused by the
    /// protocol.
    fn transfer_complete(&mut self, data_request: bool, payload: &[u8]) -> u8;

    /// A validated link request arrived. Gateway only.
    ///
    /// The handler may inspect the optional request payload and accept or
    /// deny the link. The default policy accepts every request.
    fn link_request(&mut self, payload: &[u8]) -> bool {
        let _ = payload;
        true
    }

    /// The receive timeout expired. End Point only, and only when the
    /// timeout feature is configured.
    fn rx_timeout(&mut self) {}
}

/// Header of a Data Link layer frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct FrameHeader {
    /// Personal Area Network (PAN) identifier.
    pub pan_id: [u8; PAN_ID_LEN],
    /// Destination for the payload.
    pub dest_addr: [u8; NODE_ADDRESS_LEN],
    /// Source of the payload.
    pub src_addr: [u8; NODE_ADDRESS_LEN],
    /// Control information used by the scheduler: type, reserved flags,
    /// data request, and mode.
    pub control: u8,
    /// Frame sequence number.
    pub seq_number: u8,
}

impl FrameHeader {
    /// The frame type encoded in the control byte, if it is a known one.
    pub fn frame_type(&self) -> Option<FrameType> {
        match self.control & CONTROL_TYPE {
            t if t == FrameType::Data as u8 => Some(FrameType::Data),
            t if t == FrameType::LinkRequest as u8 => Some(FrameType::LinkRequest),
            _ => None,
        }
    }

    /// Whether the data-request control bit is set.
    pub fn data_request(&self) -> bool {
        self.control & CONTROL_DATA_REQUEST != 0
    }

    /// Serializes the header into the first [`FRAME_HEADER_LEN`] bytes of
    /// `stream`.
    pub fn write_to(&self, stream: &mut [u8]) {
        let mut at = 0;
        stream[at..at + PAN_ID_LEN].copy_from_slice(&self.pan_id);
        at += PAN_ID_LEN;
        stream[at..at + NODE_ADDRESS_LEN].copy_from_slice(&self.dest_addr);
        at += NODE_ADDRESS_LEN;
        stream[at..at + NODE_ADDRESS_LEN].copy_from_slice(&self.src_addr);
        at += NODE_ADDRESS_LEN;
        stream[at] = self.control;
        stream[at + 1] = self.seq_number;
    }

    /// Deserializes a header from the first [`FRAME_HEADER_LEN`] bytes of
    /// `stream`. The caller has already checked the length.
    pub fn parse(stream: &[u8]) -> Self {
        let mut header = Self::default();
        let mut at = 0;
        header.pan_id.copy_from_slice(&stream[at..at + PAN_ID_LEN]);
        at += PAN_ID_LEN;
        header
            .dest_addr
            .copy_from_slice(&stream[at..at + NODE_ADDRESS_LEN]);
        at += NODE_ADDRESS_LEN;
        header
            .src_addr
            .copy_from_slice(&stream[at..at + NODE_ADDRESS_LEN]);
        at += NODE_ADDRESS_LEN;
        header.control = stream[at];
        header.seq_number = stream[at + 1];
        header
    }
}

/// Media Access Control (MAC) scheduler state.
///
/// One instance exists per node. The `stream` arena is shared between
/// directions: it holds the wire form of the frame being transmitted, or
/// the one just received — callers must fully consume a received payload
/// before arming the next receive.
#[derive(Debug)]
pub struct FrameScheduler {
    role: NodeRole,
    /// Frame scheduler busy flag. Gates every new operation.
    busy: bool,
    /// Header of the frame currently in the arena.
    header: FrameHeader,
    /// Shared RX/TX frame arena (wire form).
    stream: [u8; DATA_STREAM_MAX_LEN],
    /// Payload length of the frame currently in the arena.
    length: u8,
    /// Wire sequence counter. Independent of any application-level
    /// sequence number; stamps, then increments, on every build.
    seq_number: u8,
    /// Staged reply for the next data request. Gateway only; consumed at
    /// most once, then cleared.
    data_response: Vec<u8, MAX_PAYLOAD_LEN>,
}

impl FrameScheduler {
    /// Creates an idle scheduler for the given role.
    pub fn new(role: NodeRole) -> Self {
        Self {
            role,
            busy: false,
            header: FrameHeader::default(),
            stream: [0; DATA_STREAM_MAX_LEN],
            length: 0,
            seq_number: 0,
            data_response: Vec::new(),
        }
    }

    /// The role this scheduler was constructed for.
    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Whether an operation (listen or transmit) is in flight.
    pub fn busy(&self) -> bool {
        self.busy
    }

    /// Header of the most recently built or received frame.
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Exclusive access to the frame arena, for the physical layer to
    /// deposit a received data stream into.
    pub(crate) fn stream_mut(&mut self) -> &mut [u8; DATA_STREAM_MAX_LEN] {
        &mut self.stream
    }

    /// Stages a reply for the next incoming data request. Gateway only.
    ///
    /// The payload is copied into the scheduler; it is consumed by at
    /// most one data-request turnaround and cleared afterwards. An empty
    /// payload clears the staged response.
    pub fn set_data_response(&mut self, payload: &[u8]) -> Result<(), SendError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(SendError::Oversize);
        }
        self.data_response.clear();
        let _ = self.data_response.extend_from_slice(payload);
        Ok(())
    }

    /// Performs the scheduler's idle operation.
    ///
    /// An End Point goes to a low-power state; a Gateway momentarily
    /// disables the radio and immediately re-arms listening.
    pub fn idle<R: Radio>(&mut self, phy: &mut PhyBridge<R>) {
        match self.role {
            NodeRole::EndPoint => phy.low_power(),
            NodeRole::Gateway => {
                phy.disable();
                let _ = self.listen(phy);
            }
        }
    }

    /// Listens for an incoming frame.
    ///
    /// Arms the physical receive path into the shared arena. Fails while
    /// the scheduler is busy; try again at a later time.
    pub fn listen<R: Radio>(&mut self, phy: &mut PhyBridge<R>) -> Result<(), SendError> {
        if self.busy {
            return Err(SendError::Busy);
        }
        self.busy = true;
        phy.receiver_on();
        Ok(())
    }

    /// Builds a frame and transmits it to the destination.
    ///
    /// Fails while the scheduler is busy, when the payload plus frame
    /// overhead exceeds the single data-stream size (segmentation is not
    /// supported), or when the physical layer refuses the transmission.
    /// The length is validated before the frame is built, so a failed
    /// send leaves the arena and the sequence counter untouched.
    pub fn send<R: Radio, B: Backup>(
        &mut self,
        phy: &mut PhyBridge<R>,
        registry: &AddressRegistry<B>,
        frame_type: FrameType,
        data_request: bool,
        payload: &[u8],
    ) -> Result<(), SendError> {
        if self.busy {
            return Err(SendError::Busy);
        }
        if payload.len() + FRAME_OVERHEAD_LEN > DATA_STREAM_MAX_LEN {
            return Err(SendError::Oversize);
        }

        self.build(registry, frame_type, data_request, payload);

        let count = FRAME_OVERHEAD_LEN + payload.len();
        if phy.transmit(&self.stream[..count]) {
            // The scheduler is only busy once the physical layer has
            // accepted the frame.
            self.busy = true;
            Ok(())
        } else {
            Err(SendError::Busy)
        }
    }

    /// Stamps the frame header and copies the payload into the arena.
    ///
    /// No failure mode; the length was pre-validated by [`Self::send`].
    fn build<B: Backup>(
        &mut self,
        registry: &AddressRegistry<B>,
        frame_type: FrameType,
        data_request: bool,
        payload: &[u8],
    ) {
        self.header.pan_id = *registry.pan_id();
        self.header.dest_addr = match self.role {
            // An End Point can only transmit to its remote address (the
            // Gateway node).
            NodeRole::EndPoint => *registry.remote(),
            // A Gateway responds to the node that contacted it: swap the
            // destination and source of the frame it just received.
            NodeRole::Gateway => self.header.src_addr,
        };
        self.header.src_addr = *registry.address();

        let mut control = frame_type as u8;
        if data_request {
            control |= CONTROL_DATA_REQUEST;
        }
        control |= self.role.mode_bit();
        self.header.control = control;

        self.header.seq_number = self.seq_number;
        self.seq_number = self.seq_number.wrapping_add(1);

        self.header.write_to(&mut self.stream);
        self.stream[FRAME_HEADER_LEN..FRAME_HEADER_LEN + payload.len()]
            .copy_from_slice(payload);
        self.length = payload.len() as u8;
    }

    /// Validates an incoming frame against End Point addressing rules.
    ///
    /// The frame must originate from a Gateway and be addressed to the
    /// local node exactly (an End Point never accepts broadcast). A
    /// foreign PAN identifier is only acceptable on a link request, and
    /// only while no link exists and the local PAN id is not fixed — a
    /// linked or fixed-PAN End Point never adopts another network.
    fn validate_end_point<B: Backup>(&self, registry: &AddressRegistry<B>) -> bool {
        if self.header.control & CONTROL_MODE != CONTROL_MODE_GATEWAY {
            return false;
        }

        if self.header.dest_addr != *registry.address() {
            return false;
        }

        if self.header.pan_id != *registry.pan_id() {
            if self.header.frame_type() != Some(FrameType::LinkRequest) {
                return false;
            }
            if registry.link_exists() || registry.fixed() {
                return false;
            }
        }

        true
    }

    /// Validates an incoming frame against Gateway addressing rules.
    ///
    /// The frame must originate from an End Point. A Gateway also accepts
    /// frames to the broadcast address, and it accepts a foreign PAN
    /// identifier only when that identifier is the broadcast PAN — for
    /// data and link-request frames alike.
    fn validate_gateway<B: Backup>(&self, registry: &AddressRegistry<B>) -> bool {
        if self.header.control & CONTROL_MODE != CONTROL_MODE_ENDPOINT {
            return false;
        }

        if self.header.dest_addr != *registry.address()
            && !is_broadcast(&self.header.dest_addr)
        {
            return false;
        }

        if self.header.pan_id != *registry.pan_id()
            && !is_broadcast(&self.header.pan_id)
        {
            return false;
        }

        true
    }

    /// Assembles the received data stream into a frame and dispatches it.
    ///
    /// Invoked from the End-of-Packet interrupt after the physical layer
    /// deposited `count` bytes into the arena. Clears the busy flag
    /// before anything else, then gates on length and the hardware CRC,
    /// validates addressing for the local role, and hands the frame to
    /// the type-specific dispatch. Invalid or foreign frames are dropped
    /// silently — they are expected, not exceptional. Unless a dispatch
    /// left a response in flight, the scheduler re-enters its idle
    /// policy.
    pub fn assemble<R: Radio, B: Backup, E: LinkEvents>(
        &mut self,
        phy: &mut PhyBridge<R>,
        registry: &mut AddressRegistry<B>,
        events: &mut E,
        count: usize,
    ) -> u8 {
        self.busy = false;
        self.length = 0;

        if count >= FRAME_OVERHEAD_LEN && phy.stream_status().crc_ok() {
            self.header = FrameHeader::parse(&self.stream);
            self.length = (count - FRAME_OVERHEAD_LEN) as u8;

            let valid = match self.role {
                NodeRole::EndPoint => self.validate_end_point(registry),
                NodeRole::Gateway => self.validate_gateway(registry),
            };

            if valid {
                let status = match self.header.frame_type() {
                    Some(FrameType::Data) => self.dispatch_data(phy, registry, events),
                    Some(FrameType::LinkRequest) => {
                        self.dispatch_link_request(phy, registry, events)
                    }
                    None => 0,
                };

                // The dispatch may have put a response in flight; only
                // fall back to the idle policy when nothing is pending.
                if !self.busy {
                    self.idle(phy);
                }

                return status;
            }
        }

        // Invalid length, failed CRC, or a frame that was not for this
        // node: drop it and go back to the idle policy.
        #[cfg(feature = "log")]
        log::trace!("dropped invalid frame ({count} bytes)");
        self.idle(phy);

        0
    }

    /// Processes a validated incoming data frame.
    fn dispatch_data<R: Radio, B: Backup, E: LinkEvents>(
        &mut self,
        phy: &mut PhyBridge<R>,
        registry: &AddressRegistry<B>,
        events: &mut E,
    ) -> u8 {
        let data_request = self.header.data_request();
        // The data-request flag is consumed here; it is never forwarded
        // up or kept in the stored header.
        self.header.control &= !CONTROL_DATA_REQUEST;

        let length = self.length as usize;
        let status = events.transfer_complete(
            // A Gateway cannot request data, so an End Point never
            // reports the flag.
            match self.role {
                NodeRole::EndPoint => false,
                NodeRole::Gateway => data_request,
            },
            &self.stream[FRAME_HEADER_LEN..FRAME_HEADER_LEN + length],
        );

        if self.role == NodeRole::Gateway
            && data_request
            && !self.data_response.is_empty()
        {
            // Answer the requesting node before going idle, in the same
            // interrupt context. The staged response is consumed.
            let response = mem::take(&mut self.data_response);
            phy.enable();
            let _ = self.send(phy, registry, FrameType::Data, data_request, &response);
        }

        status
    }

    /// Processes a validated incoming link request.
    fn dispatch_link_request<R: Radio, B: Backup, E: LinkEvents>(
        &mut self,
        phy: &mut PhyBridge<R>,
        registry: &mut AddressRegistry<B>,
        events: &mut E,
    ) -> u8 {
        match self.role {
            NodeRole::EndPoint => {
                // An End Point only receives a link request as the
                // response to its own outgoing request, so the link is
                // established unconditionally.
                registry.link_establish(self.header.pan_id, self.header.src_addr, phy);
            }
            NodeRole::Gateway => {
                if self.header.control & CONTROL_MODE == CONTROL_MODE_ENDPOINT {
                    let length = self.length as usize;
                    let accept = events.link_request(
                        &self.stream[FRAME_HEADER_LEN..FRAME_HEADER_LEN + length],
                    );

                    if accept {
                        // The request has been approved; provide the
                        // response to the remote node.
                        phy.enable();
                        let _ = self.send(
                            phy,
                            registry,
                            FrameType::LinkRequest,
                            false,
                            &[],
                        );
                    }
                }
            }
        }

        0
    }

    /// Completes an outgoing transfer.
    ///
    /// Invoked from the End-of-Packet interrupt once the physical layer
    /// finished transmitting. If the frame just sent requested data, the
    /// scheduler immediately re-arms listening for the reply; otherwise
    /// it raises the zero-length completion notification and re-enters
    /// the idle policy.
    pub fn disassemble<R: Radio, E: LinkEvents>(
        &mut self,
        phy: &mut PhyBridge<R>,
        events: &mut E,
    ) -> u8 {
        self.busy = false;

        if self.header.data_request() {
            // Half duplex: begin listening for the response.
            let _ = self.listen(phy);
            return 0;
        }

        self.length = 0;
        let status = events.transfer_complete(false, &[]);
        self.idle(phy);

        status
    }

    /// Abandons a pending receive after the timeout expired. End Point
    /// only.
    pub fn timeout<R: Radio>(&mut self, phy: &mut PhyBridge<R>) -> u8 {
        self.busy = false;
        self.idle(phy);
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{BROADCAST_ADDRESS, BROADCAST_PAN_ID, NoBackup};
    use crate::consts::STREAM_STATUS_CRC_OK;
    use crate::phy::PhyEvent;
    use crate::testutil::{GDO_EVENT, MockRadio, Recorder, wire_frame};

    const EP_PAN: [u8; PAN_ID_LEN] = [0x12, 0x34];
    const EP_ADDR: [u8; NODE_ADDRESS_LEN] = [0x00, 0x02];
    const GW_PAN: [u8; PAN_ID_LEN] = [0x12, 0x34];
    const GW_ADDR: [u8; NODE_ADDRESS_LEN] = [0xBB, 0xBB];

    /// An unfixed, unlinked End Point node.
    fn end_point() -> (FrameScheduler, PhyBridge<MockRadio>, AddressRegistry<NoBackup>) {
        let mut phy = PhyBridge::new(MockRadio::new(), None);
        let registry = AddressRegistry::init_end_point(
            BROADCAST_PAN_ID,
            EP_ADDR,
            None,
            &mut phy,
        );
        (FrameScheduler::new(NodeRole::EndPoint), phy, registry)
    }

    /// A linked End Point node on `EP_PAN`.
    fn linked_end_point()
    -> (FrameScheduler, PhyBridge<MockRadio>, AddressRegistry<NoBackup>) {
        let (mac, mut phy, mut registry) = end_point();
        registry.link_establish(EP_PAN, GW_ADDR, &mut phy);
        (mac, phy, registry)
    }

    fn gateway() -> (FrameScheduler, PhyBridge<MockRadio>, AddressRegistry<NoBackup>) {
        let mut phy = PhyBridge::new(MockRadio::new(), None);
        let registry = AddressRegistry::init_gateway(GW_PAN, GW_ADDR, &mut phy);
        (FrameScheduler::new(NodeRole::Gateway), phy, registry)
    }

    /// Pushes a received frame through the physical fetch and the
    /// scheduler's assemble path.
    fn deliver(
        mac: &mut FrameScheduler,
        phy: &mut PhyBridge<MockRadio>,
        registry: &mut AddressRegistry<NoBackup>,
        events: &mut Recorder,
        frame: &[u8],
        status: u8,
    ) -> u8 {
        phy.radio_mut().load_rx_stream(frame, 0xD0, status);
        let count = phy.fetch_stream(mac.stream_mut());
        mac.assemble(phy, registry, events, count)
    }

    /// Completes an in-flight transmission.
    fn complete_tx(
        mac: &mut FrameScheduler,
        phy: &mut PhyBridge<MockRadio>,
        events: &mut Recorder,
    ) {
        assert_eq!(phy.eop_event(GDO_EVENT), PhyEvent::Sent);
        let _ = mac.disassemble(phy, events);
        phy.eop_complete();
    }

    #[test]
    fn build_stamps_addresses_control_and_sequence() {
        let (mut mac, mut phy, registry) = linked_end_point();

        assert!(mac.send(&mut phy, &registry, FrameType::Data, true, b"Hi").is_ok());
        assert!(mac.busy());

        let header = mac.header();
        assert_eq!(header.pan_id, EP_PAN);
        assert_eq!(header.dest_addr, GW_ADDR);
        assert_eq!(header.src_addr, EP_ADDR);
        assert_eq!(header.frame_type(), Some(FrameType::Data));
        assert!(header.data_request());
        assert_eq!(header.control & CONTROL_MODE, CONTROL_MODE_ENDPOINT);
        assert_eq!(header.seq_number, 0);

        // The physical layer saw a length prefix plus the wire frame.
        let fifo = &phy.radio().tx_fifo;
        assert_eq!(fifo[0] as usize, FRAME_OVERHEAD_LEN + 2);
        assert_eq!(&fifo[1 + FRAME_HEADER_LEN..], b"Hi");
    }

    #[test]
    fn wire_round_trip_recovers_type_flag_and_payload() {
        let (mut mac, mut phy, registry) = linked_end_point();
        assert!(
            mac.send(&mut phy, &registry, FrameType::Data, false, b"Hello")
                .is_ok()
        );

        let stream = &phy.radio().tx_fifo[1..];
        let header = FrameHeader::parse(stream);
        assert_eq!(header.frame_type(), Some(FrameType::Data));
        assert!(!header.data_request());
        assert_eq!(&stream[FRAME_HEADER_LEN..], b"Hello");
    }

    #[test]
    fn sequence_increments_per_send_and_wraps() {
        let (mut mac, mut phy, registry) = linked_end_point();
        let mut events = Recorder::default();

        for i in 0..300usize {
            assert!(
                mac.send(&mut phy, &registry, FrameType::Data, false, &[])
                    .is_ok()
            );
            assert_eq!(mac.header().seq_number, (i % 256) as u8);
            complete_tx(&mut mac, &mut phy, &mut events);
        }
    }

    #[test]
    fn send_while_busy_leaves_state_unchanged() {
        let (mut mac, mut phy, registry) = linked_end_point();

        assert!(
            mac.send(&mut phy, &registry, FrameType::Data, false, b"first")
                .is_ok()
        );
        let header = *mac.header();
        let fifo_len = phy.radio().tx_fifo.len();

        assert_eq!(
            mac.send(&mut phy, &registry, FrameType::Data, false, b"second"),
            Err(SendError::Busy)
        );
        assert_eq!(*mac.header(), header);
        assert_eq!(phy.radio().tx_fifo.len(), fifo_len);
    }

    #[test]
    fn oversized_send_fails_before_building() {
        let (mut mac, mut phy, registry) = linked_end_point();
        let payload = [0u8; MAX_PAYLOAD_LEN + 1];

        assert_eq!(
            mac.send(&mut phy, &registry, FrameType::Data, false, &payload),
            Err(SendError::Oversize)
        );
        assert!(!mac.busy());

        // The sequence counter did not advance.
        assert!(mac.send(&mut phy, &registry, FrameType::Data, false, &[]).is_ok());
        assert_eq!(mac.header().seq_number, 0);
    }

    #[test]
    fn listen_while_busy_fails() {
        let (mut mac, mut phy, _registry) = end_point();

        assert!(mac.listen(&mut phy).is_ok());
        assert_eq!(mac.listen(&mut phy), Err(SendError::Busy));
    }

    #[test]
    fn end_point_rejects_end_point_mode_traffic() {
        let (mut mac, mut phy, mut registry) = linked_end_point();
        let mut events = Recorder::default();

        // Addressing is perfect, but the mode bit claims End Point
        // origin.
        let frame = wire_frame(EP_PAN, EP_ADDR, GW_ADDR, CONTROL_MODE_ENDPOINT, 0, b"x");
        let _ = deliver(
            &mut mac,
            &mut phy,
            &mut registry,
            &mut events,
            &frame,
            STREAM_STATUS_CRC_OK,
        );

        assert_eq!(events.transfers, 0);
        // Rejection re-enters the End Point idle policy: low power.
        assert!(phy.radio().asleep);
        assert!(!mac.busy());
    }

    #[test]
    fn end_point_requires_exact_destination_address() {
        let (mut mac, mut phy, mut registry) = linked_end_point();
        let mut events = Recorder::default();

        let frame = wire_frame(
            EP_PAN,
            BROADCAST_ADDRESS,
            GW_ADDR,
            CONTROL_MODE_GATEWAY,
            0,
            b"x",
        );
        let _ = deliver(
            &mut mac,
            &mut phy,
            &mut registry,
            &mut events,
            &frame,
            STREAM_STATUS_CRC_OK,
        );

        assert_eq!(events.transfers, 0);
    }

    #[test]
    fn end_point_foreign_pan_only_links_when_unfixed_and_unlinked() {
        let link_request =
            FrameType::LinkRequest as u8 | CONTROL_MODE_GATEWAY;

        // A linked End Point ignores further link requests.
        {
            let (mut mac, mut phy, mut registry) = linked_end_point();
            let mut events = Recorder::default();
            let frame =
                wire_frame([0x56, 0x78], EP_ADDR, [0xCC, 0xCC], link_request, 0, &[]);
            let _ = deliver(
                &mut mac,
                &mut phy,
                &mut registry,
                &mut events,
                &frame,
                STREAM_STATUS_CRC_OK,
            );
            assert_eq!(registry.remote(), &GW_ADDR);
        }

        // A fixed-PAN End Point never adopts a foreign network.
        {
            let mut phy = PhyBridge::new(MockRadio::new(), None);
            let mut registry = AddressRegistry::<NoBackup>::init_end_point(
                EP_PAN,
                EP_ADDR,
                None,
                &mut phy,
            );
            let mut mac = FrameScheduler::new(NodeRole::EndPoint);
            let mut events = Recorder::default();
            let frame =
                wire_frame([0x56, 0x78], EP_ADDR, GW_ADDR, link_request, 0, &[]);
            let _ = deliver(
                &mut mac,
                &mut phy,
                &mut registry,
                &mut events,
                &frame,
                STREAM_STATUS_CRC_OK,
            );
            assert!(!registry.link_exists());
        }

        // Unfixed and unlinked: the response to our own request is
        // adopted unconditionally.
        {
            let (mut mac, mut phy, mut registry) = end_point();
            let mut events = Recorder::default();
            let frame = wire_frame(GW_PAN, EP_ADDR, GW_ADDR, link_request, 0, &[]);
            let _ = deliver(
                &mut mac,
                &mut phy,
                &mut registry,
                &mut events,
                &frame,
                STREAM_STATUS_CRC_OK,
            );
            assert!(registry.link_exists());
            assert_eq!(registry.pan_id(), &GW_PAN);
            assert_eq!(registry.remote(), &GW_ADDR);
        }
    }

    #[test]
    fn gateway_accepts_broadcast_pan_for_both_frame_types() {
        let (mut mac, mut phy, mut registry) = gateway();
        let mut events = Recorder::default();

        // Broadcast PAN and broadcast destination: a data frame from an
        // unlinked End Point is accepted.
        let data = wire_frame(
            BROADCAST_PAN_ID,
            BROADCAST_ADDRESS,
            EP_ADDR,
            CONTROL_MODE_ENDPOINT,
            0,
            b"hi",
        );
        let _ = deliver(
            &mut mac,
            &mut phy,
            &mut registry,
            &mut events,
            &data,
            STREAM_STATUS_CRC_OK,
        );
        assert_eq!(events.transfers, 1);
        assert_eq!(events.last_payload.as_slice(), b"hi");
        // Rejection or not, a Gateway always returns to listening.
        assert!(mac.busy());
    }

    #[test]
    fn gateway_rejects_foreign_pan_for_both_frame_types() {
        let (mut mac, mut phy, mut registry) = gateway();
        let mut events = Recorder::default();
        let foreign: [u8; PAN_ID_LEN] = [0x56, 0x78];

        let data =
            wire_frame(foreign, GW_ADDR, EP_ADDR, CONTROL_MODE_ENDPOINT, 0, b"x");
        let _ = deliver(
            &mut mac,
            &mut phy,
            &mut registry,
            &mut events,
            &data,
            STREAM_STATUS_CRC_OK,
        );
        assert_eq!(events.transfers, 0);

        let link_request = wire_frame(
            foreign,
            GW_ADDR,
            EP_ADDR,
            FrameType::LinkRequest as u8 | CONTROL_MODE_ENDPOINT,
            0,
            &[],
        );
        let _ = deliver(
            &mut mac,
            &mut phy,
            &mut registry,
            &mut events,
            &link_request,
            STREAM_STATUS_CRC_OK,
        );
        assert_eq!(events.link_requests, 0);
        assert_eq!(phy.radio().transmit_strobes, 0);
    }

    #[test]
    fn gateway_rejects_gateway_mode_traffic() {
        let (mut mac, mut phy, mut registry) = gateway();
        let mut events = Recorder::default();

        let frame =
            wire_frame(GW_PAN, GW_ADDR, EP_ADDR, CONTROL_MODE_GATEWAY, 0, b"x");
        let _ = deliver(
            &mut mac,
            &mut phy,
            &mut registry,
            &mut events,
            &frame,
            STREAM_STATUS_CRC_OK,
        );
        assert_eq!(events.transfers, 0);
    }

    #[test]
    fn corrupt_frames_are_dropped_silently() {
        let (mut mac, mut phy, mut registry) = gateway();
        let mut events = Recorder::default();

        // Hardware CRC failed: the status footer has no CRC-OK bit.
        let frame =
            wire_frame(GW_PAN, GW_ADDR, EP_ADDR, CONTROL_MODE_ENDPOINT, 0, b"x");
        let _ = deliver(&mut mac, &mut phy, &mut registry, &mut events, &frame, 0x00);
        assert_eq!(events.transfers, 0);

        // Runt frame, shorter than the header.
        let _ = deliver(
            &mut mac,
            &mut phy,
            &mut registry,
            &mut events,
            &[0x01, 0x02],
            STREAM_STATUS_CRC_OK,
        );
        assert_eq!(events.transfers, 0);
    }

    #[test]
    fn gateway_data_request_without_staged_response_sends_nothing() {
        let (mut mac, mut phy, mut registry) = gateway();
        let mut events = Recorder::default();

        let frame = wire_frame(
            GW_PAN,
            GW_ADDR,
            EP_ADDR,
            CONTROL_DATA_REQUEST | CONTROL_MODE_ENDPOINT,
            7,
            b"ping",
        );
        let _ = deliver(
            &mut mac,
            &mut phy,
            &mut registry,
            &mut events,
            &frame,
            STREAM_STATUS_CRC_OK,
        );

        assert_eq!(events.transfers, 1);
        assert!(events.last_data_request);
        assert_eq!(phy.radio().transmit_strobes, 0);
        // Back to listening, not transmitting.
        assert!(mac.busy());
        assert!(!phy.transmitting());
    }

    #[test]
    fn gateway_data_request_consumes_the_staged_response_once() {
        let (mut mac, mut phy, mut registry) = gateway();
        let mut events = Recorder::default();
        assert!(mac.set_data_response(b"World").is_ok());

        let request = wire_frame(
            GW_PAN,
            GW_ADDR,
            EP_ADDR,
            CONTROL_DATA_REQUEST | CONTROL_MODE_ENDPOINT,
            0,
            b"Hello",
        );
        let _ = deliver(
            &mut mac,
            &mut phy,
            &mut registry,
            &mut events,
            &request,
            STREAM_STATUS_CRC_OK,
        );

        // The response went out in the same interrupt context, addressed
        // back to the requester.
        assert_eq!(phy.radio().transmit_strobes, 1);
        assert!(mac.busy());
        let stream = &phy.radio().tx_fifo[1..];
        let header = FrameHeader::parse(stream);
        assert_eq!(header.frame_type(), Some(FrameType::Data));
        assert_eq!(header.dest_addr, EP_ADDR);
        assert_eq!(header.src_addr, GW_ADDR);
        assert_eq!(&stream[FRAME_HEADER_LEN..], b"World");

        complete_tx(&mut mac, &mut phy, &mut events);

        // The staged response was consumed: the next request gets none.
        let _ = deliver(
            &mut mac,
            &mut phy,
            &mut registry,
            &mut events,
            &request,
            STREAM_STATUS_CRC_OK,
        );
        assert_eq!(phy.radio().transmit_strobes, 1);
    }

    #[test]
    fn gateway_answers_an_accepted_link_request() {
        let (mut mac, mut phy, mut registry) = gateway();
        let mut events = Recorder::default();

        let request = wire_frame(
            BROADCAST_PAN_ID,
            BROADCAST_ADDRESS,
            EP_ADDR,
            FrameType::LinkRequest as u8 | CONTROL_DATA_REQUEST | CONTROL_MODE_ENDPOINT,
            0,
            &[],
        );
        let _ = deliver(
            &mut mac,
            &mut phy,
            &mut registry,
            &mut events,
            &request,
            STREAM_STATUS_CRC_OK,
        );

        assert_eq!(events.link_requests, 1);
        assert_eq!(phy.radio().transmit_strobes, 1);

        let stream = &phy.radio().tx_fifo[1..];
        let header = FrameHeader::parse(stream);
        assert_eq!(header.frame_type(), Some(FrameType::LinkRequest));
        assert_eq!(header.dest_addr, EP_ADDR);
        assert_eq!(header.pan_id, GW_PAN);
        assert!(!header.data_request());
        assert_eq!(stream.len(), FRAME_HEADER_LEN);
    }

    #[test]
    fn gateway_stays_quiet_on_a_denied_link_request() {
        let (mut mac, mut phy, mut registry) = gateway();
        let mut events = Recorder {
            accept_links: false,
            ..Recorder::default()
        };

        let request = wire_frame(
            BROADCAST_PAN_ID,
            BROADCAST_ADDRESS,
            EP_ADDR,
            FrameType::LinkRequest as u8 | CONTROL_MODE_ENDPOINT,
            0,
            &[],
        );
        let _ = deliver(
            &mut mac,
            &mut phy,
            &mut registry,
            &mut events,
            &request,
            STREAM_STATUS_CRC_OK,
        );

        assert_eq!(events.link_requests, 1);
        assert_eq!(phy.radio().transmit_strobes, 0);
        // Denied or not, the Gateway keeps listening.
        assert!(mac.busy());
    }

    #[test]
    fn transmit_completion_with_data_request_relistens() {
        let (mut mac, mut phy, registry) = linked_end_point();
        let mut events = Recorder::default();

        assert!(
            mac.send(&mut phy, &registry, FrameType::Data, true, b"req")
                .is_ok()
        );
        assert_eq!(phy.eop_event(GDO_EVENT), PhyEvent::Sent);
        let _ = mac.disassemble(&mut phy, &mut events);

        // Half duplex: awaiting the reply, no completion raised yet.
        assert!(mac.busy());
        assert_eq!(events.transfers, 0);
        assert_eq!(phy.radio().receiver_on_count, 1);
    }

    #[test]
    fn transmit_completion_without_data_request_idles() {
        let (mut mac, mut phy, registry) = linked_end_point();
        let mut events = Recorder::default();

        assert!(
            mac.send(&mut phy, &registry, FrameType::Data, false, b"fire")
                .is_ok()
        );
        assert_eq!(phy.eop_event(GDO_EVENT), PhyEvent::Sent);
        let _ = mac.disassemble(&mut phy, &mut events);

        assert!(!mac.busy());
        assert_eq!(events.transfers, 1);
        assert!(events.last_payload.is_empty());
        assert!(phy.radio().asleep);
    }

    #[test]
    fn timeout_abandons_the_pending_receive() {
        let (mut mac, mut phy, _registry) = end_point();

        assert!(mac.listen(&mut phy).is_ok());
        let _ = mac.timeout(&mut phy);

        assert!(!mac.busy());
        assert!(phy.radio().asleep);
    }
}
