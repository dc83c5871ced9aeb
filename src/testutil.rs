//! Shared test doubles: a recording mock radio, an in-memory backup, and
//! an event recorder.

use crate::address::Backup;
use crate::consts::{BACKUP_RECORD_LEN, DATA_STREAM_MAX_LEN, MAX_PAYLOAD_LEN};
use crate::frame::{FrameHeader, LinkEvents};
use crate::phy::{EdgePolarity, Radio};
use heapless::Vec;

/// Port interrupt flag bit the mock radio's GDO pin answers to.
pub const GDO_EVENT: u8 = 0x04;

/// A [`Radio`] double that records every operation and replays a canned
/// receive FIFO.
#[derive(Debug)]
pub struct MockRadio {
    /// Whether the hardware is in its lowest-power state.
    pub asleep: bool,
    /// Number of times the receiver was turned on.
    pub receiver_on_count: u32,
    /// Number of transmit strobes issued.
    pub transmit_strobes: u32,
    /// Whether the edge interrupt is enabled.
    pub edge_enabled: bool,
    /// Transition the edge interrupt waits on.
    pub polarity: EdgePolarity,
    /// Address-filter state (`None` when disabled).
    pub filter: Option<u8>,
    /// Last selected channel.
    pub channel: Option<u8>,
    /// Everything written to the transmit FIFO since the last flush.
    pub tx_fifo: Vec<u8, 96>,
    /// Canned receive FIFO contents.
    pub rx_fifo: Vec<u8, 96>,
    /// Whether the hardware timer is running.
    pub timer_running: bool,
    rx_cursor: usize,
}

impl MockRadio {
    /// A fresh, awake, quiet radio.
    pub fn new() -> Self {
        Self {
            asleep: false,
            receiver_on_count: 0,
            transmit_strobes: 0,
            edge_enabled: false,
            polarity: EdgePolarity::Assert,
            filter: None,
            channel: None,
            tx_fifo: Vec::new(),
            rx_fifo: Vec::new(),
            timer_running: false,
            rx_cursor: 0,
        }
    }

    /// Loads a received data stream: length prefix, frame bytes, and the
    /// hardware-appended status footer.
    pub fn load_rx_stream(&mut self, frame: &[u8], rssi: u8, status: u8) {
        self.rx_fifo.clear();
        self.rx_cursor = 0;
        let _ = self.rx_fifo.push(frame.len() as u8);
        let _ = self.rx_fifo.extend_from_slice(frame);
        let _ = self.rx_fifo.push(rssi);
        let _ = self.rx_fifo.push(status);
    }
}

impl Radio for MockRadio {
    fn wakeup(&mut self) {
        self.asleep = false;
    }

    fn idle(&mut self) {}

    fn sleep(&mut self) {
        self.asleep = true;
    }

    fn receiver_on(&mut self) {
        self.receiver_on_count += 1;
    }

    fn transmit(&mut self) {
        self.transmit_strobes += 1;
    }

    fn flush_tx_fifo(&mut self) {
        self.tx_fifo.clear();
    }

    fn flush_rx_fifo(&mut self) {
        self.rx_fifo.clear();
        self.rx_cursor = 0;
    }

    fn write_tx_fifo(&mut self, stream: &[u8]) {
        let _ = self.tx_fifo.extend_from_slice(stream);
    }

    fn read_rx_fifo(&mut self, buf: &mut [u8]) -> usize {
        let remaining = self.rx_fifo.len() - self.rx_cursor;
        let count = remaining.min(buf.len());
        buf[..count]
            .copy_from_slice(&self.rx_fifo[self.rx_cursor..self.rx_cursor + count]);
        self.rx_cursor += count;
        count
    }

    fn set_channel(&mut self, channel: u8) -> bool {
        self.channel = Some(channel);
        true
    }

    fn enable_address_filter(&mut self, device_addr: u8) {
        self.filter = Some(device_addr);
    }

    fn disable_address_filter(&mut self) {
        self.filter = None;
    }

    fn edge_enable(&mut self) {
        self.edge_enabled = true;
    }

    fn edge_disable(&mut self) {
        self.edge_enabled = false;
    }

    fn edge_wait_for(&mut self, polarity: EdgePolarity) {
        self.polarity = polarity;
    }

    fn edge_polarity(&self) -> EdgePolarity {
        self.polarity
    }

    fn edge_event(&self, event: u8) -> bool {
        event & GDO_EVENT != 0
    }

    fn timer_start(&mut self) {
        self.timer_running = true;
    }

    fn timer_stop(&mut self) {
        self.timer_running = false;
    }
}

/// A [`Backup`] double persisting into RAM.
#[derive(Debug, Default)]
pub struct MemoryBackup {
    record: Option<[u8; BACKUP_RECORD_LEN]>,
}

impl Backup for MemoryBackup {
    fn read(&mut self, record: &mut [u8; BACKUP_RECORD_LEN]) -> bool {
        match self.record {
            Some(stored) => {
                *record = stored;
                true
            }
            None => false,
        }
    }

    fn write(&mut self, record: &[u8; BACKUP_RECORD_LEN]) -> bool {
        self.record = Some(*record);
        true
    }
}

/// A [`LinkEvents`] double that records every notification.
#[derive(Debug)]
pub struct Recorder {
    /// Number of transfer-complete notifications.
    pub transfers: u32,
    /// Payload of the last transfer-complete notification.
    pub last_payload: Vec<u8, MAX_PAYLOAD_LEN>,
    /// Data-request flag of the last transfer-complete notification.
    pub last_data_request: bool,
    /// Number of link-request notifications.
    pub link_requests: u32,
    /// Verdict handed back for link requests.
    pub accept_links: bool,
    /// Number of receive-timeout notifications.
    pub timeouts: u32,
}

impl Default for Recorder {
    fn default() -> Self {
        Self {
            transfers: 0,
            last_payload: Vec::new(),
            last_data_request: false,
            link_requests: 0,
            accept_links: true,
            timeouts: 0,
        }
    }
}

impl LinkEvents for Recorder {
    fn transfer_complete(&mut self, data_request: bool, payload: &[u8]) -> u8 {
        self.transfers += 1;
        self.last_data_request = data_request;
        self.last_payload.clear();
        let _ = self.last_payload.extend_from_slice(payload);
        0
    }

    fn link_request(&mut self, _payload: &[u8]) -> bool {
        self.link_requests += 1;
        self.accept_links
    }

    fn rx_timeout(&mut self) {
        self.timeouts += 1;
    }
}

/// Serializes a frame into its wire form.
pub fn wire_frame(
    pan_id: [u8; crate::consts::PAN_ID_LEN],
    dest_addr: [u8; crate::consts::NODE_ADDRESS_LEN],
    src_addr: [u8; crate::consts::NODE_ADDRESS_LEN],
    control: u8,
    seq_number: u8,
    payload: &[u8],
) -> Vec<u8, DATA_STREAM_MAX_LEN> {
    let header = FrameHeader {
        pan_id,
        dest_addr,
        src_addr,
        control,
        seq_number,
    };

    let mut stream = [0u8; DATA_STREAM_MAX_LEN];
    header.write_to(&mut stream);
    let end = crate::consts::FRAME_HEADER_LEN + payload.len();
    stream[crate::consts::FRAME_HEADER_LEN..end].copy_from_slice(payload);

    Vec::from_slice(&stream[..end]).unwrap()
}
