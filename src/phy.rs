//! Physical bridge between the Data Link layer and the radio hardware.
//!
//! The hardware itself stays behind the [`Radio`] trait: register access,
//! SPI strobes, FIFO plumbing, and pin mapping belong to the transceiver
//! driver. What lives here is the protocol-visible duty-cycle state
//! machine layered on top of it:
//!
//! - a single in-flight operation, guarded by the `transmitting` flag,
//! - the data-stream envelope (a 1-byte length prefix on the way out, a
//!   2-byte status footer appended by hardware on the way in),
//! - End-of-Packet edge classification for the GDO interrupt, and
//! - an optional receive timeout counted down by the millisecond tick.
//!
//! The two interrupt entry points ([`PhyBridge::eop_event`] and
//! [`PhyBridge::tick`]) return what happened instead of calling back into
//! the scheduler; the protocol façade drives the scheduler from those
//! return values inside the same interrupt context.
//!
//! ## Data stream structure
//!
//! ```text
//!          ------------------------------------------
//!         | Length | Address + Data Field | (Status) |
//!          ------------------------------------------
//!   Bytes:    1               n                2
//! ```
//!
//! The status footer (raw RSSI, then 7-bit LQI + 1-bit CRC-OK) is
//! appended by the receiving hardware and is never sent over the air.

use crate::address::AddressFilter;
use crate::consts::{
    DATA_STREAM_MAX_LEN, PHY_PREAMBLE_LEN, PHY_SYNC_LEN, STREAM_FOOTER_LEN,
    STREAM_HEADER_LEN, STREAM_STATUS_CRC_OK, STREAM_STATUS_LQI,
};
use libm::ceilf;

/// Polarity the radio edge interrupt is waiting on.
///
/// `Assert` fires on the low-to-high transition (SYNC word found);
/// `Deassert` fires on the high-to-low transition (End of Packet).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum EdgePolarity {
    /// Low-to-high transition (SYNC word found).
    Assert,
    /// High-to-low transition (End of Packet).
    Deassert,
}

/// Classification of a GDO/edge interrupt by [`PhyBridge::eop_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum PhyEvent {
    /// The event did not belong to the radio edge pin. Nothing was done.
    None,
    /// The event belonged to the radio but no operation completed (the
    /// edge was not at End-of-Packet polarity). Handling still has to be
    /// closed with [`PhyBridge::eop_complete`].
    Pending,
    /// A transmit operation completed.
    Sent,
    /// A receive operation completed; fetch the stream with
    /// [`PhyBridge::fetch_stream`].
    Received,
}

/// Outcome of a millisecond tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TickEvent {
    /// Nothing expired.
    None,
    /// The receive timeout expired; the scheduler must abandon the
    /// pending receive.
    RxTimeout,
}

/// Status footer of the last received data stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct StreamStatus {
    /// Raw received signal strength indicator.
    pub rssi: i8,
    /// Packed status byte: CRC-OK in the top bit, LQI in the lower seven.
    pub status: u8,
}

impl StreamStatus {
    /// Whether the hardware CRC check passed for the last stream.
    pub fn crc_ok(&self) -> bool {
        self.status & STREAM_STATUS_CRC_OK != 0
    }

    /// Link quality indicator of the last stream.
    pub fn lqi(&self) -> u8 {
        self.status & STREAM_STATUS_LQI
    }
}

/// The physical hardware operations the protocol requires.
///
/// Implement this for your transceiver driver. Every operation is
/// synchronous from the protocol's point of view; the only asynchronous
/// signal is the edge interrupt the application routes into
/// [`PhyBridge::eop_event`]. Implementations are expected to bring the
/// hardware out of a low-power state on their own where an operation
/// needs it (the bridge calls [`Radio::wakeup`] ahead of the duty-cycle
/// operations it drives).
pub trait Radio {
    /// Brings the hardware from a low-power state to an active state.
    fn wakeup(&mut self);

    /// Puts the hardware into an idle (active but not RX/TX) state.
    fn idle(&mut self);

    /// Puts the hardware into its lowest-power state.
    fn sleep(&mut self);

    /// Turns on the receiver.
    fn receiver_on(&mut self);

    /// Strobes transmission of the previously written TX FIFO contents.
    fn transmit(&mut self);

    /// Flushes the transmit FIFO.
    fn flush_tx_fifo(&mut self);

    /// Flushes the receive FIFO.
    fn flush_rx_fifo(&mut self);

    /// Appends `stream` to the transmit FIFO.
    fn write_tx_fifo(&mut self, stream: &[u8]);

    /// Reads up to `buf.len()` bytes from the receive FIFO, returning the
    /// number of bytes actually read (0 when the FIFO is empty).
    fn read_rx_fifo(&mut self, buf: &mut [u8]) -> usize;

    /// Selects the communication channel. Returns the success of the
    /// change.
    fn set_channel(&mut self, channel: u8) -> bool;

    /// Sets the transmitter output power. Optional.
    fn set_output_power(&mut self, power: i16) {
        let _ = power;
    }

    /// Sets the hardware device address to filter on and enables
    /// filtering.
    fn enable_address_filter(&mut self, device_addr: u8);

    /// Disables hardware address filtering.
    fn disable_address_filter(&mut self);

    /// Enables the edge (GDO) interrupt.
    fn edge_enable(&mut self);

    /// Disables the edge (GDO) interrupt.
    fn edge_disable(&mut self);

    /// Selects which transition the edge interrupt fires on.
    fn edge_wait_for(&mut self, polarity: EdgePolarity);

    /// The transition the edge interrupt is currently waiting on.
    fn edge_polarity(&self) -> EdgePolarity;

    /// Returns whether the flagged interrupt `event` (e.g. a port
    /// interrupt flag register) belongs to the radio edge pin.
    fn edge_event(&self, event: u8) -> bool;

    /// Starts the millisecond hardware timer. Optional; only needed when
    /// the receive timeout is in use and the timer is not free-running.
    fn timer_start(&mut self) {}

    /// Stops the millisecond hardware timer. Optional.
    fn timer_stop(&mut self) {}
}

/// Receive-timeout bookkeeping.
#[derive(Debug)]
struct RxTimeout {
    /// Tick count a fresh timeout starts from.
    compare: u32,
    /// Remaining ticks; decremented by [`PhyBridge::tick`].
    counter: u32,
    enabled: bool,
}

/// Computes a receive-timeout tick count (in milliseconds) for a given
/// over-the-air baud rate.
///
/// The window covers the preamble, the SYNC word, and a full-FIFO data
/// stream at `baud_rate` bits per second, rounded up and widened four
/// times to absorb processing overhead and crystal error.
pub fn rx_timeout_ticks(baud_rate: u32) -> u32 {
    let bits = (PHY_PREAMBLE_LEN + PHY_SYNC_LEN + DATA_STREAM_MAX_LEN as u32) * 8;
    let ms = ceilf((bits as f32 * 1000.0) / baud_rate as f32) as u32;
    (ms + 1) << 2
}

/// The duty-cycle state machine the protocol drives the radio through.
///
/// Owns the [`Radio`] implementation and the protocol-visible state on
/// top of it. One instance exists per node; it is driven exclusively from
/// the protocol façade and the two interrupt entry points.
#[derive(Debug)]
pub struct PhyBridge<R: Radio> {
    radio: R,
    /// Device transmitting flag. Guards the single in-flight operation.
    transmitting: bool,
    /// Hardware timer running latch.
    timer_running: bool,
    /// Status footer of the last received data stream.
    footer: StreamStatus,
    /// Receive timeout, when the feature was configured at construction.
    rx_timeout: Option<RxTimeout>,
}

impl<R: Radio> PhyBridge<R> {
    /// Creates the bridge around a radio driver.
    ///
    /// `rx_timeout_ticks` enables the optional receive timeout with the
    /// given number of millisecond ticks (see [`rx_timeout_ticks`] for a
    /// baud-rate-derived value); `None` disables the feature.
    pub fn new(radio: R, rx_timeout_ticks: Option<u32>) -> Self {
        Self {
            radio,
            transmitting: false,
            timer_running: false,
            footer: StreamStatus::default(),
            rx_timeout: rx_timeout_ticks.map(|compare| RxTimeout {
                compare,
                counter: 0,
                enabled: false,
            }),
        }
    }

    /// Shared access to the underlying radio driver.
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Exclusive access to the underlying radio driver.
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Enables communication (the edge interrupt) at the hardware.
    pub fn enable(&mut self) {
        self.radio.edge_enable();
    }

    /// Disables communication (the edge interrupt) at the hardware.
    pub fn disable(&mut self) {
        self.radio.edge_disable();
    }

    /// Selects the communication channel.
    pub fn set_channel(&mut self, channel: u8) -> bool {
        self.radio.wakeup();
        self.radio.set_channel(channel)
    }

    /// Sets the transmitter output power.
    pub fn set_output_power(&mut self, power: i16) {
        self.radio.wakeup();
        self.radio.set_output_power(power);
    }

    /// Status footer of the last received data stream.
    pub fn stream_status(&self) -> &StreamStatus {
        &self.footer
    }

    /// Whether a transmit operation is in flight.
    pub fn transmitting(&self) -> bool {
        self.transmitting
    }

    /// Puts the hardware into an idle state.
    pub fn idle(&mut self) {
        self.radio.wakeup();
        self.radio.idle();
    }

    /// Puts the hardware into its lowest-power state.
    pub fn low_power(&mut self) {
        self.radio.sleep();
    }

    /// Builds a data stream around `data_field` and transmits it.
    ///
    /// Fails when the field exceeds the hardware single-buffer size
    /// (fragmentation is not supported) or while a transmission is
    /// already in flight.
    pub fn transmit(&mut self, data_field: &[u8]) -> bool {
        if data_field.len() > DATA_STREAM_MAX_LEN {
            return false;
        }
        if self.transmitting {
            return false;
        }

        // Fire on End-of-Packet (high-to-low transition).
        self.radio.edge_wait_for(EdgePolarity::Deassert);
        self.radio.wakeup();

        // The length prefix does not count itself.
        self.radio.flush_tx_fifo();
        let length = [data_field.len() as u8; STREAM_HEADER_LEN];
        self.radio.write_tx_fifo(&length);
        self.radio.write_tx_fifo(data_field);

        // Set before strobing: a short stream can finish before the
        // strobe call returns.
        self.transmitting = true;
        self.radio.transmit();

        true
    }

    /// Turns on the receiver and arms the receive timeout, if configured.
    pub fn receiver_on(&mut self) {
        // Fire on End-of-Packet (high-to-low transition).
        self.radio.edge_wait_for(EdgePolarity::Deassert);
        self.radio.wakeup();

        // Flush the RX FIFO to prepare it for the next RF packet.
        self.radio.flush_rx_fifo();
        self.radio.receiver_on();

        self.arm_rx_timeout();
    }

    /// Classifies a GDO/edge interrupt.
    ///
    /// For anything other than [`PhyEvent::None`] the edge interrupt is
    /// left disabled; the caller finishes the frame's synchronous
    /// post-processing and then closes the window with
    /// [`PhyBridge::eop_complete`].
    pub fn eop_event(&mut self, event: u8) -> PhyEvent {
        if !self.radio.edge_event(event) {
            return PhyEvent::None;
        }

        self.radio.edge_disable();

        if self.radio.edge_polarity() != EdgePolarity::Deassert {
            return PhyEvent::Pending;
        }

        if self.transmitting {
            self.transmitting = false;
            PhyEvent::Sent
        } else {
            PhyEvent::Received
        }
    }

    /// Closes the handling window an [`PhyBridge::eop_event`] opened,
    /// re-enabling the edge interrupt.
    pub fn eop_complete(&mut self) {
        self.radio.edge_enable();
    }

    /// Reads the received data stream out of the hardware, stripping the
    /// physical envelope.
    ///
    /// The length prefix is consumed, up to `data_field.len()` bytes of
    /// the field are copied out, and the trailing status footer is
    /// captured for [`PhyBridge::stream_status`]. Returns the number of
    /// field bytes read; zero on a bogus interrupt (empty RX FIFO).
    pub fn fetch_stream(&mut self, data_field: &mut [u8]) -> usize {
        // Reception completed, so the pending receive timeout (if any)
        // must not fire later in an unrelated state.
        self.disarm_rx_timeout();

        let mut length = [0u8; STREAM_HEADER_LEN];
        if self.radio.read_rx_fifo(&mut length) == 0 {
            // A bogus interrupt has occurred; the RX FIFO holds nothing.
            return 0;
        }

        let count = (length[0] as usize).min(data_field.len());
        let read = self.radio.read_rx_fifo(&mut data_field[..count]);

        // Appended status: RSSI, then LQI + CRC-OK.
        let mut footer = [0u8; STREAM_FOOTER_LEN];
        let _ = self.radio.read_rx_fifo(&mut footer);
        self.footer = StreamStatus {
            rssi: footer[0] as i8,
            status: footer[1],
        };

        read
    }

    /// Advances the millisecond timer state.
    ///
    /// Must be called from the periodic timer interrupt. Expires the
    /// receive timeout when it reaches zero.
    pub fn tick(&mut self) -> TickEvent {
        let expired = match self.rx_timeout.as_mut() {
            Some(timeout) if timeout.enabled => {
                timeout.counter = timeout.counter.saturating_sub(1);
                if timeout.counter == 0 {
                    timeout.enabled = false;
                    true
                } else {
                    false
                }
            }
            _ => false,
        };

        if expired {
            self.timer_stop();
            #[cfg(feature = "log")]
            log::debug!("receive timeout expired");
            return TickEvent::RxTimeout;
        }

        TickEvent::None
    }

    fn arm_rx_timeout(&mut self) {
        let armed = match self.rx_timeout.as_mut() {
            Some(timeout) => {
                timeout.counter = timeout.compare;
                timeout.enabled = true;
                true
            }
            None => false,
        };
        if armed {
            self.timer_start();
        }
    }

    fn disarm_rx_timeout(&mut self) {
        let disarmed = match self.rx_timeout.as_mut() {
            Some(timeout) if timeout.enabled => {
                timeout.enabled = false;
                timeout.counter = 0;
                true
            }
            _ => false,
        };
        if disarmed {
            self.timer_stop();
        }
    }

    fn timer_start(&mut self) {
        if !self.timer_running {
            self.radio.timer_start();
            self.timer_running = true;
        }
    }

    fn timer_stop(&mut self) {
        if self.timer_running {
            self.radio.timer_stop();
            self.timer_running = false;
        }
    }
}

impl<R: Radio> AddressFilter for PhyBridge<R> {
    fn enable_address_filter(&mut self, device_addr: u8) {
        self.radio.wakeup();
        self.radio.enable_address_filter(device_addr);
    }

    fn disable_address_filter(&mut self) {
        self.radio.wakeup();
        self.radio.disable_address_filter();
    }
}
