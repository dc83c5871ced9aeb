//! Constants used across the link-layer protocol implementation.
//!
//! This module defines the protocol-wide constants used for address
//! widths, frame layout, control-byte masks, data-stream sizing, and the
//! persisted backup record.
//!
//! ## Key Concepts
//!
//! - **Addressing widths**: PAN identifier and node address sizes are
//!   fixed at build time here; every buffer and wire offset is derived
//!   from them.
//! - **Control byte**: a single byte carrying the frame type, reserved
//!   flags, the data-request flag, and the originating node role.
//! - **Data stream**: the physical envelope around a frame — a 1-byte
//!   length prefix on the way out, and a 2-byte status footer appended by
//!   the receiving hardware (never sent over the air).
//! - **Payload limit**: derived from the hardware single-buffer size minus
//!   the frame header; fragmentation is not supported, so this is a hard
//!   ceiling.
//!
//! These values should be used wherever framing or buffer logic is
//! implemented to ensure consistent message boundaries.

/// Size (in bytes) of a Personal Area Network (PAN) identifier.
pub const PAN_ID_LEN: usize = 2;

/// Size (in bytes) of a node hardware address.
pub const NODE_ADDRESS_LEN: usize = 2;

/// Byte value every broadcast address byte is set to.
pub const BROADCAST_BYTE: u8 = 0x00;

/// Combined size of the addressing fields in a frame header.
pub const FRAME_HEADER_ADDRESS_LEN: usize = PAN_ID_LEN + 2 * NODE_ADDRESS_LEN;

/// Size of a complete frame header: addressing fields plus the control
/// byte and the sequence number.
pub const FRAME_HEADER_LEN: usize = FRAME_HEADER_ADDRESS_LEN + 2;

/// Per-frame overhead on the air. There is no frame footer, so this is
/// the header size alone.
pub const FRAME_OVERHEAD_LEN: usize = FRAME_HEADER_LEN;

/// Maximum size of a single data stream, set to the hardware transmit
/// FIFO size. Frames never span more than one data stream.
pub const DATA_STREAM_MAX_LEN: usize = 64;

/// Maximum size of a frame payload.
pub const MAX_PAYLOAD_LEN: usize = DATA_STREAM_MAX_LEN - FRAME_OVERHEAD_LEN;

/// Length of the data-stream length prefix.
pub const STREAM_HEADER_LEN: usize = 1;

/// Length of the status footer the receiving hardware appends to a data
/// stream (raw RSSI, then packed LQI + CRC-OK). Not sent over the air.
pub const STREAM_FOOTER_LEN: usize = 2;

/// Mask for the CRC-OK bit in the data-stream status footer byte.
pub const STREAM_STATUS_CRC_OK: u8 = 0x80;

/// Mask for the 7-bit link quality indicator in the status footer byte.
pub const STREAM_STATUS_LQI: u8 = 0x7F;

// Control byte layout, MSB to LSB:
//   type(2) | secure(1) | pending(1) | ackRequest(1) | ack(1) | dataRequest(1) | mode(1)
// The secure, pending, ackRequest, and ack bits are reserved and unused.

/// Mask for the two frame-type bits of the control byte.
pub const CONTROL_TYPE: u8 = 0xC0;

/// Mask for the reserved secure bit of the control byte.
pub const CONTROL_SECURE: u8 = 0x20;

/// Mask for the reserved pending bit of the control byte.
pub const CONTROL_PENDING: u8 = 0x10;

/// Mask for the reserved acknowledgement-request bit of the control byte.
pub const CONTROL_ACK_REQUEST: u8 = 0x08;

/// Mask for the reserved acknowledgement bit of the control byte.
pub const CONTROL_ACK: u8 = 0x04;

/// Mask for the data-request bit of the control byte
/// (0: simplex, 1: half duplex).
pub const CONTROL_DATA_REQUEST: u8 = 0x02;

/// Mask for the mode bit of the control byte, identifying the role of the
/// originating node (0: End Point, 1: Gateway).
pub const CONTROL_MODE: u8 = 0x01;

/// Mode-bit value stamped by an End Point node.
pub const CONTROL_MODE_ENDPOINT: u8 = 0x00;

/// Mode-bit value stamped by a Gateway node.
pub const CONTROL_MODE_GATEWAY: u8 = 0x01;

/// Size of the flat addressing record written to the non-volatile backup:
/// `{ fixed: 1, pan id, local address, remote address }`.
pub const BACKUP_RECORD_LEN: usize = 1 + PAN_ID_LEN + 2 * NODE_ADDRESS_LEN;

/// Length of the radio preamble in bytes. Used only to compute the
/// receive-timeout window.
pub const PHY_PREAMBLE_LEN: u32 = 4;

/// Length of the radio SYNC word in bytes. Used only to compute the
/// receive-timeout window.
pub const PHY_SYNC_LEN: u32 = 4;
