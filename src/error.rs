//! Error types surfaced by the protocol.
//!
//! Every failure in this stack is recoverable: the caller is expected to
//! retry after the next interrupt (the usual idiom is to sleep until the
//! engine wakes the processor and then try again). Received frames that
//! fail validation are dropped silently and never surface here.

use thiserror::Error;

/// Failure of a transmit- or listen-type operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SendError {
    /// The frame scheduler or the physical device already has an
    /// operation in flight. Retry once the scheduler reports idle.
    #[error("frame scheduler or physical device is busy")]
    Busy,

    /// The payload plus the frame header does not fit in a single data
    /// stream. Fragmentation is not supported; the payload must shrink.
    #[error("payload does not fit in a single data stream")]
    Oversize,

    /// A half-duplex transfer was requested without an established link.
    #[error("no link has been established with a gateway")]
    NotLinked,
}
