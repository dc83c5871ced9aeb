//! # panlink
//!
//! A `no_std` link-layer protocol stack for resource-constrained
//! microcontrollers communicating over a sub-GHz RF transceiver.
//!
//! The stack provides two node roles — [`EndPoint`](protocol::EndPoint),
//! a peripheral node that initiates links and transfers and sleeps in
//! between, and [`Gateway`](protocol::Gateway), the always-listening
//! coordinator — with:
//!
//! - link establishment (with optional non-volatile backup of the link)
//! - addressed MAC framing with role/address/PAN validation
//! - simplex and half-duplex (data-request/response) transfers
//! - a duty-cycled, interrupt-driven physical bridge state machine with
//!   an optional receive timeout
//!
//! The transceiver itself stays behind the [`Radio`](phy::Radio) trait:
//! SPI strobes, FIFO access, GDO polarity control, and address-filter
//! registers belong to the hardware driver the application supplies.
//!
//! ## Crate features
//! | Feature                | Description |
//! |------------------------|-------------|
//! | `std`                  | Disables `#![no_std]`; enables the `std` features of `thiserror`, `critical-section`, and `log` |
//! | `global-isr` (default) | Global-instance helpers and macros for dispatching from interrupt vectors, via `critical-section` |
//! | `defmt-0-3`            | `defmt::Format` derives on the public types, plus `heapless`/`nb` defmt support |
//! | `log`                  | Sparse `log` statements at protocol decision points |
//!
//! ## Concurrency model
//!
//! Single-threaded, interrupt-driven, cooperative. Two interrupt sources
//! — the GDO/edge pin (SYNC/End-of-Packet) and a 1 ms hardware timer —
//! invoke the engine entry points while the main loop sleeps. Every
//! operation is non-blocking and reports busy instead of waiting; the
//! caller's retry idiom is to sleep until the next interrupt. Handlers
//! are not reentrant and must run to completion; with the `global-isr`
//! helpers the critical section provides that exclusion.
//!
//! ## Usage
//!
//! ```ignore
//! use panlink::protocol::{EndPoint, EndPointSetup};
//!
//! let mut node = EndPoint::new(radio, EndPointSetup {
//!     channel: 2,
//!     pan_id: [0x00, 0x01],
//!     address: [0x00, 0x02],
//!     backup: None,
//!     rx_timeout: None,
//! });
//!
//! while !node.connect(&[]) {
//!     mcu_sleep(); // woken by the protocol interrupts
//! }
//! ```
//!
//! Wire the two interrupt vectors to
//! [`EndPoint::engine`](protocol::EndPoint::engine) and
//! [`EndPoint::engine_tick`](protocol::EndPoint::engine_tick) (directly,
//! or through the `global-isr` macros).
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded
//! environments. No dynamic allocation; fixed-size buffers throughout.

#![deny(
    bad_style,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    while_true,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces
)]
#![warn(
    dead_code,
    unused,
    unused_qualifications,
    unused_results,
    missing_debug_implementations,
    missing_docs
)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "global-isr")]
pub use critical_section;

pub use heapless;

pub mod address;
pub mod consts;
pub mod error;
pub mod frame;
#[cfg(feature = "global-isr")]
pub mod isr;
pub mod phy;
pub mod protocol;

#[cfg(test)]
pub(crate) mod testutil;
