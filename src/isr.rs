//! Interrupt-integration helpers for a global protocol instance.
//!
//! The protocol core has no global state: the application owns its
//! [`EndPoint`](crate::protocol::EndPoint) or
//! [`Gateway`](crate::protocol::Gateway) instance. Interrupt service
//! routines, however, need to reach that instance from a bare `fn`, so
//! this module provides the usual embedded pattern: a `static` slot
//! guarded by a `critical_section::Mutex`, plus macros to declare it,
//! fill it, and dispatch the two engine entry points from the vectors.
//!
//! ```ignore
//! init_link_node!(NODE, EndPoint<MyRadio, NoBackup>);
//!
//! fn main() -> ! {
//!     let node = EndPoint::new(radio, setup);
//!     setup_link_node!(NODE, node);
//!     loop { mcu_sleep(); }
//! }
//!
//! #[interrupt]
//! fn GDO0() {
//!     let event = read_port_flags();
//!     let _ = link_node_engine!(NODE, event, &mut EVENTS);
//! }
//!
//! #[interrupt]
//! fn TIMER1() {
//!     link_node_tick!(NODE, &mut EVENTS);
//! }
//! ```
//!
//! Only one protocol instance should exist per device; the engine entry
//! points are not reentrant, which the critical section enforces.

use core::cell::RefCell;
use critical_section::Mutex;

/// Creates the empty global slot a protocol instance is stored in.
///
/// Usually invoked through [`init_link_node!`](crate::init_link_node),
/// which declares the `static` as well.
pub const fn global_node_init<T>() -> Mutex<RefCell<Option<T>>> {
    Mutex::new(RefCell::new(None))
}

/// Stores a protocol instance in a global slot declared with
/// [`init_link_node!`](crate::init_link_node).
pub fn global_node_setup<T>(global: &'static Mutex<RefCell<Option<T>>>, node: T) {
    critical_section::with(|cs| {
        let _ = global.borrow(cs).replace(Some(node));
    });
}

/// Declares a static global protocol-instance slot protected by a
/// `critical_section` mutex.
///
/// # Arguments
/// - `$name`: name of the `static` to declare
/// - `$node`: the concrete protocol instance type stored in it
///
/// # Example
/// ```ignore
/// init_link_node!(NODE, Gateway<MyRadio>);
/// ```
#[macro_export]
macro_rules! init_link_node {
    ( $name:ident, $node:ty ) => {
        pub static $name: $crate::critical_section::Mutex<
            core::cell::RefCell<Option<$node>>,
        > = $crate::critical_section::Mutex::new(core::cell::RefCell::new(None));
    };
}

/// Stores a constructed protocol instance in the slot declared with
/// [`init_link_node!`].
///
/// # Example
/// ```ignore
/// setup_link_node!(NODE, EndPoint::new(radio, setup));
/// ```
#[macro_export]
macro_rules! setup_link_node {
    ( $name:ident, $node:expr ) => {
        $crate::critical_section::with(|cs| {
            let _ = $name.borrow(cs).replace(Some($node));
        });
    };
}

/// Dispatches a GDO/edge interrupt to the global protocol instance.
///
/// Evaluates to the engine's status byte; `0` if the instance has not
/// been set up yet.
///
/// # Example
/// ```ignore
/// #[interrupt]
/// fn GDO0() {
///     let _ = link_node_engine!(NODE, read_port_flags(), &mut EVENTS);
/// }
/// ```
#[macro_export]
macro_rules! link_node_engine {
    ( $name:ident, $event:expr, $events:expr ) => {
        $crate::critical_section::with(|cs| {
            match $name.borrow(cs).borrow_mut().as_mut() {
                Some(node) => node.engine($event, $events),
                None => 0,
            }
        })
    };
}

/// Dispatches a millisecond timer tick to the global protocol instance.
///
/// Safe to call before setup; it silently does nothing until the
/// instance exists.
///
/// # Example
/// ```ignore
/// #[interrupt]
/// fn TIMER1() {
///     link_node_tick!(NODE, &mut EVENTS);
/// }
/// ```
#[macro_export]
macro_rules! link_node_tick {
    ( $name:ident, $events:expr ) => {
        $crate::critical_section::with(|cs| {
            if let Some(node) = $name.borrow(cs).borrow_mut().as_mut() {
                node.engine_tick($events);
            }
        });
    };
}
