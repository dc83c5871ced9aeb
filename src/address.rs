//! Data Link layer physical addressing.
//!
//! Physical addressing provides the filter mechanism for nodes in a
//! network. Each node carries a Personal Area Network (PAN) identifier
//! and a unique hardware address; an End Point additionally tracks the
//! address of the one Gateway it is linked to. The all-zero value is the
//! broadcast address for both kinds of identifier.
//!
//! The registry owns this local addressing state and its lifecycle:
//!
//! - [`AddressRegistry::init_end_point`] / [`AddressRegistry::init_gateway`]
//!   set the startup identity and configure hardware address filtering.
//! - [`AddressRegistry::link_establish`] / [`AddressRegistry::link_destroy`]
//!   record and erase the End Point's association with a Gateway.
//! - An optional [`Backup`] hook mirrors the state to non-volatile storage
//!   on every mutation, so a node can recover its link after power loss.
//!
//! There are no recoverable errors here: an absent backup hook silently
//! disables persistence, and every other operation is infallible.

use crate::consts::{
    BACKUP_RECORD_LEN, BROADCAST_BYTE, NODE_ADDRESS_LEN, PAN_ID_LEN,
};
use core::cmp::Ordering;

/// A Personal Area Network (PAN) identifier.
pub type PanId = [u8; PAN_ID_LEN];

/// A node hardware address.
pub type NodeAddress = [u8; NODE_ADDRESS_LEN];

/// The broadcast PAN identifier (every byte is the broadcast sentinel).
pub const BROADCAST_PAN_ID: PanId = [BROADCAST_BYTE; PAN_ID_LEN];

/// The broadcast node address (every byte is the broadcast sentinel).
pub const BROADCAST_ADDRESS: NodeAddress = [BROADCAST_BYTE; NODE_ADDRESS_LEN];

/// Returns true iff every byte of `addr` equals the broadcast sentinel.
pub fn is_broadcast(addr: &[u8]) -> bool {
    addr.iter().all(|&b| b == BROADCAST_BYTE)
}

/// Lexicographic byte comparison of two addresses.
///
/// Only the equality of the result is relied upon by the protocol; the
/// ordering sign is never used.
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// Non-volatile backup of the local addressing record.
///
/// The record is the flat layout
/// `{ fixed: 1 byte, pan id, local address, remote address }`
/// ([`BACKUP_RECORD_LEN`] bytes), always written and read as a whole.
/// Typical implementations wrap an EEPROM page or a flash segment.
pub trait Backup {
    /// Reads the last persisted record into `record`. Returns false when
    /// no record has been persisted yet (e.g. erased flash).
    fn read(&mut self, record: &mut [u8; BACKUP_RECORD_LEN]) -> bool;

    /// Persists `record`, replacing any previous one. Returns the success
    /// of the write.
    fn write(&mut self, record: &[u8; BACKUP_RECORD_LEN]) -> bool;
}

impl<B: Backup + ?Sized> Backup for &mut B {
    fn read(&mut self, record: &mut [u8; BACKUP_RECORD_LEN]) -> bool {
        (**self).read(record)
    }

    fn write(&mut self, record: &[u8; BACKUP_RECORD_LEN]) -> bool {
        (**self).write(record)
    }
}

/// A [`Backup`] implementation that never persists anything.
///
/// Used where no backup hook is wanted — a Gateway, or an End Point that
/// re-links on every boot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBackup;

impl Backup for NoBackup {
    fn read(&mut self, _record: &mut [u8; BACKUP_RECORD_LEN]) -> bool {
        false
    }

    fn write(&mut self, _record: &[u8; BACKUP_RECORD_LEN]) -> bool {
        false
    }
}

/// Hardware address-filter hooks.
///
/// Physical filtering is keyed on a single byte — the low-order byte of
/// the PAN identifier — so that foreign-PAN traffic is dropped by the
/// radio itself before it ever raises an interrupt. Implemented by the
/// physical bridge.
pub trait AddressFilter {
    /// Sets the hardware device address to filter on and enables
    /// filtering.
    fn enable_address_filter(&mut self, device_addr: u8);

    /// Disables hardware address filtering.
    fn disable_address_filter(&mut self);
}

/// Local node addressing information and its optional backup hook.
///
/// One instance exists per node. The state is mutated only by the link
/// lifecycle operations, which run with the exclusion the surrounding
/// interrupt context provides; the registry itself is not reentrant.
#[derive(Debug)]
pub struct AddressRegistry<B: Backup> {
    /// Local PAN identifier fixed flag. True once a non-broadcast PAN id
    /// was configured at startup; a fixed PAN id is never overwritten by
    /// a link.
    fixed: bool,
    /// Personal Area Network (PAN) identifier.
    pan_id: PanId,
    /// Local unique physical address.
    address: NodeAddress,
    /// Remote Gateway address. The broadcast address means "no link". An
    /// End Point may only communicate with one Gateway at any time.
    remote: NodeAddress,
    backup: Option<B>,
}

impl<B: Backup> AddressRegistry<B> {
    /// Initializes End Point addressing.
    ///
    /// If `pan_id` is not the broadcast identifier the node is using
    /// fixed addressing (the PAN is known ahead of time): the registry
    /// marks the PAN id fixed and enables hardware filtering on its
    /// low-order byte. Otherwise filtering stays disabled until a link is
    /// established and the PAN id is learned from the Gateway.
    ///
    /// A backup hook of `None` disables persistence; this is not an
    /// error.
    pub fn init_end_point<F: AddressFilter>(
        pan_id: PanId,
        address: NodeAddress,
        backup: Option<B>,
        filter: &mut F,
    ) -> Self {
        let fixed = !is_broadcast(&pan_id);

        if fixed {
            filter.enable_address_filter(pan_id[0]);
        } else {
            // No filtering until a link is established.
            filter.disable_address_filter();
        }

        Self {
            fixed,
            pan_id,
            address,
            remote: BROADCAST_ADDRESS,
            backup,
        }
    }

    /// Initializes Gateway addressing.
    ///
    /// A Gateway's PAN identifier is mandatory, so hardware filtering is
    /// enabled immediately and the PAN id is permanently fixed. Gateways
    /// do not hold remote link state and never persist.
    pub fn init_gateway<F: AddressFilter>(
        pan_id: PanId,
        address: NodeAddress,
        filter: &mut F,
    ) -> Self {
        filter.enable_address_filter(pan_id[0]);

        Self {
            fixed: true,
            pan_id,
            address,
            remote: BROADCAST_ADDRESS,
            backup: None,
        }
    }

    /// The local PAN identifier.
    pub fn pan_id(&self) -> &PanId {
        &self.pan_id
    }

    /// The local node address.
    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    /// The linked remote (Gateway) address. Broadcast when unlinked.
    pub fn remote(&self) -> &NodeAddress {
        &self.remote
    }

    /// Whether the local PAN identifier is fixed.
    pub fn fixed(&self) -> bool {
        self.fixed
    }

    /// Returns true iff the local node (an End Point) holds a remote
    /// Gateway address.
    pub fn link_exists(&self) -> bool {
        !is_broadcast(&self.remote)
    }

    /// Records a link with a Gateway. End Point only.
    ///
    /// If the local PAN id is not fixed, the peer's `pan_id` is adopted
    /// and hardware filtering is re-keyed to it. The `remote` address is
    /// always recorded. The registry does not check for an existing link;
    /// the frame scheduler's validator has already rejected link requests
    /// that would overwrite one.
    pub fn link_establish<F: AddressFilter>(
        &mut self,
        pan_id: PanId,
        remote: NodeAddress,
        filter: &mut F,
    ) {
        if !self.fixed {
            self.pan_id = pan_id;
            // Physical filtering is keyed off the PAN identifier's
            // low-order byte.
            filter.enable_address_filter(self.pan_id[0]);
        }
        self.remote = remote;

        #[cfg(feature = "log")]
        log::debug!("link established, pan fixed: {}", self.fixed);

        self.persist();
    }

    /// Erases the link with the Gateway. End Point only. Idempotent.
    ///
    /// If the local PAN id is not fixed it is reset to broadcast and
    /// hardware filtering is disabled until the next link. The remote
    /// address is unconditionally reset to broadcast.
    pub fn link_destroy<F: AddressFilter>(&mut self, filter: &mut F) {
        if !self.fixed {
            self.pan_id = BROADCAST_PAN_ID;
            filter.disable_address_filter();
        }
        self.remote = BROADCAST_ADDRESS;

        #[cfg(feature = "log")]
        log::debug!("link destroyed");

        self.persist();
    }

    /// Restores the addressing record persisted by a previous boot.
    ///
    /// Reads the backup record and, when one exists, replaces the local
    /// addressing state with it and re-applies the hardware filter state
    /// it implies. Returns whether a record was restored.
    pub fn restore<F: AddressFilter>(&mut self, filter: &mut F) -> bool {
        let mut record = [0u8; BACKUP_RECORD_LEN];
        let read = match self.backup.as_mut() {
            Some(backup) => backup.read(&mut record),
            None => false,
        };
        if !read {
            return false;
        }

        self.apply_record(&record);
        if self.fixed || self.link_exists() {
            filter.enable_address_filter(self.pan_id[0]);
        } else {
            filter.disable_address_filter();
        }

        true
    }

    /// Serializes the local addressing state into the flat backup record.
    fn record(&self) -> [u8; BACKUP_RECORD_LEN] {
        let mut record = [0u8; BACKUP_RECORD_LEN];
        record[0] = self.fixed as u8;
        let mut at = 1;
        record[at..at + PAN_ID_LEN].copy_from_slice(&self.pan_id);
        at += PAN_ID_LEN;
        record[at..at + NODE_ADDRESS_LEN].copy_from_slice(&self.address);
        at += NODE_ADDRESS_LEN;
        record[at..at + NODE_ADDRESS_LEN].copy_from_slice(&self.remote);
        record
    }

    /// Replaces the local addressing state with a deserialized record.
    fn apply_record(&mut self, record: &[u8; BACKUP_RECORD_LEN]) {
        self.fixed = record[0] != 0;
        let mut at = 1;
        self.pan_id.copy_from_slice(&record[at..at + PAN_ID_LEN]);
        at += PAN_ID_LEN;
        self.address
            .copy_from_slice(&record[at..at + NODE_ADDRESS_LEN]);
        at += NODE_ADDRESS_LEN;
        self.remote
            .copy_from_slice(&record[at..at + NODE_ADDRESS_LEN]);
    }

    /// Writes the current state to the non-volatile backup, if one was
    /// provided.
    fn persist(&mut self) {
        let record = self.record();
        if let Some(backup) = self.backup.as_mut() {
            let _ = backup.write(&record);
        }
    }
}
