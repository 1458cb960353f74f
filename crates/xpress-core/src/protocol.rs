//! Fixed protocol constants for the supported bulk-transfer parts.
//!
//! The vendor control codes are what the device firmware keys on and must be
//! reproduced exactly.

use std::time::Duration;

/// Silicon Labs vendor ID.
pub const SI_VENDOR_ID: u16 = 0x10C4;

/// Product ID of the supported bulk-transfer part.
pub const SI_PRODUCT_ID: u16 = 0x8149;

/// Read-side buffer capacity per session, in bytes.
pub const RX_BUFFER_CAPACITY: usize = 4096;

/// Vendor request: device enable, sent once after claiming the interface.
pub const REQ_DEVICE_ENABLE: u8 = 0x00;

/// `wValue` accompanying [`REQ_DEVICE_ENABLE`].
pub const DEVICE_ENABLE_VALUE: u16 = 0xFFFF;

/// Vendor request: interface open/close state.
pub const REQ_INTERFACE_STATE: u8 = 0x02;

/// `wValue` marking the interface opened.
pub const INTERFACE_OPEN: u16 = 0x0002;

/// `wValue` marking the interface closed.
pub const INTERFACE_CLOSE: u16 = 0x0004;

/// Default read and write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Short timeout for opportunistic buffer fills (buffer priming and the
/// fills bracketing a write). Deliberately much shorter than the configured
/// read timeout: these fills only absorb bytes the device already queued.
pub const OPPORTUNISTIC_TIMEOUT: Duration = Duration::from_millis(100);
