//! Session-oriented host API for Silicon Labs USBXpress bulk-transfer parts.
//!
//! Enumerate devices, open a session on one, and exchange bytes over its
//! bulk endpoint pair. Reads are served through a fixed-capacity FIFO that
//! reconciles chunked, timeout-bound bulk transfers with a "read up to N
//! bytes" contract.
//!
//! ```no_run
//! use xpress_core::{ProductString, UsbXpress};
//!
//! # fn main() -> Result<(), xpress_core::XpressError> {
//! let mut ctx = UsbXpress::new();
//! let count = ctx.device_count()?;
//! println!("{count} device(s)");
//!
//! let serial = ctx.product_string(0, ProductString::SerialNumber)?;
//! let mut session = ctx.open(0)?;
//! session.write(b"hello")?;
//! let mut buf = [0u8; 64];
//! let n = session.read(&mut buf)?;
//! println!("{serial}: {:02X?}", &buf[..n]);
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod config;
pub mod context;
pub mod endpoints;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::{ConfigError, SharedTimeouts, Timeouts};
pub use context::{ProductString, UsbXpress};
pub use endpoints::{BulkEndpoints, ResolveError};
pub use error::XpressError;
pub use session::{QueueStatus, Session};
