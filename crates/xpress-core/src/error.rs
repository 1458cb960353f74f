//! Error taxonomy of the public session API.
//!
//! Two kinds from the original driver contract have no runtime
//! representation here: invalid-handle (a closed session cannot be used,
//! because `close` consumes it) and write-timed-out (a write reports the
//! transferred byte count instead; a timeout shows up as a short count).

use thiserror::Error;

use crate::endpoints::ResolveError;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum XpressError {
    /// Ordinal index outside the most recent enumeration snapshot.
    #[error("device {index} not found in the last enumeration")]
    DeviceNotFound { index: usize },

    /// The device at the requested index does not expose the expected bulk
    /// endpoint pair.
    #[error("unsupported device: {0}")]
    UnsupportedDevice(#[from] ResolveError),

    /// Transport-level failure while constructing or using a session.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A read produced zero bytes within the configured timeout.
    #[error("read timed out with no data")]
    ReadTimedOut,
}
