//! USB transport layer: capability traits plus the nusb production backend
//! and a scriptable mock for tests.

pub mod mock;
pub mod nusb;
pub mod traits;

pub use mock::{MockBackend, MockConnection, MockDevice, MockState};
pub use self::nusb::{NusbBackend, NusbConnection};
pub use traits::{
    DeviceSummary, EndpointDirection, EndpointInfo, InterfaceShape, TransferKind, TransportError,
    UsbBackend, UsbConnection,
};
