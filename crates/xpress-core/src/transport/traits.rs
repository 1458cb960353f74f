//! USB transport layer abstraction.
//!
//! Defines the `UsbBackend` / `UsbConnection` capability traits the session
//! core is written against, allowing different implementations (nusb, mock).

use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("device {index} not found in the enumeration snapshot")]
    DeviceNotFound { index: usize },

    #[error("enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error("failed to open device: {0}")]
    OpenFailed(String),

    #[error("failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("no interface claimed")]
    NotClaimed,

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("control request {request:#04x} failed: {message}")]
    ControlFailed { request: u8, message: String },

    #[error("clear halt on endpoint {endpoint:#04x} failed: {message}")]
    ClearHaltFailed { endpoint: u8, message: String },

    #[error("device disconnected")]
    Disconnected,

    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Direction of an endpoint, from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointDirection {
    In,
    Out,
}

impl fmt::Display for EndpointDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointDirection::In => write!(f, "in"),
            EndpointDirection::Out => write!(f, "out"),
        }
    }
}

/// Transfer type from an endpoint descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// One endpoint descriptor of an interface shape.
#[derive(Debug, Clone, Copy)]
pub struct EndpointInfo {
    pub address: u8,
    pub kind: TransferKind,
    pub direction: EndpointDirection,
}

/// Descriptor data of the first configuration / first interface / first
/// alternate setting of an opened device.
#[derive(Debug, Clone)]
pub struct InterfaceShape {
    pub interface_number: u8,
    pub endpoints: Vec<EndpointInfo>,
}

/// Identity and descriptor strings captured at enumeration time.
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
    pub description: Option<String>,
    pub link_name: Option<String>,
}

/// Device discovery and opening.
///
/// The backend owns the transport-level snapshot; ordinals passed to `open`
/// index into the snapshot built by the most recent `enumerate` call.
pub trait UsbBackend: Send {
    type Connection: UsbConnection;

    /// Rebuild the device snapshot, returning it in bus order.
    fn enumerate(&mut self) -> Result<Vec<DeviceSummary>, TransportError>;

    /// Open the device at `index` in the current snapshot.
    fn open(&mut self, index: usize) -> Result<Self::Connection, TransportError>;
}

/// An open device connection.
///
/// Dropping a connection releases any claimed interface along with the
/// connection itself.
pub trait UsbConnection: Send {
    /// Endpoint descriptors of the first config / interface / alt setting.
    fn interface_shape(&self) -> Result<InterfaceShape, TransportError>;

    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError>;

    fn release_interface(&mut self, interface: u8) -> Result<(), TransportError>;

    /// Bulk-in transfer into `buf`; `Err(Timeout)` when nothing arrives in
    /// time.
    fn bulk_read(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Bulk-out transfer of `data`. A timeout folds into a short byte
    /// count rather than an error.
    fn bulk_write(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Vendor-class OUT control request with no data stage.
    fn vendor_control(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    fn clear_halt(&mut self, endpoint: u8) -> Result<(), TransportError>;
}
