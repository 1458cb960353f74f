//! Device registry and session factory.
//!
//! `UsbXpress` owns the backend, the enumeration snapshot, and the shared
//! timeout configuration. Device ordinals handed to [`UsbXpress::open`] and
//! [`UsbXpress::product_string`] index into the snapshot built by the most
//! recent [`UsbXpress::device_count`] call; neither re-scans the bus.

use tracing::{debug, instrument};

use crate::config::{SharedTimeouts, Timeouts};
use crate::endpoints::resolve_bulk_endpoints;
use crate::error::XpressError;
use crate::protocol::{
    DEVICE_ENABLE_VALUE, INTERFACE_OPEN, REQ_DEVICE_ENABLE, REQ_INTERFACE_STATE, SI_PRODUCT_ID,
    SI_VENDOR_ID,
};
use crate::session::Session;
use crate::transport::{DeviceSummary, NusbBackend, UsbBackend, UsbConnection};

/// Which descriptor field [`UsbXpress::product_string`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductString {
    SerialNumber,
    Description,
    LinkName,
    Vid,
    Pid,
}

/// Entry point of the API: enumerates devices and opens sessions on them.
pub struct UsbXpress<B: UsbBackend> {
    backend: B,
    snapshot: Vec<DeviceSummary>,
    timeouts: SharedTimeouts,
}

impl UsbXpress<NusbBackend> {
    /// A context over the real USB bus.
    pub fn new() -> Self {
        Self::with_backend(NusbBackend::new())
    }
}

impl Default for UsbXpress<NusbBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: UsbBackend> UsbXpress<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            snapshot: Vec::new(),
            timeouts: SharedTimeouts::default(),
        }
    }

    /// Re-enumerate the bus and return the number of devices found.
    ///
    /// This is the only call that refreshes the snapshot; ordinals used
    /// with [`open`](Self::open) and [`product_string`](Self::product_string)
    /// are positions in the snapshot this call built.
    pub fn device_count(&mut self) -> Result<usize, XpressError> {
        self.snapshot = self.backend.enumerate()?;
        debug!(count = self.snapshot.len(), "enumerated devices");
        Ok(self.snapshot.len())
    }

    /// A descriptor field of the device at `index` in the snapshot.
    ///
    /// `Vid` and `Pid` format as four-digit uppercase hex for any device.
    /// The string selectors report the strings captured at enumeration time
    /// for the supported vendor/product pair, and an empty string for
    /// anything else.
    pub fn product_string(
        &self,
        index: usize,
        selector: ProductString,
    ) -> Result<String, XpressError> {
        let device = self
            .snapshot
            .get(index)
            .ok_or(XpressError::DeviceNotFound { index })?;

        match selector {
            ProductString::Vid => return Ok(format!("{:04X}", device.vendor_id)),
            ProductString::Pid => return Ok(format!("{:04X}", device.product_id)),
            _ => {}
        }

        if device.vendor_id != SI_VENDOR_ID || device.product_id != SI_PRODUCT_ID {
            return Ok(String::new());
        }
        let field = match selector {
            ProductString::SerialNumber => &device.serial_number,
            ProductString::Description => &device.description,
            ProductString::LinkName => &device.link_name,
            ProductString::Vid | ProductString::Pid => unreachable!(),
        };
        Ok(field.clone().unwrap_or_default())
    }

    /// Open a session on the device at `index` in the snapshot.
    ///
    /// Resolves the bulk endpoint pair, claims the interface, performs the
    /// vendor bring-up sequence, and primes the receive buffer. Every
    /// failure path before the session exists unwinds by dropping the
    /// partially-opened connection.
    #[instrument(skip(self))]
    pub fn open(&mut self, index: usize) -> Result<Session<B::Connection>, XpressError> {
        if index >= self.snapshot.len() {
            return Err(XpressError::DeviceNotFound { index });
        }

        let mut conn = self.backend.open(index)?;
        let shape = conn.interface_shape()?;
        let endpoints = resolve_bulk_endpoints(&shape)?;
        conn.claim_interface(shape.interface_number)?;

        // Bring-up is best-effort: some firmware revisions stall parts of
        // the sequence and still transfer fine afterwards.
        let control_timeout = self.timeouts.get().write();
        if let Err(err) =
            conn.vendor_control(REQ_DEVICE_ENABLE, DEVICE_ENABLE_VALUE, 0, control_timeout)
        {
            debug!(%err, "device enable request failed");
        }
        for endpoint in [endpoints.input, endpoints.output] {
            if let Err(err) = conn.clear_halt(endpoint) {
                debug!(%err, endpoint, "clear halt failed");
            }
        }
        if let Err(err) =
            conn.vendor_control(REQ_INTERFACE_STATE, INTERFACE_OPEN, 0, control_timeout)
        {
            debug!(%err, "interface open request failed");
        }

        debug!(
            interface = shape.interface_number,
            input = format_args!("{:#04x}", endpoints.input),
            output = format_args!("{:#04x}", endpoints.output),
            "session opened"
        );
        Ok(Session::new(
            conn,
            shape.interface_number,
            endpoints,
            self.timeouts.clone(),
        ))
    }

    /// Replace the read/write timeouts, effective immediately for every
    /// open session as well as future ones.
    pub fn set_timeouts(&self, read_ms: u64, write_ms: u64) {
        self.timeouts.set(Timeouts { read_ms, write_ms });
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{
        EndpointDirection, EndpointInfo, InterfaceShape, MockBackend, MockDevice, TransferKind,
        TransportError,
    };

    fn si_device() -> MockDevice {
        MockDevice::new()
    }

    fn foreign_device() -> MockDevice {
        MockDevice::new().with_summary(DeviceSummary {
            vendor_id: 0x1234,
            product_id: 0x5678,
            serial_number: Some("other".into()),
            description: Some("Other Device".into()),
            link_name: None,
        })
    }

    #[test]
    fn test_device_count_builds_snapshot() {
        let backend = MockBackend::with_devices(vec![si_device(), foreign_device()]);
        let mut ctx = UsbXpress::with_backend(backend);
        assert_eq!(ctx.device_count().unwrap(), 2);
    }

    #[test]
    fn test_open_requires_a_prior_enumeration() {
        let backend = MockBackend::with_devices(vec![si_device()]);
        let mut ctx = UsbXpress::with_backend(backend);

        // The device exists on the bus, but the snapshot is empty until
        // device_count runs.
        assert!(matches!(
            ctx.open(0),
            Err(XpressError::DeviceNotFound { index: 0 })
        ));
        ctx.device_count().unwrap();
        assert!(ctx.open(0).is_ok());
    }

    #[test]
    fn test_open_out_of_range() {
        let mut ctx = UsbXpress::with_backend(MockBackend::empty());
        ctx.device_count().unwrap();
        assert!(matches!(
            ctx.open(3),
            Err(XpressError::DeviceNotFound { index: 3 })
        ));
    }

    #[test]
    fn test_open_performs_bring_up_sequence() {
        let device = si_device();
        let state = device.state();
        let mut ctx = UsbXpress::with_backend(MockBackend::with_devices(vec![device]));
        ctx.device_count().unwrap();

        let _session = ctx.open(0).unwrap();
        assert_eq!(state.claims(), vec![0]);
        assert_eq!(
            state.controls(),
            vec![
                (REQ_DEVICE_ENABLE, DEVICE_ENABLE_VALUE, 0),
                (REQ_INTERFACE_STATE, INTERFACE_OPEN, 0),
            ]
        );
        assert_eq!(state.cleared_halts(), vec![0x81, 0x01]);
    }

    #[test]
    fn test_open_rejects_device_without_bulk_pair() {
        let device = si_device().with_shape(InterfaceShape {
            interface_number: 0,
            endpoints: vec![EndpointInfo {
                address: 0x81,
                kind: TransferKind::Bulk,
                direction: EndpointDirection::In,
            }],
        });
        let state = device.state();
        let mut ctx = UsbXpress::with_backend(MockBackend::with_devices(vec![device]));
        ctx.device_count().unwrap();

        assert!(matches!(ctx.open(0), Err(XpressError::UnsupportedDevice(_))));
        // Nothing was claimed, so nothing leaked.
        assert!(state.claims().is_empty());
        assert_eq!(state.releases(), 0);
    }

    #[test]
    fn test_open_unwinds_on_claim_failure() {
        let device = si_device().fail_claim();
        let state = device.state();
        let mut ctx = UsbXpress::with_backend(MockBackend::with_devices(vec![device]));
        ctx.device_count().unwrap();

        assert!(matches!(
            ctx.open(0),
            Err(XpressError::Transport(
                TransportError::ClaimInterfaceFailed { .. }
            ))
        ));
        // No bring-up traffic after the failed claim.
        assert!(state.controls().is_empty());
        assert!(state.cleared_halts().is_empty());
    }

    #[test]
    fn test_product_string_for_supported_device() {
        let mut ctx = UsbXpress::with_backend(MockBackend::with_devices(vec![si_device()]));
        ctx.device_count().unwrap();

        assert_eq!(ctx.product_string(0, ProductString::Vid).unwrap(), "10C4");
        assert_eq!(ctx.product_string(0, ProductString::Pid).unwrap(), "8149");
        assert_eq!(
            ctx.product_string(0, ProductString::SerialNumber).unwrap(),
            "0001"
        );
        assert_eq!(
            ctx.product_string(0, ProductString::Description).unwrap(),
            "USBXpress Device"
        );
        assert_eq!(
            ctx.product_string(0, ProductString::LinkName).unwrap(),
            "Silicon Labs"
        );
    }

    #[test]
    fn test_product_string_for_foreign_device() {
        let mut ctx = UsbXpress::with_backend(MockBackend::with_devices(vec![foreign_device()]));
        ctx.device_count().unwrap();

        // Vid/Pid always format; the string selectors stay empty for
        // devices outside the supported vendor/product pair.
        assert_eq!(ctx.product_string(0, ProductString::Vid).unwrap(), "1234");
        assert_eq!(ctx.product_string(0, ProductString::Pid).unwrap(), "5678");
        assert_eq!(ctx.product_string(0, ProductString::SerialNumber).unwrap(), "");
        assert_eq!(ctx.product_string(0, ProductString::Description).unwrap(), "");
    }

    #[test]
    fn test_product_string_out_of_range() {
        let ctx = UsbXpress::with_backend(MockBackend::empty());
        assert!(matches!(
            ctx.product_string(0, ProductString::Vid),
            Err(XpressError::DeviceNotFound { index: 0 })
        ));
    }

    #[test]
    fn test_set_timeouts_applies_to_open_sessions() {
        let device = si_device();
        let state = device.state();
        let mut ctx = UsbXpress::with_backend(MockBackend::with_devices(vec![device]));
        ctx.device_count().unwrap();
        let mut session = ctx.open(0).unwrap();

        ctx.set_timeouts(500, 250);
        assert_eq!(ctx.timeouts().read_ms, 500);
        assert_eq!(ctx.timeouts().write_ms, 250);

        // The already open session picks up the new write timeout on its
        // next operation; the mock just records the write.
        state.queue_read(&[]);
        session.write(b"x").unwrap();
        assert_eq!(state.writes(), vec![b"x".to_vec()]);
    }
}
