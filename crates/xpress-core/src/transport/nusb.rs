//! nusb-based production transport.
//!
//! nusb 0.2 API patterns used here:
//! - `list_devices().wait()` for device enumeration
//! - `device_info.open().wait()` to open a device
//! - `device.claim_interface(n).wait()` to claim an interface
//! - `interface.endpoint::<Bulk, In/Out>(addr)` plus `.reader()` /
//!   `.writer()` with per-call timeouts for blocking I/O

use std::io::{Read, Write};
use std::time::Duration;

use nusb::transfer::{Bulk, ControlOut, ControlType, In, Out, Recipient};
use nusb::{Interface, MaybeFuture, list_devices};
use tracing::{debug, instrument};

use super::traits::{
    DeviceSummary, EndpointDirection, EndpointInfo, InterfaceShape, TransferKind, TransportError,
    UsbBackend, UsbConnection,
};

/// Backend over the host's USB stack via nusb.
#[derive(Default)]
pub struct NusbBackend {
    devices: Vec<nusb::DeviceInfo>,
}

impl NusbBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsbBackend for NusbBackend {
    type Connection = NusbConnection;

    #[instrument(level = "debug", skip(self))]
    fn enumerate(&mut self) -> Result<Vec<DeviceSummary>, TransportError> {
        self.devices = list_devices()
            .wait()
            .map_err(|e| TransportError::EnumerationFailed(e.to_string()))?
            .collect();
        debug!(count = self.devices.len(), "Enumerated devices");
        Ok(self.devices.iter().map(summarize).collect())
    }

    fn open(&mut self, index: usize) -> Result<NusbConnection, TransportError> {
        let info = self
            .devices
            .get(index)
            .ok_or(TransportError::DeviceNotFound { index })?;
        let device = info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;
        Ok(NusbConnection {
            device,
            interface: None,
        })
    }
}

fn summarize(info: &nusb::DeviceInfo) -> DeviceSummary {
    DeviceSummary {
        vendor_id: info.vendor_id(),
        product_id: info.product_id(),
        serial_number: info.serial_number().map(str::to_owned),
        description: info.product_string().map(str::to_owned),
        link_name: info.manufacturer_string().map(str::to_owned),
    }
}

/// An open nusb device, with the claimed interface once a session binds it.
pub struct NusbConnection {
    device: nusb::Device,
    interface: Option<Interface>,
}

impl NusbConnection {
    fn interface(&self) -> Result<&Interface, TransportError> {
        self.interface.as_ref().ok_or(TransportError::NotClaimed)
    }
}

impl UsbConnection for NusbConnection {
    fn interface_shape(&self) -> Result<InterfaceShape, TransportError> {
        let config = self
            .device
            .configurations()
            .next()
            .ok_or_else(|| TransportError::OpenFailed("device has no configuration".into()))?;
        let iface = config
            .interfaces()
            .next()
            .ok_or_else(|| TransportError::OpenFailed("device has no interface".into()))?;
        let interface_number = iface.interface_number();
        let alt = iface
            .alt_settings()
            .next()
            .ok_or_else(|| TransportError::OpenFailed("interface has no alt setting".into()))?;

        let endpoints = alt
            .endpoints()
            .map(|ep| EndpointInfo {
                address: ep.address(),
                kind: match ep.transfer_type() {
                    nusb::descriptors::TransferType::Control => TransferKind::Control,
                    nusb::descriptors::TransferType::Isochronous => TransferKind::Isochronous,
                    nusb::descriptors::TransferType::Bulk => TransferKind::Bulk,
                    nusb::descriptors::TransferType::Interrupt => TransferKind::Interrupt,
                },
                direction: match ep.direction() {
                    nusb::transfer::Direction::In => EndpointDirection::In,
                    nusb::transfer::Direction::Out => EndpointDirection::Out,
                },
            })
            .collect();

        Ok(InterfaceShape {
            interface_number,
            endpoints,
        })
    }

    #[instrument(level = "debug", skip(self))]
    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError> {
        let iface = self.device.claim_interface(interface).wait().map_err(|e| {
            TransportError::ClaimInterfaceFailed {
                interface,
                message: e.to_string(),
            }
        })?;
        self.interface = Some(iface);
        Ok(())
    }

    fn release_interface(&mut self, _interface: u8) -> Result<(), TransportError> {
        // nusb releases the interface when the handle is dropped.
        self.interface = None;
        Ok(())
    }

    #[instrument(level = "trace", skip(self, buf), fields(max_len = buf.len()))]
    fn bulk_read(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let ep = self
            .interface()?
            .endpoint::<Bulk, In>(endpoint)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        let mut reader = ep.reader(buf.len()).with_read_timeout(timeout);

        match reader.read(buf) {
            Ok(n) => {
                debug!(bytes_read = n, "Bulk-in complete");
                Ok(n)
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
            Err(e) => Err(TransportError::ReadFailed(e.to_string())),
        }
    }

    #[instrument(level = "trace", skip(self, data), fields(len = data.len()))]
    fn bulk_write(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let ep = self
            .interface()?
            .endpoint::<Bulk, Out>(endpoint)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        let mut writer = ep.writer(data.len().max(64)).with_write_timeout(timeout);

        let mut written = 0;
        while written < data.len() {
            match writer.write(&data[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                // Timeout folds into the short count reported to the caller.
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(TransportError::WriteFailed(e.to_string())),
            }
        }
        match writer.flush() {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => return Err(TransportError::WriteFailed(e.to_string())),
        }
        debug!(bytes_written = written, "Bulk-out complete");
        Ok(written)
    }

    fn vendor_control(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.interface()?
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index,
                    data: &[],
                },
                timeout,
            )
            .wait()
            .map_err(|e| TransportError::ControlFailed {
                request,
                message: e.to_string(),
            })
    }

    fn clear_halt(&mut self, endpoint: u8) -> Result<(), TransportError> {
        let iface = self.interface()?;
        let failed = |e: nusb::Error| TransportError::ClearHaltFailed {
            endpoint,
            message: e.to_string(),
        };
        // Direction bit selects the endpoint type parameter.
        if endpoint & 0x80 != 0 {
            let mut ep = iface.endpoint::<Bulk, In>(endpoint).map_err(failed)?;
            ep.clear_halt().wait().map_err(failed)
        } else {
            let mut ep = iface.endpoint::<Bulk, Out>(endpoint).map_err(failed)?;
            ep.clear_halt().wait().map_err(failed)
        }
    }
}
