//! Mock USB transport for testing.
//!
//! Scriptable device list with queued bulk-in chunks and captured writes,
//! control requests, clear-halts, and interface claim/release accounting.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{
    DeviceSummary, EndpointDirection, EndpointInfo, InterfaceShape, TransferKind, TransportError,
    UsbBackend, UsbConnection,
};
use crate::protocol::{SI_PRODUCT_ID, SI_VENDOR_ID};

/// Per-device state shared between the backend, the connection, and the
/// test, so the test can inspect traffic after the session is gone.
#[derive(Debug, Default)]
pub struct MockState {
    reads: Mutex<VecDeque<Vec<u8>>>,
    writes: Mutex<Vec<Vec<u8>>>,
    controls: Mutex<Vec<(u8, u16, u16)>>,
    cleared_halts: Mutex<Vec<u8>>,
    claims: Mutex<Vec<u8>>,
    releases: Mutex<usize>,
}

/// One scripted device in a [`MockBackend`].
pub struct MockDevice {
    summary: DeviceSummary,
    shape: InterfaceShape,
    state: Arc<MockState>,
    fail_claim: bool,
}

impl MockDevice {
    /// A supported-part device with the conventional bulk 0x81/0x01 pair.
    pub fn new() -> Self {
        Self {
            summary: DeviceSummary {
                vendor_id: SI_VENDOR_ID,
                product_id: SI_PRODUCT_ID,
                serial_number: Some("0001".into()),
                description: Some("USBXpress Device".into()),
                link_name: Some("Silicon Labs".into()),
            },
            shape: InterfaceShape {
                interface_number: 0,
                endpoints: vec![
                    EndpointInfo {
                        address: 0x81,
                        kind: TransferKind::Bulk,
                        direction: EndpointDirection::In,
                    },
                    EndpointInfo {
                        address: 0x01,
                        kind: TransferKind::Bulk,
                        direction: EndpointDirection::Out,
                    },
                ],
            },
            state: Arc::new(MockState::default()),
            fail_claim: false,
        }
    }

    pub fn with_summary(mut self, summary: DeviceSummary) -> Self {
        self.summary = summary;
        self
    }

    pub fn with_shape(mut self, shape: InterfaceShape) -> Self {
        self.shape = shape;
        self
    }

    /// Make `claim_interface` fail, for open-unwind tests.
    pub fn fail_claim(mut self) -> Self {
        self.fail_claim = true;
        self
    }

    /// Shared state handle for inspecting traffic.
    pub fn state(&self) -> Arc<MockState> {
        Arc::clone(&self.state)
    }

    /// Queue a bulk-in chunk to be served by upcoming reads.
    pub fn queue_read(&self, bytes: &[u8]) {
        self.state.reads.lock().unwrap().push_back(bytes.to_vec());
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    /// Queue a bulk-in chunk (same as [`MockDevice::queue_read`], usable
    /// once only the state handle is kept around).
    pub fn queue_read(&self, bytes: &[u8]) {
        self.reads.lock().unwrap().push_back(bytes.to_vec());
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    /// Control requests seen, as `(request, value, index)`.
    pub fn controls(&self) -> Vec<(u8, u16, u16)> {
        self.controls.lock().unwrap().clone()
    }

    pub fn cleared_halts(&self) -> Vec<u8> {
        self.cleared_halts.lock().unwrap().clone()
    }

    pub fn claims(&self) -> Vec<u8> {
        self.claims.lock().unwrap().clone()
    }

    pub fn releases(&self) -> usize {
        *self.releases.lock().unwrap()
    }
}

/// Backend over a scripted device list.
#[derive(Default)]
pub struct MockBackend {
    devices: Vec<MockDevice>,
}

impl MockBackend {
    /// A backend that enumerates no devices at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: Vec<MockDevice>) -> Self {
        Self { devices }
    }
}

impl UsbBackend for MockBackend {
    type Connection = MockConnection;

    fn enumerate(&mut self) -> Result<Vec<DeviceSummary>, TransportError> {
        Ok(self.devices.iter().map(|d| d.summary.clone()).collect())
    }

    fn open(&mut self, index: usize) -> Result<MockConnection, TransportError> {
        let device = self
            .devices
            .get(index)
            .ok_or(TransportError::DeviceNotFound { index })?;
        Ok(MockConnection {
            state: Arc::clone(&device.state),
            shape: device.shape.clone(),
            fail_claim: device.fail_claim,
            claimed: None,
        })
    }
}

/// Connection to a [`MockDevice`].
pub struct MockConnection {
    state: Arc<MockState>,
    shape: InterfaceShape,
    fail_claim: bool,
    claimed: Option<u8>,
}

impl UsbConnection for MockConnection {
    fn interface_shape(&self) -> Result<InterfaceShape, TransportError> {
        Ok(self.shape.clone())
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError> {
        if self.fail_claim {
            return Err(TransportError::ClaimInterfaceFailed {
                interface,
                message: "scripted claim failure".into(),
            });
        }
        self.state.claims.lock().unwrap().push(interface);
        self.claimed = Some(interface);
        Ok(())
    }

    fn release_interface(&mut self, _interface: u8) -> Result<(), TransportError> {
        if self.claimed.take().is_some() {
            *self.state.releases.lock().unwrap() += 1;
        }
        Ok(())
    }

    fn bulk_read(
        &mut self,
        _endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut reads = self.state.reads.lock().unwrap();
        let Some(mut chunk) = reads.pop_front() else {
            return Err(TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        };
        // A chunk larger than the destination models a partial transfer:
        // the rest stays queued for the next read.
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            chunk.drain(..n);
            reads.push_front(chunk);
        }
        Ok(n)
    }

    fn bulk_write(
        &mut self,
        _endpoint: u8,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.state.writes.lock().unwrap().push(data.to_vec());
        Ok(data.len())
    }

    fn vendor_control(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        self.state
            .controls
            .lock()
            .unwrap()
            .push((request, value, index));
        Ok(())
    }

    fn clear_halt(&mut self, endpoint: u8) -> Result<(), TransportError> {
        self.state.cleared_halts.lock().unwrap().push(endpoint);
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        // Dropping with a claim still held counts as the release, mirroring
        // the production backend's drop behavior.
        if self.claimed.take().is_some() {
            *self.state.releases.lock().unwrap() += 1;
        }
    }
}
