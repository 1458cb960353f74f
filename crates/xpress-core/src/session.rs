//! An open device session: the bulk endpoint pair, the read-side buffer,
//! and the policies that reconcile chunked bulk transfers with the
//! "read up to N bytes" contract.

use std::time::Duration;

use tracing::{debug, trace};

use crate::buffer::RxBuffer;
use crate::config::SharedTimeouts;
use crate::endpoints::BulkEndpoints;
use crate::error::XpressError;
use crate::protocol::{
    INTERFACE_CLOSE, OPPORTUNISTIC_TIMEOUT, REQ_INTERFACE_STATE, RX_BUFFER_CAPACITY,
};
use crate::transport::{TransportError, UsbConnection};

/// Read-side queue status reported by [`Session::check_rx_queue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    /// No buffered bytes.
    Empty,
    /// At least one buffered byte.
    Ready,
}

/// An open session on a bulk-transfer device.
///
/// Holds the connection with its claimed interface, the resolved endpoint
/// pair, and the receive buffer. A `Session` value is valid for as long as
/// it exists: [`close`](Self::close) consumes it, so use-after-close is a
/// compile error. Dropping the session without closing releases the
/// interface and connection but skips the vendor close request.
pub struct Session<C: UsbConnection> {
    conn: C,
    interface: u8,
    endpoints: BulkEndpoints,
    rx: RxBuffer,
    timeouts: SharedTimeouts,
}

impl<C: UsbConnection> Session<C> {
    /// Wrap an already claimed connection and prime the receive buffer
    /// with whatever the device has queued.
    pub(crate) fn new(
        conn: C,
        interface: u8,
        endpoints: BulkEndpoints,
        timeouts: SharedTimeouts,
    ) -> Self {
        let mut session = Self {
            conn,
            interface,
            endpoints,
            rx: RxBuffer::new(RX_BUFFER_CAPACITY),
            timeouts,
        };
        session.fill(OPPORTUNISTIC_TIMEOUT);
        session
    }

    /// Read up to `dest.len()` bytes.
    ///
    /// Served from the receive buffer; when the buffer cannot satisfy the
    /// request, one bulk-in transfer bounded by the configured read timeout
    /// tops it up first. A short read is normal. Zero bytes within the
    /// timeout is [`XpressError::ReadTimedOut`].
    pub fn read(&mut self, dest: &mut [u8]) -> Result<usize, XpressError> {
        if dest.is_empty() {
            return Ok(0);
        }
        if self.rx.len() < dest.len() {
            self.fill(self.timeouts.get().read());
        }
        let n = self.rx.drain_into(dest);
        trace!(requested = dest.len(), delivered = n, "session read");
        if n == 0 {
            return Err(XpressError::ReadTimedOut);
        }
        Ok(n)
    }

    /// Write `data` to the bulk-out endpoint, bounded by the configured
    /// write timeout.
    ///
    /// Returns the number of bytes actually transferred; a timeout shows up
    /// as a short count, not an error. Each write is bracketed by
    /// opportunistic buffer fills so device responses produced around the
    /// write are not lost.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, XpressError> {
        self.fill(OPPORTUNISTIC_TIMEOUT);
        let written = self.conn.bulk_write(
            self.endpoints.output,
            data,
            self.timeouts.get().write(),
        )?;
        trace!(requested = data.len(), written, "session write");
        self.fill(OPPORTUNISTIC_TIMEOUT);
        Ok(written)
    }

    /// Discard all buffered-but-unread bytes. Transport queues are left
    /// untouched.
    pub fn flush_buffers(&mut self) -> Result<(), XpressError> {
        self.rx.clear();
        Ok(())
    }

    /// Buffered byte count and whether any data is ready.
    ///
    /// A pure report of the receive buffer: no transport I/O, no blocking.
    /// Bytes the device has produced become visible here once a read or
    /// write has pulled them into the buffer.
    pub fn check_rx_queue(&mut self) -> Result<(usize, QueueStatus), XpressError> {
        let len = self.rx.len();
        let status = if len == 0 {
            QueueStatus::Empty
        } else {
            QueueStatus::Ready
        };
        Ok((len, status))
    }

    /// Device reset request. The supported parts need nothing beyond an
    /// open session, so this succeeds without touching the transport.
    pub fn reset(&mut self) -> Result<(), XpressError> {
        Ok(())
    }

    /// Driver-specific IO control. Accepted and ignored for the supported
    /// parts; succeeds with zero bytes returned.
    pub fn device_io_control(
        &mut self,
        _control_code: u32,
        _input: &[u8],
        _output: &mut [u8],
    ) -> Result<usize, XpressError> {
        Ok(0)
    }

    /// Close the session: send the vendor "interface close" request
    /// best-effort, release the interface, drop the connection.
    pub fn close(mut self) {
        if let Err(err) = self.conn.vendor_control(
            REQ_INTERFACE_STATE,
            INTERFACE_CLOSE,
            0,
            self.timeouts.get().write(),
        ) {
            debug!(%err, "vendor close request failed");
        }
        if let Err(err) = self.conn.release_interface(self.interface) {
            debug!(%err, interface = self.interface, "interface release failed");
        }
    }

    /// One bulk-in transfer into the buffer's spare space, bounded by
    /// `timeout`. Timeouts and transport errors are absorbed here; the
    /// public read decides what an empty buffer means.
    fn fill(&mut self, timeout: Duration) {
        if self.rx.is_full() {
            return;
        }
        match self
            .conn
            .bulk_read(self.endpoints.input, self.rx.spare_mut(), timeout)
        {
            Ok(n) => {
                self.rx.commit(n);
                trace!(bytes = n, buffered = self.rx.len(), "buffer fill");
            }
            Err(TransportError::Timeout { .. }) => {}
            Err(err) => debug!(%err, "buffer fill failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::transport::{MockBackend, MockConnection, MockDevice, MockState, UsbBackend};

    fn open_session(device: MockDevice) -> (Session<MockConnection>, Arc<MockState>) {
        let state = device.state();
        let mut backend = MockBackend::with_devices(vec![device]);
        let mut conn = backend.open(0).unwrap();
        conn.claim_interface(0).unwrap();
        let session = Session::new(
            conn,
            0,
            BulkEndpoints {
                input: 0x81,
                output: 0x01,
            },
            SharedTimeouts::default(),
        );
        (session, state)
    }

    #[test]
    fn test_new_primes_buffer_from_device() {
        let device = MockDevice::new();
        device.queue_read(&[0xAA, 0xBB]);
        let (mut session, _) = open_session(device);

        // Both bytes were absorbed at construction time; the read is served
        // from the buffer even though the device queue is now empty.
        let mut out = [0u8; 2];
        assert_eq!(session.read(&mut out).unwrap(), 2);
        assert_eq!(out, [0xAA, 0xBB]);
    }

    #[test]
    fn test_read_satisfied_from_buffer_is_short_circuit() {
        let device = MockDevice::new();
        device.queue_read(&[1, 2, 3]);
        let (mut session, state) = open_session(device);
        state.queue_read(&[9, 9]);

        // Three buffered bytes fully satisfy a two-byte request, so the
        // queued chunk stays on the device side.
        let mut out = [0u8; 2];
        assert_eq!(session.read(&mut out).unwrap(), 2);
        assert_eq!(out, [1, 2]);

        let mut rest = [0u8; 4];
        assert_eq!(session.read(&mut rest).unwrap(), 3);
        assert_eq!(&rest[..3], &[3, 9, 9]);
    }

    #[test]
    fn test_short_read_is_success() {
        let device = MockDevice::new();
        device.queue_read(&[7]);
        let (mut session, _) = open_session(device);

        let mut out = [0u8; 16];
        assert_eq!(session.read(&mut out).unwrap(), 1);
        assert_eq!(out[0], 7);
    }

    #[test]
    fn test_read_with_no_data_times_out() {
        let (mut session, _) = open_session(MockDevice::new());
        let mut out = [0u8; 4];
        assert!(matches!(
            session.read(&mut out),
            Err(XpressError::ReadTimedOut)
        ));
    }

    #[test]
    fn test_read_empty_destination_is_zero() {
        let (mut session, _) = open_session(MockDevice::new());
        let mut out = [0u8; 0];
        assert_eq!(session.read(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_write_reports_count_and_absorbs_responses() {
        let (mut session, state) = open_session(MockDevice::new());
        state.queue_read(&[0x55]);

        assert_eq!(session.write(b"cmd").unwrap(), 3);
        assert_eq!(state.writes(), vec![b"cmd".to_vec()]);

        // The response queued before the write was absorbed by one of the
        // bracketing fills.
        let (len, status) = session.check_rx_queue().unwrap();
        assert_eq!(len, 1);
        assert_eq!(status, QueueStatus::Ready);
    }

    #[test]
    fn test_flush_discards_buffered_bytes() {
        let device = MockDevice::new();
        device.queue_read(&[1, 2, 3]);
        let (mut session, _) = open_session(device);

        session.flush_buffers().unwrap();
        assert_eq!(session.check_rx_queue().unwrap(), (0, QueueStatus::Empty));
        let mut out = [0u8; 4];
        assert!(matches!(
            session.read(&mut out),
            Err(XpressError::ReadTimedOut)
        ));
    }

    #[test]
    fn test_check_rx_queue_reflects_buffered_data() {
        let (mut session, state) = open_session(MockDevice::new());
        assert_eq!(session.check_rx_queue().unwrap(), (0, QueueStatus::Empty));

        // A read pulls the device data in; the three undelivered bytes are
        // then visible to the query.
        state.queue_read(&[1, 2, 3, 4]);
        let mut out = [0u8; 1];
        session.read(&mut out).unwrap();
        assert_eq!(session.check_rx_queue().unwrap(), (3, QueueStatus::Ready));
    }

    #[test]
    fn test_check_rx_queue_performs_no_transport_io() {
        let (mut session, state) = open_session(MockDevice::new());
        state.queue_read(&[1, 2, 3]);

        // Data sitting on the device side is not consumed by the query.
        assert_eq!(session.check_rx_queue().unwrap(), (0, QueueStatus::Empty));

        let mut out = [0u8; 4];
        assert_eq!(session.read(&mut out).unwrap(), 3);
        assert_eq!(&out[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_reset_and_io_control_succeed() {
        let (mut session, _) = open_session(MockDevice::new());
        session.reset().unwrap();
        let mut out = [0u8; 8];
        assert_eq!(session.device_io_control(0x10, &[1, 2], &mut out).unwrap(), 0);
    }

    #[test]
    fn test_close_sends_vendor_close_and_releases_once() {
        let (session, state) = open_session(MockDevice::new());
        session.close();

        assert!(state.controls().contains(&(REQ_INTERFACE_STATE, INTERFACE_CLOSE, 0)));
        assert_eq!(state.releases(), 1);
    }

    #[test]
    fn test_drop_releases_without_vendor_close() {
        let (session, state) = open_session(MockDevice::new());
        drop(session);

        assert!(!state.controls().contains(&(REQ_INTERFACE_STATE, INTERFACE_CLOSE, 0)));
        assert_eq!(state.releases(), 1);
    }
}
