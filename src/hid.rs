/* HID Transport — owns the sole handle to the device and performs the raw
 * report I/O. Built on `hidapi`, the cross-platform user-space HID library,
 * so the transport isn't pinned to Linux `hidraw` ioctls. */

use std::time::Duration;

use anyhow::{Context, Result};
use hidapi::{HidApi, HidDevice};
use tracing::debug;

use crate::error::{DaemonError, DaemonResult};
use crate::frame::FRAME_SIZE;

/// Outcome of a single timed read attempt.
pub enum ReadOutcome {
    /// A full frame arrived.
    Frame([u8; FRAME_SIZE]),
    /// No data arrived before the timeout elapsed.
    Timeout,
}

/// The sole open handle to the target device.
pub struct DeviceIo {
    device: HidDevice,
}

impl DeviceIo {
    /// Attempt to open the fixed vendor/product device. Returns
    /// `DaemonError::DeviceAbsent` if it isn't present rather than a raw
    /// `hidapi` error, so callers can match on it directly.
    pub fn open(vendor_id: u16, product_id: u16) -> DaemonResult<Self> {
        let api = HidApi::new().map_err(|e| DaemonError::Protocol(e.to_string()))?;
        let device = api
            .open(vendor_id, product_id)
            .map_err(|_| DaemonError::DeviceAbsent)?;
        Ok(Self { device })
    }

    /// Write one raw 1024-byte report frame.
    ///
    /// `hidapi` always treats `data[0]` as the report id, so the frame is
    /// always sent behind a leading 0x00 (this device doesn't use numbered
    /// reports). Any write error is propagated rather than retried — the
    /// orchestrator treats it as a disconnect.
    pub fn write_frame(&self, frame: &[u8; FRAME_SIZE]) -> Result<()> {
        let mut prefixed = Vec::with_capacity(FRAME_SIZE + 1);
        prefixed.push(0u8);
        prefixed.extend_from_slice(frame);

        self.device
            .write(&prefixed)
            .context("writing HID report frame")?;
        debug!(bytes = FRAME_SIZE, "wrote frame (report-id prefixed)");
        Ok(())
    }

    /// Timed blocking read of a single report.
    pub fn read_frame(&self, timeout: Duration) -> Result<ReadOutcome> {
        let mut buf = [0u8; FRAME_SIZE];
        let n = self
            .device
            .read_timeout(&mut buf, timeout.as_millis() as i32)
            .context("reading HID report frame")?;

        if n == 0 {
            return Ok(ReadOutcome::Timeout);
        }

        debug!(bytes = n, "read frame");
        Ok(ReadOutcome::Frame(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_absent_device_reports_device_absent() {
        // A vendor/product pair essentially guaranteed not to exist.
        match DeviceIo::open(0xFFFF, 0xFFFF) {
            Err(DaemonError::DeviceAbsent) => {}
            Err(other) => panic!("expected DeviceAbsent, got {other:?}"),
            Ok(_) => { /* unlikely, but not wrong if such a device exists */ }
        }
    }
}
