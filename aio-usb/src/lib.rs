//! The USB control/bulk transport seam the acquisition pipeline talks to, plus a
//! deterministic in-process implementation used in place of real hardware during tests.
//!
//! Real devices are reached through [`RusbDevice`], a thin wrapper over `rusb`. Call sites
//! depend only on [`UsbTransport`], so a [`MockDevice`] can stand in without any `cfg` gating.

use std::time::Duration;

/// Direction of a USB control transfer, matching `bmRequestType`'s data-transfer-direction bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	HostToDevice,
	DeviceToHost,
}

/// Vendor-specific control request codes this device family dispatches through `bRequest`.
pub mod request {
	/// Probes whether a calibration feature is present before starting acquisition.
	pub const PROBE_CAL_FEATURE: u8 = 0x36;
	/// Starts (or, with a zero payload, stops) block-mode continuous acquisition.
	pub const START_ACQUIRING_BLOCK: u8 = 0x32;
	/// Selects a counter/timer's operating mode.
	pub const CTR_MODE: u8 = 0x40;
	/// Loads a 16-bit divisor into a counter/timer.
	pub const CTR_MODELOAD: u8 = 0x41;
	/// Generic vendor command used for the final wind-up/wind-down handshake.
	pub const GENERIC_VENDOR: u8 = 0xBC;
}

/// The bulk endpoint raw ADC packets are streamed from.
pub const BULK_IN_ENDPOINT: u8 = 0x86;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UsbError {
	#[error("operation timed out")]
	Timeout,
	#[error("device disconnected")]
	Disconnected,
	#[error("endpoint stalled")]
	Stalled,
	#[error("usb transport error: {0}")]
	Other(String),
}

/// A handle to a USB device capable of the two transfer kinds this protocol uses.
pub trait UsbTransport {
	/// # Errors
	/// [`UsbError`] if the transfer fails or times out.
	fn control_transfer(
		&self,
		direction: Direction,
		request: u8,
		value: u16,
		index: u16,
		data: &mut [u8],
		timeout: Duration,
	) -> Result<usize, UsbError>;

	/// # Errors
	/// [`UsbError`] if the transfer fails or times out.
	fn bulk_read(
		&self,
		endpoint: u8,
		buf: &mut [u8],
		timeout: Duration,
	) -> Result<usize, UsbError>;
}

/// Wraps a `rusb` device handle opened against the system's real libusb stack.
pub struct RusbDevice<T: rusb::UsbContext> {
	handle: rusb::DeviceHandle<T>,
}

impl<T: rusb::UsbContext> RusbDevice<T> {
	#[must_use]
	pub fn new(handle: rusb::DeviceHandle<T>) -> Self {
		Self { handle }
	}
}

fn map_rusb_error(err: rusb::Error) -> UsbError {
	match err {
		rusb::Error::Timeout => UsbError::Timeout,
		rusb::Error::NoDevice | rusb::Error::Io => UsbError::Disconnected,
		rusb::Error::Pipe => UsbError::Stalled,
		other => UsbError::Other(other.to_string()),
	}
}

impl<T: rusb::UsbContext> UsbTransport for RusbDevice<T> {
	fn control_transfer(
		&self,
		direction: Direction,
		request: u8,
		value: u16,
		index: u16,
		data: &mut [u8],
		timeout: Duration,
	) -> Result<usize, UsbError> {
		const VENDOR_REQUEST_TYPE_OUT: u8 = 0x40;
		const VENDOR_REQUEST_TYPE_IN: u8 = 0xC0;

		match direction {
			Direction::HostToDevice => self
				.handle
				.write_control(VENDOR_REQUEST_TYPE_OUT, request, value, index, data, timeout)
				.map_err(map_rusb_error),
			Direction::DeviceToHost => self
				.handle
				.read_control(VENDOR_REQUEST_TYPE_IN, request, value, index, data, timeout)
				.map_err(map_rusb_error),
		}
	}

	fn bulk_read(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize, UsbError> {
		self.handle.read_bulk(endpoint, buf, timeout).map_err(map_rusb_error)
	}
}

/// A deterministic stand-in for hardware: control transfers always succeed and record the
/// last request seen, bulk reads hand back a caller-supplied fixture instead of real samples.
pub struct MockDevice {
	last_control_request: std::sync::Mutex<Option<(Direction, u8, u16, u16)>>,
	fixture: std::sync::Mutex<Vec<u8>>,
}

impl MockDevice {
	#[must_use]
	pub fn new() -> Self {
		Self {
			last_control_request: std::sync::Mutex::new(None),
			fixture: std::sync::Mutex::new(Vec::new()),
		}
	}

	/// Queues raw bytes to be handed out (and consumed) by subsequent [`UsbTransport::bulk_read`] calls.
	pub fn push_fixture_bytes(&self, bytes: &[u8]) {
		self.fixture.lock().expect("mock device mutex poisoned").extend_from_slice(bytes);
	}

	#[must_use]
	pub fn last_control_request(&self) -> Option<(Direction, u8, u16, u16)> {
		*self.last_control_request.lock().expect("mock device mutex poisoned")
	}
}

impl Default for MockDevice {
	fn default() -> Self {
		Self::new()
	}
}

impl UsbTransport for MockDevice {
	fn control_transfer(
		&self,
		direction: Direction,
		request: u8,
		value: u16,
		index: u16,
		_data: &mut [u8],
		_timeout: Duration,
	) -> Result<usize, UsbError> {
		*self.last_control_request.lock().expect("mock device mutex poisoned") =
			Some((direction, request, value, index));
		Ok(0)
	}

	fn bulk_read(&self, _endpoint: u8, buf: &mut [u8], _timeout: Duration) -> Result<usize, UsbError> {
		let mut fixture = self.fixture.lock().expect("mock device mutex poisoned");
		let n = buf.len().min(fixture.len());
		buf[..n].copy_from_slice(&fixture[..n]);
		fixture.drain(..n);
		Ok(n)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mock_control_transfer_records_the_request() {
		let dev = MockDevice::new();
		dev.control_transfer(
			Direction::HostToDevice,
			request::START_ACQUIRING_BLOCK,
			0,
			0,
			&mut [],
			Duration::from_millis(100),
		)
		.unwrap();
		assert_eq!(
			dev.last_control_request(),
			Some((Direction::HostToDevice, request::START_ACQUIRING_BLOCK, 0, 0))
		);
	}

	#[test]
	fn mock_bulk_read_drains_the_pushed_fixture() {
		let dev = MockDevice::new();
		dev.push_fixture_bytes(&[1, 2, 3, 4, 5]);
		let mut buf = [0u8; 3];
		assert_eq!(dev.bulk_read(BULK_IN_ENDPOINT, &mut buf, Duration::from_millis(100)).unwrap(), 3);
		assert_eq!(buf, [1, 2, 3]);
		let mut rest = [0u8; 3];
		assert_eq!(dev.bulk_read(BULK_IN_ENDPOINT, &mut rest, Duration::from_millis(100)).unwrap(), 2);
		assert_eq!(&rest[..2], &[4, 5]);
	}

	#[test]
	fn mock_bulk_read_reports_zero_once_the_fixture_is_exhausted() {
		let dev = MockDevice::new();
		let mut buf = [0u8; 4];
		assert_eq!(dev.bulk_read(BULK_IN_ENDPOINT, &mut buf, Duration::from_millis(100)).unwrap(), 0);
	}
}
