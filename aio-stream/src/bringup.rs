//! The device bring-up and wind-down control-transfer sequences. Opaque to the data plane,
//! but must be emitted bit-exact to leave the hardware in a valid state between runs.

use std::time::Duration;

use aio_usb::{request, Direction, UsbTransport};

use crate::error::Error;

/// One-byte read probing for a calibration feature before acquisition starts.
pub fn probe_cal_feature(usb: &dyn UsbTransport, timeout: Duration) -> Result<(), Error> {
	let mut data = [0u8; 1];
	usb.control_transfer(Direction::DeviceToHost, request::PROBE_CAL_FEATURE, 0, 0, &mut data, timeout)?;
	Ok(())
}

/// Resets both counter/timers to a known mode. Used both at bring-up and wind-down.
pub fn reset_counters(usb: &dyn UsbTransport, timeout: Duration) -> Result<(), Error> {
	usb.control_transfer(Direction::HostToDevice, request::CTR_MODE, 0x7400, 0, &mut [], timeout)?;
	usb.control_transfer(Direction::HostToDevice, request::CTR_MODE, 0xB600, 0, &mut [], timeout)?;
	Ok(())
}

/// Starts (or, with a zero payload, stops) block-mode continuous acquisition.
pub fn start_streaming(usb: &dyn UsbTransport, timeout: Duration) -> Result<(), Error> {
	let mut data = [0x07, 0x00, 0x00, 0x01];
	usb.control_transfer(Direction::HostToDevice, request::START_ACQUIRING_BLOCK, 0, 0, &mut data, timeout)?;
	Ok(())
}

/// Loads the two divisors found by the clock solver into the device's counter/timers.
pub fn load_counters(usb: &dyn UsbTransport, divisor_a: u32, divisor_b: u32, timeout: Duration) -> Result<(), Error> {
	#[allow(clippy::cast_possible_truncation)]
	let (a, b) = (divisor_a as u16, divisor_b as u16);
	usb.control_transfer(Direction::HostToDevice, request::CTR_MODELOAD, 0x7400, a, &mut [], timeout)?;
	usb.control_transfer(Direction::HostToDevice, request::CTR_MODELOAD, 0xB600, b, &mut [], timeout)?;
	Ok(())
}

/// Runs the wind-down sequence. Idempotent on the host side: every step's failure is logged
/// and swallowed so a partially-broken device never prevents the engine from reaching
/// `Terminated`.
pub fn wind_down(usb: &dyn UsbTransport, timeout: Duration) {
	if let Err(err) = reset_counters(usb, timeout) {
		tracing::warn!(%err, "wind-down counter reset failed");
	}

	let mut write_payload = [0x02, 0x00, 0x02, 0x00];
	if let Err(err) =
		usb.control_transfer(Direction::HostToDevice, request::GENERIC_VENDOR, 0, 0, &mut write_payload, timeout)
	{
		tracing::warn!(%err, "wind-down generic write failed");
	}

	let mut read_payload = [0u8; 4];
	if let Err(err) =
		usb.control_transfer(Direction::DeviceToHost, request::GENERIC_VENDOR, 0, 0, &mut read_payload, timeout)
	{
		tracing::warn!(%err, "wind-down generic read failed");
	}
}
