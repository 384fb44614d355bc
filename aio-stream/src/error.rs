use aio_ring_buffer::RingError;
use aio_usb::UsbError;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
	#[error("invalid json: {0}")]
	Json(String),
	#[error("channel count must be between 1 and 16, got {0}")]
	InvalidChannelCount(usize),
	#[error("gain code {0} is out of range")]
	InvalidGainCode(u8),
}

/// Errors surfaced synchronously from configuration calls, and stored as a worker's
/// [`exit_code`](crate::StreamEngine::exit_code) when the producer thread fails.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
	#[error("invalid parameter")]
	InvalidParameter,
	#[error("not enough memory")]
	NotEnoughMemory,
	#[error("device not found")]
	DeviceNotFound,
	#[error("invalid usb device")]
	InvalidUsbDevice,
	#[error("usb transfer failed: {0}")]
	UsbTransfer(#[from] UsbError),
	#[error("invalid buffer")]
	InvalidBuffer,
	#[error("invalid configuration: {0}")]
	Config(#[from] ConfigError),
}

impl From<RingError> for Error {
	fn from(err: RingError) -> Self {
		match err {
			RingError::NotEnoughSpace { .. } => Self::NotEnoughMemory,
			RingError::InvalidParameter => Self::InvalidParameter,
		}
	}
}
