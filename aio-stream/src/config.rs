use std::fs;
use std::path::Path;
use std::time::Duration;

use aio_calibration::GainCode;
use aio_ring_buffer::WriteMode;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The element type a [`crate::StreamEngine`] produces: raw counts, or calibrated volts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
	Counts,
	Volts,
}

/// The mutable, in-memory acquisition configuration a [`crate::StreamEngine`] consumes.
///
/// Fixed fields (`num_channels`, `kind`) are set at construction. The rest may be changed
/// by the `set_*` methods on the engine while it is outside the `Running` state.
#[derive(Debug, Clone)]
pub struct StreamConfig {
	pub device_index: usize,
	pub num_channels: usize,
	pub oversample: u8,
	pub sample_rate_hz: u32,
	pub timeout: Duration,
	pub gain_codes: Vec<GainCode>,
	pub differential: bool,
	pub discard_first: bool,
	pub testing: bool,
	pub write_mode: WriteMode,
	/// Opaque to the data plane: forwarded unchanged to the bring-up control transfers.
	pub trigger_mode: u8,
	/// Opaque to the data plane: forwarded unchanged to the bring-up control transfers.
	pub base_size: usize,
}

impl StreamConfig {
	/// # Errors
	/// [`ConfigError::InvalidChannelCount`] if `num_channels` doesn't match `gain_codes`.
	pub fn new(
		device_index: usize,
		num_channels: usize,
		gain_codes: Vec<GainCode>,
	) -> Result<Self, ConfigError> {
		if num_channels == 0 || num_channels != gain_codes.len() {
			return Err(ConfigError::InvalidChannelCount(num_channels));
		}
		Ok(Self {
			device_index,
			num_channels,
			oversample: 0,
			sample_rate_hz: 1000,
			timeout: Duration::from_millis(3000),
			gain_codes,
			differential: false,
			discard_first: false,
			testing: false,
			write_mode: WriteMode::AllOrNone,
			trigger_mode: 0,
			base_size: num_channels,
		})
	}
}

fn gain_code_from_u8(code: u8) -> Result<GainCode, ConfigError> {
	match code {
		0 => Ok(GainCode::Bipolar10V),
		1 => Ok(GainCode::Unipolar10V),
		2 => Ok(GainCode::Bipolar5V),
		3 => Ok(GainCode::Unipolar5V),
		4 => Ok(GainCode::Bipolar2V),
		5 => Ok(GainCode::Unipolar2V),
		6 => Ok(GainCode::Bipolar1V),
		7 => Ok(GainCode::Unipolar1V),
		other => Err(ConfigError::InvalidGainCode(other)),
	}
}

/// The on-disk JSON shape of a stream configuration, matching the external collaborator's
/// configuration-block record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfigRecord {
	pub device_index: usize,
	pub num_channels: usize,
	pub num_oversamples: u8,
	pub base_size: usize,
	pub gain_codes: Vec<u8>,
	pub trigger_mode: u8,
	pub timeout_ms: u64,
	#[serde(default)]
	pub testing: bool,
}

impl StreamConfigRecord {
	/// # Errors
	/// [`ConfigError::Json`] if `s` isn't valid JSON for this record shape.
	pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
		serde_json::from_str(s).map_err(|err| ConfigError::Json(err.to_string()))
	}

	/// # Errors
	/// [`ConfigError::Json`] if the file can't be read or parsed.
	pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let contents =
			fs::read_to_string(path).map_err(|err| ConfigError::Json(err.to_string()))?;
		Self::from_json_str(&contents)
	}

	/// # Errors
	/// [`ConfigError::InvalidChannelCount`] or [`ConfigError::InvalidGainCode`] if the
	/// record doesn't describe a well-formed configuration.
	pub fn into_stream_config(self) -> Result<StreamConfig, ConfigError> {
		if self.num_channels == 0 || self.gain_codes.len() != self.num_channels {
			return Err(ConfigError::InvalidChannelCount(self.num_channels));
		}
		let gain_codes = self
			.gain_codes
			.into_iter()
			.map(gain_code_from_u8)
			.collect::<Result<Vec<_>, _>>()?;

		Ok(StreamConfig {
			device_index: self.device_index,
			num_channels: self.num_channels,
			oversample: self.num_oversamples,
			sample_rate_hz: 1000,
			timeout: Duration::from_millis(self.timeout_ms),
			gain_codes,
			differential: false,
			discard_first: false,
			testing: self.testing,
			write_mode: WriteMode::AllOrNone,
			trigger_mode: self.trigger_mode,
			base_size: self.base_size,
		})
	}
}
