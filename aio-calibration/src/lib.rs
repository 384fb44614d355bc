//! Converts raw 16-bit ADC counts into calibrated volts, tracking which channel's gain
//! range applies to each sample as the cursor rotates across the active channel range.
//!
//! The conversion itself is a linear remap of a 16-bit count onto a gain range's
//! `(min_volts, min_volts + span_volts)` interval, fixed to a 65536-count domain.

/// Divisor applied to a raw 16-bit unsigned count before scaling into a gain range.
pub const COUNTS_DOMAIN: f32 = 65536.0;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
	#[error("channel gain table must list at least one channel")]
	InvalidParameter,
	#[error("output buffer has {have} slots, need at least {need}")]
	OutputBufferTooSmall { have: usize, need: usize },
}

/// One of the eight unipolar/bipolar ranges exposed by this device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GainCode {
	Bipolar10V = 0,
	Unipolar10V = 1,
	Bipolar5V = 2,
	Unipolar5V = 3,
	Bipolar2V = 4,
	Unipolar2V = 5,
	Bipolar1V = 6,
	Unipolar1V = 7,
}

/// A continuous voltage interval: `[min_volts, min_volts + span_volts)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRange {
	pub span_volts: f32,
	pub min_volts: f32,
}

const GAIN_RANGES: [GainRange; 8] = [
	GainRange { span_volts: 20.0, min_volts: -10.0 }, // Bipolar10V
	GainRange { span_volts: 10.0, min_volts: 0.0 },   // Unipolar10V
	GainRange { span_volts: 10.0, min_volts: -5.0 },  // Bipolar5V
	GainRange { span_volts: 5.0, min_volts: 0.0 },    // Unipolar5V
	GainRange { span_volts: 4.0, min_volts: -2.0 },   // Bipolar2V
	GainRange { span_volts: 2.0, min_volts: 0.0 },    // Unipolar2V
	GainRange { span_volts: 2.0, min_volts: -1.0 },   // Bipolar1V
	GainRange { span_volts: 1.0, min_volts: 0.0 },    // Unipolar1V
];

impl GainCode {
	#[must_use]
	pub const fn range(self) -> GainRange {
		GAIN_RANGES[self as usize]
	}
}

/// Converts `counts` into `volts`, starting from channel `*cursor` and rotating through
/// `channel_gain_codes` (one entry per active channel, in ascending channel order).
///
/// Returns the number of samples written, which always equals `counts.len()`, and advances
/// `*cursor` by exactly that many positions modulo `channel_gain_codes.len()`.
///
/// # Errors
/// - [`CalibrationError::InvalidParameter`] if `channel_gain_codes` is empty.
/// - [`CalibrationError::OutputBufferTooSmall`] if `volts` can't hold `counts.len()` samples.
pub fn counts_to_volts(
	cursor: &mut usize,
	counts: &[u16],
	volts: &mut [f32],
	channel_gain_codes: &[GainCode],
) -> Result<usize, CalibrationError> {
	let n_channels = channel_gain_codes.len();
	if n_channels == 0 {
		return Err(CalibrationError::InvalidParameter);
	}
	if volts.len() < counts.len() {
		return Err(CalibrationError::OutputBufferTooSmall {
			have: volts.len(),
			need: counts.len(),
		});
	}

	let mut c = *cursor % n_channels;
	for (i, &sample) in counts.iter().enumerate() {
		let range = channel_gain_codes[c].range();
		volts[i] = (sample as f32 / COUNTS_DOMAIN) * range.span_volts + range.min_volts;
		c = (c + 1) % n_channels;
	}
	*cursor = c;

	Ok(counts.len())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn maps_extremes_of_a_bipolar_range() {
		let mut cursor = 0;
		let mut volts = [0.0; 3];
		let codes = [GainCode::Bipolar10V];
		counts_to_volts(&mut cursor, &[0, 32768, 65535], &mut volts, &codes).unwrap();
		assert!((volts[0] - -10.0).abs() < 1e-4);
		assert!((volts[1] - 0.0).abs() < 1e-2);
		assert!((volts[2] - (10.0 - 20.0 / 65536.0)).abs() < 1e-3);
	}

	#[test]
	fn maps_extremes_of_a_unipolar_range() {
		let mut cursor = 0;
		let mut volts = [0.0; 2];
		let codes = [GainCode::Unipolar5V];
		counts_to_volts(&mut cursor, &[0, 65535], &mut volts, &codes).unwrap();
		assert!((volts[0] - 0.0).abs() < 1e-4);
		assert!((volts[1] - (5.0 - 5.0 / 65536.0)).abs() < 1e-3);
	}

	#[test]
	fn cursor_advances_and_wraps_across_channels() {
		// Three channels, five input samples: cursor rotates by 5 mod 3 = 2.
		let mut cursor = 0;
		let mut volts = [0.0; 5];
		let codes = [GainCode::Unipolar10V, GainCode::Unipolar5V, GainCode::Unipolar2V];
		let written =
			counts_to_volts(&mut cursor, &[0, 0, 0, 0, 0], &mut volts, &codes).unwrap();
		assert_eq!(written, 5);
		assert_eq!(cursor, 2);
	}

	#[test]
	fn cursor_resumes_from_a_nonzero_starting_channel() {
		let mut cursor = 2;
		let mut volts = [0.0; 2];
		let codes = [GainCode::Unipolar10V, GainCode::Unipolar5V, GainCode::Unipolar2V];
		counts_to_volts(&mut cursor, &[65535, 65535], &mut volts, &codes).unwrap();
		// Sample 0 used channel 2 (Unipolar2V), sample 1 used channel 0 (Unipolar10V).
		assert!((volts[0] - (2.0 - 2.0 / 65536.0)).abs() < 1e-3);
		assert!((volts[1] - (10.0 - 10.0 / 65536.0)).abs() < 1e-3);
		assert_eq!(cursor, 1);
	}

	#[test]
	fn rejects_empty_channel_table() {
		let mut cursor = 0;
		let mut volts = [0.0; 1];
		assert_eq!(
			counts_to_volts(&mut cursor, &[0], &mut volts, &[]),
			Err(CalibrationError::InvalidParameter)
		);
	}

	#[test]
	fn rejects_undersized_output_buffer() {
		let mut cursor = 0;
		let mut volts = [0.0; 1];
		let codes = [GainCode::Unipolar10V];
		assert_eq!(
			counts_to_volts(&mut cursor, &[0, 1], &mut volts, &codes),
			Err(CalibrationError::OutputBufferTooSmall { have: 1, need: 2 })
		);
	}
}
