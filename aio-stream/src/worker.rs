//! The producer thread: pulls raw packets off the bulk endpoint, runs them through
//! cull-and-average and (for volts-kind engines) calibration, and stages the result in the
//! ring buffer.

use aio_ring_buffer::WriteMode;
use aio_sync::LockExt;
use aio_usb::BULK_IN_ENDPOINT;

use crate::bringup;
use crate::config::ElementKind;
use crate::engine::{EngineState, Ring, Status};
use crate::error::Error;

const MAX_USB_FAILURES: u32 = 5;
const VOLTS_BUFFER_BYTES: usize = 128 * 512;
const COUNTS_BUFFER_BYTES_PER_CHANNEL: usize = 16 * 512;

pub(crate) fn run(state: &EngineState) {
	let mut channel_cursor: usize = 0;
	let mut spillover: Vec<u16> = Vec::new();
	let mut samples_copied: usize = 0;

	// Fixed-length counts capture: the worker terminates once it has produced S - N samples,
	// leaving exactly one scan's worth of headroom rather than filling the ring to capacity.
	let fixed_capture_target = match state.kind {
		ElementKind::Counts => Some((state.scan_count * state.n_channels).saturating_sub(state.n_channels)),
		ElementKind::Volts => None,
	};

	let (timeout, write_mode) =
		state.config.with_lock(|c| (c.timeout, c.write_mode)).expect("config mutex poisoned");

	let buffer_len = match state.kind {
		ElementKind::Volts => VOLTS_BUFFER_BYTES,
		ElementKind::Counts => state.n_channels * COUNTS_BUFFER_BYTES_PER_CHANNEL,
	};
	let mut raw = vec![0u8; buffer_len];

	loop {
		if state.status() != Status::Running {
			break;
		}

		match state.usb.bulk_read(BULK_IN_ENDPOINT, &mut raw, timeout) {
			Ok(0) => {}
			Ok(n) => {
				state.status.with_lock_mut(|s| s.usb_fail_count = 0).expect("status mutex poisoned");

				if let Err(err) = process_packet(
					state,
					&raw[..n],
					&mut channel_cursor,
					&mut spillover,
					write_mode,
					&mut samples_copied,
				) {
					tracing::warn!(%err, "dropping packet");
					state
						.status
						.with_lock_mut(|s| s.dropped_packet_count += 1)
						.expect("status mutex poisoned");
				}

				if let Some(target) = fixed_capture_target {
					if samples_copied >= target {
						tracing::debug!(samples_copied, target, "fixed-length capture complete");
						state.transition_terminated(None);
					}
				}
			}
			Err(err) => {
				let fail_count = state
					.status
					.with_lock_mut(|s| {
						s.usb_fail_count += 1;
						s.usb_fail_count
					})
					.expect("status mutex poisoned");
				tracing::warn!(%err, fail_count, "usb bulk read failed");
				if fail_count >= MAX_USB_FAILURES {
					tracing::error!(%err, "usb bulk read failed repeatedly, terminating stream");
					state.transition_terminated(Some(Error::UsbTransfer(err)));
					break;
				}
			}
		}
	}

	bringup::wind_down(state.usb.as_ref(), timeout);
	state.transition_terminated(None);
}

/// Runs one packet through cull-and-average, carries any scan-boundary residual into
/// `spillover`, converts to volts if required, and writes the complete scans into the ring.
fn process_packet(
	state: &EngineState,
	raw: &[u8],
	channel_cursor: &mut usize,
	spillover: &mut Vec<u16>,
	write_mode: WriteMode,
	samples_copied: &mut usize,
) -> Result<(), Error> {
	let (oversample, discard_first) = state
		.config
		.with_lock(|c| (c.oversample, c.discard_first))
		.expect("config mutex poisoned");

	let mut counts: Vec<u16> = raw.chunks_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]])).collect();
	let n = aio_cull::cull_and_average(&mut counts, oversample, discard_first);
	counts.truncate(n);

	let mut combined = Vec::with_capacity(spillover.len() + counts.len());
	combined.append(spillover);
	combined.extend_from_slice(&counts);

	let n_channels = state.n_channels;
	let complete_len = (combined.len() / n_channels) * n_channels;
	spillover.extend_from_slice(&combined[complete_len..]);
	let complete = &combined[..complete_len];

	let extra = spillover.len();
	match &state.ring {
		Ring::Counts(ring) => ring.set_extra(extra)?,
		Ring::Volts(ring) => ring.set_extra(extra)?,
	}

	if complete.is_empty() {
		return Ok(());
	}

	match &state.ring {
		Ring::Counts(ring) => {
			let n_written = ring.write(complete, write_mode)?;
			*samples_copied += n_written;
		}
		Ring::Volts(ring) => {
			let gain_codes =
				state.config.with_lock(|c| c.gain_codes.clone()).expect("config mutex poisoned");
			let mut volts = vec![0.0f32; complete.len()];
			aio_calibration::counts_to_volts(channel_cursor, complete, &mut volts, &gain_codes)
				.map_err(|_| Error::InvalidParameter)?;
			let n_written = ring.write(&volts, write_mode)?;
			*samples_copied += n_written;
		}
	}

	Ok(())
}
