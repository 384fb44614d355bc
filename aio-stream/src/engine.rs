use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use aio_ring_buffer::RingBuffer;
use aio_sync::LockExt;
use aio_usb::UsbTransport;

use crate::bringup;
use crate::config::{ElementKind, StreamConfig};
use crate::error::Error;
use crate::worker;

/// Where a [`StreamEngine`] sits in its lifecycle. Transitions only move rightward, except
/// that `new` + `Drop` without ever calling `start` skips straight from `NotStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	NotStarted,
	Running,
	Terminated,
	Joined,
}

pub(crate) enum Ring {
	Counts(RingBuffer<u16>),
	Volts(RingBuffer<f32>),
}

impl Ring {
	fn new(kind: ElementKind, scan_count: usize, n_channels: usize) -> Self {
		match kind {
			ElementKind::Counts => Self::Counts(RingBuffer::new(scan_count, n_channels)),
			ElementKind::Volts => Self::Volts(RingBuffer::new(scan_count, n_channels)),
		}
	}

	pub(crate) fn reset(&self) {
		match self {
			Self::Counts(r) => r.reset(),
			Self::Volts(r) => r.reset(),
		}
	}

	pub(crate) fn scans_available(&self) -> usize {
		match self {
			Self::Counts(r) => r.scans_available(),
			Self::Volts(r) => r.scans_available(),
		}
	}
}

pub(crate) struct StatusState {
	pub status: Status,
	pub exit_code: Option<Error>,
	pub usb_fail_count: u32,
	pub dropped_packet_count: u64,
}

pub(crate) struct EngineState {
	pub usb: Arc<dyn UsbTransport + Send + Sync>,
	pub ring: Ring,
	pub scan_count: usize,
	pub n_channels: usize,
	pub kind: ElementKind,
	pub status: Mutex<StatusState>,
	pub config: Mutex<StreamConfig>,
}

impl EngineState {
	pub(crate) fn status(&self) -> Status {
		self.status.with_lock(|s| s.status).expect("status mutex poisoned")
	}

	pub(crate) fn transition_terminated(&self, exit_code: Option<Error>) {
		self.status
			.with_lock_mut(|s| {
				if s.status != Status::Joined {
					s.status = Status::Terminated;
				}
				if s.exit_code.is_none() {
					s.exit_code = exit_code;
				}
			})
			.expect("status mutex poisoned");
	}
}

/// The continuous-acquisition engine: owns the ring buffer, configuration, and worker
/// thread for a single USB ADC device.
pub struct StreamEngine {
	pub(crate) state: Arc<EngineState>,
	worker: Mutex<Option<JoinHandle<()>>>,
}

impl StreamEngine {
	/// # Errors
	/// [`Error::InvalidParameter`] if `n_channels` is zero or `scan_count` is zero.
	pub fn new(
		usb: Arc<dyn UsbTransport + Send + Sync>,
		registry_config: StreamConfig,
		scan_count: usize,
		n_channels: usize,
		kind: ElementKind,
	) -> Result<Self, Error> {
		if n_channels == 0 || scan_count == 0 {
			return Err(Error::InvalidParameter);
		}
		let ring = Ring::new(kind, scan_count, n_channels);
		let state = Arc::new(EngineState {
			usb,
			ring,
			scan_count,
			n_channels,
			kind,
			status: Mutex::new(StatusState {
				status: Status::NotStarted,
				exit_code: None,
				usb_fail_count: 0,
				dropped_packet_count: 0,
			}),
			config: Mutex::new(registry_config),
		});
		Ok(Self { state, worker: Mutex::new(None) })
	}

	fn ensure_not_running(&self) -> Result<(), Error> {
		if self.state.status() == Status::Running {
			return Err(Error::InvalidParameter);
		}
		Ok(())
	}

	/// # Errors
	/// [`Error::InvalidParameter`] while the engine is `Running`.
	pub fn set_clock(&self, hz: u32) -> Result<(), Error> {
		self.ensure_not_running()?;
		self.state.config.with_lock_mut(|c| c.sample_rate_hz = hz).expect("config mutex poisoned");
		Ok(())
	}

	/// # Errors
	/// [`Error::InvalidParameter`] while the engine is `Running`.
	pub fn set_oversample(&self, k: u8) -> Result<(), Error> {
		self.ensure_not_running()?;
		self.state.config.with_lock_mut(|c| c.oversample = k).expect("config mutex poisoned");
		Ok(())
	}

	/// Sets the gain code for channels `start..end`.
	///
	/// # Errors
	/// [`Error::InvalidParameter`] if the range is out of bounds, or the engine is `Running`.
	pub fn set_gain_range(&self, start: usize, end: usize, code: aio_calibration::GainCode) -> Result<(), Error> {
		self.ensure_not_running()?;
		self.state
			.config
			.with_lock_mut(|c| {
				if start >= end || end > c.gain_codes.len() {
					return Err(Error::InvalidParameter);
				}
				c.gain_codes[start..end].fill(code);
				Ok(())
			})
			.expect("config mutex poisoned")
	}

	/// # Errors
	/// [`Error::InvalidParameter`] while the engine is `Running`.
	pub fn set_differential(&self, differential: bool) -> Result<(), Error> {
		self.ensure_not_running()?;
		self.state.config.with_lock_mut(|c| c.differential = differential).expect("config mutex poisoned");
		Ok(())
	}

	/// # Errors
	/// [`Error::InvalidParameter`] while the engine is `Running`.
	pub fn set_discard_first(&self, discard_first: bool) -> Result<(), Error> {
		self.ensure_not_running()?;
		self.state.config.with_lock_mut(|c| c.discard_first = discard_first).expect("config mutex poisoned");
		Ok(())
	}

	/// # Errors
	/// [`Error::InvalidParameter`] while the engine is `Running`.
	pub fn set_testing(&self, testing: bool) -> Result<(), Error> {
		self.ensure_not_running()?;
		self.state.config.with_lock_mut(|c| c.testing = testing).expect("config mutex poisoned");
		Ok(())
	}

	/// Runs the bring-up sequence and spawns the producer worker.
	///
	/// # Errors
	/// Any bring-up step's [`Error`]. The worker is never spawned if bring-up fails.
	pub fn start(&self) -> Result<(), Error> {
		{
			let status = self.state.status();
			if status != Status::NotStarted {
				return Err(Error::InvalidParameter);
			}
		}

		let timeout = self.state.config.with_lock(|c| c.timeout).expect("config mutex poisoned");
		let sample_rate_hz =
			self.state.config.with_lock(|c| c.sample_rate_hz).expect("config mutex poisoned");

		bringup::reset_counters(self.state.usb.as_ref(), timeout)?;
		self.apply_configuration(timeout)?;
		let divisors = aio_clock::solve(sample_rate_hz).map_err(|_| Error::InvalidParameter)?;
		bringup::start_streaming(self.state.usb.as_ref(), timeout)?;
		bringup::load_counters(self.state.usb.as_ref(), divisors.a, divisors.b, timeout)?;

		self.state.ring.reset();
		self.state.status.with_lock_mut(|s| s.status = Status::Running).expect("status mutex poisoned");

		let state = self.state.clone();
		let handle = std::thread::Builder::new()
			.name("aio-stream-worker".into())
			.spawn(move || worker::run(&state))
			.expect("failed to spawn producer worker thread");
		*self.worker.lock().expect("worker handle mutex poisoned") = Some(handle);

		tracing::debug!(sample_rate_hz, "stream engine started");
		Ok(())
	}

	fn apply_configuration(&self, timeout: Duration) -> Result<(), Error> {
		let testing = self.state.config.with_lock(|c| c.testing).expect("config mutex poisoned");
		if !testing {
			bringup::probe_cal_feature(self.state.usb.as_ref(), timeout)?;
		}

		// The configuration-block encoder that pushes gain codes and scan range to the
		// device is an external collaborator; this only performs the size bookkeeping the
		// engine itself needs before committing to a clock divisor search.
		self.state
			.config
			.with_lock(|c| {
				if c.num_channels > 16 {
					tracing::debug!(channels = c.num_channels, "expanding configuration register size");
				}
			})
			.expect("config mutex poisoned");
		Ok(())
	}

	/// Requests a transition to `Terminated`. Idempotent.
	pub fn stop(&self) {
		self.state
			.status
			.with_lock_mut(|s| {
				if s.status == Status::Running {
					s.status = Status::Terminated;
				}
			})
			.expect("status mutex poisoned");
	}

	/// Waits for the producer worker to exit and transitions to `Joined`.
	///
	/// # Panics
	/// If the worker thread panicked.
	pub fn join(&self) {
		let handle = self.worker.lock().expect("worker handle mutex poisoned").take();
		if let Some(handle) = handle {
			handle.join().expect("producer worker thread panicked");
		}
		self.state.status.with_lock_mut(|s| s.status = Status::Joined).expect("status mutex poisoned");
	}

	#[must_use]
	pub fn status(&self) -> Status {
		self.state.status()
	}

	#[must_use]
	pub fn exit_code(&self) -> Option<Error> {
		self.state.status.with_lock(|s| s.exit_code.clone()).expect("status mutex poisoned")
	}

	#[must_use]
	pub fn dropped_packet_count(&self) -> u64 {
		self.state.status.with_lock(|s| s.dropped_packet_count).expect("status mutex poisoned")
	}

	#[must_use]
	pub fn scans_available(&self) -> usize {
		self.state.ring.scans_available()
	}

	#[must_use]
	pub fn write_position(&self) -> usize {
		match &self.state.ring {
			Ring::Counts(r) => r.write_position(),
			Ring::Volts(r) => r.write_position(),
		}
	}

	#[must_use]
	pub fn read_position(&self) -> usize {
		match &self.state.ring {
			Ring::Counts(r) => r.read_position(),
			Ring::Volts(r) => r.read_position(),
		}
	}

	/// Reads up to `dst.len()` raw counts. Only valid when the engine was built with
	/// [`ElementKind::Counts`].
	///
	/// # Errors
	/// [`Error::InvalidParameter`] if the engine was built with [`ElementKind::Volts`].
	pub fn read_counts(&self, dst: &mut [u16]) -> Result<usize, Error> {
		match &self.state.ring {
			Ring::Counts(r) => Ok(r.read(dst)),
			Ring::Volts(_) => Err(Error::InvalidParameter),
		}
	}

	/// Reads up to `dst.len()` calibrated volts. Only valid when the engine was built with
	/// [`ElementKind::Volts`].
	///
	/// # Errors
	/// [`Error::InvalidParameter`] if the engine was built with [`ElementKind::Counts`].
	pub fn read_volts(&self, dst: &mut [f32]) -> Result<usize, Error> {
		match &self.state.ring {
			Ring::Volts(r) => Ok(r.read(dst)),
			Ring::Counts(_) => Err(Error::InvalidParameter),
		}
	}

	/// Pops up to `num_scans` complete scans (`num_scans * n_channels` counts) into `dst`,
	/// returning the number of full scans actually popped.
	///
	/// # Errors
	/// [`Error::InvalidBuffer`] if `dst` can't hold `num_scans` scans, or
	/// [`Error::InvalidParameter`] if the engine was built with [`ElementKind::Volts`].
	pub fn pop_scans_counts(&self, dst: &mut [u16], num_scans: usize) -> Result<usize, Error> {
		let Ring::Counts(ring) = &self.state.ring else {
			return Err(Error::InvalidParameter);
		};
		pop_scans(ring, dst, num_scans, self.state.n_channels)
	}

	/// Pops up to `num_scans` complete scans (`num_scans * n_channels` volts) into `dst`,
	/// returning the number of full scans actually popped.
	///
	/// # Errors
	/// [`Error::InvalidBuffer`] if `dst` can't hold `num_scans` scans, or
	/// [`Error::InvalidParameter`] if the engine was built with [`ElementKind::Counts`].
	pub fn pop_scans_volts(&self, dst: &mut [f32], num_scans: usize) -> Result<usize, Error> {
		let Ring::Volts(ring) = &self.state.ring else {
			return Err(Error::InvalidParameter);
		};
		pop_scans(ring, dst, num_scans, self.state.n_channels)
	}
}

fn pop_scans<T: Copy + Default>(
	ring: &RingBuffer<T>,
	dst: &mut [T],
	num_scans: usize,
	n_channels: usize,
) -> Result<usize, Error> {
	let requested = num_scans * n_channels;
	if dst.len() < requested {
		return Err(Error::InvalidBuffer);
	}
	let available_scans = ring.scans_available().min(num_scans);
	let n = ring.read(&mut dst[..available_scans * n_channels]);
	Ok(n / n_channels.max(1))
}

impl Drop for StreamEngine {
	fn drop(&mut self) {
		if self.state.status() != Status::Joined {
			self.stop();
			self.join();
		}
	}
}
