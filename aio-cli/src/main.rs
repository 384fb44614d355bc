//! Drives an [`aio_stream::StreamEngine`] end to end: parses CLI/JSON configuration,
//! initializes logging, starts acquisition, and prints samples as they arrive.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use aio_stream::{ElementKind, StreamConfigRecord, StreamEngine};
use aio_usb::{MockDevice, RusbDevice, UsbTransport};
use anyhow::{bail, Context, Result};
use clap::Parser;
use rusb::UsbContext;

/// Stream an AIO USB ADC device, or a synthetic fixture in testing mode.
#[derive(Parser, Debug)]
#[command(name = "aio-stream-cli", version, about)]
struct Cli {
	/// Path to a JSON configuration record (see `StreamConfigRecord`).
	#[arg(long)]
	config: PathBuf,

	/// Run against an in-process mock device instead of real hardware, feeding it a
	/// deterministic synthetic fixture. Overrides the config record's `testing` flag.
	#[arg(long)]
	testing: bool,

	/// USB vendor ID of the real device to open (ignored in `--testing` mode).
	#[arg(long, default_value_t = 0x0954)]
	vendor_id: u16,

	/// USB product ID of the real device to open (ignored in `--testing` mode).
	#[arg(long)]
	product_id: Option<u16>,

	/// Sample rate in Hz.
	#[arg(long, default_value_t = 1000)]
	rate_hz: u32,

	/// Output element kind.
	#[arg(long, value_enum, default_value_t = Kind::Counts)]
	kind: Kind,

	/// Number of scans (scan_count) the ring buffer can hold.
	#[arg(long, default_value_t = 1024)]
	scan_count: usize,

	/// How long to stream before stopping.
	#[arg(long, default_value_t = 2)]
	duration_secs: u64,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum Kind {
	Counts,
	Volts,
}

fn main() -> Result<()> {
	tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

	let cli = Cli::parse();
	let record = StreamConfigRecord::from_json_file(&cli.config)
		.with_context(|| format!("loading config from {}", cli.config.display()))?;
	let mut config = record.into_stream_config().context("validating stream configuration")?;
	config.sample_rate_hz = cli.rate_hz;
	config.testing = config.testing || cli.testing;

	let n_channels = config.num_channels;
	let kind = match cli.kind {
		Kind::Counts => ElementKind::Counts,
		Kind::Volts => ElementKind::Volts,
	};

	let usb: Arc<dyn UsbTransport + Send + Sync> = if config.testing {
		let mock = Arc::new(MockDevice::new());
		spawn_synthetic_source(Arc::clone(&mock), n_channels);
		mock
	} else {
		open_real_device(cli.vendor_id, cli.product_id)?
	};

	let engine = StreamEngine::new(usb, config, cli.scan_count, n_channels, kind)
		.context("constructing stream engine")?;

	engine.start().context("starting stream engine")?;
	tracing::info!(rate_hz = cli.rate_hz, n_channels, "streaming started");

	let deadline = Duration::from_secs(cli.duration_secs);
	let start = std::time::Instant::now();
	let mut scratch = vec![0u16; n_channels * 64];
	let mut printed = 0usize;

	while start.elapsed() < deadline {
		let popped = engine.pop_scans_counts(&mut scratch, 64).unwrap_or(0);
		if popped > 0 {
			printed += popped;
			tracing::debug!(popped, total = printed, "popped scans");
		} else {
			thread::sleep(Duration::from_millis(20));
		}
		if let Some(err) = engine.exit_code() {
			tracing::error!(%err, "engine reported a fatal error");
			break;
		}
	}

	engine.stop();
	engine.join();
	println!("collected {printed} scans ({} samples)", printed * n_channels);

	Ok(())
}

/// Opens a real device via `rusb`, matching on vendor ID and (optionally) product ID.
fn open_real_device(vendor_id: u16, product_id: Option<u16>) -> Result<Arc<dyn UsbTransport + Send + Sync>> {
	let context = rusb::Context::new().context("initializing libusb context")?;
	for device in context.devices().context("listing usb devices")?.iter() {
		let descriptor = device.device_descriptor().context("reading device descriptor")?;
		if descriptor.vendor_id() != vendor_id {
			continue;
		}
		if let Some(pid) = product_id {
			if descriptor.product_id() != pid {
				continue;
			}
		}
		let handle = device.open().context("opening usb device")?;
		return Ok(Arc::new(RusbDevice::new(handle)));
	}
	bail!("no matching usb device found for vendor id {vendor_id:#06x}");
}

/// Feeds the mock device a repeating synthetic packet so `--testing` mode has something to
/// stream: one ramp per channel, no oversampling.
fn spawn_synthetic_source(mock: Arc<MockDevice>, n_channels: usize) {
	thread::spawn(move || {
		let mut counter: u16 = 0;
		loop {
			let mut packet = Vec::with_capacity(n_channels * 32 * 2);
			for _ in 0..32 {
				for ch in 0..n_channels {
					let sample = counter.wrapping_add(ch as u16);
					packet.extend_from_slice(&sample.to_le_bytes());
				}
				counter = counter.wrapping_add(1);
			}
			mock.push_fixture_bytes(&packet);
			thread::sleep(Duration::from_millis(10));
		}
	});
}
