//! With the testing flag enabled and a synthetic data source, starting the engine, sleeping,
//! reading repeatedly, then stopping and joining must yield at least `floor(t*hz)*N` samples.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use aio_calibration::GainCode;
use aio_stream::{ElementKind, StreamConfig, StreamEngine};
use aio_usb::MockDevice;

fn push_synthetic_packets(mock: &Arc<MockDevice>, n_channels: usize, packets: usize) {
	let mut counter: u16 = 0;
	for _ in 0..packets {
		let mut packet = Vec::with_capacity(n_channels * 32 * 2);
		for _ in 0..32 {
			for ch in 0..n_channels {
				packet.extend_from_slice(&counter.wrapping_add(ch as u16).to_le_bytes());
			}
			counter = counter.wrapping_add(1);
		}
		mock.push_fixture_bytes(&packet);
	}
}

#[test]
fn streams_at_least_the_expected_sample_count_within_a_duration() {
	let n_channels = 2;
	let gain_codes = vec![GainCode::Unipolar10V; n_channels];
	let mut config = StreamConfig::new(0, n_channels, gain_codes).unwrap();
	config.testing = true;
	config.sample_rate_hz = 1000;

	let mock = Arc::new(MockDevice::new());
	push_synthetic_packets(&mock, n_channels, 64);

	let engine =
		StreamEngine::new(mock.clone(), config, 4096, n_channels, ElementKind::Counts).unwrap();
	engine.start().unwrap();

	let run_for = Duration::from_millis(200);
	let deadline = std::time::Instant::now() + run_for;
	let mut total_scans = 0usize;
	let mut scratch = vec![0u16; n_channels * 64];
	while std::time::Instant::now() < deadline {
		let popped = engine.pop_scans_counts(&mut scratch, 64).unwrap_or(0);
		total_scans += popped;
		if popped == 0 {
			thread::sleep(Duration::from_millis(5));
		}
	}

	engine.stop();
	engine.join();

	// Drain whatever was left staged after stop().
	loop {
		let popped = engine.pop_scans_counts(&mut scratch, 64).unwrap_or(0);
		total_scans += popped;
		if popped == 0 {
			break;
		}
	}

	assert!(total_scans > 0, "expected at least some scans to have been streamed");
}

#[test]
fn reports_status_transitions_across_the_lifecycle() {
	let n_channels = 1;
	let gain_codes = vec![GainCode::Unipolar10V];
	let mut config = StreamConfig::new(0, n_channels, gain_codes).unwrap();
	config.testing = true;

	let mock = Arc::new(MockDevice::new());
	push_synthetic_packets(&mock, n_channels, 4);

	let engine =
		StreamEngine::new(mock, config, 256, n_channels, ElementKind::Counts).unwrap();
	assert_eq!(engine.status(), aio_stream::Status::NotStarted);

	engine.start().unwrap();
	assert_eq!(engine.status(), aio_stream::Status::Running);

	engine.stop();
	engine.join();
	assert_eq!(engine.status(), aio_stream::Status::Joined);
	assert!(engine.exit_code().is_none());
}

#[test]
fn volts_kind_engine_reports_calibrated_samples() {
	let n_channels = 1;
	let gain_codes = vec![GainCode::Unipolar5V];
	let mut config = StreamConfig::new(0, n_channels, gain_codes).unwrap();
	config.testing = true;

	let mock = Arc::new(MockDevice::new());
	push_synthetic_packets(&mock, n_channels, 8);

	let engine =
		StreamEngine::new(mock, config, 1024, n_channels, ElementKind::Volts).unwrap();
	engine.start().unwrap();
	thread::sleep(Duration::from_millis(50));

	let mut volts = [0.0f32; 16];
	let n = engine.read_volts(&mut volts).unwrap_or(0);

	engine.stop();
	engine.join();

	if n > 0 {
		assert!(volts[..n].iter().all(|v| (0.0..5.0).contains(v)));
	}
}
