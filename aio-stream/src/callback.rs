//! An optional push-style dispatcher: a thread distinct from the producer that polls for new
//! scans and forwards them to a caller-supplied closure.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::engine::{Status, StreamEngine};

/// What the dispatcher does after invoking a [`StreamCallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
	Continue,
	Stop,
}

impl From<i64> for CallbackAction {
	fn from(code: i64) -> Self {
		if code < 0 {
			Self::Stop
		} else {
			Self::Continue
		}
	}
}

/// A closure invoked by the dispatcher thread on each poll. Returning a negative value
/// requests `stop()`.
pub type StreamCallback<Ctx> = Box<dyn FnMut(&StreamEngine, &mut Ctx) -> i64 + Send>;

impl StreamEngine {
	/// Spawns a dispatcher thread that polls the engine at `poll_interval` and invokes
	/// `callback` on every tick, regardless of whether new scans have landed. It's up to
	/// `callback` to check `scans_available` and decide whether there's anything to do.
	///
	/// Never blocks on producer progress. Exits once `callback` returns a negative value
	/// (calling `stop()` first) or the engine leaves `Running` on its own.
	#[must_use]
	pub fn run_with_callback<Ctx>(
		engine: Arc<Self>,
		mut ctx: Ctx,
		poll_interval: Duration,
		mut callback: StreamCallback<Ctx>,
	) -> JoinHandle<()>
	where
		Ctx: Send + 'static,
	{
		thread::Builder::new()
			.name("aio-stream-dispatcher".into())
			.spawn(move || loop {
				let action = CallbackAction::from(callback(&engine, &mut ctx));
				if action == CallbackAction::Stop {
					engine.stop();
					break;
				}
				if engine.status() != Status::Running {
					break;
				}
				thread::sleep(poll_interval);
			})
			.expect("failed to spawn callback dispatcher thread")
	}
}
