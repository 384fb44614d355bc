//! The continuous-acquisition engine: ring-buffered streaming built from [`aio_ring_buffer`],
//! USB bring-up and data-plane transforms from [`aio_usb`], [`aio_cull`], and
//! [`aio_calibration`], and a clock divisor search from [`aio_clock`].

mod bringup;
mod callback;
mod config;
mod engine;
mod error;
mod worker;

pub use callback::{CallbackAction, StreamCallback};
pub use config::{ElementKind, StreamConfig, StreamConfigRecord};
pub use engine::{Status, StreamEngine};
pub use error::{ConfigError, Error};
