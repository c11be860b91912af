//! Outbound notification fan-out.
//!
//! The change detector enqueues rendered text; the [`Dispatcher`] drains
//! that queue in order and hands every text to each enabled channel.
//! Delivery is best effort: channel failures are logged and dropped.

pub mod channels;
pub mod rate_limiter;
pub mod service;

pub use channels::{LogChannel, NotificationChannel, TelegramChannel, TelegramConfig};
pub use service::{DispatchStats, Dispatcher, configured_channels};
