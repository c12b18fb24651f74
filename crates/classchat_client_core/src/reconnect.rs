#![forbid(unsafe_code)]

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

pub const RECONNECT_RESET_AFTER: Duration = Duration::from_secs(60 * 5);

pub const DEFAULT_RECONNECT_MIN_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Capped exponential backoff with +/-10% jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
	pub min_delay: Duration,
	pub max_delay: Duration,
	/// Consecutive failed attempts allowed after a connection is lost; any
	/// successful open restores the full budget. `None` retries forever.
	pub max_attempts: Option<u32>,
	/// A connection that stayed open this long resets the backoff delay.
	/// Shorter sessions keep escalating it so a flapping server is not hammered.
	pub reset_after: Duration,
}

impl Default for ReconnectPolicy {
	fn default() -> Self {
		Self {
			min_delay: DEFAULT_RECONNECT_MIN_DELAY,
			max_delay: DEFAULT_RECONNECT_MAX_DELAY,
			max_attempts: None,
			reset_after: RECONNECT_RESET_AFTER,
		}
	}
}

impl ReconnectPolicy {
	/// Delay before `attempt` (1-based), without jitter.
	pub fn base_delay(&self, attempt: u32) -> Duration {
		let base_ms = self.min_delay.as_millis().max(1) as u64;
		let max_ms = (self.max_delay.as_millis() as u64).max(base_ms);
		let pow = 2u64.saturating_pow(attempt.saturating_sub(1).min(6));
		Duration::from_millis(base_ms.saturating_mul(pow).min(max_ms))
	}

	/// Deadline and jittered delay for `attempt`.
	pub fn schedule(&self, attempt: u32) -> (Instant, Duration) {
		let delay_ms = self.base_delay(attempt).as_millis() as u64;
		let jitter_window = (delay_ms / 10).max(1);
		let mut rng = rand::rng();
		let jitter_offset = rng.random_range(0..=(jitter_window * 2));
		let final_ms = delay_ms.saturating_sub(jitter_window).saturating_add(jitter_offset);
		let delay = Duration::from_millis(final_ms);
		(Instant::now() + delay, delay)
	}

	/// Whether `failures` consecutive failures exceed the budget.
	pub fn exhausted(&self, failures: u32) -> bool {
		self.max_attempts.is_some_and(|max| failures > max)
	}

	/// Next backoff level given the current one and when the last connection opened.
	pub fn next_attempt(&self, attempt: u32, last_open: Option<Instant>) -> u32 {
		match last_open {
			Some(last) if Instant::now().duration_since(last) > self.reset_after => 1,
			_ => attempt.saturating_add(1).max(1),
		}
	}
}
