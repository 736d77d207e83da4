// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for refresh attempts.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	live_calls: AtomicU64,
	adoptions: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the total number of refresh attempts.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of calls made to the token endpoint.
	pub fn live_calls(&self) -> u64 {
		self.live_calls.load(Ordering::Relaxed)
	}

	/// Returns the number of refreshes satisfied by another instance's rotation.
	pub fn adoptions(&self) -> u64 {
		self.adoptions.load(Ordering::Relaxed)
	}

	/// Returns the number of successful refreshes (live or adopted).
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed refreshes.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_live_call(&self) {
		self.live_calls.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_adoption(&self) {
		self.adoptions.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}
}
