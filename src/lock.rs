//! Per-subject mutual exclusion for refresh attempts.
//!
//! A [`SubjectLock`] serializes refreshes for one subject across every task and instance sharing
//! the backend, so only one holder ever spends a given refresh token. Acquisition is bounded by
//! a timeout and hands back a scoped [`LockGuard`]: callers release it explicitly on the normal
//! path, and dropping an unreleased guard still frees the lock.

pub mod memory;
#[cfg(feature = "redis")] pub mod redis;

pub use memory::MemoryLock;
#[cfg(feature = "redis")] pub use self::redis::RedisLock;

// self
use crate::_prelude::*;

/// Default bound on lock acquisition.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::seconds(10);

/// Boxed future returned by lock operations.
pub type LockFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LockError>> + 'a + Send>>;

/// Backend contract for keyed mutual exclusion.
pub trait SubjectLock
where
	Self: Send + Sync,
{
	/// Waits until `key` is free or `timeout` elapses.
	///
	/// Only the calling task is suspended; other keys are never blocked.
	fn acquire<'a>(&'a self, key: &'a str, timeout: Duration) -> LockFuture<'a, LockGuard>;
}

/// Backend-specific ownership of an acquired lock.
pub trait LockLease
where
	Self: Send,
{
	/// Releases the lock, reporting backend failures.
	fn release(self: Box<Self>) -> LockFuture<'static, ()>;

	/// Best-effort release used when a guard is dropped without [`LockGuard::release`].
	fn release_detached(self: Box<Self>);
}

/// Lock failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum LockError {
	/// The lock stayed held for longer than the acquisition timeout.
	#[error("Timed out after {waited} waiting for lock `{key}`.")]
	Timeout {
		/// Lock key.
		key: String,
		/// Time spent waiting.
		waited: Duration,
	},
	/// The lock backend failed.
	#[error("Lock backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Scoped handle for an acquired lock.
pub struct LockGuard {
	key: String,
	lease: Option<Box<dyn LockLease>>,
}
impl LockGuard {
	/// Wraps a backend lease for `key`.
	pub fn new(key: impl Into<String>, lease: Box<dyn LockLease>) -> Self {
		Self { key: key.into(), lease: Some(lease) }
	}

	/// Key this guard holds.
	pub fn key(&self) -> &str {
		&self.key
	}

	/// Releases the lock and waits for the backend to confirm.
	pub async fn release(mut self) -> Result<(), LockError> {
		match self.lease.take() {
			Some(lease) => lease.release().await,
			None => Ok(()),
		}
	}
}
impl Drop for LockGuard {
	fn drop(&mut self) {
		if let Some(lease) = self.lease.take() {
			tracing::debug!(key = %self.key, "Releasing dropped lock guard.");

			lease.release_detached();
		}
	}
}
impl Debug for LockGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LockGuard")
			.field("key", &self.key)
			.field("held", &self.lease.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;

	#[derive(Default)]
	struct Counters {
		released: AtomicUsize,
		detached: AtomicUsize,
	}

	struct CountingLease(Arc<Counters>);
	impl LockLease for CountingLease {
		fn release(self: Box<Self>) -> LockFuture<'static, ()> {
			self.0.released.fetch_add(1, Ordering::SeqCst);

			Box::pin(async { Ok(()) })
		}

		fn release_detached(self: Box<Self>) {
			self.0.detached.fetch_add(1, Ordering::SeqCst);
		}
	}

	#[tokio::test]
	async fn explicit_release_skips_detached_path() {
		let counters = Arc::new(Counters::default());
		let guard = LockGuard::new("refresh-lock:u1", Box::new(CountingLease(counters.clone())));

		assert_eq!(guard.key(), "refresh-lock:u1");

		guard.release().await.expect("Release should succeed.");

		assert_eq!(counters.released.load(Ordering::SeqCst), 1);
		assert_eq!(counters.detached.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn dropping_guard_releases_detached() {
		let counters = Arc::new(Counters::default());

		drop(LockGuard::new("refresh-lock:u1", Box::new(CountingLease(counters.clone()))));

		assert_eq!(counters.released.load(Ordering::SeqCst), 0);
		assert_eq!(counters.detached.load(Ordering::SeqCst), 1);
	}
}
