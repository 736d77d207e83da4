//! Redis-backed [`SubjectLock`] shared by every server instance.
//!
//! Acquisition is `SET key token NX PX lease` polled every `retry_interval` until the deadline.
//! The lease bounds how long a crashed holder can block others. Release deletes the key only
//! when it still carries the holder's token, so a holder whose lease lapsed never frees a lock
//! that someone else has since taken.

// crates.io
use redis::{Script, aio::ConnectionManager};
use tokio::time::{self as tokio_time, Instant};
// self
use crate::{
	_prelude::*,
	lock::{LockError, LockFuture, LockGuard, LockLease, SubjectLock},
};

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
	return redis.call("DEL", KEYS[1])
else
	return 0
end
"#;

/// Default lease applied to every acquired lock.
pub const DEFAULT_LEASE: Duration = Duration::seconds(30);
/// Default polling interval while the lock is contended.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::milliseconds(100);

/// Distributed lock over a Redis connection manager.
#[derive(Clone)]
pub struct RedisLock {
	conn: ConnectionManager,
	lease: Duration,
	retry_interval: Duration,
}
impl RedisLock {
	/// Creates a lock with the default lease and retry interval.
	pub fn new(conn: ConnectionManager) -> Self {
		Self { conn, lease: DEFAULT_LEASE, retry_interval: DEFAULT_RETRY_INTERVAL }
	}

	/// Overrides the lease; keep it longer than a refresh round-trip.
	pub fn with_lease(mut self, lease: Duration) -> Self {
		self.lease = lease.max(Duration::milliseconds(1));

		self
	}

	/// Overrides the polling interval.
	pub fn with_retry_interval(mut self, interval: Duration) -> Self {
		self.retry_interval = interval.max(Duration::milliseconds(1));

		self
	}

	fn map_err(e: redis::RedisError) -> LockError {
		LockError::Backend { message: format!("Redis error: {e}") }
	}
}
impl Debug for RedisLock {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RedisLock")
			.field("lease", &self.lease)
			.field("retry_interval", &self.retry_interval)
			.finish_non_exhaustive()
	}
}
impl SubjectLock for RedisLock {
	fn acquire<'a>(&'a self, key: &'a str, timeout: Duration) -> LockFuture<'a, LockGuard> {
		let mut conn = self.conn.clone();
		let token = hex::encode(rand::random::<[u8; 16]>());
		let lease_ms = u64::try_from(self.lease.whole_milliseconds()).unwrap_or(u64::MAX);
		let wait = timeout.max(Duration::ZERO);

		Box::pin(async move {
			let started = Instant::now();
			let deadline = started + wait.unsigned_abs();

			loop {
				let acquired: Option<String> = redis::cmd("SET")
					.arg(key)
					.arg(&token)
					.arg("NX")
					.arg("PX")
					.arg(lease_ms)
					.query_async(&mut conn)
					.await
					.map_err(Self::map_err)?;

				if acquired.is_some() {
					let lease = RedisLease { conn, key: key.to_owned(), token };

					return Ok(LockGuard::new(key, Box::new(lease)));
				}

				let now = Instant::now();

				if now >= deadline {
					return Err(LockError::Timeout { key: key.to_owned(), waited: wait });
				}

				tokio_time::sleep(self.retry_interval.unsigned_abs().min(deadline - now)).await;
			}
		})
	}
}

struct RedisLease {
	conn: ConnectionManager,
	key: String,
	token: String,
}
impl RedisLease {
	async fn delete_if_owned(mut self) -> Result<(), LockError> {
		let _: i64 = Script::new(RELEASE_SCRIPT)
			.key(&self.key)
			.arg(&self.token)
			.invoke_async(&mut self.conn)
			.await
			.map_err(RedisLock::map_err)?;

		Ok(())
	}
}
impl LockLease for RedisLease {
	fn release(self: Box<Self>) -> LockFuture<'static, ()> {
		Box::pin((*self).delete_if_owned())
	}

	fn release_detached(self: Box<Self>) {
		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				handle.spawn(async move {
					let key = self.key.clone();

					if let Err(e) = (*self).delete_if_owned().await {
						tracing::warn!(
							key = %key,
							error = %e,
							"Detached lock release failed; lease will expire."
						);
					}
				});
			},
			Err(_) => {
				tracing::warn!(
					key = %self.key,
					"No runtime to release dropped lock; lease will expire."
				);
			},
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn release_script_compares_before_delete() {
		assert!(RELEASE_SCRIPT.contains("GET"));
		assert!(RELEASE_SCRIPT.find("GET") < RELEASE_SCRIPT.find("DEL"));
	}
}
