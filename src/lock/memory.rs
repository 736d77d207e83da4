//! In-process [`SubjectLock`] backed by per-key async mutexes.

// crates.io
use async_lock::{Mutex as AsyncMutex, MutexGuardArc};
// self
use crate::{
	_prelude::*,
	lock::{LockError, LockFuture, LockGuard, LockLease, SubjectLock},
};

type GuardMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Lock shared by tasks of one process; suitable for tests and single-instance deployments.
///
/// A key's entry lives only while some task holds or waits for it.
#[derive(Clone, Debug, Default)]
pub struct MemoryLock {
	guards: GuardMap,
}
impl MemoryLock {
	/// Returns `true` while some task holds `key`.
	pub fn is_held(&self, key: &str) -> bool {
		match self.guards.lock().get(key) {
			Some(mutex) => mutex.try_lock().is_none(),
			None => false,
		}
	}

	fn mutex_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
		let mut guards = self.guards.lock();

		guards.entry(key.to_owned()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
impl SubjectLock for MemoryLock {
	fn acquire<'a>(&'a self, key: &'a str, timeout: Duration) -> LockFuture<'a, LockGuard> {
		let mutex = self.mutex_for(key);
		let wait = timeout.max(Duration::ZERO);

		Box::pin(async move {
			let acquired = tokio::time::timeout(wait.unsigned_abs(), mutex.lock_arc()).await;

			drop(mutex);

			let guard = match acquired {
				Ok(guard) => guard,
				Err(_) => {
					prune(&self.guards, key);

					return Err(LockError::Timeout { key: key.to_owned(), waited: wait });
				},
			};
			let lease = MemoryLease {
				guard: Some(guard),
				guards: Arc::clone(&self.guards),
				key: key.to_owned(),
			};

			Ok(LockGuard::new(key, Box::new(lease)))
		})
	}
}

/// Removes `key` once no task references its mutex.
fn prune(guards: &GuardMap, key: &str) {
	let mut guards = guards.lock();

	if guards.get(key).is_some_and(|mutex| Arc::strong_count(mutex) == 1) {
		guards.remove(key);
	}
}

struct MemoryLease {
	guard: Option<MutexGuardArc<()>>,
	guards: GuardMap,
	key: String,
}
impl Drop for MemoryLease {
	fn drop(&mut self) {
		// The guard owns a reference to the mutex; release it before counting.
		self.guard.take();

		prune(&self.guards, &self.key);
	}
}
impl LockLease for MemoryLease {
	fn release(self: Box<Self>) -> LockFuture<'static, ()> {
		drop(self);

		Box::pin(async { Ok(()) })
	}

	fn release_detached(self: Box<Self>) {
		drop(self);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn second_acquire_times_out_while_held() {
		let lock = MemoryLock::default();
		let guard = lock
			.acquire("refresh-lock:u1", Duration::seconds(1))
			.await
			.expect("First acquire should succeed.");

		assert!(lock.is_held("refresh-lock:u1"));

		let err = lock
			.acquire("refresh-lock:u1", Duration::milliseconds(20))
			.await
			.expect_err("Second acquire should time out.");

		assert!(matches!(err, LockError::Timeout { .. }));

		guard.release().await.expect("Release should succeed.");

		assert!(!lock.is_held("refresh-lock:u1"));
		lock.acquire("refresh-lock:u1", Duration::ZERO)
			.await
			.expect("Released lock should be immediately acquirable.");
	}

	#[tokio::test]
	async fn distinct_keys_do_not_contend() {
		let lock = MemoryLock::default();
		let _first = lock
			.acquire("refresh-lock:u1", Duration::seconds(1))
			.await
			.expect("First key should be acquired.");

		lock.acquire("refresh-lock:u2", Duration::ZERO)
			.await
			.expect("Second key should be acquired without waiting.");
	}

	#[tokio::test]
	async fn idle_keys_are_pruned() {
		let lock = MemoryLock::default();
		let guard = lock
			.acquire("refresh-lock:u1", Duration::seconds(1))
			.await
			.expect("First acquire should succeed.");

		lock.acquire("refresh-lock:u1", Duration::milliseconds(20))
			.await
			.expect_err("Contended acquire should time out.");

		assert_eq!(lock.guards.lock().len(), 1);

		guard.release().await.expect("Release should succeed.");

		assert!(lock.guards.lock().is_empty());

		for subject in ["u1", "u2", "u3"] {
			let key = format!("refresh-lock:{subject}");

			lock.acquire(&key, Duration::seconds(1))
				.await
				.expect("Uncontended acquire should succeed.")
				.release()
				.await
				.expect("Release should succeed.");
		}

		assert!(lock.guards.lock().is_empty());
	}

	#[tokio::test]
	async fn waiter_keeps_key_alive_until_it_releases() {
		let lock = MemoryLock::default();
		let first = lock
			.acquire("refresh-lock:u1", Duration::seconds(1))
			.await
			.expect("First acquire should succeed.");
		let waiter = {
			let lock = lock.clone();

			tokio::spawn(async move {
				lock.acquire("refresh-lock:u1", Duration::seconds(5))
					.await
					.expect("Waiter should acquire once the holder releases.")
					.release()
					.await
					.expect("Waiter release should succeed.");
			})
		};

		tokio::time::sleep(std::time::Duration::from_millis(20)).await;
		first.release().await.expect("Release should succeed.");
		waiter.await.expect("Waiter task should not panic.");

		assert!(lock.guards.lock().is_empty());
	}

	#[tokio::test]
	async fn dropping_guard_frees_lock() {
		let lock = MemoryLock::default();

		{
			let _guard = lock
				.acquire("refresh-lock:u1", Duration::seconds(1))
				.await
				.expect("Acquire should succeed.");
		}

		assert!(!lock.is_held("refresh-lock:u1"));
		assert!(lock.guards.lock().is_empty());
	}
}
