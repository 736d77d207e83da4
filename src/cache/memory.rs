//! In-process [`TokenCache`] for tests and single-instance deployments.

// self
use crate::{
	_prelude::*,
	auth::SubjectId,
	cache::{CacheFuture, CachedTokenEntry, DEFAULT_KEY_PREFIX, TokenCache, cache_key},
};

type CacheMap = Arc<RwLock<HashMap<String, Slot>>>;

#[derive(Clone, Debug)]
struct Slot {
	entry: CachedTokenEntry,
	expires_at: OffsetDateTime,
}

/// Thread-safe cache that keeps entries in-process; TTLs are enforced lazily on read.
#[derive(Clone, Debug)]
pub struct MemoryCache {
	prefix: String,
	map: CacheMap,
	writes: Arc<Mutex<u64>>,
}
impl MemoryCache {
	/// Creates an empty cache using `prefix` for its keys.
	pub fn with_prefix(prefix: impl Into<String>) -> Self {
		Self { prefix: prefix.into(), map: Default::default(), writes: Default::default() }
	}

	/// Number of `set` calls served so far.
	pub fn write_count(&self) -> u64 {
		*self.writes.lock()
	}

	/// Number of live (unexpired) entries.
	pub fn len(&self) -> usize {
		let now = OffsetDateTime::now_utc();

		self.map.read().values().filter(|slot| slot.expires_at > now).count()
	}

	/// Returns `true` when no live entry exists.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn get_now(map: CacheMap, key: String, now: OffsetDateTime) -> Option<CachedTokenEntry> {
		{
			let guard = map.read();

			match guard.get(&key) {
				Some(slot) if slot.expires_at > now => return Some(slot.entry.clone()),
				Some(_) => {},
				None => return None,
			}
		}

		map.write().remove(&key);

		None
	}
}
impl Default for MemoryCache {
	fn default() -> Self {
		Self::with_prefix(DEFAULT_KEY_PREFIX)
	}
}
impl TokenCache for MemoryCache {
	fn get<'a>(&'a self, subject: &'a SubjectId) -> CacheFuture<'a, Option<CachedTokenEntry>> {
		let map = self.map.clone();
		let key = cache_key(&self.prefix, subject);

		Box::pin(async move { Ok(Self::get_now(map, key, OffsetDateTime::now_utc())) })
	}

	fn set<'a>(
		&'a self,
		subject: &'a SubjectId,
		entry: CachedTokenEntry,
		ttl: Duration,
	) -> CacheFuture<'a, ()> {
		let key = cache_key(&self.prefix, subject);
		let expires_at = OffsetDateTime::now_utc() + ttl;

		Box::pin(async move {
			self.map.write().insert(key, Slot { entry, expires_at });

			*self.writes.lock() += 1;

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::TokenSecret;

	fn entry(id_token: &str) -> CachedTokenEntry {
		CachedTokenEntry {
			refresh_token: "00".into(),
			id_token: TokenSecret::new(id_token),
			expires_at: macros::datetime!(2025-01-01 00:00 UTC),
			iv: "00".into(),
		}
	}

	#[tokio::test]
	async fn set_overwrites_and_get_returns_latest() {
		let cache = MemoryCache::default();
		let subject = SubjectId::new("u1").expect("Subject fixture should be valid.");

		assert!(cache.get(&subject).await.expect("Get should succeed.").is_none());

		cache.set(&subject, entry("id-1"), Duration::hours(1)).await.expect("Set should succeed.");
		cache.set(&subject, entry("id-2"), Duration::hours(1)).await.expect("Set should succeed.");

		let fetched =
			cache.get(&subject).await.expect("Get should succeed.").expect("Entry should exist.");

		assert_eq!(fetched.id_token.expose(), "id-2");
		assert_eq!(cache.write_count(), 2);
		assert_eq!(cache.len(), 1);
	}

	#[tokio::test]
	async fn expired_entries_are_evicted_on_read() {
		let cache = MemoryCache::default();
		let subject = SubjectId::new("u1").expect("Subject fixture should be valid.");

		cache
			.set(&subject, entry("id-1"), Duration::seconds(-1))
			.await
			.expect("Set should succeed.");

		assert!(cache.get(&subject).await.expect("Get should succeed.").is_none());
		assert!(cache.is_empty());
	}
}
