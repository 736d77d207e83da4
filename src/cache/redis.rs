//! Redis-backed [`TokenCache`] shared by every server instance.

// crates.io
use redis::{AsyncCommands, aio::ConnectionManager};
// self
use crate::{
	_prelude::*,
	auth::SubjectId,
	cache::{CacheError, CacheFuture, CachedTokenEntry, TokenCache, cache_key},
};

/// Stores entries as JSON strings under `"<prefix>-<subject>"` with `SET .. EX`.
#[derive(Clone)]
pub struct RedisCache {
	conn: ConnectionManager,
	prefix: String,
}
impl RedisCache {
	/// Wraps a connection manager; the manager is cheap to clone and reconnects on its own.
	pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
		Self { conn, prefix: prefix.into() }
	}

	fn map_err(e: redis::RedisError) -> CacheError {
		CacheError::Backend { message: format!("Redis error: {e}") }
	}
}
impl Debug for RedisCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RedisCache").field("prefix", &self.prefix).finish_non_exhaustive()
	}
}
impl TokenCache for RedisCache {
	fn get<'a>(&'a self, subject: &'a SubjectId) -> CacheFuture<'a, Option<CachedTokenEntry>> {
		let key = cache_key(&self.prefix, subject);
		let mut conn = self.conn.clone();

		Box::pin(async move {
			let raw: Option<String> = conn.get(&key).await.map_err(Self::map_err)?;

			raw.as_deref().map(CachedTokenEntry::from_json).transpose()
		})
	}

	fn set<'a>(
		&'a self,
		subject: &'a SubjectId,
		entry: CachedTokenEntry,
		ttl: Duration,
	) -> CacheFuture<'a, ()> {
		let key = cache_key(&self.prefix, subject);
		let mut conn = self.conn.clone();

		Box::pin(async move {
			let raw = entry.to_json()?;
			let ttl_secs = u64::try_from(ttl.whole_seconds()).unwrap_or(0).max(1);
			let _: () = conn.set_ex(&key, raw, ttl_secs).await.map_err(Self::map_err)?;

			Ok(())
		})
	}
}
