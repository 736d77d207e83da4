//! Process startup and shutdown for the Redis-backed deployment.

// crates.io
use redis::{Client, aio::ConnectionManager};
// self
use crate::{
	_prelude::*,
	cache::{CacheError, RedisCache},
	crypto::TokenCipher,
	flows::ReqwestSessionBroker,
	lock::RedisLock,
	settings::AppSettings,
};

/// Owns the shared Redis connection and the broker wired on top of it.
pub struct SessionRuntime {
	broker: ReqwestSessionBroker,
	conn: ConnectionManager,
}
impl SessionRuntime {
	/// Connects to Redis, derives the cache key, and builds the broker.
	pub async fn start(settings: &AppSettings) -> Result<Self> {
		let url = settings.redis_url()?;

		tracing::info!(url = %mask_redis_url(&url), "Connecting to Redis.");

		let client = Client::open(url.as_str()).map_err(connect_err)?;
		let conn = ConnectionManager::new(client).await.map_err(connect_err)?;
		let cipher = TokenCipher::from_passphrase(&settings.token_cache_passphrase)?;
		let broker = ReqwestSessionBroker::new(
			Arc::new(RedisCache::new(conn.clone(), settings.token_cache_prefix.clone())),
			Arc::new(RedisLock::new(conn.clone()).with_lease(settings.lock_lease())),
			Arc::new(cipher),
			settings.identity_provider()?,
			settings.zitadel_client_id.clone(),
		)?
		.with_client_secret(settings.zitadel_client_secret.clone())
		.with_settings(settings.refresh_settings());

		tracing::info!(issuer = %broker.provider.issuer, "Session runtime started.");

		Ok(Self { broker, conn })
	}

	/// Broker serving the token callback.
	pub fn broker(&self) -> &ReqwestSessionBroker {
		&self.broker
	}

	/// Drops the broker and closes the Redis connection.
	///
	/// Locks still held by in-flight refreshes expire with their lease.
	pub async fn shutdown(self) {
		let Self { broker, conn } = self;
		let metrics = Arc::clone(&broker.refresh_metrics);

		drop(broker);
		drop(conn);

		tracing::info!(
			attempts = metrics.attempts(),
			live_calls = metrics.live_calls(),
			adoptions = metrics.adoptions(),
			failures = metrics.failures(),
			"Session runtime stopped."
		);
	}
}

impl Debug for SessionRuntime {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionRuntime").field("broker", &self.broker).finish_non_exhaustive()
	}
}

fn connect_err(e: redis::RedisError) -> Error {
	CacheError::Backend { message: format!("Redis connection failed: {e}") }.into()
}

/// Renders `url` with its password replaced, for logging.
pub fn mask_redis_url(url: &Url) -> String {
	let mut masked = url.clone();

	if masked.password().is_some() && masked.set_password(Some("****")).is_err() {
		return "<unprintable redis url>".into();
	}

	masked.to_string()
}
