//! Environment-style configuration.
//!
//! Keys are read through [`config::Environment`], so `ZITADEL_URL` in the process environment
//! lands in [`AppSettings::zitadel_url`]. Tests feed the same keys from a map.

// crates.io
use config::{Config, Environment};
// self
use crate::{
	_prelude::*,
	cache::DEFAULT_KEY_PREFIX,
	error::ConfigError,
	flows::RefreshSettings,
	provider::IdentityProvider,
};

/// Validated runtime configuration.
#[derive(Clone, Deserialize)]
pub struct AppSettings {
	/// OAuth client identifier.
	pub zitadel_client_id: String,
	/// OAuth client secret.
	pub zitadel_client_secret: String,
	/// Issuer URL of the identity provider.
	pub zitadel_url: String,
	/// Redis host.
	#[serde(default = "default_redis_host")]
	pub redis_host: String,
	/// Redis port.
	#[serde(default = "default_redis_port")]
	pub redis_port: u16,
	/// Redis password.
	#[serde(default)]
	pub redis_password: Option<String>,
	/// Redis logical database.
	#[serde(default)]
	pub redis_db: u32,
	/// Passphrase the cache key is derived from; shared by every instance.
	pub token_cache_passphrase: String,
	/// Prefix of cache keys.
	#[serde(default = "default_cache_prefix")]
	pub token_cache_prefix: String,
	/// Refresh lock acquisition timeout, in seconds.
	#[serde(default = "default_lock_timeout_secs")]
	pub token_lock_timeout_secs: u32,
	/// Redis lock lease, in seconds.
	#[serde(default = "default_lock_lease_secs")]
	pub token_lock_lease_secs: u32,
	/// Cache entry lifetime, in seconds.
	#[serde(default = "default_cache_ttl_secs")]
	pub token_cache_ttl_secs: u32,
}
impl AppSettings {
	/// Loads and validates settings from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::load(Environment::default())
	}

	/// Loads and validates settings from `KEY=value` pairs instead of the process environment.
	pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let source = pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();

		Self::load(Environment::default().source(Some(source)))
	}

	fn load(environment: Environment) -> Result<Self, ConfigError> {
		let settings: Self =
			Config::builder().add_source(environment).build()?.try_deserialize()?;

		settings.validate()?;

		Ok(settings)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		for (key, value) in [
			("ZITADEL_CLIENT_ID", &self.zitadel_client_id),
			("ZITADEL_CLIENT_SECRET", &self.zitadel_client_secret),
			("ZITADEL_URL", &self.zitadel_url),
			("REDIS_HOST", &self.redis_host),
			("TOKEN_CACHE_PASSPHRASE", &self.token_cache_passphrase),
			("TOKEN_CACHE_PREFIX", &self.token_cache_prefix),
		] {
			if value.trim().is_empty() {
				return Err(ConfigError::EmptyValue { key });
			}
		}
		for (key, value) in [
			("TOKEN_LOCK_TIMEOUT_SECS", self.token_lock_timeout_secs),
			("TOKEN_LOCK_LEASE_SECS", self.token_lock_lease_secs),
			("TOKEN_CACHE_TTL_SECS", self.token_cache_ttl_secs),
		] {
			if value == 0 {
				return Err(ConfigError::ZeroValue { key });
			}
		}

		Ok(())
	}

	/// Builds the Redis connection URL, embedding the password when one is set.
	pub fn redis_url(&self) -> Result<Url, ConfigError> {
		let mut url =
			Url::parse(&format!("redis://{}:{}/{}", self.redis_host, self.redis_port, self.redis_db))
				.map_err(|_| ConfigError::InvalidRedisUrl)?;

		if let Some(password) = self.redis_password.as_deref().filter(|p| !p.is_empty()) {
			url.set_password(Some(password)).map_err(|_| ConfigError::InvalidRedisUrl)?;
		}

		Ok(url)
	}

	/// Identity provider derived from [`AppSettings::zitadel_url`].
	pub fn identity_provider(&self) -> Result<IdentityProvider, ConfigError> {
		IdentityProvider::from_issuer(&self.zitadel_url)
	}

	/// Lock and cache tunables for the broker.
	pub fn refresh_settings(&self) -> RefreshSettings {
		RefreshSettings {
			lock_timeout: Duration::seconds(self.token_lock_timeout_secs.into()),
			cache_ttl: Duration::seconds(self.token_cache_ttl_secs.into()),
		}
	}

	/// Lease applied to Redis locks.
	pub fn lock_lease(&self) -> Duration {
		Duration::seconds(self.token_lock_lease_secs.into())
	}
}
impl Debug for AppSettings {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AppSettings")
			.field("zitadel_client_id", &self.zitadel_client_id)
			.field("zitadel_client_secret", &"<redacted>")
			.field("zitadel_url", &self.zitadel_url)
			.field("redis_host", &self.redis_host)
			.field("redis_port", &self.redis_port)
			.field("redis_password", &self.redis_password.as_ref().map(|_| "<redacted>"))
			.field("redis_db", &self.redis_db)
			.field("token_cache_passphrase", &"<redacted>")
			.field("token_cache_prefix", &self.token_cache_prefix)
			.field("token_lock_timeout_secs", &self.token_lock_timeout_secs)
			.field("token_lock_lease_secs", &self.token_lock_lease_secs)
			.field("token_cache_ttl_secs", &self.token_cache_ttl_secs)
			.finish()
	}
}

fn default_redis_host() -> String {
	"127.0.0.1".into()
}

fn default_redis_port() -> u16 {
	6379
}

fn default_cache_prefix() -> String {
	DEFAULT_KEY_PREFIX.into()
}

fn default_lock_timeout_secs() -> u32 {
	10
}

fn default_lock_lease_secs() -> u32 {
	30
}

fn default_cache_ttl_secs() -> u32 {
	2_592_000
}
