//! Session flow orchestration: the token callback and the coordinated refresh behind it.

pub mod refresh;

mod sign_in;

pub use refresh::*;

// self
use crate::{
	_prelude::*,
	cache::{DEFAULT_ENTRY_TTL, TokenCache},
	crypto::TokenCipher,
	http::TokenHttpClient,
	lock::{DEFAULT_ACQUIRE_TIMEOUT, SubjectLock},
	oauth::{ProviderClient, TransportErrorMapper},
	provider::{DefaultProviderStrategy, IdentityProvider, ProviderStrategy},
};
#[cfg(feature = "reqwest")]
use crate::{error::ConfigError, http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestSessionBroker = SessionBroker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Tunables for the coordinated refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshSettings {
	/// Bound on waiting for the per-subject lock.
	pub lock_timeout: Duration,
	/// Lifetime of cache entries written after a live refresh.
	pub cache_ttl: Duration,
}
impl Default for RefreshSettings {
	fn default() -> Self {
		Self { lock_timeout: DEFAULT_ACQUIRE_TIMEOUT, cache_ttl: DEFAULT_ENTRY_TTL }
	}
}

/// Keeps session token records fresh against a single identity provider.
///
/// The broker owns the HTTP client, the shared cache, the distributed lock, and the cache
/// cipher. Clones share all of them, so one broker per process is enough.
#[derive(Clone)]
pub struct SessionBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Shared cache holding the latest rotation per subject.
	pub cache: Arc<dyn TokenCache>,
	/// Per-subject lock serializing refreshes across instances.
	pub lock: Arc<dyn SubjectLock>,
	/// Cipher sealing refresh tokens at rest.
	pub cipher: Arc<TokenCipher>,
	/// Identity provider issuing the tokens.
	pub provider: IdentityProvider,
	/// Strategy classifying token endpoint failures.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// Client secret sent with refresh grants.
	pub client_secret: Option<String>,
	/// Lock and cache tunables.
	pub settings: RefreshSettings,
	/// Shared counters for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
}
impl<C, M> SessionBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker that reuses the caller-provided transport and mapper pair.
	pub fn with_http_client(
		cache: Arc<dyn TokenCache>,
		lock: Arc<dyn SubjectLock>,
		cipher: Arc<TokenCipher>,
		provider: IdentityProvider,
		client_id: impl Into<String>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			cache,
			lock,
			cipher,
			provider,
			strategy: Arc::new(DefaultProviderStrategy),
			client_id: client_id.into(),
			client_secret: None,
			settings: RefreshSettings::default(),
			refresh_metrics: Default::default(),
		}
	}

	/// Sets or replaces the client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Overrides the lock and cache tunables.
	pub fn with_settings(mut self, settings: RefreshSettings) -> Self {
		self.settings = settings;

		self
	}

	/// Replaces the failure classification strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	fn provider_client(&self) -> Result<ProviderClient<C, M>> {
		ProviderClient::from_provider(
			&self.provider,
			&self.client_id,
			self.client_secret.as_deref(),
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)
	}
}
#[cfg(feature = "reqwest")]
impl SessionBroker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a broker with its own reqwest-backed transport.
	pub fn new(
		cache: Arc<dyn TokenCache>,
		lock: Arc<dyn SubjectLock>,
		cipher: Arc<TokenCipher>,
		provider: IdentityProvider,
		client_id: impl Into<String>,
	) -> Result<Self, ConfigError> {
		Ok(Self::with_http_client(
			cache,
			lock,
			cipher,
			provider,
			client_id,
			ReqwestHttpClient::new()?,
			ReqwestTransportErrorMapper,
		))
	}
}
impl<C, M> Debug for SessionBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionBroker")
			.field("provider", &self.provider)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("settings", &self.settings)
			.finish()
	}
}
