//! Shared token cache contracts and built-in backends.
//!
//! The cache holds one [`CachedTokenEntry`] per subject: the sealed refresh token from the last
//! successful refresh plus the identity token and expiry issued with it. Concurrent requests
//! compare their own refresh token against it to detect that another request already rotated.
//! Writes are only legal while holding the subject's refresh lock; backends do not enforce it.

pub mod memory;
#[cfg(feature = "redis")] pub mod redis;

pub use memory::MemoryCache;
#[cfg(feature = "redis")] pub use self::redis::RedisCache;

// self
use crate::{
	_prelude::*,
	auth::{SubjectId, TokenSecret},
	crypto::{CryptoError, SealedSecret, TokenCipher},
};

/// Default key prefix (`"<prefix>-<subject>"`).
pub const DEFAULT_KEY_PREFIX: &str = "openchokin";
/// Default lifetime of a cache entry without renewal (30 days).
pub const DEFAULT_ENTRY_TTL: Duration = Duration::seconds(2_592_000);

/// Boxed future returned by [`TokenCache`] operations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + 'a + Send>>;

/// Keyed store shared by every server instance.
pub trait TokenCache
where
	Self: Send + Sync,
{
	/// Fetches the entry for `subject`, if present and not expired.
	fn get<'a>(&'a self, subject: &'a SubjectId) -> CacheFuture<'a, Option<CachedTokenEntry>>;

	/// Unconditionally overwrites the entry for `subject`, expiring it after `ttl`.
	fn set<'a>(
		&'a self,
		subject: &'a SubjectId,
		entry: CachedTokenEntry,
		ttl: Duration,
	) -> CacheFuture<'a, ()>;
}

/// Error type produced by [`TokenCache`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CacheError {
	/// Entry could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// The backing store failed.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Durable mirror of a subject's refresh-sensitive token fields.
///
/// Serialized as `{"refreshToken": hex, "idToken": str, "expiresAt": secs, "iv": hex}`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedTokenEntry {
	/// Hex ciphertext of the refresh token.
	pub refresh_token: String,
	/// Identity token issued with that refresh token.
	pub id_token: TokenSecret,
	/// Expiry of `id_token`.
	#[serde(with = "time::serde::timestamp")]
	pub expires_at: OffsetDateTime,
	/// Hex IV used to seal `refresh_token`.
	pub iv: String,
}
impl CachedTokenEntry {
	/// Seals `refresh_token` and bundles it with its companion fields.
	pub fn seal(
		cipher: &TokenCipher,
		refresh_token: &TokenSecret,
		id_token: TokenSecret,
		expires_at: OffsetDateTime,
	) -> Result<Self, CryptoError> {
		let SealedSecret { ciphertext, iv } = cipher.seal(refresh_token.expose())?;

		Ok(Self { refresh_token: ciphertext, id_token, expires_at, iv })
	}

	/// Decrypts the stored refresh token.
	pub fn open_refresh_token(&self, cipher: &TokenCipher) -> Result<TokenSecret, CryptoError> {
		let sealed = SealedSecret { ciphertext: self.refresh_token.clone(), iv: self.iv.clone() };

		cipher.open(&sealed).map(TokenSecret::new)
	}

	/// Encodes the entry as the JSON document stored in the backend.
	pub fn to_json(&self) -> Result<String, CacheError> {
		serde_json::to_string(self)
			.map_err(|e| CacheError::Serialization { message: e.to_string() })
	}

	/// Decodes an entry from its stored JSON document.
	pub fn from_json(raw: &str) -> Result<Self, CacheError> {
		serde_json::from_str(raw).map_err(|e| CacheError::Serialization { message: e.to_string() })
	}
}
impl Debug for CachedTokenEntry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CachedTokenEntry")
			.field("refresh_token", &"<sealed>")
			.field("id_token", &self.id_token)
			.field("expires_at", &self.expires_at)
			.field("iv", &self.iv)
			.finish()
	}
}

/// Builds the backend key for `subject`.
pub fn cache_key(prefix: &str, subject: &SubjectId) -> String {
	format!("{prefix}-{subject}")
}
