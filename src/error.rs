//! Crate-level error types shared across the refresh flow, cache, lock, and provider client.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error surfaced by the fallible refresh APIs.
///
/// [`SessionBroker::on_token_issued_or_refreshed`](crate::flows::SessionBroker::on_token_issued_or_refreshed)
/// never returns one of these; it converts every failure into the session fault flag.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Shared token cache failure.
	#[error("{0}")]
	Cache(
		#[from]
		#[source]
		crate::cache::CacheError,
	),
	/// Refresh lock could not be acquired or released.
	#[error(transparent)]
	Lock(#[from] crate::lock::LockError),
	/// Cached refresh token could not be sealed or opened.
	#[error(transparent)]
	Crypto(#[from] crate::crypto::CryptoError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Identity provider rejected the refresh (e.g., a rotated or revoked refresh token).
	#[error("Identity provider rejected the refresh: {reason}.")]
	RefreshRejected {
		/// OAuth `error` code returned by the provider.
		code: String,
		/// Provider-supplied description, or the code when none was sent.
		reason: String,
	},
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Issuer or token endpoint URL cannot be parsed.
	#[error("Identity provider URL is invalid.")]
	InvalidProviderUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Issuer uses plain HTTP on a non-loopback host.
	#[error("Identity provider URL `{url}` must use https.")]
	InsecureProviderUrl {
		/// Offending URL.
		url: String,
	},
	/// Environment configuration could not be loaded.
	#[error("Configuration could not be loaded.")]
	Load(#[from] ::config::ConfigError),
	/// A required configuration value was empty.
	#[error("Configuration value `{key}` must not be empty.")]
	EmptyValue {
		/// Environment key.
		key: &'static str,
	},
	/// A numeric configuration value was zero.
	#[error("Configuration value `{key}` must be greater than zero.")]
	ZeroValue {
		/// Environment key.
		key: &'static str,
	},
	/// Redis connection settings do not form a valid URL.
	#[error("Redis connection URL is invalid.")]
	InvalidRedisUrl,

	/// Token record has no refresh token to spend.
	#[error("Token record is missing a refresh token.")]
	MissingRefreshToken,
	/// Refreshed expiry is earlier than the one already held.
	#[error("Refreshed token expires at {refreshed}, before the current expiry {current}.")]
	ExpiryRegressed {
		/// Expiry held before the refresh.
		current: OffsetDateTime,
		/// Expiry returned by the refresh.
		refreshed: OffsetDateTime,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Upstream failures from unexpected or incomplete token endpoint responses.
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint response omitted `id_token`.
	#[error("Token endpoint response is missing id_token.")]
	MissingIdToken,
	/// Token endpoint response carried neither `expires_at` nor `expires_in`.
	#[error("Token endpoint response is missing expires_at and expires_in.")]
	MissingExpiry,
	/// Token endpoint returned an expiry outside the representable range.
	#[error("The token expiry exceeds the supported range.")]
	ExpiryOutOfRange,
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::cache::CacheError;

	#[test]
	fn cache_error_converts_with_source() {
		let cache_error = CacheError::Backend { message: "connection refused".into() };
		let error: Error = cache_error.clone().into();

		assert!(matches!(error, Error::Cache(_)));
		assert!(error.to_string().contains("connection refused"));

		let source = StdError::source(&error)
			.expect("Crate error should expose the original cache error as its source.");

		assert_eq!(source.to_string(), cache_error.to_string());
	}

	#[test]
	fn rejection_message_carries_reason() {
		let error = Error::RefreshRejected {
			code: "invalid_grant".into(),
			reason: "refresh token is invalid".into(),
		};

		assert_eq!(
			error.to_string(),
			"Identity provider rejected the refresh: refresh token is invalid."
		);
	}
}
