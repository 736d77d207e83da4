//! Classification of token endpoint failures.

// self
use crate::_prelude::*;

/// Hook that maps token endpoint failures onto the crate's error taxonomy.
///
/// Strategies only see crate-owned data so they stay independent of the HTTP client.
pub trait ProviderStrategy: Send + Sync {
	/// Decides whether a failed refresh was a definitive rejection or a temporary failure.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;
}

/// Canonical provider error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// The provider refused the refresh token or the client; retrying the same request fails.
	Rejected,
	/// The failure is temporary.
	Transient,
}

/// Data describing a failed token endpoint call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
}
impl ProviderErrorContext {
	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth error description.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}
}

/// RFC 6749 heuristics: OAuth error codes first, then the HTTP status.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if let Some(kind) = ctx.oauth_error.as_deref().and_then(classify_code) {
			return kind;
		}

		match ctx.http_status {
			Some(400..=499) if ctx.http_status != Some(429) => ProviderErrorKind::Rejected,
			_ => ProviderErrorKind::Transient,
		}
	}
}

fn classify_code(code: &str) -> Option<ProviderErrorKind> {
	const REJECTED: [&str; 6] = [
		"invalid_grant",
		"invalid_client",
		"unauthorized_client",
		"access_denied",
		"invalid_request",
		"unsupported_grant_type",
	];
	const TRANSIENT: [&str; 2] = ["temporarily_unavailable", "server_error"];

	if REJECTED.iter().any(|known| code.eq_ignore_ascii_case(known)) {
		Some(ProviderErrorKind::Rejected)
	} else if TRANSIENT.iter().any(|known| code.eq_ignore_ascii_case(known)) {
		Some(ProviderErrorKind::Transient)
	} else {
		None
	}
}
