//! Validated identity-provider metadata.

// crates.io
use url::Host;
// self
use crate::{_prelude::*, error::ConfigError};

/// How client credentials reach the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	/// Form POST body parameters for `client_id`/`client_secret`.
	#[default]
	ClientSecretPost,
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
}

/// Identity provider consumed by the refresh flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityProvider {
	/// Issuer URL.
	pub issuer: Url,
	/// Token endpoint used for `grant_type=refresh_token`.
	pub token_endpoint: Url,
	/// Client authentication mode.
	pub client_auth: ClientAuthMethod,
}
impl IdentityProvider {
	/// Token endpoint path relative to the issuer.
	pub const TOKEN_PATH: &'static str = "oauth/v2/token";

	/// Builds a provider from its issuer URL, deriving `{issuer}/oauth/v2/token`.
	///
	/// Plain `http` is only accepted for loopback hosts.
	pub fn from_issuer(issuer: &str) -> Result<Self, ConfigError> {
		let issuer =
			Url::parse(issuer).map_err(|source| ConfigError::InvalidProviderUrl { source })?;

		ensure_secure(&issuer)?;

		let base = issuer.as_str().trim_end_matches('/');
		let token_endpoint = Url::parse(&format!("{base}/{}", Self::TOKEN_PATH))
			.map_err(|source| ConfigError::InvalidProviderUrl { source })?;

		Ok(Self { issuer, token_endpoint, client_auth: ClientAuthMethod::default() })
	}

	/// Overrides the client authentication mode.
	pub fn with_client_auth(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth = method;

		self
	}
}

fn ensure_secure(url: &Url) -> Result<(), ConfigError> {
	let loopback = match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => ip.is_loopback(),
		Some(Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	};

	match url.scheme() {
		"https" => Ok(()),
		"http" if loopback => Ok(()),
		_ => Err(ConfigError::InsecureProviderUrl { url: url.to_string() }),
	}
}
