//! OAuth client facade for the refresh grant.
//!
//! The identity provider answers a refresh with an OIDC token response: besides the standard
//! fields it carries `id_token` and, for some deployments, an absolute `expires_at`. Both are
//! modeled as [`IdTokenFields`] so the stock `oauth2` request machinery can parse them.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet, ExtraTokenFields,
	HttpClientError, RefreshToken, RequestTokenError, StandardRevocableToken, StandardTokenResponse,
	TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, TransientError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::{
		ClientAuthMethod, IdentityProvider, ProviderErrorContext, ProviderErrorKind,
		ProviderStrategy,
	},
};
#[cfg(feature = "reqwest")] use crate::error::TransportError;

/// Token response returned by the refresh grant.
pub type IdTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

type RefreshClient = Client<
	BasicErrorResponse,
	IdTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// OIDC fields carried next to the standard token response fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdTokenFields {
	/// Identity assertion.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
	/// Absolute expiry in seconds since the epoch.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub expires_at: Option<i64>,
}
impl ExtraTokenFields for IdTokenFields {}

/// Outcome of a successful refresh grant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshedTokens {
	/// New identity assertion.
	pub id_token: TokenSecret,
	/// Rotated refresh token; `None` when the provider kept the old one.
	pub refresh_token: Option<TokenSecret>,
	/// Expiry of `id_token`.
	pub expires_at: OffsetDateTime,
}

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	fn map_transport_error(
		&self,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_generic_transport_error(meta, "unknown transport failure"),
		}
	}
}

/// Refresh-grant client bound to one identity provider and one OAuth client.
pub struct ProviderClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: RefreshClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> ProviderClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Configures the client for `provider`'s token endpoint.
	pub fn from_provider(
		provider: &IdentityProvider,
		client_id: &str,
		client_secret: Option<&str>,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let token_url = TokenUrl::new(provider.token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidProviderUrl { source })?;
		let mut oauth_client: RefreshClient = Client::new(ClientId::new(client_id.to_owned()))
			.set_token_uri(token_url)
			.set_auth_type(match provider.client_auth {
				ClientAuthMethod::ClientSecretPost => AuthType::RequestBody,
				ClientAuthMethod::ClientSecretBasic => AuthType::BasicAuth,
			});

		if let Some(secret) = client_secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.to_owned()));
		}

		Ok(Self {
			oauth_client,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		})
	}

	/// Spends `refresh_token` at the token endpoint.
	pub fn refresh_token<'a, 'strategy, 'refresh>(
		&'a self,
		strategy: &'strategy dyn ProviderStrategy,
		refresh_token: &'refresh str,
	) -> FacadeFuture<'a, RefreshedTokens>
	where
		'strategy: 'a,
		'refresh: 'a,
	{
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.to_owned());
			let response = self
				.oauth_client
				.exchange_refresh_token(&refresh_secret)
				.request_async(&instrumented)
				.await
				.map_err(|err| {
					map_request_error(strategy, meta.take(), err, self.error_mapper.as_ref())
				})?;

			map_refresh_response(response, OffsetDateTime::now_utc())
		})
	}
}
impl<C, M> Debug for ProviderClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProviderClient")
			.field("token_url", &self.oauth_client.token_uri().as_str())
			.finish_non_exhaustive()
	}
}

fn map_refresh_response(
	response: IdTokenResponse,
	issued_at: OffsetDateTime,
) -> Result<RefreshedTokens> {
	let extra = response.extra_fields();
	let id_token = extra.id_token.clone().ok_or(TransientError::MissingIdToken)?;
	let expires_at = match (extra.expires_at, response.expires_in()) {
		(Some(epoch), _) => OffsetDateTime::from_unix_timestamp(epoch)
			.map_err(|_| TransientError::ExpiryOutOfRange)?,
		(None, Some(expires_in)) => {
			let expires_in = i64::try_from(expires_in.as_secs())
				.map_err(|_| TransientError::ExpiryOutOfRange)?;

			issued_at
				.unix_timestamp()
				.checked_add(expires_in)
				.and_then(|epoch| OffsetDateTime::from_unix_timestamp(epoch).ok())
				.ok_or(TransientError::ExpiryOutOfRange)?
		},
		(None, None) => return Err(TransientError::MissingExpiry.into()),
	};

	Ok(RefreshedTokens {
		id_token: TokenSecret::new(id_token),
		refresh_token: response.refresh_token().map(|token| TokenSecret::new(token.secret())),
		expires_at,
	})
}

fn map_request_error<E, M>(
	strategy: &dyn ProviderStrategy,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(strategy, response, meta_ref),
		RequestTokenError::Request(error) => mapper.map_transport_error(meta_ref, error),
		RequestTokenError::Parse(error, _body) =>
			TransientError::TokenResponseParse { source: error, status: meta_status(meta_ref) }
				.into(),
		RequestTokenError::Other(message) =>
			TransientError::TokenEndpoint { message, status: meta_status(meta_ref) }.into(),
	}
}

fn map_server_response_error(
	strategy: &dyn ProviderStrategy,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let code = response.error().as_ref().to_owned();
	let mut ctx = ProviderErrorContext::default().with_oauth_error(code.clone());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	let reason = response.error_description().cloned().unwrap_or_else(|| code.clone());

	match strategy.classify_token_error(&ctx) {
		ProviderErrorKind::Rejected => Error::RefreshRejected { code, reason },
		ProviderErrorKind::Transient => TransientError::TokenEndpoint {
			message: format!("OAuth error {code}: {reason}"),
			status: meta_status(meta),
		}
		.into(),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::TokenEndpoint {
			message: "request timed out".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
		}
		.into();
	}

	TransportError::from(err).into()
}

#[cfg(feature = "reqwest")]
fn map_generic_transport_error(meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	TransientError::TokenEndpoint {
		message: format!("HTTP client error: {message}"),
		status: meta_status(meta),
	}
	.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}
