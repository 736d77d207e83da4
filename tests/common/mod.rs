#![allow(dead_code)]

// std
use std::sync::{Arc, OnceLock};
// crates.io
use httpmock::prelude::*;
use serde_json::Value;
use time::{Duration, OffsetDateTime};
// self
use openchokin_session::{
	auth::{SubjectId, TokenRecord},
	cache::{CachedTokenEntry, MemoryCache, TokenCache},
	crypto::TokenCipher,
	flows::{RefreshSettings, ReqwestSessionBroker},
	lock::{MemoryLock, SubjectLock},
	provider::IdentityProvider,
};

pub const CLIENT_ID: &str = "openchokin-web";
pub const CLIENT_SECRET: &str = "openchokin-secret";
pub const TOKEN_PATH: &str = "/oauth/v2/token";

/// Cache, lock, and cipher shared by every broker of one simulated deployment.
#[derive(Clone)]
pub struct Backends {
	pub cache: Arc<MemoryCache>,
	pub lock: Arc<MemoryLock>,
	pub cipher: Arc<TokenCipher>,
}
impl Backends {
	pub fn new() -> Self {
		Self {
			cache: Arc::new(MemoryCache::default()),
			lock: Arc::new(MemoryLock::default()),
			cipher: cipher(),
		}
	}

	/// Builds one "server instance" talking to `issuer`.
	pub fn broker(&self, issuer: &str) -> ReqwestSessionBroker {
		self.broker_with(issuer, RefreshSettings::default())
	}

	pub fn broker_with(&self, issuer: &str, settings: RefreshSettings) -> ReqwestSessionBroker {
		let provider =
			IdentityProvider::from_issuer(issuer).expect("Mock issuer should be accepted.");

		self.broker_with_cache(provider, self.cache.clone(), settings)
	}

	pub fn broker_with_cache(
		&self,
		provider: IdentityProvider,
		cache: Arc<dyn TokenCache>,
		settings: RefreshSettings,
	) -> ReqwestSessionBroker {
		let lock: Arc<dyn SubjectLock> = self.lock.clone();

		ReqwestSessionBroker::new(cache, lock, self.cipher.clone(), provider, CLIENT_ID)
			.expect("Reqwest broker should build.")
			.with_client_secret(CLIENT_SECRET)
			.with_settings(settings)
	}

	pub async fn cached(&self, subject: &SubjectId) -> Option<CachedTokenEntry> {
		self.cache.get(subject).await.expect("Memory cache reads should succeed.")
	}
}

/// Argon2 derivation is slow in debug builds, so every test shares one cipher.
pub fn cipher() -> Arc<TokenCipher> {
	static CIPHER: OnceLock<Arc<TokenCipher>> = OnceLock::new();

	CIPHER
		.get_or_init(|| {
			Arc::new(
				TokenCipher::from_passphrase("integration-passphrase")
					.expect("Test cipher should derive."),
			)
		})
		.clone()
}

pub fn subject(value: &str) -> SubjectId {
	SubjectId::new(value).expect("Subject fixture should be valid.")
}

/// Record whose identity token expired a minute ago.
pub fn expired_record(sub: &str, id_token: &str, refresh_token: &str) -> TokenRecord {
	TokenRecord::new(subject(sub))
		.with_tokens(id_token, refresh_token, OffsetDateTime::now_utc() - Duration::minutes(1))
		.with_role("owner")
}

/// Record whose identity token is valid for another hour.
pub fn fresh_record(sub: &str, id_token: &str, refresh_token: &str) -> TokenRecord {
	TokenRecord::new(subject(sub))
		.with_tokens(id_token, refresh_token, OffsetDateTime::now_utc() + Duration::hours(1))
		.with_role("owner")
}

/// OIDC refresh response body.
pub fn token_body(id_token: &str, refresh_token: Option<&str>, expires_in: i64) -> String {
	let mut body = serde_json::json!({
		"access_token": "access-unused",
		"token_type": "bearer",
		"id_token": id_token,
		"expires_in": expires_in,
	});

	if let Some(refresh) = refresh_token {
		body["refresh_token"] = Value::String(refresh.into());
	}

	body.to_string()
}

/// Mocks the token endpoint answering a refresh of `spent` with `body`.
pub async fn mock_refresh<'a>(
	server: &'a MockServer,
	spent: &str,
	status: u16,
	body: String,
) -> httpmock::Mock<'a> {
	let spent = spent.to_owned();

	server
		.mock_async(move |when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("client_id", CLIENT_ID)
				.form_urlencoded_tuple("client_secret", CLIENT_SECRET)
				.form_urlencoded_tuple("refresh_token", spent);
			then.status(status).header("content-type", "application/json").body(body);
		})
		.await
}
