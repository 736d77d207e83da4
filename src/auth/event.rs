//! Sign-in events handed over by the web-session framework.
//!
//! The framework passes loosely typed `user`/`account` objects to its token callback. They are
//! validated here, once, so the refresh flow only ever sees [`SignInEvent`].

// self
use crate::{_prelude::*, auth::SubjectId};

/// Error raised when a sign-in payload is malformed.
#[derive(Debug, ThisError)]
pub enum SignInError {
	/// The authorization payload is missing fields or has the wrong shape.
	#[error("Authorization payload is malformed.")]
	MalformedAccount(#[source] serde_json::Error),
	/// The user claims are missing fields or have the wrong shape.
	#[error("User claims are malformed.")]
	MalformedUser(#[source] serde_json::Error),
	/// The authorization payload carried an unrepresentable expiry.
	#[error("Authorization payload expiry {0} is out of range.")]
	ExpiryOutOfRange(i64),
}

/// Tokens issued by the identity provider's authorization response.
#[derive(Clone, Deserialize)]
pub struct AuthorizationPayload {
	/// Identity assertion.
	pub id_token: String,
	/// Refresh credential.
	pub refresh_token: String,
	/// Expiry of `id_token` in seconds since the epoch.
	pub expires_at: i64,
}
impl Debug for AuthorizationPayload {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationPayload")
			.field("id_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Profile claims captured at sign-in.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserClaims {
	/// Subject claim, when the framework exposes it on the user object.
	#[serde(default, alias = "id")]
	pub sub: Option<SubjectId>,
	/// Authorization role claim.
	#[serde(default)]
	pub role: Option<String>,
}

/// What the framework observed alongside the current token.
#[derive(Clone, Debug)]
pub enum SignInEvent {
	/// First sign-in: the identity provider just issued tokens.
	Authorized {
		/// Authorization response tokens.
		payload: AuthorizationPayload,
		/// Profile claims.
		claims: UserClaims,
	},
	/// Subsequent read of an existing session.
	Absent,
}
impl SignInEvent {
	/// Builds an event from the framework's raw callback arguments.
	///
	/// An absent `account` means the session already exists, regardless of `user`.
	pub fn from_callback(
		user: Option<serde_json::Value>,
		account: Option<serde_json::Value>,
	) -> Result<Self, SignInError> {
		let Some(account) = account else {
			return Ok(Self::Absent);
		};
		let payload: AuthorizationPayload =
			serde_json::from_value(account).map_err(SignInError::MalformedAccount)?;

		OffsetDateTime::from_unix_timestamp(payload.expires_at)
			.map_err(|_| SignInError::ExpiryOutOfRange(payload.expires_at))?;

		let claims = match user {
			Some(user) => serde_json::from_value(user).map_err(SignInError::MalformedUser)?,
			None => UserClaims::default(),
		};

		Ok(Self::Authorized { payload, claims })
	}

	/// Returns `true` for the first-sign-in variant.
	pub fn is_authorized(&self) -> bool {
		matches!(self, Self::Authorized { .. })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn missing_account_is_absent() {
		let event = SignInEvent::from_callback(Some(json!({ "role": "owner" })), None)
			.expect("Absent account should not fail.");

		assert!(!event.is_authorized());
	}

	#[test]
	fn account_and_user_become_authorized_event() {
		let event = SignInEvent::from_callback(
			Some(json!({ "id": "u1", "role": "owner", "email": "a@example.com" })),
			Some(json!({
				"provider": "zitadel",
				"id_token": "id-1",
				"refresh_token": "r1",
				"expires_at": 1_735_689_600_i64,
			})),
		)
		.expect("Well-formed callback arguments should validate.");

		match event {
			SignInEvent::Authorized { payload, claims } => {
				assert_eq!(payload.id_token, "id-1");
				assert_eq!(payload.expires_at, 1_735_689_600);
				assert_eq!(claims.role.as_deref(), Some("owner"));
				assert_eq!(claims.sub.as_deref(), Some("u1"));
			},
			SignInEvent::Absent => panic!("Expected an authorized event."),
		}
	}

	#[test]
	fn malformed_account_is_rejected() {
		let err = SignInEvent::from_callback(None, Some(json!({ "id_token": "id-1" })))
			.expect_err("Account without refresh token must be rejected.");

		assert!(matches!(err, SignInError::MalformedAccount(_)));

		let err = SignInEvent::from_callback(
			None,
			Some(json!({ "id_token": "id-1", "refresh_token": "r1", "expires_at": i64::MAX })),
		)
		.expect_err("Unrepresentable expiry must be rejected.");

		assert!(matches!(err, SignInError::ExpiryOutOfRange(_)));
	}
}
