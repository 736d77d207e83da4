//! Client-facing session projection.

// self
use crate::{
	_prelude::*,
	auth::{TokenFault, TokenRecord},
};

/// User section of the session object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
	/// Identity assertion forwarded to the ledger backend.
	pub id_token: Option<String>,
	/// Subject identifier.
	pub sub: String,
	/// Authorization role claim.
	pub role: Option<String>,
}

/// Session object consumed by the UI layer.
///
/// The refresh token is never part of the view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionView {
	/// User-scoped fields.
	pub user: SessionUser,
	/// Refresh fault; the UI must prompt a new sign-in when set.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<TokenFault>,
}
impl SessionView {
	/// Returns `true` when the consumer must force re-authentication.
	pub fn requires_reauthentication(&self) -> bool {
		self.error.is_some()
	}
}

/// Projects a token record into the client-facing session.
pub fn project_session(record: &TokenRecord) -> SessionView {
	SessionView {
		user: SessionUser {
			id_token: record.id_token.as_ref().map(|secret| secret.expose().to_owned()),
			sub: record.subject.to_string(),
			role: record.role.clone(),
		},
		error: record.error,
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::SubjectId;

	#[test]
	fn projection_hides_refresh_token() {
		let record = TokenRecord::new(SubjectId::new("u1").expect("Subject should be valid."))
			.with_tokens("id-1", "refresh-secret", macros::datetime!(2025-01-01 00:00 UTC))
			.with_role("owner");
		let view = project_session(&record);

		assert_eq!(view.user.id_token.as_deref(), Some("id-1"));
		assert_eq!(view.user.sub, "u1");
		assert_eq!(view.user.role.as_deref(), Some("owner"));
		assert!(!view.requires_reauthentication());

		let rendered = serde_json::to_string(&view).expect("Session view should serialize.");

		assert!(!rendered.contains("refresh-secret"));
		assert!(rendered.contains("\"idToken\":\"id-1\""));
		assert!(!rendered.contains("error"));
	}

	#[test]
	fn projection_surfaces_fault_and_keeps_stale_token() {
		let mut record = TokenRecord::new(SubjectId::new("u1").expect("Subject should be valid."))
			.with_tokens("stale-id", "r1", macros::datetime!(2025-01-01 00:00 UTC));

		record.mark_refresh_failed();

		let view = project_session(&record);

		assert!(view.requires_reauthentication());
		assert_eq!(view.user.id_token.as_deref(), Some("stale-id"));
		assert_eq!(
			serde_json::to_value(&view).expect("Session view should serialize.")["error"],
			"RefreshAccessTokenError"
		);
	}
}
