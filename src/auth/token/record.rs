//! Session token record, lifecycle helpers, and the refresh fault flag.

// self
use crate::{
	_prelude::*,
	auth::{SubjectId, token::secret::TokenSecret},
};

/// Lifecycle status of the identity token held by a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// No identity token (or no expiry) has been issued yet.
	Unissued,
	/// Token is currently valid.
	Active,
	/// Token reached its expiry instant.
	Expired,
}

/// Fault flag surfaced to the session when a refresh fails.
///
/// The consuming application treats any fault as "re-authentication required".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenFault {
	/// The identity token could not be refreshed; the held token may be stale.
	RefreshAccessTokenError,
}
impl TokenFault {
	/// Wire label of the fault.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenFault::RefreshAccessTokenError => "RefreshAccessTokenError",
		}
	}
}
impl Display for TokenFault {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Per-principal token state carried in the server-side session.
///
/// Field names follow the session JWT (`sub`, `idToken`, `refreshToken`, `expiresAt` in epoch
/// seconds) so the framework can persist the record verbatim.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
	/// Stable user identifier.
	#[serde(rename = "sub")]
	pub subject: SubjectId,
	/// Current identity assertion forwarded to the ledger backend.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<TokenSecret>,
	/// Single-use refresh credential.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Expiry instant of `id_token`.
	#[serde(default, with = "time::serde::timestamp::option", skip_serializing_if = "Option::is_none")]
	pub expires_at: Option<OffsetDateTime>,
	/// Authorization role claim captured at sign-in.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	/// Set when the last refresh failed.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<TokenFault>,
}
impl TokenRecord {
	/// Creates an empty record for a subject that has not been issued tokens yet.
	pub fn new(subject: SubjectId) -> Self {
		Self {
			subject,
			id_token: None,
			refresh_token: None,
			expires_at: None,
			role: None,
			error: None,
		}
	}

	/// Sets the token triple.
	pub fn with_tokens(
		mut self,
		id_token: impl Into<String>,
		refresh_token: impl Into<String>,
		expires_at: OffsetDateTime,
	) -> Self {
		self.id_token = Some(TokenSecret::new(id_token));
		self.refresh_token = Some(TokenSecret::new(refresh_token));
		self.expires_at = Some(expires_at);

		self
	}

	/// Sets the role claim.
	pub fn with_role(mut self, role: impl Into<String>) -> Self {
		self.role = Some(role.into());

		self
	}

	/// Computes the lifecycle status at a given instant.
	///
	/// The token stays active through its expiry instant and expires strictly after it.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		match (&self.id_token, self.expires_at) {
			(Some(_), Some(expires_at)) if instant > expires_at => TokenStatus::Expired,
			(Some(_), Some(_)) => TokenStatus::Active,
			_ => TokenStatus::Unissued,
		}
	}

	/// Convenience helper that checks the status using the current UTC instant.
	pub fn status(&self) -> TokenStatus {
		self.status_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` if the identity token has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), TokenStatus::Expired)
	}

	/// Returns `true` if the identity token is expired relative to the current clock.
	pub fn is_expired(&self) -> bool {
		matches!(self.status(), TokenStatus::Expired)
	}

	/// Returns `true` when a refresh failure is flagged.
	pub fn has_fault(&self) -> bool {
		self.error.is_some()
	}

	/// Installs freshly rotated token material and clears the fault flag.
	pub fn apply_rotation(
		&mut self,
		id_token: TokenSecret,
		refresh_token: TokenSecret,
		expires_at: OffsetDateTime,
	) {
		self.id_token = Some(id_token);
		self.refresh_token = Some(refresh_token);
		self.expires_at = Some(expires_at);
		self.error = None;
	}

	/// Flags a failed refresh while keeping the previous tokens in place.
	pub fn mark_refresh_failed(&mut self) {
		self.error = Some(TokenFault::RefreshAccessTokenError);
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("subject", &self.subject)
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.field("role", &self.role)
			.field("error", &self.error)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn subject() -> SubjectId {
		SubjectId::new("u1").expect("Subject fixture should be valid.")
	}

	#[test]
	fn status_transitions_cover_all_states() {
		let expires = macros::datetime!(2025-01-01 01:00 UTC);
		let empty = TokenRecord::new(subject());

		assert_eq!(empty.status_at(expires), TokenStatus::Unissued);

		let record = empty.with_tokens("id", "r1", expires);

		assert_eq!(record.status_at(macros::datetime!(2025-01-01 00:30 UTC)), TokenStatus::Active);
		assert_eq!(record.status_at(expires), TokenStatus::Active);
		assert_eq!(record.status_at(expires + Duration::seconds(1)), TokenStatus::Expired);
		assert!(record.is_expired_at(macros::datetime!(2025-01-01 02:00 UTC)));
	}

	#[test]
	fn rotation_clears_fault_and_failure_keeps_tokens() {
		let expires = macros::datetime!(2025-01-01 01:00 UTC);
		let mut record = TokenRecord::new(subject()).with_tokens("id-1", "r1", expires);

		record.mark_refresh_failed();

		assert_eq!(record.error, Some(TokenFault::RefreshAccessTokenError));
		assert_eq!(record.id_token.as_ref().map(TokenSecret::expose), Some("id-1"));
		assert_eq!(record.expires_at, Some(expires));

		record.apply_rotation(
			TokenSecret::new("id-2"),
			TokenSecret::new("r2"),
			expires + Duration::hours(1),
		);

		assert!(!record.has_fault());
		assert_eq!(record.refresh_token.as_ref().map(TokenSecret::expose), Some("r2"));
	}

	#[test]
	fn serializes_with_session_field_names() {
		let record = TokenRecord::new(subject())
			.with_tokens("id-1", "r1", macros::datetime!(2025-01-01 00:00 UTC))
			.with_role("owner");
		let value = serde_json::to_value(&record).expect("Record should serialize.");

		assert_eq!(value["sub"], "u1");
		assert_eq!(value["idToken"], "id-1");
		assert_eq!(value["refreshToken"], "r1");
		assert_eq!(value["expiresAt"], 1_735_689_600_i64);
		assert_eq!(value["role"], "owner");
		assert!(value.get("error").is_none());

		let mut failed = record.clone();

		failed.mark_refresh_failed();

		let value = serde_json::to_value(&failed).expect("Failed record should serialize.");

		assert_eq!(value["error"], "RefreshAccessTokenError");

		let round_trip: TokenRecord =
			serde_json::from_value(value).expect("Record should deserialize.");

		assert_eq!(round_trip, failed);
	}

	#[test]
	fn debug_output_redacts_tokens() {
		let record = TokenRecord::new(subject()).with_tokens(
			"id-secret",
			"refresh-secret",
			macros::datetime!(2025-01-01 00:00 UTC),
		);
		let rendered = format!("{record:?}");

		assert!(!rendered.contains("id-secret"));
		assert!(!rendered.contains("refresh-secret"));
	}
}
