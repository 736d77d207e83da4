//! Token callback invoked whenever the session token is read or minted.

// self
use crate::{
	_prelude::*,
	auth::{AuthorizationPayload, SignInEvent, TokenRecord, TokenSecret, UserClaims},
	flows::SessionBroker,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

impl<C, M> SessionBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns the record the session should carry after this read.
	///
	/// - On sign-in the record takes the freshly issued tokens and role; nothing else runs.
	/// - An unexpired record comes back unchanged without touching the lock or the cache.
	/// - An expired record is refreshed; any failure keeps the previous tokens and sets the
	///   `RefreshAccessTokenError` fault instead of returning an error.
	pub async fn on_token_issued_or_refreshed(
		&self,
		record: TokenRecord,
		event: SignInEvent,
	) -> TokenRecord {
		match event {
			SignInEvent::Authorized { payload, claims } => sign_in(record, payload, claims),
			SignInEvent::Absent if !record.is_expired() => {
				tracing::debug!(subject = %record.subject, "Identity token still valid.");

				record
			},
			SignInEvent::Absent => match self.refresh(&record).await {
				Ok(refreshed) => refreshed,
				Err(e) => {
					tracing::error!(
						subject = %record.subject,
						error = %e,
						"Token refresh failed; flagging the session for re-authentication."
					);

					let mut record = record;

					record.mark_refresh_failed();

					record
				},
			},
		}
	}
}

fn sign_in(
	mut record: TokenRecord,
	payload: AuthorizationPayload,
	claims: UserClaims,
) -> TokenRecord {
	const KIND: FlowKind = FlowKind::SignIn;

	if let Some(subject) = claims.sub {
		record.subject = subject;
	}
	if claims.role.is_some() {
		record.role = claims.role;
	}

	let _span = FlowSpan::new(KIND, "sign_in", record.subject.as_ref()).entered();

	obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

	match OffsetDateTime::from_unix_timestamp(payload.expires_at) {
		Ok(expires_at) => {
			record.apply_rotation(
				TokenSecret::new(payload.id_token),
				TokenSecret::new(payload.refresh_token),
				expires_at,
			);
			obs::record_flow_outcome(KIND, FlowOutcome::Success);
			tracing::info!(subject = %record.subject, "Session signed in.");
		},
		Err(_) => {
			record.mark_refresh_failed();
			obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			tracing::warn!(
				subject = %record.subject,
				expires_at = payload.expires_at,
				"Sign-in payload expiry is out of range."
			);
		},
	}

	record
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::{SubjectId, TokenFault};

	fn payload(expires_at: i64) -> AuthorizationPayload {
		AuthorizationPayload { id_token: "id-1".into(), refresh_token: "r1".into(), expires_at }
	}

	#[test]
	fn sign_in_populates_tokens_role_and_subject() {
		let mut stale =
			TokenRecord::new(SubjectId::new("pending").expect("Subject should be valid."));

		stale.mark_refresh_failed();

		let claims = UserClaims {
			sub: Some(SubjectId::new("u1").expect("Subject should be valid.")),
			role: Some("owner".into()),
		};
		let record = sign_in(stale, payload(1_735_689_600), claims);

		assert_eq!(record.subject.as_ref(), "u1");
		assert_eq!(record.role.as_deref(), Some("owner"));
		assert_eq!(record.id_token.as_ref().map(TokenSecret::expose), Some("id-1"));
		assert_eq!(record.refresh_token.as_ref().map(TokenSecret::expose), Some("r1"));
		assert_eq!(record.expires_at.map(OffsetDateTime::unix_timestamp), Some(1_735_689_600));
		assert!(!record.has_fault());
	}

	#[test]
	fn sign_in_with_unrepresentable_expiry_flags_fault() {
		let record = sign_in(
			TokenRecord::new(SubjectId::new("u1").expect("Subject should be valid.")),
			payload(i64::MAX),
			UserClaims::default(),
		);

		assert_eq!(record.error, Some(TokenFault::RefreshAccessTokenError));
		assert!(record.id_token.is_none());
	}
}
