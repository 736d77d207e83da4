//! Coordinated refresh with rotation-race detection.
//!
//! Refresh tokens are single-use, and several server instances may hold the same one. A refresh
//! therefore runs under the subject's distributed lock and consults the shared cache first: if
//! another holder already rotated the token, its result is adopted instead of spending the stale
//! token a second time. Only when the cache holds nothing newer does the broker call the token
//! endpoint, and it writes the rotation back to the cache before releasing the lock.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, TokenSecret},
	cache::{CacheError, CachedTokenEntry},
	error::ConfigError,
	flows::SessionBroker,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Token material written by another holder of the subject's refresh token.
#[derive(Clone, Debug)]
struct Rotation {
	id_token: TokenSecret,
	refresh_token: TokenSecret,
	expires_at: OffsetDateTime,
}

impl<C, M> SessionBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Produces a record with a valid identity token, adopting or performing a rotation.
	///
	/// The returned record has the fault flag cleared, except when the provider rotated the
	/// refresh token but returned an identity token expiring earlier than the held one: the
	/// record then keeps its identity token, takes the new refresh token, and carries the fault.
	/// On error the caller keeps its previous record; the per-subject lock is released on every
	/// path.
	pub async fn refresh(&self, record: &TokenRecord) -> Result<TokenRecord> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh", record.subject.as_ref());

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.refresh_metrics.record_attempt();

		let result = span.instrument(self.refresh_locked(record)).await;

		match &result {
			Ok(refreshed) if !refreshed.has_fault() => {
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
				self.refresh_metrics.record_success();
			},
			_ => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				self.refresh_metrics.record_failure();
			},
		}

		result
	}

	async fn refresh_locked(&self, record: &TokenRecord) -> Result<TokenRecord> {
		let held = record.refresh_token.clone().ok_or(ConfigError::MissingRefreshToken)?;
		let lock_key = record.subject.lock_key();
		let guard = self.lock.acquire(&lock_key, self.settings.lock_timeout).await?;

		tracing::debug!(key = %guard.key(), "Acquired refresh lock.");

		let result = self.refresh_under_lock(record, &held).await;

		if let Err(e) = guard.release().await {
			tracing::warn!(key = %lock_key, error = %e, "Failed to release refresh lock.");
		}

		result
	}

	async fn refresh_under_lock(
		&self,
		record: &TokenRecord,
		held: &TokenSecret,
	) -> Result<TokenRecord> {
		if let Some(rotation) = self.cached_rotation(record, held).await? {
			return Ok(self.adopt(record, rotation));
		}

		let client = self.provider_client()?;

		self.refresh_metrics.record_live_call();
		obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Live);

		let refreshed = match client.refresh_token(self.strategy.as_ref(), held.expose()).await {
			Ok(refreshed) => refreshed,
			Err(e @ Error::RefreshRejected { .. }) => {
				tracing::warn!(
					subject = %record.subject,
					error = %e,
					"Identity provider rejected the refresh; checking for a late rotation."
				);

				return match self.cached_rotation(record, held).await? {
					Some(rotation) => Ok(self.adopt(record, rotation)),
					None => Err(e),
				};
			},
			Err(e) => return Err(e),
		};

		let refresh_token = refreshed.refresh_token.unwrap_or_else(|| held.clone());
		let mut updated = record.clone();

		if let Err(e) = ensure_monotonic(record.expires_at, refreshed.expires_at) {
			tracing::warn!(
				subject = %record.subject,
				error = %e,
				"Refusing refreshed identity token; keeping the rotated refresh token."
			);

			// The held refresh token is spent; only the identity token is refused.
			updated.refresh_token = Some(refresh_token.clone());
			updated.mark_refresh_failed();

			let kept = (record.id_token.clone(), record.expires_at);

			if let (Some(id_token), Some(expires_at)) = kept {
				self.publish(record, &refresh_token, id_token, expires_at).await;
			}

			return Ok(updated);
		}

		self.publish(record, &refresh_token, refreshed.id_token.clone(), refreshed.expires_at)
			.await;

		tracing::info!(
			subject = %record.subject,
			expires_at = %refreshed.expires_at,
			"Refreshed identity token."
		);

		updated.apply_rotation(refreshed.id_token, refresh_token, refreshed.expires_at);

		Ok(updated)
	}

	/// Writes the rotation to the shared cache.
	///
	/// Failures are logged only: the provider has already spent the previous refresh token, so
	/// the caller must keep the new one whether or not other instances can see it.
	async fn publish(
		&self,
		record: &TokenRecord,
		refresh_token: &TokenSecret,
		id_token: TokenSecret,
		expires_at: OffsetDateTime,
	) {
		let sealed = CachedTokenEntry::seal(&self.cipher, refresh_token, id_token, expires_at);
		let written = match sealed {
			Ok(entry) => self
				.cache
				.set(&record.subject, entry, self.settings.cache_ttl)
				.await
				.map_err(Error::from),
			Err(e) => Err(e.into()),
		};

		if let Err(e) = written {
			tracing::error!(
				subject = %record.subject,
				error = %e,
				"Failed to publish rotated refresh token to the token cache."
			);
		}
	}

	/// Reads the shared cache and returns a rotation this record has not seen yet.
	async fn cached_rotation(
		&self,
		record: &TokenRecord,
		held: &TokenSecret,
	) -> Result<Option<Rotation>> {
		let entry = match self.cache.get(&record.subject).await {
			Ok(Some(entry)) => entry,
			Ok(None) => return Ok(None),
			Err(CacheError::Serialization { message }) => {
				tracing::warn!(
					subject = %record.subject,
					%message,
					"Ignoring malformed token cache entry."
				);

				return Ok(None);
			},
			Err(e) => return Err(e.into()),
		};
		let cached = match entry.open_refresh_token(&self.cipher) {
			Ok(cached) => cached,
			Err(e) => {
				tracing::warn!(
					subject = %record.subject,
					error = %e,
					"Ignoring token cache entry that cannot be decrypted; check that every \
					 instance shares the same cache passphrase."
				);

				return Ok(None);
			},
		};

		if held.matches(cached.expose()) {
			return Ok(None);
		}
		if record.expires_at.is_some_and(|current| entry.expires_at < current) {
			tracing::debug!(
				subject = %record.subject,
				"Ignoring cached rotation older than the held token."
			);

			return Ok(None);
		}

		Ok(Some(Rotation {
			id_token: entry.id_token,
			refresh_token: cached,
			expires_at: entry.expires_at,
		}))
	}

	fn adopt(&self, record: &TokenRecord, rotation: Rotation) -> TokenRecord {
		let mut updated = record.clone();

		updated.apply_rotation(rotation.id_token, rotation.refresh_token, rotation.expires_at);

		self.refresh_metrics.record_adoption();
		obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Adopted);
		tracing::info!(subject = %record.subject, "Adopted token rotated by another holder.");

		updated
	}
}

fn ensure_monotonic(
	current: Option<OffsetDateTime>,
	refreshed: OffsetDateTime,
) -> Result<(), ConfigError> {
	match current {
		Some(current) if refreshed < current =>
			Err(ConfigError::ExpiryRegressed { current, refreshed }),
		_ => Ok(()),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn expiry_may_not_move_backwards() {
		let current = macros::datetime!(2025-01-01 01:00 UTC);

		assert!(ensure_monotonic(None, current).is_ok());
		assert!(ensure_monotonic(Some(current), current).is_ok());
		assert!(ensure_monotonic(Some(current), current + Duration::hours(1)).is_ok());
		assert!(matches!(
			ensure_monotonic(Some(current), current - Duration::seconds(1)),
			Err(ConfigError::ExpiryRegressed { .. })
		));
	}
}
