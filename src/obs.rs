//! Observability helpers for the session flows.
//!
//! Every flow runs inside an `openchokin_session.flow` span carrying `flow` and `stage` fields.
//! With the `metrics` feature enabled, each refresh outcome also increments the
//! `openchokin_session_refresh_total` counter labeled by `flow` and `outcome`.

mod metrics;
mod tracing;

pub use self::metrics::*;
pub use self::tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the session broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Sign-in callback populating a new record.
	SignIn,
	/// Coordinated refresh of an expired record.
	Refresh,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::SignIn => "sign_in",
			FlowKind::Refresh => "refresh",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// A live call was made to the identity provider.
	Live,
	/// A value rotated by another instance was adopted from the cache.
	Adopted,
	/// Successful completion.
	Success,
	/// Failure converted into the session fault flag.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Live => "live",
			FlowOutcome::Adopted => "adopted",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
