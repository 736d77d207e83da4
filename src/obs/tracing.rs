// crates.io
use tracing::{Instrument, Span, instrument::Instrumented, span::EnteredSpan};
// self
use crate::{_prelude::*, obs::FlowKind};

/// A span builder used by the session flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	span: Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind, stage, and subject.
	pub fn new(kind: FlowKind, stage: &'static str, subject: &str) -> Self {
		let span = tracing::info_span!(
			"openchokin_session.flow",
			flow = kind.as_str(),
			stage,
			subject
		);

		Self { span }
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> EnteredSpan {
		self.span.entered()
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		fut.instrument(self.span.clone())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn entered_span_is_current() {
		let _guard = FlowSpan::new(FlowKind::SignIn, "entered_span_is_current", "u1").entered();
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = FlowSpan::new(FlowKind::Refresh, "instrument_wraps_future", "u1");
		let value = FlowSpan::instrument(&span, async { 42 }).await;

		assert_eq!(value, 42);
	}
}
