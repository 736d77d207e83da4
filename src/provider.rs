//! Identity-provider description (data) and error classification (behavior).
//!
//! `descriptor` holds the validated issuer, the derived token endpoint, and the client
//! authentication mode. `strategy` defines [`ProviderStrategy`], the hook that decides whether a
//! token endpoint error is a definitive rejection or a temporary failure.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
