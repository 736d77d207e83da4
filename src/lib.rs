//! Session token pipeline for the OpenChokin ledger frontend - coordinated OIDC refreshes,
//! an encrypted shared token cache, and per-subject distributed locks.
//!
//! The web-session framework drives the crate through two entry points:
//! [`flows::SessionBroker::on_token_issued_or_refreshed`], invoked whenever the session token
//! is read or minted, and [`auth::project_session`], which shapes the token record into the
//! client-facing session view.

#![deny(clippy::all)]
#![warn(missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod crypto;
pub mod error;
pub mod flows;
pub mod http;
pub mod lock;
pub mod oauth;
pub mod obs;
pub mod provider;
#[cfg(all(feature = "redis", feature = "reqwest"))] pub mod runtime;
pub mod settings;

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
