//! Auth-domain identifiers, token records, sign-in events, and the session projection.

pub mod event;
pub mod id;
pub mod session;
pub mod token;

pub use event::*;
pub use id::*;
pub use session::*;
pub use token::{record::*, secret::*};
