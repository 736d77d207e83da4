//! Strongly typed subject identifier issued by the identity provider.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

const SUBJECT_MAX_LEN: usize = 255;

/// Error returned when subject validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum SubjectError {
	/// The subject was empty.
	#[error("Subject identifier cannot be empty.")]
	Empty,
	/// The subject contains whitespace characters.
	#[error("Subject identifier contains whitespace.")]
	ContainsWhitespace,
	/// The subject exceeded the allowed length.
	#[error("Subject identifier exceeds {max} bytes.")]
	TooLong {
		/// Maximum permitted length in bytes.
		max: usize,
	},
}

/// Stable identifier of an authenticated principal (`sub` claim).
///
/// Subjects key both the shared token cache and the refresh lock, so whitespace is
/// rejected to keep the derived store keys unambiguous.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);
impl SubjectId {
	/// Creates a new subject after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, SubjectError> {
		let view = value.as_ref();

		validate_view(view)?;

		Ok(Self(view.to_owned()))
	}

	/// Key guarding refresh attempts for this subject.
	pub fn lock_key(&self) -> String {
		format!("refresh-lock:{}", self.0)
	}
}
impl Deref for SubjectId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for SubjectId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for SubjectId {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<SubjectId> for String {
	fn from(value: SubjectId) -> Self {
		value.0
	}
}
impl TryFrom<String> for SubjectId {
	type Error = SubjectError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_view(&value)?;

		Ok(Self(value))
	}
}
impl FromStr for SubjectId {
	type Err = SubjectError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl Debug for SubjectId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Subject({})", self.0)
	}
}
impl Display for SubjectId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

fn validate_view(view: &str) -> Result<(), SubjectError> {
	if view.is_empty() {
		return Err(SubjectError::Empty);
	}
	if view.chars().any(char::is_whitespace) {
		return Err(SubjectError::ContainsWhitespace);
	}
	if view.len() > SUBJECT_MAX_LEN {
		return Err(SubjectError::TooLong { max: SUBJECT_MAX_LEN });
	}

	Ok(())
}
