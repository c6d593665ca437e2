//! Error taxonomy for graph building, binding and handler execution
//!
//! Three families of failures are kept strictly apart:
//!
//! - [`BuildError`] — malformed handler signatures, fatal at registration time
//! - [`BindingError`] / [`ValidationFailed`] — request-time binding failures,
//!   collected across the whole dependency walk and surfaced together
//! - [`HandlerError`] — failures raised by handler or dependency code itself,
//!   which propagate unmodified to the exception-handler table

use crate::params::Source;
use crate::response::Response;
use http::StatusCode;
use std::fmt;

/// One segment of an error location path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocSegment {
	Key(String),
	Index(usize),
}

impl fmt::Display for LocSegment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LocSegment::Key(key) => write!(f, "{key}"),
			LocSegment::Index(idx) => write!(f, "{idx}"),
		}
	}
}

/// Location of a binding error, e.g. `("query", "limit")` or `("body", 17)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location(pub Vec<LocSegment>);

impl Location {
	/// Location of a non-body parameter: `(source, alias)`.
	pub fn param(source: Source, alias: &str) -> Self {
		Location(vec![
			LocSegment::Key(source.as_str().to_string()),
			LocSegment::Key(alias.to_string()),
		])
	}

	/// Location of the request body as a whole: `(body,)`.
	pub fn body() -> Self {
		Location(vec![LocSegment::Key("body".to_string())])
	}

	/// Location of a field inside the request body: `(body, alias)`.
	pub fn body_field(alias: &str) -> Self {
		Location(vec![
			LocSegment::Key("body".to_string()),
			LocSegment::Key(alias.to_string()),
		])
	}

	/// Location of a structural body parse error: `(body, offset)`.
	pub fn body_offset(offset: usize) -> Self {
		Location(vec![
			LocSegment::Key("body".to_string()),
			LocSegment::Index(offset),
		])
	}

	pub fn segments(&self) -> &[LocSegment] {
		&self.0
	}
}

impl fmt::Display for Location {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "(")?;
		for (i, seg) in self.0.iter().enumerate() {
			if i > 0 {
				write!(f, ", ")?;
			}
			write!(f, "{seg}")?;
		}
		write!(f, ")")
	}
}

/// Cause of a single binding failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingErrorKind {
	#[error("field required")]
	Missing,
	#[error("value is not a valid integer")]
	InvalidInt,
	#[error("value is not a valid number")]
	InvalidFloat,
	#[error("value is not a valid boolean")]
	InvalidBool,
	#[error("value is not a valid string")]
	InvalidStr,
	#[error("value is not a valid list")]
	InvalidList,
	#[error("value is not a valid object")]
	InvalidObject,
	#[error("value is not valid UTF-8")]
	InvalidEncoding,
	#[error("ensure this value is greater than or equal to {min}")]
	TooSmall { min: i64 },
	#[error("ensure this value is less than or equal to {max}")]
	TooLarge { max: i64 },
	#[error("ensure this value has at least {min} characters")]
	TooShort { min: usize },
	#[error("ensure this value has at most {max} characters")]
	TooLong { max: usize },
	#[error("invalid JSON at byte offset {offset}")]
	JsonParse { offset: usize },
	#[error("there was an error parsing the body")]
	BodyRead,
}

/// One request-time binding failure: a location plus its cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingError {
	pub loc: Location,
	pub kind: BindingErrorKind,
}

impl BindingError {
	pub fn new(loc: Location, kind: BindingErrorKind) -> Self {
		Self { loc, kind }
	}

	/// The canonical "missing field" error at the given location.
	pub fn missing(loc: Location) -> Self {
		Self::new(loc, BindingErrorKind::Missing)
	}
}

impl fmt::Display for BindingError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.loc, self.kind)
	}
}

/// Aggregated binding failures for one request.
///
/// A non-empty error list after the full resolution walk suppresses handler
/// invocation; the exception-handler table maps this to a client response.
#[derive(Debug, Clone, thiserror::Error)]
#[error("request validation failed ({} error(s))", .errors.len())]
pub struct ValidationFailed {
	pub errors: Vec<BindingError>,
}

impl ValidationFailed {
	pub fn new(errors: Vec<BindingError>) -> Self {
		Self { errors }
	}
}

/// Fatal handler-registration errors.
///
/// These abort registration immediately; none of them can surface at
/// request time.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
	#[error("path parameter `{name}` must be a scalar type")]
	NonScalarPathParam { name: String },
	#[error("duplicate {source} parameter alias `{alias}`")]
	DuplicateAlias { source: Source, alias: String },
	#[error("duplicate body field alias `{alias}` across the dependency tree")]
	DuplicateBodyAlias { alias: String },
	#[error("parameter `{name}` can only be a request body; use a Body marker")]
	ExpectedBodyMarker { name: String },
	#[error("route handler `{name}` must be a plain callable, not a scoped one")]
	ScopedRoot { name: String },
}

/// An HTTP-level failure raised deliberately by handler code.
#[derive(Debug, thiserror::Error)]
#[error("HTTP {status}: {detail}")]
pub struct HttpError {
	pub status: StatusCode,
	pub detail: String,
}

impl HttpError {
	pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
		Self {
			status,
			detail: detail.into(),
		}
	}

	pub(crate) fn into_response(self) -> Response {
		let mut response = Response::new(self.status);
		response.set_json(&serde_json::json!({ "detail": self.detail }));
		response
	}
}

/// A failure raised by a handler or a non-scoped dependency during
/// invocation.
///
/// Never merged into the validation-error list; `Http` is mapped by the
/// exception-handler table, `Other` escapes to the caller unmodified.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
	#[error(transparent)]
	Http(#[from] HttpError),
	#[error(transparent)]
	Other(#[from] anyhow::Error),
}
