//! Parameter markers
//!
//! Markers are small tagged values attached to a declared parameter that
//! tell the graph builder where the parameter's data comes from: a request
//! location ([`Param`]), the request body ([`BodyMarker`]), a nested
//! dependency ([`Depends`]) or the in-flight response object
//! ([`Marker::ResponseSink`]).
//!
//! A marker carries everything the builder needs to classify the
//! parameter: source location, wire alias and per-field options.

use crate::dependency::Dependency;
use std::fmt;
use std::sync::Arc;

/// Non-body request locations a parameter can bind against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
	Path,
	Query,
	Header,
	Cookie,
}

impl Source {
	pub fn as_str(&self) -> &'static str {
		match self {
			Source::Path => "path",
			Source::Query => "query",
			Source::Header => "header",
			Source::Cookie => "cookie",
		}
	}
}

impl fmt::Display for Source {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::error::Error for Source {}

/// Marker for a non-body parameter.
///
/// A marker without a source inherits the contextual default (path, unless
/// the builder imposes another source).
#[derive(Debug, Clone, Default)]
pub struct Param {
	pub source: Option<Source>,
	pub alias: Option<String>,
}

impl Param {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn path() -> Self {
		Self {
			source: Some(Source::Path),
			alias: None,
		}
	}

	pub fn query() -> Self {
		Self {
			source: Some(Source::Query),
			alias: None,
		}
	}

	pub fn header() -> Self {
		Self {
			source: Some(Source::Header),
			alias: None,
		}
	}

	pub fn cookie() -> Self {
		Self {
			source: Some(Source::Cookie),
			alias: None,
		}
	}

	/// Explicit wire alias; wins over the parameter name and over the
	/// header first-letter capitalization.
	pub fn alias(mut self, alias: impl Into<String>) -> Self {
		self.alias = Some(alias.into());
		self
	}
}

/// Media kind of a body-carrying parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BodyKind {
	Json,
	Form,
	File,
}

impl BodyKind {
	pub fn default_media_type(&self) -> &'static str {
		match self {
			BodyKind::Json => "application/json",
			BodyKind::Form => "application/x-www-form-urlencoded",
			BodyKind::File => "multipart/form-data",
		}
	}
}

/// Marker for a body-carrying parameter.
///
/// `embed` forces the field's value to be nested under its own alias
/// instead of occupying the whole body. Form and file fields are always
/// embedded; a JSON field starts un-embedded and is forced embedded when
/// the dependency tree carries more than one body field.
#[derive(Debug, Clone)]
pub struct BodyMarker {
	pub kind: BodyKind,
	pub embed: bool,
	pub media_type: Option<String>,
	pub alias: Option<String>,
}

impl BodyMarker {
	pub fn json() -> Self {
		Self {
			kind: BodyKind::Json,
			embed: false,
			media_type: None,
			alias: None,
		}
	}

	pub fn form() -> Self {
		Self {
			kind: BodyKind::Form,
			embed: true,
			media_type: None,
			alias: None,
		}
	}

	pub fn file() -> Self {
		Self {
			kind: BodyKind::File,
			embed: true,
			media_type: None,
			alias: None,
		}
	}

	pub fn embed(mut self) -> Self {
		self.embed = true;
		self
	}

	pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
		self.media_type = Some(media_type.into());
		self
	}

	pub fn alias(mut self, alias: impl Into<String>) -> Self {
		self.alias = Some(alias.into());
		self
	}

	/// Effective media type: the explicit one, or the kind's default.
	pub fn effective_media_type(&self) -> &str {
		self.media_type
			.as_deref()
			.unwrap_or_else(|| self.kind.default_media_type())
	}
}

/// Marker for a nested dependency.
///
/// The marker always names its target dependency explicitly; there is no
/// fallback resolution by parameter type.
#[derive(Clone)]
pub struct Depends {
	pub dependency: Arc<Dependency>,
	pub use_cache: bool,
}

impl Depends {
	/// Depend on `dependency` with request-scoped caching (the default).
	pub fn new(dependency: Arc<Dependency>) -> Self {
		Self {
			dependency,
			use_cache: true,
		}
	}

	/// Depend on `dependency`, re-invoking it at every usage site.
	pub fn no_cache(dependency: Arc<Dependency>) -> Self {
		Self {
			dependency,
			use_cache: false,
		}
	}
}

impl fmt::Debug for Depends {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Depends")
			.field("dependency", &self.dependency.name())
			.field("use_cache", &self.use_cache)
			.finish()
	}
}

/// The full marker attached to one declared parameter.
#[derive(Debug, Clone)]
pub enum Marker {
	Param(Param),
	Body(BodyMarker),
	Depends(Depends),
	/// The parameter receives the in-flight response object.
	ResponseSink,
}

impl From<Param> for Marker {
	fn from(param: Param) -> Self {
		Marker::Param(param)
	}
}

impl From<BodyMarker> for Marker {
	fn from(body: BodyMarker) -> Self {
		Marker::Body(body)
	}
}

impl From<Depends> for Marker {
	fn from(depends: Depends) -> Self {
		Marker::Depends(depends)
	}
}
