//! Inbound request abstraction
//!
//! The engine never talks to a socket; the surrounding framework hands it a
//! [`Request`] carrying the already-routed path parameters, the query and
//! header multimaps, the cookie map and the raw body bytes. Body structure
//! ([`BodyPayload`]) is recovered here, once per request, before the
//! resolver runs — and only when the route actually declares a body field.

use crate::error::{BindingError, BindingErrorKind, Location};
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;

/// Multi-valued parameter map (query string, headers).
pub type MultiMap = HashMap<String, Vec<String>>;

/// One incoming request, as supplied by the surrounding framework.
#[derive(Debug, Clone, Default)]
pub struct Request {
	pub path_params: HashMap<String, String>,
	pub query_params: MultiMap,
	pub headers: MultiMap,
	pub cookies: HashMap<String, String>,
	pub body: Bytes,
	pub content_type: Option<String>,
}

impl Request {
	pub fn builder() -> RequestBuilder {
		RequestBuilder::default()
	}

	/// First value of a header, by exact wire key.
	pub fn header(&self, key: &str) -> Option<&str> {
		self.headers.get(key).and_then(|v| v.first()).map(String::as_str)
	}
}

/// Builder for assembling a [`Request`] by hand, mostly in tests and
/// adapters.
///
/// # Examples
///
/// ```
/// use dependant::Request;
///
/// let request = Request::builder()
///     .path_param("id", "42")
///     .query("tag", "a")
///     .query("tag", "b")
///     .header("X_token", "secret")
///     .build();
///
/// assert_eq!(request.path_params.get("id").map(String::as_str), Some("42"));
/// assert_eq!(request.query_params.get("tag").map(Vec::len), Some(2));
/// ```
#[derive(Debug, Default)]
pub struct RequestBuilder {
	request: Request,
}

impl RequestBuilder {
	pub fn path_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.request.path_params.insert(key.into(), value.into());
		self
	}

	/// Append one query value; repeated keys accumulate.
	pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.request
			.query_params
			.entry(key.into())
			.or_default()
			.push(value.into());
		self
	}

	/// Append one header value; repeated keys accumulate.
	pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.request
			.headers
			.entry(key.into())
			.or_default()
			.push(value.into());
		self
	}

	pub fn cookie(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.request.cookies.insert(key.into(), value.into());
		self
	}

	pub fn body(mut self, body: impl Into<Bytes>) -> Self {
		self.request.body = body.into();
		self
	}

	pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
		self.request.content_type = Some(content_type.into());
		self
	}

	/// JSON body plus matching content type.
	pub fn json_body(self, value: &Value) -> Self {
		// Value serialization cannot fail
		let body = serde_json::to_vec(value).unwrap_or_default();
		self.body(body).content_type("application/json")
	}

	pub fn build(self) -> Request {
		self.request
	}
}

/// Structured body as the binder consumes it.
#[derive(Debug, Clone)]
pub enum BodyPayload {
	Json(Value),
	Form(MultiMap),
	/// No structured form recognized; raw bytes pass through.
	Bytes(Bytes),
}

impl BodyPayload {
	/// Recover body structure from the raw payload.
	///
	/// `form` selects urlencoded-form decoding (the route's body schema is
	/// form- or file-kind). Otherwise the body parses as JSON when the
	/// content type is absent, `application/json` or `application/*+json`;
	/// any other content type passes the raw bytes through.
	///
	/// A malformed payload is a single error at `(body,)`, or
	/// `(body, offset)` for a structural JSON error; parsing never panics.
	pub fn parse(request: &Request, form: bool) -> Result<Option<BodyPayload>, BindingError> {
		if form {
			let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&request.body)
				.map_err(|_| BindingError::new(Location::body(), BindingErrorKind::BodyRead))?;
			let mut map = MultiMap::new();
			for (key, value) in pairs {
				map.entry(key).or_default().push(value);
			}
			return Ok(Some(BodyPayload::Form(map)));
		}
		if request.body.is_empty() {
			return Ok(None);
		}
		if is_json_media_type(request.content_type.as_deref()) {
			let value: Value = serde_json::from_slice(&request.body).map_err(|err| {
				let offset = byte_offset(&request.body, err.line(), err.column());
				BindingError::new(Location::body_offset(offset), BindingErrorKind::JsonParse { offset })
			})?;
			Ok(Some(BodyPayload::Json(value)))
		} else {
			Ok(Some(BodyPayload::Bytes(request.body.clone())))
		}
	}

	pub fn is_form(&self) -> bool {
		matches!(self, BodyPayload::Form(_))
	}
}

/// An absent content type is treated as JSON.
fn is_json_media_type(content_type: Option<&str>) -> bool {
	let Some(content_type) = content_type else {
		return true;
	};
	let essence = content_type.split(';').next().unwrap_or("").trim();
	let Some(subtype) = essence.strip_prefix("application/") else {
		return false;
	};
	subtype == "json" || subtype.ends_with("+json")
}

/// Byte offset of a 1-based (line, column) position inside `input`.
fn byte_offset(input: &[u8], line: usize, column: usize) -> usize {
	let mut remaining_lines = line.saturating_sub(1);
	let mut offset = 0usize;
	for (idx, byte) in input.iter().enumerate() {
		if remaining_lines == 0 {
			break;
		}
		if *byte == b'\n' {
			remaining_lines -= 1;
			offset = idx + 1;
		}
	}
	(offset + column.saturating_sub(1)).min(input.len())
}
