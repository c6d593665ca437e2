//! Outbound response capability
//!
//! The engine does not own serialization policy beyond writing the handler
//! return value into the response through a [`ContentWriter`]; everything
//! else (transport, transfer encoding) belongs to the surrounding server.
//!
//! [`ResponseHandle`] is the shared capability injected into handlers that
//! declare a response-sink parameter: it lets dependency and handler code
//! adjust status and headers on the in-flight response.

use bytes::Bytes;
use http::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// HTTP response representation.
#[derive(Debug, Clone)]
pub struct Response {
	pub status: StatusCode,
	pub headers: HashMap<String, String>,
	pub body: Bytes,
}

impl Response {
	pub fn new(status: StatusCode) -> Self {
		Self {
			status,
			headers: HashMap::new(),
			body: Bytes::new(),
		}
	}

	pub fn ok() -> Self {
		Self::new(StatusCode::OK)
	}

	pub fn unprocessable_entity() -> Self {
		Self::new(StatusCode::UNPROCESSABLE_ENTITY)
	}

	/// A 302 redirect to `location`.
	pub fn redirect(location: impl Into<String>) -> Self {
		let mut response = Self::new(StatusCode::FOUND);
		response.set_header("location", location);
		response
	}

	pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
		self.headers.insert(name.into(), value.into());
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).map(String::as_str)
	}

	/// Serialize `value` as compact JSON into the body.
	pub fn set_json(&mut self, value: &Value) {
		// serde_json only fails on non-string map keys, which Value cannot hold
		let body = serde_json::to_vec(value).unwrap_or_default();
		self.body = Bytes::from(body);
		self.set_header("content-type", "application/json");
	}

	/// Write plain text into the body.
	pub fn set_text(&mut self, text: impl Into<String>) {
		self.body = Bytes::from(text.into());
		self.set_header("content-type", "text/plain; charset=utf-8");
	}

	pub fn body_str(&self) -> Option<&str> {
		std::str::from_utf8(&self.body).ok()
	}
}

impl Default for Response {
	fn default() -> Self {
		Self::ok()
	}
}

/// Shared handle on the in-flight response.
///
/// Cloning is cheap; all clones address the same response. The handle is
/// what a response-sink parameter receives.
#[derive(Debug, Clone)]
pub struct ResponseHandle {
	inner: Arc<Mutex<Response>>,
}

impl ResponseHandle {
	pub fn new(response: Response) -> Self {
		Self {
			inner: Arc::new(Mutex::new(response)),
		}
	}

	pub fn set_status(&self, status: StatusCode) {
		self.lock().status = status;
	}

	pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
		self.lock().set_header(name, value);
	}

	/// Run `f` against the response under the lock.
	pub fn with<R>(&self, f: impl FnOnce(&mut Response) -> R) -> R {
		f(&mut self.lock())
	}

	/// Take the response out of the handle, leaving a default in its place.
	pub fn take(&self) -> Response {
		std::mem::take(&mut *self.lock())
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Response> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

impl Default for ResponseHandle {
	fn default() -> Self {
		Self::new(Response::ok())
	}
}

/// Policy for writing a handler's return value into the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentWriter {
	#[default]
	Json,
	PlainText,
}

impl ContentWriter {
	pub fn write(&self, response: &mut Response, value: Value) {
		match self {
			ContentWriter::Json => response.set_json(&value),
			ContentWriter::PlainText => match value {
				Value::String(s) => response.set_text(s),
				other => response.set_text(other.to_string()),
			},
		}
	}
}
