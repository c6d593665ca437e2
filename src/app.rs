//! Application surface: route registration and request execution
//!
//! [`App`] carries the registration-time configuration (application-level
//! dependencies, the exception-handler table, the content writer) and turns
//! a [`Dependency`] into a ready-to-run [`RouteHandler`]. All graph
//! construction and body-schema synthesis happens here, once; request
//! execution only walks prebuilt structures.

use crate::dependant::{Dependant, body_field, build_anonymous, build_dependant};
use crate::dependency::{Dependency, Handler};
use crate::error::{BuildError, HandlerError, HttpError, LocSegment, ValidationFailed};
use crate::field::ParameterField;
use crate::params::{BodyKind, Depends};
use crate::request::{BodyPayload, Request};
use crate::resolver::{DependencyCache, ResolutionScope, solve};
use crate::response::{ContentWriter, Response, ResponseHandle};
use serde_json::{Value, json};
use std::sync::Arc;

type ValidationHandler = Arc<dyn Fn(&ValidationFailed) -> Response + Send + Sync>;
type HttpHandler = Arc<dyn Fn(HttpError) -> Response + Send + Sync>;

/// Immutable table mapping failure families to responses.
///
/// Configured at registration; never consulted for [`HandlerError::Other`],
/// which always escapes to the caller.
#[derive(Clone)]
pub struct ExceptionHandlers {
	validation: ValidationHandler,
	http: HttpHandler,
}

impl ExceptionHandlers {
	pub fn on_validation(
		mut self,
		handler: impl Fn(&ValidationFailed) -> Response + Send + Sync + 'static,
	) -> Self {
		self.validation = Arc::new(handler);
		self
	}

	pub fn on_http(
		mut self,
		handler: impl Fn(HttpError) -> Response + Send + Sync + 'static,
	) -> Self {
		self.http = Arc::new(handler);
		self
	}

	pub fn validation_response(&self, failed: &ValidationFailed) -> Response {
		(self.validation)(failed)
	}

	pub fn http_response(&self, error: HttpError) -> Response {
		(self.http)(error)
	}
}

impl Default for ExceptionHandlers {
	fn default() -> Self {
		Self {
			validation: Arc::new(default_validation_response),
			http: Arc::new(HttpError::into_response),
		}
	}
}

impl std::fmt::Debug for ExceptionHandlers {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ExceptionHandlers").finish_non_exhaustive()
	}
}

#[derive(serde::Serialize)]
struct ErrorDetail {
	loc: Vec<Value>,
	msg: String,
}

/// The default 422 payload: `{"detail": [{"loc": [...], "msg": "..."}]}`.
pub fn validation_detail(failed: &ValidationFailed) -> Value {
	let detail: Vec<ErrorDetail> = failed
		.errors
		.iter()
		.map(|err| ErrorDetail {
			loc: err
				.loc
				.segments()
				.iter()
				.map(|seg| match seg {
					LocSegment::Key(key) => json!(key),
					LocSegment::Index(idx) => json!(idx),
				})
				.collect(),
			msg: err.kind.to_string(),
		})
		.collect();
	json!({ "detail": detail })
}

fn default_validation_response(failed: &ValidationFailed) -> Response {
	let mut response = Response::unprocessable_entity();
	response.set_json(&validation_detail(failed));
	response
}

/// Registration-time configuration shared by every route it registers.
#[derive(Debug, Clone, Default)]
pub struct App {
	dependencies: Vec<Depends>,
	handlers: ExceptionHandlers,
	writer: ContentWriter,
}

impl App {
	pub fn new() -> Self {
		Self::default()
	}

	/// Splice `depends` in front of every route registered from now on.
	/// Its value is resolved and cached but handed to no parameter.
	pub fn dependency(mut self, depends: Depends) -> Self {
		self.dependencies.push(depends);
		self
	}

	pub fn exception_handlers(mut self, handlers: ExceptionHandlers) -> Self {
		self.handlers = handlers;
		self
	}

	pub fn content_writer(mut self, writer: ContentWriter) -> Self {
		self.writer = writer;
		self
	}

	/// A child application inheriting this one's dependencies, handler table
	/// and writer. Additions to the child never flow back to the parent.
	pub fn fork(&self) -> App {
		self.clone()
	}

	/// Register `call` as a route handler.
	pub fn route(&self, call: &Arc<Dependency>) -> Result<RouteHandler, BuildError> {
		self.route_with(call, &[])
	}

	/// Register `call` with extra route-level dependencies, spliced after
	/// the application-level ones and before the handler's own children.
	pub fn route_with(
		&self,
		call: &Arc<Dependency>,
		extra: &[Depends],
	) -> Result<RouteHandler, BuildError> {
		if call.handler().is_scoped() {
			return Err(BuildError::ScopedRoot {
				name: call.name().to_string(),
			});
		}

		let mut dependant = build_dependant(call)?;
		let mut spliced = Vec::new();
		for depends in self.dependencies.iter().chain(extra) {
			spliced.push(build_anonymous(depends)?);
		}
		spliced.append(&mut dependant.dependencies);
		dependant.dependencies = spliced;

		let body = body_field(&mut dependant)?;
		tracing::debug!(
			route = call.name(),
			children = dependant.dependencies.len(),
			has_body = body.is_some(),
			"registered route"
		);
		Ok(RouteHandler {
			dependant,
			body_field: body,
			handlers: self.handlers.clone(),
			writer: self.writer,
		})
	}
}

/// One registered route, ready to execute requests.
#[derive(Debug)]
pub struct RouteHandler {
	dependant: Dependant,
	body_field: Option<ParameterField>,
	handlers: ExceptionHandlers,
	writer: ContentWriter,
}

impl RouteHandler {
	pub fn dependant(&self) -> &Dependant {
		&self.dependant
	}

	pub fn body_schema(&self) -> Option<&ParameterField> {
		self.body_field.as_ref()
	}

	/// Execute one request.
	///
	/// Binding failures and deliberate HTTP errors come back as `Ok` with
	/// the response the exception-handler table produced; only
	/// [`HandlerError::Other`] escapes as `Err`. Scoped dependencies are
	/// released before this returns, whatever the outcome.
	pub fn handle(&self, request: &Request) -> Result<Response, HandlerError> {
		let body = match self.parse_body(request) {
			Ok(body) => body,
			Err(failed) => return Ok(self.handlers.validation_response(&failed)),
		};

		let response_handle = ResponseHandle::default();
		let mut scope = ResolutionScope::new();
		let mut cache = DependencyCache::new();

		let outcome = self.run(
			request,
			body.as_ref(),
			&response_handle,
			&mut scope,
			&mut cache,
		);
		scope.teardown();

		match outcome {
			Ok(value) => {
				let mut response = response_handle.take();
				self.writer.write(&mut response, value);
				Ok(response)
			}
			Err(RunError::Validation(failed)) => Ok(self.handlers.validation_response(&failed)),
			Err(RunError::Handler(HandlerError::Http(http))) => {
				Ok(self.handlers.http_response(http))
			}
			Err(RunError::Handler(other)) => Err(other),
		}
	}

	fn run(
		&self,
		request: &Request,
		body: Option<&BodyPayload>,
		response: &ResponseHandle,
		scope: &mut ResolutionScope,
		cache: &mut DependencyCache,
	) -> Result<Value, RunError> {
		let (args, errors) = solve(&self.dependant, request, body, response, scope, cache)
			.map_err(RunError::Handler)?;
		if !errors.is_empty() {
			return Err(RunError::Validation(ValidationFailed::new(errors)));
		}
		match self.dependant.call.handler() {
			Handler::Plain(call) => call(&args).map_err(RunError::Handler),
			// rejected at registration
			Handler::Scoped(_) => unreachable!("scoped route handlers never register"),
		}
	}

	fn parse_body(&self, request: &Request) -> Result<Option<BodyPayload>, ValidationFailed> {
		let Some(field) = &self.body_field else {
			return Ok(None);
		};
		let form = field
			.marker
			.as_body()
			.is_some_and(|m| matches!(m.kind, BodyKind::Form | BodyKind::File));
		BodyPayload::parse(request, form)
			.map_err(|err| ValidationFailed::new(vec![err]))
	}
}

enum RunError {
	Validation(ValidationFailed),
	Handler(HandlerError),
}
