//! Runtime dependency resolution
//!
//! [`solve`] walks a prebuilt [`Dependant`] tree depth-first, left to
//! right, resolving every child before binding the node's own parameters.
//! Binding errors are collected across the whole walk — a failing branch
//! never hides its siblings' diagnostics. The per-request
//! [`DependencyCache`] and [`ResolutionScope`] travel explicitly through
//! the recursion; nothing is ambient or shared across requests.

use crate::binder::{ParamLookup, bind_body, bind_params};
use crate::dependant::{CacheKey, Dependant};
use crate::dependency::{ArgValue, Args, Handler};
use crate::error::{BindingError, HandlerError};
use crate::request::{BodyPayload, Request};
use crate::response::ResponseHandle;
use serde_json::Value;
use std::collections::HashMap;

/// Request-scoped memoization of resolved dependency values.
#[derive(Debug, Default)]
pub struct DependencyCache {
	values: HashMap<CacheKey, Value>,
}

impl DependencyCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, key: &CacheKey) -> Option<&Value> {
		self.values.get(key)
	}

	/// First write wins; a later occurrence of the same key keeps the
	/// value the first occurrence produced.
	pub fn insert_if_absent(&mut self, key: CacheKey, value: Value) {
		self.values.entry(key).or_insert(value);
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}

/// Ordered release list for scoped dependencies.
///
/// Every scoped dependency entered during a request lands here; teardown
/// runs the release actions in reverse acquisition order, exactly once,
/// whatever the request's outcome. Dropping an un-torn-down scope tears it
/// down as a backstop.
pub struct ResolutionScope {
	releases: Vec<Box<dyn FnOnce() + Send>>,
	torn_down: bool,
}

impl ResolutionScope {
	pub fn new() -> Self {
		Self {
			releases: Vec::new(),
			torn_down: false,
		}
	}

	/// Enter a scoped value: keep its release action, hand back the value.
	pub fn enter(&mut self, scoped: crate::dependency::ScopedValue) -> Value {
		self.releases.push(scoped.release);
		scoped.value
	}

	pub fn depth(&self) -> usize {
		self.releases.len()
	}

	/// Release all acquired resources, newest first.
	pub fn teardown(&mut self) {
		if self.torn_down {
			return;
		}
		self.torn_down = true;
		while let Some(release) = self.releases.pop() {
			release();
		}
	}
}

impl Default for ResolutionScope {
	fn default() -> Self {
		Self::new()
	}
}

impl Drop for ResolutionScope {
	fn drop(&mut self) {
		self.teardown();
	}
}

/// Resolve one node of the dependency tree against the live request.
///
/// Returns the node's bound values together with every binding error found
/// in the subtree. A [`HandlerError`] raised by a dependency's handler
/// propagates unmodified; it is not a binding failure.
pub fn solve(
	node: &Dependant,
	request: &Request,
	body: Option<&BodyPayload>,
	response: &ResponseHandle,
	scope: &mut ResolutionScope,
	cache: &mut DependencyCache,
) -> Result<(Args, Vec<BindingError>), HandlerError> {
	let mut values = Args::new();
	let mut errors = Vec::new();

	for child in &node.dependencies {
		let (sub_values, sub_errors) = solve(child, request, body, response, scope, cache)?;
		if !sub_errors.is_empty() {
			// keep walking: sibling diagnostics must surface together
			errors.extend(sub_errors);
			continue;
		}

		let solved = if child.use_cache && cache.get(&child.cache_key).is_some() {
			tracing::trace!(dependency = child.call.name(), "dependency cache hit");
			cache
				.get(&child.cache_key)
				.cloned()
				.unwrap_or(Value::Null)
		} else {
			match child.call.handler() {
				Handler::Plain(call) => call(&sub_values)?,
				Handler::Scoped(call) => scope.enter(call(&sub_values)?),
			}
		};

		if let Some(name) = &child.name {
			values.insert_json(name.clone(), solved.clone());
		}
		// store even for cache-disabled occurrences, so a later
		// cache-enabled occurrence of the same key can reuse the value
		cache.insert_if_absent(child.cache_key.clone(), solved);
	}

	let (path_values, path_errors) =
		bind_params(&node.path_params, ParamLookup::Single(&request.path_params));
	let (query_values, query_errors) =
		bind_params(&node.query_params, ParamLookup::Multi(&request.query_params));
	let (header_values, header_errors) =
		bind_params(&node.header_params, ParamLookup::Multi(&request.headers));
	let (cookie_values, cookie_errors) =
		bind_params(&node.cookie_params, ParamLookup::Single(&request.cookies));

	values.merge(path_values);
	values.merge(query_values);
	values.merge(header_values);
	values.merge(cookie_values);
	errors.extend(path_errors);
	errors.extend(query_errors);
	errors.extend(header_errors);
	errors.extend(cookie_errors);

	if !node.body_params.is_empty() {
		let (body_values, body_errors) = bind_body(&node.body_params, body);
		values.merge(body_values);
		errors.extend(body_errors);
	}

	if let Some(name) = &node.response_param_name {
		values.insert(name.clone(), ArgValue::Response(response.clone()));
	}

	Ok((values, errors))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dependant::build_dependant;
	use crate::dependency::{Dependency, ParamDecl, ScopedValue};
	use crate::field::FieldType;
	use crate::params::{Depends, Param};
	use serde_json::json;
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn solve_root(
		root: &Dependant,
		request: &Request,
	) -> Result<(Args, Vec<BindingError>), HandlerError> {
		let response = ResponseHandle::default();
		let mut scope = ResolutionScope::new();
		let mut cache = DependencyCache::new();
		solve(root, request, None, &response, &mut scope, &mut cache)
	}

	#[test]
	fn zero_dependency_resolution_equals_direct_binding() {
		let call = Dependency::new("h", |_| Ok(json!(null)))
			.param(ParamDecl::new("id", FieldType::Int))
			.into_arc();
		let root = build_dependant(&call).unwrap();
		let request = Request::builder().path_param("id", "7").build();

		let (solved, errors) = solve_root(&root, &request).unwrap();
		assert!(errors.is_empty());

		let (bound, _) = bind_params(
			&root.path_params,
			ParamLookup::Single(&request.path_params),
		);
		assert_eq!(solved.json("id"), bound.json("id"));
		assert_eq!(solved.len(), bound.len());
	}

	#[test]
	fn repeated_cached_dependency_is_invoked_once() {
		let invocations = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&invocations);
		let shared = Dependency::new("shared", move |_| {
			let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
			Ok(json!(n))
		})
		.into_arc();

		let call = Dependency::new("root", |_| Ok(json!(null)))
			.param(ParamDecl::new("a", FieldType::Any).marker(Depends::new(Arc::clone(&shared))))
			.param(ParamDecl::new("b", FieldType::Any).marker(Depends::new(Arc::clone(&shared))))
			.into_arc();
		let root = build_dependant(&call).unwrap();

		let (values, errors) = solve_root(&root, &Request::default()).unwrap();
		assert!(errors.is_empty());
		assert_eq!(invocations.load(Ordering::SeqCst), 1);
		assert_eq!(values.json("a"), values.json("b"));
	}

	#[test]
	fn cache_disabled_occurrence_reinvokes_but_first_value_stays_cached() {
		let invocations = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&invocations);
		let shared = Dependency::new("shared", move |_| {
			let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
			Ok(json!(n))
		})
		.into_arc();

		let call = Dependency::new("root", |_| Ok(json!(null)))
			.param(
				ParamDecl::new("cached", FieldType::Any)
					.marker(Depends::new(Arc::clone(&shared))),
			)
			.param(
				ParamDecl::new("fresh", FieldType::Any)
					.marker(Depends::no_cache(Arc::clone(&shared))),
			)
			.param(
				ParamDecl::new("again", FieldType::Any)
					.marker(Depends::new(Arc::clone(&shared))),
			)
			.into_arc();
		let root = build_dependant(&call).unwrap();

		let (values, _) = solve_root(&root, &Request::default()).unwrap();
		assert_eq!(invocations.load(Ordering::SeqCst), 2);
		assert_eq!(values.json("cached"), Some(&json!(1)));
		assert_eq!(values.json("fresh"), Some(&json!(2)));
		// the cache keeps the first value; the fresh one never replaces it
		assert_eq!(values.json("again"), Some(&json!(1)));
	}

	#[test]
	fn failing_child_does_not_hide_sibling_errors() {
		let needs_token = Dependency::new("needs_token", |_| Ok(json!("t")))
			.param(ParamDecl::new("token", FieldType::Str).marker(Param::query()))
			.into_arc();
		let needs_key = Dependency::new("needs_key", |_| Ok(json!("k")))
			.param(ParamDecl::new("key", FieldType::Str).marker(Param::query()))
			.into_arc();
		let call = Dependency::new("root", |_| Ok(json!(null)))
			.param(ParamDecl::new("a", FieldType::Any).marker(Depends::new(needs_token)))
			.param(ParamDecl::new("b", FieldType::Any).marker(Depends::new(needs_key)))
			.into_arc();
		let root = build_dependant(&call).unwrap();

		let (_, errors) = solve_root(&root, &Request::default()).unwrap();
		let locs: Vec<String> = errors.iter().map(|e| e.loc.to_string()).collect();
		assert_eq!(locs, vec!["(query, token)", "(query, key)"]);
	}

	#[test]
	fn scoped_dependency_releases_in_reverse_order() {
		let log = Arc::new(std::sync::Mutex::new(Vec::new()));

		let scoped = |name: &'static str, log: Arc<std::sync::Mutex<Vec<String>>>| {
			Dependency::scoped(name, move |_| {
				let log = Arc::clone(&log);
				Ok(ScopedValue::new(json!(name), move || {
					log.lock().unwrap().push(format!("release {name}"));
				}))
			})
			.into_arc()
		};

		let first = scoped("first", Arc::clone(&log));
		let second = scoped("second", Arc::clone(&log));
		let call = Dependency::new("root", |_| Ok(json!(null)))
			.param(ParamDecl::new("a", FieldType::Any).marker(Depends::new(first)))
			.param(ParamDecl::new("b", FieldType::Any).marker(Depends::new(second)))
			.into_arc();
		let root = build_dependant(&call).unwrap();

		let response = ResponseHandle::default();
		let mut scope = ResolutionScope::new();
		let mut cache = DependencyCache::new();
		let (values, errors) =
			solve(&root, &Request::default(), None, &response, &mut scope, &mut cache).unwrap();
		assert!(errors.is_empty());
		assert_eq!(values.json("a"), Some(&json!("first")));
		assert!(log.lock().unwrap().is_empty());

		scope.teardown();
		scope.teardown(); // second call is a no-op
		assert_eq!(
			*log.lock().unwrap(),
			vec!["release second".to_string(), "release first".to_string()]
		);
	}

	#[test]
	fn dropping_the_scope_is_a_teardown_backstop() {
		let released = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&released);
		{
			let mut scope = ResolutionScope::new();
			scope.enter(ScopedValue::new(json!(null), move || {
				counter.fetch_add(1, Ordering::SeqCst);
			}));
		}
		assert_eq!(released.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn handler_errors_propagate_unmodified() {
		let failing = Dependency::new("failing", |_| {
			Err(HandlerError::Other(anyhow::anyhow!("boom")))
		})
		.into_arc();
		let call = Dependency::new("root", |_| Ok(json!(null)))
			.param(ParamDecl::new("dep", FieldType::Any).marker(Depends::new(failing)))
			.into_arc();
		let root = build_dependant(&call).unwrap();

		let err = solve_root(&root, &Request::default()).unwrap_err();
		assert!(matches!(err, HandlerError::Other(e) if e.to_string() == "boom"));
	}

	#[test]
	fn response_sink_receives_the_live_handle() {
		let call = Dependency::new("h", |_| Ok(json!(null)))
			.param(ParamDecl::new("response", FieldType::Any).marker(crate::params::Marker::ResponseSink))
			.into_arc();
		let root = build_dependant(&call).unwrap();
		assert_eq!(root.response_param_name.as_deref(), Some("response"));

		let response = ResponseHandle::default();
		let mut scope = ResolutionScope::new();
		let mut cache = DependencyCache::new();
		let (values, _) =
			solve(&root, &Request::default(), None, &response, &mut scope, &mut cache).unwrap();
		assert!(values.response("response").is_some());
	}
}
