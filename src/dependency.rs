//! Callable model
//!
//! A [`Dependency`] is the declarative stand-in for a reflected callable:
//! an ordered parameter list, a handler closure and a stable identity used
//! for per-request memoization. Sharing one `Arc<Dependency>` across
//! several [`Depends`](crate::params::Depends) markers shares the identity,
//! which is what makes request-scoped caching deduplicate repeated
//! sub-dependencies.

use crate::error::HandlerError;
use crate::field::{FieldType, Validate};
use crate::params::Marker;
use crate::response::ResponseHandle;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CALLABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of one registered callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallableId(u64);

impl CallableId {
	fn next() -> Self {
		CallableId(NEXT_CALLABLE_ID.fetch_add(1, Ordering::Relaxed))
	}
}

/// One bound argument value.
///
/// Almost every argument is a JSON value; the `Response` variant carries
/// the in-flight response capability for response-sink parameters.
#[derive(Debug, Clone)]
pub enum ArgValue {
	Json(Value),
	Response(ResponseHandle),
}

impl ArgValue {
	pub fn as_json(&self) -> Option<&Value> {
		match self {
			ArgValue::Json(value) => Some(value),
			ArgValue::Response(_) => None,
		}
	}

	pub fn as_response(&self) -> Option<&ResponseHandle> {
		match self {
			ArgValue::Json(_) => None,
			ArgValue::Response(handle) => Some(handle),
		}
	}
}

/// The bound-values map handed to a handler.
#[derive(Debug, Clone, Default)]
pub struct Args {
	values: HashMap<String, ArgValue>,
}

impl Args {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, name: impl Into<String>, value: ArgValue) {
		self.values.insert(name.into(), value);
	}

	pub fn insert_json(&mut self, name: impl Into<String>, value: Value) {
		self.values.insert(name.into(), ArgValue::Json(value));
	}

	pub fn get(&self, name: &str) -> Option<&ArgValue> {
		self.values.get(name)
	}

	/// The JSON value bound under `name`, if any.
	pub fn json(&self, name: &str) -> Option<&Value> {
		self.values.get(name).and_then(ArgValue::as_json)
	}

	/// The response handle bound under `name`, if any.
	pub fn response(&self, name: &str) -> Option<&ResponseHandle> {
		self.values.get(name).and_then(ArgValue::as_response)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.values.contains_key(name)
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, &ArgValue)> {
		self.values.iter()
	}

	pub fn merge(&mut self, other: Args) {
		self.values.extend(other.values);
	}
}

/// Value yielded by a scoped dependency, paired with its release action.
///
/// The release action runs exactly once, at request teardown, in reverse
/// acquisition order relative to other scoped dependencies.
pub struct ScopedValue {
	pub value: Value,
	pub release: Box<dyn FnOnce() + Send>,
}

impl ScopedValue {
	pub fn new(value: Value, release: impl FnOnce() + Send + 'static) -> Self {
		Self {
			value,
			release: Box::new(release),
		}
	}
}

type PlainFn = dyn Fn(&Args) -> Result<Value, HandlerError> + Send + Sync;
type ScopedFn = dyn Fn(&Args) -> Result<ScopedValue, HandlerError> + Send + Sync;

/// The underlying callable of a dependency.
pub enum Handler {
	/// Invoked synchronously; the returned value is the dependency's value.
	Plain(Box<PlainFn>),
	/// Yields a value and defers a release action to request teardown.
	Scoped(Box<ScopedFn>),
}

impl Handler {
	pub fn is_scoped(&self) -> bool {
		matches!(self, Handler::Scoped(_))
	}
}

/// One declared parameter of a dependency.
#[derive(Clone)]
pub struct ParamDecl {
	pub name: String,
	pub ty: FieldType,
	pub default: Option<Value>,
	pub marker: Option<Marker>,
	/// Validation override; the builder falls back to a type-driven
	/// validator when absent.
	pub validator: Option<Arc<dyn Validate>>,
}

impl ParamDecl {
	pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
		Self {
			name: name.into(),
			ty,
			default: None,
			marker: None,
			validator: None,
		}
	}

	pub fn default_value(mut self, default: Value) -> Self {
		self.default = Some(default);
		self
	}

	pub fn marker(mut self, marker: impl Into<Marker>) -> Self {
		self.marker = Some(marker.into());
		self
	}

	pub fn validator(mut self, validator: Arc<dyn Validate>) -> Self {
		self.validator = Some(validator);
		self
	}
}

impl fmt::Debug for ParamDecl {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ParamDecl")
			.field("name", &self.name)
			.field("ty", &self.ty)
			.field("default", &self.default)
			.field("marker", &self.marker)
			.finish_non_exhaustive()
	}
}

/// A registered callable: parameter declarations plus a handler.
///
/// # Examples
///
/// ```
/// use dependant::{Dependency, FieldType, Param, ParamDecl};
/// use serde_json::json;
///
/// let pager = Dependency::new("pager", |args| {
///     let skip = args.json("skip").cloned().unwrap_or(json!(0));
///     Ok(json!({ "skip": skip }))
/// })
/// .param(ParamDecl::new("skip", FieldType::Int)
///     .marker(Param::query())
///     .default_value(json!(0)))
/// .into_arc();
///
/// assert_eq!(pager.name(), "pager");
/// ```
pub struct Dependency {
	name: String,
	params: Vec<ParamDecl>,
	handler: Handler,
	id: CallableId,
	cache_qualifier: Vec<String>,
}

impl Dependency {
	/// A dependency backed by a plain synchronous handler.
	pub fn new<F>(name: impl Into<String>, handler: F) -> Self
	where
		F: Fn(&Args) -> Result<Value, HandlerError> + Send + Sync + 'static,
	{
		Self {
			name: name.into(),
			params: Vec::new(),
			handler: Handler::Plain(Box::new(handler)),
			id: CallableId::next(),
			cache_qualifier: Vec::new(),
		}
	}

	/// A scoped (generator-style) dependency: the handler yields a value
	/// plus a release action deferred to request teardown.
	pub fn scoped<F>(name: impl Into<String>, handler: F) -> Self
	where
		F: Fn(&Args) -> Result<ScopedValue, HandlerError> + Send + Sync + 'static,
	{
		Self {
			name: name.into(),
			params: Vec::new(),
			handler: Handler::Scoped(Box::new(handler)),
			id: CallableId::next(),
			cache_qualifier: Vec::new(),
		}
	}

	/// Append a parameter declaration; declaration order is binding order.
	pub fn param(mut self, decl: ParamDecl) -> Self {
		self.params.push(decl);
		self
	}

	/// Auxiliary qualifier mixed into the memoization key, so one callable
	/// can resolve to distinct cached values per qualifier.
	pub fn cache_qualifier(mut self, qualifier: impl IntoIterator<Item = String>) -> Self {
		self.cache_qualifier = qualifier.into_iter().collect();
		self
	}

	pub fn into_arc(self) -> Arc<Self> {
		Arc::new(self)
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn params(&self) -> &[ParamDecl] {
		&self.params
	}

	pub fn handler(&self) -> &Handler {
		&self.handler
	}

	pub fn id(&self) -> CallableId {
		self.id
	}

	pub fn qualifier(&self) -> &[String] {
		&self.cache_qualifier
	}
}

impl fmt::Debug for Dependency {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Dependency")
			.field("name", &self.name)
			.field("id", &self.id)
			.field("params", &self.params.len())
			.field("scoped", &self.handler.is_scoped())
			.finish()
	}
}
